//! One unit of backup: a source on some host, a staging folder and the
//! storages receiving the packaged result.

pub mod database;
pub mod file;
pub mod host;

use crate::backup::compress::Compression;
use crate::backup::context::RunContext;
use crate::backup::result_error::result::{convert_error_vec, Result};
use crate::backup::result_error::AddMsg;
use crate::backup::storage::local::check_folder_writable;
use crate::backup::storage::{ArchiveStore, Storage};
use bon::Builder;
use database::DatabaseSource;
use derive_more::From;
use file::FileSource;
use getset::{CopyGetters, Getters};
use host::Host;
use itertools::Itertools;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;

/// Packaged data ready to be handed to storages.
#[derive(Debug)]
pub struct Artifact {
    path: PathBuf,
    extension: &'static str,
    _scratch: Option<NamedTempFile>,
}

impl Artifact {
    /// Removed once the artifact is dropped.
    pub fn scratch(file: NamedTempFile, extension: &'static str) -> Self {
        Self {
            path: file.path().to_path_buf(),
            extension,
            _scratch: Some(file),
        }
    }

    /// Left in place, next to the staged data.
    pub fn kept(path: PathBuf, extension: &'static str) -> Self {
        Self {
            path,
            extension,
            _scratch: None,
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    pub fn extension(&self) -> &'static str {
        self.extension
    }
}

/// What an action backs up.
#[derive(Clone, Debug, PartialEq, Eq, From)]
pub enum ActionKind {
    File(FileSource),
    Database(DatabaseSource),
}

impl ActionKind {
    pub fn describe(&self, host: &Host) -> String {
        match self {
            ActionKind::File(source) => source.describe(host),
            ActionKind::Database(source) => source.describe(host),
        }
    }

    /// Human readable problems preventing a backup, empty when readable.
    pub fn check_access(&self, ctx: &RunContext, host: &Host) -> Vec<String> {
        match self {
            ActionKind::File(source) => source.check_access(ctx, host),
            ActionKind::Database(source) => source.check_access(ctx, host),
        }
    }

    /// Database dumps are always gzipped; `compression` only applies to
    /// file archives.
    pub fn fetch(
        &self,
        ctx: &RunContext,
        host: &Host,
        staging: &Path,
        full_name: &str,
        compression: Compression,
    ) -> Result<Artifact> {
        match self {
            ActionKind::File(source) => source.fetch(ctx, host, staging, full_name, compression),
            ActionKind::Database(source) => source.fetch(ctx, host, staging, full_name),
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            ActionKind::File(_) => "File",
            ActionKind::Database(source) => source.engine().title(),
        }
    }

    pub fn details(&self) -> String {
        match self {
            ActionKind::File(source) => source.details(),
            ActionKind::Database(source) => source.details(),
        }
    }
}

#[derive(Clone, Debug, Builder, Getters, CopyGetters)]
pub struct Action {
    #[getset(get = "pub")]
    prefix: String,
    #[getset(get = "pub")]
    name: String,
    #[getset(get = "pub")]
    host: Host,
    /// Staging folder; file sources are mirrored under `<dest_folder>/<full_name>`.
    #[getset(get = "pub")]
    dest_folder: PathBuf,
    #[builder(default)]
    #[getset(get_copy = "pub")]
    compression: Compression,
    #[builder(default)]
    #[getset(get = "pub")]
    storages: Vec<Arc<Storage>>,
    #[builder(into)]
    #[getset(get = "pub")]
    kind: ActionKind,
}

impl Action {
    pub fn server_name(&self) -> &str {
        self.host.server()
    }

    pub fn full_name(&self) -> String {
        format!("{}_{}", self.prefix, self.name)
    }

    pub fn is_local(&self) -> bool {
        self.host.is_local()
    }

    /// Short description used in logs and reports.
    pub fn describe(&self) -> String {
        self.kind.describe(&self.host)
    }

    pub fn check_src_access(&self, ctx: &RunContext) -> Vec<String> {
        self.kind.check_access(ctx, &self.host)
    }

    pub fn check_dest_access(&self, ctx: &RunContext) -> Vec<String> {
        check_folder_writable(ctx, &self.dest_folder)
            .into_iter()
            .chain(self.storages.iter().flat_map(|s| s.check_writable(ctx)))
            .collect()
    }

    /// Fetches and packages the source, then saves it on every storage
    /// wanting today's snapshot.
    ///
    /// Storage failures do not stop the remaining storages.
    pub fn run_backup(&self, ctx: &RunContext) -> Result<()> {
        let descr = self.describe();
        tracing::info!("{descr}: Starting backup...");
        tracing::info!("{descr}:   fetching data...");
        let artifact = self.kind.fetch(
            ctx,
            &self.host,
            &self.dest_folder,
            &self.full_name(),
            self.compression,
        )?;

        tracing::info!("{descr}:   saving data...");
        let errors = self
            .storages
            .iter()
            .filter(|storage| storage.should_save(ctx))
            .filter_map(|storage| {
                tracing::info!("{descr}:     saving on {}...", storage.describe());
                match storage.save(ctx, artifact.path(), &self.full_name(), artifact.extension()) {
                    Ok(()) => {
                        tracing::info!("{descr}:     saved on {}", storage.describe());
                        None
                    }
                    Err(e) => Some(e.add_msg(format!("Unable to save on {}", storage.describe()))),
                }
            })
            .collect_vec();
        convert_error_vec(errors)?;
        tracing::info!("{descr}: Backup completed");
        Ok(())
    }
}

impl Display for Action {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let source = &self.kind;
        let storages = if self.storages.is_empty() {
            "none".to_string()
        } else {
            format!(
                "\n{}",
                self.storages
                    .iter()
                    .map(|s| indent::indent_all_with("  ", s.to_string()))
                    .join("")
                    .trim_end()
            )
        };
        let details = format!(
            "{}\nssh user: {}\nssh key: {}\nlocal destination: {}\ncompression: {}\nstorage_list: {storages}",
            source.details(),
            self.host.ssh_user().as_deref().unwrap_or("Default"),
            self.host
                .ssh_key()
                .as_ref()
                .map_or("Default".to_string(), |k| k.display().to_string()),
            self.dest_folder.display(),
            self.compression,
        );
        write!(
            f,
            "{} action {} on {}: \n{}",
            source.title(),
            self.full_name(),
            self.server_name(),
            indent::indent_all_with("  ", details).trim_end()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::command::tests::ScriptedRunner;
    use crate::backup::retention::{RetentionPolicy, Tier};
    use crate::backup::storage::local::LocalFolder;
    use chrono::NaiveDate;
    use database::DbEngine;

    fn ctx(runner: Arc<ScriptedRunner>) -> RunContext {
        RunContext::builder()
            .today(NaiveDate::from_ymd_opt(2024, 3, 4).unwrap())
            .runner(runner)
            .build()
    }

    fn daily(folder: &Path) -> Arc<Storage> {
        Arc::new(
            Storage::builder()
                .retention(RetentionPolicy::builder().day(Tier::All).build())
                .kind(LocalFolder::new(folder))
                .build(),
        )
    }

    fn db_action(staging: &Path, storages: Vec<Arc<Storage>>) -> Action {
        Action::builder()
            .prefix("local".into())
            .name("shop".into())
            .host(Host::local())
            .dest_folder(staging.to_path_buf())
            .storages(storages)
            .kind(DatabaseSource::new(DbEngine::MySql, Some("backup".into()), "shop", 3306))
            .build()
    }

    #[test]
    fn test_identity_and_description() {
        let action = Action::builder()
            .prefix("web1".into())
            .name("var_www".into())
            .host(Host::new("web1", None, None))
            .dest_folder("/srv/staging".into())
            .kind(FileSource::new("/var/www", vec![]))
            .build();
        assert_eq!(action.full_name(), "web1_var_www");
        assert_eq!(action.describe(), "/var/www folder on web1");
        assert!(!action.is_local());
        assert_eq!(
            action.to_string(),
            "File action web1_var_www on web1: \n  remote file: /var/www\n  exclusions: \
             \n  ssh user: Default\n  ssh key: Default\n  local destination: /srv/staging\n  \
             compression: gzip\n  storage_list: none"
        );
    }

    #[test]
    fn test_run_backup_saves_on_every_storage() {
        let dir = tempfile::tempdir().unwrap();
        let (first, second) = (dir.path().join("a"), dir.path().join("b"));
        std::fs::create_dir_all(&first).unwrap();
        std::fs::create_dir_all(&second).unwrap();
        let runner = Arc::new(ScriptedRunner::default().reply("mysqldump", "dump"));
        let action = db_action(&dir.path().join("staging"), vec![daily(&first), daily(&second)]);

        action.run_backup(&ctx(runner)).unwrap();
        assert!(first.join("20240304_local_shop.sql.gz").exists());
        assert!(second.join("20240304_local_shop.sql.gz").exists());
    }

    #[test]
    fn test_storage_failure_does_not_stop_other_storages() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good");
        std::fs::create_dir_all(&good).unwrap();
        let runner = Arc::new(ScriptedRunner::default());
        let action = db_action(
            &dir.path().join("staging"),
            vec![daily(&dir.path().join("missing")), daily(&good)],
        );

        let error = action.run_backup(&ctx(runner)).unwrap_err();
        assert!(error.to_string().contains("Unable to save on local folder"));
        assert!(good.join("20240304_local_shop.sql.gz").exists());
    }

    #[test]
    fn test_storages_not_wanting_today_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let weekly = Arc::new(
            Storage::builder()
                .retention(RetentionPolicy::builder().week(Tier::All).build())
                .kind(LocalFolder::new(dir.path().join("missing")))
                .build(),
        );
        let runner = Arc::new(ScriptedRunner::default());
        let action = db_action(&dir.path().join("staging"), vec![weekly]);
        let ctx = RunContext::builder()
            .today(NaiveDate::from_ymd_opt(2024, 3, 5).unwrap())
            .runner(runner)
            .build();
        assert!(action.run_backup(&ctx).is_ok());
    }

    #[test]
    fn test_fetch_failure_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good");
        std::fs::create_dir_all(&good).unwrap();
        let runner = Arc::new(ScriptedRunner::default().fail("mysqldump", "access denied"));
        let action = db_action(&dir.path().join("staging"), vec![daily(&good)]);

        assert!(action.run_backup(&ctx(runner)).is_err());
        assert_eq!(std::fs::read_dir(&good).unwrap().count(), 0);
    }

    #[test]
    fn test_check_dest_access_accumulates() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();
        let action = db_action(
            &blocker.join("staging"),
            vec![daily(&blocker.join("history")), daily(dir.path())],
        );
        let errors = action.check_dest_access(&ctx(Arc::new(ScriptedRunner::default())));
        assert_eq!(errors.len(), 2);
    }
}
