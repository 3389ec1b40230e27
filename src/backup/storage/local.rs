use crate::backup::context::RunContext;
use crate::backup::probe_cache::{ProbeKey, ProbeOutcome};
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::AddMsg;
use crate::backup::storage::{archive_name, is_listed, ArchiveStore};
use getset::Getters;
use itertools::Itertools;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Archives kept in a folder of this machine.
#[derive(Clone, Debug, PartialEq, Eq, Getters)]
#[getset(get = "pub")]
pub struct LocalFolder {
    folder: PathBuf,
}

impl LocalFolder {
    pub fn new<P: Into<PathBuf>>(folder: P) -> Self {
        Self {
            folder: folder.into(),
        }
    }
}

fn write_probe_file(folder: &Path) -> Result<()> {
    std::fs::create_dir_all(folder)?;
    let mut probe = tempfile::NamedTempFile::new_in(folder)?;
    probe.write_all(b"foo bar")?;
    probe.flush()?;
    probe.close()?;
    Ok(())
}

/// Writes then removes a scratch file in `folder`, once per folder and run.
pub fn check_folder_writable(ctx: &RunContext, folder: &Path) -> Vec<String> {
    match ctx
        .probes()
        .probe(ProbeKey::Folder(folder.to_path_buf()), || write_probe_file(folder))
    {
        ProbeOutcome::Passed => vec![],
        ProbeOutcome::Failed(e) => vec![format!(
            "Unable to write to folder {}: {e}",
            folder.display()
        )],
        ProbeOutcome::PreviouslyFailed => vec![format!(
            "Unable to write to folder {} (see previous errors)",
            folder.display()
        )],
    }
}

impl ArchiveStore for LocalFolder {
    fn save(&self, ctx: &RunContext, source: &Path, full_name: &str, extension: &str) -> Result<()> {
        let dest = self
            .folder
            .join(archive_name(ctx.today(), full_name, extension));
        std::fs::copy(source, &dest)
            .map(|_| ())
            .map_err(Error::from)
            .add_msg(format!("Unable to copy {:?} to {:?}", source, dest))
    }

    fn list_archives(&self, _ctx: &RunContext, full_name: Option<&str>) -> Result<Vec<String>> {
        let mut archives = vec![];
        for entry in std::fs::read_dir(&self.folder)
            .map_err(Error::from)
            .add_msg(format!("Unable to list folder {:?}", self.folder))?
        {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let path = entry.path().to_string_lossy().to_string();
            if is_listed(&path, full_name) {
                archives.push(path);
            }
        }
        Ok(archives.into_iter().sorted().collect())
    }

    fn remove(&self, _ctx: &RunContext, archive: &str) -> Result<()> {
        let path = Path::new(archive);
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.folder.join(path)
        };
        std::fs::remove_file(&path)
            .map_err(Error::from)
            .add_msg(format!("Unable to remove {:?}", path))
    }

    fn check_writable(&self, ctx: &RunContext) -> Vec<String> {
        check_folder_writable(ctx, &self.folder)
    }

    fn describe(&self) -> String {
        format!("local folder {}", self.folder.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::probe_cache::ProbeState;
    use chrono::NaiveDate;

    fn ctx() -> RunContext {
        RunContext::builder()
            .today(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
            .build()
    }

    #[test]
    fn test_list_archives_ignores_unmanaged_files() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["20240101_web1_app.tgz", "bad_name.tgz", "20240101stray.tgz"] {
            std::fs::write(dir.path().join(name), "x").unwrap();
        }
        std::fs::create_dir(dir.path().join("20240102_web1_app.tgz")).unwrap();

        let storage = LocalFolder::new(dir.path());
        let archives = storage.list_archives(&ctx(), None).unwrap();
        assert_eq!(archives.len(), 1);
        assert!(archives[0].ends_with("20240101_web1_app.tgz"));
    }

    #[test]
    fn test_list_archives_by_full_name() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["20240101_web1_app.tgz", "20240101_web1_application.tgz", "20231231_web1_app.tgz"] {
            std::fs::write(dir.path().join(name), "x").unwrap();
        }
        let storage = LocalFolder::new(dir.path());
        let archives = storage.list_archives(&ctx(), Some("web1_app")).unwrap();
        assert_eq!(archives.len(), 2);
        assert!(archives[0].ends_with("20231231_web1_app.tgz"));
    }

    #[test]
    fn test_save_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("staged.tgz");
        std::fs::write(&source, "archive").unwrap();
        let history = dir.path().join("history");
        std::fs::create_dir(&history).unwrap();

        let storage = LocalFolder::new(&history);
        storage.save(&ctx(), &source, "web1_app", "tgz").unwrap();
        let saved = history.join("20240101_web1_app.tgz");
        assert_eq!(std::fs::read_to_string(&saved).unwrap(), "archive");

        storage
            .remove(&ctx(), saved.to_string_lossy().as_ref())
            .unwrap();
        assert!(!saved.exists());
    }

    #[test]
    fn test_check_writable_probes_once() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx();
        let storage = LocalFolder::new(dir.path().join("created"));
        let key = ProbeKey::Folder(dir.path().join("created"));

        assert_eq!(ctx.probes().state(&key), ProbeState::Untested);
        assert!(storage.check_writable(&ctx).is_empty());
        assert_eq!(ctx.probes().state(&key), ProbeState::Success);
        assert!(storage.check_writable(&ctx).is_empty());
        assert!(std::fs::read_dir(dir.path().join("created"))
            .unwrap()
            .next()
            .is_none());
    }

    #[test]
    fn test_check_writable_failure_is_cached() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "not a folder").unwrap();
        let ctx = ctx();
        let storage = LocalFolder::new(blocker.join("sub"));

        let first = storage.check_writable(&ctx);
        assert_eq!(first.len(), 1);
        assert!(first[0].starts_with("Unable to write to folder"));
        assert!(!first[0].contains("see previous errors"));

        let second = storage.check_writable(&ctx);
        assert_eq!(second.len(), 1);
        assert!(second[0].ends_with("(see previous errors)"));
    }
}
