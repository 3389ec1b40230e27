use crate::backup::action::host::Host;
use crate::backup::action::Artifact;
use crate::backup::command::{shell_quote, CommandLine};
use crate::backup::compress::Compression;
use crate::backup::context::RunContext;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::AddMsg;
use crate::backup::tar::pack_directory;
use getset::Getters;
use itertools::Itertools;
use std::path::Path;

static BACKUP_DATE_MARKER: &str = ".backup_date";

/// A folder mirrored with rsync, then packed into a tarball.
#[derive(Clone, Debug, PartialEq, Eq, Getters)]
#[getset(get = "pub")]
pub struct FileSource {
    folder: String,
    exclusions: Vec<String>,
}

impl FileSource {
    pub fn new(folder: impl Into<String>, exclusions: Vec<String>) -> Self {
        Self {
            folder: folder.into(),
            exclusions,
        }
    }

    pub fn describe(&self, host: &Host) -> String {
        format!("{} folder on {}", self.folder, host.server())
    }

    /// Exclusion relative to the source folder, as rsync expects it.
    fn relative_exclusion<'a>(&self, exclusion: &'a str) -> &'a str {
        exclusion
            .strip_prefix(self.folder.as_str())
            .unwrap_or(exclusion)
            .trim_start_matches('/')
    }

    fn find_unreadable(&self) -> CommandLine {
        let mut find = CommandLine::new("find").arg(self.folder.as_str());
        for exclusion in &self.exclusions {
            find = find.args(["-not", "(", "-path", exclusion.as_str(), "-prune", ")"]);
        }
        find.args(["-not", "-readable", "-not", "-type", "l"])
    }

    pub fn check_access(&self, ctx: &RunContext, host: &Host) -> Vec<String> {
        if let Err(e) = host.check_connection(ctx.runner().as_ref()) {
            return vec![format!("Unable to connect to server {}: {e}", host.server())];
        }
        let command = host.wrap(self.find_unreadable());
        match ctx.runner().output(&command) {
            Ok(out) if out.trim().is_empty() => vec![],
            Ok(out) => {
                let details = format!(
                    "Command: {command}\nFiles:\n{}",
                    indent::indent_all_with("  ", out.trim())
                );
                vec![format!(
                    "Unable to read some files in folder {} on {}: \n{}",
                    self.folder,
                    host.description(),
                    indent::indent_all_with("  ", details).trim_end()
                )]
            }
            Err(e) => vec![format!(
                "Unable to read folder {} on {}: {e}",
                self.folder,
                host.description()
            )],
        }
    }

    fn rsync(&self, host: &Host, dest: &Path) -> CommandLine {
        let mut rsync = CommandLine::new("rsync").args(["--delete", "-a"]);
        if !host.is_local() {
            rsync = rsync.args([
                "-e".to_string(),
                host.ssh().words().map(shell_quote).join(" "),
            ]);
        }
        let source = if host.is_local() {
            self.folder.clone()
        } else {
            format!("{}:{}", host.destination(), self.folder)
        };
        rsync
            .args(
                self.exclusions
                    .iter()
                    .map(|e| format!("--exclude={}", self.relative_exclusion(e))),
            )
            .arg(source)
            .arg(dest.to_string_lossy())
    }

    pub fn fetch(
        &self,
        ctx: &RunContext,
        host: &Host,
        staging: &Path,
        full_name: &str,
        compression: Compression,
    ) -> Result<Artifact> {
        let dest = staging.join(full_name);
        std::fs::create_dir_all(&dest)
            .map_err(Error::from)
            .add_msg(format!("Unable to create staging folder {:?}", dest))?;

        ctx.runner().output(&self.rsync(host, &dest))?;
        std::fs::write(dest.join(BACKUP_DATE_MARKER), ctx.today().to_string())?;
        tracing::info!("{}:   data fetched", self.describe(host));

        tracing::info!("{}:   compressing data...", self.describe(host));
        let archive = pack_directory(staging, full_name, compression)?;
        tracing::info!("{}:   data compressed", self.describe(host));
        Ok(Artifact::scratch(archive, compression.extension()))
    }

    pub fn details(&self) -> String {
        format!(
            "remote file: {}\nexclusions: {}",
            self.folder,
            self.exclusions.iter().map(|e| shell_quote(e)).join(", ")
        )
    }
}
