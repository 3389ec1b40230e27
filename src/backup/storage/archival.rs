use crate::backup::command::{CommandLine, CommandRunner};
use crate::backup::context::RunContext;
use crate::backup::probe_cache::{ProbeKey, ProbeOutcome};
use crate::backup::result_error::error::{ConfigError, Error};
use crate::backup::result_error::result::Result;
use crate::backup::result_error::AddMsg;
use crate::backup::storage::index::ArchiveIndex;
use crate::backup::storage::{archive_name, is_listed, ArchiveStore};
use getset::Getters;
use serde::Deserialize;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

static ACCESS_TEST_ARCHIVE: &str = "backup glacier access test";

/// Remote cold storage service.
pub trait VaultClient: Send + Sync {
    /// Uploads `file` and returns the id the service assigned to it.
    fn upload(&self, region: &str, vault: &str, file: &Path, description: &str) -> Result<String>;

    fn delete(&self, region: &str, vault: &str, archive_id: &str) -> Result<()>;
}

#[derive(Deserialize)]
struct UploadResponse {
    #[serde(rename = "archiveId")]
    archive_id: Option<String>,
}

/// Talks to Glacier through the `aws` command line client.
pub struct AwsCliVaultClient {
    runner: Arc<dyn CommandRunner>,
}

impl AwsCliVaultClient {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    fn aws() -> Result<String> {
        Ok(which::which("aws")
            .map_err(Error::from)
            .add_msg("Unable to find the aws command line client")?
            .to_string_lossy()
            .to_string())
    }
}

impl VaultClient for AwsCliVaultClient {
    fn upload(&self, region: &str, vault: &str, file: &Path, description: &str) -> Result<String> {
        let body = file.to_string_lossy();
        let command = CommandLine::new(Self::aws()?).args([
            "glacier",
            "upload-archive",
            "--account-id",
            "-",
            "--body",
            body.as_ref(),
            "--archive-description",
            description,
            "--region",
            region,
            "--vault-name",
            vault,
        ]);
        let response: UploadResponse = serde_json::from_str(&self.runner.output(&command)?)?;
        response
            .archive_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .ok_or_else(|| Error::Operation("Unable to start glacier upload".to_string()))
    }

    fn delete(&self, region: &str, vault: &str, archive_id: &str) -> Result<()> {
        let archive_arg = format!("--archive-id={archive_id}");
        let command = CommandLine::new(Self::aws()?).args([
            "glacier",
            "delete-archive",
            "--account-id",
            "-",
            archive_arg.as_str(),
            "--region",
            region,
            "--vault-name",
            vault,
        ]);
        self.runner.output(&command).map(|_| ())
    }
}

/// Archives uploaded to a Glacier vault, tracked by a local index file.
#[derive(Clone, Debug, PartialEq, Eq, Getters)]
#[getset(get = "pub")]
pub struct GlacierVault {
    region: String,
    name: String,
    index: ArchiveIndex,
}

impl GlacierVault {
    pub fn new(region: impl Into<String>, name: impl Into<String>, index: ArchiveIndex) -> Self {
        Self {
            region: region.into(),
            name: name.into(),
            index,
        }
    }

    /// Parses a `region:name` vault identifier.
    pub fn parse(vault: &str, index: ArchiveIndex) -> std::result::Result<Self, ConfigError> {
        match vault.split(':').collect::<Vec<_>>().as_slice() {
            [region, name] if !region.trim().is_empty() && !name.trim().is_empty() => {
                Ok(Self::new(region.trim(), name.trim(), index))
            }
            _ => Err(ConfigError::invalid(format!(
                "Invalid glacier vault {vault:?}, expected region:name"
            ))),
        }
    }

    pub fn vault_id(&self) -> String {
        format!("{}:{}", self.region, self.name)
    }

    fn upload_named(&self, ctx: &RunContext, source: &Path, archive: &str) -> Result<()> {
        let archive_id = ctx
            .vault()
            .upload(&self.region, &self.name, source, archive)?;
        self.index.record(archive, &archive_id)
    }

    fn probe_access(&self, ctx: &RunContext) -> Result<()> {
        let mut probe = tempfile::NamedTempFile::new()?;
        probe.write_all(b"foo bar")?;
        probe.flush()?;
        self.upload_named(ctx, probe.path(), ACCESS_TEST_ARCHIVE)?;
        self.remove(ctx, ACCESS_TEST_ARCHIVE)
    }
}

impl ArchiveStore for GlacierVault {
    fn save(&self, ctx: &RunContext, source: &Path, full_name: &str, extension: &str) -> Result<()> {
        self.upload_named(ctx, source, &archive_name(ctx.today(), full_name, extension))
    }

    fn list_archives(&self, _ctx: &RunContext, full_name: Option<&str>) -> Result<Vec<String>> {
        Ok(self
            .index
            .names()?
            .into_iter()
            .filter(|name| is_listed(name, full_name))
            .collect())
    }

    fn remove(&self, ctx: &RunContext, archive: &str) -> Result<()> {
        let archive_id = self.index.archive_id(archive)?.ok_or_else(|| {
            Error::Operation(format!("Unable to find glacier archive file {archive}"))
        })?;
        ctx.vault().delete(&self.region, &self.name, &archive_id)?;
        self.index.forget(archive)
    }

    fn check_writable(&self, ctx: &RunContext) -> Vec<String> {
        match ctx
            .probes()
            .probe(ProbeKey::Vault(self.vault_id()), || self.probe_access(ctx))
        {
            ProbeOutcome::Passed => vec![],
            ProbeOutcome::Failed(e) => vec![format!(
                "Unable to write to glacier vault {}: {e}",
                self.vault_id()
            )],
            ProbeOutcome::PreviouslyFailed => {
                vec![format!("Unable to write to glacier vault {}", self.vault_id())]
            }
        }
    }

    fn describe(&self) -> String {
        format!("aws glacier {}", self.vault_id())
    }
}
