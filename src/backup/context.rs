use crate::backup::command::{CommandRunner, SystemRunner};
use crate::backup::probe_cache::WriteProbeCache;
use crate::backup::storage::archival::{AwsCliVaultClient, VaultClient};
use bon::Builder;
use chrono::{NaiveDate, Utc};
use getset::{CopyGetters, Getters};
use std::sync::Arc;

/// State shared by every operation of one invocation.
///
/// `today` is captured once so that a run crossing midnight names and
/// prunes archives consistently.
#[derive(Builder, Getters, CopyGetters)]
pub struct RunContext {
    #[builder(default = Utc::now().date_naive())]
    #[getset(get_copy = "pub")]
    today: NaiveDate,
    #[builder(default)]
    #[getset(get = "pub")]
    probes: WriteProbeCache,
    #[builder(default = Arc::new(SystemRunner))]
    #[getset(get = "pub")]
    runner: Arc<dyn CommandRunner>,
    #[builder(default = Arc::new(AwsCliVaultClient::new(Arc::new(SystemRunner))))]
    #[getset(get = "pub")]
    vault: Arc<dyn VaultClient>,
}

impl RunContext {
    /// Context backed by real processes and the aws cli.
    pub fn system() -> Self {
        Self::builder().build()
    }
}
