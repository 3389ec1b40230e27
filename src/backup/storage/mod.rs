//! Where packaged archives end up.
//!
//! Archives are named `YYYYMMDD_<full_name>.<ext>`. Anything else found in a
//! storage is not managed by this tool and is left untouched.

pub mod archival;
pub mod index;
pub mod local;

use crate::backup::context::RunContext;
use crate::backup::result_error::result::Result;
use crate::backup::retention::RetentionPolicy;
use archival::GlacierVault;
use bon::Builder;
use chrono::NaiveDate;
use derive_more::From;
use getset::Getters;
use local::LocalFolder;
use std::fmt::{Display, Formatter};
use std::path::Path;

pub fn archive_name(date: NaiveDate, full_name: &str, extension: &str) -> String {
    format!("{}_{}.{}", date.format("%Y%m%d"), full_name, extension)
}

/// A file name following the managed archive layout.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArchiveName {
    date: NaiveDate,
    rest: String,
}

impl ArchiveName {
    /// Parses the last path segment of `archive`.
    pub fn parse(archive: &str) -> Option<Self> {
        let file_name = Path::new(archive).file_name()?.to_str()?;
        let date = file_name.get(..8)?;
        let rest = file_name.get(8..)?.strip_prefix('_')?;
        if rest.is_empty() || !date.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let date = NaiveDate::parse_from_str(date, "%Y%m%d").ok()?;
        Some(Self {
            date,
            rest: rest.to_string(),
        })
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn belongs_to(&self, full_name: &str) -> bool {
        self.rest
            .strip_prefix(full_name)
            .is_some_and(|ext| ext.starts_with('.'))
    }
}

/// Keeps archives matching `full_name`, or every managed archive when `None`.
pub(crate) fn is_listed(archive: &str, full_name: Option<&str>) -> bool {
    match ArchiveName::parse(archive) {
        None => false,
        Some(name) => full_name.map_or(true, |full_name| name.belongs_to(full_name)),
    }
}

/// Operations every storage backend provides.
pub trait ArchiveStore {
    /// Copies `source` into the storage under today's archive name.
    fn save(&self, ctx: &RunContext, source: &Path, full_name: &str, extension: &str) -> Result<()>;

    /// Managed archives, optionally restricted to one action.
    fn list_archives(&self, ctx: &RunContext, full_name: Option<&str>) -> Result<Vec<String>>;

    fn remove(&self, ctx: &RunContext, archive: &str) -> Result<()>;

    /// Human readable problems preventing writes, empty when writable.
    fn check_writable(&self, ctx: &RunContext) -> Vec<String>;

    fn describe(&self) -> String;
}

#[derive(Clone, Debug, From)]
pub enum StorageKind {
    Local(LocalFolder),
    Archival(GlacierVault),
}

impl ArchiveStore for StorageKind {
    fn save(&self, ctx: &RunContext, source: &Path, full_name: &str, extension: &str) -> Result<()> {
        match self {
            StorageKind::Local(inner) => inner.save(ctx, source, full_name, extension),
            StorageKind::Archival(inner) => inner.save(ctx, source, full_name, extension),
        }
    }

    fn list_archives(&self, ctx: &RunContext, full_name: Option<&str>) -> Result<Vec<String>> {
        match self {
            StorageKind::Local(inner) => inner.list_archives(ctx, full_name),
            StorageKind::Archival(inner) => inner.list_archives(ctx, full_name),
        }
    }

    fn remove(&self, ctx: &RunContext, archive: &str) -> Result<()> {
        match self {
            StorageKind::Local(inner) => inner.remove(ctx, archive),
            StorageKind::Archival(inner) => inner.remove(ctx, archive),
        }
    }

    fn check_writable(&self, ctx: &RunContext) -> Vec<String> {
        match self {
            StorageKind::Local(inner) => inner.check_writable(ctx),
            StorageKind::Archival(inner) => inner.check_writable(ctx),
        }
    }

    fn describe(&self) -> String {
        match self {
            StorageKind::Local(inner) => inner.describe(),
            StorageKind::Archival(inner) => inner.describe(),
        }
    }
}

/// A backend together with the retention applied to its archives.
#[derive(Clone, Debug, Builder, Getters)]
#[getset(get = "pub")]
pub struct Storage {
    retention: RetentionPolicy,
    #[builder(into)]
    kind: StorageKind,
}

impl Storage {
    /// Whether today's snapshot is worth saving at all.
    pub fn should_save(&self, ctx: &RunContext) -> bool {
        self.retention.should_keep(ctx.today(), ctx.today())
    }

    /// Unparsable archive names are never kept.
    pub fn should_keep(&self, ctx: &RunContext, archive: &str) -> bool {
        ArchiveName::parse(archive)
            .is_some_and(|name| self.retention.should_keep(ctx.today(), name.date()))
    }
}

impl ArchiveStore for Storage {
    fn save(&self, ctx: &RunContext, source: &Path, full_name: &str, extension: &str) -> Result<()> {
        self.kind.save(ctx, source, full_name, extension)
    }

    fn list_archives(&self, ctx: &RunContext, full_name: Option<&str>) -> Result<Vec<String>> {
        self.kind.list_archives(ctx, full_name)
    }

    fn remove(&self, ctx: &RunContext, archive: &str) -> Result<()> {
        tracing::info!("Removing out of retention archive {archive} from {}", self.describe());
        self.kind.remove(ctx, archive)
    }

    fn check_writable(&self, ctx: &RunContext) -> Vec<String> {
        self.kind.check_writable(ctx)
    }

    fn describe(&self) -> String {
        self.kind.describe()
    }
}

impl Display for Storage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let (title, details) = match &self.kind {
            StorageKind::Local(folder) => (
                "Local folder storage",
                format!("folder: {}", folder.folder().display()),
            ),
            StorageKind::Archival(vault) => (
                "Aws glacier storage",
                format!(
                    "vault: {}\nindex_file: {}",
                    vault.vault_id(),
                    vault.index().path().display()
                ),
            ),
        };
        let details = format!("{details}\n{}", self.retention);
        write!(f, "{title}:\n{}", indent::indent_all_with("  ", details).trim_end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::retention::Tier;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_archive_name() {
        assert_eq!(
            archive_name(date(2024, 1, 1), "web1_app", "tgz"),
            "20240101_web1_app.tgz"
        );
    }

    #[test]
    fn test_parse_archive_name() {
        let name = ArchiveName::parse("/srv/history/20240101_web1_app.tgz").unwrap();
        assert_eq!(name.date(), date(2024, 1, 1));
        assert!(name.belongs_to("web1_app"));
        assert!(!name.belongs_to("web1"));
        assert!(!name.belongs_to("web1_ap"));

        assert!(ArchiveName::parse("bad_name.tgz").is_none());
        assert!(ArchiveName::parse("20240101stray.tgz").is_none());
        assert!(ArchiveName::parse("20240101_").is_none());
        assert!(ArchiveName::parse("20241340_web1_app.tgz").is_none());
        assert!(ArchiveName::parse("2024-101_web1_app.tgz").is_none());
    }

    #[test]
    fn test_is_listed() {
        assert!(is_listed("20240101_web1_app.tgz", None));
        assert!(is_listed("20240101_web1_app.tgz", Some("web1_app")));
        assert!(!is_listed("20240101_web1_app.tgz", Some("web1_api")));
        assert!(!is_listed("bad_name.tgz", None));
    }

    #[test]
    fn test_should_save_and_keep() {
        let ctx = RunContext::builder().today(date(2024, 3, 15)).build();
        let storage = Storage::builder()
            .retention(RetentionPolicy::builder().day(Tier::last(2)).build())
            .kind(LocalFolder::new("/srv/history"))
            .build();
        assert!(storage.should_save(&ctx));
        assert!(storage.should_keep(&ctx, "20240314_web1_app.tgz"));
        assert!(!storage.should_keep(&ctx, "20240313_web1_app.tgz"));
        assert!(!storage.should_keep(&ctx, "garbage.tgz"));

        let never = Storage::builder()
            .retention(RetentionPolicy::default())
            .kind(LocalFolder::new("/srv/history"))
            .build();
        assert!(!never.should_save(&ctx));
    }
}
