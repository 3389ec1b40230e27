use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::AddMsg;
use getset::Getters;
use ini::{Ini, WriteOption};
use std::path::{Path, PathBuf};

static SECTION: &str = "glacier";

/// Side file mapping archive names to the ids the vault assigned them.
///
/// An INI file with one `[glacier]` section of `<archive name> = <id>`
/// lines. Read-modify-write on every change; only one process may write it.
#[derive(Clone, Debug, PartialEq, Eq, Getters)]
#[getset(get = "pub")]
pub struct ArchiveIndex {
    path: PathBuf,
}

impl ArchiveIndex {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    fn load(&self) -> Result<Ini> {
        if !self.path.exists() {
            return Ok(Ini::new());
        }
        Ini::load_from_file(&self.path)
            .map_err(Error::from)
            .add_msg(format!("Unable to read archive index {:?}", self.path))
    }

    fn store(&self, index: &Ini) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let option = WriteOption {
            kv_separator: " = ",
            ..Default::default()
        };
        index
            .write_to_file_opt(&self.path, option)
            .map_err(Error::from)
            .add_msg(format!("Unable to write archive index {:?}", self.path))
    }

    /// Archive names, sorted.
    pub fn names(&self) -> Result<Vec<String>> {
        let index = self.load()?;
        let mut names: Vec<String> = index
            .section(Some(SECTION))
            .map(|section| section.iter().map(|(name, _)| name.to_string()).collect())
            .unwrap_or_else(Vec::new);
        names.sort();
        names.dedup();
        Ok(names)
    }

    pub fn archive_id(&self, name: &str) -> Result<Option<String>> {
        Ok(self.load()?.get_from(Some(SECTION), name).map(str::to_string))
    }

    pub fn record(&self, name: &str, archive_id: &str) -> Result<()> {
        let mut index = self.load()?;
        index.with_section(Some(SECTION)).set(name, archive_id);
        self.store(&index)
    }

    pub fn forget(&self, name: &str) -> Result<()> {
        if !self.path.exists() {
            return Ok(());
        }
        let mut index = self.load()?;
        if index.delete_from(Some(SECTION), name).is_some() {
            self.store(&index)?;
        }
        Ok(())
    }
}

/// Expands a leading `~/` using `$HOME`.
pub fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), std::env::var_os("HOME")) {
        (Some(rest), Some(home)) => Path::new(&home).join(rest),
        _ => PathBuf::from(path),
    }
}
