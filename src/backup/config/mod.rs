//! Configuration file resolution.
//!
//! The document is read as a YAML tree, include directives are expanded,
//! then top-level sections are sorted into common info, report descriptors
//! and server blocks. Every error is a [`ConfigError`] and aborts loading.

pub mod include;
pub mod merge;
pub mod node;
pub mod report;
pub mod server;

use crate::backup::action::Action;
use crate::backup::report::ReportTarget;
use crate::backup::result_error::error::ConfigError;
use getset::Getters;
use include::{expand_includes, read_document};
use itertools::Itertools;
use merge::deep_merge;
use node::{extract_keys, is_scalar, normalize_key, normalize_keys, repr, to_list};
use serde_yml::{Mapping, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Top-level keys copied into every server block.
const COMMON_SHORTCUTS: [&str; 4] = ["ssh_user", "ssh_key", "dest_folder", "db_user"];

#[derive(Debug, Getters)]
#[getset(get = "pub")]
pub struct BackupConfig {
    path: PathBuf,
    /// Every action, in declaration order.
    actions: Vec<Action>,
    report_targets: Vec<ReportTarget>,
}

impl BackupConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let path = std::fs::canonicalize(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!("Loading configuration {path:?}");
        let document = read_document(&path)?;
        let document = expand_includes(document, &path)?;
        Self::from_value(document, &path)
    }

    /// Builds the configuration from an already read document; `path` is the
    /// file it came from, used to resolve relative paths.
    pub fn from_value(document: Value, path: &Path) -> Result<Self, ConfigError> {
        let base_dir = path.parent().unwrap_or(Path::new("/"));
        let mut document = match document {
            Value::Mapping(mapping) => mapping,
            Value::Null => Mapping::new(),
            other => {
                return Err(ConfigError::invalid(format!(
                    "Invalid configuration root, expected a mapping: {}",
                    repr(&other)
                )))
            }
        };

        let shortcuts = normalize_keys(extract_keys(&mut document, &COMMON_SHORTCUTS));
        let mut common = Value::Mapping(Mapping::new());
        let mut report_descriptors = Value::Sequence(vec![]);
        let mut servers: Vec<(String, Vec<Value>)> = Vec::new();
        for (key, info) in document {
            let key = normalize_key(&key).ok_or_else(|| {
                ConfigError::invalid(format!("Invalid section name {}", repr(&key)))
            })?;
            if key.is_empty() {
                continue;
            }
            if is_scalar(&info) {
                return Err(ConfigError::invalid(format!(
                    "{key} section can't be a single value"
                )));
            }
            match key.as_str() {
                "common" | "global" => common = deep_merge(common, info),
                "report" => {
                    report_descriptors =
                        deep_merge(report_descriptors, Value::Sequence(to_list(info)))
                }
                _ => match servers.iter_mut().find(|(server, _)| *server == key) {
                    Some((_, blocks)) => blocks.extend(to_list(info)),
                    None => servers.push((key, to_list(info))),
                },
            }
        }

        let common = match deep_merge(Value::Mapping(shortcuts), common) {
            Value::Mapping(common) => normalize_keys(common),
            other => {
                return Err(ConfigError::invalid(format!(
                    "Invalid common section: {}",
                    repr(&other)
                )))
            }
        };

        let mut actions = Vec::new();
        for (server, blocks) in servers {
            for block in blocks {
                actions.extend(server::parse_block(&server, &common, block, base_dir)?);
            }
        }
        check_unique_full_names(&actions)?;

        let report_targets = to_list(report_descriptors)
            .into_iter()
            .map(|descriptor| report::parse_report(descriptor, base_dir))
            .flatten_ok()
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(
            "Loaded {} actions and {} report targets",
            actions.len(),
            report_targets.len()
        );
        Ok(Self {
            path: path.to_path_buf(),
            actions,
            report_targets,
        })
    }

    /// Distinct server names, in declaration order.
    pub fn servers(&self) -> Vec<&str> {
        self.actions
            .iter()
            .map(Action::server_name)
            .unique()
            .collect()
    }

    /// Description of `targets` followed by every report target.
    pub fn show(&self, targets: &[&Action]) -> String {
        let actions = targets
            .iter()
            .map(|action| indent::indent_all_with("  ", action.to_string()).trim_end().to_string())
            .join("\n\n");
        let reports = self
            .report_targets
            .iter()
            .map(|target| indent::indent_all_with("  ", target.to_string()).trim_end().to_string())
            .join("\n\n");
        format!("Actions: \n{actions}\n\n\nReports: \n{reports}")
    }
}

fn check_unique_full_names(actions: &[Action]) -> Result<(), ConfigError> {
    let mut seen: HashMap<String, &Action> = HashMap::new();
    for action in actions {
        if let Some(first) = seen.insert(action.full_name(), action) {
            return Err(ConfigError::DuplicateFullName {
                full_name: action.full_name(),
                first: first.to_string(),
                second: action.to_string(),
            });
        }
    }
    Ok(())
}
