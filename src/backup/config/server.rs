//! A server block turned into storages and actions.
//!
//! The block is the common info overlaid by the server's own keys. Storage
//! keys are consumed first, then `files`, `databases` and `db_user`. What
//! remains describes how to reach the server and where to stage data.

use crate::backup::action::database::{DatabaseSource, DbEngine};
use crate::backup::action::file::FileSource;
use crate::backup::action::host::Host;
use crate::backup::action::{Action, ActionKind};
use crate::backup::compress::Compression;
use crate::backup::config::node::{extract_keys, normalize_key, normalize_keys, repr, to_list};
use crate::backup::result_error::error::ConfigError;
use crate::backup::retention::RetentionPolicy;
use crate::backup::storage::archival::GlacierVault;
use crate::backup::storage::index::{expand_home, ArchiveIndex};
use crate::backup::storage::local::LocalFolder;
use crate::backup::storage::Storage;
use crate::backup::validate::{
    validate_absolute_path, validate_archive_base_name, validate_file_exist, validate_ssh_user,
};
use regex::Regex;
use serde_yml::{Mapping, Value};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, LazyLock};

type Result<T> = std::result::Result<T, ConfigError>;

static NON_ALPHANUMERIC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new("[^A-Za-z0-9]+").unwrap_or_else(|e| unreachable!("invalid slug pattern: {e}"))
});

static REPEATED_UNDERSCORE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new("_+").unwrap_or_else(|e| unreachable!("invalid slug pattern: {e}"))
});

const LOCAL_HISTORY: &str = "local_history";
const LOCAL_HISTORY_KEYS: [&str; 3] = [LOCAL_HISTORY, "local_history_folder", "local_history_memory"];
const AWS_GLACIER: &str = "aws_glacier";
const AWS_GLACIER_KEYS: [&str; 4] = [
    AWS_GLACIER,
    "aws_glacier_vault",
    "aws_glacier_memory",
    "aws_glacier_index_file",
];
const DEFAULT_GLACIER_INDEX: &str = "~/.glacier_index";

/// `/var/www/html` gives `var_www_html`.
pub fn slugify(text: &str) -> String {
    let slug = NON_ALPHANUMERIC.replace_all(text, "_");
    REPEATED_UNDERSCORE
        .replace_all(&slug, "_")
        .trim_matches('_')
        .to_string()
}

/// Default action name of a folder; `exclude` is reserved for exclusions.
pub fn file_slug(folder: &str) -> String {
    match slugify(folder).as_str() {
        "exclude" => "file_exclude".to_string(),
        slug => slug.to_string(),
    }
}

fn invalid(msg: String) -> ConfigError {
    ConfigError::Invalid(msg)
}

fn param_str<'a>(value: &'a Value, key: &str, server: &str) -> Result<&'a str> {
    value
        .as_str()
        .ok_or_else(|| invalid(format!("invalid '{key}' parameter for server {server}")))
}

/// Builds every action of one server block.
pub fn parse_block(server: &str, common: &Mapping, block: Value, base_dir: &Path) -> Result<Vec<Action>> {
    let block = match block {
        Value::Mapping(block) => block,
        other => {
            return Err(invalid(format!(
                "Invalid configuration for server {server}: {}",
                repr(&other)
            )))
        }
    };
    let mut info = common.clone();
    for (key, value) in normalize_keys(block) {
        info.insert(key, value);
    }

    let storages = parse_storages(&mut info, server, base_dir)?;
    let files = extract_keys(&mut info, &["files"]).remove("files");
    let databases = extract_keys(&mut info, &["databases"]).remove("databases");
    let db_user = match extract_keys(&mut info, &["db_user"]).remove("db_user") {
        None | Some(Value::Null) => None,
        Some(user) => Some(param_str(&user, "db_user", server)?.to_string()),
    };
    let settings = ActionSettings::parse(&info, server)?;

    let mut actions = Vec::new();
    if let Some(files) = files {
        let (entries, exclusions) = file_entries(files, server)?;
        for (name, folder) in entries {
            let source = file_source(folder, &exclusions, server)?;
            actions.push(settings.action(server, name, source, &storages)?);
        }
    }
    if let Some(databases) = databases {
        for (name, db_info) in database_entries(databases, server)? {
            let source = database_source(&db_info, db_user.clone(), server)?;
            actions.push(settings.action(server, name, source, &storages)?);
        }
    }
    Ok(actions)
}

/// Moves the keys of a nested `section` mapping to their flat
/// `<section>_<key>` form.
fn flatten_section(info: &mut Mapping, section: &str, allowed: &[&str], server: &str) -> Result<()> {
    let nested = match info.remove(section) {
        None => return Ok(()),
        Some(Value::Mapping(nested)) => nested,
        Some(_) => {
            return Err(invalid(format!(
                "Invalid '{section}' parameter for server {server}"
            )))
        }
    };
    let flat_prefix = format!("{section}_");
    for (key, value) in nested {
        let key = normalize_key(&key)
            .ok_or_else(|| invalid(format!("Invalid '{section}' parameter for server {server}")))?;
        let short = key.strip_prefix(&flat_prefix).unwrap_or(&key);
        if !allowed.contains(&short) {
            return Err(invalid(format!(
                "Unknown key {section}.{key} for server {server}"
            )));
        }
        info.insert(Value::from(format!("{flat_prefix}{short}")), value);
    }
    Ok(())
}

fn required<'a>(info: &'a Mapping, key: &str, missing: &str, server: &str) -> Result<&'a Value> {
    info.get(key)
        .filter(|value| !value.is_null())
        .ok_or_else(|| invalid(format!("Missing {missing} parameter for server {server}")))
}

fn retention(memory: &Value, server: &str) -> Result<RetentionPolicy> {
    RetentionPolicy::try_from(memory)
        .map_err(|e| invalid(format!("Invalid memory parameter for server {server}: {e}")))
}

fn parse_storages(info: &mut Mapping, server: &str, base_dir: &Path) -> Result<Vec<Arc<Storage>>> {
    let mut storages = Vec::new();

    let mut local = extract_keys(info, &LOCAL_HISTORY_KEYS);
    if !local.is_empty() {
        flatten_section(&mut local, LOCAL_HISTORY, &["folder", "memory"], server)?;
        let folder = required(&local, "local_history_folder", "local history folder", server)?;
        let folder = param_str(folder, "local_history_folder", server)?;
        validate_absolute_path(folder).map_err(|_| {
            invalid(format!(
                "local_history_folder for server {server} should be an absolute path"
            ))
        })?;
        let memory = required(&local, "local_history_memory", "local history memory", server)?;
        storages.push(Arc::new(
            Storage::builder()
                .retention(retention(memory, server)?)
                .kind(LocalFolder::new(folder))
                .build(),
        ));
    }

    let mut glacier = extract_keys(info, &AWS_GLACIER_KEYS);
    if !glacier.is_empty() {
        flatten_section(&mut glacier, AWS_GLACIER, &["vault", "memory", "index_file"], server)?;
        let vault = required(&glacier, "aws_glacier_vault", "aws glacier vault", server)?;
        let vault = param_str(vault, "aws_glacier_vault", server)?;
        let memory = required(&glacier, "aws_glacier_memory", "aws glacier memory", server)?;
        let index = match glacier.get("aws_glacier_index_file") {
            None | Some(Value::Null) => expand_home(DEFAULT_GLACIER_INDEX),
            Some(path) => base_dir.join(expand_home(param_str(path, "aws_glacier_index_file", server)?)),
        };
        let vault = GlacierVault::parse(vault, ArchiveIndex::new(index))
            .map_err(|e| invalid(format!("{e} for server {server}")))?;
        storages.push(Arc::new(
            Storage::builder()
                .retention(retention(memory, server)?)
                .kind(vault)
                .build(),
        ));
    }

    Ok(storages)
}

/// Settings shared by every action of a block.
#[derive(Debug, Default)]
struct ActionSettings {
    prefix: Option<String>,
    dest_folder: Option<PathBuf>,
    ssh_user: Option<String>,
    ssh_key: Option<PathBuf>,
    compression: Compression,
}

impl ActionSettings {
    fn parse(info: &Mapping, server: &str) -> Result<Self> {
        let mut settings = Self::default();
        for (key, value) in info {
            let key = normalize_key(key)
                .ok_or_else(|| invalid(format!("Invalid configuration for server {server}")))?;
            if value.is_null() {
                continue;
            }
            match key.as_str() {
                "" => {}
                "ssh_user" => {
                    let user = param_str(value, "ssh_user", server)?;
                    validate_ssh_user(user).map_err(|_| {
                        invalid(format!("invalid 'ssh_user' parameter for server {server}"))
                    })?;
                    settings.ssh_user = Some(user.to_string());
                }
                "ssh_key" => {
                    let key = param_str(value, "ssh_key", server)?;
                    validate_file_exist(key).map_err(|_| {
                        invalid(format!(
                            "no existing file for 'ssh_key' parameter for server {server}"
                        ))
                    })?;
                    settings.ssh_key = Some(PathBuf::from(key));
                }
                "prefix" => {
                    settings.prefix = Some(param_str(value, "prefix", server)?.trim_matches('_').to_string());
                }
                "dest_folder" => {
                    let folder = param_str(value, "dest_folder", server)?;
                    validate_absolute_path(folder).map_err(|_| {
                        invalid(format!(
                            "dest_folder for server {server} should be an absolute path"
                        ))
                    })?;
                    settings.dest_folder = Some(PathBuf::from(folder));
                }
                "compression" => {
                    settings.compression = Compression::from_str(param_str(value, "compression", server)?)
                        .map_err(|e| invalid(format!("{e} for server {server}")))?;
                }
                other => {
                    return Err(invalid(format!("Unknown key {other} for server {server}")));
                }
            }
        }
        Ok(settings)
    }

    fn action(
        &self,
        server: &str,
        name: String,
        kind: impl Into<ActionKind>,
        storages: &[Arc<Storage>],
    ) -> Result<Action> {
        let prefix = self
            .prefix
            .clone()
            .unwrap_or_else(|| server.trim_matches('_').to_string());
        validate_archive_base_name(&prefix)
            .map_err(|e| invalid(format!("invalid 'prefix' parameter for server {server}: {e}")))?;
        validate_archive_base_name(&name)
            .map_err(|e| invalid(format!("invalid action name for server {server}: {e}")))?;
        let dest_folder = self
            .dest_folder
            .clone()
            .ok_or_else(|| invalid(format!("Missing 'dest_folder' parameter for server {server}")))?;
        Ok(Action::builder()
            .prefix(prefix)
            .name(name)
            .host(Host::new(server, self.ssh_user.clone(), self.ssh_key.clone()))
            .dest_folder(dest_folder)
            .compression(self.compression)
            .storages(storages.to_vec())
            .kind(kind)
            .build())
    }
}

fn entry_name(key: &Value, what: &str, server: &str) -> Result<String> {
    key.as_str()
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .ok_or_else(|| invalid(format!("invalid name for {what} of server {server}: {}", repr(key))))
}

/// Named folders plus the exclusions listed under `exclude`.
fn file_entries(files: Value, server: &str) -> Result<(Vec<(String, Value)>, Vec<String>)> {
    match files {
        Value::String(folder) => Ok((vec![(file_slug(&folder), Value::String(folder))], vec![])),
        Value::Sequence(folders) => folders
            .into_iter()
            .map(|folder| match folder.as_str() {
                Some(text) => Ok((file_slug(text), folder)),
                None => Err(invalid(format!(
                    "invalid folder to backup for server {server}: {}",
                    repr(&folder)
                ))),
            })
            .collect::<Result<Vec<_>>>()
            .map(|entries| (entries, vec![])),
        Value::Mapping(mapping) => {
            let mut entries = Vec::new();
            let mut exclusions = Vec::new();
            for (key, value) in mapping {
                if key.as_str().map(str::trim) == Some("exclude") {
                    for exclusion in to_list(value) {
                        match exclusion {
                            Value::String(exclusion) => exclusions.push(exclusion),
                            Value::Null => {}
                            other => {
                                return Err(invalid(format!(
                                    "invalid exclusion for server {server}: {}",
                                    repr(&other)
                                )))
                            }
                        }
                    }
                } else {
                    entries.push((entry_name(&key, "folder", server)?, value));
                }
            }
            Ok((entries, exclusions))
        }
        other => Err(invalid(format!(
            "Invalid 'files' section for server {server}: {}",
            repr(&other)
        ))),
    }
}

fn file_source(folder: Value, exclusions: &[String], server: &str) -> Result<FileSource> {
    let folder = match folder {
        Value::Null => return Err(invalid(format!("Missing folder to backup for server {server}"))),
        Value::String(folder) => folder,
        other => {
            return Err(invalid(format!(
                "invalid folder to backup for server {server}: {}",
                repr(&other)
            )))
        }
    };
    if !folder.starts_with('/') {
        return Err(invalid(format!(
            "invalid folder to backup for server {server}: {folder}: it's not an absolute path"
        )));
    }
    let exclusions = exclusions
        .iter()
        .filter(|exclusion| exclusion.starts_with(&folder))
        .cloned()
        .collect();
    Ok(FileSource::new(folder, exclusions))
}

/// `type:port:name`, with the database name used as default action name.
struct DatabaseInfo {
    engine: DbEngine,
    port: u16,
    database: String,
}

impl DatabaseInfo {
    fn parse(info: &str, server: &str) -> Result<Self> {
        let [engine, port, database] = info.split(':').collect::<Vec<_>>()[..] else {
            return Err(invalid(format!(
                "invalid database information for server {server}: {info}"
            )));
        };
        let engine = engine.trim().to_lowercase();
        let engine = DbEngine::from_str(&engine)
            .map_err(|_| invalid(format!("invalid database type {engine} for server {server}")))?;
        let port = port
            .trim()
            .parse::<u16>()
            .ok()
            .filter(|port| *port <= 65534)
            .ok_or_else(|| invalid(format!("invalid database port for server {server}: {port}")))?;
        let database = database.trim();
        if database.is_empty() {
            return Err(invalid(format!(
                "missing database name for server {server}: {info}"
            )));
        }
        Ok(Self {
            engine,
            port,
            database: database.to_string(),
        })
    }
}

fn database_entries(databases: Value, server: &str) -> Result<Vec<(String, Value)>> {
    let unnamed = |info: Value| -> Result<(String, Value)> {
        let text = info.as_str().ok_or_else(|| {
            invalid(format!(
                "invalid database information for server {server}: {}",
                repr(&info)
            ))
        })?;
        let name = slugify(DatabaseInfo::parse(text, server)?.database.as_str());
        Ok((name, info))
    };
    match databases {
        Value::String(_) => Ok(vec![unnamed(databases)?]),
        Value::Sequence(items) => items.into_iter().map(unnamed).collect(),
        Value::Mapping(mapping) => mapping
            .into_iter()
            .map(|(key, value)| Ok((entry_name(&key, "database", server)?, value)))
            .collect(),
        other => Err(invalid(format!(
            "Invalid 'databases' section for server {server}: {}",
            repr(&other)
        ))),
    }
}

fn database_source(info: &Value, user: Option<String>, server: &str) -> Result<DatabaseSource> {
    let text = match info {
        Value::Null => {
            return Err(invalid(format!(
                "Missing database information for server {server}"
            )))
        }
        Value::String(text) => text,
        other => {
            return Err(invalid(format!(
                "invalid database information for server {server}: {}",
                repr(other)
            )))
        }
    };
    let info = DatabaseInfo::parse(text, server)?;
    Ok(DatabaseSource::new(info.engine, user, info.database, info.port))
}
