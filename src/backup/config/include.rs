//! `include` directives: a mapping key or an `include <pattern>` string,
//! replaced by the merged content of every matching document.

use crate::backup::config::merge::deep_merge;
use crate::backup::config::node::{repr, to_list};
use crate::backup::result_error::error::ConfigError;
use globset::GlobBuilder;
use regex::Regex;
use serde_yml::{Mapping, Value};
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;
use walkdir::WalkDir;

static INCLUDE_DIRECTIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^include\s+(\S.*)$")
        .unwrap_or_else(|e| unreachable!("invalid include directive pattern: {e}"))
});

const MAX_INCLUDE_DEPTH: usize = 32;

/// Reads and parses one YAML (or JSON) document.
pub fn read_document(path: &Path) -> Result<Value, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_yml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Expands every include directive of `value`, read from `config_file`.
pub fn expand_includes(value: Value, config_file: &Path) -> Result<Value, ConfigError> {
    expand(value, config_file, 0)
}

fn base_dir(config_file: &Path) -> &Path {
    config_file.parent().unwrap_or(Path::new("/"))
}

fn expand(value: Value, config_file: &Path, depth: usize) -> Result<Value, ConfigError> {
    match value {
        Value::Sequence(items) => items
            .into_iter()
            .try_fold(Value::Sequence(vec![]), |merged, item| {
                Ok(deep_merge(merged, expand(item, config_file, depth)?))
            }),
        Value::Mapping(mapping) => {
            let mut directive = None;
            let mut result = Mapping::new();
            for (key, value) in mapping {
                if key.as_str() == Some("include") {
                    directive = Some(value);
                } else {
                    result.insert(key, expand(value, config_file, depth)?);
                }
            }
            match directive {
                None => Ok(Value::Mapping(result)),
                Some(patterns) => {
                    let included = include_all(patterns, config_file, depth)?;
                    if result.is_empty() {
                        Ok(included)
                    } else {
                        Ok(deep_merge(Value::Mapping(result), included))
                    }
                }
            }
        }
        Value::String(text) => match INCLUDE_DIRECTIVE.captures(&text) {
            Some(caps) => include(caps[1].trim(), config_file, depth),
            None => Ok(Value::String(text)),
        },
        other => Ok(other),
    }
}

fn include_all(patterns: Value, config_file: &Path, depth: usize) -> Result<Value, ConfigError> {
    to_list(patterns)
        .into_iter()
        .try_fold(Value::Null, |merged, pattern| match pattern.as_str() {
            Some(pattern) => Ok(deep_merge(merged, include(pattern, config_file, depth)?)),
            None => Err(ConfigError::invalid(format!(
                "Invalid include directive in {:?}: {}",
                config_file,
                repr(&pattern)
            ))),
        })
}

fn include(pattern: &str, config_file: &Path, depth: usize) -> Result<Value, ConfigError> {
    if depth >= MAX_INCLUDE_DEPTH {
        return Err(ConfigError::invalid(format!(
            "Too many nested includes while including {pattern} from {config_file:?}"
        )));
    }
    let files = glob_files(pattern, base_dir(config_file))?;
    if files.is_empty() {
        tracing::warn!("No file matching include pattern {pattern} from {config_file:?}");
    }
    files.into_iter().try_fold(Value::Null, |merged, file| {
        tracing::debug!("Including {file:?}");
        let document = read_document(&file)?;
        Ok(deep_merge(merged, expand(document, &file, depth + 1)?))
    })
}

fn has_glob_meta(component: &str) -> bool {
    component.contains(['*', '?', '[', '{'])
}

/// Files matching `pattern` relative to `base_dir`, in lexical order.
///
/// `*` does not cross directory separators, `**` does. Only the part of
/// `pattern` from its first wildcard component is a glob; `base_dir` and
/// the literal components before it are taken as is.
pub fn glob_files(pattern: &str, base_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let mut root = base_dir.to_path_buf();
    let mut glob_components = Vec::new();
    for component in Path::new(pattern).components() {
        let text = component.as_os_str().to_string_lossy();
        if glob_components.is_empty() && !has_glob_meta(&text) {
            root.push(component);
        } else if !matches!(component, Component::CurDir) {
            glob_components.push(text.into_owned());
        }
    }

    if glob_components.is_empty() {
        return Ok(if root.is_file() { vec![root] } else { vec![] });
    }

    let matcher = GlobBuilder::new(&glob_components.join("/"))
        .literal_separator(true)
        .build()
        .map_err(|e| ConfigError::invalid(format!("Invalid include pattern {pattern}: {e}")))?
        .compile_matcher();
    let remaining = glob_components.len();

    let mut walk = WalkDir::new(&root).min_depth(1).follow_links(true);
    if !pattern.contains("**") {
        walk = walk.max_depth(remaining);
    }

    let mut files = Vec::new();
    for entry in walk {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => break,
            Err(e) => {
                return Err(ConfigError::Read {
                    path: e.path().map_or_else(|| root.clone(), Path::to_path_buf),
                    source: e.into(),
                })
            }
        };
        let matched = entry
            .path()
            .strip_prefix(&root)
            .is_ok_and(|relative| matcher.is_match(relative));
        if entry.file_type().is_file() && matched {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn yaml(text: &str) -> Value {
        serde_yml::from_str(text).unwrap()
    }

    #[test]
    fn test_glob_files_in_lexical_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("servers/deep")).unwrap();
        fs::write(dir.path().join("servers/b.yml"), "").unwrap();
        fs::write(dir.path().join("servers/a.yml"), "").unwrap();
        fs::write(dir.path().join("servers/notes.txt"), "").unwrap();
        fs::write(dir.path().join("servers/deep/c.yml"), "").unwrap();

        let files = glob_files("servers/*.yml", dir.path()).unwrap();
        assert_eq!(
            files,
            vec![dir.path().join("servers/a.yml"), dir.path().join("servers/b.yml")]
        );
        assert_eq!(glob_files("servers/**/*.yml", dir.path()).unwrap().len(), 3);
        assert_eq!(glob_files("servers/a.yml", dir.path()).unwrap().len(), 1);
        assert!(glob_files("missing/*.yml", dir.path()).unwrap().is_empty());
    }

    #[test]
    fn test_glob_files_under_directory_with_wildcard_characters() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("conf [prod] {eu}*?");
        fs::create_dir_all(base.join("servers")).unwrap();
        fs::write(base.join("servers/web.yml"), "").unwrap();
        fs::write(base.join("servers/db.yml"), "").unwrap();

        assert_eq!(
            glob_files("servers/*.yml", &base).unwrap(),
            vec![base.join("servers/db.yml"), base.join("servers/web.yml")]
        );
        assert_eq!(glob_files("servers/web.yml", &base).unwrap().len(), 1);
    }

    #[test]
    fn test_include_key_merges_with_siblings() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("web.yml"), "web1: {files: /var/www}").unwrap();
        fs::write(dir.path().join("db.yml"), "db1: {databases: 'mysql:3306:shop'}").unwrap();
        let config = dir.path().join("backup.config");

        let expanded = expand_includes(
            yaml("{dest_folder: /srv, include: '*.yml'}"),
            &config,
        )
        .unwrap();
        assert_eq!(
            expanded,
            yaml("{dest_folder: /srv, db1: {databases: 'mysql:3306:shop'}, web1: {files: /var/www}}")
        );
    }

    #[test]
    fn test_include_string_in_sequence() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("reports.yml"), "[syslog, {file: /tmp/r.log}]").unwrap();
        let config = dir.path().join("backup.config");

        let expanded = expand_includes(yaml("report: [include reports.yml, {email: a@b.c}]"), &config)
            .unwrap();
        assert_eq!(
            expanded,
            yaml("report: [syslog, {file: /tmp/r.log}, {email: a@b.c}]")
        );
    }

    #[test]
    fn test_nested_include_is_relative_to_including_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("conf/parts")).unwrap();
        fs::write(dir.path().join("conf/main.yml"), "include: parts/*.yml").unwrap();
        fs::write(dir.path().join("conf/parts/web.yml"), "web1: {prefix: www}").unwrap();
        let config = dir.path().join("backup.config");

        let expanded = expand_includes(yaml("include conf/main.yml"), &config).unwrap();
        assert_eq!(expanded, yaml("web1: {prefix: www}"));
    }

    #[test]
    fn test_no_match_yields_null() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("backup.config");
        assert_eq!(
            expand_includes(yaml("{include: 'absent/*.yml'}"), &config).unwrap(),
            Value::Null
        );
        assert_eq!(
            expand_includes(yaml("including nothing"), &config).unwrap(),
            yaml("including nothing")
        );
    }

    #[test]
    fn test_unparsable_include_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("bad.yml"), "a: [unclosed").unwrap();
        let config = dir.path().join("backup.config");
        assert!(matches!(
            expand_includes(yaml("include bad.yml"), &config),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_include_cycle_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("loop.yml"), "include loop.yml").unwrap();
        let config = dir.path().join("backup.config");
        assert!(expand_includes(yaml("include loop.yml"), &config).is_err());
    }
}
