//! `report` descriptors turned into report targets.

use crate::backup::config::node::{normalize_key, normalize_keys, repr, to_list};
use crate::backup::report::file::FileReport;
use crate::backup::report::render::Template;
use crate::backup::report::smtp::{SmtpReport, SmtpSettings};
use crate::backup::report::syslog::SyslogReport;
use crate::backup::report::webhook::{WebhookReport, WebhookSettings};
use crate::backup::report::ReportTarget;
use crate::backup::result_error::error::ConfigError;
use serde::de::DeserializeOwned;
use serde_yml::{Mapping, Value};
use std::path::{Path, PathBuf};
use validator::Validate;

type Result<T> = std::result::Result<T, ConfigError>;

fn invalid(msg: String) -> ConfigError {
    ConfigError::Invalid(msg)
}

/// One descriptor can give several targets of the same kind.
pub fn parse_report(descriptor: Value, base_dir: &Path) -> Result<Vec<ReportTarget>> {
    match descriptor {
        Value::String(kind) if kind.trim().eq_ignore_ascii_case("syslog") => {
            Ok(vec![SyslogReport::default().into()])
        }
        Value::Mapping(mapping) if mapping.len() == 1 => {
            let Some((key, data)) = mapping.into_iter().next() else {
                return Ok(vec![]);
            };
            let kind = normalize_key(&key).unwrap_or_default();
            let parse: fn(Value, &Path) -> Result<ReportTarget> = match kind.as_str() {
                "email" => parse_email,
                "file" => parse_file,
                "syslog" => parse_syslog,
                "webhook" => parse_webhook,
                _ => return Err(invalid(format!("Unknown report type {kind}"))),
            };
            to_list(data)
                .into_iter()
                .map(|data| parse(data, base_dir))
                .collect()
        }
        other => Err(invalid(format!(
            "Invalid report configuration: {}",
            repr(&other)
        ))),
    }
}

fn template(base_dir: &Path, name: Option<&String>) -> Result<Option<Template>> {
    name.map(|name| Template::load(base_dir, name)).transpose()
}

/// Deserializes then validates typed settings.
fn settings<T: DeserializeOwned + Validate>(value: Mapping, kind: &str) -> Result<T> {
    let settings: T = serde_yml::from_value(Value::Mapping(value))
        .map_err(|e| invalid(format!("Invalid {kind} report configuration: {e}")))?;
    settings
        .validate()
        .map_err(|e| invalid(format!("Invalid {kind} report configuration: {e}")))?;
    Ok(settings)
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.is_empty(),
        Value::Sequence(items) => items.is_empty(),
        Value::Mapping(mapping) => mapping.is_empty(),
        _ => false,
    }
}

fn parse_email(data: Value, base_dir: &Path) -> Result<ReportTarget> {
    let config = match data {
        Value::String(_) | Value::Sequence(_) => Mapping::from_iter([(Value::from("to"), data)]),
        Value::Mapping(mapping) => normalize_keys(mapping),
        other => {
            return Err(invalid(format!(
                "Invalid email configuration for report: {}",
                repr(&other)
            )))
        }
    };
    if !config.contains_key("to") {
        return Err(invalid(
            "Missing 'to' parameter for email report configuration".to_string(),
        ));
    }
    let config = config
        .into_iter()
        .filter(|(key, value)| key.as_str() == Some("to") || !is_blank(value))
        .collect();

    let settings: SmtpSettings = settings(config, "email")?;
    let template = template(base_dir, settings.template().as_ref())?;
    Ok(SmtpReport::new(settings, template).into())
}

fn file_names(value: Value, key: &str) -> Result<Vec<String>> {
    to_list(value)
        .into_iter()
        .map(|name| match name {
            Value::String(name) => Ok(name),
            other => Err(invalid(format!(
                "Invalid {key} field for file report configuration: {}",
                repr(&other)
            ))),
        })
        .collect()
}

fn parse_file(data: Value, base_dir: &Path) -> Result<ReportTarget> {
    let mut names = Vec::new();
    let mut template_name = None;
    match data {
        Value::String(_) | Value::Sequence(_) => names = file_names(data, "file")?,
        Value::Mapping(mapping) => {
            for (key, value) in normalize_keys(mapping) {
                let key = key.as_str().unwrap_or_default().to_string();
                match key.as_str() {
                    "output" | "filename" | "file" => names.extend(file_names(value, &key)?),
                    "template" => match value {
                        Value::String(name) => template_name = Some(name),
                        other => {
                            return Err(invalid(format!(
                                "Invalid template field for file report configuration: {}",
                                repr(&other)
                            )))
                        }
                    },
                    _ => {
                        return Err(invalid(format!(
                            "Unknown {key} field for file report configuration"
                        )))
                    }
                }
            }
        }
        other => {
            return Err(invalid(format!(
                "Invalid file report configuration: {}",
                repr(&other)
            )))
        }
    }
    if names.is_empty() {
        return Err(invalid(
            "Missing output field for file report configuration".to_string(),
        ));
    }
    let files = names
        .into_iter()
        .map(|name| base_dir.join(name))
        .collect::<Vec<PathBuf>>();
    let template = template(base_dir, template_name.as_ref())?;
    Ok(FileReport::new(files, template).into())
}

fn parse_syslog(data: Value, base_dir: &Path) -> Result<ReportTarget> {
    let template_name = match data {
        Value::Null => None,
        Value::String(name) => Some(name),
        Value::Mapping(mapping) => {
            let mut template_name = None;
            for (key, value) in normalize_keys(mapping) {
                match (key.as_str(), value) {
                    (Some("template"), Value::String(name)) => template_name = Some(name),
                    (Some("template"), other) => {
                        return Err(invalid(format!(
                            "Invalid template field for syslog reporting: {}",
                            repr(&other)
                        )))
                    }
                    (_, _) => {
                        return Err(invalid(format!(
                            "Invalid param {} for syslog reporting",
                            repr(&key)
                        )))
                    }
                }
            }
            template_name
        }
        other => {
            return Err(invalid(format!(
                "Invalid syslog report configuration: {}",
                repr(&other)
            )))
        }
    };
    let template = template(base_dir, template_name.as_ref())?;
    Ok(SyslogReport::new(template).into())
}

fn parse_webhook(data: Value, _base_dir: &Path) -> Result<ReportTarget> {
    let config = match data {
        Value::String(_) | Value::Sequence(_) => Mapping::from_iter([(Value::from("url"), data)]),
        Value::Mapping(mapping) => normalize_keys(mapping),
        other => {
            return Err(invalid(format!(
                "Invalid webhook configuration for report: {}",
                repr(&other)
            )))
        }
    };
    let settings: WebhookSettings = settings(config, "webhook")?;
    Ok(WebhookReport::try_from(settings)?.into())
}
