//! Report text, either the built-in layout or a user template.

use crate::backup::report::Report;
use crate::backup::result_error::error::ConfigError;
use regex::{Captures, Regex};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_]+)\s*\}\}")
        .unwrap_or_else(|e| unreachable!("invalid placeholder pattern: {e}"))
});

pub fn subject(report: &Report) -> String {
    if report.is_success() {
        "Backup: success".to_string()
    } else {
        format!("Backup: {} errors", report.issue_count())
    }
}

/// `N errors and M warnings`, `M warnings`, `success` or nothing.
pub fn summary(report: &Report) -> String {
    let mut summary = String::new();
    if report.issue_count() > 0 {
        summary.push_str(&format!("{} errors", report.issue_count()));
        if report.warning_count() > 0 {
            summary.push_str(" and ");
        }
    }
    if report.warning_count() > 0 {
        summary.push_str(&format!("{} warnings", report.warning_count()));
    } else if report.is_success() {
        summary.push_str("success");
    }
    summary
}

/// Per server `level: message` lines.
pub fn details(report: &Report) -> String {
    let mut details = String::new();
    for (server, entries) in report.by_server() {
        details.push_str(&format!("  {server}: \n"));
        for entry in entries {
            details.push_str(&format!("    {}: {}\n", entry.level, entry.message));
        }
    }
    details
}

pub fn default_content(report: &Report) -> String {
    format!("Backup report: {}\n{}", summary(report), details(report))
}

fn status(report: &Report) -> &'static str {
    if report.issue_count() > 0 {
        "error"
    } else if report.warning_count() > 0 {
        "warning"
    } else {
        "success"
    }
}

/// A text file with `{{ name }}` placeholders.
///
/// Known names are `subject`, `summary`, `details`, `issue_count`,
/// `warning_count` and `status`. Unknown placeholders are left untouched.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Template {
    source: PathBuf,
    body: String,
}

impl Template {
    pub fn new<P: Into<PathBuf>, S: Into<String>>(source: P, body: S) -> Self {
        Self {
            source: source.into(),
            body: body.into(),
        }
    }

    /// Reads `name`, relative to `base_dir` unless absolute.
    pub fn load(base_dir: &Path, name: &str) -> Result<Self, ConfigError> {
        let path = base_dir.join(name);
        let body = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        Ok(Self::new(path, body))
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn render(&self, report: &Report) -> String {
        PLACEHOLDER
            .replace_all(&self.body, |caps: &Captures| match &caps[1] {
                "subject" => subject(report),
                "summary" => summary(report),
                "details" => details(report),
                "issue_count" => report.issue_count().to_string(),
                "warning_count" => report.warning_count().to_string(),
                "status" => status(report).to_string(),
                _ => caps[0].to_string(),
            })
            .into_owned()
    }
}

/// Rendered body, through `template` when there is one.
pub fn content(report: &Report, template: Option<&Template>) -> String {
    match template {
        Some(template) => template.render(report),
        None => default_content(report),
    }
}

/// `template: yes` followed by the template body, or `template: no`.
pub fn describe_template(template: Option<&Template>) -> String {
    match template {
        Some(template) => format!(
            "template: yes\n{}",
            indent::indent_all_with("  ", template.body()).trim_end()
        ),
        None => "template: no".to_string(),
    }
}
