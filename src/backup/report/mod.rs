//! Outcome of a run, and the channels it is delivered through.

pub mod file;
pub mod render;
pub mod smtp;
pub mod syslog;
pub mod webhook;

use crate::backup::result_error::result::Result;
use derive_more::{Display, From};
use file::FileReport;
use smtp::SmtpReport;
use std::collections::BTreeMap;
use std::fmt::Formatter;
use syslog::SyslogReport;
use webhook::WebhookReport;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum Level {
    #[display("error")]
    Error,
    #[display("warning")]
    Warning,
    #[display("success")]
    Success,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReportEntry {
    pub level: Level,
    pub message: String,
}

/// Messages of one run, grouped by server.
#[derive(Clone, Debug, Default)]
pub struct Report {
    issues: BTreeMap<String, Vec<String>>,
    warnings: BTreeMap<String, Vec<String>>,
    successes: BTreeMap<String, Vec<String>>,
}

fn push(map: &mut BTreeMap<String, Vec<String>>, server: &str, message: String) {
    map.entry(server.to_string()).or_default().push(message);
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_issue<S: Into<String>>(&mut self, server: &str, message: S) {
        push(&mut self.issues, server, message.into());
    }

    pub fn add_warning<S: Into<String>>(&mut self, server: &str, message: S) {
        push(&mut self.warnings, server, message.into());
    }

    pub fn add_success<S: Into<String>>(&mut self, server: &str, message: S) {
        push(&mut self.successes, server, message.into());
    }

    pub fn issues(&self) -> &BTreeMap<String, Vec<String>> {
        &self.issues
    }

    pub fn warnings(&self) -> &BTreeMap<String, Vec<String>> {
        &self.warnings
    }

    pub fn successes(&self) -> &BTreeMap<String, Vec<String>> {
        &self.successes
    }

    pub fn issue_count(&self) -> usize {
        self.issues.values().map(Vec::len).sum()
    }

    pub fn warning_count(&self) -> usize {
        self.warnings.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty() && self.warnings.is_empty() && self.successes.is_empty()
    }

    /// No issue, and something was reported.
    pub fn is_success(&self) -> bool {
        self.issues.is_empty() && !self.is_empty()
    }

    /// Every entry per server: issues, then warnings, then successes.
    pub fn by_server(&self) -> BTreeMap<String, Vec<ReportEntry>> {
        let mut result: BTreeMap<String, Vec<ReportEntry>> = BTreeMap::new();
        for (level, map) in [
            (Level::Error, &self.issues),
            (Level::Warning, &self.warnings),
            (Level::Success, &self.successes),
        ] {
            for (server, messages) in map {
                result
                    .entry(server.clone())
                    .or_default()
                    .extend(messages.iter().map(|message| ReportEntry {
                        level,
                        message: message.clone(),
                    }));
            }
        }
        result
    }
}

/// A delivery channel for reports.
pub trait ReportSink {
    /// Delivers `report`, which is never empty.
    fn send(&self, report: &Report) -> Result<()>;
}

#[derive(Debug, From)]
pub enum ReportTarget {
    Email(SmtpReport),
    File(FileReport),
    Syslog(SyslogReport),
    Webhook(WebhookReport),
}

impl ReportTarget {
    fn sink(&self) -> &dyn ReportSink {
        match self {
            ReportTarget::Email(inner) => inner,
            ReportTarget::File(inner) => inner,
            ReportTarget::Syslog(inner) => inner,
            ReportTarget::Webhook(inner) => inner,
        }
    }

    /// Sends `report` unless there is nothing to say.
    pub fn deliver(&self, report: &Report) -> Result<()> {
        if report.is_empty() {
            return Ok(());
        }
        self.sink().send(report)
    }
}

impl std::fmt::Display for ReportTarget {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportTarget::Email(inner) => write!(f, "{inner}"),
            ReportTarget::File(inner) => write!(f, "{inner}"),
            ReportTarget::Syslog(inner) => write!(f, "{inner}"),
            ReportTarget::Webhook(inner) => write!(f, "{inner}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_report() {
        let report = Report::new();
        assert!(report.is_empty());
        assert!(!report.is_success());
        assert_eq!(report.issue_count(), 0);
    }

    #[test]
    fn test_counts_and_success() {
        let mut report = Report::new();
        report.add_success("web1", "saved");
        report.add_warning("web1", "slow");
        assert!(report.is_success());
        assert_eq!(report.warning_count(), 1);

        report.add_issue("db1", "failed");
        report.add_issue("db1", "failed again");
        assert!(!report.is_success());
        assert_eq!(report.issue_count(), 2);
    }

    #[test]
    fn test_by_server_orders_levels() {
        let mut report = Report::new();
        report.add_success("web1", "a");
        report.add_issue("web1", "b");
        report.add_warning("web1", "c");
        report.add_success("db1", "d");

        let by_server = report.by_server();
        assert_eq!(by_server.keys().collect::<Vec<_>>(), vec!["db1", "web1"]);
        let levels: Vec<Level> = by_server["web1"].iter().map(|e| e.level).collect();
        assert_eq!(levels, vec![Level::Error, Level::Warning, Level::Success]);
        assert_eq!(by_server["web1"][0].message, "b");
    }
}
