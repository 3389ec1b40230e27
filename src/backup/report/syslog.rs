use crate::backup::report::render::{content, describe_template, Template};
use crate::backup::report::{Report, ReportSink};
use crate::backup::result_error::result::Result;
use crate::backup::syslog::{send, Severity};
use getset::Getters;
use std::fmt::{Display, Formatter};

/// Logs the report to the local syslog daemon.
#[derive(Clone, Debug, Default, Getters)]
#[getset(get = "pub")]
pub struct SyslogReport {
    template: Option<Template>,
}

impl SyslogReport {
    pub fn new(template: Option<Template>) -> Self {
        Self { template }
    }

    pub fn severity(report: &Report) -> Severity {
        if report.issue_count() > 0 {
            Severity::Err
        } else if report.warning_count() > 0 {
            Severity::Warning
        } else {
            Severity::Info
        }
    }
}

impl ReportSink for SyslogReport {
    fn send(&self, report: &Report) -> Result<()> {
        send(
            Self::severity(report),
            &content(report, self.template.as_ref()),
        )
    }
}

impl Display for SyslogReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Syslog report target: \n{}",
            indent::indent_all_with("  ", describe_template(self.template.as_ref())).trim_end()
        )
    }
}
