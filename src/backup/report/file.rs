use crate::backup::report::render::{content, describe_template, Template};
use crate::backup::report::{Report, ReportSink};
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::{convert_error_vec, Result};
use crate::backup::result_error::AddMsg;
use getset::Getters;
use itertools::Itertools;
use std::fmt::{Display, Formatter};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Appends the report to one or more files.
#[derive(Clone, Debug, Getters)]
#[getset(get = "pub")]
pub struct FileReport {
    files: Vec<PathBuf>,
    template: Option<Template>,
}

impl FileReport {
    pub fn new(files: Vec<PathBuf>, template: Option<Template>) -> Self {
        Self { files, template }
    }

    fn append(path: &Path, text: &str) -> Result<()> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut file| file.write_all(text.as_bytes()))
            .map_err(Error::from)
            .add_msg(format!("Unable to write report to {:?}", path))
    }
}

impl ReportSink for FileReport {
    fn send(&self, report: &Report) -> Result<()> {
        let text = format!("{}\n\n", content(report, self.template.as_ref()));
        let errors = self
            .files
            .iter()
            .filter_map(|path| Self::append(path, &text).err())
            .collect_vec();
        convert_error_vec(errors)
    }
}

impl Display for FileReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let details = format!(
            "files: {}\n{}",
            self.files.iter().map(|p| p.display()).join(", "),
            describe_template(self.template.as_ref())
        );
        write!(
            f,
            "File report target: \n{}",
            indent::indent_all_with("  ", details).trim_end()
        )
    }
}
