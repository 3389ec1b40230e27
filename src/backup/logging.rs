//! Log destination selected on the command line.

use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::AddMsg;
use crate::backup::syslog::SyslogWriter;
use derive_more::Display;
use std::convert::Infallible;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Mutex;
use tracing::Level;

#[derive(Clone, Debug, Default, PartialEq, Eq, Display)]
pub enum LogDestination {
    #[display("stdout")]
    Stdout,
    #[default]
    #[display("stderr")]
    Stderr,
    #[display("syslog")]
    Syslog,
    #[display("{}", _0.display())]
    File(PathBuf),
}

impl FromStr for LogDestination {
    type Err = Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s {
            "stdout" => LogDestination::Stdout,
            "stderr" => LogDestination::Stderr,
            "syslog" => LogDestination::Syslog,
            path => LogDestination::File(PathBuf::from(path)),
        })
    }
}

/// Installs the global subscriber at INFO level.
pub fn init(destination: &LogDestination) -> Result<()> {
    let builder = tracing_subscriber::fmt().with_max_level(Level::INFO);
    let installed = match destination {
        LogDestination::Stdout => builder.with_writer(std::io::stdout).try_init(),
        LogDestination::Stderr => builder.with_writer(std::io::stderr).try_init(),
        LogDestination::Syslog => builder
            .with_ansi(false)
            .without_time()
            .with_writer(SyslogWriter::default)
            .try_init(),
        LogDestination::File(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(Error::from)
                .add_msg(format!("Unable to open log file {:?}", path))?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
    };
    installed
        .map_err(|e| Error::Operation(e.to_string()))
        .add_msg(format!("Unable to log to {destination}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_destination() {
        assert_eq!("stdout".parse::<LogDestination>(), Ok(LogDestination::Stdout));
        assert_eq!("syslog".parse::<LogDestination>(), Ok(LogDestination::Syslog));
        assert_eq!(
            "/var/log/backuper.log".parse::<LogDestination>(),
            Ok(LogDestination::File("/var/log/backuper.log".into()))
        );
        assert_eq!(LogDestination::default(), LogDestination::Stderr);
    }

    #[test]
    fn test_unwritable_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let destination = LogDestination::File(dir.path().join("missing/backuper.log"));
        let error = init(&destination).unwrap_err().to_string();
        assert!(error.starts_with("Unable to open log file"));
    }
}
