//! Syslog client: the local socket, or UDP to the local daemon when no
//! socket is available.

use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::AddMsg;
use std::io;
use std::io::Write;
use syslog::{Facility, Formatter3164, Logger, LoggerBackend};

static IDENT: &str = "backuper";
static UDP_LOCAL: &str = "127.0.0.1:0";
static UDP_SERVER: &str = "127.0.0.1:514";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Err,
    Warning,
    Info,
}

type SyslogLogger = Logger<LoggerBackend, Formatter3164>;

fn formatter() -> Formatter3164 {
    Formatter3164 {
        facility: Facility::LOG_USER,
        hostname: None,
        process: IDENT.to_string(),
        pid: std::process::id(),
    }
}

fn connect() -> std::result::Result<SyslogLogger, syslog::Error> {
    syslog::unix(formatter()).or_else(|_| syslog::udp(formatter(), UDP_LOCAL, UDP_SERVER))
}

fn log(logger: &mut SyslogLogger, severity: Severity, message: &str) -> std::result::Result<(), syslog::Error> {
    let message = message.trim_end();
    match severity {
        Severity::Err => logger.err(message),
        Severity::Warning => logger.warning(message),
        Severity::Info => logger.info(message),
    }
}

pub fn send(severity: Severity, message: &str) -> Result<()> {
    connect()
        .and_then(|mut logger| log(&mut logger, severity, message))
        .map_err(Error::from)
        .add_msg("Unable to write to syslog")
}

/// Log writer sending every formatted event as one INFO syslog message.
#[derive(Debug, Default)]
pub struct SyslogWriter {
    buffer: Vec<u8>,
}

impl Write for SyslogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let message = String::from_utf8_lossy(&self.buffer).to_string();
        self.buffer.clear();
        connect()
            .and_then(|mut logger| log(&mut logger, Severity::Info, &message))
            .map_err(io::Error::other)
    }
}

impl Drop for SyslogWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}
