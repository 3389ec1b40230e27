//! External command execution.
//!
//! Every data mover (rsync, database dumps, ssh probes, the aws cli) goes
//! through a [`CommandRunner`] so that actions can be exercised against a
//! scripted runner in tests.

use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::AddMsg;
use itertools::Itertools;
use std::fmt::{Display, Formatter};
use std::io::{Read, Write};
use std::process::{Command, Stdio};

/// A program and its arguments, never interpreted by a shell.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandLine {
    program: String,
    args: Vec<String>,
}

impl CommandLine {
    pub fn new<S: Into<String>>(program: S) -> Self {
        Self {
            program: program.into(),
            args: vec![],
        }
    }

    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    /// Program followed by its arguments.
    pub fn words(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.program.as_str()).chain(self.args.iter().map(String::as_str))
    }

    /// Single shell word list, as handed to a remote shell by ssh.
    pub fn to_shell_string(&self) -> String {
        self.words().map(shell_quote).join(" ")
    }
}

impl Display for CommandLine {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_shell_string())
    }
}

fn is_shell_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || "@%+=:,./-_".contains(c)
}

/// Quotes `arg` for a POSIX shell, leaving plain words untouched.
pub fn shell_quote(arg: &str) -> String {
    if arg.is_empty() {
        return "''".to_string();
    }
    if arg.chars().all(is_shell_safe) {
        return arg.to_string();
    }
    format!("'{}'", arg.replace('\'', r#"'"'"'"#))
}

pub trait CommandRunner: Send + Sync {
    /// Runs `command` to completion and returns its trimmed standard output.
    fn output(&self, command: &CommandLine) -> Result<String>;

    /// Runs `command`, copying its standard output into `sink` as it is produced.
    fn stream(&self, command: &CommandLine, sink: &mut dyn Write) -> Result<()>;
}

/// Runs commands as child processes of this one.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemRunner;

fn command_error(command: &CommandLine, code: Option<i32>, stderr: &[u8]) -> Error {
    Error::Command {
        command: command.to_shell_string(),
        code,
        stderr: String::from_utf8_lossy(stderr).trim().to_string(),
    }
}

fn spawn_error(error: std::io::Error, command: &CommandLine) -> Error {
    Error::from(error).add_msg(format!("Unable to start command {command}"))
}

impl CommandRunner for SystemRunner {
    fn output(&self, command: &CommandLine) -> Result<String> {
        tracing::debug!("Running {command}");
        let output = Command::new(command.program())
            .args(command.arguments())
            .stdin(Stdio::null())
            .output()
            .map_err(|e| spawn_error(e, command))?;

        if !output.status.success() {
            return Err(command_error(command, output.status.code(), &output.stderr));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn stream(&self, command: &CommandLine, sink: &mut dyn Write) -> Result<()> {
        tracing::debug!("Streaming {command}");
        let mut child = Command::new(command.program())
            .args(command.arguments())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| spawn_error(e, command))?;

        let stderr_reader = child.stderr.take().map(|mut stderr| {
            std::thread::spawn(move || {
                let mut buf = Vec::new();
                let _ = stderr.read_to_end(&mut buf);
                buf
            })
        });

        let copied = match child.stdout.take() {
            Some(mut stdout) => std::io::copy(&mut stdout, sink).map(|_| ()),
            None => Ok(()),
        };
        let status = child.wait()?;
        let stderr = stderr_reader
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();

        if !status.success() {
            return Err(command_error(command, status.code(), &stderr));
        }
        copied?;
        Ok(())
    }
}
