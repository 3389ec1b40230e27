use crate::backup::command::{CommandLine, CommandRunner};
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use getset::Getters;
use std::path::PathBuf;

/// Server name reserved for sources on this machine.
pub static LOCAL_SERVER: &str = "local";

static SSH_OPTIONS: [&str; 10] = [
    "-F",
    "/dev/null",
    "-o",
    "UserKnownHostsFile=/dev/null",
    "-o",
    "StrictHostKeyChecking=no",
    "-o",
    "BatchMode=yes",
    "-o",
    "LogLevel=ERROR",
];

/// Where a backup source lives and how to reach it.
#[derive(Clone, Debug, PartialEq, Eq, Getters)]
#[getset(get = "pub")]
pub struct Host {
    server: String,
    ssh_user: Option<String>,
    ssh_key: Option<PathBuf>,
}

impl Host {
    pub fn new(server: impl Into<String>, ssh_user: Option<String>, ssh_key: Option<PathBuf>) -> Self {
        Self {
            server: server.into(),
            ssh_user,
            ssh_key,
        }
    }

    pub fn local() -> Self {
        Self::new(LOCAL_SERVER, None, None)
    }

    pub fn is_local(&self) -> bool {
        self.server == LOCAL_SERVER
    }

    /// `user@server`, or the bare server name when no user is configured.
    pub fn destination(&self) -> String {
        match &self.ssh_user {
            Some(user) => format!("{user}@{}", self.server),
            None => self.server.clone(),
        }
    }

    /// `local machine` or `server <name>`, for diagnostics.
    pub fn description(&self) -> String {
        if self.is_local() {
            "local machine".to_string()
        } else {
            format!("server {}", self.server)
        }
    }

    /// ssh invocation without the remote destination.
    pub fn ssh(&self) -> CommandLine {
        let command = CommandLine::new("ssh").args(SSH_OPTIONS);
        match &self.ssh_key {
            Some(key) => command.args([
                "-o".to_string(),
                "IdentitiesOnly=yes".to_string(),
                "-i".to_string(),
                key.to_string_lossy().to_string(),
            ]),
            None => command,
        }
    }

    /// Runs `command` on this host, through ssh when the host is remote.
    pub fn wrap(&self, command: CommandLine) -> CommandLine {
        if self.is_local() {
            command
        } else {
            self.ssh()
                .arg(self.destination())
                .arg(command.to_shell_string())
        }
    }

    pub fn check_connection(&self, runner: &dyn CommandRunner) -> Result<()> {
        if self.is_local() {
            return Ok(());
        }
        let out = runner.output(&self.wrap(CommandLine::new("echo").arg("ping_test")))?;
        if out.trim() != "ping_test" {
            return Err(Error::Check(format!("Bad output: {out}")));
        }
        Ok(())
    }
}
