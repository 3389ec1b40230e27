use crate::backup::result_error::{AddFunctionName, AddMsg};
use itertools::Itertools;
use std::path::PathBuf;
use thiserror::Error;

/// Invalid or ambiguous configuration.
///
/// Always fatal: a run aborts before any backup action is attempted.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0}")]
    Invalid(String),
    #[error("Unable to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid format for config file {path:?}:\n{}", indent::indent_all_with("  ", .source.to_string()))]
    Parse {
        path: PathBuf,
        source: serde_yml::Error,
    },
    #[error(
        "Two actions have the same final archive name {full_name}:\n{}\nis incompatible with:\n{}",
        indent::indent_all_with("  ", .first),
        indent::indent_all_with("  ", .second)
    )]
    DuplicateFullName {
        full_name: String,
        first: String,
        second: String,
    },
}

impl ConfigError {
    pub fn invalid<S: Into<String>>(msg: S) -> Self {
        Self::Invalid(msg.into())
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    SerdeYml(#[from] serde_yml::Error),
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
    #[error(transparent)]
    Ini(#[from] ini::Error),
    #[error(transparent)]
    Syslog(#[from] syslog::Error),
    #[error(transparent)]
    Glob(#[from] globset::Error),
    #[error(transparent)]
    WalkDir(#[from] walkdir::Error),
    #[error(transparent)]
    LiblzmaStream(#[from] liblzma::stream::Error),
    #[error(transparent)]
    ThreadPoolBuildError(#[from] rayon::ThreadPoolBuildError),
    #[error(transparent)]
    Lettre(#[from] lettre::error::Error),
    #[error(transparent)]
    SmtpTransport(#[from] lettre::transport::smtp::Error),
    #[error(transparent)]
    Ureq(Box<ureq::Error>),
    #[error(transparent)]
    Which(#[from] which::Error),
    #[error(transparent)]
    Signal(#[from] ctrlc::Error),
    #[error("{}", command_failure(.command, .code, .stderr))]
    Command {
        command: String,
        code: Option<i32>,
        stderr: String,
    },
    #[error("{0}")]
    Check(String),
    #[error("Smtp server rejected the message: {0}")]
    SmtpResponse(String),
    #[error("Unknown target {0}")]
    UnknownTarget(String),
    #[error("{0}")]
    Operation(String),
    #[error("{}:\n{}", .msg, indent::indent_all_with("  ", .error.to_string()))]
    WithMsg { msg: String, error: Box<Error> },
    #[error("{} failed:\n{}", .fn_name, indent::indent_all_with("  ", .error.to_string()))]
    WithFnName { fn_name: String, error: Box<Error> },
    #[error("{}", itertools::join(.0, "\n\n"))]
    LotsOfError(Vec<Error>),
}

fn command_failure(command: &str, code: &Option<i32>, stderr: &str) -> String {
    let code = code.map_or_else(|| "none (killed by signal)".to_string(), |c| c.to_string());
    let mut msg = format!("Command failed with exit code {code}\n  Command: {command}");
    if !stderr.is_empty() {
        msg.push_str("\n  Error output:\n");
        msg.push_str(indent::indent_all_with("    ", stderr).trim_end());
    }
    msg
}

impl From<ureq::Error> for Error {
    fn from(value: ureq::Error) -> Self {
        Self::Ureq(Box::new(value))
    }
}

impl<S: Into<String>> AddMsg<S> for Error {
    fn add_msg(self, msg: S) -> Self {
        Self::WithMsg {
            msg: msg.into(),
            error: Box::new(self),
        }
    }
}

impl<S: Into<String>> AddFunctionName<S> for Error {
    fn add_fn_name(self, fn_name: S) -> Self {
        Self::WithFnName {
            fn_name: fn_name.into(),
            error: Box::new(self),
        }
    }
}

impl From<Vec<Error>> for Error {
    fn from(errors: Vec<Error>) -> Self {
        if errors.is_empty() {
            panic!("Should not create lots of errors when error is empty")
        }
        Self::LotsOfError(errors.into_iter().flat_map(|e| e.into_iter()).collect_vec())
    }
}

impl Error {
    pub fn into_iter(self) -> Box<dyn Iterator<Item = Error>> {
        match self {
            Error::LotsOfError(v) => Box::new(v.into_iter().flat_map(|e| e.into_iter())),
            e => Box::new(std::iter::once(e)),
        }
    }

    pub fn chain(self, other: Error) -> Error {
        Error::LotsOfError(self.into_iter().chain(other.into_iter()).collect_vec())
    }

    pub fn is_config(&self) -> bool {
        match self {
            Error::Config(_) => true,
            Error::WithMsg { error, .. } | Error::WithFnName { error, .. } => error.is_config(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_from_io_error() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let error = Error::from(io_error);

        match error {
            Error::Io(_) => (),
            _ => panic!("Expected Io error"),
        }
    }

    #[test]
    fn test_error_add_msg() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let error = Error::from(io_error).add_msg("Custom message");

        match error {
            Error::WithMsg { msg, .. } => assert_eq!(msg, "Custom message"),
            _ => panic!("Expected WithMsg error"),
        }
    }

    #[test]
    fn test_error_add_fn_name_display() {
        let error = Error::Operation("vault unreachable".into()).add_fn_name("save");
        let error_str = error.to_string();

        assert!(error_str.starts_with("save failed:"));
        assert!(error_str.contains("  vault unreachable"));
    }

    #[test]
    fn test_error_from_vec_flattens_nested() {
        let nested = Error::Operation("a".into()).chain(Error::Operation("b".into()));
        let combined = Error::from(vec![nested, Error::Operation("c".into())]);

        match combined {
            Error::LotsOfError(errors) => assert_eq!(errors.len(), 3),
            _ => panic!("Expected LotsOfError"),
        }
    }

    #[test]
    #[should_panic(expected = "Should not create lots of errors when error is empty")]
    fn test_error_from_empty_vec_panics() {
        let errors: Vec<Error> = vec![];
        let _error = Error::from(errors);
    }

    #[test]
    fn test_command_error_display() {
        let error = Error::Command {
            command: "rsync -a /src /dst".into(),
            code: Some(23),
            stderr: "permission denied".into(),
        };
        let error_str = error.to_string();

        assert!(error_str.starts_with("Command failed with exit code 23"));
        assert!(error_str.contains("  Command: rsync -a /src /dst"));
        assert!(error_str.contains("    permission denied"));
    }

    #[test]
    fn test_is_config_sees_through_context() {
        let error = Error::from(ConfigError::invalid("bad")).add_msg("loading");
        assert!(error.is_config());
        assert!(!Error::Operation("x".into()).is_config());
    }

    #[test]
    fn test_duplicate_full_name_display() {
        let error = ConfigError::DuplicateFullName {
            full_name: "web1_www".into(),
            first: "File action web1_www".into(),
            second: "File action web1_www".into(),
        };
        let error_str = error.to_string();
        assert!(error_str.contains("web1_www"));
        assert!(error_str.contains("is incompatible with:"));
    }
}
