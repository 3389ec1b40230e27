//! Validation functions for configuration values.
//!
//! Used both as `validator` custom functions on report settings and directly
//! while assembling server blocks.

use lettre::message::Mailbox;
use regex::Regex;
use sanitize_filename::{is_sanitized, sanitize};
use std::path::Path;
use std::sync::LazyLock;
use validator::ValidationError;

static SSH_USER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new("^[a-z0-9]+$").unwrap_or_else(|e| unreachable!("invalid ssh user pattern: {e}"))
});

pub fn validate_archive_base_name<S: AsRef<str>>(name: S) -> Result<(), ValidationError> {
    if name.as_ref().is_empty() || !is_sanitized(name.as_ref()) {
        return Err(ValidationError::new("InvalidArchiveBaseName").with_message(
            format!(
                "Invalid archive name {:?}, try sanitizing like {:?}",
                name.as_ref(),
                sanitize(name.as_ref())
            )
            .into(),
        ));
    }

    Ok(())
}

pub fn validate_absolute_path<P: AsRef<Path>>(path: P) -> Result<(), ValidationError> {
    let path = path.as_ref();
    if !path.is_absolute() {
        return Err(ValidationError::new("RelativePath")
            .with_message(format!("{:?} should be an absolute path", path).into()));
    }

    Ok(())
}

pub fn validate_file_exist<P: AsRef<Path>>(path: P) -> Result<(), ValidationError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(ValidationError::new("FileNotFound")
            .with_message(format!("no existing file {:?}", path).into()));
    }

    Ok(())
}

pub fn validate_ssh_user<S: AsRef<str>>(user: S) -> Result<(), ValidationError> {
    if !SSH_USER.is_match(user.as_ref()) {
        return Err(ValidationError::new("InvalidSshUser")
            .with_message(format!("invalid ssh user {:?}", user.as_ref()).into()));
    }

    Ok(())
}

pub fn validate_mailbox<S: AsRef<str>>(address: S) -> Result<(), ValidationError> {
    address.as_ref().parse::<Mailbox>().map(|_| ()).map_err(|e| {
        ValidationError::new("InvalidEmail")
            .with_message(format!("Invalid email address {:?}: {e}", address.as_ref()).into())
    })
}

pub fn validate_mailboxes(addresses: &[String]) -> Result<(), ValidationError> {
    addresses.iter().try_for_each(validate_mailbox)
}
