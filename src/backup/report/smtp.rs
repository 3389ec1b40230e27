use crate::backup::config::node::one_or_many;
use crate::backup::function_path;
use crate::backup::redacted::RedactedString;
use crate::backup::report::render::{content, describe_template, subject, Template};
use crate::backup::report::{Report, ReportSink};
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::{AddFunctionName, AddMsg};
use crate::backup::validate::{validate_mailbox, validate_mailboxes};
use bon::Builder;
use function_name::named;
use getset::Getters;
use itertools::Itertools;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use validator::Validate;

fn default_smtp_server() -> String {
    "localhost".to_string()
}

fn default_smtp_port() -> u32 {
    25
}

/// SMTP connection security modes
///
/// - `Unsecured`: Plain text connection
/// - `Ssl`: SSL/TLS encrypted connection from start
/// - `StartTls`: Start with plain text, then upgrade to TLS
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum SmtpMode {
    #[serde(alias = "unsecured", alias = "plain")]
    Unsecured,
    #[serde(alias = "ssl", alias = "tls")]
    Ssl,
    #[serde(alias = "starttls")]
    StartTls,
}

/// Email report settings as written in the configuration.
#[derive(Clone, Debug, Deserialize, Validate, Builder, Getters)]
#[serde(deny_unknown_fields)]
#[getset(get = "pub")]
pub struct SmtpSettings {
    #[serde(deserialize_with = "one_or_many")]
    #[validate(length(min = 1), custom(function = validate_mailboxes))]
    #[builder(into)]
    to: Vec<String>,
    #[serde(default)]
    #[builder(into)]
    subject_prefix: Option<String>,
    #[serde(default)]
    #[validate(custom(function = validate_mailbox))]
    #[builder(into)]
    sender: Option<String>,
    #[serde(default)]
    #[builder(into)]
    smtp_user: Option<String>,
    #[serde(default)]
    smtp_pwd: Option<RedactedString>,
    #[serde(default = "default_smtp_server")]
    #[builder(into, default = default_smtp_server())]
    smtp_server: String,
    #[serde(default = "default_smtp_port")]
    #[validate(range(max = 65534))]
    #[builder(default = default_smtp_port())]
    smtp_port: u32,
    #[serde(default)]
    smtp_mode: Option<SmtpMode>,
    /// Template file, relative to the configuration file.
    #[serde(default)]
    #[builder(into)]
    template: Option<String>,
}

impl SmtpSettings {
    /// Explicit mode, else plain SMTP on port 25 and SSL anywhere else.
    pub fn effective_mode(&self) -> SmtpMode {
        match self.smtp_mode {
            Some(mode) => mode,
            None if self.smtp_port == 25 => SmtpMode::Unsecured,
            None => SmtpMode::Ssl,
        }
    }

    /// Sender, else an address-like smtp user, else the first recipient.
    pub fn from_address(&self) -> &str {
        self.sender
            .as_deref()
            .or(self.smtp_user.as_deref().filter(|user| user.contains('@')))
            .unwrap_or_else(|| self.to.first().map_or("", String::as_str))
    }

    /// Login name: smtp user, else sender.
    pub fn login(&self) -> Option<&str> {
        self.smtp_user.as_deref().or(self.sender.as_deref())
    }
}

/// Mails the report through an SMTP relay.
#[derive(Clone, Debug, Getters)]
#[getset(get = "pub")]
pub struct SmtpReport {
    settings: SmtpSettings,
    template: Option<Template>,
}

impl SmtpReport {
    pub fn new(settings: SmtpSettings, template: Option<Template>) -> Self {
        Self { settings, template }
    }

    fn mailbox(address: &str) -> Result<Mailbox> {
        address
            .parse::<Mailbox>()
            .map_err(|e| Error::Operation(format!("Invalid email address {address:?}: {e}")))
    }

    fn transport(&self) -> Result<SmtpTransport> {
        let settings = &self.settings;
        let server = settings.smtp_server.as_str();
        let builder = match settings.effective_mode() {
            SmtpMode::Unsecured => Ok(SmtpTransport::builder_dangerous(server)),
            SmtpMode::Ssl => SmtpTransport::relay(server),
            SmtpMode::StartTls => SmtpTransport::starttls_relay(server),
        }
        .map_err(Error::from)
        .add_msg(format!(
            "Failed to build smtp client for host: {:?} with mode {:?}",
            server,
            settings.effective_mode()
        ))?
        .port(settings.smtp_port as u16);

        let builder = match (&settings.smtp_pwd, settings.login()) {
            (Some(password), Some(user)) => builder.credentials(Credentials::new(
                user.to_string(),
                password.inner().to_string(),
            )),
            _ => builder,
        };
        Ok(builder.build())
    }
}

impl ReportSink for SmtpReport {
    #[named]
    fn send(&self, report: &Report) -> Result<()> {
        let settings = &self.settings;
        tracing::info!(
            "Started smtp email report from {:?} to {:?}",
            settings.from_address(),
            settings.to
        );
        let email = settings
            .to
            .iter()
            .map(|to| Self::mailbox(to))
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .fold(Message::builder(), |email, send_to| email.to(send_to))
            .from(Self::mailbox(settings.from_address())?)
            .subject(format!(
                "{}{}",
                settings.subject_prefix.as_deref().unwrap_or_default(),
                subject(report)
            ))
            .header(ContentType::TEXT_PLAIN)
            .body(content(report, self.template.as_ref()))
            .map_err(Error::from)
            .add_msg(format!(
                "Fail to build report email from {:?} to {:?}",
                settings.from_address(),
                settings.to
            ))
            .add_fn_name(function_path!())?;

        tracing::info!("Sending email...");
        let response = self
            .transport()?
            .send(&email)
            .map_err(Error::from)
            .add_fn_name(function_path!())?;
        if response.is_positive() {
            Ok(())
        } else {
            let error_vec = response
                .message()
                .map(|m| Error::SmtpResponse(m.to_owned()))
                .collect_vec();
            if error_vec.is_empty() {
                return Err(Error::SmtpResponse(response.code().to_string()));
            }
            Err(Error::from(error_vec))
        }
    }
}

impl Display for SmtpReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let settings = &self.settings;
        let to = match settings.to.as_slice() {
            [to] => to.clone(),
            many => format!(
                "\n{}",
                indent::indent_all_with("  ", many.join("\n")).trim_end()
            ),
        };
        let details = format!(
            "to: {to}\nprefix: {}\nsender: {}\nsmtp user: {}\nsmtp password: {}\nsmtp server: {}\nsmtp port: {}\n{}",
            settings.subject_prefix.as_deref().unwrap_or("none"),
            settings.sender.as_deref().unwrap_or("none"),
            settings.smtp_user.as_deref().unwrap_or("none"),
            settings
                .smtp_pwd
                .as_ref()
                .map_or("none".to_string(), |p| p.to_string()),
            settings.smtp_server,
            settings.smtp_port,
            describe_template(self.template.as_ref())
        );
        write!(
            f,
            "Email report target: \n{}",
            indent::indent_all_with("  ", details).trim_end()
        )
    }
}
