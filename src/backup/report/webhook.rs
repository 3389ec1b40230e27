use crate::backup::config::node::one_or_many;
use crate::backup::report::render::{default_content, subject};
use crate::backup::report::{Report, ReportSink};
use crate::backup::result_error::error::{ConfigError, Error};
use crate::backup::result_error::result::{convert_error_vec, Result};
use derive_more::Display;
use getset::{CopyGetters, Getters};
use itertools::Itertools;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::fmt::Formatter;
use validator::Validate;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
pub enum HttpMethod {
    #[serde(alias = "GET", alias = "Get")]
    #[display("GET")]
    Get,
    #[serde(alias = "POST", alias = "Post")]
    #[display("POST")]
    Post,
}

/// How the report is turned into request parameters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
pub enum WebhookMapping {
    /// `subject` and `text` added to the configured parameters.
    #[default]
    #[display("default")]
    Default,
    /// Rocket.Chat incoming webhook message, one attachment per server and level.
    #[display("rocketchat")]
    RocketChat,
}

#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct WebhookSettings {
    #[serde(deserialize_with = "one_or_many")]
    #[validate(length(min = 1))]
    url: Vec<String>,
    #[serde(default, alias = "parameters")]
    params: Option<Map<String, Value>>,
    #[serde(default)]
    method: Option<HttpMethod>,
    #[serde(default)]
    json: Option<bool>,
    #[serde(default)]
    mapping: WebhookMapping,
}

/// Posts (or gets) the report to one or more HTTP endpoints.
#[derive(Clone, Debug, Getters, CopyGetters)]
pub struct WebhookReport {
    #[getset(get = "pub")]
    urls: Vec<String>,
    #[getset(get = "pub")]
    params: Map<String, Value>,
    #[getset(get_copy = "pub")]
    method: HttpMethod,
    #[getset(get_copy = "pub")]
    json: bool,
    #[getset(get_copy = "pub")]
    mapping: WebhookMapping,
}

impl TryFrom<WebhookSettings> for WebhookReport {
    type Error = ConfigError;

    /// Without `method` nor `json` the request is a JSON POST; with only a
    /// method, JSON is used for POST only.
    fn try_from(settings: WebhookSettings) -> std::result::Result<Self, Self::Error> {
        let (method, json) = match (settings.method, settings.json) {
            (None, None) => (HttpMethod::Post, true),
            (Some(method), None) => (method, method == HttpMethod::Post),
            (None, Some(json)) => (HttpMethod::Post, json),
            (Some(HttpMethod::Get), Some(true)) => {
                return Err(ConfigError::invalid(
                    "You can't use json parameters on GET webhook report configuration",
                ))
            }
            (Some(method), Some(json)) => (method, json),
        };
        Ok(Self {
            urls: settings.url,
            params: settings.params.unwrap_or_default(),
            method,
            json,
            mapping: settings.mapping,
        })
    }
}

fn attachment(title: String, server: &str, messages: &[String], color: &str) -> Value {
    json!({
        "title": title,
        "title_link": server,
        "text": messages.join("\n"),
        "color": color,
    })
}

fn http_error(url: &str, status: u16, content: String) -> Error {
    Error::Operation(format!(
        "Unable to send webhook message to {url}: \n{}",
        indent::indent_all_with(
            "  ",
            format!(
                "HTTP Error: {status}\nContent:\n{}",
                indent::indent_all_with("  ", content.trim())
            )
        )
        .trim_end()
    ))
}

fn form_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl WebhookReport {
    pub fn payload(&self, report: &Report) -> Map<String, Value> {
        let mut payload = self.params.clone();
        match self.mapping {
            WebhookMapping::Default => {
                payload.insert("subject".into(), subject(report).into());
                payload.insert("text".into(), default_content(report).into());
            }
            WebhookMapping::RocketChat => {
                let attachments = report
                    .issues()
                    .iter()
                    .map(|(server, messages)| {
                        let title = format!("server: {server}: {} errors", messages.len());
                        attachment(title, server, messages, "danger")
                    })
                    .chain(report.warnings().iter().map(|(server, messages)| {
                        let title = format!("server: {server}: {} warnings", messages.len());
                        attachment(title, server, messages, "warning")
                    }))
                    .chain(report.successes().iter().map(|(server, messages)| {
                        attachment(format!("server: {server}: "), server, messages, "good")
                    }))
                    .collect_vec();
                payload.insert("username".into(), "Backups".into());
                payload.insert("text".into(), subject(report).into());
                payload.insert("attachments".into(), Value::Array(attachments));
            }
        }
        payload
    }

    fn post(&self, url: &str, payload: &Map<String, Value>) -> Result<()> {
        let pairs = payload
            .iter()
            .map(|(key, value)| (key.clone(), form_value(value)))
            .collect_vec();
        let borrowed = pairs
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
            .collect_vec();
        let response = match (self.method, self.json) {
            (HttpMethod::Post, true) => ureq::post(url).send_json(Value::Object(payload.clone())),
            (HttpMethod::Post, false) => ureq::post(url).send_form(&borrowed),
            (HttpMethod::Get, _) => borrowed
                .iter()
                .fold(ureq::get(url), |request, (key, value)| request.query(key, value))
                .call(),
        };
        match response {
            Ok(response) if response.status() == 200 => Ok(()),
            Ok(response) => {
                let status = response.status();
                Err(http_error(url, status, response.into_string().unwrap_or_default()))
            }
            Err(ureq::Error::Status(status, response)) => Err(http_error(
                url,
                status,
                response.into_string().unwrap_or_default(),
            )),
            Err(e) => Err(Error::from(e)),
        }
    }
}

impl ReportSink for WebhookReport {
    fn send(&self, report: &Report) -> Result<()> {
        let payload = self.payload(report);
        let errors = self
            .urls
            .iter()
            .filter_map(|url| self.post(url, &payload).err())
            .collect_vec();
        convert_error_vec(errors)
    }
}

impl std::fmt::Display for WebhookReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let urls = match self.urls.as_slice() {
            [url] => format!("url: {url}"),
            urls => format!(
                "urls: \n{}",
                indent::indent_all_with("  ", urls.join("\n")).trim_end()
            ),
        };
        let params = if self.params.is_empty() {
            "none".to_string()
        } else {
            Value::Object(self.params.clone()).to_string()
        };
        let details = format!(
            "{urls}\nmethod: {}\njson request: {}\nparams: {params}\nmapping: {}",
            self.method,
            if self.json { "yes" } else { "no" },
            self.mapping
        );
        write!(
            f,
            "Webhook report target: \n{}",
            indent::indent_all_with("  ", details).trim_end()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::sync::mpsc;

    fn settings(yaml: &str) -> WebhookSettings {
        serde_yml::from_str(yaml).unwrap()
    }

    /// Serves one request with `status` and hands back the raw request.
    fn one_shot_server(status: u16) -> (String, mpsc::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/hook", listener.local_addr().unwrap());
        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut request = String::new();
            let mut length = 0usize;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                if let Some(value) = line.to_lowercase().strip_prefix("content-length:") {
                    length = value.trim().parse().unwrap();
                }
                request.push_str(&line);
                if line == "\r\n" || line.is_empty() {
                    break;
                }
            }
            let mut body = vec![0u8; length];
            reader.read_exact(&mut body).unwrap();
            request.push_str(&String::from_utf8_lossy(&body));
            let mut stream = stream;
            write!(
                stream,
                "HTTP/1.1 {status} Whatever\r\nContent-Length: 4\r\nConnection: close\r\n\r\nnope"
            )
            .unwrap();
            tx.send(request).unwrap();
        });
        (url, rx)
    }

    fn report() -> Report {
        let mut report = Report::new();
        report.add_issue("db1", "dump failed");
        report.add_success("web1", "saved");
        report
    }

    #[test]
    fn test_method_and_json_defaults() {
        let target = WebhookReport::try_from(settings("url: http://h/")).unwrap();
        assert_eq!((target.method(), target.json()), (HttpMethod::Post, true));

        let target = WebhookReport::try_from(settings("url: http://h/\nmethod: get")).unwrap();
        assert_eq!((target.method(), target.json()), (HttpMethod::Get, false));

        let target = WebhookReport::try_from(settings("url: http://h/\njson: false")).unwrap();
        assert_eq!((target.method(), target.json()), (HttpMethod::Post, false));

        assert!(WebhookReport::try_from(settings("url: http://h/\nmethod: get\njson: true")).is_err());
    }

    #[test]
    fn test_rocketchat_payload() {
        let target = WebhookReport::try_from(settings(
            "url: [http://h/]\nmapping: rocketchat\nparameters: {channel: '#ops'}",
        ))
        .unwrap();
        let payload = Value::Object(target.payload(&report()));
        assert_eq!(payload["channel"], "#ops");
        assert_eq!(payload["username"], "Backups");
        assert_eq!(payload["text"], "Backup: 1 errors");
        assert_eq!(payload["attachments"][0]["title"], "server: db1: 1 errors");
        assert_eq!(payload["attachments"][0]["color"], "danger");
        assert_eq!(payload["attachments"][1]["title"], "server: web1: ");
        assert_eq!(payload["attachments"][1]["color"], "good");
    }

    #[test]
    fn test_posts_json_payload() {
        let (url, rx) = one_shot_server(200);
        let target = WebhookReport::try_from(settings(&format!("url: {url}"))).unwrap();
        target.send(&report()).unwrap();
        let request = rx.recv().unwrap();
        assert!(request.starts_with("POST /hook"));
        assert!(request.contains("\"subject\":\"Backup: 1 errors\""));
    }

    #[test]
    fn test_non_200_status_is_an_error() {
        let (url, _rx) = one_shot_server(500);
        let target = WebhookReport::try_from(settings(&format!("url: {url}\nmethod: get"))).unwrap();
        let error = target.send(&report()).unwrap_err().to_string();
        assert!(error.contains("HTTP Error: 500"));
        assert!(error.contains("nope"));
    }

    #[test]
    fn test_display() {
        let target = WebhookReport::try_from(settings("url: [http://a/, http://b/]\nmethod: get")).unwrap();
        assert_eq!(
            target.to_string(),
            "Webhook report target: \n  urls: \n    http://a/\n    http://b/\n  method: GET\n  \
             json request: no\n  params: none\n  mapping: default"
        );
    }
}
