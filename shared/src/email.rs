//! Email delivery through Amazon SES.

use aws_sdk_ses::types::{Body, Content, Destination, Message};
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;
use tracing::info;

use crate::secrets::SharedSecrets;
use crate::{Error, Result};

/// SES configuration set every message is tagged with.
pub const SES_CONFIGURATION_SET_NAME: &str = "lessons";

const CHARSET: &str = "UTF-8";

fn hidden_blocks() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?is)<head\b.*?</head>|<script\b.*?</script>|<style\b.*?</style>")
            .expect("valid hidden block regex")
    })
}

fn tags() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"<[^>]*>").expect("valid tag regex"))
}

/// Visible text of an HTML body, used when no plain-text part is given.
pub fn html_to_text(html: &str) -> String {
    let visible = hidden_blocks().replace_all(html, " ");
    let text = tags().replace_all(&visible, " ");
    let text = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Serialized template data with the `injectScript` placeholder the
/// templates expect.
pub fn template_data(data: &Map<String, Value>) -> Result<String> {
    let mut data = data.clone();
    data.insert("injectScript".to_string(), Value::from(""));
    Ok(serde_json::to_string(&data)?)
}

fn content(data: &str) -> Result<Content> {
    Content::builder()
        .data(data)
        .charset(CHARSET)
        .build()
        .map_err(|e| Error::Aws(format!("Failed to build email content: {}", e)))
}

fn destination(to: &[String]) -> Destination {
    Destination::builder()
        .set_to_addresses(Some(to.to_vec()))
        .build()
}

/// Sends plain and templated emails from the portal's sender address.
#[derive(Debug, Clone)]
pub struct EmailService {
    client: aws_sdk_ses::Client,
    sender: Option<String>,
}

impl EmailService {
    pub fn new(client: aws_sdk_ses::Client) -> Self {
        Self {
            client,
            sender: None,
        }
    }

    pub fn set_sender(&mut self, sender: impl Into<String>) {
        self.sender = Some(sender.into());
    }

    /// Take the sender from the shared secrets unless one is already set.
    pub fn init(&mut self, shared: &SharedSecrets) -> &mut Self {
        if self.sender.is_none() {
            self.sender = shared.ses_sender.clone();
        }
        self
    }

    pub fn sender(&self) -> Result<&str> {
        self.sender
            .as_deref()
            .ok_or_else(|| Error::Config("No SES sender configured".to_string()))
    }

    /// Send an HTML email, returning the SES message id.
    pub async fn send_email(
        &self,
        to: &[String],
        subject: &str,
        html: &str,
        text: Option<&str>,
    ) -> Result<String> {
        let text = match text {
            Some(text) => text.to_string(),
            None => html_to_text(html),
        };

        let body = Body::builder()
            .html(content(html)?)
            .text(content(&text)?)
            .build();

        let message = Message::builder()
            .subject(content(subject)?)
            .body(body)
            .build();

        info!(recipients = to.len(), subject, "Sending email");

        let result = self
            .client
            .send_email()
            .source(self.sender()?)
            .destination(destination(to))
            .configuration_set_name(SES_CONFIGURATION_SET_NAME)
            .message(message)
            .send()
            .await
            .map_err(|e| Error::Aws(format!("Failed to send email: {}", e)))?;

        Ok(result.message_id().to_string())
    }

    /// Send an email rendered from an SES template.
    pub async fn send_template_email(
        &self,
        to: &[String],
        template_name: &str,
        data: &Map<String, Value>,
    ) -> Result<String> {
        info!(recipients = to.len(), template_name, "Sending templated email");

        let result = self
            .client
            .send_templated_email()
            .source(self.sender()?)
            .destination(destination(to))
            .configuration_set_name(SES_CONFIGURATION_SET_NAME)
            .template(template_name)
            .template_data(template_data(data)?)
            .send()
            .await
            .map_err(|e| Error::Aws(format!("Failed to send templated email: {}", e)))?;

        Ok(result.message_id().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_html_to_text() {
        let html = r#"<html><head><title>ignored</title><style>p { color: red; }</style></head>
            <body><p>This is a test email from Lambda.</p>
            <p>Tom &amp; Jerry&nbsp;say <b>hi</b></p></body></html>"#;
        assert_eq!(
            html_to_text(html),
            "This is a test email from Lambda. Tom & Jerry say hi"
        );
    }

    #[test]
    fn test_html_to_text_plain_input() {
        assert_eq!(html_to_text("  just   text "), "just text");
    }

    #[test]
    fn test_template_data_injects_placeholder() {
        let data = json!({"studentName": "Sam", "lessonCount": 4});
        let serialized = template_data(data.as_object().unwrap()).unwrap();
        let parsed: Value = serde_json::from_str(&serialized).unwrap();
        assert_eq!(
            parsed,
            json!({"studentName": "Sam", "lessonCount": 4, "injectScript": ""})
        );
    }

    fn service() -> EmailService {
        let config = aws_sdk_ses::Config::builder()
            .behavior_version(aws_sdk_ses::config::BehaviorVersion::latest())
            .region(aws_sdk_ses::config::Region::new("us-west-2"))
            .build();
        EmailService::new(aws_sdk_ses::Client::from_conf(config))
    }

    #[test]
    fn test_sender_from_shared_secrets() {
        let mut email = service();
        assert!(matches!(email.sender(), Err(Error::Config(_))));

        let shared = SharedSecrets {
            ses_sender: Some("lessons@example.com".to_string()),
            ..Default::default()
        };
        email.init(&shared);
        assert_eq!(email.sender().unwrap(), "lessons@example.com");
    }

    #[test]
    fn test_explicit_sender_wins() {
        let mut email = service();
        email.set_sender("override@example.com");

        let shared = SharedSecrets {
            ses_sender: Some("lessons@example.com".to_string()),
            ..Default::default()
        };
        email.init(&shared);
        assert_eq!(email.sender().unwrap(), "override@example.com");
    }
}
