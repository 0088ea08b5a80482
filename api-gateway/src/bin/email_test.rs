//! Email Test Lambda - Sends a test email through SES.
//!
//! Recipients come from `TESTING_EMAIL` in the shared secrets, falling back
//! to the `email` query parameter (comma separated).

use lambda_http::{run, service_fn, Body, Error, Request, RequestExt, Response};
use serde_json::json;
use shared::http::{error_response, json_api_response};
use shared::middleware::{handle, RequestContext};
use shared::{Config, EmailService, ResponseDocumentBuilder, SecretsCache, SharedSecrets};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const DEFAULT_RECIPIENT: &str = "donotreply@guitarcenter.com";
const SUBJECT: &str = "Test Email from Lambda";

/// Application state
struct AppState {
    config: Config,
    secrets: SecretsCache,
    email: EmailService,
}

impl AppState {
    async fn new() -> Result<Self, Error> {
        let config = Config::from_env()?;
        let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;

        Ok(Self {
            config,
            secrets: SecretsCache::new(aws_sdk_secretsmanager::Client::new(&aws_config)),
            email: EmailService::new(aws_sdk_ses::Client::new(&aws_config)),
        })
    }
}

/// Resolve the recipient list for the test email.
fn recipients(testing_email: Option<&str>, email_param: Option<&str>) -> Vec<String> {
    let raw = testing_email
        .filter(|email| !email.is_empty())
        .map(str::to_string)
        .or_else(|| {
            email_param.map(|email| {
                urlencoding::decode(email)
                    .map(|decoded| decoded.into_owned())
                    .unwrap_or_else(|_| email.to_string())
            })
        })
        .unwrap_or_else(|| DEFAULT_RECIPIENT.to_string());

    raw.split(',')
        .map(|email| email.trim().to_string())
        .filter(|email| !email.is_empty())
        .collect()
}

async fn handler(
    state: Arc<AppState>,
    event: Request,
    context: RequestContext,
) -> shared::Result<Response<Body>> {
    let shared: SharedSecrets = state.secrets.get_as(&context.shared_secrets_id).await?;

    let query = event.query_string_parameters();
    let to = recipients(shared.testing_email.as_deref(), query.first("email"));

    let mut email = state.email.clone();
    email.init(&shared);

    let echoed = json!({
        "method": event.method().as_str(),
        "path": event.uri().path(),
        "brand": context.brand,
    });
    let html = format!(
        "<html><head></head><body><p>This is a test email from Lambda. You sent this from instructor portal.</p>\
         <p>here is the lambda event: </p><code>{}</code></body></html>",
        serde_json::to_string_pretty(&echoed)?
    );

    let response = match email.send_email(&to, SUBJECT, &html, None).await {
        Ok(message_id) => {
            info!(message_id = %message_id, recipients = to.len(), "Test email sent");
            let document = ResponseDocumentBuilder::new(
                "emails",
                json!({"id": message_id, "recipients": to, "subject": SUBJECT}),
                None,
            )?
            .into_document();
            json_api_response(200, &document)
        }
        Err(e) => {
            error!(error = %e, "Failed to send test email");
            error_response(500, e.to_string())
        }
    };

    response.map_err(|e| shared::Error::Internal(e.to_string()))
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    let state = Arc::new(AppState::new().await?);

    run(service_fn(move |event: Request| {
        let state = state.clone();
        async move {
            let config = &state.config;
            handle(config, event, |event, context| handler(state.clone(), event, context)).await
        }
    }))
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_testing_email_wins() {
        assert_eq!(
            recipients(Some("qa@example.com, dev@example.com"), Some("other@example.com")),
            vec!["qa@example.com", "dev@example.com"]
        );
    }

    #[test]
    fn test_query_parameter_is_decoded() {
        assert_eq!(
            recipients(None, Some("a%40example.com%2C%20b@example.com")),
            vec!["a@example.com", "b@example.com"]
        );
        assert_eq!(recipients(Some(""), Some("c@example.com")), vec!["c@example.com"]);
    }

    #[test]
    fn test_default_recipient() {
        assert_eq!(recipients(None, None), vec![DEFAULT_RECIPIENT]);
    }
}
