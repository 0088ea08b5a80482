//! Authorizer Lambda - Validates Okta bearer tokens for the portal API.
//!
//! API Gateway REQUEST authorizer. A verified token yields an allow policy
//! scoped to the calling API stage; a token that fails verification yields
//! a deny policy. Requests without a usable bearer header fail with
//! `Unauthorized`, which API Gateway answers with 401.

use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use shared::authorizer::handle_request;
use shared::{AuthorizerRequest, AuthorizerResponse, Config, OktaJwtVerifier, SecretsCache};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Application state
struct AppState {
    config: Config,
    secrets: SecretsCache,
    verifier: OktaJwtVerifier,
}

impl AppState {
    async fn new() -> Result<Self, Error> {
        let config = Config::from_env()?;
        let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let secrets_client = aws_sdk_secretsmanager::Client::new(&aws_config);

        Ok(Self {
            config,
            secrets: SecretsCache::new(secrets_client),
            verifier: OktaJwtVerifier::default(),
        })
    }
}

async fn handler(
    state: Arc<AppState>,
    event: LambdaEvent<AuthorizerRequest>,
) -> Result<AuthorizerResponse, Error> {
    handle_request(&event.payload, &state.config, &state.secrets, &state.verifier).await
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    let state = Arc::new(AppState::new().await?);

    run(service_fn(move |event| {
        let state = state.clone();
        async move { handler(state, event).await }
    }))
    .await
}
