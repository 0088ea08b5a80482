//! Hello World Lambda - Smoke test endpoint behind the token authorizer.
//!
//! Responds with a JSON:API `greetings` document echoing the request.

use lambda_http::{run, service_fn, Body, Error, Request, RequestExt, Response};
use serde_json::{json, Map, Value};
use shared::http::json_api_response;
use shared::middleware::{handle, RequestContext};
use shared::{Config, ResponseDocumentBuilder};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

async fn handler(event: Request, context: RequestContext) -> shared::Result<Response<Body>> {
    let request_id = event
        .lambda_context_ref()
        .map(|ctx| ctx.request_id.clone())
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    info!(request_id = %request_id, brand = context.brand.as_str(), "Hello World request");

    let query: Map<String, Value> = event
        .query_string_parameters()
        .iter()
        .map(|(name, value)| (name.to_string(), Value::from(value)))
        .collect();

    let greeting = json!({
        "id": request_id,
        "message": "Hello World!",
        "brand": context.brand,
        "input": {
            "method": event.method().as_str(),
            "path": event.uri().path(),
            "query": query,
        },
    });

    let document = ResponseDocumentBuilder::new("greetings", greeting, None)?.into_document();

    json_api_response(200, &document).map_err(|e| shared::Error::Internal(e.to_string()))
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    let config = Arc::new(Config::from_env()?);

    run(service_fn(move |event: Request| {
        let config = config.clone();
        async move { handle(&config, event, handler).await }
    }))
    .await
}
