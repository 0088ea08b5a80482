//! Request pipeline wrapped around the portal's HTTP handlers.
//!
//! [`handle`] resolves per-request settings (brand, shared secrets id),
//! runs the handler, turns handler errors into JSON error responses and
//! adds CORS headers to whatever comes back.

use lambda_http::http::header::{HeaderName, HeaderValue};
use lambda_http::{Body, Request, RequestExt, Response};
use std::future::Future;
use tracing::error;

use crate::http::error_response;
use crate::policy::Brand;
use crate::{Config, Error};

/// Message returned for server-side failures.
pub const FALLBACK_ERROR_MESSAGE: &str = "An unknown error occurred.";

const CORS_HEADERS: [(&str, &str); 3] = [
    ("access-control-allow-origin", "*"),
    (
        "access-control-allow-headers",
        "Content-Type,X-Amz-Date,Authorization,X-Api-Key,X-Amz-Security-Token",
    ),
    ("access-control-allow-methods", "GET,OPTIONS,POST,DELETE,PUT"),
];

/// Settings resolved for one request before the handler runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub brand: Brand,
    pub shared_secrets_id: String,
}

impl RequestContext {
    pub fn from_request(event: &Request, config: &Config) -> Self {
        let shared_secrets_id = event
            .stage_variables_ref()
            .and_then(|vars| vars.first("SHARED_SECRETS_ID"))
            .filter(|id| !id.is_empty())
            .unwrap_or(config.shared_secrets_id.as_str())
            .to_string();

        let authorizer_brand = event
            .request_context_ref()
            .and_then(|context| context.authorizer())
            .and_then(|authorizer| authorizer.fields.get("brandId"))
            .and_then(|brand| brand.as_str());

        let header = |name: &str| {
            event
                .headers()
                .get(name)
                .and_then(|value| value.to_str().ok())
        };

        let brand = resolve_brand(
            authorizer_brand,
            header("x-referer-override"),
            header("referer"),
            config.music_arts_referer_url.as_deref(),
        );

        Self {
            brand,
            shared_secrets_id,
        }
    }
}

/// Brand precedence: authorizer context, then `X-Referer-Override`, then
/// `Referer`, then the default brand.
pub fn resolve_brand(
    authorizer_brand: Option<&str>,
    referer_override: Option<&str>,
    referer: Option<&str>,
    music_arts_referer: Option<&str>,
) -> Brand {
    authorizer_brand
        .and_then(Brand::parse)
        .unwrap_or_else(|| Brand::from_referer(referer_override.or(referer), music_arts_referer))
}

/// Add the portal's CORS headers to a response.
pub fn with_cors(mut response: Response<Body>) -> Response<Body> {
    let headers = response.headers_mut();
    for (name, value) in CORS_HEADERS {
        headers.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
    }
    response
}

/// Convert a handler error into an error response.
///
/// Server-side failures only expose [`FALLBACK_ERROR_MESSAGE`].
pub fn error_to_response(err: &Error) -> Result<Response<Body>, lambda_http::Error> {
    let status = err.status_code();
    if status >= 500 {
        error_response(status, FALLBACK_ERROR_MESSAGE)
    } else {
        error_response(status, err.to_string())
    }
}

/// Run `handler` for `event` inside the pipeline.
pub async fn handle<F, Fut>(
    config: &Config,
    event: Request,
    handler: F,
) -> Result<Response<Body>, lambda_http::Error>
where
    F: FnOnce(Request, RequestContext) -> Fut,
    Fut: Future<Output = crate::Result<Response<Body>>>,
{
    let context = RequestContext::from_request(&event, config);
    let method = event.method().to_string();
    let path = event.uri().path().to_string();

    let response = match handler(event, context).await {
        Ok(response) => response,
        Err(e) => {
            error!(method = %method, path = %path, status = e.status_code(), error = %e, "Handler failed");
            error_to_response(&e)?
        }
    };

    Ok(with_cors(response))
}
