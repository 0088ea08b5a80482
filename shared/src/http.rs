//! HTTP helpers for Lambda functions.

use lambda_http::{Body, Response};
use serde::Serialize;

use crate::jsonapi::Document;

/// Media type of JSON:API documents.
pub const JSON_API_CONTENT_TYPE: &str = "application/vnd.api+json";

/// Standard API response wrapper.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ApiResponse<()> {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

fn response_with(
    status: u16,
    content_type: &str,
    body: String,
) -> Result<Response<Body>, lambda_http::Error> {
    Ok(Response::builder()
        .status(status)
        .header("content-type", content_type)
        .body(Body::from(body))?)
}

/// Create a JSON response with the given status code and data.
pub fn json_response<T: Serialize>(status: u16, data: &T) -> Result<Response<Body>, lambda_http::Error> {
    response_with(status, "application/json", serde_json::to_string(data)?)
}

/// Create a JSON:API response carrying `document`.
pub fn json_api_response(status: u16, document: &Document) -> Result<Response<Body>, lambda_http::Error> {
    response_with(status, JSON_API_CONTENT_TYPE, serde_json::to_string(document)?)
}

/// Create an error response with the given status code and message.
pub fn error_response(status: u16, message: impl Into<String>) -> Result<Response<Body>, lambda_http::Error> {
    json_response(status, &ApiResponse::error(message))
}
