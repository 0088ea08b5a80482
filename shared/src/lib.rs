//! Shared library for Instructor Portal Lambda functions.
//!
//! This crate provides the JSON:API response builder used by every handler,
//! plus the token authorizer, secrets cache and request pipeline the
//! Lambda functions are assembled from.

pub mod arn;
pub mod auth;
pub mod authorizer;
pub mod config;
pub mod dynamo;
pub mod email;
pub mod error;
pub mod http;
pub mod jsonapi;
pub mod middleware;
pub mod policy;
pub mod schema;
pub mod secrets;

pub use arn::{extract_arn_path, ArnPath};
pub use auth::{bearer_token, IdTokenClaims, KeySetSource, OktaJwtVerifier, TokenVerifier};
pub use config::Config;
pub use dynamo::{DynamoDbClient, ItemStore, QueryRequest, UpdateRequest};
pub use email::EmailService;
pub use error::{Error, Result};
pub use jsonapi::{Document, JsonApiError, PrimaryData, Resource, ResponseDocumentBuilder};
pub use middleware::RequestContext;
pub use policy::{AuthorizerRequest, AuthorizerResponse, Brand};
pub use secrets::{OktaSecrets, SecretSource, SecretsCache, SharedSecrets};
