//! AWS Secrets Manager integration.
//!
//! Secrets are JSON objects. [`SecretsCache`] is built once per cold start
//! and handed to handlers, keeping each parsed secret for the life of the
//! process.

use async_trait::async_trait;
use aws_sdk_secretsmanager::Client as SecretsClient;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, error};

use crate::{Error, Result};

/// Parsed key/value pairs of one secret.
pub type SecretValues = Map<String, Value>;

/// Something that can return the raw string of a secret.
#[async_trait]
pub trait SecretSource: Send + Sync {
    async fn fetch_secret_string(&self, secret_id: &str) -> Result<String>;
}

#[async_trait]
impl SecretSource for SecretsClient {
    async fn fetch_secret_string(&self, secret_id: &str) -> Result<String> {
        let response = self
            .get_secret_value()
            .secret_id(secret_id)
            .send()
            .await
            .map_err(|e| Error::Aws(format!("Failed to get secret: {}", e)))?;

        response
            .secret_string()
            .map(str::to_string)
            .ok_or_else(|| Error::Aws("Secret has no string value".to_string()))
    }
}

/// Okta settings used to verify identity tokens.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct OktaSecrets {
    pub okta_issuer_uri: String,
    pub okta_client_id: String,
    #[serde(default)]
    pub okta_client_secret: Option<String>,
}

/// Shared settings bundle read by the portal handlers.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", default)]
pub struct SharedSecrets {
    pub okta_issuer_uri: Option<String>,
    pub okta_client_id: Option<String>,
    pub okta_client_secret: Option<String>,
    pub postman_env: Option<String>,
    pub scheduler_url: Option<String>,
    pub students_table_id: Option<String>,
    pub ses_sender: Option<String>,
    pub testing_email: Option<String>,
}

/// Process-lifetime cache of parsed secrets keyed by secret id.
pub struct SecretsCache<S = SecretsClient> {
    source: S,
    cache: RwLock<HashMap<String, SecretValues>>,
}

impl<S: SecretSource> SecretsCache<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Get a secret, fetching it on a miss.
    ///
    /// An empty cached object counts as a miss.
    pub async fn get_secrets(&self, secret_id: &str) -> Result<SecretValues> {
        // Check cache first
        {
            let cache = self.cache.read().await;
            if let Some(values) = cache.get(secret_id).filter(|values| !values.is_empty()) {
                return Ok(values.clone());
            }
        }

        let values = self.fetch(secret_id).await.map_err(|e| {
            error!(secret_id, error = %e, "Encountered an error trying to fetch and parse secrets");
            e
        })?;

        // Cache the result
        {
            let mut cache = self.cache.write().await;
            cache.insert(secret_id.to_string(), values.clone());
        }

        Ok(values)
    }

    /// Get a secret deserialized into `T`.
    pub async fn get_as<T: DeserializeOwned>(&self, secret_id: &str) -> Result<T> {
        let values = self.get_secrets(secret_id).await?;
        serde_json::from_value(Value::Object(values))
            .map_err(|e| Error::Config(format!("Secret {} has an unexpected shape: {}", secret_id, e)))
    }

    /// Clear the secrets cache (useful for testing or credential rotation).
    pub async fn clear(&self) {
        let mut cache = self.cache.write().await;
        cache.clear();
    }

    async fn fetch(&self, secret_id: &str) -> Result<SecretValues> {
        debug!(secret_id, "Fetching secret");
        let secret_string = self.source.fetch_secret_string(secret_id).await?;
        serde_json::from_str(&secret_string)
            .map_err(|e| Error::Aws(format!("Failed to parse secret: {}", e)))
    }
}
