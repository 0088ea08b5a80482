//! Bearer token extraction and Okta identity token verification.
//!
//! The portal currently receives Okta ID tokens rather than access tokens,
//! so verification checks the token against the Okta org's JWKS with the
//! application's client id as audience.

use async_trait::async_trait;
use jsonwebtoken::jwk::{Jwk, JwkSet};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::secrets::OktaSecrets;
use crate::{Error, Result};

fn bearer_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)^Bearer .+$").expect("valid bearer regex"))
}

/// Claims of a verified Okta ID token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdTokenClaims {
    /// Subject (Okta user id)
    pub sub: String,
    /// Issuer
    pub iss: String,
    /// Issued at
    pub iat: i64,
    /// Expiration
    pub exp: i64,
    pub email: Option<String>,
    pub name: Option<String>,
    pub preferred_username: Option<String>,
}

/// Pull the bearer token out of the request headers.
///
/// API Gateway keeps header case as sent when running locally, so both
/// `authorization` and `Authorization` are checked.
pub fn bearer_token(headers: &HashMap<String, String>) -> Result<String> {
    let header = headers
        .get("authorization")
        .or_else(|| headers.get("Authorization"))
        .ok_or_else(|| Error::Unauthorized("Unauthorized - Missing Authorization Header".to_string()))?;

    if !bearer_pattern().is_match(header) {
        warn!("Invalid token format");
        return Err(Error::Unauthorized(
            "Unauthorized - Invalid token format".to_string(),
        ));
    }

    Ok(header
        .split(' ')
        .nth(1)
        .map(str::trim)
        .unwrap_or_default()
        .to_string())
}

/// Verifies identity tokens against an identity provider.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify_id_token(&self, okta: &OktaSecrets, token: &str) -> Result<IdTokenClaims>;
}

/// Where JSON Web Key Sets are loaded from.
#[async_trait]
pub trait KeySetSource: Send + Sync {
    async fn fetch_key_set(&self, jwks_uri: &str) -> Result<JwkSet>;
}

#[async_trait]
impl KeySetSource for reqwest::Client {
    async fn fetch_key_set(&self, jwks_uri: &str) -> Result<JwkSet> {
        Ok(self
            .get(jwks_uri)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?)
    }
}

/// Minimum time between two fetches of the same key set.
pub const JWKS_REFETCH_INTERVAL: Duration = Duration::from_secs(60);

/// Key set location for an Okta org issuer.
pub fn jwks_uri(issuer: &str) -> String {
    format!("{}/oauth2/v1/keys", issuer.trim_end_matches('/'))
}

struct CachedKeySet {
    keys: JwkSet,
    fetched_at: Instant,
}

/// Verifies RS256 ID tokens against the issuer's published key set.
///
/// Key sets are cached per JWKS URI. A token naming an unknown key id
/// triggers a refetch, at most once per refetch interval for each URI.
pub struct OktaJwtVerifier<K = reqwest::Client> {
    keys: K,
    refetch_interval: Duration,
    key_sets: RwLock<HashMap<String, CachedKeySet>>,
}

impl Default for OktaJwtVerifier {
    fn default() -> Self {
        Self::new(reqwest::Client::new())
    }
}

impl OktaJwtVerifier {
    pub fn new(http: reqwest::Client) -> Self {
        Self::with_source(http)
    }
}

impl<K: KeySetSource> OktaJwtVerifier<K> {
    pub fn with_source(keys: K) -> Self {
        Self {
            keys,
            refetch_interval: JWKS_REFETCH_INTERVAL,
            key_sets: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_refetch_interval(mut self, interval: Duration) -> Self {
        self.refetch_interval = interval;
        self
    }

    async fn decoding_key(&self, jwks_uri: &str, kid: &str) -> Result<DecodingKey> {
        {
            let key_sets = self.key_sets.read().await;
            if let Some(jwk) = key_sets.get(jwks_uri).and_then(|cached| cached.keys.find(kid)) {
                return to_decoding_key(jwk);
            }
        }

        let mut key_sets = self.key_sets.write().await;
        if let Some(cached) = key_sets.get(jwks_uri) {
            // Another request may have refreshed the set while we waited
            if let Some(jwk) = cached.keys.find(kid) {
                return to_decoding_key(jwk);
            }
            if cached.fetched_at.elapsed() < self.refetch_interval {
                warn!(jwks_uri, kid, "Unknown key id, signing keys fetched recently");
                return Err(unknown_kid(kid));
            }
        }

        debug!(jwks_uri, kid, "Fetching signing keys");
        let keys = self.keys.fetch_key_set(jwks_uri).await?;
        let key = keys
            .find(kid)
            .ok_or_else(|| unknown_kid(kid))
            .and_then(to_decoding_key);

        key_sets.insert(
            jwks_uri.to_string(),
            CachedKeySet {
                keys,
                fetched_at: Instant::now(),
            },
        );

        key
    }
}

fn to_decoding_key(jwk: &Jwk) -> Result<DecodingKey> {
    DecodingKey::from_jwk(jwk).map_err(|e| Error::Auth(format!("Unusable signing key: {}", e)))
}

fn unknown_kid(kid: &str) -> Error {
    Error::Auth(format!("No signing key with kid {}", kid))
}

#[async_trait]
impl<K: KeySetSource> TokenVerifier for OktaJwtVerifier<K> {
    async fn verify_id_token(&self, okta: &OktaSecrets, token: &str) -> Result<IdTokenClaims> {
        let header = decode_header(token)
            .map_err(|e| Error::Auth(format!("Malformed token: {}", e)))?;

        if header.alg != Algorithm::RS256 {
            return Err(Error::Auth(format!(
                "Unsupported signing algorithm: {:?}",
                header.alg
            )));
        }

        let kid = header
            .kid
            .ok_or_else(|| Error::Auth("Token has no key id".to_string()))?;

        let key = self
            .decoding_key(&jwks_uri(&okta.okta_issuer_uri), &kid)
            .await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[&okta.okta_issuer_uri]);
        validation.set_audience(&[&okta.okta_client_id]);

        let token_data = decode::<IdTokenClaims>(token, &key, &validation)
            .map_err(|e| Error::Auth(format!("Failed to verify token: {}", e)))?;

        Ok(token_data.claims)
    }
}
