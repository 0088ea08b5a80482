//! Configuration management for Lambda functions.

use std::env;

use crate::{Error, Result};

/// Environment variables naming secrets the authorizer grants read access to.
const GRANTED_SECRET_VARS: [&str; 4] = [
    "SHARED_GC_SECRETS_ID",
    "SHARED_MA_SECRETS_ID",
    "OPENSEARCH_MANAGER_ID",
    "PINOT_MANAGER_ID",
];

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// AWS region
    pub aws_region: String,
    /// Default id of the shared secrets bundle (stage variables may override it)
    pub shared_secrets_id: String,
    /// Id of the secret holding the Okta issuer and client id
    pub okta_secrets_id: Option<String>,
    /// Referer identifying requests from the Music & Arts portal
    pub music_arts_referer_url: Option<String>,
    /// Secret ids an authorized caller may read
    pub granted_secret_ids: Vec<String>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|value| !value.is_empty());

        Ok(Self {
            aws_region: non_empty("AWS_REGION").unwrap_or_else(|| "us-west-2".to_string()),
            shared_secrets_id: non_empty("SHARED_SECRETS_ID")
                .ok_or_else(|| Error::Config("SHARED_SECRETS_ID not set".to_string()))?,
            okta_secrets_id: non_empty("OKTA_SECRETS_MANAGER_ID"),
            music_arts_referer_url: non_empty("MUSIC_ARTS_REFERER_URL"),
            granted_secret_ids: GRANTED_SECRET_VARS
                .iter()
                .filter_map(|name| non_empty(*name))
                .collect(),
        })
    }

    /// Okta secrets id, required by the authorizer.
    pub fn require_okta_secrets_id(&self) -> Result<&str> {
        self.okta_secrets_id
            .as_deref()
            .ok_or_else(|| Error::Config("OKTA_SECRETS_MANAGER_ID not set".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[("SHARED_SECRETS_ID", "portal/shared")])).unwrap();
        assert_eq!(config.aws_region, "us-west-2");
        assert_eq!(config.shared_secrets_id, "portal/shared");
        assert!(config.okta_secrets_id.is_none());
        assert!(config.granted_secret_ids.is_empty());
        assert!(config.require_okta_secrets_id().is_err());
    }

    #[test]
    fn test_missing_shared_secrets_id() {
        let err = Config::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_granted_secret_ids_skip_unset() {
        let config = Config::from_lookup(lookup(&[
            ("SHARED_SECRETS_ID", "shared"),
            ("SHARED_GC_SECRETS_ID", "gc"),
            ("PINOT_MANAGER_ID", "pinot"),
            ("OPENSEARCH_MANAGER_ID", ""),
            ("AWS_REGION", "us-east-1"),
        ]))
        .unwrap();
        assert_eq!(config.granted_secret_ids, vec!["gc", "pinot"]);
        assert_eq!(config.aws_region, "us-east-1");
    }
}
