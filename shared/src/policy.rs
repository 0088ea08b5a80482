//! API Gateway authorizer contract and IAM policy documents.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::arn::ArnPath;

/// IAM policy language version.
pub const POLICY_VERSION: &str = "2012-10-17";

/// Principal reported when a request is denied.
pub const UNAUTHORIZED_PRINCIPAL: &str = "unauthorized";

const DYNAMODB_STREAM_ACTIONS: [&str; 6] = [
    "dynamodb:GetShardIterator",
    "dynamodb:Scan",
    "dynamodb:Query",
    "dynamodb:DescribeStream",
    "dynamodb:GetRecords",
    "dynamodb:ListStreams",
];

const DYNAMODB_TABLE_ACTIONS: [&str; 10] = [
    "dynamodb:BatchGetItem",
    "dynamodb:BatchWriteItem",
    "dynamodb:ConditionCheckItem",
    "dynamodb:PutItem",
    "dynamodb:DescribeTable",
    "dynamodb:DeleteItem",
    "dynamodb:GetItem",
    "dynamodb:Scan",
    "dynamodb:Query",
    "dynamodb:UpdateItem",
];

fn null_as_empty<'de, D>(deserializer: D) -> Result<HashMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<HashMap<String, String>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Look up a header by name, falling back to a case-insensitive match.
pub fn header<'a>(headers: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .or_else(|| {
            headers
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, value)| value)
        })
        .map(String::as_str)
}

/// REQUEST authorizer event (simplified).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizerRequest {
    pub method_arn: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub headers: HashMap<String, String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub stage_variables: HashMap<String, String>,
}

/// Portal brand a request is made for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Brand {
    /// Guitar Center
    #[default]
    Gc,
    /// Music & Arts
    Ma,
}

impl Brand {
    pub fn as_str(&self) -> &'static str {
        match self {
            Brand::Gc => "gc",
            Brand::Ma => "ma",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "gc" => Some(Brand::Gc),
            "ma" => Some(Brand::Ma),
            _ => None,
        }
    }

    /// `Ma` when the referer is the Music & Arts portal, otherwise `Gc`.
    pub fn from_referer(referer: Option<&str>, music_arts_referer: Option<&str>) -> Self {
        match (referer, music_arts_referer) {
            (Some(referer), Some(music_arts)) if referer == music_arts => Brand::Ma,
            _ => Brand::Gc,
        }
    }

    /// Brand from request headers; `X-Referer-Override` wins over `Referer`.
    pub fn from_headers(headers: &HashMap<String, String>, music_arts_referer: Option<&str>) -> Self {
        let referer = header(headers, "X-Referer-Override").or_else(|| header(headers, "Referer"));
        Self::from_referer(referer, music_arts_referer)
    }
}

/// One action/resource or a list of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl From<&str> for OneOrMany {
    fn from(value: &str) -> Self {
        OneOrMany::One(value.to_string())
    }
}

impl From<String> for OneOrMany {
    fn from(value: String) -> Self {
        OneOrMany::One(value)
    }
}

impl From<Vec<String>> for OneOrMany {
    fn from(values: Vec<String>) -> Self {
        OneOrMany::Many(values)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    Allow,
    Deny,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Statement {
    pub action: OneOrMany,
    pub effect: Effect,
    pub resource: OneOrMany,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyDocument {
    pub version: String,
    pub statement: Vec<Statement>,
}

impl PolicyDocument {
    pub fn new(statement: Vec<Statement>) -> Self {
        Self {
            version: POLICY_VERSION.to_string(),
            statement,
        }
    }
}

/// Authorizer result returned to API Gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizerResponse {
    pub principal_id: String,
    pub policy_document: PolicyDocument,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Map<String, Value>>,
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

/// Allow policy for a verified caller.
///
/// Grants invoke on every route of the calling API stage, access to the
/// account's DynamoDB tables and read access to `granted_secret_ids`.
pub fn allow_policy(
    principal_id: &str,
    arn: &ArnPath,
    granted_secret_ids: &[String],
    brand: Brand,
) -> AuthorizerResponse {
    let ArnPath {
        region, account_id, ..
    } = arn;
    let stage = arn.stage.as_deref().unwrap_or("*");

    let mut statement = vec![
        Statement {
            action: "execute-api:Invoke".into(),
            effect: Effect::Allow,
            resource: format!(
                "arn:aws:execute-api:{}:{}:{}/{}/*/*",
                region, account_id, arn.api_id, stage
            )
            .into(),
        },
        Statement {
            action: strings(&DYNAMODB_STREAM_ACTIONS).into(),
            effect: Effect::Allow,
            resource: vec![format!("arn:aws:dynamodb:{}:{}:table/*/*", region, account_id)].into(),
        },
        Statement {
            action: strings(&DYNAMODB_TABLE_ACTIONS).into(),
            effect: Effect::Allow,
            resource: vec![format!("arn:aws:dynamodb:{}:{}:table/*", region, account_id)].into(),
        },
    ];

    if !granted_secret_ids.is_empty() {
        statement.push(Statement {
            action: strings(&["secretsmanager:GetSecretValue"]).into(),
            effect: Effect::Allow,
            resource: granted_secret_ids
                .iter()
                .map(|id| format!("arn:aws:secretsmanager:{}:{}:secret:{}-*", region, account_id, id))
                .collect::<Vec<_>>()
                .into(),
        });
    }

    let mut context = Map::new();
    context.insert("brandId".to_string(), Value::from(brand.as_str()));

    AuthorizerResponse {
        principal_id: principal_id.to_string(),
        policy_document: PolicyDocument::new(statement),
        context: Some(context),
    }
}

/// Deny policy for the requested method.
pub fn deny_policy(method_arn: &str) -> AuthorizerResponse {
    AuthorizerResponse {
        principal_id: UNAUTHORIZED_PRINCIPAL.to_string(),
        policy_document: PolicyDocument::new(vec![Statement {
            action: "execute-api:Invoke".into(),
            effect: Effect::Deny,
            resource: method_arn.into(),
        }]),
        context: None,
    }
}
