//! Parsing of API Gateway `execute-api` method ARNs.

use crate::{Error, Result};

/// Resource-path segments containing one of these (case-insensitively)
/// are taken as the deployment stage.
const STAGE_MARKERS: [&str; 2] = ["prod", "stage"];

/// Components of a method ARN such as
/// `arn:aws:execute-api:us-west-2:123456789012:abc123/Prod/GET/students`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArnPath {
    pub service: String,
    pub region: String,
    pub account_id: String,
    pub api_id: String,
    pub stage: Option<String>,
    pub resource_remainder: String,
}

/// Split a method ARN into its API id, stage and remaining route.
pub fn extract_arn_path(arn: &str) -> Result<ArnPath> {
    let parts: Vec<&str> = arn.split(':').collect();
    if parts.len() < 6 || parts[0] != "arn" {
        return Err(Error::InvalidArn("Invalid ARN".to_string()));
    }

    let service = parts[2];
    let region = parts[3];
    let account_id = parts[4];
    let resource = parts[5..].join(":");

    let mut segments = resource.split('/');
    let api_id = segments.next().unwrap_or_default();
    let path: Vec<&str> = segments.collect();

    let stage = path
        .iter()
        .find(|segment| {
            let lowered = segment.to_lowercase();
            STAGE_MARKERS.iter().any(|marker| lowered.contains(*marker))
        })
        .copied();

    let resource_remainder = match stage {
        Some(stage) => path
            .iter()
            .filter(|segment| **segment != stage)
            .copied()
            .collect::<Vec<_>>()
            .join("/"),
        None => path.join("/"),
    };

    Ok(ArnPath {
        service: service.to_string(),
        region: region.to_string(),
        account_id: account_id.to_string(),
        api_id: api_id.to_string(),
        stage: stage.map(str::to_string),
        resource_remainder,
    })
}
