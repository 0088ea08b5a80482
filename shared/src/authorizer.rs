//! Bearer token authorizer.
//!
//! Exchanges the caller's Okta ID token for an IAM policy. A token that
//! fails verification gets an explicit deny policy; a request without a
//! well-formed bearer header is rejected with [`Error::Unauthorized`],
//! which API Gateway reports as 401.

use tracing::{error, info, warn};

use crate::arn::extract_arn_path;
use crate::auth::{bearer_token, TokenVerifier};
use crate::policy::{allow_policy, deny_policy, AuthorizerRequest, AuthorizerResponse, Brand};
use crate::secrets::{OktaSecrets, SecretSource, SecretsCache};
use crate::{Config, Error, Result};

/// Authorize one request.
pub async fn authorize<S, V>(
    request: &AuthorizerRequest,
    config: &Config,
    secrets: &SecretsCache<S>,
    verifier: &V,
) -> Result<AuthorizerResponse>
where
    S: SecretSource,
    V: TokenVerifier + ?Sized,
{
    let token = bearer_token(&request.headers)?;
    let okta: OktaSecrets = secrets.get_as(config.require_okta_secrets_id()?).await?;

    match grant(request, config, &okta, verifier, &token).await {
        Ok(response) => {
            info!(principal_id = %response.principal_id, "Token verified");
            Ok(response)
        }
        Err(e) => {
            error!(error = %e, "Unable to verify token");
            Ok(deny_policy(&request.method_arn))
        }
    }
}

async fn grant<V>(
    request: &AuthorizerRequest,
    config: &Config,
    okta: &OktaSecrets,
    verifier: &V,
    token: &str,
) -> Result<AuthorizerResponse>
where
    V: TokenVerifier + ?Sized,
{
    let claims = verifier.verify_id_token(okta, token).await?;

    let arn = extract_arn_path(&request.method_arn).map_err(|e| {
        error!(method_arn = %request.method_arn, "Unable to parse Resource Arn");
        e
    })?;

    let brand = Brand::from_headers(&request.headers, config.music_arts_referer_url.as_deref());

    Ok(allow_policy(&claims.sub, &arn, &config.granted_secret_ids, brand))
}

/// Whether an error should surface as a bare 401 rather than a failure.
pub fn is_unauthorized(error: &Error) -> bool {
    matches!(error, Error::Unauthorized(_))
}

/// Convert an authorization error into the function's error.
///
/// API Gateway only answers 401 when the authorizer fails with the exact
/// message `Unauthorized`; anything else becomes a 500.
pub fn into_lambda_error(error: Error) -> lambda_http::Error {
    if is_unauthorized(&error) {
        "Unauthorized".into()
    } else {
        Box::new(error)
    }
}

/// [`authorize`] with errors already in the shape the Lambda runtime reports.
pub async fn handle_request<S, V>(
    request: &AuthorizerRequest,
    config: &Config,
    secrets: &SecretsCache<S>,
    verifier: &V,
) -> std::result::Result<AuthorizerResponse, lambda_http::Error>
where
    S: SecretSource,
    V: TokenVerifier + ?Sized,
{
    authorize(request, config, secrets, verifier).await.map_err(|e| {
        if is_unauthorized(&e) {
            warn!(reason = %e, method_arn = %request.method_arn, "Rejecting request");
        }
        into_lambda_error(e)
    })
}
