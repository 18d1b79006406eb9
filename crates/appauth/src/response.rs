//! Provider response parsing
//!
//! Turns raw status and body into typed results or typed errors. Non-2xx
//! responses with an OAuth error body (RFC 6749 Section 5.2) become
//! [`AppAuthError::OAuth`]; anything else becomes [`AppAuthError::Transport`].

use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{AppAuthError, ProviderError, Result};
use crate::http::HttpResponse;
use crate::types::{RegistrationResult, TokenResult};

/// Longest raw body echoed into a transport error
const MAX_ERROR_BODY: usize = 512;

/// Revocation error codes that still mean the token is unusable
const IDEMPOTENT_REVOCATION_ERRORS: &[&str] = &["invalid_token", "unsupported_token_type"];

/// OAuth error payload
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    error_uri: Option<String>,
}

impl From<ErrorBody> for ProviderError {
    fn from(body: ErrorBody) -> Self {
        Self {
            code: body.error,
            description: body.error_description,
            uri: body.error_uri,
        }
    }
}

/// Token endpoint response (RFC 6749 Section 5.1)
#[derive(Debug, Deserialize)]
struct TokenResponseBody {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default, deserialize_with = "deserialize_seconds")]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    id_token: Option<String>,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(flatten)]
    extra: BTreeMap<String, Value>,
}

/// Registration endpoint response (RFC 7591 Section 3.2.1)
#[derive(Debug, Deserialize)]
struct RegistrationResponseBody {
    #[serde(default)]
    client_id: Option<String>,
    #[serde(default)]
    client_secret: Option<String>,
    #[serde(default, deserialize_with = "deserialize_seconds")]
    client_id_issued_at: Option<i64>,
    #[serde(default, deserialize_with = "deserialize_seconds")]
    client_secret_expires_at: Option<i64>,
    #[serde(default)]
    registration_access_token: Option<String>,
    #[serde(default)]
    registration_client_uri: Option<String>,
    #[serde(default)]
    token_endpoint_auth_method: Option<String>,
    #[serde(flatten)]
    extra: BTreeMap<String, Value>,
}

/// Claims this client reads from an ID token
#[derive(Debug, Deserialize)]
struct IdTokenClaims {
    #[serde(default)]
    nonce: Option<String>,
}

/// Map a failed response onto the error taxonomy
pub fn parse_error_response(response: &HttpResponse) -> AppAuthError {
    match serde_json::from_slice::<ErrorBody>(&response.body) {
        Ok(body) => {
            let error = ProviderError::from(body);
            warn!(status = response.status, error = %error.code, "provider returned an OAuth error");
            AppAuthError::OAuth {
                status: response.status,
                error,
            }
        }
        Err(_) => {
            let mut message = response.text();
            if message.len() > MAX_ERROR_BODY {
                let cut = (0..=MAX_ERROR_BODY)
                    .rev()
                    .find(|index| message.is_char_boundary(*index))
                    .unwrap_or(0);
                message.truncate(cut);
            }
            AppAuthError::Transport {
                status: Some(response.status),
                message,
            }
        }
    }
}

/// Parse a token endpoint response
///
/// `requested_scopes` become the granted scopes when the provider omits
/// `scope` (RFC 6749 Section 5.1).
///
/// # Errors
///
/// Returns the provider's OAuth error, a transport error for unparseable
/// failures, or [`AppAuthError::MalformedResponse`] for a 2xx body without an
/// access token.
pub fn parse_token_response(
    response: &HttpResponse,
    requested_scopes: &[String],
) -> Result<TokenResult> {
    if !response.is_success() {
        return Err(parse_error_response(response));
    }

    let body: TokenResponseBody = serde_json::from_slice(&response.body)
        .map_err(|e| AppAuthError::MalformedResponse(format!("token response is not JSON: {e}")))?;

    if body.error.is_some() && body.access_token.is_none() {
        return Err(parse_error_response(response));
    }

    let access_token = body
        .access_token
        .filter(|token| !token.is_empty())
        .ok_or_else(|| {
            AppAuthError::MalformedResponse("token response is missing access_token".to_string())
        })?;

    let access_token_expiration = body
        .expires_in
        .and_then(TimeDelta::try_seconds)
        .and_then(|lifetime| Utc::now().checked_add_signed(lifetime));

    let scopes = match body.scope {
        Some(scope) => scope.split_whitespace().map(str::to_string).collect(),
        None => requested_scopes.to_vec(),
    };

    debug!(
        has_refresh_token = body.refresh_token.is_some(),
        has_id_token = body.id_token.is_some(),
        "parsed token response"
    );

    Ok(TokenResult {
        access_token,
        access_token_expiration,
        id_token: body.id_token,
        refresh_token: body.refresh_token,
        token_type: body
            .token_type
            .filter(|token_type| !token_type.is_empty())
            .unwrap_or_else(|| "Bearer".to_string()),
        scopes,
        additional_parameters: body.extra,
        authorize_additional_parameters: BTreeMap::new(),
    })
}

/// Parse a registration endpoint response
///
/// # Errors
///
/// Returns the provider's OAuth error, a transport error, or
/// [`AppAuthError::MalformedResponse`] when `client_id` is missing.
pub fn parse_registration_response(response: &HttpResponse) -> Result<RegistrationResult> {
    if !response.is_success() {
        return Err(parse_error_response(response));
    }

    let body: RegistrationResponseBody = serde_json::from_slice(&response.body).map_err(|e| {
        AppAuthError::MalformedResponse(format!("registration response is not JSON: {e}"))
    })?;

    let client_id = body
        .client_id
        .filter(|client_id| !client_id.is_empty())
        .ok_or_else(|| {
            AppAuthError::MalformedResponse(
                "registration response is missing client_id".to_string(),
            )
        })?;

    Ok(RegistrationResult {
        client_id,
        client_secret: body.client_secret,
        client_id_issued_at: body.client_id_issued_at.and_then(timestamp),
        // 0 means the secret never expires (RFC 7591 Section 3.2.1)
        client_secret_expires_at: body
            .client_secret_expires_at
            .filter(|seconds| *seconds != 0)
            .and_then(timestamp),
        registration_access_token: body.registration_access_token,
        registration_client_uri: body.registration_client_uri,
        token_endpoint_auth_method: body.token_endpoint_auth_method,
        additional_parameters: body.extra,
    })
}

/// Interpret a revocation response (RFC 7009 Section 2.2)
///
/// # Errors
///
/// Returns the mapped error unless the response is 2xx or an error that
/// leaves the token unusable anyway.
pub fn parse_revocation_response(response: &HttpResponse) -> Result<()> {
    if response.is_success() {
        return Ok(());
    }

    match parse_error_response(response) {
        AppAuthError::OAuth { error, .. }
            if IDEMPOTENT_REVOCATION_ERRORS.contains(&error.code.as_str()) =>
        {
            debug!(error = %error.code, "treating revocation error as success");
            Ok(())
        }
        other => Err(other),
    }
}

/// The `nonce` claim of an ID token
///
/// Only the payload is decoded; signature validation is left to the host.
///
/// # Errors
///
/// Returns [`AppAuthError::MalformedResponse`] when the token is not a
/// three-part JWS with a JSON payload.
pub fn id_token_nonce(id_token: &str) -> Result<Option<String>> {
    let malformed = |reason: &str| AppAuthError::MalformedResponse(format!("id_token {reason}"));

    let mut parts = id_token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(malformed("is not a compact JWS"));
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|_| malformed("payload is not base64url"))?;
    let claims: IdTokenClaims =
        serde_json::from_slice(&bytes).map_err(|_| malformed("payload is not a JSON object"))?;

    Ok(claims.nonce)
}

fn timestamp(seconds: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(seconds, 0)
}

/// Numeric-seconds field that some providers send as a string
fn deserialize_seconds<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(number)) => Ok(number
            .as_i64()
            .or_else(|| number.as_f64().map(|seconds| seconds as i64))),
        Some(Value::String(text)) => text
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(serde::de::Error::custom),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected seconds, found {other}"
        ))),
    }
}
