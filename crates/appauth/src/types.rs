//! Results returned to the caller
//!
//! Token material is handed back as plain strings: storing it securely is the
//! host's job. `Debug` output of every result redacts credentials.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of the authorization step
///
/// Returned directly by `only_authorize`, it carries everything a later
/// `exchange_code` needs (except the client secret).
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationResult {
    /// Authorization code
    pub authorization_code: String,
    /// State that was sent and verified
    pub state: String,
    /// Every parameter of the redirect
    pub raw_parameters: BTreeMap<String, String>,
    /// PKCE verifier for the exchange
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_verifier: Option<String>,
    /// Nonce to verify in the ID token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    /// Scopes that were requested
    pub scopes: Vec<String>,
    /// Redirect URI used for the request
    pub redirect_url: String,
}

impl AuthorizationResult {
    /// Redirect parameters other than `code` and `state`
    pub fn additional_parameters(&self) -> BTreeMap<String, String> {
        self.raw_parameters
            .iter()
            .filter(|(key, _)| !matches!(key.as_str(), "code" | "state"))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }
}

impl fmt::Debug for AuthorizationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizationResult")
            .field("authorization_code", &"[REDACTED]")
            .field("state", &self.state)
            .field("raw_parameters", &self.additional_parameters())
            .field("code_verifier", &self.code_verifier.as_ref().map(|_| "[REDACTED]"))
            .field("nonce", &self.nonce)
            .field("scopes", &self.scopes)
            .field("redirect_url", &self.redirect_url)
            .finish()
    }
}

/// Tokens from a code exchange or refresh
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResult {
    /// Access token
    pub access_token: String,
    /// When the access token expires; `None` when the provider gave no lifetime
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token_expiration: Option<DateTime<Utc>>,
    /// OpenID ID token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    /// Refresh token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Token type, `Bearer` when the provider omits it
    pub token_type: String,
    /// Granted scopes; the requested scopes when the provider omits `scope`
    pub scopes: Vec<String>,
    /// Unrecognized token response fields
    #[serde(default)]
    pub additional_parameters: BTreeMap<String, serde_json::Value>,
    /// Extra parameters from the authorization redirect
    #[serde(default)]
    pub authorize_additional_parameters: BTreeMap<String, String>,
}

impl TokenResult {
    /// Whether the access token has expired at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.access_token_expiration
            .is_some_and(|expiration| expiration <= now)
    }
}

impl fmt::Debug for TokenResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenResult")
            .field("access_token", &"[REDACTED]")
            .field("access_token_expiration", &self.access_token_expiration)
            .field("id_token", &self.id_token.as_ref().map(|_| "[REDACTED]"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("token_type", &self.token_type)
            .field("scopes", &self.scopes)
            .field(
                "additional_parameters",
                &self.additional_parameters.keys().collect::<Vec<_>>(),
            )
            .field(
                "authorize_additional_parameters",
                &self.authorize_additional_parameters,
            )
            .finish()
    }
}

/// Registered client (RFC 7591 Section 3.2.1)
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationResult {
    /// Issued client identifier
    pub client_id: String,
    /// Issued client secret
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    /// When the client id was issued
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id_issued_at: Option<DateTime<Utc>>,
    /// When the secret expires; `None` when it never does
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret_expires_at: Option<DateTime<Utc>>,
    /// Token for the client configuration endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_access_token: Option<String>,
    /// Client configuration endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_client_uri: Option<String>,
    /// Authentication method the provider assigned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_endpoint_auth_method: Option<String>,
    /// Remaining registered metadata
    #[serde(default)]
    pub additional_parameters: BTreeMap<String, serde_json::Value>,
}

impl fmt::Debug for RegistrationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrationResult")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "[REDACTED]"))
            .field("client_id_issued_at", &self.client_id_issued_at)
            .field("client_secret_expires_at", &self.client_secret_expires_at)
            .field(
                "registration_access_token",
                &self.registration_access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("registration_client_uri", &self.registration_client_uri)
            .field("token_endpoint_auth_method", &self.token_endpoint_auth_method)
            .field("additional_parameters", &self.additional_parameters)
            .finish()
    }
}

/// Completed RP-initiated logout
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndSessionResult {
    /// State returned by the provider
    pub state: String,
    /// ID token that was sent as the hint
    pub id_token_hint: String,
    /// Where the provider redirected after logout
    pub post_logout_redirect_uri: String,
}

impl fmt::Debug for EndSessionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndSessionResult")
            .field("state", &self.state)
            .field("id_token_hint", &"[REDACTED]")
            .field("post_logout_redirect_uri", &self.post_logout_redirect_uri)
            .finish()
    }
}
