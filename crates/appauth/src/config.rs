//! Client and registration configuration
//!
//! Configuration structs deserialize from the camelCase JSON documents native
//! hosts already use (`clientId`, `redirectUrl`, `serviceConfiguration`, ...),
//! and can also be assembled programmatically with the builder methods.
//!
//! ```
//! use appauth::{ClientConfiguration, ProviderSource};
//!
//! let config = ClientConfiguration::new(
//!     ProviderSource::issuer("https://accounts.example.com"),
//!     "native-client",
//! )
//! .with_redirect_url("com.example.app:/oauth2redirect")
//! .with_scopes(["openid", "profile"]);
//!
//! assert!(config.use_pkce);
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::discovery::ProviderEndpoints;
use crate::error::{ConfigurationError, Result};

/// Default bound on every network round trip
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// How the client secret is presented to the token endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientAuthMethod {
    /// `Authorization: Basic` header (`client_secret_basic`)
    #[default]
    Basic,
    /// `client_id` and `client_secret` in the form body (`client_secret_post`)
    Post,
}

/// Request phase a set of custom headers applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HeaderPhase {
    /// Discovery for the authorization flows
    Authorize,
    /// Token, refresh and revocation requests
    Token,
    /// Registration and its discovery
    Register,
}

impl HeaderPhase {
    /// Key used for this phase in configuration documents
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Authorize => "authorize",
            Self::Token => "token",
            Self::Register => "register",
        }
    }

    /// Parse a configuration key
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "authorize" => Some(Self::Authorize),
            "token" => Some(Self::Token),
            "register" => Some(Self::Register),
            _ => None,
        }
    }
}

/// Where provider endpoints come from
///
/// A configuration always names either an issuer, explicit endpoints, or both.
/// When both are present the explicit endpoints override discovered ones
/// field by field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ProviderFields", into = "ProviderFields")]
pub enum ProviderSource {
    /// Resolve everything through OpenID discovery
    Issuer(String),
    /// Use only the supplied endpoints, never touching the network for metadata
    Endpoints(ProviderEndpoints),
    /// Discover, then let the supplied endpoints win
    IssuerWithOverrides {
        /// Issuer to discover
        issuer: String,
        /// Explicit endpoints layered over the discovered document
        endpoints: ProviderEndpoints,
    },
}

impl ProviderSource {
    /// Discovery-only source
    pub fn issuer(issuer: impl Into<String>) -> Self {
        Self::Issuer(issuer.into())
    }

    /// Explicit-endpoints-only source
    pub fn endpoints(endpoints: ProviderEndpoints) -> Self {
        Self::Endpoints(endpoints)
    }

    /// The issuer, if discovery is possible
    pub fn issuer_url(&self) -> Option<&str> {
        match self {
            Self::Issuer(issuer) | Self::IssuerWithOverrides { issuer, .. } => Some(issuer),
            Self::Endpoints(_) => None,
        }
    }

    /// Explicitly configured endpoints, if any
    pub fn explicit_endpoints(&self) -> Option<&ProviderEndpoints> {
        match self {
            Self::Endpoints(endpoints) | Self::IssuerWithOverrides { endpoints, .. } => {
                Some(endpoints)
            }
            Self::Issuer(_) => None,
        }
    }
}

/// Wire shape of [`ProviderSource`] inside configuration documents
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProviderFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    issuer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    service_configuration: Option<ProviderEndpoints>,
}

impl TryFrom<ProviderFields> for ProviderSource {
    type Error = ConfigurationError;

    fn try_from(fields: ProviderFields) -> std::result::Result<Self, Self::Error> {
        let issuer = fields.issuer.filter(|issuer| !issuer.trim().is_empty());
        match (issuer, fields.service_configuration) {
            (Some(issuer), Some(endpoints)) => Ok(Self::IssuerWithOverrides { issuer, endpoints }),
            (Some(issuer), None) => Ok(Self::Issuer(issuer)),
            (None, Some(endpoints)) => Ok(Self::Endpoints(endpoints)),
            (None, None) => Err(ConfigurationError::MissingProvider {
                operation: "configuration",
                endpoint: "serviceConfiguration",
            }),
        }
    }
}

impl From<ProviderSource> for ProviderFields {
    fn from(source: ProviderSource) -> Self {
        match source {
            ProviderSource::Issuer(issuer) => Self {
                issuer: Some(issuer),
                service_configuration: None,
            },
            ProviderSource::Endpoints(endpoints) => Self {
                issuer: None,
                service_configuration: Some(endpoints),
            },
            ProviderSource::IssuerWithOverrides { issuer, endpoints } => Self {
                issuer: Some(issuer),
                service_configuration: Some(endpoints),
            },
        }
    }
}

/// Network behaviour shared by client and registration configurations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSettings {
    /// Extra headers per phase (`authorize`, `token`, `register`)
    ///
    /// Phase keys are checked by the validator so unknown phases surface as
    /// configuration errors instead of being silently ignored.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom_headers: BTreeMap<String, BTreeMap<String, String>>,

    /// Bound on each network round trip
    #[serde(
        default = "default_connection_timeout",
        rename = "connectionTimeoutSeconds",
        serialize_with = "serialize_seconds",
        deserialize_with = "deserialize_seconds"
    )]
    pub connection_timeout: Duration,

    /// Bound on the wait for the redirect; unbounded when absent
    #[serde(
        default,
        rename = "authorizationTimeoutSeconds",
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_optional_seconds",
        deserialize_with = "deserialize_optional_seconds"
    )]
    pub authorization_timeout: Option<Duration>,

    /// Permit plain `http://` endpoints (development only)
    #[serde(default, alias = "dangerouslyAllowInsecureHttpRequests")]
    pub insecure_http_allowed: bool,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            custom_headers: BTreeMap::new(),
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
            authorization_timeout: None,
            insecure_http_allowed: false,
        }
    }
}

impl ConnectionSettings {
    /// Custom headers configured for `phase`
    pub fn headers_for(&self, phase: HeaderPhase) -> Option<&BTreeMap<String, String>> {
        self.custom_headers.get(phase.as_str())
    }
}

/// Configuration for the authorization, refresh, revocation and logout operations
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfiguration {
    /// Issuer and/or explicit endpoints
    #[serde(flatten)]
    pub provider: ProviderSource,

    /// OAuth client identifier
    pub client_id: String,

    /// Client secret for confidential clients
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_optional_secret",
        deserialize_with = "deserialize_optional_secret"
    )]
    pub client_secret: Option<SecretString>,

    /// Redirect URI registered with the provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,

    /// Requested scopes
    #[serde(default)]
    pub scopes: Vec<String>,

    /// Extra authorization request parameters, also forwarded to the code exchange
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub additional_parameters: BTreeMap<String, String>,

    /// Client authentication at the token endpoint
    #[serde(default)]
    pub client_auth_method: ClientAuthMethod,

    /// Send and verify an OpenID nonce
    #[serde(default = "default_true")]
    pub use_nonce: bool,

    /// Use PKCE with S256
    #[serde(default = "default_true", rename = "usePKCE")]
    pub use_pkce: bool,

    /// Headers, timeouts and transport policy
    #[serde(flatten)]
    pub connection: ConnectionSettings,
}

impl fmt::Debug for ClientConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfiguration")
            .field("provider", &self.provider)
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("redirect_url", &self.redirect_url)
            .field("scopes", &self.scopes)
            .field("additional_parameters", &self.additional_parameters)
            .field("client_auth_method", &self.client_auth_method)
            .field("use_nonce", &self.use_nonce)
            .field("use_pkce", &self.use_pkce)
            .field("connection", &self.connection)
            .finish()
    }
}

impl ClientConfiguration {
    /// Create a public-client configuration with PKCE and nonce enabled
    pub fn new(provider: ProviderSource, client_id: impl Into<String>) -> Self {
        Self {
            provider,
            client_id: client_id.into(),
            client_secret: None,
            redirect_url: None,
            scopes: Vec::new(),
            additional_parameters: BTreeMap::new(),
            client_auth_method: ClientAuthMethod::default(),
            use_nonce: true,
            use_pkce: true,
            connection: ConnectionSettings::default(),
        }
    }

    /// Parse a JSON configuration document
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the document does not match the
    /// expected shape (including non-numeric timeouts).
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| ConfigurationError::Malformed(e.to_string()).into())
    }

    /// Set the redirect URI
    pub fn with_redirect_url(mut self, redirect_url: impl Into<String>) -> Self {
        self.redirect_url = Some(redirect_url.into());
        self
    }

    /// Replace the requested scopes
    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Set the client secret
    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(SecretString::new(secret.into()));
        self
    }

    /// Choose how the client secret is sent
    pub fn with_client_auth_method(mut self, method: ClientAuthMethod) -> Self {
        self.client_auth_method = method;
        self
    }

    /// Add one additional authorization parameter
    pub fn with_additional_parameter(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.additional_parameters.insert(key.into(), value.into());
        self
    }

    /// Add a custom header for one phase
    pub fn with_header(
        mut self,
        phase: HeaderPhase,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.connection
            .custom_headers
            .entry(phase.as_str().to_string())
            .or_default()
            .insert(name.into(), value.into());
        self
    }

    /// Enable or disable PKCE
    pub fn with_pkce(mut self, enabled: bool) -> Self {
        self.use_pkce = enabled;
        self
    }

    /// Enable or disable the OpenID nonce
    pub fn with_nonce(mut self, enabled: bool) -> Self {
        self.use_nonce = enabled;
        self
    }

    /// Bound every network round trip
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection.connection_timeout = timeout;
        self
    }

    /// Bound the wait for the redirect
    pub fn with_authorization_timeout(mut self, timeout: Duration) -> Self {
        self.connection.authorization_timeout = Some(timeout);
        self
    }

    /// Permit plain `http://` endpoints
    pub fn allow_insecure_http(mut self) -> Self {
        self.connection.insecure_http_allowed = true;
        self
    }
}

/// Configuration for dynamic client registration (RFC 7591)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationConfiguration {
    /// Issuer and/or explicit endpoints
    #[serde(flatten)]
    pub provider: ProviderSource,

    /// Redirect URIs to register
    pub redirect_urls: Vec<String>,

    /// `response_types` metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_types: Option<Vec<String>>,

    /// `grant_types` metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grant_types: Option<Vec<String>>,

    /// `subject_type` metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_type: Option<String>,

    /// `token_endpoint_auth_method` metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_endpoint_auth_method: Option<String>,

    /// Extra metadata fields; never override the ones above
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub additional_parameters: BTreeMap<String, String>,

    /// Headers, timeouts and transport policy
    #[serde(flatten)]
    pub connection: ConnectionSettings,
}

impl RegistrationConfiguration {
    /// Create a registration configuration for the given redirect URIs
    pub fn new<I, S>(provider: ProviderSource, redirect_urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            provider,
            redirect_urls: redirect_urls.into_iter().map(Into::into).collect(),
            response_types: None,
            grant_types: None,
            subject_type: None,
            token_endpoint_auth_method: None,
            additional_parameters: BTreeMap::new(),
            connection: ConnectionSettings::default(),
        }
    }

    /// Parse a JSON configuration document
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the document does not match the
    /// expected shape.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| ConfigurationError::Malformed(e.to_string()).into())
    }

    /// Set `grant_types`
    pub fn with_grant_types<I, S>(mut self, grant_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.grant_types = Some(grant_types.into_iter().map(Into::into).collect());
        self
    }

    /// Set `response_types`
    pub fn with_response_types<I, S>(mut self, response_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.response_types = Some(response_types.into_iter().map(Into::into).collect());
        self
    }

    /// Set `token_endpoint_auth_method`
    pub fn with_token_endpoint_auth_method(mut self, method: impl Into<String>) -> Self {
        self.token_endpoint_auth_method = Some(method.into());
        self
    }

    /// Add one extra metadata field
    pub fn with_additional_parameter(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.additional_parameters.insert(key.into(), value.into());
        self
    }

    /// Permit plain `http://` endpoints
    pub fn allow_insecure_http(mut self) -> Self {
        self.connection.insecure_http_allowed = true;
        self
    }
}

/// Options for a refresh-token grant
#[derive(Clone)]
pub struct RefreshOptions {
    /// Refresh token issued earlier
    pub refresh_token: SecretString,
    /// Extra form fields for this request
    pub additional_parameters: BTreeMap<String, String>,
}

impl RefreshOptions {
    /// Refresh with the given token
    pub fn new(refresh_token: impl Into<String>) -> Self {
        Self {
            refresh_token: SecretString::new(refresh_token.into()),
            additional_parameters: BTreeMap::new(),
        }
    }
}

impl fmt::Debug for RefreshOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshOptions")
            .field("refresh_token", &"[REDACTED]")
            .field("additional_parameters", &self.additional_parameters)
            .finish()
    }
}

/// Options for token revocation (RFC 7009)
#[derive(Clone)]
pub struct RevokeOptions {
    /// Token to invalidate
    pub token_to_revoke: SecretString,
    /// Include `client_id` in the form body
    pub send_client_id: bool,
    /// Authenticate with `Authorization: Basic` when a secret is configured
    pub include_basic_auth: bool,
    /// `token_type_hint` (`access_token` or `refresh_token`)
    pub token_type_hint: Option<String>,
}

impl RevokeOptions {
    /// Revoke the given token without client authentication
    pub fn new(token_to_revoke: impl Into<String>) -> Self {
        Self {
            token_to_revoke: SecretString::new(token_to_revoke.into()),
            send_client_id: false,
            include_basic_auth: false,
            token_type_hint: None,
        }
    }

    /// Send `client_id` in the body
    pub fn send_client_id(mut self) -> Self {
        self.send_client_id = true;
        self
    }

    /// Send Basic client credentials
    pub fn include_basic_auth(mut self) -> Self {
        self.include_basic_auth = true;
        self
    }

    /// Hint the token type
    pub fn with_token_type_hint(mut self, hint: impl Into<String>) -> Self {
        self.token_type_hint = Some(hint.into());
        self
    }
}

impl fmt::Debug for RevokeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RevokeOptions")
            .field("token_to_revoke", &"[REDACTED]")
            .field("send_client_id", &self.send_client_id)
            .field("include_basic_auth", &self.include_basic_auth)
            .field("token_type_hint", &self.token_type_hint)
            .finish()
    }
}

/// Options for RP-initiated logout
#[derive(Clone)]
pub struct EndSessionOptions {
    /// ID token previously issued to the client
    pub id_token: SecretString,
    /// Where the provider sends the user after logout
    pub post_logout_redirect_url: String,
    /// Extra query parameters
    pub additional_parameters: BTreeMap<String, String>,
}

impl EndSessionOptions {
    /// Log out the session identified by `id_token`
    pub fn new(id_token: impl Into<String>, post_logout_redirect_url: impl Into<String>) -> Self {
        Self {
            id_token: SecretString::new(id_token.into()),
            post_logout_redirect_url: post_logout_redirect_url.into(),
            additional_parameters: BTreeMap::new(),
        }
    }
}

impl fmt::Debug for EndSessionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndSessionOptions")
            .field("id_token", &"[REDACTED]")
            .field("post_logout_redirect_url", &self.post_logout_redirect_url)
            .field("additional_parameters", &self.additional_parameters)
            .finish()
    }
}

/// Options for the second half of a split flow
#[derive(Clone, Default)]
pub struct TokenExchangeOptions {
    /// Client secret for this exchange, overriding the configuration's
    pub client_secret: Option<SecretString>,
    /// Extra form fields for the token request
    pub additional_parameters: BTreeMap<String, String>,
}

impl TokenExchangeOptions {
    /// Supply the client secret for this exchange
    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(SecretString::new(secret.into()));
        self
    }
}

impl fmt::Debug for TokenExchangeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenExchangeOptions")
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("additional_parameters", &self.additional_parameters)
            .finish()
    }
}

fn default_true() -> bool {
    true
}

fn default_connection_timeout() -> Duration {
    DEFAULT_CONNECTION_TIMEOUT
}

fn serialize_seconds<S>(duration: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_f64(duration.as_secs_f64())
}

fn deserialize_seconds<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let seconds = f64::deserialize(deserializer)?;
    Duration::try_from_secs_f64(seconds).map_err(serde::de::Error::custom)
}

fn serialize_optional_seconds<S>(
    duration: &Option<Duration>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match duration {
        Some(duration) => serializer.serialize_some(&duration.as_secs_f64()),
        None => serializer.serialize_none(),
    }
}

fn deserialize_optional_seconds<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<f64>::deserialize(deserializer)?
        .map(|seconds| Duration::try_from_secs_f64(seconds).map_err(serde::de::Error::custom))
        .transpose()
}

fn serialize_optional_secret<S>(
    secret: &Option<SecretString>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match secret {
        Some(secret) => serializer.serialize_some(secret.expose_secret()),
        None => serializer.serialize_none(),
    }
}

fn deserialize_optional_secret<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    let secret: Option<String> = Option::deserialize(deserializer)?;
    Ok(secret.map(SecretString::new))
}
