//! Error taxonomy for the client core
//!
//! Every public operation returns [`AppAuthError`]. Each variant maps onto one
//! [`ErrorKind`] so callers can decide between retrying, messaging the user or
//! aborting without matching on message strings.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::discovery::DiscoveryError;

/// Result type used throughout the crate
pub type Result<T> = std::result::Result<T, AppAuthError>;

/// Coarse classification of [`AppAuthError`] values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad caller input, never retried
    Configuration,
    /// Provider metadata could not be fetched or parsed
    Discovery,
    /// Plain `http://` rejected by policy
    InsecureTransport,
    /// The user (or the application) aborted the flow
    UserCancelled,
    /// A bounded wait elapsed
    Timeout,
    /// The provider denied the authorization request
    Authorization,
    /// The redirect carried a state that does not belong to this attempt
    StateMismatch,
    /// The ID token nonce does not belong to this attempt
    NonceMismatch,
    /// The code exchange was rejected or could not be performed
    TokenExchange,
    /// The provider answered with an OAuth error body
    OAuth,
    /// The provider answered with something that is not valid protocol
    MalformedResponse,
    /// Network failure or unparseable non-2xx response
    Transport,
    /// A second authorization attempt was started on a busy orchestrator
    FlowInProgress,
}

/// Error reported by the provider in an OAuth error payload or redirect
/// (RFC 6749 Section 4.1.2.1 and Section 5.2)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderError {
    /// The `error` code, e.g. `invalid_grant` or `access_denied`
    pub code: String,
    /// Human-readable `error_description`
    pub description: Option<String>,
    /// `error_uri` pointing at documentation
    pub uri: Option<String>,
}

impl ProviderError {
    /// Create a provider error with only a code
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            description: None,
            uri: None,
        }
    }

    /// Attach a description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.description {
            Some(description) => write!(f, "{} ({})", self.code, description),
            None => f.write_str(&self.code),
        }
    }
}

/// Structural problems found in caller-supplied configuration
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// Neither an issuer nor the endpoint needed by the operation was supplied
    #[error("you must provide either an issuer or a {endpoint} for {operation}")]
    MissingProvider {
        /// Operation being validated
        operation: &'static str,
        /// Endpoint field the operation needs
        endpoint: &'static str,
    },

    /// A required field is missing or empty
    #[error("{0} is required")]
    MissingField(&'static str),

    /// A URL-valued field does not parse
    #[error("{field} is not a valid URL: {reason}")]
    InvalidUrl {
        /// Offending field
        field: &'static str,
        /// Parser message
        reason: String,
    },

    /// Operation needs at least one scope
    #[error("please add at least one scope")]
    EmptyScopes,

    /// Custom header map uses a phase other than authorize, token or register
    #[error("custom headers phase `{0}` is not one of authorize, token, register")]
    UnknownHeaderPhase(String),

    /// Custom header name or value is not a valid HTTP header string
    #[error("invalid {phase} header `{name}`: {reason}")]
    InvalidHeader {
        /// Phase the header belongs to
        phase: String,
        /// Header name
        name: String,
        /// Why it was rejected
        reason: String,
    },

    /// Timeout values must be positive numbers
    #[error("{0} must be a positive number of seconds")]
    InvalidTimeout(&'static str),

    /// `only_token_exchange` called without a retained authorization
    #[error("no authorization response is pending for token exchange")]
    NoPendingAuthorization,

    /// Configuration document did not deserialize
    #[error("malformed configuration: {0}")]
    Malformed(String),
}

/// Errors returned at the boundary of every public operation
#[derive(Debug, Clone, Error)]
pub enum AppAuthError {
    /// Bad caller input
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// Metadata fetch or parse failure
    #[error("discovery failed for {issuer}: {source}")]
    Discovery {
        /// Issuer whose document was being resolved
        issuer: String,
        /// What went wrong
        source: DiscoveryError,
    },

    /// Plain HTTP endpoint while insecure transport is not allowed
    #[error("refusing insecure http endpoint {url}; enable insecure_http_allowed to permit it")]
    InsecureTransport {
        /// Rejected URL
        url: String,
    },

    /// The external agent reported cancellation or the flow was aborted
    #[error("authorization was cancelled")]
    UserCancelled,

    /// A bounded wait elapsed
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// What was being waited for
        operation: &'static str,
        /// The configured limit
        after: Duration,
    },

    /// The provider returned an `error` parameter in the redirect
    #[error("authorization failed: {0}")]
    Authorization(ProviderError),

    /// The redirect's `state` does not match the pending request
    #[error("state parameter mismatch - the redirect does not belong to this authorization request")]
    StateMismatch,

    /// The ID token nonce does not match the pending request
    #[error("id_token nonce does not match the authorization request")]
    NonceMismatch,

    /// Code exchange failed
    #[error("token exchange failed: {message}")]
    TokenExchange {
        /// Provider error, when the provider supplied one
        provider: Option<ProviderError>,
        /// Summary of the failure
        message: String,
    },

    /// OAuth error payload from the token, registration or revocation endpoint
    #[error("provider returned {status}: {error}")]
    OAuth {
        /// HTTP status of the response
        status: u16,
        /// Parsed error payload
        error: ProviderError,
    },

    /// The provider violated the protocol
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Network failure, or a non-2xx response without an OAuth error body
    #[error("transport error{}: {message}", status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Transport {
        /// HTTP status when a response arrived
        status: Option<u16>,
        /// Error message or raw body
        message: String,
    },

    /// Another authorization attempt is outstanding on this orchestrator
    #[error("an authorization flow is already in progress")]
    FlowInProgress,
}

impl AppAuthError {
    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Discovery { .. } => ErrorKind::Discovery,
            Self::InsecureTransport { .. } => ErrorKind::InsecureTransport,
            Self::UserCancelled => ErrorKind::UserCancelled,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Authorization(_) => ErrorKind::Authorization,
            Self::StateMismatch => ErrorKind::StateMismatch,
            Self::NonceMismatch => ErrorKind::NonceMismatch,
            Self::TokenExchange { .. } => ErrorKind::TokenExchange,
            Self::OAuth { .. } => ErrorKind::OAuth,
            Self::MalformedResponse(_) => ErrorKind::MalformedResponse,
            Self::Transport { .. } => ErrorKind::Transport,
            Self::FlowInProgress => ErrorKind::FlowInProgress,
        }
    }

    /// Whether repeating the same call later may succeed.
    ///
    /// Provider-reported grant failures are left to the caller and report `false`.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Discovery | ErrorKind::Timeout | ErrorKind::Transport
        )
    }

    /// The provider's error payload, if this error carries one
    pub fn provider_error(&self) -> Option<&ProviderError> {
        match self {
            Self::Authorization(error) | Self::OAuth { error, .. } => Some(error),
            Self::TokenExchange { provider, .. } => provider.as_ref(),
            _ => None,
        }
    }

    pub(crate) fn discovery(issuer: impl Into<String>, source: DiscoveryError) -> Self {
        Self::Discovery {
            issuer: issuer.into(),
            source,
        }
    }

    pub(crate) fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            status: None,
            message: message.into(),
        }
    }

    /// Re-label a failure that happened while exchanging an authorization code
    pub(crate) fn into_token_exchange(self) -> Self {
        match self {
            Self::OAuth { error, .. } => Self::TokenExchange {
                message: error.to_string(),
                provider: Some(error),
            },
            Self::Transport { message, .. } => Self::TokenExchange {
                provider: None,
                message,
            },
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_guidance_follows_taxonomy() {
        assert!(AppAuthError::transport("connection reset").is_retryable());
        assert!(
            AppAuthError::Timeout {
                operation: "token request",
                after: Duration::from_secs(5)
            }
            .is_retryable()
        );
        assert!(!AppAuthError::StateMismatch.is_retryable());
        assert!(!AppAuthError::NonceMismatch.is_retryable());
        assert!(!AppAuthError::FlowInProgress.is_retryable());
        assert!(!AppAuthError::from(ConfigurationError::EmptyScopes).is_retryable());
    }

    #[test]
    fn test_oauth_error_becomes_token_exchange() {
        let error = AppAuthError::OAuth {
            status: 400,
            error: ProviderError::new("invalid_grant").with_description("code expired"),
        }
        .into_token_exchange();

        assert_eq!(error.kind(), ErrorKind::TokenExchange);
        assert_eq!(error.provider_error().unwrap().code, "invalid_grant");
        assert!(error.to_string().contains("code expired"));
    }

    #[test]
    fn test_transport_display_includes_status() {
        let error = AppAuthError::Transport {
            status: Some(502),
            message: "bad gateway".to_string(),
        };
        assert_eq!(error.to_string(), "transport error (HTTP 502): bad gateway");
        assert_eq!(
            AppAuthError::transport("refused").to_string(),
            "transport error: refused"
        );
    }

    #[test]
    fn test_state_mismatch_is_distinct_from_provider_denial() {
        let denied = AppAuthError::Authorization(ProviderError::new("access_denied"));
        assert_ne!(denied.kind(), AppAuthError::StateMismatch.kind());
        assert!(AppAuthError::StateMismatch.provider_error().is_none());
    }
}
