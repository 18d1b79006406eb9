//! # AppAuth - OAuth 2.0 and OpenID Connect for Native Apps
//!
//! Client core for native applications talking to OAuth 2.0 and OpenID
//! Connect providers, following RFC 8252 (OAuth 2.0 for Native Apps).
//!
//! ## Key Features
//!
//! - **Authorization Code + PKCE** - S256 challenges, CSRF state and OpenID nonce
//! - **Discovery** - OpenID Connect Discovery 1.0 with a per-issuer cache
//! - **Token Lifecycle** - Refresh and RFC 7009 revocation
//! - **Dynamic Registration** - RFC 7591 client registration
//! - **RP-Initiated Logout** - End-session requests with state verification
//! - **Pluggable Seams** - Bring your own [`HttpTransport`] and [`ExternalAgent`]
//!
//! ## Architecture
//!
//! - [`config`] - Client configuration and per-operation options
//! - [`validation`] - Operation-scoped configuration checks
//! - [`discovery`] - Endpoint resolution and document caching
//! - [`pkce`] - PKCE verifier/challenge, state and nonce generation
//! - [`request`] - Authorization URLs and token, revocation and registration requests
//! - [`response`] - Token, registration and error response parsing
//! - [`flow`] - Authorization flow state machine
//! - [`launcher`] - External user-agent abstraction
//! - [`http`] - HTTP transport abstraction and the reqwest implementation
//! - [`client`] - The [`AppAuth`] facade
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use appauth::{AppAuth, CallbackAgent, ClientConfiguration, ProviderSource};
//!
//! # async fn example() -> appauth::Result<()> {
//! // The agent opens the system browser; the app's URL handler later calls
//! // `deliver_redirect` with the redirect it received.
//! let agent = Arc::new(CallbackAgent::new(|url| {
//!     println!("open {url}");
//!     Ok(())
//! }));
//! let client = AppAuth::with_default_transport(agent.clone())?;
//!
//! let config = ClientConfiguration::new(
//!     ProviderSource::issuer("https://accounts.example.com"),
//!     "native-client",
//! )
//! .with_redirect_url("com.example.app:/oauth2redirect")
//! .with_scopes(["openid", "profile", "offline_access"]);
//!
//! let tokens = client.authorize(&config).await?;
//! println!("access token expires at {:?}", tokens.access_token_expiration);
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Every operation returns [`Result`]. [`AppAuthError::kind`] gives a stable
//! [`ErrorKind`] for matching, and [`AppAuthError::is_retryable`] tells
//! transient network failures apart from protocol and configuration errors.
//!
//! ## Standards Compliance
//!
//! - **RFC 6749** - OAuth 2.0 Authorization Framework
//! - **RFC 7636** - Proof Key for Code Exchange (PKCE)
//! - **RFC 7009** - OAuth 2.0 Token Revocation
//! - **RFC 7591** - OAuth 2.0 Dynamic Client Registration
//! - **RFC 8252** - OAuth 2.0 for Native Apps
//! - **OpenID Connect Core 1.0, Discovery 1.0, RP-Initiated Logout 1.0**

pub mod client;
pub mod config;
pub mod discovery;
pub mod error;
pub mod flow;
pub mod http;
pub mod launcher;
pub mod pkce;
pub mod request;
pub mod response;
pub mod types;
pub mod validation;

// Re-export the facade
#[doc(inline)]
pub use client::AppAuth;

// Re-export configuration types
#[doc(inline)]
pub use config::{
    ClientAuthMethod, ClientConfiguration, ConnectionSettings, EndSessionOptions, HeaderPhase,
    ProviderSource, RefreshOptions, RegistrationConfiguration, RevokeOptions,
    TokenExchangeOptions,
};

// Re-export errors
#[doc(inline)]
pub use error::{AppAuthError, ConfigurationError, ErrorKind, ProviderError, Result};

// Re-export result types
#[doc(inline)]
pub use types::{AuthorizationResult, EndSessionResult, RegistrationResult, TokenResult};

// Re-export seams
#[doc(inline)]
pub use http::{HttpTransport, ReqwestTransport};
#[doc(inline)]
pub use launcher::{CallbackAgent, ExternalAgent, LaunchOutcome};

#[doc(inline)]
pub use discovery::ProviderEndpoints;
#[doc(inline)]
pub use flow::FlowPhase;
