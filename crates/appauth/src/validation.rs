//! Operation-scoped configuration validation
//!
//! Validation runs before any network I/O and never panics. Each public
//! operation names the [`Operation`] it performs so only the fields that
//! operation actually needs are required.

use reqwest::header::{HeaderName, HeaderValue};
use secrecy::ExposeSecret;
use subtle::ConstantTimeEq;
use url::Url;

use crate::config::{
    ClientConfiguration, ConnectionSettings, EndSessionOptions, HeaderPhase, ProviderSource,
    RefreshOptions, RegistrationConfiguration, RevokeOptions,
};
use crate::discovery::Endpoint;
use crate::error::{AppAuthError, ConfigurationError, Result};

/// Operations the client core performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Full authorization-code flow
    Authorize,
    /// Authorization request only, code exchange deferred
    OnlyAuthorize,
    /// Deferred code exchange
    TokenExchange,
    /// Refresh-token grant
    Refresh,
    /// Token revocation
    Revoke,
    /// Dynamic client registration
    Register,
    /// RP-initiated logout
    EndSession,
}

impl Operation {
    /// Name used in errors and logs
    pub fn name(self) -> &'static str {
        match self {
            Self::Authorize => "authorize",
            Self::OnlyAuthorize => "only_authorize",
            Self::TokenExchange => "token_exchange",
            Self::Refresh => "refresh",
            Self::Revoke => "revoke",
            Self::Register => "register",
            Self::EndSession => "end_session",
        }
    }

    /// Endpoints that must be resolvable before the operation can run
    pub fn required_endpoints(self) -> &'static [Endpoint] {
        match self {
            Self::Authorize => &[Endpoint::Authorization, Endpoint::Token],
            Self::OnlyAuthorize => &[Endpoint::Authorization],
            Self::TokenExchange | Self::Refresh => &[Endpoint::Token],
            Self::Revoke => &[Endpoint::Revocation],
            Self::Register => &[Endpoint::Registration],
            Self::EndSession => &[Endpoint::EndSession],
        }
    }

    /// Custom-header phase applied to the operation's discovery fetch
    pub fn header_phase(self) -> HeaderPhase {
        match self {
            Self::Authorize | Self::OnlyAuthorize | Self::TokenExchange | Self::EndSession => {
                HeaderPhase::Authorize
            }
            Self::Refresh | Self::Revoke => HeaderPhase::Token,
            Self::Register => HeaderPhase::Register,
        }
    }

    fn needs_scopes(self) -> bool {
        matches!(self, Self::Authorize | Self::OnlyAuthorize)
    }

    fn needs_redirect(self) -> bool {
        matches!(self, Self::Authorize | Self::OnlyAuthorize)
    }

    fn needs_client_id(self) -> bool {
        !matches!(self, Self::Register | Self::EndSession)
    }
}

/// Validate a client configuration for `operation`
///
/// # Errors
///
/// Returns [`ConfigurationError`] describing the first problem found.
pub fn validate_client(config: &ClientConfiguration, operation: Operation) -> Result<()> {
    if operation.needs_client_id() && config.client_id.trim().is_empty() {
        return Err(ConfigurationError::MissingField("clientId").into());
    }

    validate_provider(&config.provider, operation)?;

    if operation.needs_redirect() {
        let redirect_url = config
            .redirect_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .ok_or(ConfigurationError::MissingField("redirectUrl"))?;
        validate_url("redirectUrl", redirect_url)?;
    }

    if operation.needs_scopes() && !config.scopes.iter().any(|scope| !scope.trim().is_empty()) {
        return Err(ConfigurationError::EmptyScopes.into());
    }

    validate_connection(&config.connection)
}

/// Validate a registration configuration
///
/// # Errors
///
/// Returns [`ConfigurationError`] describing the first problem found.
pub fn validate_registration(config: &RegistrationConfiguration) -> Result<()> {
    validate_provider(&config.provider, Operation::Register)?;

    if config.redirect_urls.is_empty() {
        return Err(ConfigurationError::MissingField("redirectUrls").into());
    }
    for redirect_url in &config.redirect_urls {
        validate_url("redirectUrls", redirect_url)?;
    }

    validate_connection(&config.connection)
}

/// Validate refresh options
///
/// # Errors
///
/// Returns [`ConfigurationError::MissingField`] when the refresh token is empty.
pub fn validate_refresh(options: &RefreshOptions) -> Result<()> {
    if options.refresh_token.expose_secret().is_empty() {
        return Err(ConfigurationError::MissingField("refreshToken").into());
    }
    Ok(())
}

/// Validate revocation options
///
/// # Errors
///
/// Returns [`ConfigurationError::MissingField`] when the token is empty.
pub fn validate_revoke(options: &RevokeOptions) -> Result<()> {
    if options.token_to_revoke.expose_secret().is_empty() {
        return Err(ConfigurationError::MissingField("tokenToRevoke").into());
    }
    Ok(())
}

/// Validate logout options
///
/// # Errors
///
/// Returns [`ConfigurationError`] when the ID token or redirect is missing.
pub fn validate_end_session(options: &EndSessionOptions) -> Result<()> {
    if options.id_token.expose_secret().is_empty() {
        return Err(ConfigurationError::MissingField("idToken").into());
    }
    if options.post_logout_redirect_url.trim().is_empty() {
        return Err(ConfigurationError::MissingField("postLogoutRedirectUrl").into());
    }
    validate_url("postLogoutRedirectUrl", &options.post_logout_redirect_url)
}

/// Validate custom headers and timeouts
///
/// # Errors
///
/// Returns [`ConfigurationError`] for unknown header phases, invalid header
/// strings or zero timeouts.
pub fn validate_connection(settings: &ConnectionSettings) -> Result<()> {
    for (phase, headers) in &settings.custom_headers {
        if HeaderPhase::parse(phase).is_none() {
            return Err(ConfigurationError::UnknownHeaderPhase(phase.clone()).into());
        }
        for (name, value) in headers {
            let invalid = |reason: String| ConfigurationError::InvalidHeader {
                phase: phase.clone(),
                name: name.clone(),
                reason,
            };
            HeaderName::from_bytes(name.as_bytes()).map_err(|e| invalid(e.to_string()))?;
            HeaderValue::from_str(value).map_err(|e| invalid(e.to_string()))?;
        }
    }

    if settings.connection_timeout.is_zero() {
        return Err(ConfigurationError::InvalidTimeout("connectionTimeoutSeconds").into());
    }
    if settings.authorization_timeout.is_some_and(|timeout| timeout.is_zero()) {
        return Err(ConfigurationError::InvalidTimeout("authorizationTimeoutSeconds").into());
    }

    Ok(())
}

/// Constant-time comparison of the returned `state` with the one sent
///
/// An empty value on either side never matches.
///
/// # Errors
///
/// Returns [`AppAuthError::StateMismatch`] unless both values are non-empty
/// and equal.
pub fn validate_oauth_state(expected_state: &str, received_state: &str) -> Result<()> {
    if expected_state.is_empty() || received_state.is_empty() {
        return Err(AppAuthError::StateMismatch);
    }

    if bool::from(expected_state.as_bytes().ct_eq(received_state.as_bytes())) {
        Ok(())
    } else {
        Err(AppAuthError::StateMismatch)
    }
}

/// Whether `redirect` is the registered redirect URL plus its parameters
///
/// The text after `prefix` must be empty or open a query or fragment, so
/// `com.example.app:/cb-evil` never matches `com.example.app:/cb`.
pub fn matches_redirect_prefix(redirect: &str, prefix: &str) -> bool {
    if prefix.is_empty() {
        return false;
    }
    match redirect.strip_prefix(prefix) {
        Some(rest) => match rest.chars().next() {
            None | Some('?' | '#') => true,
            Some('&') => prefix.contains('?'),
            Some(_) => false,
        },
        None => false,
    }
}

fn validate_provider(provider: &ProviderSource, operation: Operation) -> Result<()> {
    if let Some(endpoints) = provider.explicit_endpoints() {
        for endpoint in [
            Endpoint::Authorization,
            Endpoint::Token,
            Endpoint::Revocation,
            Endpoint::Registration,
            Endpoint::EndSession,
        ] {
            if let Some(url) = endpoints.get(endpoint) {
                validate_url(endpoint.field_name(), url)?;
            }
        }
    }

    match provider.issuer_url() {
        Some(issuer) => validate_url("issuer", issuer),
        None => {
            let endpoints = provider.explicit_endpoints();
            match operation
                .required_endpoints()
                .iter()
                .find(|endpoint| endpoints.and_then(|e| e.get(**endpoint)).is_none())
            {
                Some(missing) => Err(ConfigurationError::MissingProvider {
                    operation: operation.name(),
                    endpoint: missing.field_name(),
                }
                .into()),
                None => Ok(()),
            }
        }
    }
}

fn validate_url(field: &'static str, value: &str) -> Result<()> {
    Url::parse(value).map_err(|e| ConfigurationError::InvalidUrl {
        field,
        reason: e.to_string(),
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::ProviderEndpoints;
    use std::time::Duration;

    fn issuer_config() -> ClientConfiguration {
        ClientConfiguration::new(ProviderSource::issuer("https://accounts.example.com"), "native")
            .with_redirect_url("com.example.app:/oauth2redirect")
            .with_scopes(["openid"])
    }

    fn config_error(result: Result<()>) -> ConfigurationError {
        match result {
            Err(AppAuthError::Configuration(error)) => error,
            other => panic!("expected configuration error, got {other:?}"),
        }
    }

    #[test]
    fn test_issuer_config_is_valid_for_every_client_operation() {
        let config = issuer_config();
        for operation in [
            Operation::Authorize,
            Operation::OnlyAuthorize,
            Operation::TokenExchange,
            Operation::Refresh,
            Operation::Revoke,
            Operation::EndSession,
        ] {
            assert!(validate_client(&config, operation).is_ok(), "{operation:?}");
        }
    }

    #[test]
    fn test_endpoints_only_config_needs_operation_endpoints() {
        let config = ClientConfiguration::new(
            ProviderSource::endpoints(ProviderEndpoints {
                authorization_endpoint: Some("https://a.example/authorize".into()),
                token_endpoint: Some("https://a.example/token".into()),
                ..ProviderEndpoints::default()
            }),
            "native",
        )
        .with_redirect_url("com.example:/cb")
        .with_scopes(["openid"]);

        assert!(validate_client(&config, Operation::Authorize).is_ok());
        assert!(validate_client(&config, Operation::Refresh).is_ok());
        assert_eq!(
            config_error(validate_client(&config, Operation::Revoke)),
            ConfigurationError::MissingProvider {
                operation: "revoke",
                endpoint: "revocationEndpoint",
            }
        );
        assert!(
            config_error(validate_client(&config, Operation::Revoke))
                .to_string()
                .contains("either an issuer or a revocationEndpoint")
        );
    }

    #[test]
    fn test_scopes_required_only_for_authorization() {
        let config = issuer_config().with_scopes(Vec::<String>::new());
        assert_eq!(
            config_error(validate_client(&config, Operation::Authorize)),
            ConfigurationError::EmptyScopes
        );
        assert!(validate_client(&config, Operation::Refresh).is_ok());

        let blank = issuer_config().with_scopes([" "]);
        assert!(validate_client(&blank, Operation::OnlyAuthorize).is_err());
    }

    #[test]
    fn test_missing_client_id_and_redirect() {
        let mut config = issuer_config();
        config.client_id = String::new();
        assert_eq!(
            config_error(validate_client(&config, Operation::Refresh)),
            ConfigurationError::MissingField("clientId")
        );

        let mut config = issuer_config();
        config.redirect_url = None;
        assert_eq!(
            config_error(validate_client(&config, Operation::Authorize)),
            ConfigurationError::MissingField("redirectUrl")
        );
        assert!(validate_client(&config, Operation::Refresh).is_ok());
    }

    #[test]
    fn test_malformed_urls_rejected() {
        let config = issuer_config().with_redirect_url("not a url");
        assert!(matches!(
            config_error(validate_client(&config, Operation::Authorize)),
            ConfigurationError::InvalidUrl { field: "redirectUrl", .. }
        ));

        let config = ClientConfiguration::new(ProviderSource::issuer("accounts"), "c");
        assert!(matches!(
            config_error(validate_client(&config, Operation::Refresh)),
            ConfigurationError::InvalidUrl { field: "issuer", .. }
        ));
    }

    #[test]
    fn test_custom_header_phase_and_values() {
        let mut config = issuer_config();
        config
            .connection
            .custom_headers
            .insert("discovery".into(), [("X-A".to_string(), "1".to_string())].into());
        assert_eq!(
            config_error(validate_client(&config, Operation::Authorize)),
            ConfigurationError::UnknownHeaderPhase("discovery".into())
        );

        let config = issuer_config().with_header(HeaderPhase::Token, "X-Tenant", "line\nbreak");
        assert!(matches!(
            config_error(validate_client(&config, Operation::Authorize)),
            ConfigurationError::InvalidHeader { .. }
        ));

        let config = issuer_config().with_header(HeaderPhase::Token, "bad header", "v");
        assert!(validate_client(&config, Operation::Authorize).is_err());
    }

    #[test]
    fn test_zero_timeouts_rejected() {
        let config = issuer_config().with_connection_timeout(Duration::ZERO);
        assert_eq!(
            config_error(validate_client(&config, Operation::Authorize)),
            ConfigurationError::InvalidTimeout("connectionTimeoutSeconds")
        );

        let config = issuer_config().with_authorization_timeout(Duration::ZERO);
        assert_eq!(
            config_error(validate_client(&config, Operation::Authorize)),
            ConfigurationError::InvalidTimeout("authorizationTimeoutSeconds")
        );
    }

    #[test]
    fn test_registration_requires_redirects() {
        let config = RegistrationConfiguration::new(
            ProviderSource::issuer("https://accounts.example.com"),
            Vec::<String>::new(),
        );
        assert_eq!(
            config_error(validate_registration(&config)),
            ConfigurationError::MissingField("redirectUrls")
        );

        let config = RegistrationConfiguration::new(
            ProviderSource::endpoints(ProviderEndpoints::default()),
            ["com.example:/cb"],
        );
        assert!(matches!(
            config_error(validate_registration(&config)),
            ConfigurationError::MissingProvider {
                endpoint: "registrationEndpoint",
                ..
            }
        ));
    }

    #[test]
    fn test_option_validation() {
        assert!(validate_refresh(&RefreshOptions::new("")).is_err());
        assert!(validate_refresh(&RefreshOptions::new("rt")).is_ok());
        assert!(validate_revoke(&RevokeOptions::new("")).is_err());
        assert!(validate_end_session(&EndSessionOptions::new("idt", "")).is_err());
        assert!(validate_end_session(&EndSessionOptions::new("idt", "com.example:/logout")).is_ok());
    }

    #[test]
    fn test_oauth_state_validation_success() {
        let state = "random-csrf-token-123";
        assert!(validate_oauth_state(state, state).is_ok());
    }

    #[test]
    fn test_oauth_state_validation_mismatch() {
        let result = validate_oauth_state("state-abc123", "state-xyz789");
        assert!(matches!(result, Err(AppAuthError::StateMismatch)));
    }

    #[test]
    fn test_oauth_state_validation_empty() {
        assert!(validate_oauth_state("", "some-state").is_err());
        assert!(validate_oauth_state("some-state", "").is_err());
    }

    #[test]
    fn test_oauth_state_validation_case_sensitive() {
        assert!(validate_oauth_state("State123", "state123").is_err());
    }

    #[test]
    fn test_redirect_prefix_boundary() {
        let prefix = "com.example.app:/oauth2redirect";
        assert!(matches_redirect_prefix(prefix, prefix));
        assert!(matches_redirect_prefix("com.example.app:/oauth2redirect?code=c&state=s", prefix));
        assert!(matches_redirect_prefix("com.example.app:/oauth2redirect#code=c", prefix));

        assert!(!matches_redirect_prefix("com.example.app:/oauth2redirect-evil?code=c", prefix));
        assert!(!matches_redirect_prefix("com.example.app:/oauth2redirect/extra", prefix));
        assert!(!matches_redirect_prefix("com.example.app:/oauth2redirect&code=c", prefix));
        assert!(!matches_redirect_prefix("com.example.app:/other?code=c", prefix));
        assert!(!matches_redirect_prefix("com.example.app:/cb", ""));
    }

    #[test]
    fn test_redirect_prefix_with_query() {
        let prefix = "https://app.example.com/cb?tenant=acme";
        assert!(matches_redirect_prefix("https://app.example.com/cb?tenant=acme&code=c", prefix));
        assert!(!matches_redirect_prefix("https://app.example.com/cb?tenant=acme2&code=c", prefix));
    }
}
