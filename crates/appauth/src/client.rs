//! AppAuth client facade
//!
//! [`AppAuth`] owns the HTTP transport, the discovery cache and the flow
//! orchestrator, and exposes every operation of the client core:
//! - Authorization code flow, whole or split in two
//! - Refresh-token grant
//! - Token revocation (RFC 7009)
//! - Dynamic client registration (RFC 7591)
//! - RP-initiated logout
//!
//! Configuration is passed per call, so one instance can serve any number of
//! providers. Discovery documents are shared between calls.

use std::sync::Arc;

use tracing::{debug, info};

use crate::config::{
    ClientConfiguration, EndSessionOptions, HeaderPhase, RefreshOptions,
    RegistrationConfiguration, RevokeOptions, TokenExchangeOptions,
};
use crate::discovery::{DiscoveryDocument, DiscoveryResolver, Endpoint};
use crate::error::{AppAuthError, Result};
use crate::flow::{AuthorizationFlow, FlowPhase};
use crate::http::{HttpTransport, ReqwestTransport};
use crate::launcher::ExternalAgent;
use crate::request::{refresh_request, registration_request, revocation_request};
use crate::response::{parse_registration_response, parse_revocation_response, parse_token_response};
use crate::types::{AuthorizationResult, EndSessionResult, RegistrationResult, TokenResult};
use crate::validation::{
    Operation, validate_client, validate_connection, validate_refresh, validate_registration,
    validate_revoke,
};

/// OAuth 2.0 / OpenID Connect client for native apps
pub struct AppAuth {
    transport: Arc<dyn HttpTransport>,
    resolver: Arc<DiscoveryResolver>,
    flow: AuthorizationFlow,
}

impl AppAuth {
    /// Create a client over a transport and an external user agent
    pub fn new(transport: Arc<dyn HttpTransport>, agent: Arc<dyn ExternalAgent>) -> Self {
        let resolver = Arc::new(DiscoveryResolver::new(Arc::clone(&transport)));
        let flow = AuthorizationFlow::new(Arc::clone(&transport), agent, Arc::clone(&resolver));
        Self {
            transport,
            resolver,
            flow,
        }
    }

    /// Create a client using [`ReqwestTransport`]
    ///
    /// # Errors
    ///
    /// Returns a transport error if the HTTP client cannot be built.
    pub fn with_default_transport(agent: Arc<dyn ExternalAgent>) -> Result<Self> {
        Ok(Self::new(Arc::new(ReqwestTransport::new()?), agent))
    }

    /// Shared discovery resolver
    pub fn resolver(&self) -> &DiscoveryResolver {
        &self.resolver
    }

    /// Fetch and cache the provider's discovery document ahead of time
    ///
    /// Returns `None` when the configuration names no issuer.
    ///
    /// # Errors
    ///
    /// Configuration and discovery errors.
    pub async fn prefetch_configuration(
        &self,
        config: &ClientConfiguration,
    ) -> Result<Option<Arc<DiscoveryDocument>>> {
        validate_connection(&config.connection)?;
        match config.provider.issuer_url() {
            Some(issuer) => self
                .resolver
                .fetch(issuer, &config.connection, HeaderPhase::Authorize)
                .await
                .map(Some),
            None => Ok(None),
        }
    }

    /// Forget every cached discovery document
    pub fn clear_discovery_cache(&self) {
        self.resolver.clear_cache();
    }

    /// Current phase of the authorization flow
    pub fn phase(&self) -> FlowPhase {
        self.flow.phase()
    }

    /// Cancel the outstanding authorization or logout attempt
    pub fn abort(&self) -> bool {
        self.flow.abort()
    }

    /// Authorize and exchange the code for tokens
    ///
    /// # Errors
    ///
    /// See [`AuthorizationFlow::authorize`].
    pub async fn authorize(&self, config: &ClientConfiguration) -> Result<TokenResult> {
        self.flow.authorize(config).await
    }

    /// Authorize without exchanging the code
    ///
    /// # Errors
    ///
    /// See [`AuthorizationFlow::only_authorize`].
    pub async fn only_authorize(&self, config: &ClientConfiguration) -> Result<AuthorizationResult> {
        self.flow.only_authorize(config).await
    }

    /// Exchange the code retained by [`AppAuth::only_authorize`]
    ///
    /// # Errors
    ///
    /// See [`AuthorizationFlow::only_token_exchange`].
    pub async fn only_token_exchange(&self, options: &TokenExchangeOptions) -> Result<TokenResult> {
        self.flow.only_token_exchange(options).await
    }

    /// Exchange an authorization result obtained elsewhere
    ///
    /// # Errors
    ///
    /// See [`AuthorizationFlow::exchange_code`].
    pub async fn exchange_code(
        &self,
        config: &ClientConfiguration,
        authorization: &AuthorizationResult,
        options: &TokenExchangeOptions,
    ) -> Result<TokenResult> {
        self.flow
            .exchange_code(config, authorization, options)
            .await
    }

    /// Use a refresh token to obtain a new access token
    ///
    /// When the provider omits `scope`, the configured scopes are reported.
    ///
    /// # Errors
    ///
    /// Configuration and discovery errors, [`AppAuthError::OAuth`] for a
    /// provider rejection (for example `invalid_grant`), and transport errors.
    pub async fn refresh(
        &self,
        config: &ClientConfiguration,
        options: &RefreshOptions,
    ) -> Result<TokenResult> {
        validate_client(config, Operation::Refresh)?;
        validate_refresh(options)?;

        let endpoints = self
            .resolver
            .resolve(&config.provider, Operation::Refresh, &config.connection)
            .await?;
        let endpoint = endpoints
            .require(Endpoint::Token)
            .map_err(|e| AppAuthError::discovery("configured endpoints", e))?;

        debug!(client_id = %config.client_id, "refreshing access token");
        let response = self
            .transport
            .execute(refresh_request(endpoint, config, options)?)
            .await?;
        let tokens = parse_token_response(&response, &config.scopes)?;
        info!(
            rotated = tokens.refresh_token.is_some(),
            "access token refreshed"
        );
        Ok(tokens)
    }

    /// Revoke an access or refresh token (RFC 7009)
    ///
    /// A provider answering `invalid_token` is treated as success, since the
    /// token is unusable either way.
    ///
    /// # Errors
    ///
    /// Configuration and discovery errors, and provider or transport errors.
    pub async fn revoke(&self, config: &ClientConfiguration, options: &RevokeOptions) -> Result<()> {
        validate_client(config, Operation::Revoke)?;
        validate_revoke(options)?;

        let endpoints = self
            .resolver
            .resolve(&config.provider, Operation::Revoke, &config.connection)
            .await?;
        let endpoint = endpoints
            .require(Endpoint::Revocation)
            .map_err(|e| AppAuthError::discovery("configured endpoints", e))?;

        let response = self
            .transport
            .execute(revocation_request(endpoint, config, options)?)
            .await?;
        parse_revocation_response(&response)?;
        info!(hint = options.token_type_hint.as_deref(), "token revoked");
        Ok(())
    }

    /// Register a client dynamically (RFC 7591)
    ///
    /// # Errors
    ///
    /// Configuration and discovery errors, [`AppAuthError::OAuth`] for a
    /// rejected registration, and transport errors.
    pub async fn register(&self, config: &RegistrationConfiguration) -> Result<RegistrationResult> {
        validate_registration(config)?;

        let endpoints = self
            .resolver
            .resolve(&config.provider, Operation::Register, &config.connection)
            .await?;
        let endpoint = endpoints
            .require(Endpoint::Registration)
            .map_err(|e| AppAuthError::discovery("configured endpoints", e))?;

        let response = self
            .transport
            .execute(registration_request(endpoint, config)?)
            .await?;
        let registration = parse_registration_response(&response)?;
        info!(client_id = %registration.client_id, "client registered");
        Ok(registration)
    }

    /// End the provider session through the external agent
    ///
    /// # Errors
    ///
    /// See [`AuthorizationFlow::logout`].
    pub async fn logout(
        &self,
        config: &ClientConfiguration,
        options: &EndSessionOptions,
    ) -> Result<EndSessionResult> {
        self.flow.logout(config, options).await
    }
}

impl std::fmt::Debug for AppAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppAuth").field("flow", &self.flow).finish()
    }
}
