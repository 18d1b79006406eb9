//! # Authorization Flow Orchestrator
//!
//! Drives the authorization-code flow through an injected [`ExternalAgent`]:
//!
//! ```text
//! Idle -> AwaitingRedirect -> ExchangingCode -> Completed
//!              |                    |
//!              +------> Failed <----+
//! ```
//!
//! One attempt may be outstanding per orchestrator; a second `authorize`
//! fails with [`AppAuthError::FlowInProgress`]. Cancellation by the user or
//! by [`AuthorizationFlow::abort`] returns the orchestrator to `Idle`. The
//! attempt's state, nonce and PKCE verifier live only inside the running
//! future and are discarded with it.

mod callback;
mod state;

use std::sync::Arc;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use subtle::ConstantTimeEq;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::{ClientConfiguration, EndSessionOptions, TokenExchangeOptions};
use crate::discovery::{DiscoveryResolver, Endpoint, ProviderEndpoints};
use crate::error::{AppAuthError, ConfigurationError, Result};
use crate::http::HttpTransport;
use crate::launcher::{ExternalAgent, LaunchOutcome};
use crate::pkce::new_state;
use crate::request::{CodeExchange, authorization_url, code_exchange_request, end_session_url};
use crate::response::{id_token_nonce, parse_token_response};
use crate::types::{AuthorizationResult, EndSessionResult, TokenResult};
use crate::validation::{Operation, validate_client, validate_end_session};

use self::callback::{redirect_parameters, verify_authorization_redirect, verify_end_session_redirect};
use self::state::{Attempt, FlowSlot, PendingExchange};

pub use self::state::{FlowPhase, FlowState};

/// Authorization-code flow state machine
pub struct AuthorizationFlow {
    transport: Arc<dyn HttpTransport>,
    agent: Arc<dyn ExternalAgent>,
    resolver: Arc<DiscoveryResolver>,
    slot: FlowSlot,
}

impl AuthorizationFlow {
    /// Create an orchestrator over the given collaborators
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        agent: Arc<dyn ExternalAgent>,
        resolver: Arc<DiscoveryResolver>,
    ) -> Self {
        Self {
            transport,
            agent,
            resolver,
            slot: FlowSlot::default(),
        }
    }

    /// Current phase
    pub fn phase(&self) -> FlowPhase {
        self.slot.phase()
    }

    /// Cancel the outstanding attempt; it fails with [`AppAuthError::UserCancelled`]
    ///
    /// Returns `false` when nothing was outstanding.
    pub fn abort(&self) -> bool {
        let aborted = self.slot.abort();
        if aborted {
            info!("authorization flow aborted");
        }
        aborted
    }

    /// Run the full flow: authorize, verify the redirect, exchange the code
    ///
    /// # Errors
    ///
    /// Any [`AppAuthError`]; see the crate documentation for the taxonomy.
    pub async fn authorize(&self, config: &ClientConfiguration) -> Result<TokenResult> {
        validate_client(config, Operation::Authorize)?;
        let attempt = self.slot.begin(FlowPhase::AwaitingRedirect)?;
        self.slot.take_pending();
        info!(client_id = %config.client_id, "starting authorization flow");

        let outcome = cancellable(&attempt, async {
            let endpoints = self
                .resolver
                .resolve(&config.provider, Operation::Authorize, &config.connection)
                .await?;
            let authorization = self.request_authorization(config, &endpoints).await?;

            attempt.advance(FlowPhase::ExchangingCode);
            self.exchange(
                config,
                &endpoints,
                &authorization,
                config.client_secret.as_ref(),
                &TokenExchangeOptions::default(),
            )
            .await
        })
        .await;

        log_outcome("authorization", &outcome);
        attempt.finish(&outcome);
        outcome
    }

    /// Run only the authorization step and keep the result for
    /// [`AuthorizationFlow::only_token_exchange`]
    ///
    /// # Errors
    ///
    /// Any [`AppAuthError`] raised before the code exchange.
    pub async fn only_authorize(&self, config: &ClientConfiguration) -> Result<AuthorizationResult> {
        validate_client(config, Operation::OnlyAuthorize)?;
        let attempt = self.slot.begin(FlowPhase::AwaitingRedirect)?;
        self.slot.take_pending();
        info!(client_id = %config.client_id, "starting authorization without code exchange");

        let outcome = cancellable(&attempt, async {
            let endpoints = self
                .resolver
                .resolve(&config.provider, Operation::OnlyAuthorize, &config.connection)
                .await?;
            self.request_authorization(config, &endpoints).await
        })
        .await;

        if let Ok(authorization) = &outcome {
            let mut retained = config.clone();
            retained.client_secret = None;
            self.slot.store_pending(PendingExchange {
                config: retained,
                authorization: authorization.clone(),
            });
        }

        log_outcome("authorization", &outcome);
        attempt.finish(&outcome);
        outcome
    }

    /// Exchange the code retained by the last successful
    /// [`AuthorizationFlow::only_authorize`]
    ///
    /// The retained result is consumed whether or not the exchange succeeds.
    /// The client secret is not retained; confidential clients pass it in
    /// `options`.
    ///
    /// # Errors
    ///
    /// [`ConfigurationError::NoPendingAuthorization`] when nothing is retained,
    /// otherwise the exchange errors.
    pub async fn only_token_exchange(&self, options: &TokenExchangeOptions) -> Result<TokenResult> {
        let attempt = self.slot.begin(FlowPhase::ExchangingCode)?;
        let Some(pending) = self.slot.take_pending() else {
            let outcome: Result<TokenResult> = Err(ConfigurationError::NoPendingAuthorization.into());
            attempt.finish(&outcome);
            return outcome;
        };

        let outcome = cancellable(&attempt, async {
            self.exchange_with(
                &pending.config,
                &pending.authorization,
                options,
                options.client_secret.as_ref(),
            )
            .await
        })
        .await;

        log_outcome("token exchange", &outcome);
        attempt.finish(&outcome);
        outcome
    }

    /// Exchange an explicitly supplied authorization result
    ///
    /// This does not touch the orchestrator's phase. The secret from
    /// `options` takes precedence over the configuration's.
    ///
    /// # Errors
    ///
    /// Configuration, discovery and token exchange errors.
    pub async fn exchange_code(
        &self,
        config: &ClientConfiguration,
        authorization: &AuthorizationResult,
        options: &TokenExchangeOptions,
    ) -> Result<TokenResult> {
        let secret = options
            .client_secret
            .as_ref()
            .or(config.client_secret.as_ref());
        self.exchange_with(config, authorization, options, secret)
            .await
    }

    /// RP-initiated logout through the external agent
    ///
    /// # Errors
    ///
    /// Configuration and discovery errors, [`AppAuthError::UserCancelled`],
    /// [`AppAuthError::Timeout`], or [`AppAuthError::StateMismatch`] when the
    /// provider returns a different state.
    pub async fn logout(
        &self,
        config: &ClientConfiguration,
        options: &EndSessionOptions,
    ) -> Result<EndSessionResult> {
        validate_client(config, Operation::EndSession)?;
        validate_end_session(options)?;
        let attempt = self.slot.begin(FlowPhase::AwaitingRedirect)?;
        info!("starting end-session flow");

        let outcome = cancellable(&attempt, async {
            let endpoints = self
                .resolver
                .resolve(&config.provider, Operation::EndSession, &config.connection)
                .await?;
            let endpoint = require(&endpoints, Endpoint::EndSession)?;

            let state = new_state();
            let url = end_session_url(endpoint, options, &state, &config.connection)?;
            let redirect = self
                .wait_for_redirect(
                    &url,
                    &options.post_logout_redirect_url,
                    config.connection.authorization_timeout,
                )
                .await?;

            let parameters = redirect_parameters(&redirect, &options.post_logout_redirect_url)?;
            let state = verify_end_session_redirect(&parameters, &state)?;

            Ok(EndSessionResult {
                state,
                id_token_hint: options.id_token.expose_secret().clone(),
                post_logout_redirect_uri: options.post_logout_redirect_url.clone(),
            })
        })
        .await;

        log_outcome("end session", &outcome);
        attempt.finish(&outcome);
        outcome
    }

    /// Build the request, launch the agent and verify the redirect
    async fn request_authorization(
        &self,
        config: &ClientConfiguration,
        endpoints: &ProviderEndpoints,
    ) -> Result<AuthorizationResult> {
        let endpoint = require(endpoints, Endpoint::Authorization)?;
        let redirect_url = config.redirect_url.clone().unwrap_or_default();

        let flow = FlowState::new(config.use_pkce, config.use_nonce);
        let url = authorization_url(endpoint, config, &flow)?;
        debug!(pkce = flow.pkce.is_some(), nonce = flow.nonce.is_some(), "authorization request built");

        let redirect = self
            .wait_for_redirect(&url, &redirect_url, config.connection.authorization_timeout)
            .await?;

        let parameters = redirect_parameters(&redirect, &redirect_url)?;
        let code = verify_authorization_redirect(&parameters, &flow.state)?;

        Ok(AuthorizationResult {
            authorization_code: code,
            state: flow.state,
            raw_parameters: parameters,
            code_verifier: flow.pkce.map(|pkce| pkce.code_verifier),
            nonce: flow.nonce,
            scopes: config.scopes.clone(),
            redirect_url,
        })
    }

    async fn wait_for_redirect(
        &self,
        url: &Url,
        redirect_prefix: &str,
        limit: Option<Duration>,
    ) -> Result<String> {
        let launch = self.agent.launch(url, redirect_prefix);
        let outcome = match limit {
            Some(limit) => tokio::time::timeout(limit, launch)
                .await
                .map_err(|_| AppAuthError::Timeout {
                    operation: "authorization redirect",
                    after: limit,
                })??,
            None => launch.await?,
        };

        match outcome {
            LaunchOutcome::Redirect(redirect) => Ok(redirect),
            LaunchOutcome::Cancelled => Err(AppAuthError::UserCancelled),
        }
    }

    async fn exchange_with(
        &self,
        config: &ClientConfiguration,
        authorization: &AuthorizationResult,
        options: &TokenExchangeOptions,
        secret: Option<&SecretString>,
    ) -> Result<TokenResult> {
        validate_client(config, Operation::TokenExchange)?;
        let endpoints = self
            .resolver
            .resolve(&config.provider, Operation::TokenExchange, &config.connection)
            .await?;
        self.exchange(config, &endpoints, authorization, secret, options)
            .await
    }

    /// Exchange the code and check the ID token nonce
    async fn exchange(
        &self,
        config: &ClientConfiguration,
        endpoints: &ProviderEndpoints,
        authorization: &AuthorizationResult,
        secret: Option<&SecretString>,
        options: &TokenExchangeOptions,
    ) -> Result<TokenResult> {
        let endpoint = require(endpoints, Endpoint::Token)?;
        let request = code_exchange_request(
            endpoint,
            config,
            CodeExchange {
                code: &authorization.authorization_code,
                redirect_url: &authorization.redirect_url,
                code_verifier: authorization.code_verifier.as_deref(),
                client_secret: secret,
                additional_parameters: &options.additional_parameters,
            },
        )?;

        let response = self
            .transport
            .execute(request)
            .await
            .map_err(AppAuthError::into_token_exchange)?;
        let mut tokens = parse_token_response(&response, &authorization.scopes)
            .map_err(AppAuthError::into_token_exchange)?;

        if let (Some(expected), Some(id_token)) = (&authorization.nonce, &tokens.id_token) {
            let matches = id_token_nonce(id_token)?
                .is_some_and(|nonce| bool::from(nonce.as_bytes().ct_eq(expected.as_bytes())));
            if !matches {
                warn!("id_token nonce does not match the authorization request");
                return Err(AppAuthError::NonceMismatch);
            }
        }

        tokens.authorize_additional_parameters = authorization.additional_parameters();
        Ok(tokens)
    }
}

impl std::fmt::Debug for AuthorizationFlow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationFlow")
            .field("phase", &self.phase())
            .field("resolver", &self.resolver)
            .finish()
    }
}

/// Race `work` against the attempt's cancellation token
async fn cancellable<T>(
    attempt: &Attempt<'_>,
    work: impl Future<Output = Result<T>>,
) -> Result<T> {
    let cancel = attempt.cancellation();
    tokio::select! {
        () = cancel.cancelled() => Err(AppAuthError::UserCancelled),
        outcome = work => outcome,
    }
}

fn require(endpoints: &ProviderEndpoints, endpoint: Endpoint) -> Result<&str> {
    endpoints
        .require(endpoint)
        .map_err(|e| AppAuthError::discovery("configured endpoints", e))
}

fn log_outcome<T>(operation: &str, outcome: &Result<T>) {
    match outcome {
        Ok(_) => info!(operation, "flow completed"),
        Err(AppAuthError::UserCancelled) => info!(operation, "flow cancelled"),
        Err(error) => warn!(operation, kind = ?error.kind(), %error, "flow failed"),
    }
}
