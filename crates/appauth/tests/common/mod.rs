//! Common test utilities for integration tests
//!
//! Provides a wiremock-backed OpenID provider and a scripted external agent
//! standing in for the system browser.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use appauth::{
    AppAuth, AppAuthError, ClientConfiguration, ExternalAgent, LaunchOutcome, ProviderSource,
    ReqwestTransport,
};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::{Value, json};
use url::Url;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path},
};

pub const CLIENT_ID: &str = "native-client";
pub const REDIRECT_URL: &str = "com.example.app:/oauth2redirect";
pub const LOGOUT_REDIRECT_URL: &str = "com.example.app:/logout";

/// OpenID provider mock serving discovery, token, revocation and registration
pub struct MockProvider {
    pub server: MockServer,
}

impl MockProvider {
    /// Start a provider whose discovery document advertises every endpoint
    pub async fn start() -> Self {
        let provider = Self::start_without_discovery().await;
        provider.mock_discovery(provider.discovery_document()).await;
        provider
    }

    /// Start a provider with no discovery document mounted
    pub async fn start_without_discovery() -> Self {
        init_tracing();
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn issuer(&self) -> String {
        self.server.uri()
    }

    pub fn endpoint(&self, name: &str) -> String {
        format!("{}/{name}", self.server.uri())
    }

    /// Discovery document pointing every endpoint at this server
    pub fn discovery_document(&self) -> Value {
        json!({
            "issuer": self.issuer(),
            "authorization_endpoint": self.endpoint("authorize"),
            "token_endpoint": self.endpoint("token"),
            "revocation_endpoint": self.endpoint("revoke"),
            "registration_endpoint": self.endpoint("register"),
            "end_session_endpoint": self.endpoint("logout"),
            "jwks_uri": self.endpoint("jwks"),
            "code_challenge_methods_supported": ["S256"],
        })
    }

    pub async fn mock_discovery(&self, document: Value) {
        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(document))
            .mount(&self.server)
            .await;
    }

    /// Mock successful token endpoint response
    pub async fn mock_token_success(&self, body: Value) {
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// Mock token endpoint error response
    pub async fn mock_token_error(&self, status: u16, error: &str, description: &str) {
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(status).set_body_json(json!({
                "error": error,
                "error_description": description,
            })))
            .mount(&self.server)
            .await;
    }

    pub async fn mock_revocation(&self, response: ResponseTemplate) {
        Mock::given(method("POST"))
            .and(path("/revoke"))
            .respond_with(response)
            .mount(&self.server)
            .await;
    }

    pub async fn mock_registration(&self, response: ResponseTemplate) {
        Mock::given(method("POST"))
            .and(path("/register"))
            .respond_with(response)
            .mount(&self.server)
            .await;
    }

    /// Client configuration discovering this provider over plain http
    pub fn config(&self) -> ClientConfiguration {
        ClientConfiguration::new(ProviderSource::issuer(self.issuer()), CLIENT_ID)
            .with_redirect_url(REDIRECT_URL)
            .with_scopes(["openid", "profile"])
            .allow_insecure_http()
    }
}

pub fn token_body(access_token: &str) -> Value {
    json!({
        "access_token": access_token,
        "token_type": "Bearer",
        "expires_in": 3600,
        "refresh_token": "refresh-1",
        "scope": "openid profile",
    })
}

/// Unsigned compact JWS carrying `nonce`, enough for nonce verification
pub fn unsigned_id_token(nonce: &str) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(
        json!({ "iss": "https://idp.example.com", "sub": "user-1", "nonce": nonce }).to_string(),
    );
    format!("{header}.{payload}.sig")
}

/// Value of a query parameter in `url`
pub fn query_param(url: &Url, name: &str) -> Option<String> {
    url.query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

/// Every value of `name` posted to the token endpoint, in request order
pub async fn token_request_params(provider: &MockProvider, name: &str) -> Vec<String> {
    provider
        .server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|request| request.url.path() == "/token")
        .filter_map(|request| {
            url::form_urlencoded::parse(&request.body)
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.into_owned())
        })
        .collect()
}

/// Value of `name` in the last token endpoint request
pub async fn token_request_param(provider: &MockProvider, name: &str) -> Option<String> {
    token_request_params(provider, name).await.pop()
}

type Responder = Box<dyn Fn(&Url, &str) -> Result<LaunchOutcome, AppAuthError> + Send + Sync>;

/// External agent that answers launches from a script and records them
pub struct ScriptedAgent {
    respond: Option<Responder>,
    pub launched: Mutex<Vec<Url>>,
}

impl ScriptedAgent {
    pub fn new<F>(respond: F) -> Arc<Self>
    where
        F: Fn(&Url, &str) -> Result<LaunchOutcome, AppAuthError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            respond: Some(Box::new(respond)),
            launched: Mutex::new(Vec::new()),
        })
    }

    /// Redirect back with `code` and whatever state was sent, plus `extra`
    pub fn approving(code: &'static str, extra: &'static str) -> Arc<Self> {
        Self::new(move |url, prefix| {
            let state = query_param(url, "state").unwrap_or_default();
            Ok(LaunchOutcome::Redirect(format!(
                "{prefix}?code={code}&state={state}{extra}"
            )))
        })
    }

    /// Redirect back with a fixed query string
    pub fn redirecting(query: &'static str) -> Arc<Self> {
        Self::new(move |_, prefix| Ok(LaunchOutcome::Redirect(format!("{prefix}?{query}"))))
    }

    /// Echo the state back with no code, as a logout redirect
    pub fn echoing_state() -> Arc<Self> {
        Self::new(|url, prefix| {
            let state = query_param(url, "state").unwrap_or_default();
            Ok(LaunchOutcome::Redirect(format!("{prefix}?state={state}")))
        })
    }

    /// Close the browser without completing
    pub fn cancelling() -> Arc<Self> {
        Self::new(|_, _| Ok(LaunchOutcome::Cancelled))
    }

    /// Never deliver anything
    pub fn hanging() -> Arc<Self> {
        Arc::new(Self {
            respond: None,
            launched: Mutex::new(Vec::new()),
        })
    }

    pub fn last_url(&self) -> Url {
        self.launched
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("agent was never launched")
    }

    pub fn launch_count(&self) -> usize {
        self.launched.lock().unwrap().len()
    }
}

#[async_trait]
impl ExternalAgent for ScriptedAgent {
    async fn launch(&self, url: &Url, redirect_prefix: &str) -> Result<LaunchOutcome, AppAuthError> {
        self.launched.lock().unwrap().push(url.clone());
        match &self.respond {
            Some(respond) => respond(url, redirect_prefix),
            None => std::future::pending().await,
        }
    }
}

/// Route library logs to the test output; set `RUST_LOG=appauth=debug` to see them
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Client over the real reqwest transport
pub fn client(agent: Arc<ScriptedAgent>) -> AppAuth {
    AppAuth::new(
        Arc::new(ReqwestTransport::new().expect("transport")),
        agent,
    )
}
