//! Request construction
//!
//! Pure functions turning configuration and flow material into URLs for the
//! external agent and [`HttpRequest`] descriptors for the transport. Nothing
//! here performs I/O.
//!
//! Fixed protocol parameters are always emitted first; caller-supplied
//! additional parameters are appended afterwards and never replace a
//! parameter the builder already set.

use std::collections::{BTreeMap, HashSet};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value};
use url::Url;

use crate::config::{
    ClientAuthMethod, ClientConfiguration, ConnectionSettings, EndSessionOptions, HeaderPhase,
    RefreshOptions, RegistrationConfiguration, RevokeOptions,
};
use crate::error::{AppAuthError, ConfigurationError, Result};
use crate::flow::FlowState;
use crate::http::{HttpRequest, RequestBody};

/// Inputs for an authorization-code exchange
#[derive(Clone, Copy)]
pub struct CodeExchange<'a> {
    /// Authorization code from the redirect
    pub code: &'a str,
    /// Redirect URI used in the authorization request
    pub redirect_url: &'a str,
    /// PKCE verifier, when PKCE was used
    pub code_verifier: Option<&'a str>,
    /// Client secret for this exchange
    pub client_secret: Option<&'a SecretString>,
    /// Extra form fields
    pub additional_parameters: &'a BTreeMap<String, String>,
}

/// Reject plain `http://` URLs unless the settings allow them
///
/// # Errors
///
/// Returns [`AppAuthError::InsecureTransport`] for a disallowed `http` URL and
/// a configuration error when `url` does not parse.
pub fn ensure_secure(url: &str, settings: &ConnectionSettings) -> Result<Url> {
    let parsed = Url::parse(url).map_err(|e| ConfigurationError::InvalidUrl {
        field: "endpoint",
        reason: format!("{url}: {e}"),
    })?;

    if parsed.scheme() == "http" && !settings.insecure_http_allowed {
        return Err(AppAuthError::InsecureTransport {
            url: url.to_string(),
        });
    }

    Ok(parsed)
}

/// Authorization request URL (RFC 6749 Section 4.1.1, RFC 7636 Section 4.3)
///
/// # Errors
///
/// Fails when the endpoint is insecure or malformed.
pub fn authorization_url(
    endpoint: &str,
    config: &ClientConfiguration,
    flow: &FlowState,
) -> Result<Url> {
    let mut url = ensure_secure(endpoint, &config.connection)?;
    let scope = config.scopes.join(" ");

    let mut fixed: Vec<(&str, &str)> = vec![
        ("response_type", "code"),
        ("client_id", config.client_id.as_str()),
        ("redirect_uri", config.redirect_url.as_deref().unwrap_or_default()),
        ("scope", scope.as_str()),
        ("state", flow.state.as_str()),
    ];
    if let Some(pkce) = &flow.pkce {
        fixed.push(("code_challenge", pkce.code_challenge.as_str()));
        fixed.push(("code_challenge_method", pkce.code_challenge_method.as_str()));
    }
    if let Some(nonce) = &flow.nonce {
        fixed.push(("nonce", nonce.as_str()));
    }

    append_query(&mut url, &fixed, &config.additional_parameters);
    Ok(url)
}

/// RP-initiated logout URL
///
/// # Errors
///
/// Fails when the endpoint is insecure or malformed.
pub fn end_session_url(
    endpoint: &str,
    options: &EndSessionOptions,
    state: &str,
    settings: &ConnectionSettings,
) -> Result<Url> {
    let mut url = ensure_secure(endpoint, settings)?;
    let fixed = [
        ("id_token_hint", options.id_token.expose_secret().as_str()),
        ("post_logout_redirect_uri", options.post_logout_redirect_url.as_str()),
        ("state", state),
    ];
    append_query(&mut url, &fixed, &options.additional_parameters);
    Ok(url)
}

/// Discovery document request
pub fn discovery_request(url: &str, settings: &ConnectionSettings, phase: HeaderPhase) -> HttpRequest {
    let mut request = HttpRequest::get(url);
    finish(&mut request, settings, phase);
    request
}

/// Authorization-code token request (RFC 6749 Section 4.1.3)
///
/// # Errors
///
/// Fails when the endpoint is insecure or malformed.
pub fn code_exchange_request(
    endpoint: &str,
    config: &ClientConfiguration,
    exchange: CodeExchange<'_>,
) -> Result<HttpRequest> {
    ensure_secure(endpoint, &config.connection)?;

    let mut form = vec![
        field("grant_type", "authorization_code"),
        field("code", exchange.code),
        field("redirect_uri", exchange.redirect_url),
        field("client_id", &config.client_id),
    ];
    if let Some(verifier) = exchange.code_verifier {
        form.push(field("code_verifier", verifier));
    }

    let mut request = HttpRequest::post(endpoint, RequestBody::Empty);
    authenticate_client(
        &mut request,
        &mut form,
        config.client_auth_method,
        &config.client_id,
        exchange.client_secret,
    );
    extend_form(&mut form, exchange.additional_parameters);
    extend_form(&mut form, &config.additional_parameters);

    request.body = RequestBody::Form(form);
    finish(&mut request, &config.connection, HeaderPhase::Token);
    Ok(request)
}

/// Refresh-token request (RFC 6749 Section 6)
///
/// # Errors
///
/// Fails when the endpoint is insecure or malformed.
pub fn refresh_request(
    endpoint: &str,
    config: &ClientConfiguration,
    options: &RefreshOptions,
) -> Result<HttpRequest> {
    ensure_secure(endpoint, &config.connection)?;

    let mut form = vec![
        field("grant_type", "refresh_token"),
        field("refresh_token", options.refresh_token.expose_secret()),
        field("client_id", &config.client_id),
    ];
    if !config.scopes.is_empty() {
        form.push(field("scope", &config.scopes.join(" ")));
    }

    let mut request = HttpRequest::post(endpoint, RequestBody::Empty);
    authenticate_client(
        &mut request,
        &mut form,
        config.client_auth_method,
        &config.client_id,
        config.client_secret.as_ref(),
    );
    extend_form(&mut form, &options.additional_parameters);
    extend_form(&mut form, &config.additional_parameters);

    request.body = RequestBody::Form(form);
    finish(&mut request, &config.connection, HeaderPhase::Token);
    Ok(request)
}

/// Token revocation request (RFC 7009 Section 2.1)
///
/// # Errors
///
/// Fails when the endpoint is insecure or malformed.
pub fn revocation_request(
    endpoint: &str,
    config: &ClientConfiguration,
    options: &RevokeOptions,
) -> Result<HttpRequest> {
    ensure_secure(endpoint, &config.connection)?;

    let mut form = vec![field("token", options.token_to_revoke.expose_secret())];
    if let Some(hint) = &options.token_type_hint {
        form.push(field("token_type_hint", hint));
    }
    if options.send_client_id {
        form.push(field("client_id", &config.client_id));
    }

    let mut request = HttpRequest::post(endpoint, RequestBody::Form(form));
    if options.include_basic_auth
        && let Some(secret) = &config.client_secret
    {
        request.set_header("Authorization", basic_authorization(&config.client_id, secret));
    }

    finish(&mut request, &config.connection, HeaderPhase::Token);
    Ok(request)
}

/// Dynamic client registration request (RFC 7591 Section 3.1)
///
/// # Errors
///
/// Fails when the endpoint is insecure or malformed.
pub fn registration_request(
    endpoint: &str,
    config: &RegistrationConfiguration,
) -> Result<HttpRequest> {
    ensure_secure(endpoint, &config.connection)?;

    let mut metadata = Map::new();
    metadata.insert(
        "redirect_uris".to_string(),
        Value::from(config.redirect_urls.clone()),
    );
    if let Some(response_types) = &config.response_types {
        metadata.insert("response_types".to_string(), Value::from(response_types.clone()));
    }
    if let Some(grant_types) = &config.grant_types {
        metadata.insert("grant_types".to_string(), Value::from(grant_types.clone()));
    }
    if let Some(subject_type) = &config.subject_type {
        metadata.insert("subject_type".to_string(), Value::from(subject_type.clone()));
    }
    if let Some(method) = &config.token_endpoint_auth_method {
        metadata.insert(
            "token_endpoint_auth_method".to_string(),
            Value::from(method.clone()),
        );
    }
    for (key, value) in &config.additional_parameters {
        metadata
            .entry(key.clone())
            .or_insert_with(|| Value::from(value.clone()));
    }

    let mut request = HttpRequest::post(endpoint, RequestBody::Json(Value::Object(metadata)));
    finish(&mut request, &config.connection, HeaderPhase::Register);
    Ok(request)
}

/// `Authorization: Basic` value (RFC 6749 Section 2.3.1)
///
/// Both halves are form-urlencoded before joining, as the RFC requires.
pub fn basic_authorization(client_id: &str, secret: &SecretString) -> String {
    let encode = |value: &str| url::form_urlencoded::byte_serialize(value.as_bytes()).collect::<String>();
    let credentials = format!("{}:{}", encode(client_id), encode(secret.expose_secret()));
    format!("Basic {}", STANDARD.encode(credentials))
}

fn authenticate_client(
    request: &mut HttpRequest,
    form: &mut Vec<(String, String)>,
    method: ClientAuthMethod,
    client_id: &str,
    secret: Option<&SecretString>,
) {
    let Some(secret) = secret else {
        return;
    };
    match method {
        ClientAuthMethod::Basic => {
            request.set_header("Authorization", basic_authorization(client_id, secret));
        }
        ClientAuthMethod::Post => {
            form.push(field("client_secret", secret.expose_secret()));
        }
    }
}

/// Default headers, then custom headers for `phase` (custom wins), then the timeout
fn finish(request: &mut HttpRequest, settings: &ConnectionSettings, phase: HeaderPhase) {
    request.set_header("Accept", "application/json");
    if let Some(headers) = settings.headers_for(phase) {
        for (name, value) in headers {
            request.set_header(name.clone(), value.clone());
        }
    }
    request.timeout = settings.connection_timeout;
}

fn field(name: &str, value: &str) -> (String, String) {
    (name.to_string(), value.to_string())
}

fn extend_form(form: &mut Vec<(String, String)>, extra: &BTreeMap<String, String>) {
    for (key, value) in extra {
        if key != "client_secret" && !form.iter().any(|(name, _)| name == key) {
            form.push((key.clone(), value.clone()));
        }
    }
}

fn append_query(url: &mut Url, fixed: &[(&str, &str)], extra: &BTreeMap<String, String>) {
    let taken: HashSet<&str> = fixed.iter().map(|(name, _)| *name).collect();
    let mut query = url.query_pairs_mut();
    query.extend_pairs(fixed);
    for (key, value) in extra {
        if !taken.contains(key.as_str()) {
            query.append_pair(key, value);
        }
    }
}
