//! Provider metadata types

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Discovery failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiscoveryError {
    /// The discovery document could not be fetched
    #[error("discovery document unreachable: {0}")]
    Unreachable(String),

    /// The discovery endpoint answered with a non-2xx status
    #[error("discovery endpoint returned HTTP {0}")]
    Status(u16),

    /// The body is not a JSON metadata object
    #[error("invalid discovery document: {0}")]
    InvalidJson(String),

    /// Neither the document nor the explicit configuration supplies an endpoint
    #[error("provider metadata has no {0}")]
    MissingEndpoint(&'static str),

    /// The issuer is not an absolute URL
    #[error("invalid issuer URL: {0}")]
    InvalidIssuer(String),
}

/// Endpoint kinds an operation may depend on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// `authorization_endpoint`
    Authorization,
    /// `token_endpoint`
    Token,
    /// `revocation_endpoint`
    Revocation,
    /// `registration_endpoint`
    Registration,
    /// `end_session_endpoint`
    EndSession,
}

impl Endpoint {
    /// Configuration key for this endpoint
    pub fn field_name(self) -> &'static str {
        match self {
            Self::Authorization => "authorizationEndpoint",
            Self::Token => "tokenEndpoint",
            Self::Revocation => "revocationEndpoint",
            Self::Registration => "registrationEndpoint",
            Self::EndSession => "endSessionEndpoint",
        }
    }
}

/// Endpoints of an authorization server
///
/// Any field may be absent: providers that publish partial metadata are
/// legal, and an operation only fails when it needs a field that is missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderEndpoints {
    /// Authorization endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_endpoint: Option<String>,
    /// Token endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_endpoint: Option<String>,
    /// Revocation endpoint (RFC 7009)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revocation_endpoint: Option<String>,
    /// Registration endpoint (RFC 7591)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_endpoint: Option<String>,
    /// End-session endpoint (OpenID RP-initiated logout)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_session_endpoint: Option<String>,
}

impl ProviderEndpoints {
    /// Endpoint URL for `endpoint`, if present
    pub fn get(&self, endpoint: Endpoint) -> Option<&str> {
        match endpoint {
            Endpoint::Authorization => self.authorization_endpoint.as_deref(),
            Endpoint::Token => self.token_endpoint.as_deref(),
            Endpoint::Revocation => self.revocation_endpoint.as_deref(),
            Endpoint::Registration => self.registration_endpoint.as_deref(),
            Endpoint::EndSession => self.end_session_endpoint.as_deref(),
        }
        .filter(|url| !url.is_empty())
    }

    /// Endpoint URL for `endpoint`, failing when absent
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::MissingEndpoint`] when the field is absent.
    pub fn require(&self, endpoint: Endpoint) -> Result<&str, DiscoveryError> {
        self.get(endpoint)
            .ok_or(DiscoveryError::MissingEndpoint(endpoint.field_name()))
    }

    /// Whether every endpoint in `needed` is present
    pub fn covers(&self, needed: &[Endpoint]) -> bool {
        needed.iter().all(|endpoint| self.get(*endpoint).is_some())
    }

    /// Layer `self` over `base`; fields present in `self` win
    pub fn merged_over(&self, base: &ProviderEndpoints) -> ProviderEndpoints {
        fn pick(explicit: &Option<String>, discovered: &Option<String>) -> Option<String> {
            explicit
                .as_ref()
                .filter(|url| !url.is_empty())
                .or(discovered.as_ref())
                .cloned()
        }

        ProviderEndpoints {
            authorization_endpoint: pick(&self.authorization_endpoint, &base.authorization_endpoint),
            token_endpoint: pick(&self.token_endpoint, &base.token_endpoint),
            revocation_endpoint: pick(&self.revocation_endpoint, &base.revocation_endpoint),
            registration_endpoint: pick(&self.registration_endpoint, &base.registration_endpoint),
            end_session_endpoint: pick(&self.end_session_endpoint, &base.end_session_endpoint),
        }
    }
}

/// OpenID Provider metadata (OpenID Connect Discovery 1.0 Section 3)
///
/// Every field is optional and unknown fields are preserved, so partial
/// documents parse and the operation decides what it needs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryDocument {
    /// Issuer identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,

    /// Authorization endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_endpoint: Option<String>,

    /// Token endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_endpoint: Option<String>,

    /// Revocation endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revocation_endpoint: Option<String>,

    /// Registration endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_endpoint: Option<String>,

    /// End-session endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_session_endpoint: Option<String>,

    /// UserInfo endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub userinfo_endpoint: Option<String>,

    /// JWKS URI
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwks_uri: Option<String>,

    /// Supported scopes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes_supported: Option<Vec<String>>,

    /// Supported response types
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_types_supported: Option<Vec<String>>,

    /// Supported PKCE methods
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_challenge_methods_supported: Option<Vec<String>>,

    /// Supported token endpoint authentication methods
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_endpoint_auth_methods_supported: Option<Vec<String>>,

    /// Remaining metadata fields
    #[serde(flatten)]
    pub additional_fields: HashMap<String, serde_json::Value>,
}

impl DiscoveryDocument {
    /// The endpoint subset of the document
    pub fn endpoints(&self) -> ProviderEndpoints {
        ProviderEndpoints {
            authorization_endpoint: self.authorization_endpoint.clone(),
            token_endpoint: self.token_endpoint.clone(),
            revocation_endpoint: self.revocation_endpoint.clone(),
            registration_endpoint: self.registration_endpoint.clone(),
            end_session_endpoint: self.end_session_endpoint.clone(),
        }
    }

    /// Whether the provider advertises S256 PKCE
    ///
    /// Providers that omit the field are assumed to accept it.
    pub fn supports_s256(&self) -> bool {
        self.code_challenge_methods_supported
            .as_ref()
            .is_none_or(|methods| methods.iter().any(|m| m == "S256"))
    }
}
