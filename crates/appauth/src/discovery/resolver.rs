//! Discovery resolution with a per-issuer cache

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info, warn};
use url::Url;

use super::types::{DiscoveryDocument, DiscoveryError, ProviderEndpoints};
use crate::config::{ConnectionSettings, HeaderPhase, ProviderSource};
use crate::error::{AppAuthError, ConfigurationError, Result};
use crate::http::HttpTransport;
use crate::request::{discovery_request, ensure_secure};
use crate::validation::Operation;

const WELL_KNOWN_PATH: &str = ".well-known/openid-configuration";

/// Resolves provider endpoints for an operation
///
/// Successful discovery documents are cached per issuer for the lifetime of
/// the resolver; failures are not cached. Concurrent resolutions of the same
/// issuer may both fetch, and the last one wins the cache slot.
pub struct DiscoveryResolver {
    transport: Arc<dyn HttpTransport>,
    cache: DashMap<String, Arc<DiscoveryDocument>>,
}

impl DiscoveryResolver {
    /// Create a resolver with an empty cache
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            transport,
            cache: DashMap::new(),
        }
    }

    /// Discovery document URL for `issuer`
    ///
    /// The issuer path is kept and `/.well-known/openid-configuration` is
    /// appended after trimming a trailing slash.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::InvalidIssuer`] when the issuer is not an
    /// absolute URL with a host.
    pub fn discovery_url(issuer: &str) -> std::result::Result<String, DiscoveryError> {
        let mut url = Url::parse(issuer)
            .map_err(|e| DiscoveryError::InvalidIssuer(format!("{issuer}: {e}")))?;
        if url.host_str().is_none() {
            return Err(DiscoveryError::InvalidIssuer(format!("{issuer}: missing host")));
        }

        let path = format!("{}/{}", url.path().trim_end_matches('/'), WELL_KNOWN_PATH);
        url.set_path(&path);
        url.set_query(None);
        url.set_fragment(None);
        Ok(url.to_string())
    }

    /// Resolve the endpoints `operation` needs
    ///
    /// Explicit endpoints that already cover the operation are used without
    /// any network I/O. Otherwise the issuer's document is discovered and the
    /// explicit endpoints are layered over it field by field.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when there is no issuer to fall back on,
    /// a discovery error when the document cannot be fetched or lacks a needed
    /// endpoint, and the transport gate or timeout errors of the fetch.
    pub async fn resolve(
        &self,
        provider: &ProviderSource,
        operation: Operation,
        settings: &ConnectionSettings,
    ) -> Result<ProviderEndpoints> {
        let needed = operation.required_endpoints();
        let explicit = provider.explicit_endpoints();

        if let Some(endpoints) = explicit
            && endpoints.covers(needed)
        {
            debug!(operation = operation.name(), "using configured endpoints");
            return Ok(match provider.issuer_url().and_then(|i| self.get_cached(i)) {
                Some(document) => endpoints.merged_over(&document.endpoints()),
                None => endpoints.clone(),
            });
        }

        let Some(issuer) = provider.issuer_url() else {
            let missing = needed
                .iter()
                .find(|endpoint| explicit.and_then(|e| e.get(**endpoint)).is_none())
                .map_or("endpoint", |endpoint| endpoint.field_name());
            return Err(ConfigurationError::MissingProvider {
                operation: operation.name(),
                endpoint: missing,
            }
            .into());
        };

        let document = self
            .fetch(issuer, settings, operation.header_phase())
            .await?;
        let discovered = document.endpoints();
        let endpoints = match explicit {
            Some(explicit) => explicit.merged_over(&discovered),
            None => discovered,
        };

        for endpoint in needed {
            endpoints
                .require(*endpoint)
                .map_err(|e| AppAuthError::discovery(issuer, e))?;
        }
        Ok(endpoints)
    }

    /// Fetch (or return the cached) discovery document for `issuer`
    ///
    /// # Errors
    ///
    /// Returns [`AppAuthError::Discovery`] for unreachable hosts, non-2xx
    /// responses and invalid documents, [`AppAuthError::InsecureTransport`]
    /// for a disallowed `http` issuer and [`AppAuthError::Timeout`] when the
    /// connection timeout elapses.
    pub async fn fetch(
        &self,
        issuer: &str,
        settings: &ConnectionSettings,
        phase: HeaderPhase,
    ) -> Result<Arc<DiscoveryDocument>> {
        if let Some(cached) = self.get_cached(issuer) {
            debug!(issuer, "returning cached discovery document");
            return Ok(cached);
        }

        let url = Self::discovery_url(issuer).map_err(|e| AppAuthError::discovery(issuer, e))?;
        ensure_secure(&url, settings)?;
        debug!(issuer, url = %url, "fetching discovery document");

        let response = self
            .transport
            .execute(discovery_request(&url, settings, phase))
            .await
            .map_err(|e| match e {
                AppAuthError::Transport { message, .. } => {
                    AppAuthError::discovery(issuer, DiscoveryError::Unreachable(message))
                }
                other => other,
            })?;

        if !response.is_success() {
            warn!(issuer, status = response.status, "discovery failed");
            return Err(AppAuthError::discovery(
                issuer,
                DiscoveryError::Status(response.status),
            ));
        }

        let document: DiscoveryDocument = serde_json::from_slice(&response.body).map_err(|e| {
            AppAuthError::discovery(issuer, DiscoveryError::InvalidJson(e.to_string()))
        })?;

        if let Some(advertised) = &document.issuer
            && advertised.trim_end_matches('/') != cache_key(issuer)
        {
            debug!(issuer, advertised = %advertised, "discovery document names a different issuer");
        }

        let document = Arc::new(document);
        self.cache
            .insert(cache_key(issuer).to_string(), Arc::clone(&document));
        info!(issuer, "cached discovery document");
        Ok(document)
    }

    /// Cached document for `issuer`, without network I/O
    pub fn get_cached(&self, issuer: &str) -> Option<Arc<DiscoveryDocument>> {
        self.cache
            .get(cache_key(issuer))
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Drop every cached document
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Issuers with a cached document
    pub fn cached_issuers(&self) -> Vec<String> {
        let mut issuers: Vec<String> = self.cache.iter().map(|entry| entry.key().clone()).collect();
        issuers.sort();
        issuers
    }
}

impl std::fmt::Debug for DiscoveryResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveryResolver")
            .field("cached_issuers", &self.cache.len())
            .finish()
    }
}

fn cache_key(issuer: &str) -> &str {
    issuer.trim_end_matches('/')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{HttpRequest, HttpResponse};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    /// Transport answering every request with the same response
    struct FixedTransport {
        response: HttpResponse,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl FixedTransport {
        fn new(status: u16, body: &str) -> Arc<Self> {
            Arc::new(Self {
                response: HttpResponse::new(status, body),
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl HttpTransport for FixedTransport {
        async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
            self.requests.lock().push(request);
            Ok(self.response.clone())
        }
    }

    const DOCUMENT: &str = r#"{
        "issuer": "https://idp.example.com/tenant",
        "authorization_endpoint": "https://idp.example.com/tenant/authorize",
        "token_endpoint": "https://idp.example.com/tenant/token"
    }"#;

    #[test]
    fn test_discovery_url_keeps_issuer_path() {
        assert_eq!(
            DiscoveryResolver::discovery_url("https://idp.example.com").unwrap(),
            "https://idp.example.com/.well-known/openid-configuration"
        );
        assert_eq!(
            DiscoveryResolver::discovery_url("https://idp.example.com/tenant/").unwrap(),
            "https://idp.example.com/tenant/.well-known/openid-configuration"
        );
        assert!(DiscoveryResolver::discovery_url("idp.example.com").is_err());
    }

    #[tokio::test]
    async fn test_explicit_endpoints_skip_network() {
        let transport = FixedTransport::new(500, "");
        let resolver = DiscoveryResolver::new(transport.clone());
        let provider = ProviderSource::IssuerWithOverrides {
            issuer: "https://idp.example.com".into(),
            endpoints: ProviderEndpoints {
                token_endpoint: Some("https://proxy.example.com/token".into()),
                ..ProviderEndpoints::default()
            },
        };

        let endpoints = resolver
            .resolve(&provider, Operation::Refresh, &ConnectionSettings::default())
            .await
            .unwrap();
        assert_eq!(
            endpoints.token_endpoint.as_deref(),
            Some("https://proxy.example.com/token")
        );
        assert!(transport.requests.lock().is_empty());
    }

    #[tokio::test]
    async fn test_discovery_merges_and_caches() {
        let transport = FixedTransport::new(200, DOCUMENT);
        let resolver = DiscoveryResolver::new(transport.clone());
        let provider = ProviderSource::IssuerWithOverrides {
            issuer: "https://idp.example.com/tenant/".into(),
            endpoints: ProviderEndpoints {
                token_endpoint: Some("https://proxy.example.com/token".into()),
                ..ProviderEndpoints::default()
            },
        };
        let settings = ConnectionSettings::default();

        let endpoints = resolver
            .resolve(&provider, Operation::Authorize, &settings)
            .await
            .unwrap();
        assert_eq!(
            endpoints.authorization_endpoint.as_deref(),
            Some("https://idp.example.com/tenant/authorize")
        );
        assert_eq!(
            endpoints.token_endpoint.as_deref(),
            Some("https://proxy.example.com/token")
        );

        resolver
            .resolve(&provider, Operation::OnlyAuthorize, &settings)
            .await
            .unwrap();
        let requests = transport.requests.lock();
        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0].url,
            "https://idp.example.com/tenant/.well-known/openid-configuration"
        );
        drop(requests);
        assert_eq!(resolver.cached_issuers(), vec!["https://idp.example.com/tenant"]);

        resolver.clear_cache();
        assert!(resolver.cached_issuers().is_empty());
    }

    #[tokio::test]
    async fn test_missing_endpoint_fails_only_when_needed() {
        let resolver = DiscoveryResolver::new(FixedTransport::new(200, DOCUMENT));
        let provider = ProviderSource::issuer("https://idp.example.com/tenant");
        let settings = ConnectionSettings::default();

        assert!(resolver.resolve(&provider, Operation::Authorize, &settings).await.is_ok());
        let err = resolver
            .resolve(&provider, Operation::Revoke, &settings)
            .await
            .unwrap_err();
        match err {
            AppAuthError::Discovery { source, .. } => {
                assert_eq!(source, DiscoveryError::MissingEndpoint("revocationEndpoint"));
            }
            other => panic!("expected discovery error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let resolver = DiscoveryResolver::new(FixedTransport::new(404, "not found"));
        let provider = ProviderSource::issuer("https://idp.example.com");
        let err = resolver
            .resolve(&provider, Operation::Authorize, &ConnectionSettings::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppAuthError::Discovery {
                source: DiscoveryError::Status(404),
                ..
            }
        ));
        assert!(err.is_retryable());
        assert!(resolver.cached_issuers().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_document() {
        let resolver = DiscoveryResolver::new(FixedTransport::new(200, "[1, 2]"));
        let err = resolver
            .fetch(
                "https://idp.example.com",
                &ConnectionSettings::default(),
                HeaderPhase::Authorize,
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppAuthError::Discovery {
                source: DiscoveryError::InvalidJson(_),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_insecure_issuer_rejected() {
        let transport = FixedTransport::new(200, DOCUMENT);
        let resolver = DiscoveryResolver::new(transport.clone());
        let err = resolver
            .resolve(
                &ProviderSource::issuer("http://idp.example.com"),
                Operation::Authorize,
                &ConnectionSettings::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppAuthError::InsecureTransport { .. }));
        assert!(transport.requests.lock().is_empty());
    }

    #[tokio::test]
    async fn test_discovery_uses_phase_headers() {
        let transport = FixedTransport::new(200, DOCUMENT);
        let resolver = DiscoveryResolver::new(transport.clone());
        let mut settings = ConnectionSettings::default();
        settings.custom_headers.insert(
            "register".into(),
            [("X-Register".to_string(), "yes".to_string())].into(),
        );

        resolver
            .fetch("https://idp.example.com/tenant", &settings, HeaderPhase::Register)
            .await
            .unwrap();
        assert_eq!(transport.requests.lock()[0].header("x-register"), Some("yes"));
    }
}
