//! # Provider Discovery
//!
//! Resolution of provider endpoints from OpenID Connect Discovery 1.0
//! documents, explicit configuration, or both.
//!
//! ## Resolution rules
//!
//! - Explicit endpoints that cover the operation are used as-is, no network I/O
//! - Otherwise `{issuer}/.well-known/openid-configuration` is fetched; the
//!   issuer path is preserved
//! - Explicit endpoints override discovered ones field by field
//! - A missing endpoint only fails the operations that need it
//!
//! ## Caching
//!
//! - Successful documents are cached per issuer until [`DiscoveryResolver::clear_cache`]
//! - Failures are never cached
//! - No TTL: provider metadata is treated as stable for the process lifetime
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use appauth::config::{ConnectionSettings, ProviderSource};
//! use appauth::discovery::DiscoveryResolver;
//! use appauth::http::ReqwestTransport;
//! use appauth::validation::Operation;
//!
//! # async fn example() -> appauth::Result<()> {
//! let resolver = DiscoveryResolver::new(Arc::new(ReqwestTransport::new()?));
//! let endpoints = resolver
//!     .resolve(
//!         &ProviderSource::issuer("https://accounts.google.com"),
//!         Operation::Authorize,
//!         &ConnectionSettings::default(),
//!     )
//!     .await?;
//! println!("authorize at {:?}", endpoints.authorization_endpoint);
//! # Ok(())
//! # }
//! ```

mod resolver;
mod types;

pub use resolver::DiscoveryResolver;
pub use types::{DiscoveryDocument, DiscoveryError, Endpoint, ProviderEndpoints};
