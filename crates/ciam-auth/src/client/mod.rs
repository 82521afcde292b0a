//! HTTP access to external identity providers.
//!
//! [`HttpOAuthClient`] implements both provider capabilities against
//! standard OAuth 2.0 / OpenID Connect endpoints. Provider adapters wrap it
//! to add provider-specific behavior.

mod http;
pub mod jwks;

pub use http::HttpOAuthClient;
pub use jwks::{JwksError, KeySetCache, KeySetCacheConfig};
