//! Provider signing key cache.
//!
//! ID tokens are verified against the identity provider's published JSON
//! Web Key Set. Key sets are cached per endpoint; the lifetime follows the
//! provider's `Cache-Control: max-age` hint, clamped to configured bounds.
//! An unknown `kid` triggers one refetch so rotated keys are picked up.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use jsonwebtoken::jwk::{Jwk, JwkSet, KeyAlgorithm};
use jsonwebtoken::{Algorithm, DecodingKey};
use tokio::sync::RwLock;
use url::Url;

use crate::config::FederationConfig;

/// Configuration for the key set cache.
#[derive(Debug, Clone)]
pub struct KeySetCacheConfig {
    /// Lifetime when the provider sends no Cache-Control hint.
    pub default_ttl: Duration,

    /// Upper bound for provider-supplied lifetimes (default: 24 hours).
    pub max_ttl: Duration,

    /// Lower bound for provider-supplied lifetimes (default: 5 minutes).
    pub min_ttl: Duration,

    /// Largest accepted key set document (default: 1 MB).
    pub max_response_size: usize,

    /// Accept plain HTTP key set endpoints.
    pub allow_http: bool,
}

impl Default for KeySetCacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(3600),
            max_ttl: Duration::from_secs(86400),
            min_ttl: Duration::from_secs(300),
            max_response_size: 1024 * 1024,
            allow_http: false,
        }
    }
}

impl KeySetCacheConfig {
    /// Derives cache settings from the federation configuration.
    #[must_use]
    pub fn from_federation(config: &FederationConfig) -> Self {
        let defaults = Self::default();
        Self {
            default_ttl: config.jwks_cache_ttl,
            min_ttl: defaults.min_ttl.min(config.jwks_cache_ttl),
            max_ttl: defaults.max_ttl.max(config.jwks_cache_ttl),
            allow_http: config.allow_http,
            ..defaults
        }
    }
}

/// Errors that can occur while loading provider keys.
#[derive(Debug, thiserror::Error)]
pub enum JwksError {
    /// The key set could not be fetched.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// The endpoint answered with a non-success status.
    #[error("HTTP error: status {0}")]
    HttpError(u16),

    /// The body is not a JSON Web Key Set.
    #[error("Failed to parse JWKS: {0}")]
    ParseError(String),

    /// No key with the requested id, even after a refetch.
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    /// The endpoint is not HTTPS and plain HTTP is not allowed.
    #[error("Invalid URL scheme: only HTTPS is allowed")]
    InvalidScheme,

    /// The key set document is larger than allowed.
    #[error("Response exceeds maximum size of {max_size} bytes")]
    ResponseTooLarge {
        /// The maximum allowed size.
        max_size: usize,
    },
}

struct CachedKeySet {
    keys: JwkSet,
    expires_at: Instant,
}

/// Cache of provider key sets, keyed by endpoint.
pub struct KeySetCache {
    http_client: reqwest::Client,
    entries: RwLock<HashMap<String, CachedKeySet>>,
    config: KeySetCacheConfig,
}

impl KeySetCache {
    /// Creates a cache that fetches through `http_client`.
    #[must_use]
    pub fn new(config: KeySetCacheConfig, http_client: reqwest::Client) -> Self {
        Self {
            http_client,
            entries: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Returns the verification key with id `kid` and the algorithm it
    /// declares, fetching the key set if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the key set cannot be fetched or does not
    /// contain a usable key with that id.
    pub async fn signing_key(
        &self,
        jwks_uri: &Url,
        kid: &str,
    ) -> Result<(DecodingKey, Option<Algorithm>), JwksError> {
        if let Some(found) = self.cached_key(jwks_uri, kid).await {
            tracing::trace!(kid = %kid, jwks_uri = %jwks_uri, "JWKS cache hit");
            return Ok(found);
        }

        tracing::debug!(kid = %kid, jwks_uri = %jwks_uri, "JWKS cache miss");
        self.fetch(jwks_uri).await?;

        self.cached_key(jwks_uri, kid)
            .await
            .ok_or_else(|| JwksError::KeyNotFound(kid.to_string()))
    }

    async fn cached_key(&self, jwks_uri: &Url, kid: &str) -> Option<(DecodingKey, Option<Algorithm>)> {
        let entries = self.entries.read().await;
        let entry = entries
            .get(&cache_key(jwks_uri))
            .filter(|e| Instant::now() < e.expires_at)?;

        let jwk = entry
            .keys
            .keys
            .iter()
            .find(|k| k.common.key_id.as_deref() == Some(kid))?;

        DecodingKey::from_jwk(jwk)
            .ok()
            .map(|key| (key, key_algorithm(jwk)))
    }

    /// Fetches the key set at `jwks_uri` and replaces the cached copy.
    ///
    /// # Errors
    ///
    /// Returns an error if the scheme is not allowed, the request fails, or
    /// the body is not a key set.
    pub async fn fetch(&self, jwks_uri: &Url) -> Result<(), JwksError> {
        self.check_scheme(jwks_uri)?;

        let mut response = self
            .http_client
            .get(jwks_uri.as_str())
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(jwks_uri = %jwks_uri, "Failed to fetch JWKS: {}", e);
                JwksError::NetworkError(e.to_string())
            })?;

        if !response.status().is_success() {
            return Err(JwksError::HttpError(response.status().as_u16()));
        }

        let max_size = self.config.max_response_size;
        if response
            .content_length()
            .is_some_and(|len| len as usize > max_size)
        {
            return Err(JwksError::ResponseTooLarge { max_size });
        }

        let ttl = self.ttl_from_headers(response.headers());

        // Content-Length is optional, so the limit is enforced while reading.
        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| JwksError::NetworkError(e.to_string()))?
        {
            if body.len() + chunk.len() > max_size {
                tracing::warn!(jwks_uri = %jwks_uri, max_size, "JWKS response too large");
                return Err(JwksError::ResponseTooLarge { max_size });
            }
            body.extend_from_slice(&chunk);
        }

        let keys: JwkSet = serde_json::from_slice(&body).map_err(|e| {
            tracing::warn!(jwks_uri = %jwks_uri, "Failed to parse JWKS: {}", e);
            JwksError::ParseError(e.to_string())
        })?;

        tracing::debug!(
            jwks_uri = %jwks_uri,
            keys = keys.keys.len(),
            ttl_secs = ttl.as_secs(),
            "Cached provider key set"
        );

        self.entries.write().await.insert(
            cache_key(jwks_uri),
            CachedKeySet {
                keys,
                expires_at: Instant::now() + ttl,
            },
        );

        Ok(())
    }

    fn check_scheme(&self, uri: &Url) -> Result<(), JwksError> {
        match uri.scheme() {
            "https" => Ok(()),
            "http" if self.config.allow_http => Ok(()),
            _ => Err(JwksError::InvalidScheme),
        }
    }

    /// Lifetime from `Cache-Control: max-age`, clamped to the configured
    /// bounds.
    fn ttl_from_headers(&self, headers: &reqwest::header::HeaderMap) -> Duration {
        headers
            .get(reqwest::header::CACHE_CONTROL)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| {
                v.split(',')
                    .filter_map(|directive| directive.trim().strip_prefix("max-age="))
                    .find_map(|secs| secs.parse::<u64>().ok())
            })
            .map(Duration::from_secs)
            .unwrap_or(self.config.default_ttl)
            .clamp(self.config.min_ttl, self.config.max_ttl)
    }

    /// Drops the cached key set for `jwks_uri`.
    pub async fn invalidate(&self, jwks_uri: &Url) {
        self.entries.write().await.remove(&cache_key(jwks_uri));
    }

    /// Returns the number of cached key sets.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

fn cache_key(uri: &Url) -> String {
    uri.as_str().trim_end_matches('/').to_string()
}

/// Asymmetric algorithm declared by a key, if any.
fn key_algorithm(jwk: &Jwk) -> Option<Algorithm> {
    match jwk.common.key_algorithm? {
        KeyAlgorithm::RS256 => Some(Algorithm::RS256),
        KeyAlgorithm::RS384 => Some(Algorithm::RS384),
        KeyAlgorithm::RS512 => Some(Algorithm::RS512),
        KeyAlgorithm::ES256 => Some(Algorithm::ES256),
        KeyAlgorithm::ES384 => Some(Algorithm::ES384),
        KeyAlgorithm::PS256 => Some(Algorithm::PS256),
        KeyAlgorithm::PS384 => Some(Algorithm::PS384),
        KeyAlgorithm::PS512 => Some(Algorithm::PS512),
        KeyAlgorithm::EdDSA => Some(Algorithm::EdDSA),
        _ => None,
    }
}
