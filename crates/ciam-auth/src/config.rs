//! Federation configuration.
//!
//! Controls the HTTP capability (timeouts, JWKS caching, plain-HTTP
//! endpoints for local testing) and the policies executors apply to
//! provider responses.
//!
//! # Example (TOML)
//!
//! ```toml
//! request_timeout = "10s"
//! clock_skew_tolerance = "1m"
//! jwks_cache_ttl = "1h"
//! empty_scope_policy = "resolve"
//! nonce_policy = "required"
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// What an executor does when the token response grants no scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyScopePolicy {
    /// Skip userinfo and treat the user as unauthenticated.
    #[default]
    TreatAsUnauthenticated,
    /// Ignore the scope and resolve the user from userinfo claims.
    Resolve,
}

/// When the OIDC executor compares the ID token nonce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoncePolicy {
    /// Compare only when the caller supplied a nonce input.
    #[default]
    WhenSupplied,
    /// A nonce input is mandatory and must match the ID token.
    Required,
}

/// Policies applied by the authorization-code executors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExecutorPolicies {
    pub empty_scope: EmptyScopePolicy,
    pub nonce: NoncePolicy,
}

impl ExecutorPolicies {
    /// Sets the empty-scope policy.
    #[must_use]
    pub fn with_empty_scope(mut self, policy: EmptyScopePolicy) -> Self {
        self.empty_scope = policy;
        self
    }

    /// Sets the nonce policy.
    #[must_use]
    pub fn with_nonce(mut self, policy: NoncePolicy) -> Self {
        self.nonce = policy;
        self
    }
}

/// External identity provider federation configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct FederationConfig {
    /// Timeout for every request made to an identity provider.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Clock skew tolerated when validating ID token timestamps.
    #[serde(with = "humantime_serde")]
    pub clock_skew_tolerance: Duration,

    /// Allow plain HTTP provider endpoints.
    /// Only meant for local development and tests.
    pub allow_http: bool,

    /// How long provider signing keys are cached when the provider sends
    /// no Cache-Control hint.
    #[serde(with = "humantime_serde")]
    pub jwks_cache_ttl: Duration,

    pub empty_scope_policy: EmptyScopePolicy,

    pub nonce_policy: NoncePolicy,
}

impl Default for FederationConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            clock_skew_tolerance: Duration::from_secs(60),
            allow_http: false,
            jwks_cache_ttl: Duration::from_secs(3600), // 1 hour
            empty_scope_policy: EmptyScopePolicy::default(),
            nonce_policy: NoncePolicy::default(),
        }
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// The configuration document could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    Parse(String),
}

impl FederationConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` for malformed TOML and
    /// `ConfigError::InvalidValue` for values rejected by [`Self::validate`].
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if:
    /// - The request timeout is zero
    /// - The clock skew tolerance exceeds 10 minutes
    /// - The JWKS cache TTL is shorter than one minute
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.request_timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "request_timeout must be > 0".to_string(),
            ));
        }

        if self.clock_skew_tolerance > Duration::from_secs(600) {
            return Err(ConfigError::InvalidValue(format!(
                "clock_skew_tolerance of {}s exceeds the 600s limit",
                self.clock_skew_tolerance.as_secs()
            )));
        }

        if self.jwks_cache_ttl < Duration::from_secs(60) {
            return Err(ConfigError::InvalidValue(
                "jwks_cache_ttl must be at least 1 minute".to_string(),
            ));
        }

        Ok(())
    }

    /// Returns the executor policies carried by this configuration.
    #[must_use]
    pub fn policies(&self) -> ExecutorPolicies {
        ExecutorPolicies {
            empty_scope: self.empty_scope_policy,
            nonce: self.nonce_policy,
        }
    }

    /// Allows HTTP endpoints (for testing only).
    #[must_use]
    pub fn with_allow_http(mut self, allow: bool) -> Self {
        self.allow_http = allow;
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = FederationConfig::default();
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.clock_skew_tolerance, Duration::from_secs(60));
        assert!(!config.allow_http);
        assert_eq!(
            config.empty_scope_policy,
            EmptyScopePolicy::TreatAsUnauthenticated
        );
        assert_eq!(config.nonce_policy, NoncePolicy::WhenSupplied);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml() {
        let config = FederationConfig::from_toml_str(
            r#"
request_timeout = "10s"
clock_skew_tolerance = "2m"
allow_http = true
jwks_cache_ttl = "30m"
empty_scope_policy = "resolve"
nonce_policy = "required"
"#,
        )
        .unwrap();

        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert_eq!(config.clock_skew_tolerance, Duration::from_secs(120));
        assert!(config.allow_http);
        assert_eq!(config.jwks_cache_ttl, Duration::from_secs(1800));

        let policies = config.policies();
        assert_eq!(policies.empty_scope, EmptyScopePolicy::Resolve);
        assert_eq!(policies.nonce, NoncePolicy::Required);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = FederationConfig::from_toml_str(r#"nonce_policy = "required""#).unwrap();
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.nonce_policy, NoncePolicy::Required);
        assert_eq!(
            config.empty_scope_policy,
            EmptyScopePolicy::TreatAsUnauthenticated
        );
    }

    #[test]
    fn test_invalid_values() {
        let err = FederationConfig::from_toml_str(r#"request_timeout = "0s""#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(_)));
        assert!(err.to_string().contains("request_timeout"));

        let err = FederationConfig::from_toml_str(r#"jwks_cache_ttl = "5s""#).unwrap_err();
        assert!(err.to_string().contains("jwks_cache_ttl"));

        let mut config = FederationConfig::default();
        config.clock_skew_tolerance = Duration::from_secs(3600);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_error() {
        let err = FederationConfig::from_toml_str(r#"nonce_policy = "sometimes""#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_policies_builder() {
        let policies = ExecutorPolicies::default()
            .with_empty_scope(EmptyScopePolicy::Resolve)
            .with_nonce(NoncePolicy::Required);
        assert_eq!(policies.empty_scope, EmptyScopePolicy::Resolve);
        assert_eq!(policies.nonce, NoncePolicy::Required);
    }
}
