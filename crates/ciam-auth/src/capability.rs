//! Provider capabilities consumed by the authorization-code executors.
//!
//! An executor drives the protocol; a capability knows how to talk to one
//! kind of identity provider. Provider adapters (Google, GitHub, a plain
//! OAuth or OIDC server) are implementations of these traits, so a new
//! provider never requires a new executor.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use ciam_core::ServiceError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Claims returned by a userinfo endpoint or carried in an ID token.
pub type Claims = HashMap<String, Value>;

/// OAuth token response from the IdP.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct TokenResponse {
    /// The access token.
    #[serde(default)]
    pub access_token: String,

    /// The token type (usually "Bearer").
    #[serde(default)]
    pub token_type: String,

    /// Granted scopes, space separated.
    #[serde(default)]
    pub scope: String,

    /// Optional refresh token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// The ID token (JWT), present for OIDC providers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,

    /// Token expiration in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
}

impl TokenResponse {
    /// Returns `true` when the provider returned no scope at all.
    ///
    /// Only an absent or empty `scope` counts; whitespace is a value.
    #[must_use]
    pub fn has_empty_scope(&self) -> bool {
        self.scope.is_empty()
    }

    /// Returns the ID token, treating an empty string as absent.
    #[must_use]
    pub fn id_token(&self) -> Option<&str> {
        self.id_token.as_deref().filter(|t| !t.is_empty())
    }
}

/// Resolved endpoints of an OAuth client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct OAuthEndpoints {
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub userinfo_endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwks_endpoint: Option<String>,
}

/// Client registration of this system at an identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct OAuthClientConfig {
    pub client_id: String,
    #[serde(default, skip_serializing)]
    pub client_secret: Option<String>,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub endpoints: OAuthEndpoints,
    #[serde(default)]
    pub additional_params: BTreeMap<String, String>,
}

impl OAuthClientConfig {
    /// Returns `true` if `scope` is configured for this client.
    #[must_use]
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }

    /// Returns `true` if any scope other than the bare `openid` scope is
    /// configured.
    #[must_use]
    pub fn requests_profile_scopes(&self) -> bool {
        self.scopes.iter().any(|s| s != "openid")
    }
}

/// OAuth 2.0 authorization-code capability of an identity provider.
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    /// Builds the URL the user agent is sent to for authorization.
    async fn build_authorize_url(&self, idp_id: &str) -> Result<String, ServiceError>;

    /// Exchanges an authorization code for tokens.
    ///
    /// With `validate_response` set, a response without an access token is
    /// rejected as a client error.
    async fn exchange_code_for_token(
        &self,
        idp_id: &str,
        code: &str,
        validate_response: bool,
    ) -> Result<TokenResponse, ServiceError>;

    /// Fetches the user's claims with an access token.
    async fn fetch_user_info(&self, idp_id: &str, access_token: &str)
    -> Result<Claims, ServiceError>;

    /// Returns the client registration used for `idp_id`.
    async fn oauth_client_config(&self, idp_id: &str) -> Result<OAuthClientConfig, ServiceError>;
}

/// OpenID Connect capability: an OAuth provider that also issues ID tokens.
#[async_trait]
pub trait OidcProvider: OAuthProvider {
    /// Validates an ID token and returns its claims.
    ///
    /// Signature, audience, issuer and expiry are checked here; the nonce is
    /// left to the executor, which knows what the caller submitted.
    async fn id_token_claims(&self, idp_id: &str, id_token: &str) -> Result<Claims, ServiceError>;
}

/// Removes the listed keys from a claim map.
pub(crate) fn without_keys(mut claims: Claims, keys: &[&str]) -> Claims {
    for key in keys {
        claims.remove(*key);
    }
    claims
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_response_scope() {
        let token: TokenResponse = serde_json::from_value(serde_json::json!({
            "access_token": "at",
            "token_type": "Bearer",
            "scope": "openid email"
        }))
        .unwrap();

        assert!(!token.has_empty_scope());
        assert!(token.id_token().is_none());
    }

    #[test]
    fn test_whitespace_scope_is_not_empty() {
        let token = TokenResponse {
            access_token: "at".to_string(),
            scope: " ".to_string(),
            ..TokenResponse::default()
        };
        assert!(!token.has_empty_scope());

        let token = TokenResponse {
            scope: String::new(),
            ..token
        };
        assert!(token.has_empty_scope());
    }

    #[test]
    fn test_token_response_missing_scope() {
        let token: TokenResponse =
            serde_json::from_value(serde_json::json!({ "access_token": "at", "id_token": "" }))
                .unwrap();
        assert!(token.has_empty_scope());
        assert!(token.id_token().is_none());
    }

    #[test]
    fn test_profile_scopes() {
        let mut config = OAuthClientConfig {
            client_id: "c".to_string(),
            client_secret: Some("s".to_string()),
            redirect_uri: "https://app/cb".to_string(),
            scopes: vec!["openid".to_string()],
            endpoints: OAuthEndpoints {
                authorization_endpoint: "https://idp/authorize".to_string(),
                token_endpoint: "https://idp/token".to_string(),
                userinfo_endpoint: "https://idp/userinfo".to_string(),
                jwks_endpoint: None,
            },
            additional_params: BTreeMap::new(),
        };
        assert!(!config.requests_profile_scopes());
        assert!(config.has_scope("openid"));

        config.scopes.push("email".to_string());
        assert!(config.requests_profile_scopes());

        let json = serde_json::to_value(&config).unwrap();
        assert!(json.get("client_secret").is_none());
    }

    #[test]
    fn test_without_keys() {
        let mut claims = Claims::new();
        claims.insert("sub".to_string(), Value::from("1"));
        claims.insert("email".to_string(), Value::from("a@b.c"));
        let claims = without_keys(claims, &["sub", "username"]);
        assert_eq!(claims.len(), 1);
        assert!(claims.contains_key("email"));
    }
}
