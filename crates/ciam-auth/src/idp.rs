//! Identity provider metadata and lookup.
//!
//! # Example
//!
//! ```ignore
//! use ciam_auth::idp::{IdentityProvider, IdentityProviderRegistry, IdpType};
//!
//! let google = IdentityProvider::new("google", "Google", IdpType::Google, "client-id")
//!     .with_client_secret("secret")
//!     .with_redirect_uri("https://app.example.com/callback")
//!     .with_scopes(vec!["openid", "email", "profile"]);
//!
//! let registry = IdentityProviderRegistry::new();
//! registry.register(google).await;
//! ```

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use ciam_core::ServiceError;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::capability::{OAuthClientConfig, OAuthEndpoints};
use crate::error::IdpError;
use crate::{github, google};

/// Protocol family of an identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IdpType {
    /// Generic OAuth 2.0 provider.
    OAuth,
    /// Generic OpenID Connect provider.
    Oidc,
    Google,
    Github,
}

impl IdpType {
    /// Well-known endpoints for providers that have them.
    fn default_endpoints(self) -> Option<OAuthEndpoints> {
        match self {
            Self::Google => Some(OAuthEndpoints {
                authorization_endpoint: google::AUTHORIZATION_ENDPOINT.to_string(),
                token_endpoint: google::TOKEN_ENDPOINT.to_string(),
                userinfo_endpoint: google::USERINFO_ENDPOINT.to_string(),
                jwks_endpoint: Some(google::JWKS_ENDPOINT.to_string()),
            }),
            Self::Github => Some(OAuthEndpoints {
                authorization_endpoint: github::AUTHORIZATION_ENDPOINT.to_string(),
                token_endpoint: github::TOKEN_ENDPOINT.to_string(),
                userinfo_endpoint: github::USERINFO_ENDPOINT.to_string(),
                jwks_endpoint: None,
            }),
            Self::OAuth | Self::Oidc => None,
        }
    }
}

/// Configuration of an external identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityProvider {
    /// Unique identifier referenced by flow nodes through `idpId`.
    pub id: String,

    /// Human-readable name shown on the login page.
    pub name: String,

    #[serde(rename = "type")]
    pub provider_type: IdpType,

    /// OAuth client ID registered with the provider.
    pub client_id: String,

    /// OAuth client secret (None for public clients).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,

    /// Where the provider sends the user back with the authorization code.
    #[serde(default)]
    pub redirect_uri: String,

    /// OAuth scopes to request.
    #[serde(default)]
    pub scopes: Vec<String>,

    /// Expected `iss` claim of ID tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,

    /// Optional override for the authorization endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_endpoint: Option<String>,

    /// Optional override for the token endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_endpoint: Option<String>,

    /// Optional override for the userinfo endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub userinfo_endpoint: Option<String>,

    /// Optional override for the JWKS endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwks_endpoint: Option<String>,

    /// Additional parameters appended to the authorization URL.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub additional_params: BTreeMap<String, String>,
}

impl IdentityProvider {
    /// Creates a provider configuration with required fields.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        provider_type: IdpType,
        client_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            provider_type,
            client_id: client_id.into(),
            client_secret: None,
            redirect_uri: String::new(),
            scopes: Vec::new(),
            issuer: None,
            authorization_endpoint: None,
            token_endpoint: None,
            userinfo_endpoint: None,
            jwks_endpoint: None,
            additional_params: BTreeMap::new(),
        }
    }

    /// Sets the client secret.
    #[must_use]
    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    /// Sets the redirect URI.
    #[must_use]
    pub fn with_redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.redirect_uri = uri.into();
        self
    }

    /// Sets the OAuth scopes.
    #[must_use]
    pub fn with_scopes(mut self, scopes: Vec<impl Into<String>>) -> Self {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the expected ID token issuer.
    #[must_use]
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    /// Overrides all endpoints.
    #[must_use]
    pub fn with_endpoints(
        mut self,
        authorization: impl Into<String>,
        token: impl Into<String>,
        userinfo: impl Into<String>,
    ) -> Self {
        self.authorization_endpoint = Some(authorization.into());
        self.token_endpoint = Some(token.into());
        self.userinfo_endpoint = Some(userinfo.into());
        self
    }

    /// Overrides the JWKS endpoint.
    #[must_use]
    pub fn with_jwks_endpoint(mut self, jwks: impl Into<String>) -> Self {
        self.jwks_endpoint = Some(jwks.into());
        self
    }

    /// Adds a parameter to the authorization URL.
    #[must_use]
    pub fn with_additional_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.additional_params.insert(key.into(), value.into());
        self
    }

    /// Resolves endpoints from overrides, falling back to the provider
    /// type's well-known endpoints.
    ///
    /// # Errors
    ///
    /// Returns `IdpError::MissingField` when a generic provider lacks an
    /// authorization, token or userinfo endpoint.
    pub fn endpoints(&self) -> Result<OAuthEndpoints, IdpError> {
        let defaults = self.provider_type.default_endpoints();

        let pick = |over: &Option<String>,
                    fallback: Option<&String>,
                    field: &str|
         -> Result<String, IdpError> {
            over.clone()
                .or_else(|| fallback.cloned())
                .filter(|e| !e.is_empty())
                .ok_or_else(|| IdpError::MissingField(format!("{field} for provider {}", self.id)))
        };

        Ok(OAuthEndpoints {
            authorization_endpoint: pick(
                &self.authorization_endpoint,
                defaults.as_ref().map(|d| &d.authorization_endpoint),
                "authorization_endpoint",
            )?,
            token_endpoint: pick(
                &self.token_endpoint,
                defaults.as_ref().map(|d| &d.token_endpoint),
                "token_endpoint",
            )?,
            userinfo_endpoint: pick(
                &self.userinfo_endpoint,
                defaults.as_ref().map(|d| &d.userinfo_endpoint),
                "userinfo_endpoint",
            )?,
            jwks_endpoint: self
                .jwks_endpoint
                .clone()
                .or_else(|| defaults.and_then(|d| d.jwks_endpoint)),
        })
    }

    /// Builds the client registration view used by executors.
    ///
    /// # Errors
    ///
    /// Fails like [`Self::endpoints`].
    pub fn client_config(&self) -> Result<OAuthClientConfig, IdpError> {
        Ok(OAuthClientConfig {
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            redirect_uri: self.redirect_uri.clone(),
            scopes: self.scopes.clone(),
            endpoints: self.endpoints()?,
            additional_params: self.additional_params.clone(),
        })
    }
}

/// Lookup of identity provider configurations.
#[async_trait]
pub trait IdentityProviderService: Send + Sync {
    async fn get_identity_provider(&self, idp_id: &str) -> Result<IdentityProvider, ServiceError>;
}

/// In-memory identity provider store.
#[derive(Default)]
pub struct IdentityProviderRegistry {
    providers: RwLock<HashMap<String, IdentityProvider>>,
}

impl IdentityProviderRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry pre-populated with `providers`.
    #[must_use]
    pub fn with_providers(providers: impl IntoIterator<Item = IdentityProvider>) -> Self {
        let providers = providers
            .into_iter()
            .map(|p| (p.id.clone(), p))
            .collect::<HashMap<_, _>>();
        Self {
            providers: RwLock::new(providers),
        }
    }

    /// Registers an identity provider, replacing any with the same id.
    pub async fn register(&self, provider: IdentityProvider) {
        let mut providers = self.providers.write().await;
        tracing::info!(
            "Registered identity provider: {} ({})",
            provider.name,
            provider.id
        );
        providers.insert(provider.id.clone(), provider);
    }

    /// Removes a provider, returning it if it was registered.
    pub async fn remove(&self, idp_id: &str) -> Option<IdentityProvider> {
        self.providers.write().await.remove(idp_id)
    }

    /// Gets a provider by ID.
    pub async fn get_provider(&self, idp_id: &str) -> Option<IdentityProvider> {
        self.providers.read().await.get(idp_id).cloned()
    }

    /// Lists all registered providers ordered by id.
    pub async fn list_providers(&self) -> Vec<IdentityProvider> {
        let mut providers: Vec<_> = self.providers.read().await.values().cloned().collect();
        providers.sort_by(|a, b| a.id.cmp(&b.id));
        providers
    }
}

#[async_trait]
impl IdentityProviderService for IdentityProviderRegistry {
    async fn get_identity_provider(&self, idp_id: &str) -> Result<IdentityProvider, ServiceError> {
        self.get_provider(idp_id)
            .await
            .ok_or_else(|| IdpError::ProviderNotFound(idp_id.to_string()).into())
    }
}
