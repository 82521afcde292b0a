//! HTTP implementation of the provider capabilities.

use std::sync::Arc;

use async_trait::async_trait;
use ciam_core::ServiceError;
use jsonwebtoken::{Validation, decode_header};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use super::jwks::{KeySetCache, KeySetCacheConfig};
use crate::capability::{Claims, OAuthClientConfig, OAuthProvider, OidcProvider, TokenResponse};
use crate::config::FederationConfig;
use crate::error::IdpError;
use crate::idp::{IdentityProvider, IdentityProviderService};

const USER_AGENT: &str = concat!("ciam-auth/", env!("CARGO_PKG_VERSION"));

/// OAuth error response body.
#[derive(Debug, Deserialize)]
struct OAuthErrorResponse {
    error: String,
    error_description: Option<String>,
}

/// Talks to identity providers over HTTP.
///
/// Provider settings are looked up per call through the
/// [`IdentityProviderService`], so registry changes apply to the next
/// request without rebuilding the client.
pub struct HttpOAuthClient {
    idp_service: Arc<dyn IdentityProviderService>,
    http_client: reqwest::Client,
    key_cache: KeySetCache,
    config: FederationConfig,
}

impl HttpOAuthClient {
    /// Creates a client with its own connection pool and key cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        idp_service: Arc<dyn IdentityProviderService>,
        config: FederationConfig,
    ) -> Result<Self, IdpError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(USER_AGENT)
            .build()?;

        let key_cache =
            KeySetCache::new(KeySetCacheConfig::from_federation(&config), http_client.clone());

        Ok(Self {
            idp_service,
            http_client,
            key_cache,
            config,
        })
    }

    #[must_use]
    pub fn config(&self) -> &FederationConfig {
        &self.config
    }

    /// Looks up the provider configuration for `idp_id`.
    ///
    /// # Errors
    ///
    /// Propagates the lookup error of the identity provider service.
    pub async fn identity_provider(&self, idp_id: &str) -> Result<IdentityProvider, ServiceError> {
        self.idp_service.get_identity_provider(idp_id).await
    }

    /// Builds the authorization URL for `provider`.
    ///
    /// Additional parameters are appended in key order, so the URL is
    /// stable for a given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the authorization endpoint is missing or invalid.
    pub fn authorize_url(&self, provider: &IdentityProvider) -> Result<String, IdpError> {
        let client = provider.client_config()?;
        let mut url = Url::parse(&client.endpoints.authorization_endpoint)?;

        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("response_type", "code")
                .append_pair("client_id", &client.client_id);
            if !client.redirect_uri.is_empty() {
                query.append_pair("redirect_uri", &client.redirect_uri);
            }
            if !client.scopes.is_empty() {
                query.append_pair("scope", &client.scopes.join(" "));
            }
            for (key, value) in &client.additional_params {
                query.append_pair(key, value);
            }
        }

        Ok(url.into())
    }

    /// Exchanges an authorization code at the provider's token endpoint.
    ///
    /// # Errors
    ///
    /// Returns `IdpError::OAuthError` when the provider answers with an OAuth
    /// error body (some providers do so with a 200 status),
    /// `IdpError::TokenRequestFailed` for other non-success statuses,
    /// `IdpError::TokenExchangeFailed` for unparseable bodies, and
    /// `IdpError::InvalidTokenResponse` when `validate_response` is set and
    /// the response carries no access token.
    pub async fn token_request(
        &self,
        provider: &IdentityProvider,
        code: &str,
        validate_response: bool,
    ) -> Result<TokenResponse, IdpError> {
        let client = provider.client_config()?;
        let token_endpoint = Url::parse(&client.endpoints.token_endpoint)?;

        let mut params = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", client.client_id.as_str()),
        ];
        if !client.redirect_uri.is_empty() {
            params.push(("redirect_uri", client.redirect_uri.as_str()));
        }
        if let Some(secret) = &client.client_secret {
            params.push(("client_secret", secret.as_str()));
        }

        tracing::debug!(
            idp_id = %provider.id,
            token_endpoint = %token_endpoint,
            "Exchanging authorization code"
        );

        let response = self
            .http_client
            .post(token_endpoint.as_str())
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if let Ok(oauth_error) = serde_json::from_str::<OAuthErrorResponse>(&body) {
            return Err(IdpError::oauth_error(
                oauth_error.error,
                oauth_error.error_description.unwrap_or_default(),
            ));
        }

        if !status.is_success() {
            return Err(IdpError::TokenRequestFailed {
                status: status.as_u16(),
                body,
            });
        }

        let token: TokenResponse = serde_json::from_str(&body).map_err(|e| {
            IdpError::TokenExchangeFailed(format!("Failed to parse token response: {}", e))
        })?;

        if validate_response && token.access_token.is_empty() {
            return Err(IdpError::InvalidTokenResponse(
                "access_token is missing".to_string(),
            ));
        }

        Ok(token)
    }

    /// Fetches the user's claims from the provider's userinfo endpoint.
    ///
    /// # Errors
    ///
    /// Returns `IdpError::UserInfoFailed` for non-success statuses and
    /// `IdpError::ParseError` when the body is not a JSON object.
    pub async fn user_info(
        &self,
        provider: &IdentityProvider,
        access_token: &str,
    ) -> Result<Claims, IdpError> {
        let endpoints = provider.endpoints()?;
        self.get_json(&endpoints.userinfo_endpoint, access_token)
            .await
    }

    /// Validates an ID token issued by `provider` and returns its claims.
    ///
    /// Checks the signature against the provider's key set, the audience
    /// against the client id, the expiry, and the issuer when the provider
    /// has one configured.
    ///
    /// # Errors
    ///
    /// Returns a validation error if any check fails, or a key set error if
    /// the signing key cannot be loaded.
    pub async fn verify_id_token(
        &self,
        provider: &IdentityProvider,
        id_token: &str,
    ) -> Result<Claims, IdpError> {
        let header = decode_header(id_token)?;
        let kid = header.kid.ok_or(IdpError::MissingKeyId)?;

        let jwks_endpoint = provider.endpoints()?.jwks_endpoint.ok_or_else(|| {
            IdpError::MissingField(format!("jwks_endpoint for provider {}", provider.id))
        })?;
        let jwks_uri = Url::parse(&jwks_endpoint)?;

        let (decoding_key, key_alg) = self.key_cache.signing_key(&jwks_uri, &kid).await?;
        let alg = key_alg.unwrap_or(header.alg);

        let mut validation = Validation::new(alg);
        validation.set_audience(&[&provider.client_id]);
        if let Some(issuer) = provider.issuer.as_deref().filter(|i| !i.is_empty()) {
            validation.set_issuer(&[issuer.trim_end_matches('/')]);
        }
        validation.leeway = self.config.clock_skew_tolerance.as_secs();

        let token_data = jsonwebtoken::decode::<Claims>(id_token, &decoding_key, &validation)?;

        tracing::debug!(idp_id = %provider.id, kid = %kid, "ID token validated");
        Ok(token_data.claims)
    }

    /// Performs an authenticated GET and parses a JSON body.
    pub(crate) async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        access_token: &str,
    ) -> Result<T, IdpError> {
        let url = Url::parse(endpoint)?;
        let response = self
            .http_client
            .get(url.as_str())
            .bearer_auth(access_token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(endpoint = %url, status = status.as_u16(), "Provider request failed");
            return Err(IdpError::UserInfoFailed {
                status: status.as_u16(),
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| IdpError::ParseError(e.to_string()))?;
        serde_json::from_value(body).map_err(|e| IdpError::ParseError(e.to_string()))
    }
}

#[async_trait]
impl OAuthProvider for HttpOAuthClient {
    async fn build_authorize_url(&self, idp_id: &str) -> Result<String, ServiceError> {
        let provider = self.identity_provider(idp_id).await?;
        Ok(self.authorize_url(&provider)?)
    }

    async fn exchange_code_for_token(
        &self,
        idp_id: &str,
        code: &str,
        validate_response: bool,
    ) -> Result<TokenResponse, ServiceError> {
        let provider = self.identity_provider(idp_id).await?;
        Ok(self.token_request(&provider, code, validate_response).await?)
    }

    async fn fetch_user_info(
        &self,
        idp_id: &str,
        access_token: &str,
    ) -> Result<Claims, ServiceError> {
        let provider = self.identity_provider(idp_id).await?;
        Ok(self.user_info(&provider, access_token).await?)
    }

    async fn oauth_client_config(&self, idp_id: &str) -> Result<OAuthClientConfig, ServiceError> {
        let provider = self.identity_provider(idp_id).await?;
        Ok(provider.client_config()?)
    }
}

#[async_trait]
impl OidcProvider for HttpOAuthClient {
    async fn id_token_claims(&self, idp_id: &str, id_token: &str) -> Result<Claims, ServiceError> {
        let provider = self.identity_provider(idp_id).await?;
        Ok(self.verify_id_token(&provider, id_token).await?)
    }
}
