//! Google sign-in.
//!
//! Google is a standard OpenID Connect provider with fixed endpoints. The
//! adapter validates the ID token as part of the token exchange and accepts
//! both issuer spellings Google uses.

use std::sync::Arc;

use async_trait::async_trait;
use ciam_core::ServiceError;

use crate::capability::{Claims, OAuthClientConfig, OAuthProvider, OidcProvider, TokenResponse};
use crate::client::HttpOAuthClient;
use crate::directory::UserDirectory;
use crate::error::IdpError;
use crate::executor::OidcAuthExecutor;
use crate::idp::{IdentityProvider, IdentityProviderService};

pub const AUTHORIZATION_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
pub const USERINFO_ENDPOINT: &str = "https://openidconnect.googleapis.com/v1/userinfo";
pub const JWKS_ENDPOINT: &str = "https://www.googleapis.com/oauth2/v3/certs";

/// Issuer values Google puts in ID tokens.
pub const VALID_ISSUERS: &[&str] = &["accounts.google.com", "https://accounts.google.com"];

pub const GOOGLE_EXECUTOR_NAME: &str = "GoogleOIDCAuthExecutor";

/// OpenID Connect capability for Google.
pub struct GoogleOidcProvider {
    client: Arc<HttpOAuthClient>,
}

impl GoogleOidcProvider {
    #[must_use]
    pub fn new(client: Arc<HttpOAuthClient>) -> Self {
        Self { client }
    }

    async fn validate_id_token(
        &self,
        provider: &IdentityProvider,
        id_token: &str,
    ) -> Result<Claims, IdpError> {
        let claims = self.client.verify_id_token(provider, id_token).await?;

        let issuer = claims.get("iss").and_then(|v| v.as_str()).unwrap_or_default();
        if !VALID_ISSUERS.contains(&issuer) {
            tracing::warn!(idp_id = %provider.id, issuer = %issuer, "Unexpected ID token issuer");
            return Err(IdpError::issuer_mismatch(VALID_ISSUERS.join(" or "), issuer));
        }

        Ok(claims)
    }
}

#[async_trait]
impl OAuthProvider for GoogleOidcProvider {
    async fn build_authorize_url(&self, idp_id: &str) -> Result<String, ServiceError> {
        self.client.build_authorize_url(idp_id).await
    }

    /// Exchanges the code and, when `validate_response` is set, validates
    /// the returned ID token before handing the response out.
    async fn exchange_code_for_token(
        &self,
        idp_id: &str,
        code: &str,
        validate_response: bool,
    ) -> Result<TokenResponse, ServiceError> {
        let provider = self.client.identity_provider(idp_id).await?;
        let token = self
            .client
            .token_request(&provider, code, validate_response)
            .await?;

        if validate_response && let Some(id_token) = token.id_token() {
            self.validate_id_token(&provider, id_token).await?;
        }

        Ok(token)
    }

    async fn fetch_user_info(
        &self,
        idp_id: &str,
        access_token: &str,
    ) -> Result<Claims, ServiceError> {
        self.client.fetch_user_info(idp_id, access_token).await
    }

    async fn oauth_client_config(&self, idp_id: &str) -> Result<OAuthClientConfig, ServiceError> {
        self.client.oauth_client_config(idp_id).await
    }
}

#[async_trait]
impl OidcProvider for GoogleOidcProvider {
    async fn id_token_claims(&self, idp_id: &str, id_token: &str) -> Result<Claims, ServiceError> {
        let provider = self.client.identity_provider(idp_id).await?;
        Ok(self.validate_id_token(&provider, id_token).await?)
    }
}

/// Builds the Google sign-in executor.
///
/// Authenticated completions carry an execution record. Empty scope and
/// nonce policies come from the client's [`FederationConfig`].
///
/// [`FederationConfig`]: crate::config::FederationConfig
#[must_use]
pub fn google_executor(
    client: Arc<HttpOAuthClient>,
    idp_service: Arc<dyn IdentityProviderService>,
    directory: Arc<dyn UserDirectory>,
) -> OidcAuthExecutor<GoogleOidcProvider> {
    let policies = client.config().policies();
    OidcAuthExecutor::new(Arc::new(GoogleOidcProvider::new(client)), idp_service, directory)
        .with_name(GOOGLE_EXECUTOR_NAME)
        .with_policies(policies)
        .with_execution_record(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FederationConfig;
    use crate::idp::{IdentityProviderRegistry, IdpType};
    use jsonwebtoken::{Algorithm, EncodingKey, Header};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SECRET: &[u8] = b"ciam-test-signing-secret-for-id-tokens!";
    const SECRET_K: &str = "Y2lhbS10ZXN0LXNpZ25pbmctc2VjcmV0LWZvci1pZC10b2tlbnMh";

    fn sign(iss: &str) -> String {
        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some("test-key".to_string());
        let claims = serde_json::json!({
            "iss": iss,
            "aud": "google-client",
            "sub": "g-1",
            "exp": 4_102_444_800u64
        });
        jsonwebtoken::encode(&header, &claims, &EncodingKey::from_secret(SECRET)).unwrap()
    }

    async fn setup(id_token: Option<String>) -> (MockServer, GoogleOidcProvider) {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/certs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "keys": [{ "kty": "oct", "kid": "test-key", "alg": "HS256", "k": SECRET_K }]
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "at",
                "token_type": "Bearer",
                "scope": "openid",
                "id_token": id_token
            })))
            .mount(&server)
            .await;

        let provider = IdentityProvider::new("google", "Google", IdpType::Google, "google-client")
            .with_endpoints(
                format!("{}/auth", server.uri()),
                format!("{}/token", server.uri()),
                format!("{}/userinfo", server.uri()),
            )
            .with_jwks_endpoint(format!("{}/certs", server.uri()));
        let registry = Arc::new(IdentityProviderRegistry::with_providers([provider]));
        let client = HttpOAuthClient::new(registry, FederationConfig::default().with_allow_http(true))
            .unwrap();

        (server, GoogleOidcProvider::new(Arc::new(client)))
    }

    #[test]
    fn test_default_endpoints() {
        let provider = IdentityProvider::new("google", "Google", IdpType::Google, "id");
        let endpoints = provider.endpoints().unwrap();
        assert_eq!(endpoints.authorization_endpoint, AUTHORIZATION_ENDPOINT);
        assert_eq!(endpoints.token_endpoint, TOKEN_ENDPOINT);
        assert_eq!(endpoints.userinfo_endpoint, USERINFO_ENDPOINT);
        assert_eq!(endpoints.jwks_endpoint.as_deref(), Some(JWKS_ENDPOINT));
    }

    #[tokio::test]
    async fn test_exchange_accepts_both_issuers() {
        for iss in VALID_ISSUERS {
            let (_server, google) = setup(Some(sign(iss))).await;
            let token = google
                .exchange_code_for_token("google", "code", true)
                .await
                .unwrap();
            assert_eq!(token.access_token, "at");

            let claims = google
                .id_token_claims("google", token.id_token().unwrap())
                .await
                .unwrap();
            assert_eq!(claims["sub"], "g-1");
        }
    }

    #[tokio::test]
    async fn test_exchange_rejects_foreign_issuer() {
        let (_server, google) = setup(Some(sign("https://evil.example.com"))).await;

        let err = google
            .exchange_code_for_token("google", "code", true)
            .await
            .unwrap_err();
        assert!(err.is_client_error());
        assert_eq!(err.code, "IDP-1004");

        assert!(
            google
                .exchange_code_for_token("google", "code", false)
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_exchange_without_id_token() {
        let (_server, google) = setup(None).await;
        let token = google
            .exchange_code_for_token("google", "code", true)
            .await
            .unwrap();
        assert!(token.id_token().is_none());
    }
}
