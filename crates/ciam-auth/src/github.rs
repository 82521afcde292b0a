//! GitHub sign-in.
//!
//! GitHub speaks plain OAuth 2.0: there is no ID token, the user profile
//! carries a numeric `id` instead of `sub`, and the email is only present
//! when the user made it public. The adapter normalizes both so the generic
//! [`OAuthExecutor`] can resolve the user.

use std::sync::Arc;

use async_trait::async_trait;
use ciam_core::ServiceError;
use serde::Deserialize;
use serde_json::Value;

use crate::capability::{Claims, OAuthClientConfig, OAuthProvider, TokenResponse};
use crate::client::HttpOAuthClient;
use crate::directory::UserDirectory;
use crate::executor::OAuthExecutor;
use crate::idp::IdentityProviderService;

pub const AUTHORIZATION_ENDPOINT: &str = "https://github.com/login/oauth/authorize";
pub const TOKEN_ENDPOINT: &str = "https://github.com/login/oauth/access_token";
pub const USERINFO_ENDPOINT: &str = "https://api.github.com/user";
pub const USER_EMAILS_ENDPOINT: &str = "https://api.github.com/user/emails";

/// Scopes that grant access to the user's email addresses.
pub const EMAIL_SCOPES: &[&str] = &["user", "user:email"];

pub const GITHUB_EXECUTOR_NAME: &str = "GithubOAuthExecutor";

#[derive(Debug, Deserialize)]
struct UserEmail {
    email: String,
    #[serde(default)]
    primary: bool,
}

/// OAuth capability for GitHub.
pub struct GithubOAuthProvider {
    client: Arc<HttpOAuthClient>,
    emails_endpoint: String,
}

impl GithubOAuthProvider {
    #[must_use]
    pub fn new(client: Arc<HttpOAuthClient>) -> Self {
        Self {
            client,
            emails_endpoint: USER_EMAILS_ENDPOINT.to_string(),
        }
    }

    #[must_use]
    pub fn client(&self) -> &HttpOAuthClient {
        &self.client
    }

    /// Overrides the emails endpoint (GitHub Enterprise, tests).
    #[must_use]
    pub fn with_emails_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.emails_endpoint = endpoint.into();
        self
    }

    async fn primary_email(&self, access_token: &str) -> Result<Option<String>, ServiceError> {
        tracing::debug!(endpoint = %self.emails_endpoint, "Fetching primary email");
        let emails: Vec<UserEmail> = self
            .client
            .get_json(&self.emails_endpoint, access_token)
            .await?;

        Ok(emails.into_iter().find(|e| e.primary).map(|e| e.email))
    }
}

/// Copies the numeric GitHub user id into `sub`.
fn normalize_subject(claims: &mut Claims) {
    if claims.contains_key("sub") {
        return;
    }
    let sub = match claims.get("id") {
        Some(Value::Number(id)) => id.to_string(),
        Some(Value::String(id)) => id.clone(),
        _ => return,
    };
    claims.insert("sub".to_string(), Value::String(sub));
}

fn has_email(claims: &Claims) -> bool {
    claims
        .get("email")
        .and_then(Value::as_str)
        .is_some_and(|e| !e.is_empty())
}

#[async_trait]
impl OAuthProvider for GithubOAuthProvider {
    async fn build_authorize_url(&self, idp_id: &str) -> Result<String, ServiceError> {
        self.client.build_authorize_url(idp_id).await
    }

    async fn exchange_code_for_token(
        &self,
        idp_id: &str,
        code: &str,
        validate_response: bool,
    ) -> Result<TokenResponse, ServiceError> {
        self.client
            .exchange_code_for_token(idp_id, code, validate_response)
            .await
    }

    /// Fetches the profile, filling in `sub` and, when an email scope is
    /// configured, the primary email.
    async fn fetch_user_info(
        &self,
        idp_id: &str,
        access_token: &str,
    ) -> Result<Claims, ServiceError> {
        let provider = self.client.identity_provider(idp_id).await?;
        let mut claims = self.client.user_info(&provider, access_token).await?;

        let wants_email = EMAIL_SCOPES
            .iter()
            .any(|scope| provider.scopes.iter().any(|s| s == scope));
        if !has_email(&claims)
            && wants_email
            && let Some(email) = self.primary_email(access_token).await?
        {
            claims.insert("email".to_string(), Value::String(email));
        }

        normalize_subject(&mut claims);
        Ok(claims)
    }

    async fn oauth_client_config(&self, idp_id: &str) -> Result<OAuthClientConfig, ServiceError> {
        self.client.oauth_client_config(idp_id).await
    }
}

/// Builds the GitHub sign-in executor with the policies of the provider's
/// client configuration.
#[must_use]
pub fn github_executor(
    provider: Arc<GithubOAuthProvider>,
    idp_service: Arc<dyn IdentityProviderService>,
    directory: Arc<dyn UserDirectory>,
) -> OAuthExecutor<GithubOAuthProvider> {
    let policies = provider.client().config().policies();
    OAuthExecutor::new(provider, idp_service, directory)
        .with_name(GITHUB_EXECUTOR_NAME)
        .with_policies(policies)
}
