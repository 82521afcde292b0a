//! Error types for identity provider operations.
//!
//! [`IdpError`] is what the HTTP capability produces internally. Executors
//! never see it directly: at the capability boundary every error is turned
//! into a classified [`ServiceError`] so the client/server rule can be
//! applied uniformly.

use ciam_core::ServiceError;

use crate::client::jwks::JwksError;

/// Errors that can occur while talking to an external identity provider.
#[derive(Debug, thiserror::Error)]
pub enum IdpError {
    /// The requested provider is not registered.
    #[error("Identity provider not found: {0}")]
    ProviderNotFound(String),

    /// A provider is missing an endpoint or other required setting.
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// The IdP returned an OAuth error body.
    #[error("OAuth error from IdP: {error} - {description}")]
    OAuthError {
        /// The OAuth error code.
        error: String,
        /// Optional error description.
        description: String,
    },

    /// The token endpoint answered with a non-success status and no OAuth
    /// error body.
    #[error("Token request failed: HTTP {status} - {body}")]
    TokenRequestFailed {
        /// HTTP status code returned by the provider.
        status: u16,
        /// Response body, as returned.
        body: String,
    },

    /// The token endpoint answered successfully but the body is unusable.
    #[error("Token exchange failed: {0}")]
    TokenExchangeFailed(String),

    /// The token response is structurally unusable.
    #[error("Invalid token response: {0}")]
    InvalidTokenResponse(String),

    /// The userinfo endpoint answered with a non-success status.
    #[error("Userinfo request failed: HTTP {status}")]
    UserInfoFailed {
        /// HTTP status code returned by the provider.
        status: u16,
    },

    /// The ID token is missing the required `kid` header.
    #[error("ID token is missing key ID (kid) header")]
    MissingKeyId,

    /// The issuer in the ID token doesn't match the expected issuer.
    #[error("Issuer mismatch: expected {expected}, got {actual}")]
    IssuerMismatch {
        /// The expected issuer.
        expected: String,
        /// The actual issuer from the ID token.
        actual: String,
    },

    /// Failed to fetch or use the provider key set.
    #[error("JWKS error: {0}")]
    JwksFailed(#[from] JwksError),

    /// JWT decoding or validation error.
    #[error("JWT error: {0}")]
    JwtError(#[from] jsonwebtoken::errors::Error),

    /// A network error occurred.
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// Failed to parse a URL.
    #[error("URL error: {0}")]
    UrlError(#[from] url::ParseError),

    /// A provider response could not be parsed.
    #[error("Failed to parse provider response: {0}")]
    ParseError(String),
}

impl IdpError {
    /// Creates an `IssuerMismatch` error.
    #[must_use]
    pub fn issuer_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::IssuerMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Creates an `OAuthError` from IdP response.
    #[must_use]
    pub fn oauth_error(error: impl Into<String>, description: impl Into<String>) -> Self {
        Self::OAuthError {
            error: error.into(),
            description: description.into(),
        }
    }

    /// Returns `true` if the error was caused by the end user or their
    /// credentials rather than by the system.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        match self {
            Self::ProviderNotFound(_)
            | Self::OAuthError { .. }
            | Self::InvalidTokenResponse(_)
            | Self::MissingKeyId
            | Self::IssuerMismatch { .. }
            | Self::JwtError(_) => true,
            Self::UserInfoFailed { status } | Self::TokenRequestFailed { status, .. } => {
                (400..500).contains(status)
            }
            _ => false,
        }
    }

    /// Machine-readable code carried into the classified error.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::ProviderNotFound(_) => "IDP-1001",
            Self::OAuthError { .. } => "IDP-1002",
            Self::InvalidTokenResponse(_) => "IDP-1003",
            Self::MissingKeyId | Self::IssuerMismatch { .. } | Self::JwtError(_) => "IDP-1004",
            Self::UserInfoFailed { .. } => "IDP-1005",
            Self::TokenRequestFailed { status, .. } if (400..500).contains(status) => "IDP-1006",
            Self::TokenRequestFailed { .. } => "IDP-5002",
            Self::MissingField(_) | Self::UrlError(_) => "IDP-5001",
            Self::TokenExchangeFailed(_) => "IDP-5002",
            Self::JwksFailed(_) => "IDP-5003",
            Self::NetworkError(_) => "IDP-5004",
            Self::ParseError(_) => "IDP-5005",
        }
    }

    fn summary(&self) -> &'static str {
        match self {
            Self::ProviderNotFound(_) => "Identity provider not found",
            Self::OAuthError { .. } => "Authorization rejected by identity provider",
            Self::InvalidTokenResponse(_) => "Invalid token response",
            Self::MissingKeyId | Self::IssuerMismatch { .. } | Self::JwtError(_) => {
                "Invalid ID token"
            }
            Self::UserInfoFailed { .. } => "Failed to fetch user information",
            Self::MissingField(_) | Self::UrlError(_) => "Invalid identity provider configuration",
            Self::TokenRequestFailed { .. } | Self::TokenExchangeFailed(_) => {
                "Token exchange failed"
            }
            Self::JwksFailed(_) => "Failed to load provider signing keys",
            Self::NetworkError(_) => "Identity provider unreachable",
            Self::ParseError(_) => "Unexpected identity provider response",
        }
    }
}

impl From<IdpError> for ServiceError {
    fn from(err: IdpError) -> Self {
        let description = match &err {
            IdpError::OAuthError { description, .. } if !description.is_empty() => description.clone(),
            _ => err.to_string(),
        };

        if err.is_client_error() {
            ServiceError::client(err.code(), err.summary(), description)
        } else {
            ServiceError::server(err.code(), err.summary(), description)
        }
    }
}
