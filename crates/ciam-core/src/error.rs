use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Code carried by a [`ServiceError`] when a directory lookup found no user.
pub const USER_NOT_FOUND: &str = "USER_NOT_FOUND";

/// Whether a capability failure was caused by the caller or by the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceErrorType {
    /// Bad input, rejected credentials, unknown entities.
    Client,
    /// Infrastructure, provider outages, unexpected responses.
    Server,
}

impl fmt::Display for ServiceErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Client => write!(f, "client"),
            Self::Server => write!(f, "server"),
        }
    }
}

/// Classified error returned by every capability an executor consumes.
///
/// Client errors become a failed step with `description` as the reason shown
/// to the user. Server errors abort the flow.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{error_type} error {code}: {error} - {description}")]
pub struct ServiceError {
    /// Classification of the failure.
    pub error_type: ServiceErrorType,
    /// Machine-readable code.
    pub code: String,
    /// Short error summary.
    pub error: String,
    /// Human-readable description.
    pub description: String,
}

impl ServiceError {
    /// Create a new client-classified error
    pub fn client(
        code: impl Into<String>,
        error: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            error_type: ServiceErrorType::Client,
            code: code.into(),
            error: error.into(),
            description: description.into(),
        }
    }

    /// Create a new server-classified error
    pub fn server(
        code: impl Into<String>,
        error: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            error_type: ServiceErrorType::Server,
            code: code.into(),
            error: error.into(),
            description: description.into(),
        }
    }

    /// Create the distinguished "user not found" client error
    pub fn user_not_found(description: impl Into<String>) -> Self {
        Self::client(USER_NOT_FOUND, "User not found", description)
    }

    /// Check if this error was caused by the caller
    pub fn is_client_error(&self) -> bool {
        self.error_type == ServiceErrorType::Client
    }

    /// Check if this error was caused by the system
    pub fn is_server_error(&self) -> bool {
        self.error_type == ServiceErrorType::Server
    }

    /// Check if this is the "user not found" sentinel
    pub fn is_user_not_found(&self) -> bool {
        self.code == USER_NOT_FOUND
    }
}

/// Fatal executor errors that abort the flow
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("Executor configuration error: {message}")]
    Configuration { message: String },

    #[error("Internal executor error: {message}")]
    Internal { message: String },
}

impl ExecutorError {
    /// Create a new Configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a new Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Check if this error comes from node or provider configuration
    pub fn is_configuration_error(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }

    /// Returns the error message without the category prefix
    pub fn message(&self) -> &str {
        match self {
            Self::Configuration { message } | Self::Internal { message } => message,
        }
    }
}
