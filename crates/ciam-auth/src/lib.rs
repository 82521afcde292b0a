//! # ciam-auth
//!
//! Federated authentication executors for the CIAM flow engine.
//!
//! This crate provides:
//! - A two-phase OAuth 2.0 authorization-code executor
//! - An OpenID Connect executor with ID token and nonce checks
//! - Google and GitHub provider adapters
//! - Just-in-time provisioning decisions for federated users
//! - Attribute-based user identification
//!
//! ## Overview
//!
//! Executors drive the protocol and decide what each outcome means for the
//! flow. Provider capabilities ([`OAuthProvider`], [`OidcProvider`]) do the
//! talking to the identity provider. Adding a provider means implementing a
//! capability, not writing a new executor.
//!
//! ## Modules
//!
//! - [`capability`] - Provider capability traits and token/claim types
//! - [`client`] - HTTP capability and signing key cache
//! - [`config`] - Federation configuration and executor policies
//! - [`directory`] - Local user directory
//! - [`error`] - Identity provider errors and their classification
//! - [`executor`] - OAuth, OIDC and identifying executors
//! - [`google`] - Google sign-in adapter
//! - [`github`] - GitHub sign-in adapter
//! - [`idp`] - Identity provider configuration and registry
//! - [`resolution`] - External subject to local user resolution

pub mod capability;
pub mod client;
pub mod config;
pub mod directory;
pub mod error;
pub mod executor;
pub mod github;
pub mod google;
pub mod idp;
pub mod resolution;

pub use capability::{
    Claims, OAuthClientConfig, OAuthEndpoints, OAuthProvider, OidcProvider, TokenResponse,
};
pub use client::{HttpOAuthClient, JwksError, KeySetCache, KeySetCacheConfig};
pub use config::{ConfigError, EmptyScopePolicy, ExecutorPolicies, FederationConfig, NoncePolicy};
pub use directory::{InMemoryUserDirectory, LocalUser, UserDirectory};
pub use error::IdpError;
pub use executor::{IdentifyingExecutor, OAuthExecutor, OidcAuthExecutor};
pub use github::{GithubOAuthProvider, github_executor};
pub use google::{GoogleOidcProvider, google_executor};
pub use idp::{IdentityProvider, IdentityProviderRegistry, IdentityProviderService, IdpType};
pub use resolution::{Resolution, ResolvedIdentity, resolve_user};

/// Type alias for identity provider results.
pub type IdpResult<T> = Result<T, IdpError>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use ciam_auth::prelude::*;
/// ```
pub mod prelude {
    pub use crate::IdpResult;
    pub use crate::capability::{Claims, OAuthProvider, OidcProvider, TokenResponse};
    pub use crate::client::HttpOAuthClient;
    pub use crate::config::{ExecutorPolicies, FederationConfig};
    pub use crate::directory::{InMemoryUserDirectory, LocalUser, UserDirectory};
    pub use crate::executor::{IdentifyingExecutor, OAuthExecutor, OidcAuthExecutor};
    pub use crate::github::{GithubOAuthProvider, github_executor};
    pub use crate::google::{GoogleOidcProvider, google_executor};
    pub use crate::idp::{IdentityProvider, IdentityProviderRegistry, IdpType};
    pub use ciam_core::{Executor, ExecutorResponse, ExecutorStatus, FlowType, NodeContext};
}
