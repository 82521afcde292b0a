//! Flow executors for federated authentication.
//!
//! - [`OAuthExecutor`] - two-phase authorization-code flow over any
//!   [`OAuthProvider`](crate::capability::OAuthProvider)
//! - [`OidcAuthExecutor`] - the same flow with ID token claims and nonce
//!   checks over an [`OidcProvider`](crate::capability::OidcProvider)
//! - [`IdentifyingExecutor`] - attribute-based lookup of a local user

mod identifying;
mod oauth;
mod oidc;

pub use identifying::{
    IDENTIFYING_EXECUTOR_NAME, IdentifyingExecutor, SENSITIVE_FILTER_KEYS, USER_ID_RUNTIME_KEY,
};
pub use oauth::OAuthExecutor;
pub use oidc::{ID_TOKEN_DENIED_CLAIMS, OidcAuthExecutor};

/// User input carrying the authorization code.
pub const CODE_INPUT: &str = "code";
/// User input carrying the nonce sent in the authorization request.
pub const NONCE_INPUT: &str = "nonce";
/// Node property naming the identity provider.
pub const IDP_ID_PROPERTY: &str = "idpId";
/// Additional data key for the provider's display name.
pub const IDP_NAME_KEY: &str = "idpName";

pub const OAUTH_EXECUTOR_NAME: &str = "OAuthExecutor";
pub const OIDC_EXECUTOR_NAME: &str = "OIDCAuthExecutor";

pub const AUTHENTICATION_FAILED_REASON: &str =
    "Authentication failed. Authorization code not provided or invalid.";
pub const SUB_NOT_FOUND_IN_RESPONSE_REASON: &str = "sub claim not found in the response.";
pub const SUB_NOT_FOUND_IN_ID_TOKEN_REASON: &str = "sub claim not found in the ID token.";
pub const ID_TOKEN_NOT_FOUND_REASON: &str = "ID token not found in the token response.";
pub const NONCE_MISMATCH_REASON: &str = "Nonce mismatch in ID token claims.";
pub const NONCE_REQUIRED_REASON: &str = "Nonce is required but was not provided.";

/// Claims never copied from userinfo into identity attributes.
pub(crate) const USERINFO_DENIED_CLAIMS: &[&str] = &["username", "sub"];
/// Claims never merged from userinfo into OIDC identity attributes.
pub(crate) const ENRICHMENT_DENIED_CLAIMS: &[&str] = &["username", "sub", "id"];
