//! Mapping of external subjects to local accounts.
//!
//! After an identity provider vouches for a subject, the flow decides what
//! that subject means locally:
//!
//! | local account | flow         | result                                  |
//! |---------------|--------------|-----------------------------------------|
//! | exists        | login        | authenticated as the local account      |
//! | exists        | registration | fails, the subject is already taken     |
//! | missing       | login        | fails, nobody to log in                 |
//! | missing       | registration | provisioning draft for a later step     |
//!
//! A subject linked to an account is never accepted for sign-up, and an
//! unlinked subject never logs anyone in.

use std::collections::HashMap;

use ciam_core::{AuthenticatedUser, ExecutorError, FlowType, Outcome};
use serde_json::Value;

use crate::directory::{LocalUser, SUBJECT_ATTRIBUTE, UserDirectory};

pub const USER_NOT_FOUND_REASON: &str = "User not found";
pub const USER_ALREADY_EXISTS_REASON: &str = "User already exists with the provided sub claim.";

/// Runtime data key for the provisioned subject.
pub const SUB_RUNTIME_KEY: &str = "sub";
/// Runtime data key for the user's email address.
pub const EMAIL_RUNTIME_KEY: &str = "email";
/// Attribute carrying the local user id of an authenticated user.
pub const USER_ID_ATTRIBUTE: &str = "user_id";

/// Decision taken for an external subject.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Login with an existing local account.
    Existing(LocalUser),
    /// Sign-up of an unknown subject; a later step creates the account.
    Provision { sub: String },
}

/// Identity and runtime data produced from a [`Resolution`].
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedIdentity {
    pub user: AuthenticatedUser,
    pub runtime_data: HashMap<String, String>,
}

impl Resolution {
    /// Combines the decision with the provider's filtered claims.
    #[must_use]
    pub fn into_identity(self, mut attributes: HashMap<String, Value>) -> ResolvedIdentity {
        let mut runtime_data = HashMap::new();
        if let Some(email) = attributes
            .get("email")
            .and_then(Value::as_str)
            .filter(|e| !e.is_empty())
        {
            runtime_data.insert(EMAIL_RUNTIME_KEY.to_string(), email.to_string());
        }

        let user = match self {
            Self::Existing(local) => {
                attributes.insert(USER_ID_ATTRIBUTE.to_string(), Value::from(local.id.clone()));
                AuthenticatedUser::authenticated(
                    local.id,
                    local.organization_unit,
                    local.user_type,
                    attributes,
                )
            }
            Self::Provision { sub } => {
                runtime_data.insert(SUB_RUNTIME_KEY.to_string(), sub);
                AuthenticatedUser::draft(attributes)
            }
        };

        ResolvedIdentity { user, runtime_data }
    }
}

/// Applies the resolution table to `sub`.
///
/// Client-classified directory errors fail the step with their description;
/// anything else is fatal.
pub async fn resolve_user(
    directory: &dyn UserDirectory,
    sub: &str,
    flow_type: FlowType,
) -> Result<Outcome<Resolution>, ExecutorError> {
    match directory.find_by_subject(sub).await {
        Ok(user) if user.id.is_empty() => {
            tracing::error!(
                attribute = SUBJECT_ATTRIBUTE,
                "Local user linked to external subject has an empty id"
            );
            Err(ExecutorError::internal(
                "internal user found with an empty id",
            ))
        }
        Ok(_) if flow_type.is_registration() => {
            tracing::debug!("External subject already linked, rejecting registration");
            Ok(Outcome::fail(USER_ALREADY_EXISTS_REASON))
        }
        Ok(user) => Ok(Outcome::Proceed(Resolution::Existing(user))),
        Err(e) if e.is_user_not_found() => {
            if flow_type.is_registration() {
                tracing::debug!("External subject not linked, preparing provisioning draft");
                Ok(Outcome::Proceed(Resolution::Provision {
                    sub: sub.to_string(),
                }))
            } else {
                Ok(Outcome::fail(USER_NOT_FOUND_REASON))
            }
        }
        Err(e) if e.is_client_error() => {
            tracing::debug!(error_code = %e.code, "User lookup rejected: {}", e.description);
            Ok(Outcome::Fail(e.description))
        }
        Err(e) => {
            tracing::error!(
                error_code = %e.code,
                "Error while retrieving internal user: {}",
                e.description
            );
            Err(ExecutorError::internal(
                "error while retrieving internal user",
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::InMemoryUserDirectory;
    use async_trait::async_trait;
    use ciam_core::ServiceError;

    struct FailingDirectory(ServiceError);

    #[async_trait]
    impl UserDirectory for FailingDirectory {
        async fn find_by_subject(&self, _sub: &str) -> Result<LocalUser, ServiceError> {
            Err(self.0.clone())
        }

        async fn identify_user(
            &self,
            _filters: &HashMap<String, Value>,
        ) -> Result<Option<String>, ServiceError> {
            Err(self.0.clone())
        }
    }

    struct EmptyIdDirectory;

    #[async_trait]
    impl UserDirectory for EmptyIdDirectory {
        async fn find_by_subject(&self, _sub: &str) -> Result<LocalUser, ServiceError> {
            Ok(LocalUser::new(""))
        }

        async fn identify_user(
            &self,
            _filters: &HashMap<String, Value>,
        ) -> Result<Option<String>, ServiceError> {
            Ok(Some(String::new()))
        }
    }

    fn directory() -> InMemoryUserDirectory {
        InMemoryUserDirectory::with_users([LocalUser::new("u-1")
            .with_organization_unit("ou-retail")
            .with_user_type("customer")
            .with_subject("ext-1")])
    }

    #[tokio::test]
    async fn test_existing_user_login() {
        let outcome = resolve_user(&directory(), "ext-1", FlowType::Authentication)
            .await
            .unwrap();
        match outcome {
            Outcome::Proceed(Resolution::Existing(user)) => assert_eq!(user.id, "u-1"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_existing_user_registration_conflicts() {
        let outcome = resolve_user(&directory(), "ext-1", FlowType::Registration)
            .await
            .unwrap();
        assert_eq!(outcome.failure_reason(), Some(USER_ALREADY_EXISTS_REASON));
    }

    #[tokio::test]
    async fn test_unknown_user_login_fails() {
        let outcome = resolve_user(&directory(), "ext-2", FlowType::Authentication)
            .await
            .unwrap();
        assert_eq!(outcome.failure_reason(), Some(USER_NOT_FOUND_REASON));
    }

    #[tokio::test]
    async fn test_unknown_user_registration_provisions() {
        let outcome = resolve_user(&directory(), "ext-2", FlowType::Registration)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            Outcome::Proceed(Resolution::Provision {
                sub: "ext-2".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_directory_errors() {
        let client = FailingDirectory(ServiceError::client("USR-1002", "Ambiguous", "Too many"));
        let outcome = resolve_user(&client, "ext-1", FlowType::Authentication)
            .await
            .unwrap();
        assert_eq!(outcome.failure_reason(), Some("Too many"));

        let server = FailingDirectory(ServiceError::server("USR-5001", "Down", "db down"));
        let err = resolve_user(&server, "ext-1", FlowType::Authentication)
            .await
            .unwrap_err();
        assert_eq!(err.message(), "error while retrieving internal user");

        let err = resolve_user(&EmptyIdDirectory, "ext-1", FlowType::Authentication)
            .await
            .unwrap_err();
        assert!(!err.is_configuration_error());
    }

    #[test]
    fn test_existing_identity() {
        let local = LocalUser::new("u-1")
            .with_organization_unit("ou-retail")
            .with_user_type("customer");
        let attributes = HashMap::from([
            ("email".to_string(), Value::from("ada@example.com")),
            ("name".to_string(), Value::from("Ada")),
        ]);

        let identity = Resolution::Existing(local).into_identity(attributes);
        assert!(identity.user.is_authenticated);
        assert_eq!(identity.user.user_id.as_deref(), Some("u-1"));
        assert_eq!(identity.user.organization_unit.as_deref(), Some("ou-retail"));
        assert_eq!(identity.user.user_type.as_deref(), Some("customer"));
        assert_eq!(identity.user.attribute_str(USER_ID_ATTRIBUTE), Some("u-1"));
        assert_eq!(
            identity.runtime_data.get(EMAIL_RUNTIME_KEY).map(String::as_str),
            Some("ada@example.com")
        );
        assert!(!identity.runtime_data.contains_key(SUB_RUNTIME_KEY));
    }

    #[test]
    fn test_provision_identity() {
        let attributes = HashMap::from([("email".to_string(), Value::from(""))]);
        let identity = Resolution::Provision {
            sub: "ext-9".to_string(),
        }
        .into_identity(attributes);

        assert!(!identity.user.is_authenticated);
        assert!(identity.user.user_id.is_none());
        assert!(!identity.user.attributes.contains_key(USER_ID_ATTRIBUTE));
        assert_eq!(
            identity.runtime_data.get(SUB_RUNTIME_KEY).map(String::as_str),
            Some("ext-9")
        );
        assert!(!identity.runtime_data.contains_key(EMAIL_RUNTIME_KEY));
    }
}
