//! Local user directory.
//!
//! Defines the lookups executors need from the user store and an in-memory
//! implementation for tests and embedded deployments.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use ciam_core::ServiceError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Attribute holding the external subject a local account is linked to.
pub const SUBJECT_ATTRIBUTE: &str = "sub";

/// A local user account.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalUser {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_unit: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_type: Option<String>,

    #[serde(default)]
    pub attributes: HashMap<String, Value>,
}

impl LocalUser {
    /// Creates a user with the given id and no attributes.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Sets the organization unit.
    #[must_use]
    pub fn with_organization_unit(mut self, ou: impl Into<String>) -> Self {
        self.organization_unit = Some(ou.into());
        self
    }

    /// Sets the user type.
    #[must_use]
    pub fn with_user_type(mut self, user_type: impl Into<String>) -> Self {
        self.user_type = Some(user_type.into());
        self
    }

    /// Adds an attribute.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Links the account to an external subject.
    #[must_use]
    pub fn with_subject(self, sub: impl Into<String>) -> Self {
        self.with_attribute(SUBJECT_ATTRIBUTE, sub.into())
    }

    fn matches(&self, filters: &HashMap<String, Value>) -> bool {
        filters
            .iter()
            .all(|(key, value)| self.attributes.get(key) == Some(value))
    }
}

/// Lookups executors perform against the local user store.
///
/// # Example
///
/// ```ignore
/// async fn example(directory: &dyn UserDirectory) {
///     match directory.find_by_subject("ext-123").await {
///         Ok(user) => println!("linked to {}", user.id),
///         Err(e) if e.is_user_not_found() => println!("no local account"),
///         Err(e) => println!("lookup failed: {e}"),
///     }
/// }
/// ```
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Finds the account linked to an external subject.
    ///
    /// A missing account is reported with the
    /// [`USER_NOT_FOUND`](ciam_core::USER_NOT_FOUND) code.
    async fn find_by_subject(&self, sub: &str) -> Result<LocalUser, ServiceError>;

    /// Returns the id of the single account matching every filter.
    ///
    /// `Ok(None)` means no account matched.
    async fn identify_user(
        &self,
        filters: &HashMap<String, Value>,
    ) -> Result<Option<String>, ServiceError>;
}

/// In-memory user directory.
#[derive(Default)]
pub struct InMemoryUserDirectory {
    users: RwLock<Vec<LocalUser>>,
}

impl InMemoryUserDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a directory holding `users`.
    #[must_use]
    pub fn with_users(users: impl IntoIterator<Item = LocalUser>) -> Self {
        Self {
            users: RwLock::new(users.into_iter().collect()),
        }
    }

    /// Adds or replaces a user by id.
    pub fn upsert(&self, user: LocalUser) -> Result<(), ServiceError> {
        let mut users = self.write()?;
        users.retain(|u| u.id != user.id);
        users.push(user);
        Ok(())
    }

    /// Returns the number of stored users.
    pub fn len(&self) -> usize {
        self.users.read().map(|u| u.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Vec<LocalUser>>, ServiceError> {
        self.users.read().map_err(|_| lock_poisoned())
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Vec<LocalUser>>, ServiceError> {
        self.users.write().map_err(|_| lock_poisoned())
    }

    fn matching(&self, filters: &HashMap<String, Value>) -> Result<Vec<LocalUser>, ServiceError> {
        Ok(self
            .read()?
            .iter()
            .filter(|u| u.matches(filters))
            .cloned()
            .collect())
    }
}

fn lock_poisoned() -> ServiceError {
    ServiceError::server(
        "USR-5001",
        "User directory unavailable",
        "user directory lock poisoned",
    )
}

fn ambiguous_match() -> ServiceError {
    ServiceError::client(
        "USR-1002",
        "Ambiguous user",
        "More than one user matches the given attributes",
    )
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn find_by_subject(&self, sub: &str) -> Result<LocalUser, ServiceError> {
        let filters = HashMap::from([(SUBJECT_ATTRIBUTE.to_string(), Value::from(sub))]);
        let mut found = self.matching(&filters)?;

        match found.len() {
            0 => Err(ServiceError::user_not_found(format!(
                "No user is linked to subject {sub}"
            ))),
            1 => Ok(found.remove(0)),
            _ => Err(ambiguous_match()),
        }
    }

    async fn identify_user(
        &self,
        filters: &HashMap<String, Value>,
    ) -> Result<Option<String>, ServiceError> {
        if filters.is_empty() {
            return Ok(None);
        }

        let found = self.matching(filters)?;
        match found.as_slice() {
            [] => Ok(None),
            [user] => Ok(Some(user.id.clone())),
            _ => Err(ambiguous_match()),
        }
    }
}
