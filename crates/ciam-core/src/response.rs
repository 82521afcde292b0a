//! Executor response, resolved identity and audit record.
//!
//! An [`ExecutorResponse`] is built once per invocation through one of its
//! status constructors, so a response can never carry two statuses and a
//! redirect can never carry a resolved identity.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

/// Status reported back to the flow engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutorStatus {
    /// More user input is needed before the step can finish.
    Incomplete,
    /// The user agent must be sent to an external party.
    ExternalRedirection,
    /// The step finished.
    Complete,
    /// The step failed; the flow shows the reason to the user.
    Failure,
}

impl fmt::Display for ExecutorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Incomplete => write!(f, "INCOMPLETE"),
            Self::ExternalRedirection => write!(f, "EXTERNAL_REDIRECTION"),
            Self::Complete => write!(f, "COMPLETE"),
            Self::Failure => write!(f, "FAILURE"),
        }
    }
}

/// Kind of executor, recorded in audit entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutorType {
    Authentication,
    Registration,
    Utility,
}

/// Identity resolved by an executor.
///
/// `is_authenticated == false` with populated attributes is a provisioning
/// draft: the user still has to be created by a later step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub is_authenticated: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_unit: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_type: Option<String>,

    #[serde(default)]
    pub attributes: HashMap<String, Value>,
}

impl AuthenticatedUser {
    /// Creates an authenticated identity for an existing local user.
    #[must_use]
    pub fn authenticated(
        user_id: impl Into<String>,
        organization_unit: Option<String>,
        user_type: Option<String>,
        attributes: HashMap<String, Value>,
    ) -> Self {
        Self {
            is_authenticated: true,
            user_id: Some(user_id.into()),
            organization_unit,
            user_type,
            attributes,
        }
    }

    /// Creates a provisioning draft carrying only external attributes.
    #[must_use]
    pub fn draft(attributes: HashMap<String, Value>) -> Self {
        Self {
            is_authenticated: false,
            attributes,
            ..Self::default()
        }
    }

    /// Returns a string attribute, if present.
    #[must_use]
    pub fn attribute_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(Value::as_str)
    }
}

/// Audit entry attached to a response by executors that record their runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub executor_name: String,
    pub executor_type: ExecutorType,
    /// Unix timestamp in seconds.
    pub timestamp: i64,
    pub status: ExecutorStatus,
}

impl ExecutionRecord {
    /// Creates a record stamped with the current time.
    #[must_use]
    pub fn now(
        executor_name: impl Into<String>,
        executor_type: ExecutorType,
        status: ExecutorStatus,
    ) -> Self {
        Self {
            executor_name: executor_name.into(),
            executor_type,
            timestamp: OffsetDateTime::now_utc().unix_timestamp(),
            status,
        }
    }
}

/// An input an executor needs from the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputData {
    pub name: String,
    #[serde(rename = "type")]
    pub input_type: String,
    pub required: bool,
}

impl InputData {
    /// Creates a required string input.
    #[must_use]
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            input_type: "string".to_string(),
            required: true,
        }
    }

    /// Creates an optional string input.
    #[must_use]
    pub fn optional(name: impl Into<String>) -> Self {
        Self {
            required: false,
            ..Self::required(name)
        }
    }
}

/// The single result of an executor invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorResponse {
    status: ExecutorStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    redirect_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    failure_reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    authenticated_user: Option<AuthenticatedUser>,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    additional_data: HashMap<String, String>,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    runtime_data: HashMap<String, String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    required_data: Vec<InputData>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    execution_record: Option<ExecutionRecord>,
}

impl ExecutorResponse {
    fn with_status(status: ExecutorStatus) -> Self {
        Self {
            status,
            redirect_url: None,
            failure_reason: None,
            authenticated_user: None,
            additional_data: HashMap::new(),
            runtime_data: HashMap::new(),
            required_data: Vec::new(),
            execution_record: None,
        }
    }

    /// The user agent must be redirected to `url`.
    #[must_use]
    pub fn redirect(url: impl Into<String>) -> Self {
        Self {
            redirect_url: Some(url.into()),
            ..Self::with_status(ExecutorStatus::ExternalRedirection)
        }
    }

    /// The step failed with a user-facing reason.
    #[must_use]
    pub fn failure(reason: impl Into<String>) -> Self {
        Self {
            failure_reason: Some(reason.into()),
            ..Self::with_status(ExecutorStatus::Failure)
        }
    }

    /// The step finished with a resolved identity.
    #[must_use]
    pub fn complete(user: AuthenticatedUser) -> Self {
        Self {
            authenticated_user: Some(user),
            ..Self::with_status(ExecutorStatus::Complete)
        }
    }

    /// The step finished without resolving an identity.
    #[must_use]
    pub fn completed() -> Self {
        Self::with_status(ExecutorStatus::Complete)
    }

    /// The step needs the listed inputs before it can continue.
    #[must_use]
    pub fn incomplete(required_data: Vec<InputData>) -> Self {
        Self {
            required_data,
            ..Self::with_status(ExecutorStatus::Incomplete)
        }
    }

    /// Adds an entry the flow engine forwards to the client.
    #[must_use]
    pub fn with_additional_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.additional_data.insert(key.into(), value.into());
        self
    }

    /// Adds an entry carried to later steps of the flow.
    #[must_use]
    pub fn with_runtime_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.runtime_data.insert(key.into(), value.into());
        self
    }

    /// Adds several entries carried to later steps of the flow.
    #[must_use]
    pub fn with_runtime_data(mut self, data: HashMap<String, String>) -> Self {
        self.runtime_data.extend(data);
        self
    }

    /// Attaches an audit record.
    #[must_use]
    pub fn with_execution_record(mut self, record: ExecutionRecord) -> Self {
        self.execution_record = Some(record);
        self
    }

    pub fn status(&self) -> ExecutorStatus {
        self.status
    }

    pub fn redirect_url(&self) -> Option<&str> {
        self.redirect_url.as_deref()
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    pub fn authenticated_user(&self) -> Option<&AuthenticatedUser> {
        self.authenticated_user.as_ref()
    }

    pub fn additional_data(&self) -> &HashMap<String, String> {
        &self.additional_data
    }

    pub fn runtime_data(&self) -> &HashMap<String, String> {
        &self.runtime_data
    }

    pub fn required_data(&self) -> &[InputData] {
        &self.required_data
    }

    pub fn execution_record(&self) -> Option<&ExecutionRecord> {
        self.execution_record.as_ref()
    }

    /// Returns `true` if the resolved identity is authenticated.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.authenticated_user
            .as_ref()
            .is_some_and(|u| u.is_authenticated)
    }
}
