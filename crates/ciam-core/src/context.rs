//! Per-invocation flow context.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The purpose of the flow an executor runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlowType {
    /// Login with an existing account.
    #[default]
    Authentication,
    /// Sign-up of a new account.
    Registration,
}

impl FlowType {
    /// Returns the wire name of the flow type.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Authentication => "AUTHENTICATION",
            Self::Registration => "REGISTRATION",
        }
    }

    /// Returns `true` for sign-up flows.
    #[must_use]
    pub fn is_registration(self) -> bool {
        matches!(self, Self::Registration)
    }
}

impl fmt::Display for FlowType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable view of a flow at the moment an executor is invoked.
///
/// The context carries what the user submitted on this step, what earlier
/// steps left behind in runtime data, and the node's own configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeContext {
    /// Identifier of the running flow.
    pub flow_id: String,

    /// Whether the flow logs a user in or signs one up.
    pub flow_type: FlowType,

    /// Inputs submitted by the user for this step.
    #[serde(default)]
    pub user_input: HashMap<String, String>,

    /// Values carried over from earlier steps.
    #[serde(default)]
    pub runtime_data: HashMap<String, String>,

    /// Node-level configuration, e.g. `idpId`.
    #[serde(default)]
    pub node_properties: HashMap<String, Value>,
}

impl NodeContext {
    /// Creates an empty context for the given flow.
    #[must_use]
    pub fn new(flow_id: impl Into<String>, flow_type: FlowType) -> Self {
        Self {
            flow_id: flow_id.into(),
            flow_type,
            ..Self::default()
        }
    }

    /// Adds a user input.
    #[must_use]
    pub fn with_user_input(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.user_input.insert(key.into(), value.into());
        self
    }

    /// Adds a runtime data entry.
    #[must_use]
    pub fn with_runtime_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.runtime_data.insert(key.into(), value.into());
        self
    }

    /// Adds a node property.
    #[must_use]
    pub fn with_node_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.node_properties.insert(key.into(), value.into());
        self
    }

    /// Returns a user input, treating an empty value as absent.
    #[must_use]
    pub fn input(&self, key: &str) -> Option<&str> {
        self.user_input
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Returns a runtime data entry, treating an empty value as absent.
    #[must_use]
    pub fn runtime_value(&self, key: &str) -> Option<&str> {
        self.runtime_data
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Returns a node property.
    #[must_use]
    pub fn node_property(&self, key: &str) -> Option<&Value> {
        self.node_properties.get(key)
    }

    /// Returns `true` when the flow signs a new user up.
    #[must_use]
    pub fn is_registration(&self) -> bool {
        self.flow_type.is_registration()
    }
}
