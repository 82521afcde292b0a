use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use ciam_core::{
    Executor, ExecutorError, ExecutorResponse, ExecutorType, InputData, NodeContext, Outcome,
};
use serde_json::Value;

use crate::directory::UserDirectory;
use crate::resolution::USER_NOT_FOUND_REASON;

/// Input keys never forwarded to a directory lookup.
pub const SENSITIVE_FILTER_KEYS: &[&str] = &["password", "code", "nonce", "otp"];

pub const IDENTIFYING_EXECUTOR_NAME: &str = "IdentifyingExecutor";

/// Runtime data key receiving the identified user's id.
pub const USER_ID_RUNTIME_KEY: &str = "userID";

/// Identifies a local user from submitted attributes.
///
/// Lookup failures are always reported as a failed step, never as a fatal
/// error.
pub struct IdentifyingExecutor {
    name: String,
    directory: Arc<dyn UserDirectory>,
}

impl IdentifyingExecutor {
    #[must_use]
    pub fn new(directory: Arc<dyn UserDirectory>) -> Self {
        Self {
            name: IDENTIFYING_EXECUTOR_NAME.to_string(),
            directory,
        }
    }

    /// Resolves the id of the single user matching `filters`.
    ///
    /// Credentials and one-time values are stripped before the lookup.
    pub async fn identify_user(&self, filters: &HashMap<String, Value>) -> Outcome<String> {
        let filters: HashMap<String, Value> = filters
            .iter()
            .filter(|(key, _)| !SENSITIVE_FILTER_KEYS.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        match self.directory.identify_user(&filters).await {
            Ok(Some(id)) if !id.is_empty() => Outcome::Proceed(id),
            Ok(_) => Outcome::fail(USER_NOT_FOUND_REASON),
            Err(e) if e.is_user_not_found() => Outcome::fail(USER_NOT_FOUND_REASON),
            Err(e) => {
                tracing::warn!(error_code = %e.code, "Failed to identify user: {}", e.description);
                Outcome::Fail(format!("Failed to identify user: {}", e.description))
            }
        }
    }
}

#[async_trait]
impl Executor for IdentifyingExecutor {
    fn name(&self) -> &str {
        &self.name
    }

    fn executor_type(&self) -> ExecutorType {
        ExecutorType::Utility
    }

    fn default_inputs(&self) -> Vec<InputData> {
        vec![InputData::required("username")]
    }

    async fn execute(&self, ctx: &NodeContext) -> Result<ExecutorResponse, ExecutorError> {
        let filters: HashMap<String, Value> = ctx
            .user_input
            .iter()
            .filter(|(_, value)| !value.is_empty())
            .map(|(key, value)| (key.clone(), Value::from(value.as_str())))
            .collect();

        if filters
            .keys()
            .all(|key| SENSITIVE_FILTER_KEYS.contains(&key.as_str()))
        {
            return Ok(ExecutorResponse::incomplete(self.default_inputs()));
        }

        Ok(match self.identify_user(&filters).await {
            Outcome::Proceed(user_id) => {
                tracing::debug!(flow_id = %ctx.flow_id, "User identified");
                ExecutorResponse::completed().with_runtime_value(USER_ID_RUNTIME_KEY, user_id)
            }
            Outcome::Fail(reason) => ExecutorResponse::failure(reason),
        })
    }
}
