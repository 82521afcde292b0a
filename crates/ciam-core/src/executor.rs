use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::context::NodeContext;
use crate::error::ExecutorError;
use crate::response::{ExecutorResponse, ExecutorType, InputData};

/// A flow step. Each authentication or utility node type implements this.
///
/// Executors are stateless between invocations; every call receives the full
/// context and returns exactly one response.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Unique executor name used for registration and audit records.
    fn name(&self) -> &str;

    fn executor_type(&self) -> ExecutorType;

    /// Inputs this executor reads from the user.
    fn default_inputs(&self) -> Vec<InputData> {
        Vec::new()
    }

    /// Returns the required inputs that are absent or empty in `ctx`.
    fn missing_inputs(&self, ctx: &NodeContext) -> Vec<InputData> {
        self.default_inputs()
            .into_iter()
            .filter(|input| input.required && ctx.input(&input.name).is_none())
            .collect()
    }

    /// Runs the step.
    async fn execute(&self, ctx: &NodeContext) -> Result<ExecutorResponse, ExecutorError>;
}

/// Registry of executors by name
#[derive(Default)]
pub struct ExecutorRegistry {
    executors: HashMap<String, Arc<dyn Executor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an executor under its own name, replacing any previous one.
    pub fn register(&mut self, executor: Arc<dyn Executor>) {
        let name = executor.name().to_string();
        tracing::debug!(executor = %name, "Registered executor");
        self.executors.insert(name, executor);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Executor>> {
        self.executors.get(name).cloned()
    }

    /// Returns registered executor names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.executors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }

    /// Runs the named executor against `ctx`.
    pub async fn execute(
        &self,
        name: &str,
        ctx: &NodeContext,
    ) -> Result<ExecutorResponse, ExecutorError> {
        let executor = self
            .get(name)
            .ok_or_else(|| ExecutorError::configuration(format!("unknown executor: {name}")))?;

        tracing::debug!(flow_id = %ctx.flow_id, executor = %name, "Executing flow node");
        executor.execute(ctx).await
    }
}
