//! The `ActionDispatcher` trait — the contract between the engine and the
//! outside world.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::DispatchError;

/// Shared context passed with every dispatch.
///
/// Defined here (in the nodes crate) so both the engine and individual action
/// handlers can import it without a circular dependency.
#[derive(Debug, Clone)]
pub struct DispatchContext {
    /// ID of the workflow that owns the Action node.
    pub workflow_id: uuid::Uuid,
    /// ID of the current execution run.
    pub execution_id: uuid::Uuid,
    /// ID of the Action node being dispatched.
    pub node_id: String,
    /// Accumulated execution context: trigger payload plus earlier action output.
    pub context: Map<String, Value>,
}

/// Outcome label an action may report when its type has fallible outcomes
/// (e.g. "email bounced" vs "email delivered").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionBranch {
    Success,
    Failure,
}

/// Successful result of a dispatch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionOutcome {
    /// Values to merge into the execution context.
    pub output: Option<Value>,
    /// Which outgoing edge to prefer; `None` means the `default` edge.
    pub branch: Option<ActionBranch>,
}

impl ActionOutcome {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_output(output: Value) -> Self {
        Self {
            output: Some(output),
            branch: None,
        }
    }

    pub fn branch(mut self, branch: ActionBranch) -> Self {
        self.branch = Some(branch);
        self
    }
}

/// Hands an Action node's side effect to an external system.
#[async_trait]
pub trait ActionDispatcher: Send + Sync {
    async fn dispatch(
        &self,
        action_type: &str,
        params: &Value,
        ctx: &DispatchContext,
    ) -> Result<ActionOutcome, DispatchError>;
}

/// A single action implementation, registered by type in an
/// [`ActionRegistry`](crate::ActionRegistry).
#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// Perform the side effect described by `params`.
    async fn execute(
        &self,
        params: &Value,
        ctx: &DispatchContext,
    ) -> Result<ActionOutcome, DispatchError>;
}
