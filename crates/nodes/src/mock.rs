//! `MockAction` — a test double for `ActionHandler`.
//!
//! Useful in unit and integration tests where a real email/SMS/webhook
//! integration is either unavailable or irrelevant.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::{Arc, Mutex};

use crate::{ActionBranch, ActionHandler, ActionOutcome, DispatchContext, DispatchError};

/// Behaviour injected into `MockAction` at construction time.
pub enum MockBehaviour {
    /// Succeed and return a specific JSON value as output.
    ReturnValue(Value),
    /// Succeed and report a fallible-outcome branch.
    ReturnBranch(ActionBranch),
    /// Fail with `DispatchError::Failed`.
    Fail(String),
}

/// A mock action that records every call it receives and returns a
/// programmer-specified result.
pub struct MockAction {
    /// Label used in test assertions.
    pub name: String,
    /// What the action will do when `execute` is called.
    pub behaviour: MockBehaviour,
    /// All params seen by this action (in call order).
    pub calls: Arc<Mutex<Vec<Value>>>,
    /// Context snapshots seen by this action (in call order).
    pub contexts: Arc<Mutex<Vec<DispatchContext>>>,
}

impl MockAction {
    fn with_behaviour(name: impl Into<String>, behaviour: MockBehaviour) -> Self {
        Self {
            name: name.into(),
            behaviour,
            calls: Arc::new(Mutex::new(Vec::new())),
            contexts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a mock that always succeeds with the given output.
    pub fn returning(name: impl Into<String>, value: Value) -> Self {
        Self::with_behaviour(name, MockBehaviour::ReturnValue(value))
    }

    /// Create a mock that succeeds without output.
    pub fn succeeding(name: impl Into<String>) -> Self {
        Self::with_behaviour(name, MockBehaviour::ReturnValue(Value::Null))
    }

    /// Create a mock that reports the given outcome branch.
    pub fn branching(name: impl Into<String>, branch: ActionBranch) -> Self {
        Self::with_behaviour(name, MockBehaviour::ReturnBranch(branch))
    }

    /// Create a mock that always fails.
    pub fn failing(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::with_behaviour(name, MockBehaviour::Fail(msg.into()))
    }

    /// Number of times this action has been executed.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<Value> {
        self.calls.lock().unwrap().clone()
    }

    pub fn contexts(&self) -> Vec<DispatchContext> {
        self.contexts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ActionHandler for MockAction {
    async fn execute(
        &self,
        params: &Value,
        ctx: &DispatchContext,
    ) -> Result<ActionOutcome, DispatchError> {
        self.calls.lock().unwrap().push(params.clone());
        self.contexts.lock().unwrap().push(ctx.clone());

        match &self.behaviour {
            MockBehaviour::ReturnValue(Value::Null) => Ok(ActionOutcome::empty()),
            MockBehaviour::ReturnValue(v) => Ok(ActionOutcome::with_output(v.clone())),
            MockBehaviour::ReturnBranch(b) => Ok(ActionOutcome::empty().branch(*b)),
            MockBehaviour::Fail(msg) => Err(DispatchError::Failed(msg.clone())),
        }
    }
}
