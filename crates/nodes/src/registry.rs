//! `ActionRegistry` — maps `action_type` strings to handlers.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::action::normalize;
use crate::{ActionDispatcher, ActionHandler, ActionOutcome, DispatchContext, DispatchError};

/// Dispatcher that routes each action to the handler registered for its type.
/// Types are compared in their [`normalize`]d form.
#[derive(Clone, Default)]
pub struct ActionRegistry {
    handlers: HashMap<String, Arc<dyn ActionHandler>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the handler for `action_type`.
    pub fn register(
        mut self,
        action_type: impl Into<String>,
        handler: Arc<dyn ActionHandler>,
    ) -> Self {
        self.handlers.insert(normalize(&action_type.into()), handler);
        self
    }
}

#[async_trait]
impl ActionDispatcher for ActionRegistry {
    async fn dispatch(
        &self,
        action_type: &str,
        params: &Value,
        ctx: &DispatchContext,
    ) -> Result<ActionOutcome, DispatchError> {
        let handler = self
            .handlers
            .get(&normalize(action_type))
            .ok_or_else(|| DispatchError::UnknownAction(action_type.to_owned()))?;

        debug!(
            execution_id = %ctx.execution_id,
            node_id = %ctx.node_id,
            action_type,
            "dispatching action"
        );
        handler.execute(params, ctx).await
    }
}
