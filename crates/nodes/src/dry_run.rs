//! `DryRunDispatcher` — logs actions instead of performing them.
//!
//! The worker binary uses this when no real integrations are wired in, so a
//! deployment can exercise trigger matching, branching and delays end to end.

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::info;

use crate::{ActionDispatcher, ActionOutcome, ActionType, DispatchContext, DispatchError};

#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunDispatcher;

#[async_trait]
impl ActionDispatcher for DryRunDispatcher {
    async fn dispatch(
        &self,
        action_type: &str,
        params: &Value,
        ctx: &DispatchContext,
    ) -> Result<ActionOutcome, DispatchError> {
        let action: ActionType = action_type.parse()?;
        info!(
            workflow_id = %ctx.workflow_id,
            execution_id = %ctx.execution_id,
            node_id = %ctx.node_id,
            action = %action,
            params = %params,
            "dry-run dispatch"
        );
        let mut output = Map::new();
        output.insert(format!("{}_dry_run", action.as_str()), Value::Bool(true));
        Ok(ActionOutcome::with_output(Value::Object(output)))
    }
}
