//! Execution statistics for dashboards.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::error::EngineError;
use crate::models::{ExecutionStatus, WorkflowExecution, WorkflowId};
use crate::store::Store;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowStats {
    pub total_runs: u64,
    pub successful_runs: u64,
    pub failed_runs: u64,
    /// Mean of `completed_at - started_at` over executions that have both;
    /// `0.0` when none do.
    pub avg_duration_ms: f64,
    pub last_run_at: Option<DateTime<Utc>>,
    /// Status of the most recently started execution in the window.
    pub last_run_status: Option<ExecutionStatus>,
}

impl WorkflowStats {
    /// Completed share of all executions in `[0, 1]`; `0.0` with no data.
    pub fn success_rate(&self) -> f64 {
        if self.total_runs == 0 {
            0.0
        } else {
            self.successful_runs as f64 / self.total_runs as f64
        }
    }
}

/// Half-open window on `started_at`: `from <= started_at < to`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsWindow {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl StatsWindow {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn between(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self { from: Some(from), to: Some(to) }
    }

    /// The `days` days leading up to `now`.
    pub fn last_days(now: DateTime<Utc>, days: i64) -> Self {
        Self { from: Some(now - Duration::days(days)), to: None }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.from.map_or(true, |from| from <= at) && self.to.map_or(true, |to| at < to)
    }
}

/// Aggregate the executions whose `started_at` falls inside `window`.
pub fn aggregate(executions: &[WorkflowExecution], window: &StatsWindow) -> WorkflowStats {
    let mut total = 0u64;
    let mut completed = 0u64;
    let mut failed = 0u64;
    let mut duration_sum = 0i64;
    let mut timed = 0u64;
    let mut last_run: Option<&WorkflowExecution> = None;

    for exec in executions.iter().filter(|e| window.contains(e.started_at)) {
        total += 1;
        match exec.status {
            ExecutionStatus::Completed => completed += 1,
            ExecutionStatus::Failed => failed += 1,
            _ => {}
        }
        if let Some(ms) = exec.duration_ms() {
            duration_sum += ms;
            timed += 1;
        }
        // Ties on started_at go to the later entry.
        if last_run.map_or(true, |last| last.started_at <= exec.started_at) {
            last_run = Some(exec);
        }
    }

    WorkflowStats {
        total_runs: total,
        successful_runs: completed,
        failed_runs: failed,
        avg_duration_ms: if timed == 0 { 0.0 } else { duration_sum as f64 / timed as f64 },
        last_run_at: last_run.map(|e| e.started_at),
        last_run_status: last_run.map(|e| e.status),
    }
}

/// [`aggregate`] over a workflow's executions in the store.
pub struct StatsAggregator {
    store: Arc<dyn Store>,
}

impl StatsAggregator {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn for_workflow(
        &self,
        workflow_id: WorkflowId,
        window: &StatsWindow,
    ) -> Result<WorkflowStats, EngineError> {
        let executions = self.store.list_executions(workflow_id).await?;
        Ok(aggregate(&executions, window))
    }
}
