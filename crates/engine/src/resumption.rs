//! Background worker that wakes suspended executions.
//!
//! Delays never sleep in-process. The scheduler persists the suspended
//! execution and drops a [`ResumeTicket`] in the queue; this service polls the
//! queue and calls [`ExecutionScheduler::resume`] for every due ticket. On
//! startup [`ResumptionService::recover`] rebuilds the queue from the store so
//! a restart loses no delay.

use std::sync::Arc;

use queue::ResumeTicket;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::models::ExecutionStatus;
use crate::scheduler::ExecutionScheduler;

pub struct ResumptionService {
    scheduler: Arc<ExecutionScheduler>,
    config: EngineConfig,
}

impl ResumptionService {
    pub fn new(scheduler: Arc<ExecutionScheduler>, config: EngineConfig) -> Self {
        Self { scheduler, config }
    }

    /// Re-schedule a ticket for every suspended execution in the store.
    /// Returns how many were scheduled.
    pub async fn recover(&self) -> Result<usize, EngineError> {
        let suspended = self
            .scheduler
            .store()
            .list_by_status(ExecutionStatus::Suspended)
            .await?;

        let mut scheduled = 0;
        for execution in suspended {
            let Some(suspension) = execution.suspension else {
                warn!(execution_id = %execution.id, "suspended execution has no resume point");
                continue;
            };
            self.scheduler
                .queue()
                .schedule(ResumeTicket {
                    execution_id: execution.id,
                    workflow_id: execution.workflow_id,
                    resume_at: suspension.resume_at,
                })
                .await?;
            scheduled += 1;
        }
        info!(scheduled, "resume queue recovered from store");
        Ok(scheduled)
    }

    /// Resume every due execution (up to the configured batch size).
    /// Returns how many were resumed.
    pub async fn run_due(&self) -> Result<usize, EngineError> {
        let now = self.scheduler.clock().now();
        let tickets = self
            .scheduler
            .queue()
            .take_due(now, self.config.resume_batch_size)
            .await?;
        if tickets.is_empty() {
            return Ok(0);
        }
        debug!(count = tickets.len(), "found due resume tickets");

        let mut resumed = 0;
        for ticket in tickets {
            match self.scheduler.resume(ticket.execution_id).await {
                Ok(execution) => {
                    resumed += 1;
                    debug!(execution_id = %execution.id, status = %execution.status, "execution resumed");
                }
                Err(EngineError::NotDue { resume_at, .. }) => {
                    self.scheduler
                        .queue()
                        .schedule(ResumeTicket { resume_at, ..ticket })
                        .await?;
                }
                Err(err @ (EngineError::InvalidState { .. } | EngineError::ExecutionNotFound(_))) => {
                    // Cancelled or already resumed elsewhere.
                    debug!(execution_id = %ticket.execution_id, "dropping resume ticket: {err}");
                }
                Err(err) => {
                    error!(execution_id = %ticket.execution_id, error = %err, "failed to resume execution");
                    self.scheduler.queue().schedule(ticket).await?;
                }
            }
        }
        Ok(resumed)
    }

    /// Poll until `shutdown` flips to `true`.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            poll_interval_ms = self.config.resume_poll_interval.as_millis(),
            batch_size = self.config.resume_batch_size,
            "resumption service started"
        );

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("resumption service shutting down");
                        break;
                    }
                }
                _ = tokio::time::sleep(self.config.resume_poll_interval) => {
                    if let Err(e) = self.run_due().await {
                        error!(error = %e, "resume poll failed");
                    }
                }
            }
        }
    }
}

/// Spawn the service on the runtime; send `true` on the returned sender to stop it.
pub fn spawn_resumption(
    service: ResumptionService,
) -> (tokio::task::JoinHandle<()>, watch::Sender<bool>) {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(service.run(shutdown_rx));
    (handle, shutdown_tx)
}
