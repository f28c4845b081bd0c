//! The resume ticket and the queue contract.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::QueueError;

/// "Wake execution `execution_id` at `resume_at`."
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeTicket {
    pub execution_id: Uuid,
    pub workflow_id: Uuid,
    pub resume_at: DateTime<Utc>,
}

/// Ordered store of resume tickets, one per suspended execution.
#[async_trait]
pub trait ResumeQueue: Send + Sync {
    /// Insert a ticket. Scheduling an execution that already has a ticket
    /// replaces the old one.
    async fn schedule(&self, ticket: ResumeTicket) -> Result<(), QueueError>;

    /// Remove and return up to `limit` tickets with `resume_at <= now`,
    /// earliest first.
    async fn take_due(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ResumeTicket>, QueueError>;

    /// Drop the ticket for an execution. Returns whether one existed.
    async fn remove(&self, execution_id: Uuid) -> Result<bool, QueueError>;

    /// Number of pending tickets.
    async fn len(&self) -> Result<usize, QueueError>;
}
