//! In-memory resume queue.
//!
//! Tickets are ordered by `(resume_at, execution_id)`. Nothing here survives a
//! restart; the engine's recovery pass re-schedules every suspended execution
//! it finds in the store.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::{QueueError, ResumeQueue, ResumeTicket};

#[derive(Default)]
struct Inner {
    by_time: BTreeMap<(DateTime<Utc>, Uuid), ResumeTicket>,
    by_execution: HashMap<Uuid, DateTime<Utc>>,
}

#[derive(Default)]
pub struct MemoryResumeQueue {
    inner: Mutex<Inner>,
}

impl MemoryResumeQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ResumeQueue for MemoryResumeQueue {
    async fn schedule(&self, ticket: ResumeTicket) -> Result<(), QueueError> {
        let mut inner = self.inner.lock().await;
        if let Some(previous) = inner.by_execution.insert(ticket.execution_id, ticket.resume_at) {
            inner.by_time.remove(&(previous, ticket.execution_id));
            debug!(execution_id = %ticket.execution_id, %previous, "replacing resume ticket");
        }
        debug!(execution_id = %ticket.execution_id, resume_at = %ticket.resume_at, "resume ticket scheduled");
        inner
            .by_time
            .insert((ticket.resume_at, ticket.execution_id), ticket);
        Ok(())
    }

    async fn take_due(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ResumeTicket>, QueueError> {
        let mut inner = self.inner.lock().await;
        let due_keys: Vec<(DateTime<Utc>, Uuid)> = inner
            .by_time
            .range(..=(now, Uuid::from_u128(u128::MAX)))
            .take(limit)
            .map(|(key, _)| *key)
            .collect();

        let mut due = Vec::with_capacity(due_keys.len());
        for key in due_keys {
            if let Some(ticket) = inner.by_time.remove(&key) {
                inner.by_execution.remove(&ticket.execution_id);
                due.push(ticket);
            }
        }
        if !due.is_empty() {
            debug!(count = due.len(), "took due resume tickets");
        }
        Ok(due)
    }

    async fn remove(&self, execution_id: Uuid) -> Result<bool, QueueError> {
        let mut inner = self.inner.lock().await;
        match inner.by_execution.remove(&execution_id) {
            Some(at) => {
                inner.by_time.remove(&(at, execution_id));
                debug!(%execution_id, "resume ticket removed");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn len(&self) -> Result<usize, QueueError> {
        Ok(self.inner.lock().await.by_time.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn ticket(at: DateTime<Utc>) -> ResumeTicket {
        ResumeTicket {
            execution_id: Uuid::new_v4(),
            workflow_id: Uuid::new_v4(),
            resume_at: at,
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn only_due_tickets_are_taken_in_order() {
        let queue = MemoryResumeQueue::new();
        let late = ticket(t0() + Duration::days(2));
        let early = ticket(t0() + Duration::hours(1));
        let exact = ticket(t0());
        for t in [late.clone(), early.clone(), exact.clone()] {
            queue.schedule(t).await.unwrap();
        }

        let due = queue.take_due(t0() + Duration::hours(1), 10).await.unwrap();
        assert_eq!(due, vec![exact, early]);
        assert_eq!(queue.len().await.unwrap(), 1);

        let due = queue.take_due(t0() + Duration::days(3), 10).await.unwrap();
        assert_eq!(due, vec![late]);
    }

    #[tokio::test]
    async fn rescheduling_replaces_the_previous_ticket() {
        let queue = MemoryResumeQueue::new();
        let mut t = ticket(t0());
        queue.schedule(t.clone()).await.unwrap();
        t.resume_at = t0() + Duration::days(1);
        queue.schedule(t.clone()).await.unwrap();

        assert_eq!(queue.len().await.unwrap(), 1);
        assert!(queue.take_due(t0(), 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn limit_and_remove() {
        let queue = MemoryResumeQueue::new();
        let a = ticket(t0());
        let b = ticket(t0());
        queue.schedule(a.clone()).await.unwrap();
        queue.schedule(b.clone()).await.unwrap();

        assert!(queue.remove(a.execution_id).await.unwrap());
        assert!(!queue.remove(a.execution_id).await.unwrap());

        let due = queue.take_due(t0(), 1).await.unwrap();
        assert_eq!(due, vec![b]);
    }
}
