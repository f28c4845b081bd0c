//! Postgres adapters for the engine's [`Store`] and the [`ResumeQueue`].

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use engine::models::{
    ExecutionId, ExecutionStatus, LogEntry, Workflow, WorkflowExecution, WorkflowId,
    WorkflowVersion,
};
use engine::{Store, StoreError};
use queue::{QueueError, ResumeQueue, ResumeTicket};

use crate::models::{ExecutionLogRow, ExecutionRow, ResumeRow, WorkflowRow, WorkflowVersionRow};
use crate::repository::{executions, resume, versions, workflows};
use crate::{DbError, DbPool};

/// [`Store`] backed by the `workflows`, `workflow_versions`,
/// `workflow_executions` and `execution_logs` tables.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Attach logs to each row with a single query.
    async fn with_logs(&self, rows: Vec<ExecutionRow>) -> Result<Vec<WorkflowExecution>, DbError> {
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let mut logs: HashMap<Uuid, Vec<LogEntry>> = HashMap::new();
        for row in executions::logs_for(&self.pool, &ids).await? {
            let execution_id = row.execution_id;
            logs.entry(execution_id).or_default().push(row.into_domain()?);
        }
        rows.into_iter()
            .map(|row| {
                let entries = logs.remove(&row.id).unwrap_or_default();
                row.into_domain(entries)
            })
            .collect()
    }
}

fn not_found(entity: &'static str, id: impl ToString) -> DbError {
    DbError::NotFound { entity, id: id.to_string() }
}

#[async_trait]
impl Store for PgStore {
    async fn insert_workflow(
        &self,
        workflow: &Workflow,
        version: &WorkflowVersion,
    ) -> Result<(), StoreError> {
        let workflow_row = WorkflowRow::from_domain(workflow)?;
        let version_row = WorkflowVersionRow::from_domain(version)?;

        let mut tx = self.pool.begin().await.map_err(DbError::from)?;
        workflows::insert_workflow(&mut *tx, &workflow_row).await?;
        versions::insert_version(&mut *tx, &version_row).await?;
        tx.commit().await.map_err(DbError::from)?;

        debug!(workflow_id = %workflow.id, "workflow inserted");
        Ok(())
    }

    async fn commit_version(
        &self,
        workflow: &Workflow,
        version: &WorkflowVersion,
    ) -> Result<(), StoreError> {
        let workflow_row = WorkflowRow::from_domain(workflow)?;
        let version_row = WorkflowVersionRow::from_domain(version)?;

        let mut tx = self.pool.begin().await.map_err(DbError::from)?;
        // The version insert goes first so a concurrent writer surfaces as a
        // unique violation before the draft is touched.
        versions::insert_version(&mut *tx, &version_row).await?;
        if workflows::update_draft(&mut *tx, &workflow_row).await? == 0 {
            return Err(not_found("workflow", workflow.id).into());
        }
        tx.commit().await.map_err(DbError::from)?;

        debug!(workflow_id = %workflow.id, version = version.version, "version committed");
        Ok(())
    }

    async fn set_published(
        &self,
        workflow_id: WorkflowId,
        published: bool,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        if workflows::set_published(&self.pool, workflow_id, published, at).await? == 0 {
            return Err(not_found("workflow", workflow_id).into());
        }
        Ok(())
    }

    async fn get_workflow(&self, workflow_id: WorkflowId) -> Result<Option<Workflow>, StoreError> {
        let row = workflows::get_workflow(&self.pool, workflow_id).await?;
        Ok(row.map(WorkflowRow::into_domain).transpose()?)
    }

    async fn list_workflows(&self) -> Result<Vec<Workflow>, StoreError> {
        let rows = workflows::list_workflows(&self.pool).await?;
        Ok(rows
            .into_iter()
            .map(WorkflowRow::into_domain)
            .collect::<Result<_, _>>()?)
    }

    async fn list_versions(&self, workflow_id: WorkflowId) -> Result<Vec<WorkflowVersion>, StoreError> {
        let rows = versions::list_versions(&self.pool, workflow_id).await?;
        Ok(rows
            .into_iter()
            .map(WorkflowVersionRow::into_domain)
            .collect::<Result<_, _>>()?)
    }

    async fn get_version(
        &self,
        workflow_id: WorkflowId,
        version: u32,
    ) -> Result<Option<WorkflowVersion>, StoreError> {
        // Anything past i32::MAX cannot have been stored.
        let Ok(version) = i32::try_from(version) else {
            return Ok(None);
        };
        let row = versions::get_version(&self.pool, workflow_id, version).await?;
        Ok(row.map(WorkflowVersionRow::into_domain).transpose()?)
    }

    async fn insert_execution(&self, execution: &WorkflowExecution) -> Result<(), StoreError> {
        let row = ExecutionRow::from_domain(execution)?;
        executions::insert_execution(&self.pool, &row).await?;
        for entry in &execution.logs {
            executions::append_log(&self.pool, &ExecutionLogRow::from_domain(execution.id, entry))
                .await?;
        }
        Ok(())
    }

    async fn update_execution(&self, execution: &WorkflowExecution) -> Result<(), StoreError> {
        let row = ExecutionRow::from_domain(execution)?;
        if executions::update_execution(&self.pool, &row).await? == 0 {
            return Err(not_found("execution", execution.id).into());
        }
        Ok(())
    }

    async fn append_log(&self, execution_id: ExecutionId, entry: &LogEntry) -> Result<(), StoreError> {
        executions::append_log(&self.pool, &ExecutionLogRow::from_domain(execution_id, entry)).await?;
        Ok(())
    }

    async fn get_execution(
        &self,
        execution_id: ExecutionId,
    ) -> Result<Option<WorkflowExecution>, StoreError> {
        let Some(row) = executions::get_execution(&self.pool, execution_id).await? else {
            return Ok(None);
        };
        let mut found = self.with_logs(vec![row]).await?;
        Ok(found.pop())
    }

    async fn list_executions(
        &self,
        workflow_id: WorkflowId,
    ) -> Result<Vec<WorkflowExecution>, StoreError> {
        let rows = executions::list_for_workflow(&self.pool, workflow_id).await?;
        Ok(self.with_logs(rows).await?)
    }

    async fn list_by_status(
        &self,
        status: ExecutionStatus,
    ) -> Result<Vec<WorkflowExecution>, StoreError> {
        let rows = executions::list_by_status(&self.pool, &status.to_string()).await?;
        Ok(self.with_logs(rows).await?)
    }
}

// ---------------------------------------------------------------------------
// Resume queue
// ---------------------------------------------------------------------------

/// Durable [`ResumeQueue`] over the `resume_queue` table. Safe to share
/// between several worker processes.
#[derive(Clone)]
pub struct PgResumeQueue {
    pool: DbPool,
}

impl PgResumeQueue {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn backend(err: DbError) -> QueueError {
    QueueError::Backend(err.to_string())
}

#[async_trait]
impl ResumeQueue for PgResumeQueue {
    async fn schedule(&self, ticket: ResumeTicket) -> Result<(), QueueError> {
        resume::schedule(&self.pool, &ResumeRow::from(&ticket))
            .await
            .map_err(backend)
    }

    async fn take_due(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ResumeTicket>, QueueError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = resume::take_due(&self.pool, now, limit).await.map_err(backend)?;
        Ok(rows.into_iter().map(ResumeTicket::from).collect())
    }

    async fn remove(&self, execution_id: Uuid) -> Result<bool, QueueError> {
        resume::remove(&self.pool, execution_id).await.map_err(backend)
    }

    async fn len(&self) -> Result<usize, QueueError> {
        let n = resume::count(&self.pool).await.map_err(backend)?;
        Ok(usize::try_from(n).unwrap_or_default())
    }
}
