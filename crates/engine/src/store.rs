//! Persistence boundary.
//!
//! The engine talks to storage only through [`Store`]. [`MemoryStore`] backs
//! tests and single-process use; the `db` crate provides the Postgres one.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::models::{
    ExecutionId, ExecutionStatus, LogEntry, Workflow, WorkflowExecution, WorkflowId,
    WorkflowVersion,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// A concurrent writer got there first (e.g. the same version number).
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Persist a new workflow together with its first version.
    async fn insert_workflow(
        &self,
        workflow: &Workflow,
        version: &WorkflowVersion,
    ) -> Result<(), StoreError>;

    /// Append `version` and overwrite the workflow's draft in one step.
    /// The stored `published` flag is not touched.
    /// Fails with [`StoreError::Conflict`] if that version number exists.
    async fn commit_version(
        &self,
        workflow: &Workflow,
        version: &WorkflowVersion,
    ) -> Result<(), StoreError>;

    async fn set_published(
        &self,
        workflow_id: WorkflowId,
        published: bool,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn get_workflow(&self, workflow_id: WorkflowId) -> Result<Option<Workflow>, StoreError>;

    async fn list_workflows(&self) -> Result<Vec<Workflow>, StoreError>;

    /// Oldest first.
    async fn list_versions(&self, workflow_id: WorkflowId) -> Result<Vec<WorkflowVersion>, StoreError>;

    async fn get_version(
        &self,
        workflow_id: WorkflowId,
        version: u32,
    ) -> Result<Option<WorkflowVersion>, StoreError>;

    async fn insert_execution(&self, execution: &WorkflowExecution) -> Result<(), StoreError>;

    /// Overwrite status, timestamps, context and suspension. Logs are left
    /// alone; they only grow through [`Store::append_log`].
    async fn update_execution(&self, execution: &WorkflowExecution) -> Result<(), StoreError>;

    async fn append_log(&self, execution_id: ExecutionId, entry: &LogEntry) -> Result<(), StoreError>;

    async fn get_execution(
        &self,
        execution_id: ExecutionId,
    ) -> Result<Option<WorkflowExecution>, StoreError>;

    /// Every execution of `workflow_id`, oldest first.
    async fn list_executions(
        &self,
        workflow_id: WorkflowId,
    ) -> Result<Vec<WorkflowExecution>, StoreError>;

    async fn list_by_status(
        &self,
        status: ExecutionStatus,
    ) -> Result<Vec<WorkflowExecution>, StoreError>;
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Tables {
    workflows: HashMap<WorkflowId, Workflow>,
    versions: HashMap<WorkflowId, Vec<WorkflowVersion>>,
    executions: HashMap<ExecutionId, WorkflowExecution>,
}

/// Everything in one `RwLock`; cloned out on read.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn not_found(entity: &'static str, id: impl ToString) -> StoreError {
    StoreError::NotFound { entity, id: id.to_string() }
}

fn oldest_first(mut executions: Vec<WorkflowExecution>) -> Vec<WorkflowExecution> {
    executions.sort_by_key(|e| (e.started_at, e.id));
    executions
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_workflow(
        &self,
        workflow: &Workflow,
        version: &WorkflowVersion,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if tables.workflows.contains_key(&workflow.id) {
            return Err(StoreError::Conflict(format!("workflow {} already exists", workflow.id)));
        }
        tables.workflows.insert(workflow.id, workflow.clone());
        tables.versions.insert(workflow.id, vec![version.clone()]);
        Ok(())
    }

    async fn commit_version(
        &self,
        workflow: &Workflow,
        version: &WorkflowVersion,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if !tables.workflows.contains_key(&workflow.id) {
            return Err(not_found("workflow", workflow.id));
        }
        let history = tables.versions.entry(workflow.id).or_default();
        if history.iter().any(|v| v.version == version.version) {
            return Err(StoreError::Conflict(format!(
                "version {} of workflow {} already exists",
                version.version, workflow.id
            )));
        }
        history.push(version.clone());
        // `published` is toggled separately and is left as stored.
        if let Some(stored) = tables.workflows.get_mut(&workflow.id) {
            stored.name = workflow.name.clone();
            stored.folder_id = workflow.folder_id;
            stored.nodes = workflow.nodes.clone();
            stored.edges = workflow.edges.clone();
            stored.version = workflow.version;
            stored.updated_at = workflow.updated_at;
        }
        Ok(())
    }

    async fn set_published(
        &self,
        workflow_id: WorkflowId,
        published: bool,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let workflow = tables
            .workflows
            .get_mut(&workflow_id)
            .ok_or_else(|| not_found("workflow", workflow_id))?;
        workflow.published = published;
        workflow.updated_at = at;
        Ok(())
    }

    async fn get_workflow(&self, workflow_id: WorkflowId) -> Result<Option<Workflow>, StoreError> {
        Ok(self.tables.read().await.workflows.get(&workflow_id).cloned())
    }

    async fn list_workflows(&self) -> Result<Vec<Workflow>, StoreError> {
        let mut workflows: Vec<Workflow> =
            self.tables.read().await.workflows.values().cloned().collect();
        workflows.sort_by_key(|w| (w.created_at, w.id));
        Ok(workflows)
    }

    async fn list_versions(&self, workflow_id: WorkflowId) -> Result<Vec<WorkflowVersion>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .versions
            .get(&workflow_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_version(
        &self,
        workflow_id: WorkflowId,
        version: u32,
    ) -> Result<Option<WorkflowVersion>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .versions
            .get(&workflow_id)
            .and_then(|history| history.iter().find(|v| v.version == version))
            .cloned())
    }

    async fn insert_execution(&self, execution: &WorkflowExecution) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if tables.executions.contains_key(&execution.id) {
            return Err(StoreError::Conflict(format!("execution {} already exists", execution.id)));
        }
        tables.executions.insert(execution.id, execution.clone());
        Ok(())
    }

    async fn update_execution(&self, execution: &WorkflowExecution) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let stored = tables
            .executions
            .get_mut(&execution.id)
            .ok_or_else(|| not_found("execution", execution.id))?;
        let logs = std::mem::take(&mut stored.logs);
        *stored = WorkflowExecution { logs, ..execution.clone() };
        Ok(())
    }

    async fn append_log(&self, execution_id: ExecutionId, entry: &LogEntry) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let stored = tables
            .executions
            .get_mut(&execution_id)
            .ok_or_else(|| not_found("execution", execution_id))?;
        stored.logs.push(entry.clone());
        Ok(())
    }

    async fn get_execution(
        &self,
        execution_id: ExecutionId,
    ) -> Result<Option<WorkflowExecution>, StoreError> {
        Ok(self.tables.read().await.executions.get(&execution_id).cloned())
    }

    async fn list_executions(
        &self,
        workflow_id: WorkflowId,
    ) -> Result<Vec<WorkflowExecution>, StoreError> {
        let tables = self.tables.read().await;
        Ok(oldest_first(
            tables
                .executions
                .values()
                .filter(|e| e.workflow_id == workflow_id)
                .cloned()
                .collect(),
        ))
    }

    async fn list_by_status(
        &self,
        status: ExecutionStatus,
    ) -> Result<Vec<WorkflowExecution>, StoreError> {
        let tables = self.tables.read().await;
        Ok(oldest_first(
            tables
                .executions
                .values()
                .filter(|e| e.status == status)
                .cloned()
                .collect(),
        ))
    }
}
