//! Row structs that map 1-to-1 onto database tables, plus their conversions
//! to and from the engine's domain types.
//!
//! Graphs, contexts and suspensions are stored as JSONB; statuses and log
//! levels as text; version numbers as `INTEGER`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

use engine::models::{
    Edge, LogEntry, Node, Suspension, Workflow, WorkflowExecution, WorkflowVersion,
};
use queue::ResumeTicket;

use crate::DbError;

fn version_to_db(version: u32) -> Result<i32, DbError> {
    i32::try_from(version).map_err(|_| DbError::Corrupt(format!("version {version} out of range")))
}

fn version_from_db(version: i32) -> Result<u32, DbError> {
    u32::try_from(version).map_err(|_| DbError::Corrupt(format!("negative version {version}")))
}

// ---------------------------------------------------------------------------
// workflows
// ---------------------------------------------------------------------------

/// A persisted workflow with its current draft graph.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WorkflowRow {
    pub id: Uuid,
    pub name: String,
    pub folder_id: Option<Uuid>,
    pub nodes: Value,
    pub edges: Value,
    pub published: bool,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowRow {
    pub fn from_domain(workflow: &Workflow) -> Result<Self, DbError> {
        Ok(Self {
            id: workflow.id,
            name: workflow.name.clone(),
            folder_id: workflow.folder_id,
            nodes: serde_json::to_value(&workflow.nodes)?,
            edges: serde_json::to_value(&workflow.edges)?,
            published: workflow.published,
            version: version_to_db(workflow.version)?,
            created_at: workflow.created_at,
            updated_at: workflow.updated_at,
        })
    }

    pub fn into_domain(self) -> Result<Workflow, DbError> {
        Ok(Workflow {
            id: self.id,
            name: self.name,
            folder_id: self.folder_id,
            nodes: serde_json::from_value::<Vec<Node>>(self.nodes)?,
            edges: serde_json::from_value::<Vec<Edge>>(self.edges)?,
            published: self.published,
            version: version_from_db(self.version)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

// ---------------------------------------------------------------------------
// workflow_versions
// ---------------------------------------------------------------------------

/// One immutable snapshot in a workflow's history.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WorkflowVersionRow {
    pub workflow_id: Uuid,
    pub version: i32,
    pub nodes: Value,
    pub edges: Value,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub comment: Option<String>,
}

impl WorkflowVersionRow {
    pub fn from_domain(version: &WorkflowVersion) -> Result<Self, DbError> {
        Ok(Self {
            workflow_id: version.workflow_id,
            version: version_to_db(version.version)?,
            nodes: serde_json::to_value(&version.nodes)?,
            edges: serde_json::to_value(&version.edges)?,
            created_at: version.created_at,
            created_by: version.created_by.clone(),
            comment: version.comment.clone(),
        })
    }

    pub fn into_domain(self) -> Result<WorkflowVersion, DbError> {
        Ok(WorkflowVersion {
            workflow_id: self.workflow_id,
            version: version_from_db(self.version)?,
            nodes: serde_json::from_value(self.nodes)?,
            edges: serde_json::from_value(self.edges)?,
            created_at: self.created_at,
            created_by: self.created_by,
            comment: self.comment,
        })
    }
}

// ---------------------------------------------------------------------------
// workflow_executions
// ---------------------------------------------------------------------------

/// A persisted execution, without its logs.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ExecutionRow {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub trigger_type: String,
    pub trigger_data: Value,
    pub bound_version: i32,
    pub context: Value,
    pub suspension: Option<Value>,
}

impl ExecutionRow {
    pub fn from_domain(execution: &WorkflowExecution) -> Result<Self, DbError> {
        Ok(Self {
            id: execution.id,
            workflow_id: execution.workflow_id,
            status: execution.status.to_string(),
            started_at: execution.started_at,
            completed_at: execution.completed_at,
            trigger_type: execution.trigger_type.clone(),
            trigger_data: execution.trigger_data.clone(),
            bound_version: version_to_db(execution.bound_version)?,
            context: Value::Object(execution.context.clone()),
            suspension: execution
                .suspension
                .as_ref()
                .map(serde_json::to_value)
                .transpose()?,
        })
    }

    /// Rebuild the execution, attaching `logs` (already in append order).
    pub fn into_domain(self, logs: Vec<LogEntry>) -> Result<WorkflowExecution, DbError> {
        let context = match self.context {
            Value::Object(map) => map,
            Value::Null => serde_json::Map::new(),
            other => {
                return Err(DbError::Corrupt(format!(
                    "execution {} context is not an object: {other}",
                    self.id
                )))
            }
        };
        Ok(WorkflowExecution {
            id: self.id,
            workflow_id: self.workflow_id,
            status: self.status.parse().map_err(DbError::Corrupt)?,
            started_at: self.started_at,
            completed_at: self.completed_at,
            trigger_type: self.trigger_type,
            trigger_data: self.trigger_data,
            bound_version: version_from_db(self.bound_version)?,
            logs,
            context,
            suspension: self
                .suspension
                .map(serde_json::from_value::<Suspension>)
                .transpose()?,
        })
    }
}

// ---------------------------------------------------------------------------
// execution_logs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ExecutionLogRow {
    pub execution_id: Uuid,
    pub logged_at: DateTime<Utc>,
    pub node_id: Option<String>,
    pub level: String,
    pub message: String,
    pub data: Option<Value>,
}

impl ExecutionLogRow {
    pub fn from_domain(execution_id: Uuid, entry: &LogEntry) -> Self {
        Self {
            execution_id,
            logged_at: entry.timestamp,
            node_id: entry.node_id.clone(),
            level: entry.level.to_string(),
            message: entry.message.clone(),
            data: entry.data.clone(),
        }
    }

    pub fn into_domain(self) -> Result<LogEntry, DbError> {
        Ok(LogEntry {
            timestamp: self.logged_at,
            node_id: self.node_id,
            level: self.level.parse().map_err(DbError::Corrupt)?,
            message: self.message,
            data: self.data,
        })
    }
}

// ---------------------------------------------------------------------------
// resume_queue
// ---------------------------------------------------------------------------

/// A pending wake-up for a suspended execution.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ResumeRow {
    pub execution_id: Uuid,
    pub workflow_id: Uuid,
    pub resume_at: DateTime<Utc>,
}

impl From<&ResumeTicket> for ResumeRow {
    fn from(ticket: &ResumeTicket) -> Self {
        Self {
            execution_id: ticket.execution_id,
            workflow_id: ticket.workflow_id,
            resume_at: ticket.resume_at,
        }
    }
}

impl From<ResumeRow> for ResumeTicket {
    fn from(row: ResumeRow) -> Self {
        Self {
            execution_id: row.execution_id,
            workflow_id: row.workflow_id,
            resume_at: row.resume_at,
        }
    }
}
