//! Engine-level error types.

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{EdgeLabel, ExecutionStatus};
use crate::store::StoreError;

/// One problem found in a workflow graph.
///
/// Save-time checks produce the structural variants; publish-time checks add
/// the integrity variants; the scheduler raises the runtime ones when a bound
/// graph turns out to be unwalkable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Violation {
    // ------ Structural (blocks save) ------

    #[error("a node has an empty ID")]
    EmptyNodeId,

    #[error("duplicate node ID: '{0}'")]
    DuplicateNodeId(String),

    #[error("duplicate edge ID: '{0}'")]
    DuplicateEdgeId(String),

    #[error("node '{node_id}' is misconfigured: {reason}")]
    InvalidConfig { node_id: String, reason: String },

    // ------ Integrity (blocks publish) ------

    /// An edge references a node ID that doesn't exist in the workflow.
    #[error("edge '{edge_id}' references unknown node '{node_id}' ({side} side)")]
    DanglingEdge {
        edge_id: String,
        node_id: String,
        side: &'static str,
    },

    #[error("workflow has no trigger node")]
    MissingTrigger,

    #[error("workflow has more than one trigger node: {0:?}")]
    MultipleTriggers(Vec<String>),

    #[error("edge '{edge_id}' leaves node '{node_id}' with label '{label}'; only 'default' is allowed there")]
    UnexpectedEdgeLabel {
        edge_id: String,
        node_id: String,
        label: EdgeLabel,
    },

    #[error("condition node '{node_id}' has no outgoing '{label}' edge")]
    MissingBranch { node_id: String, label: EdgeLabel },

    #[error("node '{node_id}' has several '{label}' edges: {edge_ids:?}")]
    AmbiguousBranch {
        node_id: String,
        label: EdgeLabel,
        edge_ids: Vec<String>,
    },

    /// A loop that never passes through a Delay node.
    #[error("cycle without a delay through nodes {0:?}")]
    UnconditionalCycle(Vec<String>),

    // ------ Runtime ------

    #[error("switch node '{node_id}' matched no case and has no default label")]
    NoMatchingCase { node_id: String },

    #[error("node '{node_id}' was reached twice without passing a delay")]
    RevisitedNode { node_id: String },

    #[error("node '{node_id}' does not exist in the bound graph")]
    UnknownNode { node_id: String },
}

impl Violation {
    /// The node this violation is about, when there is exactly one.
    pub fn node_id(&self) -> Option<&str> {
        match self {
            Self::DuplicateNodeId(id) => Some(id.as_str()),
            Self::InvalidConfig { node_id, .. }
            | Self::DanglingEdge { node_id, .. }
            | Self::UnexpectedEdgeLabel { node_id, .. }
            | Self::MissingBranch { node_id, .. }
            | Self::AmbiguousBranch { node_id, .. }
            | Self::NoMatchingCase { node_id }
            | Self::RevisitedNode { node_id }
            | Self::UnknownNode { node_id } => Some(node_id.as_str()),
            _ => None,
        }
    }

    /// The edge this violation is about, when there is exactly one.
    pub fn edge_id(&self) -> Option<&str> {
        match self {
            Self::DuplicateEdgeId(id) => Some(id.as_str()),
            Self::DanglingEdge { edge_id, .. } | Self::UnexpectedEdgeLabel { edge_id, .. } => {
                Some(edge_id.as_str())
            }
            _ => None,
        }
    }
}

fn list(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors produced by the workflow engine (validation + execution).
#[derive(Debug, Error)]
pub enum EngineError {
    // ------ Validation errors ------

    /// Malformed nodes or edges; blocks save.
    #[error("workflow failed validation: {}", list(.0))]
    Validation(Vec<Violation>),

    /// Dangling edges, missing trigger, unwired branches, delay-free cycles;
    /// blocks publish or aborts a running execution.
    #[error("graph integrity violated: {}", list(.0))]
    GraphIntegrity(Vec<Violation>),

    // ------ Execution errors ------

    /// The Action Dispatcher rejected or failed an action. Never retried.
    #[error("action at node '{node_id}' failed: {source}")]
    ActionDispatch {
        node_id: String,
        source: nodes::DispatchError,
    },

    #[error("workflow {0} is not published")]
    NotPublished(Uuid),

    #[error("execution {execution_id} is {actual}, expected {expected}")]
    InvalidState {
        execution_id: Uuid,
        actual: ExecutionStatus,
        expected: ExecutionStatus,
    },

    #[error("execution {execution_id} is not due until {resume_at}")]
    NotDue {
        execution_id: Uuid,
        resume_at: DateTime<Utc>,
    },

    // ------ Lookup errors ------

    #[error("workflow {0} not found")]
    WorkflowNotFound(Uuid),

    #[error("version {version} of workflow {workflow_id} not found")]
    VersionNotFound { workflow_id: Uuid, version: u32 },

    #[error("execution {0} not found")]
    ExecutionNotFound(Uuid),

    // ------ Collaborators ------

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Queue(#[from] queue::QueueError),
}

impl EngineError {
    /// Violations carried by validation or integrity errors.
    pub fn violations(&self) -> &[Violation] {
        match self {
            Self::Validation(v) | Self::GraphIntegrity(v) => v,
            _ => &[],
        }
    }
}
