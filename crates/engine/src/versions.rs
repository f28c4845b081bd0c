//! Append-only workflow history.
//!
//! Every save appends a [`WorkflowVersion`] and overwrites the draft with the
//! same graph, so `workflow.version` always names the snapshot the draft
//! equals. Executions bind to a version number and reload that snapshot.

use std::sync::Arc;

use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::EngineError;
use crate::graph::{validate_integrity, validate_structure};
use crate::models::{Edge, Node, Workflow, WorkflowId, WorkflowVersion};
use crate::store::Store;

pub struct VersionStore {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl VersionStore {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// New unpublished workflow with an empty graph at version 1.
    #[instrument(skip_all, fields(name = %name))]
    pub async fn create(
        &self,
        name: &str,
        folder_id: Option<Uuid>,
        author: &str,
    ) -> Result<Workflow, EngineError> {
        let now = self.clock.now();
        let workflow = Workflow {
            id: Uuid::new_v4(),
            name: name.to_owned(),
            folder_id,
            nodes: Vec::new(),
            edges: Vec::new(),
            published: false,
            version: 1,
            created_at: now,
            updated_at: now,
        };
        let first = WorkflowVersion {
            workflow_id: workflow.id,
            version: 1,
            nodes: Vec::new(),
            edges: Vec::new(),
            created_at: now,
            created_by: author.to_owned(),
            comment: Some("Created".into()),
        };
        self.store.insert_workflow(&workflow, &first).await?;
        info!(workflow_id = %workflow.id, "workflow created");
        Ok(workflow)
    }

    /// Replace the draft graph and append it as the next version.
    ///
    /// # Errors
    /// [`EngineError::Validation`] for structural problems;
    /// [`EngineError::GraphIntegrity`] if the workflow is published and the
    /// new graph would not pass publish checks.
    #[instrument(skip_all, fields(workflow_id = %workflow_id))]
    pub async fn save(
        &self,
        workflow_id: WorkflowId,
        nodes: Vec<Node>,
        edges: Vec<Edge>,
        author: &str,
        comment: Option<String>,
    ) -> Result<WorkflowVersion, EngineError> {
        validate_structure(&nodes, &edges).map_err(EngineError::Validation)?;
        let workflow = self.workflow(workflow_id).await?;
        if workflow.published {
            validate_integrity(&nodes, &edges).map_err(EngineError::GraphIntegrity)?;
        }
        self.commit(workflow, nodes, edges, author, comment).await
    }

    /// Toggle the published flag. Publishing runs integrity validation on the
    /// current draft and leaves the flag untouched on failure; unpublishing
    /// never validates.
    #[instrument(skip_all, fields(workflow_id = %workflow_id))]
    pub async fn publish(
        &self,
        workflow_id: WorkflowId,
        published: bool,
    ) -> Result<Workflow, EngineError> {
        let mut workflow = self.workflow(workflow_id).await?;
        if published {
            if let Err(violations) = validate_integrity(&workflow.nodes, &workflow.edges) {
                warn!(violations = violations.len(), "publish rejected");
                return Err(EngineError::GraphIntegrity(violations));
            }
        }

        let now = self.clock.now();
        self.store.set_published(workflow_id, published, now).await?;
        workflow.published = published;
        workflow.updated_at = now;
        info!(published, "workflow publish state changed");
        Ok(workflow)
    }

    /// Append a new version whose graph is a copy of `target`'s.
    #[instrument(skip_all, fields(workflow_id = %workflow_id))]
    pub async fn rollback(
        &self,
        workflow_id: WorkflowId,
        target: u32,
        author: &str,
    ) -> Result<WorkflowVersion, EngineError> {
        let workflow = self.workflow(workflow_id).await?;
        let snapshot = self.version(workflow_id, target).await?;
        if workflow.published {
            validate_integrity(&snapshot.nodes, &snapshot.edges)
                .map_err(EngineError::GraphIntegrity)?;
        }
        self.commit(
            workflow,
            snapshot.nodes,
            snapshot.edges,
            author,
            Some(format!("Restored from version {target}")),
        )
        .await
    }

    /// Every version, oldest first.
    pub async fn history(&self, workflow_id: WorkflowId) -> Result<Vec<WorkflowVersion>, EngineError> {
        self.workflow(workflow_id).await?;
        Ok(self.store.list_versions(workflow_id).await?)
    }

    pub async fn version(
        &self,
        workflow_id: WorkflowId,
        version: u32,
    ) -> Result<WorkflowVersion, EngineError> {
        self.store
            .get_version(workflow_id, version)
            .await?
            .ok_or(EngineError::VersionNotFound { workflow_id, version })
    }

    pub async fn workflow(&self, workflow_id: WorkflowId) -> Result<Workflow, EngineError> {
        self.store
            .get_workflow(workflow_id)
            .await?
            .ok_or(EngineError::WorkflowNotFound(workflow_id))
    }

    async fn commit(
        &self,
        mut workflow: Workflow,
        nodes: Vec<Node>,
        edges: Vec<Edge>,
        author: &str,
        comment: Option<String>,
    ) -> Result<WorkflowVersion, EngineError> {
        let now = self.clock.now();
        let snapshot = WorkflowVersion {
            workflow_id: workflow.id,
            version: workflow.version + 1,
            nodes: nodes.clone(),
            edges: edges.clone(),
            created_at: now,
            created_by: author.to_owned(),
            comment,
        };
        workflow.nodes = nodes;
        workflow.edges = edges;
        workflow.version = snapshot.version;
        workflow.updated_at = now;

        self.store.commit_version(&workflow, &snapshot).await?;
        info!(version = snapshot.version, "workflow version saved");
        Ok(snapshot)
    }
}
