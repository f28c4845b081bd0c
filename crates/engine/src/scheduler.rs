//! Workflow execution engine.
//!
//! `ExecutionScheduler` is the central orchestrator:
//! 1. Matches incoming events against published workflows and starts one
//!    execution per match, bound to the version current at that instant.
//! 2. Walks the bound graph node by node from the Trigger, following edges by
//!    label and merging action output into the execution context.
//! 3. Persists every log entry and status transition through the `Store`.
//! 4. Suspends at Delay nodes: state is persisted first, then a resume ticket
//!    is scheduled, and [`ExecutionScheduler::resume`] picks the run up later.
//! 5. Fails the execution on a dispatch error (never retried) or when the
//!    graph turns out to be unwalkable.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::{json, Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use nodes::{ActionBranch, ActionDispatcher, DispatchContext};
use queue::{ResumeQueue, ResumeTicket};

use crate::clock::Clock;
use crate::condition::ConditionEvaluator;
use crate::error::{EngineError, Violation};
use crate::graph::Graph;
use crate::models::{
    ActionConfig, Edge, EdgeLabel, Event, ExecutionId, ExecutionStatus, LogEntry, LogLevel,
    NodeConfig, Suspension, WorkflowExecution, WorkflowId, WorkflowVersion,
};
use crate::store::Store;
use crate::trigger::TriggerMatcher;

const CANCELLED: &str = "execution cancelled";
const DEAD_END: &str = "no outgoing edge; execution finished";

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// Per-execution cancel signals for runs currently being walked in this
/// process. The walk checks its signal before every node.
#[derive(Default)]
pub struct CancellationRegistry {
    signals: Mutex<HashMap<ExecutionId, Arc<AtomicBool>>>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an execution and return its cancel signal.
    pub async fn register(&self, execution_id: ExecutionId) -> Arc<AtomicBool> {
        let signal = Arc::new(AtomicBool::new(false));
        self.signals.lock().await.insert(execution_id, signal.clone());
        signal
    }

    /// Raise the signal. Returns false if the execution is not being walked here.
    pub async fn request(&self, execution_id: ExecutionId) -> bool {
        match self.signals.lock().await.get(&execution_id) {
            Some(signal) => {
                signal.store(true, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }

    pub async fn unregister(&self, execution_id: ExecutionId) {
        self.signals.lock().await.remove(&execution_id);
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// How a walk segment ended.
enum Outcome {
    Finished,
    Suspended(Suspension),
    Cancelled,
}

pub struct ExecutionScheduler {
    store: Arc<dyn Store>,
    dispatcher: Arc<dyn ActionDispatcher>,
    queue: Arc<dyn ResumeQueue>,
    clock: Arc<dyn Clock>,
    matcher: TriggerMatcher,
    evaluator: ConditionEvaluator,
    cancellations: CancellationRegistry,
}

impl ExecutionScheduler {
    pub fn new(
        store: Arc<dyn Store>,
        dispatcher: Arc<dyn ActionDispatcher>,
        queue: Arc<dyn ResumeQueue>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            dispatcher,
            queue,
            clock,
            matcher: TriggerMatcher::new(),
            evaluator: ConditionEvaluator::new(),
            cancellations: CancellationRegistry::new(),
        }
    }

    pub(crate) fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub(crate) fn queue(&self) -> &Arc<dyn ResumeQueue> {
        &self.queue
    }

    pub(crate) fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Start one execution per published workflow the event matches.
    ///
    /// A workflow that fails to start is logged and skipped; the others
    /// still run.
    #[instrument(skip_all, fields(event_type = %event.event_type))]
    pub async fn handle_event(&self, event: &Event) -> Result<Vec<WorkflowExecution>, EngineError> {
        let workflows = self.store.list_workflows().await?;
        let matched = self.matcher.match_event(event, &workflows);

        let mut started = Vec::with_capacity(matched.len());
        for workflow_id in matched {
            match self.start(workflow_id, event).await {
                Ok(execution) => started.push(execution),
                Err(err) => error!(workflow_id = %workflow_id, "could not start execution: {err}"),
            }
        }
        Ok(started)
    }

    /// Start a single execution of a published workflow.
    ///
    /// Returns the execution as it stands when control comes back: completed,
    /// failed, or suspended at a Delay.
    ///
    /// # Errors
    /// `NotPublished`, lookup errors, and store/queue failures. Problems
    /// inside the graph fail the execution instead of returning an error.
    #[instrument(skip_all, fields(workflow_id = %workflow_id))]
    pub async fn start(
        &self,
        workflow_id: WorkflowId,
        event: &Event,
    ) -> Result<WorkflowExecution, EngineError> {
        let workflow = self
            .store
            .get_workflow(workflow_id)
            .await?
            .ok_or(EngineError::WorkflowNotFound(workflow_id))?;
        if !workflow.published {
            return Err(EngineError::NotPublished(workflow_id));
        }

        // Bind to the snapshot, never the live draft.
        let snapshot = self.bound_version(workflow_id, workflow.version).await?;
        let graph = Graph::from_version(&snapshot);
        let entry = graph
            .trigger()
            .map_err(|v| EngineError::GraphIntegrity(vec![v]))?
            .id
            .clone();

        let mut execution =
            WorkflowExecution::queued(workflow_id, snapshot.version, event, self.clock.now());
        let execution_id = execution.id;
        self.store.insert_execution(&execution).await?;
        info!(execution_id = %execution_id, version = snapshot.version, "execution queued");

        let signal = self.cancellations.register(execution_id).await;
        execution.status = ExecutionStatus::Running;
        self.store.update_execution(&execution).await?;

        let result = self.drive(execution, &graph, entry, &signal).await;
        self.cancellations.unregister(execution_id).await;
        result
    }

    /// Continue a suspended execution whose resume time has passed.
    ///
    /// # Errors
    /// `InvalidState` unless the execution is suspended; `NotDue` before its
    /// resume time.
    #[instrument(skip_all, fields(execution_id = %execution_id))]
    pub async fn resume(&self, execution_id: ExecutionId) -> Result<WorkflowExecution, EngineError> {
        let mut execution = self.execution(execution_id).await?;
        let suspension = match (execution.status, execution.suspension.clone()) {
            (ExecutionStatus::Suspended, Some(suspension)) => suspension,
            (actual, _) => {
                return Err(EngineError::InvalidState {
                    execution_id,
                    actual,
                    expected: ExecutionStatus::Suspended,
                })
            }
        };
        if self.clock.now() < suspension.resume_at {
            return Err(EngineError::NotDue {
                execution_id,
                resume_at: suspension.resume_at,
            });
        }

        let snapshot = self
            .bound_version(execution.workflow_id, execution.bound_version)
            .await?;
        let graph = Graph::from_version(&snapshot);

        let Suspension { delay_node, resume_node, .. } = suspension;

        let signal = self.cancellations.register(execution_id).await;
        execution.status = ExecutionStatus::Running;
        execution.suspension = None;
        self.store.update_execution(&execution).await?;
        self.record(
            &mut execution,
            Some(&delay_node),
            LogLevel::Info,
            "delay elapsed; resuming",
            None,
        )
        .await?;

        let result = match resume_node {
            Some(next) => self.drive(execution, &graph, next, &signal).await,
            None => {
                async {
                    self.record(&mut execution, Some(&delay_node), LogLevel::Info, DEAD_END, None)
                        .await?;
                    self.complete(&mut execution).await?;
                    Ok::<_, EngineError>(execution)
                }
                .await
            }
        };
        self.cancellations.unregister(execution_id).await;
        result
    }

    /// Cancel one execution.
    ///
    /// Suspended runs are failed on the spot and their resume ticket dropped.
    /// Runs being walked in this process stop before their next node. Runs
    /// walked by another process are failed in the store; that walker sees
    /// the terminal status before its next node and stops.
    /// Terminal runs are returned unchanged.
    #[instrument(skip_all, fields(execution_id = %execution_id))]
    pub async fn cancel(&self, execution_id: ExecutionId) -> Result<WorkflowExecution, EngineError> {
        let mut execution = self.execution(execution_id).await?;
        match execution.status {
            status @ (ExecutionStatus::Completed | ExecutionStatus::Failed) => {
                debug!(%status, "execution already finished");
            }
            ExecutionStatus::Suspended => {
                self.queue.remove(execution_id).await?;
                self.fail(&mut execution, None, CANCELLED.to_owned()).await?;
            }
            ExecutionStatus::Queued | ExecutionStatus::Running => {
                if self.cancellations.request(execution_id).await {
                    info!("cancellation requested");
                } else {
                    // Not walked here: either another process owns it or a
                    // crash left it behind.
                    self.fail(&mut execution, None, CANCELLED.to_owned()).await?;
                }
            }
        }
        Ok(execution)
    }

    /// Cancel every unfinished execution of a workflow; returns their IDs.
    #[instrument(skip_all, fields(workflow_id = %workflow_id))]
    pub async fn cancel_workflow(&self, workflow_id: WorkflowId) -> Result<Vec<ExecutionId>, EngineError> {
        let mut cancelled = Vec::new();
        for execution in self.store.list_executions(workflow_id).await? {
            if !execution.status.is_terminal() {
                self.cancel(execution.id).await?;
                cancelled.push(execution.id);
            }
        }
        info!(count = cancelled.len(), "workflow executions cancelled");
        Ok(cancelled)
    }

    // -----------------------------------------------------------------------
    // Internal: walking
    // -----------------------------------------------------------------------

    async fn drive(
        &self,
        mut execution: WorkflowExecution,
        graph: &Graph,
        from: String,
        cancelled: &AtomicBool,
    ) -> Result<WorkflowExecution, EngineError> {
        let outcome = self.walk(&mut execution, graph, from, cancelled).await;
        if !matches!(outcome, Err(EngineError::Store(_) | EngineError::Queue(_))) {
            // Another process may have cancelled the run while we walked it.
            if let Some(stored) = self.finished_elsewhere(execution.id).await? {
                info!(execution_id = %execution.id, status = %stored.status, "execution finished elsewhere; stopping");
                return Ok(stored);
            }
        }
        match outcome {
            Ok(Outcome::Finished) => self.complete(&mut execution).await?,
            Ok(Outcome::Suspended(suspension)) => self.suspend(&mut execution, suspension).await?,
            Ok(Outcome::Cancelled) => self.fail(&mut execution, None, CANCELLED.to_owned()).await?,
            Err(err @ (EngineError::Store(_) | EngineError::Queue(_))) => return Err(err),
            Err(err) => {
                let node_id = match &err {
                    EngineError::ActionDispatch { node_id, .. } => Some(node_id.clone()),
                    other => other
                        .violations()
                        .iter()
                        .find_map(|v| v.node_id().map(str::to_owned)),
                };
                self.fail(&mut execution, node_id.as_deref(), err.to_string()).await?;
            }
        }
        Ok(execution)
    }

    /// Walk from `from` until the run finishes, suspends, or is cancelled.
    /// A node reached twice in one segment means a loop that never yields.
    async fn walk(
        &self,
        execution: &mut WorkflowExecution,
        graph: &Graph,
        from: String,
        cancelled: &AtomicBool,
    ) -> Result<Outcome, EngineError> {
        let mut visited: HashSet<String> = HashSet::new();
        let mut current = from;

        loop {
            if cancelled.load(Ordering::SeqCst) {
                return Ok(Outcome::Cancelled);
            }
            if self.finished_elsewhere(execution.id).await?.is_some() {
                return Ok(Outcome::Cancelled);
            }
            if !visited.insert(current.clone()) {
                return Err(EngineError::GraphIntegrity(vec![Violation::RevisitedNode {
                    node_id: current,
                }]));
            }
            let node = graph.node(&current).ok_or_else(|| {
                EngineError::GraphIntegrity(vec![Violation::UnknownNode {
                    node_id: current.clone(),
                }])
            })?;
            debug!(node_id = %node.id, kind = %node.kind(), "visiting node");

            let next: Option<&Edge> = match &node.config {
                NodeConfig::Trigger(cfg) => {
                    let message = format!("trigger '{}' matched", cfg.event_type);
                    self.record(execution, Some(&node.id), LogLevel::Info, message, None)
                        .await?;
                    graph.edge_for(&node.id, &EdgeLabel::Default)
                }

                NodeConfig::Condition(cfg) => {
                    let evaluation = self.evaluator.evaluate(&node.id, cfg, &execution.context)?;
                    for warning in &evaluation.warnings {
                        self.record(execution, Some(&node.id), LogLevel::Warning, warning.to_string(), None)
                            .await?;
                    }
                    let label = evaluation.label;
                    self.record(
                        execution,
                        Some(&node.id),
                        LogLevel::Info,
                        format!("condition took '{label}' branch"),
                        Some(json!({ "label": label.as_str() })),
                    )
                    .await?;
                    let edge = graph.edge_for(&node.id, &label).ok_or_else(|| {
                        EngineError::GraphIntegrity(vec![Violation::MissingBranch {
                            node_id: node.id.clone(),
                            label: label.clone(),
                        }])
                    })?;
                    Some(edge)
                }

                NodeConfig::Action(cfg) => {
                    let branch = self.dispatch(execution, &node.id, cfg).await?;
                    action_edge(graph, &node.id, branch)
                }

                NodeConfig::Delay(cfg) => {
                    let resume_at = cfg.resume_at(self.clock.now()).ok_or_else(|| {
                        EngineError::GraphIntegrity(vec![Violation::InvalidConfig {
                            node_id: node.id.clone(),
                            reason: "delay ends outside the supported time range".into(),
                        }])
                    })?;
                    let resume_node = graph
                        .edge_for(&node.id, &EdgeLabel::Default)
                        .map(|edge| edge.target.clone());
                    self.record(
                        execution,
                        Some(&node.id),
                        LogLevel::Info,
                        format!("waiting until {resume_at}"),
                        Some(json!({ "resume_at": resume_at })),
                    )
                    .await?;
                    return Ok(Outcome::Suspended(Suspension {
                        delay_node: node.id.clone(),
                        resume_node,
                        resume_at,
                    }));
                }

                NodeConfig::Goal(cfg) => {
                    let message = match &cfg.name {
                        Some(name) => format!("goal '{name}' reached"),
                        None => "goal reached".to_owned(),
                    };
                    self.record(execution, Some(&node.id), LogLevel::Info, message, None)
                        .await?;
                    return Ok(Outcome::Finished);
                }
            };

            match next {
                Some(edge) => current = edge.target.clone(),
                None => {
                    self.record(execution, Some(&node.id), LogLevel::Info, DEAD_END, None)
                        .await?;
                    return Ok(Outcome::Finished);
                }
            }
        }
    }

    async fn dispatch(
        &self,
        execution: &mut WorkflowExecution,
        node_id: &str,
        cfg: &ActionConfig,
    ) -> Result<Option<ActionBranch>, EngineError> {
        let ctx = DispatchContext {
            workflow_id: execution.workflow_id,
            execution_id: execution.id,
            node_id: node_id.to_owned(),
            context: execution.context.clone(),
        };

        let outcome = self
            .dispatcher
            .dispatch(&cfg.action_type, &cfg.params, &ctx)
            .await
            .map_err(|source| EngineError::ActionDispatch {
                node_id: node_id.to_owned(),
                source,
            })?;

        if let Some(output) = &outcome.output {
            merge_output(&mut execution.context, node_id, output);
        }
        self.record(
            execution,
            Some(node_id),
            LogLevel::Info,
            format!("action '{}' succeeded", cfg.action_type),
            outcome.output,
        )
        .await?;
        Ok(outcome.branch)
    }

    // -----------------------------------------------------------------------
    // Internal: persistence
    // -----------------------------------------------------------------------

    /// Append a log entry to the execution and the store, and mirror it to tracing.
    async fn record(
        &self,
        execution: &mut WorkflowExecution,
        node_id: Option<&str>,
        level: LogLevel,
        message: impl Into<String>,
        data: Option<Value>,
    ) -> Result<(), EngineError> {
        let entry = LogEntry {
            timestamp: self.clock.now(),
            node_id: node_id.map(str::to_owned),
            level,
            message: message.into(),
            data,
        };
        let node = node_id.unwrap_or("-");
        match level {
            LogLevel::Info => info!(execution_id = %execution.id, node_id = node, "{}", entry.message),
            LogLevel::Warning => warn!(execution_id = %execution.id, node_id = node, "{}", entry.message),
            LogLevel::Error => error!(execution_id = %execution.id, node_id = node, "{}", entry.message),
        }
        self.store.append_log(execution.id, &entry).await?;
        execution.logs.push(entry);
        Ok(())
    }

    async fn complete(&self, execution: &mut WorkflowExecution) -> Result<(), EngineError> {
        execution.status = ExecutionStatus::Completed;
        execution.completed_at = Some(self.clock.now());
        execution.suspension = None;
        self.store.update_execution(execution).await?;
        info!(execution_id = %execution.id, "execution completed");
        Ok(())
    }

    async fn fail(
        &self,
        execution: &mut WorkflowExecution,
        node_id: Option<&str>,
        message: String,
    ) -> Result<(), EngineError> {
        self.record(execution, node_id, LogLevel::Error, message, None).await?;
        execution.status = ExecutionStatus::Failed;
        execution.completed_at = Some(self.clock.now());
        execution.suspension = None;
        self.store.update_execution(execution).await?;
        Ok(())
    }

    /// Persist the suspended state, then hand the wake-up to the queue.
    async fn suspend(
        &self,
        execution: &mut WorkflowExecution,
        suspension: Suspension,
    ) -> Result<(), EngineError> {
        let ticket = ResumeTicket {
            execution_id: execution.id,
            workflow_id: execution.workflow_id,
            resume_at: suspension.resume_at,
        };
        execution.status = ExecutionStatus::Suspended;
        execution.suspension = Some(suspension);
        self.store.update_execution(execution).await?;
        self.queue.schedule(ticket).await?;
        info!(execution_id = %execution.id, "execution suspended");
        Ok(())
    }

    /// The stored execution, if a writer other than this walk has already
    /// moved it to a terminal status.
    async fn finished_elsewhere(
        &self,
        execution_id: ExecutionId,
    ) -> Result<Option<WorkflowExecution>, EngineError> {
        let stored = self.execution(execution_id).await?;
        Ok(stored.status.is_terminal().then_some(stored))
    }

    async fn execution(&self, execution_id: ExecutionId) -> Result<WorkflowExecution, EngineError> {
        self.store
            .get_execution(execution_id)
            .await?
            .ok_or(EngineError::ExecutionNotFound(execution_id))
    }

    async fn bound_version(
        &self,
        workflow_id: WorkflowId,
        version: u32,
    ) -> Result<WorkflowVersion, EngineError> {
        self.store
            .get_version(workflow_id, version)
            .await?
            .ok_or(EngineError::VersionNotFound { workflow_id, version })
    }
}

/// Edge an Action continues on: the reported branch's edge if wired, else
/// `default`. Without a reported branch, a lone `success` edge also counts.
fn action_edge<'g>(graph: &'g Graph, node_id: &str, branch: Option<ActionBranch>) -> Option<&'g Edge> {
    let preferred = branch.and_then(|b| {
        let label = match b {
            ActionBranch::Success => EdgeLabel::Success,
            ActionBranch::Failure => EdgeLabel::Failure,
        };
        graph.edge_for(node_id, &label)
    });
    preferred
        .or_else(|| graph.edge_for(node_id, &EdgeLabel::Default))
        .or_else(|| match branch {
            None => graph.edge_for(node_id, &EdgeLabel::Success),
            Some(_) => None,
        })
}

/// Object output merges key by key; any other value is stored under the node ID.
fn merge_output(context: &mut Map<String, Value>, node_id: &str, output: &Value) {
    match output {
        Value::Object(fields) => {
            for (key, value) in fields {
                context.insert(key.clone(), value.clone());
            }
        }
        Value::Null => {}
        other => {
            context.insert(node_id.to_owned(), other.clone());
        }
    }
}
