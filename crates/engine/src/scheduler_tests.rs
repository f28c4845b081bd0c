//! End-to-end tests for the execution scheduler.
//!
//! Everything runs against `MemoryStore`, `MemoryResumeQueue` and a
//! `ManualClock`, with `MockAction` handlers standing in for real email/SMS
//! integrations, so no Postgres connection is required.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::{json, Value};

use nodes::mock::MockAction;
use nodes::{ActionBranch, ActionHandler, ActionOutcome, ActionRegistry, DispatchContext, DispatchError};
use queue::{MemoryResumeQueue, ResumeQueue};

use crate::clock::{Clock, ManualClock};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::filter::{Filter, Operator};
use crate::models::{
    ConditionConfig, DelayConfig, DelayUnit, Edge, EdgeLabel, Event, ExecutionStatus, LogLevel,
    Node, SwitchCase, Workflow, WorkflowExecution, WorkflowVersion,
};
use crate::resumption::ResumptionService;
use crate::scheduler::ExecutionScheduler;
use crate::store::{MemoryStore, Store};
use crate::versions::VersionStore;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

struct Harness {
    store: Arc<MemoryStore>,
    queue: Arc<MemoryResumeQueue>,
    clock: Arc<ManualClock>,
    versions: VersionStore,
    scheduler: Arc<ExecutionScheduler>,
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 3, 9, 0, 0).unwrap()
}

fn harness(registry: ActionRegistry) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let queue = Arc::new(MemoryResumeQueue::new());
    let clock = Arc::new(ManualClock::new(t0()));
    let versions = VersionStore::new(store.clone(), clock.clone());
    let scheduler = Arc::new(ExecutionScheduler::new(
        store.clone(),
        Arc::new(registry),
        queue.clone(),
        clock.clone(),
    ));
    Harness { store, queue, clock, versions, scheduler }
}

impl Harness {
    /// Create, save and publish a workflow with the given graph.
    async fn published(&self, nodes: Vec<Node>, edges: Vec<Edge>) -> Workflow {
        let wf = self.versions.create("test", None, "tester").await.unwrap();
        self.versions.save(wf.id, nodes, edges, "tester", None).await.unwrap();
        self.versions.publish(wf.id, true).await.unwrap()
    }

    /// Insert a published workflow without running validation, to reach
    /// runtime guards that publish-time checks normally make unreachable.
    async fn published_unchecked(&self, nodes: Vec<Node>, edges: Vec<Edge>) -> Workflow {
        let now = self.clock.now();
        let wf = Workflow {
            id: uuid::Uuid::new_v4(),
            name: "unchecked".into(),
            folder_id: None,
            nodes: nodes.clone(),
            edges: edges.clone(),
            published: true,
            version: 1,
            created_at: now,
            updated_at: now,
        };
        let v1 = WorkflowVersion {
            workflow_id: wf.id,
            version: 1,
            nodes,
            edges,
            created_at: now,
            created_by: "tester".into(),
            comment: None,
        };
        self.store.insert_workflow(&wf, &v1).await.unwrap();
        wf
    }

    async fn stored(&self, execution: &WorkflowExecution) -> WorkflowExecution {
        self.store.get_execution(execution.id).await.unwrap().unwrap()
    }

    fn resumer(&self) -> ResumptionService {
        ResumptionService::new(self.scheduler.clone(), EngineConfig::default())
    }
}

fn e(id: &str, from: &str, to: &str) -> Edge {
    Edge::new(id, from, to, EdgeLabel::Default)
}

fn on(id: &str, from: &str, to: &str, label: &str) -> Edge {
    Edge::new(id, from, to, EdgeLabel::from(label))
}

fn event(event_type: &str, payload: Value) -> Event {
    Event::new(event_type, payload)
}

fn error_logs(execution: &WorkflowExecution) -> Vec<&str> {
    execution
        .logs
        .iter()
        .filter(|l| l.level == LogLevel::Error)
        .map(|l| l.message.as_str())
        .collect()
}

/// Cancels the execution it runs in through whichever scheduler it is wired to.
#[derive(Default)]
struct CancelSelf {
    scheduler: OnceLock<Arc<ExecutionScheduler>>,
}

#[async_trait]
impl ActionHandler for CancelSelf {
    async fn execute(
        &self,
        _params: &Value,
        ctx: &DispatchContext,
    ) -> Result<ActionOutcome, DispatchError> {
        let scheduler = self
            .scheduler
            .get()
            .ok_or_else(|| DispatchError::Failed("scheduler not wired".into()))?;
        scheduler
            .cancel(ctx.execution_id)
            .await
            .map_err(|e| DispatchError::Failed(e.to_string()))?;
        Ok(ActionOutcome::empty())
    }
}

// ============================================================
// Trigger → execution
// ============================================================

#[tokio::test]
async fn vip_tag_starts_exactly_one_execution() {
    let email = Arc::new(MockAction::succeeding("send_email"));
    let h = harness(ActionRegistry::new().register("send_email", email.clone()));
    h.published(
        vec![
            Node::trigger("t", "contact.tag_added", vec![Filter::new("tag", Operator::Equals, "vip")]),
            Node::action("a", "send_email", json!({ "template": "welcome-vip" })),
        ],
        vec![e("e1", "t", "a")],
    )
    .await;

    let started = h
        .scheduler
        .handle_event(&event("contact.tag_added", json!({ "tag": "vip" })))
        .await
        .unwrap();
    assert_eq!(started.len(), 1);
    assert_eq!(started[0].status, ExecutionStatus::Completed);
    assert_eq!(email.call_count(), 1);
    assert_eq!(email.calls()[0]["template"], "welcome-vip");

    let none = h
        .scheduler
        .handle_event(&event("contact.tag_added", json!({ "tag": "regular" })))
        .await
        .unwrap();
    assert!(none.is_empty());
    assert_eq!(email.call_count(), 1);
}

#[tokio::test]
async fn unpublished_workflows_do_not_start() {
    let h = harness(ActionRegistry::new());
    let wf = h.versions.create("draft", None, "tester").await.unwrap();
    h.versions
        .save(
            wf.id,
            vec![Node::trigger("t", "deal.won", vec![]), Node::goal("g")],
            vec![e("e1", "t", "g")],
            "tester",
            None,
        )
        .await
        .unwrap();

    let ev = event("deal.won", json!({}));
    assert!(h.scheduler.handle_event(&ev).await.unwrap().is_empty());
    assert!(matches!(
        h.scheduler.start(wf.id, &ev).await,
        Err(EngineError::NotPublished(id)) if id == wf.id
    ));
}

// ============================================================
// Delays and resumption
// ============================================================

#[tokio::test]
async fn delay_survives_a_restart_and_resumes_after_two_days() {
    let first = Arc::new(MockAction::succeeding("send_email"));
    let second = Arc::new(MockAction::succeeding("send_sms"));
    let after_goal = Arc::new(MockAction::succeeding("add_tag"));
    let registry = || {
        ActionRegistry::new()
            .register("send_email", first.clone())
            .register("send_sms", second.clone())
            .register("add_tag", after_goal.clone())
    };

    let h = harness(registry());
    h.published(
        vec![
            Node::trigger("t", "contact.created", vec![]),
            Node::action("a1", "send_email", Value::Null),
            Node::delay("d", DelayConfig::fixed(2, DelayUnit::Days)),
            Node::action("a2", "send_sms", Value::Null),
            Node::goal("g"),
            Node::action("a3", "add_tag", Value::Null),
        ],
        vec![
            e("e1", "t", "a1"),
            e("e2", "a1", "d"),
            e("e3", "d", "a2"),
            e("e4", "a2", "g"),
            e("e5", "g", "a3"),
        ],
    )
    .await;

    let started = h
        .scheduler
        .handle_event(&event("contact.created", json!({ "email": "ana@example.com" })))
        .await
        .unwrap();
    let execution = &started[0];
    assert_eq!(execution.status, ExecutionStatus::Suspended);
    let suspension = execution.suspension.clone().unwrap();
    assert_eq!(suspension.resume_node.as_deref(), Some("a2"));
    assert_eq!(suspension.resume_at, t0() + Duration::days(2));
    assert_eq!((first.call_count(), second.call_count()), (1, 0));

    // Restart: same store and clock, fresh queue and scheduler.
    let queue = Arc::new(MemoryResumeQueue::new());
    let scheduler = Arc::new(ExecutionScheduler::new(
        h.store.clone(),
        Arc::new(registry()),
        queue.clone(),
        h.clock.clone(),
    ));
    let resumer = ResumptionService::new(scheduler, EngineConfig::default());
    assert_eq!(resumer.recover().await.unwrap(), 1);
    assert_eq!(queue.len().await.unwrap(), 1);

    assert_eq!(resumer.run_due().await.unwrap(), 0);
    assert_eq!(second.call_count(), 0);

    h.clock.advance(Duration::days(2) + Duration::minutes(1));
    assert_eq!(resumer.run_due().await.unwrap(), 1);

    let done = h.stored(execution).await;
    assert_eq!(done.status, ExecutionStatus::Completed);
    assert!(done.suspension.is_none());
    assert_eq!((first.call_count(), second.call_count(), after_goal.call_count()), (1, 1, 0));
    assert_eq!(done.logs_for("a1").count(), 1);
    assert_eq!(done.logs_for("a2").count(), 1);
    assert_eq!(done.logs_for("a3").count(), 0);
    assert_eq!(done.logs.last().and_then(|l| l.node_id.as_deref()), Some("g"));
    assert_eq!(queue.len().await.unwrap(), 0);
}

#[tokio::test]
async fn until_delay_in_the_past_still_yields_once() {
    let tag = Arc::new(MockAction::succeeding("add_tag"));
    let h = harness(ActionRegistry::new().register("add_tag", tag.clone()));
    h.published(
        vec![
            Node::trigger("t", "deal.created", vec![]),
            Node::delay("d", DelayConfig::Until { timestamp: t0() - Duration::hours(1) }),
            Node::action("a", "add_tag", Value::Null),
        ],
        vec![e("e1", "t", "d"), e("e2", "d", "a")],
    )
    .await;

    let started = h.scheduler.handle_event(&event("deal.created", json!({}))).await.unwrap();
    assert_eq!(started[0].status, ExecutionStatus::Suspended);
    assert_eq!(tag.call_count(), 0);

    assert_eq!(h.resumer().run_due().await.unwrap(), 1);
    assert_eq!(h.stored(&started[0]).await.status, ExecutionStatus::Completed);
    assert_eq!(tag.call_count(), 1);
}

#[tokio::test]
async fn resume_checks_state_and_due_time() {
    let h = harness(ActionRegistry::new());
    h.published(
        vec![
            Node::trigger("t", "deal.created", vec![]),
            Node::delay("d", DelayConfig::fixed(1, DelayUnit::Hours)),
        ],
        vec![e("e1", "t", "d")],
    )
    .await;
    let execution = h
        .scheduler
        .handle_event(&event("deal.created", json!({})))
        .await
        .unwrap()
        .remove(0);

    assert!(matches!(
        h.scheduler.resume(execution.id).await,
        Err(EngineError::NotDue { .. })
    ));

    h.clock.advance(Duration::hours(1));
    let done = h.scheduler.resume(execution.id).await.unwrap();
    assert_eq!(done.status, ExecutionStatus::Completed);
    assert!(done.logs_for("d").any(|l| l.message.contains("no outgoing edge")));

    assert!(matches!(
        h.scheduler.resume(execution.id).await,
        Err(EngineError::InvalidState { actual: ExecutionStatus::Completed, .. })
    ));
}

#[tokio::test]
async fn executions_stay_on_their_bound_version() {
    let email = Arc::new(MockAction::succeeding("send_email"));
    let sms = Arc::new(MockAction::succeeding("send_sms"));
    let h = harness(
        ActionRegistry::new()
            .register("send_email", email.clone())
            .register("send_sms", sms.clone()),
    );
    let graph = |action: &str| {
        (
            vec![
                Node::trigger("t", "contact.created", vec![]),
                Node::delay("d", DelayConfig::fixed(1, DelayUnit::Days)),
                Node::action("a", action, Value::Null),
            ],
            vec![e("e1", "t", "d"), e("e2", "d", "a")],
        )
    };
    let (nodes, edges) = graph("send_email");
    let wf = h.published(nodes, edges).await;

    let ev = event("contact.created", json!({}));
    let early = h.scheduler.start(wf.id, &ev).await.unwrap();
    assert_eq!(early.bound_version, 2);

    let (nodes, edges) = graph("send_sms");
    h.versions.save(wf.id, nodes, edges, "tester", Some("switch to sms".into())).await.unwrap();

    h.clock.advance(Duration::days(1));
    h.resumer().run_due().await.unwrap();
    assert_eq!(h.stored(&early).await.status, ExecutionStatus::Completed);
    assert_eq!((email.call_count(), sms.call_count()), (1, 0));

    let late = h.scheduler.start(wf.id, &ev).await.unwrap();
    assert_eq!(late.bound_version, 3);
}

// ============================================================
// Routing
// ============================================================

#[tokio::test]
async fn goal_ends_the_run_early() {
    let tag = Arc::new(MockAction::succeeding("add_tag"));
    let h = harness(ActionRegistry::new().register("add_tag", tag.clone()));
    h.published(
        vec![
            Node::trigger("t", "deal.won", vec![]),
            Node::goal("g"),
            Node::action("a", "add_tag", Value::Null),
        ],
        vec![e("e1", "t", "g"), e("e2", "g", "a")],
    )
    .await;

    let execution = h.scheduler.handle_event(&event("deal.won", json!({}))).await.unwrap().remove(0);
    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert!(execution.completed_at.is_some());
    assert_eq!(tag.call_count(), 0);
    assert_eq!(execution.logs_for("a").count(), 0);
}

#[tokio::test]
async fn condition_routes_on_merged_action_output() {
    let webhook = Arc::new(MockAction::returning("call_webhook", json!(202)));
    let score = Arc::new(MockAction::returning("update_field", json!({ "score": 80 })));
    let hot = Arc::new(MockAction::succeeding("add_tag"));
    let cold = Arc::new(MockAction::succeeding("remove_tag"));
    let h = harness(
        ActionRegistry::new()
            .register("call_webhook", webhook.clone())
            .register("update_field", score.clone())
            .register("add_tag", hot.clone())
            .register("remove_tag", cold.clone()),
    );
    h.published(
        vec![
            Node::trigger("t", "contact.created", vec![]),
            Node::action("w", "call_webhook", Value::Null),
            Node::action("s", "update_field", Value::Null),
            Node::condition(
                "c",
                ConditionConfig::IfElse(Filter::new("score", Operator::GreaterThan, "50")),
            ),
            Node::action("hot", "add_tag", json!({ "tag": "hot" })),
            Node::action("cold", "remove_tag", json!({ "tag": "hot" })),
        ],
        vec![
            e("e1", "t", "w"),
            e("e2", "w", "s"),
            e("e3", "s", "c"),
            on("e4", "c", "hot", "success"),
            on("e5", "c", "cold", "failure"),
        ],
    )
    .await;

    let execution = h
        .scheduler
        .handle_event(&event("contact.created", json!({ "contact_id": "c-42" })))
        .await
        .unwrap()
        .remove(0);

    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert_eq!((hot.call_count(), cold.call_count()), (1, 0));
    let contexts = hot.contexts();
    let ctx = &contexts[0].context;
    assert_eq!(ctx["contact_id"], "c-42");
    assert_eq!(ctx["score"], 80);
    assert_eq!(ctx["w"], 202);
    assert_eq!(execution.context, *ctx);
}

#[tokio::test]
async fn action_branch_picks_labelled_edge() {
    let email = Arc::new(MockAction::branching("send_email", ActionBranch::Failure));
    let delivered = Arc::new(MockAction::succeeding("add_tag"));
    let bounced = Arc::new(MockAction::succeeding("create_task"));
    let h = harness(
        ActionRegistry::new()
            .register("send_email", email.clone())
            .register("add_tag", delivered.clone())
            .register("create_task", bounced.clone()),
    );
    h.published(
        vec![
            Node::trigger("t", "contact.created", vec![]),
            Node::action("a", "send_email", Value::Null),
            Node::action("ok", "add_tag", Value::Null),
            Node::action("bounce", "create_task", Value::Null),
        ],
        vec![
            e("e1", "t", "a"),
            on("e2", "a", "ok", "success"),
            on("e3", "a", "bounce", "failure"),
        ],
    )
    .await;

    h.scheduler.handle_event(&event("contact.created", json!({}))).await.unwrap();
    assert_eq!((delivered.call_count(), bounced.call_count()), (0, 1));
}

#[tokio::test]
async fn unmatched_switch_fails_the_execution() {
    let h = harness(ActionRegistry::new());
    h.published(
        vec![
            Node::trigger("t", "deal.won", vec![]),
            Node::condition(
                "s",
                ConditionConfig::Switch {
                    field: "plan".into(),
                    cases: vec![SwitchCase { value: "gold".into(), label: "gold".into() }],
                    default_label: None,
                },
            ),
            Node::goal("g"),
        ],
        vec![e("e1", "t", "s"), on("e2", "s", "g", "gold")],
    )
    .await;

    let execution = h
        .scheduler
        .handle_event(&event("deal.won", json!({ "plan": "silver" })))
        .await
        .unwrap()
        .remove(0);
    assert_eq!(execution.status, ExecutionStatus::Failed);
    let last = execution.logs.last().unwrap();
    assert_eq!(last.node_id.as_deref(), Some("s"));
    assert!(last.message.contains("matched no case"), "{}", last.message);
}

// ============================================================
// Failures
// ============================================================

#[tokio::test]
async fn dispatch_error_fails_without_retry() {
    let boom = Arc::new(MockAction::failing("send_sms", "carrier rejected number"));
    let never = Arc::new(MockAction::succeeding("add_tag"));
    let h = harness(
        ActionRegistry::new()
            .register("send_sms", boom.clone())
            .register("add_tag", never.clone()),
    );
    h.published(
        vec![
            Node::trigger("t", "contact.created", vec![]),
            Node::action("sms", "send_sms", Value::Null),
            Node::action("tag", "add_tag", Value::Null),
        ],
        vec![e("e1", "t", "sms"), e("e2", "sms", "tag")],
    )
    .await;

    let execution = h
        .scheduler
        .handle_event(&event("contact.created", json!({})))
        .await
        .unwrap()
        .remove(0);

    assert_eq!(execution.status, ExecutionStatus::Failed);
    assert!(execution.completed_at.is_some());
    assert_eq!(boom.call_count(), 1);
    assert_eq!(never.call_count(), 0);
    let errors = error_logs(&execution);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("carrier rejected number"));
    assert_eq!(h.stored(&execution).await.logs, execution.logs);
}

#[tokio::test]
async fn unknown_action_type_fails_the_execution() {
    let h = harness(ActionRegistry::new());
    h.published(
        vec![
            Node::trigger("t", "contact.created", vec![]),
            Node::action("a", "fax_document", Value::Null),
        ],
        vec![e("e1", "t", "a")],
    )
    .await;

    let execution = h
        .scheduler
        .handle_event(&event("contact.created", json!({})))
        .await
        .unwrap()
        .remove(0);
    assert_eq!(execution.status, ExecutionStatus::Failed);
    assert_eq!(execution.logs.last().and_then(|l| l.node_id.as_deref()), Some("a"));
}

#[tokio::test]
async fn missing_condition_edge_is_an_integrity_failure() {
    let h = harness(ActionRegistry::new());
    let wf = h
        .published_unchecked(
            vec![
                Node::trigger("t", "task.completed", vec![]),
                Node::condition(
                    "c",
                    ConditionConfig::IfElse(Filter::new("overdue", Operator::Equals, "true")),
                ),
                Node::goal("g"),
            ],
            vec![e("e1", "t", "c"), on("e2", "c", "g", "success")],
        )
        .await;

    let execution = h
        .scheduler
        .start(wf.id, &event("task.completed", json!({ "overdue": false })))
        .await
        .unwrap();
    assert_eq!(execution.status, ExecutionStatus::Failed);
    let errors = error_logs(&execution);
    assert!(errors[0].contains("no outgoing 'failure' edge"), "{}", errors[0]);
}

#[tokio::test]
async fn unrepresentable_delay_fails_the_execution() {
    let after = Arc::new(MockAction::succeeding("send_sms"));
    let h = harness(ActionRegistry::new().register("send_sms", after.clone()));
    h.published_unchecked(
        vec![
            Node::trigger("t", "deal.created", vec![]),
            Node::delay("d", DelayConfig::fixed(u32::MAX, DelayUnit::Days)),
            Node::action("a", "send_sms", Value::Null),
        ],
        vec![e("e1", "t", "d"), e("e2", "d", "a")],
    )
    .await;

    let execution = h.scheduler.handle_event(&event("deal.created", json!({}))).await.unwrap().remove(0);
    assert_eq!(execution.status, ExecutionStatus::Failed);
    assert_eq!(after.call_count(), 0);
    assert_eq!(h.queue.len().await.unwrap(), 0);
    let last = execution.logs.last().unwrap();
    assert_eq!((last.node_id.as_deref(), last.level), (Some("d"), LogLevel::Error));
}

#[tokio::test]
async fn loop_without_delay_fails_at_runtime() {
    let a = Arc::new(MockAction::succeeding("add_tag"));
    let b = Arc::new(MockAction::succeeding("remove_tag"));
    let h = harness(
        ActionRegistry::new()
            .register("add_tag", a.clone())
            .register("remove_tag", b.clone()),
    );
    let wf = h
        .published_unchecked(
            vec![
                Node::trigger("t", "contact.created", vec![]),
                Node::action("a", "add_tag", Value::Null),
                Node::action("b", "remove_tag", Value::Null),
            ],
            vec![e("e1", "t", "a"), e("e2", "a", "b"), e("e3", "b", "a")],
        )
        .await;

    let execution = h.scheduler.start(wf.id, &event("contact.created", json!({}))).await.unwrap();
    assert_eq!(execution.status, ExecutionStatus::Failed);
    assert_eq!((a.call_count(), b.call_count()), (1, 1));
    assert!(error_logs(&execution)[0].contains("reached twice"));
}

// ============================================================
// Loops through delays and cancellation
// ============================================================

#[tokio::test]
async fn loop_through_delay_runs_once_per_wake_up() {
    let nudge = Arc::new(MockAction::succeeding("send_email"));
    let h = harness(ActionRegistry::new().register("send_email", nudge.clone()));
    h.published(
        vec![
            Node::trigger("t", "deal.created", vec![]),
            Node::action("a", "send_email", Value::Null),
            Node::delay("d", DelayConfig::fixed(1, DelayUnit::Hours)),
        ],
        vec![e("e1", "t", "a"), e("e2", "a", "d"), e("e3", "d", "a")],
    )
    .await;

    let execution = h.scheduler.handle_event(&event("deal.created", json!({}))).await.unwrap().remove(0);
    assert_eq!(execution.status, ExecutionStatus::Suspended);
    assert_eq!(nudge.call_count(), 1);

    let resumer = h.resumer();
    for round in 2..=3 {
        h.clock.advance(Duration::hours(1));
        assert_eq!(resumer.run_due().await.unwrap(), 1);
        assert_eq!(nudge.call_count(), round);
        assert_eq!(h.stored(&execution).await.status, ExecutionStatus::Suspended);
    }

    let cancelled = h.scheduler.cancel(execution.id).await.unwrap();
    assert_eq!(cancelled.status, ExecutionStatus::Failed);
    assert_eq!(error_logs(&cancelled), vec!["execution cancelled"]);
    assert_eq!(h.queue.len().await.unwrap(), 0);

    h.clock.advance(Duration::hours(1));
    assert_eq!(resumer.run_due().await.unwrap(), 0);
    assert_eq!(nudge.call_count(), 3);
}

#[tokio::test]
async fn cancelling_a_running_execution_stops_before_the_next_node() {
    let canceller = Arc::new(CancelSelf::default());
    let after = Arc::new(MockAction::succeeding("add_tag"));
    let h = harness(
        ActionRegistry::new()
            .register("custom_code", canceller.clone())
            .register("add_tag", after.clone()),
    );
    assert!(canceller.scheduler.set(h.scheduler.clone()).is_ok());
    h.published(
        vec![
            Node::trigger("t", "contact.created", vec![]),
            Node::action("stop", "custom_code", Value::Null),
            Node::action("tag", "add_tag", Value::Null),
        ],
        vec![e("e1", "t", "stop"), e("e2", "stop", "tag")],
    )
    .await;

    let execution = h.scheduler.handle_event(&event("contact.created", json!({}))).await.unwrap().remove(0);
    assert_eq!(execution.status, ExecutionStatus::Failed);
    assert_eq!(after.call_count(), 0);
    let last = execution.logs.last().unwrap();
    assert_eq!((last.node_id.as_deref(), last.message.as_str()), (None, "execution cancelled"));
}

#[tokio::test]
async fn cancel_from_another_scheduler_stops_the_walk() {
    let canceller = Arc::new(CancelSelf::default());
    let email = Arc::new(MockAction::succeeding("send_email"));
    let h = harness(
        ActionRegistry::new()
            .register("custom_code", canceller.clone())
            .register("send_email", email.clone()),
    );
    // A second worker process: same store and queue, its own cancellation registry.
    let other = Arc::new(ExecutionScheduler::new(
        h.store.clone(),
        Arc::new(ActionRegistry::new()),
        h.queue.clone(),
        h.clock.clone(),
    ));
    assert!(canceller.scheduler.set(other).is_ok());
    h.published(
        vec![
            Node::trigger("t", "contact.created", vec![]),
            Node::action("a1", "custom_code", Value::Null),
            Node::action("a2", "send_email", json!({ "template": "welcome" })),
        ],
        vec![e("e1", "t", "a1"), e("e2", "a1", "a2")],
    )
    .await;

    let execution = h.scheduler.handle_event(&event("contact.created", json!({}))).await.unwrap().remove(0);
    assert_eq!(email.call_count(), 0);
    assert_eq!(execution.status, ExecutionStatus::Failed);
    assert_eq!(error_logs(&execution), vec!["execution cancelled"]);

    let stored = h.stored(&execution).await;
    assert_eq!(stored.status, ExecutionStatus::Failed);
    assert!(stored.logs_for("a2").next().is_none());
}

#[tokio::test]
async fn cancel_workflow_fails_every_waiting_execution() {
    let h = harness(ActionRegistry::new());
    let wf = h
        .published(
            vec![
                Node::trigger("t", "deal.created", vec![]),
                Node::delay("d", DelayConfig::fixed(3, DelayUnit::Days)),
                Node::goal("g"),
            ],
            vec![e("e1", "t", "d"), e("e2", "d", "g")],
        )
        .await;
    let ev = event("deal.created", json!({}));
    h.scheduler.handle_event(&ev).await.unwrap();
    h.scheduler.handle_event(&ev).await.unwrap();
    assert_eq!(h.queue.len().await.unwrap(), 2);

    let cancelled = h.scheduler.cancel_workflow(wf.id).await.unwrap();
    assert_eq!(cancelled.len(), 2);
    assert_eq!(h.queue.len().await.unwrap(), 0);
    for execution in h.store.list_executions(wf.id).await.unwrap() {
        assert_eq!(execution.status, ExecutionStatus::Failed);
    }

    // A second pass has nothing left to do.
    assert!(h.scheduler.cancel_workflow(wf.id).await.unwrap().is_empty());
}
