//! Core domain models for the automation engine.
//!
//! These types are the source of truth for what a workflow looks like in
//! memory. They serialise to the JSON shapes the editor and dashboards read:
//! nodes are `{id, kind, config}`, edges are `{id, source, target, label}`.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::filter::{scalar_string, Filter};

pub type WorkflowId = Uuid;
pub type ExecutionId = Uuid;

// ---------------------------------------------------------------------------
// Nodes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Trigger,
    Condition,
    Action,
    Delay,
    Goal,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Trigger   => "trigger",
            Self::Condition => "condition",
            Self::Action    => "action",
            Self::Delay     => "delay",
            Self::Goal      => "goal",
        };
        f.write_str(s)
    }
}

/// Entry point: which event starts the workflow and which payloads qualify.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerConfig {
    pub event_type: String,
    #[serde(default)]
    pub filters: Vec<Filter>,
}

/// One arm of a switch condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchCase {
    #[serde(deserialize_with = "scalar_string")]
    pub value: String,
    pub label: EdgeLabel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConditionConfig {
    /// Boolean predicate: `success` when true, `failure` when false.
    IfElse(Filter),
    /// First case whose value equals the field wins; otherwise `default_label`.
    Switch {
        field: String,
        cases: Vec<SwitchCase>,
        #[serde(default)]
        default_label: Option<EdgeLabel>,
    },
}

impl ConditionConfig {
    /// Every label this condition can hand back to the scheduler.
    pub fn producible_labels(&self) -> Vec<EdgeLabel> {
        match self {
            Self::IfElse(_) => vec![EdgeLabel::Success, EdgeLabel::Failure],
            Self::Switch { cases, default_label, .. } => {
                let mut labels: Vec<EdgeLabel> = Vec::with_capacity(cases.len() + 1);
                for label in cases.iter().map(|c| &c.label).chain(default_label.iter()) {
                    if !labels.contains(label) {
                        labels.push(label.clone());
                    }
                }
                labels
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionConfig {
    pub action_type: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelayUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
    Weeks,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DelayConfig {
    /// Wait a fixed amount of time after the delay is reached.
    Fixed { amount: u32, unit: DelayUnit },
    /// Wait until an absolute instant.
    Until { timestamp: DateTime<Utc> },
}

impl DelayConfig {
    /// Longest fixed delay a workflow may declare.
    pub const MAX_FIXED_DAYS: i64 = 36_500;

    pub fn fixed(amount: u32, unit: DelayUnit) -> Self {
        Self::Fixed { amount, unit }
    }

    /// Length of a fixed delay; `None` for `until` delays and for amounts
    /// past [`Self::MAX_FIXED_DAYS`].
    pub fn duration(&self) -> Option<Duration> {
        let Self::Fixed { amount, unit } = self else {
            return None;
        };
        let amount = i64::from(*amount);
        let duration = match unit {
            DelayUnit::Seconds => Duration::try_seconds(amount),
            DelayUnit::Minutes => Duration::try_minutes(amount),
            DelayUnit::Hours   => Duration::try_hours(amount),
            DelayUnit::Days    => Duration::try_days(amount),
            DelayUnit::Weeks   => Duration::try_weeks(amount),
        }?;
        (duration <= Duration::days(Self::MAX_FIXED_DAYS)).then_some(duration)
    }

    /// When an execution reaching this delay at `now` should wake up, or
    /// `None` if that instant cannot be represented.
    pub fn resume_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Fixed { .. } => now.checked_add_signed(self.duration()?),
            Self::Until { timestamp } => Some(*timestamp),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GoalConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Kind-specific configuration; the variant is the node's kind.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeConfig {
    Trigger(TriggerConfig),
    Condition(ConditionConfig),
    Action(ActionConfig),
    Delay(DelayConfig),
    Goal(GoalConfig),
}

impl NodeConfig {
    pub fn kind(&self) -> NodeKind {
        match self {
            Self::Trigger(_)   => NodeKind::Trigger,
            Self::Condition(_) => NodeKind::Condition,
            Self::Action(_)    => NodeKind::Action,
            Self::Delay(_)     => NodeKind::Delay,
            Self::Goal(_)      => NodeKind::Goal,
        }
    }
}

/// A single step in the workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawNode", into = "RawNode")]
pub struct Node {
    /// Unique identifier within this workflow (referenced by edges).
    pub id: String,
    pub config: NodeConfig,
}

impl Node {
    pub fn kind(&self) -> NodeKind {
        self.config.kind()
    }

    pub fn trigger(id: impl Into<String>, event_type: impl Into<String>, filters: Vec<Filter>) -> Self {
        Self {
            id: id.into(),
            config: NodeConfig::Trigger(TriggerConfig {
                event_type: event_type.into(),
                filters,
            }),
        }
    }

    pub fn condition(id: impl Into<String>, config: ConditionConfig) -> Self {
        Self { id: id.into(), config: NodeConfig::Condition(config) }
    }

    pub fn action(id: impl Into<String>, action_type: impl Into<String>, params: Value) -> Self {
        Self {
            id: id.into(),
            config: NodeConfig::Action(ActionConfig {
                action_type: action_type.into(),
                params,
            }),
        }
    }

    pub fn delay(id: impl Into<String>, config: DelayConfig) -> Self {
        Self { id: id.into(), config: NodeConfig::Delay(config) }
    }

    pub fn goal(id: impl Into<String>) -> Self {
        Self { id: id.into(), config: NodeConfig::Goal(GoalConfig::default()) }
    }
}

/// Wire shape of a node: `config` is parsed according to `kind`.
#[derive(Serialize, Deserialize)]
struct RawNode {
    id: String,
    kind: NodeKind,
    #[serde(default)]
    config: Value,
}

impl TryFrom<RawNode> for Node {
    type Error = String;

    fn try_from(raw: RawNode) -> Result<Self, Self::Error> {
        fn parse<T: serde::de::DeserializeOwned>(raw: &RawNode) -> Result<T, String> {
            serde_json::from_value(raw.config.clone()).map_err(|e| {
                format!("node '{}': invalid {} config: {e}", raw.id, raw.kind)
            })
        }

        let config = match raw.kind {
            NodeKind::Trigger   => NodeConfig::Trigger(parse(&raw)?),
            NodeKind::Condition => NodeConfig::Condition(parse(&raw)?),
            NodeKind::Action    => NodeConfig::Action(parse(&raw)?),
            NodeKind::Delay     => NodeConfig::Delay(parse(&raw)?),
            NodeKind::Goal if raw.config.is_null() => NodeConfig::Goal(GoalConfig::default()),
            NodeKind::Goal      => NodeConfig::Goal(parse(&raw)?),
        };
        Ok(Node { id: raw.id, config })
    }
}

impl From<Node> for RawNode {
    fn from(node: Node) -> Self {
        let kind = node.kind();
        let config = match &node.config {
            NodeConfig::Trigger(c)   => serde_json::to_value(c),
            NodeConfig::Condition(c) => serde_json::to_value(c),
            NodeConfig::Action(c)    => serde_json::to_value(c),
            NodeConfig::Delay(c)     => serde_json::to_value(c),
            NodeConfig::Goal(c)      => serde_json::to_value(c),
        }
        // Plain data structs with string keys always serialise.
        .unwrap_or(Value::Null);
        RawNode { id: node.id, kind, config }
    }
}

// ---------------------------------------------------------------------------
// Edges
// ---------------------------------------------------------------------------

/// Which branch an edge represents.
///
/// `success`/`failure`/`default` are built in; switch conditions may route on
/// any other label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EdgeLabel {
    Success,
    Failure,
    #[default]
    Default,
    Case(String),
}

impl EdgeLabel {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Default => "default",
            Self::Case(s) => s,
        }
    }
}

impl From<String> for EdgeLabel {
    fn from(s: String) -> Self {
        match s.as_str() {
            "success" => Self::Success,
            "failure" => Self::Failure,
            "default" => Self::Default,
            _ => Self::Case(s),
        }
    }
}

impl From<&str> for EdgeLabel {
    fn from(s: &str) -> Self {
        Self::from(s.to_owned())
    }
}

impl From<EdgeLabel> for String {
    fn from(label: EdgeLabel) -> Self {
        label.as_str().to_owned()
    }
}

impl fmt::Display for EdgeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Directed, labelled edge from one node to another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub label: EdgeLabel,
}

impl Edge {
    pub fn new(
        id: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
        label: EdgeLabel,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            label,
        }
    }
}

// ---------------------------------------------------------------------------
// Workflow + versions
// ---------------------------------------------------------------------------

/// A workflow and its current draft graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: WorkflowId,
    pub name: String,
    /// Organisational only; owned by the folder hierarchy outside this crate.
    pub folder_id: Option<Uuid>,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub published: bool,
    /// Latest saved version; the draft graph always equals that snapshot.
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Workflow {
    /// Config of the single Trigger node, if the graph has exactly one.
    pub fn trigger(&self) -> Option<&TriggerConfig> {
        let mut triggers = self.nodes.iter().filter_map(|n| match &n.config {
            NodeConfig::Trigger(cfg) => Some(cfg),
            _ => None,
        });
        match (triggers.next(), triggers.next()) {
            (Some(cfg), None) => Some(cfg),
            _ => None,
        }
    }
}

/// Immutable snapshot in a workflow's append-only history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowVersion {
    pub workflow_id: WorkflowId,
    pub version: u32,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// A domain event from the CRM, e.g. `contact.created` or `deal.won`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub payload: Map<String, Value>,
}

impl Event {
    /// Build an event; a non-object `payload` yields an empty payload.
    pub fn new(event_type: impl Into<String>, payload: Value) -> Self {
        let payload = match payload {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            event_type: event_type.into(),
            payload,
        }
    }
}

// ---------------------------------------------------------------------------
// Executions
// ---------------------------------------------------------------------------

/// Lifecycle of one execution instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Queued,
    Running,
    Suspended,
    Completed,
    Failed,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queued    => write!(f, "queued"),
            Self::Running   => write!(f, "running"),
            Self::Suspended => write!(f, "suspended"),
            Self::Completed => write!(f, "completed"),
            Self::Failed    => write!(f, "failed"),
        }
    }
}

impl FromStr for ExecutionStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued"    => Ok(Self::Queued),
            "running"   => Ok(Self::Running),
            "suspended" => Ok(Self::Suspended),
            "completed" => Ok(Self::Completed),
            "failed"    => Ok(Self::Failed),
            other       => Err(format!("unknown execution status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info    => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error   => write!(f, "error"),
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info"    => Ok(Self::Info),
            "warning" => Ok(Self::Warning),
            "error"   => Ok(Self::Error),
            other     => Err(format!("unknown log level: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    /// `None` for execution-level entries such as cancellation.
    pub node_id: Option<String>,
    pub level: LogLevel,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Where a suspended execution picks up again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suspension {
    /// The Delay node that suspended the run.
    pub delay_node: String,
    /// Node after the delay; `None` when the delay is a dead end.
    pub resume_node: Option<String>,
    pub resume_at: DateTime<Utc>,
}

/// One run of a workflow graph, bound to a specific version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowExecution {
    pub id: ExecutionId,
    pub workflow_id: WorkflowId,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub trigger_type: String,
    pub trigger_data: Value,
    pub bound_version: u32,
    pub logs: Vec<LogEntry>,
    /// Trigger payload plus values attached by actions during this run.
    pub context: Map<String, Value>,
    /// Present iff `status == Suspended`.
    pub suspension: Option<Suspension>,
}

impl WorkflowExecution {
    /// A fresh `queued` execution for `event`, bound to `bound_version`.
    pub fn queued(
        workflow_id: WorkflowId,
        bound_version: u32,
        event: &Event,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow_id,
            status: ExecutionStatus::Queued,
            started_at: now,
            completed_at: None,
            trigger_type: event.event_type.clone(),
            trigger_data: Value::Object(event.payload.clone()),
            bound_version,
            logs: Vec::new(),
            context: event.payload.clone(),
            suspension: None,
        }
    }

    /// Wall-clock duration, once both timestamps exist.
    pub fn duration_ms(&self) -> Option<i64> {
        self.completed_at
            .map(|done| (done - self.started_at).num_milliseconds())
    }

    /// Log entries attached to `node_id`.
    pub fn logs_for<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a LogEntry> + 'a {
        self.logs
            .iter()
            .filter(move |entry| entry.node_id.as_deref() == Some(node_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Operator;
    use serde_json::json;

    #[test]
    fn node_round_trips_through_wire_shape() {
        let raw = json!({
            "id": "t1",
            "kind": "trigger",
            "config": {
                "event_type": "contact.tag_added",
                "filters": [{ "field": "tag", "operator": "equals", "value": "vip" }]
            }
        });
        let node: Node = serde_json::from_value(raw.clone()).expect("valid trigger");
        assert_eq!(node.kind(), NodeKind::Trigger);
        match &node.config {
            NodeConfig::Trigger(cfg) => {
                assert_eq!(cfg.filters[0].operator, Operator::Equals);
                assert_eq!(cfg.filters[0].value, "vip");
            }
            other => panic!("unexpected config {other:?}"),
        }
        assert_eq!(serde_json::to_value(&node).unwrap(), raw);
    }

    #[test]
    fn malformed_config_names_the_node() {
        let raw = json!({ "id": "a1", "kind": "action", "config": { "params": {} } });
        let err = serde_json::from_value::<Node>(raw).unwrap_err().to_string();
        assert!(err.contains("node 'a1'"), "{err}");
        assert!(err.contains("action_type"), "{err}");
    }

    #[test]
    fn goal_config_is_optional_and_numbers_become_strings() {
        let goal: Node = serde_json::from_value(json!({ "id": "g", "kind": "goal" })).unwrap();
        assert_eq!(goal, Node::goal("g"));

        let cond: Node = serde_json::from_value(json!({
            "id": "c",
            "kind": "condition",
            "config": { "type": "switch", "field": "score", "cases": [{ "value": 10, "label": "ten" }] }
        }))
        .unwrap();
        match cond.config {
            NodeConfig::Condition(ConditionConfig::Switch { cases, .. }) => {
                assert_eq!(cases[0].value, "10");
                assert_eq!(cases[0].label, EdgeLabel::Case("ten".into()));
            }
            other => panic!("unexpected config {other:?}"),
        }
    }

    #[test]
    fn edge_label_defaults_and_custom_labels() {
        let edge: Edge =
            serde_json::from_value(json!({ "id": "e", "source": "a", "target": "b" })).unwrap();
        assert_eq!(edge.label, EdgeLabel::Default);
        assert_eq!(EdgeLabel::from("failure"), EdgeLabel::Failure);
        assert_eq!(String::from(EdgeLabel::Case("gold".into())), "gold");
    }

    #[test]
    fn fixed_and_until_delays() {
        let now = Utc::now();
        assert_eq!(
            DelayConfig::fixed(2, DelayUnit::Days).resume_at(now),
            Some(now + Duration::days(2))
        );
        let at = now + Duration::hours(5);
        assert_eq!(DelayConfig::Until { timestamp: at }.resume_at(now), Some(at));
    }

    #[test]
    fn oversized_fixed_delay_has_no_resume_time() {
        let now = Utc::now();
        let huge = DelayConfig::fixed(u32::MAX, DelayUnit::Days);
        assert_eq!(huge.duration(), None);
        assert_eq!(huge.resume_at(now), None);

        let longest = DelayConfig::fixed(36_500, DelayUnit::Days);
        assert_eq!(longest.duration(), Some(Duration::days(36_500)));
        assert!(DelayConfig::fixed(36_501, DelayUnit::Days).duration().is_none());
    }

    #[test]
    fn switch_labels_are_deduplicated() {
        let cfg = ConditionConfig::Switch {
            field: "plan".into(),
            cases: vec![
                SwitchCase { value: "gold".into(), label: "premium".into() },
                SwitchCase { value: "platinum".into(), label: "premium".into() },
            ],
            default_label: Some(EdgeLabel::Default),
        };
        assert_eq!(
            cfg.producible_labels(),
            vec![EdgeLabel::Case("premium".into()), EdgeLabel::Default]
        );
    }
}
