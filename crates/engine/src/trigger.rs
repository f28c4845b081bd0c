//! Decides which published workflows an incoming event starts.

use tracing::{debug, warn};

use crate::filter::FilterEvaluationError;
use crate::models::{Event, Workflow, WorkflowId};

/// Outcome of matching one workflow against one event.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerMatch {
    pub workflow_id: WorkflowId,
    pub matched: bool,
    /// Filters whose configured value could not be used; each counted as `false`.
    pub warnings: Vec<FilterEvaluationError>,
}

/// Stateless matcher over a workflow's Trigger node.
#[derive(Debug, Clone, Copy, Default)]
pub struct TriggerMatcher;

impl TriggerMatcher {
    pub fn new() -> Self {
        Self
    }

    /// A workflow matches when it is published, has exactly one Trigger whose
    /// `event_type` equals the event's, and every filter holds on the payload.
    pub fn evaluate(&self, workflow: &Workflow, event: &Event) -> TriggerMatch {
        let mut warnings = Vec::new();

        let matched = workflow.published
            && workflow.trigger().is_some_and(|trigger| {
                trigger.event_type == event.event_type
                    && trigger
                        .filters
                        .iter()
                        .all(|filter| filter.evaluate_or_false(&event.payload, &mut warnings))
            });

        for warning in &warnings {
            warn!(workflow_id = %workflow.id, event_type = %event.event_type, "trigger filter ignored: {warning}");
        }

        TriggerMatch {
            workflow_id: workflow.id,
            matched,
            warnings,
        }
    }

    /// IDs of every workflow in `workflows` that `event` starts, in input order.
    pub fn match_event(&self, event: &Event, workflows: &[Workflow]) -> Vec<WorkflowId> {
        let ids: Vec<WorkflowId> = workflows
            .iter()
            .map(|wf| self.evaluate(wf, event))
            .filter(|m| m.matched)
            .map(|m| m.workflow_id)
            .collect();
        debug!(event_type = %event.event_type, matched = ids.len(), "trigger matching done");
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{Filter, Operator};
    use crate::models::{Edge, EdgeLabel, Node};
    use chrono::Utc;
    use serde_json::{json, Value};
    use uuid::Uuid;

    fn workflow(published: bool, nodes: Vec<Node>) -> Workflow {
        let now = Utc::now();
        Workflow {
            id: Uuid::new_v4(),
            name: "wf".into(),
            folder_id: None,
            nodes,
            edges: vec![Edge::new("e", "t", "a", EdgeLabel::Default)],
            published,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    fn vip_trigger() -> Node {
        Node::trigger(
            "t",
            "contact.tag_added",
            vec![Filter::new("tag", Operator::Equals, "vip")],
        )
    }

    #[test]
    fn matching_event_on_published_workflow() {
        let wf = workflow(true, vec![vip_trigger(), Node::action("a", "send_email", Value::Null)]);
        let event = Event::new("contact.tag_added", json!({ "tag": "vip", "contact_id": "c-1" }));

        let m = TriggerMatcher::new().evaluate(&wf, &event);
        assert!(m.matched);
        assert!(m.warnings.is_empty());
    }

    #[test]
    fn unpublished_or_wrong_type_or_failed_filter_do_not_match() {
        let matcher = TriggerMatcher::new();
        let vip = Event::new("contact.tag_added", json!({ "tag": "vip" }));

        assert!(!matcher.evaluate(&workflow(false, vec![vip_trigger()]), &vip).matched);
        assert!(!matcher
            .evaluate(&workflow(true, vec![vip_trigger()]), &Event::new("contact.created", json!({ "tag": "vip" })))
            .matched);
        assert!(!matcher
            .evaluate(&workflow(true, vec![vip_trigger()]), &Event::new("contact.tag_added", json!({ "tag": "lead" })))
            .matched);
    }

    #[test]
    fn workflows_without_exactly_one_trigger_never_match() {
        let matcher = TriggerMatcher::new();
        let event = Event::new("contact.tag_added", json!({ "tag": "vip" }));
        let none = workflow(true, vec![Node::goal("g")]);
        let two = workflow(true, vec![vip_trigger(), Node::trigger("t2", "contact.tag_added", vec![])]);
        assert!(matcher.match_event(&event, &[none, two]).is_empty());
    }

    #[test]
    fn broken_filter_does_not_stop_other_workflows_matching() {
        let broken = workflow(
            true,
            vec![Node::trigger(
                "t",
                "deal.created",
                vec![Filter::new("amount", Operator::Between, "lots")],
            )],
        );
        let healthy = workflow(
            true,
            vec![Node::trigger(
                "t",
                "deal.created",
                vec![Filter::new("amount", Operator::Between, "5,50")],
            )],
        );
        let event = Event::new("deal.created", json!({ "amount": 10 }));

        let matched = TriggerMatcher::new().match_event(&event, &[broken, healthy.clone()]);
        assert_eq!(matched, vec![healthy.id]);
    }

    #[test]
    fn broken_filter_counts_as_false_and_is_reported() {
        let wf = workflow(
            true,
            vec![Node::trigger(
                "t",
                "deal.created",
                vec![Filter::new("amount", Operator::Between, "lots")],
            )],
        );
        let m = TriggerMatcher::new().evaluate(&wf, &Event::new("deal.created", json!({ "amount": 10 })));
        assert!(!m.matched);
        assert_eq!(m.warnings.len(), 1);
        assert_eq!(m.warnings[0].field, "amount");
    }

    #[test]
    fn match_event_keeps_input_order() {
        let a = workflow(true, vec![vip_trigger()]);
        let b = workflow(true, vec![Node::trigger("t", "contact.tag_added", vec![])]);
        let c = workflow(true, vec![Node::trigger("t", "deal.won", vec![])]);
        let event = Event::new("contact.tag_added", json!({ "tag": "vip" }));
        assert_eq!(
            TriggerMatcher::new().match_event(&event, &[a.clone(), b.clone(), c]),
            vec![a.id, b.id]
        );
    }
}
