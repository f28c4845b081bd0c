//! Graph model and validation.
//!
//! [`Graph`] is an immutable, id-indexed view over a snapshot's nodes and
//! edges; the scheduler walks it, the validators inspect it.
//!
//! Rules enforced:
//! 1. [`validate_structure`] (save): node IDs are non-empty and unique, edge
//!    IDs are unique, node configs are usable.
//! 2. [`validate_integrity`] (publish): everything in (1), plus every edge
//!    references existing nodes, exactly one Trigger exists, Trigger and Delay
//!    nodes only use `default` edges, every Condition wires each label it can
//!    produce, no `(node, label)` pair has two edges, and every cycle passes
//!    through a Delay node.
//!
//! Both return the full list of violations rather than stopping at the first.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::Violation;
use crate::models::{
    ConditionConfig, DelayConfig, Edge, EdgeLabel, Node, NodeConfig, NodeKind, WorkflowVersion,
};

/// Immutable snapshot of a workflow graph, indexed by node ID.
#[derive(Debug, Clone)]
pub struct Graph {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    index: HashMap<String, usize>,
    outgoing: HashMap<String, Vec<usize>>,
}

impl Graph {
    /// Build the index. On duplicate node IDs the first node wins; run
    /// [`validate_structure`] to reject such graphs.
    pub fn new(nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        let mut index = HashMap::with_capacity(nodes.len());
        for (i, node) in nodes.iter().enumerate() {
            index.entry(node.id.clone()).or_insert(i);
        }

        let mut outgoing: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, edge) in edges.iter().enumerate() {
            outgoing.entry(edge.source.clone()).or_default().push(i);
        }

        Self { nodes, edges, index, outgoing }
    }

    pub fn from_version(version: &WorkflowVersion) -> Self {
        Self::new(version.nodes.clone(), version.edges.clone())
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// The unique entry point.
    pub fn trigger(&self) -> Result<&Node, Violation> {
        let triggers: Vec<&Node> = self
            .nodes
            .iter()
            .filter(|n| n.kind() == NodeKind::Trigger)
            .collect();
        match triggers.as_slice() {
            [one] => Ok(one),
            [] => Err(Violation::MissingTrigger),
            many => Err(Violation::MultipleTriggers(
                many.iter().map(|n| n.id.clone()).collect(),
            )),
        }
    }

    /// Edges leaving `node_id`, in definition order.
    pub fn outgoing(&self, node_id: &str) -> impl Iterator<Item = &Edge> + '_ {
        self.outgoing
            .get(node_id)
            .into_iter()
            .flatten()
            .map(|&i| &self.edges[i])
    }

    /// First edge leaving `node_id` with `label`.
    pub fn edge_for(&self, node_id: &str, label: &EdgeLabel) -> Option<&Edge> {
        self.outgoing(node_id).find(|e| &e.label == label)
    }
}

/// Save-time checks.
///
/// # Errors
/// Every [`Violation`] found, in node-then-edge order.
pub fn validate_structure(nodes: &[Node], edges: &[Edge]) -> Result<(), Vec<Violation>> {
    let violations = structure_violations(nodes, edges);
    if violations.is_empty() {
        Ok(())
    } else {
        Err(violations)
    }
}

/// Publish-time checks (includes the save-time ones).
///
/// # Errors
/// Every [`Violation`] found.
pub fn validate_integrity(nodes: &[Node], edges: &[Edge]) -> Result<(), Vec<Violation>> {
    let mut violations = structure_violations(nodes, edges);
    let graph = Graph::new(nodes.to_vec(), edges.to_vec());

    // -----------------------------------------------------------------------
    // Edge endpoints
    // -----------------------------------------------------------------------
    for edge in edges {
        if graph.node(&edge.source).is_none() {
            violations.push(Violation::DanglingEdge {
                edge_id: edge.id.clone(),
                node_id: edge.source.clone(),
                side: "source",
            });
        }
        if graph.node(&edge.target).is_none() {
            violations.push(Violation::DanglingEdge {
                edge_id: edge.id.clone(),
                node_id: edge.target.clone(),
                side: "target",
            });
        }
    }

    // -----------------------------------------------------------------------
    // Exactly one trigger
    // -----------------------------------------------------------------------
    if let Err(v) = graph.trigger() {
        violations.push(v);
    }

    // -----------------------------------------------------------------------
    // Per-node branch wiring
    // -----------------------------------------------------------------------
    for node in nodes {
        let mut by_label: Vec<(&EdgeLabel, Vec<String>)> = Vec::new();
        for edge in graph.outgoing(&node.id) {
            match by_label.iter_mut().find(|(l, _)| *l == &edge.label) {
                Some((_, ids)) => ids.push(edge.id.clone()),
                None => by_label.push((&edge.label, vec![edge.id.clone()])),
            }
        }

        for (label, edge_ids) in &by_label {
            if edge_ids.len() > 1 {
                violations.push(Violation::AmbiguousBranch {
                    node_id: node.id.clone(),
                    label: (*label).clone(),
                    edge_ids: edge_ids.clone(),
                });
            }
        }

        match &node.config {
            NodeConfig::Trigger(_) | NodeConfig::Delay(_) => {
                for edge in graph.outgoing(&node.id) {
                    if edge.label != EdgeLabel::Default {
                        violations.push(Violation::UnexpectedEdgeLabel {
                            edge_id: edge.id.clone(),
                            node_id: node.id.clone(),
                            label: edge.label.clone(),
                        });
                    }
                }
            }
            NodeConfig::Condition(cfg) => {
                for label in cfg.producible_labels() {
                    if !by_label.iter().any(|(l, _)| **l == label) {
                        violations.push(Violation::MissingBranch {
                            node_id: node.id.clone(),
                            label,
                        });
                    }
                }
            }
            NodeConfig::Action(_) | NodeConfig::Goal(_) => {}
        }
    }

    // -----------------------------------------------------------------------
    // Cycles that never yield
    // -----------------------------------------------------------------------
    if let Some(cycle) = delay_free_cycle(&graph) {
        violations.push(Violation::UnconditionalCycle(cycle));
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(violations)
    }
}

fn structure_violations(nodes: &[Node], edges: &[Edge]) -> Vec<Violation> {
    let mut violations = Vec::new();

    let mut seen_nodes: HashSet<&str> = HashSet::new();
    for node in nodes {
        if node.id.trim().is_empty() {
            violations.push(Violation::EmptyNodeId);
        } else if !seen_nodes.insert(node.id.as_str()) {
            violations.push(Violation::DuplicateNodeId(node.id.clone()));
        }
        if let Some(reason) = config_problem(&node.config) {
            violations.push(Violation::InvalidConfig {
                node_id: node.id.clone(),
                reason,
            });
        }
    }

    let mut seen_edges: HashSet<&str> = HashSet::new();
    for edge in edges {
        if !seen_edges.insert(edge.id.as_str()) {
            violations.push(Violation::DuplicateEdgeId(edge.id.clone()));
        }
    }

    violations
}

fn config_problem(config: &NodeConfig) -> Option<String> {
    match config {
        NodeConfig::Trigger(cfg) if cfg.event_type.trim().is_empty() => {
            Some("trigger has no event_type".into())
        }
        NodeConfig::Trigger(cfg) => cfg
            .filters
            .iter()
            .position(|f| f.field.trim().is_empty())
            .map(|i| format!("filter #{i} has no field")),
        NodeConfig::Condition(ConditionConfig::IfElse(filter)) if filter.field.trim().is_empty() => {
            Some("condition has no field".into())
        }
        NodeConfig::Condition(ConditionConfig::Switch { field, cases, .. }) => {
            if field.trim().is_empty() {
                Some("switch has no field".into())
            } else if cases.is_empty() {
                Some("switch has no cases".into())
            } else {
                None
            }
        }
        NodeConfig::Action(cfg) if cfg.action_type.trim().is_empty() => {
            Some("action has no action_type".into())
        }
        NodeConfig::Delay(cfg @ DelayConfig::Fixed { .. }) if cfg.duration().is_none() => Some(format!(
            "fixed delay is longer than {} days",
            DelayConfig::MAX_FIXED_DAYS
        )),
        _ => None,
    }
}

/// Kahn's algorithm over the graph with Delay out-edges removed. Whatever
/// cannot be sorted sits on, or downstream of, a delay-free cycle; peeling
/// off nodes with no remaining successors leaves just the cycles.
fn delay_free_cycle(graph: &Graph) -> Option<Vec<String>> {
    let yields = |id: &str| graph.node(id).is_some_and(|n| n.kind() == NodeKind::Delay);

    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut in_degree: HashMap<&str, usize> = HashMap::new();
    for node in graph.nodes() {
        adjacency.entry(node.id.as_str()).or_default();
        in_degree.entry(node.id.as_str()).or_insert(0);
    }
    for edge in graph.edges() {
        if yields(&edge.source) || graph.node(&edge.source).is_none() || graph.node(&edge.target).is_none() {
            continue;
        }
        adjacency
            .entry(edge.source.as_str())
            .or_default()
            .push(edge.target.as_str());
        *in_degree.entry(edge.target.as_str()).or_insert(0) += 1;
    }

    let mut queue: VecDeque<&str> = in_degree
        .iter()
        .filter(|&(_, &d)| d == 0)
        .map(|(&id, _)| id)
        .collect();
    let mut sorted: HashSet<&str> = HashSet::with_capacity(in_degree.len());

    while let Some(node_id) = queue.pop_front() {
        sorted.insert(node_id);
        if let Some(neighbours) = adjacency.get(node_id) {
            for &neighbour in neighbours {
                let deg = in_degree.entry(neighbour).or_insert(0);
                *deg -= 1;
                if *deg == 0 {
                    queue.push_back(neighbour);
                }
            }
        }
    }

    if sorted.len() == in_degree.len() {
        return None;
    }

    // Remaining nodes; drop those that only lead out of the tangle.
    let mut remaining: HashSet<&str> = in_degree
        .keys()
        .copied()
        .filter(|id| !sorted.contains(id))
        .collect();
    loop {
        let sinks: Vec<&str> = remaining
            .iter()
            .copied()
            .filter(|id| {
                !adjacency
                    .get(id)
                    .is_some_and(|next| next.iter().any(|n| remaining.contains(n)))
            })
            .collect();
        if sinks.is_empty() {
            break;
        }
        for id in sinks {
            remaining.remove(&id);
        }
    }

    let mut cycle: Vec<String> = remaining.into_iter().map(str::to_owned).collect();
    cycle.sort();
    Some(cycle)
}
