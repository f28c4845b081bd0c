//! Picks the outgoing label of a Condition node.

use serde_json::{Map, Value};

use crate::error::{EngineError, Violation};
use crate::filter::{normalize, resolve, FilterEvaluationError};
use crate::models::{ConditionConfig, EdgeLabel};

/// The branch chosen by a condition, plus any filter warnings raised on the way.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub label: EdgeLabel,
    pub warnings: Vec<FilterEvaluationError>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ConditionEvaluator;

impl ConditionEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// Evaluate `config` against the execution context.
    ///
    /// If/else yields `success` or `failure`; an unusable filter value counts
    /// as `failure` and is reported in [`Evaluation::warnings`]. A switch yields
    /// the label of the first case equal to the field, else its default label.
    ///
    /// # Errors
    /// [`EngineError::GraphIntegrity`] when a switch matches no case and has no
    /// default label.
    pub fn evaluate(
        &self,
        node_id: &str,
        config: &ConditionConfig,
        context: &Map<String, Value>,
    ) -> Result<Evaluation, EngineError> {
        match config {
            ConditionConfig::IfElse(filter) => {
                let mut warnings = Vec::new();
                let label = if filter.evaluate_or_false(context, &mut warnings) {
                    EdgeLabel::Success
                } else {
                    EdgeLabel::Failure
                };
                Ok(Evaluation { label, warnings })
            }
            ConditionConfig::Switch { field, cases, default_label } => {
                let actual = resolve(context, field).map(normalize);
                let hit = actual
                    .as_deref()
                    .and_then(|value| cases.iter().find(|case| case.value == value));

                match (hit, default_label) {
                    (Some(case), _) => Ok(Evaluation { label: case.label.clone(), warnings: vec![] }),
                    (None, Some(label)) => Ok(Evaluation { label: label.clone(), warnings: vec![] }),
                    (None, None) => Err(EngineError::GraphIntegrity(vec![
                        Violation::NoMatchingCase { node_id: node_id.to_owned() },
                    ])),
                }
            }
        }
    }
}
