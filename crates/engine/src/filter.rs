//! The operator table shared by trigger filters and condition nodes.
//!
//! A [`Filter`] compares one field of a key/value source (an event payload or
//! an execution context) against a configured string value:
//!
//! | operator                     | semantics |
//! |------------------------------|-----------|
//! | `equals` / `not_equals`      | string equality after normalising both sides |
//! | `contains` / `not_contains`  | substring for scalars, membership for lists |
//! | `greater_than` / `less_than` | numeric; non-numeric fields are `false` |
//! | `between`                    | `"min,max"`, inclusive on both ends |
//! | `in` / `not_in`              | `"v1,v2,..."` membership |
//!
//! A configured value that cannot be parsed for its operator is a
//! [`FilterEvaluationError`]. Callers treat it as `false` for that filter
//! only and surface it as a warning.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    GreaterThan,
    LessThan,
    Between,
    In,
    NotIn,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Equals      => "equals",
            Self::NotEquals   => "not_equals",
            Self::Contains    => "contains",
            Self::NotContains => "not_contains",
            Self::GreaterThan => "greater_than",
            Self::LessThan    => "less_than",
            Self::Between     => "between",
            Self::In          => "in",
            Self::NotIn       => "not_in",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The configured value of a filter could not be used with its operator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("filter on '{field}' ({operator}) has unusable value '{value}': {reason}")]
pub struct FilterEvaluationError {
    pub field: String,
    pub operator: Operator,
    pub value: String,
    pub reason: String,
}

/// `{field, operator, value}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    /// Key in the source map; dotted paths reach into nested objects.
    pub field: String,
    pub operator: Operator,
    #[serde(deserialize_with = "scalar_string")]
    pub value: String,
}

impl Filter {
    pub fn new(field: impl Into<String>, operator: Operator, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }

    /// Evaluate against `source`.
    ///
    /// # Errors
    /// [`FilterEvaluationError`] when the configured value is unusable for
    /// the operator (e.g. `between` without exactly two numbers).
    pub fn evaluate(&self, source: &Map<String, Value>) -> Result<bool, FilterEvaluationError> {
        let actual = resolve(source, &self.field);

        let result = match self.operator {
            Operator::Equals => actual.is_some_and(|v| normalize(v) == self.value),
            Operator::NotEquals => actual.map_or(true, |v| normalize(v) != self.value),
            Operator::Contains => actual.is_some_and(|v| contains(v, &self.value)),
            Operator::NotContains => actual.map_or(true, |v| !contains(v, &self.value)),
            Operator::GreaterThan => {
                let bound = self.number(self.value.trim())?;
                actual.and_then(as_number).is_some_and(|n| n > bound)
            }
            Operator::LessThan => {
                let bound = self.number(self.value.trim())?;
                actual.and_then(as_number).is_some_and(|n| n < bound)
            }
            Operator::Between => {
                let (min, max) = self.range()?;
                actual
                    .and_then(as_number)
                    .is_some_and(|n| min <= n && n <= max)
            }
            Operator::In => {
                let set = self.list()?;
                actual.is_some_and(|v| member_of(v, &set))
            }
            Operator::NotIn => {
                let set = self.list()?;
                actual.map_or(true, |v| !member_of(v, &set))
            }
        };
        Ok(result)
    }

    /// Evaluate, collecting a configuration problem into `warnings` and
    /// treating it as `false`.
    pub fn evaluate_or_false(
        &self,
        source: &Map<String, Value>,
        warnings: &mut Vec<FilterEvaluationError>,
    ) -> bool {
        self.evaluate(source).unwrap_or_else(|err| {
            warnings.push(err);
            false
        })
    }

    fn error(&self, reason: impl Into<String>) -> FilterEvaluationError {
        FilterEvaluationError {
            field: self.field.clone(),
            operator: self.operator,
            value: self.value.clone(),
            reason: reason.into(),
        }
    }

    fn number(&self, raw: &str) -> Result<f64, FilterEvaluationError> {
        raw.parse::<f64>()
            .ok()
            .filter(|n| n.is_finite())
            .ok_or_else(|| self.error(format!("'{raw}' is not a number")))
    }

    fn range(&self) -> Result<(f64, f64), FilterEvaluationError> {
        let parts: Vec<&str> = self.value.split(',').map(str::trim).collect();
        match parts.as_slice() {
            [min, max] => Ok((self.number(min)?, self.number(max)?)),
            _ => Err(self.error("expected \"min,max\"")),
        }
    }

    fn list(&self) -> Result<Vec<&str>, FilterEvaluationError> {
        let items: Vec<&str> = self
            .value
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        if items.is_empty() {
            return Err(self.error("expected a comma-separated list"));
        }
        Ok(items)
    }
}

/// Look up `path` in `source`: the exact key first, then a dotted path.
/// JSON `null` counts as absent.
pub fn resolve<'a>(source: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    if let Some(v) = source.get(path) {
        return (!v.is_null()).then_some(v);
    }

    let mut segments = path.split('.');
    let mut current = source.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    (!current.is_null()).then_some(current)
}

/// String form used by every comparison: strings verbatim, whole floats
/// without a fraction (`5.0` → `"5"`), everything else as compact JSON.
pub fn normalize(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
            _ => n.to_string(),
        },
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    }
}

fn contains(actual: &Value, needle: &str) -> bool {
    match actual {
        Value::Array(items) => items.iter().any(|item| normalize(item) == needle),
        other => normalize(other).contains(needle),
    }
}

fn member_of(actual: &Value, set: &[&str]) -> bool {
    match actual {
        Value::Array(items) => items.iter().any(|item| set.contains(&normalize(item).as_str())),
        other => set.contains(&normalize(other).as_str()),
    }
}

/// Accept strings, numbers and booleans for fields the editor stores as text.
pub(crate) fn scalar_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Array(_) | Value::Object(_) => Err(serde::de::Error::custom(
            "expected a string, number or boolean",
        )),
        other => Ok(normalize(&other)),
    }
}
