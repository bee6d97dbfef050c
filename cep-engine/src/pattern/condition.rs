//! Inter-event conditions
//!
//! Conditions compare payload attributes of bound events with each other or
//! with constants. They are resolved against the pattern's occurrence names
//! once, and evaluated on partial matches as soon as every event they refer
//! to is bound.

use crate::types::{EngineError, Event, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// One side of a comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operand {
    /// Attribute `field` of the event bound to occurrence `event`
    Field { event: String, field: String },
    /// A constant
    Value(Value),
}

impl Operand {
    pub fn field(event: impl Into<String>, field: impl Into<String>) -> Self {
        Operand::Field {
            event: event.into(),
            field: field.into(),
        }
    }

    pub fn value(value: impl Into<Value>) -> Self {
        Operand::Value(value.into())
    }
}

/// A condition over the events of a (partial) match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    Compare {
        left: Operand,
        op: CompareOp,
        right: Operand,
    },
    All(Vec<Condition>),
}

impl Condition {
    pub fn compare(left: Operand, op: CompareOp, right: Operand) -> Self {
        Condition::Compare { left, op, right }
    }

    /// Split nested `All` groups into individual comparisons
    fn flatten(self, out: &mut Vec<(Operand, CompareOp, Operand)>) {
        match self {
            Condition::Compare { left, op, right } => out.push((left, op, right)),
            Condition::All(children) => {
                for child in children {
                    child.flatten(out);
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum ResolvedOperand {
    Field { leaf: usize, field: String },
    Value(Value),
}

impl ResolvedOperand {
    fn resolve(operand: Operand, leaves: &HashMap<&str, usize>) -> Result<Self> {
        match operand {
            Operand::Field { event, field } => {
                let leaf = leaves.get(event.as_str()).copied().ok_or_else(|| {
                    EngineError::InvalidPattern(format!(
                        "condition refers to unknown event '{}'",
                        event
                    ))
                })?;
                Ok(ResolvedOperand::Field { leaf, field })
            }
            Operand::Value(value) => Ok(ResolvedOperand::Value(value)),
        }
    }

    fn leaf(&self) -> Option<usize> {
        match self {
            ResolvedOperand::Field { leaf, .. } => Some(*leaf),
            ResolvedOperand::Value(_) => None,
        }
    }

    fn evaluate<'a, F>(&'a self, lookup: &F) -> Option<&'a Value>
    where
        F: Fn(usize) -> Option<&'a Event>,
    {
        match self {
            ResolvedOperand::Field { leaf, field } => lookup(*leaf)?.get(field),
            ResolvedOperand::Value(value) => Some(value),
        }
    }
}

/// A single comparison with occurrence names replaced by leaf indices
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedCondition {
    left: ResolvedOperand,
    op: CompareOp,
    right: ResolvedOperand,
    leaves: Vec<usize>,
}

impl ResolvedCondition {
    /// Resolve a condition tree into flat comparisons
    pub(crate) fn resolve_all(
        condition: Condition,
        leaves: &HashMap<&str, usize>,
    ) -> Result<Vec<ResolvedCondition>> {
        let mut atoms = Vec::new();
        condition.flatten(&mut atoms);
        atoms
            .into_iter()
            .map(|(left, op, right)| {
                let left = ResolvedOperand::resolve(left, leaves)?;
                let right = ResolvedOperand::resolve(right, leaves)?;
                let mut referenced: Vec<usize> =
                    left.leaf().into_iter().chain(right.leaf()).collect();
                referenced.sort_unstable();
                referenced.dedup();
                if referenced.is_empty() {
                    return Err(EngineError::InvalidPattern(
                        "condition does not refer to any event".to_string(),
                    ));
                }
                Ok(ResolvedCondition {
                    left,
                    op,
                    right,
                    leaves: referenced,
                })
            })
            .collect()
    }

    /// Leaf indices this condition refers to (sorted, unique)
    pub fn leaves(&self) -> &[usize] {
        &self.leaves
    }

    /// True if every referenced leaf is in `bound`
    pub fn is_covered_by(&self, bound: &[usize]) -> bool {
        self.leaves.iter().all(|leaf| bound.contains(leaf))
    }

    /// Evaluate against the events returned by `lookup`
    ///
    /// A missing event or attribute makes the condition false.
    pub fn holds<'a, F>(&'a self, lookup: F) -> bool
    where
        F: Fn(usize) -> Option<&'a Event>,
    {
        match (self.left.evaluate(&lookup), self.right.evaluate(&lookup)) {
            (Some(left), Some(right)) => compare(left, self.op, right),
            _ => false,
        }
    }
}

fn compare(left: &Value, op: CompareOp, right: &Value) -> bool {
    let ordering = match (left, right) {
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => None,
        },
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    };

    match op {
        CompareOp::Eq => ordering.map_or(left == right, |o| o == Ordering::Equal),
        CompareOp::Ne => ordering.map_or(left != right, |o| o != Ordering::Equal),
        CompareOp::Lt => ordering == Some(Ordering::Less),
        CompareOp::Le => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
        CompareOp::Gt => ordering == Some(Ordering::Greater),
        CompareOp::Ge => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
    }
}
