//! Patterns: structure, conditions, window and consumption policy
//!
//! A [`Pattern`] is built once by the caller and shared read-only with every
//! tree the engine instantiates for it. Construction validates the structure
//! and resolves all occurrence names to leaf indices:
//!
//! - positive primitives are numbered `0..n` in pattern order (these are the
//!   indices a [`TreePlan`](crate::plan::TreePlan) refers to)
//! - negated primitives follow as `n..n+m`

pub mod condition;
pub mod structure;

pub use condition::{CompareOp, Condition, Operand, ResolvedCondition};
pub use structure::PatternStructure;

use crate::types::{EngineError, Result};
use chrono::Duration;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// A primitive occurrence in the pattern
#[derive(Debug, Clone, PartialEq)]
pub struct PrimitiveEvent {
    /// Leaf index
    pub index: usize,
    /// Occurrence name (unique within the pattern)
    pub name: Arc<str>,
    /// Expected event type
    pub event_type: Arc<str>,
    /// Ordering bounds if this occurrence is negated
    pub negation: Option<NegationBounds>,
}

/// Where a negated occurrence must not appear
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NegationBounds {
    /// Positive leaves that must all come before the forbidden event
    pub preceding: Vec<usize>,
    /// Positive leaves that must all come after the forbidden event
    /// (empty for a trailing negation)
    pub following: Vec<usize>,
}

/// A validated pattern
#[derive(Debug, Clone)]
pub struct Pattern {
    structure: PatternStructure,
    window: Duration,
    primitives: Vec<PrimitiveEvent>,
    positive_count: usize,
    ordering: Vec<(usize, usize)>,
    conditions: Vec<ResolvedCondition>,
    freeze_names: Vec<String>,
    freeze_propagation: HashMap<String, HashSet<String>>,
}

impl Pattern {
    /// Build and validate a pattern
    pub fn new(
        structure: PatternStructure,
        conditions: Vec<Condition>,
        window: Duration,
    ) -> Result<Self> {
        if window <= Duration::zero() {
            return Err(EngineError::InvalidPattern(
                "window must be positive".to_string(),
            ));
        }

        let mut positives = Vec::new();
        let mut negatives = Vec::new();
        collect_primitives(&structure, true, &mut positives, &mut negatives)?;
        if positives.is_empty() {
            return Err(EngineError::InvalidPattern(
                "pattern has no positive events".to_string(),
            ));
        }

        let positive_count = positives.len();
        let mut primitives: Vec<PrimitiveEvent> = positives
            .into_iter()
            .chain(negatives)
            .enumerate()
            .map(|(index, (event_type, name))| PrimitiveEvent {
                index,
                name: Arc::from(name),
                event_type: Arc::from(event_type),
                negation: None,
            })
            .collect();

        let mut by_name: HashMap<&str, usize> = HashMap::with_capacity(primitives.len());
        for primitive in &primitives {
            if by_name.insert(&primitive.name, primitive.index).is_some() {
                return Err(EngineError::InvalidPattern(format!(
                    "duplicate event name '{}'",
                    primitive.name
                )));
            }
        }

        let mut ordering = Vec::new();
        collect_ordering(&structure, &by_name, &mut ordering);

        let bounds = negation_bounds(&structure, &by_name);

        let mut resolved = Vec::new();
        for condition in conditions {
            resolved.extend(ResolvedCondition::resolve_all(condition, &by_name)?);
        }
        for condition in &resolved {
            let negated = condition
                .leaves()
                .iter()
                .filter(|leaf| **leaf >= positive_count)
                .count();
            if negated > 1 {
                return Err(EngineError::InvalidPattern(
                    "a condition may refer to at most one negated event".to_string(),
                ));
            }
        }

        for (index, bound) in bounds {
            primitives[index].negation = Some(bound);
        }

        Ok(Self {
            structure,
            window,
            primitives,
            positive_count,
            ordering,
            conditions: resolved,
            freeze_names: Vec::new(),
            freeze_propagation: HashMap::new(),
        })
    }

    /// Attach a "freeze" consumption policy
    ///
    /// Each name must be a positive occurrence. While an event bound to one
    /// of these occurrences is neither matched nor expired, new events for
    /// the occurrences that precede it in any flattened sequence are masked.
    pub fn with_freeze<I, S>(mut self, names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let positive: HashSet<&str> = self.positive_events().iter().map(|p| &*p.name).collect();
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        if let Some(unknown) = names.iter().find(|name| !positive.contains(name.as_str())) {
            return Err(EngineError::InvalidPattern(format!(
                "freeze refers to unknown or negated event '{}'",
                unknown
            )));
        }

        let sequences = self.structure.flattened_sequences();
        let mut propagation: HashMap<String, HashSet<String>> = HashMap::new();
        for trigger in &names {
            let masked = propagation.entry(trigger.clone()).or_default();
            for sequence in &sequences {
                if let Some(position) = sequence.iter().position(|name| name == trigger) {
                    masked.extend(sequence[..=position].iter().cloned());
                }
            }
        }

        self.freeze_names = names;
        self.freeze_propagation = propagation;
        Ok(self)
    }

    pub fn structure(&self) -> &PatternStructure {
        &self.structure
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// All primitive occurrences (positive first, then negated)
    pub fn primitives(&self) -> &[PrimitiveEvent] {
        &self.primitives
    }

    /// Positive occurrences, indexed by leaf
    pub fn positive_events(&self) -> &[PrimitiveEvent] {
        &self.primitives[..self.positive_count]
    }

    /// Negated occurrences
    pub fn negated_events(&self) -> &[PrimitiveEvent] {
        &self.primitives[self.positive_count..]
    }

    /// Pairs `(i, j)` of positive leaves where `i` must precede `j`
    pub fn ordering(&self) -> &[(usize, usize)] {
        &self.ordering
    }

    pub fn conditions(&self) -> &[ResolvedCondition] {
        &self.conditions
    }

    pub fn freeze_names(&self) -> &[String] {
        &self.freeze_names
    }

    /// Trigger name -> names masked while a trigger event is active
    pub fn freeze_propagation(&self) -> &HashMap<String, HashSet<String>> {
        &self.freeze_propagation
    }

    /// Distinct event types this pattern listens to
    pub fn event_types(&self) -> HashSet<&str> {
        self.primitives.iter().map(|p| &*p.event_type).collect()
    }
}

fn collect_primitives(
    structure: &PatternStructure,
    top_level: bool,
    positives: &mut Vec<(String, String)>,
    negatives: &mut Vec<(String, String)>,
) -> Result<()> {
    match structure {
        PatternStructure::Primitive { event_type, name } => {
            positives.push((event_type.clone(), name.clone()));
        }
        PatternStructure::Seq(children) | PatternStructure::And(children) => {
            if children.is_empty() {
                return Err(EngineError::InvalidPattern(
                    "SEQ/AND must have at least one child".to_string(),
                ));
            }
            let is_top_seq = top_level && matches!(structure, PatternStructure::Seq(_));
            for child in children {
                if let PatternStructure::Not(inner) = child {
                    if !is_top_seq {
                        return Err(EngineError::InvalidPattern(
                            "NOT is only supported directly under the top-level SEQ".to_string(),
                        ));
                    }
                    match inner.as_ref() {
                        PatternStructure::Primitive { event_type, name } => {
                            negatives.push((event_type.clone(), name.clone()));
                        }
                        _ => {
                            return Err(EngineError::InvalidPattern(
                                "NOT must wrap a primitive event".to_string(),
                            ))
                        }
                    }
                } else {
                    collect_primitives(child, false, positives, negatives)?;
                }
            }
        }
        PatternStructure::Not(_) => {
            return Err(EngineError::InvalidPattern(
                "NOT is only supported directly under the top-level SEQ".to_string(),
            ));
        }
    }
    Ok(())
}

fn positive_leaves(structure: &PatternStructure, by_name: &HashMap<&str, usize>) -> Vec<usize> {
    structure
        .positive_names()
        .into_iter()
        .filter_map(|name| by_name.get(name).copied())
        .collect()
}

fn collect_ordering(
    structure: &PatternStructure,
    by_name: &HashMap<&str, usize>,
    out: &mut Vec<(usize, usize)>,
) {
    match structure {
        PatternStructure::Seq(children) => {
            let groups: Vec<Vec<usize>> = children
                .iter()
                .map(|child| positive_leaves(child, by_name))
                .collect();
            for (i, earlier) in groups.iter().enumerate() {
                for later in &groups[i + 1..] {
                    for &a in earlier {
                        for &b in later {
                            out.push((a, b));
                        }
                    }
                }
            }
            for child in children {
                collect_ordering(child, by_name, out);
            }
        }
        PatternStructure::And(children) => {
            for child in children {
                collect_ordering(child, by_name, out);
            }
        }
        PatternStructure::Primitive { .. } | PatternStructure::Not(_) => {}
    }
}

fn negation_bounds(
    structure: &PatternStructure,
    by_name: &HashMap<&str, usize>,
) -> Vec<(usize, NegationBounds)> {
    let PatternStructure::Seq(children) = structure else {
        return Vec::new();
    };
    let groups: Vec<Vec<usize>> = children
        .iter()
        .map(|child| positive_leaves(child, by_name))
        .collect();

    children
        .iter()
        .enumerate()
        .filter_map(|(position, child)| match child {
            PatternStructure::Not(inner) => match inner.as_ref() {
                PatternStructure::Primitive { name, .. } => {
                    let index = *by_name.get(name.as_str())?;
                    let bounds = NegationBounds {
                        preceding: groups[..position].iter().flatten().copied().collect(),
                        following: groups[position + 1..].iter().flatten().copied().collect(),
                    };
                    Some((index, bounds))
                }
                _ => None,
            },
            _ => None,
        })
        .collect()
}
