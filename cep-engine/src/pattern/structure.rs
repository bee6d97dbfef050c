//! Pattern structure tree (SEQ / AND / NOT over primitive occurrences)

use serde::{Deserialize, Serialize};

/// Declarative shape of a pattern
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternStructure {
    /// A single named occurrence of an event type
    Primitive { event_type: String, name: String },
    /// Children must occur in the given order
    Seq(Vec<PatternStructure>),
    /// Children must all occur, in any order
    And(Vec<PatternStructure>),
    /// The wrapped primitive must not occur (top-level SEQ children only)
    Not(Box<PatternStructure>),
}

impl PatternStructure {
    pub fn primitive(event_type: impl Into<String>, name: impl Into<String>) -> Self {
        PatternStructure::Primitive {
            event_type: event_type.into(),
            name: name.into(),
        }
    }

    pub fn seq(children: Vec<PatternStructure>) -> Self {
        PatternStructure::Seq(children)
    }

    pub fn and(children: Vec<PatternStructure>) -> Self {
        PatternStructure::And(children)
    }

    pub fn not(event_type: impl Into<String>, name: impl Into<String>) -> Self {
        PatternStructure::Not(Box::new(Self::primitive(event_type, name)))
    }

    /// Names of all positive primitives below this node, in pattern order
    pub fn positive_names(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_positive_names(&mut names);
        names
    }

    fn collect_positive_names<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            PatternStructure::Primitive { name, .. } => out.push(name),
            PatternStructure::Seq(children) | PatternStructure::And(children) => {
                for child in children {
                    child.collect_positive_names(out);
                }
            }
            PatternStructure::Not(_) => {}
        }
    }

    /// Flattened sequence decomposition
    ///
    /// Every ordered sequence of positive names the structure admits, with AND
    /// branches contributing their sequences independently.
    pub fn flattened_sequences(&self) -> Vec<Vec<String>> {
        match self {
            PatternStructure::Primitive { name, .. } => vec![vec![name.clone()]],
            PatternStructure::Not(_) => Vec::new(),
            PatternStructure::And(children) => children
                .iter()
                .flat_map(|child| child.flattened_sequences())
                .collect(),
            PatternStructure::Seq(children) => {
                let mut sequences: Vec<Vec<String>> = vec![Vec::new()];
                for child in children {
                    let child_sequences = child.flattened_sequences();
                    if child_sequences.is_empty() {
                        continue;
                    }
                    sequences = sequences
                        .iter()
                        .flat_map(|prefix| {
                            child_sequences.iter().map(move |suffix| {
                                let mut joined = prefix.clone();
                                joined.extend(suffix.iter().cloned());
                                joined
                            })
                        })
                        .collect();
                }
                sequences
            }
        }
    }
}
