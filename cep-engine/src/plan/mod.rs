//! Tree plans and plan builders
//!
//! A [`TreePlan`] is an immutable description of the join order over the
//! positive leaves of a pattern. Plans are produced by a [`TreePlanBuilder`]
//! from a pattern and a statistics snapshot, and consumed once by
//! [`Tree::instantiate`](crate::tree::Tree::instantiate).

pub mod greedy;
pub mod trivial;

pub use greedy::GreedyTreePlanBuilder;
pub use trivial::TrivialTreePlanBuilder;

use crate::config::PlanBuilderKind;
use crate::pattern::Pattern;
use crate::statistics::StatisticsSnapshot;
use crate::types::{EngineError, Result};
use std::fmt;

/// One node of a tree plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreePlanNode {
    /// Positive leaf index
    Leaf(usize),
    /// Join of two sub-plans
    Join(Box<TreePlanNode>, Box<TreePlanNode>),
}

impl TreePlanNode {
    pub fn join(left: TreePlanNode, right: TreePlanNode) -> Self {
        TreePlanNode::Join(Box::new(left), Box::new(right))
    }

    fn collect_leaves(&self, out: &mut Vec<usize>) {
        match self {
            TreePlanNode::Leaf(index) => out.push(*index),
            TreePlanNode::Join(left, right) => {
                left.collect_leaves(out);
                right.collect_leaves(out);
            }
        }
    }

    fn write_with<F>(&self, f: &mut fmt::Formatter<'_>, label: &F) -> fmt::Result
    where
        F: Fn(usize) -> String,
    {
        match self {
            TreePlanNode::Leaf(index) => write!(f, "{}", label(*index)),
            TreePlanNode::Join(left, right) => {
                write!(f, "(")?;
                left.write_with(f, label)?;
                write!(f, " ⋈ ")?;
                right.write_with(f, label)?;
                write!(f, ")")
            }
        }
    }
}

/// Evaluation order of a pattern's positive leaves
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreePlan {
    root: TreePlanNode,
}

impl TreePlan {
    pub fn new(root: TreePlanNode) -> Self {
        Self { root }
    }

    /// Left-deep plan joining leaves in the given order
    pub fn left_deep(order: &[usize]) -> Option<Self> {
        let (first, rest) = order.split_first()?;
        let root = rest
            .iter()
            .fold(TreePlanNode::Leaf(*first), |acc, leaf| {
                TreePlanNode::join(acc, TreePlanNode::Leaf(*leaf))
            });
        Some(Self { root })
    }

    pub fn root(&self) -> &TreePlanNode {
        &self.root
    }

    /// Leaf indices in plan order (left to right)
    pub fn leaves(&self) -> Vec<usize> {
        let mut leaves = Vec::new();
        self.root.collect_leaves(&mut leaves);
        leaves
    }

    /// Check that every leaf `0..leaf_count` appears exactly once
    pub fn validate(&self, leaf_count: usize) -> Result<()> {
        let mut seen = vec![false; leaf_count];
        for leaf in self.leaves() {
            match seen.get_mut(leaf) {
                Some(slot) if !*slot => *slot = true,
                Some(_) => {
                    return Err(EngineError::InvalidPlan(format!(
                        "leaf {} appears more than once",
                        leaf
                    )))
                }
                None => {
                    return Err(EngineError::InvalidPlan(format!(
                        "leaf {} is out of range (pattern has {} leaves)",
                        leaf, leaf_count
                    )))
                }
            }
        }
        if let Some(missing) = seen.iter().position(|s| !*s) {
            return Err(EngineError::InvalidPlan(format!(
                "leaf {} is missing from the plan",
                missing
            )));
        }
        Ok(())
    }

    /// Render the plan with occurrence names instead of leaf indices
    pub fn describe(&self, pattern: &Pattern) -> String {
        struct Named<'a>(&'a TreePlanNode, &'a Pattern);

        impl fmt::Display for Named<'_> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.write_with(f, &|index| {
                    self.1
                        .positive_events()
                        .get(index)
                        .map_or_else(|| index.to_string(), |p| p.name.to_string())
                })
            }
        }

        Named(&self.root, pattern).to_string()
    }
}

impl fmt::Display for TreePlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.root.write_with(f, &|index| index.to_string())
    }
}

/// Estimated cost of adding `leaf` to a left-deep plan already joining `given`
///
/// `rate[leaf] * sel[leaf][leaf] * Π sel[g][leaf]`
#[derive(Debug, Clone, PartialEq)]
pub struct CostTerm {
    pub leaf: usize,
    pub given: Vec<usize>,
}

impl CostTerm {
    pub fn new(leaf: usize, given: Vec<usize>) -> Self {
        Self { leaf, given }
    }

    pub fn evaluate(&self, snapshot: &StatisticsSnapshot) -> f64 {
        self.given.iter().fold(
            snapshot.arrival_rate(self.leaf) * snapshot.selectivity(self.leaf, self.leaf),
            |cost, g| cost * snapshot.selectivity(*g, self.leaf),
        )
    }
}

/// A decision taken while building a plan that stays valid while
/// `cost(chosen) <= cost(rejected)`
#[derive(Debug, Clone, PartialEq)]
pub struct PlanInvariant {
    pub chosen: CostTerm,
    pub rejected: CostTerm,
}

impl PlanInvariant {
    pub fn holds(&self, snapshot: &StatisticsSnapshot) -> bool {
        self.chosen.evaluate(snapshot) <= self.rejected.evaluate(snapshot)
    }
}

/// All invariants recorded while building one plan
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlanInvariants {
    invariants: Vec<PlanInvariant>,
}

impl PlanInvariants {
    pub fn new(invariants: Vec<PlanInvariant>) -> Self {
        Self { invariants }
    }

    pub fn len(&self) -> usize {
        self.invariants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.invariants.is_empty()
    }

    /// True while every recorded decision would be taken again
    pub fn hold(&self, snapshot: &StatisticsSnapshot) -> bool {
        self.invariants.iter().all(|invariant| invariant.holds(snapshot))
    }
}

/// Produces tree plans for a pattern
///
/// Implementations are interchangeable strategy objects; the engine only
/// talks to them through this trait.
pub trait TreePlanBuilder: Send {
    /// Short name used in logs and error messages
    fn name(&self) -> &'static str;

    /// Build a plan for `pattern` given the current statistics
    fn build(&self, pattern: &Pattern, snapshot: &StatisticsSnapshot) -> Result<TreePlan>;

    /// Whether [`build_with_invariants`](Self::build_with_invariants) is supported
    fn produces_invariants(&self) -> bool {
        false
    }

    /// Build a plan together with the invariants that keep it optimal
    fn build_with_invariants(
        &self,
        _pattern: &Pattern,
        _snapshot: &StatisticsSnapshot,
    ) -> Result<(TreePlan, PlanInvariants)> {
        Err(EngineError::Configuration(format!(
            "plan builder '{}' does not produce invariants",
            self.name()
        )))
    }
}

impl PlanBuilderKind {
    /// Instantiate the configured builder
    pub fn instantiate(&self) -> Box<dyn TreePlanBuilder> {
        match self {
            PlanBuilderKind::Trivial => Box::new(TrivialTreePlanBuilder),
            PlanBuilderKind::Greedy => Box::new(GreedyTreePlanBuilder),
        }
    }
}
