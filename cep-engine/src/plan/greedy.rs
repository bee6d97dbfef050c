//! Greedy cost-ordered left-deep plans

use super::{CostTerm, PlanInvariant, PlanInvariants, TreePlan, TreePlanBuilder};
use crate::pattern::Pattern;
use crate::statistics::StatisticsSnapshot;
use crate::types::{EngineError, Result};

/// Builds a left-deep plan by repeatedly picking the cheapest remaining leaf
///
/// The first leaf minimises `rate[i] * sel[i][i]`; each following leaf
/// minimises the same product further multiplied by its selectivity with every
/// leaf already chosen. Ties go to the lower leaf index. Every comparison won
/// by the chosen leaf is recorded as a [`PlanInvariant`].
#[derive(Debug, Clone, Copy, Default)]
pub struct GreedyTreePlanBuilder;

impl GreedyTreePlanBuilder {
    fn order(
        pattern: &Pattern,
        snapshot: &StatisticsSnapshot,
        mut invariants: Option<&mut Vec<PlanInvariant>>,
    ) -> Vec<usize> {
        let mut remaining: Vec<usize> = (0..pattern.positive_events().len()).collect();
        let mut order = Vec::with_capacity(remaining.len());

        while !remaining.is_empty() {
            let costs: Vec<f64> = remaining
                .iter()
                .map(|leaf| CostTerm::new(*leaf, order.clone()).evaluate(snapshot))
                .collect();
            let best = costs
                .iter()
                .enumerate()
                .fold(0, |best, (position, cost)| {
                    if cost.total_cmp(&costs[best]).is_lt() {
                        position
                    } else {
                        best
                    }
                });
            let chosen = remaining.remove(best);

            if let Some(invariants) = invariants.as_deref_mut() {
                for rejected in &remaining {
                    invariants.push(PlanInvariant {
                        chosen: CostTerm::new(chosen, order.clone()),
                        rejected: CostTerm::new(*rejected, order.clone()),
                    });
                }
            }
            order.push(chosen);
        }
        order
    }

    fn plan(order: &[usize]) -> Result<TreePlan> {
        TreePlan::left_deep(order)
            .ok_or_else(|| EngineError::InvalidPattern("pattern has no positive events".to_string()))
    }
}

impl TreePlanBuilder for GreedyTreePlanBuilder {
    fn name(&self) -> &'static str {
        "greedy"
    }

    fn build(&self, pattern: &Pattern, snapshot: &StatisticsSnapshot) -> Result<TreePlan> {
        Self::plan(&Self::order(pattern, snapshot, None))
    }

    fn produces_invariants(&self) -> bool {
        true
    }

    fn build_with_invariants(
        &self,
        pattern: &Pattern,
        snapshot: &StatisticsSnapshot,
    ) -> Result<(TreePlan, PlanInvariants)> {
        let mut invariants = Vec::new();
        let order = Self::order(pattern, snapshot, Some(&mut invariants));
        log::debug!(
            "Greedy plan order {:?} with {} invariants",
            order,
            invariants.len()
        );
        Ok((Self::plan(&order)?, PlanInvariants::new(invariants)))
    }
}
