//! Left-deep plan in pattern order

use super::{TreePlan, TreePlanBuilder};
use crate::pattern::Pattern;
use crate::statistics::StatisticsSnapshot;
use crate::types::{EngineError, Result};

/// Joins the positive leaves in the order they appear in the pattern,
/// ignoring statistics
#[derive(Debug, Clone, Copy, Default)]
pub struct TrivialTreePlanBuilder;

impl TreePlanBuilder for TrivialTreePlanBuilder {
    fn name(&self) -> &'static str {
        "trivial"
    }

    fn build(&self, pattern: &Pattern, _snapshot: &StatisticsSnapshot) -> Result<TreePlan> {
        let order: Vec<usize> = (0..pattern.positive_events().len()).collect();
        TreePlan::left_deep(&order)
            .ok_or_else(|| EngineError::InvalidPattern("pattern has no positive events".to_string()))
    }
}
