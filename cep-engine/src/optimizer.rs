//! Re-optimization decisions
//!
//! The [`Optimizer`] decides whether the running plan has gone stale and, if
//! so, asks its plan builder for a new one. The three strategies share the
//! builder and differ only in the state they keep between decisions.

use crate::config::OptimizerConfig;
use crate::pattern::Pattern;
use crate::plan::{PlanInvariants, TreePlan, TreePlanBuilder};
use crate::statistics::{DeviationTester, StatisticsKind, StatisticsSnapshot};
use crate::types::{EngineError, Result};

/// Decision state of one optimizer
#[derive(Debug, Clone, PartialEq)]
pub enum OptimizerStrategy {
    /// Rebuild at every re-optimization point
    Trivial,
    /// Rebuild when any statistic deviates from the one the plan was built on
    StatisticsDeviationAware {
        testers: Vec<DeviationTester>,
        previous: Option<StatisticsSnapshot>,
    },
    /// Rebuild when a recorded plan invariant stops holding
    InvariantAware { invariants: Option<PlanInvariants> },
}

/// Optimizer plus the plan builder it delegates to
pub struct Optimizer {
    strategy: OptimizerStrategy,
    builder: Box<dyn TreePlanBuilder>,
}

impl std::fmt::Debug for Optimizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Optimizer")
            .field("strategy", &self.strategy)
            .field("builder", &self.builder.name())
            .finish()
    }
}

impl Optimizer {
    /// Create an optimizer for the given configuration
    ///
    /// Fails if an invariant-aware optimizer is paired with a builder that
    /// cannot produce invariants.
    pub fn new(config: &OptimizerConfig, builder: Box<dyn TreePlanBuilder>) -> Result<Self> {
        let strategy = match *config {
            OptimizerConfig::Trivial => OptimizerStrategy::Trivial,
            OptimizerConfig::StatisticsDeviationAware {
                arrival_rate_threshold,
                selectivity_threshold,
            } => OptimizerStrategy::StatisticsDeviationAware {
                testers: vec![
                    DeviationTester::for_kind(StatisticsKind::ArrivalRates, arrival_rate_threshold),
                    DeviationTester::for_kind(StatisticsKind::Selectivity, selectivity_threshold),
                ],
                previous: None,
            },
            OptimizerConfig::InvariantAware => {
                if !builder.produces_invariants() {
                    return Err(EngineError::Configuration(format!(
                        "invariant-aware optimizer cannot use plan builder '{}'",
                        builder.name()
                    )));
                }
                OptimizerStrategy::InvariantAware { invariants: None }
            }
        };
        Ok(Self { strategy, builder })
    }

    pub fn strategy(&self) -> &OptimizerStrategy {
        &self.strategy
    }

    pub fn builder_name(&self) -> &'static str {
        self.builder.name()
    }

    /// Build the plan for the first tree and seed the decision state
    pub fn build_initial_plan(
        &mut self,
        snapshot: &StatisticsSnapshot,
        pattern: &Pattern,
    ) -> Result<TreePlan> {
        if let OptimizerStrategy::StatisticsDeviationAware { previous, .. } = &mut self.strategy {
            *previous = Some(snapshot.clone());
        }
        self.build_new_plan(snapshot, pattern)
    }

    /// Whether the current plan should be replaced
    ///
    /// The deviation-aware strategy stores `snapshot` whenever it answers yes.
    pub fn should_optimize(&mut self, snapshot: &StatisticsSnapshot, _pattern: &Pattern) -> bool {
        match &mut self.strategy {
            OptimizerStrategy::Trivial => true,
            OptimizerStrategy::StatisticsDeviationAware { testers, previous } => {
                let deviated = match previous {
                    None => true,
                    Some(prev) => testers.iter().any(|tester| {
                        match (snapshot.get(tester.kind()), prev.get(tester.kind())) {
                            (Some(new), Some(old)) => tester.is_deviated(new, old),
                            (Some(_), None) => true,
                            (None, _) => false,
                        }
                    }),
                };
                if deviated {
                    *previous = Some(snapshot.clone());
                }
                deviated
            }
            OptimizerStrategy::InvariantAware { invariants } => match invariants {
                Some(invariants) if !invariants.is_empty() => !invariants.hold(snapshot),
                _ => true,
            },
        }
    }

    /// Ask the plan builder for a plan fitting `snapshot`
    pub fn build_new_plan(
        &mut self,
        snapshot: &StatisticsSnapshot,
        pattern: &Pattern,
    ) -> Result<TreePlan> {
        match &mut self.strategy {
            OptimizerStrategy::InvariantAware { invariants } => {
                let (plan, built) = self.builder.build_with_invariants(pattern, snapshot)?;
                log::debug!("Plan {} carries {} invariants", plan, built.len());
                *invariants = Some(built);
                Ok(plan)
            }
            OptimizerStrategy::Trivial | OptimizerStrategy::StatisticsDeviationAware { .. } => {
                self.builder.build(pattern, snapshot)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::PatternStructure;
    use crate::plan::{GreedyTreePlanBuilder, TrivialTreePlanBuilder};
    use crate::statistics::StatisticValue;
    use chrono::Duration;

    fn pattern() -> Pattern {
        let structure = PatternStructure::seq(vec![
            PatternStructure::primitive("A", "a"),
            PatternStructure::primitive("B", "b"),
        ]);
        Pattern::new(structure, Vec::new(), Duration::seconds(10)).unwrap()
    }

    fn rates(values: &[f64]) -> StatisticsSnapshot {
        StatisticsSnapshot::new().with(
            StatisticsKind::ArrivalRates,
            StatisticValue::Vector(values.to_vec()),
        )
    }

    fn deviation_aware(threshold: f64) -> Optimizer {
        let config = OptimizerConfig::StatisticsDeviationAware {
            arrival_rate_threshold: threshold,
            selectivity_threshold: threshold,
        };
        Optimizer::new(&config, Box::new(TrivialTreePlanBuilder)).unwrap()
    }

    #[test]
    fn test_trivial_always_optimizes() {
        let mut optimizer =
            Optimizer::new(&OptimizerConfig::Trivial, Box::new(TrivialTreePlanBuilder)).unwrap();
        assert!(optimizer.should_optimize(&rates(&[1.0, 1.0]), &pattern()));
        assert!(optimizer.should_optimize(&rates(&[1.0, 1.0]), &pattern()));
    }

    #[test]
    fn test_arrival_rate_jump_triggers_with_small_threshold() {
        let pattern = pattern();
        let mut optimizer = deviation_aware(0.5);
        optimizer.build_initial_plan(&rates(&[1.0, 1.0]), &pattern).unwrap();
        assert!(optimizer.should_optimize(&rates(&[3.0, 1.0]), &pattern));
        // The jumped snapshot is now the reference
        assert!(!optimizer.should_optimize(&rates(&[3.0, 1.0]), &pattern));
    }

    #[test]
    fn test_arrival_rate_jump_ignored_with_large_threshold() {
        let pattern = pattern();
        let mut optimizer = deviation_aware(3.0);
        optimizer.build_initial_plan(&rates(&[1.0, 1.0]), &pattern).unwrap();
        assert!(!optimizer.should_optimize(&rates(&[3.0, 1.0]), &pattern));
    }

    #[test]
    fn test_deviation_aware_without_reference_optimizes() {
        let mut optimizer = deviation_aware(0.5);
        assert!(optimizer.should_optimize(&rates(&[1.0, 1.0]), &pattern()));
        assert!(!optimizer.should_optimize(&rates(&[1.0, 1.0]), &pattern()));
    }

    #[test]
    fn test_invariant_aware_requires_invariant_builder() {
        let result = Optimizer::new(
            &OptimizerConfig::InvariantAware,
            Box::new(TrivialTreePlanBuilder),
        );
        assert!(matches!(result, Err(EngineError::Configuration(_))));
    }

    #[test]
    fn test_invariant_aware_follows_invariants() {
        let pattern = pattern();
        let mut optimizer = Optimizer::new(
            &OptimizerConfig::InvariantAware,
            Box::new(GreedyTreePlanBuilder),
        )
        .unwrap();
        assert!(optimizer.should_optimize(&rates(&[1.0, 2.0]), &pattern));

        let plan = optimizer.build_initial_plan(&rates(&[1.0, 2.0]), &pattern).unwrap();
        assert_eq!(plan.leaves(), vec![0, 1]);
        assert!(!optimizer.should_optimize(&rates(&[1.5, 2.0]), &pattern));
        assert!(optimizer.should_optimize(&rates(&[3.0, 2.0]), &pattern));

        let plan = optimizer.build_new_plan(&rates(&[3.0, 2.0]), &pattern).unwrap();
        assert_eq!(plan.leaves(), vec![1, 0]);
        assert!(!optimizer.should_optimize(&rates(&[3.0, 2.0]), &pattern));
    }
}
