//! Engine configuration types
//!
//! Everything the engine needs besides the pattern itself: which optimizer
//! and plan builder to use, how to swap trees, how statistics are collected
//! and how much partial-match state a tree may hold. Durations are stored as
//! integer milliseconds so the configuration round-trips through TOML/JSON.

use crate::pattern::Pattern;
use crate::plan::TreePlanBuilder;
use crate::types::{EngineError, Result};
use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Configuration for one evaluation engine
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Re-optimization decision strategy
    #[serde(default)]
    pub optimizer: OptimizerConfig,

    /// Plan builder used for the initial and every rebuilt plan
    #[serde(default)]
    pub plan_builder: PlanBuilderKind,

    /// Protocol used to replace a running tree
    #[serde(default)]
    pub swap_strategy: SwapStrategyKind,

    /// Statistics collection (None disables statistics and re-optimization)
    #[serde(default)]
    pub statistics: Option<StatisticsConfig>,

    /// Partial-match storage limits
    #[serde(default)]
    pub storage: TreeStorageParameters,
}

/// Optimizer selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OptimizerConfig {
    /// Rebuild at every re-optimization point
    #[default]
    Trivial,
    /// Rebuild when a statistic deviates by more than its threshold
    StatisticsDeviationAware {
        #[serde(default = "default_threshold")]
        arrival_rate_threshold: f64,
        #[serde(default = "default_threshold")]
        selectivity_threshold: f64,
    },
    /// Rebuild when the plan's recorded invariants stop holding
    InvariantAware,
}

fn default_threshold() -> f64 {
    0.5
}

/// Built-in plan builders
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanBuilderKind {
    /// Left-deep in pattern order
    #[default]
    Trivial,
    /// Cost-ordered left-deep, produces invariants
    Greedy,
}

/// Tree replacement protocols
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwapStrategyKind {
    /// Replace immediately and replay buffered events into the new tree
    #[default]
    Trivial,
    /// Run both trees side by side for one window, then drop the old one
    Simultaneous,
}

/// Statistics collection settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatisticsConfig {
    /// Sliding window over which arrival rates are measured
    #[serde(default = "default_time_window_ms")]
    pub time_window_ms: u64,

    /// Minimum logical time between two re-optimization attempts
    #[serde(default = "default_update_time_window_ms")]
    pub update_time_window_ms: u64,
}

fn default_time_window_ms() -> u64 {
    60_000
}

fn default_update_time_window_ms() -> u64 {
    10_000
}

impl Default for StatisticsConfig {
    fn default() -> Self {
        Self {
            time_window_ms: default_time_window_ms(),
            update_time_window_ms: default_update_time_window_ms(),
        }
    }
}

impl StatisticsConfig {
    pub fn new(time_window_ms: u64, update_time_window_ms: u64) -> Self {
        Self {
            time_window_ms,
            update_time_window_ms,
        }
    }

    pub fn time_window(&self) -> Duration {
        Duration::milliseconds(self.time_window_ms as i64)
    }

    pub fn update_time_window(&self) -> Duration {
        Duration::milliseconds(self.update_time_window_ms as i64)
    }
}

/// Storage parameters for tree nodes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeStorageParameters {
    /// Maximum partial matches kept per node; the oldest are evicted first
    #[serde(default)]
    pub max_partial_matches: Option<usize>,
}

impl EngineConfig {
    /// Create a new engine configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set the optimizer
    pub fn with_optimizer(mut self, optimizer: OptimizerConfig) -> Self {
        self.optimizer = optimizer;
        self
    }

    /// Builder method: set the plan builder
    pub fn with_plan_builder(mut self, plan_builder: PlanBuilderKind) -> Self {
        self.plan_builder = plan_builder;
        self
    }

    /// Builder method: set the swap strategy
    pub fn with_swap_strategy(mut self, swap_strategy: SwapStrategyKind) -> Self {
        self.swap_strategy = swap_strategy;
        self
    }

    /// Builder method: enable statistics collection
    pub fn with_statistics(mut self, time_window_ms: u64, update_time_window_ms: u64) -> Self {
        self.statistics = Some(StatisticsConfig::new(time_window_ms, update_time_window_ms));
        self
    }

    /// Builder method: bound the partial matches per node
    pub fn with_max_partial_matches(mut self, limit: usize) -> Self {
        self.storage.max_partial_matches = Some(limit);
        self
    }

    /// Check the configuration against a pattern and the plan builder in use
    pub fn validate(&self, pattern: &Pattern, builder: &dyn TreePlanBuilder) -> Result<()> {
        match self.optimizer {
            OptimizerConfig::Trivial => {}
            OptimizerConfig::StatisticsDeviationAware {
                arrival_rate_threshold,
                selectivity_threshold,
            } => {
                if !(arrival_rate_threshold >= 0.0 && selectivity_threshold >= 0.0) {
                    return Err(EngineError::Configuration(format!(
                        "deviation thresholds must be non-negative (got {} and {})",
                        arrival_rate_threshold, selectivity_threshold
                    )));
                }
                if self.statistics.is_none() {
                    return Err(EngineError::Configuration(
                        "statistics-deviation-aware optimizer requires statistics".to_string(),
                    ));
                }
            }
            OptimizerConfig::InvariantAware => {
                if !builder.produces_invariants() {
                    return Err(EngineError::Configuration(format!(
                        "invariant-aware optimizer requires an invariant-producing plan builder, got '{}'",
                        builder.name()
                    )));
                }
                if self.statistics.is_none() {
                    return Err(EngineError::Configuration(
                        "invariant-aware optimizer requires statistics".to_string(),
                    ));
                }
            }
        }

        if let Some(statistics) = &self.statistics {
            if statistics.time_window_ms == 0 {
                return Err(EngineError::Configuration(
                    "statistics time window must be positive".to_string(),
                ));
            }
            if self.swap_strategy == SwapStrategyKind::Simultaneous
                && statistics.update_time_window() < pattern.window()
            {
                return Err(EngineError::Configuration(format!(
                    "simultaneous swaps need update_time_window_ms ({}) of at least the pattern window ({} ms)",
                    statistics.update_time_window_ms,
                    pattern.window().num_milliseconds()
                )));
            }
        }

        if self.storage.max_partial_matches == Some(0) {
            return Err(EngineError::Configuration(
                "max_partial_matches must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
