//! Stream statistics: collection, snapshots and deviation tests
//!
//! The collector keeps per-type arrival rates over a sliding time window and
//! holds externally injected values (selectivity). A snapshot is an immutable
//! copy of every registered statistic at one instant; optimizers compare
//! snapshots to decide whether the running plan has gone stale.

pub mod collector;
pub mod deviation;

pub use collector::StatisticsCollector;
pub use deviation::DeviationTester;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Statistic kinds known to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatisticsKind {
    /// Events per second, one entry per positive leaf
    ArrivalRates,
    /// Lower-triangular matrix of pairwise selectivities between positive leaves
    Selectivity,
}

impl fmt::Display for StatisticsKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatisticsKind::ArrivalRates => write!(f, "arrival_rates"),
            StatisticsKind::Selectivity => write!(f, "selectivity"),
        }
    }
}

/// Raw value of one statistic
#[derive(Debug, Clone, PartialEq)]
pub enum StatisticValue {
    /// Indexed by leaf
    Vector(Vec<f64>),
    /// Row `i` holds entries `(i, 0..=i)`
    Matrix(Vec<Vec<f64>>),
}

impl StatisticValue {
    /// Whether this value has the shape expected for `kind`
    pub fn fits(&self, kind: StatisticsKind) -> bool {
        matches!(
            (kind, self),
            (StatisticsKind::ArrivalRates, StatisticValue::Vector(_))
                | (StatisticsKind::Selectivity, StatisticValue::Matrix(_))
        )
    }
}

/// Point-in-time copy of all registered statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatisticsSnapshot {
    values: BTreeMap<StatisticsKind, StatisticValue>,
}

impl StatisticsSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set a statistic
    pub fn with(mut self, kind: StatisticsKind, value: StatisticValue) -> Self {
        self.values.insert(kind, value);
        self
    }

    pub fn get(&self, kind: StatisticsKind) -> Option<&StatisticValue> {
        self.values.get(&kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = StatisticsKind> + '_ {
        self.values.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Arrival rate of a leaf (0.0 when unknown)
    pub fn arrival_rate(&self, leaf: usize) -> f64 {
        match self.values.get(&StatisticsKind::ArrivalRates) {
            Some(StatisticValue::Vector(rates)) => rates.get(leaf).copied().unwrap_or(0.0),
            _ => 0.0,
        }
    }

    /// Selectivity between two leaves (1.0 when unknown)
    pub fn selectivity(&self, i: usize, j: usize) -> f64 {
        let (row, column) = if j <= i { (i, j) } else { (j, i) };
        match self.values.get(&StatisticsKind::Selectivity) {
            Some(StatisticValue::Matrix(rows)) => rows
                .get(row)
                .and_then(|r| r.get(column))
                .copied()
                .unwrap_or(1.0),
            _ => 1.0,
        }
    }
}
