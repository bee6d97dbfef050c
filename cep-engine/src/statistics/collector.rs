//! Sliding-window statistics collector

use super::{StatisticValue, StatisticsKind, StatisticsSnapshot};
use crate::pattern::Pattern;
use crate::types::{Event, Timestamp};
use chrono::Duration;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

/// Accumulates statistics for one pattern
///
/// Arrival rates are refreshed on every handled event; other kinds only
/// change through [`update`](Self::update).
#[derive(Debug)]
pub struct StatisticsCollector {
    time_window: Duration,
    leaf_types: Vec<Arc<str>>,
    arrivals: HashMap<Arc<str>, VecDeque<Timestamp>>,
    newest: Option<Timestamp>,
    values: BTreeMap<StatisticsKind, StatisticValue>,
}

impl StatisticsCollector {
    /// Create a collector tracking arrival rates and selectivity for `pattern`
    pub fn new(pattern: &Pattern, time_window: Duration) -> Self {
        let leaf_types: Vec<Arc<str>> = pattern
            .positive_events()
            .iter()
            .map(|p| Arc::clone(&p.event_type))
            .collect();
        let arrivals = leaf_types
            .iter()
            .map(|t| (Arc::clone(t), VecDeque::new()))
            .collect();

        let leaves = leaf_types.len();
        let mut values = BTreeMap::new();
        values.insert(
            StatisticsKind::ArrivalRates,
            StatisticValue::Vector(vec![0.0; leaves]),
        );
        values.insert(
            StatisticsKind::Selectivity,
            StatisticValue::Matrix((0..leaves).map(|i| vec![1.0; i + 1]).collect()),
        );

        Self {
            time_window,
            leaf_types,
            arrivals,
            newest: None,
            values,
        }
    }

    /// Record an arrival and refresh the arrival-rate vector
    pub fn handle_event(&mut self, event: &Event) {
        let Some(queue) = self.arrivals.get_mut(&event.event_type) else {
            return;
        };
        queue.push_back(event.timestamp);

        let newest = match self.newest {
            Some(current) if current >= event.timestamp => current,
            _ => event.timestamp,
        };
        self.newest = Some(newest);

        for queue in self.arrivals.values_mut() {
            while queue
                .front()
                .is_some_and(|oldest| newest - *oldest > self.time_window)
            {
                queue.pop_front();
            }
        }

        let seconds = (self.time_window.num_milliseconds() as f64 / 1000.0).max(f64::EPSILON);
        let rates = self
            .leaf_types
            .iter()
            .map(|t| self.arrivals.get(t).map_or(0.0, |q| q.len() as f64 / seconds))
            .collect();
        self.values
            .insert(StatisticsKind::ArrivalRates, StatisticValue::Vector(rates));
    }

    /// Inject an externally computed statistic
    ///
    /// Values for kinds that are not registered, or whose shape does not fit
    /// the kind, are ignored.
    pub fn update(&mut self, kind: StatisticsKind, data: StatisticValue) {
        if !self.values.contains_key(&kind) {
            log::debug!("Ignoring update for unregistered statistic '{}'", kind);
            return;
        }
        if !data.fits(kind) {
            log::debug!("Ignoring update with mismatching shape for statistic '{}'", kind);
            return;
        }
        self.values.insert(kind, data);
    }

    /// Current values of every registered statistic
    pub fn snapshot(&self) -> StatisticsSnapshot {
        self.values
            .iter()
            .fold(StatisticsSnapshot::new(), |snapshot, (kind, value)| {
                snapshot.with(*kind, value.clone())
            })
    }
}
