//! The evaluation engine
//!
//! [`EvaluationEngine`] owns the ingestion loop for one pattern. Per event it:
//!
//! 1. parses the raw record and drops events of types the pattern ignores
//! 2. purges expired freezers and commits a due tree transition
//! 3. feeds the statistics collector and, at most once per update window,
//!    asks the optimizer whether to replace the tree
//! 4. delivers the event to every listening leaf of every live tree
//! 5. forwards the matches completed by this event to the output
//!
//! Everything runs to completion before the next record is read.

use crate::config::EngineConfig;
use crate::formats::DataFormatter;
use crate::freeze::FreezeState;
use crate::optimizer::Optimizer;
use crate::pattern::Pattern;
use crate::plan::TreePlanBuilder;
use crate::statistics::{
    StatisticValue, StatisticsCollector, StatisticsKind, StatisticsSnapshot,
};
use crate::stream::{InputStream, OutputStream};
use crate::swap::{TransitionMark, TreeSlots};
use crate::tree::Tree;
use crate::types::{Event, PatternMatch, Result, SharedEvent, Timestamp};
use chrono::Duration;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Counters describing one engine run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EvaluationSummary {
    pub events_read: u64,
    /// Events whose type no leaf listens to
    pub events_ignored: u64,
    pub matches_emitted: u64,
    /// Old-tree matches dropped during a simultaneous transition
    pub matches_suppressed: u64,
    pub reoptimization_attempts: u64,
    /// Optimizer decisions that produced a different plan
    pub replans: u64,
    /// Rebuilt plans identical to the running one
    pub unchanged_plans: u64,
    pub trivial_swaps: u64,
    pub transitions_begun: u64,
    pub transitions_committed: u64,
    /// Partial matches dropped by `max_partial_matches`
    pub partial_matches_evicted: u64,
}

impl fmt::Display for EvaluationSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} events ({} ignored), {} matches ({} suppressed), {} re-optimization attempts, {} replans",
            self.events_read,
            self.events_ignored,
            self.matches_emitted,
            self.matches_suppressed,
            self.reoptimization_attempts,
            self.replans
        )?;
        if self.partial_matches_evicted > 0 {
            write!(f, ", {} partial matches evicted", self.partial_matches_evicted)?;
        }
        Ok(())
    }
}

/// Adaptive tree-based evaluation of one pattern
#[derive(Debug)]
pub struct EvaluationEngine {
    pattern: Arc<Pattern>,
    config: EngineConfig,
    event_types: HashSet<Arc<str>>,
    optimizer: Optimizer,
    statistics: Option<StatisticsCollector>,
    update_time_window: Duration,
    slots: TreeSlots,
    freeze: FreezeState,
    last_reoptimization: Option<Timestamp>,
    next_event_id: u64,
    summary: EvaluationSummary,
}

impl EvaluationEngine {
    /// Create an engine using the plan builder named in `config`
    pub fn new(pattern: impl Into<Arc<Pattern>>, config: EngineConfig) -> Result<Self> {
        let builder = config.plan_builder.instantiate();
        Self::with_plan_builder(pattern, config, builder)
    }

    /// Create an engine with a caller-supplied plan builder
    pub fn with_plan_builder(
        pattern: impl Into<Arc<Pattern>>,
        config: EngineConfig,
        builder: Box<dyn TreePlanBuilder>,
    ) -> Result<Self> {
        let pattern = pattern.into();
        config.validate(&pattern, builder.as_ref())?;

        let mut optimizer = Optimizer::new(&config.optimizer, builder)?;
        let statistics = config
            .statistics
            .map(|s| StatisticsCollector::new(&pattern, s.time_window()));
        let update_time_window = config
            .statistics
            .map_or_else(Duration::zero, |s| s.update_time_window());

        let snapshot = statistics
            .as_ref()
            .map_or_else(StatisticsSnapshot::new, StatisticsCollector::snapshot);
        let plan = optimizer.build_initial_plan(&snapshot, &pattern)?;
        let tree = Tree::instantiate(plan, Arc::clone(&pattern), &config.storage)?;

        log::info!(
            "Engine ready: optimizer {:?}, plan builder '{}', swap {:?}, initial tree {}",
            config.optimizer,
            optimizer.builder_name(),
            config.swap_strategy,
            tree.structure_summary()
        );

        let event_types: HashSet<Arc<str>> =
            pattern.event_types().into_iter().map(Arc::from).collect();
        Ok(Self {
            freeze: FreezeState::new(&pattern),
            slots: TreeSlots::new(config.swap_strategy, tree),
            pattern,
            config,
            event_types,
            optimizer,
            statistics,
            update_time_window,
            last_reoptimization: None,
            next_event_id: 0,
            summary: EvaluationSummary::default(),
        })
    }

    pub fn pattern(&self) -> &Arc<Pattern> {
        &self.pattern
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Debug description of the live tree(s)
    pub fn structure_summary(&self) -> String {
        self.slots.structure_summary()
    }

    /// Counters accumulated so far
    pub fn summary(&self) -> EvaluationSummary {
        EvaluationSummary {
            partial_matches_evicted: self.slots.evicted(),
            ..self.summary
        }
    }

    /// Inject an externally computed statistic, e.g. a selectivity matrix
    ///
    /// Takes effect at the next re-optimization point. Ignored when
    /// statistics are disabled.
    pub fn update_statistics(&mut self, kind: StatisticsKind, value: StatisticValue) {
        match self.statistics.as_mut() {
            Some(collector) => collector.update(kind, value),
            None => log::debug!("Statistics disabled, ignoring update for '{}'", kind),
        }
    }

    /// True while a simultaneous swap is in flight
    pub fn is_in_transition(&self) -> bool {
        self.slots.is_in_transition()
    }

    /// Run the ingestion loop until `input` ends, then flush and close `output`
    ///
    /// A record that fails to parse aborts the run with `EngineError::Parse`.
    pub fn eval<I, O, F>(
        &mut self,
        input: &mut I,
        output: &mut O,
        formatter: &F,
    ) -> Result<EvaluationSummary>
    where
        I: InputStream + ?Sized,
        O: OutputStream + ?Sized,
        F: DataFormatter + ?Sized,
    {
        while let Some(raw) = input.next_record()? {
            let payload = formatter.parse_event(&raw)?;
            let event_type = formatter.get_event_type(&payload)?;
            let timestamp = formatter.get_event_timestamp(&payload)?;
            self.summary.events_read += 1;

            let Some(event_type) = self.event_types.get(event_type.as_str()).cloned() else {
                self.summary.events_ignored += 1;
                continue;
            };
            let event = Arc::new(Event::new(self.next_event_id, event_type, payload, timestamp));
            self.next_event_id += 1;

            let matches = self.process_event(event)?;
            self.forward(matches, output)?;
        }

        let remaining = self.slots.flush(&mut self.summary);
        self.forward(remaining, output)?;
        output.close()?;

        self.summary.partial_matches_evicted = self.slots.evicted();
        log::info!("Evaluation finished: {}", self.summary);
        Ok(self.summary)
    }

    fn process_event(&mut self, event: SharedEvent) -> Result<Vec<PatternMatch>> {
        let window = self.pattern.window();
        self.freeze.purge_expired(event.timestamp, window);
        let mut matches = self
            .slots
            .commit_if_due(event.timestamp, window, &mut self.summary);

        if self.statistics.is_some() {
            self.reoptimize(&event)?;
        }

        log::trace!("Delivering {}", event);
        self.slots.deliver(&event, &mut self.freeze);
        matches.extend(self.slots.collect_matches(&mut self.summary));
        Ok(matches)
    }

    fn reoptimize(&mut self, event: &Event) -> Result<()> {
        let Some(collector) = self.statistics.as_mut() else {
            return Ok(());
        };
        collector.handle_event(event);

        let due = self
            .last_reoptimization
            .map_or(true, |last| event.timestamp - last > self.update_time_window);
        if !due {
            return Ok(());
        }
        self.last_reoptimization = Some(event.timestamp);
        self.summary.reoptimization_attempts += 1;

        let snapshot = collector.snapshot();
        if !self.optimizer.should_optimize(&snapshot, &self.pattern) {
            return Ok(());
        }

        let plan = self.optimizer.build_new_plan(&snapshot, &self.pattern)?;
        if plan == *self.slots.latest_plan() {
            log::debug!("Rebuilt plan {} is unchanged, keeping the running tree", plan);
            self.summary.unchanged_plans += 1;
            return Ok(());
        }

        log::info!(
            "Re-optimizing at {}: new plan {}",
            event.timestamp.to_rfc3339(),
            plan.describe(&self.pattern)
        );
        let tree = Tree::instantiate(plan, Arc::clone(&self.pattern), &self.config.storage)?;
        let mark = TransitionMark {
            timestamp: event.timestamp,
            event_id: event.id,
        };
        self.slots.tree_update(tree, mark, &mut self.summary)?;
        self.summary.replans += 1;
        Ok(())
    }

    fn forward<O>(&mut self, matches: Vec<PatternMatch>, output: &mut O) -> Result<()>
    where
        O: OutputStream + ?Sized,
    {
        for matched in matches {
            self.freeze.release(&matched);
            log::debug!("Match {}", matched);
            output.add_item(matched)?;
            self.summary.matches_emitted += 1;
        }
        Ok(())
    }
}
