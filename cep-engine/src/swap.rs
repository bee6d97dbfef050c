//! Tree slots and the two tree replacement protocols
//!
//! The engine owns exactly one [`TreeSlots`]. In the common case it holds a
//! single authoritative tree. A simultaneous swap adds a second, pending tree
//! that receives every event alongside the old one until the transition is
//! committed; a trivial swap replaces the tree in place by replaying the old
//! tree's buffered leaf events into the new one.

use crate::config::SwapStrategyKind;
use crate::engine::EvaluationSummary;
use crate::freeze::FreezeState;
use crate::plan::TreePlan;
use crate::tree::Tree;
use crate::types::{EngineError, PatternMatch, Result, SharedEvent, Timestamp};
use chrono::Duration;
use std::collections::HashMap;
use std::sync::Arc;

/// Point in the stream where a simultaneous transition started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionMark {
    /// Logical timestamp of the triggering event
    pub timestamp: Timestamp,
    /// Ingestion id of the triggering event
    pub event_id: u64,
}

impl TransitionMark {
    /// True if every member of `matched` was ingested at or after the mark
    pub fn covers(&self, matched: &PatternMatch) -> bool {
        matched
            .events()
            .iter()
            .all(|member| member.event.id >= self.event_id)
    }
}

/// A tree with its listener map (event type -> leaf indices)
#[derive(Debug)]
pub(crate) struct ActiveTree {
    tree: Tree,
    listeners: HashMap<Arc<str>, Vec<usize>>,
}

impl ActiveTree {
    pub fn new(tree: Tree) -> Self {
        let mut listeners: HashMap<Arc<str>, Vec<usize>> = HashMap::new();
        for leaf in tree.leaves() {
            listeners
                .entry(Arc::clone(leaf.event_type()))
                .or_default()
                .push(leaf.index());
        }
        Self { tree, listeners }
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    /// Deliver `event` to every listening leaf not masked by a freezer
    fn deliver(&mut self, event: &SharedEvent, freeze: &mut FreezeState) {
        self.tree.advance_clock(event.timestamp);
        let Some(leaves) = self.listeners.get(&event.event_type) else {
            return;
        };
        for &leaf in leaves {
            let Some(name) = self.tree.leaf(leaf).map(|l| Arc::clone(l.name())) else {
                continue;
            };
            if freeze.is_masked(&name, event) {
                log::trace!("{} masked on leaf '{}'", event, name);
                continue;
            }
            freeze.register(&name, event);
            self.tree.handle_event(leaf, Arc::clone(event));
        }
    }
}

#[derive(Debug)]
struct Transition {
    pending: ActiveTree,
    mark: TransitionMark,
}

/// The authoritative tree and, during a transition, its successor
#[derive(Debug)]
pub(crate) struct TreeSlots {
    strategy: SwapStrategyKind,
    current: ActiveTree,
    transition: Option<Transition>,
    /// Evictions of trees that are no longer live
    retired_evictions: u64,
}

impl TreeSlots {
    pub fn new(strategy: SwapStrategyKind, tree: Tree) -> Self {
        Self {
            strategy,
            current: ActiveTree::new(tree),
            transition: None,
            retired_evictions: 0,
        }
    }

    pub fn is_in_transition(&self) -> bool {
        self.transition.is_some()
    }

    /// Partial matches evicted by full node stores, across every tree so far
    pub fn evicted(&self) -> u64 {
        self.retired_evictions
            + self.current.tree().evicted_count()
            + self
                .transition
                .as_ref()
                .map_or(0, |t| t.pending.tree().evicted_count())
    }

    /// Plan of the newest live tree
    pub fn latest_plan(&self) -> &TreePlan {
        match &self.transition {
            Some(transition) => transition.pending.tree().plan(),
            None => self.current.tree().plan(),
        }
    }

    pub fn structure_summary(&self) -> String {
        match &self.transition {
            Some(transition) => format!(
                "{} -> {}",
                self.current.tree().structure_summary(),
                transition.pending.tree().structure_summary()
            ),
            None => self.current.tree().structure_summary(),
        }
    }

    /// Replace the running tree using the configured protocol
    pub fn tree_update(
        &mut self,
        new_tree: Tree,
        mark: TransitionMark,
        summary: &mut EvaluationSummary,
    ) -> Result<()> {
        match self.strategy {
            SwapStrategyKind::Trivial => {
                let replay = self.current.tree.buffered_events();
                let mut incoming = ActiveTree::new(new_tree);
                for (leaf, event) in &replay {
                    incoming.tree.handle_event(*leaf, Arc::clone(event));
                }
                let discarded = incoming.tree.discard_ready();

                log::info!(
                    "Swapped tree {} for {} (replayed {} events, discarded {} replayed matches)",
                    self.current.tree().structure_summary(),
                    incoming.tree().structure_summary(),
                    replay.len(),
                    discarded
                );
                self.retired_evictions += self.current.tree().evicted_count();
                self.current = incoming;
                summary.trivial_swaps += 1;
            }
            SwapStrategyKind::Simultaneous => {
                if self.transition.is_some() {
                    return Err(EngineError::TransitionInProgress);
                }
                log::info!(
                    "Starting transition from {} to {} at event #{}",
                    self.current.tree().structure_summary(),
                    new_tree.structure_summary(),
                    mark.event_id
                );
                self.transition = Some(Transition {
                    pending: ActiveTree::new(new_tree),
                    mark,
                });
                summary.transitions_begun += 1;
            }
        }
        Ok(())
    }

    /// Feed one event to every live tree
    pub fn deliver(&mut self, event: &SharedEvent, freeze: &mut FreezeState) {
        self.current.deliver(event, freeze);
        if let Some(transition) = &mut self.transition {
            transition.pending.deliver(event, freeze);
        }
    }

    /// Matches completed since the last call, old-tree duplicates removed
    pub fn collect_matches(&mut self, summary: &mut EvaluationSummary) -> Vec<PatternMatch> {
        let mark = self.transition.as_ref().map(|t| t.mark);
        let mut out = Vec::new();
        keep_unsuppressed(self.current.tree.get_matches(), mark, summary, &mut out);
        if let Some(transition) = &mut self.transition {
            out.extend(transition.pending.tree.get_matches());
        }
        out
    }

    /// Commit an in-flight transition once it has lasted longer than `window`
    ///
    /// Returns the old tree's last releasable matches.
    pub fn commit_if_due(
        &mut self,
        now: Timestamp,
        window: Duration,
        summary: &mut EvaluationSummary,
    ) -> Vec<PatternMatch> {
        if !self
            .transition
            .as_ref()
            .is_some_and(|t| now - t.mark.timestamp > window)
        {
            return Vec::new();
        }
        let Some(transition) = self.transition.take() else {
            return Vec::new();
        };

        self.current.tree.advance_clock(now);
        let mut out = Vec::new();
        keep_unsuppressed(
            self.current.tree.get_matches(),
            Some(transition.mark),
            summary,
            &mut out,
        );

        let old = std::mem::replace(&mut self.current, transition.pending);
        self.retired_evictions += old.tree().evicted_count();
        log::debug!(
            "Committed transition: {} replaces {}",
            self.current.tree().structure_summary(),
            old.tree().structure_summary()
        );
        summary.transitions_committed += 1;
        out
    }

    /// Release everything still pending in every live tree
    pub fn flush(&mut self, summary: &mut EvaluationSummary) -> Vec<PatternMatch> {
        let mark = self.transition.as_ref().map(|t| t.mark);
        let mut out = Vec::new();
        keep_unsuppressed(self.current.tree.get_last_matches(), mark, summary, &mut out);
        if let Some(transition) = &mut self.transition {
            out.extend(transition.pending.tree.get_last_matches());
        }
        out
    }
}

/// Drop old-tree matches the pending tree is guaranteed to produce as well
fn keep_unsuppressed(
    matches: impl Iterator<Item = PatternMatch>,
    mark: Option<TransitionMark>,
    summary: &mut EvaluationSummary,
    out: &mut Vec<PatternMatch>,
) {
    for matched in matches {
        match mark {
            Some(mark) if mark.covers(&matched) => {
                log::debug!("Suppressed old-tree match {}", matched);
                summary.matches_suppressed += 1;
            }
            _ => out.push(matched),
        }
    }
}
