//! "Freeze" consumption policy bookkeeping

use crate::pattern::Pattern;
use crate::types::{Event, PatternMatch, Timestamp};
use chrono::Duration;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// An event delivered to a freeze-trigger leaf that is still waiting to be
/// matched or to expire
#[derive(Debug, Clone, PartialEq)]
struct Freezer {
    event_id: u64,
    timestamp: Timestamp,
    trigger: Arc<str>,
}

/// Active freezers of one engine
#[derive(Debug, Default)]
pub(crate) struct FreezeState {
    propagation: HashMap<String, HashSet<String>>,
    active: Vec<Freezer>,
}

impl FreezeState {
    pub fn new(pattern: &Pattern) -> Self {
        Self {
            propagation: pattern.freeze_propagation().clone(),
            active: Vec::new(),
        }
    }

    /// True if `event` must not be delivered to the leaf named `leaf`
    ///
    /// A freezer never masks the event that registered it.
    pub fn is_masked(&self, leaf: &str, event: &Event) -> bool {
        self.active.iter().any(|freezer| {
            freezer.event_id != event.id
                && self
                    .propagation
                    .get(&*freezer.trigger)
                    .is_some_and(|masked| masked.contains(leaf))
        })
    }

    /// Register `event` as a freezer if `leaf` is a freeze trigger
    pub fn register(&mut self, leaf: &Arc<str>, event: &Event) {
        if !self.propagation.contains_key(&**leaf) {
            return;
        }
        let known = self
            .active
            .iter()
            .any(|f| f.event_id == event.id && f.trigger == *leaf);
        if !known {
            log::trace!("{} freezes dependents of '{}'", event, leaf);
            self.active.push(Freezer {
                event_id: event.id,
                timestamp: event.timestamp,
                trigger: Arc::clone(leaf),
            });
        }
    }

    /// Drop freezers older than `window` relative to `now`
    pub fn purge_expired(&mut self, now: Timestamp, window: Duration) {
        self.active.retain(|freezer| now - freezer.timestamp <= window);
    }

    /// Drop freezers whose event took part in `matched`
    pub fn release(&mut self, matched: &PatternMatch) {
        if !self.active.is_empty() {
            self.active.retain(|freezer| !matched.contains(freezer.event_id));
        }
    }
}
