//! Core types for the CEP engine
//!
//! This module defines the fundamental values that flow through the engine:
//! immutable input events, completed pattern matches, and the error type shared
//! by every fallible operation.

use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;

/// Logical timestamp type used throughout the engine
pub type Timestamp = DateTime<Utc>;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Parsed event payload (attribute name -> JSON value)
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// A shared, read-only reference to an event.
///
/// The same event may be bound by many partial matches, and during a plan
/// swap by two trees at once.
pub type SharedEvent = Arc<Event>;

/// Errors that can occur while building or running an engine
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),

    #[error("Invalid tree plan: {0}")]
    InvalidPlan(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Failed to parse event: {0}")]
    Parse(String),

    #[error("A tree replacement was requested while another one is still in flight")]
    TransitionInProgress,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A single input event
///
/// Events are created once per raw input record and never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Ingestion sequence number, unique per engine run
    pub id: u64,
    /// Event type name
    pub event_type: Arc<str>,
    /// Attribute values parsed from the raw record
    pub payload: Payload,
    /// Logical timestamp (taken from the payload)
    pub timestamp: Timestamp,
    /// Wall-clock ingestion time
    pub arrival_time: Timestamp,
}

impl Event {
    /// Create a new event stamped with the current wall-clock arrival time
    pub fn new(
        id: u64,
        event_type: impl Into<Arc<str>>,
        payload: Payload,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            id,
            event_type: event_type.into(),
            payload,
            timestamp,
            arrival_time: Utc::now(),
        }
    }

    /// Look up a payload attribute
    pub fn get(&self, field: &str) -> Option<&serde_json::Value> {
        self.payload.get(field)
    }

    /// Ordering key used for sequence constraints: timestamp first, then ingestion order
    pub fn order_key(&self) -> (Timestamp, u64) {
        (self.timestamp, self.id)
    }

    /// True if this event comes strictly before `other` in the stream order
    pub fn precedes(&self, other: &Event) -> bool {
        self.order_key() < other.order_key()
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}@{}", self.event_type, self.id, self.timestamp.to_rfc3339())
    }
}

/// One event bound to a named pattern occurrence
#[derive(Debug, Clone, PartialEq)]
pub struct MatchedEvent {
    /// Name of the primitive occurrence in the pattern
    pub name: Arc<str>,
    /// The bound event
    pub event: SharedEvent,
}

/// A complete match of the pattern
///
/// Events are ordered by their position in the pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternMatch {
    events: Vec<MatchedEvent>,
    first_timestamp: Timestamp,
    last_timestamp: Timestamp,
}

impl PatternMatch {
    /// Create a match from its bound events (must not be empty)
    pub(crate) fn new(events: Vec<MatchedEvent>) -> Option<Self> {
        let first_timestamp = events.iter().map(|m| m.event.timestamp).min()?;
        let last_timestamp = events.iter().map(|m| m.event.timestamp).max()?;
        Some(Self {
            events,
            first_timestamp,
            last_timestamp,
        })
    }

    /// All bound events, in pattern order
    pub fn events(&self) -> &[MatchedEvent] {
        &self.events
    }

    /// Event bound to the given occurrence name
    pub fn event(&self, name: &str) -> Option<&SharedEvent> {
        self.events
            .iter()
            .find(|m| &*m.name == name)
            .map(|m| &m.event)
    }

    /// Earliest member timestamp
    pub fn first_timestamp(&self) -> Timestamp {
        self.first_timestamp
    }

    /// Latest member timestamp
    pub fn last_timestamp(&self) -> Timestamp {
        self.last_timestamp
    }

    /// Ingestion ids of the member events, in pattern order
    ///
    /// Two matches are the same match iff their id lists are equal.
    pub fn event_ids(&self) -> Vec<u64> {
        self.events.iter().map(|m| m.event.id).collect()
    }

    /// True if the given event is part of this match
    pub fn contains(&self, event_id: u64) -> bool {
        self.events.iter().any(|m| m.event.id == event_id)
    }
}

impl fmt::Display for PatternMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, matched) in self.events.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", matched.name, matched.event)?;
        }
        write!(f, "}}")
    }
}
