//! Raw record formats
//!
//! A [`DataFormatter`] turns one raw input record into a payload and tells
//! the engine the event type and logical timestamp of that payload.

use crate::types::{Payload, Result, Timestamp};

pub mod json;

pub use json::JsonDataFormatter;

/// Common trait for all input record formats
pub trait DataFormatter {
    /// Parse a raw record into an attribute map
    fn parse_event(&self, raw: &str) -> Result<Payload>;

    /// Event type of a parsed payload
    fn get_event_type(&self, payload: &Payload) -> Result<String>;

    /// Logical timestamp of a parsed payload
    fn get_event_timestamp(&self, payload: &Payload) -> Result<Timestamp>;
}
