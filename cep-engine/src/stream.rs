//! Input and output streams consumed by [`EvaluationEngine::eval`](crate::EvaluationEngine::eval)

use crate::types::{PatternMatch, Result};
use std::io::BufRead;

/// An ordered, single-consumer source of raw records
///
/// `Ok(None)` marks the end of the stream.
pub trait InputStream {
    fn next_record(&mut self) -> Result<Option<String>>;
}

/// Sink for completed matches
pub trait OutputStream {
    fn add_item(&mut self, item: PatternMatch) -> Result<()>;

    /// Called once after the last item
    fn close(&mut self) -> Result<()>;
}

/// Line-oriented input; blank lines are skipped
#[derive(Debug)]
pub struct LineInput<R> {
    reader: R,
    line: String,
}

impl<R: BufRead> LineInput<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: String::new(),
        }
    }
}

impl<R: BufRead> InputStream for LineInput<R> {
    fn next_record(&mut self) -> Result<Option<String>> {
        loop {
            self.line.clear();
            if self.reader.read_line(&mut self.line)? == 0 {
                return Ok(None);
            }
            let record = self.line.trim();
            if !record.is_empty() {
                return Ok(Some(record.to_string()));
            }
        }
    }
}

impl InputStream for std::vec::IntoIter<String> {
    fn next_record(&mut self) -> Result<Option<String>> {
        Ok(self.next())
    }
}

/// Keeps every match in memory
#[derive(Debug, Default)]
pub struct CollectingOutput {
    items: Vec<PatternMatch>,
    closed: bool,
}

impl CollectingOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[PatternMatch] {
        &self.items
    }

    pub fn into_items(self) -> Vec<PatternMatch> {
        self.items
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl OutputStream for CollectingOutput {
    fn add_item(&mut self, item: PatternMatch) -> Result<()> {
        self.items.push(item);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}
