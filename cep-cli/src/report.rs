//! Match output
//!
//! Writes every completed match as one JSON object per line.

use cep_engine::{OutputStream, Payload, PatternMatch};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};

/// On-disk shape of one match
#[derive(Debug, Serialize)]
pub struct MatchRecord<'a> {
    pub first_timestamp: String,
    pub last_timestamp: String,
    pub events: Vec<EventRecord<'a>>,
}

#[derive(Debug, Serialize)]
pub struct EventRecord<'a> {
    pub name: &'a str,
    #[serde(rename = "type")]
    pub event_type: &'a str,
    pub id: u64,
    pub timestamp: String,
    pub payload: &'a Payload,
}

impl<'a> From<&'a PatternMatch> for MatchRecord<'a> {
    fn from(matched: &'a PatternMatch) -> Self {
        Self {
            first_timestamp: matched.first_timestamp().to_rfc3339(),
            last_timestamp: matched.last_timestamp().to_rfc3339(),
            events: matched
                .events()
                .iter()
                .map(|m| EventRecord {
                    name: &m.name,
                    event_type: &m.event.event_type,
                    id: m.event.id,
                    timestamp: m.event.timestamp.to_rfc3339(),
                    payload: &m.event.payload,
                })
                .collect(),
        }
    }
}

/// JSON Lines sink over any writer
pub struct JsonLinesOutput<W: Write> {
    writer: W,
    written: usize,
}

impl<W: Write> JsonLinesOutput<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, written: 0 }
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> OutputStream for JsonLinesOutput<W> {
    fn add_item(&mut self, item: PatternMatch) -> cep_engine::Result<()> {
        serde_json::to_writer(&mut self.writer, &MatchRecord::from(&item))?;
        self.writer.write_all(b"\n")?;
        self.written += 1;
        Ok(())
    }

    fn close(&mut self) -> cep_engine::Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// `<dir>/<input stem>.matches.jsonl`
pub fn output_path(dir: &Path, input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "input".to_string());
    dir.join(format!("{}.matches.jsonl", stem))
}
