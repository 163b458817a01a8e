//! Persistence sink for scan reports
//!
//! Reports leave the engine as JSON values. Nothing stored here is ever read
//! back into a live exchange.

use std::io::Write;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::Result;

/// Destination for structured reports
pub trait ReportSink {
    /// Store one report under a kind such as `"emv"` or `"mifare"`
    fn store(&mut self, kind: &str, data: &Value) -> Result<()>;

    /// Serialize and store any report type
    fn store_report<R: Serialize>(&mut self, kind: &str, report: &R) -> Result<()>
    where
        Self: Sized,
    {
        let value = serde_json::to_value(report)?;
        self.store(kind, &value)
    }
}

/// Writes one `{"kind": ..., "data": ...}` object per line
#[derive(Debug)]
pub struct JsonLinesSink<W: Write> {
    writer: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> ReportSink for JsonLinesSink<W> {
    fn store(&mut self, kind: &str, data: &Value) -> Result<()> {
        let line = json!({ "kind": kind, "data": data });
        serde_json::to_writer(&mut self.writer, &line)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        debug!(kind, "Report stored");
        Ok(())
    }
}

/// Keeps reports in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    pub entries: Vec<(String, Value)>,
}

impl ReportSink for MemorySink {
    fn store(&mut self, kind: &str, data: &Value) -> Result<()> {
        self.entries.push((kind.to_string(), data.clone()));
        Ok(())
    }
}
