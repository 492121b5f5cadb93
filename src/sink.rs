// SPDX-License-Identifier: Apache-2.0

//! Event sinks.
//!
//! A sink accepts events one at a time and commits them on flush. The
//! import loop only assumes the flush barrier: `add` may buffer, and
//! nothing is durable from the sink's perspective until `flush` returns.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::error::{Error, Result};
use crate::eve::EveEvent;

pub trait EventSink {
    /// Accept one event. May buffer.
    fn add(&mut self, event: EveEvent) -> Result<()>;

    /// Commit all previously-added events. Idempotent on a quiescent sink.
    fn flush(&mut self) -> Result<()>;
}

/// Writes events as newline-delimited JSON to a file or stdout.
pub struct NdjsonSink {
    writer: BufWriter<Box<dyn Write + Send>>,
}

impl NdjsonSink {
    /// Create a sink writing to `output`, or to stdout when `output` is
    /// `None`.
    pub fn create(output: Option<&Path>) -> Result<Self> {
        let writer: Box<dyn Write + Send> = match output {
            Some(path) => {
                let file = File::create(path).map_err(|e| {
                    Error::Sink(format!("failed to create output {}: {}", path.display(), e))
                })?;
                Box::new(file)
            }
            None => Box::new(io::stdout()),
        };
        Ok(Self {
            writer: BufWriter::new(writer),
        })
    }
}

impl EventSink for NdjsonSink {
    fn add(&mut self, event: EveEvent) -> Result<()> {
        serde_json::to_writer(&mut self.writer, event.value())
            .map_err(|e| Error::Sink(format!("failed to write event: {}", e)))?;
        self.writer
            .write_all(b"\n")
            .map_err(|e| Error::Sink(format!("failed to write event: {}", e)))?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer
            .flush()
            .map_err(|e| Error::Sink(format!("failed to flush sink: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eve;
    use tempfile::TempDir;

    #[test]
    fn test_writes_ndjson() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.ndjson");

        let mut sink = NdjsonSink::create(Some(&path)).unwrap();
        sink.add(eve::decode(br#"{"event_type":"alert","n":1}"#).unwrap())
            .unwrap();
        sink.add(eve::decode(br#"{"event_type":"dns","n":2}"#).unwrap())
            .unwrap();
        sink.flush().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["event_type"], "alert");
    }

    #[test]
    fn test_flush_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.ndjson");

        let mut sink = NdjsonSink::create(Some(&path)).unwrap();
        sink.add(eve::decode(br#"{"event_type":"flow"}"#).unwrap())
            .unwrap();
        sink.flush().unwrap();
        sink.flush().unwrap();
        sink.flush().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 1);
    }

    #[test]
    fn test_create_fails_on_bad_path() {
        let result = NdjsonSink::create(Some(Path::new("/nonexistent-dir/out.ndjson")));
        assert!(result.is_err());
    }
}
