//! Streaming NDJSON writer and the cache line encoder.
//!
//! Two encodings share the one-object-per-line layout:
//! - cache lines (`encode_record`) carry the full record, schema and lineage
//!   included, so a closed cache replays into identical records;
//! - output lines (`JsonlWriter`) carry only field values, bytes elided.

use std::fs::File;
use std::io::{BufWriter, Write};

use semflow_core::record::DataRecord;

use crate::error::Result;

/// Full-fidelity single-line encoding of one record (trailing newline included).
pub fn encode_record(record: &DataRecord) -> Result<String> {
    let mut line = serde_json::to_string(record)?;
    line.push('\n');
    Ok(line)
}

pub struct JsonlWriter<W: Write> {
    writer: BufWriter<W>,
    written: u64,
}

impl JsonlWriter<File> {
    pub fn to_path(path: &str) -> Result<Self> {
        let f = File::create(path)?;
        Ok(Self::to_writer(f))
    }
}

impl<W: Write> JsonlWriter<W> {
    pub fn to_writer(writer: W) -> Self {
        Self {
            writer: BufWriter::new(writer),
            written: 0,
        }
    }

    /// Write one record as a JSON object of its values.
    pub fn write_record(&mut self, record: &DataRecord) -> Result<()> {
        writeln!(self.writer, "{}", record.as_text_json())?;
        self.written += 1;
        Ok(())
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn finish(mut self) -> Result<u64> {
        self.writer.flush()?;
        Ok(self.written)
    }
}
