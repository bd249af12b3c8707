//! Decoder for cache lines written by `writers::jsonl::encode_record`.

use semflow_core::record::DataRecord;

use crate::error::Result;

/// Decode every non-blank line of a cache segment, in write order.
pub fn decode_records(bytes: &[u8]) -> Result<Vec<DataRecord>> {
    let text = String::from_utf8_lossy(bytes);
    let mut out = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        out.push(serde_json::from_str(line)?);
    }
    Ok(out)
}
