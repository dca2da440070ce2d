//! JSON-lines sample reader.
//!
//! One `SensorSample` per line. Blank lines and lines starting with `#` are
//! skipped, so recorded sessions can carry comments.

use crate::collector::channel::CollectorError;
use crate::collector::types::SensorSample;
use std::io::BufRead;

/// Parse one line. `Ok(None)` for blank and comment lines.
pub fn parse_line(line: &str, line_no: usize) -> Result<Option<SensorSample>, CollectorError> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }
    serde_json::from_str(trimmed)
        .map(Some)
        .map_err(|e| CollectorError::Parse {
            line: line_no,
            message: e.to_string(),
        })
}

/// Read every sample from a reader.
pub fn read_samples<R: BufRead>(reader: R) -> Result<Vec<SensorSample>, CollectorError> {
    let mut samples = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| CollectorError::Io(e.to_string()))?;
        if let Some(sample) = parse_line(&line, idx + 1)? {
            samples.push(sample);
        }
    }
    Ok(samples)
}
