//! JSON lines input

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::warn;

/// Parsed records plus the lines that could not be decoded
#[derive(Debug)]
pub struct JsonlInput<T> {
    pub records: Vec<T>,
    /// (1-based line number, decode error)
    pub rejected: Vec<(usize, String)>,
}

/// Read one JSON object per line; blank lines are skipped
pub fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<JsonlInput<T>> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    parse_jsonl(BufReader::new(file))
        .with_context(|| format!("failed to read {}", path.display()))
}

pub fn parse_jsonl<T: DeserializeOwned, R: BufRead>(reader: R) -> Result<JsonlInput<T>> {
    let mut records = Vec::new();
    let mut rejected = Vec::new();

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<T>(&line) {
            Ok(record) => records.push(record),
            Err(e) => {
                warn!("Line {}: {}", idx + 1, e);
                rejected.push((idx + 1, e.to_string()));
            }
        }
    }

    Ok(JsonlInput { records, rejected })
}
