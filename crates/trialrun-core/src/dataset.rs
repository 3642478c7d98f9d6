//! In-place rewrite of the `dataset` field of formatted JSONL input.

use std::fs;
use std::io::Write;
use std::path::Path;

use serde_json::Value;
use tempfile::NamedTempFile;

use crate::error::{Result, TrialError};

/// Field of every formatted-input record naming the dataset family.
pub const DATASET_FIELD: &str = "dataset";

/// Set the `dataset` field of every record in `path` to `token`.
///
/// Existing values are replaced. Blank lines are dropped. The file is
/// rewritten atomically. Returns the number of records rewritten.
pub fn rewrite_dataset_field(path: &Path, token: &str) -> Result<usize> {
    let content = fs::read_to_string(path)?;
    let mut out = String::with_capacity(content.len());
    let mut records = 0;

    for (idx, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let mut record: Value = serde_json::from_str(line).map_err(|e| TrialError::MalformedInput {
            line: idx + 1,
            reason: e.to_string(),
        })?;
        let obj = record.as_object_mut().ok_or_else(|| TrialError::MalformedInput {
            line: idx + 1,
            reason: "record is not a JSON object".to_string(),
        })?;
        obj.insert(DATASET_FIELD.to_string(), Value::String(token.to_string()));

        out.push_str(&serde_json::to_string(&record)?);
        out.push('\n');
        records += 1;
    }

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(out.as_bytes())?;
    tmp.persist(path).map_err(|e| e.error)?;

    Ok(records)
}
