use std::io::Write;

use anyhow::{Context, Result};
use serde_json::Value;

use crate::error::{ArchiveError, ArchiveResult};
use crate::hubstorage::CollectionStore;

/// Converts a `--filter` JSON object into collection query parameters.
///
/// Arrays repeat their key, strings are passed verbatim, nulls are dropped and
/// any other value is sent as its JSON text.
pub fn parse_filter(raw: Option<&str>) -> ArchiveResult<Vec<(String, String)>> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(Vec::new());
    };
    let parsed: Value = serde_json::from_str(raw)
        .map_err(|err| ArchiveError::config(format!("Failed to parse --filter: {err}")))?;
    let Value::Object(map) = parsed else {
        return Err(ArchiveError::config(
            "Failed to parse --filter: expected a JSON object",
        ));
    };

    let mut pairs = Vec::new();
    for (name, value) in map {
        match value {
            Value::Array(values) => {
                for value in values {
                    push_scalar(&mut pairs, &name, value);
                }
            }
            other => push_scalar(&mut pairs, &name, other),
        }
    }
    Ok(pairs)
}

fn push_scalar(pairs: &mut Vec<(String, String)>, name: &str, value: Value) {
    match value {
        Value::Null => {}
        Value::String(s) => pairs.push((name.to_string(), s)),
        other => pairs.push((name.to_string(), other.to_string())),
    }
}

/// Writes every raw record of `collection` to `out`, one per line.
pub fn dump_records<S, W>(
    store: &S,
    collection: &str,
    filter: &[(String, String)],
    out: &mut W,
) -> Result<u64>
where
    S: CollectionStore + ?Sized,
    W: Write,
{
    let mut count = 0u64;
    for record in store
        .iter_json(collection, filter)
        .with_context(|| format!("failed to read collection `{collection}`"))?
    {
        let record = record.with_context(|| format!("failed to read collection `{collection}`"))?;
        writeln!(out, "{record}")?;
        count += 1;
    }
    out.flush()?;
    Ok(count)
}
