//! Structured-data extraction
//!
//! Any JSON object/array substring that parses successfully and is
//! substantial becomes an artifact. The artifact kind is chosen by shape
//! sniffing: chart-shaped objects (`labels` + `datasets`), arrays of
//! uniform-key objects (table), everything else plain JSON.

use serde_json::{json, Value};

use super::artifact::{Artifact, ArtifactKind};

/// Objects need more than this many keys to be substantial...
const MIN_OBJECT_KEYS: usize = 2;
/// ...or a serialized length above this
const MIN_OBJECT_LEN: usize = 100;
/// Arrays need more than one element
const MIN_ARRAY_LEN: usize = 1;

/// Extract substantial JSON values embedded in the text.
pub fn extract_structured_data(text: &str) -> Vec<Artifact> {
    let mut artifacts = Vec::new();
    let bytes = text.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        let open = bytes[i];
        if open != b'{' && open != b'[' {
            i += 1;
            continue;
        }

        match balanced_end(bytes, i) {
            Some(end) => {
                let candidate = &text[i..end];
                match serde_json::from_str::<Value>(candidate) {
                    Ok(value) if is_substantial(&value, candidate) => {
                        artifacts.push(data_artifact(candidate, &value));
                        i = end;
                    }
                    _ => i += 1,
                }
            }
            None => i += 1,
        }
    }

    artifacts
}

/// Find the end (exclusive) of a balanced bracket run starting at `start`,
/// respecting JSON string escapes.
fn balanced_end(bytes: &[u8], start: usize) -> Option<usize> {
    let open = bytes[start];
    let close = if open == b'{' { b'}' } else { b']' };

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }

        match b {
            b'"' => in_string = true,
            _ if b == open => depth += 1,
            _ if b == close => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(start + offset + 1);
                }
            }
            _ => {}
        }
    }

    None
}

fn is_substantial(value: &Value, raw: &str) -> bool {
    match value {
        Value::Object(map) => map.len() > MIN_OBJECT_KEYS || raw.len() > MIN_OBJECT_LEN,
        Value::Array(items) => items.len() > MIN_ARRAY_LEN,
        _ => false,
    }
}

fn data_artifact(raw: &str, value: &Value) -> Artifact {
    match sniff_shape(value) {
        DataShape::Chart => Artifact::new(ArtifactKind::Chart, "Chart data", raw)
            .with_metadata("format", json!("chartjs")),
        DataShape::Table { rows, columns } => {
            Artifact::new(ArtifactKind::Table, "Data table", raw)
                .with_metadata("row_count", json!(rows))
                .with_metadata("column_count", json!(columns))
                .with_metadata("source", json!("json"))
        }
        DataShape::Json => Artifact::new(ArtifactKind::Json, "JSON data", raw),
    }
}

enum DataShape {
    Chart,
    Table { rows: usize, columns: usize },
    Json,
}

fn sniff_shape(value: &Value) -> DataShape {
    if let Value::Object(map) = value {
        if map.contains_key("labels") && map.contains_key("datasets") {
            return DataShape::Chart;
        }
    }

    if let Value::Array(items) = value {
        if items.len() > MIN_ARRAY_LEN && uniform_object_keys(items) {
            let columns = items[0].as_object().map(|o| o.len()).unwrap_or(0);
            return DataShape::Table {
                rows: items.len(),
                columns,
            };
        }
    }

    DataShape::Json
}

/// All elements are objects sharing the same key set.
fn uniform_object_keys(items: &[Value]) -> bool {
    let first = match items.first().and_then(Value::as_object) {
        Some(obj) if !obj.is_empty() => obj,
        _ => return false,
    };
    let keys: Vec<&String> = first.keys().collect();

    items.iter().all(|item| {
        item.as_object()
            .map(|obj| obj.len() == keys.len() && keys.iter().all(|k| obj.contains_key(*k)))
            .unwrap_or(false)
    })
}
