//! Table extraction: markdown pipe tables and CSV-like blocks
//!
//! Both variants are converted to an ordered list of row objects keyed by
//! the header names, attached as metadata; the raw block is kept as the
//! artifact content.

use serde_json::{json, Map, Value};

use super::artifact::{Artifact, ArtifactKind};

/// Minimum shape for a comma-delimited block to count as a table
const CSV_MIN_COLUMNS: usize = 3;
const CSV_MIN_ROWS: usize = 3;

/// Extract all tables from the text, markdown-pipe first.
pub fn extract_tables(text: &str) -> Vec<Artifact> {
    let mut artifacts = extract_markdown_tables(text);
    artifacts.extend(extract_csv_blocks(text));
    artifacts
}

fn extract_markdown_tables(text: &str) -> Vec<Artifact> {
    let lines: Vec<&str> = text.lines().collect();
    let mut artifacts = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        if !is_pipe_row(lines[i]) {
            i += 1;
            continue;
        }

        // A table needs header | separator | at least one data row
        if i + 2 < lines.len() && is_separator_row(lines[i + 1]) && is_pipe_row(lines[i + 2]) {
            let headers = split_pipe_row(lines[i]);
            let mut rows = Vec::new();
            let mut end = i + 2;

            while end < lines.len() && is_pipe_row(lines[end]) {
                rows.push(row_object(&headers, &split_pipe_row(lines[end])));
                end += 1;
            }

            let block = lines[i..end].join("\n");
            artifacts.push(table_artifact(block, &headers, rows));
            i = end;
        } else {
            i += 1;
        }
    }

    artifacts
}

fn extract_csv_blocks(text: &str) -> Vec<Artifact> {
    let lines: Vec<&str> = text.lines().collect();
    let mut artifacts = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let cols = comma_columns(lines[i]);
        if cols < CSV_MIN_COLUMNS || is_pipe_row(lines[i]) {
            i += 1;
            continue;
        }

        // Grow the block while the column count stays stable
        let mut end = i + 1;
        while end < lines.len() && comma_columns(lines[end]) == cols && !is_pipe_row(lines[end]) {
            end += 1;
        }

        if end - i >= CSV_MIN_ROWS {
            let headers: Vec<String> = lines[i]
                .split(',')
                .map(|h| h.trim().to_string())
                .collect();
            let rows: Vec<Value> = lines[i + 1..end]
                .iter()
                .map(|line| {
                    let cells: Vec<String> =
                        line.split(',').map(|c| c.trim().to_string()).collect();
                    row_object(&headers, &cells)
                })
                .collect();

            let block = lines[i..end].join("\n");
            artifacts.push(table_artifact(block, &headers, rows));
            i = end;
        } else {
            i += 1;
        }
    }

    artifacts
}

fn table_artifact(block: String, headers: &[String], rows: Vec<Value>) -> Artifact {
    let row_count = rows.len();
    Artifact::new(ArtifactKind::Table, "Table", block)
        .with_metadata("headers", json!(headers))
        .with_metadata("rows", Value::Array(rows))
        .with_metadata("row_count", json!(row_count))
        .with_metadata("column_count", json!(headers.len()))
}

fn row_object(headers: &[String], cells: &[String]) -> Value {
    let mut object = Map::new();
    for (idx, header) in headers.iter().enumerate() {
        let cell = cells.get(idx).cloned().unwrap_or_default();
        object.insert(header.clone(), Value::String(cell));
    }
    Value::Object(object)
}

fn is_pipe_row(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.starts_with('|') && trimmed.len() > 1 && trimmed.matches('|').count() >= 2
}

fn is_separator_row(line: &str) -> bool {
    let trimmed = line.trim();
    if !is_pipe_row(trimmed) {
        return false;
    }
    trimmed
        .trim_matches('|')
        .split('|')
        .all(|cell| !cell.trim().is_empty() && cell.trim().chars().all(|c| c == '-' || c == ':'))
}

fn split_pipe_row(line: &str) -> Vec<String> {
    line.trim()
        .trim_matches('|')
        .split('|')
        .map(|cell| cell.trim().to_string())
        .collect()
}

fn comma_columns(line: &str) -> usize {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return 0;
    }
    trimmed.split(',').count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markdown_table() {
        let text = "Intro\n\n| Name | Age | City |\n|------|-----|------|\n| Ana | 30 | Lima |\n| Bo | 25 | Oslo |\n| Cy | 41 | Rome |\n\nOutro";
        let tables = extract_tables(text);
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].metadata["row_count"], 3);
        assert_eq!(tables[0].metadata["column_count"], 3);
        assert_eq!(tables[0].metadata["rows"][0]["Name"], "Ana");
    }

    #[test]
    fn test_csv_block() {
        let text = "id,name,score\n1,ana,90\n2,bo,85\n3,cy,70";
        let tables = extract_tables(text);
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].metadata["row_count"], 3);
        assert_eq!(tables[0].metadata["rows"][1]["name"], "bo");
    }

    #[test]
    fn test_csv_too_narrow_is_skipped() {
        // Only two columns: prose with commas, not a table
        let text = "one,two\nthree,four\nfive,six";
        assert!(extract_tables(text).is_empty());
    }

    #[test]
    fn test_csv_too_short_is_skipped() {
        let text = "a,b,c\n1,2,3";
        assert!(extract_tables(text).is_empty());
    }

    #[test]
    fn test_ragged_row_padded() {
        let text = "| A | B |\n|---|---|\n| 1 |\n| 2 | 3 |\n| 4 | 5 |";
        let tables = extract_tables(text);
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].metadata["rows"][0]["B"], "");
    }
}
