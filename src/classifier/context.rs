//! Context-aware extraction
//!
//! This stage only runs when the user's own message carries trigger words
//! (visualization / API / SQL). It then looks for matching shapes in the
//! response and creates a typed artifact even when the earlier stages did
//! not fire.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::json;

use super::artifact::{Artifact, ArtifactKind};

const CHART_TRIGGERS: &[&str] = &[
    "chart",
    "plot",
    "graph",
    "visualize",
    "visualization",
    "diagram",
];
const API_TRIGGERS: &[&str] = &["api", "endpoint", "rest", "swagger", "openapi"];
const SQL_TRIGGERS: &[&str] = &["sql", "query", "database", "select", "schema"];

lazy_static! {
    static ref NUMBER_ARRAY: Regex =
        Regex::new(r"\[\s*-?\d+(\.\d+)?(\s*,\s*-?\d+(\.\d+)?){2,}\s*\]").unwrap();
    static ref HTTP_ENDPOINT: Regex =
        Regex::new(r"(?m)\b(GET|POST|PUT|DELETE|PATCH|HEAD)\s+(/[\w/{}:.\-]*)").unwrap();
    static ref SQL_STATEMENT: Regex = Regex::new(
        r"(?is)\b(SELECT\b.+?\bFROM\b.+?|INSERT\s+INTO\b.+?|UPDATE\b.+?\bSET\b.+?|CREATE\s+TABLE\b.+?)(;|\n\n|$)"
    )
    .unwrap();
}

/// Extract context-gated artifacts from the response.
pub fn extract_contextual(response: &str, user_message: &str) -> Vec<Artifact> {
    let user = user_message.to_lowercase();
    let mut artifacts = Vec::new();

    if contains_any(&user, CHART_TRIGGERS) {
        for m in NUMBER_ARRAY.find_iter(response) {
            let values: Vec<f64> = m
                .as_str()
                .trim_matches(|c| c == '[' || c == ']')
                .split(',')
                .filter_map(|v| v.trim().parse().ok())
                .collect();

            artifacts.push(
                Artifact::new(ArtifactKind::Chart, "Chart data", m.as_str())
                    .with_metadata("values", json!(values))
                    .with_metadata("source", json!("context")),
            );
        }
    }

    if contains_any(&user, API_TRIGGERS) {
        let endpoints: Vec<String> = HTTP_ENDPOINT
            .captures_iter(response)
            .map(|c| format!("{} {}", &c[1], &c[2]))
            .collect();

        if !endpoints.is_empty() {
            let content = endpoints.join("\n");
            artifacts.push(
                Artifact::new(ArtifactKind::Markdown, "API endpoints", content)
                    .with_metadata("endpoint_count", json!(endpoints.len()))
                    .with_metadata("source", json!("context")),
            );
        }
    }

    if contains_any(&user, SQL_TRIGGERS) {
        for capture in SQL_STATEMENT.captures_iter(response) {
            let statement = capture.get(1).map(|m| m.as_str().trim()).unwrap_or("");
            if statement.is_empty() {
                continue;
            }
            artifacts.push(
                Artifact::new(ArtifactKind::Code, "SQL query", statement)
                    .with_language("sql")
                    .with_metadata("source", json!("context")),
            );
        }
    }

    artifacts
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chart_trigger_with_number_array() {
        let artifacts = extract_contextual(
            "Monthly totals: [12, 34, 56, 78]",
            "Can you plot the monthly totals?",
        );
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].kind, ArtifactKind::Chart);
        assert_eq!(artifacts[0].metadata["values"], json!([12.0, 34.0, 56.0, 78.0]));
    }

    #[test]
    fn test_no_trigger_no_extraction() {
        let artifacts = extract_contextual("Totals: [12, 34, 56, 78]", "what are the totals");
        assert!(artifacts.is_empty());
    }

    #[test]
    fn test_api_endpoints() {
        let artifacts = extract_contextual(
            "Use GET /users/{id} to fetch and DELETE /users/{id} to remove.",
            "document the api",
        );
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].kind, ArtifactKind::Markdown);
        assert_eq!(artifacts[0].metadata["endpoint_count"], 2);
    }

    #[test]
    fn test_sql_extraction() {
        let artifacts = extract_contextual(
            "Try this:\nSELECT id, name FROM users WHERE active = 1;",
            "write the sql query",
        );
        assert!(artifacts
            .iter()
            .any(|a| a.kind == ArtifactKind::Code && a.language.as_deref() == Some("sql")));
    }
}
