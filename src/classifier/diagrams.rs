//! Diagram-language detection
//!
//! Recognizes fenced blocks already tagged as diagram syntax, and falls
//! back to unmarked runs of lines that look like diagram source (arrows,
//! node brackets, `subgraph`/`end` pairs). The diagram type is labeled by
//! keyword sniffing.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::json;

use super::artifact::{Artifact, ArtifactKind};

lazy_static! {
    static ref ARROW: Regex = Regex::new(r"-->|---|->>|-\.->|==>|\s->\s").unwrap();
    static ref NODE_BRACKET: Regex =
        Regex::new(r"\w+\[[^\]]+\]|\w+\{[^}]+\}|\w+\(\([^)]+\)\)").unwrap();
    static ref DIAGRAM_HEADER: Regex = Regex::new(
        r"(?m)^\s*(graph\s+(TD|TB|LR|RL|BT)|flowchart\s+\w+|sequenceDiagram|classDiagram|stateDiagram(-v2)?|erDiagram|gantt|pie|journey|mindmap)\b"
    )
    .unwrap();
}

/// Keyword → diagram type, first hit wins
const DIAGRAM_TYPES: &[(&str, &str)] = &[
    ("sequenceDiagram", "sequence"),
    ("classDiagram", "class"),
    ("stateDiagram", "state"),
    ("erDiagram", "entity-relationship"),
    ("gantt", "gantt"),
    ("pie", "pie"),
    ("journey", "journey"),
    ("mindmap", "mindmap"),
    ("flowchart", "flowchart"),
    ("graph", "flowchart"),
];

/// Extract diagram artifacts from unmarked text (fenced diagram blocks are
/// handled by the code stage and routed here via [`diagram_from_block`]).
pub fn extract_unmarked_diagrams(text: &str) -> Vec<Artifact> {
    let lines: Vec<&str> = text.lines().collect();
    let mut artifacts = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        if !looks_like_diagram_line(lines[i]) {
            i += 1;
            continue;
        }

        let mut end = i + 1;
        while end < lines.len()
            && (looks_like_diagram_line(lines[end]) || lines[end].trim().is_empty())
        {
            end += 1;
        }
        // Drop trailing blank lines from the run
        while end > i && lines[end - 1].trim().is_empty() {
            end -= 1;
        }

        let block = lines[i..end].join("\n");
        if is_plausible_diagram(&block) {
            artifacts.push(diagram_artifact(&block, false));
            i = end;
        } else {
            i += 1;
        }
    }

    artifacts
}

/// Build a diagram artifact from an already-extracted fenced block.
pub fn diagram_from_block(block: &str) -> Artifact {
    diagram_artifact(block, true)
}

/// Whether a fence hint names a diagram language.
pub fn is_diagram_hint(hint: &str) -> bool {
    matches!(hint.trim().to_lowercase().as_str(), "mermaid")
}

fn diagram_artifact(block: &str, fenced: bool) -> Artifact {
    Artifact::new(ArtifactKind::Mermaid, "Diagram", block)
        .with_metadata("diagram_type", json!(sniff_type(block)))
        .with_metadata("fenced", json!(fenced))
}

/// Label the diagram type by keyword sniffing.
fn sniff_type(block: &str) -> &'static str {
    for (keyword, label) in DIAGRAM_TYPES {
        if block.contains(keyword) {
            return label;
        }
    }
    "flowchart"
}

fn looks_like_diagram_line(line: &str) -> bool {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return false;
    }
    DIAGRAM_HEADER.is_match(trimmed)
        || ARROW.is_match(trimmed)
        || NODE_BRACKET.is_match(trimmed)
        || trimmed.starts_with("subgraph ")
        || trimmed == "end"
}

/// A run only counts as a diagram when it has real structure: a header
/// line, or multiple arrow edges, or a subgraph/end pair.
fn is_plausible_diagram(block: &str) -> bool {
    if DIAGRAM_HEADER.is_match(block) {
        return true;
    }
    let arrows = ARROW.find_iter(block).count();
    if arrows >= 2 && NODE_BRACKET.is_match(block) {
        return true;
    }
    block.contains("subgraph ") && block.lines().any(|l| l.trim() == "end")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fenced_block_type_sniffing() {
        let artifact = diagram_from_block("sequenceDiagram\n  Alice->>Bob: hello");
        assert_eq!(artifact.metadata["diagram_type"], "sequence");

        let artifact = diagram_from_block("graph TD\n  A[Start] --> B[End]");
        assert_eq!(artifact.metadata["diagram_type"], "flowchart");
    }

    #[test]
    fn test_unmarked_flowchart_run() {
        let text = "Here is the flow:\n\nA[Input] --> B[Parse]\nB --> C{Valid?}\nC --> D[Done]\n\nThat is all.";
        let diagrams = extract_unmarked_diagrams(text);
        assert_eq!(diagrams.len(), 1);
        assert!(diagrams[0].content.contains("A[Input]"));
        assert_eq!(diagrams[0].metadata["fenced"], false);
    }

    #[test]
    fn test_subgraph_pair() {
        let text = "subgraph api\n  X --> Y\nend";
        let diagrams = extract_unmarked_diagrams(text);
        assert_eq!(diagrams.len(), 1);
    }

    #[test]
    fn test_prose_with_one_arrow_is_not_a_diagram() {
        let text = "Use the --> operator to draw edges.";
        assert!(extract_unmarked_diagrams(text).is_empty());
    }

    #[test]
    fn test_diagram_hint() {
        assert!(is_diagram_hint("mermaid"));
        assert!(!is_diagram_hint("rust"));
    }
}
