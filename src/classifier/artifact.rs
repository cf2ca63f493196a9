//! Typed content fragments extracted from assistant text

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Kind of extracted artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Code,
    Table,
    Mermaid,
    Chart,
    Json,
    Markdown,
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Code => write!(f, "code"),
            Self::Table => write!(f, "table"),
            Self::Mermaid => write!(f, "mermaid"),
            Self::Chart => write!(f, "chart"),
            Self::Json => write!(f, "json"),
            Self::Markdown => write!(f, "markdown"),
        }
    }
}

/// A classified fragment of one assistant message.
///
/// Artifacts are additive annotations over the message text; the text
/// itself is not rewritten. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    /// Unique identifier
    pub id: Uuid,
    /// Artifact kind
    pub kind: ArtifactKind,
    /// Short human-readable title
    pub title: String,
    /// Extracted content
    pub content: String,
    /// Language tag for code artifacts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Detection metadata (row counts, diagram type, ...)
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl Artifact {
    pub fn new(kind: ArtifactKind, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            title: title.into(),
            content: content.into(),
            language: None,
            metadata: Map::new(),
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_builder() {
        let artifact = Artifact::new(ArtifactKind::Code, "Snippet", "fn main() {}")
            .with_language("rust")
            .with_metadata("lines", Value::from(1));

        assert_eq!(artifact.kind, ArtifactKind::Code);
        assert_eq!(artifact.language.as_deref(), Some("rust"));
        assert_eq!(artifact.metadata["lines"], Value::from(1));
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(ArtifactKind::Mermaid.to_string(), "mermaid");
        assert_eq!(ArtifactKind::Code.to_string(), "code");
    }
}
