//! Math formula extraction (LaTeX delimiters)

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::json;

use super::artifact::{Artifact, ArtifactKind};

/// Inline spans shorter than this are ignored ("$5 and $10" is money,
/// not math)
const MIN_INLINE_LEN: usize = 10;

lazy_static! {
    static ref BLOCK_MATH: Regex = Regex::new(r"(?s)\$\$(.+?)\$\$").unwrap();
    static ref INLINE_MATH: Regex = Regex::new(r"\$([^$\n]+)\$").unwrap();
}

/// Extract `$$…$$` blocks and sufficiently long inline `$…$` spans.
///
/// Returns the artifacts plus the count of (block, inline) hits for
/// confidence scoring.
pub fn extract_math(text: &str) -> (Vec<Artifact>, usize, usize) {
    let mut artifacts = Vec::new();
    let mut blocks = 0;
    let mut inlines = 0;

    // Mask block math so its interior `$` pairs are not re-matched inline
    let mut masked = text.to_string();

    for capture in BLOCK_MATH.captures_iter(text) {
        let body = capture.get(1).map(|m| m.as_str().trim()).unwrap_or("");
        if body.is_empty() {
            continue;
        }
        blocks += 1;
        artifacts.push(
            Artifact::new(ArtifactKind::Markdown, "Math formula", body)
                .with_metadata("format", json!("latex"))
                .with_metadata("display", json!("block")),
        );
    }

    for m in BLOCK_MATH.find_iter(text) {
        masked.replace_range(m.range(), &" ".repeat(m.len()));
    }

    for capture in INLINE_MATH.captures_iter(&masked) {
        let body = capture.get(1).map(|m| m.as_str().trim()).unwrap_or("");
        if body.len() < MIN_INLINE_LEN {
            continue;
        }
        inlines += 1;
        artifacts.push(
            Artifact::new(ArtifactKind::Markdown, "Math formula", body)
                .with_metadata("format", json!("latex"))
                .with_metadata("display", json!("inline")),
        );
    }

    (artifacts, blocks, inlines)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_math() {
        let (artifacts, blocks, inlines) =
            extract_math("The identity:\n$$e^{i\\pi} + 1 = 0$$\nholds.");
        assert_eq!(blocks, 1);
        assert_eq!(inlines, 0);
        assert_eq!(artifacts[0].metadata["display"], "block");
        assert_eq!(artifacts[0].content, "e^{i\\pi} + 1 = 0");
    }

    #[test]
    fn test_long_inline_math() {
        let (artifacts, blocks, inlines) =
            extract_math("We have $\\sum_{n=1}^{\\infty} 1/n^2 = \\pi^2/6$ here.");
        assert_eq!(blocks, 0);
        assert_eq!(inlines, 1);
        assert_eq!(artifacts[0].metadata["display"], "inline");
    }

    #[test]
    fn test_short_inline_ignored() {
        let (artifacts, _, inlines) = extract_math("Costs $5 and $10 total.");
        assert_eq!(inlines, 0);
        assert!(artifacts.is_empty());
    }

    #[test]
    fn test_block_interior_not_rematched_inline() {
        let (_, blocks, inlines) = extract_math("$$a_{long} = b_{long} + c_{long}$$");
        assert_eq!(blocks, 1);
        assert_eq!(inlines, 0);
    }
}
