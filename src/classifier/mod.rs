//! Content classification pipeline
//!
//! Pattern-matches raw assistant text into zero or more typed artifacts
//! (code, tables, diagrams, structured data, math) plus a heuristic
//! confidence score. Stages run in a fixed order and each can be toggled
//! off independently; the source text is returned unmodified unless the
//! caller asks for the placeholder-substituted variant.
//!
//! The confidence score is a relevance signal for coarse filtering and
//! logging, not a calibrated probability.

mod artifact;
mod cache;
mod context;
mod data;
mod diagrams;
pub mod languages;
mod math;
mod tables;

pub use artifact::{Artifact, ArtifactKind};
pub use cache::{CacheStats, ClassificationCache};

use serde_json::json;
use std::sync::Mutex;

use crate::config::ArtifactFlags;

/// Per-stage confidence increments, summed and divided by the normalizer
const CONF_CODE: f32 = 0.3;
const CONF_TABLE: f32 = 0.3;
const CONF_DIAGRAM: f32 = 0.5;
const CONF_DATA: f32 = 0.3;
const CONF_MATH_BLOCK: f32 = 0.3;
const CONF_MATH_INLINE: f32 = 0.2;
const CONF_CONTEXT: f32 = 0.4;
const CONF_NORMALIZER: f32 = 6.0;

/// Inline code spans at least this long are classified like fenced code
const MIN_INLINE_CODE_LEN: usize = 50;

/// Options for one classification call
#[derive(Debug, Clone)]
pub struct ClassifyOptions {
    /// The user message that produced this response; gates the
    /// context-aware stage
    pub user_message: Option<String>,
    /// Per-type extraction toggles
    pub flags: ArtifactFlags,
    /// Cap on artifacts per message, preserving detection order
    pub max_artifacts: usize,
    /// Replace extracted fenced blocks with `[artifact: …]` placeholders
    /// in the cleaned text
    pub substitute_placeholders: bool,
}

impl Default for ClassifyOptions {
    fn default() -> Self {
        Self {
            user_message: None,
            flags: ArtifactFlags::default(),
            max_artifacts: 8,
            substitute_placeholders: false,
        }
    }
}

/// Result of classifying one message
#[derive(Debug, Clone)]
pub struct Classification {
    pub artifacts: Vec<Artifact>,
    pub cleaned_text: String,
    pub confidence: f32,
}

/// The classifier. Stateless apart from its result cache.
pub struct ContentClassifier {
    cache: Mutex<ClassificationCache>,
}

impl Default for ContentClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentClassifier {
    pub fn new() -> Self {
        Self {
            cache: Mutex::new(ClassificationCache::new()),
        }
    }

    /// Classify one assistant message. Never panics on arbitrary input.
    pub fn classify(&self, text: &str, opts: &ClassifyOptions) -> Classification {
        let fingerprint = Self::fingerprint(opts);

        if let Ok(mut cache) = self.cache.lock() {
            if let Some(hit) = cache.get(text, &fingerprint) {
                return hit;
            }
        }

        let result = self.classify_uncached(text, opts);

        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(text, &fingerprint, result.clone());
        }

        result
    }

    /// Drop all cached classification results
    pub fn clear_cache(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
    }

    /// Cache occupancy, for diagnostics
    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.lock().ok().map(|c| c.stats())
    }

    fn classify_uncached(&self, text: &str, opts: &ClassifyOptions) -> Classification {
        let flags = &opts.flags;
        let mut confidence = 0.0f32;

        let blocks = extract_fenced_blocks(text);
        let masked = mask_regions(text, blocks.iter().map(|b| (b.start, b.end)));

        // Stage 1: code (fenced + long inline spans). Diagram-tagged fences
        // are routed to the diagram stage's artifact type.
        let mut code_artifacts = Vec::new();
        let mut fenced_diagrams = Vec::new();

        for block in &blocks {
            let hint = block.hint.as_deref().unwrap_or("");
            if diagrams::is_diagram_hint(hint) {
                if flags.diagrams {
                    confidence += CONF_DIAGRAM;
                    fenced_diagrams.push(diagrams::diagram_from_block(&block.body));
                }
                continue;
            }

            if !flags.code {
                continue;
            }

            let language = languages::normalize_hint(hint)
                .or_else(|| languages::detect_language(&block.body).map(String::from));

            confidence += CONF_CODE;
            let title = match &language {
                Some(lang) => format!("Code ({})", lang),
                None => "Code".to_string(),
            };
            let mut artifact = Artifact::new(ArtifactKind::Code, title, block.body.clone())
                .with_metadata("line_count", json!(block.body.lines().count()));
            if let Some(lang) = language {
                artifact = artifact.with_language(lang);
            }
            code_artifacts.push(artifact);
        }

        if flags.code {
            for span in extract_inline_code(&masked) {
                let language = languages::detect_language(&span);
                confidence += CONF_CODE;
                let mut artifact = Artifact::new(ArtifactKind::Code, "Inline code", span)
                    .with_metadata("inline", json!(true));
                if let Some(lang) = language {
                    artifact = artifact.with_language(lang);
                }
                code_artifacts.push(artifact);
            }
        }

        // Stage 2: tables
        let table_artifacts = if flags.tables {
            let found = tables::extract_tables(&masked);
            confidence += CONF_TABLE * found.len() as f32;
            found
        } else {
            Vec::new()
        };

        // Stage 3: diagrams (unmarked runs; fenced ones were stage 1)
        let mut diagram_artifacts = fenced_diagrams;
        if flags.diagrams {
            let found = diagrams::extract_unmarked_diagrams(&masked);
            confidence += CONF_DIAGRAM * found.len() as f32;
            diagram_artifacts.extend(found);
        }

        // Stage 4: structured data (fenced regions are masked out, so a
        // ```json block stays a code artifact rather than doubling up)
        let data_artifacts = if flags.structured_data {
            let found = data::extract_structured_data(&masked);
            confidence += CONF_DATA * found.len() as f32;
            found
        } else {
            Vec::new()
        };

        // Stage 5: math
        let math_artifacts = if flags.math {
            let (found, block_hits, inline_hits) = math::extract_math(&masked);
            confidence += CONF_MATH_BLOCK * block_hits as f32;
            confidence += CONF_MATH_INLINE * inline_hits as f32;
            found
        } else {
            Vec::new()
        };

        // Assemble in detection order before the context stage so dedup
        // can see everything extracted so far
        let mut artifacts = code_artifacts;
        artifacts.extend(table_artifacts);
        artifacts.extend(diagram_artifacts);
        artifacts.extend(data_artifacts);
        artifacts.extend(math_artifacts);

        // Stage 6: context-aware, gated on the user's own message
        if flags.context_aware {
            if let Some(user_message) = opts.user_message.as_deref() {
                let found = context::extract_contextual(text, user_message);
                for artifact in found {
                    let duplicate = artifacts
                        .iter()
                        .any(|existing| existing.content.contains(artifact.content.trim()));
                    if !duplicate {
                        confidence += CONF_CONTEXT;
                        artifacts.push(artifact);
                    }
                }
            }
        }

        artifacts.truncate(opts.max_artifacts);

        let cleaned_text = if opts.substitute_placeholders {
            substitute_placeholders(text, &blocks)
        } else {
            text.to_string()
        };

        Classification {
            artifacts,
            cleaned_text,
            confidence: (confidence / CONF_NORMALIZER).clamp(0.0, 1.0),
        }
    }

    fn fingerprint(opts: &ClassifyOptions) -> String {
        let f = &opts.flags;
        format!(
            "{}{}{}{}{}{}-{}-{}-{:x}",
            f.code as u8,
            f.tables as u8,
            f.diagrams as u8,
            f.structured_data as u8,
            f.math as u8,
            f.context_aware as u8,
            opts.max_artifacts,
            opts.substitute_placeholders as u8,
            opts.user_message
                .as_deref()
                .map(|m| m.len())
                .unwrap_or(0)
        )
    }
}

/// One fenced code block with its byte range in the source text
struct FencedBlock {
    hint: Option<String>,
    body: String,
    start: usize,
    end: usize,
}

/// Line-based fence scanner. Unclosed fences at end of input are ignored.
fn extract_fenced_blocks(text: &str) -> Vec<FencedBlock> {
    let mut blocks = Vec::new();
    let mut offset = 0;
    let mut open_start: Option<usize> = None;
    let mut open_hint = String::new();
    let mut body_lines: Vec<&str> = Vec::new();

    for line in text.split_inclusive('\n') {
        let line_start = offset;
        offset += line.len();
        let stripped = line.trim_end_matches(|c| c == '\n' || c == '\r');
        let trimmed = stripped.trim();

        match open_start {
            None => {
                if let Some(rest) = trimmed.strip_prefix("```") {
                    open_start = Some(line_start);
                    open_hint = rest.trim().to_string();
                    body_lines.clear();
                }
            }
            Some(start) => {
                if trimmed == "```" {
                    blocks.push(FencedBlock {
                        hint: if open_hint.is_empty() {
                            None
                        } else {
                            Some(open_hint.clone())
                        },
                        body: body_lines.join("\n"),
                        start,
                        end: offset,
                    });
                    open_start = None;
                } else {
                    body_lines.push(stripped);
                }
            }
        }
    }

    blocks
}

/// Replace the given byte regions with spaces, preserving newlines so
/// line-based stages keep their geometry.
fn mask_regions(text: &str, regions: impl Iterator<Item = (usize, usize)>) -> String {
    let mut masked: Vec<u8> = text.as_bytes().to_vec();
    for (start, end) in regions {
        for b in &mut masked[start..end.min(text.len())] {
            if *b != b'\n' {
                *b = b' ';
            }
        }
    }
    // Regions were replaced byte-for-byte with ASCII, so this cannot fail
    String::from_utf8(masked).unwrap_or_else(|_| text.to_string())
}

/// Inline code spans (single backticks) long enough to classify
fn extract_inline_code(text: &str) -> Vec<String> {
    let mut spans = Vec::new();
    let mut rest = text;

    while let Some(open) = rest.find('`') {
        let after = &rest[open + 1..];
        match after.find('`') {
            Some(close) => {
                let span = &after[..close];
                if span.chars().count() >= MIN_INLINE_CODE_LEN && !span.contains('\n') {
                    spans.push(span.to_string());
                }
                rest = &after[close + 1..];
            }
            None => break,
        }
    }

    spans
}

fn substitute_placeholders(text: &str, blocks: &[FencedBlock]) -> String {
    let mut result = String::with_capacity(text.len());
    let mut cursor = 0;

    for block in blocks {
        if block.start < cursor {
            continue;
        }
        result.push_str(&text[cursor..block.start]);
        let label = block.hint.as_deref().unwrap_or("code");
        result.push_str(&format!("[artifact: {}]\n", label));
        cursor = block.end;
    }
    result.push_str(&text[cursor..]);
    result
}
