//! Declarative language detection for unfenced or untagged code
//!
//! Each language is a label plus a list of regex patterns. A code body is
//! scored per language as the fraction of that language's patterns which
//! match; the highest fraction above [`SCORE_THRESHOLD`] wins, and ties
//! keep the first maximum in table order. Adding a language is a table
//! entry, not a code change.

use lazy_static::lazy_static;
use regex::Regex;

/// Minimum fraction of a language's patterns that must match
const SCORE_THRESHOLD: f64 = 0.2;

struct LanguagePatterns {
    name: &'static str,
    patterns: Vec<Regex>,
}

macro_rules! lang {
    ($name:literal, [$($pat:literal),+ $(,)?]) => {
        LanguagePatterns {
            name: $name,
            patterns: vec![$(Regex::new($pat).expect("invalid language pattern")),+],
        }
    };
}

lazy_static! {
    /// Table order matters: more specific languages come before the
    /// languages they superset (TypeScript before JavaScript, C++ before C).
    static ref LANGUAGES: Vec<LanguagePatterns> = vec![
        lang!("rust", [
            r"\bfn\s+\w+\s*\(",
            r"\blet\s+(mut\s+)?\w+",
            r"\w+::\w+",
            r"\bimpl\b",
            r"\bmatch\s+\w+",
            r"\bpub\s+(fn|struct|enum|mod)\b",
        ]),
        lang!("python", [
            r"\bdef\s+\w+\s*\(",
            r"(?m)^\s*import\s+\w+|^\s*from\s+\w+\s+import\b",
            r"(?m):\s*$",
            r"\bself\b",
            r"\belif\b|\bNone\b|\bTrue\b|\bFalse\b",
        ]),
        lang!("typescript", [
            r":\s*(string|number|boolean|any|void)\b",
            r"\binterface\s+\w+",
            r"\btype\s+\w+\s*=",
            r"\bexport\s+(default\s+)?(class|function|const|interface|type)\b",
            r"<\w+(,\s*\w+)*>",
        ]),
        lang!("javascript", [
            r"\bfunction\s*\w*\s*\(",
            r"\b(const|let|var)\s+\w+\s*=",
            r"=>",
            r"\bconsole\.\w+\s*\(",
            r"===|!==",
        ]),
        lang!("go", [
            r"\bfunc\s+\w+\s*\(",
            r":=",
            r"(?m)^package\s+\w+",
            r"\bfmt\.\w+\s*\(",
            r"\bchan\b|\bgo\s+func\b|\bdefer\b",
        ]),
        lang!("java", [
            r"\bpublic\s+(static\s+)?(void|class|int|String)\b",
            r"\bSystem\.out\.print",
            r"\bnew\s+\w+\s*\(",
            r"(?m)^import\s+java\.",
            r"@\w+\s*$|@Override",
        ]),
        lang!("csharp", [
            r"\busing\s+System",
            r"\bnamespace\s+[\w.]+",
            r"\bpublic\s+(class|void|int|string|async)\b",
            r"\bConsole\.Write",
            r"\bvar\s+\w+\s*=",
        ]),
        lang!("cpp", [
            r"#include\s*<\w+>",
            r"\bstd::\w+",
            r"\bcout\b|\bcin\b",
            r"\btemplate\s*<",
            r"\bnamespace\s+\w+",
        ]),
        lang!("c", [
            r"#include\s*<\w+\.h>",
            r"\bprintf\s*\(|\bscanf\s*\(",
            r"\bint\s+main\s*\(",
            r"\bmalloc\s*\(|\bfree\s*\(",
            r"\bstruct\s+\w+\s*\{",
        ]),
        lang!("ruby", [
            r"\bdef\s+\w+",
            r"(?m)^\s*end\s*$",
            r"\bputs\b|\brequire\b",
            r"\bdo\s*\|\w+\|",
            r"@\w+\s*=",
        ]),
        lang!("php", [
            r"<\?php",
            r"\$\w+\s*=",
            r"\becho\b",
            r"->\w+\s*\(",
            r"\bfunction\s+\w+\s*\(",
        ]),
        lang!("swift", [
            r"\bfunc\s+\w+\s*\(",
            r"\bguard\s+let\b|\bif\s+let\b",
            r"\bvar\s+\w+\s*:\s*\w+",
            r"\bimport\s+(Foundation|UIKit|SwiftUI)",
            r"\bprint\s*\(",
        ]),
        lang!("kotlin", [
            r"\bfun\s+\w+\s*\(",
            r"\bval\s+\w+|\bvar\s+\w+",
            r"\bdata\s+class\b",
            r"\bprintln\s*\(",
            r"\?\.\w+|!!\.",
        ]),
        lang!("sql", [
            r"(?i)\bselect\b.+\bfrom\b",
            r"(?i)\bwhere\b",
            r"(?i)\binsert\s+into\b|\bupdate\s+\w+\s+set\b",
            r"(?i)\bcreate\s+table\b",
            r"(?i)\bjoin\b.+\bon\b",
        ]),
        lang!("html", [
            r"(?i)<!doctype\s+html>|<html",
            r"<div[\s>]|<span[\s>]|<p[\s>]",
            r"</\w+>",
            r"(?i)<head>|<body",
            r#"\b(class|id|href|src)\s*=\s*""#,
        ]),
        lang!("css", [
            r"[.#]?[\w-]+\s*\{",
            r"[\w-]+\s*:\s*[^;{]+;",
            r"@media\b|@import\b",
            r"\b\d+(px|rem|em|vh|vw)\b",
            r"--[\w-]+\s*:",
        ]),
        lang!("bash", [
            r"(?m)^#!/bin/(ba)?sh",
            r"\becho\s+",
            r"(?m)^\s*(if\s+\[|fi|done|esac)\b",
            r"\$\{?\w+",
            r"\|\s*(grep|awk|sed|sort|xargs)\b",
        ]),
        lang!("json", [
            r#"(?m)^\s*[\{\[]"#,
            r#""[\w-]+"\s*:"#,
            r#":\s*("|\d|true|false|null|\[|\{)"#,
            r"(?m)[\}\]],?\s*$",
        ]),
        lang!("yaml", [
            r"(?m)^[\w-]+:\s*\S",
            r"(?m)^\s+-\s+\w",
            r"(?m)^---\s*$",
            r"(?m)^\s+[\w-]+:\s",
        ]),
        lang!("haskell", [
            r"\bmodule\s+\w+\s+where",
            r"\w+\s*::\s*\w+",
            r"\bdata\s+\w+\s*=",
            r"<-|\$\s",
            r"(?m)^\s*let\b|\bwhere\b",
        ]),
    ];
}

/// Score a code body against the language table.
///
/// Returns the winning label, or `None` when no language clears the
/// threshold.
pub fn detect_language(code: &str) -> Option<&'static str> {
    let mut best: Option<(&'static str, f64)> = None;

    for lang in LANGUAGES.iter() {
        let matched = lang.patterns.iter().filter(|p| p.is_match(code)).count();
        let score = matched as f64 / lang.patterns.len() as f64;

        if score > SCORE_THRESHOLD {
            match best {
                // Strict comparison keeps the first maximum on ties
                Some((_, best_score)) if score > best_score => {
                    best = Some((lang.name, score));
                }
                None => best = Some((lang.name, score)),
                _ => {}
            }
        }
    }

    best.map(|(name, _)| name)
}

/// Known fence hints, normalized to table labels
pub fn normalize_hint(hint: &str) -> Option<String> {
    let hint = hint.trim().to_lowercase();
    if hint.is_empty() {
        return None;
    }
    let normalized = match hint.as_str() {
        "js" | "jsx" => "javascript".to_string(),
        "ts" | "tsx" => "typescript".to_string(),
        "py" | "python3" => "python".to_string(),
        "rs" => "rust".to_string(),
        "rb" => "ruby".to_string(),
        "sh" | "shell" | "zsh" => "bash".to_string(),
        "c++" | "cxx" => "cpp".to_string(),
        "cs" | "c#" => "csharp".to_string(),
        "yml" => "yaml".to_string(),
        other => other.to_string(),
    };
    Some(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_rust() {
        let code = "pub fn add(a: u32, b: u32) -> u32 {\n    let sum = a + b;\n    sum\n}";
        assert_eq!(detect_language(code), Some("rust"));
    }

    #[test]
    fn test_detect_python() {
        let code = "def greet(name):\n    if name is None:\n        return\n    print(self)";
        assert_eq!(detect_language(code), Some("python"));
    }

    #[test]
    fn test_detect_sql() {
        let code = "SELECT id, name FROM users WHERE active = 1";
        assert_eq!(detect_language(code), Some("sql"));
    }

    #[test]
    fn test_no_detection_for_prose() {
        let text = "This is a plain sentence about nothing in particular";
        assert_eq!(detect_language(text), None);
    }

    #[test]
    fn test_hint_normalization() {
        assert_eq!(normalize_hint("py").as_deref(), Some("python"));
        assert_eq!(normalize_hint("TS").as_deref(), Some("typescript"));
        assert_eq!(normalize_hint(""), None);
        assert_eq!(normalize_hint("zig").as_deref(), Some("zig"));
    }
}
