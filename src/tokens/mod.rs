//! Token count reconciliation
//!
//! Providers report token usage unreliably: local runtimes often return
//! zero or truncated counts, and some APIs over-count. Two local estimators
//! run on every finished message and the reported value is only trusted
//! when it lands inside a plausibility band around the estimate.

use serde::{Deserialize, Serialize};

/// How much a provider's self-reported usage is trusted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderTrust {
    High,
    Medium,
    Low,
}

/// Confidence tier attached to a final token count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenConfidence {
    High,
    Medium,
    Low,
}

/// Final token count for one finished message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenValidationResult {
    /// The count to record
    pub tokens: u32,
    /// True when the count came from local estimation
    pub estimated: bool,
    /// Confidence in the recorded count
    pub confidence: TokenConfidence,
    /// Which path produced the count
    pub method: &'static str,
}

/// One estimator's output
#[derive(Debug, Clone, Copy)]
struct Estimate {
    tokens: f64,
    confidence: f32,
    method: &'static str,
}

/// Ratio band inside which a reported count is accepted as-is
const RATIO_LOW: f64 = 0.5;
const RATIO_HIGH: f64 = 3.0;

/// Word-count estimator: `words × 1.3`, bumped for code/markdown/punctuation-
/// heavy text where whitespace-delimited words underestimate token splits.
fn estimate_by_words(text: &str) -> Estimate {
    let words = text.split_whitespace().count();
    let dense = is_symbol_dense(text);

    let multiplier = if dense { 1.5 } else { 1.3 };
    // Word counting tracks prose well; symbol-dense text defeats it
    let confidence = if dense { 0.55 } else { 0.75 };

    Estimate {
        tokens: words as f64 * multiplier,
        confidence,
        method: "word-count",
    }
}

/// Character-count estimator: `chars / 4`, divisor adjusted for whitespace,
/// code and long-word density.
fn estimate_by_chars(text: &str) -> Estimate {
    let chars = text.chars().count();
    if chars == 0 {
        return Estimate {
            tokens: 0.0,
            confidence: 0.5,
            method: "char-count",
        };
    }

    let whitespace = text.chars().filter(|c| c.is_whitespace()).count();
    let ws_ratio = whitespace as f64 / chars as f64;
    let words = text.split_whitespace().count().max(1);
    let avg_word_len = (chars - whitespace) as f64 / words as f64;

    let mut divisor = 4.0;
    if is_symbol_dense(text) {
        // Code tokenizes denser than prose
        divisor = 3.0;
    }
    if ws_ratio > 0.25 {
        divisor += 0.5;
    }
    if avg_word_len > 10.0 {
        // Long identifiers split into several tokens each
        divisor -= 0.5;
    }

    let confidence = if is_symbol_dense(text) {
        0.7
    } else if chars < 20 {
        0.5
    } else {
        0.65
    };

    Estimate {
        tokens: chars as f64 / divisor,
        confidence,
        method: "char-count",
    }
}

fn is_symbol_dense(text: &str) -> bool {
    if text.contains("```") {
        return true;
    }
    let total = text.chars().count();
    if total == 0 {
        return false;
    }
    let symbols = text
        .chars()
        .filter(|c| !c.is_alphanumeric() && !c.is_whitespace())
        .count();
    symbols as f64 / total as f64 > 0.15
}

/// Run both estimators and pick the more confident; on a tie, average
fn best_estimate(text: &str) -> Estimate {
    let by_words = estimate_by_words(text);
    let by_chars = estimate_by_chars(text);

    let diff = (by_words.confidence - by_chars.confidence).abs();
    if diff < f32::EPSILON {
        Estimate {
            tokens: (by_words.tokens + by_chars.tokens) / 2.0,
            confidence: by_words.confidence,
            method: "hybrid",
        }
    } else if by_words.confidence > by_chars.confidence {
        by_words
    } else {
        by_chars
    }
}

/// Estimate a token count for arbitrary text without a reported value.
pub fn estimate_tokens(text: &str) -> u32 {
    best_estimate(text).tokens.round() as u32
}

/// Reconcile a provider-reported token count against local estimation.
///
/// - No reported count: use the estimate.
/// - `0.5 ≤ reported/estimate ≤ 3.0`: trust the reported value, confidence
///   scaled by provider trust.
/// - Below the band: prefer the estimate, unless the provider is highly
///   trusted, in which case keep the reported value at low confidence.
/// - Above the band: keep the reported value but flag it as possibly
///   inflated. The value is never corrected downward; providers win over
///   local heuristics when they over-count.
pub fn reconcile(
    reported: Option<u32>,
    text: &str,
    trust: ProviderTrust,
) -> TokenValidationResult {
    let estimate = best_estimate(text);

    let reported = match reported {
        Some(r) => r,
        None => {
            let confidence = if estimate.confidence >= 0.7 {
                TokenConfidence::Medium
            } else {
                TokenConfidence::Low
            };
            return TokenValidationResult {
                tokens: estimate.tokens.round() as u32,
                estimated: true,
                confidence,
                method: estimate.method,
            };
        }
    };

    let ratio = reported as f64 / estimate.tokens.max(1.0);

    if (RATIO_LOW..=RATIO_HIGH).contains(&ratio) {
        let confidence = match trust {
            ProviderTrust::High => TokenConfidence::High,
            ProviderTrust::Medium => TokenConfidence::Medium,
            ProviderTrust::Low => TokenConfidence::Low,
        };
        TokenValidationResult {
            tokens: reported,
            estimated: false,
            confidence,
            method: "reported",
        }
    } else if ratio < RATIO_LOW {
        if trust == ProviderTrust::High {
            TokenValidationResult {
                tokens: reported,
                estimated: false,
                confidence: TokenConfidence::Low,
                method: "reported-undercount",
            }
        } else {
            TokenValidationResult {
                tokens: estimate.tokens.round() as u32,
                estimated: true,
                confidence: TokenConfidence::Medium,
                method: estimate.method,
            }
        }
    } else {
        // Over the band: keep the reported value, flag only
        TokenValidationResult {
            tokens: reported,
            estimated: false,
            confidence: TokenConfidence::Low,
            method: "reported-inflated",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROSE: &str = "The quick brown fox jumps over the lazy dog and keeps \
        running through the field until it reaches the river bank.";

    #[test]
    fn test_estimate_nonzero_for_text() {
        assert!(estimate_tokens(PROSE) > 10);
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn test_code_bumps_multiplier() {
        let code = "```rust\nfn main() { println!(\"{}\", x*y+z); }\n```";
        let prose_per_word = estimate_tokens(PROSE) as f64 / PROSE.split_whitespace().count() as f64;
        let code_per_word = estimate_tokens(code) as f64 / code.split_whitespace().count() as f64;
        assert!(code_per_word > prose_per_word);
    }

    #[test]
    fn test_reported_inside_band_is_kept() {
        let estimate = estimate_tokens(PROSE);
        for factor in [0.5, 1.0, 2.0, 3.0] {
            let reported = (estimate as f64 * factor) as u32;
            let result = reconcile(Some(reported), PROSE, ProviderTrust::Low);
            assert_eq!(result.tokens, reported);
            assert!(!result.estimated);
        }
    }

    #[test]
    fn test_undercount_low_trust_prefers_estimate() {
        let estimate = estimate_tokens(PROSE);
        let result = reconcile(Some(1), PROSE, ProviderTrust::Medium);
        assert_eq!(result.tokens, estimate);
        assert!(result.estimated);
    }

    #[test]
    fn test_undercount_high_trust_keeps_reported() {
        let result = reconcile(Some(1), PROSE, ProviderTrust::High);
        assert_eq!(result.tokens, 1);
        assert!(!result.estimated);
        assert_eq!(result.confidence, TokenConfidence::Low);
    }

    #[test]
    fn test_overcount_is_flagged_not_corrected() {
        let estimate = estimate_tokens(PROSE);
        let inflated = estimate * 10;
        let result = reconcile(Some(inflated), PROSE, ProviderTrust::Medium);
        assert_eq!(result.tokens, inflated);
        assert_eq!(result.confidence, TokenConfidence::Low);
        assert_eq!(result.method, "reported-inflated");
    }

    #[test]
    fn test_missing_report_uses_estimate() {
        let result = reconcile(None, PROSE, ProviderTrust::High);
        assert!(result.estimated);
        assert_eq!(result.tokens, estimate_tokens(PROSE));
    }
}
