//! The structured tool-call directive
//!
//! Models request tool execution by emitting one fenced JSON block:
//!
//! ```json
//! {
//!   "reasoning": "need the file list",
//!   "toolCalls": [
//!     {"toolName": "ls", "arguments": {}, "reasoning": "list the cwd"}
//!   ],
//!   "needsToolExecution": true
//! }
//! ```
//!
//! An absent or malformed block is not an error: it means "no tool use
//! requested" and the original text is passed through unchanged.

use lazy_static::lazy_static;
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

lazy_static! {
    static ref JSON_FENCE: Regex = Regex::new(r"(?s)```json\s*(.*?)```").unwrap();
    static ref ANY_FENCE: Regex = Regex::new(r"(?s)```\w*\s*(.*?)```").unwrap();
}

/// One parsed tool invocation request
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StructuredToolCall {
    /// Registered tool name
    pub tool_name: String,
    /// Argument map; missing arguments default to an empty object
    #[serde(default = "empty_object")]
    pub arguments: Value,
    /// Why the model wants this call
    #[serde(default)]
    pub reasoning: String,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

/// The full directive as emitted by the model
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallDirective {
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub tool_calls: Vec<StructuredToolCall>,
    #[serde(default)]
    pub needs_tool_execution: bool,
}

/// Result of scanning a model response for a directive
#[derive(Debug, Clone)]
pub struct ParsedResponse {
    /// Response text with the directive block removed (original text when
    /// no directive was found)
    pub cleaned_text: String,
    /// Validated tool calls, in request order
    pub tool_calls: Vec<StructuredToolCall>,
    /// The model's stated reasoning
    pub reasoning: String,
    /// Whether the caller should run an execution cycle
    pub needs_execution: bool,
}

impl ParsedResponse {
    fn passthrough(text: &str) -> Self {
        Self {
            cleaned_text: text.to_string(),
            tool_calls: Vec::new(),
            reasoning: String::new(),
            needs_execution: false,
        }
    }
}

/// Scan a model response for an embedded tool-call directive.
pub fn parse(response_text: &str) -> ParsedResponse {
    let candidate = find_directive_block(response_text);

    let (range, directive) = match candidate {
        Some(found) => found,
        None => return ParsedResponse::passthrough(response_text),
    };

    // Validation: a call without a usable name is dropped; missing
    // arguments were already defaulted, but a non-object argument value
    // is normalized to an empty map rather than rejected.
    let tool_calls: Vec<StructuredToolCall> = directive
        .tool_calls
        .into_iter()
        .filter(|call| !call.tool_name.trim().is_empty())
        .map(|mut call| {
            if !call.arguments.is_object() {
                call.arguments = empty_object();
            }
            call
        })
        .collect();

    let needs_execution = directive.needs_tool_execution && !tool_calls.is_empty();

    let mut cleaned = String::with_capacity(response_text.len());
    cleaned.push_str(&response_text[..range.0]);
    cleaned.push_str(&response_text[range.1..]);
    let cleaned_text = cleaned.trim().to_string();

    ParsedResponse {
        cleaned_text,
        tool_calls,
        reasoning: directive.reasoning,
        needs_execution,
    }
}

/// Render a directive back to its wire form (fenced JSON block).
pub fn serialize(directive: &ToolCallDirective) -> String {
    // A directive is always serializable: it contains only maps, vectors
    // and strings
    let body = serde_json::to_string_pretty(directive)
        .unwrap_or_else(|_| "{}".to_string());
    format!("```json\n{}\n```", body)
}

/// Find the first fenced block that deserializes as a directive.
///
/// Blocks tagged `json` are tried first; untagged blocks are accepted as
/// a fallback when their body mentions the directive keys.
fn find_directive_block(text: &str) -> Option<((usize, usize), ToolCallDirective)> {
    for capture in JSON_FENCE.captures_iter(text) {
        if let Some(found) = try_block(text, &capture) {
            return Some(found);
        }
    }

    for capture in ANY_FENCE.captures_iter(text) {
        let body = capture.get(1).map(|m| m.as_str()).unwrap_or("");
        if !body.contains("toolCalls") && !body.contains("needsToolExecution") {
            continue;
        }
        if let Some(found) = try_block(text, &capture) {
            return Some(found);
        }
    }

    None
}

fn try_block(
    _text: &str,
    capture: &regex::Captures<'_>,
) -> Option<((usize, usize), ToolCallDirective)> {
    let whole = capture.get(0)?;
    let body = capture.get(1)?.as_str().trim();

    let value: Value = serde_json::from_str(body).ok()?;
    // Require at least one directive marker so arbitrary JSON blocks are
    // not swallowed
    let object = value.as_object()?;
    if !object.contains_key("toolCalls") && !object.contains_key("needsToolExecution") {
        return None;
    }

    let directive: ToolCallDirective = serde_json::from_value(value).ok()?;
    Some(((whole.start(), whole.end()), directive))
}
