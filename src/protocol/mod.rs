//! Structured tool-call protocol
//!
//! The text-based contract between the model and the agent: the model
//! emits a fenced JSON directive requesting tool calls, the agent parses
//! and validates it, executes the calls against an ordered resolver
//! chain, and folds the results back into a follow-up prompt.
//!
//! Parsing is total: text without a well-formed directive simply means
//! "no tool use requested".

mod directive;
mod executor;
mod followup;

pub use directive::{parse, serialize, ParsedResponse, StructuredToolCall, ToolCallDirective};
pub use executor::{render_result, ToolExecutor, ToolResolver};
pub use followup::build_followup_prompt;
