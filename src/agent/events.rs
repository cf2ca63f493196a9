//! Defines events for communication between the agent core and the UI layer.

use crate::agent::orchestrator::FinishedMessage;
use crate::agent::run_status::AgentPhase;

/// Events sent from a running turn to the UI for processing.
/// This enum lives in the agent module but is designed to be used by the UI,
/// acting as a public API for agent-to-UI communication.
#[derive(Debug)]
pub enum AgentEvent {
    /// The run entered a new phase.
    PhaseChange { phase: AgentPhase, message: String },

    /// A detailed progress update for a multi-step operation.
    Progress {
        current_step: u32,
        total_steps: u32,
        message: String,
    },

    /// A tool call began.
    ToolStarted { tool_name: String },

    /// A tool call finished successfully.
    ToolCompleted { tool_name: String, summary: String },

    /// A tool call failed (the run continues).
    ToolFailed { tool_name: String, error: String },

    /// A single chunk of a streaming response.
    Chunk(String),

    /// The end of a stream.
    StreamEnd,

    /// The final, complete response of the turn.
    Response(Box<FinishedMessage>),

    /// An error message from the turn.
    Error(String),
}
