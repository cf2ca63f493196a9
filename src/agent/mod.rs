//! Agent core: turn orchestration, conversation state, run phases,
//! events and the provider stream seam.

pub mod events;
pub mod orchestrator;
pub mod provider;
pub mod run_status;
pub mod state;

pub use events::AgentEvent;
pub use orchestrator::{AgentOrchestrator, FinishedMessage, OrchestratorError};
pub use provider::{
    ChatProvider, ChatRequest, OllamaProvider, ProviderError, StreamChunk, StreamOutcome,
};
pub use run_status::{AgentPhase, AgentRunStatus, ToolExecution, ToolExecutionStatus};
pub use state::{
    create_shared_state, Attachment, ConversationState, HistoryEntry, Message, MessageRole,
    SharedState,
};
