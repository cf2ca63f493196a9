//! Autonomous run lifecycle: phases, progress and tool execution records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Phase of one autonomous run.
///
/// Transitions are monotonic: a run never moves backwards, and
/// `Completed`/`Error` are terminal. The `Executing → Executing` self-loop
/// covers repeated tool cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentPhase {
    Idle,
    Initializing,
    Planning,
    Executing,
    Reflecting,
    Completed,
    Error,
}

impl std::fmt::Display for AgentPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::Initializing => "initializing",
            Self::Planning => "planning",
            Self::Executing => "executing",
            Self::Reflecting => "reflecting",
            Self::Completed => "completed",
            Self::Error => "error",
        };
        write!(f, "{}", label)
    }
}

impl AgentPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }

    /// Whether moving to `next` is a legal transition.
    pub fn can_transition(&self, next: AgentPhase) -> bool {
        if self.is_terminal() {
            return false;
        }
        // Any live phase may fail
        if next == Self::Error {
            return true;
        }
        matches!(
            (self, next),
            (Self::Idle, Self::Initializing)
                | (Self::Initializing, Self::Planning)
                | (Self::Planning, Self::Executing)
                | (Self::Planning, Self::Reflecting)
                | (Self::Planning, Self::Completed)
                | (Self::Executing, Self::Executing)
                | (Self::Executing, Self::Reflecting)
                | (Self::Executing, Self::Completed)
                | (Self::Reflecting, Self::Executing)
                | (Self::Reflecting, Self::Completed)
        )
    }
}

/// Status of one tool invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolExecutionStatus {
    Running,
    Completed,
    Failed,
}

/// Record of one tool invocation within a run.
///
/// Created when the call begins, finalized exactly once when its result or
/// failure is known.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolExecution {
    pub tool_name: String,
    pub status: ToolExecutionStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Human-readable result or error summary
    pub summary: String,
}

impl ToolExecution {
    pub fn start(tool_name: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            status: ToolExecutionStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
            summary: String::new(),
        }
    }

    pub fn complete(&mut self, summary: impl Into<String>) {
        if self.finished_at.is_some() {
            return;
        }
        self.status = ToolExecutionStatus::Completed;
        self.finished_at = Some(Utc::now());
        self.summary = summary.into();
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        if self.finished_at.is_some() {
            return;
        }
        self.status = ToolExecutionStatus::Failed;
        self.finished_at = Some(Utc::now());
        self.summary = error.into();
    }

    pub fn succeeded(&self) -> bool {
        self.status == ToolExecutionStatus::Completed
    }
}

/// Live status of the current autonomous run.
///
/// At most one exists per conversation; starting a new turn replaces it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRunStatus {
    pub run_id: Uuid,
    pub phase: AgentPhase,
    pub current_step: u32,
    pub total_steps: u32,
    pub tool_executions: Vec<ToolExecution>,
    pub message: String,
    pub tools_loaded: usize,
    pub retries: u32,
    pub started_at: DateTime<Utc>,
}

impl Default for AgentRunStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentRunStatus {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            phase: AgentPhase::Idle,
            current_step: 0,
            total_steps: 0,
            tool_executions: Vec::new(),
            message: String::new(),
            tools_loaded: 0,
            retries: 0,
            started_at: Utc::now(),
        }
    }

    /// Apply a phase transition if legal; returns whether it happened.
    pub fn transition(&mut self, next: AgentPhase, message: impl Into<String>) -> bool {
        if !self.phase.can_transition(next) {
            return false;
        }
        self.phase = next;
        self.message = message.into();
        true
    }

    pub fn set_progress(&mut self, current: u32, total: u32) {
        self.current_step = current;
        self.total_steps = total;
    }

    pub fn record_execution(&mut self, execution: ToolExecution) {
        self.tool_executions.push(execution);
    }

    /// Force the run to `Completed` regardless of the current phase.
    ///
    /// Used by the safety timeout, user cancellation and the diagnostic
    /// surface; a no-op once the run is terminal.
    pub fn force_complete(&mut self, message: impl Into<String>) -> bool {
        if self.phase.is_terminal() {
            return false;
        }
        self.phase = AgentPhase::Completed;
        self.message = message.into();
        true
    }

    pub fn is_active(&self) -> bool {
        self.phase != AgentPhase::Idle && !self.phase.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legal_phase_flow() {
        let mut status = AgentRunStatus::new();
        assert!(status.transition(AgentPhase::Initializing, "starting"));
        assert!(status.transition(AgentPhase::Planning, "streaming"));
        assert!(status.transition(AgentPhase::Executing, "tools"));
        assert!(status.transition(AgentPhase::Executing, "more tools"));
        assert!(status.transition(AgentPhase::Reflecting, "folding back"));
        assert!(status.transition(AgentPhase::Completed, "done"));
        assert!(status.phase.is_terminal());
    }

    #[test]
    fn test_terminal_is_sticky() {
        let mut status = AgentRunStatus::new();
        status.phase = AgentPhase::Completed;
        assert!(!status.transition(AgentPhase::Executing, "no"));
        assert!(!status.transition(AgentPhase::Error, "no"));
        assert_eq!(status.phase, AgentPhase::Completed);
    }

    #[test]
    fn test_no_backwards_transition() {
        let mut status = AgentRunStatus::new();
        status.phase = AgentPhase::Reflecting;
        assert!(!status.transition(AgentPhase::Planning, "no"));
        // but reflecting may re-enter executing for another tool cycle
        assert!(status.transition(AgentPhase::Executing, "yes"));
    }

    #[test]
    fn test_any_phase_can_error() {
        for phase in [
            AgentPhase::Idle,
            AgentPhase::Initializing,
            AgentPhase::Planning,
            AgentPhase::Executing,
            AgentPhase::Reflecting,
        ] {
            let mut status = AgentRunStatus::new();
            status.phase = phase;
            assert!(status.transition(AgentPhase::Error, "boom"));
        }
    }

    #[test]
    fn test_execution_finalized_once() {
        let mut execution = ToolExecution::start("ls");
        assert_eq!(execution.status, ToolExecutionStatus::Running);

        execution.complete("done");
        assert!(execution.succeeded());

        // A second finalization is ignored
        execution.fail("late failure");
        assert!(execution.succeeded());
        assert_eq!(execution.summary, "done");
    }
}
