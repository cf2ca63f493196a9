//! Agent orchestrator
//!
//! Drives one conversation turn through its phases: a model response is
//! requested, tool-call directives are executed sequentially with results
//! folded back, and the final text is classified and token-reconciled
//! into a finished message. Streaming mode and autonomous mode are
//! mutually exclusive per turn; a safety timeout guarantees the run never
//! stays open after the stream has ended.
//!
//! Status mutations are keyed by run id: a turn that was replaced by a
//! newer one can no longer touch the live status, so a stray completion
//! from a cancelled run cannot race a newly-started run.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::classifier::{Artifact, ClassifyOptions, ContentClassifier};
use crate::config::{AgentConfig, TurnOptions};
use crate::protocol::{self, build_followup_prompt, ToolExecutor};
use crate::store::{persist_append, SessionStore};
use crate::tokens::{self, TokenValidationResult};

use super::events::AgentEvent;
use super::provider::{ChatProvider, ChatRequest, ProviderError, StreamChunk, StreamOutcome};
use super::run_status::{AgentPhase, AgentRunStatus, ToolExecution};
use super::state::{create_shared_state, Attachment, HistoryEntry, Message, SharedState};

/// Orchestrator errors
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("provider error: {0}")]
    Provider(String),

    #[error("{guidance}")]
    VisionUnsupported { message: String, guidance: String },

    #[error("tool retries exhausted: {0}")]
    RetriesExhausted(String),
}

/// The finished assistant message for one turn
#[derive(Debug, Clone)]
pub struct FinishedMessage {
    pub id: Uuid,
    pub content: String,
    pub artifacts: Vec<Artifact>,
    pub classification_confidence: f32,
    pub tokens: TokenValidationResult,
    pub aborted: bool,
    pub is_streaming: bool,
    pub model: String,
}

/// Counts turns currently executing (shared with the host's visibility
/// handling). Incremented on run start, decremented by a guard so aborted
/// and errored turns cannot leak.
struct ActivityGuard(Arc<AtomicI64>);

impl ActivityGuard {
    fn new(counter: Arc<AtomicI64>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for ActivityGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// The conversational agent orchestrator.
pub struct AgentOrchestrator {
    config: AgentConfig,
    provider: Arc<dyn ChatProvider>,
    executor: ToolExecutor,
    classifier: ContentClassifier,
    state: SharedState,
    store: Option<Arc<dyn SessionStore>>,
    event_tx: Option<mpsc::Sender<AgentEvent>>,
    run_status: Arc<Mutex<AgentRunStatus>>,
    /// Cancellation handle for the in-flight turn; replaced at turn start
    turn_cancel: std::sync::Mutex<CancellationToken>,
    /// Guard for the armed safety-timeout task
    safety_cancel: std::sync::Mutex<CancellationToken>,
    /// Optional long-term memory context fed to the refinement pass
    memory_context: Option<String>,
    background_activity: Arc<AtomicI64>,
}

impl AgentOrchestrator {
    pub fn new(
        config: AgentConfig,
        provider: Arc<dyn ChatProvider>,
        executor: ToolExecutor,
    ) -> Self {
        Self {
            config,
            provider,
            executor,
            classifier: ContentClassifier::new(),
            state: create_shared_state(),
            store: None,
            event_tx: None,
            run_status: Arc::new(Mutex::new(AgentRunStatus::new())),
            turn_cancel: std::sync::Mutex::new(CancellationToken::new()),
            safety_cancel: std::sync::Mutex::new(CancellationToken::new()),
            memory_context: None,
            background_activity: Arc::new(AtomicI64::new(0)),
        }
    }

    pub fn with_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_events(mut self, event_tx: mpsc::Sender<AgentEvent>) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    pub fn with_memory_context(mut self, context: impl Into<String>) -> Self {
        self.memory_context = Some(context.into());
        self
    }

    /// Get shared conversation state
    pub fn state(&self) -> SharedState {
        self.state.clone()
    }

    /// The options one turn would actually run with, after mode
    /// exclusivity enforcement
    pub fn effective_options(&self) -> TurnOptions {
        TurnOptions::effective(&self.config)
    }

    /// Turns currently executing
    pub fn background_activity(&self) -> i64 {
        self.background_activity.load(Ordering::SeqCst)
    }

    /// Cancel the in-flight turn (cooperative; streamed content is kept)
    pub fn cancel_turn(&self) {
        if let Ok(guard) = self.turn_cancel.lock() {
            guard.cancel();
        }
    }

    // --- diagnostics ---

    /// Snapshot of the current run status
    pub async fn status_snapshot(&self) -> AgentRunStatus {
        self.run_status.lock().await.clone()
    }

    /// Force the current run to `Completed` (diagnostic escape hatch)
    pub async fn force_complete(&self) {
        let changed = self
            .run_status
            .lock()
            .await
            .force_complete("task completed (forced)");
        if changed {
            self.cancel_safety_timer();
            self.emit(AgentEvent::PhaseChange {
                phase: AgentPhase::Completed,
                message: "task completed (forced)".to_string(),
            });
        }
    }

    /// Drop cached classification results
    pub fn clear_cache(&self) {
        self.classifier.clear_cache();
    }

    /// Run one conversation turn.
    ///
    /// Content already streamed is preserved on user cancellation (the
    /// message comes back with `aborted = true`); only failures with no
    /// possible partial result surface as errors.
    pub async fn run_turn(
        &self,
        user_text: &str,
        attachments: Vec<Attachment>,
    ) -> Result<FinishedMessage, OrchestratorError> {
        let opts = TurnOptions::effective(&self.config);
        let _activity = ActivityGuard::new(self.background_activity.clone());

        // At-most-one active run: cancel whatever is in flight, reset status
        let (cancel, run_id) = self.begin_turn().await;

        // History snapshot before the new user entry lands: it must end
        // with an assistant entry, never user→user
        let (history, session_id) = {
            let state = self.state.lock().await;
            (
                state.history_for_provider(self.config.context_window_size),
                state.session_id,
            )
        };

        let user_message = Message::user(user_text).with_attachments(attachments.clone());
        if let Some(store) = &self.store {
            persist_append(store.clone(), session_id, user_message.clone());
        }
        self.state.lock().await.add_message(user_message);

        let result = if opts.autonomous {
            self.run_autonomous(user_text, attachments, history, &cancel, run_id)
                .await
        } else {
            self.run_plain(user_text, attachments, history, &cancel, run_id)
                .await
        };

        match &result {
            Ok(message) => {
                let mut record = Message::assistant(&message.content, &message.model);
                record.tokens = Some(message.tokens.tokens);
                self.state.lock().await.add_message(record.clone());
                if let Some(store) = &self.store {
                    persist_append(store.clone(), session_id, record);
                }
                self.emit(AgentEvent::Response(Box::new(message.clone())));
            }
            Err(e) => {
                self.emit(AgentEvent::Error(e.to_string()));
            }
        }

        result
    }

    /// A plain turn: one model call, no tools. Used both for live
    /// streaming mode and for autonomous-disabled configurations.
    async fn run_plain(
        &self,
        user_text: &str,
        attachments: Vec<Attachment>,
        history: Vec<HistoryEntry>,
        cancel: &CancellationToken,
        run_id: Uuid,
    ) -> Result<FinishedMessage, OrchestratorError> {
        let request = ChatRequest {
            prompt: user_text.to_string(),
            system_prompt: None,
            history,
            attachments,
        };

        match self.stream_once(request, cancel, run_id).await {
            Ok(outcome) => Ok(self.finish_message(
                outcome.text,
                outcome.reported_tokens,
                user_text,
                false,
            )),
            Err((e, partial)) if e.is_abort() => {
                Ok(self.aborted_message(partial, user_text, run_id).await)
            }
            Err((e, _)) => Err(self.fail_run(e, run_id).await),
        }
    }

    /// An autonomous turn: multi-phase run with tool cycles.
    async fn run_autonomous(
        &self,
        user_text: &str,
        attachments: Vec<Attachment>,
        history: Vec<HistoryEntry>,
        cancel: &CancellationToken,
        run_id: Uuid,
    ) -> Result<FinishedMessage, OrchestratorError> {
        let tools_loaded = self.executor.tool_count();
        self.update_status(run_id, |status| status.tools_loaded = tools_loaded)
            .await;
        self.set_phase(run_id, AgentPhase::Initializing, "preparing autonomous run")
            .await;

        let system_prompt = self.autonomous_system_prompt();
        let request = ChatRequest {
            prompt: user_text.to_string(),
            system_prompt: Some(system_prompt.clone()),
            history: history.clone(),
            attachments,
        };

        let mut outcome = match self.stream_once(request, cancel, run_id).await {
            Ok(outcome) => outcome,
            Err((e, partial)) if e.is_abort() => {
                return Ok(self.aborted_message(partial, user_text, run_id).await)
            }
            Err((e, _)) => return Err(self.fail_run(e, run_id).await),
        };
        // Idempotent: the chunk pump normally did this on the first chunk
        self.set_phase(run_id, AgentPhase::Planning, "model response received")
            .await;
        self.arm_safety_timer(run_id);

        let mut cycles: u32 = 0;
        let mut tools_used = false;

        let final_parsed = loop {
            let parsed = protocol::parse(&outcome.text);

            if !parsed.needs_execution {
                break parsed;
            }

            if cycles >= self.config.max_tool_calls {
                // Cap reached: the remaining requested calls are recorded
                // as skipped so the reflection prompt sees the cut
                let mut skipped = Vec::new();
                for call in &parsed.tool_calls {
                    let mut execution = ToolExecution::start(&call.tool_name);
                    execution.fail("skipped: tool call limit reached");
                    self.record_execution(run_id, execution.clone()).await;
                    skipped.push(execution);
                }

                self.set_phase(
                    run_id,
                    AgentPhase::Reflecting,
                    format!("tool call limit ({}) reached", self.config.max_tool_calls),
                )
                .await;

                let mut prompt = build_followup_prompt(user_text, &parsed.reasoning, &skipped);
                prompt.push_str(&format!(
                    "\n\nNote: the tool call limit ({}) was reached; no further tools \
                     will run. Answer with the results gathered so far.",
                    self.config.max_tool_calls
                ));

                outcome = match self
                    .stream_followup(prompt, system_prompt.clone(), &history, cancel, run_id)
                    .await?
                {
                    Some(next) => next,
                    None => {
                        return Ok(self
                            .aborted_message(outcome.text.clone(), user_text, run_id)
                            .await)
                    }
                };

                break protocol::parse(&outcome.text);
            }

            cycles += 1;
            tools_used = true;
            self.set_phase(run_id, AgentPhase::Executing, format!("tool cycle {}", cycles))
                .await;
            self.set_progress(run_id, cycles, self.config.max_tool_calls, "executing tools")
                .await;

            // Strictly sequential execution, cancellable between calls
            let mut executions = Vec::new();
            for call in &parsed.tool_calls {
                if cancel.is_cancelled() {
                    break;
                }
                self.emit(AgentEvent::ToolStarted {
                    tool_name: call.tool_name.clone(),
                });

                let mut batch = self
                    .executor
                    .execute_all(std::slice::from_ref(call), cancel)
                    .await;
                let Some(execution) = batch.pop() else {
                    continue;
                };

                if execution.succeeded() {
                    self.emit(AgentEvent::ToolCompleted {
                        tool_name: execution.tool_name.clone(),
                        summary: execution.summary.clone(),
                    });
                } else {
                    self.emit(AgentEvent::ToolFailed {
                        tool_name: execution.tool_name.clone(),
                        error: execution.summary.clone(),
                    });
                }

                self.record_execution(run_id, execution.clone()).await;
                executions.push(execution);
            }

            if cancel.is_cancelled() {
                return Ok(self
                    .aborted_message(parsed.cleaned_text.clone(), user_text, run_id)
                    .await);
            }

            let mut followup = build_followup_prompt(user_text, &parsed.reasoning, &executions);

            // A cycle with zero successes is a failed cycle: re-prompt with
            // a corrective instruction, up to max_retries
            let all_failed = !executions.is_empty() && executions.iter().all(|e| !e.succeeded());
            if all_failed {
                let mut retries = 0;
                self.update_status(run_id, |status| {
                    status.retries += 1;
                    retries = status.retries;
                    status.message = format!("retry {} after failed tool cycle", status.retries);
                })
                .await;

                if retries > self.config.max_retries {
                    let last_failure = executions
                        .last()
                        .map(|e| e.summary.clone())
                        .unwrap_or_else(|| "tool cycle failed".to_string());
                    let message = format!("tool cycle kept failing: {}", last_failure);
                    self.set_phase(run_id, AgentPhase::Error, message.clone()).await;
                    return Err(OrchestratorError::RetriesExhausted(message));
                }

                followup.push_str(
                    "\n\nEvery tool call in the last cycle failed. Check the tool names \
                     against the available tools and correct the arguments, or answer \
                     without tools if none apply.",
                );
                sleep(Duration::from_millis(self.config.retry_delay_ms)).await;
            }

            self.set_phase(run_id, AgentPhase::Reflecting, "folding tool results back")
                .await;

            outcome = match self
                .stream_followup(followup, system_prompt.clone(), &history, cancel, run_id)
                .await?
            {
                Some(next) => next,
                None => {
                    return Ok(self
                        .aborted_message(outcome.text.clone(), user_text, run_id)
                        .await)
                }
            };
        };

        // Completed: refinement pass, then classification + reconciliation
        let raw_text = final_parsed.cleaned_text;
        let final_text = if tools_used && self.config.refinement_enabled {
            match self.refine(&raw_text, cancel, run_id).await {
                Some(refined) if !refined.trim().is_empty() => refined,
                _ => raw_text.clone(),
            }
        } else {
            raw_text.clone()
        };

        self.set_phase(run_id, AgentPhase::Completed, "task completed")
            .await;
        Ok(self.finish_message(final_text, outcome.reported_tokens, user_text, false))
    }

    /// Request a follow-up response. `Ok(None)` means the turn was
    /// aborted by the user.
    async fn stream_followup(
        &self,
        prompt: String,
        system_prompt: String,
        history: &[HistoryEntry],
        cancel: &CancellationToken,
        run_id: Uuid,
    ) -> Result<Option<StreamOutcome>, OrchestratorError> {
        if cancel.is_cancelled() {
            return Ok(None);
        }

        let request = ChatRequest {
            prompt,
            system_prompt: Some(system_prompt),
            history: history.to_vec(),
            attachments: Vec::new(),
        };

        match self.stream_once(request, cancel, run_id).await {
            Ok(outcome) => {
                self.arm_safety_timer(run_id);
                Ok(Some(outcome))
            }
            Err((e, _)) if e.is_abort() => Ok(None),
            Err((e, _)) => Err(self.fail_run(e, run_id).await),
        }
    }

    /// One refinement call: the raw tool-annotated result is re-submitted
    /// with tools off, asking for a clean user-facing summary. Any failure
    /// falls back to deterministic post-processing.
    async fn refine(
        &self,
        raw_text: &str,
        cancel: &CancellationToken,
        run_id: Uuid,
    ) -> Option<String> {
        let mut prompt = String::from(
            "Below is the raw result of a tool-assisted run. Rewrite it as a clean, \
             user-facing answer grounded only in these results. Do not mention tools, \
             intermediate steps or JSON.\n\n",
        );
        prompt.push_str(raw_text);

        if let Some(memory) = &self.memory_context {
            prompt.push_str("\n\nLong-term memory context (use only if relevant):\n");
            prompt.push_str(memory);
        }

        let request = ChatRequest {
            prompt,
            system_prompt: None,
            history: Vec::new(),
            attachments: Vec::new(),
        };

        match self.stream_once(request, cancel, run_id).await {
            Ok(outcome) => Some(outcome.text),
            Err((e, _)) => {
                tracing::warn!("refinement pass failed, using raw text: {}", e);
                None
            }
        }
    }

    /// Send one request and pump its chunks: append to the buffer, emit
    /// chunk events, and flip Initializing → Planning on the first chunk.
    /// Both are non-blocking so chunk delivery is never stalled.
    async fn stream_once(
        &self,
        request: ChatRequest,
        cancel: &CancellationToken,
        run_id: Uuid,
    ) -> Result<StreamOutcome, (ProviderError, String)> {
        let (chunk_tx, mut chunk_rx) = mpsc::channel::<StreamChunk>(64);
        let accumulated = Arc::new(std::sync::Mutex::new(String::new()));

        let pump_acc = accumulated.clone();
        let event_tx = self.event_tx.clone();
        let status = self.run_status.clone();
        let pump = tokio::spawn(async move {
            let mut first = true;
            while let Some(chunk) = chunk_rx.recv().await {
                if chunk.done {
                    if let Some(tx) = &event_tx {
                        let _ = tx.try_send(AgentEvent::StreamEnd);
                    }
                    continue;
                }

                if first {
                    first = false;
                    // Idempotent: only legal from Initializing, and only
                    // for the run that owns the status
                    let moved = {
                        let mut status = status.lock().await;
                        status.run_id == run_id
                            && status.transition(AgentPhase::Planning, "model response streaming")
                    };
                    if moved {
                        if let Some(tx) = &event_tx {
                            let _ = tx.try_send(AgentEvent::PhaseChange {
                                phase: AgentPhase::Planning,
                                message: "model response streaming".to_string(),
                            });
                        }
                    }
                }

                if let Ok(mut acc) = pump_acc.lock() {
                    acc.push_str(&chunk.content);
                }
                if let Some(tx) = &event_tx {
                    let _ = tx.try_send(AgentEvent::Chunk(chunk.content));
                }
            }
        });

        let result = self
            .provider
            .send_chat(request, chunk_tx, cancel.clone())
            .await;
        let _ = pump.await;

        let partial = accumulated
            .lock()
            .map(|acc| acc.clone())
            .unwrap_or_default();
        result.map_err(|e| (e, partial))
    }

    /// Classify, reconcile and assemble the finished message.
    fn finish_message(
        &self,
        content: String,
        reported_tokens: Option<u32>,
        user_text: &str,
        aborted: bool,
    ) -> FinishedMessage {
        let classify_opts = ClassifyOptions {
            user_message: Some(user_text.to_string()),
            flags: self.config.artifacts.clone(),
            max_artifacts: self.config.max_artifacts_per_message,
            substitute_placeholders: false,
        };
        let classification = self.classifier.classify(&content, &classify_opts);

        let trust = self.config.model.provider.token_trust();
        let token_result = tokens::reconcile(reported_tokens, &content, trust);

        FinishedMessage {
            id: Uuid::new_v4(),
            content,
            artifacts: classification.artifacts,
            classification_confidence: classification.confidence,
            tokens: token_result,
            aborted,
            is_streaming: false,
            model: self.provider.model_name(),
        }
    }

    /// A user cancellation preserves everything already streamed.
    async fn aborted_message(
        &self,
        partial: String,
        user_text: &str,
        run_id: Uuid,
    ) -> FinishedMessage {
        let changed = {
            let mut status = self.run_status.lock().await;
            status.run_id == run_id && status.force_complete("cancelled by user")
        };
        if changed {
            self.cancel_safety_timer();
        }
        tracing::info!("turn aborted by user, {} chars preserved", partial.len());
        self.finish_message(partial, None, user_text, true)
    }

    /// Transition the run to `Error` and map the failure.
    async fn fail_run(&self, error: ProviderError, run_id: Uuid) -> OrchestratorError {
        self.set_phase(run_id, AgentPhase::Error, error.to_string())
            .await;

        match error {
            ProviderError::VisionUnsupported(message) => {
                let guidance = ProviderError::VisionUnsupported(message.clone())
                    .user_guidance()
                    .unwrap_or_else(|| message.clone());
                OrchestratorError::VisionUnsupported { message, guidance }
            }
            other => OrchestratorError::Provider(other.to_string()),
        }
    }

    async fn begin_turn(&self) -> (CancellationToken, Uuid) {
        let token = {
            // Poisoning is unrecoverable here; a fresh token is the only
            // sane fallback
            let mut guard = self
                .turn_cancel
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            guard.cancel();
            *guard = CancellationToken::new();
            guard.clone()
        };
        self.cancel_safety_timer();

        let status = AgentRunStatus::new();
        let run_id = status.run_id;
        *self.run_status.lock().await = status;
        (token, run_id)
    }

    /// Mutate the status only while `run_id` still owns it.
    async fn update_status(&self, run_id: Uuid, f: impl FnOnce(&mut AgentRunStatus)) {
        let mut status = self.run_status.lock().await;
        if status.run_id == run_id {
            f(&mut status);
        }
    }

    async fn set_phase(&self, run_id: Uuid, phase: AgentPhase, message: impl Into<String>) {
        let message = message.into();
        let changed = {
            let mut status = self.run_status.lock().await;
            status.run_id == run_id && status.transition(phase, message.clone())
        };
        if changed {
            if phase.is_terminal() {
                self.cancel_safety_timer();
            }
            self.emit(AgentEvent::PhaseChange { phase, message });
        }
    }

    async fn set_progress(&self, run_id: Uuid, current: u32, total: u32, message: &str) {
        self.update_status(run_id, |status| status.set_progress(current, total))
            .await;
        self.emit(AgentEvent::Progress {
            current_step: current,
            total_steps: total,
            message: message.to_string(),
        });
    }

    async fn record_execution(&self, run_id: Uuid, execution: ToolExecution) {
        self.update_status(run_id, |status| status.record_execution(execution))
            .await;
    }

    /// Arm (or re-arm) the safety timeout. If no phase transition happens
    /// within the window after a stream ends, a run stuck in
    /// Executing/Reflecting is force-completed so the status indicator
    /// can never hang. The timer is bound to its run id and cancelled on
    /// any terminal transition, so it cannot touch a newer run.
    fn arm_safety_timer(&self, run_id: Uuid) {
        self.cancel_safety_timer();

        let token = CancellationToken::new();
        if let Ok(mut guard) = self.safety_cancel.lock() {
            *guard = token.clone();
        }

        let status = self.run_status.clone();
        let event_tx = self.event_tx.clone();
        let secs = self.config.safety_timeout_secs;

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = sleep(Duration::from_secs(secs)) => {
                    let mut status = status.lock().await;
                    if status.run_id == run_id
                        && matches!(status.phase, AgentPhase::Executing | AgentPhase::Reflecting)
                    {
                        status.force_complete("task completed (safety timeout)");
                        tracing::warn!("safety timeout fired, run force-completed");
                        if let Some(tx) = &event_tx {
                            let _ = tx.try_send(AgentEvent::PhaseChange {
                                phase: AgentPhase::Completed,
                                message: "task completed (safety timeout)".to_string(),
                            });
                        }
                    }
                }
            }
        });
    }

    fn cancel_safety_timer(&self) {
        if let Ok(guard) = self.safety_cancel.lock() {
            guard.cancel();
        }
    }

    fn emit(&self, event: AgentEvent) {
        if let Some(tx) = &self.event_tx {
            // try_send: event delivery must never stall the turn
            let _ = tx.try_send(event);
        }
    }

    fn autonomous_system_prompt(&self) -> String {
        let tool_names = self.executor.tool_names();
        format!(
            "You are an assistant that can call tools.\n\n\
             Available tools: {}\n\n\
             To call tools, emit exactly one fenced block of this shape and \
             nothing else after it:\n\
             ```json\n\
             {{\"reasoning\": \"why\", \"toolCalls\": [{{\"toolName\": \"name\", \
             \"arguments\": {{}}, \"reasoning\": \"why this call\"}}], \
             \"needsToolExecution\": true}}\n\
             ```\n\n\
             When you have everything you need, answer in plain language \
             without the block.",
            tool_names.join(", ")
        )
    }
}
