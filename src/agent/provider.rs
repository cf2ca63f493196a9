//! Provider stream capability
//!
//! The orchestrator treats model providers as a black box: send a prompt
//! plus history, receive text chunks, get the finished text back. The
//! trait supports cooperative cancellation and surfaces a distinguishable
//! "aborted by caller" failure; an Ollama-compatible streaming client is
//! bundled.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::Sender;
use tokio_util::sync::CancellationToken;

use crate::config::ModelConfig;

use super::state::{Attachment, HistoryEntry, MessageRole};

/// Streaming chunk message
#[derive(Debug, Clone)]
pub struct StreamChunk {
    pub content: String,
    pub done: bool,
}

/// One request to the provider
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub prompt: String,
    pub system_prompt: Option<String>,
    pub history: Vec<HistoryEntry>,
    pub attachments: Vec<Attachment>,
}

/// Finished stream: full text plus whatever usage the provider reported
#[derive(Debug, Clone)]
pub struct StreamOutcome {
    pub text: String,
    pub reported_tokens: Option<u32>,
}

/// Provider failures, classified
#[derive(Error, Debug)]
pub enum ProviderError {
    /// The caller cancelled the request; not a real failure
    #[error("request aborted by caller")]
    Aborted,

    /// The model cannot process an attached modality
    #[error("model does not support this input: {0}")]
    VisionUnsupported(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("model error: {0}")]
    Model(String),
}

const ABORT_MARKERS: &[&str] = &["abort", "cancelled by caller", "canceled by caller"];
const VISION_MARKERS: &[&str] = &[
    "does not support images",
    "image input not supported",
    "vision not supported",
    "no multimodal",
    "unsupported image",
];

impl ProviderError {
    /// Classify a raw failure message from a stream.
    pub fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();

        if ABORT_MARKERS.iter().any(|m| lower.contains(m)) {
            return Self::Aborted;
        }
        if VISION_MARKERS.iter().any(|m| lower.contains(m)) {
            return Self::VisionUnsupported(message.to_string());
        }
        if lower.contains("connection") || lower.contains("connect") || lower.contains("network") {
            return Self::Connection(message.to_string());
        }
        Self::Model(message.to_string())
    }

    pub fn is_abort(&self) -> bool {
        matches!(self, Self::Aborted)
    }

    /// Actionable guidance for failures the user can fix themselves.
    pub fn user_guidance(&self) -> Option<String> {
        match self {
            Self::VisionUnsupported(_) => Some(
                "The current model cannot read image attachments. \
                 Switch to a vision-capable model (for example llava or \
                 a multimodal hosted model) and resend the message."
                    .to_string(),
            ),
            _ => None,
        }
    }
}

/// Black-box chat capability: send a request, stream chunks back.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Model identifier, for message records
    fn model_name(&self) -> String;

    /// Send one chat request. Chunks are forwarded to `chunk_tx` as they
    /// arrive; the finished text is returned. Cancellation must abort the
    /// in-flight request via the stream's own handle and surface
    /// [`ProviderError::Aborted`].
    async fn send_chat(
        &self,
        request: ChatRequest,
        chunk_tx: Sender<StreamChunk>,
        cancel: CancellationToken,
    ) -> Result<StreamOutcome, ProviderError>;
}

// --- Ollama-compatible implementation ---

/// Ollama chat request
#[derive(Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<serde_json::Value>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
    top_p: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<usize>,
}

/// Ollama streaming response (one chunk)
#[derive(Debug, Deserialize)]
struct OllamaStreamChunk {
    message: OllamaStreamMessage,
    done: bool,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct OllamaStreamMessage {
    content: String,
}

/// Streaming client for Ollama's `/api/chat` endpoint.
pub struct OllamaProvider {
    config: ModelConfig,
    client: reqwest::Client,
}

impl OllamaProvider {
    pub fn new(config: ModelConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    /// Probe the endpoint so startup can fail fast with a useful message.
    pub async fn probe(&self) -> Result<(), ProviderError> {
        self.client
            .get(format!("{}/api/tags", self.config.url))
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map_err(|e| ProviderError::Connection(e.to_string()))?;
        Ok(())
    }

    fn build_messages(&self, request: &ChatRequest) -> Vec<serde_json::Value> {
        let mut messages = Vec::new();

        if let Some(system) = &request.system_prompt {
            messages.push(serde_json::json!({
                "role": "system",
                "content": system,
            }));
        }

        for entry in &request.history {
            let role = match entry.role {
                MessageRole::User => "user",
                MessageRole::Assistant => "assistant",
                MessageRole::System => "system",
            };
            messages.push(serde_json::json!({
                "role": role,
                "content": entry.content,
            }));
        }

        let images: Vec<&str> = request
            .attachments
            .iter()
            .filter(|a| a.is_image())
            .map(|a| a.data.as_str())
            .collect();

        if images.is_empty() {
            messages.push(serde_json::json!({
                "role": "user",
                "content": request.prompt,
            }));
        } else {
            messages.push(serde_json::json!({
                "role": "user",
                "content": request.prompt,
                "images": images,
            }));
        }

        messages
    }
}

#[async_trait]
impl ChatProvider for OllamaProvider {
    fn model_name(&self) -> String {
        self.config.model.clone()
    }

    async fn send_chat(
        &self,
        request: ChatRequest,
        chunk_tx: Sender<StreamChunk>,
        cancel: CancellationToken,
    ) -> Result<StreamOutcome, ProviderError> {
        use futures_util::StreamExt;

        let body = OllamaChatRequest {
            model: self.config.model.clone(),
            messages: self.build_messages(&request),
            stream: true,
            options: OllamaOptions {
                temperature: self.config.temperature,
                top_p: self.config.top_p,
                num_predict: self.config.max_tokens,
            },
        };

        let url = format!("{}/api/chat", self.config.url);
        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(ProviderError::Aborted),
            result = self.client.post(&url).json(&body).send() => {
                result.map_err(|e| ProviderError::Connection(e.to_string()))?
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(ProviderError::classify(&format!(
                "HTTP {} - {}",
                status, error_text
            )));
        }

        let mut full_response = String::new();
        let mut reported_tokens = None;
        let mut stream = response.bytes_stream();
        let mut buffer = String::new();

        loop {
            let chunk_result = tokio::select! {
                _ = cancel.cancelled() => return Err(ProviderError::Aborted),
                next = stream.next() => next,
            };

            let chunk_bytes = match chunk_result {
                Some(Ok(bytes)) => bytes,
                Some(Err(e)) => return Err(ProviderError::classify(&e.to_string())),
                None => break,
            };

            buffer.push_str(&String::from_utf8_lossy(&chunk_bytes));

            // Process complete NDJSON lines
            while let Some(newline_pos) = buffer.find('\n') {
                let line = buffer.drain(..=newline_pos).collect::<String>();
                let line = line.trim();

                if line.is_empty() {
                    continue;
                }

                match serde_json::from_str::<OllamaStreamChunk>(line) {
                    Ok(stream_chunk) => {
                        let content = stream_chunk.message.content;

                        if !content.is_empty() {
                            full_response.push_str(&content);
                            let _ = chunk_tx
                                .send(StreamChunk {
                                    content,
                                    done: false,
                                })
                                .await;
                        }

                        if stream_chunk.done {
                            reported_tokens = stream_chunk.eval_count;
                            let _ = chunk_tx
                                .send(StreamChunk {
                                    content: String::new(),
                                    done: true,
                                })
                                .await;
                        }
                    }
                    Err(e) => {
                        tracing::debug!("unparseable stream line: {} ({})", line, e);
                    }
                }
            }
        }

        Ok(StreamOutcome {
            text: full_response,
            reported_tokens,
        })
    }
}
