//! Aura - Conversational agent core
//!
//! Aura turns one user message into a finished assistant turn when
//! autonomous tool use is enabled: a multi-phase execution state machine
//! with retries and a safety timeout, a text-based structured tool-call
//! protocol, a pattern-based content classifier that extracts typed
//! artifacts from free-form model output, and token-count reconciliation
//! between provider-reported usage and local estimation.
//!
//! # Módulos Principales
//!
//! - [`agent`] - Turn orchestration, run phases, provider stream seam
//! - [`protocol`] - Tool-call directive parsing, resolver chain, follow-ups
//! - [`classifier`] - Artifact extraction with confidence scoring
//! - [`tokens`] - Token estimation and reconciliation
//! - [`tools`] - Built-in, namespaced-external and user tool sets
//! - [`store`] - Session persistence seam (fire-and-forget)
//!
//! # Ejemplo de Uso
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use aura::agent::{AgentOrchestrator, OllamaProvider};
//! use aura::config::AgentConfig;
//! use aura::protocol::ToolExecutor;
//! use aura::tools::BuiltinToolSet;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = AgentConfig::default();
//! let provider = Arc::new(OllamaProvider::new(config.model.clone()));
//! let executor = ToolExecutor::new(vec![Arc::new(BuiltinToolSet::new())]);
//!
//! let orchestrator = AgentOrchestrator::new(config, provider, executor);
//! let message = orchestrator.run_turn("what time is it?", Vec::new()).await?;
//! println!("{}", message.content);
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod classifier;
pub mod config;
pub mod logging;
pub mod protocol;
pub mod store;
pub mod tokens;
pub mod tools;

pub use agent::orchestrator::AgentOrchestrator;
pub use agent::provider::OllamaProvider;
pub use classifier::ContentClassifier;
pub use config::AgentConfig;
pub use protocol::ToolExecutor;
pub use store::MemoryStore;
