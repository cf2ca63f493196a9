//! Configuration system for Aura
//!
//! Supports loading configuration from:
//! 1. CLI --config argument
//! 2. ~/.config/aura/config.{AURA_ENV}.json
//! 3. Default values
//!
//! Where AURA_ENV can be: production (default), development, test
//!
//! Streaming mode and autonomous (tool-using) mode are mutually exclusive
//! for a single turn. The stored configuration may have both flags set;
//! [`TurnOptions::effective`] resolves the conflict at dispatch time in
//! favor of streaming.
//!
//! # Examples
//!
//! ```
//! use aura::config::{AgentConfig, ConfigOverride};
//!
//! let base = AgentConfig::default();
//! let merged = AgentConfig::merged(
//!     base,
//!     ConfigOverride {
//!         max_tool_calls: Some(4),
//!         ..Default::default()
//!     },
//! )
//! .unwrap();
//! assert_eq!(merged.max_tool_calls, 4);
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::tokens::ProviderTrust;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config JSON: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Supported model providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ModelProvider {
    #[default]
    Ollama,
    OpenAI,
    Anthropic,
    Groq,
}

impl std::fmt::Display for ModelProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ollama => write!(f, "ollama"),
            Self::OpenAI => write!(f, "openai"),
            Self::Anthropic => write!(f, "anthropic"),
            Self::Groq => write!(f, "groq"),
        }
    }
}

impl std::str::FromStr for ModelProvider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAI),
            "anthropic" => Ok(Self::Anthropic),
            "groq" => Ok(Self::Groq),
            _ => Err(ConfigError::ValidationError(format!(
                "Unknown provider: {}",
                s
            ))),
        }
    }
}

impl ModelProvider {
    /// How much to trust this provider's self-reported token usage.
    ///
    /// Hosted APIs meter usage for billing, so their counts are reliable.
    /// Local runtimes frequently report zero or truncated counts.
    pub fn token_trust(&self) -> ProviderTrust {
        match self {
            Self::OpenAI | Self::Anthropic => ProviderTrust::High,
            Self::Groq => ProviderTrust::Medium,
            Self::Ollama => ProviderTrust::Medium,
        }
    }

    /// Check whether a model id plausibly belongs to this provider.
    ///
    /// Only well-known prefixes are rejected when they point at a different
    /// provider; unknown ids pass (Ollama model names are free-form).
    fn accepts_model(&self, model: &str) -> bool {
        let m = model.to_lowercase();
        let looks_openai = m.starts_with("gpt-") || m.starts_with("o1") || m.starts_with("o3");
        let looks_anthropic = m.starts_with("claude");

        match self {
            Self::OpenAI => !looks_anthropic,
            Self::Anthropic => !looks_openai,
            Self::Ollama | Self::Groq => !looks_openai && !looks_anthropic,
        }
    }
}

/// Configuration for the chat model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Provider type
    pub provider: ModelProvider,

    /// API URL (for Ollama) or base URL
    #[serde(default = "default_ollama_url")]
    pub url: String,

    /// Model name
    pub model: String,

    /// API key (can be environment variable name like "OPENAI_API_KEY")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Temperature (0.0 - 2.0)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Top P sampling (0.0 - 1.0)
    #[serde(default = "default_top_p")]
    pub top_p: f32,

    /// Maximum tokens to generate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<usize>,
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_top_p() -> f32 {
    0.95
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: ModelProvider::Ollama,
            url: default_ollama_url(),
            model: "qwen3:8b".to_string(),
            api_key: None,
            temperature: default_temperature(),
            top_p: default_top_p(),
            max_tokens: None,
        }
    }
}

impl ModelConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationError(format!(
                "Temperature must be between 0.0 and 2.0, got {}",
                self.temperature
            )));
        }

        if !(0.0..=1.0).contains(&self.top_p) {
            return Err(ConfigError::ValidationError(format!(
                "Top P must be between 0.0 and 1.0, got {}",
                self.top_p
            )));
        }

        if self.url.is_empty() {
            return Err(ConfigError::ValidationError(
                "URL cannot be empty".to_string(),
            ));
        }

        if self.model.is_empty() {
            return Err(ConfigError::ValidationError(
                "Model name cannot be empty".to_string(),
            ));
        }

        if !self.provider.accepts_model(&self.model) {
            return Err(ConfigError::ValidationError(format!(
                "Model '{}' does not belong to provider '{}'",
                self.model, self.provider
            )));
        }

        if self.provider != ModelProvider::Ollama && self.api_key.is_none() {
            return Err(ConfigError::ValidationError(format!(
                "API key required for {} provider",
                self.provider
            )));
        }

        Ok(())
    }

    /// Resolve API key from environment variable if needed
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key.as_ref().and_then(|key| {
            // If the key looks like an env var name, try to resolve it
            if key.chars().all(|c| c.is_uppercase() || c == '_') {
                std::env::var(key).ok()
            } else {
                Some(key.clone())
            }
        })
    }
}

/// Per-type toggles for artifact extraction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactFlags {
    #[serde(default = "default_true")]
    pub code: bool,
    #[serde(default = "default_true")]
    pub tables: bool,
    #[serde(default = "default_true")]
    pub diagrams: bool,
    #[serde(default = "default_true")]
    pub structured_data: bool,
    #[serde(default = "default_true")]
    pub math: bool,
    #[serde(default = "default_true")]
    pub context_aware: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ArtifactFlags {
    fn default() -> Self {
        Self {
            code: true,
            tables: true,
            diagrams: true,
            structured_data: true,
            math: true,
            context_aware: true,
        }
    }
}

/// Main agent configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Chat model configuration
    #[serde(default)]
    pub model: ModelConfig,

    /// Stream tokens live to the caller (disables autonomous mode per turn)
    #[serde(default)]
    pub streaming_enabled: bool,

    /// Allow multi-step autonomous tool use
    #[serde(default = "default_true")]
    pub autonomous_enabled: bool,

    /// Maximum corrective re-prompts after a failed tool cycle
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay between retries in milliseconds
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Maximum tool-call cycles within one turn
    #[serde(default = "default_max_tool_calls")]
    pub max_tool_calls: u32,

    /// Informational classification threshold (0.0 - 1.0)
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,

    /// Maximum history entries kept in the provider context
    #[serde(default = "default_context_window")]
    pub context_window_size: usize,

    /// Per-type artifact extraction toggles
    #[serde(default)]
    pub artifacts: ArtifactFlags,

    /// Cap on artifacts attached to one message
    #[serde(default = "default_max_artifacts")]
    pub max_artifacts_per_message: usize,

    /// Re-submit the raw autonomous result once for a clean summary
    #[serde(default = "default_true")]
    pub refinement_enabled: bool,

    /// Seconds without a phase transition (after stream end) before the run
    /// is force-completed
    #[serde(default = "default_safety_timeout")]
    pub safety_timeout_secs: u64,

    /// Enable debug logging
    #[serde(default)]
    pub debug: bool,
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_max_tool_calls() -> u32 {
    10
}

fn default_confidence_threshold() -> f32 {
    0.7
}

fn default_context_window() -> usize {
    50
}

fn default_max_artifacts() -> usize {
    8
}

fn default_safety_timeout() -> u64 {
    10
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: ModelConfig::default(),
            streaming_enabled: false,
            autonomous_enabled: true,
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            max_tool_calls: default_max_tool_calls(),
            confidence_threshold: default_confidence_threshold(),
            context_window_size: default_context_window(),
            artifacts: ArtifactFlags::default(),
            max_artifacts_per_message: default_max_artifacts(),
            refinement_enabled: true,
            safety_timeout_secs: default_safety_timeout(),
            debug: false,
        }
    }
}

/// Partial override applied on top of a full configuration.
///
/// Every field is optional; `None` keeps the base value. The merged result
/// is re-validated as a whole, so an override that introduces a cross-field
/// inconsistency (e.g. a model id belonging to a different provider) is
/// rejected instead of silently ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigOverride {
    pub model: Option<ModelConfig>,
    pub streaming_enabled: Option<bool>,
    pub autonomous_enabled: Option<bool>,
    pub max_retries: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    pub max_tool_calls: Option<u32>,
    pub confidence_threshold: Option<f32>,
    pub context_window_size: Option<usize>,
    pub artifacts: Option<ArtifactFlags>,
    pub max_artifacts_per_message: Option<usize>,
    pub refinement_enabled: Option<bool>,
    pub safety_timeout_secs: Option<u64>,
    pub debug: Option<bool>,
}

impl AgentConfig {
    /// Load configuration from file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: AgentConfig = serde_json::from_str(&content)?;

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Load configuration with standard priority:
    /// 1. Explicit path
    /// 2. ~/.config/aura/config.{AURA_ENV}.json
    /// 3. Defaults
    pub fn load(explicit_path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit_path {
            if path.exists() {
                tracing::info!("Loading config from: {:?}", path);
                return Self::from_file(path);
            } else {
                return Err(ConfigError::ValidationError(format!(
                    "Config file not found: {:?}",
                    path
                )));
            }
        }

        let env = std::env::var("AURA_ENV").unwrap_or_else(|_| "production".to_string());

        if let Some(config_dir) = dirs::config_dir() {
            let config_path = config_dir.join("aura").join(format!("config.{}.json", env));

            if config_path.exists() {
                tracing::info!("Loading config from: {:?}", config_path);
                return Self::from_file(&config_path);
            }
        }

        tracing::info!("Using default configuration with environment overrides");
        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Merge a partial override onto a base configuration and re-validate.
    pub fn merged(base: AgentConfig, overrides: ConfigOverride) -> Result<Self, ConfigError> {
        let mut config = base;

        if let Some(model) = overrides.model {
            config.model = model;
        }
        if let Some(v) = overrides.streaming_enabled {
            config.streaming_enabled = v;
        }
        if let Some(v) = overrides.autonomous_enabled {
            config.autonomous_enabled = v;
        }
        if let Some(v) = overrides.max_retries {
            config.max_retries = v;
        }
        if let Some(v) = overrides.retry_delay_ms {
            config.retry_delay_ms = v;
        }
        if let Some(v) = overrides.max_tool_calls {
            config.max_tool_calls = v;
        }
        if let Some(v) = overrides.confidence_threshold {
            config.confidence_threshold = v;
        }
        if let Some(v) = overrides.context_window_size {
            config.context_window_size = v;
        }
        if let Some(v) = overrides.artifacts {
            config.artifacts = v;
        }
        if let Some(v) = overrides.max_artifacts_per_message {
            config.max_artifacts_per_message = v;
        }
        if let Some(v) = overrides.refinement_enabled {
            config.refinement_enabled = v;
        }
        if let Some(v) = overrides.safety_timeout_secs {
            config.safety_timeout_secs = v;
        }
        if let Some(v) = overrides.debug {
            config.debug = v;
        }

        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("AURA_URL") {
            self.model.url = url;
        }

        if let Ok(model) = std::env::var("AURA_MODEL") {
            self.model.model = model;
        }

        if let Ok(debug) = std::env::var("AURA_DEBUG") {
            self.debug = debug.eq_ignore_ascii_case("true")
                || debug == "1"
                || debug.eq_ignore_ascii_case("yes");
        }

        // API keys are resolved on-demand via resolve_api_key()
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.model.validate()?;

        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(ConfigError::ValidationError(format!(
                "confidence_threshold must be between 0.0 and 1.0, got {}",
                self.confidence_threshold
            )));
        }

        if self.context_window_size == 0 {
            return Err(ConfigError::ValidationError(
                "context_window_size must be greater than 0".to_string(),
            ));
        }

        if self.max_tool_calls == 0 {
            return Err(ConfigError::ValidationError(
                "max_tool_calls must be greater than 0".to_string(),
            ));
        }

        if self.safety_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "safety_timeout_secs must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Get the config directory path
    pub fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("aura"))
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Options actually used for one turn, after mode-exclusivity enforcement.
///
/// A turn is either a live token stream or a multi-step tool-using run,
/// never both. When `streaming_enabled` is set on the stored config, the
/// effective options force autonomy and tools off for that turn regardless
/// of the stored `autonomous_enabled` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnOptions {
    pub streaming: bool,
    pub autonomous: bool,
    pub tools_enabled: bool,
}

impl TurnOptions {
    pub fn effective(config: &AgentConfig) -> Self {
        if config.streaming_enabled {
            Self {
                streaming: true,
                autonomous: false,
                tools_enabled: false,
            }
        } else {
            Self {
                streaming: false,
                autonomous: config.autonomous_enabled,
                tools_enabled: config.autonomous_enabled,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AgentConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.model.provider, ModelProvider::Ollama);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.max_tool_calls, 10);
        assert_eq!(config.context_window_size, 50);
    }

    #[test]
    fn test_model_config_validation() {
        let mut config = ModelConfig::default();
        assert!(config.validate().is_ok());

        // Invalid temperature
        config.temperature = 3.0;
        assert!(config.validate().is_err());

        config.temperature = 0.7;
        config.top_p = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_provider_from_str() {
        assert_eq!(
            "ollama".parse::<ModelProvider>().unwrap(),
            ModelProvider::Ollama
        );
        assert_eq!(
            "ANTHROPIC".parse::<ModelProvider>().unwrap(),
            ModelProvider::Anthropic
        );
        assert!("invalid".parse::<ModelProvider>().is_err());
    }

    #[test]
    fn test_cross_provider_model_rejected() {
        let mut config = ModelConfig::default();
        config.model = "gpt-4o-mini".to_string();
        // gpt-* on an Ollama provider is a misconfiguration
        assert!(config.validate().is_err());

        let base = AgentConfig::default();
        let result = AgentConfig::merged(
            base,
            ConfigOverride {
                model: Some(ModelConfig {
                    model: "claude-sonnet-4".to_string(),
                    ..Default::default()
                }),
                ..Default::default()
            },
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_merged_override() {
        let base = AgentConfig::default();
        let merged = AgentConfig::merged(
            base,
            ConfigOverride {
                max_tool_calls: Some(4),
                streaming_enabled: Some(true),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(merged.max_tool_calls, 4);
        assert!(merged.streaming_enabled);
    }

    #[test]
    fn test_mode_exclusivity() {
        let mut config = AgentConfig::default();
        config.streaming_enabled = true;
        config.autonomous_enabled = true;

        let opts = TurnOptions::effective(&config);
        assert!(opts.streaming);
        assert!(!opts.autonomous);
        assert!(!opts.tools_enabled);

        config.streaming_enabled = false;
        let opts = TurnOptions::effective(&config);
        assert!(!opts.streaming);
        assert!(opts.autonomous);
        assert!(opts.tools_enabled);
    }

    #[test]
    fn test_serialize_config() {
        let config = AgentConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: AgentConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config.model.model, parsed.model.model);
    }
}
