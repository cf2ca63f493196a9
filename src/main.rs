//! Aura - conversational agent CLI
//!
//! Runs one turn against an Ollama-compatible endpoint: either a live
//! token stream or an autonomous tool-using run.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use aura::agent::{AgentEvent, AgentOrchestrator, OllamaProvider};
use aura::config::{AgentConfig, ConfigOverride};
use aura::protocol::ToolExecutor;
use aura::store::MemoryStore;
use aura::tools::{BuiltinToolSet, NamespacedToolSet, UserToolSet};
use aura::{log_error, logging};

#[derive(Parser, Debug)]
#[command(name = "aura")]
#[command(version = "0.1.0")]
#[command(about = "Conversational agent core with autonomous tool use", long_about = None)]
struct Args {
    /// The user message to process
    prompt: String,

    /// Configuration file path (overrides defaults)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Provider API URL
    #[arg(long)]
    url: Option<String>,

    /// Model name
    #[arg(long)]
    model: Option<String>,

    /// Stream tokens live (disables tools for this turn)
    #[arg(long)]
    streaming: bool,

    /// Skip the refinement pass
    #[arg(long)]
    no_refine: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration and apply CLI overrides
    let mut config = AgentConfig::load(args.config.as_deref())?;
    if let Some(url) = args.url {
        config.model.url = url;
    }
    if let Some(model) = args.model {
        config.model.model = model;
    }
    config = AgentConfig::merged(
        config,
        ConfigOverride {
            streaming_enabled: Some(args.streaming),
            refinement_enabled: Some(!args.no_refine),
            ..Default::default()
        },
    )?;

    init_logging(args.verbose, config.debug);

    // Probe the provider so we can fail with something actionable
    let provider = Arc::new(OllamaProvider::new(config.model.clone()));
    if let Err(e) = provider.probe().await {
        log_error!("Failed to connect to model provider: {}", e);
        eprintln!("❌ Failed to connect to {}: {}", config.model.url, e);
        eprintln!("\nFor Ollama, make sure it's running:");
        eprintln!("  ollama serve");
        eprintln!("\nAnd that you have the model:");
        eprintln!("  ollama pull {}", config.model.model);
        return Err(e.into());
    }

    // Resolver chain: external → builtin → user
    let executor = ToolExecutor::new(vec![
        Arc::new(NamespacedToolSet::new()),
        Arc::new(BuiltinToolSet::new()),
        Arc::new(UserToolSet::new()),
    ]);

    let (event_tx, mut event_rx) = mpsc::channel(256);
    let orchestrator = AgentOrchestrator::new(config, provider, executor)
        .with_store(Arc::new(MemoryStore::new()))
        .with_events(event_tx);

    // Print progress and chunks as they arrive
    let printer = tokio::spawn(async move {
        use std::io::Write;
        while let Some(event) = event_rx.recv().await {
            match event {
                AgentEvent::Chunk(content) => {
                    print!("{}", content);
                    let _ = std::io::stdout().flush();
                }
                AgentEvent::PhaseChange { phase, message } => {
                    eprintln!("[{}] {}", phase, message);
                }
                AgentEvent::ToolStarted { tool_name } => {
                    eprintln!("🔧 {} ...", tool_name);
                }
                AgentEvent::ToolFailed { tool_name, error } => {
                    eprintln!("❌ {} failed: {}", tool_name, error);
                }
                _ => {}
            }
        }
    });

    let message = orchestrator.run_turn(&args.prompt, Vec::new()).await?;
    drop(orchestrator);
    let _ = printer.await;

    println!("\n\n--- {} ---", message.model);
    println!("{}", message.content);

    if !message.artifacts.is_empty() {
        println!("\nArtifacts:");
        for artifact in &message.artifacts {
            println!(
                "  [{}] {}{}",
                artifact.kind,
                artifact.title,
                artifact
                    .language
                    .as_deref()
                    .map(|l| format!(" ({})", l))
                    .unwrap_or_default()
            );
        }
    }

    println!(
        "\nTokens: {} ({}, {:?} confidence)",
        message.tokens.tokens, message.tokens.method, message.tokens.confidence
    );

    Ok(())
}

/// Initialize logging: file logger always, console tracing when verbose
fn init_logging(verbose: bool, debug: bool) {
    let _ = logging::init_logger();
    if debug {
        logging::set_debug_mode(true);
    }

    let filter = if verbose || debug {
        "aura=debug,info"
    } else {
        "aura=info,warn"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}
