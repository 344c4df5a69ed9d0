//! Black-Cross playbook runner.
//!
//! Loads a playbook file, executes it against the built-in actions and prints
//! the finalized execution as JSON.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use blackcross_playbook_engine::events::{self, spawn_event_logger};
use blackcross_playbook_engine::{
    validate_playbook, ActionRegistry, EngineConfig, ExecutionEngine, ExecutionStatus,
    ExpressionEvaluator, InMemoryExecutionRepository, Playbook,
};

#[derive(Parser)]
#[command(name = "blackcross-playbook")]
#[command(version, about = "Run Black-Cross security response playbooks locally", long_about = None)]
struct Cli {
    /// Emit logs as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a playbook and print the finished execution
    ///
    /// Examples:
    ///     blackcross-playbook run playbooks/phishing.yaml --set severity=critical
    ///     blackcross-playbook run contain.json --payload '{"ip": "10.0.0.5"}'
    #[command(verbatim_doc_comment)]
    Run {
        /// Playbook file (.yaml, .yml or .json)
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Trigger variable, value parsed as JSON when possible (repeatable)
        #[arg(long = "set", value_name = "KEY=VALUE")]
        variables: Vec<String>,

        /// Trigger payload as a JSON object
        #[arg(long = "payload", value_name = "JSON")]
        payload: Option<String>,

        /// Actor recorded as the trigger of the execution
        #[arg(long, default_value = "cli")]
        user: String,
    },
    /// Check a playbook definition without running it
    Validate {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing(cli.json);

    match cli.command {
        Commands::Run {
            file,
            variables,
            payload,
            user,
        } => run(&file, &variables, payload.as_deref(), &user).await,
        Commands::Validate { file } => {
            let playbook = load_playbook(&file)?;
            println!(
                "Playbook '{}' is valid ({} components)",
                playbook.id,
                playbook.components.len()
            );
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn init_tracing(json: bool) {
    let registry = tracing_subscriber::registry().with(
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "info,blackcross_playbook_engine=debug".into()),
    );

    // stdout carries the execution JSON, logs go to stderr.
    if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn run(file: &Path, variables: &[String], payload: Option<&str>, user: &str) -> Result<ExitCode> {
    let playbook = load_playbook(file)?;
    let trigger_data = build_trigger_data(payload, variables)?;

    let config = EngineConfig::from_env().context("Failed to load engine configuration")?;
    tracing::info!(
        playbook_id = %playbook.id,
        loop_concurrency = config.loop_concurrency,
        "Engine configuration loaded"
    );

    let (sink, rx) = events::channel(config.event_buffer);
    let logger = spawn_event_logger(rx);

    let engine = ExecutionEngine::new(
        Arc::new(ActionRegistry::with_builtins()),
        Arc::new(ExpressionEvaluator),
        Arc::new(InMemoryExecutionRepository::new()),
        config,
    )
    .with_event_sink(sink);

    let execution = engine
        .execute(Arc::new(playbook), user, trigger_data)
        .await
        .context("Failed to start execution")?;

    let finished = tokio::select! {
        result = engine.wait(execution.id) => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!(execution_id = %execution.id, "Interrupt received, cancelling execution");
            engine.cancel(execution.id).await?;
            engine.wait(execution.id).await?
        }
    };

    drop(engine);
    logger.await.ok();

    println!("{}", serde_json::to_string_pretty(&finished)?);

    if finished.status == ExecutionStatus::Completed {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

fn load_playbook(file: &Path) -> Result<Playbook> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read playbook file {}", file.display()))?;

    let playbook = match file.extension().and_then(|e| e.to_str()) {
        Some("json") => Playbook::from_json(&content),
        _ => Playbook::from_yaml(&content),
    }
    .with_context(|| format!("Failed to parse playbook {}", file.display()))?;

    validate_playbook(&playbook)
        .with_context(|| format!("Playbook {} is invalid", file.display()))?;
    Ok(playbook)
}

/// Merge `--payload` and `--set` into the trigger payload; `--set` wins.
fn build_trigger_data(payload: Option<&str>, variables: &[String]) -> Result<Value> {
    let mut data = match payload {
        Some(json) => match serde_json::from_str::<Value>(json).context("Invalid --payload JSON")? {
            Value::Object(map) => map,
            other => bail!("--payload must be a JSON object, got {}", other),
        },
        None => Map::new(),
    };

    for var in variables {
        let Some((key, raw)) = var.split_once('=') else {
            bail!("Invalid variable format: {}. Expected key=value", var);
        };
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        data.insert(key.to_string(), value);
    }

    Ok(Value::Object(data))
}
