//! Corynth command-line entry point.
//!
//! Thin shell over the library crates: flag parsing, config loading, signal
//! handling, and plain-text rendering. All execution semantics live in
//! `corynth-engine` and friends.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use corynth_engine::resolver::infer_type;
use corynth_engine::{Orchestrator, PluginDispatcher, WorkflowEngine};
use corynth_plugin::PluginRegistry;
use corynth_state::{LocalStateStore, StateBackend};
use corynth_types::{parse_duration, Config};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "corynth", version, about = "Declarative workflow orchestration engine")]
struct Cli {
    /// Path to a config file (defaults to ./corynth.yaml, then ~/.corynth/config.yaml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Prepare the working directory: state dirs and plugin discovery.
    Init,
    /// Show the execution plan for a workflow.
    Plan {
        workflow: PathBuf,
        /// Workflow variables as name=value pairs.
        #[arg(long = "var", value_name = "NAME=VALUE")]
        vars: Vec<String>,
    },
    /// Execute a workflow with its dependencies and triggers.
    Apply {
        workflow: PathBuf,
        #[arg(long = "var", value_name = "NAME=VALUE")]
        vars: Vec<String>,
    },
    /// Inspect persisted execution state.
    #[command(subcommand)]
    State(StateCommand),
    /// Manage plugins.
    #[command(subcommand)]
    Plugin(PluginCommand),
}

#[derive(Subcommand)]
enum StateCommand {
    /// List recorded executions.
    List,
    /// Show one execution record as JSON.
    Show { id: String },
    /// Show the latest outputs of a workflow.
    Outputs { workflow: String },
    /// Remove finished executions older than the retention window.
    Clean {
        /// Override the configured retention, e.g. "24h" or "30m".
        #[arg(long)]
        older_than: Option<String>,
    },
}

#[derive(Subcommand)]
enum PluginCommand {
    /// List discovered plugins.
    List,
    /// Install a plugin from the configured repositories.
    Install { name: String },
    /// Stop and delete a plugin.
    Remove { name: String },
    /// Search known plugins by name or description.
    Search { query: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Init => init(&config).await,
        Command::Plan { workflow, vars } => plan(&config, &workflow, parse_vars(&vars)?).await,
        Command::Apply { workflow, vars } => apply(&config, &workflow, parse_vars(&vars)?).await,
        Command::State(command) => state(&config, command).await,
        Command::Plugin(command) => plugin(&config, command).await,
    }
}

fn init_tracing() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into());
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn load_config(explicit: Option<&std::path::Path>) -> Result<Config> {
    let candidates: Vec<PathBuf> = match explicit {
        Some(path) => vec![path.to_path_buf()],
        None => {
            let mut paths = vec![PathBuf::from("corynth.yaml")];
            if let Some(home) = dirs_next::home_dir() {
                paths.push(home.join(".corynth").join("config.yaml"));
            }
            paths
        }
    };

    for candidate in candidates {
        match std::fs::read_to_string(&candidate) {
            Ok(contents) => {
                let config: Config = serde_yaml::from_str(&contents)
                    .with_context(|| format!("invalid config file {}", candidate.display()))?;
                info!(config = %candidate.display(), "loaded configuration");
                return Ok(config);
            }
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => continue,
            Err(error) => return Err(error).with_context(|| format!("cannot read {}", candidate.display())),
        }
    }
    Ok(Config::default())
}

/// Parse `name=value` pairs, inferring bool/number types the same way the
/// engine does for interpolated params.
fn parse_vars(pairs: &[String]) -> Result<HashMap<String, Value>> {
    let mut variables = HashMap::new();
    for pair in pairs {
        let Some((name, value)) = pair.split_once('=') else {
            bail!("invalid --var '{pair}'; expected NAME=VALUE");
        };
        variables.insert(name.trim().to_string(), infer_type(value));
    }
    Ok(variables)
}

async fn build_runtime(config: &Config) -> Result<(Arc<PluginRegistry>, Arc<LocalStateStore>, Arc<WorkflowEngine>)> {
    let store = Arc::new(LocalStateStore::open(&config.state_dir).await?);
    let registry = Arc::new(PluginRegistry::new(
        config.plugin_dirs.clone(),
        config.repositories.clone(),
    ));
    registry.load_local().await?;
    let dispatcher = Arc::new(PluginDispatcher::new(registry.clone()));
    let engine = Arc::new(WorkflowEngine::new(dispatcher, store.clone()));
    Ok((registry, store, engine))
}

async fn init(config: &Config) -> Result<()> {
    let (registry, _store, _engine) = build_runtime(config).await?;
    let discovered = registry.list().await.len();
    println!("state directory: {}", config.state_dir.display());
    for dir in &config.plugin_dirs {
        println!("plugin directory: {}", dir.display());
    }
    println!("{discovered} plugin(s) discovered");
    Ok(())
}

async fn plan(config: &Config, workflow_file: &std::path::Path, variables: HashMap<String, Value>) -> Result<()> {
    let (_registry, _store, engine) = build_runtime(config).await?;
    let workflow = corynth_engine::load_workflow_file(workflow_file).await?;
    let plan = engine.plan(&workflow, variables).await?;

    println!("Plan for workflow '{}' ({} steps):", plan.workflow_name, plan.planned_steps.len());
    for step in &plan.planned_steps {
        let dependencies = if step.dependencies.is_empty() {
            String::new()
        } else {
            format!("  (after {})", step.dependencies.join(", "))
        };
        println!(
            "  {} -> {}.{}  ~{}s{dependencies}",
            step.name,
            step.plugin,
            step.action,
            step.estimated_duration.as_secs()
        );
    }
    for warning in &plan.warnings {
        match &warning.step {
            Some(step) => println!("warning [{step}]: {}", warning.message),
            None => println!("warning: {}", warning.message),
        }
    }
    println!("estimated total: ~{}s", plan.estimated_duration().as_secs());
    Ok(())
}

async fn apply(config: &Config, workflow_file: &std::path::Path, variables: HashMap<String, Value>) -> Result<()> {
    let (registry, _store, engine) = build_runtime(config).await?;
    let orchestrator = Orchestrator::new(engine);

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; cancelling execution");
            signal_cancel.cancel();
        }
    });

    let state = orchestrator.execute_chain(&cancel, workflow_file, variables).await;
    registry.close_all().await;
    let state = state?;

    println!("execution {} finished: {:?}", state.id, state.status);
    for step in &state.steps {
        let detail = step
            .error_message
            .as_deref()
            .map(|message| format!("  ({message})"))
            .unwrap_or_default();
        println!("  {}: {:?}{detail}", step.name, step.status);
    }
    if !state.outputs.is_empty() {
        println!("outputs:");
        for (name, value) in &state.outputs {
            println!("  {name} = {value}");
        }
    }
    if state.status != corynth_types::ExecutionStatus::Success {
        std::process::exit(1);
    }
    Ok(())
}

async fn state(config: &Config, command: StateCommand) -> Result<()> {
    let store = LocalStateStore::open(&config.state_dir).await?;
    match command {
        StateCommand::List => {
            for summary in store.list_executions().await? {
                let end = summary
                    .end_time
                    .map(|end| end.to_rfc3339())
                    .unwrap_or_else(|| "-".into());
                println!(
                    "{}  {}  {:?}  started {}  ended {}  {} step(s)",
                    summary.id,
                    summary.workflow_name,
                    summary.status,
                    summary.start_time.to_rfc3339(),
                    end,
                    summary.step_count
                );
            }
        }
        StateCommand::Show { id } => {
            let state = store.load_execution(&id).await?;
            println!("{}", serde_json::to_string_pretty(&state)?);
        }
        StateCommand::Outputs { workflow } => {
            let outputs = store.load_workflow_output(&workflow).await?;
            println!("{}", serde_json::to_string_pretty(&outputs)?);
        }
        StateCommand::Clean { older_than } => {
            let max_age = match older_than {
                Some(raw) => parse_duration(&raw).with_context(|| format!("invalid --older-than '{raw}'"))?,
                None => std::time::Duration::from_secs(u64::from(config.retention_days) * 24 * 3600),
            };
            let removed = store.cleanup(max_age).await?;
            println!("removed {removed} execution record(s)");
        }
    }
    Ok(())
}

async fn plugin(config: &Config, command: PluginCommand) -> Result<()> {
    let registry = PluginRegistry::new(config.plugin_dirs.clone(), config.repositories.clone());
    registry.load_local().await?;

    match command {
        PluginCommand::List => {
            for row in registry.list().await {
                let status = if row.running { "running" } else { "available" };
                println!("{}  {}  {}", row.name, status, row.path.display());
            }
        }
        PluginCommand::Install { name } => {
            let path = registry.install_from_repository(&name).await?;
            println!("installed '{name}' at {}", path.display());
        }
        PluginCommand::Remove { name } => {
            registry.remove(&name).await?;
            println!("removed '{name}'");
        }
        PluginCommand::Search { query } => {
            for row in registry.search(&query, &[]).await {
                println!("{}  {}", row.name, row.description.unwrap_or_default());
            }
        }
    }
    Ok(())
}
