use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use tokio::sync::broadcast::Receiver;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use stencil_core::config::AppConfig;
use stencil_core::event::EventBus;
use stencil_core::security::{export_globals, redact_secrets};
use stencil_core::types::{GlobalVariable, NodeEvent, NodeType};

use stencil_workflow::{GraphConfig, NodeRegistry, NodeRunner, VariablePool};

#[derive(Parser)]
#[command(name = "stencil", version, about = "Run workflow template-transform nodes")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "stencil.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single node of a graph and print its execution record
    Run {
        /// Graph config (JSON)
        #[arg(long)]
        graph: PathBuf,
        /// Id of the node to run
        #[arg(long)]
        node: String,
        /// Initial variable pool (JSON object keyed by node id)
        #[arg(long)]
        pool: Option<PathBuf>,
        /// Global variables (JSON array)
        #[arg(long)]
        globals: Option<PathBuf>,
        /// Print lifecycle events to stderr
        #[arg(long)]
        events: bool,
    },
    /// Print default node configs
    DefaultConfig {
        /// Only this node type (e.g. template-transform)
        #[arg(long = "type")]
        node_type: Option<String>,
    },
    /// Print the selector mapping of a graph
    Mapping {
        /// Graph config (JSON)
        #[arg(long)]
        graph: PathBuf,
        /// Only this node
        #[arg(long)]
        node: Option<String>,
    },
    /// Print global variables as they may leave a workflow
    Globals {
        /// Global variables (JSON array)
        #[arg(long)]
        globals: PathBuf,
    },
    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load_or_default(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log.filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    debug!(path = %cli.config.display(), "Configuration loaded");

    match cli.command {
        Commands::Run {
            graph,
            node,
            pool,
            globals,
            events,
        } => run_node(&config, &graph, &node, pool.as_deref(), globals.as_deref(), events).await,
        Commands::DefaultConfig { node_type } => {
            let registry = NodeRegistry::with_builtins();
            let value = match node_type {
                Some(tag) => registry.default_config(tag.parse::<NodeType>()?, None)?,
                None => serde_json::Value::Array(registry.default_configs(None)),
            };
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        Commands::Mapping { graph, node } => {
            let graph = load_graph(&graph)?;
            let registry = NodeRegistry::with_builtins();
            let mapping = match node {
                Some(id) => registry.extract_node_mapping(&graph, &id)?,
                None => registry.extract_mapping(&graph)?,
            };
            println!("{}", serde_json::to_string_pretty(&mapping)?);
            Ok(())
        }
        Commands::Globals { globals } => {
            let globals = load_globals(&globals)?;
            println!("{}", serde_json::to_string_pretty(&export_globals(&globals))?);
            Ok(())
        }
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config.redacted())?);
            Ok(())
        }
    }
}

async fn run_node(
    config: &AppConfig,
    graph_path: &Path,
    node_id: &str,
    pool_path: Option<&Path>,
    globals_path: Option<&Path>,
    print_events: bool,
) -> anyhow::Result<()> {
    let graph = load_graph(graph_path)?;
    let node_config = graph
        .node(node_id)
        .ok_or_else(|| anyhow!("node '{}' not found in {}", node_id, graph_path.display()))?;

    let globals = match globals_path {
        Some(path) => load_globals(path)?,
        None => Vec::new(),
    };
    let mut pool = VariablePool::with_globals(&globals)?;
    if let Some(path) = pool_path {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading pool {}", path.display()))?;
        pool.load_json(serde_json::from_str(&raw)?)?;
    }

    let executor = stencil_executor::from_config(&config.code_execution)?;
    info!(
        executor = executor.name(),
        max_length = config.workflow.template_transform_max_length,
        "Code executor ready"
    );

    let registry = NodeRegistry::with_builtins();
    let node = registry.build(node_config, executor, &config.workflow)?;

    let event_bus = Arc::new(EventBus::default());
    let mut rx = event_bus.subscribe();
    let runner = NodeRunner::new(event_bus);

    let outcome = runner.run(node.as_ref(), &mut pool).await;
    if print_events {
        print_pending_events(&mut rx, &globals);
    }

    match outcome {
        Ok(execution) => {
            let shown = execution.to_redacted_json(&globals)?;
            println!("{}", serde_json::to_string_pretty(&shown)?);
            Ok(())
        }
        Err(e) => Err(anyhow!(redact_secrets(&e.to_string(), &globals))),
    }
}

fn load_graph(path: &Path) -> anyhow::Result<GraphConfig> {
    GraphConfig::load(path).with_context(|| format!("reading graph {}", path.display()))
}

fn load_globals(path: &Path) -> anyhow::Result<Vec<GlobalVariable>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading globals {}", path.display()))?;
    Ok(serde_json::from_str(&raw)?)
}

fn print_pending_events(rx: &mut Receiver<NodeEvent>, globals: &[GlobalVariable]) {
    while let Ok(event) = rx.try_recv() {
        let line = match event {
            NodeEvent::Started {
                execution_id,
                node_id,
                node_type,
            } => format!("[{}] started {} ({})", execution_id, node_id, node_type),
            NodeEvent::Succeeded {
                execution_id,
                node_id,
                elapsed_ms,
            } => format!("[{}] succeeded {} in {}ms", execution_id, node_id, elapsed_ms),
            NodeEvent::Failed {
                execution_id,
                node_id,
                error,
                elapsed_ms,
            } => format!("[{}] failed {} in {}ms: {}", execution_id, node_id, elapsed_ms, error),
            NodeEvent::Fatal {
                execution_id,
                node_id,
                message,
            } => format!("[{}] aborted {}: {}", execution_id, node_id, message),
        };
        eprintln!("{}", redact_secrets(&line, globals));
    }
}
