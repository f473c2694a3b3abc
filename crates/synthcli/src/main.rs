// crates/synthcli/src/main.rs

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use synthcore::{node_types, NodeConfig, OutputMap, StreamMessage, TemplateStore, WorkflowDefinition, WorkflowStatus};
use synthruntime::graph::{find_isolated_nodes, DependencyGraph};
use synthruntime::{Config, MemoryTemplateStore, SynthRuntime};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "synth")]
#[command(about = "Dataset workflow engine CLI", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Show debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a workflow file
    Run {
        /// Path to workflow JSON file
        #[arg(short, long)]
        file: PathBuf,

        /// Seed payload as a JSON object
        #[arg(short, long)]
        seed: Option<String>,

        /// Print progress as newline-delimited JSON
        #[arg(long)]
        stream: bool,

        /// JSON file with prompt templates
        #[arg(short, long)]
        templates: Option<PathBuf>,
    },

    /// Validate a workflow file and show its execution plan
    Validate {
        /// Path to workflow JSON file
        #[arg(short, long)]
        file: PathBuf,
    },

    /// List available node types
    Nodes,

    /// Create a new example workflow
    Init {
        /// Output file path
        #[arg(short, long, default_value = "workflow.json")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Run {
            file,
            seed,
            stream,
            templates,
        } => {
            let runtime = runtime(&config, templates.as_deref())?;
            run_workflow(&runtime, &file, seed.as_deref(), stream).await?;
        }

        Commands::Validate { file } => {
            let runtime = runtime(&config, None)?;
            validate_workflow(&runtime, &file)?;
        }

        Commands::Nodes => {
            list_nodes(&runtime(&config, None)?);
        }

        Commands::Init { output } => {
            create_example_workflow(&output)?;
        }
    }

    Ok(())
}

fn runtime(config: &Config, templates: Option<&Path>) -> Result<SynthRuntime> {
    let templates: Arc<dyn TemplateStore> = match templates {
        Some(path) => Arc::new(
            MemoryTemplateStore::from_file(path).with_context(|| format!("loading templates from {}", path.display()))?,
        ),
        None => Arc::new(MemoryTemplateStore::new()),
    };
    Ok(synthnodes::build_runtime(config, templates)?)
}

fn load_workflow(file: &Path) -> Result<WorkflowDefinition> {
    let json = std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    serde_json::from_str(&json).with_context(|| format!("parsing workflow {}", file.display()))
}

fn parse_seed(seed: Option<&str>) -> Result<OutputMap> {
    match seed {
        None => Ok(OutputMap::new()),
        Some(text) => match serde_json::from_str::<serde_json::Value>(text)? {
            serde_json::Value::Object(map) => Ok(map),
            _ => bail!("Seed must be a JSON object"),
        },
    }
}

async fn run_workflow(runtime: &SynthRuntime, file: &Path, seed: Option<&str>, stream: bool) -> Result<()> {
    let definition = load_workflow(file)?;
    let seed = parse_seed(seed)?;
    tracing::info!(file = %file.display(), nodes = definition.nodes.len(), stream, "Running workflow");

    if stream {
        let mut messages = Box::pin(runtime.spawn_streaming(None, definition, seed).into_messages());
        while let Some(message) = messages.next().await {
            print!("{}", message.to_line());
            if let StreamMessage::Error { error, .. } = &message {
                tracing::error!(error = %error, "Streaming run failed");
                bail!("Execution failed: {}", error);
            }
        }
        return Ok(());
    }

    println!("🚀 Running workflow: {}", file.display());
    println!("   Nodes: {}", definition.nodes.len());
    println!("   Connections: {}", definition.connections.len());
    println!();

    let result = runtime.execute(None, &definition, seed).await;
    tracing::debug!(
        status = ?result.status,
        succeeded = result.succeeded(),
        total = result.results.len(),
        "Run finished"
    );

    for node in &result.results {
        match &node.error_message {
            None => println!("  ✅ {} ({}) in {:.3}s", node.node_id, node.node_type, node.execution_time),
            Some(error) => println!("  ❌ {} ({}): {}", node.node_id, node.node_type, error),
        }
    }
    for warning in &result.meta.warnings {
        println!("  ⚠️  {}", warning);
    }

    println!();
    println!("📊 Status: {:?} in {:.3}s", result.status, result.execution_time);
    println!("📤 Final output:");
    println!("{}", serde_json::to_string_pretty(&result.final_output)?);

    if result.status == WorkflowStatus::Error {
        bail!("Workflow produced no successful node");
    }
    Ok(())
}

fn validate_workflow(runtime: &SynthRuntime, file: &Path) -> Result<()> {
    println!("🔍 Validating workflow: {}", file.display());

    let definition = load_workflow(file)?;
    definition.validate(runtime.config().strict_connections)?;
    tracing::debug!(file = %file.display(), "Workflow passed structural validation");

    let graph = DependencyGraph::build(&definition);
    let order = graph.execution_order();

    println!("✅ Workflow is valid:");
    println!("   Nodes: {}", definition.nodes.len());
    println!("   Connections: {}", definition.connections.len());
    println!("   Execution order: {}", order.nodes.join(" -> "));

    let isolated = find_isolated_nodes(&definition, &graph);
    if !isolated.is_empty() {
        println!("   Isolated nodes: {}", isolated.join(", "));
    }
    if order.has_cycle {
        for cycle in graph.cycles() {
            println!("   ⚠️  Cycle: {}", cycle.join(" -> "));
        }
    }
    let phantoms = graph.phantom_nodes();
    if !phantoms.is_empty() {
        println!("   ⚠️  Unknown connection endpoints: {}", phantoms.join(", "));
    }

    let registry = runtime.registry();
    let unknown: Vec<&str> = definition
        .nodes
        .iter()
        .filter(|n| !registry.contains(&n.node_type))
        .map(|n| n.node_type.as_str())
        .collect();
    if !unknown.is_empty() {
        println!("   ⚠️  Unknown node types: {}", unknown.join(", "));
    }

    Ok(())
}

fn list_nodes(runtime: &SynthRuntime) {
    println!("📦 Available Node Types:");
    println!();

    let registry = runtime.registry();
    for node_type in registry.list_node_types() {
        if let Some(metadata) = registry.get_metadata(&node_type) {
            println!("  • {} ({})", node_type, metadata.category);
            println!("    {}", metadata.description);
        } else {
            println!("  • {}", node_type);
        }
    }
}

fn example_workflow() -> WorkflowDefinition {
    let mut workflow = WorkflowDefinition::new();
    workflow.add_node(NodeConfig::new("seed", node_types::INPUT).with_name("Seed text"));
    workflow.add_node(
        NodeConfig::new("question", node_types::MODEL)
            .with_name("Write question")
            .with_field("model", "llama-3-8b-instruct")
            .with_field(
                "model_instruction",
                "Write one exam question answerable from this passage:\n\n{input_0}",
            )
            .with_field("model_parameters", serde_json::json!({"temperature": 0.4})),
    );
    workflow.add_node(
        NodeConfig::new("tidy", node_types::TRANSFORM)
            .with_name("Strip prefix")
            .with_field("pattern", r"^(Question|Q):\s*")
            .with_field("replacement", "")
            .with_field("is_regex", true),
    );
    workflow.add_node(NodeConfig::new("result", node_types::OUTPUT).with_name("Question"));

    workflow.connect("seed", "question");
    workflow.connect("question", "tidy");
    workflow.connect("tidy", "result");
    workflow
}

fn create_example_workflow(output: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(&example_workflow())?;
    std::fs::write(output, json)?;

    println!("✨ Created example workflow: {}", output.display());
    println!();
    println!("Run it with:");
    println!(
        "  synth run --file {} --seed '{{\"template_output\": \"The mitochondria is the powerhouse of the cell.\"}}'",
        output.display()
    );

    Ok(())
}
