//! Outreach Flow — multi-channel sequence validation, compilation, and
//! deployment tooling.
//!
//! Entry point for the command-line workflow: validate a sequence
//! definition, compile it to a workflow graph, or deploy it to the
//! configured automation runtime.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::{info, warn};

use outreach_core::config::AppConfig;
use outreach_sequence::validation::validate_sequence;
use outreach_sequence::Sequence;

#[derive(Parser, Debug)]
#[command(name = "outreach-flow")]
#[command(about = "Multi-channel outreach sequence compiler and deployer")]
#[command(version)]
struct Cli {
    /// Automation runtime base URL (overrides config)
    #[arg(long, env = "OUTREACH_FLOW__RUNTIME__BASE_URL")]
    base_url: Option<String>,

    /// Automation runtime API key (overrides config)
    #[arg(long, env = "OUTREACH_FLOW__RUNTIME__API_KEY")]
    api_key: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate a sequence definition file
    Validate {
        /// Path to the sequence JSON file
        file: PathBuf,
    },
    /// Compile a sequence definition to a workflow graph
    Compile {
        /// Path to the sequence JSON file
        file: PathBuf,

        /// Write the graph here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Compile a sequence and deploy it to the automation runtime
    Deploy {
        /// Path to the sequence JSON file
        file: PathBuf,
    },
    /// Print a built-in sequence template as JSON
    Template {
        /// Template name: cold-outreach, linkedin-multi-touch, follow-up
        name: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "outreach_flow=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();

    // Load configuration
    let mut config = AppConfig::load().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    // Apply CLI overrides
    if let Some(base_url) = cli.base_url {
        config.runtime.base_url = base_url;
    }
    if let Some(api_key) = cli.api_key {
        config.runtime.api_key = api_key;
    }

    match cli.command {
        Command::Validate { file } => {
            let sequence = read_sequence(&file)?;
            validate_sequence(&sequence)?;
            info!(
                sequence_id = %sequence.id,
                steps = sequence.steps.len(),
                "Sequence is valid"
            );
            println!("{}: valid ({} steps)", sequence.name, sequence.steps.len());
        }
        Command::Compile { file, output } => {
            let sequence = read_sequence(&file)?;
            let graph = outreach_compiler::compile(&sequence)?;
            let rendered = serde_json::to_string_pretty(&graph)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, rendered)?;
                    info!(
                        sequence_id = %sequence.id,
                        nodes = graph.nodes.len(),
                        output = %path.display(),
                        "Workflow graph written"
                    );
                }
                None => println!("{rendered}"),
            }
        }
        Command::Deploy { file } => {
            let sequence = read_sequence(&file)?;
            let client =
                outreach_deploy::RuntimeClient::new(&config.runtime, config.retry.clone())?;
            let outcome = client.deploy(&sequence).await;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            if !outcome.success {
                anyhow::bail!(
                    "deployment failed: {}",
                    outcome.error.unwrap_or_else(|| "unknown error".into())
                );
            }
        }
        Command::Template { name } => {
            let template = match name.as_str() {
                "cold-outreach" => outreach_sequence::templates::cold_outreach_template(),
                "linkedin-multi-touch" => {
                    outreach_sequence::templates::linkedin_multi_touch_template()
                }
                "follow-up" => outreach_sequence::templates::follow_up_template(),
                other => anyhow::bail!(
                    "unknown template '{other}' (expected cold-outreach, \
                     linkedin-multi-touch, or follow-up)"
                ),
            };
            println!("{}", serde_json::to_string_pretty(&template)?);
        }
    }

    Ok(())
}

fn read_sequence(path: &PathBuf) -> anyhow::Result<Sequence> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("reading {}: {e}", path.display()))?;
    let sequence: Sequence = serde_json::from_str(&raw)
        .map_err(|e| anyhow::anyhow!("parsing {}: {e}", path.display()))?;
    Ok(sequence)
}
