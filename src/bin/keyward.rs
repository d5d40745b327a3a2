//! keyward - inspect key usage and hand out keys from the command line

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use keyward::{Complexity, ResourceManager};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "keyward", version, about = "Client-side API key load balancer")]
struct Cli {
    /// Key configuration file (defaults to the standard search locations)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show usage and health of every key
    Status {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Acquire a key for a project and print it
    Acquire {
        #[arg(short, long)]
        project: String,
        /// `normal` or `high`
        #[arg(short = 'x', long, default_value = "normal")]
        complexity: String,
    },
}

fn init_tracing() {
    // keep dependency noise at warn but our own events at info
    let env = std::env::var("RUST_LOG").unwrap_or_default();
    let env = env.trim();
    let filter = if env.is_empty() {
        EnvFilter::new("warn,keyward=info")
    } else if env.contains("keyward") {
        EnvFilter::new(env)
    } else {
        EnvFilter::new(format!("{env},keyward=info"))
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing();

    let manager = match &cli.config {
        Some(path) => ResourceManager::with_config_path(path).await,
        None => ResourceManager::new().await,
    };

    match cli.command {
        Command::Status { json } => {
            let report = manager.status_report();
            if json {
                let out = serde_json::to_string_pretty(&report).context("failed to encode report")?;
                println!("{out}");
            } else {
                println!("{report}");
            }
        }
        Command::Acquire {
            project,
            complexity,
        } => {
            let complexity = Complexity::parse(&complexity);
            match manager.acquire(&project, complexity).await {
                Some(selection) => {
                    if let Some(warning) = &selection.ledger_warning {
                        eprintln!("warning: {warning}");
                    }
                    println!("{}", selection.credential.secret());
                }
                None => {
                    anyhow::bail!(
                        "no key available for project '{}': {}",
                        project,
                        manager.availability(&project)
                    );
                }
            }
        }
    }

    Ok(())
}
