use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hostwatch_agent::{HostwatchAgent, ServiceConfiguration};
use tokio::sync::watch;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "hostwatch")]
#[command(about = "Hostwatch - host metrics collector, file ingestion and query CLI", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the YAML config file (defaults apply when omitted)
    #[arg(long, global = true)]
    config_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Collect live samples until Ctrl-C, logging every live update
    Run,

    /// Ingest an uploaded monitoring file (.xml or .rrd)
    Ingest {
        /// File to ingest
        file: PathBuf,
    },

    /// Ask a question about the host
    Ask {
        /// Free-text question
        #[arg(required = true, num_args = 1..)]
        question: Vec<String>,
    },

    /// Print stored samples from the last N hours as JSON lines
    History {
        #[arg(long, default_value_t = 24.0)]
        hours: f64,
    },

    /// Print the latest sample as JSON
    Latest,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing/logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = match &cli.config_file {
        Some(path) => ServiceConfiguration::from_file(path)?,
        None => ServiceConfiguration::default(),
    };
    let agent = HostwatchAgent::start(config).await?;

    match cli.command {
        Commands::Run => {
            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Ctrl-C received, shutting down");
                }
                let _ = shutdown_tx.send(true);
            });
            return agent.run(shutdown_rx).await;
        }
        Commands::Ingest { file } => {
            println!("{}", agent.process_upload(&file).await);
        }
        Commands::Ask { question } => {
            println!("{}", agent.answer(&question.join(" ")).await);
        }
        Commands::History { hours } => {
            for sample in agent.store().range(hours).await {
                println!(
                    "{}",
                    serde_json::to_string(&sample).context("Failed to encode sample")?
                );
            }
        }
        Commands::Latest => {
            let latest = agent.store().latest().await;
            println!(
                "{}",
                serde_json::to_string_pretty(&latest).context("Failed to encode sample")?
            );
        }
    }

    agent.close().await
}
