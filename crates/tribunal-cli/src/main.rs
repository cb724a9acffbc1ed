//! Tribunal CLI - score transactions and manage pipeline configuration.
//!
//! Scoring runs against the offline provider, so every model-backed step
//! takes its deterministic fallback.

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tribunal_core::{CustomerBehavior, PipelineConfig, Transaction};
use tribunal_runtime::{FraudPipeline, InMemoryPolicyIndex, OfflineProvider};

mod output;

use output::OutputFormat;

#[derive(Parser)]
#[command(name = "tribunal")]
#[command(about = "Multi-agent transaction fraud scoring", long_about = None)]
#[command(version)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score one transaction
    Score {
        /// Transaction file (JSON or YAML)
        #[arg(short, long)]
        transaction: PathBuf,

        /// Customer behavior profile (JSON or YAML)
        #[arg(short, long)]
        behavior: PathBuf,

        /// Pipeline configuration
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Policy file for the local index
        #[arg(short, long)]
        policies: Option<PathBuf>,

        #[arg(short, long, value_enum, default_value = "json")]
        format: OutputFormat,
    },

    /// Print the default configuration
    Config,

    /// Check a configuration file
    ValidateConfig {
        file: PathBuf,
    },
}

fn load<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let parsed = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::from_str(&raw)
            .with_context(|| format!("invalid JSON in {}", path.display()))?,
        _ => serde_yaml::from_str(&raw)
            .with_context(|| format!("invalid YAML in {}", path.display()))?,
    };
    Ok(parsed)
}

async fn score(
    transaction: &Path,
    behavior: &Path,
    config: Option<&Path>,
    policies: Option<&Path>,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let transaction: Transaction = load(transaction)?;
    let behavior: CustomerBehavior = load(behavior)?;
    let config = match config {
        Some(path) => PipelineConfig::from_path(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    let index = match policies {
        Some(path) => InMemoryPolicyIndex::from_path(path)?,
        None => InMemoryPolicyIndex::empty(),
    };
    tracing::debug!(policies = index.len(), "Policy index loaded");

    let pipeline = FraudPipeline::builder()
        .config(config)
        .provider(Arc::new(OfflineProvider::new()))
        .index(Arc::new(index))
        .build()?;

    let outcome = pipeline.run(transaction, behavior).await?;
    println!("{}", output::render(&outcome, format)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Score {
            transaction,
            behavior,
            config,
            policies,
            format,
        } => {
            score(
                &transaction,
                &behavior,
                config.as_deref(),
                policies.as_deref(),
                format,
            )
            .await
        }
        Commands::Config => {
            print!("{}", PipelineConfig::default().to_yaml()?);
            Ok(())
        }
        Commands::ValidateConfig { file } => {
            PipelineConfig::from_path(&file)
                .with_context(|| format!("{} is not a valid configuration", file.display()))?;
            println!("{}: ok", file.display());
            Ok(())
        }
    }
}
