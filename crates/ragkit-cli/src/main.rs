use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ragkit_core::DevicePreference;
use ragkit_index::DEFAULT_TOP_K;

mod commands;
mod config;

use commands::generate::GenerateArgs;
use config::load_config;

/// ragkit: local text generation and exact vector search
#[derive(Debug, Parser)]
#[command(name = "ragkit", version, about, long_about = None, arg_required_else_help = true)]
struct Cli {
    /// Path to a custom configuration file (TOML).
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log format: "pretty" (default) or "json".
    #[arg(long, global = true, default_value = "pretty", value_name = "FORMAT")]
    log_format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Download a model from Hugging Face Hub.
    Pull {
        /// Hugging Face model id (e.g. `Qwen/Qwen2.5-0.5B-Instruct`).
        model_id: String,

        /// Git revision, branch, or commit hash.
        #[arg(long, default_value = "main")]
        revision: String,
    },

    /// List models stored in the local cache.
    List,

    /// Continue a prompt with a causal language model.
    Generate {
        /// Model id or local model directory (defaults to `llm.model`).
        #[arg(long, short = 'm')]
        model: Option<String>,

        /// Prompt text.
        #[arg(long, short = 'p')]
        prompt: String,

        /// Maximum number of new tokens to generate.
        #[arg(long)]
        max_tokens: Option<usize>,

        /// Device: auto, cpu, cuda, cuda:N or metal.
        #[arg(long)]
        device: Option<DevicePreference>,

        /// Random seed for reproducible sampling.
        #[arg(long)]
        seed: Option<u64>,

        /// Print load and generation timings.
        #[arg(long)]
        stats: bool,
    },

    /// Build or query the vector index.
    Index {
        #[command(subcommand)]
        action: IndexCommand,
    },
}

#[derive(Debug, Subcommand)]
enum IndexCommand {
    /// Build the index from a JSONL file of `{"id": .., "vector": [..]}` records.
    Build {
        #[arg(long, short = 'i', value_name = "FILE")]
        input: PathBuf,
    },

    /// Search the saved index with one query vector.
    Search {
        /// Comma-separated components, e.g. "0.1,0.2,0.3".
        #[arg(long, allow_hyphen_values = true)]
        vector: String,

        /// Number of results to print.
        #[arg(long, short = 'k', default_value_t = DEFAULT_TOP_K)]
        top_k: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(&cli.log_format);

    let cfg = load_config(cli.config.as_ref())
        .context("Failed to load configuration")?;

    match cli.command {
        Commands::Pull { model_id, revision } => {
            commands::pull::run(&model_id, &revision, &cfg).await?;
        }
        Commands::List => {
            commands::list::run(&cfg)?;
        }
        Commands::Generate { model, prompt, max_tokens, device, seed, stats } => {
            let args = GenerateArgs { model, prompt, max_tokens, device, seed, stats };
            commands::generate::run(args, &cfg).await?;
        }
        Commands::Index { action: IndexCommand::Build { input } } => {
            commands::index::build(&input, &cfg)?;
        }
        Commands::Index { action: IndexCommand::Search { vector, top_k } } => {
            commands::index::search(&vector, top_k, &cfg)?;
        }
    }

    Ok(())
}

fn init_tracing(log_format: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    if log_format == "json" {
        registry
            .with(fmt::layer().json())
            .init();
    } else {
        registry
            .with(fmt::layer().pretty())
            .init();
    }
}
