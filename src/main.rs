use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use noesis::config::NoesisConfig;
use noesis::knowledge::KnowledgeBase;
use noesis::search::SearchMode;
use noesis::{cli, server};

#[derive(Parser)]
#[command(name = "noesis", version, about = "Personal knowledge base with memory evolution over MCP")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the MCP server (transport from config: stdio or http)
    Serve,
    /// Search notes
    Search {
        query: String,
        /// text, semantic, or hybrid
        #[arg(long, default_value = "hybrid")]
        mode: SearchMode,
        /// Maximum number of results
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Show a note with its backlinks
    Inspect { id: String },
    /// Rebuild the semantic index from all notes
    Consolidate,
    /// Drop the semantic index and its snapshot
    ResetIndex {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Show capability and index status
    Status,
    /// Manage the embedding model
    Model {
        #[command(subcommand)]
        action: ModelAction,
    },
}

#[derive(Subcommand)]
enum ModelAction {
    /// Download the embedding model to ~/.noesis/models/
    Download,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = NoesisConfig::load()?;

    // Log to stderr so stdout stays clean for MCP JSON-RPC.
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Serve => match config.server.transport.as_str() {
            "http" => server::serve_http(config).await?,
            _ => server::serve_stdio(config).await?,
        },
        Command::Model { action } => match action {
            ModelAction::Download => cli::model_download(&config.embedding).await?,
        },
        Command::Search { query, mode, limit } => {
            let limit = limit.unwrap_or(config.retrieval.default_limit);
            let kb = KnowledgeBase::open(config)?;
            cli::search::search(&kb, &query, mode, limit).await?;
        }
        Command::Inspect { id } => {
            let kb = KnowledgeBase::open(config)?;
            cli::inspect::inspect(&kb, &id).await?;
        }
        Command::Consolidate => {
            let kb = KnowledgeBase::open(config)?;
            cli::consolidate::consolidate(&kb).await?;
        }
        Command::ResetIndex { yes } => {
            let kb = KnowledgeBase::open(config)?;
            cli::reset::reset_index(&kb, yes)?;
        }
        Command::Status => {
            let kb = KnowledgeBase::open(config)?;
            cli::status::status(&kb)?;
        }
    }

    Ok(())
}
