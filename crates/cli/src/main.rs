//! deepdive CLI: the main entry point.
//!
//! Commands:
//! - `onboard`:  Initialize config directory and config.toml
//! - `upload`:   Create an upload from a query and image embeddings
//! - `suggest`:  Precompute evidence for suggested queries
//! - `ask`:      Run the upload's top-level query
//! - `drill`:    Run a drill-down scoped to an earlier round
//! - `show`:     Print an upload and its rounds
//! - `list`:     List a user's uploads
//! - `doctor`:   Diagnose configuration, store, corpus and provider

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod runtime;

#[derive(Parser)]
#[command(
    name = "deepdive",
    about = "deepdive: iterative retrieval and tool-augmented research queries",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize configuration
    Onboard,

    /// Create a new upload
    Upload {
        /// Owning user id
        #[arg(short, long)]
        user: String,

        /// Free-text question supplied with the upload
        #[arg(short, long)]
        query: Option<String>,

        /// JSON file holding an image embedding (array of floats). Repeatable.
        #[arg(long = "image")]
        images: Vec<PathBuf>,
    },

    /// Precompute evidence for suggested queries
    Suggest {
        upload_id: String,

        /// Suggested query texts
        #[arg(required = true)]
        queries: Vec<String>,
    },

    /// Run the upload's top-level query
    Ask {
        upload_id: String,

        /// Query text (omit when forwarding a suggestion)
        query: Option<String>,

        /// Forward the suggested query at this index
        #[arg(short, long)]
        suggested: Option<usize>,

        #[command(flatten)]
        filters: commands::FilterArgs,

        /// Print the outcome as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run a drill-down scoped to an earlier round
    Drill {
        upload_id: String,

        /// `top` for the top-level query, otherwise a drill-down id
        parent: String,

        query: String,

        /// Issuing user (anonymous when omitted)
        #[arg(short, long)]
        user: Option<String>,

        #[command(flatten)]
        filters: commands::FilterArgs,

        /// Print the outcome as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print an upload and its rounds
    Show {
        upload_id: String,

        /// Print the raw upload as JSON
        #[arg(long)]
        json: bool,
    },

    /// List a user's uploads
    List {
        #[arg(short, long)]
        user: String,
    },

    /// Diagnose system health
    Doctor,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Onboard => commands::onboard::run().await?,
        Commands::Upload { user, query, images } => commands::upload::run(user, query, images).await?,
        Commands::Suggest { upload_id, queries } => commands::suggest::run(upload_id, queries).await?,
        Commands::Ask {
            upload_id,
            query,
            suggested,
            filters,
            json,
        } => commands::ask::run(upload_id, query, suggested, filters, json).await?,
        Commands::Drill {
            upload_id,
            parent,
            query,
            user,
            filters,
            json,
        } => commands::drill::run(upload_id, parent, query, user, filters, json).await?,
        Commands::Show { upload_id, json } => commands::show::run(upload_id, json).await?,
        Commands::List { user } => commands::list::run(user).await?,
        Commands::Doctor => commands::doctor::run().await?,
    }

    Ok(())
}
