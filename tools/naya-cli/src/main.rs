//! Naya CLI: record generative animations into clips, manage the clip
//! store, and export timelines.
//!
//! Usage:
//!   naya record [OPTIONS]          Record a synthetic animation into a clip
//!   naya list                      List stored clips, newest first
//!   naya info <ID>                 Show clip metadata
//!   naya update <ID> [OPTIONS]     Rename, retag or describe a clip
//!   naya delete <ID>               Delete a clip
//!   naya stats                     Show storage statistics
//!   naya export <ID>...            Compose clips into one new clip

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use naya_clip_store::{ClipStore, FsClipStore};
use naya_common::config::AppConfig;
use naya_project_model::ClipId;

mod commands;

#[derive(Parser)]
#[command(
    name = "naya",
    about = "Record, arrange and export generative animation clips",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Clip store directory (overrides the config file)
    #[arg(long, global = true)]
    store_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a synthetic animation into a new clip
    Record {
        /// Clip name
        #[arg(short, long, default_value = "recording")]
        name: String,

        /// Recording length in seconds
        #[arg(short, long)]
        duration: Option<f64>,

        /// Capture FPS
        #[arg(long)]
        fps: Option<u32>,

        /// Surface width
        #[arg(long, default_value = "320")]
        width: u32,

        /// Surface height
        #[arg(long, default_value = "240")]
        height: u32,

        /// Animation pattern: plasma|bars|rings
        #[arg(long, default_value = "plasma")]
        pattern: String,

        /// Tag to attach (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,

        /// Free-form description
        #[arg(long, default_value = "")]
        description: String,
    },

    /// List stored clips, newest first
    List {
        /// Print metadata as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show clip metadata
    Info {
        /// Clip identifier
        id: ClipId,
    },

    /// Update the mutable metadata of a clip
    Update {
        /// Clip identifier
        id: ClipId,

        /// New name
        #[arg(long)]
        name: Option<String>,

        /// Replace tags (repeatable)
        #[arg(long = "tag")]
        tags: Option<Vec<String>>,

        /// New description
        #[arg(long)]
        description: Option<String>,
    },

    /// Delete a clip
    Delete {
        /// Clip identifier
        id: ClipId,
    },

    /// Show storage statistics
    Stats,

    /// Compose clips, in order, into one new clip
    Export {
        /// Clip identifiers in timeline order
        #[arg(required = true)]
        ids: Vec<ClipId>,

        /// Write the result to this file or directory instead of storing it
        #[arg(short, long, conflicts_with = "store")]
        output: Option<PathBuf>,

        /// Store the result as a new clip (default)
        #[arg(long)]
        store: bool,

        /// Name of the exported clip
        #[arg(short, long, default_value = "export")]
        name: String,

        /// Output FPS
        #[arg(long)]
        fps: Option<u32>,

        /// Output width
        #[arg(long)]
        width: Option<u32>,

        /// Output height
        #[arg(long)]
        height: Option<u32>,

        /// Background color (#rrggbb)
        #[arg(long)]
        background: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load();
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    if let Some(dir) = cli.store_dir {
        config.store_dir = dir;
    }
    naya_common::logging::init_logging(&config.logging);

    let store: Arc<dyn ClipStore> = Arc::new(FsClipStore::open(&config.store_dir).map_err(
        |e| anyhow::anyhow!("Failed to open clip store at {}: {e}", config.store_dir.display()),
    )?);
    tracing::debug!(store_dir = %config.store_dir.display(), "Clip store opened");

    match cli.command {
        Commands::Record {
            name,
            duration,
            fps,
            width,
            height,
            pattern,
            tags,
            description,
        } => {
            commands::record::run(
                &config,
                store,
                commands::record::RecordArgs {
                    name,
                    duration,
                    fps,
                    width,
                    height,
                    pattern,
                    tags,
                    description,
                },
            )
            .await
        }
        Commands::List { json } => commands::list::run(store.as_ref(), json),
        Commands::Info { id } => commands::info::run(store.as_ref(), &id),
        Commands::Update {
            id,
            name,
            tags,
            description,
        } => commands::update::run(store.as_ref(), &id, name, tags, description),
        Commands::Delete { id } => commands::delete::run(store.as_ref(), &id),
        Commands::Stats => commands::stats::run(store.as_ref(), &config),
        Commands::Export {
            ids,
            output,
            store: _,
            name,
            fps,
            width,
            height,
            background,
        } => {
            commands::export::run(
                &config,
                store,
                commands::export::ExportArgs {
                    ids,
                    output,
                    name,
                    fps,
                    width,
                    height,
                    background,
                },
            )
            .await
        }
    }
}
