//! # Kilnlog CLI (`kiln`)
//!
//! The `kiln` binary is the primary interface for Kilnlog. It provides
//! commands for database initialization, record management, text and
//! visual-similarity search, exports, and starting the HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! kiln --config ./config/kiln.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `kiln init` | Create the SQLite database and image directory |
//! | `kiln add` | Register a new customer record |
//! | `kiln list` | List records |
//! | `kiln get <id>` | Show one record in full |
//! | `kiln search "<text>"` | Free-text search over records |
//! | `kiln status <id> <status>` | Move a record through the workflow |
//! | `kiln delete <id>` | Delete a record and its unshared photos |
//! | `kiln attach <id> <role> <image>` | Store an intake or artwork photo |
//! | `kiln similar <image>` | Rank recent records by visual similarity |
//! | `kiln export csv` | Export all records as CSV |
//! | `kiln export images` | Bundle all photos into a ZIP |
//! | `kiln serve` | Start the HTTP JSON API |

mod blobs;
mod config;
mod db;
mod export;
mod manage;
mod migrate;
mod models;
mod ocr;
mod server;
mod similarity;
mod store;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Kilnlog CLI — studio records and artwork lookup for ceramics studios.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/kiln.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "kiln",
    about = "Kilnlog — studio records and artwork lookup for ceramics studios",
    version,
    long_about = "Kilnlog registers walk-in customers, stores intake-form and artwork photos, \
    tracks jobs through the studio workflow, and finds visually similar past pieces via a \
    heuristic image-similarity search."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/kiln.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema and image directory.
    ///
    /// Idempotent — running it multiple times is safe.
    Init,

    /// Register a new customer record.
    ///
    /// Generates the immutable business id from the work date and program
    /// code. The record starts in the `received` status.
    Add {
        /// Customer name.
        #[arg(long)]
        name: String,

        /// Program: wheel, handbuilding, paint_your_own, or glaze.
        #[arg(long)]
        program: String,

        /// Work date (YYYY-MM-DD).
        #[arg(long)]
        date: String,

        /// Contact phone number.
        #[arg(long)]
        phone: Option<String>,

        /// Contact email address.
        #[arg(long)]
        email: Option<String>,

        /// Free-form notes (piece description, glaze choices, ...).
        #[arg(long)]
        notes: Option<String>,
    },

    /// List records, newest first.
    List {
        /// Only show records in this workflow status.
        #[arg(long)]
        status: Option<String>,

        /// Maximum number of records to show.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Show one record in full.
    Get {
        /// Numeric record id.
        id: i64,
    },

    /// Free-text search over name, phone, email, business id, and notes.
    Search {
        /// The search text.
        query: String,
    },

    /// Move a record to a new workflow status.
    ///
    /// Statuses: received, in_progress, fired, ready, picked_up.
    Status {
        /// Numeric record id.
        id: i64,
        /// Target status.
        status: String,
    },

    /// Delete a record.
    ///
    /// Its stored photos are removed too, unless another record attached
    /// the same photo and still references the shared file.
    Delete {
        /// Numeric record id.
        id: i64,
    },

    /// Store an intake-form or artwork photo for a record.
    ///
    /// Replaces any previous photo in the same role; the old file is
    /// removed best-effort.
    Attach {
        /// Numeric record id.
        id: i64,
        /// Image role: customer (intake form) or work (finished piece).
        role: String,
        /// Path to a JPEG/PNG/WebP file.
        image: PathBuf,
    },

    /// Rank recent records by visual similarity to a query photo.
    ///
    /// Scores the query against every stored photo of records created in
    /// the configured recency window and prints the ranked matches.
    Similar {
        /// Path to the query image (JPEG/PNG/WebP).
        image: PathBuf,

        /// Override the minimum similarity threshold (0.0 shows everything).
        #[arg(long)]
        threshold: Option<f64>,

        /// Override the maximum number of matches shown.
        #[arg(long)]
        top: Option<usize>,
    },

    /// Export records or images.
    Export {
        #[command(subcommand)]
        what: ExportWhat,
    },

    /// Start the HTTP JSON API.
    ///
    /// Binds to the address configured in `[server].bind`.
    Serve,
}

/// Export subcommands.
#[derive(Subcommand)]
enum ExportWhat {
    /// Export all records as CSV (to a file, or stdout for piping).
    Csv {
        /// Output file path; omit to write to stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Bundle all stored photos into a ZIP archive.
    Images {
        /// Output file path for the archive.
        #[arg(long, default_value = "images.zip")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Add {
            name,
            program,
            date,
            phone,
            email,
            notes,
        } => {
            manage::run_add(&cfg, &name, &program, &date, phone, email, notes).await?;
        }
        Commands::List { status, limit } => {
            manage::run_list(&cfg, status, limit).await?;
        }
        Commands::Get { id } => {
            manage::run_get(&cfg, id).await?;
        }
        Commands::Search { query } => {
            manage::run_search(&cfg, &query).await?;
        }
        Commands::Status { id, status } => {
            manage::run_status(&cfg, id, &status).await?;
        }
        Commands::Delete { id } => {
            manage::run_delete(&cfg, id).await?;
        }
        Commands::Attach { id, role, image } => {
            manage::run_attach(&cfg, id, &role, &image).await?;
        }
        Commands::Similar {
            image,
            threshold,
            top,
        } => {
            manage::run_similar(&cfg, &image, threshold, top).await?;
        }
        Commands::Export { what } => match what {
            ExportWhat::Csv { output } => {
                let pool = db::connect(&cfg).await?;
                export::run_export_csv(&pool, output.as_deref()).await?;
                pool.close().await;
            }
            ExportWhat::Images { output } => {
                let blobs = blobs::BlobStore::new(cfg.images.dir.clone());
                export::run_export_images(&blobs, &output)?;
            }
        },
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
