//! # Mech Catalog CLI (`mcat`)
//!
//! ## Usage
//!
//! ```bash
//! mcat --config ./config/mcat.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `mcat init` | Create the SQLite database, run migrations, create the catalogue root |
//! | `mcat new <dir>` | Create a component directory with an empty manifest |
//! | `mcat sync [component]` | Update manifests from the files on disk |
//! | `mcat validate [component]` | Verify files against recorded hashes |
//! | `mcat components` | List components recorded in the database |
//! | `mcat search "<query>"` | Find similar components |
//! | `mcat index rebuild\|clear\|stats` | Maintain the similarity index |
//!
//! ## Examples
//!
//! ```bash
//! # Preview what a sync would change
//! mcat sync --dry-run
//!
//! # Sync one component and refresh its embedding
//! mcat sync BP-1042 --include-vectors
//!
//! # Similar parts, at least 0.5 similar
//! mcat search "steel base plate 10mm" --threshold 0.5
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use mcat_core::manifest::ComponentCategory;
use mech_catalog::catalog::NewComponent;
use mech_catalog::config;
use mech_catalog::sync::SyncOptions;
use mech_catalog::{components_cmd, migrate, search_cmd, sync_cmd};

/// Mech Catalog CLI: artifact sync, integrity checks, and similarity
/// search for a mechanical component catalogue.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/mcat.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "mcat",
    about = "Mech Catalog: artifact sync, integrity checks, and similarity search for mechanical components",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/mcat.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema and the catalogue root.
    ///
    /// Idempotent; running it again is safe.
    Init,

    /// Create a new component directory with an empty manifest.
    New {
        /// Directory name under the catalogue root.
        directory: String,

        /// Part number or other human identifier. Defaults to the directory name.
        #[arg(long)]
        identifier: Option<String>,

        /// `fabricated`, `purchased`, or `standard`.
        #[arg(long, default_value = "fabricated")]
        category: ComponentCategory,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        description: Option<String>,

        /// Machine or assembly the component belongs to.
        #[arg(long)]
        asset: Option<String>,

        #[arg(long)]
        project: Option<String>,
    },

    /// Bring manifests in line with the files on disk.
    ///
    /// New files are registered, changed files re-hashed, and removed files
    /// dropped from the manifest. Directories without a manifest are
    /// reported and left alone.
    Sync {
        /// A single component directory. Omit to sync the whole catalogue.
        component: Option<String>,

        /// Report what would change without writing anything.
        #[arg(long)]
        dry_run: bool,

        /// Rewrite manifests even when nothing changed.
        #[arg(long)]
        force: bool,

        /// Update the similarity index for components whose manifest was written.
        #[arg(long)]
        include_vectors: bool,

        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Verify artifacts against their recorded hashes.
    ///
    /// Exits non-zero if any component has an error-level finding.
    Validate {
        component: Option<String>,

        #[arg(long)]
        json: bool,
    },

    /// List components recorded in the database.
    Components {
        #[arg(long)]
        json: bool,
    },

    /// Find components similar to a free-text query.
    Search {
        query: String,

        /// Maximum number of results. Defaults to `index.default_limit`.
        #[arg(long)]
        limit: Option<usize>,

        /// Minimum similarity in [-1, 1]. Defaults to `index.default_threshold`.
        #[arg(long, allow_negative_numbers = true)]
        threshold: Option<f32>,

        #[arg(long)]
        json: bool,
    },

    /// Maintain the similarity index.
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },
}

#[derive(Subcommand)]
enum IndexAction {
    /// Rebuild the ANN graph from stored vectors and rewrite the cache.
    Rebuild,
    /// Delete every stored vector and the cache.
    Clear,
    /// Show row counts and cache state.
    Stats {
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received; stopping after the current component");
                cancel.cancel();
            }
        });
    }

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            std::fs::create_dir_all(&cfg.catalog.root)?;
            println!("Database initialized successfully.");
            println!("Catalogue root: {}", cfg.catalog.root.display());
        }
        Commands::New {
            directory,
            identifier,
            category,
            name,
            description,
            asset,
            project,
        } => {
            let new = NewComponent {
                identifier: identifier.unwrap_or_else(|| directory.clone()),
                directory,
                category,
                name,
                description,
                asset,
                project,
            };
            components_cmd::run_new(&cfg, &new)?;
        }
        Commands::Sync {
            component,
            dry_run,
            force,
            include_vectors,
            json,
        } => {
            let options = SyncOptions {
                dry_run,
                force,
                include_vectors,
            };
            let summary =
                sync_cmd::run_sync(&cfg, component.as_deref(), options, json, &cancel).await?;
            if summary.errors() > 0 || summary.cancelled {
                std::process::exit(1);
            }
        }
        Commands::Validate { component, json } => {
            if !components_cmd::run_validate(&cfg, component.as_deref(), json)? {
                std::process::exit(1);
            }
        }
        Commands::Components { json } => {
            components_cmd::run_components(&cfg, json).await?;
        }
        Commands::Search {
            query,
            limit,
            threshold,
            json,
        } => {
            search_cmd::run_search(&cfg, &query, limit, threshold, json, &cancel).await?;
        }
        Commands::Index { action } => match action {
            IndexAction::Rebuild => search_cmd::run_index_rebuild(&cfg).await?,
            IndexAction::Clear => search_cmd::run_index_clear(&cfg).await?,
            IndexAction::Stats { json } => search_cmd::run_index_stats(&cfg, json).await?,
        },
    }

    Ok(())
}
