//! FieldSync CLI
//!
//! Command-line tools for FieldSync catalogs and local stores.
//!
//! # Commands
//!
//! - `catalog` - List the sync regions a user sees in a dataset
//! - `sync` - Synchronize a dataset into a file-backed local store
//! - `inspect` - Display local store contents
//! - `missing` - List catalog regions with no local entries

mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use commands::{CliError, Target};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// FieldSync command-line tools.
#[derive(Parser)]
#[command(name = "fieldsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the JSON dataset served by the catalog
    #[arg(global = true, short, long)]
    dataset: Option<PathBuf>,

    /// Path to the local store file
    #[arg(global = true, short, long)]
    store: Option<PathBuf>,

    /// User the catalog is computed for
    #[arg(global = true, short, long, default_value = "1")]
    user: u32,

    /// Org unit the user is assigned to (0 for none)
    #[arg(global = true, short, long, default_value = "1")]
    org_unit: u32,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Which regions wait for which.
#[derive(Clone, Copy, ValueEnum)]
enum DependencyMode {
    /// Regions never wait for each other
    None,
    /// Regions wait for the regions of the kinds they reference
    ByKind,
}

#[derive(Subcommand)]
enum Commands {
    /// List the sync regions visible to the user
    Catalog {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Synchronize the dataset into the local store
    Sync {
        /// Only fetch regions that have no local entries
        #[arg(short, long)]
        missing_only: bool,

        /// Attempts per region for retryable failures
        #[arg(short, long, default_value = "3")]
        attempts: u32,

        /// Dependency policy between regions
        #[arg(long, value_enum, default_value = "by-kind")]
        dependencies: DependencyMode,
    },

    /// Display local store contents
    Inspect {
        /// Show every entry, not only counts
        #[arg(short, long)]
        entries: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List catalog regions with no local entries
    Missing,

    /// Show version information
    Version,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let target = Target {
        dataset: cli.dataset,
        store: cli.store,
        user: commands::user_context(cli.user, cli.org_unit),
    };

    match cli.command {
        Commands::Catalog { format } => {
            commands::catalog::run(&target, &format)?;
        }
        Commands::Sync {
            missing_only,
            attempts,
            dependencies,
        } => {
            let policy = match dependencies {
                DependencyMode::None => fieldsync_engine::DependencyPolicy::None,
                DependencyMode::ByKind => fieldsync_engine::DependencyPolicy::ByKind,
            };
            let report = commands::sync::run(&target, missing_only, attempts, policy).await?;
            if !report.is_complete() {
                return Err(CliError::Incomplete {
                    failed: report.failed(),
                    skipped: report.skipped(),
                }
                .into());
            }
        }
        Commands::Inspect { entries, format } => {
            commands::inspect::run(&target, entries, &format).await?;
        }
        Commands::Missing => {
            commands::missing::run(&target).await?;
        }
        Commands::Version => {
            println!("FieldSync CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
