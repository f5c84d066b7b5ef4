// ABOUTME: Entry point for the intray admin binary.
// ABOUTME: Parses CLI arguments, initializes tracing, and runs storage status, listing, migration and audits.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use intray_core::ListFilter;
use intray_store::{
    Backend, Effects, EnvConfig, MigrationOptions, NotificationStore, StorageConfig,
    migrate_tsv_to_sqlite, open_backend, open_dual_writer, rollback_migration,
};

/// Inspect and migrate intray notification storage.
#[derive(Parser)]
#[command(name = "intray")]
#[command(about = "Notification storage administration", long_about = None)]
struct Cli {
    /// Override the state directory (INTRAY_STATE_DIR)
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the selected backend and the active notification count.
    Status,

    /// Print notifications as tab-separated lines.
    List {
        /// active, dismissed or all
        #[arg(long, default_value = "active")]
        state: String,
        #[arg(long, default_value = "")]
        level: String,
        #[arg(long, default_value = "")]
        session: String,
        #[arg(long, default_value = "")]
        window: String,
        #[arg(long, default_value = "")]
        pane: String,
        /// Only notifications created before this RFC3339 time
        #[arg(long, default_value = "")]
        older_than: String,
        /// Only notifications created after this RFC3339 time
        #[arg(long, default_value = "")]
        newer_than: String,
        /// read or unread
        #[arg(long, default_value = "")]
        read: String,
        /// Emit JSON instead of tab-separated lines
        #[arg(long)]
        json: bool,
    },

    /// Import the flat file into SQLite, keeping a backup of the flat file.
    Migrate {
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        backup: Option<PathBuf>,
    },

    /// Restore the flat file from its migration backup and delete the database.
    Rollback {
        #[arg(long)]
        backup: Option<PathBuf>,
    },

    /// Compare the flat file and SQLite stores.
    Verify {
        #[arg(long, default_value_t = 25)]
        sample_size: usize,
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("intray=info,intray_store=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = StorageConfig::load(&EnvConfig).context("loading configuration")?;
    if let Some(dir) = cli.state_dir {
        config.state_dir = dir;
    }
    tracing::debug!(state_dir = %config.state_dir.display(), backend = %config.backend, "configuration loaded");

    match cli.command {
        Commands::Status => {
            println!("backend: {}", config.backend);
            println!("state_dir: {}", config.state_dir.display());
            if config.backend == Backend::Dual {
                let writer = open_dual_writer(&config, Effects::none())?;
                println!("active: {}", writer.active_count()?);
                println!("read_backend: {}", writer.read_backend());
                println!("health: {:?}", writer.health());
            } else {
                let store = open_backend(&config, Effects::none())?;
                println!("active: {}", store.active_count()?);
            }
        }
        Commands::List {
            state,
            level,
            session,
            window,
            pane,
            older_than,
            newer_than,
            read,
            json,
        } => {
            let filter = ListFilter::parse(
                &state,
                &level,
                &session,
                &window,
                &pane,
                &older_than,
                &newer_than,
                &read,
            )?;
            let store = open_backend(&config, Effects::none())?;
            if json {
                println!("{}", serde_json::to_string_pretty(&store.list(&filter)?)?);
            } else {
                let out = store.list_tsv(&filter)?;
                if !out.is_empty() {
                    println!("{}", out);
                }
            }
        }
        Commands::Migrate { dry_run, backup } => {
            let options = MigrationOptions {
                backup_path: backup,
                dry_run,
                ..MigrationOptions::new(&config.tsv_path(), &config.sqlite_path())
            };
            let stats = migrate_tsv_to_sqlite(&options)?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Commands::Rollback { backup } => {
            rollback_migration(&config.tsv_path(), &config.sqlite_path(), backup.as_deref())?;
            println!("restored {}", config.tsv_path().display());
        }
        Commands::Verify { sample_size, json } => {
            let writer = open_dual_writer(&config, Effects::none())?;
            let report = writer.verify_consistency(sample_size)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!(
                    "tsv: {} rows ({} active), sqlite: {} rows ({} active), sampled {}",
                    report.tsv_count,
                    report.tsv_active_count,
                    report.sqlite_count,
                    report.sqlite_active_count,
                    report.sampled_records
                );
            }
            report.ensure_consistent()?;
        }
    }

    Ok(())
}
