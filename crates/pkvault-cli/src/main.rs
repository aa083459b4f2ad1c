//! `pkvault`: command-line front end for the PKVault storage engine.
//!
//! Reads `pkvault.toml` (or the path given with `--config`), layered under
//! `PKVAULT_*` environment variables.
//!
//! # Usage
//!
//! ```
//! pkvault status
//! pkvault backup create
//! pkvault backup restore 2025-03-09T07:05:01.042Z
//! pkvault import ./0025.pk3 --box 0 --slot 4
//! ```

mod commands;

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use pkvault_session::{
  BackupEngine, FileSaveProvider, PassthroughFormat, SessionManager, Settings,
};
use pkvault_store_sqlite::MIGRATIONS;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "pkvault", author, version, about = "PKVault storage engine")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "pkvault.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Session state, pending actions and record counts.
  Status,

  /// Create, list, delete or restore backups.
  #[command(subcommand)]
  Backup(BackupCommand),

  /// Store a game entity file as a new variant, then persist.
  Import {
    file:       PathBuf,
    /// Target box id.
    #[arg(long = "box")]
    box_id:     String,
    #[arg(long)]
    slot:       i64,
    #[arg(long, default_value_t = 3)]
    generation: u8,
  },

  /// Delete a variant and its blob, then persist.
  Remove { id: String },

  /// Commit the current session to the persistent store.
  Persist,
}

#[derive(Subcommand, Debug)]
enum BackupCommand {
  Create,
  List,
  /// Timestamps are RFC 3339 or a backup file name.
  Delete { timestamp: String },
  Restore {
    timestamp:      String,
    /// Skip the snapshot of the current state taken before restoring.
    #[arg(long)]
    no_safe_backup: bool,
  },
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let settings = Settings::load(&cli.config)
    .with_context(|| format!("failed to load settings from {}", cli.config.display()))?;
  tracing::debug!(?settings, "settings loaded");

  let saves = Arc::new(FileSaveProvider::from_settings(&settings));
  let session = SessionManager::new(settings, MIGRATIONS, saves, Arc::new(PassthroughFormat));
  let backups = BackupEngine::new(session.clone());

  match cli.command {
    Command::Status => commands::status(&session).await,
    Command::Backup(BackupCommand::Create) => commands::backup_create(&backups).await,
    Command::Backup(BackupCommand::List) => commands::backup_list(&backups).await,
    Command::Backup(BackupCommand::Delete { timestamp }) => {
      commands::backup_delete(&backups, &timestamp).await
    }
    Command::Backup(BackupCommand::Restore { timestamp, no_safe_backup }) => {
      commands::backup_restore(&backups, &timestamp, !no_safe_backup).await
    }
    Command::Import { file, box_id, slot, generation } => {
      commands::import(&backups, file, box_id, slot, generation).await
    }
    Command::Remove { id } => commands::remove(&backups, id).await,
    Command::Persist => commands::persist(&backups).await,
  }
}
