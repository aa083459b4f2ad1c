//! Error types for `pkvault-session`.

use std::{path::PathBuf, sync::Arc};

use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("store error: {0}")]
  Store(#[from] pkvault_store_sqlite::Error),

  #[error("collaborator error: {0}")]
  Core(#[from] pkvault_core::Error),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("zip error: {0}")]
  Zip(#[from] zip::result::ZipError),

  #[error("config error: {0}")]
  Config(#[from] config::ConfigError),

  #[error("background task failed: {0}")]
  Join(#[from] tokio::task::JoinError),

  /// The readiness task of the current session failed. Every awaiter sees
  /// the same underlying error; the store is not usable until a new session
  /// is started.
  #[error("session bootstrap failed: {0}")]
  Bootstrap(Arc<Error>),

  #[error("no backup exists for {0}")]
  BackupNotFound(DateTime<Utc>),

  #[error("backup archive {} has no manifest entry", .0.display())]
  ManifestMissing(PathBuf),

  /// An operation needed a live session and there was none.
  #[error("no live session")]
  SessionClosed,

  #[error("{0}")]
  Collaborator(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failure of [`crate::BackupEngine::run_guarded`].
#[derive(Debug, Error)]
pub enum GuardedError<E> {
  /// The snapshot could not be taken; the action never ran.
  #[error("backup before guarded action failed: {0}")]
  Backup(Error),

  /// The action failed and the snapshot was restored. Carries the action's
  /// own error unchanged.
  #[error("{0}")]
  Action(E),

  /// The action failed and so did the restore. Persistent state is
  /// indeterminate; the process must not continue.
  #[error("guarded action failed ({action}) and restore failed: {restore}")]
  Fatal { action: E, restore: Error },
}

impl<E> GuardedError<E> {
  /// The action's error, if the action ran and failed.
  pub fn action_error(&self) -> Option<&E> {
    match self {
      Self::Backup(_) => None,
      Self::Action(e) | Self::Fatal { action: e, .. } => Some(e),
    }
  }

  pub fn is_fatal(&self) -> bool { matches!(self, Self::Fatal { .. }) }
}
