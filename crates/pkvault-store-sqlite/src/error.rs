//! Error type for `pkvault-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  /// No schema migrations are registered. This is a packaging error.
  #[error("no schema migrations registered")]
  NoMigrations,

  #[error("schema version {found} is newer than supported version {supported}")]
  UnsupportedSchemaVersion { found: u32, supported: u32 },

  #[error("{table} record not found: {id}")]
  RecordNotFound { table: &'static str, id: String },

  /// Attempted to stage the payload of a disabled entity as real content.
  #[error("refusing to stage disabled entity at {0}")]
  DisabledEntity(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
