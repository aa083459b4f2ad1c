//! Error types for `pkvault-core`.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),

  #[error("save {path:?} could not be written: {reason}")]
  SaveWrite { path: PathBuf, reason: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
