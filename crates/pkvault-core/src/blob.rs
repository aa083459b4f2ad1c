//! Blob records: binary payloads mirrored on the filesystem.
//!
//! A blob row in the working store pairs a relative path with the bytes that
//! belong there. Writes and deletes are never applied immediately; they are
//! recorded as `updated` / `deleted` intent and applied in bulk on flush.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

// ─── Load error tag ──────────────────────────────────────────────────────────

/// Why a blob's payload is not usable. `None` on a [`BlobRecord`] means the
/// payload loaded cleanly.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum LoadError {
  NotFound,
  TooSmall,
  TooBig,
  Unauthorized,
  Unknown,
  /// Payload released from memory after a flush; re-read at next session.
  NotLoaded,
}

// ─── Blob record ─────────────────────────────────────────────────────────────

/// One row of the blob table.
///
/// `updated` and `deleted` are both intents for the next flush. When both are
/// set, delete wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobRecord {
  /// Path relative to the application directory, forward-slash separated.
  pub path:    String,
  pub data:    Vec<u8>,
  pub error:   Option<LoadError>,
  pub updated: bool,
  pub deleted: bool,
}

impl BlobRecord {
  /// A record is "enabled" when it carries no load error.
  pub fn is_enabled(&self) -> bool { self.error.is_none() }
}

/// What a caller hands to the blob store when staging a write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlobPayload {
  Bytes(Vec<u8>),
  /// The entity behind this blob is disabled; only the error is kept.
  Failed(LoadError),
}

impl BlobPayload {
  pub fn is_disabled(&self) -> bool { matches!(self, Self::Failed(_)) }

  pub fn into_parts(self) -> (Vec<u8>, Option<LoadError>) {
    match self {
      Self::Bytes(data) => (data, None),
      Self::Failed(error) => (Vec::new(), Some(error)),
    }
  }
}

/// Outcome of a staging call: a new path or an overwrite of an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Staged {
  Added,
  Modified,
}

/// Counts reported by a flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
  pub deleted: usize,
  pub written: usize,
}

#[cfg(test)]
mod tests {
  use std::str::FromStr;

  use super::*;

  #[test]
  fn load_error_uses_screaming_snake_case() {
    assert_eq!(LoadError::NotLoaded.to_string(), "NOT_LOADED");
    assert_eq!(LoadError::from_str("TOO_BIG").unwrap(), LoadError::TooBig);
    assert!(LoadError::from_str("bogus").is_err());
  }

  #[test]
  fn failed_payload_is_disabled() {
    let payload = BlobPayload::Failed(LoadError::TooSmall);
    assert!(payload.is_disabled());
    assert_eq!(payload.into_parts(), (Vec::new(), Some(LoadError::TooSmall)));
  }
}
