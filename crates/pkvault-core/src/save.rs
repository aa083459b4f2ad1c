//! The save-file provider seam.
//!
//! Save files live outside the relational store. The provider keeps them
//! loaded in memory for the duration of a session and writes dirty ones back
//! when the session is persisted.

use std::{collections::BTreeMap, path::PathBuf};

use async_trait::async_trait;

use crate::Result;

/// A loaded save file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveFile {
  pub id:    u32,
  /// Absolute path the save was loaded from.
  pub path:  PathBuf,
  pub data:  Vec<u8>,
  /// Modified in memory, must be written back on persist.
  pub dirty: bool,
}

/// Records of a save that need reconciling with the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRequest {
  pub save_id:     u32,
  pub variant_ids: Vec<String>,
}

#[async_trait]
pub trait SaveProvider: Send + Sync {
  /// Re-derive in-memory caches from disk. Called on every session start.
  async fn setup(&self) -> Result<()>;

  /// Currently loaded saves keyed by id.
  fn saves(&self) -> BTreeMap<u32, SaveFile>;

  /// Drop every cached save so the next `setup` reloads from disk.
  fn invalidate(&self);

  /// Save-held records that disagree with the store.
  fn pending_synchronization(&self) -> Vec<SyncRequest> { Vec::new() }

  /// Write every dirty save back to its path. Returns how many were written.
  async fn write_dirty(&self) -> Result<usize>;
}
