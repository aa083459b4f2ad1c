//! [`FileSaveProvider`]: save files loaded from configured paths.

use std::{
  collections::BTreeMap,
  path::{Path, PathBuf},
  sync::{PoisonError, RwLock},
};

use async_trait::async_trait;
use pkvault_core::save::{SaveFile, SaveProvider};
use sha2::{Digest, Sha256};

use crate::{Settings, fileio};

/// Loads each configured path as a raw save payload. Missing files are
/// skipped; they load on a later `setup` once they appear.
pub struct FileSaveProvider {
  paths: Vec<PathBuf>,
  saves: RwLock<BTreeMap<u32, SaveFile>>,
}

impl FileSaveProvider {
  pub fn new(paths: Vec<PathBuf>) -> Self { Self { paths, saves: RwLock::default() } }

  pub fn from_settings(settings: &Settings) -> Self { Self::new(settings.save_files()) }

  /// Stable id derived from the save's path.
  pub fn save_id(path: &Path) -> u32 {
    let digest = Sha256::digest(fileio::normalize_slashes(path).as_bytes());
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
  }

  /// Replace a loaded save's bytes; the save is written back on the next
  /// persist. Returns `false` when no save with that id is loaded.
  pub fn mark_dirty(&self, id: u32, data: Vec<u8>) -> bool {
    let mut saves = self.saves.write().unwrap_or_else(PoisonError::into_inner);
    match saves.get_mut(&id) {
      Some(save) => {
        save.data = data;
        save.dirty = true;
        true
      }
      None => false,
    }
  }
}

#[async_trait]
impl SaveProvider for FileSaveProvider {
  async fn setup(&self) -> pkvault_core::Result<()> {
    let missing: Vec<(u32, PathBuf)> = {
      let saves = self.saves.read().unwrap_or_else(PoisonError::into_inner);
      self
        .paths
        .iter()
        .map(|p| (Self::save_id(p), p.clone()))
        .filter(|(id, _)| !saves.contains_key(id))
        .collect()
    };

    let mut loaded = Vec::with_capacity(missing.len());
    for (id, path) in missing {
      match fileio::read_if_exists(&path).await? {
        Some(data) => loaded.push(SaveFile { id, path, data, dirty: false }),
        None => tracing::warn!(path = %path.display(), "save file not found"),
      }
    }

    let count = loaded.len();
    let mut saves = self.saves.write().unwrap_or_else(PoisonError::into_inner);
    for save in loaded {
      saves.insert(save.id, save);
    }
    tracing::debug!(loaded = count, total = saves.len(), "saves ready");
    Ok(())
  }

  fn saves(&self) -> BTreeMap<u32, SaveFile> {
    self.saves.read().unwrap_or_else(PoisonError::into_inner).clone()
  }

  fn invalidate(&self) {
    self.saves.write().unwrap_or_else(PoisonError::into_inner).clear();
  }

  async fn write_dirty(&self) -> pkvault_core::Result<usize> {
    let dirty: Vec<SaveFile> = self
      .saves()
      .into_values()
      .filter(|s| s.dirty)
      .collect();

    for save in &dirty {
      fileio::write_creating_dirs(&save.path, &save.data)
        .await
        .map_err(|e| pkvault_core::Error::SaveWrite {
          path:   save.path.clone(),
          reason: e.to_string(),
        })?;
      if let Some(s) = self
        .saves
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .get_mut(&save.id)
      {
        s.dirty = false;
      }
    }
    Ok(dirty.len())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn setup_loads_present_files_and_skips_missing() {
    let dir = tempfile::TempDir::new().unwrap();
    let present = dir.path().join("a.sav");
    let missing = dir.path().join("b.sav");
    std::fs::write(&present, b"save-a").unwrap();

    let provider = FileSaveProvider::new(vec![present.clone(), missing]);
    provider.setup().await.unwrap();

    let saves = provider.saves();
    assert_eq!(saves.len(), 1);
    let save = &saves[&FileSaveProvider::save_id(&present)];
    assert_eq!(save.data, b"save-a");
    assert!(!save.dirty);
  }

  #[tokio::test]
  async fn dirty_saves_are_written_once() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("a.sav");
    std::fs::write(&path, b"old").unwrap();

    let provider = FileSaveProvider::new(vec![path.clone()]);
    provider.setup().await.unwrap();
    assert!(provider.mark_dirty(FileSaveProvider::save_id(&path), b"new".to_vec()));
    let unknown = FileSaveProvider::save_id(Path::new("/elsewhere/z.sav"));
    assert!(!provider.mark_dirty(unknown, Vec::new()));

    assert_eq!(provider.write_dirty().await.unwrap(), 1);
    assert_eq!(std::fs::read(&path).unwrap(), b"new");
    assert_eq!(provider.write_dirty().await.unwrap(), 0);
  }

  #[tokio::test]
  async fn invalidate_forces_a_reload() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("a.sav");
    std::fs::write(&path, b"v1").unwrap();

    let provider = FileSaveProvider::new(vec![path.clone()]);
    provider.setup().await.unwrap();
    std::fs::write(&path, b"v2").unwrap();

    provider.setup().await.unwrap();
    assert_eq!(provider.saves().into_values().next().unwrap().data, b"v1");

    provider.invalidate();
    assert!(provider.saves().is_empty());
    provider.setup().await.unwrap();
    assert_eq!(provider.saves().into_values().next().unwrap().data, b"v2");
  }
}
