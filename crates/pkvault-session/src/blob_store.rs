//! Blob store facade: staging, deferred flush and entity loading.

use std::path::PathBuf;

use pkvault_core::{
  blob::{BlobPayload, BlobRecord, FlushReport, LoadError, Staged},
  format::{FormatHint, FormatLibrary, GameEntity},
};
use pkvault_store_sqlite::SqliteStore;

use crate::{
  Result,
  session::{BootstrapToken, SessionManager},
};

#[derive(Clone)]
pub struct BlobStore {
  session: SessionManager,
  bypass:  Option<BootstrapToken>,
}

impl BlobStore {
  pub fn new(session: SessionManager) -> Self { Self { session, bypass: None } }

  pub(crate) fn with_bypass(session: SessionManager, bypass: Option<BootstrapToken>) -> Self {
    Self { session, bypass }
  }

  async fn store(&self) -> Result<SqliteStore> {
    self.session.store_for(self.bypass).await
  }

  /// Stage an entity's canonical bytes at `path`. A disabled entity is
  /// staged as its error tag, and refused outright with `check_validity`.
  pub async fn stage_entity(
    &self,
    path:           &str,
    entity:         &GameEntity,
    updated:        bool,
    check_validity: bool,
  ) -> Result<Staged> {
    let payload = match entity.load_error() {
      None => BlobPayload::Bytes(self.session.format().to_bytes(entity)),
      Some(error) => BlobPayload::Failed(error),
    };
    self.stage(path, payload, updated, check_validity).await
  }

  pub async fn stage(
    &self,
    path:           &str,
    payload:        BlobPayload,
    updated:        bool,
    check_validity: bool,
  ) -> Result<Staged> {
    Ok(
      self
        .store()
        .await?
        .stage_blob(path, payload, updated, check_validity)
        .await?,
    )
  }

  pub async fn mark_deleted(&self, path: &str) -> Result<bool> {
    Ok(self.store().await?.mark_blob_deleted(path).await?)
  }

  pub async fn get(&self, path: &str) -> Result<Option<BlobRecord>> {
    Ok(self.store().await?.get_blob(path).await?)
  }

  /// Apply pending writes and deletes to disk now, ahead of a persist.
  pub async fn flush(&self) -> Result<FlushReport> {
    let root = self.session.settings().app_dir();
    Ok(self.store().await?.flush_blobs(&root).await?)
  }

  /// Absolute paths of every blob that loaded without error.
  pub async fn enabled_paths(&self) -> Result<Vec<PathBuf>> {
    let root = self.session.settings().app_dir();
    Ok(
      self
        .store()
        .await?
        .enabled_blob_paths()
        .await?
        .into_iter()
        .map(|p| root.join(p))
        .collect(),
    )
  }

  /// Blob path for a new entity: `<storage>/<generation>/<canonical name>`.
  pub fn entity_path(&self, entity: &GameEntity) -> String {
    format!(
      "{}/{}/{}",
      self.session.settings().storage_prefix(),
      entity.generation,
      self.session.format().file_name(entity)
    )
  }

  pub fn load(&self, record: &BlobRecord, hint: &FormatHint) -> GameEntity {
    load(self.session.format().as_ref(), record, hint)
  }
}

/// Turn a blob record into an entity. Never fails: a record that already
/// carries an error, or bytes the format library rejects, yield a tagged
/// placeholder.
pub fn load(format: &dyn FormatLibrary, record: &BlobRecord, hint: &FormatHint) -> GameEntity {
  if let Some(error) = record.error {
    return GameEntity::placeholder(error);
  }

  match format.parse(&record.data, hint) {
    Ok(entity) => entity,
    Err(e) => {
      let error: LoadError = e.load_error();
      tracing::warn!(path = %record.path, error = %e, tag = %error, "blob failed to parse");
      GameEntity::placeholder(error)
    }
  }
}

#[cfg(test)]
mod tests {
  use pkvault_core::format::FormatError;

  use super::*;

  struct Rejecting;

  impl FormatLibrary for Rejecting {
    fn parse(&self, _: &[u8], _: &FormatHint) -> Result<GameEntity, FormatError> {
      Err(FormatError::Unparseable(LoadError::TooBig))
    }

    fn to_bytes(&self, entity: &GameEntity) -> Vec<u8> { entity.data().to_vec() }

    fn file_name(&self, _: &GameEntity) -> String { "x".into() }

    fn identity(&self, _: &GameEntity) -> String { "x".into() }
  }

  fn record(error: Option<LoadError>) -> BlobRecord {
    BlobRecord {
      path: "storage/3/a.pk3".into(),
      data: vec![1, 2, 3],
      error,
      updated: false,
      deleted: false,
    }
  }

  #[test]
  fn errored_record_is_never_parsed() {
    let entity = load(&Rejecting, &record(Some(LoadError::NotFound)), &FormatHint::default());
    assert_eq!(entity.load_error(), Some(LoadError::NotFound));
  }

  #[test]
  fn parse_failure_becomes_placeholder() {
    let entity = load(&Rejecting, &record(None), &FormatHint::default());
    assert!(!entity.is_enabled());
    assert_eq!(entity.load_error(), Some(LoadError::TooBig));
  }
}
