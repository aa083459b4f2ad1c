//! Session-guarded record access.
//!
//! Every operation waits for the session to be ready before touching the
//! working store, so no caller ever sees a store that is mid-bootstrap.

use std::{collections::HashMap, marker::PhantomData};

use pkvault_core::{
  blob::{BlobRecord, Staged},
  format::{FormatHint, GameEntity},
  storage::PkmVariant,
};
use pkvault_store_sqlite::{Record, SqliteStore};

use crate::{
  Result,
  blob_store::BlobStore,
  session::{BootstrapToken, SessionManager},
};

pub struct Repository<R> {
  session: SessionManager,
  bypass:  Option<BootstrapToken>,
  _record: PhantomData<fn() -> R>,
}

impl<R> Clone for Repository<R> {
  fn clone(&self) -> Self {
    Self { session: self.session.clone(), bypass: self.bypass, _record: PhantomData }
  }
}

impl<R: Record> Repository<R> {
  pub fn new(session: SessionManager) -> Self {
    Self { session, bypass: None, _record: PhantomData }
  }

  /// A repository usable from inside the bootstrap that minted `token`.
  pub(crate) fn for_bootstrap(session: SessionManager, token: BootstrapToken) -> Self {
    Self { session, bypass: Some(token), _record: PhantomData }
  }

  async fn store(&self) -> Result<SqliteStore> {
    self.session.store_for(self.bypass).await
  }

  pub async fn all(&self) -> Result<Vec<R>> { Ok(self.store().await?.all().await?) }

  pub async fn get(&self, id: &str) -> Result<Option<R>> { Ok(self.store().await?.get(id).await?) }

  /// One slot per requested id, in request order; `None` where no record
  /// exists.
  pub async fn get_by_ids(&self, ids: &[String]) -> Result<Vec<Option<R>>> {
    Ok(self.store().await?.get_many(ids).await?)
  }

  pub async fn add(&self, record: R) -> Result<R> {
    self.store().await?.insert(&record).await?;
    Ok(record)
  }

  /// Insert every record in one transaction. An empty batch is handed back
  /// as-is without touching the session.
  pub async fn add_many(&self, records: Vec<R>) -> Result<Vec<R>> {
    if records.is_empty() {
      return Ok(records);
    }
    self.store().await?.insert_many(&records).await?;
    Ok(records)
  }

  pub async fn update(&self, record: &R) -> Result<()> {
    Ok(self.store().await?.update(record).await?)
  }

  pub async fn delete(&self, id: &str) -> Result<()> {
    Ok(self.store().await?.delete::<R>(id).await?)
  }

  pub async fn exists_any(&self) -> Result<bool> {
    Ok(self.store().await?.exists_any::<R>().await?)
  }

  pub async fn first(&self) -> Result<Option<R>> { Ok(self.store().await?.first().await?) }

  pub async fn count(&self) -> Result<u64> { Ok(self.store().await?.count::<R>().await?) }
}

// ─── Variants ────────────────────────────────────────────────────────────────

/// A variant together with the blob it owns, if that blob is tracked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantWithBlob {
  pub variant: PkmVariant,
  pub blob:    Option<BlobRecord>,
}

impl Repository<PkmVariant> {
  fn blobs(&self) -> BlobStore {
    BlobStore::with_bypass(self.session.clone(), self.bypass)
  }

  pub async fn get_with_blob(&self, id: &str) -> Result<Option<VariantWithBlob>> {
    let store = self.store().await?;
    let Some(variant) = store.get::<PkmVariant>(id).await? else {
      return Ok(None);
    };
    let blob = store.get_blob(&variant.filepath).await?;
    Ok(Some(VariantWithBlob { variant, blob }))
  }

  pub async fn all_with_blobs(&self) -> Result<Vec<VariantWithBlob>> {
    let store = self.store().await?;
    let variants = store.all::<PkmVariant>().await?;
    let mut blobs: HashMap<String, BlobRecord> = store
      .all_blobs()
      .await?
      .into_iter()
      .map(|b| (b.path.clone(), b))
      .collect();

    Ok(
      variants
        .into_iter()
        .map(|variant| {
          let blob = blobs.remove(&variant.filepath);
          VariantWithBlob { variant, blob }
        })
        .collect(),
    )
  }

  /// Stage `entity` as the variant's blob, then insert the variant row.
  ///
  /// Disabled entities are refused: a placeholder must never be written as
  /// real content.
  pub async fn add_variant(&self, variant: PkmVariant, entity: &GameEntity) -> Result<PkmVariant> {
    let staged = self
      .blobs()
      .stage_entity(&variant.filepath, entity, true, true)
      .await?;
    if staged == Staged::Modified {
      tracing::debug!(path = %variant.filepath, "variant overwrites an existing blob");
    }
    self.add(variant).await
  }

  /// Delete the variant row and flag its blob for deletion at the next
  /// flush.
  pub async fn delete_variant(&self, id: &str) -> Result<()> {
    let store = self.store().await?;
    let filepath = store
      .get::<PkmVariant>(id)
      .await?
      .map(|v| v.filepath);

    store.delete::<PkmVariant>(id).await?;
    if let Some(filepath) = filepath {
      store.mark_blob_deleted(&filepath).await?;
    }
    Ok(())
  }

  /// Load the structured entity behind a variant. Load failures come back
  /// as a placeholder tagged with the reason.
  pub fn load_entity(&self, item: &VariantWithBlob) -> GameEntity {
    let hint = FormatHint::from_path(&item.variant.filepath, item.variant.generation);
    match &item.blob {
      Some(blob) => self.blobs().load(blob, &hint),
      None => GameEntity::placeholder(pkvault_core::blob::LoadError::NotFound),
    }
  }
}
