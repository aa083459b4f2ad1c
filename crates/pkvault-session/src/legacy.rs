//! One-shot import of the flat-file layout that predates the database, and
//! seeding of the default bank and box.
//!
//! Legacy files are JSON objects keyed by record id with PascalCase fields.
//! `pkm.json` and `dex.json` are recognised (backed up, removed on restore)
//! but carry nothing the relational model stores.

use std::{collections::BTreeMap, path::Path};

use pkvault_core::{
  blob::{BlobPayload, LoadError},
  storage::{Bank, BankView, BankViewSave, BoxKind, PkmVariant, StorageBox},
};
use serde::{Deserialize, de::DeserializeOwned};

use crate::{
  Result,
  blob_store::BlobStore,
  fileio,
  log_time::Timer,
  repository::Repository,
  session::{BootstrapToken, SessionManager},
};

// ─── Legacy shapes ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct LegacyBank {
  id:         String,
  id_int:     i64,
  name:       String,
  #[serde(default)]
  is_default: bool,
  #[serde(default)]
  order:      i64,
  #[serde(default)]
  view:       LegacyBankView,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct LegacyBankView {
  #[serde(default)]
  main_box_ids: Vec<i64>,
  #[serde(default)]
  saves:        Vec<LegacyBankViewSave>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct LegacyBankViewSave {
  save_id:      u32,
  #[serde(default)]
  save_box_ids: Vec<i64>,
  #[serde(default)]
  order:        i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct LegacyBox {
  id:         String,
  id_int:     i64,
  name:       String,
  #[serde(default, rename = "Type")]
  kind:       BoxKind,
  slot_count: i64,
  #[serde(default)]
  order:      i64,
  #[serde(default = "default_bank_id")]
  bank_id:    String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct LegacyPkmVersion {
  id:                        String,
  box_id:                    i64,
  box_slot:                  i64,
  #[serde(default)]
  is_main:                   bool,
  attached_save_id:          Option<u32>,
  attached_save_pkm_id_base: Option<String>,
  generation:                u8,
  filepath:                  String,
}

fn default_bank_id() -> String { "0".into() }

impl From<LegacyBank> for Bank {
  fn from(e: LegacyBank) -> Self {
    Self {
      id:         e.id,
      id_int:     e.id_int,
      name:       e.name,
      is_default: e.is_default,
      order:      e.order,
      view:       BankView {
        main_box_ids: e.view.main_box_ids,
        saves:        e
          .view
          .saves
          .into_iter()
          .map(|s| BankViewSave {
            save_id:      s.save_id,
            save_box_ids: s.save_box_ids,
            order:        s.order,
          })
          .collect(),
      },
    }
  }
}

impl From<LegacyBox> for StorageBox {
  fn from(e: LegacyBox) -> Self {
    Self {
      id:         e.id,
      id_int:     e.id_int,
      name:       e.name,
      kind:       e.kind,
      slot_count: e.slot_count,
      order:      e.order,
      bank_id:    e.bank_id,
    }
  }
}

impl From<LegacyPkmVersion> for PkmVariant {
  fn from(e: LegacyPkmVersion) -> Self {
    Self {
      id:                        e.id,
      box_id:                    e.box_id.to_string(),
      box_slot:                  e.box_slot,
      is_main:                   e.is_main,
      attached_save_id:          e.attached_save_id,
      attached_save_pkm_id_base: e.attached_save_pkm_id_base,
      generation:                e.generation,
      filepath:                  e.filepath,
    }
  }
}

// ─── Normalization ───────────────────────────────────────────────────────────

struct Repos {
  banks:    Repository<Bank>,
  boxes:    Repository<StorageBox>,
  variants: Repository<PkmVariant>,
  blobs:    BlobStore,
}

impl Repos {
  fn new(session: &SessionManager, token: BootstrapToken) -> Self {
    Self {
      banks:    Repository::for_bootstrap(session.clone(), token),
      boxes:    Repository::for_bootstrap(session.clone(), token),
      variants: Repository::for_bootstrap(session.clone(), token),
      blobs:    BlobStore::with_bypass(session.clone(), Some(token)),
    }
  }
}

/// Import legacy data and seed defaults when the store needs it. Returns
/// whether anything was done.
pub(crate) async fn normalize_if_needed(
  session: &SessionManager,
  token:   BootstrapToken,
) -> Result<bool> {
  let repos = Repos::new(session, token);
  if !has_data_to_normalize(session, &repos).await? {
    return Ok(false);
  }

  let _timer = Timer::start("Data normalize");
  let from_legacy = !session.has_persistent_store();

  if from_legacy {
    let banks = read_legacy::<LegacyBank>(session, "bank.json").await?;
    repos.banks.add_many(banks.into_iter().map(Bank::from).collect()).await?;
  }
  if !repos.banks.exists_any().await? {
    repos.banks.add(Bank::default_bank()).await?;
  }

  if from_legacy {
    let boxes = read_legacy::<LegacyBox>(session, "box.json").await?;
    repos.boxes.add_many(boxes.into_iter().map(StorageBox::from).collect()).await?;
  }
  if !repos.boxes.exists_any().await? {
    repos.boxes.add(StorageBox::default_box()).await?;
  }

  if from_legacy {
    import_variants(session, &repos, token).await?;
  }

  Ok(true)
}

async fn has_data_to_normalize(session: &SessionManager, repos: &Repos) -> Result<bool> {
  if !repos.banks.exists_any().await? {
    tracing::info!("no bank, normalizing");
    return Ok(true);
  }
  if !repos.boxes.exists_any().await? {
    tracing::info!("no box, normalizing");
    return Ok(true);
  }
  if session.has_persistent_store() {
    return Ok(false);
  }
  let has_legacy = any_exists(&session.settings().legacy_paths()).await?;
  if has_legacy {
    tracing::info!("legacy files found, normalizing");
  }
  Ok(has_legacy)
}

/// Variants keep their blobs even when those fail to load: payloads are
/// staged unchecked as `NOT_LOADED` and then re-read from disk.
async fn import_variants(
  session: &SessionManager,
  repos:   &Repos,
  token:   BootstrapToken,
) -> Result<()> {
  let variants: Vec<PkmVariant> = read_legacy::<LegacyPkmVersion>(session, "pkm-version.json")
    .await?
    .into_iter()
    .map(PkmVariant::from)
    .collect();
  if variants.is_empty() {
    return Ok(());
  }

  for variant in &variants {
    repos
      .blobs
      .stage(&variant.filepath, BlobPayload::Failed(LoadError::NotLoaded), false, false)
      .await?;
  }
  let count = variants.len();
  repos.variants.add_many(variants).await?;

  let store = session.store_for(Some(token)).await?;
  let format = session.format().clone();
  let loaded = store
    .hydrate_blobs(&session.settings().app_dir(), move |len| format.check_size(len))
    .await?;
  tracing::info!(variants = count, loaded, "legacy variants imported");
  Ok(())
}

async fn read_legacy<T: DeserializeOwned>(session: &SessionManager, file: &str) -> Result<Vec<T>> {
  let path = session.settings().legacy_path(file);
  let Some(bytes) = fileio::read_if_exists(&path).await? else {
    return Ok(Vec::new());
  };
  let entries: BTreeMap<String, T> = serde_json::from_slice(&bytes)?;
  tracing::info!(file, count = entries.len(), "legacy entries read");
  Ok(entries.into_values().collect())
}

async fn any_exists(paths: &[impl AsRef<Path>]) -> Result<bool> {
  for path in paths {
    if tokio::fs::try_exists(path.as_ref()).await? {
      return Ok(true);
    }
  }
  Ok(false)
}
