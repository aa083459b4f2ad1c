//! Tests for `SqliteStore` against in-memory and temp-file databases.

use pkvault_core::{
  blob::{BlobPayload, LoadError, Staged},
  storage::{Bank, BankView, BankViewSave, BoxKind, PkmVariant, StorageBox},
};
use tempfile::TempDir;

use crate::{Error, MIGRATIONS, Migration, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory(MIGRATIONS)
    .await
    .expect("in-memory store")
}

fn variant(id: &str, filepath: &str) -> PkmVariant {
  PkmVariant {
    id:                        id.into(),
    box_id:                    "0".into(),
    box_slot:                  0,
    is_main:                   true,
    attached_save_id:          None,
    attached_save_pkm_id_base: None,
    generation:                3,
    filepath:                  filepath.into(),
  }
}

// ─── Schema ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn open_applies_every_migration() {
  let s = store().await;
  assert_eq!(s.schema_version().await.unwrap(), 2);

  // Re-running is a no-op once the schema is current.
  let applied = s.migrate(MIGRATIONS).await.unwrap();
  assert!(applied.is_empty());
}

#[tokio::test]
async fn empty_migration_list_is_fatal() {
  static NONE: &[Migration] = &[];
  let result = SqliteStore::open_in_memory(NONE).await;
  assert!(matches!(result, Err(Error::NoMigrations)));
}

#[tokio::test]
async fn newer_database_is_rejected() {
  let s = store().await;
  s.conn
    .call(|conn| {
      conn.pragma_update(None, "user_version", 99)?;
      Ok(())
    })
    .await
    .unwrap();

  let result = s.migrate(MIGRATIONS).await;
  assert!(matches!(
    result,
    Err(Error::UnsupportedSchemaVersion { found: 99, supported: 2 })
  ));
}

#[tokio::test]
async fn file_store_survives_reopen() {
  let dir = TempDir::new().unwrap();
  let path = dir.path().join("pkvault.db");

  let s = SqliteStore::open(&path, MIGRATIONS).await.unwrap();
  s.insert(&Bank::default_bank()).await.unwrap();
  s.close().await.unwrap();

  let s = SqliteStore::open(&path, MIGRATIONS).await.unwrap();
  assert_eq!(s.count::<Bank>().await.unwrap(), 1);
}

// ─── Records ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn insert_and_get_bank_with_view() {
  let s = store().await;
  let mut bank = Bank::default_bank();
  bank.view = BankView {
    main_box_ids: vec![0, 1],
    saves:        vec![BankViewSave { save_id: 7, save_box_ids: vec![2], order: 0 }],
  };

  s.insert(&bank).await.unwrap();

  let fetched = s.get::<Bank>("0").await.unwrap();
  assert_eq!(fetched, Some(bank));
  assert!(s.get::<Bank>("missing").await.unwrap().is_none());
}

#[tokio::test]
async fn box_kind_roundtrips_through_text_column() {
  let s = store().await;
  s.insert(&Bank::default_bank()).await.unwrap();

  let mut party = StorageBox::default_box();
  party.id = "1".into();
  party.kind = BoxKind::Party;
  s.insert(&party).await.unwrap();

  let fetched = s.get::<StorageBox>("1").await.unwrap().unwrap();
  assert_eq!(fetched.kind, BoxKind::Party);
}

#[tokio::test]
async fn get_many_preserves_request_order_and_gaps() {
  let s = store().await;
  s.insert_many(&[variant("a", "x/a"), variant("b", "x/b")])
    .await
    .unwrap();

  let ids = vec!["b".to_string(), "nope".to_string(), "a".to_string(), "b".to_string()];
  let got = s.get_many::<PkmVariant>(&ids).await.unwrap();

  assert_eq!(got.len(), 4);
  assert_eq!(got[0].as_ref().map(|v| v.id.as_str()), Some("b"));
  assert!(got[1].is_none());
  assert_eq!(got[2].as_ref().map(|v| v.id.as_str()), Some("a"));
  assert_eq!(got[3].as_ref().map(|v| v.id.as_str()), Some("b"));
}

#[tokio::test]
async fn exists_first_and_count() {
  let s = store().await;
  assert!(!s.exists_any::<PkmVariant>().await.unwrap());
  assert!(s.first::<PkmVariant>().await.unwrap().is_none());

  s.insert_many(&[variant("a", "x/a"), variant("b", "x/b"), variant("c", "x/c")])
    .await
    .unwrap();

  assert!(s.exists_any::<PkmVariant>().await.unwrap());
  assert!(s.first::<PkmVariant>().await.unwrap().is_some());
  assert_eq!(s.count::<PkmVariant>().await.unwrap(), 3);
}

#[tokio::test]
async fn update_changes_non_key_columns() {
  let s = store().await;
  let mut v = variant("a", "x/a");
  s.insert(&v).await.unwrap();

  v.box_slot = 12;
  v.attached_save_id = Some(42);
  v.attached_save_pkm_id_base = Some("base".into());
  s.update(&v).await.unwrap();

  assert_eq!(s.get::<PkmVariant>("a").await.unwrap(), Some(v));
}

#[tokio::test]
async fn update_and_delete_of_missing_record_fail() {
  let s = store().await;
  let v = variant("ghost", "x/ghost");

  assert!(matches!(
    s.update(&v).await,
    Err(Error::RecordNotFound { table: "pkm_variants", .. })
  ));
  assert!(matches!(
    s.delete::<PkmVariant>("ghost").await,
    Err(Error::RecordNotFound { .. })
  ));
}

#[tokio::test]
async fn insert_many_is_all_or_nothing() {
  let s = store().await;
  let result = s
    .insert_many(&[variant("a", "x/a"), variant("a", "x/dup")])
    .await;

  assert!(result.is_err());
  assert_eq!(s.count::<PkmVariant>().await.unwrap(), 0);
}

// ─── Blobs ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn stage_reports_added_then_modified() {
  let s = store().await;

  let first = s
    .stage_blob("storage/3/a.pk3", BlobPayload::Bytes(vec![1, 2, 3]), true, true)
    .await
    .unwrap();
  let second = s
    .stage_blob("storage/3/a.pk3", BlobPayload::Bytes(vec![4]), true, true)
    .await
    .unwrap();

  assert_eq!(first, Staged::Added);
  assert_eq!(second, Staged::Modified);

  let blob = s.get_blob("storage/3/a.pk3").await.unwrap().unwrap();
  assert_eq!(blob.data, vec![4]);
  assert!(blob.updated);
  assert!(blob.is_enabled());
}

#[tokio::test]
async fn disabled_payload_is_refused_when_checked() {
  let s = store().await;

  let refused = s
    .stage_blob("storage/3/bad.pk3", BlobPayload::Failed(LoadError::TooSmall), true, true)
    .await;
  assert!(matches!(refused, Err(Error::DisabledEntity(_))));
  assert!(s.get_blob("storage/3/bad.pk3").await.unwrap().is_none());

  // Without the check the error is kept as data.
  s.stage_blob("storage/3/bad.pk3", BlobPayload::Failed(LoadError::TooSmall), false, false)
    .await
    .unwrap();
  let blob = s.get_blob("storage/3/bad.pk3").await.unwrap().unwrap();
  assert_eq!(blob.error, Some(LoadError::TooSmall));
  assert!(s.enabled_blob_paths().await.unwrap().is_empty());
}

#[tokio::test]
async fn flush_writes_updates_and_releases_payloads() {
  let dir = TempDir::new().unwrap();
  let s = store().await;

  s.stage_blob("storage/3/a.pk3", BlobPayload::Bytes(b"alpha".to_vec()), true, true)
    .await
    .unwrap();
  s.stage_blob("storage/4/b.pk4", BlobPayload::Bytes(b"beta".to_vec()), false, true)
    .await
    .unwrap();

  let report = s.flush_blobs(dir.path()).await.unwrap();
  assert_eq!(report.written, 1);
  assert_eq!(report.deleted, 0);

  assert_eq!(std::fs::read(dir.path().join("storage/3/a.pk3")).unwrap(), b"alpha");
  assert!(!dir.path().join("storage/4/b.pk4").exists());

  for blob in s.all_blobs().await.unwrap() {
    assert!(blob.data.is_empty());
    assert_eq!(blob.error, Some(LoadError::NotLoaded));
    assert!(!blob.updated);
    assert!(!blob.deleted);
  }
}

#[tokio::test]
async fn delete_wins_over_update() {
  let dir = TempDir::new().unwrap();
  let target = dir.path().join("storage/3/a.pk3");
  std::fs::create_dir_all(target.parent().unwrap()).unwrap();
  std::fs::write(&target, b"old").unwrap();

  let s = store().await;
  s.stage_blob("storage/3/a.pk3", BlobPayload::Bytes(b"new".to_vec()), true, true)
    .await
    .unwrap();
  assert!(s.mark_blob_deleted("storage/3/a.pk3").await.unwrap());

  let report = s.flush_blobs(dir.path()).await.unwrap();
  assert_eq!(report.deleted, 1);
  assert_eq!(report.written, 0);
  assert!(!target.exists());
  assert!(s.get_blob("storage/3/a.pk3").await.unwrap().is_none());
}

#[tokio::test]
async fn deleting_an_absent_file_is_not_an_error() {
  let dir = TempDir::new().unwrap();
  let s = store().await;
  s.stage_blob("storage/3/never.pk3", BlobPayload::Bytes(vec![0]), false, true)
    .await
    .unwrap();
  s.mark_blob_deleted("storage/3/never.pk3").await.unwrap();

  assert_eq!(s.flush_blobs(dir.path()).await.unwrap().deleted, 1);
  assert!(!s.mark_blob_deleted("storage/3/never.pk3").await.unwrap());
}

#[tokio::test]
async fn restaging_a_deleted_path_keeps_it() {
  let dir = TempDir::new().unwrap();
  let s = store().await;
  s.stage_blob("storage/3/a.pk3", BlobPayload::Bytes(b"one".to_vec()), true, true)
    .await
    .unwrap();
  s.mark_blob_deleted("storage/3/a.pk3").await.unwrap();
  s.stage_blob("storage/3/a.pk3", BlobPayload::Bytes(b"two".to_vec()), true, true)
    .await
    .unwrap();

  let report = s.flush_blobs(dir.path()).await.unwrap();
  assert_eq!(report.deleted, 0);
  assert_eq!(std::fs::read(dir.path().join("storage/3/a.pk3")).unwrap(), b"two");
  assert!(s.get_blob("storage/3/a.pk3").await.unwrap().is_some());
}

#[tokio::test]
async fn second_flush_writes_nothing() {
  let dir = TempDir::new().unwrap();
  let s = store().await;
  s.stage_blob("storage/3/a.pk3", BlobPayload::Bytes(b"alpha".to_vec()), true, true)
    .await
    .unwrap();

  s.flush_blobs(dir.path()).await.unwrap();
  std::fs::remove_file(dir.path().join("storage/3/a.pk3")).unwrap();

  let report = s.flush_blobs(dir.path()).await.unwrap();
  assert_eq!(report, Default::default());
  assert!(!dir.path().join("storage/3/a.pk3").exists());

  let blob = s.get_blob("storage/3/a.pk3").await.unwrap().unwrap();
  assert_eq!(blob.error, Some(LoadError::NotLoaded));
  assert!(!blob.updated && !blob.deleted);
}

#[tokio::test]
async fn hydrate_reloads_bytes_and_tags_failures() {
  let dir = TempDir::new().unwrap();
  std::fs::create_dir_all(dir.path().join("storage/3")).unwrap();
  std::fs::write(dir.path().join("storage/3/ok.pk3"), b"payload").unwrap();
  std::fs::write(dir.path().join("storage/3/tiny.pk3"), b"x").unwrap();

  let s = store().await;
  for path in ["storage/3/ok.pk3", "storage/3/tiny.pk3", "storage/3/gone.pk3"] {
    s.stage_blob(path, BlobPayload::Bytes(vec![]), false, true)
      .await
      .unwrap();
  }
  s.flush_blobs(dir.path()).await.unwrap();

  let loaded = s
    .hydrate_blobs(dir.path(), |len| (len < 2).then_some(LoadError::TooSmall))
    .await
    .unwrap();
  assert_eq!(loaded, 1);

  let ok = s.get_blob("storage/3/ok.pk3").await.unwrap().unwrap();
  assert_eq!(ok.data, b"payload");
  assert_eq!(ok.error, None);

  let tiny = s.get_blob("storage/3/tiny.pk3").await.unwrap().unwrap();
  assert_eq!(tiny.error, Some(LoadError::TooSmall));

  let gone = s.get_blob("storage/3/gone.pk3").await.unwrap().unwrap();
  assert_eq!(gone.error, Some(LoadError::NotFound));

  assert_eq!(s.enabled_blob_paths().await.unwrap(), vec!["storage/3/ok.pk3".to_string()]);
}
