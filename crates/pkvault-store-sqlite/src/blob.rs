//! Blob table operations: deferred filesystem writes and deletes.
//!
//! Nothing in here touches a blob's file except [`SqliteStore::flush_blobs`]
//! and [`SqliteStore::hydrate_blobs`]. Staging and deleting only record
//! intent in the `pkm_files` table.

use std::{io, path::Path};

use pkvault_core::{
  blob::{BlobPayload, BlobRecord, FlushReport, LoadError, Staged},
  format::FormatError,
};
use rusqlite::OptionalExtension as _;

use crate::{
  Error, Result,
  encode::{BLOB_COLUMNS, blob_from_row, encode_load_error},
  store::SqliteStore,
};

impl SqliteStore {
  /// Record `payload` as the content of `path`.
  ///
  /// With `check_validity`, a disabled payload is refused: placeholders must
  /// never be staged as real content. The row is inserted when `path` is new
  /// and overwritten otherwise; either way any pending delete is cancelled.
  pub async fn stage_blob(
    &self,
    path:           &str,
    payload:        BlobPayload,
    updated:        bool,
    check_validity: bool,
  ) -> Result<Staged> {
    if check_validity && payload.is_disabled() {
      return Err(Error::DisabledEntity(path.to_owned()));
    }

    let path = path.to_owned();
    let (data, error) = payload.into_parts();
    let error = encode_load_error(error);

    let staged = self
      .conn
      .call(move |conn| {
        let exists: bool = conn.query_row(
          "SELECT EXISTS (SELECT 1 FROM pkm_files WHERE filepath = ?1)",
          [&path],
          |row| row.get(0),
        )?;

        if exists {
          conn.execute(
            "UPDATE pkm_files SET data = ?2, error = ?3, updated = ?4, deleted = 0
             WHERE filepath = ?1",
            rusqlite::params![path, data, error, updated],
          )?;
          Ok(Staged::Modified)
        } else {
          conn.execute(
            "INSERT INTO pkm_files (filepath, data, error, updated, deleted)
             VALUES (?1, ?2, ?3, ?4, 0)",
            rusqlite::params![path, data, error, updated],
          )?;
          Ok(Staged::Added)
        }
      })
      .await?;

    Ok(staged)
  }

  /// Flag `path` for deletion at the next flush. Returns `false` when no
  /// blob is tracked at that path.
  pub async fn mark_blob_deleted(&self, path: &str) -> Result<bool> {
    let path = path.to_owned();
    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute("UPDATE pkm_files SET deleted = 1 WHERE filepath = ?1", [path])?)
      })
      .await?;
    Ok(changed > 0)
  }

  pub async fn get_blob(&self, path: &str) -> Result<Option<BlobRecord>> {
    let path = path.to_owned();
    let sql = format!("SELECT {BLOB_COLUMNS} FROM pkm_files WHERE filepath = ?1");
    Ok(
      self
        .conn
        .call(move |conn| Ok(conn.query_row(&sql, [path], blob_from_row).optional()?))
        .await?,
    )
  }

  pub async fn all_blobs(&self) -> Result<Vec<BlobRecord>> {
    let sql = format!("SELECT {BLOB_COLUMNS} FROM pkm_files");
    Ok(
      self
        .conn
        .call(move |conn| {
          let mut stmt = conn.prepare(&sql)?;
          let rows = stmt
            .query_map([], blob_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
          Ok(rows)
        })
        .await?,
    )
  }

  /// Paths of every blob that loaded without error.
  pub async fn enabled_blob_paths(&self) -> Result<Vec<String>> {
    Ok(
      self
        .conn
        .call(|conn| {
          let mut stmt = conn.prepare("SELECT filepath FROM pkm_files WHERE error IS NULL")?;
          let rows = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
          Ok(rows)
        })
        .await?,
    )
  }

  /// Apply every pending blob intent to the filesystem under `root`.
  ///
  /// Deletions run first and their rows are removed from the store before
  /// anything else happens; then updated payloads are written. Finally every
  /// surviving row drops its bytes and is marked `NOT_LOADED` with both flags
  /// cleared.
  pub async fn flush_blobs(&self, root: &Path) -> Result<FlushReport> {
    let mut report = FlushReport::default();

    let to_delete: Vec<String> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare("SELECT filepath FROM pkm_files WHERE deleted = 1")?;
        let rows = stmt
          .query_map([], |row| row.get(0))?
          .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(rows)
      })
      .await?;

    for path in &to_delete {
      match tokio::fs::remove_file(root.join(path)).await {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
      }
      report.deleted += 1;
    }

    self
      .conn
      .call(|conn| {
        conn.execute("DELETE FROM pkm_files WHERE deleted = 1", [])?;
        Ok(())
      })
      .await?;

    let to_write: Vec<(String, Vec<u8>)> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT filepath, data FROM pkm_files WHERE updated = 1 AND deleted = 0",
        )?;
        let rows = stmt
          .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    for (path, data) in &to_write {
      let target = root.join(path);
      if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
      }
      tokio::fs::write(&target, data).await?;
      report.written += 1;
    }

    let not_loaded = encode_load_error(Some(LoadError::NotLoaded));
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE pkm_files SET data = x'', error = ?1, updated = 0, deleted = 0",
          [not_loaded],
        )?;
        Ok(())
      })
      .await?;

    tracing::info!(deleted = report.deleted, written = report.written, "flushed blobs");
    Ok(report)
  }

  /// Re-read every tracked blob from disk under `root`.
  ///
  /// Each row gets fresh bytes and an error tag: `check_size` can reject a
  /// file by length, and read failures map to `NOT_FOUND`, `UNAUTHORIZED`
  /// or `UNKNOWN`. Both intent flags are cleared. Returns how many rows
  /// loaded cleanly.
  pub async fn hydrate_blobs(
    &self,
    root:       &Path,
    check_size: impl Fn(u64) -> Option<LoadError> + Send + Sync,
  ) -> Result<usize> {
    let paths: Vec<String> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare("SELECT filepath FROM pkm_files")?;
        let rows = stmt
          .query_map([], |row| row.get(0))?
          .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(rows)
      })
      .await?;

    let mut rows = Vec::with_capacity(paths.len());
    let mut loaded = 0;
    for path in paths {
      let (data, error) = match read_checked(&root.join(&path), &check_size).await {
        Ok(data) => {
          loaded += 1;
          (data, None)
        }
        Err(error) => {
          tracing::warn!(path = %path, %error, "blob failed to load");
          (Vec::new(), Some(error))
        }
      };
      rows.push((path, data, encode_load_error(error)));
    }

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        {
          let mut stmt = tx.prepare(
            "UPDATE pkm_files SET data = ?2, error = ?3, updated = 0, deleted = 0
             WHERE filepath = ?1",
          )?;
          for (path, data, error) in rows {
            stmt.execute(rusqlite::params![path, data, error])?;
          }
        }
        tx.commit()?;
        Ok(())
      })
      .await?;

    Ok(loaded)
  }
}

async fn read_checked(
  path:       &Path,
  check_size: &(impl Fn(u64) -> Option<LoadError> + Sync),
) -> std::result::Result<Vec<u8>, LoadError> {
  let io_tag = |e: io::Error| FormatError::Io(e).load_error();

  let meta = tokio::fs::metadata(path).await.map_err(io_tag)?;
  if let Some(error) = check_size(meta.len()) {
    return Err(error);
  }
  tokio::fs::read(path).await.map_err(io_tag)
}
