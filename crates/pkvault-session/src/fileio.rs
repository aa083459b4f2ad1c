//! Small filesystem helpers shared by the session and backup code.

use std::{
  io,
  path::{Path, PathBuf},
};

/// Remove `path`, treating absence as success. Returns whether a file was
/// actually removed.
pub async fn remove_if_exists(path: &Path) -> io::Result<bool> {
  match tokio::fs::remove_file(path).await {
    Ok(()) => Ok(true),
    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
    Err(e) => Err(e),
  }
}

/// Remove an SQLite database file together with its journal side files.
pub async fn remove_database(path: &Path) -> io::Result<()> {
  remove_if_exists(path).await?;
  for suffix in ["-journal", "-wal", "-shm"] {
    remove_if_exists(&with_suffix(path, suffix)).await?;
  }
  Ok(())
}

/// Read `path`, returning `None` when it does not exist.
pub async fn read_if_exists(path: &Path) -> io::Result<Option<Vec<u8>>> {
  match tokio::fs::read(path).await {
    Ok(data) => Ok(Some(data)),
    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
    Err(e) => Err(e),
  }
}

/// Write `data` to `path`, creating parent directories as needed.
pub async fn write_creating_dirs(path: &Path, data: &[u8]) -> io::Result<()> {
  if let Some(parent) = path.parent() {
    tokio::fs::create_dir_all(parent).await?;
  }
  tokio::fs::write(path, data).await
}

/// Render `path` with forward slashes only.
pub fn normalize_slashes(path: &Path) -> String {
  path.to_string_lossy().replace('\\', "/")
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
  let mut name = path.as_os_str().to_owned();
  name.push(suffix);
  PathBuf::from(name)
}
