//! [`BackupEngine`]: full-state snapshots in a single zip archive.
//!
//! An archive holds the persistent store, any legacy flat files, every loaded
//! save and every enabled blob. Its first entry, `_paths.json`, maps each
//! other entry to the absolute path it restores to. Entry names are flat:
//! the target's file name, suffixed with a hash of the full target path when
//! two targets share a name.

use std::{
  collections::{BTreeMap, HashMap, HashSet},
  io::{Read as _, Write as _},
  path::{Path, PathBuf},
  sync::Arc,
};

use chrono::{DateTime, NaiveDateTime, SubsecRound as _, TimeDelta, Utc};
use sha2::{Digest, Sha256};
use zip::{CompressionMethod, ZipArchive, ZipWriter, result::ZipError, write::SimpleFileOptions};

use crate::{Error, Result, fileio, log_time::Timer, session::SessionManager};

pub const MANIFEST_ENTRY: &str = "_paths.json";

const FILE_PREFIX: &str = "pkvault_backup_";
const FILE_SUFFIX: &str = ".zip";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H%M%S-%3fZ";

// ─── File names ──────────────────────────────────────────────────────────────

/// A backup archive found in the backup directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupRecord {
  pub created_at: DateTime<Utc>,
  pub path:       PathBuf,
}

/// `pkvault_backup_<yyyy-MM-ddTHHmmss-fffZ>.zip`
pub fn backup_file_name(created_at: DateTime<Utc>) -> String {
  format!("{FILE_PREFIX}{}{FILE_SUFFIX}", created_at.format(TIMESTAMP_FORMAT))
}

/// Inverse of [`backup_file_name`] for millisecond-precision timestamps.
pub fn parse_backup_file_name(name: &str) -> Option<DateTime<Utc>> {
  let stamp = name.strip_prefix(FILE_PREFIX)?.strip_suffix(FILE_SUFFIX)?;
  NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT)
    .ok()
    .map(|t| t.and_utc())
}

// ─── Manifest ────────────────────────────────────────────────────────────────

/// Archive entry names for `targets`, index-aligned. Names are unique and
/// never collide with the manifest entry.
pub fn assign_entry_names(targets: &[PathBuf]) -> Vec<String> {
  let mut seen: HashMap<String, usize> = HashMap::new();
  for target in targets {
    *seen.entry(file_name(target)).or_default() += 1;
  }

  let mut used: HashSet<String> = HashSet::from([MANIFEST_ENTRY.to_owned()]);
  targets
    .iter()
    .map(|target| {
      let plain = file_name(target);
      let digest = hex::encode(Sha256::digest(fileio::normalize_slashes(target).as_bytes()));
      let short = with_stem_suffix(&plain, &digest[..16]);
      let full = with_stem_suffix(&plain, &digest);

      let mut candidates = Vec::with_capacity(3);
      if seen.get(&plain) == Some(&1) {
        candidates.push(plain);
      }
      candidates.push(short);
      candidates.push(full.clone());

      let name = candidates
        .into_iter()
        .find(|c| !used.contains(c))
        .unwrap_or_else(|| {
          let mut i = 1;
          loop {
            let candidate = format!("{full}.{i}");
            if !used.contains(&candidate) {
              break candidate;
            }
            i += 1;
          }
        });
      used.insert(name.clone());
      name
    })
    .collect()
}

fn file_name(path: &Path) -> String {
  path
    .file_name()
    .map(|n| n.to_string_lossy().into_owned())
    .unwrap_or_else(|| "file".to_owned())
}

/// `name.ext` → `name_<suffix>.ext`
fn with_stem_suffix(name: &str, suffix: &str) -> String {
  match name.rsplit_once('.') {
    Some((stem, ext)) if !stem.is_empty() => format!("{stem}_{suffix}.{ext}"),
    _ => format!("{name}_{suffix}"),
  }
}

// ─── Engine ──────────────────────────────────────────────────────────────────

/// Creates, lists, deletes and restores backups. Every operation that
/// touches archives or restores state runs under one lock.
#[derive(Clone)]
pub struct BackupEngine {
  pub(crate) session: SessionManager,
  pub(crate) lock:    Arc<tokio::sync::Mutex<()>>,
}

impl BackupEngine {
  pub fn new(session: SessionManager) -> Self {
    Self { session, lock: Arc::new(tokio::sync::Mutex::new(())) }
  }

  pub fn session(&self) -> &SessionManager { &self.session }

  /// Snapshot the current persistent state. Returns the timestamp that
  /// names the archive.
  pub async fn create(&self) -> Result<DateTime<Utc>> {
    let _lock = self.lock.lock().await;
    self.create_locked().await
  }

  /// Every parseable backup in the backup directory, newest first.
  pub async fn list(&self) -> Result<Vec<BackupRecord>> {
    let dir = self.session.settings().backup_dir();
    if !tokio::fs::try_exists(&dir).await? {
      return Ok(Vec::new());
    }

    let mut records = Vec::new();
    let mut entries = tokio::fs::read_dir(&dir).await?;
    while let Some(entry) = entries.next_entry().await? {
      let name = entry.file_name();
      let Some(name) = name.to_str() else { continue };
      match parse_backup_file_name(name) {
        Some(created_at) => records.push(BackupRecord { created_at, path: entry.path() }),
        None if name.ends_with(FILE_SUFFIX) => {
          tracing::debug!(file = name, "ignoring unrecognised archive");
        }
        None => {}
      }
    }

    records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(records)
  }

  /// Remove the archive for `created_at`. Returns whether one existed.
  pub async fn delete(&self, created_at: DateTime<Utc>) -> Result<bool> {
    let _lock = self.lock.lock().await;
    let path = self.archive_path(created_at);
    let removed = fileio::remove_if_exists(&path).await?;
    if removed {
      tracing::info!(path = %path.display(), "backup deleted");
    }
    Ok(removed)
  }

  /// Replace the persistent state with the archive for `created_at`, then
  /// start a new session on it.
  ///
  /// With `with_safe_backup`, the current state is snapshotted first. The
  /// persistent store and legacy files are removed before extraction so
  /// nothing outside the archive survives.
  pub async fn restore(&self, created_at: DateTime<Utc>, with_safe_backup: bool) -> Result<()> {
    let _lock = self.lock.lock().await;
    self.restore_locked(created_at, with_safe_backup).await
  }

  fn archive_path(&self, created_at: DateTime<Utc>) -> PathBuf {
    self.session.settings().backup_dir().join(backup_file_name(created_at))
  }

  pub(crate) async fn create_locked(&self) -> Result<DateTime<Utc>> {
    let _timer = Timer::start("Create backup");
    let settings = self.session.settings();

    let dir = settings.backup_dir();
    tokio::fs::create_dir_all(&dir).await?;
    let mut created_at = Utc::now().trunc_subsecs(3);
    while tokio::fs::try_exists(dir.join(backup_file_name(created_at))).await? {
      created_at += TimeDelta::milliseconds(1);
    }

    let files = self.collect_files().await?;
    let targets: Vec<PathBuf> = files.keys().cloned().collect();
    let names = assign_entry_names(&targets);

    let manifest: BTreeMap<String, String> = names
      .iter()
      .zip(&targets)
      .map(|(name, target)| (name.clone(), fileio::normalize_slashes(target)))
      .collect();
    let manifest = serde_json::to_vec(&manifest)?;
    let entries: Vec<(String, Vec<u8>)> = names.into_iter().zip(files.into_values()).collect();

    let path = dir.join(backup_file_name(created_at));
    let count = entries.len();
    let target = path.clone();
    tokio::task::spawn_blocking(move || write_archive(&target, &manifest, &entries)).await??;

    tracing::info!(path = %path.display(), files = count, "backup created");
    Ok(created_at)
  }

  /// Absolute path → bytes for everything a backup covers.
  async fn collect_files(&self) -> Result<BTreeMap<PathBuf, Vec<u8>>> {
    // Saves load and a first run commits during bootstrap; both must happen
    // before anything is read.
    self.session.ensure_session_created(None).await?;

    let settings = self.session.settings();
    let mut files = BTreeMap::new();

    let step = Timer::start("Create backup - DB");
    let mut db_paths = vec![settings.main_db_path()];
    db_paths.extend(settings.legacy_paths());
    for path in db_paths {
      if let Some(data) = fileio::read_if_exists(&path).await? {
        files.insert(path, data);
      }
    }
    drop(step);

    let step = Timer::start("Create backup - Saves");
    for save in self.session.saves().saves().into_values() {
      files.insert(save.path, save.data);
    }
    drop(step);

    let step = Timer::start("Create backup - Storage");
    for path in self.session.blobs().enabled_paths().await? {
      match fileio::read_if_exists(&path).await? {
        Some(data) => {
          files.insert(path, data);
        }
        None => tracing::warn!(path = %path.display(), "enabled blob missing on disk"),
      }
    }
    drop(step);

    Ok(files)
  }

  pub(crate) async fn restore_locked(
    &self,
    created_at:       DateTime<Utc>,
    with_safe_backup: bool,
  ) -> Result<()> {
    let path = self.archive_path(created_at);
    if !tokio::fs::try_exists(&path).await? {
      return Err(Error::BackupNotFound(created_at));
    }
    tracing::info!(path = %path.display(), "restoring backup");
    let _timer = Timer::start("Backup restore");

    let source = path.clone();
    let (manifest, entries) = tokio::task::spawn_blocking(move || read_archive(&source)).await??;

    if with_safe_backup {
      self.create_locked().await?;
    }

    let settings = self.session.settings();
    let guard = self.session.lock().await;
    self.session.discard_locked(&guard).await;

    fileio::remove_database(&settings.main_db_path()).await?;
    for legacy in settings.legacy_paths() {
      fileio::remove_if_exists(&legacy).await?;
    }

    let step = Timer::start(format!("Extracting {} files", entries.len()));
    for (name, data) in entries {
      if let Some(target) = manifest.get(&name) {
        fileio::write_creating_dirs(Path::new(target), &data).await?;
      }
    }
    drop(step);

    self.session.saves().invalidate();
    self.session.start_locked(&guard, true).await
  }
}

// ─── Archive I/O ─────────────────────────────────────────────────────────────

fn write_archive(path: &Path, manifest: &[u8], entries: &[(String, Vec<u8>)]) -> Result<()> {
  let partial = path.with_extension("zip.partial");
  let mut zip = ZipWriter::new(std::fs::File::create(&partial)?);
  let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

  zip.start_file(MANIFEST_ENTRY, options)?;
  zip.write_all(manifest)?;
  for (name, data) in entries {
    zip.start_file(name.as_str(), options)?;
    zip.write_all(data)?;
  }
  zip.finish()?;

  std::fs::rename(&partial, path)?;
  Ok(())
}

type ArchiveContents = (BTreeMap<String, String>, Vec<(String, Vec<u8>)>);

/// The manifest and every entry the manifest names.
fn read_archive(path: &Path) -> Result<ArchiveContents> {
  let mut archive = ZipArchive::new(std::fs::File::open(path)?)?;

  let manifest: BTreeMap<String, String> = match archive.by_name(MANIFEST_ENTRY) {
    Ok(mut entry) => {
      let mut buf = Vec::new();
      entry.read_to_end(&mut buf)?;
      serde_json::from_slice(&buf)?
    }
    Err(ZipError::FileNotFound) => return Err(Error::ManifestMissing(path.to_path_buf())),
    Err(e) => return Err(e.into()),
  };

  let mut entries = Vec::with_capacity(manifest.len());
  for i in 0..archive.len() {
    let mut entry = archive.by_index(i)?;
    let name = entry.name().to_owned();
    if !manifest.contains_key(&name) {
      continue;
    }
    let mut data = Vec::new();
    entry.read_to_end(&mut data)?;
    entries.push((name, data));
  }
  Ok((manifest, entries))
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone as _;

  use super::*;

  #[test]
  fn file_name_round_trips_at_millisecond_precision() {
    let ts = Utc.with_ymd_and_hms(2025, 3, 9, 7, 5, 1).unwrap() + TimeDelta::milliseconds(42);
    let name = backup_file_name(ts);

    assert_eq!(name, "pkvault_backup_2025-03-09T070501-042Z.zip");
    assert_eq!(parse_backup_file_name(&name), Some(ts));
  }

  #[test]
  fn foreign_names_do_not_parse() {
    assert_eq!(parse_backup_file_name("notes.zip"), None);
    assert_eq!(parse_backup_file_name("pkvault_backup_yesterday.zip"), None);
    assert_eq!(parse_backup_file_name("pkvault_backup_2025-03-09T070501-042Z.zip.partial"), None);
  }

  #[test]
  fn unique_names_stay_plain() {
    let names = assign_entry_names(&[
      PathBuf::from("/data/db/pkvault.db"),
      PathBuf::from("/saves/main.sav"),
    ]);
    assert_eq!(names, vec!["pkvault.db", "main.sav"]);
  }

  #[test]
  fn shared_names_get_distinct_suffixes() {
    let names = assign_entry_names(&[
      PathBuf::from("/a/x_123.pk3"),
      PathBuf::from("/b/x_123.pk3"),
    ]);

    assert_ne!(names[0], names[1]);
    for name in &names {
      assert!(name.starts_with("x_123_"));
      assert!(name.ends_with(".pk3"));
    }
  }

  #[test]
  fn manifest_name_is_reserved() {
    let names = assign_entry_names(&[PathBuf::from("/odd/_paths.json")]);
    assert_ne!(names[0], MANIFEST_ENTRY);
    assert!(names[0].starts_with("_paths_"));
  }

  #[test]
  fn suffix_goes_before_the_extension() {
    assert_eq!(with_stem_suffix("a.sav", "ff"), "a_ff.sav");
    assert_eq!(with_stem_suffix("noext", "ff"), "noext_ff");
    assert_eq!(with_stem_suffix(".hidden", "ff"), ".hidden_ff");
  }
}
