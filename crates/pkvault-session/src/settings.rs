//! Runtime settings, deserialised from `pkvault.toml` and `PKVAULT_*`
//! environment variables.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::Result;

/// Languages the data layer knows names for.
pub const SUPPORTED_LANGUAGES: &[&str] = &["en", "fr"];

const MAIN_DB_FILE: &str = "pkvault.db";
const SESSION_DB_FILE: &str = "pkvault-session.db";
const LEGACY_FILES: &[&str] =
  &["bank.json", "box.json", "pkm.json", "pkm-version.json", "dex.json"];

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
  /// Base directory for every relative path below.
  pub app_dir:      PathBuf,
  pub db_path:      PathBuf,
  pub storage_path: PathBuf,
  pub backup_path:  PathBuf,
  /// External save files to load on every session start.
  pub save_paths:   Vec<PathBuf>,
  pub language:     Option<String>,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      app_dir:      PathBuf::from("."),
      db_path:      PathBuf::from("db"),
      storage_path: PathBuf::from("storage"),
      backup_path:  PathBuf::from("backup"),
      save_paths:   Vec::new(),
      language:     None,
    }
  }
}

impl Settings {
  /// Load settings from `file` (optional) layered under `PKVAULT_*`
  /// environment variables. `app_dir` defaults to the file's directory.
  pub fn load(file: &Path) -> Result<Self> {
    let default_dir = file
      .parent()
      .filter(|p| !p.as_os_str().is_empty())
      .unwrap_or(Path::new("."))
      .to_string_lossy()
      .into_owned();

    let settings = config::Config::builder()
      .set_default("app_dir", default_dir)?
      .add_source(config::File::from(file).required(false))
      .add_source(
        config::Environment::with_prefix("PKVAULT")
          .try_parsing(true)
          .list_separator(",")
          .with_list_parse_key("save_paths"),
      )
      .build()?;

    Ok(settings.try_deserialize()?)
  }

  /// Default settings rooted at `app_dir`.
  pub fn for_dir(app_dir: impl Into<PathBuf>) -> Self {
    Self { app_dir: app_dir.into(), ..Self::default() }
  }

  pub fn app_dir(&self) -> PathBuf { expand_tilde(&self.app_dir) }

  /// Resolve a configured path against the application directory.
  pub fn resolve(&self, path: &Path) -> PathBuf {
    let path = expand_tilde(path);
    if path.is_absolute() { path } else { self.app_dir().join(path) }
  }

  pub fn db_dir(&self) -> PathBuf { self.resolve(&self.db_path) }

  pub fn storage_dir(&self) -> PathBuf { self.resolve(&self.storage_path) }

  pub fn backup_dir(&self) -> PathBuf { self.resolve(&self.backup_path) }

  pub fn save_files(&self) -> Vec<PathBuf> {
    self.save_paths.iter().map(|p| self.resolve(p)).collect()
  }

  pub fn main_db_path(&self) -> PathBuf { self.db_dir().join(MAIN_DB_FILE) }

  pub fn session_db_path(&self) -> PathBuf { self.db_dir().join(SESSION_DB_FILE) }

  /// Flat files of the pre-database layout, whether or not they exist.
  pub fn legacy_paths(&self) -> Vec<PathBuf> {
    let dir = self.db_dir();
    LEGACY_FILES.iter().map(|f| dir.join(f)).collect()
  }

  pub fn legacy_path(&self, file: &str) -> PathBuf { self.db_dir().join(file) }

  /// Blob path prefix for new entities: the storage path as configured,
  /// forward-slash separated, so blob paths stay relative to `app_dir`
  /// whenever storage lives inside it.
  pub fn storage_prefix(&self) -> String {
    crate::fileio::normalize_slashes(&expand_tilde(&self.storage_path))
  }

  /// The configured language if supported, `en` otherwise.
  pub fn safe_language(&self) -> &str {
    self
      .language
      .as_deref()
      .filter(|l| SUPPORTED_LANGUAGES.contains(l))
      .unwrap_or("en")
  }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn derived_paths_hang_off_the_db_dir() {
    let s = Settings::for_dir("/data/pkvault");
    assert_eq!(s.main_db_path(), PathBuf::from("/data/pkvault/db/pkvault.db"));
    assert_eq!(s.session_db_path(), PathBuf::from("/data/pkvault/db/pkvault-session.db"));
    assert_eq!(s.legacy_paths().len(), 5);
    assert!(s.legacy_paths().contains(&PathBuf::from("/data/pkvault/db/pkm-version.json")));
  }

  #[test]
  fn absolute_paths_are_not_rebased() {
    let s = Settings {
      backup_path: PathBuf::from("/mnt/backups"),
      ..Settings::for_dir("/data")
    };
    assert_eq!(s.backup_dir(), PathBuf::from("/mnt/backups"));
    assert_eq!(s.storage_dir(), PathBuf::from("/data/storage"));
  }

  #[test]
  fn unsupported_language_falls_back() {
    let mut s = Settings::default();
    assert_eq!(s.safe_language(), "en");
    s.language = Some("fr".into());
    assert_eq!(s.safe_language(), "fr");
    s.language = Some("xx".into());
    assert_eq!(s.safe_language(), "en");
  }

  #[test]
  fn load_reads_toml_and_defaults_app_dir() {
    let dir = tempfile::TempDir::new().unwrap();
    let file = dir.path().join("pkvault.toml");
    std::fs::write(&file, "storage_path = \"pkm\"\nlanguage = \"fr\"\n").unwrap();

    let s = Settings::load(&file).unwrap();
    assert_eq!(s.app_dir, dir.path());
    assert_eq!(s.storage_dir(), dir.path().join("pkm"));
    assert_eq!(s.db_dir(), dir.path().join("db"));
    assert_eq!(s.safe_language(), "fr");
  }
}
