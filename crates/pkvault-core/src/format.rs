//! The format library seam.
//!
//! Parsing and serialising game entities is delegated to an external library.
//! The engine only needs the capabilities in [`FormatLibrary`]; everything
//! about the binary layout stays on the other side of this trait.

use std::io;

use thiserror::Error;

use crate::blob::LoadError;

/// Hints passed alongside raw bytes so the library can pick a decoder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormatHint {
  pub generation: u8,
  /// File extension without the dot, if the blob path has one.
  pub extension:  Option<String>,
}

impl FormatHint {
  pub fn from_path(path: &str, generation: u8) -> Self {
    let extension = path
      .rsplit_once('/')
      .map_or(path, |(_, name)| name)
      .rsplit_once('.')
      .map(|(_, ext)| ext.to_owned());
    Self { generation, extension }
  }
}

/// A structured game entity, opaque to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameEntity {
  pub generation: u8,
  data:           Vec<u8>,
  load_error:     Option<LoadError>,
}

impl GameEntity {
  pub fn new(generation: u8, data: Vec<u8>) -> Self {
    Self { generation, data, load_error: None }
  }

  /// Stand-in for an entity that could not be loaded. It must never be
  /// written back as real content.
  pub fn placeholder(error: LoadError) -> Self {
    Self { generation: 0, data: Vec::new(), load_error: Some(error) }
  }

  pub fn is_enabled(&self) -> bool { self.load_error.is_none() }

  pub fn load_error(&self) -> Option<LoadError> { self.load_error }

  pub fn data(&self) -> &[u8] { &self.data }
}

/// Failure reported by a [`FormatLibrary`].
#[derive(Debug, Error)]
pub enum FormatError {
  /// The library recognised the payload as unusable and says why.
  #[error("unparseable payload: {0}")]
  Unparseable(LoadError),

  #[error("io error: {0}")]
  Io(#[from] io::Error),

  #[error("{0}")]
  Other(String),
}

impl FormatError {
  /// Map any failure to the tag stored on the blob record.
  pub fn load_error(&self) -> LoadError {
    match self {
      Self::Unparseable(error) => *error,
      Self::Io(e) => match e.kind() {
        io::ErrorKind::NotFound => LoadError::NotFound,
        io::ErrorKind::PermissionDenied => LoadError::Unauthorized,
        _ => LoadError::Unknown,
      },
      Self::Other(_) => LoadError::Unknown,
    }
  }
}

/// Capabilities the engine consumes from the format library.
pub trait FormatLibrary: Send + Sync {
  /// Parse raw bytes into an entity.
  fn parse(&self, bytes: &[u8], hint: &FormatHint) -> Result<GameEntity, FormatError>;

  /// Canonical bytes for an enabled entity.
  fn to_bytes(&self, entity: &GameEntity) -> Vec<u8>;

  /// Canonical filename (no directory) for an enabled entity.
  fn file_name(&self, entity: &GameEntity) -> String;

  /// Stable identity key, usable as a record id.
  fn identity(&self, entity: &GameEntity) -> String;

  /// Size-based rejection applied when blobs are read from disk.
  fn check_size(&self, _len: u64) -> Option<LoadError> { None }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn io_errors_map_to_tags() {
    let not_found = FormatError::Io(io::Error::from(io::ErrorKind::NotFound));
    let denied = FormatError::Io(io::Error::from(io::ErrorKind::PermissionDenied));
    let other = FormatError::Io(io::Error::other("boom"));

    assert_eq!(not_found.load_error(), LoadError::NotFound);
    assert_eq!(denied.load_error(), LoadError::Unauthorized);
    assert_eq!(other.load_error(), LoadError::Unknown);
  }

  #[test]
  fn recognised_errors_keep_their_tag() {
    let e = FormatError::Unparseable(LoadError::TooBig);
    assert_eq!(e.load_error(), LoadError::TooBig);
    assert_eq!(FormatError::Other("x".into()).load_error(), LoadError::Unknown);
  }

  #[test]
  fn hint_extension_comes_from_the_file_name() {
    let hint = FormatHint::from_path("storage/3/0025 - PIKACHU.pk3", 3);
    assert_eq!(hint.extension.as_deref(), Some("pk3"));

    let hint = FormatHint::from_path("storage.d/3/raw", 3);
    assert_eq!(hint.extension, None);
  }
}
