//! A format library that treats every payload as opaque bytes.

use pkvault_core::{
  blob::LoadError,
  format::{FormatError, FormatHint, FormatLibrary, GameEntity},
};
use sha2::{Digest, Sha256};

/// Smallest payload accepted as a game entity.
pub const MIN_SIZE: u64 = 0x20;
/// Largest payload accepted as a game entity.
pub const MAX_SIZE: u64 = 0x10_0000;

/// Keeps bytes as-is. Identity is the sha256 of the payload; the canonical
/// file name is a prefix of that identity plus a generation extension.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughFormat;

impl FormatLibrary for PassthroughFormat {
  fn parse(&self, bytes: &[u8], hint: &FormatHint) -> Result<GameEntity, FormatError> {
    if let Some(error) = self.check_size(bytes.len() as u64) {
      return Err(FormatError::Unparseable(error));
    }
    Ok(GameEntity::new(hint.generation, bytes.to_vec()))
  }

  fn to_bytes(&self, entity: &GameEntity) -> Vec<u8> { entity.data().to_vec() }

  fn file_name(&self, entity: &GameEntity) -> String {
    let identity = self.identity(entity);
    let short = identity.get(..16).unwrap_or(&identity);
    format!("{short}.pk{}", entity.generation)
  }

  fn identity(&self, entity: &GameEntity) -> String {
    hex::encode(Sha256::digest(entity.data()))
  }

  fn check_size(&self, len: u64) -> Option<LoadError> {
    if len > MAX_SIZE {
      Some(LoadError::TooBig)
    } else if len < MIN_SIZE {
      Some(LoadError::TooSmall)
    } else {
      None
    }
  }
}
