//! Storage records: banks, boxes and the entity variants placed in them.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

// ─── Banks ───────────────────────────────────────────────────────────────────

/// Which boxes a bank shows, for the main storage and for each save.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankView {
  pub main_box_ids: Vec<i64>,
  pub saves:        Vec<BankViewSave>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankViewSave {
  pub save_id:      u32,
  pub save_box_ids: Vec<i64>,
  pub order:        i64,
}

/// Top-level container. Exactly one bank is flagged as the default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bank {
  pub id:         String,
  pub id_int:     i64,
  pub name:       String,
  pub is_default: bool,
  pub order:      i64,
  pub view:       BankView,
}

impl Bank {
  /// The bank seeded into an empty store.
  pub fn default_bank() -> Self {
    Self {
      id:         "0".into(),
      id_int:     0,
      name:       "Bank 1".into(),
      is_default: true,
      order:      0,
      view:       BankView::default(),
    }
  }
}

// ─── Boxes ───────────────────────────────────────────────────────────────────

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum BoxKind {
  #[default]
  Box,
  Party,
  Daycare,
}

/// A sub-container of a bank with a fixed number of slots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageBox {
  pub id:         String,
  pub id_int:     i64,
  pub name:       String,
  pub kind:       BoxKind,
  pub slot_count: i64,
  pub order:      i64,
  pub bank_id:    String,
}

impl StorageBox {
  /// The box seeded into an empty store, inside [`Bank::default_bank`].
  pub fn default_box() -> Self {
    Self {
      id:         "0".into(),
      id_int:     0,
      name:       "Box 1".into(),
      kind:       BoxKind::Box,
      slot_count: 30,
      order:      0,
      bank_id:    "0".into(),
    }
  }
}

// ─── Variants ────────────────────────────────────────────────────────────────

/// One stored variant of a game entity. Its serialized form lives in the blob
/// at `filepath`, which this record owns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PkmVariant {
  pub id:                        String,
  pub box_id:                    String,
  pub box_slot:                  i64,
  pub is_main:                   bool,
  pub attached_save_id:          Option<u32>,
  pub attached_save_pkm_id_base: Option<String>,
  pub generation:                u8,
  pub filepath:                  String,
}
