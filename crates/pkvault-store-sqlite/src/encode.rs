//! Encoding and decoding between domain types and SQLite columns.
//!
//! Booleans are stored as 0/1 integers, enums as their lowercase or
//! SCREAMING_SNAKE_CASE names, and structured fields (bank views) as compact
//! JSON.

use std::str::FromStr;

use pkvault_core::{
  blob::{BlobRecord, LoadError},
  storage::{Bank, BankView, BoxKind, PkmVariant, StorageBox},
};
use rusqlite::{
  Row,
  types::{Type, Value},
};

use crate::{Result, store::Record};

fn conversion_error(
  idx: usize,
  err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
  rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn text(s: &str) -> Value { Value::Text(s.to_owned()) }

fn int(v: impl Into<i64>) -> Value { Value::Integer(v.into()) }

fn opt_text(s: Option<&str>) -> Value { s.map_or(Value::Null, text) }

// ─── LoadError ───────────────────────────────────────────────────────────────

pub fn encode_load_error(e: Option<LoadError>) -> Option<String> {
  e.map(|e| e.to_string())
}

pub fn decode_load_error(idx: usize, s: Option<String>) -> rusqlite::Result<Option<LoadError>> {
  s.map(|s| LoadError::from_str(&s).map_err(|e| conversion_error(idx, e)))
    .transpose()
}

// ─── Blob rows ───────────────────────────────────────────────────────────────

pub const BLOB_COLUMNS: &str = "filepath, data, error, updated, deleted";

pub fn blob_from_row(row: &Row<'_>) -> rusqlite::Result<BlobRecord> {
  Ok(BlobRecord {
    path:    row.get(0)?,
    data:    row.get(1)?,
    error:   decode_load_error(2, row.get(2)?)?,
    updated: row.get(3)?,
    deleted: row.get(4)?,
  })
}

// ─── Banks ───────────────────────────────────────────────────────────────────

impl Record for Bank {
  const TABLE: &'static str = "banks";
  const COLUMNS: &'static [&'static str] =
    &["id", "id_int", "name", "is_default", "sort_order", "view_json"];

  fn id(&self) -> &str { &self.id }

  fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    let view_json: String = row.get(5)?;
    let view: BankView =
      serde_json::from_str(&view_json).map_err(|e| conversion_error(5, e))?;
    Ok(Self {
      id:         row.get(0)?,
      id_int:     row.get(1)?,
      name:       row.get(2)?,
      is_default: row.get(3)?,
      order:      row.get(4)?,
      view,
    })
  }

  fn to_values(&self) -> Result<Vec<Value>> {
    Ok(vec![
      text(&self.id),
      int(self.id_int),
      text(&self.name),
      int(self.is_default),
      int(self.order),
      Value::Text(serde_json::to_string(&self.view)?),
    ])
  }
}

// ─── Boxes ───────────────────────────────────────────────────────────────────

impl Record for StorageBox {
  const TABLE: &'static str = "boxes";
  const COLUMNS: &'static [&'static str] =
    &["id", "id_int", "name", "kind", "slot_count", "sort_order", "bank_id"];

  fn id(&self) -> &str { &self.id }

  fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    let kind: String = row.get(3)?;
    Ok(Self {
      id:         row.get(0)?,
      id_int:     row.get(1)?,
      name:       row.get(2)?,
      kind:       BoxKind::from_str(&kind).map_err(|e| conversion_error(3, e))?,
      slot_count: row.get(4)?,
      order:      row.get(5)?,
      bank_id:    row.get(6)?,
    })
  }

  fn to_values(&self) -> Result<Vec<Value>> {
    Ok(vec![
      text(&self.id),
      int(self.id_int),
      text(&self.name),
      text(self.kind.as_ref()),
      int(self.slot_count),
      int(self.order),
      text(&self.bank_id),
    ])
  }
}

// ─── Variants ────────────────────────────────────────────────────────────────

impl Record for PkmVariant {
  const TABLE: &'static str = "pkm_variants";
  const COLUMNS: &'static [&'static str] = &[
    "id",
    "box_id",
    "box_slot",
    "is_main",
    "attached_save_id",
    "attached_save_pkm_id_base",
    "generation",
    "filepath",
  ];

  fn id(&self) -> &str { &self.id }

  fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:                        row.get(0)?,
      box_id:                    row.get(1)?,
      box_slot:                  row.get(2)?,
      is_main:                   row.get(3)?,
      attached_save_id:          row.get(4)?,
      attached_save_pkm_id_base: row.get(5)?,
      generation:                row.get(6)?,
      filepath:                  row.get(7)?,
    })
  }

  fn to_values(&self) -> Result<Vec<Value>> {
    Ok(vec![
      text(&self.id),
      text(&self.box_id),
      int(self.box_slot),
      int(self.is_main),
      self.attached_save_id.map_or(Value::Null, int),
      opt_text(self.attached_save_pkm_id_base.as_deref()),
      int(self.generation),
      text(&self.filepath),
    ])
  }
}
