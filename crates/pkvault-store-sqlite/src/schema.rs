//! Versioned SQL schema for the PKVault store.
//!
//! Each [`Migration`] is gated on `PRAGMA user_version` and applied in its own
//! transaction. The journal stays in the default rollback mode so a closed
//! database is a single self-contained file that can be moved wholesale.

use rusqlite::Connection;

/// One schema step. `version` is the `user_version` after it applies.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
  pub version: u32,
  pub name:    &'static str,
  pub sql:     &'static str,
}

/// Every migration shipped with this build, oldest first.
pub const MIGRATIONS: &[Migration] = &[
  Migration {
    version: 1,
    name:    "initial_storage",
    sql:     "
CREATE TABLE IF NOT EXISTS banks (
    id          TEXT PRIMARY KEY,
    id_int      INTEGER NOT NULL,
    name        TEXT NOT NULL,
    is_default  INTEGER NOT NULL DEFAULT 0,
    sort_order  INTEGER NOT NULL DEFAULT 0,
    view_json   TEXT NOT NULL DEFAULT '{\"mainBoxIds\":[],\"saves\":[]}'
);

CREATE TABLE IF NOT EXISTS boxes (
    id          TEXT PRIMARY KEY,
    id_int      INTEGER NOT NULL,
    name        TEXT NOT NULL,
    kind        TEXT NOT NULL,   -- 'box' | 'party' | 'daycare'
    slot_count  INTEGER NOT NULL,
    sort_order  INTEGER NOT NULL DEFAULT 0,
    bank_id     TEXT NOT NULL REFERENCES banks(id)
);

-- Blob rows. `data` is released (emptied) after every flush and re-read from
-- disk at the next session start.
CREATE TABLE IF NOT EXISTS pkm_files (
    filepath    TEXT PRIMARY KEY,
    data        BLOB NOT NULL,
    error       TEXT,            -- NULL when the payload loaded cleanly
    updated     INTEGER NOT NULL DEFAULT 0,
    deleted     INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS pkm_variants (
    id                         TEXT PRIMARY KEY,
    box_id                     TEXT NOT NULL,
    box_slot                   INTEGER NOT NULL,
    is_main                    INTEGER NOT NULL DEFAULT 0,
    attached_save_id           INTEGER,
    attached_save_pkm_id_base  TEXT,
    generation                 INTEGER NOT NULL,
    filepath                   TEXT NOT NULL
);
",
  },
  Migration {
    version: 2,
    name:    "variant_indexes",
    sql:     "
CREATE INDEX IF NOT EXISTS pkm_variants_box_idx      ON pkm_variants(box_id, box_slot);
CREATE INDEX IF NOT EXISTS pkm_variants_save_idx     ON pkm_variants(attached_save_id);
CREATE INDEX IF NOT EXISTS pkm_variants_filepath_idx ON pkm_variants(filepath);
",
  },
];

pub(crate) fn user_version(conn: &Connection) -> rusqlite::Result<u32> {
  conn.query_row("PRAGMA user_version", [], |row| row.get(0))
}

/// Apply every migration newer than the current `user_version`.
///
/// Callers check for an empty list and for a too-new database first; this
/// only walks the pending steps. Returns the names of the applied steps.
pub(crate) fn apply_pending(
  conn:       &mut Connection,
  migrations: &[Migration],
) -> rusqlite::Result<Vec<&'static str>> {
  let current = user_version(conn)?;
  let mut applied = Vec::new();

  for migration in migrations.iter().filter(|m| m.version > current) {
    let tx = conn.transaction()?;
    tx.execute_batch(migration.sql)?;
    tx.pragma_update(None, "user_version", migration.version)?;
    tx.commit()?;
    applied.push(migration.name);
  }

  Ok(applied)
}

/// Highest version a list of migrations brings a database to.
pub(crate) fn latest_version(migrations: &[Migration]) -> u32 {
  migrations.iter().map(|m| m.version).max().unwrap_or(0)
}
