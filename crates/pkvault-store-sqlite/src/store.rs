//! [`SqliteStore`]: generic record access over a single SQLite file.

use std::path::Path;

use rusqlite::{OptionalExtension as _, Row, params_from_iter, types::Value};

use crate::{
  Error, Result,
  schema::{self, Migration},
};

// ─── Record ──────────────────────────────────────────────────────────────────

/// A row type stored in its own table, keyed by a string id.
///
/// `COLUMNS[0]` is the primary key; `to_values` must yield one value per
/// column, in the same order.
pub trait Record: Clone + Send + Sync + 'static {
  const TABLE: &'static str;
  const COLUMNS: &'static [&'static str];

  fn id(&self) -> &str;

  fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;

  fn to_values(&self) -> Result<Vec<Value>>;
}

fn select_sql<R: Record>() -> String {
  format!("SELECT {} FROM {}", R::COLUMNS.join(", "), R::TABLE)
}

fn placeholders(n: usize) -> String {
  (1..=n).map(|i| format!("?{i}")).collect::<Vec<_>>().join(", ")
}

fn insert_sql<R: Record>() -> String {
  format!(
    "INSERT INTO {} ({}) VALUES ({})",
    R::TABLE,
    R::COLUMNS.join(", "),
    placeholders(R::COLUMNS.len()),
  )
}

// Largest id batch bound into a single `IN (...)` clause.
const ID_CHUNK: usize = 500;

// ─── Store ───────────────────────────────────────────────────────────────────

/// A PKVault store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and apply pending `migrations`.
  pub async fn open(
    path:       impl AsRef<Path>,
    migrations: &'static [Migration],
  ) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.migrate(migrations).await?;
    Ok(store)
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory(migrations: &'static [Migration]) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.migrate(migrations).await?;
    Ok(store)
  }

  /// Bring the schema up to the newest migration in `migrations`.
  ///
  /// Fails with [`Error::NoMigrations`] when the list is empty: a build with
  /// no schema at all cannot produce a usable store.
  pub async fn migrate(&self, migrations: &'static [Migration]) -> Result<Vec<&'static str>> {
    if migrations.is_empty() {
      return Err(Error::NoMigrations);
    }

    let supported = schema::latest_version(migrations);
    let found = self.schema_version().await?;
    if found > supported {
      return Err(Error::UnsupportedSchemaVersion { found, supported });
    }

    let applied = self
      .conn
      .call(move |conn| {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(schema::apply_pending(conn, migrations)?)
      })
      .await?;

    tracing::debug!(count = applied.len(), ?applied, "applied schema migrations");
    Ok(applied)
  }

  pub async fn schema_version(&self) -> Result<u32> {
    Ok(self.conn.call(|conn| Ok(schema::user_version(conn)?)).await?)
  }

  /// Close the underlying connection. Every clone of this store becomes
  /// unusable; the file can then be moved or deleted.
  pub async fn close(self) -> Result<()> {
    self.conn.close().await?;
    Ok(())
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  pub async fn all<R: Record>(&self) -> Result<Vec<R>> {
    let sql = select_sql::<R>();
    Ok(
      self
        .conn
        .call(move |conn| {
          let mut stmt = conn.prepare(&sql)?;
          let rows = stmt
            .query_map([], R::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
          Ok(rows)
        })
        .await?,
    )
  }

  pub async fn get<R: Record>(&self, id: &str) -> Result<Option<R>> {
    let sql = format!("{} WHERE {} = ?1", select_sql::<R>(), R::COLUMNS[0]);
    let id = id.to_owned();
    Ok(
      self
        .conn
        .call(move |conn| Ok(conn.query_row(&sql, [id], R::from_row).optional()?))
        .await?,
    )
  }

  /// Fetch several records at once. The result has one slot per requested
  /// id, in request order, with `None` where no record exists.
  pub async fn get_many<R: Record>(&self, ids: &[String]) -> Result<Vec<Option<R>>> {
    if ids.is_empty() {
      return Ok(Vec::new());
    }

    let requested = ids.to_vec();
    let found: Vec<R> = self
      .conn
      .call(move |conn| {
        let mut found = Vec::new();
        for chunk in requested.chunks(ID_CHUNK) {
          let sql = format!(
            "{} WHERE {} IN ({})",
            select_sql::<R>(),
            R::COLUMNS[0],
            placeholders(chunk.len()),
          );
          let mut stmt = conn.prepare(&sql)?;
          let rows = stmt
            .query_map(params_from_iter(chunk.iter()), R::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
          found.extend(rows);
        }
        Ok(found)
      })
      .await?;

    Ok(
      ids
        .iter()
        .map(|id| found.iter().find(|r| r.id() == id).cloned())
        .collect(),
    )
  }

  pub async fn exists_any<R: Record>(&self) -> Result<bool> {
    let sql = format!("SELECT EXISTS (SELECT 1 FROM {})", R::TABLE);
    Ok(
      self
        .conn
        .call(move |conn| Ok(conn.query_row(&sql, [], |row| row.get(0))?))
        .await?,
    )
  }

  pub async fn first<R: Record>(&self) -> Result<Option<R>> {
    let sql = format!("{} LIMIT 1", select_sql::<R>());
    Ok(
      self
        .conn
        .call(move |conn| Ok(conn.query_row(&sql, [], R::from_row).optional()?))
        .await?,
    )
  }

  pub async fn count<R: Record>(&self) -> Result<u64> {
    let sql = format!("SELECT COUNT(*) FROM {}", R::TABLE);
    Ok(
      self
        .conn
        .call(move |conn| Ok(conn.query_row(&sql, [], |row| row.get(0))?))
        .await?,
    )
  }

  // ── Writes ────────────────────────────────────────────────────────────────

  pub async fn insert<R: Record>(&self, record: &R) -> Result<()> {
    let sql = insert_sql::<R>();
    let values = record.to_values()?;
    self
      .conn
      .call(move |conn| {
        conn.execute(&sql, params_from_iter(values))?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Insert every record in one transaction.
  pub async fn insert_many<R: Record>(&self, records: &[R]) -> Result<()> {
    let sql = insert_sql::<R>();
    let rows = records
      .iter()
      .map(R::to_values)
      .collect::<Result<Vec<_>>>()?;

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        {
          let mut stmt = tx.prepare(&sql)?;
          for values in rows {
            stmt.execute(params_from_iter(values))?;
          }
        }
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  pub async fn update<R: Record>(&self, record: &R) -> Result<()> {
    let assignments = R::COLUMNS[1..]
      .iter()
      .enumerate()
      .map(|(i, col)| format!("{col} = ?{}", i + 2))
      .collect::<Vec<_>>()
      .join(", ");
    let sql = format!(
      "UPDATE {} SET {assignments} WHERE {} = ?1",
      R::TABLE,
      R::COLUMNS[0],
    );
    let values = record.to_values()?;

    let changed = self
      .conn
      .call(move |conn| Ok(conn.execute(&sql, params_from_iter(values))?))
      .await?;

    if changed == 0 {
      return Err(Error::RecordNotFound { table: R::TABLE, id: record.id().to_owned() });
    }
    Ok(())
  }

  pub async fn delete<R: Record>(&self, id: &str) -> Result<()> {
    let sql = format!("DELETE FROM {} WHERE {} = ?1", R::TABLE, R::COLUMNS[0]);
    let id_owned = id.to_owned();

    let changed = self
      .conn
      .call(move |conn| Ok(conn.execute(&sql, [id_owned])?))
      .await?;

    if changed == 0 {
      return Err(Error::RecordNotFound { table: R::TABLE, id: id.to_owned() });
    }
    Ok(())
  }
}
