//! Subcommand implementations. Every mutating command runs guarded: a
//! backup is taken first and restored if the command fails.

use std::{future::Future, path::PathBuf};

use anyhow::{Context as _, Result, bail};
use chrono::{DateTime, Utc};
use pkvault_core::{
  action::ActionKind,
  format::FormatHint,
  storage::{Bank, PkmVariant, StorageBox},
};
use pkvault_session::{
  BackupEngine, GuardedError, SessionManager, backup::parse_backup_file_name,
};

// ─── Read-only ────────────────────────────────────────────────────────────────

pub async fn status(session: &SessionManager) -> Result<()> {
  session
    .ensure_session_created(None)
    .await
    .context("failed to start session")?;

  let banks = session.repository::<Bank>().count().await?;
  let boxes = session.repository::<StorageBox>().count().await?;
  let variants = session.repository::<PkmVariant>().count().await?;

  println!("session:          {:?}", session.status());
  if let Some(started) = session.start_time() {
    println!("started:          {}", started.to_rfc3339());
  }
  println!("persistent store: {}", session.has_persistent_store());
  println!("language:         {}", session.settings().safe_language());
  println!("banks:            {banks}");
  println!("boxes:            {boxes}");
  println!("variants:         {variants}");
  println!("saves:            {}", session.saves().saves().len());

  let actions = session.pending_actions();
  if actions.is_empty() {
    println!("pending actions:  none");
  } else {
    println!("pending actions:");
    for action in actions {
      println!("  {} {:?}: {}", action.at.to_rfc3339(), action.kind, action.description);
    }
  }
  Ok(())
}

// ─── Backups ──────────────────────────────────────────────────────────────────

pub async fn backup_create(backups: &BackupEngine) -> Result<()> {
  let created_at = backups.create().await.context("backup failed")?;
  println!("{}", created_at.to_rfc3339());
  Ok(())
}

pub async fn backup_list(backups: &BackupEngine) -> Result<()> {
  for record in backups.list().await? {
    println!("{}  {}", record.created_at.to_rfc3339(), record.path.display());
  }
  Ok(())
}

pub async fn backup_delete(backups: &BackupEngine, timestamp: &str) -> Result<()> {
  let created_at = parse_timestamp(timestamp)?;
  if !backups.delete(created_at).await? {
    tracing::warn!(%created_at, "no such backup");
  }
  Ok(())
}

pub async fn backup_restore(backups: &BackupEngine, timestamp: &str, safe: bool) -> Result<()> {
  let created_at = parse_timestamp(timestamp)?;
  backups
    .restore(created_at, safe)
    .await
    .with_context(|| format!("failed to restore backup {}", created_at.to_rfc3339()))?;
  println!("restored {}", created_at.to_rfc3339());
  Ok(())
}

// ─── Mutations ────────────────────────────────────────────────────────────────

pub async fn import(
  backups:    &BackupEngine,
  file:       PathBuf,
  box_id:     String,
  slot:       i64,
  generation: u8,
) -> Result<()> {
  let data = tokio::fs::read(&file)
    .await
    .with_context(|| format!("failed to read {}", file.display()))?;
  let session = backups.session().clone();
  let hint = FormatHint::from_path(&file.to_string_lossy(), generation);
  let entity = session
    .format()
    .parse(&data, &hint)
    .with_context(|| format!("{} is not a usable entity", file.display()))?;

  let id = guarded(backups, "import", || async move {
    if session.repository::<StorageBox>().get(&box_id).await?.is_none() {
      bail!("no box with id {box_id}");
    }
    let variant = PkmVariant {
      id: session.format().identity(&entity),
      box_id,
      box_slot: slot,
      is_main: true,
      attached_save_id: None,
      attached_save_pkm_id_base: None,
      generation: entity.generation,
      filepath: session.blobs().entity_path(&entity),
    };
    let variant = session
      .repository::<PkmVariant>()
      .add_variant(variant, &entity)
      .await?;
    session.record_action(ActionKind::Mutation, format!("import variant {}", variant.id));
    session.persist().await?;
    Ok(variant.id)
  })
  .await?;

  println!("imported {id}");
  Ok(())
}

pub async fn remove(backups: &BackupEngine, id: String) -> Result<()> {
  let session = backups.session().clone();
  guarded(backups, "remove", || async move {
    let variants = session.repository::<PkmVariant>();
    if variants.get(&id).await?.is_none() {
      bail!("no variant with id {id}");
    }
    variants.delete_variant(&id).await?;
    session.record_action(ActionKind::Mutation, format!("remove variant {id}"));
    session.persist().await?;
    Ok(())
  })
  .await
}

pub async fn persist(backups: &BackupEngine) -> Result<()> {
  let session = backups.session().clone();
  guarded(backups, "persist", || async move {
    session.ensure_session_created(None).await?;
    session.persist().await?;
    Ok(())
  })
  .await
}

/// Run `action` under [`BackupEngine::run_guarded`]. A failed rollback leaves
/// persistent state unknown, so the process stops there.
async fn guarded<T, F, Fut>(backups: &BackupEngine, label: &str, action: F) -> Result<T>
where
  F: FnOnce() -> Fut,
  Fut: Future<Output = Result<T>>,
{
  match backups.run_guarded(action).await {
    Ok(value) => Ok(value),
    Err(GuardedError::Backup(e)) => {
      Err(anyhow::Error::new(e).context(format!("{label}: backup before running failed")))
    }
    Err(GuardedError::Action(e)) => Err(e.context(format!("{label} failed, state restored"))),
    Err(GuardedError::Fatal { action, restore }) => {
      tracing::error!(error = %action, %restore, "{label} failed and restore failed");
      eprintln!("fatal: {label} failed ({action:#}) and the restore failed ({restore})");
      std::process::exit(2);
    }
  }
}

/// Accept either an RFC 3339 timestamp or a backup archive name.
fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
  let name = raw.rsplit(['/', '\\']).next().unwrap_or(raw);
  if let Some(created_at) = parse_backup_file_name(name) {
    return Ok(created_at);
  }
  let parsed = DateTime::parse_from_rfc3339(raw)
    .with_context(|| format!("{raw:?} is neither a timestamp nor a backup file name"))?;
  Ok(parsed.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone as _;

  use super::*;

  #[test]
  fn timestamps_parse_from_either_form() {
    let expected = Utc.with_ymd_and_hms(2025, 3, 9, 7, 5, 1).unwrap()
      + chrono::TimeDelta::milliseconds(42);

    assert_eq!(parse_timestamp("2025-03-09T07:05:01.042Z").unwrap(), expected);
    assert_eq!(
      parse_timestamp("backup/pkvault_backup_2025-03-09T070501-042Z.zip").unwrap(),
      expected
    );
    assert!(parse_timestamp("yesterday").is_err());
  }
}
