//! Guarded actions: snapshot, run, restore on failure.

use std::{fmt::Display, future::Future};

use chrono::{DateTime, Utc};

use crate::{BackupEngine, Error, GuardedError, log_time::Timer};

impl BackupEngine {
  /// Run `action` between a backup and, on failure, a restore of that
  /// backup.
  ///
  /// On success, save caches are dropped and a new session is started
  /// without initial actions; a failure there counts as an action failure.
  /// On failure the original error is returned inside
  /// [`GuardedError::Action`] once state has been rolled back.
  ///
  /// `action` must not call back into this engine: the engine lock is held
  /// for the whole run.
  pub async fn run_guarded<T, E, F, Fut>(&self, action: F) -> Result<T, GuardedError<E>>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<Error> + Display,
  {
    let _lock = self.lock.lock().await;
    let snapshot = self.create_locked().await.map_err(GuardedError::Backup)?;

    let timer = Timer::start("Action run with backup fallback");
    let outcome = match action().await {
      Ok(value) => self.after_success().await.map(|()| value).map_err(E::from),
      Err(e) => Err(e),
    };
    drop(timer);

    match outcome {
      Ok(value) => Ok(value),
      Err(action) => Err(self.roll_back(snapshot, action).await),
    }
  }

  async fn after_success(&self) -> Result<(), Error> {
    self.session.saves().invalidate();
    self.session.start_new_session(false).await
  }

  async fn roll_back<E: Display>(&self, snapshot: DateTime<Utc>, action: E) -> GuardedError<E> {
    tracing::error!(error = %action, %snapshot, "guarded action failed, restoring backup");
    match self.restore_locked(snapshot, false).await {
      Ok(()) => GuardedError::Action(action),
      Err(restore) => {
        tracing::error!(error = %restore, "restore after failed action failed");
        GuardedError::Fatal { action, restore }
      }
    }
  }
}
