//! [`SessionManager`]: lifecycle of the working copy of the persistent
//! store.
//!
//! A session starts by copying the persistent store to a private working
//! file and migrating that copy. Every read and write goes to the working
//! copy. Persisting flushes deferred blob writes, closes the working copy and
//! moves it over the persistent store in one rename.
//!
//! Readiness is published on a [`watch`] channel so any number of callers
//! can wait for a bootstrap without racing to start their own.

use std::{
  future::Future,
  pin::Pin,
  sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use chrono::{DateTime, Utc};
use pkvault_core::{
  action::{ActionKind, PendingAction},
  format::FormatLibrary,
  save::SaveProvider,
  storage::PkmVariant,
};
use pkvault_store_sqlite::{Migration, Record, SqliteStore};
use tokio::sync::watch;
use uuid::Uuid;

use crate::{
  Error, Result, Settings, blob_store::BlobStore, fileio, legacy, log_time::Timer,
  repository::Repository,
};

// ─── Bootstrap token ─────────────────────────────────────────────────────────

/// Capability handed only to code running inside a session bootstrap. It
/// lets that code reach the working store before the session is ready.
///
/// A token is only honoured while the bootstrap that minted it is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BootstrapToken(Uuid);

impl BootstrapToken {
  pub(crate) fn new() -> Self { Self(Uuid::new_v4()) }
}

// ─── State ───────────────────────────────────────────────────────────────────

/// Observable phase of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
  NoSession,
  Bootstrapping,
  Ready,
  Persisting,
  /// The last bootstrap failed. Nothing can use the store until a new
  /// session is started explicitly.
  Failed,
}

#[derive(Debug, Clone)]
enum Readiness {
  NoSession,
  Bootstrapping,
  Ready,
  Persisting,
  Failed(Arc<Error>),
}

impl Readiness {
  fn status(&self) -> SessionStatus {
    match self {
      Self::NoSession => SessionStatus::NoSession,
      Self::Bootstrapping => SessionStatus::Bootstrapping,
      Self::Ready => SessionStatus::Ready,
      Self::Persisting => SessionStatus::Persisting,
      Self::Failed(_) => SessionStatus::Failed,
    }
  }

  fn is_transient(&self) -> bool { matches!(self, Self::Bootstrapping | Self::Persisting) }
}

#[derive(Default)]
struct SessionState {
  start_time:      Option<DateTime<Utc>>,
  actions:         Vec<PendingAction>,
  bootstrap_token: Option<BootstrapToken>,
  store:           Option<SqliteStore>,
}

struct Inner {
  settings:   Settings,
  migrations: &'static [Migration],
  saves:      Arc<dyn SaveProvider>,
  format:     Arc<dyn FormatLibrary>,
  state:      Mutex<SessionState>,
  readiness:  watch::Sender<Readiness>,
  lifecycle:  tokio::sync::Mutex<()>,
  #[cfg(test)]
  history:    Mutex<Vec<SessionStatus>>,
}

/// Boxed [`SessionManager::ensure_session_created`] future.
pub(crate) type StoreFuture<'a> = Pin<Box<dyn Future<Output = Result<SqliteStore>> + Send + 'a>>;

/// Proof that the caller holds the session lifecycle lock.
pub(crate) struct LifecycleGuard<'a>(#[allow(dead_code)] tokio::sync::MutexGuard<'a, ()>);

// ─── Manager ─────────────────────────────────────────────────────────────────

/// Owner of the working store and of the single live session.
///
/// Cloning is cheap; every clone drives the same session.
#[derive(Clone)]
pub struct SessionManager {
  inner: Arc<Inner>,
}

impl SessionManager {
  pub fn new(
    settings:   Settings,
    migrations: &'static [Migration],
    saves:      Arc<dyn SaveProvider>,
    format:     Arc<dyn FormatLibrary>,
  ) -> Self {
    let (readiness, _) = watch::channel(Readiness::NoSession);
    Self {
      inner: Arc::new(Inner {
        settings,
        migrations,
        saves,
        format,
        state: Mutex::new(SessionState::default()),
        readiness,
        lifecycle: tokio::sync::Mutex::new(()),
        #[cfg(test)]
        history: Mutex::default(),
      }),
    }
  }

  pub fn settings(&self) -> &Settings { &self.inner.settings }

  pub fn saves(&self) -> &Arc<dyn SaveProvider> { &self.inner.saves }

  pub fn format(&self) -> &Arc<dyn FormatLibrary> { &self.inner.format }

  pub fn repository<R: Record>(&self) -> Repository<R> { Repository::new(self.clone()) }

  pub fn blobs(&self) -> BlobStore { BlobStore::new(self.clone()) }

  // ── Queries ───────────────────────────────────────────────────────────────

  pub fn status(&self) -> SessionStatus { self.inner.readiness.borrow().status() }

  pub fn start_time(&self) -> Option<DateTime<Utc>> { self.state().start_time }

  pub fn has_persistent_store(&self) -> bool { self.inner.settings.main_db_path().exists() }

  pub fn pending_actions(&self) -> Vec<PendingAction> { self.state().actions.clone() }

  pub fn has_pending_actions(&self) -> bool { !self.state().actions.is_empty() }

  /// Settings edits are only allowed while nothing is waiting to persist.
  pub fn can_update_settings(&self) -> bool { !self.has_pending_actions() }

  /// Note a mutation applied to the working store but not yet persisted.
  pub fn record_action(&self, kind: ActionKind, description: impl Into<String>) {
    let action = PendingAction::new(kind, description);
    tracing::debug!(kind = ?action.kind, description = %action.description, "pending action");
    self.state().actions.push(action);
  }

  // ── Lifecycle ─────────────────────────────────────────────────────────────

  /// Return the working store, starting a session first if none exists.
  ///
  /// Callers arriving while a session bootstraps or persists wait for it to
  /// settle. A `bypass` token minted by the running bootstrap gets the store
  /// immediately.
  pub async fn ensure_session_created(
    &self,
    bypass: Option<BootstrapToken>,
  ) -> Result<SqliteStore> {
    if let Some(token) = bypass {
      let state = self.state();
      if state.bootstrap_token == Some(token)
        && let Some(store) = &state.store
      {
        return Ok(store.clone());
      }
    }

    loop {
      let readiness = self.inner.readiness.borrow().clone();
      match readiness {
        Readiness::Ready => return self.state().store.clone().ok_or(Error::SessionClosed),
        Readiness::Failed(error) => return Err(Error::Bootstrap(error)),
        Readiness::Bootstrapping | Readiness::Persisting => {
          let mut rx = self.inner.readiness.subscribe();
          rx.wait_for(|r| !r.is_transient())
            .await
            .map_err(|_| Error::SessionClosed)?;
        }
        Readiness::NoSession => {
          let guard = self.lock().await;
          if matches!(*self.inner.readiness.borrow(), Readiness::NoSession) {
            self.start_locked(&guard, true).await?;
          }
        }
      }
    }
  }

  /// Same as [`Self::ensure_session_created`], boxed. Anything a bootstrap
  /// can call reaches the store through here: the bootstrap is itself
  /// awaited inside `ensure_session_created`.
  pub(crate) fn store_for(&self, bypass: Option<BootstrapToken>) -> StoreFuture<'_> {
    Box::pin(self.ensure_session_created(bypass))
  }

  /// Discard any working copy and bootstrap a fresh session from the
  /// persistent store.
  pub async fn start_new_session(&self, check_initial_actions: bool) -> Result<()> {
    let guard = self.lock().await;
    self.start_locked(&guard, check_initial_actions).await
  }

  /// Commit the working store: flush blobs and saves, then replace the
  /// persistent store with the working copy.
  pub async fn persist(&self) -> Result<()> {
    let guard = self.lock().await;
    self.persist_locked(&guard).await
  }

  pub(crate) async fn lock(&self) -> LifecycleGuard<'_> {
    LifecycleGuard(self.inner.lifecycle.lock().await)
  }

  pub(crate) async fn start_locked(
    &self,
    guard: &LifecycleGuard<'_>,
    check_initial_actions: bool,
  ) -> Result<()> {
    let mut check = check_initial_actions;
    loop {
      let _timer = Timer::start("Start new session");
      let token = BootstrapToken::new();
      let previous = {
        let mut state = self.state();
        state.start_time = Some(Utc::now());
        state.actions.clear();
        state.bootstrap_token = Some(token);
        state.store.take()
      };
      self.set_readiness(Readiness::Bootstrapping);
      close_quietly(previous).await;

      let outcome = self.bootstrap(token, check).await;
      self.state().bootstrap_token = None;

      match outcome {
        Ok(false) => {
          self.set_readiness(Readiness::Ready);
          return Ok(());
        }
        Ok(true) => {
          tracing::info!("first run, committing initial data");
          if let Err(e) = self.persist_locked(guard).await {
            return Err(self.fail(e));
          }
          check = false;
        }
        Err(e) => return Err(self.fail(e)),
      }
    }
  }

  pub(crate) async fn persist_locked(&self, _guard: &LifecycleGuard<'_>) -> Result<()> {
    let store = self.state().store.clone().ok_or(Error::SessionClosed)?;
    let _timer = Timer::start("Persist session");
    self.set_readiness(Readiness::Persisting);

    let result = self.commit(store).await;

    self.state().store = None;
    self.set_readiness(Readiness::NoSession);
    if let Err(e) = &result {
      tracing::error!(error = %e, "persist failed, working store discarded");
    }
    result
  }

  /// Close and forget the working store without persisting it.
  pub(crate) async fn discard_locked(&self, _guard: &LifecycleGuard<'_>) {
    let previous = {
      let mut state = self.state();
      state.start_time = None;
      state.actions.clear();
      state.bootstrap_token = None;
      state.store.take()
    };
    self.set_readiness(Readiness::NoSession);
    close_quietly(previous).await;
  }

  // ── Internals ─────────────────────────────────────────────────────────────

  fn state(&self) -> MutexGuard<'_, SessionState> {
    self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn set_readiness(&self, readiness: Readiness) {
    tracing::debug!(status = ?readiness.status(), "session status");
    self.record_status(readiness.status());
    self.inner.readiness.send_replace(readiness);
  }

  #[cfg(test)]
  fn record_status(&self, status: SessionStatus) {
    self.inner.history.lock().unwrap_or_else(PoisonError::into_inner).push(status);
  }

  #[cfg(not(test))]
  fn record_status(&self, _status: SessionStatus) {}

  fn fail(&self, error: Error) -> Error {
    tracing::error!(error = %error, "session bootstrap failed");
    let error = Arc::new(error);
    self.state().store = None;
    self.set_readiness(Readiness::Failed(error.clone()));
    Error::Bootstrap(error)
  }

  /// Returns `true` when this bootstrap turned out to be a first run that
  /// must be committed straight away.
  async fn bootstrap(&self, token: BootstrapToken, check_initial_actions: bool) -> Result<bool> {
    let store = self.reset_working_store().await?;
    self.state().store = Some(store.clone());

    let format = self.inner.format.clone();
    let loaded = store
      .hydrate_blobs(&self.inner.settings.app_dir(), move |len| format.check_size(len))
      .await?;
    tracing::debug!(loaded, "blobs hydrated");

    self.inner.saves.setup().await?;

    if !check_initial_actions {
      return Ok(false);
    }
    self.run_initial_actions(token).await
  }

  async fn reset_working_store(&self) -> Result<SqliteStore> {
    let settings = &self.inner.settings;
    tokio::fs::create_dir_all(settings.db_dir()).await?;

    let working = settings.session_db_path();
    fileio::remove_database(&working).await?;

    let main = settings.main_db_path();
    if tokio::fs::try_exists(&main).await? {
      tokio::fs::copy(&main, &working).await?;
    }

    let _timer = Timer::start("Apply migrations");
    Ok(SqliteStore::open(&working, self.inner.migrations).await?)
  }

  async fn run_initial_actions(&self, token: BootstrapToken) -> Result<bool> {
    let normalized = legacy::normalize_if_needed(self, token).await?;
    if normalized {
      self.record_action(ActionKind::DataNormalize, "normalize stored data");
    }

    for request in self.inner.saves.pending_synchronization() {
      if request.variant_ids.is_empty() {
        continue;
      }
      self.record_action(
        ActionKind::Synchronize,
        format!(
          "synchronize {} variant(s) with save {}",
          request.variant_ids.len(),
          request.save_id
        ),
      );
    }

    if !normalized {
      return Ok(false);
    }

    let has_saves = !self.inner.saves.saves().is_empty();
    let has_variants = Repository::<PkmVariant>::for_bootstrap(self.clone(), token)
      .exists_any()
      .await?;
    Ok(!has_saves && !has_variants)
  }

  async fn commit(&self, store: SqliteStore) -> Result<()> {
    let settings = &self.inner.settings;

    let report = store.flush_blobs(&settings.app_dir()).await?;
    let saves = self.inner.saves.write_dirty().await?;
    self.inner.saves.invalidate();
    tracing::debug!(?report, saves, "deferred writes flushed");

    self.state().actions.clear();
    store.close().await?;
    tokio::fs::rename(settings.session_db_path(), settings.main_db_path()).await?;
    self.state().start_time = None;
    Ok(())
  }
}

async fn close_quietly(store: Option<SqliteStore>) {
  if let Some(store) = store
    && let Err(e) = store.close().await
  {
    tracing::warn!(error = %e, "closing working store failed");
  }
}

#[cfg(test)]
impl SessionManager {
  /// Force a readiness state with a store attached, as a bootstrap would.
  pub(crate) fn simulate_bootstrap(&self, store: SqliteStore, token: Option<BootstrapToken>) {
    {
      let mut state = self.state();
      state.store = Some(store);
      state.bootstrap_token = token;
    }
    self.set_readiness(Readiness::Bootstrapping);
  }

  pub(crate) fn simulate_ready(&self) {
    self.state().bootstrap_token = None;
    self.set_readiness(Readiness::Ready);
  }

  /// Every status published so far, oldest first.
  pub(crate) fn status_history(&self) -> Vec<SessionStatus> {
    self.inner.history.lock().unwrap_or_else(PoisonError::into_inner).clone()
  }
}
