//! Session, backup and recovery engine for PKVault.
//!
//! The [`SessionManager`] owns a working copy of the persistent store; all
//! reads and writes go through session-guarded [`Repository`] and
//! [`BlobStore`] handles. Blob writes are deferred until the session is
//! persisted. The [`BackupEngine`] snapshots the full persistent state and
//! restores it, which [`BackupEngine::run_guarded`] uses in place of a
//! transaction spanning the database and the filesystem.

pub mod backup;
pub mod blob_store;
pub mod error;
pub mod fileio;
pub mod format;
pub mod log_time;
pub mod repository;
pub mod saves;
pub mod session;
pub mod settings;

mod guarded;
mod legacy;

pub use backup::{BackupEngine, BackupRecord};
pub use blob_store::BlobStore;
pub use error::{Error, GuardedError, Result};
pub use format::PassthroughFormat;
pub use repository::{Repository, VariantWithBlob};
pub use saves::FileSaveProvider;
pub use session::{BootstrapToken, SessionManager, SessionStatus};
pub use settings::Settings;
