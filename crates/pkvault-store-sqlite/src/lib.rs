//! SQLite backend for the PKVault working store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. The session layer decides which file
//! this store points at; nothing here knows about working or persistent
//! copies.

mod blob;
mod encode;
mod store;

pub mod error;
pub mod schema;

pub use error::{Error, Result};
pub use schema::{MIGRATIONS, Migration};
pub use store::{Record, SqliteStore};

#[cfg(test)]
mod tests;
