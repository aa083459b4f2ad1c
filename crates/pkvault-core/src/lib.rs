//! Core types and collaborator traits for the PKVault storage engine.
//!
//! This crate is deliberately free of database and filesystem dependencies.
//! The store and session crates depend on it; it depends on nothing of theirs.

pub mod action;
pub mod blob;
pub mod error;
pub mod format;
pub mod save;
pub mod storage;

pub use error::{Error, Result};
