//! Pending actions: mutations applied to the working store but not yet
//! persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
  /// Legacy import and/or default seeding performed during bootstrap.
  DataNormalize,
  /// Records reconciled against a loaded save during bootstrap.
  Synchronize,
  /// Any caller-initiated change.
  Mutation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAction {
  pub kind:        ActionKind,
  pub description: String,
  pub at:          DateTime<Utc>,
}

impl PendingAction {
  pub fn new(kind: ActionKind, description: impl Into<String>) -> Self {
    Self { kind, description: description.into(), at: Utc::now() }
  }
}
