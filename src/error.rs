//! Error type for every fallible operation in the crate.

use serde_json::Value;
use thiserror::Error;

use crate::types::FailureKind;

/// Failure of a rebuild run or of one of its building blocks.
#[derive(Debug, Error)]
pub enum RewireError {
  /// A command did not come back tagged `success`. Carries the raw response for diagnosis.
  #[error("{context} failed ({kind}): {raw}")]
  CommandFailed {
    context: String,
    command: String,
    kind: FailureKind,
    raw: Value,
  },

  /// A success payload lacks a field the caller needs.
  #[error("{context} failed: response has no '{field}': {raw}")]
  MissingField {
    context: String,
    field: String,
    raw: Value,
  },

  #[error("invalid rebuild plan: {0}")]
  InvalidPlan(String),

  #[error("no node handle recorded for '{0}' in this run")]
  UnknownHandle(String),

  #[error("node handle for '{0}' already recorded in this run")]
  DuplicateHandle(String),

  #[error(transparent)]
  Io(#[from] std::io::Error),

  #[error(transparent)]
  Json(#[from] serde_json::Error),
}

impl RewireError {
  /// Name of the host command behind this error, if it came from one.
  pub fn command(&self) -> Option<&str> {
    match self {
      RewireError::CommandFailed { command, .. } => Some(command),
      _ => None,
    }
  }
}
