//! Outcome of one command round trip.

use std::fmt;

use serde::Serialize;
use serde_json::{Value, json};

/// Why a command did not produce a success payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
  /// Host answered with `status` other than `"success"`.
  RemoteError,
  /// Peer closed the stream before the buffer decoded as JSON.
  IncompleteResponse,
  /// Connect, send or receive did not finish inside the wait limit.
  Timeout,
  /// Socket-level error (refused connection, reset, ...).
  IoError,
  /// Response decoded but is not a JSON object.
  MalformedResponse,
}

impl fmt::Display for FailureKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      FailureKind::RemoteError => write!(f, "remote_error"),
      FailureKind::IncompleteResponse => write!(f, "incomplete_response"),
      FailureKind::Timeout => write!(f, "timeout"),
      FailureKind::IoError => write!(f, "io_error"),
      FailureKind::MalformedResponse => write!(f, "malformed_response"),
    }
  }
}

/// Either a fully decoded success payload or a failure with the raw response.
///
/// For [FailureKind::IncompleteResponse] `raw` is the received text (lossy UTF-8);
/// for [FailureKind::RemoteError] and [FailureKind::MalformedResponse] it is the decoded
/// document; for local failures it is the error message.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandResult {
  Success {
    result: Value,
  },
  Failure {
    command_name: String,
    kind: FailureKind,
    raw: Value,
  },
}

impl CommandResult {
  /// Classifies a decoded host response.
  ///
  /// `{"status":"success"}` without `result` yields an empty object.
  pub fn from_response(command_name: &str, response: Value) -> Self {
    let Some(obj) = response.as_object() else {
      return Self::failure(command_name, FailureKind::MalformedResponse, response);
    };
    if obj.get("status").and_then(Value::as_str) != Some("success") {
      return Self::failure(command_name, FailureKind::RemoteError, response);
    }
    let result = obj
      .get("result")
      .cloned()
      .unwrap_or_else(|| Value::Object(Default::default()));
    Self::Success { result }
  }

  pub fn failure(command_name: impl Into<String>, kind: FailureKind, raw: Value) -> Self {
    Self::Failure {
      command_name: command_name.into(),
      kind,
      raw,
    }
  }

  pub fn is_success(&self) -> bool {
    matches!(self, Self::Success { .. })
  }

  /// Wire-shaped view of this result, used when echoing a failure.
  ///
  /// Local failures are rendered as `{"status":"error","error":<kind>,"raw":...}`.
  pub fn to_envelope(&self) -> Value {
    match self {
      Self::Success { result } => json!({ "status": "success", "result": result }),
      Self::Failure { kind, raw, .. } => Self::failure_envelope(*kind, raw.clone()),
    }
  }

  /// Host-sent documents pass through unchanged; local failures get the synthesized shape.
  pub fn failure_envelope(kind: FailureKind, raw: Value) -> Value {
    match kind {
      FailureKind::RemoteError | FailureKind::MalformedResponse => raw,
      _ => json!({
        "status": "error",
        "error": kind.to_string(),
        "raw": raw,
      }),
    }
  }
}
