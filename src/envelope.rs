//! Success/failure contract over transport results.
//!
//! Every primitive passes its [CommandResult] through [require] immediately, so a
//! failed command can never flow onward as malformed data.

use serde_json::Value;
use tracing::warn;

use crate::error::RewireError;
use crate::types::{CommandResult, NodeHandle};

/// Returns the success payload, or a [RewireError::CommandFailed] naming `context`
/// and embedding the raw response.
pub fn require(result: CommandResult, context: &str) -> Result<Value, RewireError> {
  match result {
    CommandResult::Success { result } => Ok(result),
    CommandResult::Failure {
      command_name,
      kind,
      raw,
    } => {
      let raw = CommandResult::failure_envelope(kind, raw);
      warn!(context = %context, command = %command_name, kind = %kind, "command failed");
      Err(RewireError::CommandFailed {
        context: context.to_string(),
        command: command_name,
        kind,
        raw,
      })
    }
  }
}

/// Reads a required string field from a success payload.
pub fn require_str<'a>(payload: &'a Value, field: &str, context: &str) -> Result<&'a str, RewireError> {
  payload
    .get(field)
    .and_then(Value::as_str)
    .ok_or_else(|| missing(payload, field, context))
}

/// Reads a required node id field from a success payload.
pub fn require_handle(payload: &Value, field: &str, context: &str) -> Result<NodeHandle, RewireError> {
  require_str(payload, field, context).map(NodeHandle::new)
}

/// Reads a count field; absent counts read as zero, non-integers are an error.
pub fn count_field(payload: &Value, field: &str, context: &str) -> Result<u64, RewireError> {
  match payload.get(field) {
    None | Some(Value::Null) => Ok(0),
    Some(v) => v.as_u64().ok_or_else(|| missing(payload, field, context)),
  }
}

fn missing(payload: &Value, field: &str, context: &str) -> RewireError {
  RewireError::MissingField {
    context: context.to_string(),
    field: field.to_string(),
    raw: payload.clone(),
  }
}
