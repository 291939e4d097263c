//! A single request sent to the host: one command per connection.

use serde::Serialize;

use super::Params;

/// A named host command with its ordered parameter object.
///
/// Serializes to the wire envelope `{"type": <name>, "params": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Command {
  #[serde(rename = "type")]
  name: String,
  params: Params,
}

impl Command {
  pub fn new(name: impl Into<String>, params: Params) -> Self {
    Self {
      name: name.into(),
      params,
    }
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn params(&self) -> &Params {
    &self.params
  }

  /// UTF-8 JSON bytes written to the socket in one write.
  pub fn to_wire(&self) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(self)
  }
}
