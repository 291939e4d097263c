//! Node handles, pin references and canvas positions.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Execution output pin of event and call nodes.
pub const EXEC_OUTPUT_PIN: &str = "Then";
/// Execution input pin of call nodes.
pub const EXEC_INPUT_PIN: &str = "Execute";

/// Opaque host-assigned node identifier, valid for the current run only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeHandle(String);

impl NodeHandle {
  pub fn new(id: impl Into<String>) -> Self {
    Self(id.into())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for NodeHandle {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// One end of a connection: a node plus a pin name on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinRef {
  pub node: NodeHandle,
  pub pin: String,
}

impl PinRef {
  pub fn new(node: NodeHandle, pin: impl Into<String>) -> Self {
    Self {
      node,
      pin: pin.into(),
    }
  }

  pub fn exec_out(node: NodeHandle) -> Self {
    Self::new(node, EXEC_OUTPUT_PIN)
  }

  pub fn exec_in(node: NodeHandle) -> Self {
    Self::new(node, EXEC_INPUT_PIN)
  }

  pub fn is_exec(&self) -> bool {
    self.pin == EXEC_OUTPUT_PIN || self.pin == EXEC_INPUT_PIN
  }
}

/// Canvas coordinates; serialized as `[x, y]` like the host's `node_position`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[i64; 2]", into = "[i64; 2]")]
pub struct Position {
  pub x: i64,
  pub y: i64,
}

impl Position {
  pub const fn new(x: i64, y: i64) -> Self {
    Self { x, y }
  }

  pub const fn offset(self, dx: i64, dy: i64) -> Self {
    Self {
      x: self.x + dx,
      y: self.y + dy,
    }
  }
}

impl From<[i64; 2]> for Position {
  fn from([x, y]: [i64; 2]) -> Self {
    Self { x, y }
  }
}

impl From<Position> for [i64; 2] {
  fn from(p: Position) -> Self {
    [p.x, p.y]
  }
}
