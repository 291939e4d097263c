//! Event bindings and dedupe reports.

use serde::Serialize;

use super::NodeHandle;

/// A trigger's event bound to a named handler, as returned by the bind primitive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventBinding {
  pub trigger: String,
  pub event: String,
  pub handler: String,
  pub node: NodeHandle,
}

/// What one dedupe pass kept and removed for a (trigger, event) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DedupeReport {
  pub kept: NodeHandle,
  pub removed_event_count: u64,
  pub removed_chain_node_count: u64,
}

impl DedupeReport {
  pub fn removed_anything(&self) -> bool {
    self.removed_event_count > 0 || self.removed_chain_node_count > 0
  }
}
