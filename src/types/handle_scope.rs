//! Run-scoped, append-only map from logical step names to node handles.
//!
//! Built during one orchestration run and dropped with it, so a handle can never be
//! carried into a later run (the graph may have been cleared in between).

use std::collections::HashMap;

use super::NodeHandle;
use crate::error::RewireError;

#[derive(Debug, Default)]
pub struct HandleScope {
  entries: Vec<(String, NodeHandle)>,
  index: HashMap<String, usize>,
}

impl HandleScope {
  /// Joins scope and step in a key. Scope and step names must not contain it.
  pub const SEPARATOR: char = '.';
  /// Step name a trigger's own binding is recorded under.
  pub const BINDING_STEP: &str = "event";

  pub fn new() -> Self {
    Self::default()
  }

  /// Key for a step inside a named scope (a trigger or a chain).
  pub fn key(scope: &str, step: &str) -> String {
    format!("{}{}{}", scope, Self::SEPARATOR, step)
  }

  /// Records a handle. Keys are write-once.
  pub fn record(&mut self, key: impl Into<String>, handle: NodeHandle) -> Result<(), RewireError> {
    let key = key.into();
    if self.index.contains_key(&key) {
      return Err(RewireError::DuplicateHandle(key));
    }
    self.index.insert(key.clone(), self.entries.len());
    self.entries.push((key, handle));
    Ok(())
  }

  pub fn get(&self, key: &str) -> Result<&NodeHandle, RewireError> {
    self
      .index
      .get(key)
      .map(|&i| &self.entries[i].1)
      .ok_or_else(|| RewireError::UnknownHandle(key.to_string()))
  }

  pub fn contains(&self, key: &str) -> bool {
    self.index.contains_key(key)
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// Entries in recording order.
  pub fn iter(&self) -> impl Iterator<Item = (&str, &NodeHandle)> {
    self.entries.iter().map(|(k, h)| (k.as_str(), h))
  }
}
