//! In-memory stand-ins for the editor's command endpoint, used by unit tests.
//!
//! - [FakeHost]: simulates a node graph (nodes, exec edges, data edges) and answers the
//!   command vocabulary the primitives use.
//! - [ScriptedTransport]: replays canned results and records what was sent.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::transport::Transport;
use crate::types::{Command, CommandResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeNodeKind {
  Event {
    widget: String,
    event: String,
    handler: String,
  },
  CustomEvent {
    delegate: String,
  },
  Call {
    function: String,
  },
  Accessor,
  Struct {
    struct_type: String,
  },
  Assign {
    delegate: String,
  },
}

impl FakeNodeKind {
  fn label(&self) -> String {
    match self {
      FakeNodeKind::Event { widget, event, .. } => format!("event:{}.{}", widget, event),
      FakeNodeKind::CustomEvent { delegate } => format!("custom:{}", delegate),
      FakeNodeKind::Call { function } => function.clone(),
      FakeNodeKind::Accessor => "subsystem".to_string(),
      FakeNodeKind::Struct { struct_type } => format!("struct:{}", struct_type),
      FakeNodeKind::Assign { delegate } => format!("assign:{}", delegate),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataEdge {
  pub from: String,
  pub from_pin: String,
  pub to: String,
  pub to_pin: String,
}

#[derive(Default)]
struct Graph {
  next_id: u64,
  nodes: BTreeMap<String, FakeNodeKind>,
  exec: Vec<(String, String)>,
  data: Vec<DataEdge>,
  log: Vec<Command>,
  fail_at: Option<usize>,
  duplicate_bindings: bool,
}

fn str_param(cmd: &Command, key: &str) -> Result<String, String> {
  cmd
    .params()
    .get(key)
    .and_then(Value::as_str)
    .map(String::from)
    .ok_or_else(|| format!("Missing '{}' parameter", key))
}

impl Graph {
  fn add(&mut self, kind: FakeNodeKind) -> String {
    self.next_id += 1;
    let id = format!("K2Node_{:04}", self.next_id);
    self.nodes.insert(id.clone(), kind);
    id
  }

  fn require_node(&self, id: &str) -> Result<(), String> {
    if self.nodes.contains_key(id) {
      Ok(())
    } else {
      Err(format!("Node not found: {}", id))
    }
  }

  fn exec_successors(&self, id: &str) -> Vec<String> {
    self
      .exec
      .iter()
      .filter(|(from, _)| from == id)
      .map(|(_, to)| to.clone())
      .collect()
  }

  /// An exec output pin drives at most one node; connecting replaces the old link.
  fn link_exec(&mut self, from: &str, to: &str) {
    self.exec.retain(|(f, _)| f != from);
    self.exec.push((from.to_string(), to.to_string()));
  }

  fn remove_nodes(&mut self, ids: &BTreeSet<String>) {
    self.nodes.retain(|id, _| !ids.contains(id));
    self
      .exec
      .retain(|(f, t)| !ids.contains(f) && !ids.contains(t));
    self
      .data
      .retain(|e| !ids.contains(&e.from) && !ids.contains(&e.to));
  }

  /// Nodes reachable by exec edges from `root` (root excluded), plus non-event nodes whose
  /// data outputs all feed removed nodes, plus their own exec chains.
  fn downstream_of(&self, root: &str, include_data: bool) -> BTreeSet<String> {
    let mut removed = BTreeSet::new();
    let mut frontier = self.exec_successors(root);
    loop {
      while let Some(n) = frontier.pop() {
        if n != root && removed.insert(n.clone()) {
          frontier.extend(self.exec_successors(&n));
        }
      }
      if !include_data {
        break;
      }
      let providers: Vec<String> = self
        .nodes
        .iter()
        .filter(|(id, kind)| {
          id.as_str() != root
            && !removed.contains(*id)
            && !matches!(kind, FakeNodeKind::Event { .. })
        })
        .filter(|(id, _)| {
          let outs: Vec<&DataEdge> = self.data.iter().filter(|e| &e.from == *id).collect();
          !outs.is_empty() && outs.iter().all(|e| removed.contains(&e.to))
        })
        .map(|(id, _)| id.clone())
        .collect();
      if providers.is_empty() {
        break;
      }
      for p in providers {
        frontier.extend(self.exec_successors(&p));
        removed.insert(p);
      }
    }
    removed
  }

  fn matching_events(&self, widget: &str, event: &str) -> Vec<String> {
    self
      .nodes
      .iter()
      .filter(|(_, k)| {
        matches!(k, FakeNodeKind::Event { widget: w, event: e, .. } if w == widget && e == event)
      })
      .map(|(id, _)| id.clone())
      .collect()
  }

  fn handle(&mut self, cmd: &Command) -> Result<Value, String> {
    let p = cmd.params();
    match cmd.name() {
      "bind_widget_event" => {
        let widget = str_param(cmd, "widget_name")?;
        let event = str_param(cmd, "event_name")?;
        let handler = str_param(cmd, "function_name")?;
        let kind = FakeNodeKind::Event {
          widget,
          event,
          handler,
        };
        let existing = self
          .nodes
          .iter()
          .find(|(_, k)| **k == kind)
          .map(|(id, _)| id.clone());
        let id = match existing {
          Some(id) if !self.duplicate_bindings => id,
          _ => self.add(kind),
        };
        Ok(json!({ "node_id": id }))
      }
      "dedupe_widget_event_nodes" => {
        let widget = str_param(cmd, "widget_name")?;
        let event = str_param(cmd, "event_name")?;
        let keep = str_param(cmd, "keep_node_id")?;
        let matching = self.matching_events(&widget, &event);
        if !matching.contains(&keep) {
          return Err(format!("Node {} is not a {}.{} binding", keep, widget, event));
        }
        let mut removed_events = 0u64;
        let mut removed_chain = 0u64;
        for other in matching.into_iter().filter(|id| *id != keep) {
          let mut doomed = self.downstream_of(&other, true);
          removed_chain += doomed.len() as u64;
          doomed.insert(other);
          removed_events += 1;
          self.remove_nodes(&doomed);
        }
        Ok(json!({
          "kept_node_id": keep,
          "removed_event_count": removed_events,
          "removed_chain_node_count": removed_chain,
        }))
      }
      "clear_blueprint_event_exec_chain" => {
        let event = str_param(cmd, "event_node_id")?;
        self.require_node(&event)?;
        let include_data = p
          .get("include_data_dependencies")
          .and_then(Value::as_bool)
          .unwrap_or(false);
        let doomed = self.downstream_of(&event, include_data);
        self.remove_nodes(&doomed);
        Ok(json!({ "removed_node_count": doomed.len() }))
      }
      "clear_blueprint_event_graph" => {
        let keep_events = p
          .get("keep_bound_events")
          .and_then(Value::as_bool)
          .unwrap_or(false);
        let doomed: BTreeSet<String> = self
          .nodes
          .iter()
          .filter(|(_, k)| !(keep_events && matches!(k, FakeNodeKind::Event { .. })))
          .map(|(id, _)| id.clone())
          .collect();
        self.remove_nodes(&doomed);
        Ok(json!({ "removed_node_count": doomed.len() }))
      }
      "add_blueprint_function_node" => {
        let function = str_param(cmd, "function_name")?;
        Ok(json!({ "node_id": self.add(FakeNodeKind::Call { function }) }))
      }
      "add_blueprint_make_struct_node" => {
        let struct_type = str_param(cmd, "struct_type")?;
        let id = self.add(FakeNodeKind::Struct { struct_type });
        Ok(json!({ "node_id": id, "output_pin": "Result" }))
      }
      "add_blueprint_get_subsystem_node" => {
        str_param(cmd, "subsystem_class")?;
        Ok(json!({ "node_id": self.add(FakeNodeKind::Accessor) }))
      }
      "bind_blueprint_multicast_delegate" => {
        let delegate = str_param(cmd, "delegate_name")?;
        let target = str_param(cmd, "target_node_id")?;
        let source = str_param(cmd, "exec_source_node_id")?;
        self.require_node(&target)?;
        self.require_node(&source)?;
        let assign = self.add(FakeNodeKind::Assign {
          delegate: delegate.clone(),
        });
        let custom = self.add(FakeNodeKind::CustomEvent { delegate });
        self.link_exec(&source, &assign);
        self.data.push(DataEdge {
          from: custom.clone(),
          from_pin: "OutputDelegate".to_string(),
          to: assign.clone(),
          to_pin: "Event".to_string(),
        });
        self.data.push(DataEdge {
          from: target,
          from_pin: "ReturnValue".to_string(),
          to: assign.clone(),
          to_pin: "self".to_string(),
        });
        Ok(json!({ "assign_node_id": assign, "custom_event_node_id": custom }))
      }
      "connect_blueprint_nodes" => {
        let from = str_param(cmd, "source_node_id")?;
        let from_pin = str_param(cmd, "source_pin")?;
        let to = str_param(cmd, "target_node_id")?;
        let to_pin = str_param(cmd, "target_pin")?;
        self.require_node(&from)?;
        self.require_node(&to)?;
        if from_pin == "Then" && to_pin == "Execute" {
          self.link_exec(&from, &to);
        } else {
          self.data.push(DataEdge {
            from,
            from_pin,
            to,
            to_pin,
          });
        }
        Ok(json!({ "connected": true }))
      }
      "compile_blueprint" => Ok(json!({ "compiled": true, "node_count": self.nodes.len() })),
      "save_blueprint" => Ok(json!({ "saved": true })),
      other => Err(format!("Unknown command type: {}", other)),
    }
  }
}

/// Simulated editor graph behind the [Transport] seam.
#[derive(Default)]
pub struct FakeHost {
  graph: Mutex<Graph>,
}

impl FakeHost {
  pub fn new() -> Self {
    Self::default()
  }

  /// Every `bind_widget_event` creates a new event node, even for an identical binding.
  pub fn with_duplicate_bindings(self) -> Self {
    self.graph.lock().unwrap().duplicate_bindings = true;
    self
  }

  /// The `n`-th command (1-based) gets an error response.
  pub fn failing_at(self, n: usize) -> Self {
    self.graph.lock().unwrap().fail_at = Some(n);
    self
  }

  pub fn commands(&self) -> Vec<Command> {
    self.graph.lock().unwrap().log.clone()
  }

  pub fn calls(&self) -> usize {
    self.graph.lock().unwrap().log.len()
  }

  pub fn node_count(&self) -> usize {
    self.graph.lock().unwrap().nodes.len()
  }

  pub fn has_node(&self, id: &str) -> bool {
    self.graph.lock().unwrap().nodes.contains_key(id)
  }

  pub fn seed_event(&self, widget: &str, event: &str, handler: &str) -> String {
    self.graph.lock().unwrap().add(FakeNodeKind::Event {
      widget: widget.to_string(),
      event: event.to_string(),
      handler: handler.to_string(),
    })
  }

  pub fn seed_call(&self, function: &str) -> String {
    self.graph.lock().unwrap().add(FakeNodeKind::Call {
      function: function.to_string(),
    })
  }

  pub fn seed_exec(&self, from: &str, to: &str) {
    self.graph.lock().unwrap().link_exec(from, to);
  }

  /// Event node ids bound for (widget, event).
  pub fn events_for(&self, widget: &str, event: &str) -> Vec<String> {
    self.graph.lock().unwrap().matching_events(widget, event)
  }

  /// Labels along the exec path leaving `id` (excluding `id`).
  pub fn exec_path_from(&self, id: &str) -> Vec<String> {
    let g = self.graph.lock().unwrap();
    let mut path = vec![];
    let mut seen = BTreeSet::new();
    let mut current = id.to_string();
    while let Some(next) = g.exec_successors(&current).into_iter().next() {
      if !seen.insert(next.clone()) {
        break;
      }
      path.push(g.nodes[&next].label());
      current = next;
    }
    path
  }

  /// Data edges as `(from label, from pin, to label, to pin)`.
  pub fn data_edges(&self) -> Vec<(String, String, String, String)> {
    let g = self.graph.lock().unwrap();
    g.data
      .iter()
      .map(|e| {
        (
          g.nodes[&e.from].label(),
          e.from_pin.clone(),
          g.nodes[&e.to].label(),
          e.to_pin.clone(),
        )
      })
      .collect()
  }

  /// Topology keyed by event label: exec path labels of each binding, plus node kind counts.
  pub fn topology(&self) -> (BTreeMap<String, Vec<Vec<String>>>, BTreeMap<String, usize>) {
    let (events, counts) = {
      let g = self.graph.lock().unwrap();
      let events: Vec<(String, String)> = g
        .nodes
        .iter()
        .filter(|(_, k)| matches!(k, FakeNodeKind::Event { .. } | FakeNodeKind::CustomEvent { .. }))
        .map(|(id, k)| (id.clone(), k.label()))
        .collect();
      let mut counts = BTreeMap::new();
      for k in g.nodes.values() {
        *counts.entry(k.label()).or_insert(0) += 1;
      }
      (events, counts)
    };
    let mut chains: BTreeMap<String, Vec<Vec<String>>> = BTreeMap::new();
    for (id, label) in events {
      chains.entry(label).or_default().push(self.exec_path_from(&id));
    }
    for paths in chains.values_mut() {
      paths.sort();
    }
    (chains, counts)
  }
}

#[async_trait]
impl Transport for FakeHost {
  async fn send(&self, command: &Command) -> CommandResult {
    let mut g = self.graph.lock().unwrap();
    g.log.push(command.clone());
    let response = if g.fail_at == Some(g.log.len()) {
      json!({ "status": "error", "error": format!("injected failure on {}", command.name()) })
    } else {
      match g.handle(command) {
        Ok(result) => json!({ "status": "success", "result": result }),
        Err(message) => json!({ "status": "error", "error": message }),
      }
    };
    CommandResult::from_response(command.name(), response)
  }
}

/// Replays queued results in order; answers `{}` success once the queue is empty.
#[derive(Default)]
pub struct ScriptedTransport {
  replies: Mutex<VecDeque<CommandResult>>,
  sent: Mutex<Vec<Command>>,
}

impl ScriptedTransport {
  pub fn new(replies: Vec<CommandResult>) -> Self {
    Self {
      replies: Mutex::new(replies.into()),
      sent: Mutex::new(vec![]),
    }
  }

  pub fn sent(&self) -> Vec<Command> {
    self.sent.lock().unwrap().clone()
  }
}

#[async_trait]
impl Transport for ScriptedTransport {
  async fn send(&self, command: &Command) -> CommandResult {
    self.sent.lock().unwrap().push(command.clone());
    self
      .replies
      .lock()
      .unwrap()
      .pop_front()
      .unwrap_or(CommandResult::Success { result: json!({}) })
  }
}
