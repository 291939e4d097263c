//! Typed graph-mutation primitives over the host command API.
//!
//! Each primitive issues exactly one command through the [Transport], passes the result
//! through [crate::envelope::require] and extracts the identifiers later calls need.
//! Parameter validation is left to the host; failures propagate unchanged.

use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::{Value, json};
use tracing::{debug, info, instrument};

use crate::envelope::{count_field, require, require_handle, require_str};
use crate::error::RewireError;
use crate::plan::{PersistStrategy, TriggerSpec};
use crate::transport::Transport;
use crate::types::{
  Command, DedupeReport, EXEC_OUTPUT_PIN, EventBinding, NodeHandle, Params, PinRef, Position,
};

/// Client for one named graph on the host.
pub struct GraphClient<T> {
  transport: T,
  graph_name: String,
  sent: AtomicU64,
}

impl<T: Transport> GraphClient<T> {
  pub fn new(transport: T, graph_name: impl Into<String>) -> Self {
    Self {
      transport,
      graph_name: graph_name.into(),
      sent: AtomicU64::new(0),
    }
  }

  pub fn graph_name(&self) -> &str {
    &self.graph_name
  }

  pub fn transport(&self) -> &T {
    &self.transport
  }

  /// Number of commands sent through this client so far.
  pub fn commands_sent(&self) -> u64 {
    self.sent.load(Ordering::Relaxed)
  }

  fn command(&self, name: &str, fields: Value) -> Command {
    let mut params = Params::new();
    params.insert("blueprint_name".to_string(), json!(self.graph_name));
    if let Value::Object(fields) = fields {
      params.extend(fields);
    }
    Command::new(name, params)
  }

  async fn call(&self, command: Command, context: &str) -> Result<Value, RewireError> {
    self.sent.fetch_add(1, Ordering::Relaxed);
    let result = self.transport.send(&command).await;
    let payload = require(result, context)?;
    debug!(context = %context, "command succeeded");
    Ok(payload)
  }

  /// Adds a function call node; `target` is the owning class or library.
  #[instrument(level = "trace", skip(self, params))]
  pub async fn create_function_call_node(
    &self,
    target: &str,
    function_name: &str,
    position: Position,
    params: &Params,
  ) -> Result<NodeHandle, RewireError> {
    let context = format!("add_blueprint_function_node({})", function_name);
    let cmd = self.command(
      "add_blueprint_function_node",
      json!({
        "target": target,
        "function_name": function_name,
        "node_position": position,
        "params": params,
      }),
    );
    let payload = self.call(cmd, &context).await?;
    require_handle(&payload, "node_id", &context)
  }

  /// Adds a struct literal node; returns the node and the name of its struct output pin.
  #[instrument(level = "trace", skip(self, field_values))]
  pub async fn create_struct_literal_node(
    &self,
    struct_type: &str,
    position: Position,
    field_values: &Params,
  ) -> Result<(NodeHandle, String), RewireError> {
    let context = format!("add_blueprint_make_struct_node({})", struct_type);
    let cmd = self.command(
      "add_blueprint_make_struct_node",
      json!({
        "struct_type": struct_type,
        "node_position": position,
        "field_values": field_values,
      }),
    );
    let payload = self.call(cmd, &context).await?;
    let node = require_handle(&payload, "node_id", &context)?;
    let pin = require_str(&payload, "output_pin", &context)?.to_string();
    Ok((node, pin))
  }

  /// Adds a node resolving the active instance of `subsystem_type`.
  #[instrument(level = "trace", skip(self))]
  pub async fn create_subsystem_accessor_node(
    &self,
    subsystem_type: &str,
    position: Position,
  ) -> Result<NodeHandle, RewireError> {
    let context = format!("add_blueprint_get_subsystem_node({})", subsystem_type);
    let cmd = self.command(
      "add_blueprint_get_subsystem_node",
      json!({
        "subsystem_class": subsystem_type,
        "node_position": position,
      }),
    );
    let payload = self.call(cmd, &context).await?;
    require_handle(&payload, "node_id", &context)
  }

  /// Binds `event_name` of the trigger widget to a handler and returns the event node.
  #[instrument(level = "trace", skip(self))]
  pub async fn bind_event(
    &self,
    trigger_name: &str,
    event_name: &str,
    handler_name: &str,
    position: Position,
  ) -> Result<EventBinding, RewireError> {
    let context = format!("bind_widget_event({})", trigger_name);
    let cmd = self.command(
      "bind_widget_event",
      json!({
        "widget_name": trigger_name,
        "event_name": event_name,
        "function_name": handler_name,
        "node_position": position,
      }),
    );
    let payload = self.call(cmd, &context).await?;
    let node = require_handle(&payload, "node_id", &context)?;
    info!(trigger = %trigger_name, node_id = %node, "bound event");
    Ok(EventBinding {
      trigger: trigger_name.to_string(),
      event: event_name.to_string(),
      handler: handler_name.to_string(),
      node,
    })
  }

  /// Binds a multicast delegate of `target` to a new custom event, executed after
  /// `execution_predecessor`. Returns (assign node, custom event node).
  #[instrument(level = "trace", skip(self))]
  pub async fn bind_multicast_delegate(
    &self,
    delegate_name: &str,
    target: &NodeHandle,
    execution_predecessor: &NodeHandle,
    position: Position,
  ) -> Result<(NodeHandle, NodeHandle), RewireError> {
    let context = format!("bind_blueprint_multicast_delegate({})", delegate_name);
    let cmd = self.command(
      "bind_blueprint_multicast_delegate",
      json!({
        "delegate_name": delegate_name,
        "target_node_id": target,
        "exec_source_node_id": execution_predecessor,
        "exec_source_pin": EXEC_OUTPUT_PIN,
        "node_position": position,
      }),
    );
    let payload = self.call(cmd, &context).await?;
    let assign = require_handle(&payload, "assign_node_id", &context)?;
    let custom_event = require_handle(&payload, "custom_event_node_id", &context)?;
    Ok((assign, custom_event))
  }

  /// Wires `source.Then` to `target.Execute`.
  pub async fn connect_execution(
    &self,
    source: &NodeHandle,
    target: &NodeHandle,
  ) -> Result<(), RewireError> {
    let context = format!("connect_exec({}->{})", source, target);
    self
      .connect(
        &PinRef::exec_out(source.clone()),
        &PinRef::exec_in(target.clone()),
        &context,
      )
      .await
  }

  /// Wires a data output pin to a data input pin.
  pub async fn connect_data(
    &self,
    source: &NodeHandle,
    source_pin: &str,
    target: &NodeHandle,
    target_pin: &str,
  ) -> Result<(), RewireError> {
    let context = format!("connect_data({}->{})", source_pin, target_pin);
    self
      .connect(
        &PinRef::new(source.clone(), source_pin),
        &PinRef::new(target.clone(), target_pin),
        &context,
      )
      .await
  }

  #[instrument(level = "trace", skip(self, context))]
  async fn connect(&self, from: &PinRef, to: &PinRef, context: &str) -> Result<(), RewireError> {
    let cmd = self.command(
      "connect_blueprint_nodes",
      json!({
        "source_node_id": from.node,
        "source_pin": from.pin,
        "target_node_id": to.node,
        "target_pin": to.pin,
      }),
    );
    self.call(cmd, context).await.map(|_| ())
  }

  /// Collapses every binding of (trigger, event) except `keep` and reports what was pruned,
  /// including the chains hanging off `output_pin` of the removed bindings.
  #[instrument(level = "trace", skip(self))]
  pub async fn dedupe_bound_events(
    &self,
    trigger_name: &str,
    event_name: &str,
    output_pin: &str,
    keep: &NodeHandle,
  ) -> Result<DedupeReport, RewireError> {
    let context = format!("dedupe_widget_event_nodes({})", trigger_name);
    let cmd = self.command(
      "dedupe_widget_event_nodes",
      json!({
        "widget_name": trigger_name,
        "event_name": event_name,
        "output_pin": output_pin,
        "keep_node_id": keep,
      }),
    );
    let payload = self.call(cmd, &context).await?;
    let report = DedupeReport {
      kept: require_handle(&payload, "kept_node_id", &context)?,
      removed_event_count: count_field(&payload, "removed_event_count", &context)?,
      removed_chain_node_count: count_field(&payload, "removed_chain_node_count", &context)?,
    };
    if report.removed_anything() {
      info!(
        trigger = %trigger_name,
        removed_events = report.removed_event_count,
        removed_chain_nodes = report.removed_chain_node_count,
        "pruned duplicate bindings"
      );
    }
    Ok(report)
  }

  /// Removes every node downstream of `output_pin` on `event`, keeping the event node.
  /// Data-only providers that fed exclusively into removed nodes go with them.
  #[instrument(level = "trace", skip(self))]
  pub async fn clear_execution_chain(
    &self,
    event: &NodeHandle,
    output_pin: &str,
  ) -> Result<u64, RewireError> {
    let context = format!("clear_blueprint_event_exec_chain({})", event);
    let cmd = self.command(
      "clear_blueprint_event_exec_chain",
      json!({
        "event_node_id": event,
        "output_pin": output_pin,
        "include_data_dependencies": true,
      }),
    );
    let payload = self.call(cmd, &context).await?;
    count_field(&payload, "removed_node_count", &context)
  }

  /// Removes all nodes from the graph, optionally sparing event binding nodes.
  #[instrument(level = "trace", skip(self))]
  pub async fn clear_whole_graph(&self, keep_bound_events: bool) -> Result<Value, RewireError> {
    let cmd = self.command(
      "clear_blueprint_event_graph",
      json!({ "keep_bound_events": keep_bound_events }),
    );
    self.call(cmd, "clear_blueprint_event_graph").await
  }

  #[instrument(level = "trace", skip(self))]
  pub async fn compile(&self) -> Result<Value, RewireError> {
    let cmd = self.command("compile_blueprint", json!({}));
    self.call(cmd, "compile_blueprint").await
  }

  /// Makes the host save the graph.
  ///
  /// [PersistStrategy::RebindTrigger] re-issues the trigger's binding call and relies on the
  /// host saving on mutation; the new binding is returned so the caller can collapse it onto
  /// the one it already holds. Use [PersistStrategy::Command] when the host has a save command.
  #[instrument(level = "trace", skip(self, strategy, triggers))]
  pub async fn persist(
    &self,
    strategy: &PersistStrategy,
    triggers: &[TriggerSpec],
  ) -> Result<Option<EventBinding>, RewireError> {
    match strategy {
      PersistStrategy::RebindTrigger { trigger } => {
        let spec = triggers
          .iter()
          .find(|t| &t.name == trigger)
          .ok_or_else(|| RewireError::InvalidPlan(format!("persist trigger '{}' is not bound", trigger)))?;
        self
          .bind_event(&spec.name, &spec.event, &spec.handler, spec.position)
          .await
          .map(Some)
      }
      PersistStrategy::Command { name } => {
        let cmd = self.command(name, json!({}));
        self.call(cmd, name).await.map(|_| None)
      }
    }
  }
}
