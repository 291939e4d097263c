//! Rebuild orchestration: interprets a [RebuildPlan] against one graph.
//!
//! States: `Start → [Cleared] → EventsBound → [ConstructWired] → ChainWired(k).. →
//! Compiled → Persisted → Done`, with `Aborted` reachable from any state on the first
//! failure. Calls are strictly sequential; every handle used in a call was produced earlier
//! in the same run and lives in that run's [HandleScope].
//!
//! Nothing is rolled back on abort: steps already applied stay applied on the host.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::error::RewireError;
use crate::graph_client::GraphClient;
use crate::plan::{
  ChainSpec, DIAGNOSTIC_LOG_FUNCTION, DIAGNOSTIC_LOG_TARGET, LifecycleSpec, PersistStrategy,
  RETURN_VALUE_PIN, RebuildPlan, SELF_PIN, SUBSYSTEM_RESULT_PIN, StepKind, TriggerSpec,
};
use crate::transport::Transport;
use crate::types::{DedupeReport, EXEC_OUTPUT_PIN, EventBinding, HandleScope, NodeHandle, Params};

/// Whether the run wipes the graph first or surgically replaces only its own chains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RebuildMode {
  /// Clear the whole graph (bound events included) before rebuilding.
  FullClear,
  /// Leave unrelated content alone; clear and rebuild only the configured chains.
  Preserve,
}

/// Switches for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
  pub mode: RebuildMode,
  /// (Re)build lifecycle delegate wiring.
  pub wire_lifecycle: bool,
  /// Stop after binding: no chains are built.
  pub bindings_only: bool,
}

impl Default for RunOptions {
  fn default() -> Self {
    Self {
      mode: RebuildMode::FullClear,
      wire_lifecycle: false,
      bindings_only: false,
    }
  }
}

/// Orchestrator states, recorded in order in the [RunReport].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunState {
  Start,
  Cleared,
  EventsBound,
  ConstructWired,
  ChainWired { index: usize, trigger: String },
  Compiled,
  Persisted,
  Done,
  Aborted,
}

impl fmt::Display for RunState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      RunState::Start => write!(f, "start"),
      RunState::Cleared => write!(f, "cleared"),
      RunState::EventsBound => write!(f, "events_bound"),
      RunState::ConstructWired => write!(f, "construct_wired"),
      RunState::ChainWired { index, trigger } => write!(f, "chain_wired[{}:{}]", index, trigger),
      RunState::Compiled => write!(f, "compiled"),
      RunState::Persisted => write!(f, "persisted"),
      RunState::Done => write!(f, "done"),
      RunState::Aborted => write!(f, "aborted"),
    }
  }
}

/// Dedupe outcome for one trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TriggerDedupe {
  pub trigger: String,
  #[serde(flatten)]
  pub report: DedupeReport,
}

/// The failing step, as surfaced to the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunFailure {
  pub command: Option<String>,
  pub message: String,
  pub raw: Option<Value>,
}

impl From<&RewireError> for RunFailure {
  fn from(e: &RewireError) -> Self {
    let raw = match e {
      RewireError::CommandFailed { raw, .. } | RewireError::MissingField { raw, .. } => {
        Some(raw.clone())
      }
      _ => None,
    };
    Self {
      command: e.command().map(String::from),
      message: e.to_string(),
      raw,
    }
  }
}

/// What a run did, successful or not.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
  pub graph_name: String,
  pub mode: RebuildMode,
  pub started_at: DateTime<Utc>,
  pub finished_at: Option<DateTime<Utc>>,
  pub states: Vec<RunState>,
  pub bindings: Vec<EventBinding>,
  pub dedupes: Vec<TriggerDedupe>,
  /// Nodes removed by per-chain clears in preserve mode.
  pub cleared_chain_nodes: u64,
  pub nodes_created: u64,
  pub commands_sent: u64,
  /// Host summary returned by the compile step.
  pub compile_result: Option<Value>,
  pub failure: Option<RunFailure>,
}

impl RunReport {
  fn new(graph_name: &str, mode: RebuildMode) -> Self {
    Self {
      graph_name: graph_name.to_string(),
      mode,
      started_at: Utc::now(),
      finished_at: None,
      states: vec![RunState::Start],
      bindings: vec![],
      dedupes: vec![],
      cleared_chain_nodes: 0,
      nodes_created: 0,
      commands_sent: 0,
      compile_result: None,
      failure: None,
    }
  }

  pub fn succeeded(&self) -> bool {
    self.failure.is_none() && self.states.last() == Some(&RunState::Done)
  }

  pub fn last_state(&self) -> Option<&RunState> {
    self.states.last()
  }
}

/// A run that stopped at its first failure. Carries the partial report.
#[derive(Debug, Error)]
#[error("rebuild aborted: {error}")]
pub struct RunAborted {
  #[source]
  pub error: RewireError,
  pub report: Box<RunReport>,
}

/// Interprets a plan against a graph through a [GraphClient].
pub struct Orchestrator<'a, T> {
  client: &'a GraphClient<T>,
  plan: &'a RebuildPlan,
  options: RunOptions,
}

impl<'a, T: Transport> Orchestrator<'a, T> {
  pub fn new(client: &'a GraphClient<T>, plan: &'a RebuildPlan, options: RunOptions) -> Self {
    Self {
      client,
      plan,
      options,
    }
  }

  /// Runs the full sequence. The plan is validated before any command is sent.
  #[instrument(level = "trace", skip(self), fields(graph = %self.plan.graph_name, mode = ?self.options.mode))]
  pub async fn run(&self) -> Result<RunReport, RunAborted> {
    let mut run = Run {
      client: self.client,
      options: self.options,
      scope: HandleScope::new(),
      report: RunReport::new(&self.plan.graph_name, self.options.mode),
      sent_before: self.client.commands_sent(),
    };
    info!(graph = %self.plan.graph_name, mode = ?self.options.mode, "rebuild starting");
    let outcome = run.execute(self.plan).await;
    run.report.commands_sent = self.client.commands_sent() - run.sent_before;
    run.report.finished_at = Some(Utc::now());
    match outcome {
      Ok(()) => {
        run.transition(RunState::Done);
        info!(
          commands = run.report.commands_sent,
          nodes = run.report.nodes_created,
          "rebuild complete"
        );
        Ok(run.report)
      }
      Err(error) => {
        warn!(state = ?run.report.last_state(), error = %error, "rebuild aborted");
        run.report.states.push(RunState::Aborted);
        run.report.failure = Some(RunFailure::from(&error));
        Err(RunAborted {
          error,
          report: Box::new(run.report),
        })
      }
    }
  }
}

/// State of one run; dropped (with its handles) when the run ends.
struct Run<'a, T> {
  client: &'a GraphClient<T>,
  options: RunOptions,
  scope: HandleScope,
  report: RunReport,
  sent_before: u64,
}

fn event_key(trigger: &str) -> String {
  HandleScope::key(trigger, HandleScope::BINDING_STEP)
}

impl<T: Transport> Run<'_, T> {
  fn transition(&mut self, state: RunState) {
    info!(state = %state, "state reached");
    self.report.states.push(state);
  }

  fn preserve(&self) -> bool {
    self.options.mode == RebuildMode::Preserve
  }

  async fn execute(&mut self, plan: &RebuildPlan) -> Result<(), RewireError> {
    plan.validate()?;

    if !self.preserve() {
      self.client.clear_whole_graph(false).await?;
      self.transition(RunState::Cleared);
    }

    for trigger in &plan.triggers {
      self.bind_trigger(trigger).await?;
    }
    self.transition(RunState::EventsBound);

    if self.options.wire_lifecycle {
      match &plan.lifecycle {
        Some(lifecycle) => {
          self.wire_lifecycle(lifecycle).await?;
          self.transition(RunState::ConstructWired);
        }
        None => warn!(graph = %plan.graph_name, "lifecycle wiring requested but the plan has none"),
      }
    }

    if !self.options.bindings_only {
      for (index, chain) in plan.chains.iter().enumerate() {
        self.wire_chain(chain).await?;
        self.transition(RunState::ChainWired {
          index,
          trigger: chain.trigger.clone(),
        });
      }
    }

    self.report.compile_result = Some(self.client.compile().await?);
    self.transition(RunState::Compiled);

    if let Some(strategy) = plan.persist_strategy() {
      self.persist(&strategy, &plan.triggers).await?;
    }
    self.transition(RunState::Persisted);
    Ok(())
  }

  /// A binding added by a persist rebind is collapsed onto the survivor recorded earlier,
  /// which is the one carrying the chain.
  async fn persist(
    &mut self,
    strategy: &PersistStrategy,
    triggers: &[TriggerSpec],
  ) -> Result<(), RewireError> {
    let Some(rebound) = self.client.persist(strategy, triggers).await? else {
      return Ok(());
    };
    let survivor = self.scope.get(&event_key(&rebound.trigger))?.clone();
    let dedupe = self
      .client
      .dedupe_bound_events(&rebound.trigger, &rebound.event, EXEC_OUTPUT_PIN, &survivor)
      .await?;
    self.report.dedupes.push(TriggerDedupe {
      trigger: rebound.trigger,
      report: dedupe,
    });
    Ok(())
  }

  /// Binds a trigger, collapses duplicate bindings onto the fresh one, and records the survivor.
  async fn bind_trigger(&mut self, trigger: &TriggerSpec) -> Result<NodeHandle, RewireError> {
    let binding = self
      .client
      .bind_event(&trigger.name, &trigger.event, &trigger.handler, trigger.position)
      .await?;
    let dedupe = self
      .client
      .dedupe_bound_events(&trigger.name, &trigger.event, EXEC_OUTPUT_PIN, &binding.node)
      .await?;
    let kept = dedupe.kept.clone();
    self.scope.record(event_key(&trigger.name), kept.clone())?;
    self.report.bindings.push(binding);
    self.report.dedupes.push(TriggerDedupe {
      trigger: trigger.name.clone(),
      report: dedupe,
    });
    Ok(kept)
  }

  async fn clear_owned_chain(&mut self, event: &NodeHandle) -> Result<(), RewireError> {
    if self.preserve() {
      let removed = self.client.clear_execution_chain(event, EXEC_OUTPUT_PIN).await?;
      self.report.cleared_chain_nodes += removed;
    }
    Ok(())
  }

  /// Binds each delegate after the previous one, all targeting one subsystem accessor.
  #[instrument(level = "trace", skip(self, lifecycle), fields(anchor = %lifecycle.anchor.name))]
  async fn wire_lifecycle(&mut self, lifecycle: &LifecycleSpec) -> Result<(), RewireError> {
    let anchor = self.bind_trigger(&lifecycle.anchor).await?;
    self.clear_owned_chain(&anchor).await?;

    let scope_name = lifecycle.anchor.name.as_str();
    let accessor = self
      .client
      .create_subsystem_accessor_node(&lifecycle.subsystem_type, lifecycle.accessor_position)
      .await?;
    self.created(HandleScope::key(scope_name, "subsystem"), accessor.clone())?;
    self.client.connect_execution(&anchor, &accessor).await?;

    let mut predecessor = accessor.clone();
    for delegate in &lifecycle.delegates {
      let (assign, custom_event) = self
        .client
        .bind_multicast_delegate(&delegate.name, &accessor, &predecessor, delegate.position)
        .await?;
      self.created(HandleScope::key(scope_name, &format!("{}.assign", delegate.name)), assign.clone())?;
      self.created(
        HandleScope::key(scope_name, &format!("{}.event", delegate.name)),
        custom_event.clone(),
      )?;

      let mut log_params = Params::new();
      log_params.insert("InString".to_string(), Value::String(delegate.log_message.clone()));
      let log = self
        .client
        .create_function_call_node(
          DIAGNOSTIC_LOG_TARGET,
          DIAGNOSTIC_LOG_FUNCTION,
          delegate.log_position,
          &log_params,
        )
        .await?;
      self.created(HandleScope::key(scope_name, &format!("{}.log", delegate.name)), log.clone())?;
      self.client.connect_execution(&custom_event, &log).await?;
      predecessor = assign;
    }
    Ok(())
  }

  /// Creates a chain's nodes, wires subsystem `self` pins and data links, then lays the
  /// execution path from the trigger through every exec step in order.
  #[instrument(level = "trace", skip(self, chain), fields(chain = %chain.trigger))]
  async fn wire_chain(&mut self, chain: &ChainSpec) -> Result<(), RewireError> {
    let trigger = self.scope.get(&event_key(&chain.trigger))?.clone();
    self.clear_owned_chain(&trigger).await?;

    let mut output_pins: HashMap<&str, String> = HashMap::new();
    for step in &chain.steps {
      let node = match &step.kind {
        StepKind::SubsystemAccessor { subsystem_type } => {
          self
            .client
            .create_subsystem_accessor_node(subsystem_type, step.position)
            .await?
        }
        StepKind::FunctionCall {
          target,
          function,
          params,
        } => {
          self
            .client
            .create_function_call_node(target, function, step.position, params)
            .await?
        }
        StepKind::StructLiteral {
          struct_type,
          fields,
        } => {
          let (node, pin) = self
            .client
            .create_struct_literal_node(struct_type, step.position, fields)
            .await?;
          output_pins.insert(step.name.as_str(), pin);
          node
        }
      };
      self.created(HandleScope::key(&chain.trigger, &step.name), node)?;
    }

    let node = |name: &str| self.scope.get(&HandleScope::key(&chain.trigger, name)).cloned();

    if let Some(accessor) = chain.accessor() {
      let accessor = node(&accessor.name)?;
      for step in chain.steps.iter().filter(|s| s.needs_subsystem) {
        self
          .client
          .connect_data(&accessor, SUBSYSTEM_RESULT_PIN, &node(&step.name)?, SELF_PIN)
          .await?;
      }
    }

    for link in &chain.data_links {
      let from_pin = link
        .from_pin
        .as_deref()
        .or_else(|| output_pins.get(link.from.as_str()).map(String::as_str))
        .unwrap_or(RETURN_VALUE_PIN);
      self
        .client
        .connect_data(&node(&link.from)?, from_pin, &node(&link.to)?, &link.to_pin)
        .await?;
    }

    let mut predecessor = trigger;
    for step in chain.exec_path() {
      let next = node(&step.name)?;
      self.client.connect_execution(&predecessor, &next).await?;
      predecessor = next;
    }
    Ok(())
  }

  fn created(&mut self, key: String, node: NodeHandle) -> Result<(), RewireError> {
    self.report.nodes_created += 1;
    self.scope.record(key, node)
  }
}
