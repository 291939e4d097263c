//! Declarative rebuild plan: which triggers to bind and which chains to hang off them.
//!
//! A plan is static configuration. The orchestrator interprets it with one generic loop,
//! so adding a chain means adding data, not code. Plans round-trip through JSON
//! (`--plan file.json`).

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::RewireError;
use crate::types::{HandleScope, Params, Position};

/// Output pin carrying a subsystem accessor's resolved instance.
pub const SUBSYSTEM_RESULT_PIN: &str = "ReturnValue";
/// Target pin that receives the subsystem instance on member calls.
pub const SELF_PIN: &str = "self";
/// Output pin of a function call's return value.
pub const RETURN_VALUE_PIN: &str = "ReturnValue";
/// Library and function used for the lifecycle diagnostic log nodes.
pub const DIAGNOSTIC_LOG_TARGET: &str = "UKismetSystemLibrary";
pub const DIAGNOSTIC_LOG_FUNCTION: &str = "PrintString";

/// A trigger (e.g. a button) whose event gets bound to a named handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerSpec {
  pub name: String,
  pub event: String,
  pub handler: String,
  pub position: Position,
}

impl TriggerSpec {
  /// `OnClicked` bound to `On<name>Clicked`.
  pub fn clicked(name: &str, position: Position) -> Self {
    Self {
      name: name.to_string(),
      event: "OnClicked".to_string(),
      handler: format!("On{}Clicked", name),
      position,
    }
  }
}

/// What node a chain step creates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepKind {
  SubsystemAccessor {
    subsystem_type: String,
  },
  FunctionCall {
    target: String,
    function: String,
    #[serde(default)]
    params: Params,
  },
  StructLiteral {
    struct_type: String,
    #[serde(default)]
    fields: Params,
  },
}

fn default_true() -> bool {
  true
}

/// One node of a chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSpec {
  /// Logical name, unique within the chain; used by data links.
  pub name: String,
  #[serde(flatten)]
  pub kind: StepKind,
  pub position: Position,
  /// Whether the step sits on the chain's execution path (false for pure/data-only nodes).
  #[serde(default = "default_true")]
  pub exec: bool,
  /// Whether the step's `self` pin takes the chain's subsystem accessor result.
  #[serde(default)]
  pub needs_subsystem: bool,
}

impl StepSpec {
  pub fn accessor(name: &str, subsystem_type: &str, position: Position) -> Self {
    Self {
      name: name.to_string(),
      kind: StepKind::SubsystemAccessor {
        subsystem_type: subsystem_type.to_string(),
      },
      position,
      exec: true,
      needs_subsystem: false,
    }
  }

  pub fn call(name: &str, target: &str, function: &str, position: Position, params: Params) -> Self {
    Self {
      name: name.to_string(),
      kind: StepKind::FunctionCall {
        target: target.to_string(),
        function: function.to_string(),
        params,
      },
      position,
      exec: true,
      needs_subsystem: false,
    }
  }

  pub fn struct_literal(name: &str, struct_type: &str, position: Position, fields: Params) -> Self {
    Self {
      name: name.to_string(),
      kind: StepKind::StructLiteral {
        struct_type: struct_type.to_string(),
        fields,
      },
      position,
      exec: false,
      needs_subsystem: false,
    }
  }

  /// Member call on the chain's subsystem instance.
  pub fn on_subsystem(mut self) -> Self {
    self.needs_subsystem = true;
    self
  }

  /// Keeps the step off the execution path.
  pub fn data_only(mut self) -> Self {
    self.exec = false;
    self
  }

  pub fn is_accessor(&self) -> bool {
    matches!(self.kind, StepKind::SubsystemAccessor { .. })
  }
}

/// Extra data connection between two steps of the same chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataLink {
  pub from: String,
  /// Defaults to the struct output pin for struct literals, `ReturnValue` otherwise.
  #[serde(default)]
  pub from_pin: Option<String>,
  pub to: String,
  pub to_pin: String,
}

impl DataLink {
  pub fn new(from: &str, to: &str, to_pin: &str) -> Self {
    Self {
      from: from.to_string(),
      from_pin: None,
      to: to.to_string(),
      to_pin: to_pin.to_string(),
    }
  }
}

/// Chain rooted at one trigger: steps in execution order plus data links.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainSpec {
  pub trigger: String,
  pub steps: Vec<StepSpec>,
  #[serde(default)]
  pub data_links: Vec<DataLink>,
}

impl ChainSpec {
  pub fn accessor(&self) -> Option<&StepSpec> {
    self.steps.iter().find(|s| s.is_accessor())
  }

  pub fn step(&self, name: &str) -> Option<&StepSpec> {
    self.steps.iter().find(|s| s.name == name)
  }

  /// Steps on the execution path, in order.
  pub fn exec_path(&self) -> impl Iterator<Item = &StepSpec> {
    self.steps.iter().filter(|s| s.exec)
  }
}

/// One multicast delegate bound during lifecycle wiring, with its diagnostic log node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelegateSpec {
  pub name: String,
  pub position: Position,
  pub log_position: Position,
  pub log_message: String,
}

/// Lifecycle wiring: bind delegates one after another off a single subsystem accessor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleSpec {
  /// Lifecycle event that starts the binding sequence.
  pub anchor: TriggerSpec,
  pub subsystem_type: String,
  pub accessor_position: Position,
  pub delegates: Vec<DelegateSpec>,
}

/// How the run makes the host save the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum PersistStrategy {
  /// Re-issue one trigger's binding call; relies on the host saving on mutation.
  RebindTrigger { trigger: String },
  /// Dedicated host command taking only `blueprint_name`.
  Command { name: String },
}

/// Target topology of one graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RebuildPlan {
  pub graph_name: String,
  pub triggers: Vec<TriggerSpec>,
  #[serde(default)]
  pub lifecycle: Option<LifecycleSpec>,
  #[serde(default)]
  pub chains: Vec<ChainSpec>,
  /// Defaults to re-binding the first trigger.
  #[serde(default)]
  pub persist: Option<PersistStrategy>,
}

impl RebuildPlan {
  pub fn trigger(&self, name: &str) -> Option<&TriggerSpec> {
    self.triggers.iter().find(|t| t.name == name)
  }

  /// Persist strategy in effect; `None` only for a plan without triggers.
  pub fn persist_strategy(&self) -> Option<PersistStrategy> {
    self.persist.clone().or_else(|| {
      self.triggers.first().map(|t| PersistStrategy::RebindTrigger {
        trigger: t.name.clone(),
      })
    })
  }

  /// Checks the plan is self-consistent. Runs before any command is sent.
  #[instrument(level = "trace", skip(self))]
  pub fn validate(&self) -> Result<(), RewireError> {
    if self.graph_name.trim().is_empty() {
      return invalid("graph_name is empty".to_string());
    }
    if self.triggers.is_empty() {
      return invalid("no triggers".to_string());
    }
    let mut trigger_names = HashSet::new();
    for t in &self.triggers {
      check_name("trigger", &t.name)?;
      if !trigger_names.insert(t.name.as_str()) {
        return invalid(format!("trigger '{}' listed twice", t.name));
      }
    }

    let mut chained = HashSet::new();
    for chain in &self.chains {
      validate_chain(chain, &trigger_names)?;
      if !chained.insert(chain.trigger.as_str()) {
        return invalid(format!("trigger '{}' has more than one chain", chain.trigger));
      }
    }

    if let Some(lifecycle) = &self.lifecycle {
      if trigger_names.contains(lifecycle.anchor.name.as_str()) {
        return invalid(format!(
          "lifecycle anchor '{}' is also a trigger",
          lifecycle.anchor.name
        ));
      }
      check_name("lifecycle anchor", &lifecycle.anchor.name)?;
      if lifecycle.delegates.is_empty() {
        return invalid("lifecycle has no delegates".to_string());
      }
      let mut delegates = HashSet::new();
      for d in &lifecycle.delegates {
        check_name("delegate", &d.name)?;
        if !delegates.insert(d.name.as_str()) {
          return invalid(format!("delegate '{}' listed twice", d.name));
        }
      }
    }

    match &self.persist {
      Some(PersistStrategy::RebindTrigger { trigger }) if !trigger_names.contains(trigger.as_str()) => {
        invalid(format!("persist trigger '{}' is not a trigger", trigger))
      }
      Some(PersistStrategy::Command { name }) if name.trim().is_empty() => {
        invalid("persist command name is empty".to_string())
      }
      _ => Ok(()),
    }
  }
}

fn validate_chain(chain: &ChainSpec, triggers: &HashSet<&str>) -> Result<(), RewireError> {
  let at = |msg: String| invalid(format!("chain '{}': {}", chain.trigger, msg));
  if !triggers.contains(chain.trigger.as_str()) {
    return at("trigger is not bound".to_string());
  }
  if chain.exec_path().next().is_none() {
    return at("no step on the execution path".to_string());
  }
  let mut names = HashSet::new();
  for step in &chain.steps {
    if let Err(RewireError::InvalidPlan(msg)) = check_name("step", &step.name) {
      return at(msg);
    }
    if step.name == HandleScope::BINDING_STEP {
      return at(format!("step name '{}' is reserved for the trigger binding", step.name));
    }
    if !names.insert(step.name.as_str()) {
      return at(format!("step '{}' listed twice", step.name));
    }
  }
  let accessors = chain.steps.iter().filter(|s| s.is_accessor()).count();
  if accessors > 1 {
    return at("more than one subsystem accessor".to_string());
  }
  if accessors == 0 {
    if let Some(s) = chain.steps.iter().find(|s| s.needs_subsystem) {
      return at(format!("step '{}' needs a subsystem but none is created", s.name));
    }
  }
  for link in &chain.data_links {
    for end in [&link.from, &link.to] {
      if !names.contains(end.as_str()) {
        return at(format!("data link references unknown step '{}'", end));
      }
    }
  }
  Ok(())
}

/// Names become handle keys, so they must be non-empty and free of the key separator.
fn check_name(what: &str, name: &str) -> Result<(), RewireError> {
  if name.trim().is_empty() {
    return invalid(format!("{} name is empty", what));
  }
  if name.contains(HandleScope::SEPARATOR) {
    return invalid(format!(
      "{} name '{}' contains '{}'",
      what,
      name,
      HandleScope::SEPARATOR
    ));
  }
  Ok(())
}

fn invalid(msg: String) -> Result<(), RewireError> {
  Err(RewireError::InvalidPlan(msg))
}

/// Loads and validates a plan from a JSON file.
#[instrument(level = "trace", skip(path))]
pub fn load_plan(path: &Path) -> Result<RebuildPlan, RewireError> {
  let bytes = std::fs::read(path)?;
  let plan: RebuildPlan = serde_json::from_slice(&bytes)?;
  plan.validate()?;
  Ok(plan)
}
