//! Data model shared by the transport, the graph primitives and the orchestrator.
//!
//! Node handles and pins are opaque strings owned by the host; the client only threads
//! them from one call into the next within a single run.

mod command;
mod command_result;
mod event_binding;
mod handle_scope;
mod node_handle;

pub use command::Command;
pub use command_result::{CommandResult, FailureKind};
pub use event_binding::{DedupeReport, EventBinding};
pub use handle_scope::HandleScope;
pub use node_handle::{EXEC_INPUT_PIN, EXEC_OUTPUT_PIN, NodeHandle, PinRef, Position};

/// Ordered parameter object of a [Command].
pub type Params = serde_json::Map<String, serde_json::Value>;
