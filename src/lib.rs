//! # graph-rewire
//!
//! Rebuilds event-driven node graphs inside a remote editor over its JSON-over-TCP
//! command endpoint.
//!
//! ## Architecture
//!
//! - `transport`: one TCP connection per command, parse-driven response framing.
//! - `envelope`: the success/failure contract every primitive applies to its result.
//! - `graph_client`: typed graph-mutation primitives, one host command each.
//! - `plan` / `default_plan`: declarative target topology (triggers, chains, lifecycle).
//! - `orchestrator`: interprets a plan as a strictly sequential, fail-fast state machine.
//!
//! Set RUST_LOG=graph_rewire=trace for TRACE-level span enter/exit and events.

pub mod default_plan;
pub mod envelope;
pub mod error;
pub mod graph_client;
pub mod orchestrator;
pub mod plan;
pub mod run_report_io;
#[cfg(test)]
mod test_host;
pub mod transport;
pub mod types;

pub use default_plan::local_match_debug_plan;
pub use error::RewireError;
pub use graph_client::GraphClient;
pub use orchestrator::{Orchestrator, RebuildMode, RunAborted, RunOptions, RunReport, RunState};
pub use plan::{RebuildPlan, load_plan};
pub use transport::{TcpTransport, Transport};
