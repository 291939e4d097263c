//! CLI: Rebuild a widget event graph through the editor's command endpoint.
//!
//! Uses the built-in `WBP_LocalMatchDebug` plan unless `--plan` names a JSON plan file.
//! Exits 0 when the run reaches `done`, 1 on the first failure.
//!
//! Usage: `rewire_graph [OPTIONS]`
//! Example: rewire_graph --mode preserve --wire-lifecycle
//!
//! Set RUST_LOG=graph_rewire=trace for TRACE-level span enter/exit and events.

use clap::{Parser, ValueEnum};
use graph_rewire::run_report_io::save_run_report;
use graph_rewire::transport::{DEFAULT_HOST, DEFAULT_PORT};
use graph_rewire::{
  GraphClient, Orchestrator, RebuildMode, RunOptions, RunReport, TcpTransport,
  local_match_debug_plan, load_plan,
};
use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt::format::FmtSpan};

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Mode {
  /// Clear the whole graph, bound events included, then rebuild.
  FullClear,
  /// Replace only the chains hanging off the plan's triggers.
  Preserve,
}

impl From<Mode> for RebuildMode {
  fn from(m: Mode) -> Self {
    match m {
      Mode::FullClear => RebuildMode::FullClear,
      Mode::Preserve => RebuildMode::Preserve,
    }
  }
}

/// Rebuild a widget event graph through the editor's command endpoint.
#[derive(Parser, Debug)]
#[command(name = "rewire_graph")]
#[command(after_help = r#"Examples:
  rewire_graph
  rewire_graph --mode preserve --wire-lifecycle
  rewire_graph --bindings-only --report run/rewire-report.json
  rewire_graph --plan plans/debug_widget.json --graph WBP_Other"#)]
struct Args {
  /// Host of the editor's command endpoint.
  #[arg(long, env = "REWIRE_HOST", default_value = DEFAULT_HOST)]
  host: String,

  /// Port of the editor's command endpoint.
  #[arg(long, env = "REWIRE_PORT", default_value_t = DEFAULT_PORT)]
  port: u16,

  /// Wait limit per command (connect + send + receive), in seconds.
  #[arg(long, value_name = "SECS", default_value_t = 20)]
  timeout_secs: u64,

  /// Target graph; overrides the plan's graph name.
  #[arg(long, value_name = "NAME")]
  graph: Option<String>,

  #[arg(long, value_enum, default_value_t = Mode::FullClear)]
  mode: Mode,

  /// (Re)build lifecycle delegate wiring.
  #[arg(long)]
  wire_lifecycle: bool,

  /// Clear, bind and dedupe triggers, compile and persist; build no chains.
  #[arg(long)]
  bindings_only: bool,

  /// JSON rebuild plan to use instead of the built-in one.
  #[arg(long, value_name = "FILE")]
  plan: Option<PathBuf>,

  /// Write the run report as JSON here, whether the run succeeds or not.
  #[arg(long, value_name = "FILE")]
  report: Option<PathBuf>,
}

fn write_report(path: Option<&Path>, report: &RunReport) {
  if let Some(path) = path {
    match save_run_report(path, report) {
      Ok(()) => info!(path = %path.display(), "run report written"),
      Err(e) => warn!(path = %path.display(), error = %e, "could not write run report"),
    }
  }
}

fn print_progress(report: &RunReport) {
  for binding in &report.bindings {
    println!(
      "[OK] Bound {}.{} -> {} ({})",
      binding.trigger, binding.event, binding.handler, binding.node
    );
  }
  for dedupe in report.dedupes.iter().filter(|d| d.report.removed_anything()) {
    println!(
      "[OK] Deduped {}: removed {} event(s), {} chain node(s)",
      dedupe.trigger, dedupe.report.removed_event_count, dedupe.report.removed_chain_node_count
    );
  }
  if let Some(compiled) = &report.compile_result {
    println!("[OK] Compiled: {}", compiled);
  }
}

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_span_events(FmtSpan::ENTER | FmtSpan::EXIT)
    .with_writer(std::io::stderr)
    .init();

  let args = Args::parse();
  info!(host = %args.host, port = args.port, mode = ?args.mode, "rewire_graph starting");

  let mut plan = match &args.plan {
    Some(path) => match load_plan(path) {
      Ok(p) => p,
      Err(e) => {
        eprintln!("[ERROR] {}: {}", path.display(), e);
        process::exit(1);
      }
    },
    None => local_match_debug_plan(),
  };
  if let Some(graph) = &args.graph {
    plan.graph_name = graph.clone();
  }

  let transport = TcpTransport::new(&args.host, args.port, Duration::from_secs(args.timeout_secs));
  let client = GraphClient::new(transport, &plan.graph_name);
  let options = RunOptions {
    mode: args.mode.into(),
    wire_lifecycle: args.wire_lifecycle,
    bindings_only: args.bindings_only,
  };

  match Orchestrator::new(&client, &plan, options).run().await {
    Ok(report) => {
      print_progress(&report);
      write_report(args.report.as_deref(), &report);
      println!(
        "[DONE] {} rebuilt ({} nodes, {} commands)",
        report.graph_name, report.nodes_created, report.commands_sent
      );
    }
    Err(aborted) => {
      print_progress(&aborted.report);
      write_report(args.report.as_deref(), &aborted.report);
      eprintln!("[ERROR] {}", aborted.error);
      if let Some(state) = aborted.report.states.iter().rev().nth(1) {
        eprintln!("[ERROR] last completed state: {}", state);
      }
      process::exit(1);
    }
  }
}
