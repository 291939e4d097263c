//! Run report persistence.
//!
//! The report is written after the run has ended, whether it reached `done` or aborted,
//! so a failed rebuild still leaves its state trail and failing command on disk.

use std::path::Path;

use tracing::{debug, instrument};

use crate::error::RewireError;
use crate::orchestrator::RunReport;

/// Default filename for a run report under a run directory.
pub const RUN_REPORT_FILENAME: &str = "rewire-report.json";

/// Writes `report` to `path` as pretty JSON, creating missing parent directories.
#[instrument(level = "trace", skip(path, report), fields(graph = %report.graph_name))]
pub fn save_run_report(path: &Path, report: &RunReport) -> Result<(), RewireError> {
  let json = serde_json::to_vec_pretty(report)?;
  if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
    std::fs::create_dir_all(parent)?;
  }
  std::fs::write(path, &json)?;
  debug!(path = %path.display(), bytes = json.len(), states = report.states.len(), "run report saved");
  Ok(())
}
