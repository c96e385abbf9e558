//! Text-in, text-out contract used by interactive front-ends.
//!
//! Front-ends hand over raw JSON and get back either the formatted results
//! with a success status, or an empty result with an error status. Nothing
//! here panics on bad input.

use tracing::warn;
use twin_core::{validate_config, Config};

use crate::orchestrator::run_all;

/// Bundled starting configuration.
pub const TEMPLATE_JSON: &str = include_str!("../../../configs/dt_config_template.json");

/// Status text for a successful run.
pub const STATUS_COMPLETED: &str = "Simulation completed.";

/// Formatted output and status line of one run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunResponse {
    /// Pretty-printed results, empty on failure.
    pub output: String,
    pub status: String,
}

impl RunResponse {
    fn failed(status: String) -> Self {
        warn!(%status, "run failed");
        Self {
            output: String::new(),
            status,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == STATUS_COMPLETED
    }
}

/// Parse `json_text`, run every requested scenario and format the results.
pub fn run_json(json_text: &str) -> RunResponse {
    let value: serde_json::Value = match serde_json::from_str(json_text) {
        Ok(v) => v,
        Err(e) => return RunResponse::failed(format!("Invalid JSON: {e}")),
    };
    let cfg: Config = match serde_json::from_value(value) {
        Ok(cfg) => cfg,
        Err(e) => return RunResponse::failed(format!("Simulation error: {e}")),
    };
    if let Err(e) = validate_config(&cfg) {
        return RunResponse::failed(format!("Simulation error: {e}"));
    }
    let results = match run_all(&cfg) {
        Ok(r) => r,
        Err(e) => return RunResponse::failed(format!("Simulation error: {e}")),
    };
    match serde_json::to_string_pretty(&results) {
        Ok(output) => RunResponse {
            output,
            status: STATUS_COMPLETED.to_string(),
        },
        Err(e) => RunResponse::failed(format!("Simulation error: {e}")),
    }
}

/// The bundled template, pretty-printed for an editor.
pub fn template_json() -> String {
    serde_json::from_str::<serde_json::Value>(TEMPLATE_JSON)
        .and_then(|v| serde_json::to_string_pretty(&v))
        .unwrap_or_else(|_| TEMPLATE_JSON.to_string())
}
