//! Runs every requested scenario and collects the summaries.

use tracing::info;
use twin_core::{Config, SimulationResults};

use crate::engine::run_scenario;
use crate::SimError;

/// Run each scenario named in `meta.scenarios`, in order.
///
/// Every identifier is checked against `scenarios` before anything runs, so a
/// bad name fails the call without doing any work. Any scenario failure aborts
/// the whole call; no partial results are returned.
pub fn run_all(cfg: &Config) -> Result<SimulationResults, SimError> {
    if let Some(missing) = cfg
        .meta
        .scenarios
        .iter()
        .find(|key| !cfg.scenarios.contains_key(key.as_str()))
    {
        return Err(SimError::MissingConfigField(format!("scenarios.{missing}")));
    }

    let mut results = SimulationResults::new();
    for key in &cfg.meta.scenarios {
        let summary = run_scenario(cfg, key)?;
        results.insert(key.clone(), summary);
    }
    info!(scenarios = results.len(), "simulation complete");
    Ok(results)
}
