#![deny(warnings)]

//! Monte Carlo engine for the digital twin.
//!
//! - [`sampler`]: draws from configured distributions
//! - [`engine`]: one scenario's trial loop and per-trial pipeline
//! - [`report`]: mean and nearest-rank percentile summaries
//! - [`orchestrator`]: runs the requested scenarios in order
//! - [`session`]: JSON text in, formatted results and status out

mod error;

pub mod engine;
pub mod orchestrator;
pub mod report;
pub mod sampler;
pub mod session;

pub use engine::{run_scenario, scenario_seed, TrialOutcome};
pub use error::SimError;
pub use orchestrator::run_all;
pub use report::summarize;
pub use session::{run_json, template_json, RunResponse};
