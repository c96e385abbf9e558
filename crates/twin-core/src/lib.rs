#![deny(warnings)]

//! Core domain models and invariants for the digital twin simulator.
//!
//! This crate defines the serializable configuration records consumed by the
//! engine, the summary records it produces, and validation helpers that
//! enforce the configuration ranges once at the boundary.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

mod validation;

pub use validation::{
    load_config_str, validate_config, validate_distribution, validate_scenario,
    validate_sim_params, ConfigError, ValidationError,
};

/// Errors raised while decoding a distribution from its tagged wire form.
#[derive(Debug, Error, PartialEq)]
pub enum DistributionError {
    /// The `distribution` tag names a kind the simulator does not sample.
    #[error("unsupported distribution kind: {0}")]
    UnsupportedKind(String),
    /// A parameter required by the tagged kind is absent.
    #[error("{kind} distribution is missing parameter `{field}`")]
    MissingParameter {
        kind: &'static str,
        field: &'static str,
    },
}

/// A probability distribution over a scalar.
///
/// Encoded in JSON as an object with a `distribution` tag (`"normal"`,
/// `"beta"`, `"lognormal"`) plus the variant's parameters.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawDistribution", into = "RawDistribution")]
pub enum Distribution {
    /// Gaussian with standard deviation `std` (> 0).
    Normal { mean: f64, std: f64 },
    /// Beta(alpha, beta), both > 0. Draws lie in [0, 1].
    Beta { alpha: f64, beta: f64 },
    /// Log-normal whose *linear-space* mean is `mean` (> 0), with log-space
    /// standard deviation `sigma` (> 0).
    LogNormal { mean: f64, sigma: f64 },
}

impl Distribution {
    /// Wire tag for this variant.
    pub fn kind(&self) -> &'static str {
        match self {
            Distribution::Normal { .. } => "normal",
            Distribution::Beta { .. } => "beta",
            Distribution::LogNormal { .. } => "lognormal",
        }
    }
}

/// Tagged wire form of [`Distribution`].
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RawDistribution {
    pub distribution: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mean: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub std: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alpha: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub beta: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sigma: Option<f64>,
}

impl TryFrom<RawDistribution> for Distribution {
    type Error = DistributionError;

    fn try_from(raw: RawDistribution) -> Result<Self, Self::Error> {
        fn need(
            v: Option<f64>,
            kind: &'static str,
            field: &'static str,
        ) -> Result<f64, DistributionError> {
            v.ok_or(DistributionError::MissingParameter { kind, field })
        }
        match raw.distribution.as_str() {
            "normal" => Ok(Distribution::Normal {
                mean: need(raw.mean, "normal", "mean")?,
                std: need(raw.std, "normal", "std")?,
            }),
            "beta" => Ok(Distribution::Beta {
                alpha: need(raw.alpha, "beta", "alpha")?,
                beta: need(raw.beta, "beta", "beta")?,
            }),
            "lognormal" => Ok(Distribution::LogNormal {
                mean: need(raw.mean, "lognormal", "mean")?,
                sigma: need(raw.sigma, "lognormal", "sigma")?,
            }),
            other => Err(DistributionError::UnsupportedKind(other.to_string())),
        }
    }
}

impl From<Distribution> for RawDistribution {
    fn from(d: Distribution) -> Self {
        let mut raw = RawDistribution {
            distribution: d.kind().to_string(),
            ..RawDistribution::default()
        };
        match d {
            Distribution::Normal { mean, std } => {
                raw.mean = Some(mean);
                raw.std = Some(std);
            }
            Distribution::Beta { alpha, beta } => {
                raw.alpha = Some(alpha);
                raw.beta = Some(beta);
            }
            Distribution::LogNormal { mean, sigma } => {
                raw.mean = Some(mean);
                raw.sigma = Some(sigma);
            }
        }
        raw
    }
}

/// Run metadata. Only `scenarios` is read by the engine.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Meta {
    /// Scenario identifiers to execute, in order.
    pub scenarios: Vec<String>,
    /// Any other metadata (name, version, notes).
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Base seed of a run. Any JSON integer in `[i64::MIN, u64::MAX]` is accepted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Seed {
    Unsigned(u64),
    Signed(i64),
}

impl Seed {
    /// Seed as 64 raw bits; negative values are taken in two's complement.
    pub fn bits(self) -> u64 {
        match self {
            Seed::Unsigned(v) => v,
            Seed::Signed(v) => v as u64,
        }
    }
}

impl From<u64> for Seed {
    fn from(v: u64) -> Self {
        Seed::Unsigned(v)
    }
}

impl From<i64> for Seed {
    fn from(v: i64) -> Self {
        Seed::Signed(v)
    }
}

/// Monte Carlo controls.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimParams {
    /// Trials per scenario (>= 1).
    pub runs: u32,
    /// Base seed; `None` draws from OS entropy.
    #[serde(default)]
    pub seed: Option<Seed>,
    /// Planning horizon in months (>= 1). Informational.
    pub time_horizon_months: u32,
}

/// Physical and behavioral distributions shared by every scenario.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Physics {
    /// Latency contributions in minutes; every entry must be Normal.
    pub ingestion_latency_minutes: BTreeMap<String, Distribution>,
    pub failure_rates: BTreeMap<String, Distribution>,
    pub scraping_risks: BTreeMap<String, Distribution>,
}

/// CFO spending policy.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Cfo {
    /// Monthly budget ceiling in USD (> 0).
    pub budget_threshold_monthly_usd: f64,
    /// Gross margin below which acquisition spend is cut, in (0, 1).
    pub veto_on_margin_below: f64,
    /// Discretionary spend flexibility in [0, 1].
    pub spend_flex_percent: f64,
}

fn default_terms_threshold() -> f64 {
    1.0
}

/// Thresholds that trigger a legal veto.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VetoTriggers {
    /// Veto when modeled ToS violation probability exceeds this. Defaults to 1.0.
    #[serde(default = "default_terms_threshold")]
    pub terms_violation_probability_gt: f64,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Legal review policy.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Legal {
    pub veto_triggers: VetoTriggers,
}

/// Feature weights of the buyer's logistic purchase model.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuyerWeights {
    pub research_intensity: f64,
    pub funding_history_score: f64,
    pub data_freshness_days: f64,
    pub coverage_ratio: f64,
}

/// Logistic purchase-probability model.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PurchaseModel {
    pub intercept: f64,
    pub weights: BuyerWeights,
}

/// Ideal-customer-profile buyer agent.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IcpBuyer {
    pub purchase_probability_model: PurchaseModel,
}

/// Decision-making agents.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Agents {
    pub cfo: Cfo,
    pub legal: Legal,
    pub icp_buyer: IcpBuyer,
}

/// A product-led price tier.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PricingTier {
    pub name: String,
    /// Monthly price in USD (> 0).
    pub price_monthly: f64,
}

/// Pricing for both go-to-market motions.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Pricing {
    /// Service-first fees in USD (>= 0), e.g. `monthly_retainer`.
    pub service_first: BTreeMap<String, f64>,
    /// Product-led tier lists, e.g. `tiers`.
    pub product_led: BTreeMap<String, Vec<PricingTier>>,
}

/// Unit economics and churn inputs.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Economy {
    pub cac: Distribution,
    pub ltv: Distribution,
    pub pricing: Pricing,
    /// Churn trigger probabilities and thresholds.
    pub churn_triggers: BTreeMap<String, f64>,
}

/// One named operating mode: multipliers over the shared inputs.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Scenario {
    pub description: String,
    /// Scraping intensity (>= 0).
    pub scraping_multiplier: f64,
    /// Scales CAC (> 0).
    pub api_cost_multiplier: f64,
    /// Scales ingestion latency (> 0).
    pub latency_penalty_multiplier: f64,
    /// Scales ToS violation probability (> 0).
    pub legal_risk_multiplier: f64,
}

/// Top-level simulation configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    pub meta: Meta,
    pub sim_params: SimParams,
    pub physics: Physics,
    pub agents: Agents,
    pub economy: Economy,
    pub scenarios: BTreeMap<String, Scenario>,
}

/// Mean and nearest-rank percentiles of one output metric.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub mean: f64,
    pub p10: f64,
    pub p50: f64,
    pub p90: f64,
}

/// Summaries of every output metric for one scenario.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ScenarioSummary {
    pub revenue_usd: Summary,
    pub churn_rate: Summary,
    pub gross_margin: Summary,
    pub legal_veto_rate: Summary,
}

/// Results keyed by scenario identifier, in the order the scenarios ran.
pub type SimulationResults = IndexMap<String, ScenarioSummary>;

/// Bound `x` to `[lo, hi]`. A NaN `x` maps to `hi`.
#[inline]
pub fn clamp(x: f64, lo: f64, hi: f64) -> f64 {
    lo.max(hi.min(x))
}

/// 64-bit FNV-1a over `bytes`.
pub fn fnv1a64(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0001_0000_01b3;

    let mut hash = OFFSET;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}
