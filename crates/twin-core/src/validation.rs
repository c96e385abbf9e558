//! Range checks applied once when a configuration enters the system.

use crate::{Agents, Config, Distribution, Economy, Physics, Scenario, SimParams};
use thiserror::Error;
use tracing::debug;

/// Validation errors for configuration invariants. Each names the field path.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    /// Numeric field must be finite.
    #[error("non-finite value at {0}")]
    NonFinite(String),
    /// Field must be strictly positive.
    #[error("{0} must be > 0")]
    NonPositive(String),
    /// Field must be non-negative.
    #[error("{0} must be >= 0")]
    Negative(String),
    /// Field lies outside its declared interval.
    #[error("{field} = {value} is out of range {range}")]
    OutOfRange {
        field: String,
        value: f64,
        range: &'static str,
    },
    /// Ingestion latency components must be Normal distributions.
    #[error("{field} must be a normal distribution, got {kind}")]
    LatencyNotNormal { field: String, kind: &'static str },
}

/// Failure to turn JSON text into a validated [`Config`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Text is not JSON or does not match the configuration records.
    #[error("malformed configuration: {0}")]
    Malformed(#[from] serde_json::Error),
    /// Records decoded but a value violates its range.
    #[error("invalid configuration: {0}")]
    Invalid(#[from] ValidationError),
}

fn finite(field: &str, v: f64) -> Result<f64, ValidationError> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(ValidationError::NonFinite(field.to_string()))
    }
}

fn positive(field: &str, v: f64) -> Result<(), ValidationError> {
    if finite(field, v)? <= 0.0 {
        return Err(ValidationError::NonPositive(field.to_string()));
    }
    Ok(())
}

fn non_negative(field: &str, v: f64) -> Result<(), ValidationError> {
    if finite(field, v)? < 0.0 {
        return Err(ValidationError::Negative(field.to_string()));
    }
    Ok(())
}

/// Validate one distribution's parameters.
pub fn validate_distribution(field: &str, d: &Distribution) -> Result<(), ValidationError> {
    match *d {
        Distribution::Normal { mean, std } => {
            finite(&format!("{field}.mean"), mean)?;
            positive(&format!("{field}.std"), std)
        }
        Distribution::Beta { alpha, beta } => {
            positive(&format!("{field}.alpha"), alpha)?;
            positive(&format!("{field}.beta"), beta)
        }
        Distribution::LogNormal { mean, sigma } => {
            positive(&format!("{field}.mean"), mean)?;
            positive(&format!("{field}.sigma"), sigma)
        }
    }
}

/// Validate Monte Carlo controls.
pub fn validate_sim_params(p: &SimParams) -> Result<(), ValidationError> {
    if p.runs == 0 {
        return Err(ValidationError::NonPositive("sim_params.runs".into()));
    }
    if p.time_horizon_months == 0 {
        return Err(ValidationError::NonPositive(
            "sim_params.time_horizon_months".into(),
        ));
    }
    Ok(())
}

fn validate_physics(p: &Physics) -> Result<(), ValidationError> {
    for (name, d) in &p.ingestion_latency_minutes {
        let field = format!("physics.ingestion_latency_minutes.{name}");
        if !matches!(d, Distribution::Normal { .. }) {
            return Err(ValidationError::LatencyNotNormal {
                field,
                kind: d.kind(),
            });
        }
        validate_distribution(&field, d)?;
    }
    for (name, d) in &p.failure_rates {
        validate_distribution(&format!("physics.failure_rates.{name}"), d)?;
    }
    for (name, d) in &p.scraping_risks {
        validate_distribution(&format!("physics.scraping_risks.{name}"), d)?;
    }
    Ok(())
}

fn validate_agents(a: &Agents) -> Result<(), ValidationError> {
    positive(
        "agents.cfo.budget_threshold_monthly_usd",
        a.cfo.budget_threshold_monthly_usd,
    )?;
    let veto = finite("agents.cfo.veto_on_margin_below", a.cfo.veto_on_margin_below)?;
    if veto <= 0.0 || veto >= 1.0 {
        return Err(ValidationError::OutOfRange {
            field: "agents.cfo.veto_on_margin_below".into(),
            value: veto,
            range: "(0, 1)",
        });
    }
    let flex = finite("agents.cfo.spend_flex_percent", a.cfo.spend_flex_percent)?;
    if !(0.0..=1.0).contains(&flex) {
        return Err(ValidationError::OutOfRange {
            field: "agents.cfo.spend_flex_percent".into(),
            value: flex,
            range: "[0, 1]",
        });
    }
    finite(
        "agents.legal.veto_triggers.terms_violation_probability_gt",
        a.legal.veto_triggers.terms_violation_probability_gt,
    )?;
    let model = &a.icp_buyer.purchase_probability_model;
    let w = &model.weights;
    for (field, v) in [
        ("intercept", model.intercept),
        ("weights.research_intensity", w.research_intensity),
        ("weights.funding_history_score", w.funding_history_score),
        ("weights.data_freshness_days", w.data_freshness_days),
        ("weights.coverage_ratio", w.coverage_ratio),
    ] {
        finite(
            &format!("agents.icp_buyer.purchase_probability_model.{field}"),
            v,
        )?;
    }
    Ok(())
}

fn validate_economy(e: &Economy) -> Result<(), ValidationError> {
    validate_distribution("economy.cac", &e.cac)?;
    validate_distribution("economy.ltv", &e.ltv)?;
    for (name, fee) in &e.pricing.service_first {
        non_negative(&format!("economy.pricing.service_first.{name}"), *fee)?;
    }
    for (group, tiers) in &e.pricing.product_led {
        for tier in tiers {
            positive(
                &format!(
                    "economy.pricing.product_led.{group}.{}.price_monthly",
                    tier.name
                ),
                tier.price_monthly,
            )?;
        }
    }
    for (name, v) in &e.churn_triggers {
        finite(&format!("economy.churn_triggers.{name}"), *v)?;
    }
    Ok(())
}

/// Validate one scenario's multipliers.
pub fn validate_scenario(name: &str, s: &Scenario) -> Result<(), ValidationError> {
    non_negative(
        &format!("scenarios.{name}.scraping_multiplier"),
        s.scraping_multiplier,
    )?;
    positive(
        &format!("scenarios.{name}.api_cost_multiplier"),
        s.api_cost_multiplier,
    )?;
    positive(
        &format!("scenarios.{name}.latency_penalty_multiplier"),
        s.latency_penalty_multiplier,
    )?;
    positive(
        &format!("scenarios.{name}.legal_risk_multiplier"),
        s.legal_risk_multiplier,
    )
}

/// Validate the whole configuration.
pub fn validate_config(cfg: &Config) -> Result<(), ValidationError> {
    validate_sim_params(&cfg.sim_params)?;
    validate_physics(&cfg.physics)?;
    validate_agents(&cfg.agents)?;
    validate_economy(&cfg.economy)?;
    for (name, s) in &cfg.scenarios {
        validate_scenario(name, s)?;
    }
    Ok(())
}

/// Parse JSON text and validate the result.
pub fn load_config_str(text: &str) -> Result<Config, ConfigError> {
    let cfg: Config = serde_json::from_str(text)?;
    validate_config(&cfg)?;
    debug!(
        scenarios = cfg.scenarios.len(),
        requested = cfg.meta.scenarios.len(),
        runs = cfg.sim_params.runs,
        "configuration validated"
    );
    Ok(cfg)
}
