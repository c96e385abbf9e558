//! Per-scenario Monte Carlo loop and the business-logic pipeline of one trial.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;
use tracing::{debug, info, trace};
use twin_core::{clamp, fnv1a64, Config, Distribution, PurchaseModel, Scenario, ScenarioSummary};

use crate::report::summarize;
use crate::sampler::{sample, sample_count};
use crate::SimError;

/// Fixed research-intensity feature fed to the buyer model.
pub const BASELINE_RESEARCH_INTENSITY: f64 = 0.6;
/// Fixed funding-history feature fed to the buyer model.
pub const BASELINE_FUNDING_HISTORY: f64 = 0.6;

/// Floor on LTV when dividing for gross margin.
const MARGIN_EPSILON: f64 = 1e-9;
const CHURN_CAP: f64 = 0.9;
/// Share of new customers kept when the CFO vetoes spend.
const CFO_RETAINED_SHARE: f64 = 0.6;
const MIN_DEMAND_RATE: f64 = 0.1;
const LATENCY_SLA_MINUTES: f64 = 60.0;
const PRECISION_BONUS_ABOVE: f64 = 0.9;

/// Outputs of one trial.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrialOutcome {
    pub revenue: f64,
    pub churn_probability: f64,
    pub gross_margin: f64,
    pub legal_veto: bool,
    /// New customers after any CFO cut.
    pub new_customers: u64,
    pub churned_customers: u64,
}

/// Configuration values one scenario's trials read, resolved up front.
#[derive(Clone, Debug)]
pub(crate) struct ScenarioInputs<'a> {
    scenario: &'a Scenario,
    model: &'a PurchaseModel,
    precision: Distribution,
    hallucination: Distribution,
    honey_pot: Distribution,
    latency_review: Distribution,
    latency_qc: Distribution,
    cac: Distribution,
    ltv: Distribution,
    price_per_customer: f64,
    missed_opportunity_prob: f64,
    latency_sla_prob: f64,
    precision_floor: f64,
    legal_threshold: f64,
    margin_veto_below: f64,
}

fn required<T: Copy>(map: &BTreeMap<String, T>, group: &str, key: &str) -> Result<T, SimError> {
    map.get(key)
        .copied()
        .ok_or_else(|| SimError::MissingConfigField(format!("{group}.{key}")))
}

/// Median product-led tier price: `sorted[len / 2]`, 0 when there are no tiers.
fn mid_tier_price(prices: impl IntoIterator<Item = f64>) -> f64 {
    let mut prices: Vec<f64> = prices.into_iter().collect();
    prices.sort_by(f64::total_cmp);
    prices.get(prices.len() / 2).copied().unwrap_or(0.0)
}

impl<'a> ScenarioInputs<'a> {
    pub(crate) fn resolve(cfg: &'a Config, key: &str) -> Result<Self, SimError> {
        let scenario = cfg
            .scenarios
            .get(key)
            .ok_or_else(|| SimError::MissingConfigField(format!("scenarios.{key}")))?;
        let physics = &cfg.physics;
        let economy = &cfg.economy;
        let tiers = economy.pricing.product_led.get("tiers").ok_or_else(|| {
            SimError::MissingConfigField("economy.pricing.product_led.tiers".into())
        })?;
        let retainer = required(
            &economy.pricing.service_first,
            "economy.pricing.service_first",
            "monthly_retainer",
        )?;
        let mid = mid_tier_price(tiers.iter().map(|t| t.price_monthly));
        let churn = &economy.churn_triggers;
        Ok(Self {
            scenario,
            model: &cfg.agents.icp_buyer.purchase_probability_model,
            precision: required(
                &physics.failure_rates,
                "physics.failure_rates",
                "recall_precision",
            )?,
            hallucination: required(
                &physics.failure_rates,
                "physics.failure_rates",
                "hallucination_rate",
            )?,
            honey_pot: required(
                &physics.scraping_risks,
                "physics.scraping_risks",
                "honey_pot_probability",
            )?,
            latency_review: required(
                &physics.ingestion_latency_minutes,
                "physics.ingestion_latency_minutes",
                "human_in_loop_validation",
            )?,
            latency_qc: required(
                &physics.ingestion_latency_minutes,
                "physics.ingestion_latency_minutes",
                "manual_qc",
            )?,
            cac: economy.cac,
            ltv: economy.ltv,
            price_per_customer: 0.5 * retainer + 0.5 * mid,
            missed_opportunity_prob: required(
                churn,
                "economy.churn_triggers",
                "missed_grant_opportunity_prob",
            )?,
            latency_sla_prob: required(
                churn,
                "economy.churn_triggers",
                "data_latency_over_sla_prob",
            )?,
            precision_floor: required(churn, "economy.churn_triggers", "precision_drop_below")?,
            legal_threshold: cfg.agents.legal.veto_triggers.terms_violation_probability_gt,
            margin_veto_below: cfg.agents.cfo.veto_on_margin_below,
        })
    }
}

fn logistic(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Seed for a scenario: the base seed bits XOR the FNV-1a hash of its identifier.
pub fn scenario_seed(base_seed: u64, scenario_key: &str) -> u64 {
    base_seed ^ fnv1a64(scenario_key.as_bytes())
}

fn terms_violation_probability(scen: &Scenario, honey_pot: f64) -> f64 {
    scen.scraping_multiplier * (0.10 + 0.5 * honey_pot) * scen.legal_risk_multiplier
}

/// Buyer-facing data quality as `(coverage_ratio, freshness_days)`.
fn data_quality(scraping_multiplier: f64, legal_veto: bool) -> (f64, f64) {
    let veto = if legal_veto { 1.0 } else { 0.0 };
    let coverage_ratio = clamp(0.75 + 0.10 * scraping_multiplier - 0.05 * veto, 0.0, 1.0);
    let freshness_days = (7.0 - 2.0 * scraping_multiplier + 0.5 * veto).max(0.0);
    (coverage_ratio, freshness_days)
}

fn win_probability(model: &PurchaseModel, coverage_ratio: f64, freshness_days: f64) -> f64 {
    let w = &model.weights;
    let linear = model.intercept
        + w.research_intensity * BASELINE_RESEARCH_INTENSITY
        + w.funding_history_score * BASELINE_FUNDING_HISTORY
        + w.data_freshness_days * freshness_days
        + w.coverage_ratio * coverage_ratio;
    clamp(logistic(linear), 0.0, 1.0)
}

/// Poisson rate of new customers, floored at [`MIN_DEMAND_RATE`].
fn demand_rate(win_prob: f64, precision: f64, latency: f64) -> f64 {
    let precision_bonus = if precision > PRECISION_BONUS_ABOVE { 1.0 } else { 0.0 };
    let demand = 3.0
        * win_prob
        * (0.8 + 0.2 * precision_bonus)
        * (1.0 - (latency / 120.0).min(0.5));
    demand.max(MIN_DEMAND_RATE)
}

fn churn_risk(
    inp: &ScenarioInputs<'_>,
    hallucination: f64,
    latency: f64,
    precision: f64,
) -> f64 {
    let precision_penalty = if precision < inp.precision_floor { 0.02 } else { 0.0 };
    clamp(
        inp.missed_opportunity_prob * (1.0 + 0.5 * hallucination)
            + inp.latency_sla_prob * (1.0 + 0.01 * (latency - LATENCY_SLA_MINUTES).max(0.0))
            + precision_penalty,
        0.0,
        CHURN_CAP,
    )
}

/// Run the pipeline once.
pub(crate) fn run_trial<R: Rng + ?Sized>(
    inp: &ScenarioInputs<'_>,
    rng: &mut R,
) -> Result<TrialOutcome, SimError> {
    let scen = inp.scenario;

    let precision = clamp(sample(&inp.precision, rng)?, 0.0, 1.0);
    let hallucination = clamp(sample(&inp.hallucination, rng)?, 0.0, 1.0);
    let honey_pot = clamp(sample(&inp.honey_pot, rng)?, 0.0, 1.0);

    let raw_latency = sample(&inp.latency_review, rng)? + sample(&inp.latency_qc, rng)?;
    let latency = raw_latency.max(0.0) * scen.latency_penalty_multiplier;

    let legal_veto = terms_violation_probability(scen, honey_pot) > inp.legal_threshold;
    let (coverage_ratio, freshness_days) = data_quality(scen.scraping_multiplier, legal_veto);
    let win_prob = win_probability(inp.model, coverage_ratio, freshness_days);

    let mut new_customers = sample_count(demand_rate(win_prob, precision, latency), rng)?;
    let churn_probability = churn_risk(inp, hallucination, latency, precision);

    let cac = sample(&inp.cac, rng)? * scen.api_cost_multiplier;
    let ltv = sample(&inp.ltv, rng)?;
    let gross_margin = clamp((ltv - cac) / ltv.max(MARGIN_EPSILON), 0.0, 1.0);

    if gross_margin < inp.margin_veto_below {
        new_customers = (new_customers as f64 * CFO_RETAINED_SHARE) as u64;
    }

    Ok(TrialOutcome {
        revenue: new_customers as f64 * inp.price_per_customer,
        churn_probability,
        gross_margin,
        legal_veto,
        new_customers,
        churned_customers: (new_customers as f64 * churn_probability) as u64,
    })
}

/// Run every trial of `scenario_key` and summarize the outputs.
///
/// With `sim_params.seed` set, the scenario is seeded by [`scenario_seed`] and
/// the result is reproducible regardless of which other scenarios run. Trial
/// `i` draws from ChaCha8 stream `i` of that seed.
pub fn run_scenario(cfg: &Config, scenario_key: &str) -> Result<ScenarioSummary, SimError> {
    let inputs = ScenarioInputs::resolve(cfg, scenario_key)?;
    let runs = cfg.sim_params.runs as usize;

    let seed = match cfg.sim_params.seed {
        Some(base) => scenario_seed(base.bits(), scenario_key),
        None => rand::random(),
    };
    info!(
        scenario = scenario_key,
        runs,
        seeded = cfg.sim_params.seed.is_some(),
        "running scenario"
    );
    debug!(scenario = scenario_key, seed, "scenario seed");

    let base_rng = ChaCha8Rng::seed_from_u64(seed);
    let mut revenue = Vec::with_capacity(runs);
    let mut churn = Vec::with_capacity(runs);
    let mut margin = Vec::with_capacity(runs);
    let mut vetoes = Vec::with_capacity(runs);

    for trial in 0..runs {
        let mut rng = base_rng.clone();
        rng.set_stream(trial as u64);
        let out = run_trial(&inputs, &mut rng)?;
        trace!(
            trial,
            revenue = out.revenue,
            customers = out.new_customers,
            churned = out.churned_customers,
            legal_veto = out.legal_veto,
            "trial"
        );
        revenue.push(out.revenue);
        churn.push(out.churn_probability);
        margin.push(out.gross_margin);
        vetoes.push(if out.legal_veto { 1.0 } else { 0.0 });
    }

    let summary = ScenarioSummary {
        revenue_usd: summarize(&revenue),
        churn_rate: summarize(&churn),
        gross_margin: summarize(&margin),
        legal_veto_rate: summarize(&vetoes),
    };
    info!(
        scenario = scenario_key,
        revenue_mean = summary.revenue_usd.mean,
        gross_margin_mean = summary.gross_margin.mean,
        legal_veto_rate = summary.legal_veto_rate.mean,
        "scenario finished"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use twin_core::load_config_str;

    const TEMPLATE: &str = include_str!("../../../configs/dt_config_template.json");

    fn template() -> Config {
        load_config_str(TEMPLATE).unwrap()
    }

    #[test]
    fn mid_tier_uses_lower_middle_on_even_counts() {
        assert_eq!(mid_tier_price([499.0, 99.0, 1999.0]), 499.0);
        // sorted [10, 20, 30, 40] -> index 2
        assert_eq!(mid_tier_price([40.0, 10.0, 30.0, 20.0]), 30.0);
        assert_eq!(mid_tier_price(Vec::<f64>::new()), 0.0);
    }

    #[test]
    fn seed_depends_on_key() {
        assert_eq!(scenario_seed(42, "A"), scenario_seed(42, "A"));
        assert_ne!(scenario_seed(42, "A"), scenario_seed(42, "B"));
        assert_eq!(scenario_seed(0, ""), 0xcbf2_9ce4_8422_2325);
        assert_eq!(scenario_seed(u64::MAX, ""), !0xcbf2_9ce4_8422_2325u64);
    }

    #[test]
    fn blended_price_averages_retainer_and_mid_tier() {
        let cfg = template();
        let inp = ScenarioInputs::resolve(&cfg, "A_shadow_mode").unwrap();
        assert_eq!(inp.price_per_customer, 0.5 * 2500.0 + 0.5 * 499.0);
    }

    #[test]
    fn trial_outputs_respect_bounds() {
        let cfg = template();
        let inp = ScenarioInputs::resolve(&cfg, "B_scrape_mode").unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for _ in 0..2_000 {
            let t = run_trial(&inp, &mut rng).unwrap();
            assert!((0.0..=CHURN_CAP).contains(&t.churn_probability));
            assert!((0.0..=1.0).contains(&t.gross_margin));
            assert!(t.revenue >= 0.0);
            assert!(t.churned_customers <= t.new_customers);
        }
    }

    #[test]
    fn no_scraping_never_vetoes() {
        let cfg = template();
        let inp = ScenarioInputs::resolve(&cfg, "A_shadow_mode").unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        for _ in 0..500 {
            assert!(!run_trial(&inp, &mut rng).unwrap().legal_veto);
        }
    }

    #[test]
    fn missing_physics_key_is_named() {
        let mut cfg = template();
        cfg.physics.failure_rates.remove("recall_precision");
        assert_eq!(
            run_scenario(&cfg, "A_shadow_mode"),
            Err(SimError::MissingConfigField(
                "physics.failure_rates.recall_precision".into()
            ))
        );
    }

    #[test]
    fn missing_churn_trigger_is_named() {
        let mut cfg = template();
        cfg.economy.churn_triggers.remove("precision_drop_below");
        assert_eq!(
            run_scenario(&cfg, "A_shadow_mode").unwrap_err(),
            SimError::MissingConfigField("economy.churn_triggers.precision_drop_below".into())
        );
    }

    #[test]
    fn unknown_scenario_is_missing_field() {
        let cfg = template();
        assert_eq!(
            run_scenario(&cfg, "C_nope").unwrap_err(),
            SimError::MissingConfigField("scenarios.C_nope".into())
        );
    }

    #[test]
    fn cfo_veto_cuts_customers() {
        let mut cfg = template();
        // CAC far above LTV forces margin to zero
        cfg.economy.cac = Distribution::Normal {
            mean: 1e7,
            std: 1.0,
        };
        cfg.agents.cfo.veto_on_margin_below = 0.5;
        let mut open_cfg = cfg.clone();
        open_cfg.agents.cfo.veto_on_margin_below = 0.0;
        let inp = ScenarioInputs::resolve(&cfg, "A_shadow_mode").unwrap();
        let inp_open = ScenarioInputs::resolve(&open_cfg, "A_shadow_mode").unwrap();
        let mut vetoed = ChaCha8Rng::seed_from_u64(5);
        let mut open = ChaCha8Rng::seed_from_u64(5);
        for _ in 0..200 {
            let cut = run_trial(&inp, &mut vetoed).unwrap();
            let full = run_trial(&inp_open, &mut open).unwrap();
            assert_eq!(cut.gross_margin, 0.0);
            assert_eq!(cut.new_customers, (full.new_customers as f64 * 0.6) as u64);
        }
    }

    fn close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    fn pinned(mean: f64) -> Distribution {
        Distribution::Normal { mean, std: 1e-12 }
    }

    #[test]
    fn terms_violation_scales_with_scraping_and_legal_risk() {
        let cfg = template();
        // 1.5 * (0.10 + 0.5 * 0.2) * 1.5
        close(
            terms_violation_probability(&cfg.scenarios["B_scrape_mode"], 0.2),
            0.45,
        );
        close(terms_violation_probability(&cfg.scenarios["A_shadow_mode"], 0.9), 0.0);
    }

    #[test]
    fn legal_veto_lowers_coverage_and_ages_data() {
        let (coverage, freshness) = data_quality(1.0, false);
        close(coverage, 0.85);
        close(freshness, 5.0);
        let (coverage, freshness) = data_quality(1.0, true);
        close(coverage, 0.80);
        close(freshness, 5.5);
        let (coverage, freshness) = data_quality(0.0, false);
        close(coverage, 0.75);
        close(freshness, 7.0);
    }

    #[test]
    fn data_quality_is_bounded() {
        // coverage 1.10 clamps to 1; freshness 7 - 8 + 0.5 floors at 0
        assert_eq!(data_quality(4.0, true), (1.0, 0.0));
    }

    #[test]
    fn win_probability_is_logistic_of_weighted_features() {
        let cfg = template();
        let model = &cfg.agents.icp_buyer.purchase_probability_model;
        // -1 + 1.2*0.6 + 0.8*0.6 - 0.15*5 + 1.5*0.85 = 0.725
        close(
            win_probability(model, 0.85, 5.0),
            1.0 / (1.0 + (-0.725f64).exp()),
        );
    }

    #[test]
    fn baseline_features_enter_at_point_six() {
        let model = PurchaseModel {
            intercept: -1.2,
            weights: twin_core::BuyerWeights {
                research_intensity: 1.0,
                funding_history_score: 1.0,
                data_freshness_days: 0.0,
                coverage_ratio: 0.0,
            },
        };
        close(win_probability(&model, 0.9, 3.0), 0.5);
    }

    #[test]
    fn precision_bonus_starts_above_point_nine() {
        // 3 * 0.5 * (0.8 + 0.2) * (1 - 30/120)
        close(demand_rate(0.5, 0.95, 30.0), 1.125);
        close(demand_rate(0.5, 0.85, 30.0), 0.9);
        close(demand_rate(0.5, 0.9, 30.0), 0.9);
    }

    #[test]
    fn latency_halves_demand_at_most() {
        close(demand_rate(0.5, 0.95, 60.0), 0.75);
        close(demand_rate(0.5, 0.95, 240.0), 0.75);
        close(demand_rate(0.5, 0.95, 0.0), 1.5);
    }

    #[test]
    fn demand_rate_has_a_floor() {
        close(demand_rate(0.01, 0.95, 30.0), MIN_DEMAND_RATE);
    }

    #[test]
    fn churn_adds_latency_term_past_sla() {
        let cfg = template();
        let inp = ScenarioInputs::resolve(&cfg, "A_shadow_mode").unwrap();
        // 0.04 * (1 + 0.5*0.1) + 0.03 * 1
        close(churn_risk(&inp, 0.1, 30.0, 0.95), 0.072);
        close(churn_risk(&inp, 0.1, 60.0, 0.95), 0.072);
        // 0.042 + 0.03 * (1 + 0.01*30)
        close(churn_risk(&inp, 0.1, 90.0, 0.95), 0.081);
    }

    #[test]
    fn churn_penalizes_precision_below_floor() {
        let cfg = template();
        let inp = ScenarioInputs::resolve(&cfg, "A_shadow_mode").unwrap();
        close(churn_risk(&inp, 0.1, 30.0, 0.80), 0.092);
        close(churn_risk(&inp, 0.1, 30.0, 0.85), 0.072);
    }

    #[test]
    fn churn_is_capped() {
        let cfg = template();
        let mut inp = ScenarioInputs::resolve(&cfg, "A_shadow_mode").unwrap();
        inp.missed_opportunity_prob = 0.8;
        // 0.8 * 1.5 + 0.03 = 1.23
        assert_eq!(churn_risk(&inp, 1.0, 30.0, 0.95), CHURN_CAP);
    }

    fn pinned_config(legal_risk: f64) -> Config {
        let mut cfg = template();
        let physics = &mut cfg.physics;
        physics.failure_rates.insert("recall_precision".into(), pinned(0.95));
        physics.failure_rates.insert("hallucination_rate".into(), pinned(0.1));
        physics.scraping_risks.insert("honey_pot_probability".into(), pinned(0.2));
        physics
            .ingestion_latency_minutes
            .insert("human_in_loop_validation".into(), pinned(50.0));
        physics.ingestion_latency_minutes.insert("manual_qc".into(), pinned(30.0));
        cfg.economy.cac = pinned(100.0);
        cfg.economy.ltv = pinned(500.0);
        if let Some(s) = cfg.scenarios.get_mut("A_shadow_mode") {
            s.scraping_multiplier = 1.0;
            s.legal_risk_multiplier = legal_risk;
        }
        cfg
    }

    #[test]
    fn pinned_trial_matches_hand_computation() {
        let cfg = pinned_config(1.5);
        let inp = ScenarioInputs::resolve(&cfg, "A_shadow_mode").unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let t = run_trial(&inp, &mut rng).unwrap();
        // terms violation 1 * 0.2 * 1.5 = 0.3 > 0.25
        assert!(t.legal_veto);
        // 0.04 * 1.05 + 0.03 * (1 + 0.01 * 20)
        close(t.churn_probability, 0.078);
        close(t.gross_margin, 0.8);
        close(t.revenue, t.new_customers as f64 * (0.5 * 2500.0 + 0.5 * 499.0));
    }

    #[test]
    fn pinned_trial_below_legal_threshold() {
        let cfg = pinned_config(1.0);
        let inp = ScenarioInputs::resolve(&cfg, "A_shadow_mode").unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let t = run_trial(&inp, &mut rng).unwrap();
        // terms violation 0.2 <= 0.25
        assert!(!t.legal_veto);
        close(t.churn_probability, 0.078);
    }
}
