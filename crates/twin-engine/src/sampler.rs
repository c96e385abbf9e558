//! Scalar draws from configured distributions.

use rand::Rng;
use rand_distr::{Beta, Distribution as _, LogNormal, Normal, Poisson};
use twin_core::Distribution;

use crate::SimError;

fn rejected(kind: &'static str, reason: impl ToString) -> SimError {
    SimError::InvalidDistributionParameters {
        kind,
        reason: reason.to_string(),
    }
}

/// Draw one value from `dist`.
///
/// For `LogNormal` the configured `mean` is the linear-space expectation, so
/// the log-space location is `ln(mean) - sigma^2 / 2`.
pub fn sample<R: Rng + ?Sized>(dist: &Distribution, rng: &mut R) -> Result<f64, SimError> {
    match *dist {
        Distribution::Normal { mean, std } => Normal::new(mean, std)
            .map(|d| d.sample(rng))
            .map_err(|e| rejected("normal", e)),
        Distribution::Beta { alpha, beta } => Beta::new(alpha, beta)
            .map(|d| d.sample(rng))
            .map_err(|e| rejected("beta", e)),
        Distribution::LogNormal { mean, sigma } => {
            if mean.is_nan() || mean <= 0.0 {
                return Err(rejected("lognormal", "mean must be > 0"));
            }
            let mu = mean.ln() - 0.5 * sigma * sigma;
            LogNormal::new(mu, sigma)
                .map(|d| d.sample(rng))
                .map_err(|e| rejected("lognormal", e))
        }
    }
}

/// Draw an event count from Poisson(`lambda`), `lambda > 0`.
pub fn sample_count<R: Rng + ?Sized>(lambda: f64, rng: &mut R) -> Result<u64, SimError> {
    Poisson::new(lambda)
        .map(|d| {
            let k: f64 = d.sample(rng);
            k as u64
        })
        .map_err(|e| rejected("poisson", e))
}
