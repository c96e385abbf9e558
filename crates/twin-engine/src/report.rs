//! Reduction of per-trial samples into summary statistics.

use twin_core::Summary;

/// Nearest-rank read of quantile `p` from an ascending slice.
fn nearest_rank(sorted: &[f64], p: f64) -> f64 {
    let last = sorted.len() - 1;
    let idx = ((p * last as f64).floor().max(0.0) as usize).min(last);
    sorted[idx]
}

/// Mean and p10/p50/p90 of `samples`. Empty input yields all zeros.
///
/// Percentiles use nearest-rank indexing `floor(p * (n - 1))` into the sorted
/// samples, without interpolation.
pub fn summarize(samples: &[f64]) -> Summary {
    if samples.is_empty() {
        return Summary::default();
    }
    let mut xs = samples.to_vec();
    xs.sort_by(f64::total_cmp);
    let mean = xs.iter().sum::<f64>() / xs.len() as f64;
    Summary {
        mean,
        p10: nearest_rank(&xs, 0.10),
        p50: nearest_rank(&xs, 0.50),
        p90: nearest_rank(&xs, 0.90),
    }
}
