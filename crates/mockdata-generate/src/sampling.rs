//! Bounded draws for the uniform, Gompertz and exponential shapes.
//!
//! Every draw is expressed as a fraction of the interval in `[0, 1]`, so the
//! continuous, date and survival generators share one implementation.

use rand::Rng;
use rand_chacha::ChaCha8Rng;

use mockdata_core::Distribution;

/// Gompertz shape (per year).
pub const GOMPERTZ_SHAPE: f64 = 0.1;
/// Gompertz baseline hazard (per year).
pub const GOMPERTZ_RATE: f64 = 0.01;
/// Exponential rate is `1 / (span / EXPONENTIAL_SPAN_DIVISOR)`.
pub const EXPONENTIAL_SPAN_DIVISOR: f64 = 3.0;
pub const DAYS_PER_YEAR: f64 = 365.25;

/// Draw a position in `[0, 1]` across an interval of `horizon` time units.
///
/// Gompertz runs on the interval measured in years (`horizon`), truncated at
/// its end, so later positions are more likely. Exponential uses a rate of
/// three per interval length, truncated at the end, so earlier positions are
/// more likely.
pub fn sample_fraction(distribution: Distribution, horizon: f64, rng: &mut ChaCha8Rng) -> f64 {
    let u = rng.random::<f64>();
    match distribution {
        Distribution::Uniform => u,
        Distribution::Exponential => {
            let rate = EXPONENTIAL_SPAN_DIVISOR;
            let mass = 1.0 - (-rate).exp();
            (-(1.0 - u * mass).ln() / rate).clamp(0.0, 1.0)
        }
        Distribution::Gompertz => {
            if !(horizon.is_finite() && horizon > 0.0) {
                return u;
            }
            let mass = gompertz_cdf(horizon);
            let cumulative_hazard = -(1.0 - u * mass).ln();
            let time =
                (1.0 + cumulative_hazard * GOMPERTZ_SHAPE / GOMPERTZ_RATE).ln() / GOMPERTZ_SHAPE;
            (time / horizon).clamp(0.0, 1.0)
        }
    }
}

fn gompertz_cdf(time: f64) -> f64 {
    let cumulative_hazard = GOMPERTZ_RATE / GOMPERTZ_SHAPE * ((GOMPERTZ_SHAPE * time).exp() - 1.0);
    1.0 - (-cumulative_hazard).exp()
}

/// Day offset in `[0, span_days]` drawn with `distribution`.
pub fn sample_day_offset(distribution: Distribution, span_days: i64, rng: &mut ChaCha8Rng) -> i64 {
    if span_days <= 0 {
        // Keep the stream aligned with non-degenerate spans.
        let _ = rng.random::<f64>();
        return 0;
    }
    let horizon = span_days as f64 / DAYS_PER_YEAR;
    let fraction = sample_fraction(distribution, horizon, rng);
    ((fraction * (span_days + 1) as f64).floor() as i64).min(span_days)
}
