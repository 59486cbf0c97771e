//! Additive Holt-Winters smoothing with a weekly season.
//!
//! The level, trend, and 168 seasonal offsets are initialised from the first
//! two weeks of history and then filtered over every observation after the
//! first week. Smoothing parameters come from a fixed grid; the combination
//! with the smallest in-sample one-step squared error wins, and ties go to
//! the first combination in grid order.

use serde::{Deserialize, Serialize};

/// Hours in one seasonal cycle.
pub const SEASON_LENGTH: usize = 168;

const ALPHA_GRID: [f64; 7] = [0.05, 0.1, 0.2, 0.3, 0.5, 0.7, 0.9];
const BETA_GRID: [f64; 5] = [0.0, 0.01, 0.05, 0.1, 0.2];
const GAMMA_GRID: [f64; 5] = [0.05, 0.1, 0.2, 0.3, 0.5];

/// Smoothing parameters and residual scale of a fitted model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeasonalFit {
    /// Level smoothing.
    pub alpha: f64,
    /// Trend smoothing.
    pub beta: f64,
    /// Seasonal smoothing.
    pub gamma: f64,
    /// Standard deviation of the in-sample one-step residuals.
    pub sigma: f64,
    /// Sum of squared one-step residuals.
    pub sse: f64,
}

/// Fitted model with its final state.
#[derive(Debug, Clone, PartialEq)]
pub struct HoltWinters {
    fit: SeasonalFit,
    level: f64,
    trend: f64,
    /// Seasonal offsets indexed by `t % SEASON_LENGTH`.
    season: Vec<f64>,
    observed: usize,
}

#[derive(Debug, Clone)]
struct FilterState {
    level: f64,
    trend: f64,
    season: Vec<f64>,
    sse: f64,
    residual_sum: f64,
    residual_count: usize,
}

impl HoltWinters {
    /// Fits the model to `counts` by grid search.
    ///
    /// Returns `None` when fewer than two full cycles are available or when
    /// the best fit still has non-finite state.
    #[must_use]
    pub fn fit(counts: &[f64]) -> Option<Self> {
        if counts.len() < 2 * SEASON_LENGTH || counts.iter().any(|c| !c.is_finite()) {
            return None;
        }

        let mut best: Option<(f64, f64, f64, FilterState)> = None;

        for alpha in ALPHA_GRID {
            for beta in BETA_GRID {
                for gamma in GAMMA_GRID {
                    let state = filter(counts, alpha, beta, gamma);
                    if !state.sse.is_finite() {
                        continue;
                    }
                    let better = best
                        .as_ref()
                        .is_none_or(|(_, _, _, current)| state.sse < current.sse);
                    if better {
                        best = Some((alpha, beta, gamma, state));
                    }
                }
            }
        }

        let (alpha, beta, gamma, state) = best?;
        let sigma = residual_std_dev(&state);

        let finite = state.level.is_finite()
            && state.trend.is_finite()
            && sigma.is_finite()
            && state.season.iter().all(|s| s.is_finite());
        if !finite {
            return None;
        }

        Some(Self {
            fit: SeasonalFit {
                alpha,
                beta,
                gamma,
                sigma,
                sse: state.sse,
            },
            level: state.level,
            trend: state.trend,
            season: state.season,
            observed: counts.len(),
        })
    }

    /// Selected parameters.
    #[must_use]
    pub const fn params(&self) -> &SeasonalFit {
        &self.fit
    }

    /// Point forecasts and interval half-widths for the next `horizon`
    /// hours, as `(point, half_width)` pairs.
    ///
    /// The half-width for step `h` is `z * sigma * sqrt(1 + sum c_j^2)` over
    /// `j` in `1..h`, with `c_j = alpha * (1 + j * beta) + gamma` on whole
    /// seasonal lags and `alpha * (1 + j * beta)` otherwise.
    #[must_use]
    pub fn forecast(&self, horizon: usize, z: f64) -> Vec<(f64, f64)> {
        let SeasonalFit {
            alpha,
            beta,
            gamma,
            sigma,
            ..
        } = self.fit;

        let mut variance_factor = 1.0;
        let mut out = Vec::with_capacity(horizon);

        for h in 1..=horizon {
            if h > 1 {
                let j = h - 1;
                #[allow(clippy::cast_precision_loss)]
                let mut c = alpha * (j as f64).mul_add(beta, 1.0);
                if j % SEASON_LENGTH == 0 {
                    c += gamma;
                }
                variance_factor += c * c;
            }

            #[allow(clippy::cast_precision_loss)]
            let steps = h as f64;
            let seasonal = self.season[(self.observed + h - 1) % SEASON_LENGTH];
            let point = steps.mul_add(self.trend, self.level) + seasonal;
            out.push((point, z * sigma * variance_factor.sqrt()));
        }

        out
    }
}

fn mean(values: &[f64]) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let n = values.len() as f64;
    values.iter().sum::<f64>() / n
}

fn initial_state(counts: &[f64]) -> (f64, f64, Vec<f64>) {
    let first = mean(&counts[..SEASON_LENGTH]);
    let second = mean(&counts[SEASON_LENGTH..2 * SEASON_LENGTH]);

    #[allow(clippy::cast_precision_loss)]
    let m = SEASON_LENGTH as f64;
    let trend = (second - first) / m;
    let season = counts[..SEASON_LENGTH].iter().map(|y| y - first).collect();

    // First-cycle mean sits mid-cycle; move it to the cycle's last hour.
    let level = trend.mul_add((m - 1.0) / 2.0, first);

    (level, trend, season)
}

fn filter(counts: &[f64], alpha: f64, beta: f64, gamma: f64) -> FilterState {
    let (mut level, mut trend, mut season) = initial_state(counts);
    let mut sse = 0.0;
    let mut residual_sum = 0.0;

    for (t, &y) in counts.iter().enumerate().skip(SEASON_LENGTH) {
        let slot = t % SEASON_LENGTH;
        let error = y - (level + trend + season[slot]);
        sse += error * error;
        residual_sum += error;

        let previous = level;
        level = alpha.mul_add(y - season[slot], (1.0 - alpha) * (previous + trend));
        trend = beta.mul_add(level - previous, (1.0 - beta) * trend);
        season[slot] = gamma.mul_add(y - level, (1.0 - gamma) * season[slot]);
    }

    FilterState {
        level,
        trend,
        season,
        sse,
        residual_sum,
        residual_count: counts.len() - SEASON_LENGTH,
    }
}

fn residual_std_dev(state: &FilterState) -> f64 {
    let n = state.residual_count;
    if n < 2 {
        return 0.0;
    }

    #[allow(clippy::cast_precision_loss)]
    let n = n as f64;
    let centred = state.residual_sum.mul_add(-state.residual_sum / n, state.sse);
    (centred.max(0.0) / (n - 1.0)).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weekly_pattern(weeks: usize) -> Vec<f64> {
        (0..weeks * SEASON_LENGTH)
            .map(|t| {
                let hour_of_day = t % 24;
                if (8..20).contains(&hour_of_day) { 6.0 } else { 1.0 }
            })
            .collect()
    }

    #[test]
    fn needs_two_cycles() {
        assert!(HoltWinters::fit(&vec![1.0; 2 * SEASON_LENGTH - 1]).is_none());
        assert!(HoltWinters::fit(&vec![1.0; 2 * SEASON_LENGTH]).is_some());
    }

    #[test]
    fn non_finite_input_fails() {
        let mut counts = vec![1.0; 2 * SEASON_LENGTH];
        counts[10] = f64::NAN;
        assert!(HoltWinters::fit(&counts).is_none());
    }

    #[test]
    fn constant_series_forecasts_constant() {
        let model = HoltWinters::fit(&vec![4.0; 3 * SEASON_LENGTH]).unwrap();
        for (point, half_width) in model.forecast(24, 1.2816) {
            assert!((point - 4.0).abs() < 1e-9, "point {point}");
            assert!(half_width.abs() < 1e-9, "half width {half_width}");
        }
    }

    #[test]
    fn repeats_a_clean_weekly_pattern() {
        let counts = weekly_pattern(3);
        let model = HoltWinters::fit(&counts).unwrap();
        let forecast = model.forecast(SEASON_LENGTH, 1.2816);

        for (h, (point, _)) in forecast.iter().enumerate() {
            let expected = counts[counts.len() - SEASON_LENGTH + h];
            assert!(
                (point - expected).abs() < 1e-6,
                "hour {h}: expected {expected}, got {point}"
            );
        }
    }

    #[test]
    fn interval_widens_with_horizon() {
        let mut counts = weekly_pattern(3);
        for (t, c) in counts.iter_mut().enumerate() {
            // Deterministic jitter.
            *c += f64::from(u8::try_from((t * 7) % 5).unwrap()) * 0.3;
        }
        let model = HoltWinters::fit(&counts).unwrap();
        let forecast = model.forecast(SEASON_LENGTH + 2, 1.2816);

        assert!(model.params().sigma > 0.0);
        for pair in forecast.windows(2) {
            assert!(pair[1].1 >= pair[0].1);
        }
        assert!(forecast[SEASON_LENGTH].1 > forecast[SEASON_LENGTH - 1].1);
    }

    #[test]
    fn fit_is_deterministic() {
        let counts = weekly_pattern(2);
        assert_eq!(HoltWinters::fit(&counts), HoltWinters::fit(&counts));
    }
}
