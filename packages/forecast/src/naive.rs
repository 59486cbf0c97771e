//! Constant-mean fallback for short histories.

use serde::{Deserialize, Serialize};

/// Smallest half-width as a fraction of the mean.
pub const MIN_RELATIVE_HALF_WIDTH: f64 = 0.2;

/// Mean and spread of the observed counts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NaiveFit {
    /// Mean hourly count.
    pub mean: f64,
    /// Sample standard deviation (`0` for a single observation).
    pub std_dev: f64,
}

impl NaiveFit {
    /// Returns `None` for an empty slice.
    ///
    /// Statistics are computed on counts scaled by the largest magnitude, so
    /// they stay finite for any finite input.
    #[must_use]
    pub fn from_counts(counts: &[f64]) -> Option<Self> {
        if counts.is_empty() {
            return None;
        }

        let largest = counts.iter().fold(0.0_f64, |m, c| m.max(c.abs()));
        let scale = if largest > 0.0 { largest } else { 1.0 };

        #[allow(clippy::cast_precision_loss)]
        let n = counts.len() as f64;
        let scaled_mean = counts.iter().map(|c| c / scale).sum::<f64>() / n;
        let scaled_std_dev = if counts.len() < 2 {
            0.0
        } else {
            let ss: f64 = counts
                .iter()
                .map(|c| {
                    let d = c / scale - scaled_mean;
                    d * d
                })
                .sum();
            (ss / (n - 1.0)).sqrt()
        };

        Some(Self {
            mean: scaled_mean * scale,
            std_dev: scaled_std_dev * scale,
        })
    }

    /// Interval half-width: `z` standard deviations, but never narrower than
    /// 20% of the mean. Saturates at `f64::MAX`.
    #[must_use]
    pub fn half_width(&self, z: f64) -> f64 {
        (z * self.std_dev)
            .max(MIN_RELATIVE_HALF_WIDTH * self.mean)
            .min(f64::MAX)
    }
}
