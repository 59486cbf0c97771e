#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Per-zone hourly demand forecasting.
//!
//! A zone with at least [`ForecastSettings::seasonal_min_history`] hours of
//! history gets an additive Holt-Winters model with a weekly season; any
//! shorter series, or one whose seasonal fit fails, falls back to a
//! constant-mean model. The two paths share only their output shape: a
//! [`Forecast`] carries the path taken, its fitted parameters, and the
//! reason for any fallback.

pub mod holt_winters;
pub mod interval;
pub mod naive;
pub mod series;

use chrono::TimeDelta;
use roadside_event_models::ZoneId;
use roadside_forecast_models::{ForecastModel, ForecastPoint, HourlySeries, SeriesError};
use serde::{Deserialize, Serialize};

use crate::holt_winters::{HoltWinters, SEASON_LENGTH, SeasonalFit};
use crate::naive::NaiveFit;

pub use series::{HourWindow, aggregate_hourly};

/// Default number of forecast hours.
pub const DEFAULT_HORIZON_HOURS: usize = 48;

/// Default history needed for the seasonal path (two weekly cycles).
pub const DEFAULT_SEASONAL_MIN_HISTORY: usize = 2 * SEASON_LENGTH;

/// Default two-sided interval coverage.
pub const DEFAULT_CONFIDENCE_LEVEL: f64 = 0.80;

/// Longest accepted horizon (90 days).
pub const MAX_HORIZON_HOURS: usize = 2160;

/// Largest accepted seasonal-eligibility threshold (10 years).
pub const MAX_SEASONAL_MIN_HISTORY: usize = 87_600;

/// Errors raised by forecasting.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ForecastError {
    /// Horizon outside `1..=MAX_HORIZON_HOURS`.
    #[error("invalid forecast horizon {horizon_hours} hours: expected 1..=2160")]
    InvalidHorizon {
        /// The rejected horizon.
        horizon_hours: usize,
    },

    /// Seasonal threshold below two cycles or above the maximum.
    #[error("invalid seasonal history threshold {hours} hours: expected 336..=87600")]
    InvalidSeasonalThreshold {
        /// The rejected threshold.
        hours: usize,
    },

    /// Confidence level outside `[0.5, 0.99]`.
    #[error("invalid confidence level {confidence_level}: expected [0.5, 0.99]")]
    InvalidConfidence {
        /// The rejected level.
        confidence_level: f64,
    },

    /// The series has no observations to fit.
    #[error("zone {zone_id}: cannot forecast an empty series")]
    EmptySeries {
        /// Zone of the empty series.
        zone_id: ZoneId,
    },

    /// The hourly index is irregular.
    #[error(transparent)]
    Series(#[from] SeriesError),
}

/// Validated forecasting parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastSettings {
    horizon_hours: usize,
    seasonal_min_history: usize,
    confidence_level: f64,
}

impl Default for ForecastSettings {
    fn default() -> Self {
        Self {
            horizon_hours: DEFAULT_HORIZON_HOURS,
            seasonal_min_history: DEFAULT_SEASONAL_MIN_HISTORY,
            confidence_level: DEFAULT_CONFIDENCE_LEVEL,
        }
    }
}

impl ForecastSettings {
    /// Creates forecasting parameters.
    ///
    /// # Errors
    ///
    /// Returns [`ForecastError::InvalidHorizon`],
    /// [`ForecastError::InvalidSeasonalThreshold`], or
    /// [`ForecastError::InvalidConfidence`] for out-of-range values.
    pub fn new(
        horizon_hours: usize,
        seasonal_min_history: usize,
        confidence_level: f64,
    ) -> Result<Self, ForecastError> {
        if horizon_hours == 0 || horizon_hours > MAX_HORIZON_HOURS {
            return Err(ForecastError::InvalidHorizon { horizon_hours });
        }
        if !(DEFAULT_SEASONAL_MIN_HISTORY..=MAX_SEASONAL_MIN_HISTORY).contains(&seasonal_min_history)
        {
            return Err(ForecastError::InvalidSeasonalThreshold {
                hours: seasonal_min_history,
            });
        }
        if !(0.5..=0.99).contains(&confidence_level) {
            return Err(ForecastError::InvalidConfidence { confidence_level });
        }
        Ok(Self {
            horizon_hours,
            seasonal_min_history,
            confidence_level,
        })
    }

    /// Hours to forecast.
    #[must_use]
    pub const fn horizon_hours(&self) -> usize {
        self.horizon_hours
    }

    /// History length at which the seasonal path is used.
    #[must_use]
    pub const fn seasonal_min_history(&self) -> usize {
        self.seasonal_min_history
    }

    /// Two-sided interval coverage.
    #[must_use]
    pub const fn confidence_level(&self) -> f64 {
        self.confidence_level
    }
}

/// Why a zone was forecast with the naive model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FallbackReason {
    /// Fewer observations than the seasonal threshold.
    InsufficientHistory {
        /// Hours of history available.
        observed: usize,
        /// Hours the seasonal path needs.
        required: usize,
    },
    /// The seasonal model could not be fitted to finite values.
    SeasonalFitFailed,
}

impl std::fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InsufficientHistory { observed, required } => {
                write!(f, "insufficient history ({observed} of {required} hours)")
            }
            Self::SeasonalFitFailed => f.write_str("seasonal fit failed"),
        }
    }
}

/// Forecast for one zone, tagged with the path that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum Forecast {
    /// Holt-Winters path.
    Seasonal {
        /// Selected smoothing parameters.
        fit: SeasonalFit,
        /// One point per horizon hour.
        points: Vec<ForecastPoint>,
    },
    /// Constant-mean path.
    Naive {
        /// Observed mean and spread.
        fit: NaiveFit,
        /// Why the seasonal path was not used.
        reason: FallbackReason,
        /// One point per horizon hour.
        points: Vec<ForecastPoint>,
    },
}

impl Forecast {
    /// Which path produced this forecast.
    #[must_use]
    pub const fn model(&self) -> ForecastModel {
        match self {
            Self::Seasonal { .. } => ForecastModel::Seasonal,
            Self::Naive { .. } => ForecastModel::Naive,
        }
    }

    /// Forecast points in hour order.
    #[must_use]
    pub fn points(&self) -> &[ForecastPoint] {
        match self {
            Self::Seasonal { points, .. } | Self::Naive { points, .. } => points,
        }
    }

    /// Consumes the forecast, keeping only its points.
    #[must_use]
    pub fn into_points(self) -> Vec<ForecastPoint> {
        match self {
            Self::Seasonal { points, .. } | Self::Naive { points, .. } => points,
        }
    }

    /// Fallback reason, for naive forecasts.
    #[must_use]
    pub const fn fallback_reason(&self) -> Option<FallbackReason> {
        match self {
            Self::Seasonal { .. } => None,
            Self::Naive { reason, .. } => Some(*reason),
        }
    }
}

/// Path a series of `observed` hours takes given a seasonal threshold.
#[must_use]
pub const fn select_model(observed: usize, seasonal_min_history: usize) -> ForecastModel {
    if observed >= seasonal_min_history {
        ForecastModel::Seasonal
    } else {
        ForecastModel::Naive
    }
}

/// Forecasts the hours following `series`.
///
/// # Errors
///
/// Returns [`ForecastError::EmptySeries`] if `series` has no observations.
pub fn forecast_zone(
    series: &HourlySeries,
    settings: &ForecastSettings,
) -> Result<Forecast, ForecastError> {
    let zone_id = series.zone_id();
    let counts = series.counts();
    let z = interval::z_score(settings.confidence_level);

    let reason = match select_model(counts.len(), settings.seasonal_min_history) {
        ForecastModel::Seasonal => {
            if let Some(model) = HoltWinters::fit(counts) {
                let steps = model.forecast(settings.horizon_hours, z);
                log::debug!(
                    "Zone {zone_id}: seasonal fit alpha={} beta={} gamma={} sigma={:.3}",
                    model.params().alpha,
                    model.params().beta,
                    model.params().gamma,
                    model.params().sigma
                );
                return Ok(Forecast::Seasonal {
                    fit: *model.params(),
                    points: to_points(series, ForecastModel::Seasonal, steps),
                });
            }
            FallbackReason::SeasonalFitFailed
        }
        ForecastModel::Naive => FallbackReason::InsufficientHistory {
            observed: counts.len(),
            required: settings.seasonal_min_history,
        },
    };

    let fit = NaiveFit::from_counts(counts).ok_or(ForecastError::EmptySeries { zone_id })?;
    log::info!("Zone {zone_id}: naive forecast, {reason}");

    let half_width = fit.half_width(z);
    let steps = vec![(fit.mean, half_width); settings.horizon_hours];

    Ok(Forecast::Naive {
        fit,
        reason,
        points: to_points(series, ForecastModel::Naive, steps),
    })
}

fn to_points(
    series: &HourlySeries,
    model: ForecastModel,
    steps: Vec<(f64, f64)>,
) -> Vec<ForecastPoint> {
    let first = series.next_hour();
    steps
        .into_iter()
        .zip(0i64..)
        .map(|((estimate, half_width), offset)| {
            let point = estimate.max(0.0);
            ForecastPoint {
                zone_id: series.zone_id(),
                hour: first + TimeDelta::hours(offset),
                point,
                lower: (estimate - half_width).max(0.0).min(point),
                upper: (estimate + half_width).max(point).min(f64::MAX),
                model,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};

    use super::*;

    fn hour(h: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_704_067_200 + h * 3600, 0).unwrap()
    }

    fn series(counts: Vec<f64>) -> HourlySeries {
        HourlySeries::new(ZoneId(3), hour(0), counts).unwrap()
    }

    fn wavy(len: usize) -> Vec<f64> {
        (0..len)
            .map(|t| {
                let day = if (8..20).contains(&(t % 24)) { 5.0 } else { 1.0 };
                let weekend = if t % 168 >= 120 { 2.0 } else { 0.0 };
                day + weekend + f64::from(u8::try_from(t % 3).unwrap()) * 0.5
            })
            .collect()
    }

    #[test]
    fn settings_validate_ranges() {
        assert!(ForecastSettings::new(48, 336, 0.8).is_ok());
        assert_eq!(
            ForecastSettings::new(0, 336, 0.8),
            Err(ForecastError::InvalidHorizon { horizon_hours: 0 })
        );
        assert!(ForecastSettings::new(2161, 336, 0.8).is_err());
        assert_eq!(
            ForecastSettings::new(48, 335, 0.8),
            Err(ForecastError::InvalidSeasonalThreshold { hours: 335 })
        );
        assert!(ForecastSettings::new(48, 336, 0.4).is_err());
        assert!(ForecastSettings::new(48, 336, 1.0).is_err());
        assert!(ForecastSettings::new(48, 336, f64::NAN).is_err());
        assert_eq!(ForecastSettings::default(), ForecastSettings::new(48, 336, 0.8).unwrap());
    }

    #[test]
    fn boundary_336_is_seasonal() {
        let forecast = forecast_zone(&series(wavy(336)), &ForecastSettings::default()).unwrap();
        assert_eq!(forecast.model(), ForecastModel::Seasonal);
        assert_eq!(forecast.points().len(), 48);
        assert!(forecast.points().iter().all(|p| p.model == ForecastModel::Seasonal));
        assert_eq!(forecast.fallback_reason(), None);
    }

    #[test]
    fn boundary_335_is_naive() {
        let forecast = forecast_zone(&series(wavy(335)), &ForecastSettings::default()).unwrap();
        assert_eq!(forecast.model(), ForecastModel::Naive);
        assert!(forecast.points().iter().all(|p| p.model == ForecastModel::Naive));
        assert_eq!(
            forecast.fallback_reason(),
            Some(FallbackReason::InsufficientHistory {
                observed: 335,
                required: 336
            })
        );
    }

    #[test]
    fn points_start_after_history() {
        let s = series(vec![1.0, 2.0, 3.0]);
        let forecast = forecast_zone(&s, &ForecastSettings::default()).unwrap();
        let points = forecast.points();
        assert_eq!(points.len(), 48);
        assert_eq!(points[0].hour, hour(3));
        assert_eq!(points[47].hour, hour(50));
        assert!(points.iter().all(|p| p.zone_id == ZoneId(3)));
    }

    #[test]
    fn naive_interval() {
        let forecast = forecast_zone(&series(vec![10.0; 24]), &ForecastSettings::default()).unwrap();
        let p = &forecast.points()[0];
        assert!((p.point - 10.0).abs() < 1e-12);
        assert!((p.lower - 8.0).abs() < 1e-12);
        assert!((p.upper - 12.0).abs() < 1e-12);
    }

    #[test]
    fn all_zero_history_gives_zero_forecast() {
        let forecast = forecast_zone(&series(vec![0.0; 100]), &ForecastSettings::default()).unwrap();
        assert_eq!(forecast.model(), ForecastModel::Naive);
        for p in forecast.points() {
            assert!(p.point.abs() < f64::EPSILON);
            assert!(p.lower.abs() < f64::EPSILON);
            assert!(p.upper.abs() < f64::EPSILON);
        }
    }

    #[test]
    fn lower_bound_never_negative() {
        let sparse: Vec<f64> = (0..400).map(|t| if t % 37 == 0 { 4.0 } else { 0.0 }).collect();
        for counts in [sparse.clone(), sparse[..100].to_vec(), vec![0.0, 9.0, 0.0]] {
            let forecast = forecast_zone(&series(counts), &ForecastSettings::default()).unwrap();
            for p in forecast.points() {
                assert!(p.lower >= 0.0, "lower {} at {}", p.lower, p.hour);
                assert!(p.lower <= p.point && p.point <= p.upper, "{p:?}");
            }
        }
    }

    #[test]
    fn forecasts_are_deterministic() {
        let s = series(wavy(400));
        let settings = ForecastSettings::default();
        assert_eq!(
            forecast_zone(&s, &settings).unwrap(),
            forecast_zone(&s, &settings).unwrap()
        );
    }

    #[test]
    fn unfittable_long_history_falls_back_to_naive() {
        // Squared errors on these spikes overflow, so no grid point has a
        // finite error sum.
        let counts: Vec<f64> = (0..336)
            .map(|t| if t % 7 == 3 || t % 11 == 0 { 1.0e300 } else { 2.0 })
            .collect();
        let forecast = forecast_zone(&series(counts), &ForecastSettings::default()).unwrap();

        assert_eq!(forecast.model(), ForecastModel::Naive);
        assert_eq!(
            forecast.fallback_reason(),
            Some(FallbackReason::SeasonalFitFailed)
        );
        assert_eq!(forecast.points().len(), 48);
        for p in forecast.points() {
            assert_eq!(p.model, ForecastModel::Naive);
            assert!(
                p.lower.is_finite() && p.point.is_finite() && p.upper.is_finite(),
                "{p:?}"
            );
            assert!(0.0 <= p.lower && p.lower <= p.point && p.point <= p.upper, "{p:?}");
        }
    }

    #[test]
    fn fallback_reason_serializes_with_tag() {
        let json = serde_json::to_string(&FallbackReason::SeasonalFitFailed).unwrap();
        assert_eq!(json, r#"{"type":"seasonal_fit_failed"}"#);
    }
}
