#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Hourly demand series and forecast output types.
//!
//! All timestamps are UTC and truncated to the hour. An [`HourlySeries`]
//! always has a regular index: one value per hour from `start`, with
//! explicit zeros for hours that saw no events.

use chrono::{DateTime, TimeDelta, Timelike as _, Utc};
use roadside_event_models::ZoneId;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Truncates a timestamp to the start of its hour.
#[must_use]
pub fn floor_to_hour(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts - TimeDelta::seconds(ts.timestamp().rem_euclid(3600))
        - TimeDelta::nanoseconds(i64::from(ts.nanosecond()))
}

/// Whether `ts` falls exactly on an hour boundary.
#[must_use]
pub fn is_hour_aligned(ts: DateTime<Utc>) -> bool {
    ts.timestamp().rem_euclid(3600) == 0 && ts.nanosecond() == 0
}

/// Observed call counts for one zone over a contiguous hourly range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HourlySeries {
    zone_id: ZoneId,
    start: DateTime<Utc>,
    counts: Vec<f64>,
}

impl HourlySeries {
    /// Creates a series whose first value belongs to hour `start`.
    ///
    /// # Errors
    ///
    /// Returns [`SeriesError::Misaligned`] if `start` is not on an hour
    /// boundary, or [`SeriesError::InvalidCount`] for a negative or
    /// non-finite count.
    pub fn new(zone_id: ZoneId, start: DateTime<Utc>, counts: Vec<f64>) -> Result<Self, SeriesError> {
        if !is_hour_aligned(start) {
            return Err(SeriesError::Misaligned { zone_id, at: start });
        }
        if let Some(idx) = counts.iter().position(|c| !c.is_finite() || *c < 0.0) {
            return Err(SeriesError::InvalidCount {
                zone_id,
                at: start + TimeDelta::hours(idx as i64),
            });
        }
        Ok(Self {
            zone_id,
            start,
            counts,
        })
    }

    /// Builds a series from `(hour, count)` observations that must already
    /// be hour-aligned, strictly consecutive, and gap-free.
    ///
    /// # Errors
    ///
    /// Returns [`SeriesError::Empty`] for no observations,
    /// [`SeriesError::Misaligned`] for a timestamp off the hour, and
    /// [`SeriesError::NonContiguous`] when an hour is skipped or repeated.
    pub fn from_observations(
        zone_id: ZoneId,
        observations: &[(DateTime<Utc>, f64)],
    ) -> Result<Self, SeriesError> {
        let Some(&(start, _)) = observations.first() else {
            return Err(SeriesError::Empty { zone_id });
        };

        let mut expected = start;
        for &(at, _) in observations {
            if !is_hour_aligned(at) {
                return Err(SeriesError::Misaligned { zone_id, at });
            }
            if at != expected {
                return Err(SeriesError::NonContiguous {
                    zone_id,
                    expected,
                    found: at,
                });
            }
            expected += TimeDelta::hours(1);
        }

        Self::new(
            zone_id,
            start,
            observations.iter().map(|&(_, c)| c).collect(),
        )
    }

    /// Zone this series belongs to.
    #[must_use]
    pub const fn zone_id(&self) -> ZoneId {
        self.zone_id
    }

    /// First hour of the series.
    #[must_use]
    pub const fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// Hour following the last observation; the first forecast hour.
    #[must_use]
    pub fn next_hour(&self) -> DateTime<Utc> {
        self.start + TimeDelta::hours(self.counts.len() as i64)
    }

    /// Observed counts in hour order.
    #[must_use]
    pub fn counts(&self) -> &[f64] {
        &self.counts
    }

    /// Number of hourly observations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// Whether the series has no observations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Total number of calls in the series.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.counts.iter().sum()
    }

    /// Iterates `(hour, count)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (DateTime<Utc>, f64)> + '_ {
        self.counts
            .iter()
            .enumerate()
            .map(|(i, &c)| (self.start + TimeDelta::hours(i as i64), c))
    }
}

/// Error returned when an hourly series would not have a regular index.
#[derive(Debug, Clone, PartialEq)]
pub enum SeriesError {
    /// No observations were supplied.
    Empty {
        /// Zone of the rejected series.
        zone_id: ZoneId,
    },
    /// A timestamp is not on an hour boundary.
    Misaligned {
        /// Zone of the rejected series.
        zone_id: ZoneId,
        /// The offending timestamp.
        at: DateTime<Utc>,
    },
    /// An hour is missing or repeated.
    NonContiguous {
        /// Zone of the rejected series.
        zone_id: ZoneId,
        /// Hour that should have come next.
        expected: DateTime<Utc>,
        /// Hour that was found instead.
        found: DateTime<Utc>,
    },
    /// A count is negative or not finite.
    InvalidCount {
        /// Zone of the rejected series.
        zone_id: ZoneId,
        /// Hour of the bad count.
        at: DateTime<Utc>,
    },
}

impl std::fmt::Display for SeriesError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty { zone_id } => write!(f, "zone {zone_id}: empty hourly series"),
            Self::Misaligned { zone_id, at } => {
                write!(f, "zone {zone_id}: timestamp {at} is not on an hour boundary")
            }
            Self::NonContiguous {
                zone_id,
                expected,
                found,
            } => write!(
                f,
                "zone {zone_id}: non-contiguous hourly index (expected {expected}, found {found})"
            ),
            Self::InvalidCount { zone_id, at } => {
                write!(f, "zone {zone_id}: invalid call count at {at}")
            }
        }
    }
}

impl std::error::Error for SeriesError {}

/// Which modeling path produced a forecast.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ForecastModel {
    /// Holt-Winters with additive trend and weekly season.
    Seasonal,
    /// Constant mean with a standard-deviation band.
    Naive,
}

/// One zone-hour of forecast demand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastPoint {
    /// Zone being forecast.
    pub zone_id: ZoneId,
    /// Forecast hour (UTC, hour-aligned).
    pub hour: DateTime<Utc>,
    /// Point estimate of calls, `>= 0`.
    pub point: f64,
    /// Lower interval bound, `0 <= lower <= point`.
    pub lower: f64,
    /// Upper interval bound, `point <= upper`.
    pub upper: f64,
    /// Path that produced the estimate.
    pub model: ForecastModel,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hour(h: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_704_067_200 + h * 3600, 0).unwrap()
    }

    #[test]
    fn floors_to_hour() {
        let ts = DateTime::from_timestamp(1_704_067_200 + 3600 + 125, 500).unwrap();
        assert_eq!(floor_to_hour(ts), hour(1));
        assert!(is_hour_aligned(floor_to_hour(ts)));
        assert!(!is_hour_aligned(ts));
    }

    #[test]
    fn floors_pre_epoch_timestamps() {
        let ts = DateTime::from_timestamp(-1, 0).unwrap();
        assert_eq!(floor_to_hour(ts).timestamp(), -3600);
    }

    #[test]
    fn new_rejects_misaligned_start() {
        let err = HourlySeries::new(ZoneId(1), hour(0) + TimeDelta::minutes(5), vec![1.0]);
        assert!(matches!(err, Err(SeriesError::Misaligned { .. })));
    }

    #[test]
    fn new_rejects_negative_counts() {
        let err = HourlySeries::new(ZoneId(1), hour(0), vec![1.0, -2.0]);
        assert_eq!(
            err,
            Err(SeriesError::InvalidCount {
                zone_id: ZoneId(1),
                at: hour(1)
            })
        );
    }

    #[test]
    fn from_observations_detects_gaps() {
        let err = HourlySeries::from_observations(
            ZoneId(2),
            &[(hour(0), 1.0), (hour(1), 0.0), (hour(3), 2.0)],
        );
        assert_eq!(
            err,
            Err(SeriesError::NonContiguous {
                zone_id: ZoneId(2),
                expected: hour(2),
                found: hour(3),
            })
        );
    }

    #[test]
    fn from_observations_detects_repeats() {
        let err = HourlySeries::from_observations(ZoneId(2), &[(hour(0), 1.0), (hour(0), 1.0)]);
        assert!(matches!(err, Err(SeriesError::NonContiguous { .. })));
    }

    #[test]
    fn from_observations_builds_series() {
        let series = HourlySeries::from_observations(
            ZoneId(2),
            &[(hour(5), 1.0), (hour(6), 0.0), (hour(7), 4.0)],
        )
        .unwrap();
        assert_eq!(series.len(), 3);
        assert_eq!(series.start(), hour(5));
        assert_eq!(series.next_hour(), hour(8));
        assert!((series.total() - 5.0).abs() < f64::EPSILON);
        assert_eq!(series.iter().nth(2), Some((hour(7), 4.0)));
    }

    #[test]
    fn empty_observations_rejected() {
        assert_eq!(
            HourlySeries::from_observations(ZoneId(4), &[]),
            Err(SeriesError::Empty { zone_id: ZoneId(4) })
        );
    }

    #[test]
    fn model_names() {
        assert_eq!(ForecastModel::Seasonal.to_string(), "seasonal");
        assert_eq!(ForecastModel::Naive.as_ref(), "naive");
        assert_eq!("naive".parse::<ForecastModel>().unwrap(), ForecastModel::Naive);
    }
}
