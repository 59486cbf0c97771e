//! Hourly aggregation of zoned events into regular series.

use std::collections::BTreeMap;

use chrono::{DateTime, TimeDelta, Utc};
use roadside_event_models::{Event, ZoneId};
use roadside_forecast_models::{HourlySeries, floor_to_hour};
use serde::{Deserialize, Serialize};

use crate::ForecastError;

/// A contiguous run of whole hours, `[start, start + hours)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HourWindow {
    /// First hour in the window.
    pub start: DateTime<Utc>,
    /// Number of hours.
    pub hours: usize,
}

impl HourWindow {
    /// Window of `hours` hours starting at the hour containing `start`.
    #[must_use]
    pub fn new(start: DateTime<Utc>, hours: usize) -> Self {
        Self {
            start: floor_to_hour(start),
            hours,
        }
    }

    /// Smallest window holding every timestamp, trimmed to the trailing
    /// `lookback` hours when given. `None` when there are no timestamps.
    pub fn covering(
        timestamps: impl IntoIterator<Item = DateTime<Utc>>,
        lookback: Option<usize>,
    ) -> Option<Self> {
        let mut bounds: Option<(DateTime<Utc>, DateTime<Utc>)> = None;
        for ts in timestamps {
            let hour = floor_to_hour(ts);
            bounds = Some(match bounds {
                None => (hour, hour),
                Some((lo, hi)) => (lo.min(hour), hi.max(hour)),
            });
        }

        let (first, last) = bounds?;
        let span = usize::try_from((last - first).num_hours()).ok()? + 1;

        Some(match lookback {
            Some(lookback) if lookback > 0 && lookback < span => {
                let end = last + TimeDelta::hours(1);
                Self {
                    start: end - TimeDelta::hours(i64::try_from(lookback).ok()?),
                    hours: lookback,
                }
            }
            _ => Self {
                start: first,
                hours: span,
            },
        })
    }

    /// Hour after the last hour in the window.
    #[must_use]
    pub fn end(&self) -> DateTime<Utc> {
        self.start + TimeDelta::hours(i64::try_from(self.hours).unwrap_or(i64::MAX / 3600))
    }

    /// Whether `ts` falls in one of the window's hours.
    #[must_use]
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts < self.end()
    }

    fn offset(&self, ts: DateTime<Utc>) -> Option<usize> {
        if !self.contains(ts) {
            return None;
        }
        usize::try_from((floor_to_hour(ts) - self.start).num_hours()).ok()
    }
}

impl std::fmt::Display for HourWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} .. {}", self.start.to_rfc3339(), self.end().to_rfc3339())
    }
}

/// Counts events per zone and hour across `window`.
///
/// Every zone with at least one event inside the window gets a series of
/// exactly `window.hours` values, zero where no event landed. Events without
/// a zone are ignored.
///
/// # Errors
///
/// Returns [`ForecastError::Series`] if a series cannot be built.
pub fn aggregate_hourly(
    events: &[Event],
    window: &HourWindow,
) -> Result<BTreeMap<ZoneId, HourlySeries>, ForecastError> {
    let mut counts: BTreeMap<ZoneId, Vec<f64>> = BTreeMap::new();

    for event in events {
        let Some(zone) = event.zone_id else {
            continue;
        };
        let Some(offset) = window.offset(event.requested_at) else {
            continue;
        };
        counts.entry(zone).or_insert_with(|| vec![0.0; window.hours])[offset] += 1.0;
    }

    counts
        .into_iter()
        .map(|(zone, values)| Ok((zone, HourlySeries::new(zone, window.start, values)?)))
        .collect()
}
