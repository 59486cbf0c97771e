#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Zone assignment for geocoded service events.
//!
//! Groups event locations into operational zones with density-based
//! clustering over haversine distance, backed by an R-tree radius search.
//! The result is a fresh event id -> zone id mapping; events themselves are
//! never modified here.
//!
//! Zone ids are run-scoped: `0` is noise and `1..` follow discovery order,
//! with no correspondence to any fixed geography.

pub mod dbscan;
pub mod neighbors;
pub mod sweep;

use std::collections::BTreeMap;

use roadside_event_models::{Coordinates, Event, EventId, ZoneId};
use serde::{Deserialize, Serialize};

/// Largest accepted clustering radius.
pub const MAX_RADIUS_KM: f64 = 500.0;

/// Largest accepted minimum-neighbor count.
pub const MAX_MIN_NEIGHBORS: usize = 10_000;

/// Errors raised while configuring zoning.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ZoningError {
    /// Radius outside `(0, MAX_RADIUS_KM]`.
    #[error("invalid clustering radius {radius_km} km: expected (0, 500]")]
    InvalidRadius {
        /// The rejected radius.
        radius_km: f64,
    },

    /// Minimum-neighbor count outside `1..=MAX_MIN_NEIGHBORS`.
    #[error("invalid minimum neighbor count {min_neighbors}: expected 1..=10000")]
    InvalidMinNeighbors {
        /// The rejected count.
        min_neighbors: usize,
    },
}

/// Validated clustering parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoningParams {
    radius_km: f64,
    min_neighbors: usize,
}

impl ZoningParams {
    /// Creates clustering parameters.
    ///
    /// # Errors
    ///
    /// Returns [`ZoningError`] if the radius is not in `(0, 500]` km or the
    /// neighbor count is not in `1..=10_000`.
    pub fn new(radius_km: f64, min_neighbors: usize) -> Result<Self, ZoningError> {
        if !radius_km.is_finite() || radius_km <= 0.0 || radius_km > MAX_RADIUS_KM {
            return Err(ZoningError::InvalidRadius { radius_km });
        }
        if min_neighbors == 0 || min_neighbors > MAX_MIN_NEIGHBORS {
            return Err(ZoningError::InvalidMinNeighbors { min_neighbors });
        }
        Ok(Self {
            radius_km,
            min_neighbors,
        })
    }

    /// Neighborhood radius in kilometers.
    #[must_use]
    pub const fn radius_km(&self) -> f64 {
        self.radius_km
    }

    /// Neighborhood radius in meters.
    #[must_use]
    pub fn radius_m(&self) -> f64 {
        self.radius_km * 1000.0
    }

    /// Number of *other* points required within the radius for a core point.
    #[must_use]
    pub const fn min_neighbors(&self) -> usize {
        self.min_neighbors
    }
}

/// Hotspot summary for one discovered zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneSummary {
    /// Zone id (never noise).
    pub zone_id: ZoneId,
    /// Mean latitude of member events.
    pub centroid_lat: f64,
    /// Mean longitude of member events.
    pub centroid_lng: f64,
    /// Number of member events, used as the hotspot score.
    pub event_count: u64,
}

/// Output of one zoning run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneAssignment {
    /// Parameters the run used.
    pub params: ZoningParams,
    /// Zone for every event that had coordinates.
    pub labels: BTreeMap<EventId, ZoneId>,
    /// Number of non-noise zones discovered.
    pub zone_count: u32,
    /// Number of events labeled noise.
    pub noise_count: u64,
    /// Per-zone hotspot summaries, ordered by zone id.
    pub summaries: Vec<ZoneSummary>,
    /// Events left out because they have no coordinates.
    pub unlocated: Vec<EventId>,
}

impl ZoneAssignment {
    /// Zone assigned to `event_id`, if it took part in zoning.
    #[must_use]
    pub fn zone_of(&self, event_id: EventId) -> Option<ZoneId> {
        self.labels.get(&event_id).copied()
    }

    /// All zone ids present in the labels, noise included, ascending.
    #[must_use]
    pub fn zone_ids(&self) -> Vec<ZoneId> {
        let mut ids: Vec<ZoneId> = self.labels.values().copied().collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

/// Assigns a zone to every located event.
///
/// Events without coordinates are listed in
/// [`ZoneAssignment::unlocated`] and receive no label; they are never
/// given the noise zone by default.
#[must_use]
pub fn assign_zones(events: &[Event], params: &ZoningParams) -> ZoneAssignment {
    let mut ids = Vec::with_capacity(events.len());
    let mut coordinates = Vec::with_capacity(events.len());
    let mut unlocated = Vec::new();

    for event in events {
        match event.coordinates {
            Some(c) => {
                ids.push(event.id);
                coordinates.push(c);
            }
            None => unlocated.push(event.id),
        }
    }

    if !unlocated.is_empty() {
        log::warn!(
            "Excluded {} events without coordinates from zoning",
            unlocated.len()
        );
    }

    let zones = dbscan::cluster(&coordinates, params);
    let summaries = summarize(&coordinates, &zones);
    let noise_count = zones.iter().filter(|z| z.is_noise()).count() as u64;
    let zone_count = u32::try_from(summaries.len()).unwrap_or(u32::MAX);

    log::info!(
        "Zoned {} events: {zone_count} zones, {noise_count} noise (radius {} km, min neighbors {})",
        coordinates.len(),
        params.radius_km(),
        params.min_neighbors()
    );

    ZoneAssignment {
        params: *params,
        labels: ids.into_iter().zip(zones).collect(),
        zone_count,
        noise_count,
        summaries,
        unlocated,
    }
}

/// Computes centroid and event count for every non-noise zone.
#[must_use]
pub fn summarize(coordinates: &[Coordinates], zones: &[ZoneId]) -> Vec<ZoneSummary> {
    let mut acc: BTreeMap<ZoneId, (f64, f64, u64)> = BTreeMap::new();

    for (c, &zone) in coordinates.iter().zip(zones) {
        if zone.is_noise() {
            continue;
        }
        let entry = acc.entry(zone).or_insert((0.0, 0.0, 0));
        entry.0 += c.latitude;
        entry.1 += c.longitude;
        entry.2 += 1;
    }

    acc.into_iter()
        .map(|(zone_id, (lat_sum, lng_sum, count))| {
            #[allow(clippy::cast_precision_loss)]
            let n = count as f64;
            ZoneSummary {
                zone_id,
                centroid_lat: lat_sum / n,
                centroid_lng: lng_sum / n,
                event_count: count,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::DateTime;

    use super::*;

    fn event(id: EventId, position: Option<(f64, f64)>) -> Event {
        Event {
            id,
            member_id: None,
            requested_at: DateTime::from_timestamp(1_704_067_200 + id * 60, 0).unwrap(),
            dispatched_at: None,
            arrived_at: None,
            completed_at: None,
            coordinates: position.map(|(lat, lng)| Coordinates::new(lat, lng).unwrap()),
            zone_id: None,
            vehicle_id: None,
            home_postal_code: None,
            service_postal_code: None,
        }
    }

    fn two_groups_with_outliers() -> Vec<Event> {
        let centers = [(41.700, -71.155), (41.823, -71.412)];
        let offsets = [
            (0.0, 0.0),
            (0.0005, 0.0),
            (-0.0005, 0.0),
            (0.0, 0.0006),
            (0.0, -0.0006),
        ];

        let mut events = Vec::new();
        let mut id = 1;
        for (lat, lng) in centers {
            for (dlat, dlng) in offsets {
                events.push(event(id, Some((lat + dlat, lng + dlng))));
                id += 1;
            }
        }
        events.push(event(11, Some((42.300, -70.500))));
        events.push(event(12, Some((41.100, -72.400))));
        events
    }

    #[test]
    fn rejects_invalid_params() {
        assert_eq!(
            ZoningParams::new(0.0, 3),
            Err(ZoningError::InvalidRadius { radius_km: 0.0 })
        );
        assert!(ZoningParams::new(-1.0, 3).is_err());
        assert!(ZoningParams::new(f64::NAN, 3).is_err());
        assert!(ZoningParams::new(501.0, 3).is_err());
        assert_eq!(
            ZoningParams::new(2.0, 0),
            Err(ZoningError::InvalidMinNeighbors { min_neighbors: 0 })
        );
        assert!(ZoningParams::new(500.0, 10_000).is_ok());
    }

    #[test]
    fn assigns_two_zones_and_noise() {
        let events = two_groups_with_outliers();
        let params = ZoningParams::new(0.5, 3).unwrap();
        let assignment = assign_zones(&events, &params);

        assert_eq!(assignment.zone_count, 2);
        assert_eq!(assignment.noise_count, 2);
        assert_eq!(assignment.labels.len(), 12);

        let grouped: Vec<ZoneId> = (1..=10).filter_map(|id| assignment.zone_of(id)).collect();
        assert_eq!(grouped.len(), 10);
        assert!(grouped.iter().all(|z| !z.is_noise()));
        let mut distinct = grouped.clone();
        distinct.sort_unstable();
        distinct.dedup();
        assert_eq!(distinct.len(), 2);

        assert_eq!(assignment.zone_of(11), Some(ZoneId::NOISE));
        assert_eq!(assignment.zone_of(12), Some(ZoneId::NOISE));
        assert_eq!(
            assignment.zone_ids(),
            vec![ZoneId::NOISE, ZoneId(1), ZoneId(2)]
        );
    }

    #[test]
    fn unlocated_events_are_reported_not_labeled() {
        let mut events = two_groups_with_outliers();
        events.push(event(99, None));
        let params = ZoningParams::new(0.5, 3).unwrap();
        let assignment = assign_zones(&events, &params);

        assert_eq!(assignment.unlocated, vec![99]);
        assert_eq!(assignment.zone_of(99), None);
    }

    #[test]
    fn summaries_have_centroids_and_counts() {
        let events = two_groups_with_outliers();
        let params = ZoningParams::new(0.5, 3).unwrap();
        let assignment = assign_zones(&events, &params);

        assert_eq!(assignment.summaries.len(), 2);
        let first = &assignment.summaries[0];
        assert_eq!(first.zone_id, ZoneId(1));
        assert_eq!(first.event_count, 5);
        assert!((first.centroid_lat - 41.700).abs() < 1e-9);
        assert!((first.centroid_lng - -71.155).abs() < 1e-9);
    }

    #[test]
    fn assignment_is_deterministic() {
        let events = two_groups_with_outliers();
        let params = ZoningParams::new(0.5, 3).unwrap();
        assert_eq!(assign_zones(&events, &params), assign_zones(&events, &params));
    }
}
