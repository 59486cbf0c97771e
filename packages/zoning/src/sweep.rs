//! Radius sweep for tuning the clustering radius.
//!
//! Runs the clustering once per candidate radius over the same points and
//! reports how many zones and how much noise each radius produces.

use std::collections::BTreeMap;

use roadside_event_models::{Coordinates, ZoneId};
use serde::{Deserialize, Serialize};

use crate::{ZoningError, ZoningParams, dbscan};

/// Clustering outcome for one candidate radius.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepResult {
    /// Radius tried.
    pub radius_km: f64,
    /// Non-noise zones found.
    pub zone_count: u32,
    /// Points labeled noise.
    pub noise_count: u64,
    /// Member count per zone, ordered by zone id.
    pub zone_sizes: Vec<(ZoneId, u64)>,
}

/// Clusters `coordinates` once for every radius in `radii_km`.
///
/// # Errors
///
/// Returns [`ZoningError`] if any radius or the neighbor count is invalid.
/// All parameters are checked before any clustering runs.
pub fn sweep_radii(
    coordinates: &[Coordinates],
    radii_km: &[f64],
    min_neighbors: usize,
) -> Result<Vec<SweepResult>, ZoningError> {
    let params = radii_km
        .iter()
        .map(|&r| ZoningParams::new(r, min_neighbors))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(params
        .iter()
        .map(|p| {
            let zones = dbscan::cluster(coordinates, p);

            let mut sizes: BTreeMap<ZoneId, u64> = BTreeMap::new();
            let mut noise_count = 0u64;
            for zone in zones {
                if zone.is_noise() {
                    noise_count += 1;
                } else {
                    *sizes.entry(zone).or_default() += 1;
                }
            }

            log::debug!(
                "Sweep radius {} km: {} zones, {noise_count} noise",
                p.radius_km(),
                sizes.len()
            );

            SweepResult {
                radius_km: p.radius_km(),
                zone_count: u32::try_from(sizes.len()).unwrap_or(u32::MAX),
                noise_count,
                zone_sizes: sizes.into_iter().collect(),
            }
        })
        .collect())
}
