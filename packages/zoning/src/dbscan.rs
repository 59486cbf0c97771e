//! Density-based clustering (DBSCAN) over great-circle distance.
//!
//! A point is *core* when at least `min_neighbors` other points lie within
//! the radius. Clusters grow from core points through chains of core
//! points; non-core points reached from a cluster join it as border
//! points. Everything else is noise.
//!
//! Points are visited in input order and cluster ids are handed out in
//! discovery order, so identical input yields identical labels. A border
//! point reachable from two clusters stays with the first one to reach it.

use std::collections::VecDeque;

use roadside_event_models::{Coordinates, ZoneId};

use crate::ZoningParams;
use crate::neighbors::NeighborIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Label {
    Unvisited,
    Noise,
    Zone(u32),
}

/// Labels every point, returning one [`ZoneId`] per input point in input
/// order. Zone `0` is noise; clusters are numbered from `1`.
#[must_use]
pub fn cluster(coordinates: &[Coordinates], params: &ZoningParams) -> Vec<ZoneId> {
    if coordinates.len() < params.min_neighbors() {
        return vec![ZoneId::NOISE; coordinates.len()];
    }

    let index = NeighborIndex::new(coordinates);
    let radius_m = params.radius_m();
    let min_neighbors = params.min_neighbors();

    let mut labels = vec![Label::Unvisited; coordinates.len()];
    let mut next_zone = 1u32;

    for start in 0..coordinates.len() {
        if labels[start] != Label::Unvisited {
            continue;
        }

        let seeds = index.within(start, radius_m);
        if seeds.len() < min_neighbors {
            labels[start] = Label::Noise;
            continue;
        }

        let zone = next_zone;
        next_zone += 1;
        labels[start] = Label::Zone(zone);

        // Points are claimed when queued, so each is expanded at most once.
        let mut frontier = VecDeque::new();
        claim(&mut labels, &mut frontier, seeds, zone);

        while let Some(point) = frontier.pop_front() {
            let reachable = index.within(point, radius_m);
            if reachable.len() >= min_neighbors {
                claim(&mut labels, &mut frontier, reachable, zone);
            }
        }
    }

    labels
        .into_iter()
        .map(|label| match label {
            Label::Zone(zone) => ZoneId(zone),
            Label::Noise | Label::Unvisited => ZoneId::NOISE,
        })
        .collect()
}

/// Adds unclaimed `points` to `zone`. Unvisited points are queued for
/// expansion; noise points are already known to be non-core and join as
/// border points only.
fn claim(labels: &mut [Label], frontier: &mut VecDeque<usize>, points: Vec<usize>, zone: u32) {
    for p in points {
        match labels[p] {
            Label::Unvisited => {
                labels[p] = Label::Zone(zone);
                frontier.push_back(p);
            }
            Label::Noise => labels[p] = Label::Zone(zone),
            Label::Zone(_) => {}
        }
    }
}
