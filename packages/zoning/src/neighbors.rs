//! Radius-neighbor search over geographic points.
//!
//! Points are bulk-loaded into an R-tree keyed by `[lng, lat]`. A query
//! first pulls candidates from a degree bounding box that is guaranteed to
//! contain every point within the radius, then keeps the candidates whose
//! haversine distance is `<=` the radius.

use geo::{Distance, Haversine, Point};
use roadside_event_models::Coordinates;
use rstar::primitives::GeomWithData;
use rstar::{AABB, RTree};

/// Mean earth radius in meters, matching the haversine metric.
const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Widens the candidate box so rounding never drops a point at the radius.
const ENVELOPE_MARGIN: f64 = 1.01;

type IndexedPoint = GeomWithData<[f64; 2], usize>;

/// Immutable radius-neighbor index over a fixed point set.
pub struct NeighborIndex {
    tree: RTree<IndexedPoint>,
    points: Vec<Point<f64>>,
}

impl NeighborIndex {
    /// Builds the index. Point `i` of the index is `coordinates[i]`.
    #[must_use]
    pub fn new(coordinates: &[Coordinates]) -> Self {
        let points: Vec<Point<f64>> = coordinates
            .iter()
            .map(|c| Point::new(c.longitude, c.latitude))
            .collect();

        let entries = points
            .iter()
            .enumerate()
            .map(|(i, p)| GeomWithData::new([p.x(), p.y()], i))
            .collect();

        Self {
            tree: RTree::bulk_load(entries),
            points,
        }
    }

    /// Number of indexed points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the index holds no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Returns the indices of all *other* points within `radius_m` meters of
    /// point `idx` (inclusive), in ascending index order.
    #[must_use]
    pub fn within(&self, idx: usize, radius_m: f64) -> Vec<usize> {
        let origin = self.points[idx];
        let envelope = search_envelope(origin, radius_m);

        let mut found: Vec<usize> = self
            .tree
            .locate_in_envelope_intersecting(&envelope)
            .map(|entry| entry.data)
            .filter(|&j| j != idx)
            .filter(|&j| Haversine.distance(origin, self.points[j]) <= radius_m)
            .collect();

        // R-tree iteration order depends on the tree layout, not the input.
        found.sort_unstable();
        found
    }
}

/// Degree bounding box containing every point within `radius_m` of `origin`.
///
/// Falls back to the full longitude band near the poles and when the box
/// would wrap the antimeridian.
fn search_envelope(origin: Point<f64>, radius_m: f64) -> AABB<[f64; 2]> {
    let angular = radius_m / EARTH_RADIUS_M;
    let lat = origin.y();
    let lng = origin.x();

    let lat_delta = angular.to_degrees() * ENVELOPE_MARGIN;
    let min_lat = (lat - lat_delta).max(-90.0);
    let max_lat = (lat + lat_delta).min(90.0);

    let full_band = AABB::from_corners([-180.0, min_lat], [180.0, max_lat]);

    if lat.abs() + lat_delta >= 90.0 {
        return full_band;
    }

    let ratio = angular.sin() / lat.to_radians().cos();
    if ratio >= 1.0 {
        return full_band;
    }

    let lng_delta = ratio.asin().to_degrees() * ENVELOPE_MARGIN;
    if lng - lng_delta < -180.0 || lng + lng_delta > 180.0 {
        return full_band;
    }

    AABB::from_corners([lng - lng_delta, min_lat], [lng + lng_delta, max_lat])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coords(points: &[(f64, f64)]) -> Vec<Coordinates> {
        points
            .iter()
            .map(|&(lat, lng)| Coordinates::new(lat, lng).unwrap())
            .collect()
    }

    #[test]
    fn finds_neighbors_and_excludes_self() {
        let index = NeighborIndex::new(&coords(&[
            (41.700, -71.155),
            (41.701, -71.155),
            (41.750, -71.155),
        ]));

        // ~111 m apart vs ~5.5 km apart
        assert_eq!(index.within(0, 500.0), vec![1]);
        assert_eq!(index.within(2, 500.0), Vec::<usize>::new());
        assert_eq!(index.within(0, 10_000.0), vec![1, 2]);
    }

    #[test]
    fn radius_boundary_is_inclusive() {
        let pts = coords(&[(41.700, -71.155), (41.7031, -71.1512)]);
        let exact = Haversine.distance(
            Point::new(pts[0].longitude, pts[0].latitude),
            Point::new(pts[1].longitude, pts[1].latitude),
        );
        let index = NeighborIndex::new(&pts);

        assert_eq!(index.within(0, exact), vec![1]);
        assert_eq!(index.within(1, exact), vec![0]);
        assert!(index.within(0, exact * 0.999).is_empty());
    }

    #[test]
    fn duplicate_coordinates_are_neighbors() {
        let index = NeighborIndex::new(&coords(&[(41.7, -71.1); 4]));
        assert_eq!(index.within(2, 0.0), vec![0, 1, 3]);
    }

    #[test]
    fn wraps_the_antimeridian() {
        let index = NeighborIndex::new(&coords(&[(10.0, 179.999), (10.0, -179.999)]));
        // ~219 m across the antimeridian
        assert_eq!(index.within(0, 500.0), vec![1]);
        assert_eq!(index.within(1, 500.0), vec![0]);
    }

    #[test]
    fn handles_polar_points() {
        let index = NeighborIndex::new(&coords(&[(89.9999, 0.0), (89.9999, 180.0)]));
        // ~22 m apart over the pole
        assert_eq!(index.within(0, 100.0), vec![1]);
    }

    #[test]
    fn empty_index() {
        let index = NeighborIndex::new(&[]);
        assert!(index.is_empty());
        assert_eq!(index.len(), 0);
    }
}
