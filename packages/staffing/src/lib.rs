#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Staffing optimization.
//!
//! The plan minimizes the total number of units over all zone-hours
//! subject to `capacity * units >= service_level * demand` for each
//! zone-hour, with `units` a non-negative integer. No constraint couples two
//! zone-hours, so the integer program splits into one single-variable
//! problem per zone-hour whose optimum is the smallest integer meeting its
//! constraint. An optional per-zone-hour cap turns that into a feasibility
//! question, answered per decision.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use roadside_event_models::ZoneId;
use roadside_forecast_models::ForecastPoint;
use roadside_staffing_models::{DecisionState, StaffingDecision};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display};

/// Default calls one unit covers per hour.
pub const DEFAULT_CAPACITY_PER_UNIT: f64 = 2.0;

/// Default fraction of demand to cover.
pub const DEFAULT_SERVICE_LEVEL: f64 = 0.90;

/// Largest accepted per-unit capacity.
pub const MAX_CAPACITY_PER_UNIT: f64 = 10_000.0;

/// Configuration errors, raised before any zone-hour is solved.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StaffingError {
    /// Capacity outside `(0, MAX_CAPACITY_PER_UNIT]`.
    #[error("invalid capacity per unit {capacity}: expected (0, 10000]")]
    InvalidCapacity {
        /// The rejected capacity.
        capacity: f64,
    },

    /// Service level outside `(0, 1]`.
    #[error("invalid target service level {service_level}: expected (0, 1]")]
    InvalidServiceLevel {
        /// The rejected level.
        service_level: f64,
    },

    /// A unit cap of zero.
    #[error("invalid max units per zone-hour {max_units}: expected >= 1")]
    InvalidMaxUnits {
        /// The rejected cap.
        max_units: u32,
    },
}

/// Validated staffing problem parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaffingProblem {
    capacity_per_unit: f64,
    service_level: f64,
    max_units: Option<u32>,
}

impl StaffingProblem {
    /// Creates a staffing problem.
    ///
    /// # Errors
    ///
    /// Returns [`StaffingError`] if capacity is not in `(0, 10000]`, the
    /// service level is not in `(0, 1]`, or the cap is zero.
    pub fn new(
        capacity_per_unit: f64,
        service_level: f64,
        max_units: Option<u32>,
    ) -> Result<Self, StaffingError> {
        if !capacity_per_unit.is_finite()
            || capacity_per_unit <= 0.0
            || capacity_per_unit > MAX_CAPACITY_PER_UNIT
        {
            return Err(StaffingError::InvalidCapacity {
                capacity: capacity_per_unit,
            });
        }
        if !service_level.is_finite() || service_level <= 0.0 || service_level > 1.0 {
            return Err(StaffingError::InvalidServiceLevel { service_level });
        }
        if max_units == Some(0) {
            return Err(StaffingError::InvalidMaxUnits { max_units: 0 });
        }
        Ok(Self {
            capacity_per_unit,
            service_level,
            max_units,
        })
    }

    /// Calls one unit covers per hour.
    #[must_use]
    pub const fn capacity_per_unit(&self) -> f64 {
        self.capacity_per_unit
    }

    /// Fraction of demand to cover.
    #[must_use]
    pub const fn service_level(&self) -> f64 {
        self.service_level
    }

    /// Per-zone-hour unit cap, if any.
    #[must_use]
    pub const fn max_units(&self) -> Option<u32> {
        self.max_units
    }

    /// Smallest `u` with `capacity * u >= service_level * demand`.
    /// Zero, negative, or non-finite demand needs no units.
    ///
    /// Returns `None` when the smallest such `u` does not fit in a `u32`.
    #[must_use]
    pub fn required_units(&self, demand: f64) -> Option<u32> {
        if !demand.is_finite() || demand <= 0.0 {
            return Some(0);
        }

        let required = self.service_level * demand;
        let capacity = self.capacity_per_unit;

        let estimate = (required / capacity).ceil();
        if !estimate.is_finite() || estimate > f64::from(u32::MAX) {
            return None;
        }

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let mut units = estimate as u32;

        // Division can land one step off in either direction.
        while units > 0 && capacity * f64::from(units - 1) >= required {
            units -= 1;
        }
        while capacity * f64::from(units) < required {
            units = units.checked_add(1)?;
        }

        Some(units)
    }

    /// Solves one decision per forecast zone-hour.
    ///
    /// Forecasts with non-finite demand, repeating a zone-hour already
    /// seen, or needing more units than a `u32` holds are rejected and
    /// reported in the plan; the rest are solved.
    #[must_use]
    pub fn solve(&self, forecasts: &[ForecastPoint]) -> StaffingPlan {
        let mut decisions: BTreeMap<(ZoneId, DateTime<Utc>), StaffingDecision> = BTreeMap::new();
        let mut seen: BTreeSet<(ZoneId, DateTime<Utc>)> = BTreeSet::new();
        let mut rejected = Vec::new();

        for forecast in forecasts {
            let key = (forecast.zone_id, forecast.hour);

            if !forecast.point.is_finite() {
                rejected.push(RejectedForecast {
                    zone_id: forecast.zone_id,
                    hour: forecast.hour,
                    reason: RejectionReason::NonFiniteDemand,
                });
                continue;
            }
            if !seen.insert(key) {
                rejected.push(RejectedForecast {
                    zone_id: forecast.zone_id,
                    hour: forecast.hour,
                    reason: RejectionReason::DuplicateZoneHour,
                });
                continue;
            }

            let demand = forecast.point.max(0.0);
            let Some(units) = self.required_units(demand) else {
                rejected.push(RejectedForecast {
                    zone_id: forecast.zone_id,
                    hour: forecast.hour,
                    reason: RejectionReason::UnitsOutOfRange,
                });
                continue;
            };
            let state = match self.max_units {
                Some(max_units) if units > max_units => DecisionState::Infeasible { max_units },
                _ => DecisionState::Feasible,
            };

            decisions.insert(
                key,
                StaffingDecision {
                    zone_id: forecast.zone_id,
                    hour: forecast.hour,
                    units,
                    expected_demand: demand,
                    service_level: self.service_level,
                    model: forecast.model,
                    state,
                },
            );
        }

        for r in &rejected {
            log::warn!(
                "Rejected forecast for zone {} at {}: {}",
                r.zone_id,
                r.hour,
                r.reason
            );
        }

        let plan = StaffingPlan {
            total_units: decisions.values().map(|d| u64::from(d.units)).sum(),
            decisions: decisions.into_values().collect(),
            rejected,
        };

        let infeasible = plan.infeasible_count();
        if infeasible > 0 {
            log::warn!("{infeasible} zone-hours need more units than the configured cap");
        }
        log::info!(
            "Staffed {} zone-hours with {} units",
            plan.decisions.len(),
            plan.total_units
        );

        plan
    }
}

impl Default for StaffingProblem {
    fn default() -> Self {
        Self {
            capacity_per_unit: DEFAULT_CAPACITY_PER_UNIT,
            service_level: DEFAULT_SERVICE_LEVEL,
            max_units: None,
        }
    }
}

/// Why a forecast row was not staffed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectionReason {
    /// Same zone and hour as an earlier row.
    DuplicateZoneHour,
    /// Demand is NaN or infinite.
    NonFiniteDemand,
    /// Covering the demand takes more units than a decision can hold.
    UnitsOutOfRange,
}

/// A forecast row left out of the plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectedForecast {
    /// Zone of the row.
    pub zone_id: ZoneId,
    /// Hour of the row.
    pub hour: DateTime<Utc>,
    /// Why it was rejected.
    pub reason: RejectionReason,
}

/// Solved staffing plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaffingPlan {
    /// One decision per zone-hour, ordered by zone then hour.
    pub decisions: Vec<StaffingDecision>,
    /// Objective value: units summed over every decision.
    pub total_units: u64,
    /// Rows that were not solved.
    pub rejected: Vec<RejectedForecast>,
}

impl StaffingPlan {
    /// Decisions whose requirement exceeds the cap.
    #[must_use]
    pub fn infeasible_count(&self) -> usize {
        self.decisions
            .iter()
            .filter(|d| !d.state.is_feasible())
            .count()
    }

    /// Decisions for one zone, in hour order.
    pub fn for_zone(&self, zone_id: ZoneId) -> impl Iterator<Item = &StaffingDecision> + '_ {
        self.decisions.iter().filter(move |d| d.zone_id == zone_id)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;
    use roadside_forecast_models::ForecastModel;

    use super::*;

    fn hour(h: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_704_067_200 + h * 3600, 0).unwrap()
    }

    fn point(zone: u32, h: i64, demand: f64) -> ForecastPoint {
        ForecastPoint {
            zone_id: ZoneId(zone),
            hour: hour(h),
            point: demand,
            lower: demand,
            upper: demand,
            model: ForecastModel::Naive,
        }
    }

    #[test]
    fn ninety_five_calls_need_five_units() {
        let problem = StaffingProblem::new(20.0, 0.9, None).unwrap();
        assert_eq!(problem.required_units(95.0), Some(5));
    }

    #[test]
    fn zero_or_negative_demand_needs_nothing() {
        let problem = StaffingProblem::new(20.0, 0.9, None).unwrap();
        assert_eq!(problem.required_units(0.0), Some(0));
        assert_eq!(problem.required_units(-4.0), Some(0));
    }

    #[test]
    fn exact_multiples_do_not_over_staff() {
        let problem = StaffingProblem::new(25.0, 1.0, None).unwrap();
        assert_eq!(problem.required_units(50.0), Some(2));
        assert_eq!(problem.required_units(50.000_001), Some(3));

        let problem = StaffingProblem::new(0.1, 0.3, None).unwrap();
        // 0.3 * 1.0 / 0.1 is 2.9999999999999996 in floating point.
        assert_eq!(problem.required_units(1.0), Some(3));
    }

    #[test]
    fn units_are_minimal() {
        let problem = StaffingProblem::new(7.5, 0.85, None).unwrap();
        for demand in [0.1, 1.0, 7.0, 8.8, 13.3, 40.0, 99.9] {
            let units = problem.required_units(demand).unwrap();
            let required = 0.85 * demand;
            assert!(7.5 * f64::from(units) >= required, "demand {demand}");
            assert!(7.5 * f64::from(units - 1) < required, "demand {demand}");
        }
    }

    #[test]
    fn unit_counts_beyond_u32_are_not_saturated() {
        let problem = StaffingProblem::new(1.0, 1.0, None).unwrap();
        assert_eq!(problem.required_units(4_294_967_295.0), Some(u32::MAX));
        assert_eq!(problem.required_units(4_294_967_296.0), None);

        let problem = StaffingProblem::new(0.001, 1.0, None).unwrap();
        assert_eq!(problem.required_units(1.0e7), None);
        assert_eq!(problem.required_units(f64::MAX), None);

        let plan = problem.solve(&[point(1, 0, 1.0e7), point(1, 1, 2.0)]);
        assert_eq!(plan.decisions.len(), 1);
        assert_eq!(plan.decisions[0].hour, hour(1));
        assert_eq!(plan.decisions[0].units, 2000);
        assert_eq!(
            plan.rejected,
            vec![RejectedForecast {
                zone_id: ZoneId(1),
                hour: hour(0),
                reason: RejectionReason::UnitsOutOfRange,
            }]
        );
        assert_eq!(plan.total_units, 2000);
    }

    #[test]
    fn capacity_zero_fails_fast() {
        assert_eq!(
            StaffingProblem::new(0.0, 0.9, None),
            Err(StaffingError::InvalidCapacity { capacity: 0.0 })
        );
        assert!(StaffingProblem::new(-1.0, 0.9, None).is_err());
        assert!(StaffingProblem::new(f64::INFINITY, 0.9, None).is_err());
    }

    #[test]
    fn service_level_range() {
        assert!(StaffingProblem::new(2.0, 1.0, None).is_ok());
        assert_eq!(
            StaffingProblem::new(2.0, 0.0, None),
            Err(StaffingError::InvalidServiceLevel { service_level: 0.0 })
        );
        assert!(StaffingProblem::new(2.0, 1.01, None).is_err());
        assert!(StaffingProblem::new(2.0, 0.9, Some(0)).is_err());
    }

    #[test]
    fn three_zones_at_forty_calls_need_two_units_each() {
        let problem = StaffingProblem::new(25.0, 0.9, None).unwrap();
        let forecasts: Vec<ForecastPoint> = (1..=3)
            .flat_map(|zone| (0..48).map(move |h| point(zone, h, 40.0)))
            .collect();

        let plan = problem.solve(&forecasts);

        assert_eq!(plan.decisions.len(), 144);
        assert!(plan.decisions.iter().all(|d| d.units == 2), "{plan:?}");
        assert_eq!(plan.total_units, 288);
        assert_eq!(plan.infeasible_count(), 0);
        assert!(plan.rejected.is_empty());
    }

    #[test]
    fn decisions_ordered_by_zone_then_hour() {
        let problem = StaffingProblem::default();
        let plan = problem.solve(&[point(2, 1, 1.0), point(1, 5, 1.0), point(2, 0, 1.0)]);
        let keys: Vec<(ZoneId, DateTime<Utc>)> =
            plan.decisions.iter().map(|d| (d.zone_id, d.hour)).collect();
        assert_eq!(
            keys,
            vec![
                (ZoneId(1), hour(5)),
                (ZoneId(2), hour(0)),
                (ZoneId(2), hour(1)),
            ]
        );
        assert_eq!(plan.for_zone(ZoneId(2)).count(), 2);
    }

    #[test]
    fn solution_is_independent_of_input_order() {
        let problem = StaffingProblem::new(3.0, 0.9, None).unwrap();
        let forecasts: Vec<ForecastPoint> = (0..10)
            .map(|i| point(i % 3, i64::from(i), f64::from(i) * 1.7))
            .collect();
        let mut reversed = forecasts.clone();
        reversed.reverse();

        assert_eq!(problem.solve(&forecasts), problem.solve(&reversed));
    }

    #[test]
    fn cap_marks_decisions_infeasible_without_clamping() {
        let problem = StaffingProblem::new(10.0, 1.0, Some(3)).unwrap();
        let plan = problem.solve(&[point(1, 0, 30.0), point(1, 1, 45.0)]);

        assert_eq!(plan.decisions[0].units, 3);
        assert_eq!(plan.decisions[0].state, DecisionState::Feasible);
        assert_eq!(plan.decisions[1].units, 5);
        assert_eq!(
            plan.decisions[1].state,
            DecisionState::Infeasible { max_units: 3 }
        );
        assert_eq!(plan.infeasible_count(), 1);
    }

    #[test]
    fn duplicates_and_non_finite_are_rejected() {
        let problem = StaffingProblem::default();
        let plan = problem.solve(&[
            point(1, 0, 4.0),
            point(1, 0, 9.0),
            point(1, 1, f64::NAN),
            point(1, 2, 1.0),
        ]);

        assert_eq!(plan.decisions.len(), 2);
        assert!((plan.decisions[0].expected_demand - 4.0).abs() < f64::EPSILON);
        assert_eq!(
            plan.rejected,
            vec![
                RejectedForecast {
                    zone_id: ZoneId(1),
                    hour: hour(0),
                    reason: RejectionReason::DuplicateZoneHour,
                },
                RejectedForecast {
                    zone_id: ZoneId(1),
                    hour: hour(0) + TimeDelta::hours(1),
                    reason: RejectionReason::NonFiniteDemand,
                },
            ]
        );
    }

    #[test]
    fn decisions_carry_model_and_service_level() {
        let problem = StaffingProblem::new(2.0, 0.75, None).unwrap();
        let mut seasonal = point(4, 0, 3.0);
        seasonal.model = ForecastModel::Seasonal;
        let plan = problem.solve(&[seasonal]);
        let d = &plan.decisions[0];
        assert_eq!(d.model, ForecastModel::Seasonal);
        assert!((d.service_level - 0.75).abs() < f64::EPSILON);
        assert_eq!(d.units, 2);
    }
}
