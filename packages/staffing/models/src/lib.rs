#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Staffing decision types.

use chrono::{DateTime, Utc};
use roadside_event_models::ZoneId;
use roadside_forecast_models::ForecastModel;
use serde::{Deserialize, Serialize};
use strum_macros::AsRefStr;

/// Whether a zone-hour's coverage constraint could be met.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr)]
#[serde(tag = "state", rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DecisionState {
    /// The unit count meets the service level.
    Feasible,
    /// Meeting the service level needs more units than the per-zone-hour
    /// cap allows. The decision's unit count is the uncapped requirement.
    Infeasible {
        /// Cap in force.
        max_units: u32,
    },
}

impl DecisionState {
    /// Whether the constraint is met.
    #[must_use]
    pub const fn is_feasible(&self) -> bool {
        matches!(self, Self::Feasible)
    }
}

/// Recommended units for one zone-hour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaffingDecision {
    /// Zone being staffed.
    pub zone_id: ZoneId,
    /// Hour being staffed.
    pub hour: DateTime<Utc>,
    /// Smallest unit count meeting the service level.
    pub units: u32,
    /// Forecast demand the count was sized against.
    pub expected_demand: f64,
    /// Fraction of demand covered.
    pub service_level: f64,
    /// Forecast path behind `expected_demand`.
    pub model: ForecastModel,
    /// Feasibility under the configured cap.
    pub state: DecisionState,
}

impl StaffingDecision {
    /// Calls the decision commits to covering.
    #[must_use]
    pub fn required_coverage(&self) -> f64 {
        self.service_level * self.expected_demand.max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_names() {
        assert_eq!(DecisionState::Feasible.as_ref(), "feasible");
        assert_eq!(DecisionState::Infeasible { max_units: 3 }.as_ref(), "infeasible");
        assert!(!DecisionState::Infeasible { max_units: 3 }.is_feasible());
    }

    #[test]
    fn state_serializes_with_tag() {
        let json = serde_json::to_string(&DecisionState::Infeasible { max_units: 4 }).unwrap();
        assert_eq!(json, r#"{"state":"infeasible","max_units":4}"#);
    }

    #[test]
    fn coverage_ignores_negative_demand() {
        let decision = StaffingDecision {
            zone_id: ZoneId(1),
            hour: DateTime::from_timestamp(0, 0).unwrap(),
            units: 0,
            expected_demand: -3.0,
            service_level: 0.9,
            model: ForecastModel::Naive,
            state: DecisionState::Feasible,
        };
        assert!(decision.required_coverage().abs() < f64::EPSILON);
    }
}
