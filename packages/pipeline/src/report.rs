//! Structured record of one pipeline run.
//!
//! Everything the run left out, fell back on, or could not satisfy is listed
//! here rather than only logged.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use roadside_event_models::{EventId, ExcludedRecord, ZoneId};
use roadside_forecast::{FallbackReason, HourWindow};
use roadside_staffing::RejectedForecast;
use serde::{Deserialize, Serialize};

use crate::config::PlannerConfig;
use crate::progress::Stage;

/// Clustering outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoningStats {
    /// Events that took part in clustering.
    pub located_events: usize,
    /// Non-noise zones found.
    pub zone_count: u32,
    /// Events labeled noise.
    pub noise_count: u64,
}

/// A zone forecast with the naive model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FallbackRecord {
    /// Zone.
    pub zone_id: ZoneId,
    /// Why the seasonal model was not used.
    pub reason: FallbackReason,
}

/// A zone that was not forecast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedZone {
    /// Zone.
    pub zone_id: ZoneId,
    /// Why it was skipped.
    pub reason: String,
}

/// A zone-hour whose requirement exceeds the unit cap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfeasibleRecord {
    /// Zone.
    pub zone_id: ZoneId,
    /// Hour.
    pub hour: DateTime<Utc>,
    /// Units the service level needs.
    pub required_units: u32,
    /// Cap in force.
    pub max_units: u32,
}

/// Wall time of one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageTiming {
    /// Stage.
    pub stage: Stage,
    /// Elapsed milliseconds.
    pub millis: u64,
}

/// Run-level counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Totals {
    /// Events read.
    pub events: usize,
    /// Zones forecast.
    pub zones_forecast: usize,
    /// Forecast rows produced.
    pub forecast_points: usize,
    /// Staffing decisions made.
    pub zone_hours: usize,
    /// Sum of units over all decisions.
    pub total_units: u64,
}

/// Report for one run, written as `report.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    /// Run identifier, also the artifact directory name.
    pub run_id: String,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// Input file, when the run read one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,
    /// Configuration as given.
    pub config: PlannerConfig,
    /// Rows dropped during ingestion.
    pub excluded_records: Vec<ExcludedRecord>,
    /// Events without coordinates, left out of zoning.
    pub unlocated_events: Vec<EventId>,
    /// Clustering outcome.
    pub zoning: ZoningStats,
    /// History window used for aggregation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window: Option<HourWindow>,
    /// Zones forecast with the naive model.
    pub fallbacks: Vec<FallbackRecord>,
    /// Zones not forecast.
    pub skipped_zones: Vec<SkippedZone>,
    /// Forecast rows the optimizer refused.
    pub rejected_forecasts: Vec<RejectedForecast>,
    /// Zone-hours over the unit cap.
    pub infeasible_decisions: Vec<InfeasibleRecord>,
    /// Run-level counts.
    pub totals: Totals,
    /// Per-stage wall time, in execution order.
    pub stage_timings: Vec<StageTiming>,
    /// Directory holding the run's artifacts, when persisted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifacts_dir: Option<PathBuf>,
    /// Error that aborted the run before any stage ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fatal: Option<String>,
}

impl RunReport {
    /// Empty report for a new run.
    #[must_use]
    pub fn new(run_id: String, config: PlannerConfig) -> Self {
        Self {
            run_id,
            started_at: Utc::now(),
            source: None,
            config,
            excluded_records: Vec::new(),
            unlocated_events: Vec::new(),
            zoning: ZoningStats::default(),
            window: None,
            fallbacks: Vec::new(),
            skipped_zones: Vec::new(),
            rejected_forecasts: Vec::new(),
            infeasible_decisions: Vec::new(),
            totals: Totals::default(),
            stage_timings: Vec::new(),
            artifacts_dir: None,
            fatal: None,
        }
    }

    /// Report for a run that stopped on a configuration error.
    #[must_use]
    pub fn fatal(config: PlannerConfig, error: &dyn std::error::Error) -> Self {
        Self {
            fatal: Some(error.to_string()),
            ..Self::new(new_run_id(), config)
        }
    }

    /// Pretty JSON rendering.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Short human-readable summary.
    #[must_use]
    pub fn summary(&self) -> String {
        if let Some(fatal) = &self.fatal {
            return format!("Run {} aborted: {fatal}", self.run_id);
        }

        let mut out = format!(
            "Run {}: {} events ({} excluded, {} unlocated), {} zones + {} noise events",
            self.run_id,
            self.totals.events,
            self.excluded_records.len(),
            self.unlocated_events.len(),
            self.zoning.zone_count,
            self.zoning.noise_count,
        );
        out.push_str(&format!(
            "\nForecast {} zones ({} naive, {} skipped), {} zone-hours staffed with {} units",
            self.totals.zones_forecast,
            self.fallbacks.len(),
            self.skipped_zones.len(),
            self.totals.zone_hours,
            self.totals.total_units,
        ));
        if !self.rejected_forecasts.is_empty() || !self.infeasible_decisions.is_empty() {
            out.push_str(&format!(
                "\n{} forecast rows rejected, {} zone-hours over the unit cap",
                self.rejected_forecasts.len(),
                self.infeasible_decisions.len(),
            ));
        }
        if let Some(dir) = &self.artifacts_dir {
            out.push_str(&format!("\nArtifacts: {}", dir.display()));
        }
        out
    }
}

/// Fresh run id: UTC start time plus a random suffix.
#[must_use]
pub fn new_run_id() -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", Utc::now().format("%Y%m%dT%H%M%SZ"), &suffix[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_ids_are_unique() {
        let a = new_run_id();
        let b = new_run_id();
        assert_ne!(a, b);
        assert_eq!(a.len(), "20240101T000000Z-".len() + 8, "{a}");
    }

    #[test]
    fn fatal_report_serializes_error() {
        let err = std::io::Error::other("capacity must be positive");
        let report = RunReport::fatal(PlannerConfig::default(), &err);
        let json = report.to_json().unwrap();

        assert!(json.contains("\"fatal\": \"capacity must be positive\""), "{json}");
        assert!(report.summary().contains("aborted"));
    }

    #[test]
    fn report_parses_back() {
        let mut report = RunReport::new("run-1".to_string(), PlannerConfig::default());
        report.fallbacks.push(FallbackRecord {
            zone_id: ZoneId(2),
            reason: FallbackReason::InsufficientHistory {
                observed: 10,
                required: 336,
            },
        });
        report.stage_timings.push(StageTiming {
            stage: Stage::Forecast,
            millis: 12,
        });

        let json = report.to_json().unwrap();
        let parsed: RunReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, report);
        assert!(json.contains("\"stage\": \"forecast\""), "{json}");
    }
}
