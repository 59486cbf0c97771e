#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! End-to-end staffing pipeline.
//!
//! Runs ingest -> zoning -> hourly aggregation -> forecast -> staffing ->
//! persist. Each stage finishes and hands an immutable snapshot to the
//! next; nothing streams between stages. Per-zone forecasts run as
//! independent blocking tasks and are re-keyed by zone, so results do not
//! depend on completion order.
//!
//! Configuration is validated in [`Pipeline::new`], before any stage runs.
//! Bad input rows, sparse zones, and unsatisfiable zone-hours degrade the
//! run and are listed in the [`RunReport`]; a failing stage halts the run
//! with [`PipelineError::Stage`].

pub mod artifacts;
pub mod config;
pub mod progress;
pub mod report;

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use roadside_event_models::{Event, ZoneId};
use roadside_forecast::{Forecast, ForecastSettings, HourWindow, aggregate_hourly, forecast_zone};
use roadside_forecast_models::{ForecastPoint, HourlySeries};
use roadside_ingest::IngestOutcome;
use roadside_staffing::StaffingPlan;
use roadside_staffing_models::DecisionState;
use roadside_zoning::{ZoneAssignment, assign_zones};
use tokio::task::JoinSet;

use crate::artifacts::{
    EVENTS_ZONED, EventRow, FORECAST, ForecastRow, HOURLY_SERIES, REPORT, RunDirectory,
    STAFFING_PLAN, StaffingRow, ZONE_LABELS, ZONE_SUMMARY, ZoneLabelRow, ZoneSummaryRow,
    hourly_rows,
};
use crate::config::{ConfigError, PlannerConfig, ValidatedConfig};
use crate::progress::{ProgressCallback, Stage, null_progress};
use crate::report::{
    FallbackRecord, InfeasibleRecord, RunReport, SkippedZone, StageTiming, ZoningStats,
    new_run_id,
};

/// Errors that halt a run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Configuration was rejected before any stage ran.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A stage failed.
    #[error("{stage} stage failed{}: {message}", scope(.zone.as_ref(), .window.as_ref()))]
    Stage {
        /// Failing stage.
        stage: Stage,
        /// Zone being processed, for zone-scoped failures.
        zone: Option<ZoneId>,
        /// History window in effect, when known.
        window: Option<HourWindow>,
        /// What went wrong.
        message: String,
    },
}

fn scope(zone: Option<&ZoneId>, window: Option<&HourWindow>) -> String {
    match (zone, window) {
        (Some(z), Some(w)) => format!(" for zone {z} over {w}"),
        (Some(z), None) => format!(" for zone {z}"),
        (None, Some(w)) => format!(" over {w}"),
        (None, None) => String::new(),
    }
}

impl PipelineError {
    fn stage(stage: Stage, message: impl Into<String>) -> Self {
        Self::Stage {
            stage,
            zone: None,
            window: None,
            message: message.into(),
        }
    }
}

/// Events with their run's zone applied. Unlocated events are not included.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ZonedEvents {
    /// Labeled events in input order.
    pub events: Vec<Event>,
}

impl ZonedEvents {
    /// Applies `assignment` to every located event.
    #[must_use]
    pub fn apply(events: &[Event], assignment: &ZoneAssignment) -> Self {
        Self {
            events: events
                .iter()
                .filter_map(|e| assignment.zone_of(e.id).map(|zone| e.with_zone(zone)))
                .collect(),
        }
    }
}

/// Hourly series handed to forecasting.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeriesSnapshot {
    /// History window, `None` when there were no zoned events.
    pub window: Option<HourWindow>,
    /// One zero-filled series per forecastable zone.
    pub series: BTreeMap<ZoneId, HourlySeries>,
}

/// Per-zone forecasts keyed by zone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ForecastSnapshot {
    /// Forecast for every zone that had a series.
    pub forecasts: BTreeMap<ZoneId, Forecast>,
}

impl ForecastSnapshot {
    /// All forecast points ordered by zone then hour.
    #[must_use]
    pub fn points(&self) -> Vec<ForecastPoint> {
        self.forecasts
            .values()
            .flat_map(|f| f.points().iter().cloned())
            .collect()
    }
}

/// Every stage's output from one run.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    /// Run report.
    pub report: RunReport,
    /// Zone labels and summaries.
    pub assignment: ZoneAssignment,
    /// Hourly series.
    pub series: SeriesSnapshot,
    /// Forecasts.
    pub forecasts: ForecastSnapshot,
    /// Staffing plan.
    pub plan: StaffingPlan,
    /// Artifact directory, when persisted.
    pub run_dir: Option<PathBuf>,
}

/// A configured pipeline.
pub struct Pipeline {
    raw: PlannerConfig,
    config: ValidatedConfig,
    progress: Arc<dyn ProgressCallback>,
}

impl Pipeline {
    /// Validates `config` and builds a pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for any out-of-range option.
    pub fn new(config: PlannerConfig) -> Result<Self, ConfigError> {
        let validated = config.validate()?;
        Ok(Self {
            raw: config,
            config: validated,
            progress: null_progress(),
        })
    }

    /// Reports stage progress to `progress`.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    /// Validated configuration in use.
    #[must_use]
    pub const fn config(&self) -> &ValidatedConfig {
        &self.config
    }

    /// Reads the event export at `events_path` and runs every stage.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Stage`] if the file cannot be read or any
    /// later stage fails.
    pub async fn run(&self, events_path: &Path) -> Result<PipelineOutcome, PipelineError> {
        let mut report = RunReport::new(new_run_id(), self.raw.clone());
        report.source = Some(events_path.to_path_buf());

        self.progress.stage_started(Stage::Ingest, None);
        let started = Instant::now();

        let path = events_path.to_path_buf();
        let ingest = tokio::task::spawn_blocking(move || roadside_ingest::read_events(&path))
            .await
            .map_err(|e| PipelineError::stage(Stage::Ingest, e.to_string()))?
            .map_err(|e| PipelineError::stage(Stage::Ingest, e.to_string()))?;

        finish_stage(
            &*self.progress,
            &mut report,
            Stage::Ingest,
            started,
            format!(
                "Read {} events, excluded {} rows",
                ingest.events.len(),
                ingest.excluded.len()
            ),
        );

        self.run_stages(ingest, report).await
    }

    /// Runs every stage after ingestion on an already-read batch.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Stage`] if a stage fails.
    pub async fn run_ingested(&self, ingest: IngestOutcome) -> Result<PipelineOutcome, PipelineError> {
        let report = RunReport::new(new_run_id(), self.raw.clone());
        self.run_stages(ingest, report).await
    }

    async fn run_stages(
        &self,
        ingest: IngestOutcome,
        mut report: RunReport,
    ) -> Result<PipelineOutcome, PipelineError> {
        let progress = &*self.progress;

        for excluded in &ingest.excluded {
            log::debug!(
                "Excluded row {} ({}): {}",
                excluded.row,
                excluded.reason,
                excluded.detail
            );
        }
        report.excluded_records.clone_from(&ingest.excluded);
        report.totals.events = ingest.events.len();

        // Zoning
        progress.stage_started(Stage::Zoning, Some(ingest.located_count() as u64));
        let started = Instant::now();

        let events = Arc::new(ingest.events);
        let assignment = {
            let events = Arc::clone(&events);
            let params = self.config.zoning;
            tokio::task::spawn_blocking(move || assign_zones(&events, &params))
                .await
                .map_err(|e| PipelineError::stage(Stage::Zoning, e.to_string()))?
        };

        report.unlocated_events.clone_from(&assignment.unlocated);
        report.zoning = ZoningStats {
            located_events: assignment.labels.len(),
            zone_count: assignment.zone_count,
            noise_count: assignment.noise_count,
        };
        finish_stage(
            progress,
            &mut report,
            Stage::Zoning,
            started,
            format!(
                "{} zones, {} noise events",
                assignment.zone_count, assignment.noise_count
            ),
        );

        // Aggregation
        progress.stage_started(Stage::Aggregation, None);
        let started = Instant::now();

        let zoned = ZonedEvents::apply(&events, &assignment);
        let series = self.aggregate(&zoned, &assignment, &mut report)?;

        finish_stage(
            progress,
            &mut report,
            Stage::Aggregation,
            started,
            format!("{} zone series", series.series.len()),
        );

        // Forecast
        progress.stage_started(Stage::Forecast, Some(series.series.len() as u64));
        let started = Instant::now();

        let forecasts = self.forecast(&series).await?;
        for (&zone_id, forecast) in &forecasts.forecasts {
            if let Some(reason) = forecast.fallback_reason() {
                report.fallbacks.push(FallbackRecord { zone_id, reason });
            }
        }
        let points = forecasts.points();
        report.totals.zones_forecast = forecasts.forecasts.len();
        report.totals.forecast_points = points.len();

        let detail = format!(
            "{} zones forecast ({} naive)",
            forecasts.forecasts.len(),
            report.fallbacks.len()
        );
        finish_stage(progress, &mut report, Stage::Forecast, started, detail);

        // Staffing
        progress.stage_started(Stage::Staffing, Some(points.len() as u64));
        let started = Instant::now();

        let plan = self.config.staffing.solve(&points);
        report.rejected_forecasts.clone_from(&plan.rejected);
        report.infeasible_decisions = plan
            .decisions
            .iter()
            .filter_map(|d| match d.state {
                DecisionState::Infeasible { max_units } => Some(InfeasibleRecord {
                    zone_id: d.zone_id,
                    hour: d.hour,
                    required_units: d.units,
                    max_units,
                }),
                DecisionState::Feasible => None,
            })
            .collect();
        report.totals.zone_hours = plan.decisions.len();
        report.totals.total_units = plan.total_units;

        progress.advance(points.len() as u64);
        finish_stage(
            progress,
            &mut report,
            Stage::Staffing,
            started,
            format!(
                "{} zone-hours, {} units",
                plan.decisions.len(),
                plan.total_units
            ),
        );

        // Persist
        let run_dir = if self.config.persist {
            progress.stage_started(Stage::Persist, None);
            let started = Instant::now();

            let dir = self
                .persist(&zoned, &assignment, &series, &forecasts, &plan, &mut report, started)
                .map_err(|e| PipelineError::Stage {
                    stage: Stage::Persist,
                    zone: None,
                    window: series.window,
                    message: e.to_string(),
                })?;

            progress.stage_finished(Stage::Persist, format!("Artifacts in {}", dir.display()));
            Some(dir)
        } else {
            log::info!("Persistence disabled; no artifacts written");
            None
        };

        log::info!("{}", report.summary());

        Ok(PipelineOutcome {
            report,
            assignment,
            series,
            forecasts,
            plan,
            run_dir,
        })
    }

    fn aggregate(
        &self,
        zoned: &ZonedEvents,
        assignment: &ZoneAssignment,
        report: &mut RunReport,
    ) -> Result<SeriesSnapshot, PipelineError> {
        let window = HourWindow::covering(
            zoned.events.iter().map(|e| e.requested_at),
            self.config.lookback_hours,
        );
        report.window = window;

        let Some(window) = window else {
            log::warn!("No zoned events; nothing to forecast");
            return Ok(SeriesSnapshot::default());
        };

        let mut series = aggregate_hourly(&zoned.events, &window).map_err(|e| {
            PipelineError::Stage {
                stage: Stage::Aggregation,
                zone: None,
                window: Some(window),
                message: e.to_string(),
            }
        })?;

        if !self.config.include_noise_zone && series.remove(&ZoneId::NOISE).is_some() {
            log::info!("Skipping noise zone (forecast.include_noise_zone = false)");
            report.skipped_zones.push(SkippedZone {
                zone_id: ZoneId::NOISE,
                reason: "noise zone excluded by configuration".to_string(),
            });
        }

        for zone_id in assignment.zone_ids() {
            if series.contains_key(&zone_id) || (zone_id.is_noise() && !self.config.include_noise_zone) {
                continue;
            }
            log::warn!("Skipping zone {zone_id}: no events in {window}");
            report.skipped_zones.push(SkippedZone {
                zone_id,
                reason: format!("no events in {window}"),
            });
        }

        log::info!(
            "Aggregated {} zones over {} hours starting {}",
            series.len(),
            window.hours,
            window.start
        );

        Ok(SeriesSnapshot {
            window: Some(window),
            series,
        })
    }

    async fn forecast(&self, snapshot: &SeriesSnapshot) -> Result<ForecastSnapshot, PipelineError> {
        let settings: ForecastSettings = self.config.forecast;
        let mut tasks = JoinSet::new();
        let mut zone_of_task = HashMap::new();

        for (&zone_id, series) in &snapshot.series {
            let series = series.clone();
            let handle =
                tasks.spawn_blocking(move || (zone_id, forecast_zone(&series, &settings)));
            zone_of_task.insert(handle.id(), zone_id);
        }

        let mut forecasts = BTreeMap::new();
        while let Some(joined) = tasks.join_next().await {
            let (zone_id, result) = joined.map_err(|e| PipelineError::Stage {
                stage: Stage::Forecast,
                zone: zone_of_task.get(&e.id()).copied(),
                window: snapshot.window,
                message: format!("zone task failed: {e}"),
            })?;

            let forecast = result.map_err(|e| PipelineError::Stage {
                stage: Stage::Forecast,
                zone: Some(zone_id),
                window: snapshot.window,
                message: e.to_string(),
            })?;

            forecasts.insert(zone_id, forecast);
            self.progress.advance(1);
        }

        Ok(ForecastSnapshot { forecasts })
    }

    #[allow(clippy::too_many_arguments)]
    fn persist(
        &self,
        zoned: &ZonedEvents,
        assignment: &ZoneAssignment,
        series: &SeriesSnapshot,
        forecasts: &ForecastSnapshot,
        plan: &StaffingPlan,
        report: &mut RunReport,
        started: Instant,
    ) -> Result<PathBuf, artifacts::ArtifactError> {
        let mut dir = RunDirectory::create(&self.config.output_dir, &report.run_id)?;

        dir.write_csv(EVENTS_ZONED, zoned.events.iter().map(EventRow::from))?;
        dir.write_csv(
            ZONE_LABELS,
            assignment
                .labels
                .iter()
                .map(|(&event_id, zone)| ZoneLabelRow {
                    event_id,
                    zone_id: zone.value(),
                }),
        )?;
        dir.write_csv(
            ZONE_SUMMARY,
            assignment.summaries.iter().map(ZoneSummaryRow::from),
        )?;
        dir.write_csv(HOURLY_SERIES, hourly_rows(series.series.values()))?;
        dir.write_csv(
            FORECAST,
            forecasts
                .forecasts
                .values()
                .flat_map(|f| f.points().iter().map(ForecastRow::from)),
        )?;
        dir.write_csv(STAFFING_PLAN, plan.decisions.iter().map(StaffingRow::from))?;

        report.artifacts_dir = Some(dir.path().to_path_buf());
        report.stage_timings.push(StageTiming {
            stage: Stage::Persist,
            millis: elapsed_millis(started),
        });
        dir.write_json(REPORT, &*report)?;
        dir.write_manifest(&report.run_id, &self.raw)?;

        Ok(dir.path().to_path_buf())
    }
}

fn elapsed_millis(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn finish_stage(
    progress: &dyn ProgressCallback,
    report: &mut RunReport,
    stage: Stage,
    started: Instant,
    summary: String,
) {
    let millis = elapsed_millis(started);
    log::info!("[{stage}] {summary} in {millis} ms");
    report.stage_timings.push(StageTiming { stage, millis });
    progress.stage_finished(stage, summary);
}
