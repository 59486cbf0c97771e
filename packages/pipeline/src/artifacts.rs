//! Immutable per-run artifacts.
//!
//! Each run writes into a fresh `<root>/<run_id>/` directory. The directory
//! must not already exist and every file is created with `create_new`, so a
//! finished run's artifacts are never overwritten by a later one.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use roadside_event_models::{Event, EventId, ZoneId};
use roadside_forecast_models::{ForecastModel, ForecastPoint, HourlySeries};
use roadside_staffing_models::StaffingDecision;
use roadside_zoning::ZoneSummary;
use serde::{Deserialize, Serialize};

use crate::config::PlannerConfig;

/// Version of the artifact file layout.
pub const ARTIFACT_SCHEMA_VERSION: u32 = 1;

/// Zoned event snapshot.
pub const EVENTS_ZONED: &str = "events_zoned.csv";
/// Event id -> zone id mapping.
pub const ZONE_LABELS: &str = "zone_labels.csv";
/// Per-zone centroid and event count.
pub const ZONE_SUMMARY: &str = "zone_summary.csv";
/// Zero-filled hourly counts per zone.
pub const HOURLY_SERIES: &str = "hourly_series.csv";
/// Forecast rows.
pub const FORECAST: &str = "forecast.csv";
/// Staffing decisions.
pub const STAFFING_PLAN: &str = "staffing_plan.csv";
/// Run report.
pub const REPORT: &str = "report.json";
/// Manifest listing the other artifacts.
pub const MANIFEST: &str = "manifest.json";

/// Errors raised while reading or writing artifacts.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    /// The run directory or an artifact file already exists.
    #[error("artifact already exists: {path}")]
    Exists {
        /// Path that was already present.
        path: String,
    },

    /// Filesystem failure.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path being accessed.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// CSV encoding or decoding failure.
    #[error("CSV error in {path}: {source}")]
    Csv {
        /// File being accessed.
        path: String,
        /// Underlying error.
        source: csv::Error,
    },

    /// JSON encoding failure.
    #[error("JSON error in {path}: {source}")]
    Json {
        /// File being written.
        path: String,
        /// Underlying error.
        source: serde_json::Error,
    },
}

/// A created, initially empty run directory.
#[derive(Debug, Clone)]
pub struct RunDirectory {
    path: PathBuf,
    written: BTreeMap<String, usize>,
}

impl RunDirectory {
    /// Creates `<root>/<run_id>/`, creating `root` if needed.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError::Exists`] if the run directory already
    /// exists, or [`ArtifactError::Io`] on any other failure.
    pub fn create(root: &Path, run_id: &str) -> Result<Self, ArtifactError> {
        std::fs::create_dir_all(root).map_err(|e| ArtifactError::Io {
            path: root.display().to_string(),
            source: e,
        })?;

        let path = root.join(run_id);
        std::fs::create_dir(&path).map_err(|e| classify(&path, e))?;

        Ok(Self {
            path,
            written: BTreeMap::new(),
        })
    }

    /// Directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rows written so far, by file name.
    #[must_use]
    pub const fn written(&self) -> &BTreeMap<String, usize> {
        &self.written
    }

    fn create_file(&self, name: &str) -> Result<(PathBuf, File), ArtifactError> {
        let path = self.path.join(name);
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| classify(&path, e))?;
        Ok((path, file))
    }

    /// Writes `rows` as a headed CSV file and returns the row count.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError`] if the file exists or cannot be written.
    pub fn write_csv<T: Serialize>(
        &mut self,
        name: &str,
        rows: impl IntoIterator<Item = T>,
    ) -> Result<usize, ArtifactError> {
        let (path, file) = self.create_file(name)?;
        let csv_err = |e: csv::Error| ArtifactError::Csv {
            path: path.display().to_string(),
            source: e,
        };

        let mut writer = csv::Writer::from_writer(file);
        let mut count = 0;
        for row in rows {
            writer.serialize(row).map_err(csv_err)?;
            count += 1;
        }
        writer.flush().map_err(|e| ArtifactError::Io {
            path: path.display().to_string(),
            source: e,
        })?;

        log::info!("Wrote {count} rows to {}", path.display());
        self.written.insert(name.to_string(), count);
        Ok(count)
    }

    /// Writes `value` as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError`] if the file exists or cannot be written.
    pub fn write_json<T: Serialize>(&mut self, name: &str, value: &T) -> Result<(), ArtifactError> {
        let (path, file) = self.create_file(name)?;
        serde_json::to_writer_pretty(file, value).map_err(|e| ArtifactError::Json {
            path: path.display().to_string(),
            source: e,
        })?;
        log::info!("Wrote {}", path.display());
        Ok(())
    }

    /// Writes `manifest.json` describing everything written so far.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError`] if the manifest cannot be written.
    pub fn write_manifest(&mut self, run_id: &str, config: &PlannerConfig) -> Result<(), ArtifactError> {
        let manifest = Manifest {
            schema_version: ARTIFACT_SCHEMA_VERSION,
            run_id: run_id.to_string(),
            created_at: Utc::now(),
            config: config.clone(),
            row_counts: self.written.clone(),
        };
        self.write_json(MANIFEST, &manifest)
    }
}

fn classify(path: &Path, e: std::io::Error) -> ArtifactError {
    if e.kind() == std::io::ErrorKind::AlreadyExists {
        ArtifactError::Exists {
            path: path.display().to_string(),
        }
    } else {
        ArtifactError::Io {
            path: path.display().to_string(),
            source: e,
        }
    }
}

/// Contents of `manifest.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    /// Artifact layout version.
    pub schema_version: u32,
    /// Run identifier.
    pub run_id: String,
    /// When the manifest was written.
    pub created_at: DateTime<Utc>,
    /// Configuration the run used.
    pub config: PlannerConfig,
    /// Data rows per CSV artifact.
    pub row_counts: BTreeMap<String, usize>,
}

/// `events_zoned.csv` row; columns follow the event export so the file can
/// be read back as input.
#[derive(Debug, Clone, Serialize)]
pub struct EventRow<'a> {
    request_id: EventId,
    member_id: Option<i64>,
    request_ts: String,
    dispatch_ts: Option<String>,
    arrival_ts: Option<String>,
    completion_ts: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    zone_id: Option<u32>,
    vin: Option<&'a str>,
    member_home_zip: Option<&'a str>,
    zip_code: Option<&'a str>,
}

impl<'a> From<&'a Event> for EventRow<'a> {
    fn from(e: &'a Event) -> Self {
        Self {
            request_id: e.id,
            member_id: e.member_id,
            request_ts: e.requested_at.to_rfc3339(),
            dispatch_ts: e.dispatched_at.map(|t| t.to_rfc3339()),
            arrival_ts: e.arrived_at.map(|t| t.to_rfc3339()),
            completion_ts: e.completed_at.map(|t| t.to_rfc3339()),
            latitude: e.coordinates.map(|c| c.latitude),
            longitude: e.coordinates.map(|c| c.longitude),
            zone_id: e.zone_id.map(ZoneId::value),
            vin: e.vehicle_id.as_deref(),
            member_home_zip: e.home_postal_code.as_deref(),
            zip_code: e.service_postal_code.as_deref(),
        }
    }
}

/// `zone_labels.csv` row.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ZoneLabelRow {
    /// Event id.
    pub event_id: EventId,
    /// Assigned zone.
    pub zone_id: u32,
}

/// `zone_summary.csv` row.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ZoneSummaryRow {
    zone_id: u32,
    centroid_lat: f64,
    centroid_lng: f64,
    event_count: u64,
}

impl From<&ZoneSummary> for ZoneSummaryRow {
    fn from(s: &ZoneSummary) -> Self {
        Self {
            zone_id: s.zone_id.value(),
            centroid_lat: s.centroid_lat,
            centroid_lng: s.centroid_lng,
            event_count: s.event_count,
        }
    }
}

/// `hourly_series.csv` row.
#[derive(Debug, Clone, Serialize)]
pub struct HourlyRow {
    hour: String,
    zone_id: u32,
    calls: f64,
}

/// Flattens series into rows ordered by zone then hour.
pub fn hourly_rows<'a>(
    series: impl IntoIterator<Item = &'a HourlySeries> + 'a,
) -> impl Iterator<Item = HourlyRow> + 'a {
    series.into_iter().flat_map(|s| {
        let zone_id = s.zone_id().value();
        s.iter().map(move |(hour, calls)| HourlyRow {
            hour: hour.to_rfc3339(),
            zone_id,
            calls,
        })
    })
}

/// `forecast.csv` row. Also the input format of the staffing-only command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRow {
    /// Forecast hour, RFC 3339.
    pub hour: DateTime<Utc>,
    /// Zone.
    pub zone_id: u32,
    /// Point estimate.
    pub point: f64,
    /// Lower bound.
    pub lower: f64,
    /// Upper bound.
    pub upper: f64,
    /// `seasonal` or `naive`.
    pub model: ForecastModel,
}

impl From<&ForecastPoint> for ForecastRow {
    fn from(p: &ForecastPoint) -> Self {
        Self {
            hour: p.hour,
            zone_id: p.zone_id.value(),
            point: p.point,
            lower: p.lower,
            upper: p.upper,
            model: p.model,
        }
    }
}

impl From<ForecastRow> for ForecastPoint {
    fn from(r: ForecastRow) -> Self {
        Self {
            zone_id: ZoneId(r.zone_id),
            hour: r.hour,
            point: r.point,
            lower: r.lower,
            upper: r.upper,
            model: r.model,
        }
    }
}

/// `staffing_plan.csv` row.
#[derive(Debug, Clone, Serialize)]
pub struct StaffingRow {
    hour: String,
    zone_id: u32,
    units: u32,
    expected_demand: f64,
    service_level: f64,
    model: ForecastModel,
    state: String,
}

impl From<&StaffingDecision> for StaffingRow {
    fn from(d: &StaffingDecision) -> Self {
        Self {
            hour: d.hour.to_rfc3339(),
            zone_id: d.zone_id.value(),
            units: d.units,
            expected_demand: d.expected_demand,
            service_level: d.service_level,
            model: d.model,
            state: d.state.as_ref().to_string(),
        }
    }
}

/// Reads a forecast CSV in the `forecast.csv` layout.
///
/// # Errors
///
/// Returns [`ArtifactError::Csv`] if the file cannot be opened or a row
/// does not parse.
pub fn read_forecast_csv(path: &Path) -> Result<Vec<ForecastPoint>, ArtifactError> {
    let csv_err = |e: csv::Error| ArtifactError::Csv {
        path: path.display().to_string(),
        source: e,
    };

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(csv_err)?;

    reader
        .deserialize::<ForecastRow>()
        .map(|row| row.map(ForecastPoint::from).map_err(csv_err))
        .collect()
}
