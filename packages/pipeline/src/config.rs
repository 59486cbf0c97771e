//! Planner configuration.
//!
//! Loaded from TOML with every option defaulted, then validated in one pass
//! so that an out-of-range value fails before any stage runs.
//!
//! ```toml
//! [zoning]
//! radius_km = 2.0
//! min_neighbors = 3
//!
//! [forecast]
//! horizon_hours = 48
//! seasonal_min_history_hours = 336
//! confidence_level = 0.8
//! # lookback_hours = 2160
//! include_noise_zone = true
//!
//! [staffing]
//! capacity_per_unit = 2.0
//! target_service_level = 0.9
//! # max_units_per_zone_hour = 10
//!
//! [output]
//! persist = true
//! dir = "data/runs"
//! ```

use std::path::{Path, PathBuf};

use roadside_forecast::{
    DEFAULT_CONFIDENCE_LEVEL, DEFAULT_HORIZON_HOURS, DEFAULT_SEASONAL_MIN_HISTORY, ForecastError,
    ForecastSettings,
};
use roadside_staffing::{
    DEFAULT_CAPACITY_PER_UNIT, DEFAULT_SERVICE_LEVEL, StaffingError, StaffingProblem,
};
use roadside_zoning::{ZoningError, ZoningParams};
use serde::{Deserialize, Serialize};

/// Environment variable naming a config file when `--config` is absent.
pub const CONFIG_ENV_VAR: &str = "ROADSIDE_CONFIG";

/// Longest accepted lookback window (10 years).
pub const MAX_LOOKBACK_HOURS: usize = 87_600;

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config {path}: {source}")]
    Read {
        /// Config file path.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The config file is not valid TOML for [`PlannerConfig`].
    #[error("failed to parse config {path}: {source}")]
    Parse {
        /// Config file path.
        path: String,
        /// Underlying parse error.
        source: toml::de::Error,
    },

    /// `zoning.*` out of range.
    #[error("zoning: {0}")]
    Zoning(#[from] ZoningError),

    /// `forecast.*` out of range.
    #[error("forecast: {0}")]
    Forecast(#[from] ForecastError),

    /// `staffing.*` out of range.
    #[error("staffing: {0}")]
    Staffing(#[from] StaffingError),

    /// `forecast.lookback_hours` out of range.
    #[error("forecast: invalid lookback {hours} hours: expected 1..=87600")]
    InvalidLookback {
        /// The rejected lookback.
        hours: usize,
    },

    /// `output.dir` is empty.
    #[error("output: dir must not be empty")]
    EmptyOutputDir,
}

/// `[zoning]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoningConfig {
    /// Neighborhood radius in kilometers.
    pub radius_km: f64,
    /// Other points needed within the radius for a core point.
    pub min_neighbors: usize,
}

impl Default for ZoningConfig {
    fn default() -> Self {
        Self {
            radius_km: 2.0,
            min_neighbors: 3,
        }
    }
}

/// `[forecast]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    /// Hours to forecast.
    pub horizon_hours: usize,
    /// History needed for the seasonal model.
    pub seasonal_min_history_hours: usize,
    /// Two-sided interval coverage.
    pub confidence_level: f64,
    /// Only use this many trailing hours of history.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lookback_hours: Option<usize>,
    /// Whether noise events (zone 0) get their own forecast.
    pub include_noise_zone: bool,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            horizon_hours: DEFAULT_HORIZON_HOURS,
            seasonal_min_history_hours: DEFAULT_SEASONAL_MIN_HISTORY,
            confidence_level: DEFAULT_CONFIDENCE_LEVEL,
            lookback_hours: None,
            include_noise_zone: true,
        }
    }
}

/// `[staffing]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StaffingConfig {
    /// Calls one unit covers per hour.
    pub capacity_per_unit: f64,
    /// Fraction of forecast demand to cover.
    pub target_service_level: f64,
    /// Upper bound on units for any one zone-hour.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_units_per_zone_hour: Option<u32>,
}

impl Default for StaffingConfig {
    fn default() -> Self {
        Self {
            capacity_per_unit: DEFAULT_CAPACITY_PER_UNIT,
            target_service_level: DEFAULT_SERVICE_LEVEL,
            max_units_per_zone_hour: None,
        }
    }
}

/// `[output]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Whether to write run artifacts at all.
    pub persist: bool,
    /// Root directory for run directories.
    pub dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            persist: true,
            dir: PathBuf::from("data/runs"),
        }
    }
}

/// Full planner configuration as written in TOML.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Clustering options.
    pub zoning: ZoningConfig,
    /// Forecasting options.
    pub forecast: ForecastConfig,
    /// Staffing options.
    pub staffing: StaffingConfig,
    /// Artifact options.
    pub output: OutputConfig,
}

/// Configuration with every range checked, in the shape each stage takes.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedConfig {
    /// Clustering parameters.
    pub zoning: ZoningParams,
    /// Forecasting parameters.
    pub forecast: ForecastSettings,
    /// Trailing history window, if limited.
    pub lookback_hours: Option<usize>,
    /// Whether zone 0 is forecast.
    pub include_noise_zone: bool,
    /// Staffing problem.
    pub staffing: StaffingProblem,
    /// Whether artifacts are written.
    pub persist: bool,
    /// Artifact root.
    pub output_dir: PathBuf,
}

impl PlannerConfig {
    /// Parses a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML or mistyped values.
    pub fn from_toml_str(source: &str, origin: &str) -> Result<Self, ConfigError> {
        toml::from_str(source).map_err(|e| ConfigError::Parse {
            path: origin.to_string(),
            source: e,
        })
    }

    /// Reads and parses a TOML config file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] or [`ConfigError::Parse`].
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_toml_str(&source, &path.display().to_string())
    }

    /// Loads `explicit` if given, else the file named by
    /// [`CONFIG_ENV_VAR`], else the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the chosen file cannot be loaded.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            log::debug!("Loading config from {}", path.display());
            return Self::load(path);
        }
        match std::env::var_os(CONFIG_ENV_VAR) {
            Some(path) if !path.is_empty() => {
                let path = PathBuf::from(path);
                log::debug!("Loading config from ${CONFIG_ENV_VAR}: {}", path.display());
                Self::load(&path)
            }
            _ => Ok(Self::default()),
        }
    }

    /// Renders the configuration as TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if a value cannot be represented in TOML.
    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Checks every option against its range.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found, checking zoning, then
    /// forecasting, then staffing, then output.
    pub fn validate(&self) -> Result<ValidatedConfig, ConfigError> {
        let zoning = ZoningParams::new(self.zoning.radius_km, self.zoning.min_neighbors)?;

        let forecast = ForecastSettings::new(
            self.forecast.horizon_hours,
            self.forecast.seasonal_min_history_hours,
            self.forecast.confidence_level,
        )?;
        if let Some(hours) = self
            .forecast
            .lookback_hours
            .filter(|&h| h == 0 || h > MAX_LOOKBACK_HOURS)
        {
            return Err(ConfigError::InvalidLookback { hours });
        }

        let staffing = StaffingProblem::new(
            self.staffing.capacity_per_unit,
            self.staffing.target_service_level,
            self.staffing.max_units_per_zone_hour,
        )?;

        if self.output.dir.as_os_str().is_empty() {
            return Err(ConfigError::EmptyOutputDir);
        }

        Ok(ValidatedConfig {
            zoning,
            forecast,
            lookback_hours: self.forecast.lookback_hours,
            include_noise_zone: self.forecast.include_noise_zone,
            staffing,
            persist: self.output.persist,
            output_dir: self.output.dir.clone(),
        })
    }
}
