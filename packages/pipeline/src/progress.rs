//! Stage progress reporting.
//!
//! The pipeline reports what it is doing through [`ProgressCallback`] so
//! that rendering (progress bars, plain logs, nothing) stays the caller's
//! choice.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter};

/// Pipeline stages in execution order.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    AsRefStr,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Stage {
    /// Reading and validating the event export.
    Ingest,
    /// Clustering event locations into zones.
    Zoning,
    /// Counting zoned events per hour.
    Aggregation,
    /// Fitting per-zone demand models.
    Forecast,
    /// Sizing units per zone-hour.
    Staffing,
    /// Writing the run's artifacts.
    Persist,
}

/// Receives stage progress from a running pipeline.
///
/// Implementations must be `Send + Sync`; forecast progress is reported
/// while zone tasks complete on the blocking pool.
pub trait ProgressCallback: Send + Sync {
    /// A stage began. `total` is the number of work items, when known.
    fn stage_started(&self, stage: Stage, total: Option<u64>);

    /// `delta` more work items of the current stage are done.
    fn advance(&self, delta: u64);

    /// The current stage completed with a one-line summary.
    fn stage_finished(&self, stage: Stage, summary: String);
}

/// Discards all progress.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn stage_started(&self, _stage: Stage, _total: Option<u64>) {}
    fn advance(&self, _delta: u64) {}
    fn stage_finished(&self, _stage: Stage, _summary: String) {}
}

/// Shared [`NullProgress`].
#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}
