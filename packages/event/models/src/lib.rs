#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Service-event record types shared across the planning pipeline.
//!
//! An [`Event`] is one completed roadside service request as delivered by
//! the ingestion collaborator. Events are immutable once read; the only
//! derived attribute, the zone, is attached by building a new value with
//! [`Event::with_zone`] rather than mutating the record in place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Unique identifier of a service request.
pub type EventId = i64;

/// Run-scoped operational zone identifier.
///
/// `0` is reserved for "in range but not dense" (noise). Ids `>= 1` are
/// assigned in cluster discovery order and carry no meaning across runs.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ZoneId(pub u32);

impl ZoneId {
    /// The reserved noise zone.
    pub const NOISE: Self = Self(0);

    /// Returns the numeric value of this zone id.
    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }

    /// Whether this id denotes unclustered noise.
    #[must_use]
    pub const fn is_noise(self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for ZoneId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A validated WGS84 position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coordinates {
    /// Latitude in degrees, `-90..=90`.
    pub latitude: f64,
    /// Longitude in degrees, `-180..=180`.
    pub longitude: f64,
}

impl Coordinates {
    /// Creates a coordinate pair after range-checking both components.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidCoordinatesError`] if either component is non-finite
    /// or outside its valid range.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, InvalidCoordinatesError> {
        if !latitude.is_finite()
            || !longitude.is_finite()
            || !(-90.0..=90.0).contains(&latitude)
            || !(-180.0..=180.0).contains(&longitude)
        {
            return Err(InvalidCoordinatesError {
                latitude,
                longitude,
            });
        }

        Ok(Self {
            latitude,
            longitude,
        })
    }
}

/// Error returned when a latitude/longitude pair is out of range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InvalidCoordinatesError {
    /// The rejected latitude.
    pub latitude: f64,
    /// The rejected longitude.
    pub longitude: f64,
}

impl std::fmt::Display for InvalidCoordinatesError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid coordinates ({}, {}): expected latitude -90..=90 and longitude -180..=180",
            self.latitude, self.longitude
        )
    }
}

impl std::error::Error for InvalidCoordinatesError {}

/// One completed service request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Unique request id.
    pub id: EventId,
    /// Member who placed the request.
    pub member_id: Option<i64>,
    /// When the request was received. Drives hourly aggregation.
    pub requested_at: DateTime<Utc>,
    /// When a unit was dispatched.
    pub dispatched_at: Option<DateTime<Utc>>,
    /// When the unit arrived on scene.
    pub arrived_at: Option<DateTime<Utc>>,
    /// When service was completed.
    pub completed_at: Option<DateTime<Utc>>,
    /// Service location, `None` when the source had no usable position.
    pub coordinates: Option<Coordinates>,
    /// Zone assigned by the current run, `None` until zoning completes.
    pub zone_id: Option<ZoneId>,
    /// Vehicle identification number.
    pub vehicle_id: Option<String>,
    /// Member's home postal code.
    pub home_postal_code: Option<String>,
    /// Postal code where service took place.
    pub service_postal_code: Option<String>,
}

impl Event {
    /// Returns a copy of this event labeled with `zone`.
    #[must_use]
    pub fn with_zone(&self, zone: ZoneId) -> Self {
        Self {
            zone_id: Some(zone),
            ..self.clone()
        }
    }
}

/// Why an input record was left out of a stage.
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
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ExclusionReason {
    /// The row could not be parsed or lacks a required field.
    Malformed,
    /// Latitude or longitude is absent.
    MissingCoordinates,
    /// Latitude or longitude is non-finite or out of range.
    InvalidCoordinates,
    /// Another row already used this request id.
    DuplicateId,
}

/// An input record excluded from processing, with enough context to find
/// it in the source data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExcludedRecord {
    /// 1-based data row number in the source file (header excluded).
    pub row: u64,
    /// Request id, when it could be read.
    pub event_id: Option<EventId>,
    /// Exclusion category.
    pub reason: ExclusionReason,
    /// Human-readable detail.
    pub detail: String,
}
