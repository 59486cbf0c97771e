#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Reads service-event exports into validated [`Event`] records.
//!
//! The ingestion collaborator hands the planner a CSV snapshot of completed
//! requests. Rows that cannot be used are never fatal: each one becomes an
//! [`ExcludedRecord`] with its row number and the reason, and the rest of
//! the batch is read normally.
//!
//! Rows without coordinates are kept as events (they still count as
//! requests) and are excluded later by zoning. Rows whose coordinates are
//! present but unusable are excluded here.

pub mod parsing;

use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;
use std::path::Path;

use roadside_event_models::{Coordinates, Event, EventId, ExcludedRecord, ExclusionReason};
use serde::Deserialize;

use crate::parsing::{non_blank, parse_degrees, parse_timestamp};

/// Errors that prevent a file from being read at all.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// The CSV file could not be opened or its header could not be read.
    #[error("CSV error in {path}: {source}")]
    Csv {
        /// Path to the CSV file.
        path: String,
        /// Underlying CSV error.
        source: csv::Error,
    },
}

/// Result of reading one event export.
#[derive(Debug, Clone, Default)]
pub struct IngestOutcome {
    /// Usable events in file order.
    pub events: Vec<Event>,
    /// Rows that were left out, in file order.
    pub excluded: Vec<ExcludedRecord>,
}

impl IngestOutcome {
    /// Number of events that carry coordinates.
    #[must_use]
    pub fn located_count(&self) -> usize {
        self.events
            .iter()
            .filter(|e| e.coordinates.is_some())
            .count()
    }
}

/// One CSV row as exported by the event generator. Every cell is read as
/// text so that a single bad value excludes the row instead of aborting
/// the whole file.
#[derive(Debug, Default, Deserialize)]
struct RawEventRow {
    #[serde(default, alias = "id")]
    request_id: Option<String>,
    #[serde(default)]
    member_id: Option<String>,
    #[serde(default)]
    request_ts: Option<String>,
    #[serde(default)]
    dispatch_ts: Option<String>,
    #[serde(default)]
    arrival_ts: Option<String>,
    #[serde(default)]
    completion_ts: Option<String>,
    #[serde(default, alias = "lat")]
    latitude: Option<String>,
    #[serde(default, alias = "lng", alias = "lon")]
    longitude: Option<String>,
    #[serde(default)]
    vin: Option<String>,
    #[serde(default)]
    member_home_zip: Option<String>,
    #[serde(default)]
    zip_code: Option<String>,
}

/// Reads all events from a CSV file.
///
/// # Errors
///
/// Returns [`IngestError::Csv`] if the file cannot be opened. Individual bad
/// rows are reported in [`IngestOutcome::excluded`] instead.
pub fn read_events(path: &Path) -> Result<IngestOutcome, IngestError> {
    let reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| IngestError::Csv {
            path: path.display().to_string(),
            source: e,
        })?;

    let outcome = read_rows(reader);
    log::info!(
        "Read {} events from {} ({} excluded)",
        outcome.events.len(),
        path.display(),
        outcome.excluded.len()
    );
    Ok(outcome)
}

/// Reads all events from any CSV source.
#[must_use]
pub fn read_events_from_reader(reader: impl Read) -> IngestOutcome {
    let csv_reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);
    read_rows(csv_reader)
}

fn read_rows<R: Read>(mut reader: csv::Reader<R>) -> IngestOutcome {
    let mut outcome = IngestOutcome::default();
    let mut seen: BTreeSet<EventId> = BTreeSet::new();

    for (idx, result) in reader.deserialize::<RawEventRow>().enumerate() {
        let row = idx as u64 + 1;

        let raw = match result {
            Ok(r) => r,
            Err(e) => {
                log::debug!("Row {row}: malformed: {e}");
                outcome.excluded.push(ExcludedRecord {
                    row,
                    event_id: None,
                    reason: ExclusionReason::Malformed,
                    detail: e.to_string(),
                });
                continue;
            }
        };

        match validate_row(row, &raw) {
            Ok(event) => {
                if seen.insert(event.id) {
                    outcome.events.push(event);
                } else {
                    outcome.excluded.push(ExcludedRecord {
                        row,
                        event_id: Some(event.id),
                        reason: ExclusionReason::DuplicateId,
                        detail: format!("request id {} already seen", event.id),
                    });
                }
            }
            Err(excluded) => outcome.excluded.push(excluded),
        }
    }

    if !outcome.excluded.is_empty() {
        let mut by_reason: BTreeMap<ExclusionReason, usize> = BTreeMap::new();
        for record in &outcome.excluded {
            *by_reason.entry(record.reason).or_default() += 1;
        }
        let breakdown = by_reason
            .iter()
            .map(|(reason, count)| format!("{reason}: {count}"))
            .collect::<Vec<_>>()
            .join(", ");
        log::warn!(
            "Excluded {} event rows ({breakdown})",
            outcome.excluded.len()
        );
    }

    outcome
}

fn validate_row(row: u64, raw: &RawEventRow) -> Result<Event, ExcludedRecord> {
    let malformed = |event_id: Option<EventId>, detail: String| ExcludedRecord {
        row,
        event_id,
        reason: ExclusionReason::Malformed,
        detail,
    };

    let id_str = non_blank(raw.request_id.as_deref())
        .ok_or_else(|| malformed(None, "missing request_id".to_string()))?;
    let id: EventId = id_str
        .parse()
        .map_err(|_| malformed(None, format!("invalid request_id '{id_str}'")))?;

    let requested_str = non_blank(raw.request_ts.as_deref())
        .ok_or_else(|| malformed(Some(id), "missing request_ts".to_string()))?;
    let requested_at = parse_timestamp(requested_str)
        .ok_or_else(|| malformed(Some(id), format!("invalid request_ts '{requested_str}'")))?;

    let optional_ts = |value: Option<&String>| non_blank(value.map(String::as_str)).and_then(parse_timestamp);

    let lat = non_blank(raw.latitude.as_deref());
    let lng = non_blank(raw.longitude.as_deref());
    let coordinates = match (lat, lng) {
        (Some(lat), Some(lng)) => {
            let parsed = parse_degrees(lat)
                .zip(parse_degrees(lng))
                .and_then(|(la, lo)| Coordinates::new(la, lo).ok());
            let Some(coordinates) = parsed else {
                return Err(ExcludedRecord {
                    row,
                    event_id: Some(id),
                    reason: ExclusionReason::InvalidCoordinates,
                    detail: format!("unusable coordinates ({lat}, {lng})"),
                });
            };
            Some(coordinates)
        }
        (None, None) => None,
        (Some(given), None) | (None, Some(given)) => {
            return Err(ExcludedRecord {
                row,
                event_id: Some(id),
                reason: ExclusionReason::InvalidCoordinates,
                detail: format!("only one of latitude/longitude given ('{given}')"),
            });
        }
    };

    Ok(Event {
        id,
        member_id: non_blank(raw.member_id.as_deref()).and_then(|m| m.parse().ok()),
        requested_at,
        dispatched_at: optional_ts(raw.dispatch_ts.as_ref()),
        arrived_at: optional_ts(raw.arrival_ts.as_ref()),
        completed_at: optional_ts(raw.completion_ts.as_ref()),
        coordinates,
        zone_id: None,
        vehicle_id: non_blank(raw.vin.as_deref()).map(str::to_string),
        home_postal_code: non_blank(raw.member_home_zip.as_deref()).map(str::to_string),
        service_postal_code: non_blank(raw.zip_code.as_deref()).map(str::to_string),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "request_id,member_id,request_ts,dispatch_ts,arrival_ts,completion_ts,\
                          latitude,longitude,zip_code,vin,member_home_zip,zone_id\n";

    fn read(body: &str) -> IngestOutcome {
        read_events_from_reader(format!("{HEADER}{body}").as_bytes())
    }

    #[test]
    fn reads_complete_row() {
        let outcome = read(
            "1,4242,2024-01-01 08:15:00,2024-01-01 08:20:00,2024-01-01 08:50:00,\
             2024-01-01 09:30:00,41.700125,-71.155,02720,1HGCM82633A004352,02721,\n",
        );

        assert!(outcome.excluded.is_empty());
        assert_eq!(outcome.events.len(), 1);

        let event = &outcome.events[0];
        assert_eq!(event.id, 1);
        assert_eq!(event.member_id, Some(4242));
        assert_eq!(event.requested_at.to_string(), "2024-01-01 08:15:00 UTC");
        assert!(event.completed_at.is_some());
        assert_eq!(event.service_postal_code.as_deref(), Some("02720"));
        assert_eq!(event.home_postal_code.as_deref(), Some("02721"));
        assert_eq!(event.zone_id, None);
        let coords = event.coordinates.unwrap();
        assert!((coords.latitude - 41.700_125).abs() < 1e-9);
    }

    #[test]
    fn ignores_incoming_zone_id() {
        let outcome = read("1,,2024-01-01 08:15:00,,,,41.7,-71.1,,,,5\n");
        assert_eq!(outcome.events[0].zone_id, None);
    }

    #[test]
    fn keeps_events_without_coordinates() {
        let outcome = read("1,,2024-01-01 08:15:00,,,,,,,,,\n");
        assert!(outcome.excluded.is_empty());
        assert_eq!(outcome.events.len(), 1);
        assert!(outcome.events[0].coordinates.is_none());
        assert_eq!(outcome.located_count(), 0);
    }

    #[test]
    fn excludes_out_of_range_coordinates() {
        let outcome = read(
            "1,,2024-01-01 08:15:00,,,,95.0,-71.1,,,,\n\
             2,,2024-01-01 08:15:00,,,,41.7,-71.1,,,,\n",
        );
        assert_eq!(outcome.events.len(), 1);
        assert_eq!(outcome.excluded.len(), 1);
        assert_eq!(outcome.excluded[0].row, 1);
        assert_eq!(outcome.excluded[0].event_id, Some(1));
        assert_eq!(
            outcome.excluded[0].reason,
            ExclusionReason::InvalidCoordinates
        );
    }

    #[test]
    fn excludes_half_present_coordinates() {
        let outcome = read(
            "1,,2024-01-01 08:15:00,,,,41.7,,,,,\n\
             2,,2024-01-01 08:15:00,,,,,-71.1,,,,\n\
             3,,2024-01-01 08:15:00,,,,,,,,,\n",
        );
        assert_eq!(outcome.events.len(), 1);
        assert_eq!(outcome.events[0].id, 3);
        assert!(outcome.events[0].coordinates.is_none());

        let rows: Vec<(u64, ExclusionReason)> =
            outcome.excluded.iter().map(|e| (e.row, e.reason)).collect();
        assert_eq!(
            rows,
            vec![
                (1, ExclusionReason::InvalidCoordinates),
                (2, ExclusionReason::InvalidCoordinates),
            ]
        );
    }

    #[test]
    fn excludes_malformed_rows_and_continues() {
        let outcome = read(
            "abc,,2024-01-01 08:15:00,,,,41.7,-71.1,,,,\n\
             2,,not-a-date,,,,41.7,-71.1,,,,\n\
             3,,,,,,41.7,-71.1,,,,\n\
             4,,2024-01-01 09:00:00,,,,41.7,-71.1,,,,\n",
        );
        assert_eq!(outcome.events.len(), 1);
        assert_eq!(outcome.events[0].id, 4);
        assert_eq!(outcome.excluded.len(), 3);
        assert!(
            outcome
                .excluded
                .iter()
                .all(|e| e.reason == ExclusionReason::Malformed)
        );
        assert_eq!(outcome.excluded[1].event_id, Some(2));
    }

    #[test]
    fn excludes_duplicate_ids_keeping_first() {
        let outcome = read(
            "9,,2024-01-01 08:15:00,,,,41.7,-71.1,,,,\n\
             9,,2024-01-02 08:15:00,,,,41.8,-71.2,,,,\n",
        );
        assert_eq!(outcome.events.len(), 1);
        assert_eq!(outcome.events[0].requested_at.to_string(), "2024-01-01 08:15:00 UTC");
        assert_eq!(outcome.excluded[0].reason, ExclusionReason::DuplicateId);
        assert_eq!(outcome.excluded[0].row, 2);
    }

    #[test]
    fn missing_file_is_an_error() {
        let path = std::env::temp_dir().join("roadside_ingest_test_missing/events.csv");
        assert!(read_events(&path).is_err());
    }

    #[test]
    fn reads_file_from_disk() {
        let dir = std::env::temp_dir().join("roadside_ingest_test_disk");
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("events.csv");
        std::fs::write(
            &path,
            format!("{HEADER}1,,2024-01-01 08:15:00,,,,41.7,-71.1,,,,\n"),
        )
        .unwrap();

        let outcome = read_events(&path).unwrap();
        assert_eq!(outcome.events.len(), 1);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
