//! Command implementations shared by the subcommands and interactive mode.

use std::collections::BTreeMap;
use std::path::Path;

use roadside_cli_utils::{MultiProgress, StageProgress};
use roadside_event_models::{Coordinates, ZoneId};
use roadside_pipeline::Pipeline;
use roadside_pipeline::config::PlannerConfig;
use roadside_pipeline::report::RunReport;
use roadside_staffing::{StaffingPlan, StaffingProblem};
use roadside_zoning::sweep::{SweepResult, sweep_radii};
use roadside_zoning::{ZoneAssignment, ZoneSummary, ZoningParams, assign_zones};

/// Prints a report for an aborted run and exits non-zero.
pub fn fail(config: PlannerConfig, error: &dyn std::error::Error) -> ! {
    log::error!("{error}");
    let report = RunReport::fatal(config, error);
    eprintln!("{}", report.summary());
    match report.to_json() {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("Failed to render report: {e}"),
    }
    std::process::exit(2)
}

/// Runs every stage over `events`.
///
/// # Errors
///
/// Returns an error if a stage fails.
pub async fn run_pipeline(
    multi: &MultiProgress,
    config: PlannerConfig,
    events: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let pipeline = match Pipeline::new(config.clone()) {
        Ok(p) => p.with_progress(StageProgress::new(multi)),
        Err(e) => fail(config, &e),
    };

    let outcome = pipeline.run(events).await?;

    println!();
    println!("{}", outcome.report.summary());
    for fallback in &outcome.report.fallbacks {
        println!("  zone {}: naive ({})", fallback.zone_id, fallback.reason);
    }
    for skipped in &outcome.report.skipped_zones {
        println!("  zone {}: skipped ({})", skipped.zone_id, skipped.reason);
    }

    Ok(())
}

fn zoning_params(config: &PlannerConfig) -> ZoningParams {
    match ZoningParams::new(config.zoning.radius_km, config.zoning.min_neighbors) {
        Ok(params) => params,
        Err(e) => fail(config.clone(), &e),
    }
}

/// Clusters `events` and prints each zone's centroid and size.
///
/// # Errors
///
/// Returns an error if the events file cannot be read.
pub fn zones(config: &PlannerConfig, events: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let params = zoning_params(config);
    let ingest = roadside_ingest::read_events(events)?;
    let assignment = assign_zones(&ingest.events, &params);

    println!(
        "{} zones, {} noise events, {} unlocated, {} rows excluded (radius {} km, min neighbors {})",
        assignment.zone_count,
        assignment.noise_count,
        assignment.unlocated.len(),
        ingest.excluded.len(),
        params.radius_km(),
        params.min_neighbors(),
    );
    println!();
    println!("{:>6}  {:>11}  {:>12}  {:>8}", "zone", "lat", "lng", "events");

    for s in &ranked_zones(&assignment) {
        println!(
            "{:>6}  {:>11.5}  {:>12.5}  {:>8}",
            s.zone_id.to_string(),
            s.centroid_lat,
            s.centroid_lng,
            s.event_count
        );
    }

    Ok(())
}

/// Zone summaries, busiest first.
fn ranked_zones(assignment: &ZoneAssignment) -> Vec<ZoneSummary> {
    let mut ranked = assignment.summaries.clone();
    ranked.sort_by(|a, b| {
        b.event_count
            .cmp(&a.event_count)
            .then(a.zone_id.cmp(&b.zone_id))
    });
    ranked
}

fn largest_zone(result: &SweepResult) -> u64 {
    result.zone_sizes.iter().map(|&(_, n)| n).max().unwrap_or(0)
}

/// Clusters `events` once per radius and prints a comparison table.
///
/// # Errors
///
/// Returns an error if the events file cannot be read.
pub fn sweep(
    config: &PlannerConfig,
    events: &Path,
    radii_km: &[f64],
) -> Result<(), Box<dyn std::error::Error>> {
    let ingest = roadside_ingest::read_events(events)?;
    let coordinates: Vec<Coordinates> = ingest.events.iter().filter_map(|e| e.coordinates).collect();

    let results = match sweep_radii(&coordinates, radii_km, config.zoning.min_neighbors) {
        Ok(r) => r,
        Err(e) => fail(config.clone(), &e),
    };

    println!(
        "{} located events, min neighbors {}",
        coordinates.len(),
        config.zoning.min_neighbors
    );
    println!();
    println!("{:>9}  {:>6}  {:>7}  {:>8}", "radius_km", "zones", "noise", "largest");
    for r in &results {
        println!(
            "{:>9.2}  {:>6}  {:>7}  {:>8}",
            r.radius_km,
            r.zone_count,
            r.noise_count,
            largest_zone(r)
        );
    }

    Ok(())
}

/// Solves staffing for a materialized forecast CSV and prints per-zone
/// totals.
///
/// # Errors
///
/// Returns an error if the forecast file cannot be read.
pub fn staff(config: &PlannerConfig, forecast: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let problem = match StaffingProblem::new(
        config.staffing.capacity_per_unit,
        config.staffing.target_service_level,
        config.staffing.max_units_per_zone_hour,
    ) {
        Ok(p) => p,
        Err(e) => fail(config.clone(), &e),
    };

    let plan = plan_from_forecast(&problem, forecast)?;

    println!(
        "{} zone-hours, {} units (capacity {}, service level {})",
        plan.decisions.len(),
        plan.total_units,
        problem.capacity_per_unit(),
        problem.service_level()
    );
    if !plan.rejected.is_empty() {
        println!("{} forecast rows rejected", plan.rejected.len());
    }
    if plan.infeasible_count() > 0 {
        println!("{} zone-hours exceed the unit cap", plan.infeasible_count());
    }
    println!();
    println!("{:>6}  {:>6}  {:>11}  {:>5}", "zone", "hours", "unit-hours", "peak");
    for (zone, totals) in zone_totals(&plan) {
        println!(
            "{:>6}  {:>6}  {:>11}  {:>5}",
            zone.to_string(),
            totals.hours,
            totals.unit_hours,
            totals.peak_units
        );
    }

    Ok(())
}

/// Per-zone roll-up of a staffing plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct ZoneTotals {
    hours: usize,
    unit_hours: u64,
    peak_units: u32,
}

fn plan_from_forecast(
    problem: &StaffingProblem,
    forecast: &Path,
) -> Result<StaffingPlan, roadside_pipeline::artifacts::ArtifactError> {
    let points = roadside_pipeline::artifacts::read_forecast_csv(forecast)?;
    Ok(problem.solve(&points))
}

fn zone_totals(plan: &StaffingPlan) -> BTreeMap<ZoneId, ZoneTotals> {
    let mut per_zone: BTreeMap<ZoneId, ZoneTotals> = BTreeMap::new();
    for d in &plan.decisions {
        let totals = per_zone.entry(d.zone_id).or_default();
        totals.hours += 1;
        totals.unit_hours += u64::from(d.units);
        totals.peak_units = totals.peak_units.max(d.units);
    }
    per_zone
}

/// Validates and prints the effective configuration as TOML.
///
/// # Errors
///
/// Returns an error if the configuration cannot be rendered.
pub fn show_config(config: &PlannerConfig) -> Result<(), Box<dyn std::error::Error>> {
    if let Err(e) = config.validate() {
        fail(config.clone(), &e);
    }
    print!("{}", config.to_toml_string()?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use roadside_staffing::RejectionReason;

    use super::*;

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("roadside_cli_test_{name}"));
        std::fs::remove_dir_all(&dir).ok();
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    const FORECAST_CSV: &str = "hour,zone_id,point,lower,upper,model\n\
        2024-01-01T00:00:00Z,1,40.0,32.0,48.0,naive\n\
        2024-01-01T01:00:00Z,1,60.0,48.0,72.0,naive\n\
        2024-01-01T00:00:00Z,2,10.0,8.0,12.0,seasonal\n\
        2024-01-01T00:00:00Z,2,11.0,8.0,12.0,seasonal\n";

    #[test]
    fn staff_rolls_up_forecast_file_by_zone() {
        let dir = scratch("staff");
        let path = dir.join("forecast.csv");
        std::fs::write(&path, FORECAST_CSV).unwrap();

        let problem = StaffingProblem::new(25.0, 0.9, None).unwrap();
        let plan = plan_from_forecast(&problem, &path).unwrap();

        assert_eq!(plan.decisions.len(), 3);
        assert_eq!(plan.rejected.len(), 1);
        assert_eq!(plan.rejected[0].reason, RejectionReason::DuplicateZoneHour);

        let totals = zone_totals(&plan);
        assert_eq!(
            totals[&ZoneId(1)],
            ZoneTotals {
                hours: 2,
                unit_hours: 2 + 3,
                peak_units: 3,
            }
        );
        assert_eq!(
            totals[&ZoneId(2)],
            ZoneTotals {
                hours: 1,
                unit_hours: 1,
                peak_units: 1,
            }
        );

        let mut config = PlannerConfig::default();
        config.staffing.capacity_per_unit = 25.0;
        assert!(staff(&config, &path).is_ok());
        assert!(staff(&config, &dir.join("missing.csv")).is_err());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn zones_and_sweep_read_events_file() {
        let dir = scratch("zones");
        let path = dir.join("events.csv");
        let mut csv = String::from("request_id,request_ts,latitude,longitude\n");
        for id in 0..6 {
            csv.push_str(&format!("{id},2024-01-01 08:00:00,41.70{id},-71.15\n"));
        }
        for id in 10..14 {
            csv.push_str(&format!("{id},2024-01-01 09:00:00,42.36{},-71.06\n", id - 10));
        }
        csv.push_str("20,2024-01-01 10:00:00,40.0,-75.0\n");
        std::fs::write(&path, csv).unwrap();

        let mut config = PlannerConfig::default();
        config.zoning.radius_km = 1.0;
        config.zoning.min_neighbors = 3;

        let ingest = roadside_ingest::read_events(&path).unwrap();
        let assignment = assign_zones(&ingest.events, &zoning_params(&config));
        let ranked = ranked_zones(&assignment);
        let counts: Vec<u64> = ranked.iter().map(|z| z.event_count).collect();
        assert_eq!(counts, vec![6, 4]);
        assert_eq!(assignment.noise_count, 1);

        let coordinates: Vec<Coordinates> =
            ingest.events.iter().filter_map(|e| e.coordinates).collect();
        let results = sweep_radii(&coordinates, &[0.01, 1.0], 3).unwrap();
        assert_eq!(largest_zone(&results[0]), 0);
        assert_eq!(largest_zone(&results[1]), 6);

        assert!(zones(&config, &path).is_ok());
        assert!(sweep(&config, &path, &[0.5, 1.0]).is_ok());

        std::fs::remove_dir_all(&dir).ok();
    }
}
