//! Interactive mode.
//!
//! Prompts for a task and its inputs, pre-filling every value from the
//! resolved configuration, then runs the same code as the matching
//! subcommand.

use std::path::PathBuf;

use dialoguer::{Confirm, Input, Select};
use roadside_cli_utils::MultiProgress;
use roadside_pipeline::config::PlannerConfig;

use crate::commands;

enum Task {
    RunPipeline,
    Zones,
    Sweep,
    Staff,
    ShowConfig,
}

impl Task {
    const ALL: &[Self] = &[
        Self::RunPipeline,
        Self::Zones,
        Self::Sweep,
        Self::Staff,
        Self::ShowConfig,
    ];

    const fn label(&self) -> &'static str {
        match self {
            Self::RunPipeline => "Run full pipeline (zone, forecast, staff)",
            Self::Zones => "Discover zones",
            Self::Sweep => "Compare clustering radii",
            Self::Staff => "Staff from an existing forecast",
            Self::ShowConfig => "Show configuration",
        }
    }
}

fn prompt_path(prompt: &str) -> Result<PathBuf, dialoguer::Error> {
    let path: String = Input::new().with_prompt(prompt).interact_text()?;
    Ok(PathBuf::from(path.trim()))
}

fn prompt_zoning(config: &mut PlannerConfig) -> Result<(), dialoguer::Error> {
    config.zoning.radius_km = Input::new()
        .with_prompt("Cluster radius (km)")
        .default(config.zoning.radius_km)
        .interact_text()?;
    config.zoning.min_neighbors = Input::new()
        .with_prompt("Minimum neighbors for a core point")
        .default(config.zoning.min_neighbors)
        .interact_text()?;
    Ok(())
}

fn prompt_staffing(config: &mut PlannerConfig) -> Result<(), dialoguer::Error> {
    config.staffing.capacity_per_unit = Input::new()
        .with_prompt("Calls one unit handles per hour")
        .default(config.staffing.capacity_per_unit)
        .interact_text()?;
    config.staffing.target_service_level = Input::new()
        .with_prompt("Target service level (0-1)")
        .default(config.staffing.target_service_level)
        .interact_text()?;
    Ok(())
}

/// Runs interactive mode.
///
/// # Errors
///
/// Returns an error if a prompt fails or the chosen task fails.
pub async fn run(
    multi: &MultiProgress,
    mut config: PlannerConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("Roadside Planner");
    println!();

    let labels: Vec<&str> = Task::ALL.iter().map(Task::label).collect();
    let idx = Select::new()
        .with_prompt("What would you like to do?")
        .items(&labels)
        .default(0)
        .interact()?;

    match Task::ALL[idx] {
        Task::RunPipeline => {
            let events = prompt_path("Events CSV")?;

            if Confirm::new()
                .with_prompt("Adjust parameters?")
                .default(false)
                .interact()?
            {
                prompt_zoning(&mut config)?;
                config.forecast.horizon_hours = Input::new()
                    .with_prompt("Forecast horizon (hours)")
                    .default(config.forecast.horizon_hours)
                    .interact_text()?;
                prompt_staffing(&mut config)?;
            }

            config.output.persist = Confirm::new()
                .with_prompt(format!(
                    "Write artifacts under {}?",
                    config.output.dir.display()
                ))
                .default(config.output.persist)
                .interact()?;

            commands::run_pipeline(multi, config, &events).await?;
        }
        Task::Zones => {
            let events = prompt_path("Events CSV")?;
            prompt_zoning(&mut config)?;
            commands::zones(&config, &events)?;
        }
        Task::Sweep => {
            let events = prompt_path("Events CSV")?;
            let radii: String = Input::new()
                .with_prompt("Radii to compare (km, comma-separated)")
                .default("0.5,1,1.5,2".to_string())
                .interact_text()?;
            let radii = radii
                .split(',')
                .map(|r| r.trim().parse::<f64>())
                .collect::<Result<Vec<_>, _>>()?;
            commands::sweep(&config, &events, &radii)?;
        }
        Task::Staff => {
            let forecast = prompt_path("Forecast CSV")?;
            prompt_staffing(&mut config)?;
            commands::staff(&config, &forecast)?;
        }
        Task::ShowConfig => commands::show_config(&config)?,
    }

    Ok(())
}
