#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command-line entry point for the roadside planner.
//!
//! Each subcommand runs one slice of the pipeline. Without a subcommand the
//! tool falls back to interactive prompts.
//!
//! Uses `indicatif-log-bridge` (via [`roadside_cli_utils::init_logger`]) to
//! route `log` output through `indicatif::MultiProgress` so that log lines
//! and progress bars never fight for the terminal.

mod commands;
mod interactive;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use roadside_pipeline::config::PlannerConfig;

#[derive(Parser)]
#[command(
    name = "roadside",
    about = "Zone, forecast, and staff roadside assistance demand"
)]
struct Cli {
    /// TOML configuration file. Defaults to `$ROADSIDE_CONFIG`, then built-in defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every stage and write the run's artifacts
    Run {
        /// Service events CSV
        #[arg(long)]
        events: PathBuf,

        /// Keep results in memory only
        #[arg(long)]
        no_persist: bool,

        /// Root directory for run artifacts
        #[arg(long)]
        output: Option<PathBuf>,

        /// Forecast horizon in hours
        #[arg(long)]
        horizon: Option<usize>,
    },
    /// Cluster events into zones and list them
    Zones {
        /// Service events CSV
        #[arg(long)]
        events: PathBuf,

        /// Neighborhood radius in kilometers
        #[arg(long)]
        radius_km: Option<f64>,

        /// Other events required within the radius for a core event
        #[arg(long)]
        min_neighbors: Option<usize>,
    },
    /// Compare zone counts across several radii
    Sweep {
        /// Service events CSV
        #[arg(long)]
        events: PathBuf,

        /// Radii in kilometers
        #[arg(long, value_delimiter = ',', default_values_t = [0.5, 1.0, 1.5, 2.0])]
        radii: Vec<f64>,

        /// Other events required within the radius for a core event
        #[arg(long)]
        min_neighbors: Option<usize>,
    },
    /// Solve staffing for a forecast CSV from an earlier run
    Staff {
        /// `forecast.csv` artifact
        #[arg(long)]
        forecast: PathBuf,

        /// Calls one unit handles per hour
        #[arg(long)]
        capacity: Option<f64>,

        /// Target service level in (0, 1)
        #[arg(long)]
        service_level: Option<f64>,
    },
    /// Print the effective configuration as TOML
    Config,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = roadside_cli_utils::init_logger();
    let cli = Cli::parse();

    let mut config = match PlannerConfig::resolve(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => commands::fail(PlannerConfig::default(), &e),
    };

    let Some(command) = cli.command else {
        return interactive::run(&multi, config).await;
    };

    match command {
        Commands::Run {
            events,
            no_persist,
            output,
            horizon,
        } => {
            if no_persist {
                config.output.persist = false;
            }
            if let Some(output) = output {
                config.output.dir = output;
            }
            if let Some(horizon) = horizon {
                config.forecast.horizon_hours = horizon;
            }
            commands::run_pipeline(&multi, config, &events).await?;
        }
        Commands::Zones {
            events,
            radius_km,
            min_neighbors,
        } => {
            if let Some(radius_km) = radius_km {
                config.zoning.radius_km = radius_km;
            }
            if let Some(min_neighbors) = min_neighbors {
                config.zoning.min_neighbors = min_neighbors;
            }
            commands::zones(&config, &events)?;
        }
        Commands::Sweep {
            events,
            radii,
            min_neighbors,
        } => {
            if let Some(min_neighbors) = min_neighbors {
                config.zoning.min_neighbors = min_neighbors;
            }
            commands::sweep(&config, &events, &radii)?;
        }
        Commands::Staff {
            forecast,
            capacity,
            service_level,
        } => {
            if let Some(capacity) = capacity {
                config.staffing.capacity_per_unit = capacity;
            }
            if let Some(service_level) = service_level {
                config.staffing.target_service_level = service_level;
            }
            commands::staff(&config, &forecast)?;
        }
        Commands::Config => commands::show_config(&config)?,
    }

    Ok(())
}
