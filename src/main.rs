//! Kresko CDP engine simulator
//!
//! Loads a deployment (parameters and assets), replays a scenario of
//! deposits, mints, price moves, rebases and liquidations against an
//! in-memory engine, and prints a JSON report of every step and event.
//!
//! Usage: `kresko [scenario.toml]`
//!
//! Environment:
//! - `KRESKO_CONFIG`: deployment file when the scenario names none
//! - `KRESKO_PROFILE`: parameter profile when the deployment has no `[parameters]`
//! - `RUST_LOG`: log filter

mod scenario;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use kresko_core::{load_deployment, load_deployment_from_env};
use scenario::{Scenario, Simulation, DEFAULT_SCENARIO_PATH};

fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Logs go to stderr so the report on stdout stays parseable
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,kresko_core=debug")),
        )
        .init();

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_SCENARIO_PATH.to_string());
    info!(path = %path, "Loading scenario");
    let scenario = Scenario::from_file(&path)?;

    let deployment = match &scenario.deployment {
        Some(path) => load_deployment(path)?,
        None => load_deployment_from_env()?,
    };

    let simulation = Simulation::new(&deployment, scenario.start_time)?;
    info!(scenario = %scenario.name, steps = scenario.steps.len(), "Running scenario");
    let report = simulation.run(&scenario)?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
