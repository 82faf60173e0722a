use anyhow::Context;
use clap::Parser;
use log::info;
use std::path::PathBuf;

mod config;
mod dosing;
mod error;
mod models;
mod output;
mod simulation;
mod solver;

use crate::config::Scenario;
use crate::simulation::Simulator;

#[derive(Parser)]
#[command(name = "pkpd_simulation")]
#[command(about = "Three-compartment PK/PD simulation engine with effect-site modeling")]
struct Cli {
    /// Scenario file (patient, dose events, settings) in JSON
    #[arg(short, long)]
    scenario: PathBuf,

    /// Output directory
    #[arg(short, long)]
    output: PathBuf,

    /// Override the simulated duration in minutes
    #[arg(short, long)]
    duration: Option<f64>,

    /// Only derive ke0 and the PK parameters, printed as JSON
    #[arg(long)]
    derive_only: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    } else {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Info)
            .init();
    }

    let mut scenario = Scenario::from_file(&cli.scenario)
        .with_context(|| format!("failed to load scenario from {:?}", cli.scenario))?;
    info!("loaded scenario from {:?}", cli.scenario);

    if let Some(duration) = cli.duration {
        scenario.simulation.duration_min = Some(duration);
        scenario.simulation.validate()?;
    }

    let simulator = Simulator::new(scenario.simulation.clone());

    if cli.derive_only {
        let derivation = simulator.derive_parameters(&scenario.patient)?;
        info!(
            "ke0 = {:.5} /min ({} method)",
            derivation.ke0, derivation.method
        );
        println!("{}", serde_json::to_string_pretty(&derivation)?);
        return Ok(());
    }

    let result = simulator.simulate(&scenario.patient, &scenario.dose_events)?;
    info!(
        "simulation completed: {} over {:.0} min, ke0 = {:.5} /min",
        result.method_label(),
        result.duration_min(),
        result.parameters.ke0
    );

    std::fs::create_dir_all(&cli.output)
        .with_context(|| format!("failed to create output directory {:?}", cli.output))?;
    output::save_results(&result, &scenario, &cli.output)?;
    info!("results saved to {:?}", cli.output);

    Ok(())
}
