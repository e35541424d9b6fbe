use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use lvpv::{
    hosting_capacity, penetration_steps, DriverOptions, HostingLimits, RadialSolver,
    ScenarioDriver, StudyConfig,
};
use std::fs::File;
use std::path::{Path, PathBuf};

/// Time-series PV hosting studies on LV distribution circuits.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Simulate the configured scenario day by day
    Run(RunArgs),

    /// Sweep PV penetration and report the hosting capacity
    Hosting(HostingArgs),
}

#[derive(Args)]
struct StudyArgs {
    /// Study configuration (YAML or JSON)
    #[arg(required = true)]
    config: PathBuf,

    /// Report file (JSON)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// PV penetration (percent of customers).
    #[arg(long)]
    penetration: Option<f64>,

    /// First dataset day to simulate.
    #[arg(long)]
    start_day: Option<usize>,

    /// Seed of the profile allocation stream.
    #[arg(long)]
    profile_seed: Option<u64>,

    /// Seed of the PV shuffle stream.
    #[arg(long)]
    pv_seed: Option<u64>,

    /// Termination tolerance on the per unit voltage update.
    #[arg(long)]
    tol: Option<f64>,

    /// Maximum number of sweep iterations.
    #[arg(long)]
    max_it: Option<usize>,
}

#[derive(Args)]
struct RunArgs {
    #[command(flatten)]
    study: StudyArgs,

    /// Number of days to simulate.
    #[arg(long)]
    days: Option<usize>,
}

#[derive(Args)]
struct HostingArgs {
    #[command(flatten)]
    study: StudyArgs,

    /// Penetration increment (percent).
    #[arg(long, default_value_t = 10.0)]
    step: f64,
}

fn main() {
    env_logger::Builder::from_default_env()
        .format_level(false)
        .format_target(false)
        .format_timestamp(None)
        .init();

    let cli = Cli::parse();

    match execute(&cli) {
        Ok(_) => {
            std::process::exit(0);
        }
        Err(err) => {
            eprintln!("error: {:#}", err);
            std::process::exit(2);
        }
    }
}

fn load_config(args: &StudyArgs) -> Result<StudyConfig> {
    let mut config = StudyConfig::from_path(&args.config)?;
    if let Some(penetration) = args.penetration {
        config.scenario.penetration = penetration;
    }
    if let Some(start_day) = args.start_day {
        config.scenario.start_day = start_day;
    }
    if let Some(seed) = args.profile_seed {
        config.scenario.seeds.profile = seed;
    }
    if let Some(seed) = args.pv_seed {
        config.scenario.seeds.pv_shuffle = seed;
    }
    if let Some(tol) = args.tol {
        config.solve.tolerance = tol;
    }
    if let Some(max_it) = args.max_it {
        config.solve.max_it = max_it;
    }
    config.validate()?;
    Ok(config)
}

fn write_report<T: serde::Serialize>(path: &Path, report: &T) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating '{}'", path.display()))?;
    serde_json::to_writer_pretty(file, report)
        .with_context(|| format!("writing report '{}'", path.display()))
}

fn execute(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::Run(args) => {
            let mut config = load_config(&args.study)?;
            if let Some(days) = args.days {
                config.scenario.days = days;
            }
            let store = config.load_profile_store()?;

            let solver = RadialSolver::new(config.solve);
            let mut driver = ScenarioDriver::new(
                solver,
                &store,
                DriverOptions::from(&config),
                config.scenario.clone(),
            );
            let outcomes = driver.run()?;

            for outcome in &outcomes {
                let series = &outcome.series;
                println!(
                    "day {:4}  {:14}  PV {:3}  non-compliant {:3}  under-voltage {:3}  V {:.4}..{:.4}",
                    outcome.day,
                    format!("{:?}", outcome.state),
                    outcome.pv_assignments.len(),
                    series.non_compliant_count(config.voltage_limit_pu),
                    series.under_voltage_count(config.lower_voltage_limit_pu),
                    series.min_voltage().unwrap_or(f64::NAN),
                    series.max_voltage().unwrap_or(f64::NAN),
                );
                if let (Some(flow), Some(kva)) = (&outcome.transformer, config.transformer_kva) {
                    let overloaded = flow.overloaded_intervals(kva);
                    if !overloaded.is_empty() {
                        log::warn!(
                            "day {}: {} overloaded in intervals {:?}",
                            outcome.day,
                            flow.element,
                            overloaded
                        );
                    }
                }
            }

            if let Some(out_path) = &args.study.output {
                write_report(out_path, &outcomes)?;
            }
        }
        Commands::Hosting(args) => {
            let config = load_config(&args.study)?;
            let store = config.load_profile_store()?;
            config.scenario.validate(&store)?;

            let solver = RadialSolver::new(config.solve);
            let mut driver = ScenarioDriver::new(
                solver,
                &store,
                DriverOptions::from(&config),
                config.scenario.clone(),
            );
            let limits = HostingLimits {
                voltage_pu: config.voltage_limit_pu,
                transformer_kva: config.transformer_kva,
            };
            let report = hosting_capacity(
                &mut driver,
                &penetration_steps(args.step)?,
                config.scenario.start_day,
                limits,
            )?;

            match report.capacity {
                Some(pct) => println!("hosting capacity: {:.1}% of customers", pct),
                None => println!("hosting capacity: limits exceeded without PV"),
            }

            if let Some(out_path) = &args.study.output {
                write_report(out_path, &report)?;
            }
        }
    }
    Ok(())
}
