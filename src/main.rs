extern crate clean_cooking_model;

use anyhow::Context;
use clap::Parser;
use clean_cooking_model::core::solvers::SolverBackend;
use clean_cooking_model::output::FileOutput;
use clean_cooking_model::{run_project, EngineConfig};
use std::ffi::OsStr;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Default, Debug)]
#[clap(author, version, about, long_about = None)]
struct CookingArgs {
    /// CSV of household projections (District, Year, Urban_Households, Rural_Households)
    households_file: String,
    /// JSON config; any key left out takes its default value
    #[arg(long, short)]
    config: Option<String>,
    /// Use least-cost technology mixes where they are cheaper than the scenario mix
    #[arg(long, default_value_t = false)]
    optimise: bool,
    /// Linear program backend (microlp or clarabel)
    #[arg(long)]
    solver: Option<SolverBackend>,
    /// Directory for result files; defaults to the directory of the households file
    #[arg(long, short)]
    output_dir: Option<PathBuf>,
    /// Log span timings when each triple finishes
    #[arg(long, default_value_t = false)]
    log_spans: bool,
    #[arg(long, short, default_value_t = false)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = CookingArgs::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(if args.verbose {
            Level::DEBUG
        } else {
            Level::INFO
        })
        .with_span_events(if args.log_spans {
            FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        })
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = match &args.config {
        Some(path) => EngineConfig::from_json(
            File::open(path).with_context(|| format!("Could not open config file {path}"))?,
        )
        .with_context(|| format!("Could not load config file {path}"))?,
        None => EngineConfig::default(),
    };
    if args.optimise {
        config.optimisation.enabled = true;
    }
    if let Some(backend) = args.solver {
        config.optimisation.backend = backend;
    }

    let households_path = Path::new(&args.households_file);
    let file_stem = households_path
        .file_stem()
        .and_then(OsStr::to_str)
        .unwrap_or("households");
    let output_dir = match args.output_dir {
        Some(dir) => dir,
        None => households_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default(),
    };
    fs::create_dir_all(&output_dir)?;
    let output = FileOutput::new(output_dir, format!("{file_stem}_{{}}.csv"));

    let households = File::open(households_path)
        .with_context(|| format!("Could not open households file {}", args.households_file))?;
    let results = run_project(households, &config, &output)?;

    info!(
        rows = results.rows.len(),
        fallbacks = results.fallback_count(),
        "results written"
    );
    if !results.failures.is_empty() {
        println!("{} triple(s) failed:", results.failures.len());
        for (kind, count) in results.failure_counts() {
            println!("  {kind}: {count}");
        }
        for failure in &results.failures {
            println!(
                "  {} / {} / {}: {}",
                failure.district, failure.year, failure.scenario, failure.message
            );
        }
    }

    Ok(())
}
