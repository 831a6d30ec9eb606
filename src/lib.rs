mod compare_floats;
pub mod config;
pub mod core;
pub mod engine;
pub mod errors;
pub mod households;
pub mod output;

#[macro_use]
extern crate is_close;

pub use crate::config::EngineConfig;
pub use crate::engine::{run_batch, BatchResults, FailedTriple};
pub use crate::errors::{EngineError, ErrorKind};
use crate::households::read_households_csv;
use crate::output::{write_csv_rows, Output, DETAILS_KEY, FAILURES_KEY, SUMMARY_KEY};
use std::io::Read;

/// Run a full projection: read household projections, evaluate every (district, year, scenario)
/// in the config and write detail, summary and (if any) failure tables to the output.
///
/// Failures of individual triples are reported in the returned results; only unreadable input
/// or unwritable output make the whole run fail.
pub fn run_project(
    households: impl Read,
    config: &EngineConfig,
    output: impl Output,
) -> anyhow::Result<BatchResults> {
    let households = read_households_csv(households)?;
    let solver = config.optimisation.solver();

    let results = run_batch(config, &households, &solver);

    write_csv_rows(&output, DETAILS_KEY, &results.rows)?;
    write_csv_rows(&output, SUMMARY_KEY, &results.summaries)?;
    if !results.failures.is_empty() {
        write_csv_rows(&output, FAILURES_KEY, &results.failures)?;
    }

    Ok(results)
}
