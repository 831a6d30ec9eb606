use crate::config::EngineConfig;
use crate::core::aggregator::{aggregate, summarise, ResultRow, SummaryRow};
use crate::core::allocation::{allocate, AllocationFactors};
use crate::core::demand::{project_demand, HouseholdTable};
use crate::core::emissions::{emission_factors_for_year, EmissionFactorTrajectory};
use crate::core::optimiser::{CostMinimisingOptimiser, MixSource};
use crate::core::scenario::{normalise_scenario_id, ScenarioResolver};
use crate::core::solvers::LinearProgramSolver;
use crate::errors::{EngineError, ErrorKind};
use indexmap::{IndexMap, IndexSet};
use itertools::iproduct;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, instrument, warn};

/// A (district, year, scenario) combination that could not be evaluated.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FailedTriple {
    pub district: String,
    pub year: i32,
    /// The scenario identifier as it was supplied.
    pub scenario: String,
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct BatchResults {
    pub rows: Vec<ResultRow>,
    pub summaries: Vec<SummaryRow>,
    pub failures: Vec<FailedTriple>,
}

impl BatchResults {
    /// Number of failed triples per error kind, in order of first occurrence.
    pub fn failure_counts(&self) -> IndexMap<ErrorKind, usize> {
        let mut counts = IndexMap::new();
        for failure in &self.failures {
            *counts.entry(failure.kind).or_insert(0) += 1;
        }
        counts
    }

    pub fn fallback_count(&self) -> usize {
        self.summaries
            .iter()
            .filter(|summary| summary.mix_source == MixSource::Fallback)
            .count()
    }
}

/// Shared, read-only state for evaluating triples.
struct BatchContext<'a> {
    config: &'a EngineConfig,
    households: &'a HouseholdTable,
    resolver: ScenarioResolver<'a>,
    optimiser: CostMinimisingOptimiser<'a>,
    trajectory: Result<EmissionFactorTrajectory, EngineError>,
}

/// Evaluate every (district, year, scenario) combination of the household table's districts and
/// the configured years and scenarios. Repeated years, and scenario identifiers that normalise to
/// the same name, are evaluated once.
///
/// Triples are independent and run in parallel. A triple that fails is recorded in
/// [`BatchResults::failures`] and does not affect any other triple.
pub fn run_batch(
    config: &EngineConfig,
    households: &HouseholdTable,
    solver: &dyn LinearProgramSolver,
) -> BatchResults {
    let context = BatchContext {
        config,
        households,
        resolver: ScenarioResolver::new(&config.scenario_definitions),
        optimiser: CostMinimisingOptimiser::new(
            solver,
            &config.technologies,
            &config.optimisation.constraints,
        ),
        trajectory: config.grid_trajectory(),
    };

    let years: IndexSet<i32> = config.years.iter().copied().collect();
    let scenarios = distinct_scenario_ids(&config.scenarios);
    if years.len() < config.years.len() || scenarios.len() < config.scenarios.len() {
        warn!(
            years = years.len(),
            scenarios = scenarios.len(),
            "ignoring repeated years or scenario spellings"
        );
    }

    let triples: Vec<(String, i32, String)> = iproduct!(
        households.districts(),
        years.iter().copied(),
        scenarios.iter().cloned()
    )
    .collect();
    info!(
        triples = triples.len(),
        optimisation = config.optimisation.enabled,
        solver = solver.name(),
        "starting batch"
    );

    let outcomes: Vec<_> = triples
        .into_par_iter()
        .map(|(district, year, scenario)| {
            let outcome = evaluate_triple(&context, &district, year, &scenario);
            (district, year, scenario, outcome)
        })
        .collect();

    let mut rows = vec![];
    let mut failures = vec![];
    for (district, year, scenario, outcome) in outcomes {
        match outcome {
            Ok(triple_rows) => rows.extend(triple_rows),
            Err(error) => {
                warn!(%district, year, %scenario, kind = %error.kind(), "{error}");
                failures.push(FailedTriple {
                    district,
                    year,
                    scenario,
                    kind: error.kind(),
                    message: error.to_string(),
                });
            }
        }
    }

    let summaries = summarise(&rows, config.base_year, config.discount_rate);
    info!(
        rows = rows.len(),
        summaries = summaries.len(),
        failures = failures.len(),
        "batch finished"
    );

    BatchResults {
        rows,
        summaries,
        failures,
    }
}

/// Scenario identifiers with repeats removed, comparing them after normalisation. The first
/// spelling of each is kept.
fn distinct_scenario_ids(identifiers: &[String]) -> Vec<String> {
    let mut distinct: IndexMap<String, String> = IndexMap::new();
    for identifier in identifiers {
        distinct
            .entry(normalise_scenario_id(identifier))
            .or_insert_with(|| identifier.clone());
    }
    distinct.into_values().collect()
}

#[instrument(skip(context))]
fn evaluate_triple(
    context: &BatchContext,
    district: &str,
    year: i32,
    scenario: &str,
) -> Result<Vec<ResultRow>, EngineError> {
    let config = context.config;
    let scenario = context.resolver.resolve(scenario)?;
    let demand = project_demand(context.households, district, year, &config.intensities)?;

    let trajectory = context.trajectory.clone()?;
    let emission_factors = emission_factors_for_year(
        &config.technologies,
        &config.grid,
        &config.gwp,
        &trajectory,
        year,
    )?;
    let levelised_costs = config.technologies.levelised_costs(
        demand.average_household_demand_gj(&config.intensities),
        config.discount_rate,
    );
    let factors = AllocationFactors::new(
        &config.technologies,
        &emission_factors,
        &levelised_costs,
        config.land_use,
    );

    let scenario_shares = context.resolver.district_shares(
        scenario,
        year,
        demand.urban_households,
        demand.rural_households,
    )?;

    let (shares, mix_source) = if config.optimisation.enabled {
        let outcome =
            context
                .optimiser
                .choose_mix(demand.total_gj, &levelised_costs, &scenario_shares)?;
        if let Some(reason) = &outcome.fallback_reason {
            warn!("optimisation unavailable, using scenario mix: {reason}");
        }
        (outcome.shares, outcome.source)
    } else {
        (scenario_shares, MixSource::Scenario)
    };

    let records = allocate(&demand, scenario, &shares, &factors);
    aggregate(&demand, &records, mix_source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::demand::HouseholdCounts;
    use crate::core::solvers::UnavailableSolver;
    use pretty_assertions::assert_eq;
    use rstest::*;

    #[fixture]
    fn households() -> HouseholdTable {
        let mut table = HouseholdTable::new();
        for (district, year, urban, rural) in [
            ("Lagunes", 2030, 900_000, 300_000),
            ("Lagunes", 2040, 1_100_000, 280_000),
            ("Savanes", 2030, 120_000, -1),
            ("Savanes", 2040, 150_000, 400_000),
        ] {
            table
                .insert(district, year, HouseholdCounts { urban, rural })
                .unwrap();
        }
        table
    }

    #[rstest]
    fn should_keep_going_past_failed_triples(households: HouseholdTable) {
        let config = EngineConfig {
            years: vec![2030, 2040],
            scenarios: vec!["bau".to_string(), "Green Dream".to_string()],
            ..Default::default()
        };
        let results = run_batch(&config, &households, &UnavailableSolver);

        // 2 districts x 2 years with a known scenario, one of which has a negative count
        assert_eq!(results.summaries.len(), 3);
        assert_eq!(results.rows.len(), 3 * 9);
        assert_eq!(results.failures.len(), 5);
        assert_eq!(
            results.failure_counts(),
            IndexMap::from([(ErrorKind::UnknownScenario, 4), (ErrorKind::InvalidInput, 1)])
        );
        let invalid = results
            .failures
            .iter()
            .find(|failure| failure.kind == ErrorKind::InvalidInput)
            .unwrap();
        assert_eq!((invalid.district.as_str(), invalid.year), ("Savanes", 2030));
    }

    #[rstest]
    fn should_fail_years_before_trajectory_base(households: HouseholdTable) {
        let config = EngineConfig {
            base_year: 2035,
            years: vec![2030, 2040],
            scenarios: vec!["bau".to_string()],
            ..Default::default()
        };
        let results = run_batch(&config, &households, &UnavailableSolver);
        assert!(results
            .failures
            .iter()
            .all(|failure| failure.year == 2030 && failure.kind == ErrorKind::InvalidInput));
        assert_eq!(results.summaries.len(), 2);
    }

    #[rstest]
    fn should_evaluate_repeated_years_and_spellings_once(households: HouseholdTable) {
        let config = EngineConfig {
            years: vec![2040, 2040],
            scenarios: vec![
                "Biogas Incentive".to_string(),
                "biogas_incentive".to_string(),
                "Green Dream".to_string(),
                "green  dream".to_string(),
            ],
            ..Default::default()
        };
        let results = run_batch(&config, &households, &UnavailableSolver);

        assert_eq!(results.summaries.len(), 2);
        assert_eq!(results.rows.len(), 2 * 9);
        assert_eq!(
            results.failure_counts(),
            IndexMap::from([(ErrorKind::UnknownScenario, 2)])
        );
        assert!(results
            .failures
            .iter()
            .all(|failure| failure.scenario == "Green Dream"));
    }

    #[rstest]
    fn should_keep_first_spelling_of_each_scenario() {
        let identifiers = ["Clean Push", "clean_push", " bau", "BAU", "clean push "]
            .map(String::from)
            .to_vec();
        assert_eq!(distinct_scenario_ids(&identifiers), vec!["Clean Push", " bau"]);
    }

    #[rstest]
    fn should_produce_results_in_stable_order(households: HouseholdTable) {
        let config = EngineConfig::default();
        let first = run_batch(&config, &households, &UnavailableSolver);
        let second = run_batch(&config, &households, &UnavailableSolver);
        assert_eq!(first, second);
    }
}
