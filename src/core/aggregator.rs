//! Flattening of allocation records into reporting rows, with the energy balance checked on the
//! way, and per-triple summaries of those rows.

use crate::compare_floats::{energy_matches, sums_to_one};
use crate::core::allocation::AllocationRecord;
use crate::core::demand::DemandRecord;
use crate::core::optimiser::MixSource;
use crate::core::scenario::Scenario;
use crate::core::technology::Technology;
use crate::core::units::discount_factor;
use crate::errors::EngineError;
use indexmap::IndexMap;
use itertools::Itertools;
use serde::Serialize;

/// One output row per (district, year, scenario, technology).
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ResultRow {
    pub district: String,
    pub year: i32,
    pub scenario: Scenario,
    pub technology: Technology,
    pub share: f64,
    pub delivered_energy_gj: f64,
    pub useful_energy_gj: f64,
    pub emissions_t: f64,
    pub land_use_emissions_t: f64,
    pub cost: f64,
    pub mix_source: MixSource,
    /// Set when the optimiser could not be used and the scenario mix stood in for it.
    pub fallback: bool,
}

/// Turn the records of one (district, year, scenario) into rows.
///
/// Fails with a consistency error if the shares do not sum to one or the delivered energy does
/// not add up to the district demand.
pub fn aggregate(
    demand: &DemandRecord,
    records: &[AllocationRecord],
    mix_source: MixSource,
) -> Result<Vec<ResultRow>, EngineError> {
    if let Some(stray) = records
        .iter()
        .find(|record| record.district != demand.district || record.year != demand.year)
    {
        return Err(EngineError::consistency(format!(
            "Allocation for {} in {} was found among results for {} in {}",
            stray.district, stray.year, demand.district, demand.year
        )));
    }

    let total_share: f64 = records.iter().map(|record| record.share).sum();
    if !sums_to_one(total_share) {
        return Err(EngineError::consistency(format!(
            "Shares for {} in {} sum to {total_share}",
            demand.district, demand.year
        )));
    }
    let delivered_gj: f64 = records.iter().map(|record| record.delivered_energy_gj).sum();
    if !energy_matches(delivered_gj, demand.total_gj) {
        return Err(EngineError::consistency(format!(
            "Delivered energy {delivered_gj} GJ does not match demand {} GJ for {} in {}",
            demand.total_gj, demand.district, demand.year
        )));
    }

    Ok(records
        .iter()
        .map(|record| ResultRow {
            district: record.district.clone(),
            year: record.year,
            scenario: record.scenario,
            technology: record.technology,
            share: record.share,
            delivered_energy_gj: record.delivered_energy_gj,
            useful_energy_gj: record.useful_energy_gj,
            emissions_t: record.emissions_t,
            land_use_emissions_t: record.land_use_emissions_t,
            cost: record.cost,
            mix_source,
            fallback: mix_source == MixSource::Fallback,
        })
        .collect())
}

/// Totals for one (scenario, year, district).
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SummaryRow {
    pub scenario: Scenario,
    pub year: i32,
    pub district: String,
    pub total_energy_gj: f64,
    pub useful_energy_gj: f64,
    pub emissions_t: f64,
    pub land_use_emissions_t: f64,
    pub cost: f64,
    /// Cost discounted back to the base year.
    pub discounted_cost: f64,
    pub mix_source: MixSource,
}

/// Sum rows per (scenario, year, district), ordered by that key.
pub fn summarise(rows: &[ResultRow], base_year: i32, discount_rate: f64) -> Vec<SummaryRow> {
    let mut summaries: IndexMap<(Scenario, i32, String), SummaryRow> = IndexMap::new();

    for row in rows {
        let summary = summaries
            .entry((row.scenario, row.year, row.district.clone()))
            .or_insert_with(|| SummaryRow {
                scenario: row.scenario,
                year: row.year,
                district: row.district.clone(),
                total_energy_gj: 0.,
                useful_energy_gj: 0.,
                emissions_t: 0.,
                land_use_emissions_t: 0.,
                cost: 0.,
                discounted_cost: 0.,
                mix_source: row.mix_source,
            });
        summary.total_energy_gj += row.delivered_energy_gj;
        summary.useful_energy_gj += row.useful_energy_gj;
        summary.emissions_t += row.emissions_t;
        summary.land_use_emissions_t += row.land_use_emissions_t;
        summary.cost += row.cost;
    }

    summaries
        .into_iter()
        .sorted_by(|(a, _), (b, _)| a.cmp(b))
        .map(|(_, mut summary)| {
            summary.discounted_cost =
                summary.cost * discount_factor(discount_rate, summary.year - base_year);
            summary
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;
    use rstest::*;

    fn demand(total_gj: f64) -> DemandRecord {
        DemandRecord {
            district: "Lagunes".to_string(),
            year: 2030,
            urban_households: 100_000,
            rural_households: 50_000,
            total_gj,
        }
    }

    fn record(technology: Technology, share: f64, delivered_energy_gj: f64) -> AllocationRecord {
        AllocationRecord {
            district: "Lagunes".to_string(),
            year: 2030,
            scenario: Scenario::Bau,
            technology,
            share,
            delivered_energy_gj,
            useful_energy_gj: delivered_energy_gj / 2.,
            emissions_t: delivered_energy_gj / 10.,
            land_use_emissions_t: 0.,
            cost: delivered_energy_gj * 3.,
        }
    }

    #[fixture]
    fn records() -> Vec<AllocationRecord> {
        vec![
            record(Technology::Firewood, 0.4, 400_000.),
            record(Technology::Charcoal, 0.3, 300_000.),
            record(Technology::Lpg, 0.2, 200_000.),
            record(Technology::Electricity, 0.1, 100_000.),
        ]
    }

    #[rstest]
    fn should_flatten_records_into_rows(records: Vec<AllocationRecord>) {
        let rows = aggregate(&demand(1_000_000.), &records, MixSource::Fallback).unwrap();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[2].technology, Technology::Lpg);
        assert_eq!(rows[2].delivered_energy_gj, 200_000.);
        assert!(rows.iter().all(|row| row.fallback));
    }

    #[rstest]
    fn should_raise_consistency_error_on_energy_mismatch(records: Vec<AllocationRecord>) {
        let result = aggregate(&demand(1_100_000.), &records, MixSource::Scenario);
        assert!(matches!(result, Err(EngineError::Consistency(_))));
    }

    #[rstest]
    fn should_raise_consistency_error_on_share_mismatch(mut records: Vec<AllocationRecord>) {
        records[0].share = 0.5;
        let result = aggregate(&demand(1_000_000.), &records, MixSource::Scenario);
        assert!(matches!(result, Err(EngineError::Consistency(_))));
    }

    #[rstest]
    fn should_raise_consistency_error_on_foreign_records(mut records: Vec<AllocationRecord>) {
        records[1].district = "Savanes".to_string();
        let result = aggregate(&demand(1_000_000.), &records, MixSource::Scenario);
        assert!(matches!(result, Err(EngineError::Consistency(_))));
    }

    #[rstest]
    fn should_summarise_and_discount_per_triple(records: Vec<AllocationRecord>) {
        let mut rows = aggregate(&demand(1_000_000.), &records, MixSource::Scenario).unwrap();
        let mut earlier = rows.clone();
        for row in earlier.iter_mut() {
            row.year = 2025;
        }
        rows.extend(earlier);

        let summaries = summarise(&rows, 2025, 0.05);
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].year, 2025);
        assert_relative_eq!(summaries[0].total_energy_gj, 1_000_000.);
        assert_relative_eq!(summaries[0].emissions_t, 100_000.);
        assert_relative_eq!(summaries[0].discounted_cost, 3_000_000.);
        assert_relative_eq!(
            summaries[1].discounted_cost,
            3_000_000. / 1.05_f64.powi(5),
            max_relative = 1e-12
        );
        assert_eq!(summaries[1].mix_source, MixSource::Scenario);
    }
}
