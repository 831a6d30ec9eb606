//! The heuristic allocation path: district demand split across technologies by a fixed mix, with
//! emissions and costs derived from per-technology factors.

use crate::core::demand::DemandRecord;
use crate::core::emissions::LandUseChange;
use crate::core::scenario::Scenario;
use crate::core::shares::TechnologyShares;
use crate::core::technology::{Technology, TechnologyRegistry};
use crate::core::units::kilograms_to_tonnes;
use indexmap::IndexMap;
use serde::Serialize;

/// Per-GJ factors for one technology in one (district, year).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UnitFactors {
    /// kg CO2e per GJ delivered
    pub emission_kg_per_gj: f64,
    /// USD per GJ delivered
    pub levelised_cost_per_gj: f64,
    pub efficiency: f64,
    /// Whether the fuel is harvested biomass burnt in traditional stoves, and so carries
    /// land-use-change emissions.
    pub traditional_biomass: bool,
}

/// The factors the allocation needs for every technology, computed once per (district, year).
#[derive(Clone, Debug, PartialEq)]
pub struct AllocationFactors {
    per_technology: IndexMap<Technology, UnitFactors>,
    land_use: LandUseChange,
}

impl AllocationFactors {
    pub fn new(
        registry: &TechnologyRegistry,
        emission_factors: &IndexMap<Technology, f64>,
        levelised_costs: &IndexMap<Technology, f64>,
        land_use: LandUseChange,
    ) -> Self {
        let per_technology = registry
            .iter()
            .map(|(technology, spec)| {
                (
                    technology,
                    UnitFactors {
                        emission_kg_per_gj: emission_factors
                            .get(&technology)
                            .copied()
                            .unwrap_or_default(),
                        levelised_cost_per_gj: levelised_costs
                            .get(&technology)
                            .copied()
                            .unwrap_or_default(),
                        efficiency: spec.efficiency,
                        traditional_biomass: spec.is_traditional(),
                    },
                )
            })
            .collect();

        Self {
            per_technology,
            land_use,
        }
    }

    pub fn get(&self, technology: Technology) -> &UnitFactors {
        &self.per_technology[&technology]
    }

    /// Levelised cost per GJ for every technology, in registry order.
    pub fn levelised_costs(&self) -> IndexMap<Technology, f64> {
        self.per_technology
            .iter()
            .map(|(technology, factors)| (*technology, factors.levelised_cost_per_gj))
            .collect()
    }

    /// Total cost of meeting `demand_gj` with the given mix.
    pub fn total_cost(&self, demand_gj: f64, shares: &TechnologyShares) -> f64 {
        shares
            .iter()
            .map(|(technology, share)| {
                demand_gj * share * self.get(technology).levelised_cost_per_gj
            })
            .sum()
    }
}

/// Delivered energy, emissions and cost for one technology within one (district, year,
/// scenario).
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AllocationRecord {
    pub district: String,
    pub year: i32,
    pub scenario: Scenario,
    pub technology: Technology,
    pub share: f64,
    pub delivered_energy_gj: f64,
    /// Cooking heat actually reaching the pot.
    pub useful_energy_gj: f64,
    pub emissions_t: f64,
    pub land_use_emissions_t: f64,
    pub cost: f64,
}

/// Split the district demand across technologies using `shares`. Returns one record per
/// technology, zero-share technologies included.
pub fn allocate(
    demand: &DemandRecord,
    scenario: Scenario,
    shares: &TechnologyShares,
    factors: &AllocationFactors,
) -> Vec<AllocationRecord> {
    shares
        .iter()
        .map(|(technology, share)| {
            let unit = factors.get(technology);
            let delivered_energy_gj = demand.total_gj * share;
            let land_use_emissions_t = if unit.traditional_biomass {
                factors.land_use.emissions_t(delivered_energy_gj)
            } else {
                0.
            };

            AllocationRecord {
                district: demand.district.clone(),
                year: demand.year,
                scenario,
                technology,
                share,
                delivered_energy_gj,
                useful_energy_gj: delivered_energy_gj * unit.efficiency,
                emissions_t: kilograms_to_tonnes(delivered_energy_gj * unit.emission_kg_per_gj),
                land_use_emissions_t,
                cost: delivered_energy_gj * unit.levelised_cost_per_gj,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::emissions::{
        emission_factors_for_year, EmissionFactorTrajectory, GlobalWarmingPotentials,
        GridEmissions,
    };
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;
    use rstest::*;

    #[fixture]
    fn demand() -> DemandRecord {
        DemandRecord {
            district: "Lagunes".to_string(),
            year: 2030,
            urban_households: 100_000,
            rural_households: 63_636,
            total_gj: 1_000_000.,
        }
    }

    #[fixture]
    fn factors() -> AllocationFactors {
        let registry = TechnologyRegistry::default();
        let grid = GridEmissions::default();
        let trajectory = EmissionFactorTrajectory::new(2025, grid.co2_kg_per_kwh, 0.01).unwrap();
        let emission_factors = emission_factors_for_year(
            &registry,
            &grid,
            &GlobalWarmingPotentials::default(),
            &trajectory,
            2030,
        )
        .unwrap();
        let levelised_costs = registry.levelised_costs(6., 0.05);
        AllocationFactors::new(
            &registry,
            &emission_factors,
            &levelised_costs,
            LandUseChange::default(),
        )
    }

    #[fixture]
    fn shares() -> TechnologyShares {
        TechnologyShares::new(IndexMap::from([
            (Technology::Firewood, 0.4),
            (Technology::Charcoal, 0.3),
            (Technology::Lpg, 0.2),
            (Technology::Electricity, 0.1),
        ]))
        .unwrap()
    }

    #[rstest]
    fn should_split_demand_by_share(
        demand: DemandRecord,
        shares: TechnologyShares,
        factors: AllocationFactors,
    ) {
        let records = allocate(&demand, Scenario::Bau, &shares, &factors);
        let delivered: IndexMap<Technology, f64> = records
            .iter()
            .map(|record| (record.technology, record.delivered_energy_gj))
            .collect();

        assert_eq!(records.len(), 9);
        assert_relative_eq!(delivered[&Technology::Firewood], 400_000.);
        assert_relative_eq!(delivered[&Technology::Charcoal], 300_000.);
        assert_relative_eq!(delivered[&Technology::Lpg], 200_000.);
        assert_relative_eq!(delivered[&Technology::Electricity], 100_000.);
        assert_eq!(delivered[&Technology::Biogas], 0.);
        assert_relative_eq!(
            delivered.values().sum::<f64>(),
            1_000_000.,
            max_relative = 1e-12
        );
        assert!(records
            .iter()
            .all(|record| record.district == "Lagunes" && record.year == 2030));
    }

    #[rstest]
    fn should_derive_emissions_and_cost(
        demand: DemandRecord,
        shares: TechnologyShares,
        factors: AllocationFactors,
    ) {
        let records = allocate(&demand, Scenario::Bau, &shares, &factors);
        let lpg = records
            .iter()
            .find(|record| record.technology == Technology::Lpg)
            .unwrap();
        let lpg_factors = factors.get(Technology::Lpg);

        assert_relative_eq!(
            lpg.emissions_t,
            200_000. * lpg_factors.emission_kg_per_gj / 1000.,
            max_relative = 1e-12
        );
        assert_relative_eq!(
            lpg.cost,
            200_000. * lpg_factors.levelised_cost_per_gj,
            max_relative = 1e-12
        );
        assert_relative_eq!(lpg.useful_energy_gj, 200_000. * 0.55, max_relative = 1e-12);
        assert_eq!(lpg.land_use_emissions_t, 0.);
    }

    #[rstest]
    fn should_attribute_land_use_change_to_traditional_biomass(
        demand: DemandRecord,
        shares: TechnologyShares,
        factors: AllocationFactors,
    ) {
        let records = allocate(&demand, Scenario::Bau, &shares, &factors);
        let firewood = &records[0];
        assert_eq!(firewood.technology, Technology::Firewood);
        assert_relative_eq!(
            firewood.land_use_emissions_t,
            400_000. / 41_868_000. * 0.8 * 1500.,
            max_relative = 1e-12
        );
    }

    #[rstest]
    fn should_total_cost_consistently_with_records(
        demand: DemandRecord,
        shares: TechnologyShares,
        factors: AllocationFactors,
    ) {
        let records = allocate(&demand, Scenario::Bau, &shares, &factors);
        assert_relative_eq!(
            records.iter().map(|record| record.cost).sum::<f64>(),
            factors.total_cost(demand.total_gj, &shares),
            max_relative = 1e-12
        );
    }
}
