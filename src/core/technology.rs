//! The fixed set of cooking technologies and the reference data (costs, lifetimes, efficiencies
//! and emission factors) attached to each of them.

use crate::core::emissions::GlobalWarmingPotentials;
use crate::core::units::capital_recovery_factor;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_valid::Validate;
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumCount, EnumIter, EnumString, IntoStaticStr};
use thiserror::Error;

#[derive(
    Clone,
    Copy,
    Debug,
    Deserialize,
    Display,
    EnumCount,
    EnumIter,
    EnumString,
    Eq,
    Hash,
    IntoStaticStr,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Technology {
    Firewood,
    Charcoal,
    IcsFirewood,
    IcsCharcoal,
    Biogas,
    Ethanol,
    Electricity,
    Lpg,
    ImprovedBiomass,
}

/// Policy classification of a technology, used by the optimisation constraints.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TechnologyCategory {
    /// Unimproved biomass (three-stone fires, traditional charcoal stoves). Subject to the
    /// firewood share cap.
    Traditional,
    /// Improved biomass cookstoves burning the same fuels as traditional ones.
    Improved,
    /// Low-emission technologies counted toward the minimum clean share.
    Clean,
}

/// Species emission factors at the point of use, in kg per GJ delivered.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct EmissionFactors {
    #[validate(minimum = 0.)]
    pub co2_kg_per_gj: f64,
    #[validate(minimum = 0.)]
    pub ch4_kg_per_gj: f64,
    #[validate(minimum = 0.)]
    pub n2o_kg_per_gj: f64,
}

impl EmissionFactors {
    pub const fn new(co2_kg_per_gj: f64, ch4_kg_per_gj: f64, n2o_kg_per_gj: f64) -> Self {
        Self {
            co2_kg_per_gj,
            ch4_kg_per_gj,
            n2o_kg_per_gj,
        }
    }

    /// Combined factor in kg CO2e per GJ.
    pub fn co2e_kg_per_gj(&self, gwp: &GlobalWarmingPotentials) -> f64 {
        self.co2_kg_per_gj + self.ch4_kg_per_gj * gwp.ch4 + self.n2o_kg_per_gj * gwp.n2o
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct TechnologySpec {
    pub category: TechnologyCategory,
    /// Fraction of delivered energy that ends up as useful cooking heat.
    #[validate(exclusive_minimum = 0.)]
    #[validate(maximum = 1.)]
    pub efficiency: f64,
    /// Upfront appliance cost per household (USD).
    #[validate(minimum = 0.)]
    pub capital_cost_per_household: f64,
    /// Fuel cost per GJ delivered (USD).
    #[validate(minimum = 0.)]
    pub fuel_cost_per_gj: f64,
    #[validate(minimum = 1)]
    pub lifetime_years: u32,
    #[validate]
    pub emission_factors: EmissionFactors,
}

impl TechnologySpec {
    fn new(
        category: TechnologyCategory,
        efficiency: f64,
        capital_cost_per_household: f64,
        fuel_cost_per_gj: f64,
        emission_factors: EmissionFactors,
    ) -> Self {
        Self {
            category,
            efficiency,
            capital_cost_per_household,
            fuel_cost_per_gj,
            lifetime_years: DEFAULT_LIFETIME_YEARS,
            emission_factors,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.category == TechnologyCategory::Clean
    }

    pub fn is_traditional(&self) -> bool {
        self.category == TechnologyCategory::Traditional
    }

    /// Levelised cost per GJ delivered (USD/GJ).
    ///
    /// Arguments
    /// * `annual_demand_per_household` - average annual cooking demand of one household, in GJ
    /// * `discount_rate` - used to amortise the appliance cost over its lifetime
    pub fn levelised_cost_per_gj(
        &self,
        annual_demand_per_household: f64,
        discount_rate: f64,
    ) -> f64 {
        let capex_per_gj = if self.capital_cost_per_household > 0.
            && annual_demand_per_household > 0.
        {
            self.capital_cost_per_household
                * capital_recovery_factor(discount_rate, self.lifetime_years)
                / annual_demand_per_household
        } else {
            0.
        };

        self.fuel_cost_per_gj + capex_per_gj
    }
}

const DEFAULT_LIFETIME_YEARS: u32 = 15;

#[derive(Debug, Error, PartialEq)]
pub enum RegistryError {
    #[error("Technology registry is missing an entry for '{0}'")]
    MissingTechnology(Technology),
}

/// Reference data for every technology. Construction guarantees that every [`Technology`]
/// variant has an entry, so lookups never fail.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(
    try_from = "IndexMap<Technology, TechnologySpec>",
    into = "IndexMap<Technology, TechnologySpec>"
)]
pub struct TechnologyRegistry {
    specs: IndexMap<Technology, TechnologySpec>,
}

impl TechnologyRegistry {
    pub fn spec(&self, technology: Technology) -> &TechnologySpec {
        &self.specs[&technology]
    }

    pub fn iter(&self) -> impl Iterator<Item = (Technology, &TechnologySpec)> {
        self.specs.iter().map(|(technology, spec)| (*technology, spec))
    }

    pub fn clean_technologies(&self) -> Vec<Technology> {
        self.iter()
            .filter(|(_, spec)| spec.is_clean())
            .map(|(technology, _)| technology)
            .collect()
    }

    pub fn traditional_technologies(&self) -> Vec<Technology> {
        self.iter()
            .filter(|(_, spec)| spec.is_traditional())
            .map(|(technology, _)| technology)
            .collect()
    }

    /// Levelised cost per GJ for every technology, in registry order.
    pub fn levelised_costs(
        &self,
        annual_demand_per_household: f64,
        discount_rate: f64,
    ) -> IndexMap<Technology, f64> {
        self.iter()
            .map(|(technology, spec)| {
                (
                    technology,
                    spec.levelised_cost_per_gj(annual_demand_per_household, discount_rate),
                )
            })
            .collect()
    }

    pub(crate) fn validate_entries(&self) -> Result<(), String> {
        for (technology, spec) in self.iter() {
            spec.validate()
                .map_err(|errors| format!("technology '{technology}': {errors}"))?;
        }
        Ok(())
    }
}

impl TryFrom<IndexMap<Technology, TechnologySpec>> for TechnologyRegistry {
    type Error = RegistryError;

    fn try_from(specs: IndexMap<Technology, TechnologySpec>) -> Result<Self, Self::Error> {
        // normalise ordering to enum order so output rows are stable regardless of input order
        let mut ordered = IndexMap::with_capacity(specs.len());
        for technology in Technology::iter() {
            let spec = specs
                .get(&technology)
                .ok_or(RegistryError::MissingTechnology(technology))?;
            ordered.insert(technology, spec.clone());
        }
        Ok(Self { specs: ordered })
    }
}

impl From<TechnologyRegistry> for IndexMap<Technology, TechnologySpec> {
    fn from(registry: TechnologyRegistry) -> Self {
        registry.specs
    }
}

impl Default for TechnologyRegistry {
    /// Cost and emission data for Côte d'Ivoire household cooking. Improved cookstoves carry the
    /// CH4 (-40%) and N2O (-30%) reductions relative to their base fuel.
    fn default() -> Self {
        use TechnologyCategory::*;

        let firewood = EmissionFactors::new(110., 0.5, 0.005);
        let charcoal = EmissionFactors::new(310., 0.8, 0.008);
        let ics_firewood = EmissionFactors::new(110., 0.5 * 0.6, 0.005 * 0.7);
        let ics_charcoal = EmissionFactors::new(310., 0.8 * 0.6, 0.008 * 0.7);

        Self {
            specs: IndexMap::from([
                (
                    Technology::Firewood,
                    TechnologySpec::new(Traditional, 0.11, 0., 2., firewood),
                ),
                (
                    Technology::Charcoal,
                    TechnologySpec::new(Traditional, 0.25, 0., 6., charcoal),
                ),
                (
                    Technology::IcsFirewood,
                    TechnologySpec::new(Improved, 0.37, 25., 2., ics_firewood),
                ),
                (
                    Technology::IcsCharcoal,
                    TechnologySpec::new(Improved, 0.40, 30., 6., ics_charcoal),
                ),
                (
                    Technology::Biogas,
                    TechnologySpec::new(
                        Clean,
                        0.55,
                        450.,
                        1.,
                        EmissionFactors::new(0., 0.005, 0.001),
                    ),
                ),
                (
                    Technology::Ethanol,
                    TechnologySpec::new(
                        Clean,
                        0.50,
                        75.,
                        15.,
                        EmissionFactors::new(50., 0.002, 0.0005),
                    ),
                ),
                (
                    // point-of-use factors are zero, grid factors are applied per year
                    Technology::Electricity,
                    TechnologySpec::new(Clean, 0.85, 100., 12., EmissionFactors::default()),
                ),
                (
                    Technology::Lpg,
                    TechnologySpec::new(
                        Clean,
                        0.55,
                        60.,
                        10.,
                        EmissionFactors::new(63.1, 0.005, 0.0001),
                    ),
                ),
                (
                    Technology::ImprovedBiomass,
                    TechnologySpec::new(Clean, 0.37, 40., 4., ics_firewood),
                ),
            ]),
        }
    }
}
