//! Emission factors: the stepped grid trajectory, per-technology factors for a given year, and
//! land-use change from unsustainable biomass harvesting.

use crate::core::technology::{Technology, TechnologyRegistry};
use crate::core::units::{gigajoules_to_mtoe, KILOWATT_HOURS_PER_GIGAJOULE, YEARS_PER_DECADE};
use crate::errors::EngineError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_valid::Validate;

/// 100-year global warming potentials (IPCC AR6).
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct GlobalWarmingPotentials {
    #[validate(minimum = 0.)]
    pub ch4: f64,
    #[validate(minimum = 0.)]
    pub n2o: f64,
}

impl Default for GlobalWarmingPotentials {
    fn default() -> Self {
        Self {
            ch4: 27.9,
            n2o: 273.,
        }
    }
}

/// Emission factors of grid electricity, in kg per kWh delivered.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize, Validate)]
#[serde(default, deny_unknown_fields)]
pub struct GridEmissions {
    /// CO2 factor in the base year; this is the component that decarbonises.
    #[validate(minimum = 0.)]
    pub co2_kg_per_kwh: f64,
    #[validate(minimum = 0.)]
    pub ch4_kg_per_kwh: f64,
    #[validate(minimum = 0.)]
    pub n2o_kg_per_kwh: f64,
    /// Fractional reduction of the CO2 factor per elapsed decade.
    #[validate(minimum = 0.)]
    #[validate(maximum = 1.)]
    pub decarbonisation_rate: f64,
}

impl Default for GridEmissions {
    fn default() -> Self {
        Self {
            co2_kg_per_kwh: 0.4,
            ch4_kg_per_kwh: 0.0001,
            n2o_kg_per_kwh: 0.00001,
            decarbonisation_rate: 0.01,
        }
    }
}

/// Step function of year to grid emission factor.
///
/// The factor is multiplied by (1 - rate) once per complete decade elapsed since the base year,
/// so it only changes at base_year + 10, base_year + 20, and so on.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EmissionFactorTrajectory {
    base_year: i32,
    base_factor: f64,
    decarbonisation_rate: f64,
}

impl EmissionFactorTrajectory {
    pub fn new(
        base_year: i32,
        base_factor: f64,
        decarbonisation_rate: f64,
    ) -> Result<Self, EngineError> {
        if !base_factor.is_finite() || base_factor < 0. {
            return Err(EngineError::invalid_input(format!(
                "Base emission factor must be a non-negative number, got {base_factor}"
            )));
        }
        if !(0. ..=1.).contains(&decarbonisation_rate) {
            return Err(EngineError::invalid_input(format!(
                "Decarbonisation rate must be between 0 and 1, got {decarbonisation_rate}"
            )));
        }

        Ok(Self {
            base_year,
            base_factor,
            decarbonisation_rate,
        })
    }

    pub fn base_year(&self) -> i32 {
        self.base_year
    }

    pub fn decades_elapsed(&self, year: i32) -> Result<i32, EngineError> {
        if year < self.base_year {
            return Err(EngineError::invalid_input(format!(
                "Year {year} precedes the trajectory base year {}",
                self.base_year
            )));
        }
        Ok((year - self.base_year) / YEARS_PER_DECADE)
    }

    /// Emission factor applicable in `year`.
    pub fn factor_at(&self, year: i32) -> Result<f64, EngineError> {
        let decades = self.decades_elapsed(year)?;
        Ok(self.base_factor * (1. - self.decarbonisation_rate).powi(decades))
    }
}

/// Effective emission factor (kg CO2e per GJ delivered) for every technology in one year.
///
/// Combustion technologies use their fixed species factors; electricity uses the grid CO2 factor
/// from the trajectory plus the fixed grid CH4 and N2O factors.
pub fn emission_factors_for_year(
    registry: &TechnologyRegistry,
    grid: &GridEmissions,
    gwp: &GlobalWarmingPotentials,
    trajectory: &EmissionFactorTrajectory,
    year: i32,
) -> Result<IndexMap<Technology, f64>, EngineError> {
    let grid_co2 = trajectory.factor_at(year)?;
    let grid_co2e_kg_per_kwh =
        grid_co2 + grid.ch4_kg_per_kwh * gwp.ch4 + grid.n2o_kg_per_kwh * gwp.n2o;

    Ok(registry
        .iter()
        .map(|(technology, spec)| {
            let factor = match technology {
                Technology::Electricity => grid_co2e_kg_per_kwh * KILOWATT_HOURS_PER_GIGAJOULE,
                _ => spec.emission_factors.co2e_kg_per_gj(gwp),
            };
            (technology, factor)
        })
        .collect())
}

/// Emissions from forest loss attributed to non-renewable biomass.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize, Validate)]
#[serde(default, deny_unknown_fields)]
pub struct LandUseChange {
    /// Fraction of traditional biomass harvested unsustainably.
    #[validate(minimum = 0.)]
    #[validate(maximum = 1.)]
    pub unsustainable_biomass_share: f64,
    #[validate(minimum = 0.)]
    pub deforestation_t_co2e_per_mtoe: f64,
}

impl Default for LandUseChange {
    fn default() -> Self {
        Self {
            unsustainable_biomass_share: 0.8,
            deforestation_t_co2e_per_mtoe: 1500.,
        }
    }
}

impl LandUseChange {
    /// Land-use change emissions in tCO2e for an amount of traditional biomass energy in GJ.
    pub fn emissions_t(&self, traditional_biomass_gj: f64) -> f64 {
        gigajoules_to_mtoe(traditional_biomass_gj)
            * self.unsustainable_biomass_share
            * self.deforestation_t_co2e_per_mtoe
    }
}
