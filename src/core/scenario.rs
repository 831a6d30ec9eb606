//! Adoption scenarios: each one has an urban and a rural base technology mix plus a rule for how
//! the mixes evolve from year to year.

use crate::core::shares::TechnologyShares;
use crate::core::technology::Technology;
use crate::errors::EngineError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use strum_macros::{Display, EnumIter, EnumString};

#[derive(
    Clone,
    Copy,
    Debug,
    Deserialize,
    Display,
    EnumIter,
    EnumString,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Scenario {
    /// Business as usual: today's mix held constant.
    Bau,
    /// Steady move toward a clean-technology target mix.
    CleanPush,
    /// Subsidised biogas gaining share every year.
    BiogasIncentive,
}

impl Scenario {
    /// Parse a scenario identifier after normalising it.
    pub fn parse(identifier: &str) -> Result<Self, EngineError> {
        let normalised = normalise_scenario_id(identifier);
        Scenario::from_str(&normalised)
            .map_err(|_| EngineError::UnknownScenario(normalised.clone()))
    }
}

/// Trim, lowercase and replace each run of whitespace with a single underscore.
pub fn normalise_scenario_id(identifier: &str) -> String {
    identifier
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .to_lowercase()
}

/// How a scenario's base mixes change with the evaluation year.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Adjustment {
    /// The base mixes apply in every year.
    None,
    /// Move linearly from the base mixes toward target mixes, reaching them at `target_year` and
    /// holding them afterwards.
    Interpolate {
        urban_target: TechnologyShares,
        rural_target: TechnologyShares,
        start_year: i32,
        target_year: i32,
    },
    /// Give `technology` an extra `per_year` share for every year after `start_year`, taken from
    /// the other technologies in proportion to their shares.
    Shift {
        technology: Technology,
        per_year: f64,
        start_year: i32,
    },
}

impl Adjustment {
    fn apply(
        &self,
        base: &TechnologyShares,
        target: Option<&TechnologyShares>,
        year: i32,
    ) -> TechnologyShares {
        match (self, target) {
            (
                Adjustment::Interpolate {
                    start_year,
                    target_year,
                    ..
                },
                Some(target),
            ) => {
                let fraction = (year - start_year) as f64 / (target_year - start_year) as f64;
                base.interpolate(target, fraction)
            }
            (
                Adjustment::Shift {
                    technology,
                    per_year,
                    start_year,
                },
                _,
            ) => {
                let years_elapsed = (year - start_year).max(0);
                base.shifted(*technology, per_year * years_elapsed as f64)
            }
            _ => base.clone(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioDefinition {
    pub urban: TechnologyShares,
    pub rural: TechnologyShares,
    pub adjustment: Adjustment,
}

impl ScenarioDefinition {
    /// Urban and rural mixes for `year`, with the adjustment applied.
    pub fn mixes_for_year(&self, year: i32) -> (TechnologyShares, TechnologyShares) {
        let (urban_target, rural_target) = match &self.adjustment {
            Adjustment::Interpolate {
                urban_target,
                rural_target,
                ..
            } => (Some(urban_target), Some(rural_target)),
            _ => (None, None),
        };
        (
            self.adjustment.apply(&self.urban, urban_target, year),
            self.adjustment.apply(&self.rural, rural_target, year),
        )
    }

    pub(crate) fn check(&self) -> Result<(), String> {
        match self.adjustment {
            Adjustment::Interpolate {
                start_year,
                target_year,
                ..
            } if target_year <= start_year => Err(format!(
                "interpolation target year {target_year} must be after start year {start_year}"
            )),
            Adjustment::Shift { per_year, .. } if !per_year.is_finite() => {
                Err(format!("share shift per year must be a number, got {per_year}"))
            }
            _ => Ok(()),
        }
    }
}

/// Looks up scenario definitions and turns them into district technology mixes.
pub struct ScenarioResolver<'a> {
    definitions: &'a IndexMap<Scenario, ScenarioDefinition>,
}

impl<'a> ScenarioResolver<'a> {
    pub fn new(definitions: &'a IndexMap<Scenario, ScenarioDefinition>) -> Self {
        Self { definitions }
    }

    /// Resolve an identifier as supplied by a user to a scenario that has a definition.
    pub fn resolve(&self, identifier: &str) -> Result<Scenario, EngineError> {
        let scenario = Scenario::parse(identifier)?;
        if !self.definitions.contains_key(&scenario) {
            return Err(EngineError::UnknownScenario(scenario.to_string()));
        }
        Ok(scenario)
    }

    fn definition(&self, scenario: Scenario) -> Result<&ScenarioDefinition, EngineError> {
        self.definitions
            .get(&scenario)
            .ok_or_else(|| EngineError::UnknownScenario(scenario.to_string()))
    }

    /// Urban and rural mixes of a scenario in a year.
    pub fn area_shares(
        &self,
        scenario: Scenario,
        year: i32,
    ) -> Result<(TechnologyShares, TechnologyShares), EngineError> {
        let (urban, rural) = self.definition(scenario)?.mixes_for_year(year);
        Ok((urban.verified()?, rural.verified()?))
    }

    /// The mix for a district: the urban and rural mixes weighted by household numbers.
    pub fn district_shares(
        &self,
        scenario: Scenario,
        year: i32,
        urban_households: u64,
        rural_households: u64,
    ) -> Result<TechnologyShares, EngineError> {
        let (urban, rural) = self.area_shares(scenario, year)?;
        TechnologyShares::weighted_average(
            &urban,
            urban_households as f64,
            &rural,
            rural_households as f64,
        )
        .verified()
    }
}

/// Built-in scenario set for Côte d'Ivoire.
pub fn default_scenario_definitions() -> IndexMap<Scenario, ScenarioDefinition> {
    use Technology::*;

    IndexMap::from([
        (
            Scenario::Bau,
            ScenarioDefinition {
                urban: TechnologyShares::from_reference_data(&[
                    (Firewood, 0.2),
                    (Charcoal, 0.4),
                    (IcsFirewood, 0.1),
                    (IcsCharcoal, 0.05),
                    (Biogas, 0.05),
                    (Ethanol, 0.05),
                    (Electricity, 0.1),
                    (Lpg, 0.05),
                ]),
                rural: TechnologyShares::from_reference_data(&[
                    (Firewood, 0.5),
                    (Charcoal, 0.15),
                    (IcsFirewood, 0.15),
                    (IcsCharcoal, 0.05),
                    (Biogas, 0.05),
                    (Electricity, 0.05),
                    (Lpg, 0.05),
                ]),
                adjustment: Adjustment::None,
            },
        ),
        (
            Scenario::CleanPush,
            ScenarioDefinition {
                urban: TechnologyShares::from_reference_data(&[
                    (Firewood, 0.1),
                    (Charcoal, 0.1),
                    (IcsFirewood, 0.05),
                    (IcsCharcoal, 0.05),
                    (Biogas, 0.1),
                    (Ethanol, 0.15),
                    (Electricity, 0.3),
                    (Lpg, 0.1),
                    (ImprovedBiomass, 0.05),
                ]),
                rural: TechnologyShares::from_reference_data(&[
                    (Firewood, 0.2),
                    (Charcoal, 0.1),
                    (IcsFirewood, 0.15),
                    (IcsCharcoal, 0.1),
                    (Biogas, 0.15),
                    (Ethanol, 0.05),
                    (Electricity, 0.15),
                    (Lpg, 0.05),
                    (ImprovedBiomass, 0.05),
                ]),
                adjustment: Adjustment::Interpolate {
                    urban_target: TechnologyShares::from_reference_data(&[
                        (IcsCharcoal, 0.05),
                        (Biogas, 0.1),
                        (Ethanol, 0.15),
                        (Electricity, 0.4),
                        (Lpg, 0.25),
                        (ImprovedBiomass, 0.05),
                    ]),
                    rural_target: TechnologyShares::from_reference_data(&[
                        (Firewood, 0.05),
                        (IcsFirewood, 0.15),
                        (Biogas, 0.25),
                        (Ethanol, 0.05),
                        (Electricity, 0.2),
                        (Lpg, 0.15),
                        (ImprovedBiomass, 0.15),
                    ]),
                    start_year: 2025,
                    target_year: 2050,
                },
            },
        ),
        (
            Scenario::BiogasIncentive,
            ScenarioDefinition {
                urban: TechnologyShares::from_reference_data(&[
                    (Firewood, 0.05),
                    (Charcoal, 0.05),
                    (IcsFirewood, 0.05),
                    (IcsCharcoal, 0.05),
                    (Biogas, 0.4),
                    (Ethanol, 0.05),
                    (Electricity, 0.2),
                    (Lpg, 0.1),
                    (ImprovedBiomass, 0.05),
                ]),
                rural: TechnologyShares::from_reference_data(&[
                    (Firewood, 0.15),
                    (Charcoal, 0.05),
                    (IcsFirewood, 0.1),
                    (IcsCharcoal, 0.05),
                    (Biogas, 0.35),
                    (Ethanol, 0.05),
                    (Electricity, 0.15),
                    (Lpg, 0.05),
                    (ImprovedBiomass, 0.05),
                ]),
                adjustment: Adjustment::Shift {
                    technology: Biogas,
                    per_year: 0.01,
                    start_year: 2025,
                },
            },
        ),
    ])
}
