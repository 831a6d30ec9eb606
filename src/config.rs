use crate::core::demand::HouseholdIntensities;
use crate::core::emissions::{
    EmissionFactorTrajectory, GlobalWarmingPotentials, GridEmissions, LandUseChange,
};
use crate::core::optimiser::OptimisationConstraintSet;
use crate::core::scenario::{default_scenario_definitions, Scenario, ScenarioDefinition};
use crate::core::solvers::{GoodLpSolver, SolverBackend};
use crate::core::technology::TechnologyRegistry;
use crate::errors::EngineError;
use anyhow::{anyhow, bail};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_valid::Validate;
use std::io::{BufReader, Read};
use std::time::Duration;

/// Everything a run needs besides the household table. Built once before a run and only ever
/// read afterwards.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize, Validate)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    #[validate]
    pub intensities: HouseholdIntensities,
    /// First year of the grid emission trajectory and reference year for discounting.
    pub base_year: i32,
    #[validate(min_items = 1)]
    pub years: Vec<i32>,
    /// Scenario identifiers as supplied; they are normalised when resolved.
    #[validate(min_items = 1)]
    pub scenarios: Vec<String>,
    #[validate]
    pub grid: GridEmissions,
    #[validate]
    pub gwp: GlobalWarmingPotentials,
    #[validate]
    pub land_use: LandUseChange,
    #[validate(minimum = 0.)]
    #[validate(maximum = 1.)]
    pub discount_rate: f64,
    pub technologies: TechnologyRegistry,
    pub scenario_definitions: IndexMap<Scenario, ScenarioDefinition>,
    #[validate]
    pub optimisation: OptimisationSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            intensities: Default::default(),
            base_year: 2025,
            years: vec![2030, 2040, 2050],
            scenarios: vec![
                "bau".to_string(),
                "clean_push".to_string(),
                "biogas_incentive".to_string(),
            ],
            grid: Default::default(),
            gwp: Default::default(),
            land_use: Default::default(),
            discount_rate: 0.05,
            technologies: Default::default(),
            scenario_definitions: default_scenario_definitions(),
            optimisation: Default::default(),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize, Validate)]
#[serde(default, deny_unknown_fields)]
pub struct OptimisationSettings {
    /// Replace scenario mixes with least-cost mixes where that is cheaper.
    pub enabled: bool,
    pub backend: SolverBackend,
    /// Give up on a single solve after this many seconds and fall back to the scenario mix.
    pub timeout_seconds: Option<f64>,
    #[validate]
    pub constraints: OptimisationConstraintSet,
}

impl OptimisationSettings {
    pub fn solver(&self) -> GoodLpSolver {
        GoodLpSolver::new(
            self.backend,
            self.timeout_seconds.map(Duration::from_secs_f64),
        )
    }
}

impl EngineConfig {
    /// Read a JSON config; keys that are left out take their default values.
    pub fn from_json(json: impl Read) -> anyhow::Result<Self> {
        let reader = BufReader::new(json);
        let config: EngineConfig = serde_json::from_reader(reader)?;
        config.validate_all()?;
        Ok(config)
    }

    /// Range checks on every field plus the cross-field checks that attributes cannot express.
    pub fn validate_all(&self) -> anyhow::Result<()> {
        self.validate().map_err(|errors| anyhow!("Invalid config: {errors}"))?;
        self.technologies
            .validate_entries()
            .map_err(|error| anyhow!("Invalid config: {error}"))?;
        for (scenario, definition) in &self.scenario_definitions {
            definition
                .check()
                .map_err(|error| anyhow!("Invalid config for scenario '{scenario}': {error}"))?;
        }
        self.optimisation.constraints.check_bounds()?;
        if let Some(timeout) = self.optimisation.timeout_seconds {
            if !timeout.is_finite() || timeout <= 0. {
                bail!(
                    "Invalid config: solver timeout must be a positive number of seconds, \
                     got {timeout}"
                );
            }
        }
        Ok(())
    }

    pub fn grid_trajectory(&self) -> Result<EmissionFactorTrajectory, EngineError> {
        EmissionFactorTrajectory::new(
            self.base_year,
            self.grid.co2_kg_per_kwh,
            self.grid.decarbonisation_rate,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::*;

    #[rstest]
    fn should_provide_valid_defaults() {
        let config = EngineConfig::default();
        assert!(config.validate_all().is_ok());
        assert_eq!(config.scenario_definitions.len(), 3);
        assert!(!config.optimisation.enabled);
    }

    #[rstest]
    fn should_fill_missing_keys_with_defaults() {
        let json = r#"{
            "years": [2030],
            "discount_rate": 0.08,
            "optimisation": {"enabled": true, "backend": "clarabel", "timeout_seconds": 5}
        }"#;
        let config = EngineConfig::from_json(json.as_bytes()).unwrap();
        assert_eq!(config.years, vec![2030]);
        assert_eq!(config.discount_rate, 0.08);
        assert_eq!(config.optimisation.backend, SolverBackend::Clarabel);
        assert_eq!(config.optimisation.constraints.min_clean_share, 0.3);
        assert_eq!(config.base_year, 2025);
        assert_eq!(config.intensities, HouseholdIntensities::default());
    }

    #[rstest]
    #[case(r#"{"discount_rate": 1.5}"#)]
    #[case(r#"{"years": []}"#)]
    #[case(r#"{"grid": {"decarbonisation_rate": -0.1}}"#)]
    #[case(r#"{"optimisation": {"constraints": {"min_clean_share": 2.0}}}"#)]
    #[case(r#"{"optimisation": {"constraints": {"max_penetration": {"lpg": 1.2}}}}"#)]
    #[case(r#"{"optimisation": {"timeout_seconds": 0}}"#)]
    #[case(r#"{"intensitys": {}}"#)]
    #[case(r#"{"technologies": {"firewood": {"category": "traditional", "efficiency": 0.1,
        "capital_cost_per_household": 0, "fuel_cost_per_gj": 1, "lifetime_years": 5,
        "emission_factors": {"co2_kg_per_gj": 1, "ch4_kg_per_gj": 0, "n2o_kg_per_gj": 0}}}}"#)]
    fn should_reject_invalid_config(#[case] json: &str) {
        assert!(EngineConfig::from_json(json.as_bytes()).is_err());
    }

    #[rstest]
    fn should_build_trajectory_from_grid_settings() {
        let config = EngineConfig::default();
        let trajectory = config.grid_trajectory().unwrap();
        assert_eq!(trajectory.base_year(), 2025);
        assert_eq!(trajectory.factor_at(2034).unwrap(), 0.4);
    }
}
