//! Least-cost technology mix under policy bounds, with a fallback to the scenario mix when no
//! solver can be used.

use crate::compare_floats::{max_of_2, min_of_2, SHARE_TOLERANCE};
use crate::core::shares::TechnologyShares;
use crate::core::solvers::{LinearConstraint, LinearProgram, LinearProgramSolver, Relation};
use crate::core::technology::{Technology, TechnologyCategory, TechnologyRegistry};
use crate::errors::{EngineError, SolverError};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_valid::Validate;
use strum::IntoEnumIterator;
use strum_macros::Display;
use tracing::debug;

/// Largest negative value accepted from a solver as round-off on a zero share.
const SOLUTION_TOLERANCE: f64 = 1e-7;

/// Bounds a candidate mix must respect.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize, Validate)]
#[serde(default, deny_unknown_fields)]
pub struct OptimisationConstraintSet {
    /// Lower bound on the combined share of clean technologies.
    #[validate(minimum = 0.)]
    #[validate(maximum = 1.)]
    pub min_clean_share: f64,
    /// Upper bound on the combined share of traditional biomass (firewood and charcoal).
    #[validate(minimum = 0.)]
    #[validate(maximum = 1.)]
    pub max_firewood_share: f64,
    /// Upper bound on individual technology shares, reflecting supply and adoption limits.
    /// Technologies not listed are unbounded.
    pub max_penetration: IndexMap<Technology, f64>,
}

impl Default for OptimisationConstraintSet {
    fn default() -> Self {
        Self {
            min_clean_share: 0.3,
            max_firewood_share: 0.3,
            max_penetration: IndexMap::from([
                (Technology::IcsFirewood, 0.9),
                (Technology::IcsCharcoal, 0.9),
                (Technology::Biogas, 0.4),
                (Technology::Ethanol, 0.3),
                (Technology::Electricity, 0.9),
            ]),
        }
    }
}

impl OptimisationConstraintSet {
    /// Upper bound on the share of one technology.
    pub fn upper_bound(&self, technology: Technology) -> f64 {
        min_of_2(
            self.max_penetration.get(&technology).copied().unwrap_or(1.),
            1.,
        )
    }

    /// Reject bounds that are not shares.
    pub fn check_bounds(&self) -> Result<(), EngineError> {
        let named_bounds = [
            ("min_clean_share", self.min_clean_share),
            ("max_firewood_share", self.max_firewood_share),
        ];
        for (name, bound) in named_bounds {
            if !(0. ..=1.).contains(&bound) {
                return Err(EngineError::invalid_input(format!(
                    "{name} must be between 0 and 1, got {bound}"
                )));
            }
        }
        for (technology, bound) in &self.max_penetration {
            if !(0. ..=1.).contains(bound) {
                return Err(EngineError::invalid_input(format!(
                    "max_penetration for '{technology}' must be between 0 and 1, got {bound}"
                )));
            }
        }
        Ok(())
    }

    /// Check that some mix can satisfy every bound at once, without consulting a solver.
    pub fn check_feasible(&self, registry: &TechnologyRegistry) -> Result<(), EngineError> {
        self.check_bounds()?;

        let capacity_of = |category: TechnologyCategory| -> f64 {
            registry
                .iter()
                .filter(|(_, spec)| spec.category == category)
                .map(|(technology, _)| self.upper_bound(technology))
                .sum()
        };
        let clean_capacity = capacity_of(TechnologyCategory::Clean);
        let traditional_capacity = min_of_2(
            capacity_of(TechnologyCategory::Traditional),
            self.max_firewood_share,
        );
        let improved_capacity = capacity_of(TechnologyCategory::Improved);

        if self.min_clean_share > clean_capacity + SHARE_TOLERANCE {
            return Err(EngineError::InfeasibleConstraints(format!(
                "clean technologies can reach at most {clean_capacity:.4} of the mix, below the \
                 required minimum of {}",
                self.min_clean_share
            )));
        }
        let total_capacity = clean_capacity + traditional_capacity + improved_capacity;
        if total_capacity < 1. - SHARE_TOLERANCE {
            return Err(EngineError::InfeasibleConstraints(format!(
                "technology bounds allow at most {total_capacity:.4} of demand to be met"
            )));
        }
        Ok(())
    }

    /// Whether a mix respects every bound, within the share tolerance.
    pub fn admits(&self, registry: &TechnologyRegistry, shares: &TechnologyShares) -> bool {
        let clean_share = shares.total_of(&registry.clean_technologies());
        let traditional_share = shares.total_of(&registry.traditional_technologies());

        clean_share >= self.min_clean_share - SHARE_TOLERANCE
            && traditional_share <= self.max_firewood_share + SHARE_TOLERANCE
            && shares
                .iter()
                .all(|(technology, share)| share <= self.upper_bound(technology) + SHARE_TOLERANCE)
    }
}

/// Where the mix used for a (district, year, scenario) came from.
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MixSource {
    /// The scenario's own mix, either because optimisation is off or because the mix was already
    /// no more expensive than the optimum.
    Scenario,
    Optimised,
    /// The scenario's mix, used because no solver result could be obtained.
    Fallback,
}

#[derive(Clone, Debug, PartialEq)]
pub struct OptimisationOutcome {
    pub shares: TechnologyShares,
    /// Total cost of meeting demand with `shares`.
    pub cost: f64,
    pub source: MixSource,
    pub fallback_reason: Option<String>,
}

pub struct CostMinimisingOptimiser<'a> {
    solver: &'a dyn LinearProgramSolver,
    registry: &'a TechnologyRegistry,
    constraints: &'a OptimisationConstraintSet,
}

impl<'a> CostMinimisingOptimiser<'a> {
    pub fn new(
        solver: &'a dyn LinearProgramSolver,
        registry: &'a TechnologyRegistry,
        constraints: &'a OptimisationConstraintSet,
    ) -> Self {
        Self {
            solver,
            registry,
            constraints,
        }
    }

    /// The mix minimising total cost for `demand_gj` under the constraint set, and that cost.
    ///
    /// Demand is a positive constant factor of the objective, so the program is solved on
    /// per-GJ costs and the cost is scaled back up afterwards.
    pub fn optimise(
        &self,
        demand_gj: f64,
        levelised_costs: &IndexMap<Technology, f64>,
    ) -> Result<(TechnologyShares, f64), EngineError> {
        self.constraints.check_feasible(self.registry)?;
        let program = self.build_program(levelised_costs)?;
        debug!(solver = self.solver.name(), "solving least-cost mix");

        let values = self.solver.solve(&program)?;
        let shares = shares_from_solution(&values)?;
        let cost = demand_gj
            * shares
                .iter()
                .map(|(technology, share)| share * levelised_costs[&technology])
                .sum::<f64>();

        Ok((shares, cost))
    }

    /// Choose between the scenario's mix and the least-cost mix.
    ///
    /// The scenario mix is kept if it satisfies the constraints and costs no more than the
    /// optimum. When the solver is unavailable or fails, the scenario mix is returned as a
    /// fallback. Infeasible constraints are an error.
    pub fn choose_mix(
        &self,
        demand_gj: f64,
        levelised_costs: &IndexMap<Technology, f64>,
        scenario_shares: &TechnologyShares,
    ) -> Result<OptimisationOutcome, EngineError> {
        let scenario_cost = demand_gj
            * scenario_shares
                .iter()
                .map(|(technology, share)| {
                    share * levelised_costs.get(&technology).copied().unwrap_or_default()
                })
                .sum::<f64>();

        match self.optimise(demand_gj, levelised_costs) {
            Ok((optimal_shares, optimal_cost)) => {
                let tolerance = 1e-9 * max_of_2(optimal_cost.abs(), 1.);
                if self.constraints.admits(self.registry, scenario_shares)
                    && scenario_cost <= optimal_cost + tolerance
                {
                    Ok(OptimisationOutcome {
                        shares: scenario_shares.clone(),
                        cost: scenario_cost,
                        source: MixSource::Scenario,
                        fallback_reason: None,
                    })
                } else {
                    Ok(OptimisationOutcome {
                        shares: optimal_shares,
                        cost: optimal_cost,
                        source: MixSource::Optimised,
                        fallback_reason: None,
                    })
                }
            }
            Err(EngineError::SolverUnavailable(reason)) => Ok(OptimisationOutcome {
                shares: scenario_shares.clone(),
                cost: scenario_cost,
                source: MixSource::Fallback,
                fallback_reason: Some(reason),
            }),
            Err(error) => Err(error),
        }
    }

    fn build_program(
        &self,
        levelised_costs: &IndexMap<Technology, f64>,
    ) -> Result<LinearProgram, EngineError> {
        let mut objective = Vec::with_capacity(levelised_costs.len());
        let mut upper_bounds = Vec::with_capacity(levelised_costs.len());
        let mut all = vec![];
        let mut clean = vec![];
        let mut traditional = vec![];

        for (technology, spec) in self.registry.iter() {
            let cost = levelised_costs.get(&technology).copied().ok_or_else(|| {
                EngineError::invalid_input(format!("No levelised cost for '{technology}'"))
            })?;
            if !cost.is_finite() {
                return Err(EngineError::invalid_input(format!(
                    "Levelised cost for '{technology}' is not a number"
                )));
            }
            objective.push(cost);
            upper_bounds.push(self.constraints.upper_bound(technology));
            all.push(1.);
            clean.push(if spec.is_clean() { 1. } else { 0. });
            traditional.push(if spec.is_traditional() { 1. } else { 0. });
        }

        Ok(LinearProgram {
            objective,
            upper_bounds,
            constraints: vec![
                LinearConstraint {
                    coefficients: all,
                    relation: Relation::Equal,
                    rhs: 1.,
                },
                LinearConstraint {
                    coefficients: clean,
                    relation: Relation::AtLeast,
                    rhs: self.constraints.min_clean_share,
                },
                LinearConstraint {
                    coefficients: traditional,
                    relation: Relation::AtMost,
                    rhs: self.constraints.max_firewood_share,
                },
            ],
        })
    }
}

/// Turn solver output (one value per technology, in enum order) into a mix.
fn shares_from_solution(values: &[f64]) -> Result<TechnologyShares, SolverError> {
    let mut shares = IndexMap::with_capacity(values.len());
    for (technology, value) in Technology::iter().zip(values) {
        if !value.is_finite() || *value < -SOLUTION_TOLERANCE {
            return Err(SolverError::Failed(format!(
                "solver returned share {value} for '{technology}'"
            )));
        }
        shares.insert(technology, max_of_2(*value, 0.));
    }
    TechnologyShares::new(shares).map_err(|error| SolverError::Failed(error.to_string()))
}
