use crate::compare_floats::{max_of_2, sums_to_one};
use crate::core::technology::Technology;
use crate::errors::EngineError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;

/// A technology adoption mix: one non-negative share per technology, summing to one.
///
/// Every [`Technology`] is always present (zero shares included) and entries are kept in enum
/// order, so two mixes can be combined entry by entry.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(
    try_from = "IndexMap<Technology, f64>",
    into = "IndexMap<Technology, f64>"
)]
pub struct TechnologyShares(IndexMap<Technology, f64>);

impl TechnologyShares {
    /// Build a mix from externally supplied shares. Technologies that are not mentioned get a zero
    /// share.
    pub fn new(shares: IndexMap<Technology, f64>) -> Result<Self, EngineError> {
        for (technology, share) in &shares {
            if !share.is_finite() || *share < 0. {
                return Err(EngineError::invalid_input(format!(
                    "Share for '{technology}' must be a non-negative number, got {share}"
                )));
            }
        }
        let mix = Self::complete(shares);
        if !sums_to_one(mix.total()) {
            return Err(EngineError::invalid_input(format!(
                "Technology shares must sum to 1, got {}",
                mix.total()
            )));
        }
        Ok(mix)
    }

    /// Build a mix from built-in reference data without checking it. Callers are covered by tests
    /// asserting the data is valid.
    pub(crate) fn from_reference_data(entries: &[(Technology, f64)]) -> Self {
        Self::complete(entries.iter().copied().collect())
    }

    fn complete(shares: IndexMap<Technology, f64>) -> Self {
        Self(
            Technology::iter()
                .map(|technology| (technology, shares.get(&technology).copied().unwrap_or(0.)))
                .collect(),
        )
    }

    pub fn get(&self, technology: Technology) -> f64 {
        self.0[&technology]
    }

    pub fn iter(&self) -> impl Iterator<Item = (Technology, f64)> + '_ {
        self.0.iter().map(|(technology, share)| (*technology, *share))
    }

    pub fn total(&self) -> f64 {
        self.0.values().sum()
    }

    /// Sum of the shares of the given technologies.
    pub fn total_of(&self, technologies: &[Technology]) -> f64 {
        technologies.iter().map(|technology| self.get(*technology)).sum()
    }

    /// Check the mix invariants on a derived mix, reporting a broken one as a consistency failure.
    pub fn verified(self) -> Result<Self, EngineError> {
        if let Some((technology, share)) = self.iter().find(|(_, share)| !(*share >= 0.)) {
            return Err(EngineError::consistency(format!(
                "Share for '{technology}' is negative or not a number ({share})"
            )));
        }
        if !sums_to_one(self.total()) {
            return Err(EngineError::consistency(format!(
                "Technology shares sum to {} rather than 1",
                self.total()
            )));
        }
        Ok(self)
    }

    /// Move linearly from this mix toward `target`; `fraction` of 0 keeps this mix, 1 gives the
    /// target. Fractions outside [0, 1] are clamped.
    pub fn interpolate(&self, target: &TechnologyShares, fraction: f64) -> Self {
        if fraction <= 0. {
            return self.clone();
        }
        if fraction >= 1. {
            return target.clone();
        }
        Self(
            self.iter()
                .map(|(technology, share)| {
                    (
                        technology,
                        share + (target.get(technology) - share) * fraction,
                    )
                })
                .collect(),
        )
    }

    /// Change the share of `technology` by `delta`, compensating in all other technologies in
    /// proportion to their existing shares.
    ///
    /// The shifted share is clipped to [0, 1]. Only the clipped amount is redistributed, so the
    /// other shares can never go negative. When every other technology has a zero share and the
    /// shifted technology gives share away, the freed share is split evenly between the others.
    pub fn shifted(&self, technology: Technology, delta: f64) -> Self {
        let current = self.get(technology);
        let target = (current + delta).clamp(0., 1.);
        let applied = target - current;
        let others_total: f64 = self
            .iter()
            .filter(|(other, _)| *other != technology)
            .map(|(_, share)| share)
            .sum();
        let other_count = (self.0.len() - 1) as f64;

        Self(
            self.iter()
                .map(|(other, share)| {
                    let new_share = if other == technology {
                        target
                    } else if others_total > 0. {
                        // rounding can leave the scale a hair below zero when others are emptied
                        share * max_of_2(1. - applied / others_total, 0.)
                    } else if applied < 0. {
                        -applied / other_count
                    } else {
                        share
                    };
                    (other, new_share)
                })
                .collect(),
        )
    }

    /// Household-weighted average of an urban and a rural mix. With no households at all the two
    /// mixes are weighted equally.
    pub fn weighted_average(
        urban: &TechnologyShares,
        urban_households: f64,
        rural: &TechnologyShares,
        rural_households: f64,
    ) -> Self {
        let total_households = urban_households + rural_households;
        let (urban_weight, rural_weight) = if total_households > 0. {
            (
                urban_households / total_households,
                rural_households / total_households,
            )
        } else {
            (0.5, 0.5)
        };

        Self(
            urban
                .iter()
                .map(|(technology, share)| {
                    (
                        technology,
                        share * urban_weight + rural.get(technology) * rural_weight,
                    )
                })
                .collect(),
        )
    }
}

impl TryFrom<IndexMap<Technology, f64>> for TechnologyShares {
    type Error = EngineError;

    fn try_from(shares: IndexMap<Technology, f64>) -> Result<Self, Self::Error> {
        Self::new(shares)
    }
}

impl From<TechnologyShares> for IndexMap<Technology, f64> {
    fn from(shares: TechnologyShares) -> Self {
        shares.0
    }
}
