//! Household cooking energy demand: district household counts turned into annual GJ totals, and
//! an optional sub-annual split of those totals along an external weighting curve.

use crate::errors::EngineError;
use chrono::NaiveDateTime;
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use serde_valid::Validate;

/// Annual cooking energy needed by one household, in GJ.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct HouseholdIntensities {
    #[validate(minimum = 0.)]
    pub urban_gj_per_household: f64,
    #[validate(minimum = 0.)]
    pub rural_gj_per_household: f64,
}

impl Default for HouseholdIntensities {
    fn default() -> Self {
        Self {
            urban_gj_per_household: 6.5,
            rural_gj_per_household: 5.5,
        }
    }
}

/// Household counts for one district in one year, as supplied. Counts are signed so that bad
/// input can be carried through to the point where it is rejected.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct HouseholdCounts {
    pub urban: i64,
    pub rural: i64,
}

/// Household counts indexed by (district, year), in the order they were supplied.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HouseholdTable {
    rows: IndexMap<(String, i32), HouseholdCounts>,
}

impl HouseholdTable {
    pub fn new() -> Self {
        Default::default()
    }

    /// Add counts for a district and year. A second row for the same pair is rejected.
    pub fn insert(
        &mut self,
        district: impl Into<String>,
        year: i32,
        counts: HouseholdCounts,
    ) -> Result<(), EngineError> {
        let district = district.into();
        if district.trim().is_empty() {
            return Err(EngineError::invalid_input("District name must not be empty"));
        }
        if self.rows.contains_key(&(district.clone(), year)) {
            return Err(EngineError::invalid_input(format!(
                "Duplicate household row for district '{district}' in {year}"
            )));
        }
        self.rows.insert((district, year), counts);
        Ok(())
    }

    pub fn get(&self, district: &str, year: i32) -> Option<HouseholdCounts> {
        self.rows.get(&(district.to_string(), year)).copied()
    }

    /// Distinct district names in first-seen order.
    pub fn districts(&self) -> Vec<String> {
        self.rows
            .keys()
            .map(|(district, _)| district.clone())
            .collect::<IndexSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DemandRecord {
    pub district: String,
    pub year: i32,
    pub urban_households: u64,
    pub rural_households: u64,
    /// Total annual cooking demand in GJ.
    pub total_gj: f64,
}

impl DemandRecord {
    pub fn households(&self) -> u64 {
        self.urban_households + self.rural_households
    }

    /// Mean annual demand of one household in this district and year. With no households the
    /// simple mean of the two intensities is used so that levelised costs stay defined.
    pub fn average_household_demand_gj(&self, intensities: &HouseholdIntensities) -> f64 {
        match self.households() {
            0 => (intensities.urban_gj_per_household + intensities.rural_gj_per_household) / 2.,
            households => self.total_gj / households as f64,
        }
    }
}

/// Total annual cooking demand for a district and year.
pub fn project_demand(
    households: &HouseholdTable,
    district: &str,
    year: i32,
    intensities: &HouseholdIntensities,
) -> Result<DemandRecord, EngineError> {
    let counts = households.get(district, year).ok_or_else(|| {
        EngineError::invalid_input(format!(
            "No household data for district '{district}' in {year}"
        ))
    })?;
    let urban_households = non_negative_count(counts.urban, "urban", district, year)?;
    let rural_households = non_negative_count(counts.rural, "rural", district, year)?;

    Ok(DemandRecord {
        district: district.to_string(),
        year,
        urban_households,
        rural_households,
        total_gj: urban_households as f64 * intensities.urban_gj_per_household
            + rural_households as f64 * intensities.rural_gj_per_household,
    })
}

fn non_negative_count(
    count: i64,
    label: &str,
    district: &str,
    year: i32,
) -> Result<u64, EngineError> {
    u64::try_from(count).map_err(|_| {
        EngineError::invalid_input(format!(
            "Negative {label} household count ({count}) for district '{district}' in {year}"
        ))
    })
}

/// Split an annual total across the timestamps of a weighting curve, in proportion to each
/// weight. The result has the same keys as the curve and sums to the annual total.
pub fn disaggregate(
    annual_gj: f64,
    curve: &IndexMap<NaiveDateTime, f64>,
) -> Result<IndexMap<NaiveDateTime, f64>, EngineError> {
    if !annual_gj.is_finite() || annual_gj < 0. {
        return Err(EngineError::invalid_input(format!(
            "Annual demand must be a non-negative number, got {annual_gj}"
        )));
    }
    if curve.is_empty() {
        return Err(EngineError::invalid_input("Weighting curve is empty"));
    }
    if let Some((timestamp, weight)) = curve
        .iter()
        .find(|(_, weight)| !weight.is_finite() || **weight < 0.)
    {
        return Err(EngineError::invalid_input(format!(
            "Weighting curve has invalid weight {weight} at {timestamp}"
        )));
    }
    let total_weight: f64 = curve.values().sum();
    if total_weight <= 0. {
        return Err(EngineError::invalid_input("Weighting curve sums to zero"));
    }

    Ok(curve
        .iter()
        .map(|(timestamp, weight)| (*timestamp, annual_gj * weight / total_weight))
        .collect())
}
