use crate::core::demand::{HouseholdCounts, HouseholdTable};
use anyhow::{anyhow, bail, Context};
use csv::{ReaderBuilder as CsvReaderBuilder, Trim};
use serde::Deserialize;
use std::io::Read;

/// A row of the household projection table. Counts may be written as whole floats
/// (e.g. `12500.0`) by the tools that produce these tables.
#[derive(Debug, Deserialize)]
struct HouseholdRow {
    #[serde(rename = "District")]
    district: String,
    #[serde(rename = "Year")]
    year: i32,
    #[serde(rename = "Urban_Households")]
    urban_households: f64,
    #[serde(rename = "Rural_Households")]
    rural_households: f64,
}

/// Read household projections from CSV with columns
/// `District, Year, Urban_Households, Rural_Households` (in any order, surrounding whitespace
/// ignored).
///
/// Shape problems (missing columns, unparseable values, fractional counts, duplicate rows) fail
/// the whole read. Negative counts are kept, and rejected later for the affected district and
/// year only.
pub fn read_households_csv(source: impl Read) -> anyhow::Result<HouseholdTable> {
    let mut reader = CsvReaderBuilder::new().trim(Trim::All).from_reader(source);
    let mut table = HouseholdTable::new();

    for (i, result) in reader.deserialize::<HouseholdRow>().enumerate() {
        // header is line 1
        let line = i + 2;
        let row = result.with_context(|| format!("Could not read household row on line {line}"))?;
        let counts = HouseholdCounts {
            urban: whole_count(row.urban_households)
                .with_context(|| format!("Urban household count on line {line}"))?,
            rural: whole_count(row.rural_households)
                .with_context(|| format!("Rural household count on line {line}"))?,
        };
        table
            .insert(row.district, row.year, counts)
            .map_err(|e| anyhow!("Line {line}: {e}"))?;
    }

    if table.is_empty() {
        bail!("Household projection table has no rows");
    }

    Ok(table)
}

fn whole_count(value: f64) -> anyhow::Result<i64> {
    if !value.is_finite() || value.fract() != 0. {
        bail!("{value} is not a whole number of households");
    }
    // i64::MAX rounds up to 2^63 as a float, so the upper bound is exclusive
    if value >= i64::MAX as f64 || value < i64::MIN as f64 {
        bail!("{value} households is outside the supported range");
    }
    Ok(value as i64)
}
