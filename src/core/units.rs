pub const KILOWATT_HOURS_PER_GIGAJOULE: f64 = 277.778;
pub const KILOGRAMS_PER_TONNE: f64 = 1_000.;
pub const GIGAJOULES_PER_MTOE: f64 = 41_868_000.;
pub const YEARS_PER_DECADE: i32 = 10;

pub(crate) fn kilograms_to_tonnes(mass_kg: f64) -> f64 {
    mass_kg / KILOGRAMS_PER_TONNE
}

pub(crate) fn gigajoules_to_mtoe(energy_gj: f64) -> f64 {
    energy_gj / GIGAJOULES_PER_MTOE
}

/// Capital recovery factor: the share of an upfront cost repaid each year over `lifetime_years`
/// at `discount_rate`. Falls back to straight-line amortisation when the rate is zero.
pub(crate) fn capital_recovery_factor(discount_rate: f64, lifetime_years: u32) -> f64 {
    let n = lifetime_years as i32;
    if discount_rate == 0. {
        return 1. / lifetime_years as f64;
    }
    let growth = (1. + discount_rate).powi(n);
    discount_rate * growth / (growth - 1.)
}

/// Discount factor for a value incurred `years_elapsed` after the base year.
pub(crate) fn discount_factor(discount_rate: f64, years_elapsed: i32) -> f64 {
    1. / (1. + discount_rate).powi(years_elapsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::*;

    #[rstest]
    fn should_convert_energy_units() {
        assert_relative_eq!(gigajoules_to_mtoe(41_868_000. * 3.), 3.);
        assert_relative_eq!(kilograms_to_tonnes(2_500.), 2.5);
    }

    #[rstest]
    fn should_calc_capital_recovery_factor() {
        // standard annuity factor for 5% over 15 years
        assert_relative_eq!(
            capital_recovery_factor(0.05, 15),
            0.09634228760924432,
            max_relative = 1e-12
        );
        assert_relative_eq!(capital_recovery_factor(0., 15), 1. / 15.);
    }

    #[rstest]
    fn should_calc_discount_factor() {
        assert_relative_eq!(discount_factor(0.05, 0), 1.);
        assert_relative_eq!(
            discount_factor(0.05, 5),
            1. / 1.2762815625,
            max_relative = 1e-12
        );
    }
}
