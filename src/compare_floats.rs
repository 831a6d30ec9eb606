/// Absolute tolerance on a set of technology shares summing to one.
pub const SHARE_TOLERANCE: f64 = 1e-6;

/// Relative tolerance when comparing delivered energy against demand.
pub const ENERGY_REL_TOLERANCE: f64 = 1e-6;

/// Absolute floor for energy comparisons, so zero-demand districts compare cleanly.
pub const ENERGY_ABS_TOLERANCE: f64 = 1e-9;

pub fn min_of_2<T: PartialOrd + Copy>(first: T, second: T) -> T {
    if first < second {
        first
    } else {
        second
    }
}

pub fn max_of_2<T: PartialOrd + Copy>(first: T, second: T) -> T {
    if first > second {
        first
    } else {
        second
    }
}

/// Whether `total` is one within the share tolerance.
pub(crate) fn sums_to_one(total: f64) -> bool {
    is_close!(total, 1.0, abs_tol = SHARE_TOLERANCE)
}

/// Whether an energy total matches its expected value within relative tolerance.
pub(crate) fn energy_matches(actual: f64, expected: f64) -> bool {
    is_close!(
        actual,
        expected,
        rel_tol = ENERGY_REL_TOLERANCE,
        abs_tol = ENERGY_ABS_TOLERANCE
    )
}
