//! Risk-set horizon
//!
//! The risk set at month `m` is the number of units whose lifetime reaches at
//! least `m` months (failed or censored at or after that day). Estimates are
//! trusted only while the risk set stays at or above a threshold; the last such
//! month is the *reliable horizon*.

use crate::grid::MonthGrid;

/// Risk-set size at every grid month. The series is non-increasing.
///
/// # Examples
///
/// ```
/// use partcast_engine::{config::GridConfig, grid::MonthGrid, risk_set::risk_set_counts};
///
/// let grid = MonthGrid::new(&GridConfig { max_month: 2, days_per_month: 30.0 });
/// assert_eq!(risk_set_counts(&[0, 15, 30, 45, 90], &grid), vec![5, 3, 1]);
/// ```
#[must_use]
pub fn risk_set_counts(lifetimes: &[u32], grid: &MonthGrid) -> Vec<usize> {
    let mut sorted = lifetimes.to_vec();
    sorted.sort_unstable();
    grid.days()
        .iter()
        .map(|&day| sorted.len() - sorted.partition_point(|&l| f64::from(l) < day))
        .collect()
}

/// Last month whose risk set is at least `threshold`, or 0 if none is.
///
/// # Examples
///
/// ```
/// use partcast_engine::risk_set::reliable_horizon;
///
/// let counts = [1200, 1100, 900, 800];
/// let months = [0, 6, 12, 18];
/// assert_eq!(reliable_horizon(&counts, &months, 1000), 6);
/// assert_eq!(reliable_horizon(&counts, &months, 5000), 0);
/// ```
#[must_use]
pub fn reliable_horizon(counts: &[usize], months: &[u32], threshold: usize) -> u32 {
    counts
        .iter()
        .zip(months)
        .filter(|&(&count, _)| count >= threshold)
        .map(|(_, &month)| month)
        .last()
        .unwrap_or(0)
}
