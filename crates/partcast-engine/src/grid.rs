//! Canonical time grids
//!
//! All curves are resampled onto the same month grid so that Kaplan-Meier,
//! Weibull and their bands line up index for index:
//!
//! ```text
//! index:  0     1      2      ...  36
//! month:  0     1      2      ...  36
//! day:    0.0   30.44  60.88  ...  1095.84
//! ```

use crate::config::GridConfig;

#[derive(Debug, Clone, PartialEq)]
pub struct MonthGrid {
    months: Vec<u32>,
    days: Vec<f64>,
}

impl MonthGrid {
    #[must_use]
    pub fn new(config: &GridConfig) -> Self {
        let months = (0..=config.max_month).collect::<Vec<_>>();
        let days = months
            .iter()
            .map(|&m| f64::from(m) * config.days_per_month)
            .collect();
        Self { months, days }
    }

    #[must_use]
    pub fn months(&self) -> &[u32] {
        &self.months
    }

    #[must_use]
    pub fn days(&self) -> &[f64] {
        &self.days
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.months.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.months.is_empty()
    }

    /// Grid index of `month`, or `None` beyond the last month.
    #[must_use]
    pub fn index_of(&self, month: u32) -> Option<usize> {
        self.months.binary_search(&month).ok()
    }
}

/// Whole-day grid `0..=last_failure_day` on which the Weibull fit is compared
/// with the empirical curve; just `[0]` when no failure was observed.
#[must_use]
pub fn fit_days(last_failure_day: Option<usize>) -> Vec<usize> {
    (0..=last_failure_day.unwrap_or(0)).collect()
}

/// Step-function lookup day for a fractional grid day.
#[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
#[must_use]
pub fn lookup_day(day: f64) -> usize {
    day.max(0.0).floor() as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_grid_has_37_points() {
        let grid = MonthGrid::new(&GridConfig::default());
        assert_eq!(grid.len(), 37);
        assert_eq!(grid.index_of(36), Some(36));
        assert_eq!(grid.index_of(37), None);
        assert!((grid.days()[12] - 365.28).abs() < 1e-9);
    }

    #[test]
    fn test_fit_days() {
        assert_eq!(fit_days(None), vec![0]);
        assert_eq!(fit_days(Some(3)), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_lookup_day_floors() {
        assert_eq!(lookup_day(30.44), 30);
        assert_eq!(lookup_day(0.0), 0);
        assert_eq!(lookup_day(-1.0), 0);
    }
}
