//! Kaplan-Meier resampling
//!
//! The Kaplan-Meier curve is a step function defined only at observed event
//! times. It is held at 1 before the first event and at its last value after
//! the last event, then sampled twice:
//!
//! - on the whole-day fit grid (up to the last failure), to score Weibull fits
//! - on the canonical month grid, with its confidence band, for reporting

use partcast_stats::survival::KaplanMeierCurve;
use serde::Serialize;

use crate::grid::{self, MonthGrid};

/// A survival curve and its two-sided confidence band sampled on a grid.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BandedCurve {
    pub survival: Vec<f64>,
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

impl BandedCurve {
    #[must_use]
    pub fn len(&self) -> usize {
        self.survival.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.survival.is_empty()
    }

    /// `(survival, lower, upper)` at grid index `i`.
    #[must_use]
    pub fn at(&self, i: usize) -> Option<(f64, f64, f64)> {
        Some((
            *self.survival.get(i)?,
            *self.lower.get(i)?,
            *self.upper.get(i)?,
        ))
    }

    /// Smallest lower-band value, or 1.0 for an empty curve.
    #[must_use]
    pub fn floor(&self) -> f64 {
        self.lower.iter().copied().fold(1.0, f64::min)
    }
}

/// Kaplan-Meier curve sampled for fitting and for reporting.
#[derive(Debug, Clone)]
pub struct EmpiricalSurvival {
    /// Days of the fit grid.
    pub fit_days: Vec<f64>,
    /// Kaplan-Meier survival on the fit grid.
    pub fit_survival: Vec<f64>,
    /// Kaplan-Meier survival and band on the canonical grid.
    pub canonical: BandedCurve,
}

impl EmpiricalSurvival {
    /// Resamples `curve` onto the fit grid and onto `grid`.
    ///
    /// `z` is the standard normal quantile of the band.
    #[must_use]
    pub fn from_curve(curve: &KaplanMeierCurve, grid: &MonthGrid, z: f64) -> Self {
        let fit = grid::fit_days(curve.last_event_time());
        #[expect(clippy::cast_precision_loss)]
        let fit_days = fit.iter().map(|&d| d as f64).collect();
        let fit_survival = fit.iter().map(|&d| curve.survival_at(d)).collect();

        let mut canonical = BandedCurve {
            survival: Vec::with_capacity(grid.len()),
            lower: Vec::with_capacity(grid.len()),
            upper: Vec::with_capacity(grid.len()),
        };
        for &day in grid.days() {
            let day = grid::lookup_day(day);
            let (lower, upper) = curve.band_at(day, z);
            canonical.survival.push(curve.survival_at(day));
            canonical.lower.push(lower);
            canonical.upper.push(upper);
        }

        Self {
            fit_days,
            fit_survival,
            canonical,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GridConfig;

    fn grid() -> MonthGrid {
        MonthGrid::new(&GridConfig::default())
    }

    #[test]
    fn test_all_censored_is_flat_one() {
        let curve = KaplanMeierCurve::from_data(vec![(100, true), (200, true), (300, true)]);
        let est = EmpiricalSurvival::from_curve(&curve, &grid(), 1.96);
        assert_eq!(est.fit_days, vec![0.0]);
        assert_eq!(est.fit_survival, vec![1.0]);
        assert_eq!(est.canonical.len(), 37);
        assert!(est.canonical.survival.iter().all(|&s| s == 1.0));
        assert!(est.canonical.lower.iter().all(|&s| s == 1.0));
    }

    #[test]
    fn test_held_flat_outside_support() {
        let data = (0..100)
            .map(|i| (40 + i, i % 2 == 0))
            .collect::<Vec<_>>();
        let curve = KaplanMeierCurve::from_data(data);
        let est = EmpiricalSurvival::from_curve(&curve, &grid(), 1.96);

        // before the first event (day 41)
        assert_eq!(est.canonical.at(1), Some((1.0, 1.0, 1.0)));
        // after the last event (day 139) the last value is held
        let last = curve.survival_at(139);
        assert!(est.canonical.survival[10..].iter().all(|&s| s == last));
        assert_eq!(est.fit_days.len(), 140);
        assert_eq!(est.fit_survival.last().copied(), Some(last));
    }

    #[test]
    fn test_band_ordering() {
        let data = (0..500)
            .map(|i| (i * 2 % 900, i % 3 != 0))
            .collect::<Vec<_>>();
        let curve = KaplanMeierCurve::from_data(data);
        let est = EmpiricalSurvival::from_curve(&curve, &grid(), 1.96);
        for i in 0..est.canonical.len() {
            let (s, lo, hi) = est.canonical.at(i).unwrap();
            assert!(lo <= s && s <= hi, "index {i}: {lo} <= {s} <= {hi}");
        }
        assert_eq!(est.canonical.at(37), None);
    }
}
