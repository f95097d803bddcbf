//! Failure-probability projections
//!
//! Curves are computed as survival probabilities; projections report the
//! probability of failure `1 - S(t)`. Converting a band swaps its ends:
//!
//! ```text
//! failure.lower = 1 - survival.upper
//! failure.upper = 1 - survival.lower
//! ```

use serde::Serialize;

use crate::{estimator::BandedCurve, fitter::WeibullFit, grid::MonthGrid};

/// Label of the horizon at the reliable month.
pub const RELIABLE_LABEL: &str = "reliable";

/// A failure probability with its band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Estimate {
    pub value: f64,
    pub lower: f64,
    pub upper: f64,
}

impl Estimate {
    /// Converts a survival value and band into a failure probability and band.
    ///
    /// # Examples
    ///
    /// ```
    /// use partcast_engine::projection::Estimate;
    ///
    /// let e = Estimate::failure_from_survival(0.75, 0.5, 1.0);
    /// assert_eq!(e, Estimate { value: 0.25, lower: 0.0, upper: 0.5 });
    /// ```
    #[must_use]
    pub fn failure_from_survival(survival: f64, lower: f64, upper: f64) -> Self {
        Self {
            value: 1.0 - survival,
            lower: 1.0 - upper,
            upper: 1.0 - lower,
        }
    }

    fn from_curve(curve: &BandedCurve, index: usize) -> Option<Self> {
        let (s, lo, hi) = curve.at(index)?;
        Some(Self::failure_from_survival(s, lo, hi))
    }
}

/// Projections of both estimators at one horizon.
///
/// Both estimates are `None` when the month lies beyond the grid.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HorizonProjection {
    pub label: String,
    pub month: u32,
    pub km: Option<Estimate>,
    pub weibull: Option<Estimate>,
}

#[must_use]
pub fn project_horizon(
    label: impl Into<String>,
    month: u32,
    grid: &MonthGrid,
    km: &BandedCurve,
    weibull: &BandedCurve,
) -> HorizonProjection {
    let index = grid.index_of(month);
    HorizonProjection {
        label: label.into(),
        month,
        km: index.and_then(|i| Estimate::from_curve(km, i)),
        weibull: index.and_then(|i| Estimate::from_curve(weibull, i)),
    }
}

/// Parameters of the selected Weibull fit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FitSummary {
    pub shape: f64,
    pub scale: f64,
    pub shape_prior: f64,
    pub scale_prior: f64,
    pub mse: f64,
    pub converged: bool,
    pub at_bound: bool,
}

impl From<&WeibullFit> for FitSummary {
    fn from(fit: &WeibullFit) -> Self {
        Self {
            shape: fit.shape,
            scale: fit.scale,
            shape_prior: fit.shape_prior,
            scale_prior: fit.scale_prior,
            mse: fit.mse,
            converged: fit.converged,
            at_bound: fit.at_bound,
        }
    }
}

/// Forecast for one (model, group key) pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectionRecord {
    pub key: String,
    /// Chart file name relative to the chart directory.
    pub chart: Option<String>,
    /// Why the chart could not be written, when it could not.
    pub chart_error: Option<String>,
    pub reliable_horizon_month: u32,
    /// Fixed horizons in configured order, then the reliable horizon.
    pub horizons: Vec<HorizonProjection>,
    pub fit: FitSummary,
    pub units: usize,
    pub failures: usize,
    /// Kaplan-Meier median lifetime in days, if survival drops to 0.5.
    pub km_median_days: Option<f64>,
}

impl ProjectionRecord {
    #[must_use]
    pub fn horizon(&self, label: &str) -> Option<&HorizonProjection> {
        self.horizons.iter().find(|h| h.label == label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GridConfig;

    fn curve(len: usize) -> BandedCurve {
        #[expect(clippy::cast_precision_loss)]
        let survival = (0..len)
            .map(|i| 1.0 - i as f64 / 100.0)
            .collect::<Vec<_>>();
        BandedCurve {
            lower: survival.iter().map(|s| s - 0.05).collect(),
            upper: survival.iter().map(|s| (s + 0.05_f64).min(1.0)).collect(),
            survival,
        }
    }

    #[test]
    fn test_last_grid_month_is_in_range() {
        let grid = MonthGrid::new(&GridConfig::default());
        let c = curve(grid.len());
        let p = project_horizon("36", 36, &grid, &c, &c);
        let km = p.km.unwrap();
        assert!((km.value - 0.36).abs() < 1e-12);
        assert!((km.lower - 0.31).abs() < 1e-12);
        assert!((km.upper - 0.41).abs() < 1e-12);
        assert!(p.weibull.is_some());
    }

    #[test]
    fn test_beyond_grid_is_absent() {
        let grid = MonthGrid::new(&GridConfig::default());
        let c = curve(grid.len());
        let p = project_horizon("48", 48, &grid, &c, &c);
        assert_eq!(p.month, 48);
        assert_eq!(p.km, None);
        assert_eq!(p.weibull, None);
    }

    #[test]
    fn test_short_curve_is_absent_not_panicking() {
        let grid = MonthGrid::new(&GridConfig::default());
        let p = project_horizon(RELIABLE_LABEL, 20, &grid, &curve(10), &curve(37));
        assert_eq!(p.km, None);
        assert!(p.weibull.is_some());
    }

    #[test]
    fn test_inverted_band_is_ordered() {
        let grid = MonthGrid::new(&GridConfig::default());
        let c = curve(grid.len());
        for &month in grid.months() {
            let e = project_horizon("m", month, &grid, &c, &c).km.unwrap();
            assert!(e.lower <= e.value && e.value <= e.upper);
        }
    }
}
