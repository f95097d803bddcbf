//! Bayesian Weibull fitting
//!
//! For every pair of candidate priors `(k₀, λ₀)` the fitter finds the
//! maximum-a-posteriori Weibull parameters
//!
//! ```text
//! argmin  -( Σ_failed ln f(t) + Σ_censored ln S(t)
//!  k, λ      - (ln k - ln k₀)² / (2 σ²_k) - (ln λ - ln λ₀)² / (2 σ²_λ) )
//! ```
//!
//! with `k` and `λ` confined to the configured box, then keeps the candidate
//! whose Weibull survival curve is closest (mean squared error) to the
//! Kaplan-Meier curve on the fit grid.
//!
//! # Candidate Priors
//!
//! - Shape priors: evenly spaced over `shape_range` (default 6 values in `[1.0, 1.2]`)
//! - Scale priors: evenly spaced between two lifetime percentiles
//!   (default 8 values between P60 and P90), clamped into the scale bounds
//!
//! Each candidate is independent; the search is a plain map over the cross
//! product followed by a minimum, with no shared state.

use partcast_stats::{
    optimize::{Bounds, NelderMead},
    percentiles::Percentiles,
    sequence::linspace,
    weibull::{Lifetime, Weibull},
};
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::{ConfigError, OptimizerConfig, PriorConfig};

/// Failures at day 0 are evaluated at this lifetime so their density stays finite.
pub const MIN_LIFETIME_DAYS: f64 = 0.5;

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum FitError {
    #[display("no lifetimes to fit")]
    EmptySample,
    #[display("fit grid has {days} days but the empirical curve has {survival} points")]
    GridMismatch { days: usize, survival: usize },
    #[display("no prior candidate produced a finite posterior")]
    NoFiniteCandidate,
}

/// Candidate prior values.
#[derive(Debug, Clone, PartialEq)]
pub struct PriorGrid {
    pub shapes: Vec<f64>,
    pub scales: Vec<f64>,
}

impl PriorGrid {
    /// Builds the candidate grid from configuration and the observed lifetimes.
    pub fn new(config: &PriorConfig, lifetimes: &[f64]) -> Result<Self, FitError> {
        if lifetimes.is_empty() {
            return Err(FitError::EmptySample);
        }
        let [shape_start, shape_end] = config.shape_range;
        let shapes = linspace(shape_start, shape_end, config.shape_count);

        let [p_lo, p_hi] = config.scale_percentile_range;
        let percentiles = Percentiles::new(lifetimes, &[p_lo, p_hi]);
        let [scale_min, scale_max] = config.scale_bounds;
        let clamp = |v: Option<f64>| v.unwrap_or(scale_min).clamp(scale_min, scale_max);
        let scales = linspace(
            clamp(percentiles.get(p_lo)),
            clamp(percentiles.get(p_hi)),
            config.scale_count,
        );

        Ok(Self { shapes, scales })
    }

    /// All `(shape prior, scale prior)` pairs, shape-major.
    pub fn candidates(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.shapes
            .iter()
            .flat_map(|&k| self.scales.iter().map(move |&l| (k, l)))
    }
}

/// Best MAP fit across the prior grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WeibullFit {
    pub shape: f64,
    pub scale: f64,
    pub shape_prior: f64,
    pub scale_prior: f64,
    /// Mean squared error against the Kaplan-Meier curve on the fit grid.
    pub mse: f64,
    /// Negative log-posterior at the fitted parameters.
    pub objective: f64,
    pub converged: bool,
    /// `true` if the fit lies on a face of the parameter box.
    pub at_bound: bool,
}

impl WeibullFit {
    #[must_use]
    pub fn distribution(&self) -> Option<Weibull> {
        Weibull::new(self.shape, self.scale)
    }
}

#[derive(Debug, Clone)]
pub struct WeibullFitter {
    shape_variance: f64,
    scale_variance: f64,
    bounds: Bounds,
    optimizer: NelderMead,
}

impl WeibullFitter {
    /// Fails with the name of the inverted bound if the parameter box is empty.
    pub fn new(prior: &PriorConfig, optimizer: &OptimizerConfig) -> Result<Self, ConfigError> {
        let [shape_lo, shape_hi] = prior.shape_bounds;
        let [scale_lo, scale_hi] = prior.scale_bounds;
        let bounds = Bounds::new(vec![shape_lo, scale_lo], vec![shape_hi, scale_hi]).ok_or_else(
            || {
                let (field, [start, end]) = if shape_lo <= shape_hi {
                    ("prior.scale_bounds", prior.scale_bounds)
                } else {
                    ("prior.shape_bounds", prior.shape_bounds)
                };
                ConfigError::InvertedRange { field, start, end }
            },
        )?;
        Ok(Self {
            shape_variance: prior.shape_variance,
            scale_variance: prior.scale_variance,
            bounds,
            optimizer: optimizer.nelder_mead(),
        })
    }

    /// Negative log-posterior; `+∞` for non-positive parameters.
    #[must_use]
    pub fn neg_log_posterior(
        &self,
        data: &[Lifetime],
        shape: f64,
        scale: f64,
        prior: (f64, f64),
    ) -> f64 {
        let Some(dist) = Weibull::new(shape, scale) else {
            return f64::INFINITY;
        };
        let (shape_prior, scale_prior) = prior;
        let log_prior = -(shape.ln() - shape_prior.ln()).powi(2) / (2.0 * self.shape_variance)
            - (scale.ln() - scale_prior.ln()).powi(2) / (2.0 * self.scale_variance);
        -(dist.log_likelihood(data, MIN_LIFETIME_DAYS) + log_prior)
    }

    /// Finds the best MAP fit over every candidate prior pair.
    ///
    /// `fit_days` and `km_survival` are the Kaplan-Meier curve on the fit grid.
    /// Ties in error keep the earlier candidate.
    pub fn fit(
        &self,
        data: &[Lifetime],
        fit_days: &[f64],
        km_survival: &[f64],
        priors: &PriorGrid,
    ) -> Result<WeibullFit, FitError> {
        if data.is_empty() {
            return Err(FitError::EmptySample);
        }
        if fit_days.len() != km_survival.len() {
            return Err(FitError::GridMismatch {
                days: fit_days.len(),
                survival: km_survival.len(),
            });
        }

        let best = priors
            .candidates()
            .filter_map(|prior| self.fit_candidate(data, fit_days, km_survival, prior))
            .fold(None::<WeibullFit>, |best, fit| match best {
                Some(b) if b.mse <= fit.mse => Some(b),
                _ => Some(fit),
            })
            .ok_or(FitError::NoFiniteCandidate)?;

        if !best.converged {
            warn!(
                shape = best.shape,
                scale = best.scale,
                "selected Weibull fit did not converge"
            );
        }
        Ok(best)
    }

    fn fit_candidate(
        &self,
        data: &[Lifetime],
        fit_days: &[f64],
        km_survival: &[f64],
        prior: (f64, f64),
    ) -> Option<WeibullFit> {
        let objective = |x: &[f64]| self.neg_log_posterior(data, x[0], x[1], prior);
        let min = self
            .optimizer
            .minimize(objective, &[prior.0, prior.1], &self.bounds);
        if !min.value.is_finite() {
            debug!(
                shape_prior = prior.0,
                scale_prior = prior.1,
                "candidate has no finite posterior"
            );
            return None;
        }

        let dist = Weibull::new(min.point[0], min.point[1])?;
        let mse = mean_squared_error(&dist, fit_days, km_survival);
        debug!(
            shape_prior = prior.0,
            scale_prior = prior.1,
            shape = dist.shape(),
            scale = dist.scale(),
            mse,
            iterations = min.iterations,
            converged = min.converged,
            "evaluated prior candidate"
        );

        Some(WeibullFit {
            shape: dist.shape(),
            scale: dist.scale(),
            shape_prior: prior.0,
            scale_prior: prior.1,
            mse,
            objective: min.value,
            converged: min.converged,
            at_bound: self.bounds.touches(&min.point),
        })
    }
}

#[expect(clippy::cast_precision_loss)]
fn mean_squared_error(dist: &Weibull, days: &[f64], survival: &[f64]) -> f64 {
    if days.is_empty() {
        return 0.0;
    }
    let sum = days
        .iter()
        .zip(survival)
        .map(|(&d, &s)| (dist.survival(d) - s).powi(2))
        .sum::<f64>();
    sum / days.len() as f64
}

#[cfg(test)]
mod tests {
    use rand::{Rng as _, SeedableRng as _};
    use rand_pcg::Pcg64;

    use super::*;
    use crate::{config::GridConfig, estimator::EmpiricalSurvival, grid::MonthGrid};
    use partcast_stats::survival::KaplanMeierCurve;

    fn fitter() -> WeibullFitter {
        WeibullFitter::new(&PriorConfig::default(), &OptimizerConfig::default()).unwrap()
    }

    /// Synthetic Weibull lifetimes censored at `censor_at` days.
    fn sample(shape: f64, scale: f64, n: usize, censor_at: f64, seed: u64) -> Vec<Lifetime> {
        let mut rng = Pcg64::seed_from_u64(seed);
        (0..n)
            .map(|_| {
                let u: f64 = rng.random_range(f64::EPSILON..1.0);
                let t = scale * (-u.ln()).powf(1.0 / shape);
                Lifetime {
                    time: t.min(censor_at).floor(),
                    observed: t < censor_at,
                }
            })
            .collect()
    }

    #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn km_inputs(data: &[Lifetime]) -> EmpiricalSurvival {
        let samples = data
            .iter()
            .map(|l| (l.time as usize, !l.observed))
            .collect();
        let curve = KaplanMeierCurve::from_data(samples);
        EmpiricalSurvival::from_curve(&curve, &MonthGrid::new(&GridConfig::default()), 1.96)
    }

    #[test]
    fn test_prior_grid_defaults() {
        let lifetimes = (1..=100).map(f64::from).collect::<Vec<_>>();
        let priors = PriorGrid::new(&PriorConfig::default(), &lifetimes).unwrap();
        assert_eq!(priors.shapes.len(), 6);
        assert_eq!(priors.scales.len(), 8);
        assert!((priors.shapes[0] - 1.0).abs() < 1e-12);
        assert!((priors.shapes[5] - 1.2).abs() < 1e-12);
        assert!((priors.scales[0] - 60.4).abs() < 1e-9);
        assert!((priors.scales[7] - 90.1).abs() < 1e-9);
        assert_eq!(priors.candidates().count(), 48);
    }

    #[test]
    fn test_prior_scales_clamped_to_bounds() {
        let lifetimes = vec![1.0, 2.0, 3.0];
        let priors = PriorGrid::new(&PriorConfig::default(), &lifetimes).unwrap();
        assert!(priors.scales.iter().all(|&s| s == 10.0));
    }

    #[test]
    fn test_inverted_bounds_name_the_field() {
        let optimizer = OptimizerConfig::default();
        let mut prior = PriorConfig::default();
        prior.scale_bounds = [500.0, 50.0];
        assert!(matches!(
            WeibullFitter::new(&prior, &optimizer),
            Err(ConfigError::InvertedRange {
                field: "prior.scale_bounds",
                ..
            })
        ));

        prior.scale_bounds = PriorConfig::default().scale_bounds;
        prior.shape_bounds = [5.0, 1.0];
        assert!(matches!(
            WeibullFitter::new(&prior, &optimizer),
            Err(ConfigError::InvertedRange {
                field: "prior.shape_bounds",
                ..
            })
        ));
    }

    #[test]
    fn test_empty_sample() {
        assert!(matches!(
            PriorGrid::new(&PriorConfig::default(), &[]),
            Err(FitError::EmptySample)
        ));
        let priors = PriorGrid {
            shapes: vec![1.0],
            scales: vec![100.0],
        };
        assert!(matches!(
            fitter().fit(&[], &[0.0], &[1.0], &priors),
            Err(FitError::EmptySample)
        ));
    }

    #[test]
    fn test_non_positive_parameters_are_infinite() {
        let data = [Lifetime {
            time: 10.0,
            observed: true,
        }];
        let f = fitter();
        assert_eq!(f.neg_log_posterior(&data, 0.0, 100.0, (1.0, 100.0)), f64::INFINITY);
        assert_eq!(f.neg_log_posterior(&data, 1.0, -5.0, (1.0, 100.0)), f64::INFINITY);
        assert!(f.neg_log_posterior(&data, 1.0, 100.0, (1.0, 100.0)).is_finite());
    }

    #[test]
    fn test_recovers_parameters_from_synthetic_sample() {
        let data = sample(1.5, 400.0, 3000, 900.0, 42);
        let km = km_inputs(&data);
        let lifetimes = data.iter().map(|l| l.time).collect::<Vec<_>>();
        let priors = PriorGrid::new(&PriorConfig::default(), &lifetimes).unwrap();

        let fit = fitter()
            .fit(&data, &km.fit_days, &km.fit_survival, &priors)
            .unwrap();
        assert!(fit.mse < 1e-3, "mse {}", fit.mse);
        assert!((fit.shape - 1.5).abs() < 0.25, "shape {}", fit.shape);
        assert!((fit.scale - 400.0).abs() < 60.0, "scale {}", fit.scale);
        assert!(fit.shape >= 0.1 && fit.shape <= 10.0);
        assert!(fit.scale >= 10.0 && fit.scale <= 10_000.0);
    }

    #[test]
    fn test_zero_failures_still_fits() {
        let data = (0..50)
            .map(|i| Lifetime {
                time: f64::from(100 + i),
                observed: false,
            })
            .collect::<Vec<_>>();
        let km = km_inputs(&data);
        assert_eq!(km.fit_survival, vec![1.0]);
        let lifetimes = data.iter().map(|l| l.time).collect::<Vec<_>>();
        let priors = PriorGrid::new(&PriorConfig::default(), &lifetimes).unwrap();

        let fit = fitter()
            .fit(&data, &km.fit_days, &km.fit_survival, &priors)
            .unwrap();
        assert_eq!(fit.mse, 0.0);
        // ties keep the first candidate
        assert_eq!(fit.shape_prior, 1.0);
        assert_eq!(fit.scale_prior, priors.scales[0]);
        assert!(fit.distribution().unwrap().survival(0.0) >= 1.0);
    }

    #[test]
    fn test_grid_mismatch() {
        let data = [Lifetime {
            time: 10.0,
            observed: true,
        }];
        let priors = PriorGrid {
            shapes: vec![1.0],
            scales: vec![100.0],
        };
        assert!(matches!(
            fitter().fit(&data, &[0.0, 1.0], &[1.0], &priors),
            Err(FitError::GridMismatch { days: 2, survival: 1 })
        ));
    }
}
