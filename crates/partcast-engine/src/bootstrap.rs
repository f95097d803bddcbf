//! Parametric bootstrap band for a fitted Weibull curve
//!
//! Parameter pairs are drawn from normal distributions centred on the fitted
//! shape and scale, every drawn curve is evaluated on the canonical grid, and
//! the band is the pair of configured percentiles across draws at each point.
//!
//! # Draws
//!
//! - shape `k ~ N(k̂, sqrt(shape_variance))`
//! - scale `λ ~ N(λ̂, σ_λ)` where `σ_λ` is `sqrt(scale_variance)` days
//!   ([`ScaleSpread::Absolute`]) or `sqrt(scale_variance) · λ̂`
//!   ([`ScaleSpread::Relative`])
//!
//! Non-positive draws are discarded and each parameter's surviving pool is
//! resampled with replacement back up to the requested sample count. An empty
//! pool falls back to the point estimate.

use partcast_stats::{percentiles::compute_percentile, weibull::Weibull};
use rand::{Rng, seq::IndexedRandom as _};
use rand_distr::{Distribution as _, Normal};
use tracing::debug;

use crate::{
    config::{BootstrapConfig, PriorConfig, ScaleSpread},
    estimator::BandedCurve,
};

#[derive(Debug, Clone)]
pub struct BootstrapBander {
    samples: usize,
    band_percentiles: [f64; 2],
    shape_sd: f64,
    scale_sd: f64,
    scale_spread: ScaleSpread,
}

impl BootstrapBander {
    #[must_use]
    pub fn new(config: &BootstrapConfig, prior: &PriorConfig) -> Self {
        Self {
            samples: config.samples,
            band_percentiles: config.band_percentiles,
            shape_sd: prior.shape_variance.sqrt(),
            scale_sd: prior.scale_variance.sqrt(),
            scale_spread: config.scale_spread,
        }
    }

    /// Point curve of `fit` on `days` with its bootstrap band.
    ///
    /// The band always encloses the point curve: `lower <= survival <= upper`.
    pub fn band<R>(&self, fit: &Weibull, days: &[f64], rng: &mut R) -> BandedCurve
    where
        R: Rng + ?Sized,
    {
        let scale_sd = match self.scale_spread {
            ScaleSpread::Absolute => self.scale_sd,
            ScaleSpread::Relative => self.scale_sd * fit.scale(),
        };
        let shapes = self.draw_positive(fit.shape(), self.shape_sd, rng);
        let scales = self.draw_positive(fit.scale(), scale_sd, rng);

        let curves = shapes
            .iter()
            .zip(&scales)
            .filter_map(|(&k, &l)| Weibull::new(k, l))
            .map(|dist| days.iter().map(|&d| dist.survival(d)).collect::<Vec<_>>())
            .collect::<Vec<_>>();

        let [p_lo, p_hi] = self.band_percentiles;
        let mut band = BandedCurve {
            survival: Vec::with_capacity(days.len()),
            lower: Vec::with_capacity(days.len()),
            upper: Vec::with_capacity(days.len()),
        };
        let mut column = Vec::with_capacity(curves.len());
        for (i, &day) in days.iter().enumerate() {
            let point = fit.survival(day);
            column.clear();
            column.extend(curves.iter().map(|c| c[i]));
            column.sort_by(f64::total_cmp);
            let (lower, upper) = if column.is_empty() {
                (point, point)
            } else {
                (
                    compute_percentile(&column, p_lo).min(point),
                    compute_percentile(&column, p_hi).max(point),
                )
            };
            band.survival.push(point);
            band.lower.push(lower);
            band.upper.push(upper);
        }
        band
    }

    fn draw_positive<R>(&self, mean: f64, sd: f64, rng: &mut R) -> Vec<f64>
    where
        R: Rng + ?Sized,
    {
        let Ok(normal) = Normal::new(mean, sd) else {
            return vec![mean; self.samples];
        };
        let pool = (0..self.samples)
            .map(|_| normal.sample(rng))
            .filter(|&v| v > 0.0)
            .collect::<Vec<_>>();
        if pool.len() == self.samples {
            return pool;
        }
        debug!(
            mean,
            sd,
            kept = pool.len(),
            requested = self.samples,
            "resampling positive bootstrap draws"
        );
        if pool.is_empty() {
            return vec![mean; self.samples];
        }
        (0..self.samples)
            .filter_map(|_| pool.choose(rng).copied())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng as _;
    use rand_pcg::Pcg64;

    use super::*;
    use crate::{config::GridConfig, grid::MonthGrid};

    fn bander(spread: ScaleSpread) -> BootstrapBander {
        let config = BootstrapConfig {
            scale_spread: spread,
            ..BootstrapConfig::default()
        };
        BootstrapBander::new(&config, &PriorConfig::default())
    }

    #[test]
    fn test_band_encloses_point_curve() {
        let grid = MonthGrid::new(&GridConfig::default());
        let fit = Weibull::new(1.3, 900.0).unwrap();
        let mut rng = Pcg64::seed_from_u64(1);
        for spread in [ScaleSpread::Absolute, ScaleSpread::Relative] {
            let band = bander(spread).band(&fit, grid.days(), &mut rng);
            assert_eq!(band.len(), grid.len());
            for i in 0..band.len() {
                let (s, lo, hi) = band.at(i).unwrap();
                assert!(lo <= s && s <= hi, "{spread:?} index {i}: {lo} <= {s} <= {hi}");
                assert!((0.0..=1.0).contains(&lo) && (0.0..=1.0).contains(&hi));
            }
            assert_eq!(band.at(0), Some((1.0, 1.0, 1.0)));
        }
    }

    #[test]
    fn test_relative_spread_is_wider_for_large_scale() {
        let grid = MonthGrid::new(&GridConfig::default());
        let fit = Weibull::new(1.5, 2000.0).unwrap();
        let abs =
            bander(ScaleSpread::Absolute).band(&fit, grid.days(), &mut Pcg64::seed_from_u64(5));
        let rel =
            bander(ScaleSpread::Relative).band(&fit, grid.days(), &mut Pcg64::seed_from_u64(5));
        let width = |b: &BandedCurve| b.upper[36] - b.lower[36];
        assert!(width(&rel) > width(&abs));
    }

    #[test]
    fn test_same_seed_same_band() {
        let grid = MonthGrid::new(&GridConfig::default());
        let fit = Weibull::new(1.1, 600.0).unwrap();
        let b = bander(ScaleSpread::Absolute);
        let first = b.band(&fit, grid.days(), &mut Pcg64::seed_from_u64(99));
        let second = b.band(&fit, grid.days(), &mut Pcg64::seed_from_u64(99));
        assert_eq!(first, second);
    }

    #[test]
    fn test_negative_draws_are_replaced() {
        // scale 0.5 with sd ~0.39 days yields some non-positive draws
        let fit = Weibull::new(1.0, 0.5).unwrap();
        let b = bander(ScaleSpread::Absolute);
        let mut rng = Pcg64::seed_from_u64(3);
        let draws = b.draw_positive(fit.scale(), b.scale_sd, &mut rng);
        assert_eq!(draws.len(), 200);
        assert!(draws.iter().all(|&v| v > 0.0));
    }

    #[test]
    fn test_invalid_spread_falls_back_to_point() {
        let b = bander(ScaleSpread::Absolute);
        let mut rng = Pcg64::seed_from_u64(3);
        let draws = b.draw_positive(10.0, f64::NAN, &mut rng);
        assert_eq!(draws, vec![10.0; 200]);
    }
}
