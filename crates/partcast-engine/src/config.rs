//! Engine configuration
//!
//! Every tunable of the forecasting pipeline lives in [`EngineConfig`], which is
//! passed explicitly to the orchestrator and threaded down to each stage. The
//! `Default` impl carries the production defaults; any subset of fields can be
//! overridden from JSON since every struct is `#[serde(default)]`:
//!
//! ```json
//! {
//!   "risk_set_threshold": 500,
//!   "prior": { "shape_count": 4 },
//!   "bootstrap": { "samples": 400, "scale_spread": "relative", "seed": 7 }
//! }
//! ```

use std::num::NonZeroUsize;

use partcast_stats::optimize::NelderMead;
use serde::{Deserialize, Serialize};

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum ConfigError {
    #[display("{field} must be positive (got {value})")]
    NotPositive { field: &'static str, value: f64 },
    #[display("{field} must be non-zero")]
    Zero { field: &'static str },
    #[display("{field} range is inverted: [{start}, {end}]")]
    InvertedRange {
        field: &'static str,
        start: f64,
        end: f64,
    },
    #[display("{field} must lie within [0, 100] (got {value})")]
    PercentileOutOfRange { field: &'static str, value: f64 },
}

/// Canonical month grid on which every curve is resampled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GridConfig {
    /// Last month of the grid; the grid is `0..=max_month`.
    pub max_month: u32,
    /// Days per month used to convert month horizons to lifetimes.
    pub days_per_month: f64,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            max_month: 36,
            days_per_month: 30.44,
        }
    }
}

/// Candidate priors and Gaussian prior widths for the Weibull MAP fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PriorConfig {
    /// Shape priors are spaced linearly over this range.
    pub shape_range: [f64; 2],
    pub shape_count: usize,
    /// Scale priors are spaced linearly between these lifetime percentiles.
    pub scale_percentile_range: [f64; 2],
    pub scale_count: usize,
    /// Variance of the Gaussian prior on `ln k`.
    pub shape_variance: f64,
    /// Variance of the Gaussian prior on `ln λ`.
    pub scale_variance: f64,
    pub shape_bounds: [f64; 2],
    pub scale_bounds: [f64; 2],
}

impl Default for PriorConfig {
    fn default() -> Self {
        Self {
            shape_range: [1.0, 1.2],
            shape_count: 6,
            scale_percentile_range: [60.0, 90.0],
            scale_count: 8,
            shape_variance: 0.05,
            scale_variance: 0.15,
            shape_bounds: [0.1, 10.0],
            scale_bounds: [10.0, 10_000.0],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OptimizerConfig {
    pub max_iterations: usize,
    pub f_tolerance: f64,
    pub x_tolerance: f64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        let nm = NelderMead::default();
        Self {
            max_iterations: nm.max_iterations,
            f_tolerance: nm.f_tolerance,
            x_tolerance: nm.x_tolerance,
        }
    }
}

impl OptimizerConfig {
    #[must_use]
    pub fn nelder_mead(&self) -> NelderMead {
        NelderMead {
            max_iterations: self.max_iterations,
            f_tolerance: self.f_tolerance,
            x_tolerance: self.x_tolerance,
            ..NelderMead::default()
        }
    }
}

/// How the bootstrap spreads scale draws around the fitted scale.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleSpread {
    /// Standard deviation `sqrt(scale_variance)` in days, whatever the fitted scale.
    #[default]
    Absolute,
    /// Standard deviation `sqrt(scale_variance) * λ`.
    Relative,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BootstrapConfig {
    pub samples: usize,
    /// Lower and upper percentiles of the band.
    pub band_percentiles: [f64; 2],
    pub scale_spread: ScaleSpread,
    /// Fixed seed for reproducible bands; a random seed is drawn per batch otherwise.
    pub seed: Option<u64>,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            samples: 200,
            band_percentiles: [2.5, 97.5],
            scale_spread: ScaleSpread::Absolute,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub grid: GridConfig,
    /// Lifetimes above this many days are censored at the cap.
    pub lifetime_cap_days: u32,
    /// Minimum risk-set size for a month to count as reliable.
    pub risk_set_threshold: usize,
    /// Fixed horizons reported for every group, in months.
    pub horizons_months: Vec<u32>,
    pub prior: PriorConfig,
    pub optimizer: OptimizerConfig,
    pub bootstrap: BootstrapConfig,
    /// Standard normal quantile of the Kaplan-Meier band.
    pub confidence_z: f64,
    /// Minimum observations for a component-level group.
    pub min_group_size: usize,
    /// Minimum observations for a STAT-level group.
    pub min_stat_group_size: usize,
    /// Worker threads for per-group forecasting; all available cores when unset.
    pub workers: Option<NonZeroUsize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            grid: GridConfig::default(),
            lifetime_cap_days: 1095,
            risk_set_threshold: 1000,
            horizons_months: vec![12, 24, 36],
            prior: PriorConfig::default(),
            optimizer: OptimizerConfig::default(),
            bootstrap: BootstrapConfig::default(),
            confidence_z: 1.959_964,
            min_group_size: 1,
            min_stat_group_size: 10,
            workers: None,
        }
    }
}

fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NotPositive { field, value })
    }
}

fn non_zero(field: &'static str, value: usize) -> Result<(), ConfigError> {
    if value == 0 {
        Err(ConfigError::Zero { field })
    } else {
        Ok(())
    }
}

fn ordered(field: &'static str, [start, end]: [f64; 2]) -> Result<(), ConfigError> {
    if start <= end {
        Ok(())
    } else {
        Err(ConfigError::InvertedRange { field, start, end })
    }
}

fn percentile(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=100.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::PercentileOutOfRange { field, value })
    }
}

impl EngineConfig {
    /// Checks every field for values the pipeline cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("grid.days_per_month", self.grid.days_per_month)?;
        positive("lifetime_cap_days", f64::from(self.lifetime_cap_days))?;
        positive("confidence_z", self.confidence_z)?;

        let prior = &self.prior;
        ordered("prior.shape_range", prior.shape_range)?;
        positive("prior.shape_range", prior.shape_range[0])?;
        non_zero("prior.shape_count", prior.shape_count)?;
        ordered("prior.scale_percentile_range", prior.scale_percentile_range)?;
        for p in prior.scale_percentile_range {
            percentile("prior.scale_percentile_range", p)?;
        }
        non_zero("prior.scale_count", prior.scale_count)?;
        positive("prior.shape_variance", prior.shape_variance)?;
        positive("prior.scale_variance", prior.scale_variance)?;
        ordered("prior.shape_bounds", prior.shape_bounds)?;
        positive("prior.shape_bounds", prior.shape_bounds[0])?;
        ordered("prior.scale_bounds", prior.scale_bounds)?;
        positive("prior.scale_bounds", prior.scale_bounds[0])?;

        non_zero("optimizer.max_iterations", self.optimizer.max_iterations)?;
        positive("optimizer.f_tolerance", self.optimizer.f_tolerance)?;
        positive("optimizer.x_tolerance", self.optimizer.x_tolerance)?;

        non_zero("bootstrap.samples", self.bootstrap.samples)?;
        ordered("bootstrap.band_percentiles", self.bootstrap.band_percentiles)?;
        for p in self.bootstrap.band_percentiles {
            percentile("bootstrap.band_percentiles", p)?;
        }

        Ok(())
    }

    /// Worker count for the group pool.
    #[must_use]
    pub fn worker_count(&self) -> NonZeroUsize {
        self.workers.unwrap_or_else(|| {
            std::thread::available_parallelism().unwrap_or(NonZeroUsize::MIN)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        EngineConfig::default().validate().unwrap();
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let json = r#"{
            "risk_set_threshold": 50,
            "bootstrap": { "scale_spread": "relative", "seed": 3 }
        }"#;
        let config: EngineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.risk_set_threshold, 50);
        assert_eq!(config.bootstrap.scale_spread, ScaleSpread::Relative);
        assert_eq!(config.bootstrap.seed, Some(3));
        assert_eq!(config.bootstrap.samples, 200);
        assert_eq!(config.prior, PriorConfig::default());
        assert_eq!(config.horizons_months, vec![12, 24, 36]);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let json = r#"{ "risk_set_treshold": 50 }"#;
        assert!(serde_json::from_str::<EngineConfig>(json).is_err());
    }

    #[test]
    fn test_rejects_inverted_shape_range() {
        let mut config = EngineConfig::default();
        config.prior.shape_range = [1.2, 1.0];
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvertedRange {
                field: "prior.shape_range",
                ..
            })
        ));
    }

    #[test]
    fn test_rejects_non_positive_variance() {
        let mut config = EngineConfig::default();
        config.prior.scale_variance = 0.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NotPositive { .. })
        ));
    }

    #[test]
    fn test_rejects_zero_samples_and_bad_percentile() {
        let mut config = EngineConfig::default();
        config.bootstrap.samples = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Zero { .. })));

        let mut config = EngineConfig::default();
        config.bootstrap.band_percentiles = [2.5, 102.0];
        assert!(matches!(
            config.validate(),
            Err(ConfigError::PercentileOutOfRange { .. })
        ));
    }
}
