//! Statistical building blocks for component reliability forecasting.
//!
//! This crate is domain-free: it knows lifetimes and probabilities, not
//! models, lots or components.
//!
//! - **Survival analysis**: Kaplan-Meier estimator with Greenwood confidence bands
//! - **Weibull distribution**: survival, density and right-censored log-likelihood
//! - **Optimization**: bounded Nelder-Mead minimizer
//! - **Percentiles**: numpy-compatible linear-interpolation percentiles
//! - **Descriptive statistics**: mean, median, variance, standard deviation
//! - **Sequences**: evenly spaced grids
//!
//! # Modules
//!
//! - [`survival`]: Kaplan-Meier survival curves for time-to-event data
//! - [`weibull`]: Parametric lifetime distribution
//! - [`optimize`]: Derivative-free minimization in a box
//! - [`percentiles`]: Percentile computation and storage
//! - [`descriptive`]: Descriptive statistics for summarizing datasets
//! - [`sequence`]: Evenly spaced sequences
//!
//! # Examples
//!
//! ## Analyzing survival data
//!
//! ```
//! use partcast_stats::survival::KaplanMeierCurve;
//!
//! // Data: (time, is_censored)
//! let data = vec![
//!     (10, false), // Event occurred at time 10
//!     (20, true),  // Censored at time 20
//!     (30, false), // Event occurred at time 30
//! ];
//! let curve = KaplanMeierCurve::from_data(data);
//! let (lower, upper) = curve.band_at(25, 1.96);
//! assert!(lower <= curve.survival_at(25) && curve.survival_at(25) <= upper);
//! ```
//!
//! ## Fitting a Weibull by maximum likelihood
//!
//! ```
//! use partcast_stats::{
//!     optimize::{Bounds, NelderMead},
//!     weibull::{Lifetime, Weibull},
//! };
//!
//! let data = (1..=50)
//!     .map(|i| Lifetime { time: f64::from(i) * 8.0, observed: i % 2 == 0 })
//!     .collect::<Vec<_>>();
//! let bounds = Bounds::new(vec![0.1, 10.0], vec![10.0, 10_000.0]).unwrap();
//! let objective = |x: &[f64]| {
//!     Weibull::new(x[0], x[1]).map_or(f64::INFINITY, |w| -w.log_likelihood(&data, 0.5))
//! };
//! let min = NelderMead::default().minimize(objective, &[1.0, 200.0], &bounds);
//! assert!(min.value.is_finite());
//! ```

pub mod descriptive;
pub mod optimize;
pub mod percentiles;
pub mod sequence;
pub mod survival;
pub mod weibull;
