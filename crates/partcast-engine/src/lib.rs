//! Component reliability forecasting
//!
//! This crate reconstructs unit-level survival data from purchase lots and
//! failure records, estimates survival non-parametrically (Kaplan-Meier) and
//! parametrically (Bayesian Weibull), and projects failure probabilities with
//! confidence bands at fixed horizons.
//!
//! # Overview
//!
//! 1. **Reconciliation** ([`reconcile::Reconciler`]): assign each failure to the
//!    oldest eligible lot and censor the remaining units at the cutoff
//! 2. **Kaplan-Meier** ([`survival::SurvivalStats`], [`estimator::EmpiricalSurvival`]):
//!    product-limit curve with a log(-log) Greenwood band, resampled onto grids
//! 3. **Risk set** ([`risk_set`]): the last month with enough units under observation
//! 4. **Weibull fit** ([`fitter::WeibullFitter`]): MAP fits over a grid of priors,
//!    keeping the one closest to the Kaplan-Meier curve
//! 5. **Bootstrap** ([`bootstrap::BootstrapBander`]): parameter-uncertainty band
//!    around the fitted curve
//! 6. **Forecast** ([`forecast::Forecaster`]): runs 1-5 for every
//!    (model, group key) pair on a worker pool and writes a chart per group
//!
//! Every tunable lives in [`config::EngineConfig`].
//!
//! # Examples
//!
//! ```no_run
//! use std::path::Path;
//!
//! use chrono::NaiveDate;
//! use partcast_engine::{
//!     config::EngineConfig,
//!     forecast::{ForecastRequest, Forecaster, GroupBy},
//!     record::{AcquisitionRow, FailureRow, StatCodeMap},
//! };
//!
//! let acquisitions = vec![AcquisitionRow {
//!     model: "M1".to_owned(),
//!     component_code: "PSU".to_owned(),
//!     acquisition_date: Some("2023-01-01".to_owned()),
//!     quantity: 10,
//! }];
//! let failures = vec![FailureRow {
//!     model: "M1".to_owned(),
//!     component_code: "PSU".to_owned(),
//!     failure_date: "2023-04-01".to_owned(),
//! }];
//!
//! let forecaster = Forecaster::new(EngineConfig::default())?;
//! let report = forecaster.run(&ForecastRequest {
//!     acquisitions: &acquisitions,
//!     failures: &failures,
//!     stat_codes: &StatCodeMap::new(),
//!     cutoff: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
//!     models: None,
//!     group_by: GroupBy::Component,
//!     chart_dir: Path::new("charts"),
//! });
//! for (model, records) in report.projections() {
//!     for (key, record) in records {
//!         println!("{model}/{key}: reliable for {} months", record.reliable_horizon_month);
//!     }
//! }
//! # Ok::<(), partcast_engine::config::ConfigError>(())
//! ```

pub mod bootstrap;
pub mod chart;
pub mod config;
pub mod estimator;
pub mod fitter;
pub mod forecast;
pub mod grid;
pub mod pool;
pub mod projection;
pub mod reconcile;
pub mod record;
pub mod risk_set;
pub mod survival;
