//! Forecast orchestration
//!
//! Runs the whole pipeline for every (model, group key) pair:
//!
//! ```text
//! acquisitions + failures
//!        │ reconcile
//!        ▼
//! unit observations ── group by (model, component | STAT code)
//!        │                         per group, on the worker pool:
//!        ├─▶ Kaplan-Meier curve + band ─┬─▶ Weibull MAP fit ─▶ bootstrap band
//!        ├─▶ risk set ─▶ reliable month │
//!        ▼                              ▼
//!   ProjectionRecord (12 / 24 / 36 / reliable) + chart
//! ```
//!
//! Groups are independent. A group that cannot be forecast is reported as
//! skipped or failed and the rest of the batch continues.

use std::{
    collections::BTreeMap,
    error::Error,
    iter,
    path::Path,
};

use chrono::NaiveDate;
use rand::SeedableRng as _;
use rand_pcg::Pcg64;
use serde::{Serialize, Serializer};
use tracing::{info, warn};

use crate::{
    bootstrap::BootstrapBander,
    chart::{self, ChartData},
    config::{ConfigError, EngineConfig},
    estimator::EmpiricalSurvival,
    fitter::{FitError, PriorGrid, WeibullFitter},
    grid::MonthGrid,
    pool,
    projection::{self, FitSummary, ProjectionRecord, RELIABLE_LABEL},
    reconcile::{PairDiagnostics, Reconciler},
    record::{AcquisitionRow, FailureRow, InputError, StatCodeMap, UnitObservation},
    risk_set,
    survival::SurvivalStats,
};

/// Odd constant spreading group indices over the seed space.
const SEED_STRIDE: u64 = 0x9E37_79B9_7F4A_7C15;

/// Secondary grouping of a model's observations.
#[derive(
    Default,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    derive_more::FromStr,
    derive_more::Display,
    Serialize,
)]
#[serde(rename_all = "snake_case")]
pub enum GroupBy {
    /// One group per component code.
    #[default]
    #[display("component")]
    Component,
    /// One group per STAT code; components without one are left out.
    #[display("stat")]
    Stat,
}

#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    #[display("no observations")]
    NoObservations,
    #[display("{units} units, fewer than the minimum of {minimum}")]
    TooFewUnits { units: usize, minimum: usize },
}

#[derive(Debug, derive_more::Display, derive_more::Error, derive_more::From)]
pub enum GroupError {
    #[display("invalid input")]
    Input(InputError),
    #[display("Weibull fit failed")]
    Fit(FitError),
}

impl Serialize for GroupError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&error_chain(self))
    }
}

#[derive(Debug, derive_more::IsVariant, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GroupOutcome {
    Projected(ProjectionRecord),
    Skipped { reason: SkipReason },
    Failed { error: GroupError },
}

impl GroupOutcome {
    #[must_use]
    pub fn projection(&self) -> Option<&ProjectionRecord> {
        match self {
            Self::Projected(record) => Some(record),
            Self::Skipped { .. } | Self::Failed { .. } => None,
        }
    }
}

/// Result of a forecasting batch.
#[derive(Debug, Default, Serialize)]
pub struct ForecastReport {
    pub group_by: GroupBy,
    /// Batch seed; rerunning with it reproduces every bootstrap band.
    pub seed: u64,
    /// `model → group key → outcome`
    pub groups: BTreeMap<String, BTreeMap<String, GroupOutcome>>,
    /// Units left out of STAT grouping because their component has no STAT code.
    pub unmapped_units: usize,
    /// Reconciliation counters, `model → component → counters`.
    pub diagnostics: BTreeMap<String, BTreeMap<String, PairDiagnostics>>,
    /// Pairs excluded for invalid input, `model → component → error`.
    pub input_errors: BTreeMap<String, BTreeMap<String, InputError>>,
}

impl ForecastReport {
    /// Projected groups only, `model → group key → record`.
    #[must_use]
    pub fn projections(&self) -> BTreeMap<&str, BTreeMap<&str, &ProjectionRecord>> {
        self.groups
            .iter()
            .map(|(model, groups)| {
                let records = groups
                    .iter()
                    .filter_map(|(key, outcome)| Some((key.as_str(), outcome.projection()?)))
                    .collect::<BTreeMap<_, _>>();
                (model.as_str(), records)
            })
            .filter(|(_, records)| !records.is_empty())
            .collect()
    }

    /// Outcome of one group.
    #[must_use]
    pub fn outcome(&self, model: &str, key: &str) -> Option<&GroupOutcome> {
        self.groups.get(model)?.get(key)
    }
}

/// Inputs of a full forecasting run.
#[derive(Debug, Clone, Copy)]
pub struct ForecastRequest<'a> {
    pub acquisitions: &'a [AcquisitionRow],
    pub failures: &'a [FailureRow],
    pub stat_codes: &'a StatCodeMap,
    /// Censoring date.
    pub cutoff: NaiveDate,
    /// Models to forecast; every model present in both inputs when `None`.
    pub models: Option<&'a [String]>,
    pub group_by: GroupBy,
    /// Directory receiving one chart per projected group.
    pub chart_dir: &'a Path,
}

#[derive(Debug)]
struct Group<'a> {
    model: &'a str,
    key: &'a str,
    observations: Vec<&'a UnitObservation>,
}

#[derive(Debug, Clone)]
pub struct Forecaster {
    config: EngineConfig,
    grid: MonthGrid,
    fitter: WeibullFitter,
    bander: BootstrapBander,
}

impl Forecaster {
    /// Validates `config` and prepares the per-group stages.
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let fitter = WeibullFitter::new(&config.prior, &config.optimizer)?;
        Ok(Self {
            grid: MonthGrid::new(&config.grid),
            bander: BootstrapBander::new(&config.bootstrap, &config.prior),
            fitter,
            config,
        })
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Reconciles the raw rows, then forecasts every group of the requested models.
    ///
    /// In component mode, pairs excluded for invalid input are reported as
    /// failed and pairs left with no observations as skipped. In STAT mode the
    /// excluded pairs are only listed in [`ForecastReport::input_errors`].
    #[must_use]
    pub fn run(&self, request: &ForecastRequest<'_>) -> ForecastReport {
        let reconciliation = Reconciler {
            stat_codes: request.stat_codes,
            cutoff: request.cutoff,
            lifetime_cap_days: self.config.lifetime_cap_days,
        }
        .reconcile(request.acquisitions, request.failures);

        let models = match request.models {
            Some(models) => models.to_vec(),
            None => reconciliation
                .models()
                .into_iter()
                .map(str::to_owned)
                .collect(),
        };
        for model in &models {
            if !reconciliation.diagnostics.contains_key(model) {
                warn!(model = %model, "model has no acquisitions with matching failures");
            }
        }

        let mut report = self.forecast(
            &reconciliation.observations,
            &models,
            request.group_by,
            request.chart_dir,
        );

        let mut diagnostics = reconciliation.diagnostics;
        let mut input_errors = reconciliation.errors;
        diagnostics.retain(|model, _| models.contains(model));
        input_errors.retain(|model, _| models.contains(model));

        if request.group_by == GroupBy::Component {
            for (model, pairs) in &diagnostics {
                let groups = report.groups.entry(model.clone()).or_default();
                for component in pairs.keys() {
                    let error = input_errors.get(model).and_then(|e| e.get(component));
                    groups.entry(component.clone()).or_insert_with(|| match error {
                        Some(error) => GroupOutcome::Failed {
                            error: GroupError::Input(error.clone()),
                        },
                        None => GroupOutcome::Skipped {
                            reason: SkipReason::NoObservations,
                        },
                    });
                }
            }
        }

        report.diagnostics = diagnostics;
        report.input_errors = input_errors;
        report
    }

    /// Forecasts every group of `models` found in `observations`.
    ///
    /// Groups run on the worker pool; each derives its bootstrap seed from the
    /// batch seed and its position in (model, key) order.
    #[must_use]
    pub fn forecast(
        &self,
        observations: &[UnitObservation],
        models: &[String],
        group_by: GroupBy,
        chart_dir: &Path,
    ) -> ForecastReport {
        let (groups, unmapped_units) = collect_groups(observations, models, group_by);
        if unmapped_units > 0 {
            warn!(units = unmapped_units, "units without a STAT code were left out");
        }

        let seed = self.config.bootstrap.seed.unwrap_or_else(rand::random);
        let workers = self.config.worker_count();
        info!(
            groups = groups.len(),
            workers = workers.get(),
            seed,
            %group_by,
            "starting forecast batch"
        );

        let min_units = match group_by {
            GroupBy::Component => self.config.min_group_size,
            GroupBy::Stat => self.config.min_stat_group_size,
        };
        let outcomes = pool::parallel_map(&groups, workers, |i, group| {
            let group_seed = seed.wrapping_add((i as u64).wrapping_mul(SEED_STRIDE));
            self.forecast_group(group, min_units, group_seed, chart_dir)
        });

        let mut report = ForecastReport {
            group_by,
            seed,
            unmapped_units,
            ..ForecastReport::default()
        };
        for (group, outcome) in groups.iter().zip(outcomes) {
            report
                .groups
                .entry(group.model.to_owned())
                .or_default()
                .insert(group.key.to_owned(), outcome);
        }

        let projected = report
            .groups
            .values()
            .flat_map(BTreeMap::values)
            .filter(|o| o.is_projected())
            .count();
        info!(groups = groups.len(), projected, "forecast batch finished");
        report
    }

    fn forecast_group(
        &self,
        group: &Group<'_>,
        min_units: usize,
        seed: u64,
        chart_dir: &Path,
    ) -> GroupOutcome {
        let units = group.observations.len();
        let skip = if units == 0 {
            Some(SkipReason::NoObservations)
        } else if units < min_units {
            Some(SkipReason::TooFewUnits {
                units,
                minimum: min_units,
            })
        } else {
            None
        };
        if let Some(reason) = skip {
            warn!(model = group.model, key = group.key, %reason, "group skipped");
            return GroupOutcome::Skipped { reason };
        }

        match self.project(group, seed, chart_dir) {
            Ok(record) => {
                info!(
                    model = group.model,
                    key = group.key,
                    units = record.units,
                    failures = record.failures,
                    shape = record.fit.shape,
                    scale = record.fit.scale,
                    reliable_month = record.reliable_horizon_month,
                    "group projected"
                );
                GroupOutcome::Projected(record)
            }
            Err(error) => {
                warn!(
                    model = group.model,
                    key = group.key,
                    error = %error_chain(&error),
                    "group failed"
                );
                GroupOutcome::Failed { error }
            }
        }
    }

    fn project(
        &self,
        group: &Group<'_>,
        seed: u64,
        chart_dir: &Path,
    ) -> Result<ProjectionRecord, GroupError> {
        let stats = SurvivalStats::from_observations(group.observations.iter().copied());
        let empirical =
            EmpiricalSurvival::from_curve(&stats.km_curve, &self.grid, self.config.confidence_z);

        let lifetime_days = group
            .observations
            .iter()
            .map(|o| o.lifetime_days)
            .collect::<Vec<_>>();
        let counts = risk_set::risk_set_counts(&lifetime_days, &self.grid);
        let reliable_month = risk_set::reliable_horizon(
            &counts,
            self.grid.months(),
            self.config.risk_set_threshold,
        );

        let data = group
            .observations
            .iter()
            .map(|o| o.lifetime())
            .collect::<Vec<_>>();
        let lifetimes = lifetime_days.iter().map(|&d| f64::from(d)).collect::<Vec<_>>();
        let priors = PriorGrid::new(&self.config.prior, &lifetimes)?;
        let fit = self
            .fitter
            .fit(&data, &empirical.fit_days, &empirical.fit_survival, &priors)?;
        let dist = fit.distribution().ok_or(FitError::NoFiniteCandidate)?;

        let mut rng = Pcg64::seed_from_u64(seed);
        let weibull = self.bander.band(&dist, self.grid.days(), &mut rng);

        let horizons = self
            .config
            .horizons_months
            .iter()
            .map(|&month| (month.to_string(), month))
            .chain(iter::once((RELIABLE_LABEL.to_owned(), reliable_month)))
            .map(|(label, month)| {
                projection::project_horizon(
                    label,
                    month,
                    &self.grid,
                    &empirical.canonical,
                    &weibull,
                )
            })
            .collect();

        let chart_data = ChartData {
            months: self.grid.months(),
            km: &empirical.canonical,
            weibull: &weibull,
            reliable_month,
        };
        let (chart, chart_error) = match chart::write_chart(chart_dir, &chart_data) {
            Ok(artifact) => (Some(artifact.reference), None),
            Err(e) => {
                let message = error_chain(&e);
                warn!(model = group.model, key = group.key, error = %message, "chart not written");
                (None, Some(message))
            }
        };

        Ok(ProjectionRecord {
            key: group.key.to_owned(),
            chart,
            chart_error,
            reliable_horizon_month: reliable_month,
            horizons,
            fit: FitSummary::from(&fit),
            units: stats.units,
            failures: stats.failures,
            km_median_days: stats.median_km,
        })
    }
}

/// Groups observations of `models` by (model, key) in sorted order.
fn collect_groups<'a>(
    observations: &'a [UnitObservation],
    models: &'a [String],
    group_by: GroupBy,
) -> (Vec<Group<'a>>, usize) {
    let mut unmapped = 0;
    let mut map = BTreeMap::<(&str, &str), Vec<&UnitObservation>>::new();
    for obs in observations {
        if !models.contains(&obs.model) {
            continue;
        }
        let key = match group_by {
            GroupBy::Component => obs.component_code.as_str(),
            GroupBy::Stat => {
                let Some(stat) = obs.stat_code.as_deref() else {
                    unmapped += 1;
                    continue;
                };
                stat
            }
        };
        map.entry((obs.model.as_str(), key)).or_default().push(obs);
    }
    let groups = map
        .into_iter()
        .map(|((model, key), observations)| Group {
            model,
            key,
            observations,
        })
        .collect();
    (groups, unmapped)
}

/// `error: cause: cause...`
fn error_chain(error: &(dyn Error + 'static)) -> String {
    iter::successors(Some(error), |&e| e.source())
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(": ")
}

#[cfg(test)]
mod tests {
    use std::{num::NonZeroUsize, str::FromStr as _};

    use chrono::Days;

    use super::*;

    const CUTOFF: &str = "2024-01-01";

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn lot(component: &str, day: NaiveDate, quantity: u32) -> AcquisitionRow {
        AcquisitionRow {
            model: "M1".to_owned(),
            component_code: component.to_owned(),
            acquisition_date: Some(day.to_string()),
            quantity,
        }
    }

    /// C1: ten monthly lots with 200 failures; C2: no failures;
    /// C3: an unparseable lot date; C4: acquired after the cutoff;
    /// C5: five units; C6: three units without a STAT code.
    fn dataset() -> (Vec<AcquisitionRow>, Vec<FailureRow>, StatCodeMap) {
        let start = date("2021-01-01");
        let mut acquisitions = (0..10)
            .map(|i| lot("C1", start + Days::new(30 * i), 100))
            .collect::<Vec<_>>();
        acquisitions.push(lot("C2", date("2022-06-01"), 50));
        acquisitions.push(lot("C3", date("2022-01-01"), 20));
        acquisitions.push(AcquisitionRow {
            acquisition_date: Some("2022-13-45".to_owned()),
            ..lot("C3", start, 5)
        });
        acquisitions.push(lot("C4", date("2025-01-01"), 10));
        acquisitions.push(lot("C5", date("2022-01-01"), 5));
        acquisitions.push(lot("C6", date("2022-01-01"), 3));

        let failures = (0..200u64)
            .map(|j| FailureRow {
                model: "M1".to_owned(),
                component_code: "C1".to_owned(),
                failure_date: (date("2021-01-15") + Days::new(j * 7 % 1000)).to_string(),
            })
            .collect();

        let stat_codes = [("C1", "S1"), ("C2", "S1"), ("C3", "S2"), ("C5", "S3")]
            .into_iter()
            .map(|(c, s)| (c.to_owned(), s.to_owned()))
            .collect();
        (acquisitions, failures, stat_codes)
    }

    fn forecaster() -> Forecaster {
        let mut config = EngineConfig::default();
        config.bootstrap.seed = Some(7);
        config.workers = NonZeroUsize::new(2);
        Forecaster::new(config).unwrap()
    }

    fn run(forecaster: &Forecaster, group_by: GroupBy, chart_dir: &Path) -> ForecastReport {
        let (acquisitions, failures, stat_codes) = dataset();
        forecaster.run(&ForecastRequest {
            acquisitions: &acquisitions,
            failures: &failures,
            stat_codes: &stat_codes,
            cutoff: date(CUTOFF),
            models: None,
            group_by,
            chart_dir,
        })
    }

    fn assert_ordered(record: &ProjectionRecord) {
        for h in &record.horizons {
            for e in [h.km, h.weibull].into_iter().flatten() {
                assert!(
                    e.lower <= e.value && e.value <= e.upper,
                    "{} at {}: {e:?}",
                    record.key,
                    h.label
                );
            }
        }
    }

    #[test]
    fn test_component_outcomes() {
        let tmp = tempfile::tempdir().unwrap();
        let report = run(&forecaster(), GroupBy::Component, tmp.path());

        let c1 = report.outcome("M1", "C1").unwrap().projection().unwrap();
        assert_eq!(c1.units, 1000);
        assert_eq!(c1.failures, 200);
        let labels = c1.horizons.iter().map(|h| h.label.as_str()).collect::<Vec<_>>();
        assert_eq!(labels, ["12", "24", "36", "reliable"]);
        assert_eq!(c1.reliable_horizon_month, 0);
        assert!(c1.horizon("36").unwrap().km.is_some());
        assert!(c1.horizon("12").unwrap().km.unwrap().value > 0.0);
        assert_ordered(c1);

        let chart = c1.chart.as_deref().unwrap();
        assert!(tmp.path().join(chart).is_file());
        assert_eq!(c1.chart_error, None);

        assert!(matches!(
            report.outcome("M1", "C3"),
            Some(GroupOutcome::Failed {
                error: GroupError::Input(InputError::InvalidAcquisitionDate { .. })
            })
        ));
        assert!(matches!(
            report.outcome("M1", "C4"),
            Some(GroupOutcome::Skipped {
                reason: SkipReason::NoObservations
            })
        ));
        assert!(report.outcome("M1", "C5").unwrap().is_projected());
        assert_eq!(report.diagnostics["M1"]["C4"].future_units, 10);
        assert_eq!(report.projections()["M1"].len(), 4);
    }

    #[test]
    fn test_zero_failure_group_is_projected() {
        let tmp = tempfile::tempdir().unwrap();
        let report = run(&forecaster(), GroupBy::Component, tmp.path());
        let c2 = report.outcome("M1", "C2").unwrap().projection().unwrap();
        assert_eq!(c2.failures, 0);
        assert_eq!(c2.km_median_days, None);
        for h in &c2.horizons {
            let km = h.km.unwrap();
            assert_eq!((km.value, km.lower, km.upper), (0.0, 0.0, 0.0));
            assert!(h.weibull.is_some());
        }
        assert_ordered(c2);
    }

    #[test]
    fn test_stat_grouping() {
        let tmp = tempfile::tempdir().unwrap();
        let report = run(&forecaster(), GroupBy::Stat, tmp.path());
        assert_eq!(report.group_by, GroupBy::Stat);
        assert_eq!(report.unmapped_units, 3);

        let s1 = report.outcome("M1", "S1").unwrap().projection().unwrap();
        assert_eq!(s1.units, 1050);
        assert_ordered(s1);
        assert!(matches!(
            report.outcome("M1", "S3"),
            Some(GroupOutcome::Skipped {
                reason: SkipReason::TooFewUnits { units: 5, minimum: 10 }
            })
        ));
        // C3 was excluded, so S2 has no observations and no group
        assert!(report.outcome("M1", "S2").is_none());
        assert!(report.input_errors["M1"].contains_key("C3"));
    }

    #[test]
    fn test_seeded_runs_are_reproducible() {
        let tmp = tempfile::tempdir().unwrap();
        let forecaster = forecaster();
        let first = run(&forecaster, GroupBy::Component, tmp.path());
        let second = run(&forecaster, GroupBy::Component, tmp.path());
        assert_eq!(first.seed, 7);
        for (model, records) in first.projections() {
            for (key, record) in records {
                let other = second.projections()[model][key];
                assert_eq!(record.horizons, other.horizons);
                assert_eq!(record.fit, other.fit);
                assert_ne!(record.chart, other.chart);
            }
        }
    }

    #[test]
    fn test_chart_failure_keeps_projection() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let report = run(&forecaster(), GroupBy::Component, &file.path().join("charts"));
        let c1 = report.outcome("M1", "C1").unwrap().projection().unwrap();
        assert_eq!(c1.chart, None);
        assert!(c1.chart_error.is_some());
        assert!(c1.horizon("12").unwrap().weibull.is_some());
    }

    #[test]
    fn test_horizon_beyond_grid_is_absent() {
        let mut config = EngineConfig::default();
        config.horizons_months = vec![36, 48];
        config.bootstrap.seed = Some(1);
        let forecaster = Forecaster::new(config).unwrap();
        let tmp = tempfile::tempdir().unwrap();
        let report = run(&forecaster, GroupBy::Component, tmp.path());
        let c1 = report.outcome("M1", "C1").unwrap().projection().unwrap();
        assert!(c1.horizon("36").unwrap().km.is_some());
        let beyond = c1.horizon("48").unwrap();
        assert_eq!((beyond.km, beyond.weibull), (None, None));
    }

    #[test]
    fn test_selected_models_only() {
        let tmp = tempfile::tempdir().unwrap();
        let (acquisitions, failures, stat_codes) = dataset();
        let models = ["M9".to_owned()];
        let report = forecaster().run(&ForecastRequest {
            acquisitions: &acquisitions,
            failures: &failures,
            stat_codes: &stat_codes,
            cutoff: date(CUTOFF),
            models: Some(&models),
            group_by: GroupBy::Component,
            chart_dir: tmp.path(),
        });
        assert!(report.groups.is_empty());
        assert!(report.diagnostics.is_empty());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = EngineConfig::default();
        config.prior.scale_bounds = [100.0, 10.0];
        assert!(Forecaster::new(config).is_err());
    }

    #[test]
    fn test_group_by_parsing() {
        assert_eq!(GroupBy::from_str("stat").unwrap(), GroupBy::Stat);
        assert_eq!(GroupBy::from_str("Component").unwrap(), GroupBy::Component);
        assert!(GroupBy::from_str("model").is_err());
        assert_eq!(GroupBy::Stat.to_string(), "stat");
    }

    #[test]
    fn test_report_serializes_outcomes() {
        let tmp = tempfile::tempdir().unwrap();
        let report = run(&forecaster(), GroupBy::Component, tmp.path());
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["groups"]["M1"]["C1"]["status"], "projected");
        assert_eq!(json["groups"]["M1"]["C4"]["status"], "skipped");
        assert_eq!(json["groups"]["M1"]["C4"]["reason"]["kind"], "no_observations");
        assert_eq!(json["groups"]["M1"]["C3"]["status"], "failed");
        let error = json["groups"]["M1"]["C3"]["error"].as_str().unwrap();
        assert!(error.starts_with("invalid input: M1/C3"), "{error}");
        assert_eq!(json["seed"], 7);
    }
}
