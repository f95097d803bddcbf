//! Per-group survival summaries
//!
//! Groups unit observations by an arbitrary key (component code, STAT code,
//! model) and computes a Kaplan-Meier curve for each group.
//!
//! # Examples
//!
//! ```
//! use partcast_engine::{
//!     record::{UnitObservation, UnitStatus},
//!     survival::SurvivalStatsMap,
//! };
//!
//! let obs = |component: &str, days, status| UnitObservation {
//!     model: "M1".to_owned(),
//!     component_code: component.to_owned(),
//!     stat_code: None,
//!     lifetime_days: days,
//!     status,
//! };
//! let observations = vec![
//!     obs("C1", 40, UnitStatus::Failed),
//!     obs("C1", 300, UnitStatus::Censored),
//!     obs("C2", 300, UnitStatus::Censored),
//! ];
//!
//! let stats = SurvivalStatsMap::collect_by_group(&observations, |o| o.component_code.clone());
//! assert_eq!(stats.map["C1"].failures, 1);
//! assert_eq!(stats.map["C2"].failures, 0);
//! ```

use std::collections::BTreeMap;

use partcast_stats::survival::KaplanMeierCurve;

use crate::record::UnitObservation;

/// Survival statistics for a group of observations
#[derive(Debug, Clone)]
pub struct SurvivalStats {
    /// Total number of units
    pub units: usize,
    /// Number of observed failures
    pub failures: usize,
    /// Number of censored units
    pub censored: usize,
    /// Lifetime of the last observed failure
    pub last_failure_day: Option<usize>,
    /// Kaplan-Meier median lifetime in days
    pub median_km: Option<f64>,
    /// Kaplan-Meier survival curve
    pub km_curve: KaplanMeierCurve,
}

#[derive(Debug, Clone)]
pub struct SurvivalStatsMap<K> {
    pub map: BTreeMap<K, SurvivalStats>,
}

impl SurvivalStats {
    #[must_use]
    pub fn from_observations<'a, I>(observations: I) -> Self
    where
        I: IntoIterator<Item = &'a UnitObservation>,
    {
        let samples = observations
            .into_iter()
            .map(UnitObservation::km_sample)
            .collect::<Vec<_>>();
        let units = samples.len();
        let failures = samples.iter().filter(|(_, censored)| !censored).count();
        let km_curve = KaplanMeierCurve::from_data(samples);

        Self {
            units,
            failures,
            censored: units - failures,
            last_failure_day: km_curve.last_event_time(),
            median_km: km_curve.median_survival(),
            km_curve,
        }
    }
}

impl<K> SurvivalStatsMap<K> {
    /// Collect survival statistics grouped by a custom key
    ///
    /// Observations for which `group` returns the same key share one
    /// Kaplan-Meier curve.
    pub fn collect_by_group<F>(observations: &[UnitObservation], mut group: F) -> Self
    where
        F: FnMut(&UnitObservation) -> K,
        K: Ord,
    {
        let mut data_map: BTreeMap<K, Vec<&UnitObservation>> = BTreeMap::new();
        for obs in observations {
            data_map.entry(group(obs)).or_default().push(obs);
        }

        Self {
            map: data_map
                .into_iter()
                .map(|(key, data)| (key, SurvivalStats::from_observations(data)))
                .collect(),
        }
    }
}
