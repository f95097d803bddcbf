//! Lot-failure reconciliation
//!
//! Turns lot-level acquisitions and failure events into one
//! [`UnitObservation`] per acquired unit.
//!
//! # Algorithm
//!
//! Failures carry no lot reference, so each failure is assigned to the oldest
//! lot of the same (model, component) that was acquired on or before the
//! failure date and still has unassigned units (FIFO). Failures are taken in
//! date order, which makes the result independent of the row order:
//!
//! ```text
//! lots:      2023-01 [10]   2023-02 [10]   2023-03 [10]
//! failure:                                        2023-04-01
//!            ▲ assigned here, lifetime = 90 days
//! remaining: 2023-01 [9]    2023-02 [10]   2023-03 [10]  -> 29 censored units
//! ```
//!
//! After all failures are assigned, the remaining units of each lot are
//! censored at the cutoff date. Lots acquired after the cutoff contribute
//! nothing. Lifetimes above the configured cap are censored at the cap.
//!
//! Anything the algorithm has to leave out is counted in [`PairDiagnostics`]
//! rather than silently dropped. A pair with an unparseable date yields no
//! observations, and its `failed`/`censored` counters stay at zero.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, warn};

use crate::record::{
    AcquisitionRow, FailureRow, InputError, StatCodeMap, UnitObservation, UnitStatus, parse_date,
};

/// Counters for one (model, component) pair.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PairDiagnostics {
    /// Units in dated lots.
    pub acquired: u64,
    /// Failures assigned to a lot.
    pub failed: u64,
    /// Units censored at the cutoff or at the lifetime cap.
    pub censored: u64,
    /// Failures for which no eligible lot existed.
    pub unmatched_failures: u64,
    /// Failures dated after the cutoff.
    pub late_failures: u64,
    /// Lots without an acquisition date.
    pub undated_lots: u64,
    /// Units in lots acquired after the cutoff.
    pub future_units: u64,
    /// Lifetimes clipped to the lifetime cap.
    pub capped: u64,
}

/// Result of reconciling acquisitions with failures.
#[derive(Default, Debug, Clone)]
pub struct Reconciliation {
    pub observations: Vec<UnitObservation>,
    /// `model → component → counters`
    pub diagnostics: BTreeMap<String, BTreeMap<String, PairDiagnostics>>,
    /// Pairs excluded because of invalid input, `model → component → error`.
    pub errors: BTreeMap<String, BTreeMap<String, InputError>>,
}

impl Reconciliation {
    /// Models present in the reconciled data.
    #[must_use]
    pub fn models(&self) -> BTreeSet<&str> {
        self.diagnostics.keys().map(String::as_str).collect()
    }
}

#[derive(Debug)]
struct Lot {
    acquired: NaiveDate,
    residual: u32,
}

type PairKey = (String, String);

/// Reconciliation inputs that stay fixed for a batch.
#[derive(Debug, Clone, Copy)]
pub struct Reconciler<'a> {
    pub stat_codes: &'a StatCodeMap,
    /// Censoring date; nothing after it is observable.
    pub cutoff: NaiveDate,
    pub lifetime_cap_days: u32,
}

impl Reconciler<'_> {
    /// Builds unit-level observations from lots and failures.
    ///
    /// Only models that appear in both inputs are considered; if there are
    /// none the result is empty.
    #[must_use]
    pub fn reconcile(
        &self,
        acquisitions: &[AcquisitionRow],
        failures: &[FailureRow],
    ) -> Reconciliation {
        let acquired_models = acquisitions
            .iter()
            .map(|r| r.model.as_str())
            .collect::<BTreeSet<_>>();
        let common_models = failures
            .iter()
            .map(|r| r.model.as_str())
            .filter(|m| acquired_models.contains(m))
            .collect::<BTreeSet<_>>();

        let mut diagnostics = BTreeMap::<PairKey, PairDiagnostics>::new();
        let mut errors = BTreeMap::<PairKey, InputError>::new();
        let mut lots = BTreeMap::<PairKey, Vec<Lot>>::new();

        for row in acquisitions
            .iter()
            .filter(|r| common_models.contains(r.model.as_str()))
        {
            let key = (row.model.clone(), row.component_code.clone());
            let diag = diagnostics.entry(key.clone()).or_default();
            let Some(raw_date) = row.acquisition_date.as_deref().filter(|d| !d.trim().is_empty())
            else {
                diag.undated_lots += 1;
                continue;
            };
            let Some(acquired) = parse_date(raw_date) else {
                errors.entry(key).or_insert_with(|| InputError::InvalidAcquisitionDate {
                    model: row.model.clone(),
                    component_code: row.component_code.clone(),
                    value: raw_date.to_owned(),
                });
                continue;
            };
            diag.acquired += u64::from(row.quantity);
            lots.entry(key).or_default().push(Lot {
                acquired,
                residual: row.quantity,
            });
        }

        // Oldest lot first; the sort is stable so equal dates keep input order.
        for pair_lots in lots.values_mut() {
            pair_lots.sort_by_key(|lot| lot.acquired);
        }

        let mut dated_failures = BTreeMap::<PairKey, Vec<NaiveDate>>::new();
        for row in failures
            .iter()
            .filter(|r| common_models.contains(r.model.as_str()))
        {
            let key = (row.model.clone(), row.component_code.clone());
            let diag = diagnostics.entry(key.clone()).or_default();
            let Some(failed_on) = parse_date(&row.failure_date) else {
                errors.entry(key).or_insert_with(|| InputError::InvalidFailureDate {
                    model: row.model.clone(),
                    component_code: row.component_code.clone(),
                    value: row.failure_date.clone(),
                });
                continue;
            };
            if failed_on > self.cutoff {
                diag.late_failures += 1;
                continue;
            }
            dated_failures.entry(key).or_default().push(failed_on);
        }

        let mut observations = vec![];
        for (key, mut pair_failures) in dated_failures {
            if errors.contains_key(&key) {
                continue;
            }
            // Earliest failure first, so an early failure never finds its
            // only eligible lot used up by a later one.
            pair_failures.sort_unstable();
            let diag = diagnostics.entry(key.clone()).or_default();
            let mut pair_lots = lots.get_mut(&key);
            for failed_on in pair_failures {
                let lot = pair_lots.as_deref_mut().and_then(|pair_lots| {
                    pair_lots
                        .iter_mut()
                        .find(|lot| lot.acquired <= failed_on && lot.residual > 0)
                });
                let Some(lot) = lot else {
                    debug!(
                        model = %key.0,
                        component = %key.1,
                        failure_date = %failed_on,
                        "no eligible lot for failure"
                    );
                    diag.unmatched_failures += 1;
                    continue;
                };
                lot.residual -= 1;

                let lifetime = days_between(lot.acquired, failed_on);
                observations.push(self.observation(&key, lifetime, UnitStatus::Failed, diag));
            }
        }

        for (key, pair_lots) in lots.iter().filter(|(key, _)| !errors.contains_key(*key)) {
            let diag = diagnostics.entry(key.clone()).or_default();
            for lot in pair_lots.iter().filter(|lot| lot.residual > 0) {
                if lot.acquired > self.cutoff {
                    diag.future_units += u64::from(lot.residual);
                    continue;
                }
                let lifetime = days_between(lot.acquired, self.cutoff);
                for _ in 0..lot.residual {
                    observations.push(self.observation(key, lifetime, UnitStatus::Censored, diag));
                }
            }
        }

        for ((model, component), diag) in &diagnostics {
            if diag.unmatched_failures > 0 {
                warn!(
                    model = %model,
                    component = %component,
                    unmatched = diag.unmatched_failures,
                    "failures without an eligible lot were excluded"
                );
            }
        }
        for error in errors.values() {
            warn!(%error, "pair excluded from reconciliation");
        }

        Reconciliation {
            observations,
            diagnostics: nest(diagnostics),
            errors: nest(errors),
        }
    }

    fn observation(
        &self,
        (model, component_code): &PairKey,
        lifetime_days: u32,
        status: UnitStatus,
        diag: &mut PairDiagnostics,
    ) -> UnitObservation {
        let (lifetime_days, status) = if lifetime_days > self.lifetime_cap_days {
            diag.capped += 1;
            (self.lifetime_cap_days, UnitStatus::Censored)
        } else {
            (lifetime_days, status)
        };
        match status {
            UnitStatus::Failed => diag.failed += 1,
            UnitStatus::Censored => diag.censored += 1,
        }
        UnitObservation {
            model: model.clone(),
            component_code: component_code.clone(),
            stat_code: self.stat_codes.get(component_code).cloned(),
            lifetime_days,
            status,
        }
    }
}

/// Whole days from `from` to `to`; callers guarantee `from <= to`.
fn days_between(from: NaiveDate, to: NaiveDate) -> u32 {
    u32::try_from((to - from).num_days()).unwrap_or(0)
}

fn nest<T>(flat: BTreeMap<PairKey, T>) -> BTreeMap<String, BTreeMap<String, T>> {
    let mut nested = BTreeMap::<String, BTreeMap<String, T>>::new();
    for ((model, component), value) in flat {
        nested.entry(model).or_default().insert(component, value);
    }
    nested
}
