//! Input rows and unit-level survival observations
//!
//! # Data Structure
//!
//! ```text
//! AcquisitionRow  (model, component, date, quantity)  -- one purchase lot
//! FailureRow      (model, component, date)            -- one observed failure
//!        │
//!        └─ reconcile ─▶ UnitObservation (model, component, stat code, lifetime, status)
//! ```
//!
//! # Event Polarity
//!
//! Observations carry a [`UnitStatus`]. When serialized it uses the historical
//! indicator encoding, `0` for a failed unit and `1` for a censored one, which is
//! the opposite of the "event happened" flag a survival estimator expects.
//! [`UnitStatus::is_event`] is the one place that translates between the two;
//! every estimator input goes through it.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};
use partcast_stats::weibull::Lifetime;
use serde::{Deserialize, Serialize, Serializer};

/// One purchase lot of identical components.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquisitionRow {
    pub model: String,
    pub component_code: String,
    /// Acquisition date; lots without one are dropped.
    #[serde(default)]
    pub acquisition_date: Option<String>,
    pub quantity: u32,
}

/// One observed component failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRow {
    pub model: String,
    pub component_code: String,
    pub failure_date: String,
}

/// Secondary grouping: component code to STAT code.
pub type StatCodeMap = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::Error)]
pub enum InputError {
    #[display("{model}/{component_code}: unparseable acquisition date {value:?}")]
    InvalidAcquisitionDate {
        model: String,
        component_code: String,
        value: String,
    },
    #[display("{model}/{component_code}: unparseable failure date {value:?}")]
    InvalidFailureDate {
        model: String,
        component_code: String,
        value: String,
    },
}

impl Serialize for InputError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

/// Outcome of a unit at the end of its observed lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::IsVariant, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum UnitStatus {
    /// The unit failed; its lifetime ends at the failure date.
    Failed,
    /// No failure was observed by the censoring cutoff (or the lifetime cap).
    Censored,
}

impl UnitStatus {
    /// Stored indicator value: `0` for failed, `1` for censored.
    #[must_use]
    pub const fn indicator(self) -> u8 {
        match self {
            Self::Failed => 0,
            Self::Censored => 1,
        }
    }

    /// Estimator convention: returns `true` when the unit experienced the event
    /// of interest (a failure).
    ///
    /// This is the complement of the stored indicator. Call sites feeding a
    /// Kaplan-Meier curve or a likelihood must use this instead of doing
    /// arithmetic on [`indicator`](Self::indicator).
    #[must_use]
    pub const fn is_event(self) -> bool {
        matches!(self, Self::Failed)
    }
}

impl From<UnitStatus> for u8 {
    fn from(status: UnitStatus) -> Self {
        status.indicator()
    }
}

#[derive(Debug, derive_more::Display, derive_more::Error)]
#[display("invalid status indicator {_0} (expected 0 or 1)")]
pub struct InvalidIndicator(#[error(not(source))] u8);

impl TryFrom<u8> for UnitStatus {
    type Error = InvalidIndicator;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Failed),
            1 => Ok(Self::Censored),
            v => Err(InvalidIndicator(v)),
        }
    }
}

/// One unit's survival observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitObservation {
    pub model: String,
    pub component_code: String,
    /// STAT group of the component, when known.
    pub stat_code: Option<String>,
    pub lifetime_days: u32,
    pub status: UnitStatus,
}

impl UnitObservation {
    /// `(time, is_censored)` sample in the form the Kaplan-Meier curve takes.
    #[must_use]
    pub fn km_sample(&self) -> (usize, bool) {
        (self.lifetime_days as usize, !self.status.is_event())
    }

    /// Lifetime in the form the Weibull likelihood takes.
    #[must_use]
    pub fn lifetime(&self) -> Lifetime {
        Lifetime {
            time: f64::from(self.lifetime_days),
            observed: self.status.is_event(),
        }
    }
}

/// Parses a calendar date, accepting a plain date or a date-time whose time is dropped.
///
/// # Examples
///
/// ```
/// use chrono::NaiveDate;
/// use partcast_engine::record::parse_date;
///
/// let day = NaiveDate::from_ymd_opt(2023, 4, 1);
/// assert_eq!(parse_date("2023-04-01"), day);
/// assert_eq!(parse_date("2023-04-01T13:45:00"), day);
/// assert_eq!(parse_date(" 2023-04-01 08:00:00.250 "), day);
/// assert_eq!(parse_date("01/04/2023"), None);
/// ```
#[must_use]
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .or_else(|| {
            ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
                .map(|dt| dt.date())
        })
}
