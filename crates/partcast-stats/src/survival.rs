/// Kaplan-Meier survival curve for survival analysis.
///
/// The Kaplan-Meier estimator is a non-parametric statistic used to estimate the survival
/// function from lifetime data. It accounts for censored data (observations where the event
/// of interest has not occurred by the end of the study period).
///
/// # Fields
///
/// The curve stores parallel vectors representing the survival function at discrete time points:
/// - Time points where events occurred
/// - Survival probability at each time point
/// - Number of subjects at risk at each time point
/// - Number of events (non-censored observations) at each time point
/// - Cumulative Greenwood variance term at each time point
#[derive(Debug, Clone)]
pub struct KaplanMeierCurve {
    /// Time points where events (non-censored observations) occurred.
    pub times: Vec<usize>,
    /// Survival probability at each corresponding time point.
    /// Values range from 0.0 (no survival) to 1.0 (complete survival).
    pub survival_prob: Vec<f64>,
    /// Number of subjects at risk (not yet experienced the event or censored) at each time point.
    pub at_risk: Vec<usize>,
    /// Number of events (non-censored observations) that occurred at each time point.
    pub events: Vec<usize>,
    /// Cumulative Greenwood sum `Σ dᵢ / (nᵢ (nᵢ - dᵢ))` up to each time point.
    ///
    /// Multiplied by `S(t)²` this is the Greenwood variance of the survival estimate.
    pub greenwood: Vec<f64>,
}

impl KaplanMeierCurve {
    /// Computes the Kaplan-Meier survival curve from survival data.
    ///
    /// # Arguments
    ///
    /// * `data` - A vector of tuples where each tuple contains:
    ///   - `time`: The time at which the observation occurred
    ///   - `is_censored`: `true` if the observation was censored (event did not occur),
    ///     `false` if the event occurred
    ///
    /// # Returns
    ///
    /// A `KaplanMeierCurve` with survival probabilities calculated at each event time.
    ///
    /// # Examples
    ///
    /// ```
    /// # use partcast_stats::survival::KaplanMeierCurve;
    /// // Data: (time, is_censored)
    /// let data = vec![
    ///     (10, false), // Event at time 10
    ///     (20, true),  // Censored at time 20
    ///     (30, false), // Event at time 30
    /// ];
    /// let curve = KaplanMeierCurve::from_data(data);
    /// assert_eq!(curve.times, vec![10, 30]);
    /// ```
    #[expect(clippy::cast_precision_loss)]
    #[must_use]
    pub fn from_data(mut data: Vec<(usize, bool)>) -> Self {
        let mut curve = Self {
            times: vec![],
            survival_prob: vec![],
            at_risk: vec![],
            events: vec![],
            greenwood: vec![],
        };
        if data.is_empty() {
            return curve;
        }

        // Sort by time
        data.sort_by_key(|(time, _)| *time);

        let mut current_survival = 1.0;
        let mut current_greenwood = 0.0;
        let total = data.len();

        let mut i = 0;
        while i < data.len() {
            let current_time = data[i].0;
            let at_risk = total - i;

            // Count events (non-censored) at this time point
            let mut event_count = 0;
            let mut j = i;
            while j < data.len() && data[j].0 == current_time {
                if !data[j].1 {
                    event_count += 1;
                }
                j += 1;
            }

            if event_count > 0 {
                let survival_rate = 1.0 - (event_count as f64 / at_risk as f64);
                current_survival *= survival_rate;
                // n == d drives the curve to zero; the band collapses there anyway.
                if at_risk > event_count {
                    current_greenwood +=
                        event_count as f64 / (at_risk as f64 * (at_risk - event_count) as f64);
                }

                curve.times.push(current_time);
                curve.survival_prob.push(current_survival);
                curve.at_risk.push(at_risk);
                curve.events.push(event_count);
                curve.greenwood.push(current_greenwood);
            }

            i = j;
        }

        curve
    }

    /// Returns `true` if no event was observed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Returns the time of the last observed event, if any.
    #[must_use]
    pub fn last_event_time(&self) -> Option<usize> {
        self.times.last().copied()
    }

    /// Returns the median survival time.
    ///
    /// The median survival time is the time at which the survival probability
    /// drops to or below 50%. If the survival probability never reaches 50%,
    /// this method returns `None`.
    ///
    /// Linear interpolation is used between time points for more accurate estimates.
    ///
    /// # Examples
    ///
    /// ```
    /// # use partcast_stats::survival::KaplanMeierCurve;
    /// let data = vec![(10, false), (20, false), (30, false)];
    /// let curve = KaplanMeierCurve::from_data(data);
    /// let median = curve.median_survival().unwrap();
    /// assert!(median > 10.0 && median <= 20.0);
    /// ```
    #[expect(clippy::cast_precision_loss)]
    #[must_use]
    pub fn median_survival(&self) -> Option<f64> {
        let i = self.survival_prob.iter().position(|&s| s <= 0.5)?;
        if i == 0 {
            return Some(self.times[0] as f64);
        }
        // Linear interpolation between points
        let t0 = self.times[i - 1] as f64;
        let t1 = self.times[i] as f64;
        let s0 = self.survival_prob[i - 1];
        let s1 = self.survival_prob[i];
        Some(t0 + (0.5 - s0) / (s1 - s0) * (t1 - t0))
    }

    /// Index of the last event time `<= time`, or `None` before the first event.
    fn index_at(&self, time: usize) -> Option<usize> {
        self.times.partition_point(|&t| t <= time).checked_sub(1)
    }

    /// Returns the survival probability at a specific time.
    ///
    /// This method uses a step function: the survival probability remains constant
    /// between event times and decreases only when an event occurs.
    ///
    /// Returns `1.0` if the time is before the first event, or the last known
    /// survival probability if the time is after the last event.
    ///
    /// # Examples
    ///
    /// ```
    /// # use partcast_stats::survival::KaplanMeierCurve;
    /// let data = vec![(10, false), (20, false)];
    /// let curve = KaplanMeierCurve::from_data(data);
    ///
    /// assert_eq!(curve.survival_at(5), 1.0);  // Before first event
    /// assert!(curve.survival_at(15) < 1.0);   // After first event
    /// assert_eq!(curve.survival_at(500), 0.0); // Held flat after last event
    /// ```
    #[must_use]
    pub fn survival_at(&self, time: usize) -> f64 {
        self.index_at(time).map_or(1.0, |i| self.survival_prob[i])
    }

    /// Returns the two-sided confidence band `(lower, upper)` at a specific time.
    ///
    /// The band is built on the log(-log) scale from the Greenwood variance
    /// ("exponential Greenwood"), which keeps both bounds inside `[0, 1]`.
    /// Like [`survival_at`](Self::survival_at) it is a step function held flat
    /// outside the observed event times.
    ///
    /// # Arguments
    ///
    /// * `time` - The time point at which to evaluate the band
    /// * `z` - Standard normal quantile for the desired level (1.96 for 95%)
    ///
    /// # Examples
    ///
    /// ```
    /// # use partcast_stats::survival::KaplanMeierCurve;
    /// let data = (1..=20).map(|t| (t, t % 3 == 0)).collect();
    /// let curve = KaplanMeierCurve::from_data(data);
    ///
    /// let (lower, upper) = curve.band_at(10, 1.96);
    /// let s = curve.survival_at(10);
    /// assert!(lower <= s && s <= upper);
    /// assert_eq!(curve.band_at(0, 1.96), (1.0, 1.0));
    /// ```
    #[must_use]
    pub fn band_at(&self, time: usize, z: f64) -> (f64, f64) {
        self.index_at(time).map_or((1.0, 1.0), |i| {
            log_log_band(self.survival_prob[i], self.greenwood[i], z)
        })
    }
}

/// Confidence band for a survival probability on the log(-log) scale.
fn log_log_band(survival: f64, greenwood: f64, z: f64) -> (f64, f64) {
    if survival <= 0.0 {
        return (0.0, 0.0);
    }
    if survival >= 1.0 || greenwood <= 0.0 {
        return (survival, survival);
    }
    let se = greenwood.sqrt() / survival.ln().abs();
    let lower = survival.powf((z * se).exp());
    let upper = survival.powf((-z * se).exp());
    (lower, upper)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn test_empty_data() {
        let curve = KaplanMeierCurve::from_data(vec![]);
        assert!(curve.is_empty());
        assert_eq!(curve.survival_at(100), 1.0);
        assert_eq!(curve.band_at(100, 1.96), (1.0, 1.0));
        assert_eq!(curve.median_survival(), None);
    }

    #[test]
    fn test_all_censored_is_flat() {
        let data = vec![(5, true), (10, true), (15, true)];
        let curve = KaplanMeierCurve::from_data(data);
        assert!(curve.is_empty());
        assert_eq!(curve.last_event_time(), None);
        for t in 0..30 {
            assert_eq!(curve.survival_at(t), 1.0);
        }
    }

    #[test]
    fn test_product_limit_with_censoring() {
        // 5 at risk, event at 2 -> 4/5; censored at 3; 3 at risk, event at 4 -> 4/5 * 2/3
        let data = vec![(2, false), (3, true), (4, false), (6, true), (8, true)];
        let curve = KaplanMeierCurve::from_data(data);
        assert_eq!(curve.times, vec![2, 4]);
        assert_eq!(curve.at_risk, vec![5, 3]);
        assert_eq!(curve.events, vec![1, 1]);
        assert_close(curve.survival_at(3), 0.8);
        assert_close(curve.survival_at(4), 0.8 * 2.0 / 3.0);
        assert_close(curve.survival_at(100), 0.8 * 2.0 / 3.0);
    }

    #[test]
    fn test_greenwood_accumulates() {
        let data = vec![(2, false), (3, true), (4, false), (6, true), (8, true)];
        let curve = KaplanMeierCurve::from_data(data);
        assert_close(curve.greenwood[0], 1.0 / (5.0 * 4.0));
        assert_close(curve.greenwood[1], 1.0 / (5.0 * 4.0) + 1.0 / (3.0 * 2.0));
    }

    #[test]
    fn test_band_contains_estimate() {
        let data = (0..200).map(|t| (t % 50, t % 4 == 0)).collect();
        let curve = KaplanMeierCurve::from_data(data);
        for t in 0..60 {
            let s = curve.survival_at(t);
            let (lower, upper) = curve.band_at(t, 1.96);
            assert!(
                (0.0..=1.0).contains(&lower) && (0.0..=1.0).contains(&upper),
                "band out of range at {t}: [{lower}, {upper}]"
            );
            assert!(lower <= s && s <= upper, "{lower} <= {s} <= {upper} at {t}");
        }
    }

    #[test]
    fn test_band_collapses_at_zero_survival() {
        let data = vec![(1, false), (2, false)];
        let curve = KaplanMeierCurve::from_data(data);
        assert_eq!(curve.survival_at(2), 0.0);
        assert_eq!(curve.band_at(2, 1.96), (0.0, 0.0));
    }

    #[test]
    fn test_tied_event_times() {
        let data = vec![(3, false), (3, false), (3, true), (7, false)];
        let curve = KaplanMeierCurve::from_data(data);
        assert_eq!(curve.times, vec![3, 7]);
        assert_eq!(curve.events, vec![2, 1]);
        assert_close(curve.survival_at(3), 0.5);
        assert_close(curve.survival_at(7), 0.0);
    }

    #[test]
    fn test_median_first_point() {
        let data = vec![(4, false), (4, false), (9, true)];
        let curve = KaplanMeierCurve::from_data(data);
        assert_eq!(curve.median_survival(), Some(4.0));
    }
}
