/// Two-parameter Weibull lifetime distribution.
///
/// Parameterized by shape `k` and scale `λ`, with survival function
/// `S(t) = exp(-(t / λ)^k)`. A shape above 1 models wear-out (increasing hazard),
/// below 1 infant mortality, and exactly 1 reduces to the exponential distribution.
///
/// # Examples
///
/// ```
/// use partcast_stats::weibull::Weibull;
///
/// let dist = Weibull::new(1.0, 100.0).unwrap();
/// assert_eq!(dist.survival(0.0), 1.0);
/// assert!((dist.survival(100.0) - (-1.0f64).exp()).abs() < 1e-12);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Weibull {
    shape: f64,
    scale: f64,
}

/// A single lifetime observation for likelihood evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Lifetime {
    /// Observed (failure) or lower-bound (censored) lifetime.
    pub time: f64,
    /// `true` if the failure was observed, `false` if the unit was censored.
    pub observed: bool,
}

impl Weibull {
    /// Creates a distribution; returns `None` unless both parameters are finite and positive.
    #[must_use]
    pub fn new(shape: f64, scale: f64) -> Option<Self> {
        let valid = |v: f64| v.is_finite() && v > 0.0;
        (valid(shape) && valid(scale)).then_some(Self { shape, scale })
    }

    #[must_use]
    pub fn shape(&self) -> f64 {
        self.shape
    }

    #[must_use]
    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Survival probability `S(t)`; `1.0` for non-positive times.
    #[must_use]
    pub fn survival(&self, time: f64) -> f64 {
        if time <= 0.0 {
            return 1.0;
        }
        (-(time / self.scale).powf(self.shape)).exp()
    }

    /// Natural log of the density at a positive time.
    #[must_use]
    pub fn ln_pdf(&self, time: f64) -> f64 {
        let z = time / self.scale;
        self.shape.ln() - self.scale.ln() + (self.shape - 1.0) * z.ln() - z.powf(self.shape)
    }

    /// Natural log of the survival function at a non-negative time.
    #[must_use]
    pub fn ln_survival(&self, time: f64) -> f64 {
        if time <= 0.0 {
            return 0.0;
        }
        -(time / self.scale).powf(self.shape)
    }

    /// Right-censored log-likelihood of a sample.
    ///
    /// Observed failures contribute `ln f(t)` and censored units contribute
    /// `ln S(t)`. Times are floored at `min_time` before evaluation so that a
    /// failure at `t = 0` still has a finite density.
    ///
    /// # Examples
    ///
    /// ```
    /// use partcast_stats::weibull::{Lifetime, Weibull};
    ///
    /// let data = [
    ///     Lifetime { time: 50.0, observed: true },
    ///     Lifetime { time: 200.0, observed: false },
    /// ];
    /// let good = Weibull::new(1.0, 250.0).unwrap().log_likelihood(&data, 0.5);
    /// let bad = Weibull::new(1.0, 5.0).unwrap().log_likelihood(&data, 0.5);
    /// assert!(good > bad);
    /// ```
    #[must_use]
    pub fn log_likelihood(&self, data: &[Lifetime], min_time: f64) -> f64 {
        data.iter()
            .map(|obs| {
                let time = obs.time.max(min_time);
                if obs.observed {
                    self.ln_pdf(time)
                } else {
                    self.ln_survival(time)
                }
            })
            .sum()
    }
}
