//! Derivative-free minimization inside a box.
//!
//! [`NelderMead`] runs the downhill simplex method with every trial point
//! projected onto the feasible box, so objectives never see out-of-range
//! arguments from the optimizer itself. Objectives are still free to return
//! `f64::INFINITY` for points they consider infeasible; such vertices are
//! simply ranked last and contracted away.
//!
//! # Examples
//!
//! ```
//! use partcast_stats::optimize::{Bounds, NelderMead};
//!
//! let bounds = Bounds::new(vec![-5.0, -5.0], vec![5.0, 5.0]).unwrap();
//! let rosen = |x: &[f64]| (1.0 - x[0]).powi(2) + 100.0 * (x[1] - x[0] * x[0]).powi(2);
//! let min = NelderMead::default().minimize(rosen, &[-1.0, 2.0], &bounds);
//! assert!(min.converged);
//! assert!((min.point[0] - 1.0).abs() < 1e-3);
//! ```

/// Axis-aligned box constraint `lower[i] <= x[i] <= upper[i]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Bounds {
    lower: Vec<f64>,
    upper: Vec<f64>,
}

impl Bounds {
    /// Returns `None` if the vectors differ in length or any `lower > upper`.
    #[must_use]
    pub fn new(lower: Vec<f64>, upper: Vec<f64>) -> Option<Self> {
        let valid = lower.len() == upper.len()
            && lower.iter().zip(&upper).all(|(lo, hi)| lo <= hi);
        valid.then_some(Self { lower, upper })
    }

    #[must_use]
    pub fn dim(&self) -> usize {
        self.lower.len()
    }

    /// Clamps every coordinate of `x` into the box.
    pub fn project(&self, x: &mut [f64]) {
        for ((v, lo), hi) in x.iter_mut().zip(&self.lower).zip(&self.upper) {
            *v = v.clamp(*lo, *hi);
        }
    }

    /// Returns `true` if `x` lies on a face of the box in any coordinate.
    #[must_use]
    pub fn touches(&self, x: &[f64]) -> bool {
        x.iter()
            .zip(&self.lower)
            .zip(&self.upper)
            .any(|((v, lo), hi)| v <= lo || v >= hi)
    }
}

/// Result of a minimization run.
#[derive(Debug, Clone, PartialEq)]
pub struct Minimum {
    /// Best point found.
    pub point: Vec<f64>,
    /// Objective value at `point`.
    pub value: f64,
    /// Number of simplex iterations performed.
    pub iterations: usize,
    /// `true` if the tolerances were met before `max_iterations`.
    pub converged: bool,
}

/// Bounded Nelder-Mead simplex minimizer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NelderMead {
    /// Iteration cap.
    pub max_iterations: usize,
    /// Convergence threshold on the spread of objective values over the simplex.
    pub f_tolerance: f64,
    /// Convergence threshold on the relative spread of simplex vertices.
    pub x_tolerance: f64,
    /// Relative size of the initial simplex edges.
    pub initial_step: f64,
}

impl Default for NelderMead {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            f_tolerance: 1e-9,
            x_tolerance: 1e-7,
            initial_step: 0.05,
        }
    }
}

const REFLECT: f64 = 1.0;
const EXPAND: f64 = 2.0;
const CONTRACT: f64 = 0.5;
const SHRINK: f64 = 0.5;

impl NelderMead {
    /// Minimizes `f` starting from `start`, never evaluating outside `bounds`.
    ///
    /// # Panics
    ///
    /// Panics if `start` and `bounds` have different dimensions.
    pub fn minimize<F>(&self, mut f: F, start: &[f64], bounds: &Bounds) -> Minimum
    where
        F: FnMut(&[f64]) -> f64,
    {
        assert_eq!(start.len(), bounds.dim(), "dimension mismatch");
        let n = start.len();

        let mut eval = |x: &[f64]| {
            let v = f(x);
            if v.is_nan() { f64::INFINITY } else { v }
        };

        let mut simplex = self.initial_simplex(start, bounds);
        let mut values = simplex.iter().map(|x| eval(x)).collect::<Vec<_>>();

        let mut iterations = 0;
        let mut converged = false;
        while iterations < self.max_iterations {
            sort_simplex(&mut simplex, &mut values);
            if self.has_converged(&simplex, &values) {
                converged = true;
                break;
            }
            iterations += 1;

            let centroid = centroid(&simplex[..n]);
            let worst = &simplex[n];

            let reflected = towards(&centroid, worst, -REFLECT, bounds);
            let f_reflected = eval(&reflected);

            if f_reflected < values[0] {
                let expanded = towards(&centroid, worst, -EXPAND, bounds);
                let f_expanded = eval(&expanded);
                if f_expanded < f_reflected {
                    simplex[n] = expanded;
                    values[n] = f_expanded;
                } else {
                    simplex[n] = reflected;
                    values[n] = f_reflected;
                }
                continue;
            }

            if f_reflected < values[n - 1] {
                simplex[n] = reflected;
                values[n] = f_reflected;
                continue;
            }

            let (contracted, f_contracted) = if f_reflected < values[n] {
                // outside contraction
                let p = towards(&centroid, &reflected, CONTRACT, bounds);
                let v = eval(&p);
                (p, v)
            } else {
                // inside contraction
                let p = towards(&centroid, worst, CONTRACT, bounds);
                let v = eval(&p);
                (p, v)
            };
            if f_contracted < values[n].min(f_reflected) {
                simplex[n] = contracted;
                values[n] = f_contracted;
                continue;
            }

            let best = simplex[0].clone();
            for i in 1..=n {
                simplex[i] = towards(&best, &simplex[i], SHRINK, bounds);
                values[i] = eval(&simplex[i]);
            }
        }
        sort_simplex(&mut simplex, &mut values);

        Minimum {
            point: simplex.swap_remove(0),
            value: values[0],
            iterations,
            converged,
        }
    }

    fn initial_simplex(&self, start: &[f64], bounds: &Bounds) -> Vec<Vec<f64>> {
        let mut origin = start.to_vec();
        bounds.project(&mut origin);

        let mut simplex = vec![origin.clone()];
        for i in 0..origin.len() {
            let mut vertex = origin.clone();
            let step = if origin[i] == 0.0 {
                0.00025
            } else {
                self.initial_step * origin[i].abs()
            };
            vertex[i] += step;
            if vertex[i] > bounds.upper[i] {
                vertex[i] = origin[i] - step;
            }
            bounds.project(&mut vertex);
            simplex.push(vertex);
        }
        simplex
    }

    fn has_converged(&self, simplex: &[Vec<f64>], values: &[f64]) -> bool {
        let best = values[0];
        if !best.is_finite() {
            return false;
        }
        let f_spread = values.iter().map(|v| (v - best).abs()).fold(0.0, f64::max);
        let x_spread = simplex[1..]
            .iter()
            .flat_map(|x| {
                x.iter()
                    .zip(&simplex[0])
                    .map(|(a, b)| (a - b).abs() / b.abs().max(1.0))
            })
            .fold(0.0, f64::max);
        f_spread <= self.f_tolerance && x_spread <= self.x_tolerance
    }
}

fn sort_simplex(simplex: &mut [Vec<f64>], values: &mut [f64]) {
    let mut order = (0..values.len()).collect::<Vec<_>>();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
    let sorted_points = order.iter().map(|&i| simplex[i].clone()).collect::<Vec<_>>();
    let sorted_values = order.iter().map(|&i| values[i]).collect::<Vec<_>>();
    simplex.clone_from_slice(&sorted_points);
    values.copy_from_slice(&sorted_values);
}

#[expect(clippy::cast_precision_loss)]
fn centroid(points: &[Vec<f64>]) -> Vec<f64> {
    let n = points.len() as f64;
    let mut c = vec![0.0; points[0].len()];
    for p in points {
        for (ci, pi) in c.iter_mut().zip(p) {
            *ci += pi / n;
        }
    }
    c
}

/// `from + t * (to - from)`, projected into `bounds`.
fn towards(from: &[f64], to: &[f64], t: f64, bounds: &Bounds) -> Vec<f64> {
    let mut p = from
        .iter()
        .zip(to)
        .map(|(a, b)| a + t * (b - a))
        .collect::<Vec<_>>();
    bounds.project(&mut p);
    p
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_box(dim: usize, half: f64) -> Bounds {
        Bounds::new(vec![-half; dim], vec![half; dim]).unwrap()
    }

    #[test]
    fn test_bounds_validation() {
        assert!(Bounds::new(vec![0.0], vec![1.0, 2.0]).is_none());
        assert!(Bounds::new(vec![2.0], vec![1.0]).is_none());
        assert!(Bounds::new(vec![1.0], vec![1.0]).is_some());
    }

    #[test]
    fn test_quadratic_minimum() {
        let bounds = unit_box(2, 10.0);
        let f = |x: &[f64]| (x[0] - 3.0).powi(2) + 2.0 * (x[1] + 1.0).powi(2);
        let min = NelderMead::default().minimize(f, &[0.0, 0.0], &bounds);
        assert!(min.converged);
        assert!((min.point[0] - 3.0).abs() < 1e-3);
        assert!((min.point[1] + 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_minimum_outside_box_lands_on_face() {
        let bounds = Bounds::new(vec![0.1, 10.0], vec![10.0, 10000.0]).unwrap();
        let f = |x: &[f64]| (x[0] - 50.0).powi(2) + (x[1] - 500.0).powi(2);
        let min = NelderMead::default().minimize(f, &[1.0, 100.0], &bounds);
        assert!((min.point[0] - 10.0).abs() < 1e-6);
        assert!((min.point[1] - 500.0).abs() < 1.0);
        assert!(bounds.touches(&min.point));
    }

    #[test]
    fn test_never_evaluates_outside_box() {
        let bounds = unit_box(2, 1.0);
        let f = |x: &[f64]| {
            assert!(x.iter().all(|v| (-1.0..=1.0).contains(v)), "left box: {x:?}");
            -x[0] - x[1]
        };
        let min = NelderMead::default().minimize(f, &[0.9, 0.9], &bounds);
        assert!((min.value + 2.0).abs() < 1e-4);
    }

    #[test]
    fn test_infinite_region_is_avoided() {
        let bounds = unit_box(1, 5.0);
        let f = |x: &[f64]| {
            if x[0] <= 0.0 {
                f64::INFINITY
            } else {
                (x[0] - 2.0).powi(2)
            }
        };
        let min = NelderMead::default().minimize(f, &[0.5], &bounds);
        assert!((min.point[0] - 2.0).abs() < 1e-3);
    }

    #[test]
    fn test_iteration_cap_reports_not_converged() {
        let bounds = unit_box(2, 10.0);
        let optimizer = NelderMead {
            max_iterations: 2,
            ..NelderMead::default()
        };
        let f = |x: &[f64]| (x[0] - 3.0).powi(2) + (x[1] - 3.0).powi(2);
        let min = optimizer.minimize(f, &[-8.0, -8.0], &bounds);
        assert!(!min.converged);
        assert_eq!(min.iterations, 2);
    }
}
