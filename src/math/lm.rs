//! Bounded Levenberg–Marquardt least squares.
//!
//! Minimizes `Σ r_i(p)^2` over the parameters whose `vary` flag is set; the
//! others stay at their current values. Bounds are handled by the change of
//! variables in `math::bounds`, so every trial point is feasible.
//!
//! Each iteration:
//! - forward-difference Jacobian in internal coordinates
//! - damped step from the augmented system (`math::ols`), Marquardt scaling
//! - accept and relax damping if the cost drops, otherwise stiffen and retry

use log::trace;
use nalgebra::{DMatrix, DVector};

use crate::domain::Parameter;
use crate::error::FitError;
use crate::math::bounds::Bound;
use crate::math::ols::{damped_system, solve_least_squares};

const LAMBDA_START: f64 = 1e-3;
const LAMBDA_MIN: f64 = 1e-12;
const LAMBDA_MAX: f64 = 1e16;

/// Stopping rules.
#[derive(Debug, Clone, Copy)]
pub struct LmOptions {
    pub max_iterations: usize,
    pub ftol: f64,
    pub xtol: f64,
}

/// Outcome of one minimization.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LmReport {
    /// Final sum of squared residuals.
    pub cost: f64,
    pub iterations: usize,
    pub nfev: usize,
    pub converged: bool,
}

/// Minimize `Σ r_i^2` in place.
///
/// `residuals(values, out)` receives the full external parameter vector (in
/// `params` order) and must fill `out` with `n_residuals` values. On return
/// `params` holds the best point found; it is left untouched on error.
pub fn minimize<F>(
    params: &mut [Parameter],
    n_residuals: usize,
    residuals: F,
    opts: &LmOptions,
) -> Result<LmReport, FitError>
where
    F: Fn(&[f64], &mut [f64]),
{
    let bounds: Vec<Bound> = params.iter().map(|p| Bound::new(p.min, p.max)).collect();
    let vary: Vec<usize> = (0..params.len()).filter(|&i| params[i].vary).collect();
    let mut full: Vec<f64> = params
        .iter()
        .zip(bounds.iter())
        .map(|(p, b)| b.clamp(p.value))
        .collect();

    let mut problem = Problem {
        bounds: &bounds,
        vary: &vary,
        full: &mut full,
        n_residuals,
        residuals: &residuals,
        nfev: 0,
    };

    let mut u = DVector::from_iterator(vary.len(), vary.iter().map(|&i| bounds[i].to_internal(problem.full[i])));
    let mut r = problem.eval(&u);
    let mut cost = r.norm_squared();
    if !cost.is_finite() {
        return Err(FitError::NonFinite("model residuals at the starting point".to_string()));
    }

    let mut converged = vary.is_empty() || cost == 0.0;
    let mut lambda = LAMBDA_START;
    let mut iterations = 0;

    while !converged && iterations < opts.max_iterations {
        iterations += 1;
        let jac = problem.jacobian(&u, &r);
        let scale: Vec<f64> = jac.column_iter().map(|c| c.norm_squared().max(1e-30)).collect();

        loop {
            let (a, b) = damped_system(&jac, &r, &scale, lambda);
            let Some(step) = solve_least_squares(&a, &b) else {
                lambda *= 10.0;
                if lambda > LAMBDA_MAX {
                    converged = true;
                    break;
                }
                continue;
            };

            let u_new = &u + &step;
            let r_new = problem.eval(&u_new);
            let cost_new = r_new.norm_squared();

            if cost_new.is_finite() && cost_new < cost {
                let reduction = (cost - cost_new) / cost;
                let small_step = step.norm() <= opts.xtol * (u.norm() + opts.xtol);
                u = u_new;
                r = r_new;
                cost = cost_new;
                lambda = (lambda / 10.0).max(LAMBDA_MIN);
                trace!("lm iter {iterations}: cost={cost:.6e} lambda={lambda:.1e}");
                if reduction < opts.ftol || small_step || cost == 0.0 {
                    converged = true;
                }
                break;
            }

            lambda *= 10.0;
            if lambda > LAMBDA_MAX {
                // No downhill step exists at any damping: a local minimum.
                converged = true;
                break;
            }
        }
    }

    // Write back the accepted point (the last eval may have been a rejected trial).
    problem.set_internal(&u);
    for (p, &v) in params.iter_mut().zip(problem.full.iter()) {
        p.value = v;
    }

    Ok(LmReport {
        cost,
        iterations,
        nfev: problem.nfev,
        converged,
    })
}

struct Problem<'a, F> {
    bounds: &'a [Bound],
    vary: &'a [usize],
    full: &'a mut Vec<f64>,
    n_residuals: usize,
    residuals: &'a F,
    nfev: usize,
}

impl<F> Problem<'_, F>
where
    F: Fn(&[f64], &mut [f64]),
{
    fn set_internal(&mut self, u: &DVector<f64>) {
        for (k, &i) in self.vary.iter().enumerate() {
            self.full[i] = self.bounds[i].to_external(u[k]);
        }
    }

    fn eval(&mut self, u: &DVector<f64>) -> DVector<f64> {
        self.set_internal(u);
        let mut out = vec![0.0; self.n_residuals];
        (self.residuals)(&self.full[..], &mut out);
        self.nfev += 1;
        DVector::from_vec(out)
    }

    fn jacobian(&mut self, u: &DVector<f64>, r: &DVector<f64>) -> DMatrix<f64> {
        let n = self.n_residuals;
        let p = u.len();
        let mut jac = DMatrix::<f64>::zeros(n, p);
        let eps = f64::EPSILON.sqrt();

        for j in 0..p {
            let h = eps * u[j].abs().max(1.0);
            let mut shifted = u.clone();
            shifted[j] += h;
            let mut col = (self.eval(&shifted) - r) / h;
            if col.iter().any(|v| !v.is_finite()) {
                shifted[j] = u[j] - h;
                col = (r - self.eval(&shifted)) / h;
            }
            if col.iter().all(|v| v.is_finite()) {
                jac.set_column(j, &col);
            }
        }
        jac
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> LmOptions {
        LmOptions {
            max_iterations: 200,
            ftol: 1e-12,
            xtol: 1e-12,
        }
    }

    #[test]
    fn recovers_exponential_decay() {
        let ts: Vec<f64> = (0..20).map(|i| i as f64 * 0.25).collect();
        let ys: Vec<f64> = ts.iter().map(|t| 3.0 * (-0.7 * t).exp()).collect();

        let mut params = vec![Parameter::free("a", 1.0), Parameter::bounded("k", 0.2, Some(0.0), None)];
        let report = minimize(
            &mut params,
            ts.len(),
            |p, out| {
                for (i, t) in ts.iter().enumerate() {
                    out[i] = p[0] * (-p[1] * t).exp() - ys[i];
                }
            },
            &opts(),
        )
        .unwrap();

        assert!(report.converged);
        assert!(report.cost < 1e-12, "cost {}", report.cost);
        assert!((params[0].value - 3.0).abs() < 1e-5);
        assert!((params[1].value - 0.7).abs() < 1e-5);
    }

    #[test]
    fn fixed_parameters_do_not_move() {
        let xs = [0.0, 1.0, 2.0, 3.0];
        let mut params = vec![Parameter::free("m", 0.0), Parameter::free("b", 5.0)];
        params[1].vary = false;
        minimize(
            &mut params,
            xs.len(),
            |p, out| {
                for (i, x) in xs.iter().enumerate() {
                    out[i] = p[0] * x + p[1] - (2.0 * x + 1.0);
                }
            },
            &opts(),
        )
        .unwrap();
        assert_eq!(params[1].value, 5.0);
        // Best slope with b pinned at 5: minimize Σ (m x + 4 - 2x)^2 over m.
        // Σx(mx - 2x + 4) = 0 => 14m - 28 + 24 = 0 => m = 2/7
        assert!((params[0].value - 2.0 / 7.0).abs() < 1e-6);
    }

    #[test]
    fn bounds_are_respected() {
        let mut params = vec![Parameter::bounded("c", 0.5, Some(0.0), Some(1.0))];
        minimize(&mut params, 1, |p, out| out[0] = p[0] - 5.0, &opts()).unwrap();
        assert!(params[0].value <= 1.0);
        assert!(params[0].value > 0.99);
    }

    #[test]
    fn non_finite_start_is_an_error() {
        let mut params = vec![Parameter::free("c", 0.0)];
        let err = minimize(&mut params, 1, |_, out| out[0] = f64::NAN, &opts()).unwrap_err();
        assert!(matches!(err, FitError::NonFinite(_)));
    }
}
