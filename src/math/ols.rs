//! Linear least squares via SVD.
//!
//! Each Levenberg–Marquardt step solves a small damped system
//!
//! ```text
//! minimize |J δ + r|^2 + λ Σ d_j δ_j^2
//! ```
//!
//! which is itself an ordinary least-squares problem on the augmented matrix
//! `[J; sqrt(λ D)]` with right-hand side `[-r; 0]`. The matrix is tall (points
//! plus parameters rows, at most a handful of columns), so SVD is cheap and
//! copes with the near-collinear columns that flat shapes produce.
//! (Nalgebra's `QR::solve` expects square systems and panics otherwise.)

use nalgebra::{DMatrix, DVector};

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(a: &DMatrix<f64>, b: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = a.clone().svd(true, true);

    // Progressively looser singular-value cutoffs before giving up.
    for &tol in &[1e-12, 1e-10, 1e-8] {
        if let Ok(x) = svd.solve(b, tol) {
            if x.iter().all(|v| v.is_finite()) {
                return Some(x);
            }
        }
    }

    None
}

/// Build `[J; diag(sqrt(lambda * d))]` and `[-r; 0]` for one damped step.
pub fn damped_system(
    jacobian: &DMatrix<f64>,
    residuals: &DVector<f64>,
    scale: &[f64],
    lambda: f64,
) -> (DMatrix<f64>, DVector<f64>) {
    let n = jacobian.nrows();
    let p = jacobian.ncols();
    let mut a = DMatrix::<f64>::zeros(n + p, p);
    a.view_mut((0, 0), (n, p)).copy_from(jacobian);
    for (j, &d) in scale.iter().enumerate().take(p) {
        a[(n + j, j)] = (lambda * d).sqrt();
    }

    let mut b = DVector::<f64>::zeros(n + p);
    for i in 0..n {
        b[i] = -residuals[i];
    }
    (a, b)
}
