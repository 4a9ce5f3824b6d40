//! Box constraints by change of variables.
//!
//! The minimizer works on unconstrained "internal" coordinates; each bounded
//! parameter is mapped to its external value so that every internal value
//! lands inside the bounds:
//!
//! - two-sided: `v = min + (sin(u) + 1) * (max - min) / 2`
//! - lower only: `v = min - 1 + sqrt(u^2 + 1)`
//! - upper only: `v = max + 1 - sqrt(u^2 + 1)`

/// The constraint attached to one parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Bound {
    Free,
    Lower(f64),
    Upper(f64),
    Both(f64, f64),
}

impl Bound {
    pub fn new(min: Option<f64>, max: Option<f64>) -> Self {
        let finite = |v: Option<f64>| v.filter(|x| x.is_finite());
        match (finite(min), finite(max)) {
            (None, None) => Bound::Free,
            (Some(lo), None) => Bound::Lower(lo),
            (None, Some(hi)) => Bound::Upper(hi),
            (Some(lo), Some(hi)) => Bound::Both(lo.min(hi), lo.max(hi)),
        }
    }

    /// Clamp an external value into the feasible set.
    pub fn clamp(self, v: f64) -> f64 {
        match self {
            Bound::Free => v,
            Bound::Lower(lo) => v.max(lo),
            Bound::Upper(hi) => v.min(hi),
            Bound::Both(lo, hi) => v.clamp(lo, hi),
        }
    }

    pub fn to_internal(self, v: f64) -> f64 {
        let v = self.clamp(v);
        match self {
            Bound::Free => v,
            Bound::Lower(lo) => ((v - lo + 1.0).powi(2) - 1.0).max(0.0).sqrt(),
            Bound::Upper(hi) => ((hi - v + 1.0).powi(2) - 1.0).max(0.0).sqrt(),
            Bound::Both(lo, hi) => {
                if hi == lo {
                    0.0
                } else {
                    (2.0 * (v - lo) / (hi - lo) - 1.0).clamp(-1.0, 1.0).asin()
                }
            }
        }
    }

    pub fn to_external(self, u: f64) -> f64 {
        match self {
            Bound::Free => u,
            Bound::Lower(lo) => lo - 1.0 + (u * u + 1.0).sqrt(),
            Bound::Upper(hi) => hi + 1.0 - (u * u + 1.0).sqrt(),
            Bound::Both(lo, hi) => lo + (u.sin() + 1.0) * (hi - lo) * 0.5,
        }
    }
}
