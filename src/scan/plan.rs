//! Scan positions relative to the motor's starting point.

use serde::{Deserialize, Serialize};

use crate::domain::ScanRange;
use crate::error::AppError;

/// Extent of a scan relative to the current position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ScanSpan {
    /// Total width, centered on the current position.
    Centered(f64),
    /// Start and stop offsets from the current position.
    Relative(f64, f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScanPlan {
    pub span: ScanSpan,
    /// Number of points, endpoints included.
    pub num: usize,
}

impl ScanPlan {
    pub fn centered(width: f64, num: usize) -> Self {
        Self {
            span: ScanSpan::Centered(width),
            num,
        }
    }

    pub fn relative(lo: f64, hi: f64, num: usize) -> Self {
        Self {
            span: ScanSpan::Relative(lo, hi),
            num,
        }
    }

    /// Turn the plan into absolute positions around `initial`.
    pub fn resolve(&self, initial: f64) -> Result<ResolvedPlan, AppError> {
        if self.num < 2 {
            return Err(AppError::new(2, format!("A scan needs at least 2 points (got {}).", self.num)));
        }
        let (start, stop) = match self.span {
            ScanSpan::Centered(width) => (initial - width / 2.0, initial + width / 2.0),
            ScanSpan::Relative(lo, hi) => (initial + lo, initial + hi),
        };
        if !(start.is_finite() && stop.is_finite()) || start == stop {
            return Err(AppError::new(2, format!("Invalid scan range [{start}, {stop}].")));
        }

        let step = (stop - start) / (self.num - 1) as f64;
        let mut positions: Vec<f64> = (0..self.num).map(|i| start + step * i as f64).collect();
        positions[self.num - 1] = stop;

        Ok(ResolvedPlan {
            start,
            stop,
            positions,
        })
    }
}

/// Absolute positions in sweep order (`start` first, may be descending).
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPlan {
    pub start: f64,
    pub stop: f64,
    pub positions: Vec<f64>,
}

impl ResolvedPlan {
    pub fn range(&self) -> ScanRange {
        ScanRange::new(self.start, self.stop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centered_plan_includes_both_ends() {
        let plan = ScanPlan::centered(2.0, 5).resolve(10.0).unwrap();
        assert_eq!(plan.positions, vec![9.0, 9.5, 10.0, 10.5, 11.0]);
        assert_eq!(plan.range().span(), 2.0);
    }

    #[test]
    fn relative_plan_may_sweep_downward() {
        let plan = ScanPlan::relative(1.0, -1.0, 3).resolve(0.0).unwrap();
        assert_eq!(plan.positions, vec![1.0, 0.0, -1.0]);
        assert_eq!(plan.range(), ScanRange::new(-1.0, 1.0));
    }

    #[test]
    fn degenerate_plans_are_rejected() {
        assert!(ScanPlan::centered(2.0, 1).resolve(0.0).is_err());
        assert!(ScanPlan::centered(0.0, 5).resolve(0.0).is_err());
    }
}
