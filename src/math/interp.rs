//! Piecewise-linear interpolation over unsorted sample points.

/// Interpolate `y` at `x` through the points `(xs, ys)`.
///
/// The points are ordered by x first, so sweeps in either direction work.
/// Outside the sampled range the nearest end value is returned. Returns `NaN`
/// when there are no points.
pub fn interp(x: f64, xs: &[f64], ys: &[f64]) -> f64 {
    let mut pts: Vec<(f64, f64)> = xs.iter().copied().zip(ys.iter().copied()).collect();
    if pts.is_empty() || x.is_nan() {
        return f64::NAN;
    }
    pts.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

    let (first, last) = (pts[0], pts[pts.len() - 1]);
    if x <= first.0 {
        return first.1;
    }
    if x >= last.0 {
        return last.1;
    }

    // First point strictly right of x; x > first.0 guarantees idx >= 1.
    let idx = pts.partition_point(|p| p.0 <= x);
    let (x1, y1) = pts[idx - 1];
    let (x2, y2) = pts[idx];
    if x2 == x1 {
        return y1;
    }
    y1 + (y2 - y1) * (x - x1) / (x2 - x1)
}

/// Solve for the x where the segment `(x1, y1)-(x2, y2)` reaches `level`.
///
/// Falls back to the segment midpoint when the segment is flat.
pub fn crossing(x1: f64, y1: f64, x2: f64, y2: f64, level: f64) -> f64 {
    if y2 == y1 {
        return 0.5 * (x1 + x2);
    }
    x1 + (level - y1) * (x2 - x1) / (y2 - y1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interpolates_and_clamps() {
        let xs = [0.0, 1.0, 2.0];
        let ys = [0.0, 10.0, 0.0];
        assert_eq!(interp(0.5, &xs, &ys), 5.0);
        assert_eq!(interp(1.0, &xs, &ys), 10.0);
        assert_eq!(interp(-4.0, &xs, &ys), 0.0);
        assert_eq!(interp(9.0, &xs, &ys), 0.0);
        assert!(interp(1.0, &[], &[]).is_nan());
    }

    #[test]
    fn descending_sweeps_interpolate_the_same() {
        let up = interp(0.25, &[0.0, 1.0], &[2.0, 6.0]);
        let down = interp(0.25, &[1.0, 0.0], &[6.0, 2.0]);
        assert_eq!(up, 3.0);
        assert_eq!(up, down);
    }

    #[test]
    fn crossing_solves_the_segment() {
        assert_eq!(crossing(0.0, 0.0, 2.0, 10.0, 5.0), 1.0);
        assert_eq!(crossing(0.0, 3.0, 2.0, 3.0, 3.0), 1.0);
    }
}
