//! Fit-free statistics: extremes, center of mass, half maximum.

use log::debug;

use crate::domain::{ScanSample, StatResult, Statistic};
use crate::error::FitError;
use crate::math::{crossing, interp};

/// Compute one statistic.
pub fn compute_stat(stat: Statistic, sample: &ScanSample) -> Result<StatResult, FitError> {
    compute_stats(&[stat], sample)
}

/// Compute several statistics into one result.
///
/// Every statistic is checked against the sample size before anything is
/// computed, so a failure never leaves a partial result behind. `x0`/`y0`
/// come from the last statistic in the list.
pub fn compute_stats(stats: &[Statistic], sample: &ScanSample) -> Result<StatResult, FitError> {
    for &stat in stats {
        if sample.len() < stat.min_points() {
            return Err(FitError::insufficient(
                format!("the {stat} statistic"),
                stat.min_points(),
                sample.len(),
            ));
        }
    }

    let xs = sample.xs();
    let ys = sample.ys();
    let mut result = StatResult::default();

    for &stat in stats {
        let (x0, y0) = match stat {
            Statistic::Max => {
                let i = argmax(&ys);
                (xs[i], ys[i])
            }
            Statistic::Min => {
                let i = argmin(&ys);
                (xs[i], ys[i])
            }
            Statistic::Com => {
                let x0 = center_of_mass(&xs, &ys)?;
                (x0, interp(x0, &xs, &ys))
            }
            Statistic::Hm => {
                let x0 = half_max_nearest(&xs, &ys);
                (x0, interp(x0, &xs, &ys))
            }
            Statistic::Hmi => {
                let x0 = half_max_interpolated(&xs, &ys);
                (x0, interp(x0, &xs, &ys))
            }
        };
        debug!("{stat}: x0={x0:.6} y0={y0:.6}");

        let (x_key, y_key) = stat.keys();
        result.values.insert(x_key.to_string(), x0);
        result.values.insert(y_key.to_string(), y0);
        result.x0 = Some(x0);
        result.y0 = Some(y0);
    }

    Ok(result)
}

/// Resolve statistic names first, then compute them all.
pub fn compute_stats_by_name<S: AsRef<str>>(names: &[S], sample: &ScanSample) -> Result<StatResult, FitError> {
    let stats = names
        .iter()
        .map(|n| Statistic::resolve(n.as_ref()))
        .collect::<Result<Vec<_>, _>>()?;
    compute_stats(&stats, sample)
}

/// Index of the first largest value.
pub(crate) fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate() {
        if v > values[best] {
            best = i;
        }
    }
    best
}

/// Index of the first smallest value.
pub(crate) fn argmin(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate() {
        if v < values[best] {
            best = i;
        }
    }
    best
}

fn center_of_mass(xs: &[f64], ys: &[f64]) -> Result<f64, FitError> {
    let total: f64 = ys.iter().sum();
    if total == 0.0 || !total.is_finite() {
        return Err(FitError::NonFinite(format!(
            "center of mass is undefined (total intensity {total})"
        )));
    }
    let weighted: f64 = xs.iter().zip(ys.iter()).map(|(x, y)| x * y).sum();
    Ok(weighted / total)
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Average the per-side estimates; fall back to one side, then to mean(x).
fn combine(left: Option<f64>, right: Option<f64>, xs: &[f64]) -> f64 {
    match (left, right) {
        (Some(l), Some(r)) => 0.5 * (l + r),
        (Some(v), None) | (None, Some(v)) => v,
        (None, None) => mean(xs),
    }
}

/// Half maximum from the sample nearest to `0.5 * peak` on each side of the peak.
///
/// The right side includes the peak itself. A side only contributes if it dips
/// below the half-maximum level.
pub(crate) fn half_max_nearest(xs: &[f64], ys: &[f64]) -> f64 {
    let peak = argmax(ys);
    let hm = 0.5 * ys[peak];

    let nearest = |range: std::ops::Range<usize>| -> Option<f64> {
        let side = &ys[range.clone()];
        let dips = side.iter().any(|&y| y < hm);
        if !dips {
            return None;
        }
        let mut best = range.start;
        for i in range {
            if (ys[i] - hm).abs() < (ys[best] - hm).abs() {
                best = i;
            }
        }
        Some(xs[best])
    };

    combine(nearest(0..peak), nearest(peak..ys.len()), xs)
}

/// Half maximum from the linear crossing between the two samples that bracket
/// `0.5 * peak` on each side of the peak.
pub(crate) fn half_max_interpolated(xs: &[f64], ys: &[f64]) -> f64 {
    let peak = argmax(ys);
    let hm = 0.5 * ys[peak];
    let straddles = |side: &[f64]| side.iter().any(|&y| y < hm) && side.iter().any(|&y| y > hm);

    // Rising side: last sample below the level and its successor, which may be the peak.
    let left = if straddles(&ys[..=peak]) {
        (0..peak)
            .rev()
            .find(|&i| ys[i] < hm)
            .map(|i| crossing(xs[i], ys[i], xs[i + 1], ys[i + 1], hm))
    } else {
        None
    };

    // Falling side: first sample below the level and its predecessor.
    let right = if straddles(&ys[peak..]) {
        (peak + 1..ys.len())
            .find(|&j| ys[j] < hm)
            .map(|j| crossing(xs[j - 1], ys[j - 1], xs[j], ys[j], hm))
    } else {
        None
    };

    combine(left, right, xs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gaussian_sample(n: usize, x0: f64, sigma: f64) -> ScanSample {
        let xs: Vec<f64> = (0..n).map(|i| i as f64 * 10.0 / (n - 1) as f64).collect();
        let ys: Vec<f64> = xs
            .iter()
            .map(|x| 100.0 * (-(x - x0).powi(2) / (2.0 * sigma * sigma)).exp())
            .collect();
        ScanSample::from_xy(&xs, &ys)
    }

    #[test]
    fn extremes_report_their_points() {
        let s = ScanSample::from_xy(&[0.0, 1.0, 2.0, 3.0], &[1.0, 7.0, -2.0, 7.0]);
        let r = compute_stats(&[Statistic::Max, Statistic::Min], &s).unwrap();
        assert_eq!(r.get("x_max"), Some(1.0));
        assert_eq!(r.get("y_max"), Some(7.0));
        assert_eq!(r.get("x_min"), Some(2.0));
        assert_eq!(r.x0, Some(2.0));
        assert_eq!(r.y0, Some(-2.0));
    }

    #[test]
    fn center_of_mass_stays_inside_the_range() {
        let s = ScanSample::from_xy(&[-1.0, 0.0, 1.0, 2.0, 3.0], &[0.0, 1.0, 5.0, 2.0, 0.5]);
        let r = compute_stat(Statistic::Com, &s).unwrap();
        let x0 = r.get("x_COM").unwrap();
        assert!((-1.0..=3.0).contains(&x0));
        assert!((x0 - (0.0 + 5.0 + 4.0 + 1.5) / 8.5).abs() < 1e-12);
        assert_eq!(r.get("y_COM"), Some(interp(x0, &s.xs(), &s.ys())));
    }

    #[test]
    fn zero_intensity_has_no_center_of_mass() {
        let s = ScanSample::from_xy(&[0.0, 1.0], &[0.0, 0.0]);
        assert!(matches!(compute_stat(Statistic::Com, &s), Err(FitError::NonFinite(_))));
    }

    #[test]
    fn half_max_on_a_symmetric_peak_finds_the_center() {
        let s = gaussian_sample(41, 5.0, 1.0);
        let hm = compute_stat(Statistic::Hm, &s).unwrap();
        let hmi = compute_stat(Statistic::Hmi, &s).unwrap();
        assert!((hm.get("x_HM").unwrap() - 5.0).abs() < 1e-9);
        assert!((hmi.get("x_HM").unwrap() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn hm_and_hmi_agree_within_one_spacing() {
        let s = gaussian_sample(21, 3.7, 1.3);
        let spacing = 10.0 / 20.0;
        let hm = compute_stat(Statistic::Hm, &s).unwrap().x0.unwrap();
        let hmi = compute_stat(Statistic::Hmi, &s).unwrap().x0.unwrap();
        assert!((hm - hmi).abs() <= spacing, "HM={hm} HMi={hmi}");
    }

    #[test]
    fn one_sided_half_max_uses_the_crossing_side() {
        // Falling edge only: peak at the first sample.
        let xs = [0.0, 1.0, 2.0, 3.0, 4.0];
        let ys = [10.0, 9.0, 6.0, 2.0, 1.0];
        let x0 = half_max_interpolated(&xs, &ys);
        assert!((x0 - 2.25).abs() < 1e-12);
        assert_eq!(half_max_nearest(&xs, &ys), 2.0);
    }

    #[test]
    fn skewed_peak_keeps_the_rising_crossing_next_to_the_peak() {
        // Only the peak itself is above half maximum on the rising side.
        let xs: Vec<f64> = (0..=10).map(f64::from).collect();
        let ys = [10.0, 40.0, 100.0, 95.0, 88.0, 80.0, 70.0, 60.0, 50.0, 40.0, 30.0];
        let s = ScanSample::from_xy(&xs, &ys);

        let hm = compute_stat(Statistic::Hm, &s).unwrap().x0.unwrap();
        let hmi = compute_stat(Statistic::Hmi, &s).unwrap().x0.unwrap();
        let rising = 1.0 + 10.0 / 60.0;
        assert!((hmi - 0.5 * (rising + 8.0)).abs() < 1e-12, "HMi={hmi}");
        assert!((hm - hmi).abs() <= 1.0, "HM={hm} HMi={hmi}");
    }

    #[test]
    fn flat_sample_falls_back_to_mean_position() {
        let s = ScanSample::from_xy(&[0.0, 1.0, 2.0, 3.0], &[5.0; 4]);
        let r = compute_stat(Statistic::Hm, &s).unwrap();
        assert_eq!(r.x0, Some(1.5));
    }

    #[test]
    fn two_points_are_not_enough_for_half_max() {
        let s = ScanSample::from_xy(&[0.0, 1.0], &[1.0, 2.0]);
        let err = compute_stat(Statistic::Hm, &s).unwrap_err();
        assert_eq!(err, FitError::insufficient("the HM statistic", 4, 2));
    }

    #[test]
    fn unknown_statistic_is_rejected_without_partial_result() {
        let s = ScanSample::from_xy(&[0.0, 1.0, 2.0, 3.0], &[0.0, 1.0, 0.0, 0.0]);
        let err = compute_stats_by_name(&["max", "median"], &s).unwrap_err();
        assert_eq!(err, FitError::UnknownStatistic("median".to_string()));
    }

    #[test]
    fn repeated_calls_are_identical() {
        let s = gaussian_sample(15, 4.2, 0.8);
        let all = Statistic::ALL;
        assert_eq!(compute_stats(&all, &s).unwrap(), compute_stats(&all, &s).unwrap());
    }
}
