//! Line-profile summary of a recorded scan.
//!
//! The readings (or their point-to-point differences) are normalized to 0..1
//! and the positions where they cross a level are collected. Two or more
//! crossings describe a peak: its width is the distance between the outer
//! crossings and its center lies halfway between the first two. With fewer
//! crossings the profile is taken for a step and fitted with
//! `base - amplitude * erf(k * (x - x0))`.

use log::{debug, info};
use scilib::math::basic::erf;

use crate::domain::{FitOptions, Parameter, ProfileResult, ProfileShape, ScanSample, StepFit};
use crate::error::FitError;
use crate::fit::fitter::{quality_of, to_map, two_stage};
use crate::math::crossing;
use crate::stats::statistic::argmax;

/// Normalized crossing level used when none is given.
pub const DEFAULT_SHIFT: f64 = 0.5;

/// Fewest points of the analyzed profile (after differencing).
pub const MIN_PROFILE_POINTS: usize = 4;

/// Starting erf steepness, in inverse scan spans.
const STEP_K_SPANS: f64 = 10.0;

/// Profile statistics with default fit settings for the step fallback.
pub fn profile_stats(sample: &ScanSample, shift: f64, derivative: bool) -> Result<ProfileResult, FitError> {
    profile_stats_with(sample, shift, derivative, &FitOptions::default())
}

/// Profile statistics of `sample` at normalized level `shift`.
///
/// With `derivative`, the profile is `y[i] - y[i-1]` placed at `x[i]`.
pub fn profile_stats_with(
    sample: &ScanSample,
    shift: f64,
    derivative: bool,
    opts: &FitOptions,
) -> Result<ProfileResult, FitError> {
    if !(shift > 0.0 && shift < 1.0) {
        return Err(FitError::InvalidOption(format!(
            "profile level must lie strictly between 0 and 1, got {shift}"
        )));
    }
    let needed = MIN_PROFILE_POINTS + usize::from(derivative);
    if sample.len() < needed {
        return Err(FitError::insufficient("a line profile", needed, sample.len()));
    }

    let (xs, ys) = profile_series(sample, derivative);

    let i = argmax(&ys);
    let (peak_x, peak_y) = (xs[i], ys[i]);
    let total: f64 = ys.iter().sum();
    let com = if total != 0.0 {
        xs.iter().zip(&ys).map(|(x, y)| x * y).sum::<f64>() / total
    } else {
        f64::NAN
    };

    let lo = ys.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = ys.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !(hi > lo) {
        return Err(FitError::NonFinite("the profile is flat and cannot be normalized".to_string()));
    }
    let norm: Vec<f64> = ys.iter().map(|y| (y - lo) / (hi - lo)).collect();

    let roots = level_crossings(&xs, &norm, shift);
    debug!("profile crossings at level {shift}: {roots:?}");

    let mut result = ProfileResult {
        derivative,
        shift,
        peak_x,
        peak_y,
        com,
        shape: ProfileShape::Peak,
        roots,
        cen: f64::NAN,
        width: f64::NAN,
        step: None,
    };

    if result.roots.len() >= 2 {
        let r = &result.roots;
        result.width = (r[r.len() - 1] - r[0]).abs();
        result.cen = r[0] + 0.5 * (r[1] - r[0]);
        return Ok(result);
    }

    info!("no peak at level {shift}; fitting an erf step");
    let (step, x0, k) = fit_step(&xs, &norm, &result.roots, opts)?;
    result.shape = ProfileShape::Step;
    result.cen = x0;
    result.width = 1.0 / k.abs();
    result.step = Some(step);
    Ok(result)
}

fn profile_series(sample: &ScanSample, derivative: bool) -> (Vec<f64>, Vec<f64>) {
    let xs = sample.xs();
    let ys = sample.ys();
    if !derivative {
        return (xs, ys);
    }
    let diffs = ys.windows(2).map(|w| w[1] - w[0]).collect();
    (xs[1..].to_vec(), diffs)
}

/// Positions where `ys` passes `level`, in acquisition order.
///
/// A point exactly at the level counts as below it.
fn level_crossings(xs: &[f64], ys: &[f64], level: f64) -> Vec<f64> {
    let mut roots = Vec::new();
    let mut above = ys[0] > level;
    for i in 1..ys.len() {
        let now = ys[i] > level;
        if now != above {
            roots.push(crossing(xs[i - 1], ys[i - 1], xs[i], ys[i], level));
            above = now;
        }
    }
    roots
}

fn step_model(x: f64, p: &[f64]) -> f64 {
    let (x0, k, amplitude, base) = (p[0], p[1], p[2], p[3]);
    base - amplitude * erf(k * (x - x0))
}

/// Fit the normalized step; returns the fit with its center and steepness.
fn fit_step(xs: &[f64], norm: &[f64], roots: &[f64], opts: &FitOptions) -> Result<(StepFit, f64, f64), FitError> {
    let sample = ScanSample::from_xy(xs, norm);
    let range = sample
        .range()
        .filter(|r| r.span() > 0.0)
        .ok_or_else(|| FitError::NonFinite("the profile has no positional extent".to_string()))?;
    let span = range.span();

    let x0 = roots
        .first()
        .copied()
        .unwrap_or_else(|| xs.iter().sum::<f64>() / xs.len() as f64);
    let falling = norm[0] > norm[norm.len() - 1];
    let mut params = vec![
        Parameter::bounded("x0", x0, Some(range.start - span * 0.1), Some(range.stop + span * 0.1)).clamped(),
        Parameter::free("k", STEP_K_SPANS / span),
        Parameter::free("amplitude", if falling { 0.5 } else { -0.5 }),
        Parameter::free("base", 0.5),
    ];

    let (stage1, stage2) = two_stage(&mut params, &["x0"], &sample, opts, step_model)?;
    let values: Vec<f64> = params.iter().map(|p| p.value).collect();
    let quality = quality_of(&sample, &stage2, stage1.map_or(0, |s| s.nfev), |x| step_model(x, &values));
    debug!("erf step fit: {values:?} avg deviation {:.2}%", quality.avg_deviation * 100.0);

    let step = StepFit {
        params: to_map(&params),
        quality,
    };
    Ok((step, values[0], values[1]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linspace(a: f64, b: f64, n: usize) -> Vec<f64> {
        (0..n).map(|i| a + (b - a) * i as f64 / (n - 1) as f64).collect()
    }

    fn sample_of(xs: &[f64], f: impl Fn(f64) -> f64) -> ScanSample {
        let ys: Vec<f64> = xs.iter().map(|&x| f(x)).collect();
        ScanSample::from_xy(xs, &ys)
    }

    #[test]
    fn peak_profile_reports_width_and_center_from_crossings() {
        let xs = linspace(0.0, 10.0, 101);
        let sigma = 0.8;
        let s = sample_of(&xs, |x| 10.0 + 100.0 * (-(x - 4.2_f64).powi(2) / (2.0 * sigma * sigma)).exp());

        let p = profile_stats(&s, DEFAULT_SHIFT, false).unwrap();

        assert_eq!(p.shape, ProfileShape::Peak);
        assert!(p.step.is_none());
        assert_eq!(p.roots.len(), 2);
        assert!((p.peak_x - 4.2).abs() < 1e-12);
        assert!((p.peak_y - 110.0).abs() < 1e-9);
        assert!((p.cen - 4.2).abs() < 1e-9, "cen={}", p.cen);
        let fwhm = 2.0 * (2.0 * 2.0_f64.ln()).sqrt() * sigma;
        assert!((p.width - fwhm).abs() < 0.01, "width={} fwhm={fwhm}", p.width);
        // The flat background pulls the center of mass toward the middle of the range.
        assert!(p.com > 4.2 && p.com < 5.0, "com={}", p.com);
    }

    #[test]
    fn step_profile_falls_back_to_an_erf_fit() {
        let xs = linspace(0.0, 10.0, 41);
        let s = sample_of(&xs, |x| 100.0 - 80.0 * erf(2.0 * (x - 5.0)));

        let p = profile_stats(&s, DEFAULT_SHIFT, false).unwrap();

        assert_eq!(p.shape, ProfileShape::Step);
        assert_eq!(p.roots.len(), 1);
        let step = p.step.as_ref().unwrap();
        assert!((p.cen - 5.0).abs() < 1e-4, "cen={}", p.cen);
        assert!((step.params["k"].abs() - 2.0).abs() < 1e-3, "{:?}", step.params);
        assert!((p.width - 0.5).abs() < 1e-3);
        assert!(!step.quality.is_bad(0.06));
        assert!((p.peak_x - 0.0).abs() < 1e-12);
    }

    #[test]
    fn derivative_of_a_rising_step_is_a_peak() {
        let xs = linspace(0.0, 10.0, 41);
        let s = sample_of(&xs, |x| 20.0 + 80.0 * (1.0 + erf(2.0 * (x - 5.0))));

        let p = profile_stats(&s, DEFAULT_SHIFT, true).unwrap();

        assert!(p.derivative);
        assert_eq!(p.shape, ProfileShape::Peak);
        // Each difference sits at the later of its two positions.
        assert!((p.cen - 5.125).abs() < 1e-6, "cen={}", p.cen);
        assert!((p.peak_x - 5.0).abs() < 1e-12 || (p.peak_x - 5.25).abs() < 1e-12);
    }

    #[test]
    fn level_outside_the_unit_interval_is_rejected() {
        let s = sample_of(&linspace(0.0, 1.0, 5), |x| x);
        for shift in [0.0, 1.0, -0.2, f64::NAN] {
            assert!(matches!(profile_stats(&s, shift, false), Err(FitError::InvalidOption(_))));
        }
    }

    #[test]
    fn flat_or_short_profiles_are_errors() {
        let flat = sample_of(&linspace(0.0, 1.0, 5), |_| 3.0);
        assert!(matches!(profile_stats(&flat, 0.5, false), Err(FitError::NonFinite(_))));

        let short = sample_of(&linspace(0.0, 1.0, 4), |x| x);
        assert_eq!(
            profile_stats(&short, 0.5, true).unwrap_err(),
            FitError::insufficient("a line profile", 5, 4)
        );
    }

    #[test]
    fn crossings_follow_acquisition_order() {
        let xs = [0.0, 1.0, 2.0, 3.0, 4.0];
        let ys = [0.0, 1.0, 0.0, 1.0, 0.0];
        assert_eq!(level_crossings(&xs, &ys, 0.5), vec![0.5, 1.5, 2.5, 3.5]);
    }
}
