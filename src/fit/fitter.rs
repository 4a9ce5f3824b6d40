//! Two-stage nonlinear fit of a composite model to one scan.
//!
//! Given:
//! - scan points `(x_i, y_i)`
//! - a primary model plus optional backgrounds
//! - the scan range (bounds are always derived from it)
//!
//! we run two least-squares passes:
//! - stage 1: only the center moves; every shape and background parameter is
//!   pinned at its initial guess
//! - stage 2: everything moves, starting from the stage-1 solution
//!
//! Fitting the center alone first keeps a poor width or amplitude guess from
//! dragging the fit into a wrong local minimum.

use std::collections::BTreeMap;

use log::{debug, warn};

use crate::domain::{FitOptions, FitQuality, FitResult, ModelKind, Parameter, ScanRange, ScanSample};
use crate::error::FitError;
use crate::math::{LmOptions, LmReport, minimize};
use crate::models::CompositeModel;

/// Fewest points any fit accepts.
pub const MIN_FIT_POINTS: usize = 3;

/// Fit by model name; names (aliases included) are checked before any numeric work.
pub fn fit<S: AsRef<str>>(
    model_name: &str,
    sample: &ScanSample,
    backgrounds: &[S],
    opts: &FitOptions,
) -> Result<FitResult, FitError> {
    let model = CompositeModel::from_names(model_name, backgrounds)?;
    fit_composite(&model, sample, None, opts)
}

/// Fit a resolved model with backgrounds, using the sample's own x-range.
pub fn fit_scan_data(
    model: ModelKind,
    sample: &ScanSample,
    backgrounds: &[ModelKind],
    opts: &FitOptions,
) -> Result<FitResult, FitError> {
    let model = CompositeModel::new(model, backgrounds)?;
    fit_composite(&model, sample, None, opts)
}

/// Fit a composite model.
///
/// `range` overrides the x-range used to seed and bound the parameters (a scan
/// plan knows its commanded start/stop); by default it comes from the sample.
pub fn fit_composite(
    model: &CompositeModel,
    sample: &ScanSample,
    range: Option<ScanRange>,
    opts: &FitOptions,
) -> Result<FitResult, FitError> {
    let n = sample.len();
    let needed = MIN_FIT_POINTS.max(model.param_count());
    if n < needed {
        return Err(FitError::insufficient(format!("a {} fit", model.primary()), needed, n));
    }
    let Some(range) = range.or_else(|| sample.range()) else {
        return Err(FitError::insufficient("a fit", needed, n));
    };

    let mut params = model.initial_guess(range);
    let (stage1, stage2) = two_stage(&mut params, &model.center_params(), sample, opts, |x, v| {
        model.evaluate(x, v)
    })?;

    let values: Vec<f64> = params.iter().map(|p| p.value).collect();
    let quality = quality_of(sample, &stage2, stage1.map_or(0, |s| s.nfev), |x| model.evaluate(x, &values));
    if quality.is_bad(opts.bad_fit_threshold) {
        warn!(
            "{} fit is poor: avg deviation {:.1}% (threshold {:.1}%)",
            model.primary(),
            quality.avg_deviation * 100.0,
            opts.bad_fit_threshold * 100.0
        );
    }

    let x0 = model
        .primary()
        .center_param()
        .and_then(|name| params.iter().find(|p| p.name == name))
        .map(|p| p.value);
    let y0 = x0.map(|x| model.evaluate(x, &values));

    Ok(FitResult {
        model: model.primary(),
        backgrounds: model.backgrounds().to_vec(),
        params: to_map(&params),
        x0,
        y0,
        quality,
    })
}

/// Run the center-only stage (skipped when there is no center) and then the
/// full stage. Parameters are only written back once both stages succeed.
pub(crate) fn two_stage<E>(
    params: &mut Vec<Parameter>,
    centers: &[&str],
    sample: &ScanSample,
    opts: &FitOptions,
    eval: E,
) -> Result<(Option<LmReport>, LmReport), FitError>
where
    E: Fn(f64, &[f64]) -> f64,
{
    let xs = sample.xs();
    let ys = sample.ys();
    let residuals = |values: &[f64], out: &mut [f64]| {
        for (i, (&x, &y)) in xs.iter().zip(ys.iter()).enumerate() {
            out[i] = eval(x, values) - y;
        }
    };
    let lm = LmOptions {
        max_iterations: opts.max_iterations,
        ftol: opts.ftol,
        xtol: opts.xtol,
    };

    let mut work = params.clone();

    let stage1 = if centers.is_empty() {
        None
    } else {
        for p in work.iter_mut() {
            p.vary = centers.iter().any(|c| *c == p.name);
        }
        let report = minimize(&mut work, xs.len(), residuals, &lm)?;
        debug!(
            "stage 1 (center only): cost={:.6e} nfev={} converged={}",
            report.cost, report.nfev, report.converged
        );
        Some(report)
    };

    for p in work.iter_mut() {
        p.vary = true;
    }
    let stage2 = minimize(&mut work, xs.len(), residuals, &lm)?;
    debug!(
        "stage 2 (all free): cost={:.6e} nfev={} converged={}",
        stage2.cost, stage2.nfev, stage2.converged
    );

    *params = work;
    Ok((stage1, stage2))
}

/// Quality diagnostics for the final parameters.
pub(crate) fn quality_of<M>(sample: &ScanSample, last: &LmReport, earlier_nfev: usize, model: M) -> FitQuality
where
    M: Fn(f64) -> f64,
{
    let n = sample.len();
    let abs_sum: f64 = sample.points.iter().map(|p| (model(p.x) - p.y).abs()).sum();
    FitQuality {
        sse: last.cost,
        rmse: (last.cost / n as f64).sqrt(),
        avg_deviation: avg_deviation(abs_sum, n, sample.y_max()),
        n,
        nfev: earlier_nfev + last.nfev,
        converged: last.converged,
    }
}

/// `mean(|residual|) / peak`, infinite when the peak is not positive but residuals remain.
fn avg_deviation(abs_sum: f64, n: usize, peak: f64) -> f64 {
    if n == 0 {
        return f64::NAN;
    }
    if peak > 0.0 {
        abs_sum / peak / n as f64
    } else if abs_sum == 0.0 {
        0.0
    } else {
        f64::INFINITY
    }
}

pub(crate) fn to_map(params: &[Parameter]) -> BTreeMap<String, f64> {
    params.iter().map(|p| (p.name.clone(), p.value)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::evaluate;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rand_distr::{Distribution, Normal};

    fn synth(model: ModelKind, params: &[f64], xs: &[f64]) -> ScanSample {
        let ys: Vec<f64> = xs.iter().map(|&x| evaluate(model, x, params)).collect();
        ScanSample::from_xy(xs, &ys)
    }

    fn linspace(a: f64, b: f64, n: usize) -> Vec<f64> {
        (0..n).map(|i| a + (b - a) * i as f64 / (n - 1) as f64).collect()
    }

    #[test]
    fn gaussian_scan_recovers_peak() {
        let xs = linspace(0.0, 10.0, 11);
        let sample = synth(ModelKind::Gauss, &[5.0, 100.0, 1.0], &xs);

        let result = fit("gauss", &sample, &[] as &[&str], &FitOptions::default()).unwrap();

        let x0 = result.x0.unwrap();
        assert!((x0 - 5.0).abs() < 0.05, "x0={x0}");
        assert!((result.param("prefactor").unwrap() - 100.0).abs() < 2.0);
        assert!((result.param("sigma").unwrap() - 1.0).abs() < 0.05);
        assert!((result.y0.unwrap() - 100.0).abs() < 2.0);
        assert!(!result.quality.is_bad(0.06));
    }

    #[test]
    fn noisy_gaussian_with_background_is_recovered() {
        let xs = linspace(-2.0, 2.0, 41);
        let mut rng = StdRng::seed_from_u64(7);
        let noise = Normal::new(0.0, 0.5).unwrap();
        let ys: Vec<f64> = xs
            .iter()
            .map(|&x| evaluate(ModelKind::Gauss, x, &[0.3, 80.0, 0.4]) + 10.0 + noise.sample(&mut rng))
            .collect();
        let sample = ScanSample::from_xy(&xs, &ys);

        let result = fit("gaussian", &sample, &["constant"], &FitOptions::default()).unwrap();

        let span = 4.0;
        assert!((result.x0.unwrap() - 0.3).abs() < 0.05 * span);
        assert!((result.param("sigma").unwrap() - 0.4).abs() < 0.05 * span);
        assert!((result.param("offset").unwrap() - 10.0).abs() < 2.0);
        assert_eq!(result.backgrounds, vec![ModelKind::Constant]);
    }

    #[test]
    fn every_shape_recovers_its_center_under_light_noise() {
        let xs = linspace(0.0, 10.0, 101);
        let cases: [(&str, ModelKind, &[f64]); 7] = [
            ("lorentz", ModelKind::Lorentz, &[5.3, 50.0, 0.8]),
            ("doublesigmoid", ModelKind::DoubleSigmoid, &[4.6, 10.0, 0.3, 3.0]),
            ("square", ModelKind::Square, &[5.4, 10.0, 3.0]),
            ("tanh", ModelKind::Tanh, &[4.7, 80.0, 0.6]),
            ("tanh_r", ModelKind::TanhR, &[5.2, 80.0, 0.6]),
            ("erf", ModelKind::Erf, &[4.8, 80.0, 0.7]),
            ("erf_r", ModelKind::ErfR, &[5.5, 80.0, 0.7]),
        ];

        for (i, (name, model, truth)) in cases.into_iter().enumerate() {
            let clean: Vec<f64> = xs.iter().map(|&x| evaluate(model, x, truth)).collect();
            let amplitude = clean.iter().cloned().fold(f64::MIN, f64::max);
            let noise = Normal::new(0.0, 0.002 * amplitude).unwrap();
            let mut rng = StdRng::seed_from_u64(100 + i as u64);
            let ys: Vec<f64> = clean.iter().map(|y| y + noise.sample(&mut rng)).collect();
            let sample = ScanSample::from_xy(&xs, &ys);

            let result = fit(name, &sample, &[] as &[&str], &FitOptions::default()).unwrap();
            let x0 = result.x0.unwrap();
            assert_eq!(result.model, model);
            assert!((x0 - truth[0]).abs() < 5e-3, "{name}: x0={x0} truth={}", truth[0]);
            assert!(!result.quality.is_bad(0.06), "{name}: {:?}", result.quality);
        }
    }

    #[test]
    fn rising_edge_is_located() {
        let xs = linspace(-1.0, 1.0, 31);
        let sample = synth(ModelKind::Sigmoid, &[0.2, 50.0, 0.1], &xs);
        let result = fit("sigmoid", &sample, &[] as &[&str], &FitOptions::default()).unwrap();
        assert!((result.x0.unwrap() - 0.2).abs() < 0.02);
    }

    #[test]
    fn background_only_model_skips_the_center_stage() {
        let xs = linspace(0.0, 4.0, 5);
        let sample = synth(ModelKind::Linear, &[2.0, -1.0], &xs);
        let result = fit("linear", &sample, &[] as &[&str], &FitOptions::default()).unwrap();
        assert!(result.x0.is_none());
        assert!((result.param("m").unwrap() - 2.0).abs() < 1e-6);
        assert!((result.param("b").unwrap() + 1.0).abs() < 1e-6);
    }

    #[test]
    fn unknown_model_fails_before_fitting() {
        let sample = ScanSample::new();
        let err = fit("quadratic", &sample, &[] as &[&str], &FitOptions::default()).unwrap_err();
        assert_eq!(err, FitError::UnknownModel("quadratic".to_string()));
    }

    #[test]
    fn too_few_points_is_rejected() {
        let sample = ScanSample::from_xy(&[0.0, 1.0], &[1.0, 2.0]);
        let err = fit("gauss", &sample, &[] as &[&str], &FitOptions::default()).unwrap_err();
        assert!(matches!(err, FitError::InsufficientData { got: 2, .. }));

        // gauss + linear has five free parameters.
        let sample = ScanSample::from_xy(&[0.0, 1.0, 2.0, 3.0], &[1.0, 2.0, 1.0, 0.0]);
        let err = fit("gauss", &sample, &["linear"], &FitOptions::default()).unwrap_err();
        assert!(matches!(err, FitError::InsufficientData { needed: 5, .. }));
    }

    #[test]
    fn flat_data_reports_quality_instead_of_failing() {
        let xs = linspace(0.0, 1.0, 6);
        let sample = ScanSample::from_xy(&xs, &[0.0; 6]);
        let result = fit("gauss", &sample, &[] as &[&str], &FitOptions::default()).unwrap();
        assert!(!result.quality.avg_deviation.is_nan());
        assert!(result.params.values().all(|v| v.is_finite()));
    }
}
