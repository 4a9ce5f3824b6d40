//! Locating a falling step edge.
//!
//! The edge position is seeded from the half-maximum crossing of the raw
//! data, then refined by a two-stage sigmoid_r fit with tight, span-derived
//! bounds. When the fit still deviates too much from the data, the crossing
//! estimate is used instead of the fit.

use log::{debug, info, warn};

use crate::domain::{EdgeOptions, EdgeResult, EdgeSource, ModelKind, Parameter, ScanSample};
use crate::error::FitError;
use crate::fit::fitter::{MIN_FIT_POINTS, quality_of, to_map, two_stage};
use crate::math::crossing;
use crate::models::evaluate;

/// Fit a falling edge and choose the position to move to.
pub fn fit_edge(sample: &ScanSample, opts: &EdgeOptions) -> Result<EdgeResult, FitError> {
    let n = sample.len();
    let Some(range) = sample.range().filter(|_| n >= MIN_FIT_POINTS) else {
        return Err(FitError::insufficient("an edge fit", MIN_FIT_POINTS, n));
    };
    let span = range.span();
    let y_max = sample.y_max();

    let x0_half_max = half_max_crossing(sample);
    debug!("edge seed from half-max crossing: {x0_half_max:.6}");

    let prefactor = if y_max > 0.0 {
        Parameter::bounded("prefactor", y_max * 0.95, Some(y_max * 0.90), Some(y_max * 1.02))
    } else {
        Parameter::bounded("prefactor", y_max * 0.95, Some(0.0), Some(1.0))
    };
    let margin = span * opts.center_margin_frac;
    let mut params = vec![
        Parameter::bounded("x0", x0_half_max, Some(range.start + margin), Some(range.stop - margin)).clamped(),
        prefactor.clamped(),
        Parameter::bounded(
            "sigma",
            opts.sigma_guess,
            Some(span * opts.sigma_min_frac),
            Some(span * opts.sigma_max_frac),
        )
        .clamped(),
    ];

    let (stage1, stage2) = two_stage(&mut params, &["x0"], sample, &opts.fit, |x, v| {
        evaluate(ModelKind::SigmoidR, x, v)
    })?;

    let values: Vec<f64> = params.iter().map(|p| p.value).collect();
    let quality = quality_of(sample, &stage2, stage1.map_or(0, |s| s.nfev), |x| {
        evaluate(ModelKind::SigmoidR, x, &values)
    });
    info!("edge fit avg deviation {:.1}%", quality.avg_deviation * 100.0);

    let (x0, source) = if quality.is_bad(opts.fit.bad_fit_threshold) {
        warn!(
            "edge fit rejected (avg deviation {:.1}% > {:.1}%); using half-max estimate",
            quality.avg_deviation * 100.0,
            opts.fit.bad_fit_threshold * 100.0
        );
        (x0_half_max, EdgeSource::HalfMax)
    } else {
        (values[0], EdgeSource::Fit)
    };

    Ok(EdgeResult {
        params: to_map(&params),
        x0_half_max,
        x0,
        source,
        quality,
    })
}

/// Position where the data falls through the midpoint between its extremes.
///
/// The level is `y_min + (y_max - y_min) / 2`, not half of `y_max`. Walks the
/// points in acquisition order and keeps the last falling crossing.
/// With three points or fewer, or with no crossing, this is the mean position.
pub fn half_max_crossing(sample: &ScanSample) -> f64 {
    let pts = &sample.points;
    let mut x0 = pts.iter().map(|p| p.x).sum::<f64>() / pts.len() as f64;
    if pts.len() <= 3 {
        return x0;
    }

    let (y_min, y_max) = (sample.y_min(), sample.y_max());
    let level = y_min + (y_max - y_min) / 2.0;
    for w in pts.windows(2) {
        let (a, b) = (w[0], w[1]);
        if a.y > level && b.y <= level {
            x0 = crossing(a.x, a.y, b.x, b.y, level);
        }
    }
    x0
}
