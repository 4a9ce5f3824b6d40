//! Model evaluation and initial guesses for every `ModelKind`.
//!
//! The fitter relies on two primitive operations:
//! - evaluate `y(x)` given the model's parameter values (in `param_names` order)
//! - seed a bounded parameter set from the scan range
//!
//! Both are implemented here for each model kind.

use scilib::math::basic::erf;

use crate::domain::{ModelKind, Parameter, ScanRange};

/// Width of each edge of a `square` model, as a fraction of its fwhm.
const SQUARE_EDGE_RATIO: f64 = 0.02;

/// Evaluate `y(x)` for the given model kind.
///
/// # Panics
/// Panics if `p` is shorter than `model.param_names().len()`.
pub fn evaluate(model: ModelKind, x: f64, p: &[f64]) -> f64 {
    match model {
        ModelKind::Gauss => {
            let (x0, prefactor, sigma) = (p[0], p[1], p[2]);
            prefactor * (-(x - x0).powi(2) / (2.0 * sigma * sigma)).exp()
        }
        ModelKind::Lorentz => {
            let (x0, prefactor, gamma) = (p[0], p[1], p[2]);
            let g2 = gamma * gamma;
            prefactor * g2 / ((x - x0).powi(2) + g2)
        }
        ModelKind::DoubleSigmoid => double_sigmoid(x, p[0], p[1], p[2], p[3]),
        ModelKind::Square => {
            let fwhm = p[2];
            double_sigmoid(x, p[0], p[1], fwhm * SQUARE_EDGE_RATIO, fwhm)
        }
        ModelKind::Sigmoid | ModelKind::Step => logistic(x, p[0], p[1], p[2], 1.0),
        ModelKind::SigmoidR | ModelKind::StepR => logistic(x, p[0], p[1], p[2], -1.0),
        ModelKind::Tanh => p[1] * 0.5 * (((x - p[0]) / p[2]).tanh() + 1.0),
        ModelKind::TanhR => p[1] * 0.5 * ((-(x - p[0]) / p[2]).tanh() + 1.0),
        ModelKind::Erf => p[1] * 0.5 * (erf((x - p[0]) / p[2]) + 1.0),
        ModelKind::ErfR => p[1] * 0.5 * (erf(-(x - p[0]) / p[2]) + 1.0),
        ModelKind::Constant => p[0],
        ModelKind::Linear => p[0] * x + p[1],
    }
}

/// `prefactor / (1 + exp(-dir * (x - x0) / sigma))`; `dir = -1` mirrors the step.
fn logistic(x: f64, x0: f64, prefactor: f64, sigma: f64, dir: f64) -> f64 {
    prefactor / (1.0 + (-dir * (x - x0) / sigma).exp())
}

fn double_sigmoid(x: f64, x0: f64, prefactor: f64, sigma: f64, fwhm: f64) -> f64 {
    let left = logistic(x, x0 - fwhm * 0.5, prefactor, sigma, 1.0);
    let right = logistic(x, x0 + fwhm * 0.5, prefactor, sigma, 1.0);
    prefactor * (left - right)
}

/// Initial parameter set for a model, seeded from the scan range.
///
/// The center always starts at the range midpoint and may wander 10% of the
/// span past either end. Widths start at a quarter of the span, except for
/// `step`/`step_r`, which start narrow.
pub fn initial_guess(model: ModelKind, range: ScanRange) -> Vec<Parameter> {
    let span = range.span();
    let center = || {
        Parameter::bounded(
            "x0",
            range.mid(),
            Some(range.start - span * 0.1),
            Some(range.stop + span * 0.1),
        )
    };
    let prefactor = |value: f64| Parameter::bounded("prefactor", value, Some(0.0), None);
    let width = |name: &str, value: f64, max: f64| Parameter::bounded(name, value, Some(0.0), Some(max));

    match model {
        ModelKind::Gauss => vec![center(), prefactor(1000.0), width("sigma", span * 0.25, span * 4.0)],
        ModelKind::Lorentz => vec![center(), prefactor(1.0), width("gamma", span * 0.25, span * 4.0)],
        ModelKind::DoubleSigmoid => vec![
            center(),
            prefactor(100.0),
            width("sigma", span * 0.25, span),
            width("fwhm", span * 0.25, span),
        ],
        ModelKind::Square => vec![center(), prefactor(100.0), width("fwhm", span * 0.25, span)],
        ModelKind::Sigmoid
        | ModelKind::SigmoidR
        | ModelKind::Tanh
        | ModelKind::TanhR
        | ModelKind::Erf
        | ModelKind::ErfR => vec![center(), prefactor(100.0), width("sigma", span * 0.25, span * 4.0)],
        ModelKind::Step | ModelKind::StepR => {
            vec![center(), prefactor(100.0), width("sigma", span * 0.002, span * 0.005)]
        }
        ModelKind::Constant => vec![Parameter::free("offset", 0.0)],
        ModelKind::Linear => vec![Parameter::free("m", 0.0), Parameter::free("b", 0.0)],
    }
}
