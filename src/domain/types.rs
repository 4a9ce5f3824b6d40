//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - used in-memory during fitting
//! - exported to JSON/CSV
//! - handed to whatever moves the motor or draws the overlay

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::FitError;

/// One acquired scan point: motor position `x` and detector reading `y`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScanPoint {
    pub x: f64,
    pub y: f64,
}

/// Points in acquisition order.
///
/// The order is the sweep order and is never re-sorted; x need not be
/// uniformly spaced (or even increasing).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanSample {
    pub points: Vec<ScanPoint>,
}

impl ScanSample {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a sample from parallel x/y slices (extra values on the longer side are dropped).
    pub fn from_xy(xs: &[f64], ys: &[f64]) -> Self {
        let points = xs
            .iter()
            .zip(ys.iter())
            .map(|(&x, &y)| ScanPoint { x, y })
            .collect();
        Self { points }
    }

    pub fn push(&mut self, x: f64, y: f64) {
        self.points.push(ScanPoint { x, y });
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn xs(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.x).collect()
    }

    pub fn ys(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.y).collect()
    }

    /// Range of the sampled x values, or `None` for an empty sample.
    pub fn range(&self) -> Option<ScanRange> {
        let first = self.points.first()?;
        let mut lo = first.x;
        let mut hi = first.x;
        for p in &self.points[1..] {
            lo = lo.min(p.x);
            hi = hi.max(p.x);
        }
        Some(ScanRange::new(lo, hi))
    }

    /// Largest y value (`NaN` for an empty sample).
    pub fn y_max(&self) -> f64 {
        self.points.iter().map(|p| p.y).fold(f64::NAN, f64::max)
    }

    /// Smallest y value (`NaN` for an empty sample).
    pub fn y_min(&self) -> f64 {
        self.points.iter().map(|p| p.y).fold(f64::NAN, f64::min)
    }
}

/// The x-interval a scan covers; every span-derived bound comes from here.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScanRange {
    pub start: f64,
    pub stop: f64,
}

impl ScanRange {
    /// Build a range from two endpoints in either order.
    pub fn new(a: f64, b: f64) -> Self {
        Self {
            start: a.min(b),
            stop: a.max(b),
        }
    }

    pub fn span(&self) -> f64 {
        (self.stop - self.start).abs()
    }

    pub fn mid(&self) -> f64 {
        (self.start + self.stop) * 0.5
    }
}

/// Canonical model names.
///
/// `Step`/`StepR` share the sigmoid formulas but carry a much narrower width
/// guess, which biases the fit toward sharp transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    Gauss,
    Lorentz,
    #[serde(rename = "doublesigmoid")]
    DoubleSigmoid,
    Square,
    Sigmoid,
    #[serde(rename = "sigmoid_r")]
    SigmoidR,
    Step,
    #[serde(rename = "step_r")]
    StepR,
    Tanh,
    #[serde(rename = "tanh_r")]
    TanhR,
    Erf,
    #[serde(rename = "erf_r")]
    ErfR,
    Constant,
    Linear,
}

impl ModelKind {
    pub const ALL: [ModelKind; 14] = [
        ModelKind::Gauss,
        ModelKind::Lorentz,
        ModelKind::DoubleSigmoid,
        ModelKind::Square,
        ModelKind::Sigmoid,
        ModelKind::SigmoidR,
        ModelKind::Step,
        ModelKind::StepR,
        ModelKind::Tanh,
        ModelKind::TanhR,
        ModelKind::Erf,
        ModelKind::ErfR,
        ModelKind::Constant,
        ModelKind::Linear,
    ];

    /// Canonical name as accepted by `resolve`.
    pub fn name(self) -> &'static str {
        match self {
            ModelKind::Gauss => "gauss",
            ModelKind::Lorentz => "lorentz",
            ModelKind::DoubleSigmoid => "doublesigmoid",
            ModelKind::Square => "square",
            ModelKind::Sigmoid => "sigmoid",
            ModelKind::SigmoidR => "sigmoid_r",
            ModelKind::Step => "step",
            ModelKind::StepR => "step_r",
            ModelKind::Tanh => "tanh",
            ModelKind::TanhR => "tanh_r",
            ModelKind::Erf => "erf",
            ModelKind::ErfR => "erf_r",
            ModelKind::Constant => "constant",
            ModelKind::Linear => "linear",
        }
    }

    /// Map an alias onto its canonical name; unknown names pass through.
    pub fn canonical_name(name: &str) -> &str {
        match name {
            "gaussian" => "gauss",
            "lorentzian" => "lorentz",
            "squarewave" | "tophat" | "rectangular" => "square",
            "errorfunction" => "erf",
            other => other,
        }
    }

    /// Resolve a user-supplied model name (aliases included).
    pub fn resolve(name: &str) -> Result<ModelKind, FitError> {
        let trimmed = name.trim();
        let canonical = Self::canonical_name(trimmed);
        ModelKind::ALL
            .iter()
            .copied()
            .find(|m| m.name() == canonical)
            .ok_or_else(|| FitError::UnknownModel(trimmed.to_string()))
    }

    /// Parameter names in evaluation order.
    pub fn param_names(self) -> &'static [&'static str] {
        match self {
            ModelKind::Gauss
            | ModelKind::Sigmoid
            | ModelKind::SigmoidR
            | ModelKind::Step
            | ModelKind::StepR
            | ModelKind::Tanh
            | ModelKind::TanhR
            | ModelKind::Erf
            | ModelKind::ErfR => &["x0", "prefactor", "sigma"],
            ModelKind::Lorentz => &["x0", "prefactor", "gamma"],
            ModelKind::DoubleSigmoid => &["x0", "prefactor", "sigma", "fwhm"],
            ModelKind::Square => &["x0", "prefactor", "fwhm"],
            ModelKind::Constant => &["offset"],
            ModelKind::Linear => &["m", "b"],
        }
    }

    /// Name of the feature-center parameter, if the model has one.
    pub fn center_param(self) -> Option<&'static str> {
        match self {
            ModelKind::Constant | ModelKind::Linear => None,
            _ => Some("x0"),
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Fit-free statistics over a sampled curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Statistic {
    #[serde(rename = "max")]
    Max,
    #[serde(rename = "min")]
    Min,
    #[serde(rename = "COM")]
    Com,
    /// Half-maximum, nearest sample on each side.
    #[serde(rename = "HM")]
    Hm,
    /// Half-maximum, interpolated between the bracketing samples.
    #[serde(rename = "HMi")]
    Hmi,
}

impl Statistic {
    pub const ALL: [Statistic; 5] = [
        Statistic::Max,
        Statistic::Min,
        Statistic::Com,
        Statistic::Hm,
        Statistic::Hmi,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Statistic::Max => "max",
            Statistic::Min => "min",
            Statistic::Com => "COM",
            Statistic::Hm => "HM",
            Statistic::Hmi => "HMi",
        }
    }

    pub fn resolve(name: &str) -> Result<Statistic, FitError> {
        let trimmed = name.trim();
        Statistic::ALL
            .iter()
            .copied()
            .find(|s| s.name() == trimmed)
            .ok_or_else(|| FitError::UnknownStatistic(trimmed.to_string()))
    }

    /// Smallest sample size the statistic is defined for.
    pub fn min_points(self) -> usize {
        match self {
            Statistic::Max | Statistic::Min | Statistic::Com => 1,
            Statistic::Hm | Statistic::Hmi => 4,
        }
    }

    /// Result-map keys `(x_key, y_key)`; HM and HMi share theirs.
    pub fn keys(self) -> (&'static str, &'static str) {
        match self {
            Statistic::Max => ("x_max", "y_max"),
            Statistic::Min => ("x_min", "y_min"),
            Statistic::Com => ("x_COM", "y_COM"),
            Statistic::Hm | Statistic::Hmi => ("x_HM", "y_HM"),
        }
    }
}

impl fmt::Display for Statistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A named fit parameter with optional bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub value: f64,
    pub min: Option<f64>,
    pub max: Option<f64>,
    /// Whether the minimizer may move this parameter.
    pub vary: bool,
}

impl Parameter {
    pub fn free(name: &str, value: f64) -> Self {
        Self {
            name: name.to_string(),
            value,
            min: None,
            max: None,
            vary: true,
        }
    }

    pub fn bounded(name: &str, value: f64, min: Option<f64>, max: Option<f64>) -> Self {
        Self {
            name: name.to_string(),
            value,
            min,
            max,
            vary: true,
        }
    }

    /// Clamp `value` into `[min, max]`.
    pub fn clamped(mut self) -> Self {
        if let Some(lo) = self.min {
            self.value = self.value.max(lo);
        }
        if let Some(hi) = self.max {
            self.value = self.value.min(hi);
        }
        self
    }
}

/// Fit quality diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitQuality {
    #[serde(with = "non_finite")]
    pub sse: f64,
    #[serde(with = "non_finite")]
    pub rmse: f64,
    /// `mean(|residual|) / max(y)`. Infinite when `max(y) <= 0` and the fit is not exact.
    #[serde(with = "non_finite")]
    pub avg_deviation: f64,
    pub n: usize,
    /// Model evaluations spent over both stages.
    pub nfev: usize,
    /// Whether the final stage met its tolerance within the iteration budget.
    pub converged: bool,
}

impl FitQuality {
    pub fn is_bad(&self, threshold: f64) -> bool {
        !(self.avg_deviation <= threshold)
    }
}

/// JSON has no infinity or NaN, so these are written as the strings `"inf"`,
/// `"-inf"` and `"NaN"`. Plain numbers are read as before, and `null` reads as NaN.
mod non_finite {
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(f64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_f64(*value)
        } else {
            serializer.serialize_str(&value.to_string())
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        match Option::<Repr>::deserialize(deserializer)? {
            None => Ok(f64::NAN),
            Some(Repr::Number(v)) => Ok(v),
            Some(Repr::Text(s)) => s
                .parse()
                .map_err(|_| serde::de::Error::custom(format!("expected a number, inf or NaN, got '{s}'"))),
        }
    }
}

/// Output of the two-stage fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitResult {
    pub model: ModelKind,
    pub backgrounds: Vec<ModelKind>,
    pub params: BTreeMap<String, f64>,
    /// Fitted feature center, when the primary model has one.
    pub x0: Option<f64>,
    /// Model value at `x0`.
    pub y0: Option<f64>,
    pub quality: FitQuality,
}

impl FitResult {
    pub fn param(&self, name: &str) -> Option<f64> {
        self.params.get(name).copied()
    }
}

/// Accumulated statistics, keyed `x_max`, `y_HM`, etc.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatResult {
    pub values: BTreeMap<String, f64>,
    /// Position from the most recently computed statistic.
    pub x0: Option<f64>,
    pub y0: Option<f64>,
}

impl StatResult {
    pub fn get(&self, key: &str) -> Option<f64> {
        self.values.get(key).copied()
    }
}

/// Where the edge position reported by the edge fit came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeSource {
    Fit,
    HalfMax,
}

/// Output of the edge-optimized fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeResult {
    /// Fitted sigmoid_r parameters (`x0`, `prefactor`, `sigma`).
    pub params: BTreeMap<String, f64>,
    /// Half-maximum crossing estimated from the raw data.
    pub x0_half_max: f64,
    /// The position to move to.
    pub x0: f64,
    pub source: EdgeSource,
    pub quality: FitQuality,
}

/// How a line profile was read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileShape {
    /// At least two level crossings: a peak.
    Peak,
    /// Fewer than two crossings: fitted as an erf step.
    Step,
}

/// Line-profile summary of a recorded scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileResult {
    /// Whether the profile is the point-to-point difference of the readings.
    pub derivative: bool,
    /// Normalized level (0..1) the crossings are taken at.
    pub shift: f64,
    pub peak_x: f64,
    pub peak_y: f64,
    /// NaN when the readings sum to zero.
    #[serde(with = "non_finite")]
    pub com: f64,
    pub shape: ProfileShape,
    /// Level crossings in acquisition order.
    pub roots: Vec<f64>,
    #[serde(with = "non_finite")]
    pub cen: f64,
    /// Distance between the outer crossings of a peak, or `1/|k|` of a step.
    #[serde(with = "non_finite")]
    pub width: f64,
    /// Fitted `base - amplitude * erf(k * (x - x0))` on the normalized profile.
    pub step: Option<StepFit>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepFit {
    pub params: BTreeMap<String, f64>,
    pub quality: FitQuality,
}

/// Tuning knobs for the general two-stage fit.
#[derive(Debug, Clone)]
pub struct FitOptions {
    /// `avg_deviation` above this marks a fit as poor.
    pub bad_fit_threshold: f64,
    /// Iteration budget per least-squares stage.
    pub max_iterations: usize,
    /// Relative cost-reduction tolerance.
    pub ftol: f64,
    /// Relative step-size tolerance.
    pub xtol: f64,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            bad_fit_threshold: 0.06,
            max_iterations: 200,
            ftol: 1e-10,
            xtol: 1e-10,
        }
    }
}

/// Tuning knobs for the edge-optimized fit.
#[derive(Debug, Clone)]
pub struct EdgeOptions {
    pub fit: FitOptions,
    /// Starting width of the sigmoid_r edge (clamped into its span-derived bounds).
    pub sigma_guess: f64,
    /// Width bounds as fractions of the span.
    pub sigma_min_frac: f64,
    pub sigma_max_frac: f64,
    /// Fraction of the span trimmed from each end when bounding the center.
    pub center_margin_frac: f64,
}

impl Default for EdgeOptions {
    fn default() -> Self {
        Self {
            fit: FitOptions::default(),
            sigma_guess: 0.014,
            sigma_min_frac: 1e-4,
            sigma_max_frac: 0.08,
            center_margin_frac: 0.05,
        }
    }
}
