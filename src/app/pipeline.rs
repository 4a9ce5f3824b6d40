//! Shared simulated-scan workflow used by the `simulate` and `survey` commands.
//!
//! simulated rig -> scan -> analysis -> move, optionally repeated over many
//! seeds on the rayon pool. Each trial builds its own motor and detector, so
//! trials share nothing.

use log::{debug, info};
use rayon::prelude::*;

use crate::data::{Response, SimDetector, SimMotor};
use crate::domain::{EdgeOptions, EdgeResult, EdgeSource, FitOptions};
use crate::error::AppError;
use crate::scan::{Analysis, Outcome, ScanObserver, ScanPlan, ScanReport, fit_edge_scan, fit_scan};

pub const SIM_MOTOR: &str = "armz";
pub const SIM_DETECTOR: &str = "intensity";

/// What to do after a simulated sweep.
#[derive(Debug, Clone, PartialEq)]
pub enum SimAnalysis {
    Scan(Analysis),
    Edge,
}

/// Everything needed to run one simulated scan.
#[derive(Debug, Clone)]
pub struct SimulationSpec {
    pub response: Response,
    /// Motor position before the scan.
    pub start: f64,
    pub plan: ScanPlan,
    pub analysis: SimAnalysis,
    pub fit: FitOptions,
    pub edge: EdgeOptions,
    /// Add Poisson counting noise.
    pub noise: bool,
}

#[derive(Debug, Clone)]
pub struct SimulationOutput {
    pub report: ScanReport,
    pub edge: Option<EdgeResult>,
}

impl SimulationOutput {
    /// Whether the analysis flagged its own result as unreliable.
    pub fn is_poor(&self, threshold: f64) -> bool {
        match (&self.edge, &self.report.outcome) {
            (Some(edge), _) => edge.source == EdgeSource::HalfMax,
            (None, Outcome::Fit(fit)) => fit.quality.is_bad(threshold),
            _ => false,
        }
    }
}

/// Run a single simulated scan.
pub fn run_simulation(
    spec: &SimulationSpec,
    seed: u64,
    observers: &mut [&mut dyn ScanObserver],
) -> Result<SimulationOutput, AppError> {
    let mut motor = SimMotor::new(SIM_MOTOR, spec.start);
    let mut detector = SimDetector::new(SIM_DETECTOR, motor.handle(), spec.response, spec.noise.then_some(seed));

    match &spec.analysis {
        SimAnalysis::Scan(analysis) => {
            let report = fit_scan(&mut motor, &mut detector, &spec.plan, analysis, &spec.fit, observers)?;
            Ok(SimulationOutput { report, edge: None })
        }
        SimAnalysis::Edge => {
            let (report, edge) = fit_edge_scan(&mut motor, &mut detector, &spec.plan, &spec.edge, observers)?;
            Ok(SimulationOutput {
                report,
                edge: Some(edge),
            })
        }
    }
}

/// One survey trial.
#[derive(Debug, Clone)]
pub struct TrialOutcome {
    pub seed: u64,
    /// Where the motor ended up, when the trial succeeded.
    pub final_position: Option<f64>,
    pub poor: bool,
    pub error: Option<String>,
}

/// How well repeated noisy scans recover the true feature position.
#[derive(Debug, Clone)]
pub struct SurveySummary {
    pub truth: f64,
    pub trials: usize,
    pub succeeded: usize,
    pub poor: usize,
    pub mean: f64,
    pub std_dev: f64,
    pub mean_abs_error: f64,
    pub max_abs_error: f64,
    pub outcomes: Vec<TrialOutcome>,
}

/// Run `trials` seeded copies of `spec` in parallel and summarize the recovered positions.
pub fn run_survey(spec: &SimulationSpec, trials: usize, base_seed: u64) -> Result<SurveySummary, AppError> {
    if trials == 0 {
        return Err(AppError::new(2, "Survey needs at least one trial."));
    }
    info!("survey: {trials} trials, base seed {base_seed}");

    let outcomes: Vec<TrialOutcome> = (0..trials as u64)
        .into_par_iter()
        .map(|i| {
            let seed = base_seed.wrapping_add(i);
            match run_simulation(spec, seed, &mut []) {
                Ok(out) => TrialOutcome {
                    seed,
                    final_position: Some(out.report.final_position),
                    poor: out.is_poor(spec.fit.bad_fit_threshold),
                    error: None,
                },
                Err(err) => {
                    debug!("survey trial {seed} failed: {err}");
                    TrialOutcome {
                        seed,
                        final_position: None,
                        poor: false,
                        error: Some(err.to_string()),
                    }
                }
            }
        })
        .collect();

    Ok(summarize(spec.response.center(), outcomes))
}

fn summarize(truth: f64, outcomes: Vec<TrialOutcome>) -> SurveySummary {
    let found: Vec<f64> = outcomes.iter().filter_map(|o| o.final_position).collect();
    let n = found.len();

    let (mean, std_dev, mean_abs_error, max_abs_error) = if n == 0 {
        (f64::NAN, f64::NAN, f64::NAN, f64::NAN)
    } else {
        let mean = found.iter().sum::<f64>() / n as f64;
        let var = found.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n as f64;
        let errs = found.iter().map(|x| (x - truth).abs());
        let mae = errs.clone().sum::<f64>() / n as f64;
        let max = errs.fold(0.0_f64, f64::max);
        (mean, var.sqrt(), mae, max)
    };

    SurveySummary {
        truth,
        trials: outcomes.len(),
        succeeded: n,
        poor: outcomes.iter().filter(|o| o.poor).count(),
        mean,
        std_dev,
        mean_abs_error,
        max_abs_error,
        outcomes,
    }
}
