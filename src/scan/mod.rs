//! Scan orchestration: sweep a motor, read a detector, locate the feature, move there.
//!
//! The motor and detector are external collaborators reached only through the
//! `Motor`/`Detector` traits; both calls block until the hardware is done.
//! Everything here is single-threaded and sequential: each point is acquired
//! and handed to the observers before the next one is requested.

pub mod observer;
pub mod plan;

pub use observer::*;
pub use plan::*;

use log::{info, warn};

use crate::domain::{EdgeOptions, EdgeResult, FitOptions, FitResult, ModelKind, ScanSample, StatResult, Statistic};
use crate::error::AppError;
use crate::fit::{fit_composite, fit_edge};
use crate::models::CompositeModel;
use crate::stats::compute_stats;

/// A positionable axis.
pub trait Motor {
    fn name(&self) -> &str;
    /// Current readback position.
    fn position(&self) -> Result<f64, AppError>;
    /// Move and wait until the motion completes.
    fn move_to(&mut self, x: f64) -> Result<(), AppError>;
}

/// A scalar readout (e.g. a detector ROI total).
pub trait Detector {
    fn name(&self) -> &str;
    /// Acquire one reading at the current position.
    fn read(&mut self) -> Result<f64, AppError>;
}

/// What to do with the data once the sweep finishes.
#[derive(Debug, Clone, PartialEq)]
pub enum Analysis {
    /// Just scan, then return the motor to where it started.
    None,
    Fit {
        model: ModelKind,
        backgrounds: Vec<ModelKind>,
    },
    Stat(Vec<Statistic>),
}

impl Analysis {
    /// Build an analysis from a `--fit` style name: statistic names first, then model names.
    pub fn from_name<S: AsRef<str>>(name: &str, backgrounds: &[S]) -> Result<Self, AppError> {
        if let Ok(stat) = Statistic::resolve(name) {
            return Ok(Analysis::Stat(vec![stat]));
        }
        let composite = CompositeModel::from_names(name, backgrounds)?;
        Ok(Analysis::Fit {
            model: composite.primary(),
            backgrounds: composite.backgrounds().to_vec(),
        })
    }
}

/// Result of the analysis step.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    None,
    Fit(FitResult),
    Stat(StatResult),
}

impl Outcome {
    /// Feature position, if the analysis produced one.
    pub fn x0(&self) -> Option<f64> {
        match self {
            Outcome::None => None,
            Outcome::Fit(fit) => fit.x0,
            Outcome::Stat(stat) => stat.x0,
        }
    }
}

/// Everything a finished scan produced.
#[derive(Debug, Clone)]
pub struct ScanReport {
    pub plan: ResolvedPlan,
    pub sample: ScanSample,
    pub outcome: Outcome,
    /// Where the motor was left.
    pub final_position: f64,
}

/// Acquire one point per planned position, notifying observers after each.
pub fn run_scan<M, D>(
    motor: &mut M,
    detector: &mut D,
    plan: &ResolvedPlan,
    observers: &mut [&mut dyn ScanObserver],
) -> Result<ScanSample, AppError>
where
    M: Motor + ?Sized,
    D: Detector + ?Sized,
{
    let mut sample = ScanSample::new();
    for (i, &target) in plan.positions.iter().enumerate() {
        motor.move_to(target)?;
        let x = motor.position()?;
        let y = detector.read()?;
        sample.push(x, y);
        for observer in observers.iter_mut() {
            observer.on_point(i, x, y, &sample);
        }
    }
    Ok(sample)
}

/// Sweep `motor` over `plan`, analyze the data and move to the feature.
///
/// With `Analysis::None`, or when the analysis yields no position, the motor
/// goes back to its starting point. Analysis errors also return it there
/// before being reported.
pub fn fit_scan<M, D>(
    motor: &mut M,
    detector: &mut D,
    plan: &ScanPlan,
    analysis: &Analysis,
    opts: &FitOptions,
    observers: &mut [&mut dyn ScanObserver],
) -> Result<ScanReport, AppError>
where
    M: Motor + ?Sized,
    D: Detector + ?Sized,
{
    let initial = motor.position()?;
    let resolved = plan.resolve(initial)?;
    info!(
        "fit_scan: {} vs. {} over [{:.4}, {:.4}] ({} points)",
        detector.name(),
        motor.name(),
        resolved.start,
        resolved.stop,
        resolved.positions.len()
    );

    let sample = run_scan(motor, detector, &resolved, observers)?;

    let analyzed = match analysis {
        Analysis::None => Ok(Outcome::None),
        Analysis::Fit { model, backgrounds } => CompositeModel::new(*model, backgrounds)
            .and_then(|m| fit_composite(&m, &sample, Some(resolved.range()), opts))
            .map(Outcome::Fit),
        Analysis::Stat(stats) => compute_stats(stats, &sample).map(Outcome::Stat),
    };
    let outcome = match analyzed {
        Ok(outcome) => outcome,
        Err(err) => {
            warn!("analysis failed ({err}); returning {} to {initial:.4}", motor.name());
            motor.move_to(initial)?;
            return Err(err.into());
        }
    };

    let target = outcome.x0().unwrap_or(initial);
    info!("Moving {} to x = {target:.4}", motor.name());
    motor.move_to(target)?;

    Ok(ScanReport {
        plan: resolved,
        sample,
        outcome,
        final_position: motor.position()?,
    })
}

/// Sweep across a falling edge and move to it.
pub fn fit_edge_scan<M, D>(
    motor: &mut M,
    detector: &mut D,
    plan: &ScanPlan,
    opts: &EdgeOptions,
    observers: &mut [&mut dyn ScanObserver],
) -> Result<(ScanReport, EdgeResult), AppError>
where
    M: Motor + ?Sized,
    D: Detector + ?Sized,
{
    let initial = motor.position()?;
    let resolved = plan.resolve(initial)?;
    info!(
        "fit_edge: {} vs. {} over [{:.4}, {:.4}]",
        detector.name(),
        motor.name(),
        resolved.start,
        resolved.stop
    );

    let sample = run_scan(motor, detector, &resolved, observers)?;
    let edge = match fit_edge(&sample, opts) {
        Ok(edge) => edge,
        Err(err) => {
            motor.move_to(initial)?;
            return Err(err.into());
        }
    };

    info!("Moving {} to x = {:.4}", motor.name(), edge.x0);
    motor.move_to(edge.x0)?;

    let report = ScanReport {
        plan: resolved,
        sample,
        outcome: Outcome::None,
        final_position: motor.position()?,
    };
    Ok((report, edge))
}
