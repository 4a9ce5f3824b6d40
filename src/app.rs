//! Top-level application orchestration.
//!
//! `src/main.rs` only sets up logging; this module is the "real main" that:
//! - loads `.env` and parses CLI arguments
//! - reads scan CSVs or drives the simulated rig
//! - runs fits, statistics and edge fits
//! - prints reports and writes optional exports

use std::path::Path;

use clap::Parser;
use log::{info, warn};

use crate::cli::{
    Command, EdgeArgs, EdgeTuningArgs, FitArgs, InputArgs, ProfileArgs, ResponseKind, SimArgs, SimulateArgs, StatArgs,
    SurveyArgs, TuningArgs,
};
use crate::data::Response;
use crate::domain::{EdgeOptions, FitOptions, Statistic};
use crate::error::AppError;
use crate::io::{ColumnSpec, IngestedScan, ResultFile, ResultPayload};
use crate::scan::{Analysis, LiveStat, LogTable, Outcome, ScanObserver, ScanPlan};
use crate::stats::{compute_stats_by_name, profile_stats_with};

pub mod pipeline;

use pipeline::{SIM_DETECTOR, SIM_MOTOR, SimAnalysis, SimulationSpec};

/// Entry point for the `beamfit` binary.
pub fn run() -> Result<(), AppError> {
    // A missing .env is fine; it only supplies defaults such as BEAMFIT_BAD_FIT_THRESHOLD.
    dotenvy::dotenv().ok();
    let cli = crate::cli::Cli::parse();

    match cli.command {
        Command::Fit(args) => handle_fit(args),
        Command::Stat(args) => handle_stat(args),
        Command::Edge(args) => handle_edge(args),
        Command::Profile(args) => handle_profile(args),
        Command::Simulate(args) => handle_simulate(args),
        Command::Survey(args) => handle_survey(args),
    }
}

fn handle_fit(args: FitArgs) -> Result<(), AppError> {
    let scan = load(&args.input)?;
    let opts = fit_options(&args.tuning);
    println!("{}", crate::report::format_ingest(&scan, &source_name(&args.input.input)));

    let fit = crate::fit::fit(&args.model, &scan.sample, &args.backgrounds, &opts)?;
    println!("{}", crate::report::format_fit(&fit, opts.bad_fit_threshold));

    if let Some(path) = &args.export {
        export(path, &args.input.input, &scan, ResultPayload::Fit(fit))?;
    }
    Ok(())
}

fn handle_stat(args: StatArgs) -> Result<(), AppError> {
    let scan = load(&args.input)?;
    println!("{}", crate::report::format_ingest(&scan, &source_name(&args.input.input)));

    let stats = compute_stats_by_name(&args.stats, &scan.sample)?;
    println!("{}", crate::report::format_stats(&stats));

    if let Some(path) = &args.export {
        export(path, &args.input.input, &scan, ResultPayload::Stat(stats))?;
    }
    Ok(())
}

fn handle_edge(args: EdgeArgs) -> Result<(), AppError> {
    let scan = load(&args.input)?;
    let opts = edge_options(&args.edge, &args.tuning);
    println!("{}", crate::report::format_ingest(&scan, &source_name(&args.input.input)));

    let edge = crate::fit::fit_edge(&scan.sample, &opts)?;
    println!("{}", crate::report::format_edge(&edge, opts.fit.bad_fit_threshold));

    if let Some(path) = &args.export {
        export(path, &args.input.input, &scan, ResultPayload::Edge(edge))?;
    }
    Ok(())
}

fn handle_profile(args: ProfileArgs) -> Result<(), AppError> {
    let scan = load(&args.input)?;
    let opts = fit_options(&args.tuning);
    println!("{}", crate::report::format_ingest(&scan, &source_name(&args.input.input)));

    let profile = profile_stats_with(&scan.sample, args.shift, args.derivative, &opts)?;
    println!("{}", crate::report::format_profile(&profile, opts.bad_fit_threshold));

    if let Some(path) = &args.export {
        export(path, &args.input.input, &scan, ResultPayload::Profile(profile))?;
    }
    Ok(())
}

fn handle_simulate(args: SimulateArgs) -> Result<(), AppError> {
    let spec = simulation_spec(&args.sim)?;
    let seed = args.sim.seed;
    println!(
        "=== beamfit - simulated {:?} at {:.4} ===",
        args.sim.response,
        spec.response.center()
    );

    let mut table = LogTable::new(SIM_MOTOR, SIM_DETECTOR);
    let mut live = match (&spec.analysis, args.update_every) {
        (SimAnalysis::Scan(Analysis::Stat(stats)), Some(every)) => Some(LiveStat::new(stats.clone(), every)),
        _ => None,
    };
    let output = {
        let mut observers: Vec<&mut dyn ScanObserver> = vec![&mut table];
        if let Some(live) = live.as_mut() {
            observers.push(live);
        }
        pipeline::run_simulation(&spec, seed, &mut observers)?
    };
    if let Some(live) = &live {
        info!("live statistics updated {} times", live.updates());
    }

    let report = &output.report;
    println!("{}", crate::report::format_sample(&report.sample, SIM_MOTOR, SIM_DETECTOR));
    let payload = match (&output.edge, &report.outcome) {
        (Some(edge), _) => {
            println!("{}", crate::report::format_edge(edge, spec.fit.bad_fit_threshold));
            Some(ResultPayload::Edge(edge.clone()))
        }
        (None, Outcome::Fit(fit)) => {
            println!("{}", crate::report::format_fit(fit, spec.fit.bad_fit_threshold));
            Some(ResultPayload::Fit(fit.clone()))
        }
        (None, Outcome::Stat(stats)) => {
            println!("{}", crate::report::format_stats(stats));
            Some(ResultPayload::Stat(stats.clone()))
        }
        (None, Outcome::None) => None,
    };
    println!("{}", crate::report::format_scan(report, SIM_MOTOR));

    if let Some(path) = &args.save_csv {
        crate::io::write_scan_csv(path, &report.sample, SIM_MOTOR, SIM_DETECTOR)?;
        info!("scan saved to {}", path.display());
    }
    if let Some(path) = &args.export {
        match payload {
            Some(result) => {
                let file = ResultFile::new(
                    &format!("simulation (seed {seed})"),
                    SIM_MOTOR,
                    SIM_DETECTOR,
                    report.sample.len(),
                    result,
                );
                crate::io::write_result_json(path, &file)?;
            }
            None => warn!("nothing to export: no analysis was requested"),
        }
    }
    Ok(())
}

fn handle_survey(args: SurveyArgs) -> Result<(), AppError> {
    let spec = simulation_spec(&args.sim)?;
    if !spec.noise {
        warn!("survey without noise repeats the same scan");
    }

    let summary = pipeline::run_survey(&spec, args.trials, args.sim.seed)?;
    println!("{}", crate::report::format_survey(&summary));
    if summary.succeeded == 0 {
        return Err(AppError::new(3, "No survey trial produced a position."));
    }
    Ok(())
}

fn load(input: &InputArgs) -> Result<IngestedScan, AppError> {
    let columns = ColumnSpec {
        x: input.x_col.clone(),
        y: input.y_col.clone(),
    };
    let scan = crate::io::load_scan(&input.input, &columns)?;
    if !scan.row_errors.is_empty() {
        warn!("skipped {} unparsable row(s) in {}", scan.row_errors.len(), input.input.display());
    }
    Ok(scan)
}

fn export(path: &Path, input: &Path, scan: &IngestedScan, result: ResultPayload) -> Result<(), AppError> {
    let file = ResultFile::new(
        &input.display().to_string(),
        &scan.x_label,
        &scan.y_label,
        scan.sample.len(),
        result,
    );
    crate::io::write_result_json(path, &file)?;
    info!("result written to {}", path.display());
    Ok(())
}

fn source_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

pub fn fit_options(args: &TuningArgs) -> FitOptions {
    FitOptions {
        bad_fit_threshold: args.bad_fit_threshold,
        max_iterations: args.max_iterations,
        ..FitOptions::default()
    }
}

pub fn edge_options(edge: &EdgeTuningArgs, tuning: &TuningArgs) -> EdgeOptions {
    EdgeOptions {
        fit: fit_options(tuning),
        sigma_guess: edge.sigma_guess,
        ..EdgeOptions::default()
    }
}

/// Build a simulation from CLI arguments, filling response defaults from the test rig.
pub fn simulation_spec(args: &SimArgs) -> Result<SimulationSpec, AppError> {
    let response = match args.response {
        ResponseKind::Peak => Response::peak(
            args.center.unwrap_or(-40.0),
            args.amplitude,
            args.width.unwrap_or(0.1),
            args.background,
        ),
        ResponseKind::Edge => Response::edge(
            args.center.unwrap_or(-17.0),
            args.amplitude,
            args.width.unwrap_or(0.05),
            args.background,
        ),
    };
    if let Some(w) = args.width {
        if !(w > 0.0) {
            return Err(AppError::new(2, "--width must be > 0."));
        }
    }

    let plan = match args.range.as_deref() {
        Some([lo, hi]) => ScanPlan::relative(*lo, *hi, args.num),
        Some(_) => return Err(AppError::new(2, "--range takes exactly two values.")),
        None => ScanPlan::centered(args.span, args.num),
    };

    let analysis = if args.edge {
        SimAnalysis::Edge
    } else if let Some(name) = &args.fit {
        SimAnalysis::Scan(Analysis::from_name(name, &args.backgrounds)?)
    } else if !args.stats.is_empty() {
        let stats = args
            .stats
            .iter()
            .map(|s| Statistic::resolve(s))
            .collect::<Result<Vec<_>, _>>()?;
        SimAnalysis::Scan(Analysis::Stat(stats))
    } else {
        SimAnalysis::Scan(Analysis::None)
    };
    if !args.backgrounds.is_empty() && args.fit.is_none() {
        warn!("--background-model is ignored without --fit");
    }
    if let SimAnalysis::Scan(Analysis::Fit { model, .. }) = &analysis {
        if model.center_param().is_none() {
            warn!("{model} has no center; the motor will return to its start");
        }
    }

    let tuning = &args.tuning;
    Ok(SimulationSpec {
        response,
        start: args.start.unwrap_or(response.center() + 0.1),
        plan,
        analysis,
        fit: fit_options(tuning),
        edge: edge_options(&args.edge_tuning, tuning),
        noise: !args.no_noise,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Command};
    use crate::domain::ModelKind;

    fn sim_args(argv: &[&str]) -> SimArgs {
        let mut full = vec!["beamfit", "simulate"];
        full.extend_from_slice(argv);
        match Cli::try_parse_from(full).unwrap().command {
            Command::Simulate(args) => args.sim,
            _ => panic!("expected simulate"),
        }
    }

    #[test]
    fn defaults_reproduce_the_test_rig_peak() {
        let spec = simulation_spec(&sim_args(&[])).unwrap();
        assert_eq!(spec.response, Response::demo_peak());
        assert!((spec.start + 39.9).abs() < 1e-12);
        assert_eq!(spec.plan, ScanPlan::centered(1.0, 11));
        assert_eq!(spec.analysis, SimAnalysis::Scan(Analysis::None));
        assert!(spec.noise);
    }

    #[test]
    fn fit_and_stat_names_are_resolved() {
        let spec = simulation_spec(&sim_args(&["--fit", "gaussian", "--background-model", "constant"])).unwrap();
        assert_eq!(
            spec.analysis,
            SimAnalysis::Scan(Analysis::Fit {
                model: ModelKind::Gauss,
                backgrounds: vec![ModelKind::Constant],
            })
        );

        let spec = simulation_spec(&sim_args(&["--stat", "HMi", "--stat", "COM"])).unwrap();
        assert!(matches!(spec.analysis, SimAnalysis::Scan(Analysis::Stat(ref s)) if s.len() == 2));

        let err = simulation_spec(&sim_args(&["--fit", "quadratic"])).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn edge_simulation_uses_edge_defaults() {
        let spec = simulation_spec(&sim_args(&["--response", "edge", "--edge", "--no-noise"])).unwrap();
        assert_eq!(spec.response, Response::edge(-17.0, 1000.0, 0.05, 10.0));
        assert_eq!(spec.analysis, SimAnalysis::Edge);
        assert!(!spec.noise);
    }
}
