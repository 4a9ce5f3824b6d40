//! Formatted terminal output.
//!
//! Keeping formatting here lets the fitting and scan code stay free of
//! presentation concerns.

use std::collections::BTreeMap;

use crate::app::pipeline::SurveySummary;
use crate::domain::{EdgeResult, EdgeSource, FitQuality, FitResult, ProfileResult, ProfileShape, ScanSample, StatResult};
use crate::io::IngestedScan;
use crate::scan::ScanReport;

/// One-paragraph summary of what was loaded.
pub fn format_ingest(scan: &IngestedScan, source: &str) -> String {
    let mut out = String::new();
    out.push_str(&format!("=== beamfit - {source} ===\n"));
    out.push_str(&format!(
        "Rows: read={} used={} skipped={}\n",
        scan.rows_read,
        scan.rows_used(),
        scan.row_errors.len()
    ));
    for e in scan.row_errors.iter().take(5) {
        out.push_str(&format!("  line {}: {}\n", e.line, e.message));
    }
    if scan.row_errors.len() > 5 {
        out.push_str(&format!("  ... and {} more\n", scan.row_errors.len() - 5));
    }
    out.push_str(&format_sample(&scan.sample, &scan.x_label, &scan.y_label));
    out
}

pub fn format_sample(sample: &ScanSample, x_label: &str, y_label: &str) -> String {
    match sample.range() {
        Some(r) => format!(
            "Points: n={} | {x_label}=[{:.4}, {:.4}] | {y_label}=[{:.4}, {:.4}]\n",
            sample.len(),
            r.start,
            r.stop,
            sample.y_min(),
            sample.y_max()
        ),
        None => "Points: n=0\n".to_string(),
    }
}

/// Fitted parameters, quality and feature position.
pub fn format_fit(fit: &FitResult, bad_fit_threshold: f64) -> String {
    let mut out = String::new();

    let mut name = fit.model.to_string();
    for bg in &fit.backgrounds {
        name.push_str(&format!(" + {bg}"));
    }
    out.push_str(&format!("Model: {name}\n"));
    out.push_str("Parameters:\n");
    out.push_str(&format_params(&fit.params));
    out.push_str(&format_quality(&fit.quality, bad_fit_threshold));

    match (fit.x0, fit.y0) {
        (Some(x0), Some(y0)) => out.push_str(&format!("Center: x0={x0:.6} y0={y0:.4}\n")),
        _ => out.push_str("Center: (model has no center)\n"),
    }
    out
}

pub fn format_stats(stats: &StatResult) -> String {
    let mut out = String::from("Statistics:\n");
    for (key, value) in &stats.values {
        out.push_str(&format!("  {key:<8} {value:>16.6}\n"));
    }
    if let (Some(x0), Some(y0)) = (stats.x0, stats.y0) {
        out.push_str(&format!("Position: x0={x0:.6} y0={y0:.4}\n"));
    }
    out
}

pub fn format_edge(edge: &EdgeResult, bad_fit_threshold: f64) -> String {
    let mut out = String::from("Edge fit (sigmoid_r):\n");
    out.push_str(&format_params(&edge.params));
    out.push_str(&format_quality(&edge.quality, bad_fit_threshold));
    out.push_str(&format!("Half-max crossing: {:.6}\n", edge.x0_half_max));
    let source = match edge.source {
        EdgeSource::Fit => "fit",
        EdgeSource::HalfMax => "half-max fallback",
    };
    out.push_str(&format!("Edge: x0={:.6} ({source})\n", edge.x0));
    out
}

pub fn format_profile(profile: &ProfileResult, bad_fit_threshold: f64) -> String {
    let mut out = String::from(if profile.derivative {
        "Profile (difference of readings):\n"
    } else {
        "Profile:\n"
    });
    out.push_str(&format!("  PEAK     {:>16.6} (y={:.4})\n", profile.peak_x, profile.peak_y));
    out.push_str(&format!("  COM      {:>16.6}\n", profile.com));

    let crossings: Vec<String> = profile.roots.iter().map(|r| format!("{r:.6}")).collect();
    out.push_str(&format!(
        "  crossings at {:.2}: [{}]\n",
        profile.shift,
        crossings.join(", ")
    ));
    match profile.shape {
        ProfileShape::Peak => {
            out.push_str(&format!("  FWHM     {:>16.6}\n", profile.width));
        }
        ProfileShape::Step => {
            out.push_str("  no peak; erf step fit:\n");
            if let Some(step) = &profile.step {
                out.push_str(&format_params(&step.params));
                out.push_str(&format_quality(&step.quality, bad_fit_threshold));
            }
            out.push_str(&format!("  width    {:>16.6}\n", profile.width));
        }
    }
    out.push_str(&format!("  CEN      {:>16.6}\n", profile.cen));
    out
}

/// Scan plan and where the motor was left.
pub fn format_scan(report: &ScanReport, motor: &str) -> String {
    format!(
        "Scan: {motor} over [{:.4}, {:.4}] in {} points; {motor} now at {:.6}\n",
        report.plan.start,
        report.plan.stop,
        report.plan.positions.len(),
        report.final_position
    )
}

pub fn format_survey(summary: &SurveySummary) -> String {
    let mut out = String::from("Survey:\n");
    out.push_str(&format!(
        "  trials={} succeeded={} poor={} failed={}\n",
        summary.trials,
        summary.succeeded,
        summary.poor,
        summary.trials - summary.succeeded
    ));
    out.push_str(&format!("  truth           {:>14.6}\n", summary.truth));
    out.push_str(&format!("  mean            {:>14.6}\n", summary.mean));
    out.push_str(&format!("  std dev         {:>14.6}\n", summary.std_dev));
    out.push_str(&format!("  mean |error|    {:>14.6}\n", summary.mean_abs_error));
    out.push_str(&format!("  max |error|     {:>14.6}\n", summary.max_abs_error));

    if let Some(err) = summary.outcomes.iter().find_map(|o| o.error.as_deref()) {
        out.push_str(&format!("  first failure: {err}\n"));
    }
    out
}

fn format_params(params: &BTreeMap<String, f64>) -> String {
    let mut out = String::new();
    for (name, value) in params {
        out.push_str(&format!("  {name:<10} {value:>16.6}\n"));
    }
    out
}

fn format_quality(q: &FitQuality, bad_fit_threshold: f64) -> String {
    let mut out = format!(
        "Quality: SSE={:.4} RMSE={:.4} avg deviation={:.2}% nfev={}{}\n",
        q.sse,
        q.rmse,
        q.avg_deviation * 100.0,
        q.nfev,
        if q.converged { "" } else { " (not converged)" }
    );
    if q.is_bad(bad_fit_threshold) {
        out.push_str(&format!(
            "WARNING: poor fit (avg deviation above {:.1}%)\n",
            bad_fit_threshold * 100.0
        ));
    }
    out
}
