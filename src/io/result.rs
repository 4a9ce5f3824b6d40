//! Read/write result JSON files.
//!
//! A result file is the portable record of one analysis: what was analyzed,
//! when, and the fit/stat/edge result itself.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{EdgeResult, FitResult, ProfileResult, StatResult};
use crate::error::AppError;

pub const TOOL_NAME: &str = "beamfit";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ResultPayload {
    Fit(FitResult),
    Stat(StatResult),
    Edge(EdgeResult),
    Profile(ProfileResult),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultFile {
    pub tool: String,
    pub generated: DateTime<Utc>,
    /// Input file or simulation the data came from.
    pub source: String,
    pub x_label: String,
    pub y_label: String,
    pub n_points: usize,
    pub result: ResultPayload,
}

impl ResultFile {
    pub fn new(source: &str, x_label: &str, y_label: &str, n_points: usize, result: ResultPayload) -> Self {
        Self {
            tool: TOOL_NAME.to_string(),
            generated: Utc::now(),
            source: source.to_string(),
            x_label: x_label.to_string(),
            y_label: y_label.to_string(),
            n_points,
            result,
        }
    }
}

pub fn write_result_json(path: &Path, file: &ResultFile) -> Result<(), AppError> {
    let out = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create result JSON '{}': {e}", path.display())))?;
    write_result(out, file)
}

pub fn write_result<W: Write>(out: W, file: &ResultFile) -> Result<(), AppError> {
    serde_json::to_writer_pretty(out, file).map_err(|e| AppError::new(2, format!("Failed to write result JSON: {e}")))
}

pub fn read_result_json(path: &Path) -> Result<ResultFile, AppError> {
    let input = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open result JSON '{}': {e}", path.display())))?;
    read_result(input)
}

pub fn read_result<R: Read>(input: R) -> Result<ResultFile, AppError> {
    serde_json::from_reader(input).map_err(|e| AppError::new(2, format!("Invalid result JSON: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FitOptions, ScanSample, Statistic};
    use crate::stats::compute_stats;

    #[test]
    fn result_file_survives_a_write_read_cycle() {
        let sample = ScanSample::from_xy(&[0.0, 1.0, 2.0, 3.0, 4.0], &[1.0, 4.0, 9.0, 4.0, 1.0]);
        let stats = compute_stats(&[Statistic::Max, Statistic::Com], &sample).unwrap();
        let file = ResultFile::new("scan.csv", "armz", "intensity", sample.len(), ResultPayload::Stat(stats));

        let mut buf = Vec::new();
        write_result(&mut buf, &file).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(json["tool"], "beamfit");
        assert_eq!(json["result"]["kind"], "stat");

        let back = read_result(buf.as_slice()).unwrap();
        assert_eq!(back, file);
    }

    #[test]
    fn infinite_deviation_is_read_back() {
        // All readings negative: the relative deviation has no finite scale.
        let sample = ScanSample::from_xy(&[0.0, 1.0, 2.0, 3.0, 4.0], &[-5.0, -3.0, -1.0, -3.0, -5.0]);
        let fit = crate::fit::fit("gauss", &sample, &[] as &[&str], &FitOptions::default()).unwrap();
        assert_eq!(fit.quality.avg_deviation, f64::INFINITY);
        let file = ResultFile::new("scan.csv", "armz", "intensity", sample.len(), ResultPayload::Fit(fit));

        let mut buf = Vec::new();
        write_result(&mut buf, &file).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(json["result"]["quality"]["avg_deviation"], "inf");

        let back = read_result(buf.as_slice()).unwrap();
        assert_eq!(back, file);
    }

    #[test]
    fn missing_quality_values_read_as_nan() {
        let json = r#"{"sse": null, "rmse": "NaN", "avg_deviation": 0.5, "n": 3, "nfev": 9, "converged": true}"#;
        let q: crate::domain::FitQuality = serde_json::from_str(json).unwrap();
        assert!(q.sse.is_nan() && q.rmse.is_nan());
        assert_eq!(q.avg_deviation, 0.5);
    }

    #[test]
    fn garbage_is_rejected_with_input_error() {
        let err = read_result("{\"tool\": 1}".as_bytes()).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
