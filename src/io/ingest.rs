//! CSV ingest of recorded scans.
//!
//! A scan file is any CSV with a header row. One column is the motor
//! position, another the detector reading; every other column is ignored.
//! Rows that fail to parse are skipped and reported, not fatal.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::StringRecord;

use crate::domain::ScanSample;
use crate::error::AppError;

/// Which columns hold the scan axes. `None` means "first" / "second" column.
#[derive(Debug, Clone, Default)]
pub struct ColumnSpec {
    pub x: Option<String>,
    pub y: Option<String>,
}

/// A row-level error encountered during ingest.
#[derive(Debug, Clone)]
pub struct RowError {
    pub line: usize,
    pub message: String,
}

/// Ingest output: the sample plus bookkeeping about what was skipped.
#[derive(Debug, Clone)]
pub struct IngestedScan {
    pub sample: ScanSample,
    pub x_label: String,
    pub y_label: String,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
}

impl IngestedScan {
    pub fn rows_used(&self) -> usize {
        self.sample.len()
    }
}

/// Load a scan from a CSV file.
pub fn load_scan(path: &Path, columns: &ColumnSpec) -> Result<IngestedScan, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open CSV '{}': {e}", path.display())))?;
    read_scan(file, columns)
}

/// Load a scan from any CSV reader.
pub fn read_scan<R: Read>(input: R, columns: &ColumnSpec) -> Result<IngestedScan, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .comment(Some(b'#'))
        .from_reader(input);

    let headers = reader
        .headers()
        .map_err(|e| AppError::new(2, format!("Failed to read CSV headers: {e}")))?
        .clone();
    let header_map = build_header_map(&headers);

    let x_idx = resolve_column(columns.x.as_deref(), 0, &header_map, headers.len())?;
    let y_idx = resolve_column(columns.y.as_deref(), 1, &header_map, headers.len())?;
    if x_idx == y_idx {
        return Err(AppError::new(2, "The x and y columns must differ."));
    }

    let mut sample = ScanSample::new();
    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;

    for (idx, result) in reader.records().enumerate() {
        let line = idx + 2;
        rows_read += 1;

        let record = match result {
            Ok(r) => r,
            Err(e) => {
                row_errors.push(RowError {
                    line,
                    message: format!("CSV parse error: {e}"),
                });
                continue;
            }
        };

        match (parse_field(&record, x_idx), parse_field(&record, y_idx)) {
            (Ok(x), Ok(y)) => sample.push(x, y),
            (Err(message), _) | (_, Err(message)) => row_errors.push(RowError { line, message }),
        }
    }

    if sample.is_empty() {
        return Err(AppError::new(3, "No valid rows remain after parsing."));
    }

    Ok(IngestedScan {
        sample,
        x_label: label(&headers, x_idx),
        y_label: label(&headers, y_idx),
        row_errors,
        rows_read,
    })
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (normalize_header_name(name), idx))
        .collect()
}

fn normalize_header_name(name: &str) -> String {
    // Spreadsheet exports sometimes prefix the first header with a BOM.
    let name = name.trim().trim_start_matches('\u{feff}');
    name.to_ascii_lowercase()
}

fn label(headers: &StringRecord, idx: usize) -> String {
    headers
        .get(idx)
        .map(|h| h.trim().trim_start_matches('\u{feff}').to_string())
        .unwrap_or_default()
}

fn resolve_column(
    requested: Option<&str>,
    default_idx: usize,
    header_map: &HashMap<String, usize>,
    width: usize,
) -> Result<usize, AppError> {
    match requested {
        Some(name) => header_map
            .get(&normalize_header_name(name))
            .copied()
            .ok_or_else(|| AppError::new(2, format!("Missing column: `{name}`"))),
        None if default_idx < width => Ok(default_idx),
        None => Err(AppError::new(
            2,
            format!("CSV has {width} column(s); a scan needs at least two."),
        )),
    }
}

fn parse_field(record: &StringRecord, idx: usize) -> Result<f64, String> {
    let raw = record.get(idx).unwrap_or("").trim();
    if raw.is_empty() {
        return Err(format!("Empty value in column {}", idx + 1));
    }
    let v: f64 = raw
        .parse()
        .map_err(|_| format!("Invalid number '{raw}' in column {}", idx + 1))?;
    if !v.is_finite() {
        return Err(format!("Non-finite value '{raw}' in column {}", idx + 1));
    }
    Ok(v)
}
