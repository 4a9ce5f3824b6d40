//! Write scans back out as CSV.
//!
//! The layout is the one `ingest` reads by default: position first, reading
//! second, with the motor and detector names as headers.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::domain::ScanSample;
use crate::error::AppError;

/// Write a scan to a CSV file.
pub fn write_scan_csv(path: &Path, sample: &ScanSample, x_label: &str, y_label: &str) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create scan CSV '{}': {e}", path.display())))?;
    write_scan(file, sample, x_label, y_label)
}

/// Write a scan to any writer.
pub fn write_scan<W: Write>(out: W, sample: &ScanSample, x_label: &str, y_label: &str) -> Result<(), AppError> {
    let mut writer = csv::Writer::from_writer(out);
    writer
        .write_record([x_label, y_label])
        .map_err(|e| AppError::new(2, format!("Failed to write scan CSV header: {e}")))?;

    for p in &sample.points {
        writer
            .write_record([format!("{}", p.x), format!("{}", p.y)])
            .map_err(|e| AppError::new(2, format!("Failed to write scan CSV row: {e}")))?;
    }

    writer
        .flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush scan CSV: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::ingest::{ColumnSpec, read_scan};

    #[test]
    fn exported_scan_reads_back_unchanged() {
        let sample = ScanSample::from_xy(&[-40.1, -40.0, -39.9], &[12.0, 1010.0, 0.1 + 0.2]);
        let mut buf = Vec::new();
        write_scan(&mut buf, &sample, "armz", "intensity").unwrap();

        let text = String::from_utf8(buf.clone()).unwrap();
        assert!(text.starts_with("armz,intensity\n"));

        let back = read_scan(buf.as_slice(), &ColumnSpec::default()).unwrap();
        assert_eq!(back.sample, sample);
        assert!(back.row_errors.is_empty());
    }
}
