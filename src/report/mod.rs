//! Reporting utilities: formatted terminal output for fits, statistics,
//! edges, scans and surveys.

pub mod format;

pub use format::*;
