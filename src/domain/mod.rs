//! Domain types used throughout the crate.
//!
//! This module defines:
//!
//! - scan data (`ScanPoint`, `ScanSample`, `ScanRange`)
//! - model and statistic names (`ModelKind`, `Statistic`)
//! - fit inputs/outputs (`Parameter`, `FitResult`, `StatResult`, `EdgeResult`, options)

pub mod types;

pub use types::*;
