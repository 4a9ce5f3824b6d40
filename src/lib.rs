//! `beamfit` library crate.
//!
//! The binary (`beamfit`) is a thin wrapper around this library so that:
//!
//! - the fitting core is testable without spawning processes
//! - scan orchestration can be driven by real hardware through the
//!   `scan::Motor`/`scan::Detector` traits, or by the simulated rig in `data`

pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod models;
pub mod report;
pub mod scan;
pub mod stats;
