//! Curve fitting orchestration.
//!
//! Responsibilities:
//!
//! - two-stage (center first, then everything) fit of a composite model
//! - edge-optimized sigmoid_r fit with a half-max fallback

pub mod edge;
pub mod fitter;

pub use edge::*;
pub use fitter::*;
