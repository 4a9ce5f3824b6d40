//! Mathematical utilities: bounded Levenberg–Marquardt, SVD least squares,
//! bound transforms and interpolation.

pub mod bounds;
pub mod interp;
pub mod lm;
pub mod ols;

pub use bounds::*;
pub use interp::*;
pub use lm::*;
pub use ols::*;
