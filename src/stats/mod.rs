//! Statistics driver: locate a feature without fitting.

pub mod profile;
pub mod statistic;

pub use profile::*;
pub use statistic::*;
