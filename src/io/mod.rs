//! Input/output helpers.
//!
//! - scan CSV ingest + validation (`ingest`)
//! - scan CSV export (`export`)
//! - result JSON files (`result`)

pub mod export;
pub mod ingest;
pub mod result;

pub use export::*;
pub use ingest::*;
pub use result::*;
