//! Model library: closed-form intensity models and their initial guesses.
//!
//! Models are implemented as small, pure functions so that fitting code can
//! stay generic; `CompositeModel` sums a primary model with backgrounds.

pub mod composite;
pub mod model;

pub use composite::*;
pub use model::*;
