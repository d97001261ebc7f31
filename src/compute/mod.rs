//! Compute module - Fitting, reconstruction, metrics and search.

mod fit;
mod reconstruct;

pub mod evolution;
pub mod metrics;

pub use fit::*;
pub use reconstruct::*;
