//! Schema module - Angular model, grid types and configuration.

mod angles;
mod config;
mod evolution;
mod grid;

pub use angles::*;
pub use config::*;
pub use evolution::*;
pub use grid::*;

pub(crate) use grid::region_counts;
