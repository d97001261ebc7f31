//! Ellipsoid partition - Piecewise quadric models of photometric r-tables.
//!
//! An r-table holds reflectance magnitudes sampled on a fixed 29x20 grid of
//! incidence (Epsilon) and azimuth (Beta) angles. This crate splits the grid
//! into regions, fits one ellipsoid-like quadric per region by least squares,
//! rebuilds the table from the fitted surfaces and searches for the
//! partition that minimizes reconstruction error over a corpus.
//!
//! # Architecture
//!
//! - `schema`: Angle model, grid and partition types, configuration
//! - `compute`: Fitting, reconstruction, metrics and the genetic search
//! - `error`: Crate-level error type
//!
//! # Example
//!
//! ```rust
//! use ellipsoid_partition::{
//!     compute::{fit_ellipsoids, metrics::normalized_error, reconstruct},
//!     schema::{BoundaryMode, MeasurementGrid, Partition},
//! };
//!
//! let table = MeasurementGrid::try_from_fn(|row, col| 100.0 + (row * col) as f64)?;
//! let partition = Partition::from_stops(&[0.0, 30.0, 90.0, 180.0])?;
//!
//! let coeffs = fit_ellipsoids(&table, &partition, true)?;
//! let rebuilt = reconstruct(&coeffs, &partition, BoundaryMode::Regions)?;
//! println!("error = {:.4}", normalized_error(&table, &rebuilt));
//! # Ok::<(), ellipsoid_partition::error::EngineError>(())
//! ```

pub mod compute;
pub mod error;
pub mod schema;

// Re-export commonly used types
pub use compute::evolution::{EvolutionEngine, run_search};
pub use error::{EngineError, Result};
pub use schema::{EvolutionConfig, MeasurementGrid, Partition};
