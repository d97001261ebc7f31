//! Configuration types for ellipsoid fitting and table reconstruction.

use serde::{Deserialize, Serialize};

/// How seams between independently fitted regions are smoothed after
/// reconstruction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryMode {
    /// Leave the reconstructed values untouched.
    None,
    /// Average whole columns where the pole row changes label.
    Columns,
    /// Average interior cells lying on any region seam.
    #[default]
    Regions,
}

/// Fitting and reconstruction parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitConfig {
    /// Add a sixth, constant term so surfaces need not pass through the origin.
    #[serde(default = "default_free_constant")]
    pub free_constant: bool,
    /// Boundary smoothing used when reporting reconstructed tables.
    #[serde(default)]
    pub boundary: BoundaryMode,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            free_constant: default_free_constant(),
            boundary: BoundaryMode::default(),
        }
    }
}

fn default_free_constant() -> bool {
    true
}

impl FitConfig {
    /// Number of coefficients per region.
    #[inline]
    pub fn coefficient_count(&self) -> usize {
        if self.free_constant { 6 } else { 5 }
    }
}

/// Rejected requests: malformed configuration or wrongly shaped inputs.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("Region count must be between 1 and {max}, got {got}")]
    InvalidRegionCount { got: usize, max: usize },
    #[error("Population size must be at least 1")]
    PopulationTooSmall,
    #[error("Stagnation threshold must be at least 1")]
    InvalidStagnationThreshold,
    #[error("Generation cap must be at least 1")]
    InvalidGenerationCap,
    #[error("Mutation intensities must be at least 1")]
    InvalidMutationIntensity,
    #[error("Corpus is empty")]
    EmptyCorpus,
    #[error("Expected a {rows}x{cols} table, got {got_rows}x{got_cols}")]
    DimensionMismatch {
        rows: usize,
        cols: usize,
        got_rows: usize,
        got_cols: usize,
    },
    #[error("Cell ({row}, {col}) holds invalid magnitude {value}")]
    InvalidMagnitude { row: usize, col: usize, value: f64 },
    #[error("Cell ({row}, {col}) holds label {label}, expected 1..={regions}")]
    LabelOutOfRange {
        row: usize,
        col: usize,
        label: u16,
        regions: usize,
    },
    #[error("Partition has {got} distinct labels, expected {expected}")]
    MissingRegions { got: usize, expected: usize },
    #[error("Invalid stops: {0}")]
    InvalidStops(String),
    #[error("Expected 5 or 6 coefficients per region, got {got}")]
    InvalidCoefficientCount { got: usize },
    #[error("Partition has {regions} regions but {got} coefficient sets were given")]
    RegionCountMismatch { regions: usize, got: usize },
}
