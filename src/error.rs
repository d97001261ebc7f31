//! Crate-level error type.

use std::io;

use crate::schema::{ConfigError, Partition};

/// Errors surfaced by fitting, reconstruction and search.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Malformed configuration or wrongly shaped input.
    #[error("Invalid request: {0}")]
    InvalidRequest(#[from] ConfigError),

    /// A solve or inversion produced a non-finite result.
    #[error("Numeric failure in region {region} of table {table}: {reason}")]
    NumericFailure {
        /// Corpus index of the offending table.
        table: usize,
        /// Label of the offending region.
        region: u16,
        /// What went wrong.
        reason: String,
        /// Partition being evaluated, for reproduction.
        partition: Box<Partition>,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    /// Attach the corpus index to a numeric failure.
    pub(crate) fn in_table(self, index: usize) -> Self {
        match self {
            Self::NumericFailure {
                region,
                reason,
                partition,
                ..
            } => Self::NumericFailure {
                table: index,
                region,
                reason,
                partition,
            },
            other => other,
        }
    }
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
