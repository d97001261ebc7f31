//! Fixed angular sampling of an r-table.
//!
//! Rows follow the polar angle epsilon (29 samples defined through their
//! tangents), columns follow the azimuth beta (20 samples in degrees).

use std::sync::LazyLock;

/// Number of polar (epsilon) samples, i.e. grid rows.
pub const EPSILON_COUNT: usize = 29;

/// Number of azimuth (beta) samples, i.e. grid columns.
pub const BETA_COUNT: usize = 20;

/// Total number of grid cells.
pub const CELL_COUNT: usize = EPSILON_COUNT * BETA_COUNT;

/// Azimuth angles in degrees.
pub const BETA_DEGREES: [f64; BETA_COUNT] = [
    0.0, 2.0, 5.0, 10.0, 15.0, 20.0, 25.0, 30.0, 35.0, 40.0, 45.0, 60.0, 75.0, 90.0, 105.0, 120.0,
    135.0, 150.0, 165.0, 180.0,
];

/// Tangents of the polar angles.
pub const TAN_EPSILON: [f64; EPSILON_COUNT] = [
    0.0, 0.25, 0.5, 0.75, 1.0, 1.25, 1.5, 1.75, 2.0, 2.5, 3.0, 3.5, 4.0, 4.5, 5.0, 5.5, 6.0, 6.5,
    7.0, 7.5, 8.0, 8.5, 9.0, 9.5, 10.0, 10.5, 11.0, 11.5, 12.0,
];

static ANGLES: LazyLock<AngleModel> = LazyLock::new(AngleModel::build);

/// Precomputed angles and unit directions for every cell.
#[derive(Debug, Clone)]
pub struct AngleModel {
    /// Azimuth angles in radians.
    pub beta: [f64; BETA_COUNT],
    /// Polar angles in radians.
    pub epsilon: [f64; EPSILON_COUNT],
    directions: Vec<[f64; 3]>,
}

impl AngleModel {
    /// Process-wide instance.
    pub fn get() -> &'static AngleModel {
        &ANGLES
    }

    fn build() -> Self {
        let beta = BETA_DEGREES.map(f64::to_radians);
        let epsilon = TAN_EPSILON.map(f64::atan);

        let mut directions = Vec::with_capacity(CELL_COUNT);
        for eps in epsilon {
            let (sin_e, cos_e) = eps.sin_cos();
            for b in beta {
                let (sin_b, cos_b) = b.sin_cos();
                directions.push([sin_e * cos_b, sin_e * sin_b, cos_e]);
            }
        }

        Self {
            beta,
            epsilon,
            directions,
        }
    }

    /// Unit direction `(x, y, z)` of the cell at `(row, col)`.
    #[inline]
    pub fn direction(&self, row: usize, col: usize) -> [f64; 3] {
        self.directions[row * BETA_COUNT + col]
    }

    /// Column index of an azimuth given in degrees, if it is a sample angle.
    pub fn beta_column(degrees: f64) -> Option<usize> {
        BETA_DEGREES.iter().position(|&b| (b - degrees).abs() < 1e-9)
    }
}
