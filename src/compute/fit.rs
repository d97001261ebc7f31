//! Per-region least-squares ellipsoid fitting.
//!
//! Every cell of a region becomes a Cartesian point `r * d(eps, beta)`. The
//! region's surface is modelled as
//!
//! ```text
//! |p|^2 = v0 (x^2 + y^2 - 2z^2) + v1 (x^2 + z^2 - 2y^2) + 2 v2 xz + 2 v3 x + 2 v4 z [+ v5]
//! ```
//!
//! which is linear in `v`. The two leading terms encode the diagonal of the
//! quadric under a fixed trace of -3, `v2` the xz cross term, `v3`/`v4` the
//! linear terms and the optional `v5` a free constant.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::schema::{AngleModel, ConfigError, MeasurementGrid, Partition};

/// Fitted parameters of one region's surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct EllipsoidCoefficients {
    values: Vec<f64>,
}

impl EllipsoidCoefficients {
    /// Wrap 5 (origin-bound) or 6 (free constant) raw parameters.
    pub fn new(values: Vec<f64>) -> Result<Self, ConfigError> {
        if values.len() != 5 && values.len() != 6 {
            return Err(ConfigError::InvalidCoefficientCount { got: values.len() });
        }
        Ok(Self { values })
    }

    /// Express an implicit quadric in the fitted parametrization.
    ///
    /// The quadric is rescaled so its diagonal sums to -3. Returns `None`
    /// when the diagonal sums to zero, or when it carries a constant and
    /// `free_constant` is off.
    pub fn from_quadric(quadric: &Quadric, free_constant: bool) -> Option<Self> {
        let trace = quadric.xx + quadric.yy + quadric.zz;
        if trace.abs() < f64::EPSILON || (!free_constant && quadric.constant != 0.0) {
            return None;
        }
        let s = -3.0 / trace;
        let (xx, yy) = (quadric.xx * s, quadric.yy * s);

        let v1 = (xx - yy) / 3.0;
        let v0 = xx + 1.0 - v1;
        let mut values = vec![v0, v1, quadric.xz * s, quadric.x * s, quadric.z * s];
        if free_constant {
            values.push(quadric.constant * s);
        }
        Some(Self { values })
    }

    #[inline]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    #[inline]
    pub fn has_free_constant(&self) -> bool {
        self.values.len() == 6
    }

    /// Implicit form of the fitted surface.
    pub fn quadric(&self) -> Quadric {
        let v = &self.values;
        Quadric {
            xx: v[0] + v[1] - 1.0,
            yy: v[0] - 2.0 * v[1] - 1.0,
            zz: v[1] - 2.0 * v[0] - 1.0,
            xz: v[2],
            x: v[3],
            z: v[4],
            constant: v.get(5).copied().unwrap_or(0.0),
        }
    }
}

impl TryFrom<Vec<f64>> for EllipsoidCoefficients {
    type Error = ConfigError;

    fn try_from(values: Vec<f64>) -> Result<Self, Self::Error> {
        Self::new(values)
    }
}

impl From<EllipsoidCoefficients> for Vec<f64> {
    fn from(coeffs: EllipsoidCoefficients) -> Self {
        coeffs.values
    }
}

/// Implicit quadric
/// `xx X² + yy Y² + zz Z² + 2 xz XZ + 2 x X + 2 z Z + constant = 0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quadric {
    pub xx: f64,
    pub yy: f64,
    pub zz: f64,
    pub xz: f64,
    pub x: f64,
    pub z: f64,
    pub constant: f64,
}

impl Quadric {
    /// Coefficients `(A, B, d)` of `A r² + B r + d = 0` along a unit direction.
    #[inline]
    pub fn along(&self, [dx, dy, dz]: [f64; 3]) -> (f64, f64, f64) {
        let a = self.xx * dx * dx + self.yy * dy * dy + self.zz * dz * dz + 2.0 * self.xz * dx * dz;
        let b = 2.0 * (self.x * dx + self.z * dz);
        (a, b, self.constant)
    }
}

/// Fit one surface per region, ordered by ascending label.
pub fn fit_ellipsoids(
    grid: &MeasurementGrid,
    partition: &Partition,
    free_constant: bool,
) -> Result<Vec<EllipsoidCoefficients>> {
    let angles = AngleModel::get();
    let params = if free_constant { 6 } else { 5 };

    partition
        .cells_by_region()
        .into_iter()
        .enumerate()
        .map(|(idx, cells)| {
            let region = (idx + 1) as u16;
            let n = cells.len();
            let mut design = DMatrix::<f64>::zeros(n, params);
            let mut norms = DVector::<f64>::zeros(n);

            for (i, &(row, col)) in cells.iter().enumerate() {
                let r = grid.get(row, col);
                let [dx, dy, dz] = angles.direction(row, col);
                let (x, y, z) = (r * dx, r * dy, r * dz);

                design[(i, 0)] = x * x + y * y - 2.0 * z * z;
                design[(i, 1)] = x * x + z * z - 2.0 * y * y;
                design[(i, 2)] = 2.0 * x * z;
                design[(i, 3)] = 2.0 * x;
                design[(i, 4)] = 2.0 * z;
                if free_constant {
                    design[(i, 5)] = 1.0;
                }
                norms[i] = x * x + y * y + z * z;
            }

            let solution = solve_least_squares(design, &norms).map_err(|reason| {
                EngineError::NumericFailure {
                    table: 0,
                    region,
                    reason,
                    partition: Box::new(partition.clone()),
                }
            })?;

            Ok(EllipsoidCoefficients {
                values: solution.iter().copied().collect(),
            })
        })
        .collect()
}

/// Sweep cap for the SVD; a solve that has not converged by then fails.
const MAX_SVD_ITERATIONS: usize = 1000;

/// Minimum-norm least-squares solution via the SVD pseudo-inverse.
fn solve_least_squares(design: DMatrix<f64>, rhs: &DVector<f64>) -> Result<DVector<f64>, String> {
    if design.iter().chain(rhs.iter()).any(|v| !v.is_finite()) {
        return Err("least-squares system has non-finite entries".to_string());
    }

    let (rows, cols) = design.shape();
    let svd = design
        .try_svd(true, true, f64::EPSILON, MAX_SVD_ITERATIONS)
        .ok_or_else(|| format!("SVD did not converge in {MAX_SVD_ITERATIONS} iterations"))?;

    // Singular values below this are treated as zero (rank deficiency).
    let max_sv = svd.singular_values.max();
    let cutoff = f64::EPSILON * rows.max(cols) as f64 * max_sv;

    let solution = svd.solve(rhs, cutoff).map_err(str::to_string)?;
    if solution.iter().any(|v| !v.is_finite()) {
        return Err(format!("least-squares solution is not finite: {solution:?}"));
    }
    Ok(solution)
}
