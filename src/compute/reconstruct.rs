//! Table reconstruction from fitted region surfaces.
//!
//! Each cell's magnitude is the distance from the origin to its region's
//! surface along the cell's fixed direction. The pole row is collapsed to
//! its mean and region seams are optionally smoothed.

use crate::error::{EngineError, Result};
use crate::schema::{
    AngleModel, BETA_COUNT, BoundaryMode, ConfigError, EPSILON_COUNT, MeasurementGrid, Partition,
};

use super::fit::{EllipsoidCoefficients, Quadric};

/// Rebuild a full table from per-region coefficients.
///
/// `coeffs[i]` belongs to region label `i + 1`.
pub fn reconstruct(
    coeffs: &[EllipsoidCoefficients],
    partition: &Partition,
    boundary: BoundaryMode,
) -> Result<MeasurementGrid> {
    if coeffs.len() != partition.regions() {
        return Err(ConfigError::RegionCountMismatch {
            regions: partition.regions(),
            got: coeffs.len(),
        }
        .into());
    }

    let angles = AngleModel::get();
    let quadrics: Vec<Quadric> = coeffs.iter().map(EllipsoidCoefficients::quadric).collect();

    let mut values = [[0.0f64; BETA_COUNT]; EPSILON_COUNT];
    for (row, row_values) in values.iter_mut().enumerate() {
        for (col, value) in row_values.iter_mut().enumerate() {
            let label = partition.label(row, col);
            let quadric = &quadrics[label as usize - 1];
            *value = radial_magnitude(quadric, angles.direction(row, col)).map_err(|reason| {
                EngineError::NumericFailure {
                    table: 0,
                    region: label,
                    reason: format!("cell ({row}, {col}): {reason}"),
                    partition: Box::new(partition.clone()),
                }
            })?;
        }
    }

    // The pole is a single physical direction.
    let pole_mean = values[0].iter().sum::<f64>() / BETA_COUNT as f64;
    values[0] = [pole_mean; BETA_COUNT];

    let values = match boundary {
        BoundaryMode::None => values,
        BoundaryMode::Columns => smooth_columns(&values, partition),
        BoundaryMode::Regions => smooth_regions(&values, partition),
    };

    Ok(MeasurementGrid::from_fn(|row, col| values[row][col]))
}

/// Non-negative root of `A r² + B r + d = 0` along `dir`.
///
/// With `d == 0` the non-trivial root `-B / A` is taken; when no real
/// positive surface exists in that direction the magnitude is 0.
pub fn radial_magnitude(quadric: &Quadric, dir: [f64; 3]) -> Result<f64, String> {
    let (a, b, d) = quadric.along(dir);

    let r = if d == 0.0 {
        if a == 0.0 { 0.0 } else { -b / a }
    } else if a == 0.0 {
        if b == 0.0 { 0.0 } else { -d / b }
    } else {
        let disc = b * b - 4.0 * a * d;
        if disc < 0.0 {
            0.0
        } else {
            let sqrt = disc.sqrt();
            ((-b + sqrt) / (2.0 * a)).max((-b - sqrt) / (2.0 * a))
        }
    };

    if !r.is_finite() {
        return Err(format!("non-finite magnitude (A={a}, B={b}, d={d})"));
    }
    Ok(r.max(0.0))
}

type Table = [[f64; BETA_COUNT]; EPSILON_COUNT];

/// Average whole columns where the pole row changes label.
///
/// The collapsed pole row is left as is.
fn smooth_columns(src: &Table, partition: &Partition) -> Table {
    let mut out = *src;
    for col in 1..BETA_COUNT {
        if partition.label(0, col) == partition.label(0, col - 1) {
            continue;
        }
        let lo = col - 1;
        let hi = (col + 1).min(BETA_COUNT - 1);
        let width = (hi - lo + 1) as f64;
        for row in 1..EPSILON_COUNT {
            out[row][col] = src[row][lo..=hi].iter().sum::<f64>() / width;
        }
    }
    out
}

/// Average interior seam cells across the seam.
///
/// A cell differing from a left/right neighbour is averaged over its row
/// triple, one differing from an up/down neighbour over its column triple,
/// and a corner cell takes the mean of both.
fn smooth_regions(src: &Table, partition: &Partition) -> Table {
    let mut out = *src;
    for row in 1..EPSILON_COUNT - 1 {
        for col in 1..BETA_COUNT - 1 {
            let label = partition.label(row, col);
            let across_cols =
                partition.label(row, col - 1) != label || partition.label(row, col + 1) != label;
            let across_rows =
                partition.label(row - 1, col) != label || partition.label(row + 1, col) != label;

            let horizontal = (src[row][col - 1] + src[row][col] + src[row][col + 1]) / 3.0;
            let vertical = (src[row - 1][col] + src[row][col] + src[row + 1][col]) / 3.0;

            out[row][col] = match (across_cols, across_rows) {
                (true, true) => (horizontal + vertical) / 2.0,
                (true, false) => horizontal,
                (false, true) => vertical,
                (false, false) => continue,
            };
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::fit::fit_ellipsoids;
    use crate::compute::metrics::normalized_error;
    use crate::schema::CELL_COUNT;

    fn prolate() -> Quadric {
        Quadric {
            xx: -1.2,
            yy: -0.8,
            zz: -1.0,
            xz: 0.05,
            x: 0.1,
            z: 0.2,
            constant: 0.9,
        }
    }

    fn analytic_grid(q: &Quadric) -> MeasurementGrid {
        let angles = AngleModel::get();
        MeasurementGrid::from_fn(|row, col| {
            let (a, b, d) = q.along(angles.direction(row, col));
            let sqrt = (b * b - 4.0 * a * d).sqrt();
            ((-b + sqrt) / (2.0 * a)).max((-b - sqrt) / (2.0 * a))
        })
    }

    #[test]
    fn test_single_quadric_end_to_end() {
        let grid = analytic_grid(&prolate());
        let partition = Partition::from_labels(vec![1; CELL_COUNT], 1).unwrap();

        let coeffs = fit_ellipsoids(&grid, &partition, true).unwrap();
        let rebuilt = reconstruct(&coeffs, &partition, BoundaryMode::None).unwrap();

        let error = normalized_error(&grid, &rebuilt);
        assert!(error < 1e-6, "normalized error {error}");
    }

    #[test]
    fn test_origin_bound_surface() {
        // Sphere through the origin: |p|² = 2 (0.5 z).
        let q = Quadric {
            xx: -1.0,
            yy: -1.0,
            zz: -1.0,
            xz: 0.0,
            x: 0.0,
            z: 0.5,
            constant: 0.0,
        };
        let coeffs = vec![EllipsoidCoefficients::from_quadric(&q, false).unwrap()];
        let partition = Partition::from_labels(vec![1; CELL_COUNT], 1).unwrap();
        let grid = reconstruct(&coeffs, &partition, BoundaryMode::None).unwrap();

        // r = cos(eps), independent of beta.
        let angles = AngleModel::get();
        for row in 0..EPSILON_COUNT {
            let expected = angles.epsilon[row].cos();
            for col in 0..BETA_COUNT {
                assert!((grid.get(row, col) - expected).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_degenerate_directions_are_zero() {
        let flat = Quadric {
            xx: 0.0,
            yy: 0.0,
            zz: 0.0,
            xz: 0.0,
            x: 0.0,
            z: 0.0,
            constant: 0.0,
        };
        assert_eq!(radial_magnitude(&flat, [0.0, 0.0, 1.0]), Ok(0.0));

        // No real intersection: -r² - 1 = 0.
        let imaginary = Quadric {
            xx: -1.0,
            yy: -1.0,
            zz: -1.0,
            constant: -1.0,
            ..flat
        };
        assert_eq!(radial_magnitude(&imaginary, [0.0, 0.0, 1.0]), Ok(0.0));
    }

    #[test]
    fn test_negative_magnitudes_are_clamped() {
        // Surface lies behind the origin along +z.
        let q = Quadric {
            xx: -1.0,
            yy: -1.0,
            zz: -1.0,
            xz: 0.0,
            x: 0.0,
            z: -0.5,
            constant: 0.0,
        };
        assert_eq!(radial_magnitude(&q, [0.0, 0.0, 1.0]), Ok(0.0));
    }

    #[test]
    fn test_non_finite_coefficients_fail() {
        let coeffs = vec![EllipsoidCoefficients::new(vec![f64::NAN, 0.0, 0.0, 0.0, 0.0]).unwrap()];
        let partition = Partition::from_labels(vec![1; CELL_COUNT], 1).unwrap();
        let result = reconstruct(&coeffs, &partition, BoundaryMode::None);
        assert!(matches!(result, Err(EngineError::NumericFailure { .. })));
    }

    #[test]
    fn test_region_count_mismatch() {
        let partition = Partition::from_stops(&[0.0, 60.0, 180.0]).unwrap();
        let coeffs = vec![EllipsoidCoefficients::new(vec![0.0; 6]).unwrap()];
        assert!(matches!(
            reconstruct(&coeffs, &partition, BoundaryMode::None),
            Err(EngineError::InvalidRequest(
                ConfigError::RegionCountMismatch { .. }
            ))
        ));
    }

    #[test]
    fn test_pole_row_is_uniform() {
        let partition = Partition::from_stops(&[0.0, 15.0, 60.0, 180.0]).unwrap();
        let coeffs: Vec<_> = [0.1, 0.4, 0.8]
            .iter()
            .map(|&z| EllipsoidCoefficients::new(vec![0.0, 0.0, 0.0, 0.0, z, 1.0]).unwrap())
            .collect();
        let grid = reconstruct(&coeffs, &partition, BoundaryMode::None).unwrap();
        let pole = grid.get(0, 0);
        assert!((0..BETA_COUNT).all(|c| grid.get(0, c) == pole));
    }

    #[test]
    fn test_column_smoothing_touches_only_seams() {
        let partition = Partition::from_stops(&[0.0, 60.0, 180.0]).unwrap();
        let seam = AngleModel::beta_column(60.0).unwrap();
        let coeffs = vec![
            EllipsoidCoefficients::new(vec![0.0, 0.0, 0.0, 0.0, 0.0, 1.0]).unwrap(),
            EllipsoidCoefficients::new(vec![0.0, 0.0, 0.0, 0.0, 0.0, 4.0]).unwrap(),
        ];
        let raw = reconstruct(&coeffs, &partition, BoundaryMode::None).unwrap();
        let smooth = reconstruct(&coeffs, &partition, BoundaryMode::Columns).unwrap();

        let pole = smooth.get(0, 0);
        assert!((0..BETA_COUNT).all(|c| smooth.get(0, c).to_bits() == pole.to_bits()));
        assert_eq!(pole.to_bits(), raw.get(0, 0).to_bits());

        for row in 1..EPSILON_COUNT {
            for col in 0..BETA_COUNT {
                if col == seam {
                    let expected = (raw.get(row, col - 1)
                        + raw.get(row, col)
                        + raw.get(row, col + 1))
                        / 3.0;
                    assert!((smooth.get(row, col) - expected).abs() < 1e-12);
                } else {
                    assert_eq!(smooth.get(row, col), raw.get(row, col));
                }
            }
        }
    }

    #[test]
    fn test_region_smoothing_keeps_region_interiors() {
        let partition = Partition::from_stops(&[0.0, 60.0, 180.0]).unwrap();
        let seam = AngleModel::beta_column(60.0).unwrap();
        let coeffs = vec![
            EllipsoidCoefficients::new(vec![0.0, 0.0, 0.0, 0.0, 0.0, 1.0]).unwrap(),
            EllipsoidCoefficients::new(vec![0.0, 0.0, 0.0, 0.0, 0.0, 4.0]).unwrap(),
        ];
        let raw = reconstruct(&coeffs, &partition, BoundaryMode::None).unwrap();
        let smooth = reconstruct(&coeffs, &partition, BoundaryMode::Regions).unwrap();

        // Spheres of radius 1 and 2: seam cells end up strictly between.
        let row = 5;
        assert!(smooth.get(row, seam - 1) > raw.get(row, seam - 1));
        assert!(smooth.get(row, seam) < raw.get(row, seam));
        assert_eq!(smooth.get(row, 2), raw.get(row, 2));
        assert_eq!(smooth.get(row, BETA_COUNT - 3), raw.get(row, BETA_COUNT - 3));
        // Outer ring untouched.
        assert_eq!(smooth.get(EPSILON_COUNT - 1, seam), raw.get(EPSILON_COUNT - 1, seam));
    }

    proptest::proptest! {
        #[test]
        fn reconstruction_is_never_negative(
            values in proptest::collection::vec(-2.0f64..2.0, 12),
            boundary in proptest::sample::select(vec![
                BoundaryMode::None,
                BoundaryMode::Columns,
                BoundaryMode::Regions,
            ]),
        ) {
            let partition = Partition::from_stops(&[0.0, 45.0, 180.0]).unwrap();
            let coeffs: Vec<_> = values
                .chunks(6)
                .map(|c| EllipsoidCoefficients::new(c.to_vec()).unwrap())
                .collect();
            if let Ok(grid) = reconstruct(&coeffs, &partition, boundary) {
                proptest::prop_assert!(grid.values().iter().all(|&v| v >= 0.0));
            }
        }
    }
}
