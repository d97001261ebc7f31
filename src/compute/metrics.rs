//! Error metrics and photometric descriptors of r-tables.

use std::collections::HashMap;
use std::f64::consts::PI;

use crate::schema::{AngleModel, BETA_COUNT, BETA_DEGREES, EPSILON_COUNT, MeasurementGrid};

/// Root-mean-square per-cell difference.
pub fn rmse(original: &MeasurementGrid, adjusted: &MeasurementGrid) -> f64 {
    let sum_sq: f64 = original
        .values()
        .iter()
        .zip(adjusted.values())
        .map(|(a, b)| (a - b).powi(2))
        .sum();
    (sum_sq / original.values().len() as f64).sqrt()
}

/// Scale-invariant reconstruction error: `2 * rmse / (mean_a + mean_b)`.
///
/// Two all-zero tables have zero error.
pub fn normalized_error(original: &MeasurementGrid, adjusted: &MeasurementGrid) -> f64 {
    let err = rmse(original, adjusted);
    let denom = original.mean() + adjusted.mean();
    if err == 0.0 { 0.0 } else { 2.0 * err / denom }
}

/// Specular factor S1: r at tan(eps) = 2 over r at the pole, along beta = 0.
pub fn s1(table: &MeasurementGrid) -> Option<f64> {
    let pole = table.get(0, 0);
    (pole != 0.0).then(|| table.get(8, 0) / pole)
}

/// Average luminance coefficient Q0 by trapezoidal integration over the
/// sampled angles.
pub fn q0_trapezes(table: &MeasurementGrid) -> Option<f64> {
    let angles = AngleModel::get();

    let mut numer = [0.0f64; EPSILON_COUNT];
    let mut denom = [0.0f64; EPSILON_COUNT];
    for (row, eps) in angles.epsilon.iter().enumerate() {
        let (sin_e, cos_e) = eps.sin_cos();
        let scale = 1.0 / (cos_e.powi(3) * 1e4);
        for col in 0..BETA_COUNT - 1 {
            let step = BETA_DEGREES[col + 1] - BETA_DEGREES[col];
            let (left, right) = (table.get(row, col), table.get(row, col + 1));

            numer[row] += sin_e * (left + right) * scale / 2.0 * step;
            let support = (left != 0.0) as u8 as f64 + (right != 0.0) as u8 as f64;
            denom[row] += sin_e * support / 2.0 * step;
        }
    }

    let integrate = |values: &[f64; EPSILON_COUNT]| -> f64 {
        values
            .windows(2)
            .zip(angles.epsilon.windows(2))
            .map(|(v, e)| (v[0] + v[1]) / 2.0 * (e[1] - e[0]))
            .sum()
    };

    let d = integrate(&denom);
    (d != 0.0).then(|| integrate(&numer) / d)
}

/// Combined Q0/S1 deviation `sqrt((π² ΔQ0² + ΔS1²) / 2)`.
pub fn delta_q0_s1(original: &MeasurementGrid, adjusted: &MeasurementGrid) -> Option<f64> {
    let dq = q0_trapezes(original)? - q0_trapezes(adjusted)?;
    let ds = s1(original)? - s1(adjusted)?;
    Some(((PI * PI * dq * dq + ds * ds) / 2.0).sqrt())
}

/// Shannon entropy (bits) of the table's value histogram.
pub fn entropy(table: &MeasurementGrid) -> f64 {
    let mut counts: HashMap<u64, usize> = HashMap::new();
    for v in table.values() {
        *counts.entry(v.to_bits()).or_default() += 1;
    }
    let n = table.values().len() as f64;
    counts
        .values()
        .map(|&c| {
            let p = c as f64 / n;
            -p * p.log2()
        })
        .sum()
}

/// Mean absolute row-to-row variation, normalized by the table's total.
pub fn smoothness(table: &MeasurementGrid) -> Option<f64> {
    let total: f64 = table.values().iter().sum();
    if total == 0.0 {
        return None;
    }
    let variation: f64 = table
        .values()
        .chunks(BETA_COUNT)
        .collect::<Vec<_>>()
        .windows(2)
        .map(|rows| {
            rows[0]
                .iter()
                .zip(rows[1])
                .map(|(a, b)| (b - a).abs())
                .sum::<f64>()
        })
        .sum();
    Some(variation / total / (EPSILON_COUNT - 1) as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_error_is_scale_invariant() {
        let a = MeasurementGrid::from_fn(|r, c| 1.0 + (r + c) as f64);
        let b = MeasurementGrid::from_fn(|r, c| 1.5 + (r + c) as f64);
        let a10 = MeasurementGrid::from_fn(|r, c| 10.0 * (1.0 + (r + c) as f64));
        let b10 = MeasurementGrid::from_fn(|r, c| 10.0 * (1.5 + (r + c) as f64));

        let e1 = normalized_error(&a, &b);
        let e10 = normalized_error(&a10, &b10);
        assert!(e1 > 0.0);
        assert!((e1 - e10).abs() < 1e-12);
        assert!((rmse(&a, &b) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_normalized_error_identical_tables() {
        let zero = MeasurementGrid::from_fn(|_, _| 0.0);
        assert_eq!(normalized_error(&zero, &zero), 0.0);
        let one = MeasurementGrid::from_fn(|_, _| 1.0);
        assert_eq!(normalized_error(&one, &one), 0.0);
    }

    #[test]
    fn test_s1() {
        let table = MeasurementGrid::from_fn(|r, _| if r == 8 { 5.0 } else { 10.0 });
        assert_eq!(s1(&table), Some(0.5));
        let zero = MeasurementGrid::from_fn(|_, _| 0.0);
        assert_eq!(s1(&zero), None);
    }

    #[test]
    fn test_q0_scales_linearly() {
        let t1 = MeasurementGrid::from_fn(|r, c| 100.0 + (r * c) as f64);
        let t2 = MeasurementGrid::from_fn(|r, c| 2.0 * (100.0 + (r * c) as f64));
        let q1 = q0_trapezes(&t1).unwrap();
        let q2 = q0_trapezes(&t2).unwrap();
        assert!(q1 > 0.0);
        assert!((q2 - 2.0 * q1).abs() < 1e-9 * q2);
        assert_eq!(q0_trapezes(&MeasurementGrid::from_fn(|_, _| 0.0)), None);
    }

    #[test]
    fn test_delta_q0_s1_zero_for_identical() {
        let t = MeasurementGrid::from_fn(|r, c| 50.0 + (r + 2 * c) as f64);
        assert_eq!(delta_q0_s1(&t, &t), Some(0.0));
    }

    #[test]
    fn test_entropy() {
        let uniform = MeasurementGrid::from_fn(|_, _| 3.0);
        assert_eq!(entropy(&uniform), 0.0);
        let halves = MeasurementGrid::from_fn(|_, c| if c < BETA_COUNT / 2 { 1.0 } else { 2.0 });
        assert!((entropy(&halves) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_smoothness() {
        let flat = MeasurementGrid::from_fn(|_, _| 2.0);
        assert_eq!(smoothness(&flat), Some(0.0));
        let ramp = MeasurementGrid::from_fn(|r, _| r as f64);
        assert!(smoothness(&ramp).unwrap() > 0.0);
    }
}
