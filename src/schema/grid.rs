//! Grid types: measured r-tables, region partitions and column stops.
//!
//! All grids are stored row-major with `EPSILON_COUNT` rows and `BETA_COUNT`
//! columns, so cell `(row, col)` lives at `row * BETA_COUNT + col`.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::angles::{AngleModel, BETA_COUNT, BETA_DEGREES, CELL_COUNT, EPSILON_COUNT};
use super::config::ConfigError;

/// A 29x20 table of non-negative photometric magnitudes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Vec<f64>>", into = "Vec<Vec<f64>>")]
pub struct MeasurementGrid {
    values: Vec<f64>,
}

impl MeasurementGrid {
    /// Build from nested rows, validating shape and magnitudes.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self, ConfigError> {
        check_shape(rows.len(), rows.iter().map(Vec::len))?;
        Self::from_values(rows.into_iter().flatten().collect())
    }

    /// Build from a flat row-major vector, validating shape and magnitudes.
    pub fn from_values(values: Vec<f64>) -> Result<Self, ConfigError> {
        if values.len() != CELL_COUNT {
            return Err(ConfigError::DimensionMismatch {
                rows: EPSILON_COUNT,
                cols: BETA_COUNT,
                got_rows: values.len() / BETA_COUNT,
                got_cols: values.len() % BETA_COUNT,
            });
        }
        if let Some((idx, &value)) = values
            .iter()
            .enumerate()
            .find(|(_, v)| !v.is_finite() || **v < 0.0)
        {
            return Err(ConfigError::InvalidMagnitude {
                row: idx / BETA_COUNT,
                col: idx % BETA_COUNT,
                value,
            });
        }
        Ok(Self { values })
    }

    /// Build by evaluating `f(row, col)` for every cell, validating the
    /// magnitudes.
    pub fn try_from_fn(f: impl FnMut(usize, usize) -> f64) -> Result<Self, ConfigError> {
        Self::from_values(Self::from_fn(f).values)
    }

    /// Unvalidated counterpart of [`Self::try_from_fn`] for tables computed
    /// inside the crate.
    pub(crate) fn from_fn(mut f: impl FnMut(usize, usize) -> f64) -> Self {
        let mut values = Vec::with_capacity(CELL_COUNT);
        for row in 0..EPSILON_COUNT {
            for col in 0..BETA_COUNT {
                values.push(f(row, col));
            }
        }
        Self { values }
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.values[row * BETA_COUNT + col]
    }

    /// Flat row-major values.
    #[inline]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn mean(&self) -> f64 {
        self.values.iter().sum::<f64>() / CELL_COUNT as f64
    }

    /// Nested row representation.
    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        self.values.chunks(BETA_COUNT).map(<[f64]>::to_vec).collect()
    }
}

impl TryFrom<Vec<Vec<f64>>> for MeasurementGrid {
    type Error = ConfigError;

    fn try_from(rows: Vec<Vec<f64>>) -> Result<Self, Self::Error> {
        Self::from_rows(rows)
    }
}

impl From<MeasurementGrid> for Vec<Vec<f64>> {
    fn from(grid: MeasurementGrid) -> Self {
        grid.to_rows()
    }
}

/// Assignment of every grid cell to one of `regions` labels (1-based).
///
/// A valid partition uses every label in `1..=regions` at least once.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<Vec<u16>>", into = "Vec<Vec<u16>>")]
pub struct Partition {
    labels: Vec<u16>,
    regions: usize,
}

impl Partition {
    /// Build from flat row-major labels, enforcing the region invariant.
    pub fn from_labels(labels: Vec<u16>, regions: usize) -> Result<Self, ConfigError> {
        if regions == 0 || regions > CELL_COUNT {
            return Err(ConfigError::InvalidRegionCount {
                got: regions,
                max: CELL_COUNT,
            });
        }
        if labels.len() != CELL_COUNT {
            return Err(ConfigError::DimensionMismatch {
                rows: EPSILON_COUNT,
                cols: BETA_COUNT,
                got_rows: labels.len() / BETA_COUNT,
                got_cols: labels.len() % BETA_COUNT,
            });
        }
        if let Some((idx, &label)) = labels
            .iter()
            .enumerate()
            .find(|(_, l)| **l == 0 || **l as usize > regions)
        {
            return Err(ConfigError::LabelOutOfRange {
                row: idx / BETA_COUNT,
                col: idx % BETA_COUNT,
                label,
                regions,
            });
        }

        let partition = Self { labels, regions };
        let distinct = partition.distinct_labels();
        if distinct != regions {
            return Err(ConfigError::MissingRegions {
                got: distinct,
                expected: regions,
            });
        }
        Ok(partition)
    }

    /// Build from nested rows.
    pub fn from_rows(rows: Vec<Vec<u16>>, regions: usize) -> Result<Self, ConfigError> {
        check_shape(rows.len(), rows.iter().map(Vec::len))?;
        Self::from_labels(rows.into_iter().flatten().collect(), regions)
    }

    /// Column-only partition from azimuth stops in degrees.
    ///
    /// Stops must start at 0, end at 180, increase strictly and be sample
    /// angles. Every stop except the final 180 opens a new region.
    pub fn from_stops(stops: &[f64]) -> Result<Self, ConfigError> {
        BetaStops::from_degrees(stops)?.to_partition()
    }

    /// Wraps labels produced internally that are already known to be valid.
    pub(crate) fn from_labels_unchecked(labels: Vec<u16>, regions: usize) -> Self {
        debug_assert_eq!(labels.len(), CELL_COUNT);
        Self { labels, regions }
    }

    #[inline]
    pub fn label(&self, row: usize, col: usize) -> u16 {
        self.labels[row * BETA_COUNT + col]
    }

    /// Flat row-major labels.
    #[inline]
    pub fn labels(&self) -> &[u16] {
        &self.labels
    }

    /// Declared number of regions (K).
    #[inline]
    pub fn regions(&self) -> usize {
        self.regions
    }

    /// Population of every label, indexed by `label - 1`.
    pub fn region_counts(&self) -> Vec<usize> {
        region_counts(&self.labels, self.regions)
    }

    /// Number of distinct labels in `1..=regions` actually present.
    pub fn distinct_labels(&self) -> usize {
        self.region_counts().iter().filter(|&&c| c > 0).count()
    }

    /// `(row, col)` members of every region, indexed by `label - 1`.
    pub fn cells_by_region(&self) -> Vec<Vec<(usize, usize)>> {
        let mut cells = vec![Vec::new(); self.regions];
        for (idx, &label) in self.labels.iter().enumerate() {
            cells[label as usize - 1].push((idx / BETA_COUNT, idx % BETA_COUNT));
        }
        cells
    }

    pub fn to_rows(&self) -> Vec<Vec<u16>> {
        self.labels.chunks(BETA_COUNT).map(<[u16]>::to_vec).collect()
    }
}

impl TryFrom<Vec<Vec<u16>>> for Partition {
    type Error = ConfigError;

    /// Region count is taken from the largest label.
    fn try_from(rows: Vec<Vec<u16>>) -> Result<Self, Self::Error> {
        let regions = rows.iter().flatten().copied().max().unwrap_or(0) as usize;
        Self::from_rows(rows, regions)
    }
}

impl From<Partition> for Vec<Vec<u16>> {
    fn from(partition: Partition) -> Self {
        partition.to_rows()
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in self.labels.chunks(BETA_COUNT) {
            let line: Vec<String> = row.iter().map(|l| format!("{l:>3}")).collect();
            writeln!(f, "{}", line.join(""))?;
        }
        Ok(())
    }
}

/// Column-only partition: region `i` covers columns
/// `columns[i]..columns[i + 1]`, the last region runs to the final column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BetaStops {
    columns: Vec<usize>,
}

impl BetaStops {
    /// Build from opening columns; the first must be 0 and the sequence
    /// strictly increasing below `BETA_COUNT`.
    pub fn from_columns(columns: Vec<usize>) -> Result<Self, ConfigError> {
        if columns.first() != Some(&0) {
            return Err(ConfigError::InvalidStops(
                "first region must open at column 0".to_string(),
            ));
        }
        if let Some(w) = columns.windows(2).find(|w| w[0] >= w[1]) {
            return Err(ConfigError::InvalidStops(format!(
                "columns must increase strictly, found {} then {}",
                w[0], w[1]
            )));
        }
        if let Some(&last) = columns.last()
            && last >= BETA_COUNT
        {
            return Err(ConfigError::InvalidStops(format!(
                "column {last} is outside the table"
            )));
        }
        Ok(Self { columns })
    }

    /// Build from azimuth stops in degrees (`0, ..., 180`).
    pub fn from_degrees(stops: &[f64]) -> Result<Self, ConfigError> {
        match (stops.first(), stops.last()) {
            (Some(&first), Some(&last)) if first == 0.0 && last == 180.0 && stops.len() >= 2 => {}
            _ => {
                return Err(ConfigError::InvalidStops(format!(
                    "stops must start at 0 and end at 180, got {stops:?}"
                )));
            }
        }
        if let Some(w) = stops.windows(2).find(|w| w[0] >= w[1]) {
            return Err(ConfigError::InvalidStops(format!(
                "stops must increase strictly, found {} then {}",
                w[0], w[1]
            )));
        }

        let columns = stops[..stops.len() - 1]
            .iter()
            .map(|&deg| {
                AngleModel::beta_column(deg).ok_or_else(|| {
                    ConfigError::InvalidStops(format!(
                        "{deg} is not one of the sampled angles {BETA_DEGREES:?}"
                    ))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Self::from_columns(columns)
    }

    pub(crate) fn from_columns_unchecked(columns: Vec<usize>) -> Self {
        Self { columns }
    }

    /// Opening column of every region.
    #[inline]
    pub fn columns(&self) -> &[usize] {
        &self.columns
    }

    #[inline]
    pub fn regions(&self) -> usize {
        self.columns.len()
    }

    /// Stops in degrees, closed with 180.
    pub fn to_degrees(&self) -> Vec<f64> {
        self.columns
            .iter()
            .map(|&c| BETA_DEGREES[c])
            .chain(std::iter::once(BETA_DEGREES[BETA_COUNT - 1]))
            .collect()
    }

    /// Expand into a full label grid.
    pub fn to_partition(&self) -> Result<Partition, ConfigError> {
        Self::from_columns(self.columns.clone())?;
        Ok(self.expand())
    }

    /// Label grid for stops already known to be valid.
    pub(crate) fn expand(&self) -> Partition {
        let mut column_labels = [0u16; BETA_COUNT];
        let mut label = 0u16;
        for (col, slot) in column_labels.iter_mut().enumerate() {
            if self.columns.contains(&col) {
                label += 1;
            }
            *slot = label;
        }

        let labels = (0..EPSILON_COUNT)
            .flat_map(|_| column_labels.iter().copied())
            .collect();
        Partition::from_labels_unchecked(labels, self.regions())
    }
}

/// Cell count per label, indexed by `label - 1`; label 0 is ignored.
pub(crate) fn region_counts(labels: &[u16], regions: usize) -> Vec<usize> {
    let mut counts = vec![0usize; regions];
    for &label in labels {
        if label > 0 && (label as usize) <= regions {
            counts[label as usize - 1] += 1;
        }
    }
    counts
}

fn check_shape(rows: usize, mut widths: impl Iterator<Item = usize>) -> Result<(), ConfigError> {
    if rows != EPSILON_COUNT {
        return Err(ConfigError::DimensionMismatch {
            rows: EPSILON_COUNT,
            cols: BETA_COUNT,
            got_rows: rows,
            got_cols: BETA_COUNT,
        });
    }
    if let Some(width) = widths.find(|&w| w != BETA_COUNT) {
        return Err(ConfigError::DimensionMismatch {
            rows: EPSILON_COUNT,
            cols: BETA_COUNT,
            got_rows: rows,
            got_cols: width,
        });
    }
    Ok(())
}
