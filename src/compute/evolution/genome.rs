//! Partition generation and mutation for the evolutionary search.
//!
//! Free partitions are grown by flood fill from random seeds and mutated by
//! single-layer region expansion. Column-only partitions are described by
//! their stop columns and mutated by shifting stops.

use log::debug;
use rand::prelude::*;
use rand::seq::index;

use crate::schema::{
    BETA_COUNT, BetaStops, CELL_COUNT, ConfigError, EPSILON_COUNT, Partition, region_counts,
};

/// Regions smaller than this are expanded first.
pub const STARVATION_THRESHOLD: usize = 30;

/// Smoothing attempts before falling back to an unsmoothed flood fill.
const SMOOTH_ATTEMPTS: usize = 16;

/// Cardinal direction of a region expansion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Towards lower Beta columns.
    Left,
    /// Towards higher Beta columns.
    Right,
    /// Towards the pole row.
    Up,
    /// Towards higher Epsilon rows.
    Down,
}

impl Direction {
    const ALL: [Direction; 4] = [Self::Left, Self::Right, Self::Up, Self::Down];

    /// Neighbor of `(row, col)` in this direction, if inside the grid.
    #[inline]
    fn step(self, row: usize, col: usize) -> Option<(usize, usize)> {
        match self {
            Self::Left => col.checked_sub(1).map(|c| (row, c)),
            Self::Right => (col + 1 < BETA_COUNT).then_some((row, col + 1)),
            Self::Up => row.checked_sub(1).map(|r| (r, col)),
            Self::Down => (row + 1 < EPSILON_COUNT).then_some((row + 1, col)),
        }
    }
}

/// Random number generator wrapper for partition operations.
pub struct PartitionRng {
    rng: StdRng,
}

impl PartitionRng {
    /// Create from seed.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Create with random seed.
    pub fn random() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Generate a random partition with exactly `regions` labels.
    pub fn generate(&mut self, regions: usize) -> Result<Partition, ConfigError> {
        if regions == 0 || regions > CELL_COUNT {
            return Err(ConfigError::InvalidRegionCount {
                got: regions,
                max: CELL_COUNT,
            });
        }
        Ok(self.generate_unchecked(regions))
    }

    fn generate_unchecked(&mut self, regions: usize) -> Partition {
        for _ in 0..SMOOTH_ATTEMPTS {
            let labels = smooth(&self.flood_fill(regions));
            if distinct(&labels, regions) == regions {
                return Partition::from_labels_unchecked(labels, regions);
            }
        }
        // Dense region counts rarely survive smoothing.
        debug!("Smoothing kept dropping regions for K={regions}, using raw flood fill");
        Partition::from_labels_unchecked(self.flood_fill(regions), regions)
    }

    /// Grow `regions` distinct seeds until every cell is labeled.
    fn flood_fill(&mut self, regions: usize) -> Vec<u16> {
        let mut labels = vec![0u16; CELL_COUNT];
        for (i, cell) in index::sample(&mut self.rng, CELL_COUNT, regions)
            .into_iter()
            .enumerate()
        {
            labels[cell] = (i + 1) as u16;
        }

        let mut order: Vec<usize> = (0..CELL_COUNT).collect();
        while labels.contains(&0) {
            order.shuffle(&mut self.rng);
            let mut next = labels.clone();
            for &idx in &order {
                let label = labels[idx];
                if label == 0 {
                    continue;
                }
                let (row, col) = (idx / BETA_COUNT, idx % BETA_COUNT);
                for dir in Direction::ALL {
                    if let Some((r, c)) = dir.step(row, col)
                        && next[r * BETA_COUNT + c] == 0
                    {
                        next[r * BETA_COUNT + c] = label;
                    }
                }
            }
            labels = next;
        }
        labels
    }

    /// Apply `intensity` single-layer expansions, regenerating the partition
    /// if a region vanished.
    pub fn mutate(&mut self, partition: &Partition, intensity: usize) -> Partition {
        let regions = partition.regions();
        let mut labels = partition.labels().to_vec();

        for _ in 0..intensity {
            let counts = region_counts(&labels, regions);
            let (smallest, &min_count) = counts
                .iter()
                .enumerate()
                .min_by_key(|&(_, c)| c)
                .unwrap_or((0, &0));

            let region = if min_count < STARVATION_THRESHOLD {
                smallest as u16 + 1
            } else {
                self.rng.gen_range(1..=regions) as u16
            };
            let direction = Direction::ALL[self.rng.gen_range(0..4)];
            expand(&mut labels, region, direction);
        }

        if distinct(&labels, regions) < regions {
            debug!("Mutation lost a region, regenerating K={regions}");
            return self.generate_unchecked(regions);
        }
        Partition::from_labels_unchecked(labels, regions)
    }

    /// Random column-only partition with `regions` stops.
    pub fn random_stops(&mut self, regions: usize) -> Result<BetaStops, ConfigError> {
        if regions == 0 || regions > BETA_COUNT {
            return Err(ConfigError::InvalidRegionCount {
                got: regions,
                max: BETA_COUNT,
            });
        }
        Ok(self.random_stops_unchecked(regions))
    }

    fn random_stops_unchecked(&mut self, regions: usize) -> BetaStops {
        let mut columns: Vec<usize> = index::sample(&mut self.rng, BETA_COUNT - 1, regions - 1)
            .into_iter()
            .map(|c| c + 1)
            .collect();
        columns.push(0);
        columns.sort_unstable();
        BetaStops::from_columns_unchecked(columns)
    }

    /// Shift interior stops by one column, `intensity` times.
    ///
    /// The first stop stays pinned to column 0. Colliding stops are
    /// replaced by a fresh random set.
    pub fn mutate_stops(&mut self, stops: &BetaStops, intensity: usize) -> BetaStops {
        let regions = stops.regions();
        let mut columns = stops.columns().to_vec();
        if regions > 1 {
            for _ in 0..intensity {
                let i = self.rng.gen_range(1..regions);
                let shifted = if self.rng.gen_bool(0.5) {
                    columns[i] + 1
                } else {
                    columns[i] - 1
                };
                columns[i] = shifted.clamp(1, BETA_COUNT - 1);
            }
        }

        columns[0] = 0;
        columns.sort_unstable();
        if columns.windows(2).any(|w| w[0] == w[1]) {
            debug!("Stops collided, regenerating K={regions}");
            return self.random_stops_unchecked(regions);
        }
        BetaStops::from_columns_unchecked(columns)
    }
}

/// A searchable partition representation.
pub trait PartitionGenome: Clone + PartialEq + Send + Sync + std::fmt::Debug {
    /// Random individual with `regions` labels; `regions` is pre-validated.
    fn random(rng: &mut PartitionRng, regions: usize) -> Self;
    /// Mutated copy of this individual.
    fn mutate(&self, rng: &mut PartitionRng, intensity: usize) -> Self;
    /// Full label grid scored by the evaluator.
    fn partition(&self) -> Partition;
}

impl PartitionGenome for Partition {
    fn random(rng: &mut PartitionRng, regions: usize) -> Self {
        rng.generate_unchecked(regions)
    }

    fn mutate(&self, rng: &mut PartitionRng, intensity: usize) -> Self {
        rng.mutate(self, intensity)
    }

    fn partition(&self) -> Partition {
        self.clone()
    }
}

impl PartitionGenome for BetaStops {
    fn random(rng: &mut PartitionRng, regions: usize) -> Self {
        rng.random_stops_unchecked(regions)
    }

    fn mutate(&self, rng: &mut PartitionRng, intensity: usize) -> Self {
        rng.mutate_stops(self, intensity)
    }

    fn partition(&self) -> Partition {
        self.expand()
    }
}

/// Grow `region` by one layer in `direction`.
///
/// Every cell whose neighbor against `direction` belongs to the region
/// adopts its label. Reads from a snapshot so the growth is a single layer.
pub fn expand(labels: &mut [u16], region: u16, direction: Direction) {
    let snapshot = labels.to_vec();
    for (idx, &label) in snapshot.iter().enumerate() {
        if label != region {
            continue;
        }
        if let Some((r, c)) = direction.step(idx / BETA_COUNT, idx % BETA_COUNT) {
            labels[r * BETA_COUNT + c] = region;
        }
    }
}

/// Majority filter over the 3x3 neighborhood of every interior cell.
/// Ties go to the lowest label.
fn smooth(labels: &[u16]) -> Vec<u16> {
    let mut out = labels.to_vec();
    let mut window = [0u16; 9];
    for row in 1..EPSILON_COUNT - 1 {
        for col in 1..BETA_COUNT - 1 {
            let mut n = 0;
            for r in row - 1..=row + 1 {
                for c in col - 1..=col + 1 {
                    window[n] = labels[r * BETA_COUNT + c];
                    n += 1;
                }
            }
            window.sort_unstable();

            let (mut best, mut best_run) = (window[0], 0);
            let mut i = 0;
            while i < window.len() {
                let run = window[i..].iter().take_while(|&&l| l == window[i]).count();
                if run > best_run {
                    best = window[i];
                    best_run = run;
                }
                i += run;
            }
            out[row * BETA_COUNT + col] = best;
        }
    }
    out
}

fn distinct(labels: &[u16], regions: usize) -> usize {
    region_counts(labels, regions)
        .iter()
        .filter(|&&c| c > 0)
        .count()
}

/// Fraction of cells labeled differently in the two partitions.
pub fn partition_distance(a: &Partition, b: &Partition) -> f64 {
    let differing = a
        .labels()
        .iter()
        .zip(b.labels())
        .filter(|(x, y)| x != y)
        .count();
    differing as f64 / CELL_COUNT as f64
}
