//! Corpus-averaged fitness of partitions, with memoization.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use log::{debug, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::compute::fit::{EllipsoidCoefficients, fit_ellipsoids};
use crate::compute::metrics::{delta_q0_s1, entropy, normalized_error, smoothness};
use crate::compute::reconstruct::reconstruct;
use crate::error::Result;
use crate::schema::{BoundaryMode, ConfigError, FitConfig, MeasurementGrid, Partition};

/// Scores of partitions already evaluated during one run.
///
/// Entries are never overwritten or removed.
#[derive(Debug, Default)]
pub struct FitnessCache {
    scores: HashMap<Partition, f64>,
    hits: u64,
    misses: u64,
}

impl FitnessCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached score, if any.
    pub fn get(&self, partition: &Partition) -> Option<f64> {
        self.scores.get(partition).copied()
    }

    /// Record a score unless the partition is already known.
    pub fn insert(&mut self, partition: Partition, score: f64) {
        self.scores.entry(partition).or_insert(score);
    }

    /// Disjoint union with freshly computed scores.
    pub fn merge(&mut self, scored: impl IntoIterator<Item = (Partition, f64)>) {
        for (partition, score) in scored {
            self.insert(partition, score);
        }
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Lookups answered without fitting.
    pub fn hits(&self) -> u64 {
        self.hits
    }

    /// Partitions that had to be fitted.
    pub fn misses(&self) -> u64 {
        self.misses
    }
}

/// Fit quality of one corpus table under a partition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableReport {
    /// Corpus index.
    pub table: usize,
    /// Fitted coefficients, one entry per region.
    pub coefficients: Vec<EllipsoidCoefficients>,
    /// Reconstructed table.
    pub reconstructed: MeasurementGrid,
    /// Normalized error against the measured table.
    pub error: f64,
    /// Combined Q0/S1 deviation, when both tables define them.
    pub delta_q0_s1: Option<f64>,
    /// Row-to-row variation of the reconstruction.
    pub smoothness: Option<f64>,
    /// Value entropy of the reconstruction, in bits.
    pub entropy: f64,
}

/// Where a batch member's score comes from.
enum Slot {
    Cached(f64),
    Pending(usize),
}

/// Scores partitions against a corpus of measured tables.
pub struct FitnessEvaluator {
    corpus: Vec<MeasurementGrid>,
    free_constant: bool,
}

impl FitnessEvaluator {
    /// Create a new fitness evaluator.
    pub fn new(corpus: Vec<MeasurementGrid>, free_constant: bool) -> Result<Self, ConfigError> {
        if corpus.is_empty() {
            return Err(ConfigError::EmptyCorpus);
        }
        Ok(Self {
            corpus,
            free_constant,
        })
    }

    pub fn corpus(&self) -> &[MeasurementGrid] {
        &self.corpus
    }

    /// Mean normalized error over the corpus, bypassing the cache.
    ///
    /// Fitness always reconstructs with region smoothing.
    pub fn evaluate(&self, partition: &Partition) -> Result<f64> {
        let mut total = 0.0;
        for (index, table) in self.corpus.iter().enumerate() {
            let adjusted = fit_ellipsoids(table, partition, self.free_constant)
                .and_then(|coeffs| reconstruct(&coeffs, partition, BoundaryMode::Regions))
                .map_err(|err| err.in_table(index))
                .inspect_err(|err| warn!("Evaluation aborted: {err}\n{partition}"))?;
            total += normalized_error(table, &adjusted);
        }
        Ok(total / self.corpus.len() as f64)
    }

    /// Cached score of a single partition.
    pub fn score(&self, cache: &mut FitnessCache, partition: &Partition) -> Result<f64> {
        if let Some(score) = cache.get(partition) {
            cache.hits += 1;
            return Ok(score);
        }
        let score = self.evaluate(partition)?;
        cache.misses += 1;
        cache.insert(partition.clone(), score);
        Ok(score)
    }

    /// Score a whole population.
    ///
    /// Uncached partitions are evaluated in parallel and merged into the
    /// cache afterwards; scores come back in input order.
    pub fn score_batch(
        &self,
        cache: &mut FitnessCache,
        partitions: &[Partition],
    ) -> Result<Vec<f64>> {
        let mut pending: Vec<&Partition> = Vec::new();
        let mut pending_index: HashMap<&Partition, usize> = HashMap::new();
        let slots: Vec<Slot> = partitions
            .iter()
            .map(|p| match cache.get(p) {
                Some(score) => Slot::Cached(score),
                None => Slot::Pending(*pending_index.entry(p).or_insert_with(|| {
                    pending.push(p);
                    pending.len() - 1
                })),
            })
            .collect();

        let fresh = pending
            .par_iter()
            .map(|p| self.evaluate(p))
            .collect::<Result<Vec<f64>>>()?;

        cache.misses += fresh.len() as u64;
        cache.hits += (partitions.len() - fresh.len()) as u64;
        cache.merge(pending.iter().map(|p| (*p).clone()).zip(fresh.iter().copied()));
        debug!(
            "Scored {} new partitions, {} cached, cache holds {}",
            fresh.len(),
            partitions.len() - fresh.len(),
            cache.len()
        );

        Ok(slots
            .into_iter()
            .map(|slot| match slot {
                Slot::Cached(score) => score,
                Slot::Pending(i) => fresh[i],
            })
            .collect())
    }

    /// Per-table breakdown of a partition, reconstructed with the
    /// configured boundary mode.
    pub fn report(&self, partition: &Partition, fit: &FitConfig) -> Result<Vec<TableReport>> {
        self.corpus
            .iter()
            .enumerate()
            .map(|(index, table)| -> Result<TableReport> {
                let coefficients = fit_ellipsoids(table, partition, fit.free_constant)
                    .map_err(|err| err.in_table(index))?;
                let reconstructed = reconstruct(&coefficients, partition, fit.boundary)
                    .map_err(|err| err.in_table(index))?;
                Ok(TableReport {
                    table: index,
                    error: normalized_error(table, &reconstructed),
                    delta_q0_s1: delta_q0_s1(table, &reconstructed),
                    smoothness: smoothness(&reconstructed),
                    entropy: entropy(&reconstructed),
                    coefficients,
                    reconstructed,
                })
            })
            .collect()
    }
}

/// Load a corpus stored as a JSON array of 29x20 row arrays.
pub fn load_corpus(path: impl AsRef<Path>) -> Result<Vec<MeasurementGrid>> {
    let text = fs::read_to_string(path)?;
    let corpus: Vec<MeasurementGrid> = serde_json::from_str(&text)?;
    if corpus.is_empty() {
        return Err(ConfigError::EmptyCorpus.into());
    }
    Ok(corpus)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::evolution::genome::PartitionRng;
    use crate::error::EngineError;
    use crate::schema::{AngleModel, BETA_COUNT, CELL_COUNT, EPSILON_COUNT};

    /// Tables sampled from smooth anisotropic surfaces.
    fn corpus() -> Vec<MeasurementGrid> {
        let angles = AngleModel::get();
        [1.0, 1.3]
            .iter()
            .map(|&stretch| {
                MeasurementGrid::from_fn(|row, col| {
                    let [dx, dy, dz] = angles.direction(row, col);
                    stretch * (dx * dx + 0.5 * dy * dy + 2.0 * dz * dz).sqrt()
                })
            })
            .collect()
    }

    #[test]
    fn test_empty_corpus_rejected() {
        assert!(matches!(
            FitnessEvaluator::new(Vec::new(), true),
            Err(ConfigError::EmptyCorpus)
        ));
    }

    #[test]
    fn test_score_is_deterministic_and_cached() {
        let evaluator = FitnessEvaluator::new(corpus(), true).unwrap();
        let partition = PartitionRng::new(9).generate(3).unwrap();
        let mut cache = FitnessCache::new();

        let first = evaluator.score(&mut cache, &partition).unwrap();
        let second = evaluator.score(&mut cache, &partition).unwrap();
        assert_eq!(first.to_bits(), second.to_bits());
        assert_eq!(cache.misses(), 1);
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.len(), 1);

        let uncached = evaluator.evaluate(&partition).unwrap();
        assert_eq!(uncached.to_bits(), first.to_bits());
    }

    #[test]
    fn test_score_batch_matches_sequential() {
        let evaluator = FitnessEvaluator::new(corpus(), false).unwrap();
        let mut rng = PartitionRng::new(21);
        let mut population: Vec<Partition> = (0..6).map(|_| rng.generate(4).unwrap()).collect();
        population.push(population[0].clone());

        let mut cache = FitnessCache::new();
        let scores = evaluator.score_batch(&mut cache, &population).unwrap();
        assert_eq!(scores.len(), population.len());
        assert_eq!(scores[0].to_bits(), scores[6].to_bits());
        assert!(cache.len() <= 6);

        for (p, s) in population.iter().zip(&scores) {
            assert_eq!(evaluator.evaluate(p).unwrap().to_bits(), s.to_bits());
            assert!(s.is_finite() && *s >= 0.0);
        }

        let before = cache.misses();
        evaluator.score_batch(&mut cache, &population).unwrap();
        assert_eq!(cache.misses(), before);
    }

    #[test]
    fn test_numeric_failure_propagates_uncached() {
        let mut tables = corpus();
        let rows = vec![vec![1e160; BETA_COUNT]; EPSILON_COUNT];
        tables.push(MeasurementGrid::from_rows(rows).unwrap());
        let evaluator = FitnessEvaluator::new(tables, true).unwrap();
        let partition = Partition::from_stops(&[0.0, 60.0, 180.0]).unwrap();
        let mut cache = FitnessCache::new();

        let batch = evaluator.score_batch(&mut cache, std::slice::from_ref(&partition));
        assert!(matches!(
            batch,
            Err(EngineError::NumericFailure { table: 2, .. })
        ));
        assert_eq!(cache.len(), 0);

        assert!(matches!(
            evaluator.score(&mut cache, &partition),
            Err(EngineError::NumericFailure { table: 2, .. })
        ));
        assert!(cache.is_empty());
        assert_eq!(cache.get(&partition), None);
    }

    #[test]
    fn test_cache_is_append_only() {
        let partition = Partition::from_labels(vec![1; CELL_COUNT], 1).unwrap();
        let mut cache = FitnessCache::new();
        cache.insert(partition.clone(), 0.25);
        cache.insert(partition.clone(), 0.75);
        assert_eq!(cache.get(&partition), Some(0.25));
    }

    #[test]
    fn test_report_per_table() {
        let evaluator = FitnessEvaluator::new(corpus(), true).unwrap();
        let partition = Partition::from_stops(&[0.0, 60.0, 180.0]).unwrap();
        let fit = FitConfig {
            boundary: BoundaryMode::Columns,
            ..Default::default()
        };
        let report = evaluator.report(&partition, &fit).unwrap();
        assert_eq!(report.len(), 2);
        for (index, table) in report.iter().enumerate() {
            assert_eq!(table.table, index);
            assert_eq!(table.coefficients.len(), 2);
            assert!(table.error.is_finite());
        }
    }

    #[test]
    fn test_load_corpus() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corpus.json");
        fs::write(&path, serde_json::to_string(&corpus()).unwrap()).unwrap();

        let loaded = load_corpus(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        for (a, b) in loaded.iter().zip(corpus()) {
            for (x, y) in a.values().iter().zip(b.values()) {
                assert!((x - y).abs() < 1e-12);
            }
        }

        fs::write(&path, "[]").unwrap();
        assert!(matches!(
            load_corpus(&path),
            Err(EngineError::InvalidRequest(ConfigError::EmptyCorpus))
        ));

        fs::write(&path, "[[[1.0, 2.0]]]").unwrap();
        assert!(matches!(load_corpus(&path), Err(EngineError::Json(_))));
    }
}
