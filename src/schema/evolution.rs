//! Evolution configuration types for the partition search.
//!
//! This module provides types for configuring the genetic search over
//! partitions and for reporting its progress and outcome.

use serde::{Deserialize, Serialize};

use super::angles::{BETA_COUNT, CELL_COUNT};
use super::config::{ConfigError, FitConfig};
use super::grid::Partition;

/// Generation cap applied when none is configured.
pub const HARD_GENERATION_CAP: usize = 10_000;

/// Top-level configuration for a partition search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvolutionConfig {
    /// Number of regions (K) every partition must contain.
    #[serde(default = "default_regions")]
    pub regions: usize,
    /// Shape of the partitions being searched.
    #[serde(default)]
    pub layout: PartitionLayout,
    /// Fitting parameters.
    #[serde(default)]
    pub fit: FitConfig,
    /// Population and termination settings.
    #[serde(default)]
    pub population: PopulationConfig,
    /// Mutation intensity schedule.
    #[serde(default)]
    pub mutation: MutationSchedule,
    /// Random seed for reproducibility.
    #[serde(default)]
    pub random_seed: Option<u64>,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            regions: default_regions(),
            layout: PartitionLayout::default(),
            fit: FitConfig::default(),
            population: PopulationConfig::default(),
            mutation: MutationSchedule::default(),
            random_seed: None,
        }
    }
}

fn default_regions() -> usize {
    3
}

/// Which family of partitions the search explores.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PartitionLayout {
    /// Free 2-D region maps grown by flood fill.
    #[default]
    FreeRegions,
    /// Column-only partitions described by azimuth stops.
    BetaStops,
}

/// Population and generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PopulationConfig {
    /// Number of individuals in the population (N).
    #[serde(default = "default_population_size")]
    pub size: usize,
    /// Stop once the champion has been unchanged for this many generations.
    #[serde(default = "default_stagnation_threshold")]
    pub stagnation_threshold: usize,
    /// Hard cap on the number of generations.
    #[serde(default = "default_max_generations")]
    pub max_generations: usize,
}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self {
            size: default_population_size(),
            stagnation_threshold: default_stagnation_threshold(),
            max_generations: default_max_generations(),
        }
    }
}

fn default_population_size() -> usize {
    30
}
fn default_stagnation_threshold() -> usize {
    5
}
fn default_max_generations() -> usize {
    HARD_GENERATION_CAP
}

/// Number of expansion steps per mutation, lowered as the champion's
/// reign grows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutationSchedule {
    /// Intensity while the reign is short.
    #[serde(default = "default_explore")]
    pub explore: usize,
    /// Intensity once the reign exceeds 10% of the stagnation threshold.
    #[serde(default = "default_settle")]
    pub settle: usize,
    /// Intensity once the reign exceeds half the stagnation threshold.
    #[serde(default = "default_refine")]
    pub refine: usize,
}

impl Default for MutationSchedule {
    fn default() -> Self {
        Self {
            explore: default_explore(),
            settle: default_settle(),
            refine: default_refine(),
        }
    }
}

fn default_explore() -> usize {
    15
}
fn default_settle() -> usize {
    5
}
fn default_refine() -> usize {
    2
}

impl MutationSchedule {
    /// Intensity for the given reign against the stagnation threshold.
    pub fn intensity(&self, reign: usize, stagnation_threshold: usize) -> usize {
        if reign > stagnation_threshold / 2 {
            self.refine
        } else if reign > stagnation_threshold / 10 {
            self.settle
        } else {
            self.explore
        }
    }
}

impl EvolutionConfig {
    /// Validate evolution configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let max_regions = match self.layout {
            PartitionLayout::FreeRegions => CELL_COUNT,
            PartitionLayout::BetaStops => BETA_COUNT,
        };
        if self.regions == 0 || self.regions > max_regions {
            return Err(ConfigError::InvalidRegionCount {
                got: self.regions,
                max: max_regions,
            });
        }

        if self.population.size == 0 {
            return Err(ConfigError::PopulationTooSmall);
        }
        if self.population.stagnation_threshold == 0 {
            return Err(ConfigError::InvalidStagnationThreshold);
        }
        if self.population.max_generations == 0 {
            return Err(ConfigError::InvalidGenerationCap);
        }

        let m = &self.mutation;
        if m.explore == 0 || m.settle == 0 || m.refine == 0 {
            return Err(ConfigError::InvalidMutationIntensity);
        }

        Ok(())
    }
}

// ============================================================================
// Progress and Result Types
// ============================================================================

/// Current phase of the search.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum EvolutionPhase {
    /// Building the initial population.
    #[default]
    Initializing,
    /// Scoring individuals against the corpus.
    Evaluating,
    /// Ranking and keeping the best half.
    Selecting,
    /// Mutating survivors into offspring.
    Reproducing,
    /// Search finished.
    Terminated,
}

/// Progress update emitted once per generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvolutionProgress {
    /// Generations completed so far.
    pub generation: usize,
    /// Consecutive generations the champion has been unchanged.
    pub reign: usize,
    /// Score of the current champion (lower is better).
    pub best_score: f64,
    /// Mean score of the ranked population.
    pub avg_score: f64,
    /// Distinct partitions scored so far.
    pub cache_size: usize,
    /// Current phase.
    pub phase: EvolutionPhase,
}

/// Per-generation statistics.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EvolutionHistory {
    /// Champion score per generation.
    pub best_score: Vec<f64>,
    /// Average score per generation.
    pub avg_score: Vec<f64>,
    /// Champion reign per generation.
    pub reign: Vec<usize>,
    /// Mean pairwise cell disagreement of the population per generation.
    pub diversity: Vec<f64>,
}

/// Reason the search stopped.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum StopReason {
    /// Champion unchanged for the stagnation threshold.
    Stagnation,
    /// Generation cap reached.
    MaxGenerations,
}

/// Statistics from a search run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchStats {
    /// Generations run.
    pub generations: usize,
    /// Partitions actually fitted (cache misses).
    pub evaluations: u64,
    /// Score lookups answered by the cache.
    pub cache_hits: u64,
    /// Time taken (in seconds).
    pub elapsed_seconds: f64,
    /// Reason for stopping.
    pub stop_reason: StopReason,
}

/// Final result of a search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// Best partition found.
    pub best: Partition,
    /// Its corpus-averaged normalized error.
    pub best_score: f64,
    /// Run statistics.
    pub stats: SearchStats,
    /// Per-generation history.
    pub history: EvolutionHistory,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        let config = EvolutionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.population.max_generations, HARD_GENERATION_CAP);
    }

    #[test]
    fn test_invalid_configs() {
        let mut config = EvolutionConfig {
            regions: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidRegionCount { got: 0, .. })
        ));

        config.regions = 21;
        config.layout = PartitionLayout::BetaStops;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidRegionCount { max: 20, .. })
        ));

        config.regions = 3;
        config.population.size = 0;
        assert_eq!(config.validate(), Err(ConfigError::PopulationTooSmall));

        config.population.size = 4;
        config.population.stagnation_threshold = 0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidStagnationThreshold)
        );
    }

    #[test]
    fn test_mutation_schedule() {
        let schedule = MutationSchedule::default();
        assert_eq!(schedule.intensity(0, 100), 15);
        assert_eq!(schedule.intensity(10, 100), 15);
        assert_eq!(schedule.intensity(11, 100), 5);
        assert_eq!(schedule.intensity(50, 100), 5);
        assert_eq!(schedule.intensity(51, 100), 2);
    }

    #[test]
    fn test_serialization() {
        let config = EvolutionConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: EvolutionConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.population.size, config.population.size);

        let partial: EvolutionConfig =
            serde_json::from_str(r#"{"regions": 4, "layout": "beta_stops"}"#).unwrap();
        assert_eq!(partial.regions, 4);
        assert_eq!(partial.layout, PartitionLayout::BetaStops);
        assert_eq!(partial.mutation.explore, 15);
    }
}
