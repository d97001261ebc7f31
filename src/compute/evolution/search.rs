//! Genetic search over partitions.

use std::time::Instant;

use log::{debug, info};

use crate::error::Result;
use crate::schema::{
    BetaStops, EvolutionConfig, EvolutionHistory, EvolutionPhase, EvolutionProgress,
    MeasurementGrid, Partition, PartitionLayout, SearchResult, SearchStats, StopReason,
};

use super::fitness::{FitnessCache, FitnessEvaluator};
use super::genome::{PartitionGenome, PartitionRng, partition_distance};

/// A member of the population.
#[derive(Debug, Clone)]
pub struct Candidate<G> {
    /// The searched representation.
    pub genome: G,
    /// Label grid derived from the genome.
    pub partition: Partition,
    /// Corpus-averaged error, `INFINITY` until evaluated.
    pub score: f64,
    /// Generation created.
    pub generation: usize,
}

impl<G: PartitionGenome> Candidate<G> {
    fn new(genome: G, generation: usize) -> Self {
        let partition = genome.partition();
        Self {
            genome,
            partition,
            score: f64::INFINITY,
            generation,
        }
    }
}

/// Evolution engine that runs the search.
pub struct EvolutionEngine<G> {
    config: EvolutionConfig,
    rng: PartitionRng,
    evaluator: FitnessEvaluator,
    cache: FitnessCache,
    population: Vec<Candidate<G>>,
    history: EvolutionHistory,
    generation: usize,
    reign: usize,
    champion: Option<Partition>,
    phase: EvolutionPhase,
}

impl<G: PartitionGenome> EvolutionEngine<G> {
    /// Create a new evolution engine over `corpus`.
    pub fn new(config: EvolutionConfig, corpus: Vec<MeasurementGrid>) -> Result<Self> {
        config.validate()?;
        let evaluator = FitnessEvaluator::new(corpus, config.fit.free_constant)?;
        let rng = match config.random_seed {
            Some(seed) => PartitionRng::new(seed),
            None => PartitionRng::random(),
        };

        Ok(Self {
            config,
            rng,
            evaluator,
            cache: FitnessCache::new(),
            population: Vec::new(),
            history: EvolutionHistory::default(),
            generation: 0,
            reign: 0,
            champion: None,
            phase: EvolutionPhase::Initializing,
        })
    }

    /// Initialize the population.
    pub fn initialize(&mut self) {
        self.phase = EvolutionPhase::Initializing;
        self.generation = 0;
        self.reign = 0;
        self.champion = None;

        let regions = self.config.regions;
        self.population = (0..self.config.population.size)
            .map(|_| Candidate::new(G::random(&mut self.rng, regions), 0))
            .collect();
    }

    /// Score every candidate, fitting only partitions not yet cached.
    fn evaluate_population(&mut self) -> Result<()> {
        self.phase = EvolutionPhase::Evaluating;
        let partitions: Vec<Partition> =
            self.population.iter().map(|c| c.partition.clone()).collect();
        let scores = self.evaluator.score_batch(&mut self.cache, &partitions)?;
        for (candidate, score) in self.population.iter_mut().zip(scores) {
            candidate.score = score;
        }
        Ok(())
    }

    /// Rank the population, keep the best half and update the reign.
    fn select(&mut self) {
        self.phase = EvolutionPhase::Selecting;
        self.population.sort_by(|a, b| a.score.total_cmp(&b.score));

        let avg_score =
            self.population.iter().map(|c| c.score).sum::<f64>() / self.population.len() as f64;
        let diversity = self.compute_diversity();

        let survivors = (self.config.population.size / 2).max(1);
        self.population.truncate(survivors);

        let best_score = self.population[0].score;
        if self.champion.as_ref() == Some(&self.population[0].partition) {
            self.reign += 1;
        } else {
            self.reign = 1;
            self.champion = Some(self.population[0].partition.clone());
            debug!(
                "New champion at generation {} with score {best_score:.6}",
                self.generation
            );
        }
        self.generation += 1;

        self.history.best_score.push(best_score);
        self.history.avg_score.push(avg_score);
        self.history.reign.push(self.reign);
        self.history.diversity.push(diversity);
    }

    /// Refill the population with mutated survivors.
    fn reproduce(&mut self) {
        self.phase = EvolutionPhase::Reproducing;
        let intensity = self
            .config
            .mutation
            .intensity(self.reign, self.config.population.stagnation_threshold);

        let survivors = self.population.len();
        let target = self.config.population.size;
        for i in 0..target.saturating_sub(survivors) {
            let child = self.population[i % survivors]
                .genome
                .mutate(&mut self.rng, intensity);
            self.population.push(Candidate::new(child, self.generation));
        }
        self.population.truncate(target);
    }

    /// Mean pairwise cell disagreement across the population.
    fn compute_diversity(&self) -> f64 {
        let n = self.population.len();
        if n < 2 {
            return 0.0;
        }

        let mut total = 0.0;
        for i in 0..n {
            for j in (i + 1)..n {
                total += partition_distance(
                    &self.population[i].partition,
                    &self.population[j].partition,
                );
            }
        }
        total / (n * (n - 1) / 2) as f64
    }

    /// Get current progress.
    pub fn progress(&self) -> EvolutionProgress {
        let avg_score = if self.population.is_empty() {
            0.0
        } else {
            self.population.iter().map(|c| c.score).sum::<f64>() / self.population.len() as f64
        };

        EvolutionProgress {
            generation: self.generation,
            reign: self.reign,
            best_score: self
                .population
                .first()
                .map_or(f64::INFINITY, |c| c.score),
            avg_score,
            cache_size: self.cache.len(),
            phase: self.phase,
        }
    }

    /// Check if evolution should stop.
    fn should_stop(&self) -> Option<StopReason> {
        if self.reign >= self.config.population.stagnation_threshold {
            return Some(StopReason::Stagnation);
        }
        if self.generation >= self.config.population.max_generations {
            return Some(StopReason::MaxGenerations);
        }
        None
    }

    /// Run evolution with progress callback.
    pub fn run_with_callback<F>(&mut self, callback: F) -> Result<SearchResult>
    where
        F: Fn(&EvolutionProgress),
    {
        let start_time = Instant::now();
        self.initialize();

        let stop_reason = loop {
            self.evaluate_population()?;
            self.select();
            info!(
                "Generation {}: best {:.6}, reign {}, {} partitions cached",
                self.generation,
                self.population[0].score,
                self.reign,
                self.cache.len()
            );
            callback(&self.progress());

            if let Some(reason) = self.should_stop() {
                break reason;
            }
            self.reproduce();
        };

        self.phase = EvolutionPhase::Terminated;
        callback(&self.progress());
        info!(
            "Search stopped after {} generations ({stop_reason:?})",
            self.generation
        );

        let best = &self.population[0];
        Ok(SearchResult {
            best: best.partition.clone(),
            best_score: best.score,
            stats: SearchStats {
                generations: self.generation,
                evaluations: self.cache.misses(),
                cache_hits: self.cache.hits(),
                elapsed_seconds: start_time.elapsed().as_secs_f64(),
                stop_reason,
            },
            history: self.history.clone(),
        })
    }

    /// Run evolution (blocking).
    pub fn run(&mut self) -> Result<SearchResult> {
        self.run_with_callback(|_| {})
    }

    /// Current population, best first after selection.
    pub fn population(&self) -> &[Candidate<G>] {
        &self.population
    }
}

/// Run a search with the genome family selected by `config.layout`.
pub fn run_search<F>(
    config: EvolutionConfig,
    corpus: Vec<MeasurementGrid>,
    callback: F,
) -> Result<SearchResult>
where
    F: Fn(&EvolutionProgress),
{
    match config.layout {
        PartitionLayout::FreeRegions => {
            EvolutionEngine::<Partition>::new(config, corpus)?.run_with_callback(callback)
        }
        PartitionLayout::BetaStops => {
            EvolutionEngine::<BetaStops>::new(config, corpus)?.run_with_callback(callback)
        }
    }
}
