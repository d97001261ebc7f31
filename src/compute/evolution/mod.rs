//! Evolutionary search for partitions that fit a corpus well.
//!
//! # Overview
//!
//! - **Genome Operations** (`genome`): random partitions by flood fill,
//!   mutation by regional growth, column-stop genomes
//! - **Fitness** (`fitness`): corpus-averaged normalized error with an
//!   explicit memoization cache
//! - **Search** (`search`): truncation-selection genetic loop that stops
//!   once the champion's reign or the generation cap is reached
//!
//! # Example
//!
//! ```rust,no_run
//! use ellipsoid_partition::compute::evolution::{load_corpus, run_search};
//! use ellipsoid_partition::schema::EvolutionConfig;
//!
//! let corpus = load_corpus("corpus.json")?;
//! let result = run_search(EvolutionConfig::default(), corpus, |progress| {
//!     println!("Generation {}: best = {:.4}", progress.generation, progress.best_score);
//! })?;
//! println!("{}", result.best);
//! # Ok::<(), ellipsoid_partition::error::EngineError>(())
//! ```

mod fitness;
mod genome;
mod search;

pub use fitness::{FitnessCache, FitnessEvaluator, TableReport, load_corpus};
pub use genome::{
    Direction, PartitionGenome, PartitionRng, STARVATION_THRESHOLD, expand, partition_distance,
};
pub use search::{Candidate, EvolutionEngine, run_search};
