//! Ellipsoid partition CLI - Search partitions for a corpus from JSON files.

use std::fs;
use std::path::PathBuf;

use log::info;
use serde::Serialize;

use ellipsoid_partition::{
    compute::evolution::{FitnessEvaluator, TableReport, load_corpus, run_search},
    error::Result,
    schema::{EvolutionConfig, SearchResult},
};

/// Search outcome plus the champion's per-table breakdown.
#[derive(Serialize)]
struct Output {
    result: SearchResult,
    tables: Vec<TableReport>,
}

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();

    if args.get(1).map(String::as_str) == Some("--example") {
        print_example_config();
        return;
    }

    if args.len() < 3 {
        eprintln!("Usage: {} <config.json> <corpus.json>", args[0]);
        eprintln!();
        eprintln!("Search the partition whose per-region ellipsoids best fit a corpus.");
        eprintln!();
        eprintln!("Arguments:");
        eprintln!("  config.json  Path to search configuration file");
        eprintln!("  corpus.json  JSON array of 29x20 r-tables");
        eprintln!();
        eprintln!("Example configuration is generated with --example flag.");
        std::process::exit(1);
    }

    if let Err(e) = run(PathBuf::from(&args[1]), PathBuf::from(&args[2])) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run(config_path: PathBuf, corpus_path: PathBuf) -> Result<()> {
    let config: EvolutionConfig = serde_json::from_str(&fs::read_to_string(&config_path)?)?;
    let corpus = load_corpus(&corpus_path)?;
    info!(
        "Loaded {} tables, searching K={} with population {}",
        corpus.len(),
        config.regions,
        config.population.size
    );

    let evaluator = FitnessEvaluator::new(corpus.clone(), config.fit.free_constant)?;
    let result = run_search(config.clone(), corpus, |progress| {
        if progress.generation % 10 == 0 {
            eprintln!(
                "  Generation {}: best={:.6}, avg={:.6}, reign={}",
                progress.generation, progress.best_score, progress.avg_score, progress.reign
            );
        }
    })?;

    eprintln!();
    eprintln!("Champion (score {:.6}):", result.best_score);
    eprint!("{}", result.best);
    eprintln!(
        "{} generations, {} fits, {} cache hits, {:.2}s ({:?})",
        result.stats.generations,
        result.stats.evaluations,
        result.stats.cache_hits,
        result.stats.elapsed_seconds,
        result.stats.stop_reason
    );

    let tables = evaluator.report(&result.best, &config.fit)?;
    let output = Output { result, tables };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn print_example_config() {
    let config = EvolutionConfig {
        random_seed: Some(42),
        ..Default::default()
    };

    println!("Example configuration (config.json):");
    match serde_json::to_string_pretty(&config) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("Error serializing config: {e}"),
    }
}
