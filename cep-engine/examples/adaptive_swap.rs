//! Adaptive re-planning demo
//!
//! Generates a synthetic stream whose event-type mix flips halfway through,
//! evaluates `SEQ(A, B, C)` with the greedy plan builder, and prints every
//! plan change and the final summary.
//!
//! Usage:
//!   cargo run --example adaptive_swap [simultaneous|trivial] [event-count]
//!
//! Set RUST_LOG=debug to see individual replan decisions.

use cep_engine::{
    CollectingOutput, EngineConfig, EvaluationEngine, JsonDataFormatter, OptimizerConfig,
    Pattern, PatternStructure, PlanBuilderKind, SwapStrategyKind,
};
use chrono::Duration;
use serde_json::json;
use std::env;

fn synthetic_stream(count: usize) -> Vec<String> {
    (0..count)
        .map(|i| {
            // First half is mostly A, second half mostly C
            let event_type = match (i < count / 2, i % 10) {
                (true, 0) => "B",
                (true, 1) => "C",
                (true, _) => "A",
                (false, 0) => "A",
                (false, 1) => "B",
                (false, _) => "C",
            };
            json!({
                "type": event_type,
                "timestamp": i as f64 * 0.1,
                "value": i % 7,
            })
            .to_string()
        })
        .collect()
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().collect();
    let strategy = match args.get(1).map(String::as_str) {
        Some("trivial") => SwapStrategyKind::Trivial,
        _ => SwapStrategyKind::Simultaneous,
    };
    let count = args
        .get(2)
        .and_then(|n| n.parse().ok())
        .unwrap_or(2_000);

    let structure = PatternStructure::seq(vec![
        PatternStructure::primitive("A", "a"),
        PatternStructure::primitive("B", "b"),
        PatternStructure::primitive("C", "c"),
    ]);
    let pattern = match Pattern::new(structure, Vec::new(), Duration::seconds(2)) {
        Ok(pattern) => pattern,
        Err(e) => {
            eprintln!("Invalid pattern: {}", e);
            std::process::exit(1);
        }
    };

    let config = EngineConfig::new()
        .with_optimizer(OptimizerConfig::StatisticsDeviationAware {
            arrival_rate_threshold: 0.5,
            selectivity_threshold: 0.5,
        })
        .with_plan_builder(PlanBuilderKind::Greedy)
        .with_swap_strategy(strategy)
        .with_statistics(10_000, 5_000)
        .with_max_partial_matches(10_000);

    let mut engine = match EvaluationEngine::new(pattern, config) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("Failed to build engine: {}", e);
            std::process::exit(1);
        }
    };

    println!("=== ADAPTIVE SWAP DEMO ({:?}) ===", strategy);
    println!("Initial tree: {}", engine.structure_summary());

    let mut input = synthetic_stream(count).into_iter();
    let mut output = CollectingOutput::new();
    match engine.eval(&mut input, &mut output, &JsonDataFormatter::default()) {
        Ok(summary) => {
            println!("Final tree:   {}", engine.structure_summary());
            println!("\n=== SUMMARY ===");
            println!("Events read:            {}", summary.events_read);
            println!("Matches emitted:        {}", summary.matches_emitted);
            println!("Matches suppressed:     {}", summary.matches_suppressed);
            println!("Re-optimization checks: {}", summary.reoptimization_attempts);
            println!("Replans:                {}", summary.replans);
            println!("Trivial swaps:          {}", summary.trivial_swaps);
            println!(
                "Transitions:            {} begun, {} committed",
                summary.transitions_begun, summary.transitions_committed
            );
            if let Some(first) = output.items().first() {
                println!("\nFirst match: {}", first);
            }
        }
        Err(e) => {
            eprintln!("Evaluation failed: {}", e);
            std::process::exit(1);
        }
    }
}
