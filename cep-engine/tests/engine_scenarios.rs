//! End-to-end scenarios through `EvaluationEngine::eval`

use cep_engine::{
    CollectingOutput, CompareOp, Condition, EngineConfig, EngineError, EvaluationEngine,
    EvaluationSummary, JsonDataFormatter, Operand, OptimizerConfig, Optimizer, Pattern,
    PatternStructure, PlanBuilderKind, StatisticValue, StatisticsKind, StatisticsSnapshot,
    SwapStrategyKind, TrivialTreePlanBuilder,
};
use chrono::Duration;
use serde_json::json;

fn record(event_type: &str, secs: f64) -> String {
    json!({ "type": event_type, "timestamp": secs }).to_string()
}

fn record_with(event_type: &str, secs: f64, price: i64) -> String {
    json!({ "type": event_type, "timestamp": secs, "price": price }).to_string()
}

fn seq(names: &[(&str, &str)]) -> PatternStructure {
    PatternStructure::seq(
        names
            .iter()
            .map(|(event_type, name)| PatternStructure::primitive(*event_type, *name))
            .collect(),
    )
}

fn run(
    engine: &mut EvaluationEngine,
    records: Vec<String>,
) -> (Vec<Vec<u64>>, EvaluationSummary) {
    let mut input = records.into_iter();
    let mut output = CollectingOutput::new();
    let summary = engine
        .eval(&mut input, &mut output, &JsonDataFormatter::default())
        .unwrap();
    assert!(output.is_closed());
    let ids = output.items().iter().map(|m| m.event_ids()).collect();
    (ids, summary)
}

fn a_before_b() -> Pattern {
    Pattern::new(seq(&[("A", "a"), ("B", "b")]), Vec::new(), Duration::seconds(10)).unwrap()
}

#[test]
fn test_a_before_b_within_window() {
    let mut engine = EvaluationEngine::new(a_before_b(), EngineConfig::new()).unwrap();
    let mut input = vec![record("A", 0.0), record("B", 5.0)].into_iter();
    let mut output = CollectingOutput::new();
    engine
        .eval(&mut input, &mut output, &JsonDataFormatter::default())
        .unwrap();

    let matches = output.into_items();
    assert_eq!(matches.len(), 1);
    let matched = &matches[0];
    assert_eq!(matched.event_ids(), vec![0, 1]);
    assert_eq!(matched.first_timestamp().timestamp(), 0);
    assert_eq!(matched.last_timestamp().timestamp(), 5);
    assert_eq!(&*matched.event("b").unwrap().event_type, "B");
}

#[test]
fn test_a_before_b_outside_window() {
    let mut engine = EvaluationEngine::new(a_before_b(), EngineConfig::new()).unwrap();
    let (matches, summary) = run(&mut engine, vec![record("A", 0.0), record("B", 12.0)]);
    assert!(matches.is_empty());
    assert_eq!(summary.events_read, 2);
    assert_eq!(summary.matches_emitted, 0);
}

#[test]
fn test_unregistered_types_are_dropped() {
    let mut engine = EvaluationEngine::new(a_before_b(), EngineConfig::new()).unwrap();
    let (matches, summary) = run(
        &mut engine,
        vec![record("A", 0.0), record("Z", 1.0), record("B", 2.0)],
    );
    // Ignored events do not consume ingestion ids
    assert_eq!(matches, vec![vec![0, 1]]);
    assert_eq!(summary.events_ignored, 1);
}

#[test]
fn test_malformed_record_aborts_the_run() {
    let mut engine = EvaluationEngine::new(a_before_b(), EngineConfig::new()).unwrap();
    let mut input = vec![record("A", 0.0), "{not json".to_string()].into_iter();
    let mut output = CollectingOutput::new();
    let result = engine.eval(&mut input, &mut output, &JsonDataFormatter::default());
    assert!(matches!(result, Err(EngineError::Parse(_))));
    assert!(!output.is_closed());
}

#[test]
fn test_conditions_filter_matches() {
    let condition = Condition::compare(
        Operand::field("a", "price"),
        CompareOp::Lt,
        Operand::field("b", "price"),
    );
    let pattern = Pattern::new(
        seq(&[("A", "a"), ("B", "b")]),
        vec![condition],
        Duration::seconds(10),
    )
    .unwrap();
    let mut engine = EvaluationEngine::new(pattern, EngineConfig::new()).unwrap();
    let (matches, _) = run(
        &mut engine,
        vec![
            record_with("A", 0.0, 10),
            record_with("A", 1.0, 3),
            record_with("B", 2.0, 5),
        ],
    );
    assert_eq!(matches, vec![vec![1, 2]]);
}

#[test]
fn test_reoptimization_cadence_is_strict() {
    let config = EngineConfig::new().with_statistics(60_000, 10_000);

    let mut engine = EvaluationEngine::new(a_before_b(), config.clone()).unwrap();
    let (_, summary) = run(&mut engine, vec![record("A", 0.0), record("A", 10.0)]);
    assert_eq!(summary.reoptimization_attempts, 1);

    let mut engine = EvaluationEngine::new(a_before_b(), config).unwrap();
    let (_, summary) = run(
        &mut engine,
        vec![record("A", 0.0), record("A", 10.0), record("A", 10.0001)],
    );
    assert_eq!(summary.reoptimization_attempts, 2);
    // The trivial builder always rebuilds the same plan
    assert_eq!(summary.replans, 0);
    assert_eq!(summary.unchanged_plans, 2);
}

#[test]
fn test_freeze_suppresses_new_initiations() {
    let structure = seq(&[("A", "a"), ("B", "b"), ("C", "c")]);
    let records = vec![
        record("A", 0.0),
        record("A", 1.0),
        record("B", 2.0),
        record("C", 3.0),
    ];

    let plain = Pattern::new(structure.clone(), Vec::new(), Duration::seconds(10)).unwrap();
    let mut engine = EvaluationEngine::new(plain, EngineConfig::new()).unwrap();
    let (matches, _) = run(&mut engine, records.clone());
    assert_eq!(matches.len(), 2);

    let frozen = Pattern::new(structure, Vec::new(), Duration::seconds(10))
        .unwrap()
        .with_freeze(["a"])
        .unwrap();
    let mut engine = EvaluationEngine::new(frozen, EngineConfig::new()).unwrap();
    let (matches, _) = run(&mut engine, records);
    assert_eq!(matches, vec![vec![0, 2, 3]]);
}

#[test]
fn test_freeze_expires_with_the_window() {
    let frozen = Pattern::new(
        seq(&[("A", "a"), ("B", "b"), ("C", "c")]),
        Vec::new(),
        Duration::seconds(10),
    )
    .unwrap()
    .with_freeze(["a"])
    .unwrap();
    let mut engine = EvaluationEngine::new(frozen, EngineConfig::new()).unwrap();
    let (matches, _) = run(
        &mut engine,
        vec![
            record("A", 0.0),
            record("A", 11.0),
            record("B", 12.0),
            record("C", 13.0),
        ],
    );
    assert_eq!(matches, vec![vec![1, 2, 3]]);
}

#[test]
fn test_trailing_negation_is_flushed_at_end_of_input() {
    let structure = PatternStructure::seq(vec![
        PatternStructure::primitive("A", "a"),
        PatternStructure::not("X", "x"),
    ]);
    let pattern = Pattern::new(structure, Vec::new(), Duration::seconds(10)).unwrap();

    let mut engine = EvaluationEngine::new(pattern.clone(), EngineConfig::new()).unwrap();
    let (matches, _) = run(&mut engine, vec![record("A", 0.0)]);
    assert_eq!(matches, vec![vec![0]]);

    let mut engine = EvaluationEngine::new(pattern, EngineConfig::new()).unwrap();
    let (matches, _) = run(&mut engine, vec![record("A", 0.0), record("X", 4.0)]);
    assert!(matches.is_empty());
}

#[test]
fn test_arrival_rate_jump_drives_deviation_aware_optimizer() {
    let pattern = a_before_b();
    let before = StatisticsSnapshot::new().with(
        StatisticsKind::ArrivalRates,
        StatisticValue::Vector(vec![1.0, 1.0]),
    );
    let after = StatisticsSnapshot::new().with(
        StatisticsKind::ArrivalRates,
        StatisticValue::Vector(vec![3.0, 1.0]),
    );

    for (threshold, expected) in [(0.5, true), (3.0, false)] {
        let config = OptimizerConfig::StatisticsDeviationAware {
            arrival_rate_threshold: threshold,
            selectivity_threshold: threshold,
        };
        let mut optimizer = Optimizer::new(&config, Box::new(TrivialTreePlanBuilder)).unwrap();
        optimizer.build_initial_plan(&before, &pattern).unwrap();
        assert_eq!(optimizer.should_optimize(&after, &pattern), expected);
    }
}

#[test]
fn test_invariant_aware_with_trivial_builder_is_rejected() {
    let config = EngineConfig::new()
        .with_optimizer(OptimizerConfig::InvariantAware)
        .with_statistics(60_000, 10_000);
    assert!(matches!(
        EvaluationEngine::new(a_before_b(), config),
        Err(EngineError::Configuration(_))
    ));
}

#[test]
fn test_simultaneous_with_short_update_window_is_rejected() {
    let config = EngineConfig::new()
        .with_swap_strategy(SwapStrategyKind::Simultaneous)
        .with_statistics(60_000, 1_000);
    assert!(matches!(
        EvaluationEngine::new(a_before_b(), config),
        Err(EngineError::Configuration(_))
    ));
}

/// `SEQ(A, B)` records: 2 A per B for the first 30 s, then 2 B per A
fn shifting_mix() -> Vec<String> {
    let mut records = Vec::new();
    for second in 0..60i64 {
        let base = second * 1000;
        let kinds = if second < 30 {
            [("A", 0), ("A", 200), ("B", 500)]
        } else {
            [("A", 0), ("B", 200), ("B", 500)]
        };
        for (event_type, offset) in kinds {
            records.push(record(event_type, (base + offset) as f64 / 1000.0));
        }
    }
    records
}

fn adaptive_config(optimizer: OptimizerConfig) -> EngineConfig {
    EngineConfig::new()
        .with_optimizer(optimizer)
        .with_plan_builder(PlanBuilderKind::Greedy)
        .with_statistics(10_000, 10_000)
}

#[test]
fn test_rate_shift_replans_during_eval() {
    let pattern = Pattern::new(
        seq(&[("A", "a"), ("B", "b")]),
        Vec::new(),
        Duration::seconds(1),
    )
    .unwrap();

    // The first replan reacts to A arriving before any B; the second to the mix flip at 30 s
    for (threshold, replans) in [(0.5, 2), (3.0, 1)] {
        let config = adaptive_config(OptimizerConfig::StatisticsDeviationAware {
            arrival_rate_threshold: threshold,
            selectivity_threshold: threshold,
        });
        let mut engine = EvaluationEngine::new(pattern.clone(), config).unwrap();
        let (_, summary) = run(&mut engine, shifting_mix());
        assert_eq!(summary.reoptimization_attempts, 6);
        assert_eq!(summary.replans, replans, "threshold {}", threshold);
        assert_eq!(summary.trivial_swaps, replans);
        assert_eq!(summary.unchanged_plans, 1);
    }

    let mut engine =
        EvaluationEngine::new(pattern, adaptive_config(OptimizerConfig::InvariantAware)).unwrap();
    let (_, summary) = run(&mut engine, shifting_mix());
    assert_eq!(summary.replans, 2);
    assert_eq!(summary.unchanged_plans, 0);
    assert_eq!(engine.structure_summary(), "(a ⋈ b)");
}

#[test]
fn test_injected_selectivity_drives_replan() {
    let before = vec![
        record("A", 0.0),
        record("B", 1.0),
        record("A", 20.0),
        record("B", 21.0),
    ];
    let after = vec![record("A", 40.0), record("B", 41.0)];
    let selectivity = StatisticValue::Matrix(vec![vec![0.1], vec![1.0, 1.0]]);

    for (threshold, replans) in [(0.5, 2), (3.0, 1)] {
        let config = EngineConfig::new()
            .with_optimizer(OptimizerConfig::StatisticsDeviationAware {
                arrival_rate_threshold: 1000.0,
                selectivity_threshold: threshold,
            })
            .with_plan_builder(PlanBuilderKind::Greedy)
            .with_statistics(1_000_000, 10_000);
        let mut engine = EvaluationEngine::new(a_before_b(), config).unwrap();

        let (_, summary) = run(&mut engine, before.clone());
        assert_eq!(summary.replans, 1);
        assert_eq!(engine.structure_summary(), "(b ⋈ a)");

        engine.update_statistics(StatisticsKind::Selectivity, selectivity.clone());
        let (_, summary) = run(&mut engine, after.clone());
        assert_eq!(summary.replans, replans, "threshold {}", threshold);
    }
}

#[test]
fn test_update_statistics_without_collector_is_ignored() {
    let mut engine = EvaluationEngine::new(a_before_b(), EngineConfig::new()).unwrap();
    engine.update_statistics(
        StatisticsKind::Selectivity,
        StatisticValue::Matrix(vec![vec![0.1], vec![1.0, 1.0]]),
    );
    let (matches, summary) = run(&mut engine, vec![record("A", 0.0), record("B", 1.0)]);
    assert_eq!(matches, vec![vec![0, 1]]);
    assert_eq!(summary.reoptimization_attempts, 0);
}

#[test]
fn test_storage_limit_evictions_are_reported() {
    let config = EngineConfig::new().with_max_partial_matches(1);
    let mut engine = EvaluationEngine::new(a_before_b(), config).unwrap();
    let (matches, summary) = run(
        &mut engine,
        vec![record("A", 0.0), record("A", 1.0), record("B", 2.0)],
    );
    assert_eq!(matches, vec![vec![1, 2]]);
    assert_eq!(summary.partial_matches_evicted, 1);
    assert_eq!(engine.summary().partial_matches_evicted, 1);
}
