//! CEP Engine Library
//!
//! An adaptive, tree-based complex event processing engine. A [`Pattern`]
//! (ordered/unordered sequences of named event occurrences with conditions,
//! negation and a sliding time window) is evaluated over a stream of events
//! by a join tree whose shape comes from a [`TreePlanBuilder`].
//!
//! # Architecture
//!
//! - [`EvaluationEngine`] runs the ingestion loop, one event at a time
//! - [`StatisticsCollector`] tracks arrival rates and injected selectivities
//! - [`Optimizer`] decides when the running plan has gone stale
//! - [`Tree`] holds partial matches and emits completed [`PatternMatch`]es
//! - a swap protocol (trivial replay or simultaneous overlap) replaces the
//!   running tree without losing or duplicating matches
//!
//! The library does NOT:
//! - define a query language
//! - run several engines in parallel (callers partition the input)
//! - install a logger
//!
//! # Example Usage
//!
//! ```no_run
//! use cep_engine::{
//!     CollectingOutput, EngineConfig, EvaluationEngine, JsonDataFormatter, Pattern,
//!     PatternStructure,
//! };
//! use chrono::Duration;
//!
//! let structure = PatternStructure::seq(vec![
//!     PatternStructure::primitive("A", "a"),
//!     PatternStructure::primitive("B", "b"),
//! ]);
//! let pattern = Pattern::new(structure, Vec::new(), Duration::seconds(10)).unwrap();
//!
//! let config = EngineConfig::new().with_statistics(60_000, 10_000);
//! let mut engine = EvaluationEngine::new(pattern, config).unwrap();
//!
//! let mut input = vec![
//!     r#"{"type": "A", "timestamp": 0}"#.to_string(),
//!     r#"{"type": "B", "timestamp": 5}"#.to_string(),
//! ]
//! .into_iter();
//! let mut output = CollectingOutput::new();
//! let summary = engine
//!     .eval(&mut input, &mut output, &JsonDataFormatter::default())
//!     .unwrap();
//!
//! for matched in output.items() {
//!     println!("{}", matched);
//! }
//! println!("{}", summary);
//! ```

// Public modules
pub mod config;
pub mod engine;
pub mod formats;
pub mod optimizer;
pub mod pattern;
pub mod plan;
pub mod statistics;
pub mod stream;
pub mod swap;
pub mod tree;
pub mod types;

// Re-export main types for convenience
pub use config::{
    EngineConfig, OptimizerConfig, PlanBuilderKind, StatisticsConfig, SwapStrategyKind,
    TreeStorageParameters,
};
pub use engine::{EvaluationEngine, EvaluationSummary};
pub use formats::{DataFormatter, JsonDataFormatter};
pub use optimizer::{Optimizer, OptimizerStrategy};
pub use pattern::{CompareOp, Condition, Operand, Pattern, PatternStructure};
pub use plan::{
    GreedyTreePlanBuilder, PlanInvariants, TreePlan, TreePlanBuilder, TreePlanNode,
    TrivialTreePlanBuilder,
};
pub use statistics::{
    DeviationTester, StatisticValue, StatisticsCollector, StatisticsKind, StatisticsSnapshot,
};
pub use stream::{CollectingOutput, InputStream, LineInput, OutputStream};
pub use swap::TransitionMark;
pub use tree::{Leaf, Tree};
pub use types::{EngineError, Event, MatchedEvent, Payload, PatternMatch, Result, Timestamp};

// Internal modules (not exposed in public API)
mod freeze;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
