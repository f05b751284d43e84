pub mod algorithm;
pub mod callback;
pub mod compare;
pub mod config;
pub mod env;
pub mod error;
pub mod evaluation;
pub mod metrics;
pub mod orchestrator;
pub mod registry;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types for convenience
pub use algorithm::{Algorithm, AlgorithmSpec, Transition};
pub use callback::{Callback, StepContext};
pub use compare::{Comparison, compare};
pub use config::{ConfigLoader, Configuration, register_legacy_tags};
pub use env::{Action, EnvSpec, Environment, Observation, Step, StepInfo, VecEnv};
pub use error::{Error, Result};
pub use evaluation::{AggregateStats, EvalCallback, EvaluationCheckpoint, reduce};
pub use metrics::{EpisodeRecord, MetricsCollector};
pub use orchestrator::{Session, TrainingOrchestrator, collect_evaluations};
pub use registry::Registry;
