//! Training algorithm interface

use std::path::PathBuf;

use serde_yaml::{Mapping, Value};

use crate::env::{Action, Observation};

/// One vector step worth of experience
#[derive(Debug, Clone, Copy)]
pub struct Transition<'a> {
    pub observations: &'a [Observation],
    pub actions: &'a [Action],
    pub rewards: &'a [f64],
    pub dones: &'a [bool],
    /// Observations after auto-reset of finished episodes
    pub next_observations: &'a [Observation],
}

/// Everything the algorithm factory gets to know about the learner it builds
#[derive(Debug, Clone)]
pub struct AlgorithmSpec {
    pub algorithm: String,
    pub env_name: String,
    pub n_envs: usize,
    pub seed: u64,
    pub policy: Option<String>,
    /// Algorithm keyword arguments in document order
    pub hyperparams: Mapping,
    /// Training callback named by the saved hyperparameters, for the factory to build
    pub callback: Option<Value>,
    /// Saved agent to continue training from
    pub trained_agent: Option<PathBuf>,
    pub tensorboard_log: Option<PathBuf>,
    pub verbose: i64,
}

/// A learner driven by the orchestrator's training loop
pub trait Algorithm {
    /// Vector steps collected per rollout
    fn rollout_steps(&self) -> usize;

    /// Pick one action per environment
    fn act(&mut self, observations: &[Observation]) -> Vec<Action>;

    fn record(&mut self, transition: Transition<'_>);

    /// Policy update at the end of a rollout
    fn update(&mut self) -> anyhow::Result<()>;

    /// Action for a single observation, used during evaluation
    fn predict(&mut self, observation: &Observation, deterministic: bool) -> Action;
}
