//! Periodic evaluation on a held-out environment and per-checkpoint aggregation

use serde::{Deserialize, Serialize};

use crate::algorithm::Algorithm;
use crate::callback::{Callback, StepContext};
use crate::env::Environment;
use crate::error::{Error, Result};

/// Raw results of one evaluation pause
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvaluationCheckpoint {
    /// Global timestep at which training was paused
    pub timestep: u64,
    pub rewards: Vec<f64>,
    pub lengths: Vec<usize>,
}

/// Per-checkpoint mean and population standard deviation of episode rewards
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateStats {
    pub means: Vec<f64>,
    pub stds: Vec<f64>,
}

impl AggregateStats {
    pub fn len(&self) -> usize {
        self.means.len()
    }

    pub fn is_empty(&self) -> bool {
        self.means.is_empty()
    }
}

/// Reduce every checkpoint to `(mean, std)`.
///
/// Stops at the first checkpoint without rewards.
pub fn reduce(checkpoints: &[EvaluationCheckpoint]) -> Result<AggregateStats> {
    let mut stats = AggregateStats {
        means: Vec::with_capacity(checkpoints.len()),
        stds: Vec::with_capacity(checkpoints.len()),
    };
    for (index, checkpoint) in checkpoints.iter().enumerate() {
        let (mean, std) =
            mean_std(&checkpoint.rewards).ok_or(Error::EmptyCheckpoint { index })?;
        stats.means.push(mean);
        stats.stds.push(std);
    }
    Ok(stats)
}

fn mean_std(samples: &[f64]) -> Option<(f64, f64)> {
    if samples.is_empty() {
        return None;
    }
    let n = samples.len() as f64;
    let mean = samples.iter().sum::<f64>() / n;
    let variance = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    Some((mean, variance.sqrt()))
}

/// Pauses training every `period` vector steps to score the current policy on a
/// held-out environment
pub struct EvalCallback {
    /// `None` when evaluation is disabled
    eval_env: Option<Box<dyn Environment>>,
    period: u64,
    n_eval_episodes: usize,
    deterministic: bool,
    /// Seed for the first reset; later episodes continue the simulator's stream
    seed: Option<u64>,
    checkpoints: Vec<EvaluationCheckpoint>,
}

impl EvalCallback {
    /// `period` is in vector steps, `seed` seeds the first evaluation episode
    pub fn new(
        eval_env: Box<dyn Environment>,
        period: u64,
        n_eval_episodes: usize,
        seed: u64,
    ) -> Self {
        Self {
            eval_env: Some(eval_env),
            period: period.max(1),
            n_eval_episodes,
            deterministic: true,
            seed: Some(seed),
            checkpoints: Vec::new(),
        }
    }

    /// Never evaluates; reports an empty list of checkpoints
    pub fn disabled() -> Self {
        Self {
            eval_env: None,
            period: u64::MAX,
            n_eval_episodes: 0,
            deterministic: true,
            seed: None,
            checkpoints: Vec::new(),
        }
    }

    pub fn with_deterministic(mut self, deterministic: bool) -> Self {
        self.deterministic = deterministic;
        self
    }

    pub fn period(&self) -> u64 {
        self.period
    }

    pub fn checkpoints(&self) -> &[EvaluationCheckpoint] {
        &self.checkpoints
    }

    fn evaluate(
        eval_env: &mut dyn Environment,
        algorithm: &mut dyn Algorithm,
        episodes: usize,
        deterministic: bool,
        seed: &mut Option<u64>,
        timestep: u64,
    ) -> Result<EvaluationCheckpoint> {
        let mut checkpoint = EvaluationCheckpoint {
            timestep,
            rewards: Vec::with_capacity(episodes),
            lengths: Vec::with_capacity(episodes),
        };

        for _ in 0..episodes {
            let mut observation = eval_env.reset(seed.take())?;
            let mut reward = 0.0;
            let mut length = 0;
            loop {
                let action = algorithm.predict(&observation, deterministic);
                let step = eval_env.step(&action)?;
                reward += step.reward;
                length += 1;
                if step.done() {
                    break;
                }
                observation = step.observation;
            }
            checkpoint.rewards.push(reward);
            checkpoint.lengths.push(length);
        }

        Ok(checkpoint)
    }
}

impl Callback for EvalCallback {
    fn name(&self) -> &str {
        "EvalCallback"
    }

    fn on_step(&mut self, ctx: &mut StepContext<'_>) -> Result<bool> {
        let Some(eval_env) = self.eval_env.as_deref_mut() else {
            return Ok(true);
        };
        if ctx.n_calls % self.period != 0 {
            return Ok(true);
        }

        let checkpoint = Self::evaluate(
            eval_env,
            &mut *ctx.algorithm,
            self.n_eval_episodes,
            self.deterministic,
            &mut self.seed,
            ctx.num_timesteps,
        )?;
        if let Some((mean, std)) = mean_std(&checkpoint.rewards) {
            let mean_length =
                checkpoint.lengths.iter().sum::<usize>() as f64 / checkpoint.lengths.len() as f64;
            tracing::info!(
                "Eval num_timesteps={}, episode_reward={:.2} +/- {:.2}, episode_length={:.2}",
                ctx.num_timesteps,
                mean,
                std,
                mean_length
            );
        }
        self.checkpoints.push(checkpoint);
        Ok(true)
    }

    fn on_rollout_end(&mut self) {}

    fn evaluations(&self) -> Option<&[EvaluationCheckpoint]> {
        Some(&self.checkpoints)
    }
}
