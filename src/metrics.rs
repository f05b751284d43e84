//! Episode statistics collected from the training loop

use std::collections::VecDeque;

use crate::callback::{Callback, StepContext};
use crate::error::Result;

/// Moving average over the last `window_size` values
#[derive(Debug, Clone)]
pub struct MovingAverage {
    values: VecDeque<f64>,
    window_size: usize,
    sum: f64,
}

impl MovingAverage {
    pub fn new(window_size: usize) -> Self {
        Self {
            values: VecDeque::with_capacity(window_size),
            window_size,
            sum: 0.0,
        }
    }

    pub fn push(&mut self, value: f64) {
        if self.values.len() >= self.window_size {
            if let Some(old) = self.values.pop_front() {
                self.sum -= old;
            }
        }
        self.values.push_back(value);
        self.sum += value;
    }

    pub fn average(&self) -> Option<f64> {
        (!self.values.is_empty()).then(|| self.sum / self.values.len() as f64)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// One completed training episode
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpisodeRecord {
    pub reward: f64,
    pub length: usize,
    /// Global timestep at which the episode was observed to finish
    pub timestep: u64,
}

/// Records every completed episode and counts rollouts.
///
/// Use a fresh collector per training run.
#[derive(Debug)]
pub struct MetricsCollector {
    episodes: Vec<EpisodeRecord>,
    rollouts: u64,
    recent_rewards: MovingAverage,
    recent_lengths: MovingAverage,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    const WINDOW: usize = 100;

    pub fn new() -> Self {
        Self {
            episodes: Vec::new(),
            rollouts: 0,
            recent_rewards: MovingAverage::new(Self::WINDOW),
            recent_lengths: MovingAverage::new(Self::WINDOW),
        }
    }

    pub fn episodes(&self) -> &[EpisodeRecord] {
        &self.episodes
    }

    pub fn rollouts(&self) -> u64 {
        self.rollouts
    }

    /// Mean reward over the last 100 episodes
    pub fn mean_reward(&self) -> Option<f64> {
        self.recent_rewards.average()
    }

    pub fn mean_length(&self) -> Option<f64> {
        self.recent_lengths.average()
    }
}

impl Callback for MetricsCollector {
    fn name(&self) -> &str {
        "MetricsCollector"
    }

    fn on_step(&mut self, ctx: &mut StepContext<'_>) -> Result<bool> {
        let before = self.episodes.len();
        for episode in ctx.infos.iter().filter_map(|info| info.episode) {
            let record = EpisodeRecord {
                reward: episode.reward,
                length: episode.length,
                timestep: ctx.num_timesteps,
            };
            self.recent_rewards.push(record.reward);
            self.recent_lengths.push(record.length as f64);
            self.episodes.push(record);
        }
        if let Some(last) = self.episodes.last().filter(|_| self.episodes.len() > before) {
            tracing::debug!(
                "Episode {} | reward {:.2} | length {} | timestep {}",
                self.episodes.len(),
                last.reward,
                last.length,
                last.timestep
            );
        }
        Ok(true)
    }

    fn on_rollout_end(&mut self) {
        self.rollouts += 1;
        if let (Some(reward), Some(length)) = (self.mean_reward(), self.mean_length()) {
            tracing::info!(
                "Rollout {} | ep_rew_mean {:.2} | ep_len_mean {:.1}",
                self.rollouts,
                reward,
                length
            );
        }
    }

    fn on_training_end(&mut self) {
        tracing::info!(
            "Collected {} episodes over {} rollouts",
            self.episodes.len(),
            self.rollouts
        );
    }
}
