//! Environment interface and the sequential vectorized wrapper

use serde_yaml::{Mapping, Value};

use crate::error::{Error, Result};

pub type Observation = Vec<f32>;

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Discrete(usize),
    Continuous(Vec<f32>),
}

/// Result of a single environment transition
#[derive(Debug, Clone)]
pub struct Step {
    pub observation: Observation,
    pub reward: f64,
    /// Episode reached a terminal state
    pub terminated: bool,
    /// Episode was cut short (time limit)
    pub truncated: bool,
}

impl Step {
    pub fn done(&self) -> bool {
        self.terminated || self.truncated
    }
}

/// A single simulator instance, supplied by the embedding program
pub trait Environment {
    /// Start a new episode. `Some(seed)` reseeds the simulator.
    fn reset(&mut self, seed: Option<u64>) -> anyhow::Result<Observation>;

    fn step(&mut self, action: &Action) -> anyhow::Result<Step>;
}

/// Everything the environment factory gets to know about the instance it builds
#[derive(Debug, Clone, Default)]
pub struct EnvSpec {
    pub name: String,
    pub normalize: Option<Value>,
    pub env_wrapper: Option<Value>,
    pub frame_stack: Option<Value>,
    pub env_kwargs: Option<Mapping>,
    /// Held-out instance used for evaluation
    pub evaluation: bool,
}

/// Completed-episode marker
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpisodeInfo {
    pub reward: f64,
    pub length: usize,
}

/// Per-environment info record of one vector step
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepInfo {
    pub episode: Option<EpisodeInfo>,
    pub truncated: bool,
}

#[derive(Debug, Clone)]
pub struct VecStep {
    pub observations: Vec<Observation>,
    pub rewards: Vec<f64>,
    pub dones: Vec<bool>,
    /// One record per environment, in environment index order
    pub infos: Vec<StepInfo>,
}

/// Steps a batch of environments one after another, tracking episode return and
/// length and resetting finished episodes
pub struct VecEnv {
    envs: Vec<Box<dyn Environment>>,
    episode_rewards: Vec<f64>,
    episode_lengths: Vec<usize>,
}

impl VecEnv {
    pub fn new(envs: Vec<Box<dyn Environment>>) -> Self {
        let n = envs.len();
        Self {
            envs,
            episode_rewards: vec![0.0; n],
            episode_lengths: vec![0; n],
        }
    }

    pub fn num_envs(&self) -> usize {
        self.envs.len()
    }

    /// Reset all environments, seeding environment `i` with `seed + i`
    pub fn reset(&mut self, seed: u64) -> Result<Vec<Observation>> {
        self.episode_rewards.fill(0.0);
        self.episode_lengths.fill(0);
        let mut observations = Vec::with_capacity(self.envs.len());
        for (i, env) in self.envs.iter_mut().enumerate() {
            observations.push(env.reset(Some(seed + i as u64))?);
        }
        Ok(observations)
    }

    pub fn step(&mut self, actions: &[Action]) -> Result<VecStep> {
        if actions.len() != self.envs.len() {
            return Err(Error::config(format!(
                "got {} actions for {} environments",
                actions.len(),
                self.envs.len()
            )));
        }

        let n = self.envs.len();
        let mut out = VecStep {
            observations: Vec::with_capacity(n),
            rewards: Vec::with_capacity(n),
            dones: Vec::with_capacity(n),
            infos: Vec::with_capacity(n),
        };

        for (i, (env, action)) in self.envs.iter_mut().zip(actions).enumerate() {
            let step = env.step(action)?;
            self.episode_rewards[i] += step.reward;
            self.episode_lengths[i] += 1;

            let done = step.done();
            let mut info = StepInfo {
                episode: None,
                truncated: step.truncated && !step.terminated,
            };
            let observation = if done {
                info.episode = Some(EpisodeInfo {
                    reward: self.episode_rewards[i],
                    length: self.episode_lengths[i],
                });
                self.episode_rewards[i] = 0.0;
                self.episode_lengths[i] = 0;
                env.reset(None)?
            } else {
                step.observation
            };

            out.observations.push(observation);
            out.rewards.push(step.reward);
            out.dones.push(done);
            out.infos.push(info);
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::CountdownEnv;

    fn vec_env(lengths: &[usize]) -> VecEnv {
        VecEnv::new(
            lengths
                .iter()
                .map(|&len| Box::new(CountdownEnv::new(vec![len])) as Box<dyn Environment>)
                .collect(),
        )
    }

    #[test]
    fn test_reset_seeds_each_env() {
        let mut envs = vec_env(&[3, 3, 3]);
        let observations = envs.reset(10).unwrap();
        let seeds: Vec<f32> = observations.iter().map(|o| o[1]).collect();
        assert_eq!(seeds, vec![10.0, 11.0, 12.0]);
    }

    #[test]
    fn test_episode_markers_in_env_order() {
        let mut envs = vec_env(&[2, 3]);
        envs.reset(0).unwrap();
        let actions = vec![Action::Discrete(0); 2];

        let first = envs.step(&actions).unwrap();
        assert_eq!(first.infos, vec![StepInfo::default(), StepInfo::default()]);

        let second = envs.step(&actions).unwrap();
        assert_eq!(second.dones, vec![true, false]);
        assert_eq!(
            second.infos[0].episode,
            Some(EpisodeInfo {
                reward: 2.0,
                length: 2
            })
        );
        assert!(second.infos[1].episode.is_none());

        let third = envs.step(&actions).unwrap();
        assert_eq!(third.dones, vec![false, true]);
        assert_eq!(third.infos[1].episode.map(|e| e.length), Some(3));
        // Finished env was reset and started a fresh episode
        assert_eq!(third.infos[0].episode, None);
    }

    #[test]
    fn test_action_count_mismatch() {
        let mut envs = vec_env(&[2, 2]);
        envs.reset(0).unwrap();
        assert!(matches!(
            envs.step(&[Action::Discrete(0)]),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_done_covers_truncation() {
        let step = Step {
            observation: vec![],
            reward: 0.0,
            terminated: false,
            truncated: true,
        };
        assert!(step.done());
    }
}
