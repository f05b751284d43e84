//! Deterministic collaborators shared by the unit tests

use crate::algorithm::{Algorithm, Transition};
use crate::env::{Action, Environment, Observation, Step};
use crate::registry::Registry;

/// Episodes run through a fixed cycle of lengths with reward 1.0 per step.
///
/// Reseeding restarts the cycle at `seed % lengths.len()`. Observations are
/// `[steps_remaining, seed]`.
#[derive(Debug, Clone)]
pub struct CountdownEnv {
    lengths: Vec<usize>,
    cursor: usize,
    remaining: usize,
    seed: u64,
}

impl CountdownEnv {
    pub fn new(lengths: Vec<usize>) -> Self {
        assert!(lengths.iter().all(|&l| l > 0), "episode lengths must be positive");
        Self {
            lengths,
            cursor: 0,
            remaining: 0,
            seed: 0,
        }
    }

    fn observation(&self) -> Observation {
        vec![self.remaining as f32, self.seed as f32]
    }
}

impl Environment for CountdownEnv {
    fn reset(&mut self, seed: Option<u64>) -> anyhow::Result<Observation> {
        if let Some(seed) = seed {
            self.seed = seed;
            self.cursor = seed as usize % self.lengths.len();
        }
        self.remaining = self.lengths[self.cursor];
        self.cursor = (self.cursor + 1) % self.lengths.len();
        Ok(self.observation())
    }

    fn step(&mut self, _action: &Action) -> anyhow::Result<Step> {
        anyhow::ensure!(self.remaining > 0, "step called on a finished episode");
        self.remaining -= 1;
        Ok(Step {
            observation: self.observation(),
            reward: 1.0,
            terminated: self.remaining == 0,
            truncated: false,
        })
    }
}

/// Always picks action 0 and counts what it is asked to do
#[derive(Debug, Clone, Default)]
pub struct ScriptedAlgorithm {
    rollout_steps: usize,
    recorded: usize,
    updates: usize,
    predictions: usize,
    fail_updates: bool,
}

impl ScriptedAlgorithm {
    pub fn new(rollout_steps: usize) -> Self {
        Self {
            rollout_steps,
            ..Self::default()
        }
    }

    pub fn failing(rollout_steps: usize) -> Self {
        Self {
            fail_updates: true,
            ..Self::new(rollout_steps)
        }
    }

    pub fn recorded(&self) -> usize {
        self.recorded
    }

    pub fn updates(&self) -> usize {
        self.updates
    }

    pub fn predictions(&self) -> usize {
        self.predictions
    }
}

impl Algorithm for ScriptedAlgorithm {
    fn rollout_steps(&self) -> usize {
        self.rollout_steps
    }

    fn act(&mut self, observations: &[Observation]) -> Vec<Action> {
        vec![Action::Discrete(0); observations.len()]
    }

    fn record(&mut self, transition: Transition<'_>) {
        self.recorded += transition.actions.len();
    }

    fn update(&mut self) -> anyhow::Result<()> {
        anyhow::ensure!(!self.fail_updates, "gradient exploded");
        self.updates += 1;
        Ok(())
    }

    fn predict(&mut self, _observation: &Observation, _deterministic: bool) -> Action {
        self.predictions += 1;
        Action::Discrete(0)
    }
}

/// `Countdown-v0` (episode lengths from `env_kwargs.lengths`, default `[3, 5, 4]`),
/// `scripted` (rollout length from `n_steps`, default 5) and `failing`
pub fn fixture_registry() -> Registry {
    let mut registry = Registry::new();
    registry
        .register_environment("Countdown-v0", |spec| {
            let lengths = spec
                .env_kwargs
                .as_ref()
                .and_then(|kwargs| kwargs.get("lengths"))
                .and_then(|v| v.as_sequence())
                .map(|seq| seq.iter().filter_map(|v| v.as_u64()).map(|l| l as usize).collect())
                .unwrap_or_else(|| vec![3, 5, 4]);
            Ok(Box::new(CountdownEnv::new(lengths)) as Box<dyn Environment>)
        })
        .register_algorithm("scripted", |spec| {
            let n_steps = spec
                .hyperparams
                .get("n_steps")
                .and_then(|v| v.as_u64())
                .unwrap_or(5);
            Ok(Box::new(ScriptedAlgorithm::new(n_steps as usize)) as Box<dyn Algorithm>)
        })
        .register_algorithm("failing", |_| {
            Ok(Box::new(ScriptedAlgorithm::failing(5)) as Box<dyn Algorithm>)
        });
    registry
}
