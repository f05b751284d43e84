//! Experiment options: budget, evaluation schedule, seeding and search toggles

use std::path::{Path, PathBuf};

use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize};
use serde_yaml::Mapping;

use super::hyperparams::Hyperparams;
use super::loader::Configuration;
use crate::error::{Error, Result};

/// Parallel-environment backend. Both backends are stepped sequentially here.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VecEnvType {
    #[default]
    Dummy,
    Subproc,
}

/// Hyperparameter search sampler (only relevant when optimizing)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sampler {
    Random,
    #[default]
    Tpe,
    Skopt,
    Cmaes,
}

/// Hyperparameter search pruner (only relevant when optimizing)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pruner {
    Halving,
    #[default]
    Median,
    #[serde(rename = "none")]
    Disabled,
}

/// Options controlling one reproduction run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentArgs {
    /// Negative means "draw a fresh seed"
    pub seed: i64,
    /// `-1` uses the saved hyperparameter budget
    pub n_timesteps: i64,
    /// Timesteps between evaluations, `-1` disables evaluation
    pub eval_freq: i64,
    #[serde(alias = "eval_episodes")]
    pub n_eval_episodes: i64,
    pub n_eval_envs: i64,
    pub n_evaluations: Option<i64>,
    /// Inline overrides applied on top of the saved hyperparameters
    pub hyperparams: Option<Mapping>,
    pub env_kwargs: Option<Mapping>,
    /// Empty means "train from scratch"
    #[serde(deserialize_with = "null_as_empty")]
    pub trained_agent: String,
    #[serde(alias = "vec_env")]
    pub vec_env_type: VecEnvType,
    pub optimize_hyperparameters: bool,
    pub sampler: Sampler,
    pub pruner: Pruner,
    pub n_trials: i64,
    pub n_jobs: i64,
    pub n_startup_trials: i64,
    pub storage: Option<String>,
    pub study_name: Option<String>,
    /// Empty disables tensorboard logging
    #[serde(deserialize_with = "null_as_empty")]
    pub tensorboard_log: String,
    pub log_interval: i64,
    pub uuid_str: Option<String>,
    pub save_freq: i64,
    pub save_replay_buffer: bool,
    pub truncate_last_trajectory: bool,
    pub verbose: i64,
    /// Saved hyperparameter document
    pub config: Option<PathBuf>,
}

impl Default for ExperimentArgs {
    fn default() -> Self {
        Self {
            seed: -1,
            n_timesteps: -1,
            eval_freq: 25_000,
            n_eval_episodes: 5,
            n_eval_envs: 1,
            n_evaluations: None,
            hyperparams: None,
            env_kwargs: None,
            trained_agent: String::new(),
            vec_env_type: VecEnvType::default(),
            optimize_hyperparameters: false,
            sampler: Sampler::default(),
            pruner: Pruner::default(),
            n_trials: 500,
            n_jobs: 1,
            n_startup_trials: 10,
            storage: None,
            study_name: None,
            tensorboard_log: String::new(),
            log_interval: -1,
            uuid_str: None,
            save_freq: -1,
            save_replay_buffer: false,
            truncate_last_trajectory: true,
            verbose: 1,
            config: None,
        }
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl ExperimentArgs {
    /// Parse and validate the experiment options of a configuration
    pub fn from_configuration(config: &Configuration) -> Result<Self> {
        let args: Self = config.deserialize()?;
        args.validate()?;
        Ok(args)
    }

    pub fn validate(&self) -> Result<()> {
        if self.eval_freq == 0 || self.eval_freq < -1 {
            return Err(Error::config(format!(
                "eval_freq must be positive or -1, got {}",
                self.eval_freq
            )));
        }
        if self.evaluation_enabled() && self.n_eval_episodes < 1 {
            return Err(Error::config(format!(
                "n_eval_episodes must be at least 1 when evaluating, got {}",
                self.n_eval_episodes
            )));
        }
        if self.evaluation_enabled() && self.n_eval_envs < 1 {
            return Err(Error::config(format!(
                "n_eval_envs must be at least 1 when evaluating, got {}",
                self.n_eval_envs
            )));
        }
        if self.n_timesteps == 0 || self.n_timesteps < -1 {
            return Err(Error::config(format!(
                "n_timesteps must be positive or -1, got {}",
                self.n_timesteps
            )));
        }
        if let Some(agent) = self.trained_agent() {
            if self.optimize_hyperparameters {
                return Err(Error::config(
                    "cannot continue training a trained agent while optimizing hyperparameters",
                ));
            }
            if agent.extension().is_none_or(|ext| ext != "zip") || !agent.is_file() {
                return Err(Error::config(format!(
                    "trained_agent must be an existing .zip file, got {}",
                    agent.display()
                )));
            }
        }
        Ok(())
    }

    pub fn evaluation_enabled(&self) -> bool {
        self.eval_freq > 0
    }

    pub fn trained_agent(&self) -> Option<&Path> {
        (!self.trained_agent.is_empty()).then(|| Path::new(&self.trained_agent))
    }

    pub fn tensorboard_log(&self) -> Option<&Path> {
        (!self.tensorboard_log.is_empty()).then(|| Path::new(&self.tensorboard_log))
    }

    /// The configured seed, or a freshly drawn one when negative
    pub fn resolve_seed(&self) -> u64 {
        if self.seed >= 0 {
            return self.seed as u64;
        }
        let seed = u64::from(rand::rng().random::<u32>());
        tracing::info!("Seed: {}", seed);
        seed
    }

    /// Timestep budget: an explicit `n_timesteps` wins over the saved one
    pub fn budget(&self, hyperparams: &Hyperparams) -> Result<u64> {
        if self.n_timesteps > 0 {
            return Ok(self.n_timesteps as u64);
        }
        hyperparams.n_timesteps.ok_or_else(|| {
            Error::config("no timestep budget: n_timesteps is -1 and the hyperparameters set none")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigLoader;

    const MANAGER_ARGS: &str = "\
env_kwargs: null
n_eval_episodes: 10
eval_freq: 10000
hyperparams: null
log_interval: -1
n_evaluations: 20
n_jobs: 1
n_startup_trials: 10
n_timesteps: -1
n_trials: 10
optimize_hyperparameters: false
pruner: median
sampler: tpe
save_freq: -1
save_replay_buffer: false
seed: 951484142
storage: null
study_name: null
tensorboard_log: ''
trained_agent: ''
truncate_last_trajectory: true
uuid_str: 5627250e-c0e6-428c-b5ce-ea9204617cda
vec_env_type: dummy
verbose: 1
config: /tmp/config.yml
";

    fn args(yaml: &str) -> Result<ExperimentArgs> {
        ExperimentArgs::from_configuration(&ConfigLoader::new().load_str(yaml).unwrap())
    }

    #[test]
    fn test_manager_args_parse() {
        let args = args(MANAGER_ARGS).unwrap();
        assert_eq!(args.seed, 951484142);
        assert_eq!(args.eval_freq, 10_000);
        assert_eq!(args.n_eval_episodes, 10);
        assert_eq!(args.n_evaluations, Some(20));
        assert_eq!(args.vec_env_type, VecEnvType::Dummy);
        assert_eq!(args.pruner, Pruner::Median);
        assert_eq!(args.sampler, Sampler::Tpe);
        assert!(args.trained_agent().is_none());
        assert!(args.tensorboard_log().is_none());
        assert_eq!(args.config.as_deref(), Some(Path::new("/tmp/config.yml")));
        assert_eq!(args.resolve_seed(), 951484142);
    }

    #[test]
    fn test_saved_arg_names_are_aliases() {
        let args = args("eval_episodes: 7\nvec_env: subproc\npruner: none\n").unwrap();
        assert_eq!(args.n_eval_episodes, 7);
        assert_eq!(args.vec_env_type, VecEnvType::Subproc);
        assert_eq!(args.pruner, Pruner::Disabled);
    }

    #[test]
    fn test_defaults_and_null_strings() {
        let args = args("tensorboard_log: null\ntrained_agent: null\n").unwrap();
        assert_eq!(args, ExperimentArgs::default());
    }

    #[test]
    fn test_inconsistent_options_rejected() {
        for doc in [
            "eval_freq: 0\n",
            "eval_freq: -7\n",
            "n_eval_episodes: 0\n",
            "n_eval_envs: 0\n",
            "n_timesteps: 0\n",
            "n_timesteps: -3\n",
            "sampler: grid\n",
            "vec_env_type: threads\n",
            "seed: lots\n",
            "trained_agent: /does/not/exist.zip\n",
            "trained_agent: agent.pkl\n",
        ] {
            assert!(
                matches!(args(doc), Err(Error::Configuration(_))),
                "accepted {doc:?}"
            );
        }
    }

    #[test]
    fn test_eval_episodes_ignored_when_evaluation_disabled() {
        assert!(args("eval_freq: -1\nn_eval_episodes: 0\n").is_ok());
        assert!(args("eval_freq: -1\nn_eval_envs: 0\n").is_ok());
    }

    #[test]
    fn test_trained_agent_conflicts_with_optimization() {
        let dir = tempfile::tempdir().unwrap();
        let agent = dir.path().join("a2c.zip");
        std::fs::write(&agent, b"").unwrap();

        let resume = format!("trained_agent: {}\n", agent.display());
        assert!(args(&resume).is_ok());

        let conflicting = format!("{resume}optimize_hyperparameters: true\n");
        assert!(matches!(args(&conflicting), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_budget_resolution() {
        let saved = Hyperparams {
            n_timesteps: Some(500_000),
            ..Hyperparams::default()
        };
        let default_args = ExperimentArgs::default();
        assert_eq!(default_args.budget(&saved).unwrap(), 500_000);

        let explicit = ExperimentArgs {
            n_timesteps: 2_000,
            ..ExperimentArgs::default()
        };
        assert_eq!(explicit.budget(&saved).unwrap(), 2_000);

        assert!(matches!(
            default_args.budget(&Hyperparams::default()),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_negative_seed_draws_fresh_seed() {
        let seed = ExperimentArgs::default().resolve_seed();
        assert!(seed <= u64::from(u32::MAX));
    }
}
