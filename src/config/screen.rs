//! Decide whether a saved run can be reproduced verbatim

use std::fmt;

use serde_yaml::Value;

use super::catalog::CatalogEntry;
use super::hyperparams::parse_timesteps;

/// Arguments that do not change what gets trained
const IGNORED_ARGS: [&str; 30] = [
    "algo",
    "env",
    "device",
    "pruner",
    "sampler",
    "log_folder",
    "log_interval",
    "n_trials",
    "save_freq",
    "save_replay_buffer",
    "seed",
    "storage",
    "study_name",
    "tensorboard_log",
    "uuid",
    "vec_env",
    "verbose",
    "truncate_last_trajectory",
    "n_jobs",
    "n_evaluations",
    "n_startup_trials",
    "no_optim_plots",
    "wandb_project_name",
    "wandb_entity",
    "wandb_tags",
    "track",
    "optimization_log_path",
    "num_threads",
    "progress",
    "yaml_file",
];

/// Hyperparameters that must be plain numbers; schedules such as `lin_7e-4` are not
const NUMERIC_HYPERPARAMS: [&str; 7] = [
    "learning_rate",
    "ent_coef",
    "vf_coef",
    "gamma",
    "gae_lambda",
    "max_grad_norm",
    "clip_range",
];

#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    TrainedAgent(String),
    HyperparameterSearch,
    TimestepOverride(String),
    InlineHyperparams,
    EnvKwargs,
    GymPackages,
    EnvWrapper,
    UnsupportedPolicy(String),
    TrainingCallback(String),
    ParallelEvaluation(String),
    InvalidValue { name: String, value: String },
    UnknownArgument(String),
    MissingHyperparams,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::TrainedAgent(path) => write!(f, "continues from trained agent {path}"),
            Rejection::HyperparameterSearch => write!(f, "optimizes hyperparameters"),
            Rejection::TimestepOverride(value) => write!(f, "overrides n_timesteps with {value}"),
            Rejection::InlineHyperparams => write!(f, "overrides hyperparameters inline"),
            Rejection::EnvKwargs => write!(f, "passes env_kwargs"),
            Rejection::GymPackages => write!(f, "imports extra gym packages"),
            Rejection::EnvWrapper => write!(f, "wraps the environment"),
            Rejection::UnsupportedPolicy(policy) => write!(f, "uses unsupported policy {policy}"),
            Rejection::TrainingCallback(callback) => write!(f, "adds training callback {callback}"),
            Rejection::ParallelEvaluation(n) => write!(f, "evaluates on {n} environments"),
            Rejection::InvalidValue { name, value } => {
                write!(f, "{name} = {value} is not a number")
            }
            Rejection::UnknownArgument(name) => write!(f, "unknown argument {name}"),
            Rejection::MissingHyperparams => write!(f, "has no hyperparameters for its env"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScreeningPolicy {
    /// Policy architectures the harness can build
    pub policies: Vec<String>,
}

impl Default for ScreeningPolicy {
    fn default() -> Self {
        Self {
            policies: vec!["MlpPolicy".to_owned()],
        }
    }
}

#[derive(Debug, Clone)]
pub struct Screening {
    pub algorithm: String,
    pub environment: String,
    pub rejections: Vec<Rejection>,
}

impl Screening {
    pub fn is_reproducible(&self) -> bool {
        self.rejections.is_empty()
    }
}

impl fmt::Display for Screening {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}: ", self.algorithm, self.environment)?;
        if self.is_reproducible() {
            return write!(f, "reproducible");
        }
        let reasons: Vec<_> = self.rejections.iter().map(ToString::to_string).collect();
        write!(f, "rejected ({})", reasons.join("; "))
    }
}

pub fn screen(entry: &CatalogEntry, policy: &ScreeningPolicy) -> Screening {
    let mut rejections = Vec::new();

    for (key, value) in entry.args.iter() {
        let name = key.as_str().unwrap_or_default();
        if let Some(rejection) = screen_arg(name, value) {
            rejections.push(rejection);
        }
    }

    match entry.hyperparams_block() {
        Some(block) => {
            for (key, value) in block {
                let name = key.as_str().unwrap_or_default();
                if let Some(rejection) = screen_hyperparam(name, value, policy) {
                    rejections.push(rejection);
                }
            }
        }
        None => rejections.push(Rejection::MissingHyperparams),
    }

    tracing::debug!(
        "Screened {}/{}: {} rejections",
        entry.algorithm,
        entry.environment,
        rejections.len()
    );

    Screening {
        algorithm: entry.algorithm.clone(),
        environment: entry.environment.clone(),
        rejections,
    }
}

fn screen_arg(name: &str, value: &Value) -> Option<Rejection> {
    match name {
        "env_kwargs" => (!is_empty(value)).then_some(Rejection::EnvKwargs),
        "gym_packages" => (!is_empty(value)).then_some(Rejection::GymPackages),
        "hyperparams" => (!is_empty(value)).then_some(Rejection::InlineHyperparams),
        "optimize_hyperparameters" => {
            (value.as_bool() != Some(false)).then_some(Rejection::HyperparameterSearch)
        }
        "trained_agent" => (!is_empty(value)).then(|| Rejection::TrainedAgent(render(value))),
        "n_timesteps" => match value.as_i64() {
            Some(-1) => None,
            Some(_) => Some(Rejection::TimestepOverride(render(value))),
            None => Some(invalid(name, value)),
        },
        "n_eval_envs" => match value.as_i64() {
            Some(1) => None,
            Some(_) => Some(Rejection::ParallelEvaluation(render(value))),
            None => Some(invalid(name, value)),
        },
        "eval_episodes" | "eval_freq" => value.as_i64().is_none().then(|| invalid(name, value)),
        _ if IGNORED_ARGS.contains(&name) => None,
        _ => Some(Rejection::UnknownArgument(name.to_owned())),
    }
}

fn screen_hyperparam(name: &str, value: &Value, policy: &ScreeningPolicy) -> Option<Rejection> {
    match name {
        "env_wrapper" => (!value.is_null()).then_some(Rejection::EnvWrapper),
        "callback" => (!value.is_null()).then(|| Rejection::TrainingCallback(render(value))),
        "policy" => {
            let supported = value
                .as_str()
                .is_some_and(|p| policy.policies.iter().any(|allowed| allowed == p));
            (!supported).then(|| Rejection::UnsupportedPolicy(render(value)))
        }
        "n_timesteps" => parse_timesteps(value).is_err().then(|| invalid(name, value)),
        "n_envs" => value
            .as_u64()
            .is_none_or(|n| n == 0)
            .then(|| invalid(name, value)),
        _ if NUMERIC_HYPERPARAMS.contains(&name) => {
            value.as_f64().is_none().then(|| invalid(name, value))
        }
        _ => None,
    }
}

/// `null`, `''`, `[]` and `{}` all mean "not set"
fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Sequence(s) => s.is_empty(),
        Value::Mapping(m) => m.is_empty(),
        _ => false,
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim_end().to_owned())
            .unwrap_or_else(|_| format!("{other:?}")),
    }
}

fn invalid(name: &str, value: &Value) -> Rejection {
    Rejection::InvalidValue {
        name: name.to_owned(),
        value: render(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::catalog::tests::{ACROBOT_ARGS, ACROBOT_CONFIG, write_run};

    fn entry(args: &str, config: &str) -> CatalogEntry {
        let root = tempfile::tempdir().unwrap();
        let run_dir = write_run(root.path(), "a2c", "Acrobot-v1", args, config);
        CatalogEntry::load("a2c", &run_dir).unwrap()
    }

    #[test]
    fn test_plain_run_is_reproducible() {
        let screening = screen(&entry(ACROBOT_ARGS, ACROBOT_CONFIG), &ScreeningPolicy::default());
        assert!(screening.is_reproducible(), "{screening}");
        assert_eq!(screening.to_string(), "a2c/Acrobot-v1: reproducible");
    }

    #[test]
    fn test_every_rejection_is_listed() {
        let args = ACROBOT_ARGS
            .replace("hyperparameters\n    - false", "hyperparameters\n    - true")
            .replace("n_timesteps\n    - -1", "n_timesteps\n    - 20000")
            .replace("gym_packages\n    - []", "gym_packages\n    - [pybullet_envs]")
            + "  - - mystery_flag\n    - 3\n";
        // ent_coef is the first pair, written on the `- - -` line
        let config = ACROBOT_CONFIG
            .replace("MlpPolicy", "CnnPolicy")
            .replace("- - - ent_coef\n    - 0.0", "- - - ent_coef\n    - lin_7e-4");
        assert!(config.contains("lin_7e-4"));

        let screening = screen(&entry(&args, &config), &ScreeningPolicy::default());
        assert!(!screening.is_reproducible());
        assert_eq!(
            screening.rejections,
            vec![
                Rejection::GymPackages,
                Rejection::TimestepOverride("20000".into()),
                Rejection::HyperparameterSearch,
                Rejection::UnknownArgument("mystery_flag".into()),
                Rejection::InvalidValue {
                    name: "ent_coef".into(),
                    value: "lin_7e-4".into()
                },
                Rejection::UnsupportedPolicy("CnnPolicy".into()),
            ]
        );
    }

    #[test]
    fn test_policy_allow_list_is_configurable() {
        let config = ACROBOT_CONFIG.replace("MlpPolicy", "CnnPolicy");
        let policy = ScreeningPolicy {
            policies: vec!["MlpPolicy".into(), "CnnPolicy".into()],
        };
        assert!(screen(&entry(ACROBOT_ARGS, &config), &policy).is_reproducible());
    }

    #[test]
    fn test_env_wrapper_rejected() {
        let wrapper = "sb3_contrib.common.wrappers.TimeFeatureWrapper";
        let config = format!("{ACROBOT_CONFIG}  - - env_wrapper\n    - {wrapper}\n");
        let screening = screen(&entry(ACROBOT_ARGS, &config), &ScreeningPolicy::default());
        assert_eq!(screening.rejections, vec![Rejection::EnvWrapper]);
    }

    #[test]
    fn test_training_callback_rejected() {
        let callback = "rl_zoo3.callbacks.ParallelTrainCallback";
        let config = format!("{ACROBOT_CONFIG}  - - callback\n    - {callback}\n");
        let screening = screen(&entry(ACROBOT_ARGS, &config), &ScreeningPolicy::default());
        assert_eq!(
            screening.rejections,
            vec![Rejection::TrainingCallback(callback.into())]
        );
        assert!(screening.to_string().contains("adds training callback"));

        let config = format!("{ACROBOT_CONFIG}  - - callback\n    - null\n");
        let screening = screen(&entry(ACROBOT_ARGS, &config), &ScreeningPolicy::default());
        assert!(screening.is_reproducible(), "{screening}");
    }

    #[test]
    fn test_parallel_evaluation_rejected() {
        let args = |n: &str| format!("{ACROBOT_ARGS}  - - n_eval_envs\n    - {n}\n");
        let policy = ScreeningPolicy::default();

        assert!(screen(&entry(&args("1"), ACROBOT_CONFIG), &policy).is_reproducible());
        assert_eq!(
            screen(&entry(&args("4"), ACROBOT_CONFIG), &policy).rejections,
            vec![Rejection::ParallelEvaluation("4".into())]
        );
        assert_eq!(
            screen(&entry(&args("many"), ACROBOT_CONFIG), &policy).rejections,
            vec![Rejection::InvalidValue {
                name: "n_eval_envs".into(),
                value: "many".into()
            }]
        );
    }
}
