//! Discovery of saved trained-agent runs
//!
//! Expected layout: `<root>/<algo>/<run>/<env>/{args.yml, config.yml}`, where `args.yml`
//! holds the command-line options of the original run and `config.yml` its
//! hyperparameters, both written with the legacy ordered-dict tag.

use std::fs;
use std::path::{Path, PathBuf};

use serde_yaml::{Mapping, Value};

use super::loader::{ConfigLoader, Configuration};
use crate::error::{Error, Result};

/// Arguments describing where/how the original run was logged, not how it trained
const BOOKKEEPING_ARGS: [&str; 7] = [
    "log_folder",
    "gym_packages",
    "algo",
    "env",
    "num_threads",
    "uuid",
    "save_replay_buffer",
];

/// One saved run
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub algorithm: String,
    pub environment: String,
    pub run_dir: PathBuf,
    pub args_path: PathBuf,
    pub config_path: PathBuf,
    /// Saved options, in the order they were written
    pub args: Configuration,
    /// `{environment: hyperparameters}`
    pub hyperparams: Configuration,
}

impl CatalogEntry {
    /// Load a run from the directory holding its `args.yml` and `config.yml`
    pub fn load(algorithm: &str, run_dir: &Path) -> Result<Self> {
        let args_path = run_dir.join("args.yml");
        let config_path = run_dir.join("config.yml");

        let args = ConfigLoader::new().register_legacy_tags().load(&args_path)?;
        let environment = args
            .get("env")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                Error::config(format!("{} does not name an env", args_path.display()))
            })?
            .to_owned();
        let hyperparams = ConfigLoader::for_environment(environment.as_str()).load(&config_path)?;
        let config_path = fs::canonicalize(&config_path).map_err(|source| Error::Io {
            path: config_path.clone(),
            source,
        })?;

        Ok(Self {
            algorithm: algorithm.to_owned(),
            environment,
            run_dir: run_dir.to_path_buf(),
            args_path,
            config_path,
            args,
            hyperparams,
        })
    }

    pub fn hyperparams_block(&self) -> Option<&Mapping> {
        self.hyperparams.section(&self.environment)
    }

    /// Options for reproducing this run with the orchestrator
    pub fn experiment(&self) -> Configuration {
        let mut experiment = Configuration::new();
        for (key, value) in self.args.iter() {
            let Some(name) = key.as_str() else {
                continue;
            };
            if BOOKKEEPING_ARGS.contains(&name) {
                continue;
            }
            let name = match name {
                "eval_episodes" => "n_eval_episodes",
                "vec_env" => "vec_env_type",
                other => other,
            };
            experiment.insert(name, value.clone());
        }
        experiment.insert(
            "config",
            Value::String(self.config_path.to_string_lossy().into_owned()),
        );
        experiment
    }
}

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    pub entries: Vec<CatalogEntry>,
}

impl Catalog {
    pub fn discover(root: &Path, algorithms: &[&str]) -> Result<Self> {
        let mut entries = Vec::new();

        for &algorithm in algorithms {
            let algorithm_dir = root.join(algorithm);
            if !algorithm_dir.is_dir() {
                tracing::warn!("No saved runs for {} in {}", algorithm, root.display());
                continue;
            }

            for run in subdirectories(&algorithm_dir)? {
                let Some(run_dir) = subdirectories(&run)?.into_iter().next() else {
                    tracing::warn!("Skipping {}: no environment directory", run.display());
                    continue;
                };
                let complete = ["args.yml", "config.yml"]
                    .iter()
                    .all(|name| run_dir.join(name).is_file());
                if !complete {
                    tracing::warn!(
                        "Skipping {}: missing args.yml or config.yml",
                        run_dir.display()
                    );
                    continue;
                }
                entries.push(CatalogEntry::load(algorithm, &run_dir)?);
            }
        }

        tracing::info!("Discovered {} saved runs in {}", entries.len(), root.display());
        Ok(Self { entries })
    }

    /// Discover runs for every algorithm directory under `root`
    pub fn discover_all(root: &Path) -> Result<Self> {
        let algorithms: Vec<String> = subdirectories(root)?
            .iter()
            .filter_map(|dir| dir.file_name()?.to_str().map(str::to_owned))
            .collect();
        let algorithms: Vec<&str> = algorithms.iter().map(String::as_str).collect();
        Self::discover(root, &algorithms)
    }

    pub fn find(&self, algorithm: &str, environment: &str) -> Option<&CatalogEntry> {
        self.entries
            .iter()
            .find(|e| e.algorithm == algorithm && e.environment == environment)
    }

    pub fn for_algorithm<'a>(
        &'a self,
        algorithm: &'a str,
    ) -> impl Iterator<Item = &'a CatalogEntry> {
        self.entries.iter().filter(move |e| e.algorithm == algorithm)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn subdirectories(dir: &Path) -> Result<Vec<PathBuf>> {
    let io_error = |source| Error::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut dirs = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_error)? {
        let path = entry.map_err(io_error)?.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const ACROBOT_ARGS: &str = "\
!!python/object/apply:collections.OrderedDict
- - - algo
    - a2c
  - - env
    - Acrobot-v1
  - - env_kwargs
    - null
  - - eval_episodes
    - 10
  - - eval_freq
    - 10000
  - - gym_packages
    - []
  - - hyperparams
    - null
  - - log_folder
    - rl-trained-agents/
  - - n_timesteps
    - -1
  - - optimize_hyperparameters
    - false
  - - seed
    - 951484142
  - - trained_agent
    - ''
  - - vec_env
    - dummy
";

    pub(crate) const ACROBOT_CONFIG: &str = "\
!!python/object/apply:collections.OrderedDict
- - - ent_coef
    - 0.0
  - - n_envs
    - 16
  - - n_timesteps
    - 500000.0
  - - normalize
    - true
  - - policy
    - MlpPolicy
";

    pub(crate) fn write_run(
        root: &Path,
        algorithm: &str,
        env: &str,
        args: &str,
        config: &str,
    ) -> PathBuf {
        let run_dir = root.join(algorithm).join(format!("{env}_1")).join(env);
        fs::create_dir_all(&run_dir).unwrap();
        fs::write(run_dir.join("args.yml"), args).unwrap();
        fs::write(run_dir.join("config.yml"), config).unwrap();
        run_dir
    }

    #[test]
    fn test_discover_loads_saved_runs() {
        let root = tempfile::tempdir().unwrap();
        write_run(root.path(), "a2c", "Acrobot-v1", ACROBOT_ARGS, ACROBOT_CONFIG);
        write_run(
            root.path(),
            "ppo",
            "CartPole-v1",
            &ACROBOT_ARGS.replace("Acrobot-v1", "CartPole-v1"),
            ACROBOT_CONFIG,
        );
        fs::create_dir_all(root.path().join("a2c").join("Broken-v0_1")).unwrap();

        let catalog = Catalog::discover(root.path(), &["a2c", "ppo", "sac"]).unwrap();
        assert_eq!(catalog.len(), 2);

        let entry = catalog.find("a2c", "Acrobot-v1").unwrap();
        assert_eq!(entry.args.keys().next(), Some("algo"));
        let block = entry.hyperparams_block().unwrap();
        assert_eq!(block.get("n_envs").and_then(Value::as_u64), Some(16));

        assert_eq!(catalog.for_algorithm("ppo").count(), 1);
        assert!(catalog.find("ppo", "Acrobot-v1").is_none());

        let all = Catalog::discover_all(root.path()).unwrap();
        let algorithms: Vec<_> = all.entries.iter().map(|e| e.algorithm.as_str()).collect();
        assert_eq!(algorithms, vec!["a2c", "ppo"]);
    }

    #[test]
    fn test_experiment_renames_and_drops_bookkeeping() {
        let root = tempfile::tempdir().unwrap();
        let run_dir = write_run(root.path(), "a2c", "Acrobot-v1", ACROBOT_ARGS, ACROBOT_CONFIG);
        let entry = CatalogEntry::load("a2c", &run_dir).unwrap();

        let experiment = entry.experiment();
        let keys: Vec<_> = experiment.keys().collect();
        assert_eq!(
            keys,
            vec![
                "env_kwargs",
                "n_eval_episodes",
                "eval_freq",
                "hyperparams",
                "n_timesteps",
                "optimize_hyperparameters",
                "seed",
                "trained_agent",
                "vec_env_type",
                "config",
            ]
        );
        let config = experiment.get("config").and_then(Value::as_str).unwrap();
        assert!(config.ends_with("config.yml"));
    }

    #[test]
    fn test_missing_env_arg_is_an_error() {
        let root = tempfile::tempdir().unwrap();
        let args = "\
!!python/object/apply:collections.OrderedDict
- - - algo
    - a2c
";
        let run_dir = write_run(root.path(), "a2c", "Acrobot-v1", args, ACROBOT_CONFIG);
        assert!(matches!(
            CatalogEntry::load("a2c", &run_dir),
            Err(Error::Configuration(_))
        ));
    }
}
