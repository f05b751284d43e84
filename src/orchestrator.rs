//! Training session setup and the training loop

use std::path::Path;

use crate::algorithm::{Algorithm, AlgorithmSpec, Transition};
use crate::callback::{Callback, StepContext};
use crate::compare::save_stats;
use crate::config::{
    CatalogEntry, ConfigLoader, Configuration, ExperimentArgs, Hyperparams, VecEnvType,
};
use crate::env::{EnvSpec, VecEnv};
use crate::error::{Error, Result};
use crate::evaluation::{AggregateStats, EvalCallback, EvaluationCheckpoint, reduce};
use crate::registry::Registry;

/// Evaluation results of a callback, or `CallbackType` if it does not collect any
pub fn collect_evaluations(callback: &dyn Callback) -> Result<&[EvaluationCheckpoint]> {
    callback
        .evaluations()
        .ok_or_else(|| Error::CallbackType(callback.name().to_owned()))
}

/// A fully assembled training run
pub struct Session {
    algorithm_name: String,
    env_spec: EnvSpec,
    args: ExperimentArgs,
    hyperparams: Hyperparams,
    budget: u64,
    seed: u64,
    vec_env: VecEnv,
    algorithm: Box<dyn Algorithm>,
}

impl Session {
    pub fn args(&self) -> &ExperimentArgs {
        &self.args
    }

    pub fn hyperparams(&self) -> &Hyperparams {
        &self.hyperparams
    }

    /// Total environment steps to train for
    pub fn budget(&self) -> u64 {
        self.budget
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn n_envs(&self) -> usize {
        self.vec_env.num_envs()
    }

    /// Vector steps the loop will take: the budget rounded up to whole vector steps
    pub fn total_vector_steps(&self) -> u64 {
        self.budget.div_ceil(self.n_envs() as u64)
    }

    /// Run the training loop, delivering every event to `callback`
    pub fn learn(&mut self, callback: &mut dyn Callback) -> Result<()> {
        let n_envs = self.n_envs() as u64;
        let total_steps = self.total_vector_steps();
        let rollout_steps = self.algorithm.rollout_steps().max(1) as u64;

        tracing::info!(
            "Training {} on {} | {} timesteps | {} envs | seed {}",
            self.algorithm_name,
            self.env_spec.name,
            self.budget,
            n_envs,
            self.seed
        );

        let mut observations = self.vec_env.reset(self.seed)?;
        callback.on_training_start(self.budget);

        let mut n_calls = 0u64;
        let mut num_timesteps = 0u64;
        'training: while n_calls < total_steps {
            let steps = rollout_steps.min(total_steps - n_calls);
            for _ in 0..steps {
                let actions = self.algorithm.act(&observations);
                let step = self.vec_env.step(&actions)?;
                n_calls += 1;
                num_timesteps += n_envs;

                self.algorithm.record(Transition {
                    observations: &observations,
                    actions: &actions,
                    rewards: &step.rewards,
                    dones: &step.dones,
                    next_observations: &step.observations,
                });

                let mut ctx = StepContext {
                    num_timesteps,
                    n_calls,
                    rewards: &step.rewards,
                    dones: &step.dones,
                    infos: &step.infos,
                    algorithm: self.algorithm.as_mut(),
                };
                let keep_going = callback.on_step(&mut ctx)?;
                observations = step.observations;

                if !keep_going {
                    tracing::info!(
                        "{} stopped training at timestep {}",
                        callback.name(),
                        num_timesteps
                    );
                    break 'training;
                }
            }
            callback.on_rollout_end();
            self.algorithm.update()?;
        }

        callback.on_training_end();
        tracing::info!("Training complete after {} timesteps", num_timesteps);
        Ok(())
    }
}

/// Builds and runs training sessions from experiment configurations
pub struct TrainingOrchestrator<'r> {
    registry: &'r Registry,
}

impl<'r> TrainingOrchestrator<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Self { registry }
    }

    /// Train `algorithm` on `environment`.
    ///
    /// Without `instrumentation` the run is evaluated every `eval_freq` steps and the
    /// per-checkpoint statistics are returned. With it, the supplied callback receives
    /// all events instead and `None` is returned. A configuration that only asks for
    /// hyperparameter search yields `None` without training.
    pub fn run(
        &self,
        algorithm: &str,
        environment: &str,
        configuration: &Configuration,
        instrumentation: Option<&mut dyn Callback>,
    ) -> Result<Option<AggregateStats>> {
        let Some(mut session) = self.setup(algorithm, environment, configuration)? else {
            return Ok(None);
        };

        if let Some(callback) = instrumentation {
            session.learn(callback)?;
            return Ok(None);
        }

        let mut callback: Box<dyn Callback> = Box::new(self.evaluation_callback(&session)?);
        session.learn(callback.as_mut())?;

        let stats = reduce(collect_evaluations(callback.as_ref())?)?;
        tracing::info!("Collected {} evaluation checkpoints", stats.len());
        Ok(Some(stats))
    }

    /// Retrain a saved run with its own options and hyperparameters, writing the
    /// statistics to `output` when given
    pub fn reproduce(
        &self,
        entry: &CatalogEntry,
        output: Option<&Path>,
    ) -> Result<Option<AggregateStats>> {
        tracing::info!("Reproducing {} on {}", entry.algorithm, entry.environment);
        let stats = self.run(&entry.algorithm, &entry.environment, &entry.experiment(), None)?;
        if let (Some(stats), Some(path)) = (&stats, output) {
            save_stats(stats, path)?;
            tracing::info!("Saved evaluation statistics to {}", path.display());
        }
        Ok(stats)
    }

    /// Assemble a session, or `None` when the configuration defers to hyperparameter search
    pub fn setup(
        &self,
        algorithm: &str,
        environment: &str,
        configuration: &Configuration,
    ) -> Result<Option<Session>> {
        let args = ExperimentArgs::from_configuration(configuration)?;
        if args.optimize_hyperparameters {
            tracing::info!(
                "{} on {} requests hyperparameter search, no training session",
                algorithm,
                environment
            );
            return Ok(None);
        }

        let hyperparams = load_hyperparams(environment, &args)?;
        let budget = args.budget(&hyperparams)?;
        let seed = args.resolve_seed();
        if args.vec_env_type == VecEnvType::Subproc {
            tracing::debug!("subproc vec env requested, stepping environments sequentially");
        }
        if args.evaluation_enabled() && args.n_eval_envs > 1 {
            tracing::warn!(
                "n_eval_envs = {} requested, evaluating on a single held-out environment",
                args.n_eval_envs
            );
        }
        if let Some(callback) = &hyperparams.callback {
            tracing::warn!(
                "Hyperparameters name training callback {:?}, forwarding it to the {} factory",
                callback,
                algorithm
            );
        }

        let env_spec = EnvSpec {
            name: environment.to_owned(),
            normalize: hyperparams.normalize.clone(),
            env_wrapper: hyperparams.env_wrapper.clone(),
            frame_stack: hyperparams.frame_stack.clone(),
            env_kwargs: args.env_kwargs.clone(),
            evaluation: false,
        };
        let envs = (0..hyperparams.n_envs)
            .map(|_| self.registry.make_env(&env_spec))
            .collect::<Result<Vec<_>>>()?;

        let algorithm_spec = AlgorithmSpec {
            algorithm: algorithm.to_owned(),
            env_name: environment.to_owned(),
            n_envs: hyperparams.n_envs,
            seed,
            policy: hyperparams.policy.clone(),
            hyperparams: hyperparams.algorithm_kwargs.clone(),
            callback: hyperparams.callback.clone(),
            trained_agent: args.trained_agent().map(Path::to_path_buf),
            tensorboard_log: args.tensorboard_log().map(Path::to_path_buf),
            verbose: args.verbose,
        };
        let learner = self.registry.make_algorithm(&algorithm_spec)?;

        Ok(Some(Session {
            algorithm_name: algorithm.to_owned(),
            env_spec,
            args,
            hyperparams,
            budget,
            seed,
            vec_env: VecEnv::new(envs),
            algorithm: learner,
        }))
    }

    /// Evaluate every `max(eval_freq / n_envs, 1)` vector steps on a held-out
    /// instance seeded with `seed + n_envs`
    fn evaluation_callback(&self, session: &Session) -> Result<EvalCallback> {
        if !session.args.evaluation_enabled() {
            return Ok(EvalCallback::disabled());
        }
        let n_envs = session.n_envs() as u64;
        let eval_spec = EnvSpec {
            evaluation: true,
            ..session.env_spec.clone()
        };
        let eval_env = self.registry.make_env(&eval_spec)?;
        let period = (session.args.eval_freq as u64 / n_envs).max(1);
        Ok(EvalCallback::new(
            eval_env,
            period,
            session.args.n_eval_episodes as usize,
            session.seed + n_envs,
        ))
    }
}

/// Saved hyperparameters for `environment` with the inline overrides applied.
/// Without a `config` document only the inline overrides are used.
fn load_hyperparams(environment: &str, args: &ExperimentArgs) -> Result<Hyperparams> {
    let overrides = args.hyperparams.as_ref();
    let Some(path) = &args.config else {
        return Hyperparams::with_overrides(&Default::default(), overrides);
    };

    let document = ConfigLoader::for_environment(environment).load(path)?;
    let block = document.section(environment).ok_or_else(|| {
        Error::config(format!(
            "{} has no hyperparameters for {}",
            path.display(),
            environment
        ))
    })?;
    Hyperparams::with_overrides(block, overrides)
}
