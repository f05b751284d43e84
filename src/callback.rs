use crate::algorithm::Algorithm;
use crate::env::StepInfo;
use crate::error::Result;
use crate::evaluation::EvaluationCheckpoint;

/// What a callback sees after each vector step
pub struct StepContext<'a> {
    /// Environment steps taken so far, across all environments
    pub num_timesteps: u64,
    /// Vector steps taken so far (1-based count of `on_step` calls)
    pub n_calls: u64,
    pub rewards: &'a [f64],
    pub dones: &'a [bool],
    /// One record per environment, in environment index order
    pub infos: &'a [StepInfo],
    pub algorithm: &'a mut dyn Algorithm,
}

/// Instrumentation invoked at named points of the training loop.
///
/// Events are delivered in order on the training thread.
pub trait Callback {
    fn name(&self) -> &str;

    /// Called once before the first step
    fn on_training_start(&mut self, _total_timesteps: u64) {}

    /// Called after every vector step. Returning `false` stops training.
    fn on_step(&mut self, ctx: &mut StepContext<'_>) -> Result<bool>;

    /// Called once per completed rollout, before the policy update
    fn on_rollout_end(&mut self);

    /// Called once after the loop, also when stopped early
    fn on_training_end(&mut self) {}

    /// Evaluation results, for callbacks that collect them
    fn evaluations(&self) -> Option<&[EvaluationCheckpoint]> {
        None
    }
}
