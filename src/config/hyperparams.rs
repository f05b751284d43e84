//! Typed view over one environment's hyperparameter block

use serde_yaml::{Mapping, Value};

use crate::error::{Error, Result};

/// Keys the harness consumes itself are split out; everything else goes to the
/// algorithm factory
#[derive(Debug, Clone, PartialEq)]
pub struct Hyperparams {
    /// Number of parallel training environments
    pub n_envs: usize,
    /// Saved timestep budget
    pub n_timesteps: Option<u64>,
    /// Policy architecture name, e.g. `MlpPolicy`
    pub policy: Option<String>,
    /// Observation/reward normalization settings (bool or keyword string)
    pub normalize: Option<Value>,
    pub env_wrapper: Option<Value>,
    pub frame_stack: Option<Value>,
    pub callback: Option<Value>,
    /// Remaining entries in document order
    pub algorithm_kwargs: Mapping,
}

impl Default for Hyperparams {
    fn default() -> Self {
        Self {
            n_envs: 1,
            n_timesteps: None,
            policy: None,
            normalize: None,
            env_wrapper: None,
            frame_stack: None,
            callback: None,
            algorithm_kwargs: Mapping::new(),
        }
    }
}

impl Hyperparams {
    pub fn from_mapping(block: &Mapping) -> Result<Self> {
        let mut params = Self::default();

        for (key, value) in block {
            let Some(name) = key.as_str() else {
                return Err(Error::config(format!(
                    "hyperparameter names must be strings, found {key:?}"
                )));
            };
            match name {
                "n_envs" => params.n_envs = parse_n_envs(value)?,
                "n_timesteps" => params.n_timesteps = Some(parse_timesteps(value)?),
                "policy" => {
                    let policy = value.as_str().ok_or_else(|| {
                        Error::config(format!("policy must be a string, found {value:?}"))
                    })?;
                    params.policy = Some(policy.to_owned());
                }
                "normalize" => params.normalize = non_null(value),
                "env_wrapper" => params.env_wrapper = non_null(value),
                "frame_stack" => params.frame_stack = non_null(value),
                "callback" => params.callback = non_null(value),
                _ => {
                    params.algorithm_kwargs.insert(key.clone(), value.clone());
                }
            }
        }

        Ok(params)
    }

    /// Build from a saved block with inline overrides applied on top.
    ///
    /// Overridden keys keep their saved position; new keys are appended.
    pub fn with_overrides(block: &Mapping, overrides: Option<&Mapping>) -> Result<Self> {
        let Some(overrides) = overrides else {
            return Self::from_mapping(block);
        };
        let mut merged = block.clone();
        for (key, value) in overrides {
            merged.insert(key.clone(), value.clone());
        }
        Self::from_mapping(&merged)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.algorithm_kwargs.get(key)
    }
}

fn non_null(value: &Value) -> Option<Value> {
    (!value.is_null()).then(|| value.clone())
}

fn parse_n_envs(value: &Value) -> Result<usize> {
    match value.as_u64() {
        Some(n) if n > 0 => Ok(n as usize),
        _ => Err(Error::config(format!(
            "n_envs must be a positive integer, found {value:?}"
        ))),
    }
}

/// Saved budgets are frequently floats (`1e6`, `500000.0`); they are truncated
pub(crate) fn parse_timesteps(value: &Value) -> Result<u64> {
    let timesteps = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match timesteps {
        Some(t) if t.is_finite() && t >= 1.0 => Ok(t as u64),
        _ => Err(Error::config(format!(
            "n_timesteps must be a positive number, found {value:?}"
        ))),
    }
}
