//! Name → factory tables for environments and algorithms

use std::collections::BTreeMap;

use crate::algorithm::{Algorithm, AlgorithmSpec};
use crate::env::{EnvSpec, Environment};
use crate::error::{Error, Result};

type EnvFactory = Box<dyn Fn(&EnvSpec) -> anyhow::Result<Box<dyn Environment>>>;
type AlgorithmFactory = Box<dyn Fn(&AlgorithmSpec) -> anyhow::Result<Box<dyn Algorithm>>>;

#[derive(Default)]
pub struct Registry {
    environments: BTreeMap<String, EnvFactory>,
    algorithms: BTreeMap<String, AlgorithmFactory>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an environment factory; a later registration under the same name wins
    pub fn register_environment<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&EnvSpec) -> anyhow::Result<Box<dyn Environment>> + 'static,
    {
        self.environments.insert(name.into(), Box::new(factory));
        self
    }

    pub fn register_algorithm<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&AlgorithmSpec) -> anyhow::Result<Box<dyn Algorithm>> + 'static,
    {
        self.algorithms.insert(name.into(), Box::new(factory));
        self
    }

    pub fn has_environment(&self, name: &str) -> bool {
        self.environments.contains_key(name)
    }

    pub fn has_algorithm(&self, name: &str) -> bool {
        self.algorithms.contains_key(name)
    }

    pub fn environments(&self) -> impl Iterator<Item = &str> {
        self.environments.keys().map(String::as_str)
    }

    pub fn algorithms(&self) -> impl Iterator<Item = &str> {
        self.algorithms.keys().map(String::as_str)
    }

    pub fn make_env(&self, spec: &EnvSpec) -> Result<Box<dyn Environment>> {
        let factory = self
            .environments
            .get(&spec.name)
            .ok_or_else(|| Error::Unregistered {
                kind: "environment",
                name: spec.name.clone(),
            })?;
        Ok(factory(spec)?)
    }

    pub fn make_algorithm(&self, spec: &AlgorithmSpec) -> Result<Box<dyn Algorithm>> {
        let factory = self
            .algorithms
            .get(&spec.algorithm)
            .ok_or_else(|| Error::Unregistered {
                kind: "algorithm",
                name: spec.algorithm.clone(),
            })?;
        Ok(factory(spec)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixture_registry;

    #[test]
    fn test_lookup_by_name() {
        let registry = fixture_registry();
        assert!(registry.has_environment("Countdown-v0"));
        assert!(registry.has_algorithm("scripted"));
        assert_eq!(registry.algorithms().collect::<Vec<_>>(), vec!["failing", "scripted"]);

        let spec = EnvSpec {
            name: "Countdown-v0".into(),
            ..EnvSpec::default()
        };
        assert!(registry.make_env(&spec).is_ok());
    }

    #[test]
    fn test_unknown_name() {
        let registry = fixture_registry();
        let spec = EnvSpec {
            name: "Pong-v5".into(),
            ..EnvSpec::default()
        };
        match registry.make_env(&spec) {
            Err(Error::Unregistered { kind, name }) => {
                assert_eq!(kind, "environment");
                assert_eq!(name, "Pong-v5");
            }
            other => panic!("unexpected result: {:?}", other.err()),
        }
    }

    #[test]
    fn test_factory_error_passes_through() {
        let mut registry = Registry::new();
        registry.register_environment("Broken-v0", |_| anyhow::bail!("simulator missing"));
        let spec = EnvSpec {
            name: "Broken-v0".into(),
            ..EnvSpec::default()
        };
        match registry.make_env(&spec) {
            Err(Error::External(e)) => assert_eq!(e.to_string(), "simulator missing"),
            other => panic!("unexpected result: {:?}", other.err()),
        }
    }
}
