pub mod catalog;
pub mod experiment;
pub mod hyperparams;
pub mod loader;
pub mod screen;

pub use catalog::{Catalog, CatalogEntry};
pub use experiment::{ExperimentArgs, Pruner, Sampler, VecEnvType};
pub use hyperparams::Hyperparams;
pub use loader::{
    ConfigLoader, Configuration, LEGACY_ORDERED_DICT_TAG, LegacyTagRule, register_legacy_tags,
};
pub use screen::{Rejection, Screening, ScreeningPolicy, screen};
