//! Ensembles of small-data in-context classifiers (TabPFN-style) over row and
//! column subsamples, so that tables larger than the model's context can be
//! classified.

pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;
pub use config::EnsembleConfig;

pub use adapters::{context_classifier::ContextClassifier, storage::LocalStorage};
pub use crate::core::{
    estimator::{EnsembleTabPfn, FittedEnsemble},
    features::{FeatureSampler, FeatureStrategy},
    params::EnsembleParams,
    samplers::get_data_sampler,
};
pub use domain::constants::TabPfnConstants;
pub use domain::model::AggregationMethod;
pub use utils::error::{EnsembleError, Result};
