pub mod estimator;
pub mod features;
pub mod metrics;
pub mod params;
pub mod samplers;

pub use crate::domain::model::{EnsembleMember, FeatureView, LabelEncoder, PredictionResult};
pub use crate::domain::ports::{BaseClassifier, DataSampler, Storage};
pub use crate::utils::error::Result;
