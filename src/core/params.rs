use crate::core::features::FeatureStrategy;
use crate::core::samplers::SAMPLER_NAMES;
use crate::domain::constants::TabPfnConstants;
use crate::domain::model::AggregationMethod;
use crate::utils::error::{EnsembleError, Result};
use crate::utils::validation::{validate_positive_number, validate_range, Validate};
use serde::{Deserialize, Serialize};

/// Hyper-parameters of [`EnsembleTabPfn`](crate::EnsembleTabPfn).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsembleParams {
    /// Subsampling iterations; each one becomes an ensemble member.
    pub max_iters: usize,
    pub data_sampler: String,
    /// Rows per member, at most `TabPfnConstants::MAX_INP_SIZE`.
    pub n_samples: usize,
    /// Columns per base fit, at most `TabPfnConstants::MAX_FEAT_SIZE`.
    pub n_features: usize,
    pub feature_strategy: FeatureStrategy,
    pub random_state: Option<u64>,
    /// Iterations without validation improvement before stopping; 0 disables.
    pub early_stopping_rounds: usize,
    pub tolerance: f64,
    pub n_ensemble_configurations: usize,
    pub validation_fraction: f64,
    pub aggregation: AggregationMethod,
}

impl Default for EnsembleParams {
    fn default() -> Self {
        Self {
            max_iters: 100,
            data_sampler: "bootstrap".to_string(),
            n_samples: TabPfnConstants::MAX_INP_SIZE,
            n_features: TabPfnConstants::MAX_FEAT_SIZE,
            feature_strategy: FeatureStrategy::Subset,
            random_state: None,
            early_stopping_rounds: 5,
            tolerance: 1e-4,
            n_ensemble_configurations: 4,
            validation_fraction: 0.2,
            aggregation: AggregationMethod::Mean,
        }
    }
}

impl Validate for EnsembleParams {
    fn validate(&self) -> Result<()> {
        validate_positive_number("max_iters", self.max_iters, 1)?;

        if !SAMPLER_NAMES.contains(&self.data_sampler.as_str()) {
            return Err(EnsembleError::UnknownSamplerError(self.data_sampler.clone()));
        }

        if self.n_samples > TabPfnConstants::MAX_INP_SIZE {
            return Err(EnsembleError::InvalidParameterError {
                field: "n_samples".to_string(),
                value: self.n_samples.to_string(),
                reason: format!(
                    "n_samples must be less than or equal to {}",
                    TabPfnConstants::MAX_INP_SIZE
                ),
            });
        }
        validate_positive_number("n_samples", self.n_samples, 1)?;

        if self.n_features > TabPfnConstants::MAX_FEAT_SIZE {
            return Err(EnsembleError::InvalidParameterError {
                field: "n_features".to_string(),
                value: self.n_features.to_string(),
                reason: format!(
                    "n_features must be less than or equal to {}",
                    TabPfnConstants::MAX_FEAT_SIZE
                ),
            });
        }
        validate_positive_number("n_features", self.n_features, 1)?;

        validate_range("tolerance", self.tolerance, 0.0, f64::MAX)?;
        validate_positive_number("n_ensemble_configurations", self.n_ensemble_configurations, 1)?;

        if !(0.0..1.0).contains(&self.validation_fraction) {
            return Err(EnsembleError::InvalidParameterError {
                field: "validation_fraction".to_string(),
                value: self.validation_fraction.to_string(),
                reason: "Value must be in [0, 1)".to_string(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let params = EnsembleParams::default();
        assert!(params.validate().is_ok());
        assert_eq!(params.n_samples, 1000);
        assert_eq!(params.n_features, 100);
    }

    #[test]
    fn test_limits_are_enforced() {
        let params = EnsembleParams {
            n_samples: 1001,
            ..Default::default()
        };
        let err = params.validate().unwrap_err();
        assert!(err.to_string().contains("less than or equal to 1000"));

        let params = EnsembleParams {
            n_features: 101,
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_other_invalid_values() {
        let cases = [
            EnsembleParams { max_iters: 0, ..Default::default() },
            EnsembleParams { data_sampler: "jackknife".into(), ..Default::default() },
            EnsembleParams { tolerance: -1.0, ..Default::default() },
            EnsembleParams { tolerance: f64::NAN, ..Default::default() },
            EnsembleParams { n_ensemble_configurations: 0, ..Default::default() },
            EnsembleParams { validation_fraction: 1.0, ..Default::default() },
            EnsembleParams { n_samples: 0, ..Default::default() },
        ];
        for params in cases {
            assert!(params.validate().is_err(), "{:?} should be rejected", params);
        }
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let params: EnsembleParams = toml::from_str("max_iters = 7\ndata_sampler = \"stratified\"").unwrap();
        assert_eq!(params.max_iters, 7);
        assert_eq!(params.data_sampler, "stratified");
        assert_eq!(params.early_stopping_rounds, 5);
    }
}
