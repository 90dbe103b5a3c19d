use crate::adapters::context_classifier::ContextClassifier;
use crate::adapters::storage::LocalStorage;
use crate::core::features::FeatureSampler;
use crate::core::metrics::{accuracy_score, log_loss, train_test_split};
use crate::core::params::EnsembleParams;
use crate::core::samplers::{get_data_sampler, make_rng};
use crate::domain::model::{EnsembleMember, LabelEncoder, PredictionResult};
use crate::domain::ports::{BaseClassifier, DataSampler, Storage};
use crate::utils::error::{EnsembleError, Result};
use crate::utils::validation::Validate;
use chrono::{DateTime, Utc};
use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

pub const MODEL_FORMAT_VERSION: u32 = 1;

/// State learned by [`EnsembleTabPfn::fit`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FittedEnsemble {
    pub encoder: LabelEncoder,
    /// Training-split rows; member indices point into these.
    #[serde(with = "crate::domain::model::serde_matrix")]
    pub context_x: Array2<f64>,
    pub context_y: Array1<usize>,
    pub members: Vec<EnsembleMember>,
    pub n_features_in: usize,
    pub best_validation_loss: Option<f64>,
    pub iterations_run: usize,
    pub stopped_early: bool,
    pub trained_at: DateTime<Utc>,
}

impl FittedEnsemble {
    /// Maps predicted class indices back to their labels.
    pub fn decode(&self, preds: &[usize]) -> Result<Vec<String>> {
        preds
            .iter()
            .map(|&i| {
                self.encoder
                    .inverse(i)
                    .map(str::to_string)
                    .ok_or_else(|| EnsembleError::ShapeError {
                        message: format!("predicted class index {} has no label", i),
                    })
            })
            .collect()
    }
}

#[derive(Serialize)]
struct ModelFileRef<'a> {
    format_version: u32,
    base_classifier: &'a str,
    params: &'a EnsembleParams,
    fitted: &'a FittedEnsemble,
}

#[derive(Deserialize)]
struct ModelFile {
    format_version: u32,
    base_classifier: String,
    params: EnsembleParams,
    fitted: FittedEnsemble,
}

/// Runs a small-data in-context classifier on many row/column subsamples of
/// a large table and aggregates the per-subsample predictions.
///
/// Each fit iteration draws up to `n_samples` rows, splits or projects the
/// columns into views of at most `n_features`, and scores the growing
/// ensemble on a held-out split to decide when to stop.
pub struct EnsembleTabPfn<C: BaseClassifier + Clone = ContextClassifier> {
    params: EnsembleParams,
    data_sampler: Box<dyn DataSampler>,
    feature_sampler: FeatureSampler,
    model: C,
    fitted: Option<FittedEnsemble>,
}

impl EnsembleTabPfn<ContextClassifier> {
    pub fn new(params: EnsembleParams) -> Result<Self> {
        let model = ContextClassifier::new(params.n_ensemble_configurations);
        Self::with_classifier(params, model)
    }

    pub fn load_model(path: &str) -> Result<Self> {
        Self::load_model_from(&LocalStorage::default(), path)
    }

    pub fn load_model_from(storage: &dyn Storage, path: &str) -> Result<Self> {
        let file = read_model_file(storage, path)?;
        let model = ContextClassifier::new(file.params.n_ensemble_configurations);
        Self::from_model_file(file, model)
    }
}

impl<C: BaseClassifier + Clone> EnsembleTabPfn<C> {
    pub fn with_classifier(params: EnsembleParams, model: C) -> Result<Self> {
        params.validate()?;

        let limits = model.limits();
        if params.n_samples > limits.max_samples || params.n_features > limits.max_features {
            return Err(EnsembleError::InvalidParameterError {
                field: "n_samples/n_features".to_string(),
                value: format!("{}/{}", params.n_samples, params.n_features),
                reason: format!(
                    "{} accepts at most {} rows and {} features per fit",
                    model.name(),
                    limits.max_samples,
                    limits.max_features
                ),
            });
        }

        Ok(Self {
            data_sampler: get_data_sampler(&params.data_sampler, params.n_samples)?,
            feature_sampler: FeatureSampler::new(params.n_features, params.feature_strategy),
            params,
            model,
            fitted: None,
        })
    }

    pub fn load_model_with(storage: &dyn Storage, path: &str, model: C) -> Result<Self> {
        let file = read_model_file(storage, path)?;
        Self::from_model_file(file, model)
    }

    fn from_model_file(file: ModelFile, model: C) -> Result<Self> {
        if file.base_classifier != model.name() {
            tracing::warn!(
                "Model was trained with base classifier '{}', loading with '{}'",
                file.base_classifier,
                model.name()
            );
        }
        let mut estimator = Self::with_classifier(file.params, model)?;
        estimator.fitted = Some(file.fitted);
        Ok(estimator)
    }

    pub fn params(&self) -> &EnsembleParams {
        &self.params
    }

    pub fn fitted(&self) -> Option<&FittedEnsemble> {
        self.fitted.as_ref()
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    pub fn classes(&self) -> Option<&[String]> {
        self.fitted.as_ref().map(|f| f.encoder.classes())
    }

    /// Draws the ensemble members for `x`/`y`, replacing any previous fit.
    pub fn fit<S: AsRef<str>>(&mut self, x: ArrayView2<f64>, y: &[S]) -> Result<()> {
        check_x_y(x, y.len())?;

        let encoder = LabelEncoder::fit(y);
        let n_classes = encoder.n_classes();
        if n_classes < 2 {
            return Err(EnsembleError::ValidationError {
                message: format!("at least 2 classes are required, got {}", n_classes),
            });
        }
        let max_classes = self.model.limits().max_classes;
        if n_classes > max_classes {
            return Err(EnsembleError::ModelInputError {
                message: format!(
                    "{} supports at most {} classes, got {}",
                    self.model.name(),
                    max_classes,
                    n_classes
                ),
            });
        }
        let y_idx = Array1::from(encoder.transform(y)?);

        tracing::info!(
            "Fitting ensemble on {} rows x {} features, {} classes (sampler: {}, max_iters: {})",
            x.nrows(),
            x.ncols(),
            n_classes,
            self.data_sampler.name(),
            self.params.max_iters
        );

        let mut rng = make_rng(self.params.random_state);
        let (train_idx, val_idx) = train_test_split(x.nrows(), self.params.validation_fraction, &mut rng);
        let x_train = x.select(Axis(0), &train_idx);
        let y_train = y_idx.select(Axis(0), &train_idx);
        let validation = if val_idx.is_empty() {
            None
        } else {
            Some((x.select(Axis(0), &val_idx), val_idx.iter().map(|&i| y_idx[i]).collect::<Vec<_>>()))
        };
        let early_stopping = validation.is_some() && self.params.early_stopping_rounds > 0;

        let mut members = Vec::new();
        let mut best_loss = f64::INFINITY;
        let mut best_len = 0;
        let mut no_improvement = 0;
        let mut iterations_run = 0;
        let mut stopped_early = false;
        let mut val_sum = validation
            .as_ref()
            .map(|(x_val, _)| Array2::<f64>::zeros((x_val.nrows(), n_classes)));
        let mut n_fits = 0usize;

        for epoch in 0..self.params.max_iters {
            iterations_run = epoch + 1;
            let sub = self.data_sampler.sample(x_train.view(), y_train.view(), &mut rng)?;
            let train_parts = self.feature_sampler.sample(sub.x.view(), sub.y.view(), &mut rng)?;

            if let (Some((x_val, y_val)), Some(sum)) = (&validation, val_sum.as_mut()) {
                let val_parts = self.feature_sampler.reduce(x_val.view())?;
                for (train_new, val_new) in train_parts.iter().zip(&val_parts) {
                    self.model.fit(train_new.view(), sub.y.view(), n_classes)?;
                    *sum += &self.model.predict_proba(val_new.view())?;
                    n_fits += 1;
                }

                let mean = &*sum / n_fits as f64;
                let loss = log_loss(y_val, mean.view())?;
                members.push(EnsembleMember {
                    data_indices: sub.indices,
                    views: self.feature_sampler.get_samplers(),
                });

                if loss < best_loss - self.params.tolerance {
                    best_loss = loss;
                    best_len = members.len();
                    no_improvement = 0;
                } else {
                    no_improvement += 1;
                }
                tracing::debug!(
                    "epoch {}: validation log loss {:.5} (best {:.5}, {} without improvement)",
                    epoch,
                    loss,
                    best_loss,
                    no_improvement
                );

                if early_stopping && no_improvement >= self.params.early_stopping_rounds {
                    tracing::info!("Early stopping after {} iterations", iterations_run);
                    stopped_early = true;
                    break;
                }
            } else {
                members.push(EnsembleMember {
                    data_indices: sub.indices,
                    views: self.feature_sampler.get_samplers(),
                });
                tracing::debug!("epoch {}: member drawn without validation", epoch);
            }
        }

        if early_stopping {
            members.truncate(best_len.max(1));
        }

        tracing::info!(
            "✅ Ensemble fitted with {} members after {} iterations",
            members.len(),
            iterations_run
        );

        self.fitted = Some(FittedEnsemble {
            encoder,
            context_x: x_train,
            context_y: y_train,
            members,
            n_features_in: x.ncols(),
            best_validation_loss: best_loss.is_finite().then_some(best_loss),
            iterations_run,
            stopped_early,
            trained_at: Utc::now(),
        });
        Ok(())
    }

    /// Fits the base model on every member's rows and views and collects the
    /// per-fit probabilities for `x`, aggregated with the configured method.
    pub fn predict_result(&self, x: ArrayView2<f64>) -> Result<PredictionResult> {
        let fitted = self.fitted.as_ref().ok_or(EnsembleError::NotFittedError)?;
        if x.ncols() != fitted.n_features_in {
            return Err(EnsembleError::ShapeError {
                message: format!(
                    "x has {} features, but the ensemble was fitted with {}",
                    x.ncols(),
                    fitted.n_features_in
                ),
            });
        }
        if x.nrows() == 0 {
            return Err(EnsembleError::ValidationError {
                message: "cannot predict an empty matrix".to_string(),
            });
        }

        let n_classes = fitted.encoder.n_classes();
        let mut model = self.model.clone();
        let mut sampler = self.feature_sampler.clone();
        let mut result = PredictionResult::new();

        for (m, member) in fitted.members.iter().enumerate() {
            let ctx_x = fitted.context_x.select(Axis(0), &member.data_indices);
            let ctx_y = fitted.context_y.select(Axis(0), &member.data_indices);
            sampler.set_samplers(member.views.clone());
            let train_parts = sampler.reduce(ctx_x.view())?;
            let test_parts = sampler.reduce(x)?;

            for (train_new, test_new) in train_parts.iter().zip(&test_parts) {
                model.fit(train_new.view(), ctx_y.view(), n_classes)?;
                result.push(model.predict_proba(test_new.view())?);
            }
            tracing::debug!("member {}: {} base fits", m, member.views.len());
        }

        result.aggregate(self.params.aggregation)?;
        Ok(result)
    }

    pub fn predict_proba(&self, x: ArrayView2<f64>) -> Result<Array2<f64>> {
        let result = self.predict_result(x)?;
        result.probs.ok_or_else(|| EnsembleError::ValidationError {
            message: "aggregation produced no probabilities".to_string(),
        })
    }

    pub fn predict(&self, x: ArrayView2<f64>) -> Result<Vec<String>> {
        let fitted = self.fitted.as_ref().ok_or(EnsembleError::NotFittedError)?;
        let result = self.predict_result(x)?;
        let preds = result.preds.ok_or_else(|| EnsembleError::ValidationError {
            message: "aggregation produced no class predictions".to_string(),
        })?;
        fitted.decode(&preds.to_vec())
    }

    pub fn score<S: AsRef<str>>(&self, x: ArrayView2<f64>, y: &[S]) -> Result<f64> {
        let preds = self.predict(x)?;
        let truth: Vec<&str> = y.iter().map(|s| s.as_ref()).collect();
        let preds: Vec<&str> = preds.iter().map(String::as_str).collect();
        accuracy_score(&truth, &preds)
    }

    pub fn save_model(&self, path: &str) -> Result<()> {
        self.save_model_to(&LocalStorage::default(), path)
    }

    pub fn save_model_to(&self, storage: &dyn Storage, path: &str) -> Result<()> {
        let fitted = self.fitted.as_ref().ok_or(EnsembleError::NotFittedError)?;
        let file = ModelFileRef {
            format_version: MODEL_FORMAT_VERSION,
            base_classifier: self.model.name(),
            params: &self.params,
            fitted,
        };
        let data = serde_json::to_vec_pretty(&file)?;
        storage.write_file(path, &data)?;
        tracing::info!("Model with {} members saved to {}", fitted.members.len(), path);
        Ok(())
    }
}

fn read_model_file(storage: &dyn Storage, path: &str) -> Result<ModelFile> {
    let data = storage.read_file(path)?;
    let file: ModelFile = serde_json::from_slice(&data)?;
    if file.format_version != MODEL_FORMAT_VERSION {
        return Err(EnsembleError::SerializationError(serde::de::Error::custom(format!(
            "unsupported model format version {} (expected {})",
            file.format_version, MODEL_FORMAT_VERSION
        ))));
    }
    Ok(file)
}

/// Rejects empty or misaligned inputs. NaN marks a missing value and is
/// allowed; infinities are not.
pub fn check_x_y(x: ArrayView2<f64>, n_labels: usize) -> Result<()> {
    if x.nrows() == 0 || x.ncols() == 0 {
        return Err(EnsembleError::ValidationError {
            message: format!("x must be non-empty, got shape {:?}", x.dim()),
        });
    }
    if x.nrows() != n_labels {
        return Err(EnsembleError::ShapeError {
            message: format!("x has {} rows but y has {} labels", x.nrows(), n_labels),
        });
    }
    if x.iter().any(|v| v.is_infinite()) {
        return Err(EnsembleError::ValidationError {
            message: "x contains infinite values".to_string(),
        });
    }
    Ok(())
}
