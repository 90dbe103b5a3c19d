use crate::utils::error::{EnsembleError, Result};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Features plus string labels, as read from a CSV file.
#[derive(Debug, Clone)]
pub struct LabeledDataset {
    pub feature_names: Vec<String>,
    pub target_name: String,
    pub features: Array2<f64>,
    pub labels: Vec<String>,
}

/// Maps class labels to dense indices `0..k`, in sorted label order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LabelEncoder {
    classes: Vec<String>,
}

impl LabelEncoder {
    pub fn fit<S: AsRef<str>>(labels: &[S]) -> Self {
        let classes: BTreeSet<&str> = labels.iter().map(|l| l.as_ref()).collect();
        Self {
            classes: classes.into_iter().map(str::to_string).collect(),
        }
    }

    pub fn transform<S: AsRef<str>>(&self, labels: &[S]) -> Result<Vec<usize>> {
        labels
            .iter()
            .map(|label| {
                let label = label.as_ref();
                self.classes
                    .binary_search_by(|c| c.as_str().cmp(label))
                    .map_err(|_| EnsembleError::ValidationError {
                        message: format!("label '{}' was not seen during fit", label),
                    })
            })
            .collect()
    }

    pub fn inverse(&self, index: usize) -> Option<&str> {
        self.classes.get(index).map(String::as_str)
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn n_classes(&self) -> usize {
        self.classes.len()
    }
}

/// What a base classifier accepts in a single fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelLimits {
    pub max_samples: usize,
    pub max_features: usize,
    pub max_classes: usize,
}

/// How one base fit sees the feature space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeatureView {
    Identity { n_features: usize },
    Subset { columns: Vec<usize> },
    /// `n_features_in x k` weights; non-finite inputs contribute nothing.
    Projection { weights: Array2<f64> },
}

impl FeatureView {
    pub fn output_width(&self) -> usize {
        match self {
            FeatureView::Identity { n_features } => *n_features,
            FeatureView::Subset { columns } => columns.len(),
            FeatureView::Projection { weights } => weights.ncols(),
        }
    }

    pub fn apply(&self, x: ArrayView2<f64>) -> Result<Array2<f64>> {
        match self {
            FeatureView::Identity { n_features } => {
                if x.ncols() != *n_features {
                    return Err(width_mismatch(*n_features, x.ncols()));
                }
                Ok(x.to_owned())
            }
            FeatureView::Subset { columns } => {
                if let Some(&max) = columns.iter().max() {
                    if max >= x.ncols() {
                        return Err(EnsembleError::ShapeError {
                            message: format!(
                                "feature view selects column {} but input has {} columns",
                                max,
                                x.ncols()
                            ),
                        });
                    }
                }
                Ok(x.select(Axis(1), columns))
            }
            FeatureView::Projection { weights } => {
                if x.ncols() != weights.nrows() {
                    return Err(width_mismatch(weights.nrows(), x.ncols()));
                }
                let finite = x.mapv(|v| if v.is_finite() { v } else { 0.0 });
                Ok(finite.dot(weights))
            }
        }
    }
}

fn width_mismatch(expected: usize, got: usize) -> EnsembleError {
    EnsembleError::ShapeError {
        message: format!("expected {} feature columns, got {}", expected, got),
    }
}

/// One subsampling iteration: rows of the context pool and the feature views
/// fitted on them. Each view is one base-model fit at prediction time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleMember {
    pub data_indices: Vec<usize>,
    pub views: Vec<FeatureView>,
}

/// Rows drawn by a data sampler, in draw order.
#[derive(Debug, Clone)]
pub struct Subsample {
    pub x: Array2<f64>,
    pub y: Array1<usize>,
    pub indices: Vec<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum AggregationMethod {
    /// Average the predicted probabilities.
    #[default]
    Mean,
    /// Share of base fits voting for each class.
    Vote,
}

impl std::str::FromStr for AggregationMethod {
    type Err = EnsembleError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "mean" => Ok(AggregationMethod::Mean),
            "vote" => Ok(AggregationMethod::Vote),
            other => Err(EnsembleError::InvalidParameterError {
                field: "aggregation".to_string(),
                value: other.to_string(),
                reason: "expected mean or vote".to_string(),
            }),
        }
    }
}

/// Raw per-fit predictions and their aggregate.
#[derive(Debug, Clone, Default)]
pub struct PredictionResult {
    pub raw_preds: Vec<Array2<f64>>,
    pub probs: Option<Array2<f64>>,
    pub preds: Option<Array1<usize>>,
}

impl PredictionResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, raw: Array2<f64>) {
        self.raw_preds.push(raw);
    }

    pub fn aggregate(&mut self, method: AggregationMethod) -> Result<()> {
        let first = self
            .raw_preds
            .first()
            .ok_or_else(|| EnsembleError::ValidationError {
                message: "no ensemble predictions to aggregate".to_string(),
            })?;
        let shape = first.dim();
        let mut acc = Array2::<f64>::zeros(shape);

        for raw in &self.raw_preds {
            if raw.dim() != shape {
                return Err(EnsembleError::ShapeError {
                    message: format!(
                        "ensemble prediction has shape {:?}, expected {:?}",
                        raw.dim(),
                        shape
                    ),
                });
            }
            match method {
                AggregationMethod::Mean => acc += raw,
                AggregationMethod::Vote => {
                    for (row, mut out) in raw.rows().into_iter().zip(acc.rows_mut()) {
                        out[argmax(row)] += 1.0;
                    }
                }
            }
        }
        acc /= self.raw_preds.len() as f64;

        let preds = acc.rows().into_iter().map(argmax).collect::<Array1<usize>>();
        self.probs = Some(acc);
        self.preds = Some(preds);
        Ok(())
    }
}

/// Serializes a matrix with missing values as `{ "dim": [r, c], "data": [..] }`,
/// writing NaN as `null` so that it survives JSON.
pub mod serde_matrix {
    use ndarray::Array2;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    struct Matrix {
        dim: (usize, usize),
        data: Vec<Option<f64>>,
    }

    pub fn serialize<S: Serializer>(matrix: &Array2<f64>, serializer: S) -> Result<S::Ok, S::Error> {
        Matrix {
            dim: matrix.dim(),
            data: matrix.iter().map(|v| v.is_finite().then_some(*v)).collect(),
        }
        .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Array2<f64>, D::Error> {
        let matrix = Matrix::deserialize(deserializer)?;
        let data = matrix.data.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect();
        Array2::from_shape_vec(matrix.dim, data).map_err(serde::de::Error::custom)
    }
}

/// Index of the largest value; the lowest index wins ties.
pub fn argmax(row: ArrayView1<f64>) -> usize {
    let mut best = 0;
    let mut best_value = f64::NEG_INFINITY;
    for (i, &v) in row.iter().enumerate() {
        if v > best_value {
            best = i;
            best_value = v;
        }
    }
    best
}
