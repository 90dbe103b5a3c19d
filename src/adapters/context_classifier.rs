use crate::domain::constants::TabPfnConstants;
use crate::domain::model::ModelLimits;
use crate::domain::ports::BaseClassifier;
use crate::utils::error::{EnsembleError, Result};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

pub const DEFAULT_TEMPERATURE: f64 = 0.2;
const SMOOTHING: f64 = 1e-3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Preprocessing {
    ZScore,
    Rank,
}

#[derive(Debug, Clone)]
struct Context {
    x: Array2<f64>,
    y: Array1<usize>,
    n_classes: usize,
    means: Vec<f64>,
    stds: Vec<f64>,
    sorted_columns: Vec<Vec<f64>>,
    zscored: Array2<f64>,
    ranked: Array2<f64>,
}

/// In-context classifier with TabPFN's input limits.
///
/// Every query row attends over the stored context rows: the weights are a
/// softmax of negative mean squared distance, and the class probability is
/// the attention mass on rows of that class. Configurations alternate
/// between z-score and rank preprocessing and widen the temperature, and
/// their outputs are averaged.
#[derive(Debug, Clone)]
pub struct ContextClassifier {
    n_configurations: usize,
    temperature: f64,
    context: Option<Context>,
}

impl ContextClassifier {
    pub fn new(n_configurations: usize) -> Self {
        Self {
            n_configurations: n_configurations.max(1),
            temperature: DEFAULT_TEMPERATURE,
            context: None,
        }
    }

    pub fn n_configurations(&self) -> usize {
        self.n_configurations
    }

    fn configuration(&self, c: usize) -> (Preprocessing, f64) {
        let preprocessing = if c % 2 == 0 {
            Preprocessing::ZScore
        } else {
            Preprocessing::Rank
        };
        let temperature = self.temperature * (1.0 + 0.5 * (c / 2) as f64);
        (preprocessing, temperature)
    }
}

impl Default for ContextClassifier {
    fn default() -> Self {
        Self::new(4)
    }
}

impl Context {
    fn new(x: ArrayView2<f64>, y: ArrayView1<usize>, n_classes: usize) -> Self {
        let mut means = Vec::with_capacity(x.ncols());
        let mut stds = Vec::with_capacity(x.ncols());
        let mut sorted_columns = Vec::with_capacity(x.ncols());

        for column in x.columns() {
            let mut finite: Vec<f64> = column.iter().copied().filter(|v| v.is_finite()).collect();
            let (mean, std) = if finite.is_empty() {
                (0.0, 1.0)
            } else {
                let mean = finite.iter().sum::<f64>() / finite.len() as f64;
                let var = finite.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / finite.len() as f64;
                let std = var.sqrt();
                (mean, if std > 0.0 { std } else { 1.0 })
            };
            finite.sort_by(f64::total_cmp);
            means.push(mean);
            stds.push(std);
            sorted_columns.push(finite);
        }

        let mut context = Self {
            x: x.to_owned(),
            y: y.to_owned(),
            n_classes,
            means,
            stds,
            sorted_columns,
            zscored: Array2::zeros((0, 0)),
            ranked: Array2::zeros((0, 0)),
        };
        context.zscored = context.transform(x, Preprocessing::ZScore);
        context.ranked = context.transform(x, Preprocessing::Rank);
        context
    }

    fn transform(&self, x: ArrayView2<f64>, preprocessing: Preprocessing) -> Array2<f64> {
        let mut out = Array2::zeros(x.dim());
        for ((i, j), &v) in x.indexed_iter() {
            if !v.is_finite() {
                continue;
            }
            out[[i, j]] = match preprocessing {
                Preprocessing::ZScore => (v - self.means[j]) / self.stds[j],
                Preprocessing::Rank => {
                    let sorted = &self.sorted_columns[j];
                    if sorted.is_empty() {
                        0.0
                    } else {
                        let below = sorted.partition_point(|&s| s < v);
                        let at_or_below = sorted.partition_point(|&s| s <= v);
                        let cdf = (below + at_or_below) as f64 / (2.0 * sorted.len() as f64);
                        (cdf - 0.5) * 12f64.sqrt()
                    }
                }
            };
        }
        out
    }

    fn prepared(&self, preprocessing: Preprocessing) -> &Array2<f64> {
        match preprocessing {
            Preprocessing::ZScore => &self.zscored,
            Preprocessing::Rank => &self.ranked,
        }
    }

    fn attend(&self, ctx: &Array2<f64>, query: ArrayView1<f64>, temperature: f64, out: &mut [f64]) {
        let d = ctx.ncols().max(1) as f64;
        let logits: Vec<f64> = ctx
            .rows()
            .into_iter()
            .map(|row| {
                let dist = row
                    .iter()
                    .zip(query.iter())
                    .map(|(a, b)| (a - b).powi(2))
                    .sum::<f64>()
                    / d;
                -dist / temperature
            })
            .collect();
        let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let weights: Vec<f64> = if max.is_finite() {
            logits.iter().map(|l| (l - max).exp()).collect()
        } else {
            // Distances overflowed; the nearest rows (all rows when every
            // distance is infinite) share the weight equally.
            logits.iter().map(|&l| if l == max { 1.0 } else { 0.0 }).collect()
        };
        let total: f64 = weights.iter().sum();

        for (w, &label) in weights.iter().zip(self.y.iter()) {
            out[label] += w / total;
        }
    }
}

impl BaseClassifier for ContextClassifier {
    fn fit(&mut self, x: ArrayView2<f64>, y: ArrayView1<usize>, n_classes: usize) -> Result<()> {
        let limits = self.limits();
        let reject = |message: String| -> Result<()> { Err(EnsembleError::ModelInputError { message }) };

        if x.nrows() == 0 || x.ncols() == 0 {
            return reject("context must have at least one row and one column".to_string());
        }
        if x.nrows() != y.len() {
            return Err(EnsembleError::ShapeError {
                message: format!("context has {} rows but {} labels", x.nrows(), y.len()),
            });
        }
        if x.nrows() > limits.max_samples {
            return reject(format!(
                "context has {} rows, at most {} are supported",
                x.nrows(),
                limits.max_samples
            ));
        }
        if x.ncols() > limits.max_features {
            return reject(format!(
                "context has {} features, at most {} are supported",
                x.ncols(),
                limits.max_features
            ));
        }
        if n_classes == 0 || n_classes > limits.max_classes {
            return reject(format!(
                "{} classes requested, between 1 and {} are supported",
                n_classes, limits.max_classes
            ));
        }
        if let Some(&bad) = y.iter().find(|&&label| label >= n_classes) {
            return reject(format!("label {} is outside of {} classes", bad, n_classes));
        }

        self.context = Some(Context::new(x, y, n_classes));
        Ok(())
    }

    fn predict_proba(&self, x: ArrayView2<f64>) -> Result<Array2<f64>> {
        let context = self.context.as_ref().ok_or(EnsembleError::NotFittedError)?;
        if x.ncols() != context.x.ncols() {
            return Err(EnsembleError::ShapeError {
                message: format!(
                    "query has {} features but the context has {}",
                    x.ncols(),
                    context.x.ncols()
                ),
            });
        }

        let k = context.n_classes;
        let mut probs = Array2::<f64>::zeros((x.nrows(), k));
        let mut row_buf = vec![0.0; k];

        for c in 0..self.n_configurations {
            let (preprocessing, temperature) = self.configuration(c);
            let ctx = context.prepared(preprocessing);
            let query = context.transform(x, preprocessing);

            for (query_row, mut out_row) in query.axis_iter(Axis(0)).zip(probs.axis_iter_mut(Axis(0))) {
                row_buf.iter_mut().for_each(|v| *v = 0.0);
                context.attend(ctx, query_row, temperature, &mut row_buf);
                for (o, p) in out_row.iter_mut().zip(&row_buf) {
                    *o += (p + SMOOTHING) / (1.0 + k as f64 * SMOOTHING);
                }
            }
        }

        probs /= self.n_configurations as f64;
        Ok(probs)
    }

    fn limits(&self) -> ModelLimits {
        ModelLimits {
            max_samples: TabPfnConstants::MAX_INP_SIZE,
            max_features: TabPfnConstants::MAX_FEAT_SIZE,
            max_classes: TabPfnConstants::MAX_CLASSES,
        }
    }

    fn name(&self) -> &str {
        "context-attention"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn two_blobs() -> (Array2<f64>, Array1<usize>) {
        let x = array![
            [0.0, 0.1],
            [0.2, -0.1],
            [-0.1, 0.0],
            [5.0, 5.1],
            [5.2, 4.9],
            [4.9, 5.0],
        ];
        let y = array![0, 0, 0, 1, 1, 1];
        (x, y)
    }

    #[test]
    fn test_predicts_nearest_blob() {
        let (x, y) = two_blobs();
        let mut model = ContextClassifier::new(4);
        model.fit(x.view(), y.view(), 2).unwrap();

        let query = array![[0.1, 0.0], [5.1, 5.0]];
        assert_eq!(model.predict(query.view()).unwrap(), array![0, 1]);

        let probs = model.predict_proba(query.view()).unwrap();
        for row in probs.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }
        assert!(probs[[0, 0]] > 0.9);
    }

    #[test]
    fn test_unseen_class_gets_smoothed_mass() {
        let (x, _) = two_blobs();
        let y = array![0, 0, 0, 0, 0, 0];
        let mut model = ContextClassifier::new(1);
        model.fit(x.view(), y.view(), 3).unwrap();
        let probs = model.predict_proba(array![[1.0, 1.0]].view()).unwrap();
        assert!(probs[[0, 2]] > 0.0);
        assert!(probs[[0, 0]] > 0.99);
    }

    #[test]
    fn test_nan_features_are_tolerated() {
        let (mut x, y) = two_blobs();
        x[[1, 0]] = f64::NAN;
        let mut model = ContextClassifier::default();
        model.fit(x.view(), y.view(), 2).unwrap();
        let probs = model.predict_proba(array![[f64::NAN, 5.0]].view()).unwrap();
        assert!(probs.iter().all(|p| p.is_finite()));
        assert_eq!(model.predict(array![[f64::NAN, 5.0]].view()).unwrap()[0], 1);
    }

    #[test]
    fn test_huge_finite_query_stays_a_distribution() {
        let x = array![[0.0], [1.0], [10.0], [11.0]];
        let y = array![0, 0, 1, 1];
        let mut model = ContextClassifier::new(4);
        model.fit(x.view(), y.view(), 2).unwrap();

        let probs = model.predict_proba(array![[1e200]].view()).unwrap();
        assert!(probs.iter().all(|p| p.is_finite()));
        assert!((probs.row(0).sum() - 1.0).abs() < 1e-9);
        // Rank preprocessing still places the query beyond the largest row.
        assert_eq!(model.predict(array![[1e200]].view()).unwrap()[0], 1);

        // z-score alone overflows every distance, so all rows share the weight.
        let mut zscore_only = ContextClassifier::new(1);
        zscore_only.fit(x.view(), y.view(), 2).unwrap();
        let probs = zscore_only.predict_proba(array![[1e200]].view()).unwrap();
        assert!((probs[[0, 0]] - 0.5).abs() < 1e-12);
        assert!((probs[[0, 1]] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_rejects_oversized_context() {
        let x = Array2::<f64>::zeros((TabPfnConstants::MAX_INP_SIZE + 1, 2));
        let y = Array1::<usize>::zeros(TabPfnConstants::MAX_INP_SIZE + 1);
        let mut model = ContextClassifier::default();
        assert!(matches!(
            model.fit(x.view(), y.view(), 2),
            Err(EnsembleError::ModelInputError { .. })
        ));

        let wide = Array2::<f64>::zeros((3, TabPfnConstants::MAX_FEAT_SIZE + 1));
        let y = Array1::<usize>::zeros(3);
        assert!(model.fit(wide.view(), y.view(), 2).is_err());
        assert!(model.fit(Array2::<f64>::zeros((3, 2)).view(), y.view(), 11).is_err());
    }

    #[test]
    fn test_predict_before_fit_and_width_mismatch() {
        let model = ContextClassifier::default();
        assert!(matches!(
            model.predict_proba(array![[1.0]].view()),
            Err(EnsembleError::NotFittedError)
        ));

        let (x, y) = two_blobs();
        let mut model = ContextClassifier::default();
        model.fit(x.view(), y.view(), 2).unwrap();
        assert!(matches!(
            model.predict_proba(array![[1.0, 2.0, 3.0]].view()),
            Err(EnsembleError::ShapeError { .. })
        ));
    }
}
