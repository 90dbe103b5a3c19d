use crate::domain::model::FeatureView;
use crate::utils::error::{EnsembleError, Result};
use ndarray::{Array2, ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum FeatureStrategy {
    /// Random disjoint column groups covering every feature.
    #[default]
    Subset,
    /// One sparse random projection down to `n_features` columns.
    Projection,
    /// The highest-variance columns of the sampled rows.
    Variance,
}

impl std::str::FromStr for FeatureStrategy {
    type Err = EnsembleError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "subset" => Ok(FeatureStrategy::Subset),
            "projection" => Ok(FeatureStrategy::Projection),
            "variance" => Ok(FeatureStrategy::Variance),
            other => Err(EnsembleError::InvalidParameterError {
                field: "feature_strategy".to_string(),
                value: other.to_string(),
                reason: "expected subset, projection or variance".to_string(),
            }),
        }
    }
}

/// Narrows wide tables to at most `n_features` columns per base fit.
///
/// `sample` draws fresh views on the training subsample and remembers them;
/// `reduce` pushes other data (validation or test rows) through the same views.
#[derive(Debug, Clone)]
pub struct FeatureSampler {
    n_features: usize,
    strategy: FeatureStrategy,
    views: Vec<FeatureView>,
}

impl FeatureSampler {
    pub fn new(n_features: usize, strategy: FeatureStrategy) -> Self {
        Self {
            n_features,
            strategy,
            views: Vec::new(),
        }
    }

    pub fn sample(
        &mut self,
        x: ArrayView2<f64>,
        _y: ArrayView1<usize>,
        rng: &mut StdRng,
    ) -> Result<Vec<Array2<f64>>> {
        self.views = self.draw_views(x, rng);
        self.reduce(x)
    }

    pub fn reduce(&self, x: ArrayView2<f64>) -> Result<Vec<Array2<f64>>> {
        if self.views.is_empty() {
            return Err(EnsembleError::ValidationError {
                message: "feature sampler has no views, call sample first".to_string(),
            });
        }
        self.views.iter().map(|view| view.apply(x)).collect()
    }

    pub fn get_samplers(&self) -> Vec<FeatureView> {
        self.views.clone()
    }

    pub fn set_samplers(&mut self, views: Vec<FeatureView>) {
        self.views = views;
    }

    fn draw_views(&self, x: ArrayView2<f64>, rng: &mut StdRng) -> Vec<FeatureView> {
        let d = x.ncols();
        if d <= self.n_features {
            return vec![FeatureView::Identity { n_features: d }];
        }

        match self.strategy {
            FeatureStrategy::Subset => {
                let mut columns: Vec<usize> = (0..d).collect();
                columns.shuffle(rng);
                columns
                    .chunks(self.n_features)
                    .map(|group| FeatureView::Subset {
                        columns: group.to_vec(),
                    })
                    .collect()
            }
            FeatureStrategy::Projection => {
                let k = self.n_features;
                let scale = (3.0 / k as f64).sqrt();
                let weights = Array2::from_shape_simple_fn((d, k), || match rng.random_range(0..6) {
                    0 => scale,
                    1 => -scale,
                    _ => 0.0,
                });
                vec![FeatureView::Projection { weights }]
            }
            FeatureStrategy::Variance => {
                let variances: Vec<f64> = x.columns().into_iter().map(nan_variance).collect();
                let mut order: Vec<usize> = (0..d).collect();
                order.sort_by(|&a, &b| {
                    variances[b]
                        .total_cmp(&variances[a])
                        .then_with(|| a.cmp(&b))
                });
                let mut columns: Vec<usize> = order.into_iter().take(self.n_features).collect();
                columns.sort_unstable();
                vec![FeatureView::Subset { columns }]
            }
        }
    }
}

fn nan_variance(column: ArrayView1<f64>) -> f64 {
    let finite: Vec<f64> = column.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.len() < 2 {
        return 0.0;
    }
    let mean = finite.iter().sum::<f64>() / finite.len() as f64;
    finite.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / finite.len() as f64
}
