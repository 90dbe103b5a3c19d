use crate::domain::model::{argmax, ModelLimits, Subsample};
use crate::utils::error::Result;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use rand::rngs::StdRng;

/// A small-data classifier that learns from the rows it is given at fit time,
/// the way TabPFN conditions on its context.
pub trait BaseClassifier: Send {
    fn fit(&mut self, x: ArrayView2<f64>, y: ArrayView1<usize>, n_classes: usize) -> Result<()>;

    /// Returns an `n x n_classes` matrix whose rows sum to one.
    fn predict_proba(&self, x: ArrayView2<f64>) -> Result<Array2<f64>>;

    fn predict(&self, x: ArrayView2<f64>) -> Result<Array1<usize>> {
        let probs = self.predict_proba(x)?;
        Ok(probs.rows().into_iter().map(argmax).collect())
    }

    fn limits(&self) -> ModelLimits;

    fn name(&self) -> &str;
}

pub trait DataSampler: Send + Sync {
    fn sample(&self, x: ArrayView2<f64>, y: ArrayView1<usize>, rng: &mut StdRng) -> Result<Subsample>;

    fn name(&self) -> &'static str;
}

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> Result<Vec<u8>>;
    fn write_file(&self, path: &str, data: &[u8]) -> Result<()>;
}
