use crate::utils::error::{EnsembleError, Result};
use ndarray::ArrayView2;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

const PROBA_EPS: f64 = 1e-15;

pub fn accuracy_score<T: PartialEq>(y_true: &[T], y_pred: &[T]) -> Result<f64> {
    if y_true.len() != y_pred.len() {
        return Err(EnsembleError::ShapeError {
            message: format!(
                "y_true has {} entries but y_pred has {}",
                y_true.len(),
                y_pred.len()
            ),
        });
    }
    if y_true.is_empty() {
        return Err(EnsembleError::ValidationError {
            message: "accuracy of an empty prediction is undefined".to_string(),
        });
    }
    let hits = y_true.iter().zip(y_pred).filter(|(t, p)| t == p).count();
    Ok(hits as f64 / y_true.len() as f64)
}

/// Mean negative log-likelihood of the true class, with probabilities clipped
/// away from zero.
pub fn log_loss(y_true: &[usize], probs: ArrayView2<f64>) -> Result<f64> {
    if y_true.len() != probs.nrows() || y_true.is_empty() {
        return Err(EnsembleError::ShapeError {
            message: format!(
                "log_loss needs one probability row per label, got {} labels and {} rows",
                y_true.len(),
                probs.nrows()
            ),
        });
    }
    let mut total = 0.0;
    for (row, &label) in probs.rows().into_iter().zip(y_true) {
        let p = row.get(label).copied().ok_or_else(|| EnsembleError::ShapeError {
            message: format!("label {} outside of {} probability columns", label, row.len()),
        })?;
        total -= p.clamp(PROBA_EPS, 1.0).ln();
    }
    Ok(total / y_true.len() as f64)
}

/// Shuffled split of `0..n`. The test part has `ceil(n * test_fraction)` rows
/// but never takes the last training row.
pub fn train_test_split(n: usize, test_fraction: f64, rng: &mut StdRng) -> (Vec<usize>, Vec<usize>) {
    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(rng);
    if n < 2 || test_fraction <= 0.0 {
        return (indices, Vec::new());
    }
    let n_test = ((n as f64 * test_fraction).ceil() as usize).clamp(1, n - 1);
    let train = indices.split_off(n_test);
    (train, indices)
}
