use ensemble_tabpfn::adapters::csv_io;
use ensemble_tabpfn::domain::model::ModelLimits;
use ensemble_tabpfn::domain::ports::BaseClassifier;
use ensemble_tabpfn::{
    AggregationMethod, EnsembleError, EnsembleParams, EnsembleTabPfn, FeatureStrategy,
    LocalStorage, Result, TabPfnConstants,
};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::io::Write;
use tempfile::TempDir;

/// Three classes; every fourth column is shifted by 1.5 per class, the rest
/// is uniform noise.
fn make_table(n: usize, d: usize, seed: u64) -> (Array2<f64>, Vec<String>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let labels: Vec<usize> = (0..n).map(|i| i % 3).collect();
    let x = Array2::from_shape_fn((n, d), |(i, j)| {
        let noise = rng.random::<f64>() - 0.5;
        if j % 4 == 0 {
            noise + 1.5 * labels[i] as f64
        } else {
            noise
        }
    });
    let y = labels.iter().map(|c| format!("class_{}", c)).collect();
    (x, y)
}

fn write_csv(path: &std::path::Path, x: &Array2<f64>, y: &[String]) {
    let mut file = std::fs::File::create(path).unwrap();
    let header: Vec<String> = (0..x.ncols()).map(|j| format!("f{}", j)).collect();
    writeln!(file, "{},label", header.join(",")).unwrap();
    for (row, label) in x.rows().into_iter().zip(y) {
        let cells: Vec<String> = row.iter().map(|v| v.to_string()).collect();
        writeln!(file, "{},{}", cells.join(","), label).unwrap();
    }
}

fn accuracy(pred: &[String], truth: &[String]) -> f64 {
    let hits = pred.iter().zip(truth).filter(|(p, t)| p == t).count();
    hits as f64 / truth.len() as f64
}

#[test]
fn test_large_table_end_to_end() {
    let temp_dir = TempDir::new().unwrap();
    let csv_path = temp_dir.path().join("train.csv");

    // More rows and columns than a single in-context fit accepts.
    let (x, y) = make_table(1500, 120, 1);
    assert!(x.nrows() > TabPfnConstants::MAX_INP_SIZE);
    assert!(x.ncols() > TabPfnConstants::MAX_FEAT_SIZE);
    write_csv(&csv_path, &x, &y);

    let dataset = csv_io::read_dataset(&csv_path, Some("label")).unwrap();
    assert_eq!(dataset.features.dim(), (1500, 120));

    let params = EnsembleParams {
        max_iters: 3,
        random_state: Some(7),
        n_ensemble_configurations: 1,
        ..Default::default()
    };
    let mut estimator = EnsembleTabPfn::new(params).unwrap();
    estimator.fit(dataset.features.view(), &dataset.labels).unwrap();

    let fitted = estimator.fitted().unwrap();
    assert!(fitted
        .members
        .iter()
        .all(|m| m.data_indices.len() == TabPfnConstants::MAX_INP_SIZE));
    assert!(fitted.members.iter().all(|m| m.views.len() == 2));

    let (x_test, y_test) = make_table(60, 120, 2);
    let preds = estimator.predict(x_test.view()).unwrap();
    assert!(accuracy(&preds, &y_test) >= 0.8);

    let model_path = temp_dir.path().join("model.json");
    let model_path = model_path.to_str().unwrap();
    estimator.save_model(model_path).unwrap();

    let restored = EnsembleTabPfn::load_model(model_path).unwrap();
    assert_eq!(restored.params(), estimator.params());
    assert_eq!(restored.predict(x_test.view()).unwrap(), preds);
}

#[test]
fn test_stratified_projection_with_votes() {
    let (x, y) = make_table(400, 150, 3);
    let params = EnsembleParams {
        max_iters: 4,
        data_sampler: "stratified".to_string(),
        n_samples: 120,
        n_features: 40,
        feature_strategy: FeatureStrategy::Projection,
        aggregation: AggregationMethod::Vote,
        random_state: Some(11),
        n_ensemble_configurations: 2,
        ..Default::default()
    };
    let mut estimator = EnsembleTabPfn::new(params).unwrap();
    estimator.fit(x.view(), &y).unwrap();

    let fitted = estimator.fitted().unwrap();
    assert!(fitted.members.iter().all(|m| m.views.len() == 1));
    assert!(fitted.members.iter().all(|m| m.views[0].output_width() == 40));

    let (x_test, _) = make_table(10, 150, 4);
    let probs = estimator.predict_proba(x_test.view()).unwrap();
    assert_eq!(probs.dim(), (10, 3));
    for row in probs.rows() {
        assert!((row.sum() - 1.0).abs() < 1e-9);
    }
}

#[test]
fn test_model_format_version_is_checked() {
    let temp_dir = TempDir::new().unwrap();
    let storage = LocalStorage::new(temp_dir.path().to_str().unwrap().to_string());

    let (mut x, y) = make_table(60, 4, 5);
    x[[0, 1]] = f64::NAN;
    x[[7, 2]] = f64::NAN;
    let params = EnsembleParams {
        max_iters: 2,
        n_samples: 30,
        random_state: Some(0),
        ..Default::default()
    };
    let mut estimator = EnsembleTabPfn::new(params).unwrap();
    estimator.fit(x.view(), &y).unwrap();
    estimator.save_model_to(&storage, "model.json").unwrap();

    let restored = EnsembleTabPfn::load_model_from(&storage, "model.json").unwrap();
    let original_ctx = &estimator.fitted().unwrap().context_x;
    let restored_ctx = &restored.fitted().unwrap().context_x;
    assert_eq!(original_ctx.dim(), restored_ctx.dim());
    assert_eq!(
        original_ctx.iter().filter(|v| v.is_nan()).count(),
        restored_ctx.iter().filter(|v| v.is_nan()).count()
    );

    let path = temp_dir.path().join("model.json");
    let mut json: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(json["format_version"], 1);
    assert_eq!(json["base_classifier"], "context-attention");
    json["format_version"] = serde_json::json!(99);
    std::fs::write(&path, serde_json::to_vec(&json).unwrap()).unwrap();

    assert!(matches!(
        EnsembleTabPfn::load_model_from(&storage, "model.json"),
        Err(EnsembleError::SerializationError(_))
    ));
    assert!(matches!(
        EnsembleTabPfn::load_model_from(&storage, "missing.json"),
        Err(EnsembleError::IoError(_))
    ));
}

/// Predicts the class frequencies of its context for every row.
#[derive(Debug, Clone, Default)]
struct PriorClassifier {
    prior: Vec<f64>,
}

impl BaseClassifier for PriorClassifier {
    fn fit(&mut self, _x: ArrayView2<f64>, y: ArrayView1<usize>, n_classes: usize) -> Result<()> {
        let mut counts = vec![0.0; n_classes];
        for &label in y {
            counts[label] += 1.0;
        }
        let total = y.len() as f64;
        self.prior = counts.into_iter().map(|c| c / total).collect();
        Ok(())
    }

    fn predict_proba(&self, x: ArrayView2<f64>) -> Result<Array2<f64>> {
        if self.prior.is_empty() {
            return Err(EnsembleError::NotFittedError);
        }
        let row = Array1::from(self.prior.clone());
        Ok(Array2::from_shape_fn((x.nrows(), row.len()), |(_, j)| row[j]))
    }

    fn limits(&self) -> ModelLimits {
        ModelLimits {
            max_samples: 50,
            max_features: 5,
            max_classes: 3,
        }
    }

    fn name(&self) -> &str {
        "prior"
    }
}

#[test]
fn test_custom_base_classifier() {
    let too_big = EnsembleParams {
        n_samples: 100,
        n_features: 5,
        ..Default::default()
    };
    assert!(EnsembleTabPfn::with_classifier(too_big, PriorClassifier::default()).is_err());

    // 2 of 3 labels are "a"; stratified draws keep that majority.
    let x = Array2::from_shape_fn((90, 8), |(i, j)| (i + j) as f64);
    let y: Vec<&str> = (0..90).map(|i| if i % 3 == 0 { "b" } else { "a" }).collect();
    let params = EnsembleParams {
        data_sampler: "stratified".to_string(),
        n_samples: 50,
        n_features: 5,
        max_iters: 3,
        random_state: Some(1),
        ..Default::default()
    };
    let mut estimator = EnsembleTabPfn::with_classifier(params, PriorClassifier::default()).unwrap();
    estimator.fit(x.view(), &y).unwrap();
    let preds = estimator.predict(x.view()).unwrap();
    assert!(preds.iter().all(|p| p == "a"));
}
