use ensemble_tabpfn::adapters::csv_io;
use ensemble_tabpfn::config::cli::ParamOverrides;
use ensemble_tabpfn::utils::validation::Validate;
use ensemble_tabpfn::{EnsembleConfig, EnsembleTabPfn, FeatureStrategy};
use std::io::Write;
use tempfile::{NamedTempFile, TempDir};

fn write_training_csv(dir: &TempDir) -> std::path::PathBuf {
    let path = dir.path().join("iris_like.csv");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "species,sepal,petal,width").unwrap();
    for i in 0..90 {
        let (species, base) = match i % 3 {
            0 => ("setosa", 1.0),
            1 => ("versicolor", 4.0),
            _ => ("virginica", 7.0),
        };
        let wobble = (i % 5) as f64 * 0.1;
        // Every 11th petal value is missing.
        let petal = if i % 11 == 0 {
            "NA".to_string()
        } else {
            format!("{:.2}", base + wobble)
        };
        writeln!(file, "{},{:.2},{},{:.2}", species, base - wobble, petal, base * 0.5).unwrap();
    }
    path
}

#[test]
fn test_toml_config_with_cli_overrides_drives_fit() {
    let dir = TempDir::new().unwrap();
    let csv_path = write_training_csv(&dir);

    let mut config_file = NamedTempFile::new().unwrap();
    config_file
        .write_all(
            br#"
[ensemble]
max_iters = 10
data_sampler = "subsample"
n_samples = 40
feature_strategy = "variance"
random_state = 5

[monitoring]
enabled = false
"#,
        )
        .unwrap();

    let config = EnsembleConfig::from_file(config_file.path()).unwrap();
    config.validate().unwrap();
    let mut params = config.ensemble;

    let overrides = ParamOverrides {
        max_iters: Some(4),
        n_features: Some(2),
        ..Default::default()
    };
    overrides.apply(&mut params);
    assert_eq!(params.max_iters, 4);
    assert_eq!(params.data_sampler, "subsample");
    assert_eq!(params.feature_strategy, FeatureStrategy::Variance);

    let dataset = csv_io::read_dataset(&csv_path, Some("species")).unwrap();
    assert_eq!(dataset.feature_names, vec!["sepal", "petal", "width"]);

    let mut estimator = EnsembleTabPfn::new(params).unwrap();
    estimator.fit(dataset.features.view(), &dataset.labels).unwrap();
    let accuracy = estimator
        .score(dataset.features.view(), &dataset.labels)
        .unwrap();
    assert!(accuracy > 0.9, "accuracy was {}", accuracy);

    // Prediction input still carries the target column; drop it.
    let (names, features) = csv_io::read_features(&csv_path, Some("species")).unwrap();
    assert_eq!(names.len(), 3);
    let result = estimator.predict_result(features.view()).unwrap();
    let fitted = estimator.fitted().unwrap();
    let labels: Vec<String> = result
        .preds
        .unwrap()
        .iter()
        .map(|&i| fitted.encoder.inverse(i).unwrap().to_string())
        .collect();
    let probs = result.probs.unwrap();

    let out_path = dir.path().join("predictions.csv");
    csv_io::write_predictions(&out_path, &labels, Some((fitted.encoder.classes(), probs.view())))
        .unwrap();

    let written = std::fs::read_to_string(&out_path).unwrap();
    let mut lines = written.lines();
    assert_eq!(
        lines.next().unwrap(),
        "prediction,proba_setosa,proba_versicolor,proba_virginica"
    );
    assert_eq!(lines.count(), 90);
}
