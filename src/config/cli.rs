use crate::core::features::FeatureStrategy;
use crate::core::params::EnsembleParams;
use crate::domain::model::AggregationMethod;
use crate::utils::error::Result;
use crate::utils::logger::LogFormat;
use crate::utils::validation::{
    validate_file_extension, validate_non_empty_string, validate_path, Validate,
};
use clap::{Args, Parser, Subcommand};

#[derive(Debug, Clone, Parser)]
#[command(name = "ensemble-tabpfn")]
#[command(about = "Subsampling ensembles of in-context tabular classifiers for large datasets")]
#[command(version)]
pub struct CliConfig {
    #[arg(long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, global = true, help = "Log CPU and memory usage per phase")]
    pub monitor: bool,

    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Compact)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Draw ensemble members from a labelled CSV and save the model
    Fit(FitArgs),
    /// Predict classes (and optionally probabilities) for a CSV
    Predict(PredictArgs),
    /// Report accuracy of a saved model on a labelled CSV
    Evaluate(EvaluateArgs),
}

#[derive(Debug, Clone, Args)]
pub struct FitArgs {
    /// Training CSV with a header row
    #[arg(short, long)]
    pub input: String,

    /// Target column, defaults to the last column
    #[arg(short, long)]
    pub target: Option<String>,

    /// Where to write the model file
    #[arg(short, long, default_value = "model.json")]
    pub model: String,

    /// TOML file with [ensemble] and [monitoring] sections
    #[arg(short, long)]
    pub config: Option<String>,

    #[command(flatten)]
    pub overrides: ParamOverrides,
}

/// Command line values that take precedence over the config file.
#[derive(Debug, Clone, Default, Args)]
pub struct ParamOverrides {
    #[arg(long)]
    pub max_iters: Option<usize>,

    #[arg(long, help = "bootstrap, subsample or stratified")]
    pub data_sampler: Option<String>,

    #[arg(long)]
    pub n_samples: Option<usize>,

    #[arg(long)]
    pub n_features: Option<usize>,

    #[arg(long, value_enum)]
    pub feature_strategy: Option<FeatureStrategy>,

    #[arg(long)]
    pub random_state: Option<u64>,

    #[arg(long)]
    pub early_stopping_rounds: Option<usize>,

    #[arg(long)]
    pub tolerance: Option<f64>,

    #[arg(long)]
    pub n_ensemble_configurations: Option<usize>,

    #[arg(long)]
    pub validation_fraction: Option<f64>,

    #[arg(long, value_enum)]
    pub aggregation: Option<AggregationMethod>,
}

impl ParamOverrides {
    pub fn apply(&self, params: &mut EnsembleParams) {
        if let Some(v) = self.max_iters {
            params.max_iters = v;
        }
        if let Some(v) = &self.data_sampler {
            params.data_sampler = v.clone();
        }
        if let Some(v) = self.n_samples {
            params.n_samples = v;
        }
        if let Some(v) = self.n_features {
            params.n_features = v;
        }
        if let Some(v) = self.feature_strategy {
            params.feature_strategy = v;
        }
        if let Some(v) = self.random_state {
            params.random_state = Some(v);
        }
        if let Some(v) = self.early_stopping_rounds {
            params.early_stopping_rounds = v;
        }
        if let Some(v) = self.tolerance {
            params.tolerance = v;
        }
        if let Some(v) = self.n_ensemble_configurations {
            params.n_ensemble_configurations = v;
        }
        if let Some(v) = self.validation_fraction {
            params.validation_fraction = v;
        }
        if let Some(v) = self.aggregation {
            params.aggregation = v;
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct PredictArgs {
    #[arg(short, long, default_value = "model.json")]
    pub model: String,

    /// CSV with the same feature columns as the training data
    #[arg(short, long)]
    pub input: String,

    /// Output CSV, printed to stdout when omitted
    #[arg(short, long)]
    pub output: Option<String>,

    /// Also write per-class probabilities
    #[arg(long)]
    pub proba: bool,

    /// Column to ignore in the input (e.g. a target column)
    #[arg(long)]
    pub drop_column: Option<String>,
}

#[derive(Debug, Clone, Args)]
pub struct EvaluateArgs {
    #[arg(short, long, default_value = "model.json")]
    pub model: String,

    #[arg(short, long)]
    pub input: String,

    #[arg(short, long)]
    pub target: Option<String>,
}

impl Validate for CliConfig {
    fn validate(&self) -> Result<()> {
        match &self.command {
            Command::Fit(args) => {
                validate_path("input", &args.input)?;
                validate_file_extension("input", &args.input, &["csv"])?;
                validate_path("model", &args.model)?;
                validate_file_extension("model", &args.model, &["json"])?;
                if let Some(config) = &args.config {
                    validate_file_extension("config", config, &["toml"])?;
                }
                if let Some(target) = &args.target {
                    validate_non_empty_string("target", target)?;
                }
            }
            Command::Predict(args) => {
                validate_path("model", &args.model)?;
                validate_file_extension("input", &args.input, &["csv"])?;
                if let Some(output) = &args.output {
                    validate_path("output", output)?;
                }
                if let Some(column) = &args.drop_column {
                    validate_non_empty_string("drop_column", column)?;
                }
            }
            Command::Evaluate(args) => {
                validate_path("model", &args.model)?;
                validate_file_extension("input", &args.input, &["csv"])?;
                if let Some(target) = &args.target {
                    validate_non_empty_string("target", target)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fit_with_overrides() {
        let cli = CliConfig::try_parse_from([
            "ensemble-tabpfn",
            "--verbose",
            "fit",
            "--input",
            "train.csv",
            "--model",
            "out.json",
            "--max-iters",
            "12",
            "--feature-strategy",
            "variance",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert!(cli.validate().is_ok());

        let Command::Fit(args) = cli.command else {
            panic!("expected fit");
        };
        let mut params = EnsembleParams::default();
        args.overrides.apply(&mut params);
        assert_eq!(params.max_iters, 12);
        assert_eq!(params.feature_strategy, FeatureStrategy::Variance);
        assert_eq!(params.data_sampler, "bootstrap");
    }

    #[test]
    fn test_rejects_wrong_extensions() {
        let cli = CliConfig::try_parse_from([
            "ensemble-tabpfn",
            "predict",
            "--input",
            "data.xlsx",
        ])
        .unwrap();
        assert!(cli.validate().is_err());
    }

    #[test]
    fn test_rejects_blank_column_names() {
        let cli = CliConfig::try_parse_from([
            "ensemble-tabpfn",
            "fit",
            "--input",
            "train.csv",
            "--target",
            " ",
        ])
        .unwrap();
        assert!(cli.validate().is_err());

        let cli = CliConfig::try_parse_from([
            "ensemble-tabpfn",
            "predict",
            "--input",
            "data.csv",
            "--drop-column",
            "",
        ])
        .unwrap();
        assert!(cli.validate().is_err());
    }
}
