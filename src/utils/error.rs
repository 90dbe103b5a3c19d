use thiserror::Error;

#[derive(Error, Debug)]
pub enum EnsembleError {
    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Invalid value for {field}: {value} ({reason})")]
    InvalidParameterError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Validation error: {message}")]
    ValidationError { message: String },

    #[error("Data error: {message}")]
    DataError { message: String },

    #[error("Shape mismatch: {message}")]
    ShapeError { message: String },

    #[error("Model input rejected: {message}")]
    ModelInputError { message: String },

    #[error("Estimator is not fitted yet, call fit before predicting")]
    NotFittedError,

    #[error("Unknown data sampler: {0} (expected bootstrap, subsample or stratified)")]
    UnknownSamplerError(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Io,
    Configuration,
    Data,
    Model,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl EnsembleError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            EnsembleError::IoError(_) => ErrorCategory::Io,
            EnsembleError::ConfigError { .. }
            | EnsembleError::InvalidParameterError { .. }
            | EnsembleError::UnknownSamplerError(_) => ErrorCategory::Configuration,
            EnsembleError::CsvError(_)
            | EnsembleError::SerializationError(_)
            | EnsembleError::ValidationError { .. }
            | EnsembleError::DataError { .. }
            | EnsembleError::ShapeError { .. } => ErrorCategory::Data,
            EnsembleError::ModelInputError { .. } | EnsembleError::NotFittedError => {
                ErrorCategory::Model
            }
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Io => ErrorSeverity::Critical,
            ErrorCategory::Configuration => ErrorSeverity::Medium,
            ErrorCategory::Data | ErrorCategory::Model => ErrorSeverity::High,
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            EnsembleError::IoError(e) => format!("Could not access a file: {}", e),
            EnsembleError::CsvError(e) => format!("The CSV input could not be read: {}", e),
            EnsembleError::SerializationError(e) => {
                format!("The model file is not readable: {}", e)
            }
            EnsembleError::NotFittedError => {
                "The model has not been trained yet.".to_string()
            }
            other => other.to_string(),
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            EnsembleError::IoError(_) => "Check that the path exists and is readable/writable",
            EnsembleError::CsvError(_) | EnsembleError::DataError { .. } => {
                "Check that the CSV has a header row and numeric feature columns"
            }
            EnsembleError::SerializationError(_) => {
                "Re-train the model with `ensemble-tabpfn fit` to produce a fresh model file"
            }
            EnsembleError::ConfigError { .. } | EnsembleError::InvalidParameterError { .. } => {
                "Review the command line flags and the TOML config file"
            }
            EnsembleError::UnknownSamplerError(_) => {
                "Use one of: bootstrap, subsample, stratified"
            }
            EnsembleError::ValidationError { .. } | EnsembleError::ShapeError { .. } => {
                "Make sure the prediction data has the same feature columns as the training data"
            }
            EnsembleError::ModelInputError { .. } => {
                "Lower n_samples/n_features or reduce the number of classes"
            }
            EnsembleError::NotFittedError => "Run fit before predict or load a saved model",
        }
    }
}

pub type Result<T> = std::result::Result<T, EnsembleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_by_category() {
        let io = EnsembleError::IoError(std::io::Error::other("boom"));
        assert_eq!(io.category(), ErrorCategory::Io);
        assert_eq!(io.severity(), ErrorSeverity::Critical);

        let cfg = EnsembleError::UnknownSamplerError("jackknife".to_string());
        assert_eq!(cfg.severity(), ErrorSeverity::Medium);

        assert_eq!(EnsembleError::NotFittedError.severity(), ErrorSeverity::High);
    }

    #[test]
    fn test_messages_mention_details() {
        let err = EnsembleError::InvalidParameterError {
            field: "n_samples".to_string(),
            value: "2000".to_string(),
            reason: "must be less than or equal to 1000".to_string(),
        };
        let msg = err.user_friendly_message();
        assert!(msg.contains("n_samples"));
        assert!(msg.contains("1000"));
    }
}
