use crate::model::ModelError;

/// A numeric input was missing or not a finite real number
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{field} must be a finite number, got {value}")]
pub struct ValidationError {
    pub field: &'static str,
    pub value: String,
}

impl ValidationError {
    pub fn new(field: &'static str, value: impl ToString) -> Self {
        ValidationError {
            field,
            value: value.to_string(),
        }
    }
}

/// Check that `value` is finite, naming the offending field otherwise
pub fn require_finite(field: &'static str, value: f64) -> Result<f64, ValidationError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ValidationError::new(field, value))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("the dataset is empty")]
pub struct EmptyDatasetError;

/// Reasons a training run can be refused or can fail
#[derive(Debug, thiserror::Error)]
pub enum TrainingError {
    #[error("training needs at least {required} samples, the dataset has {count}")]
    InsufficientData { count: usize, required: usize },
    #[error("a training run is already in progress")]
    AlreadyTraining,
    #[error(transparent)]
    Config(#[from] ValidationError),
    #[error("training failed: {0}")]
    Model(#[from] ModelError),
}

#[derive(Debug, thiserror::Error)]
pub enum PredictionError {
    #[error("no trained model is available")]
    ModelNotReady,
    #[error("invalid input: {0}")]
    InvalidInput(#[from] ValidationError),
    #[error("prediction failed: {0}")]
    Model(#[from] ModelError),
}

/// Reasons saving or loading a model can fail
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("no trained model is available")]
    ModelNotReady,
    #[error("cannot replace the model while a training run is in progress")]
    AlreadyTraining,
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Outcome of a CSV import. Skipped rows are reported, never raised.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub added: usize,
    pub skipped: usize,
}
