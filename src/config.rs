use crate::error::{require_finite, ValidationError};
use crate::model::neural_net::ActivationFunction;

/// Hyperparameters for one training run.
/// A clone is taken when training starts, so later edits never reach a run in flight.
#[derive(Clone, Debug, PartialEq)]
pub struct TrainingConfig {
    pub epochs: usize,
    pub learning_rate: f64,
    pub hidden_units: usize,
    pub batch_size: usize,
    pub activation: ActivationFunction,
    /// Fixed seed for weight initialisation and shuffling; random when absent
    pub seed: Option<u64>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        TrainingConfig {
            epochs: 50,
            learning_rate: 0.2,
            hidden_units: 16,
            batch_size: 32,
            activation: ActivationFunction::Sigmoid,
            seed: None,
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.epochs == 0 {
            return Err(ValidationError::new("epochs", self.epochs));
        }
        if self.hidden_units == 0 {
            return Err(ValidationError::new("hidden_units", self.hidden_units));
        }
        if self.batch_size == 0 {
            return Err(ValidationError::new("batch_size", self.batch_size));
        }
        let rate = require_finite("learning_rate", self.learning_rate)?;
        if rate <= 0f64 {
            return Err(ValidationError::new("learning_rate", rate));
        }

        Ok(())
    }
}
