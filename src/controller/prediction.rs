use crate::error::{require_finite, PredictionError};
use crate::model::{ModelHandle, Regressor};

/// Ask the trained model for the output at `(input1, input2)`.
/// One call to the model per request; nothing is cached or retried.
pub fn predict<M: Regressor>(
    input1: f64,
    input2: f64,
    model: Option<&ModelHandle<M>>,
) -> Result<f64, PredictionError> {
    let model = model.ok_or(PredictionError::ModelNotReady)?;
    let input1 = require_finite("input1", input1)?;
    let input2 = require_finite("input2", input2)?;

    Ok(model.predict(input1, input2)?)
}

/// Display form of a predicted value
pub fn format_prediction(value: f64) -> String {
    format!("{:.4}", value)
}
