use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use std::{io, thread};

use crate::config::TrainingConfig;

pub mod artifact;
pub mod neural_net;
pub mod normalizer;

/// Loss as a function of the epoch, one entry per completed epoch
pub type LossHistory = Vec<(usize, f64)>;

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("no samples were ingested")]
    NoData,
    #[error("data must be normalized before training or prediction")]
    NotNormalized,
    #[error("loss stopped being finite at epoch {epoch}")]
    Diverged { epoch: usize },
    #[error("expected {expected} values, got {got}")]
    ShapeMismatch { expected: usize, got: usize },
    #[error("the training worker stopped without reporting a result")]
    WorkerLost,
    #[error("bad model artifact: {0}")]
    Artifact(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// What the network is asked to learn
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Task {
    Regression,
}

/// A model that can be fed samples, trained and queried
pub trait Regressor: Send + Sync + 'static {
    /// Add one training sample
    fn ingest(&mut self, inputs: &[f64], outputs: &[f64]) -> Result<(), ModelError>;
    /// Fix the scaling of inputs and outputs from the ingested samples
    fn normalize(&mut self) -> Result<(), ModelError>;
    fn train(&mut self, epochs: usize) -> Result<LossHistory, ModelError>;
    fn predict(&self, inputs: &[f64]) -> Result<Vec<f64>, ModelError>;
    /// Serialize everything needed to predict again later
    fn to_artifact(&self) -> Result<String, ModelError>;
}

/// Builds fresh models and brings saved ones back
pub trait ModelFactory {
    type Model: Regressor;

    fn configure(
        &self,
        input_shape: usize,
        output_shape: usize,
        task: Task,
        config: &TrainingConfig,
    ) -> Result<Self::Model, ModelError>;

    fn restore(&self, artifact: &str) -> Result<Self::Model, ModelError>;
}

/// A model that finished training, with its loss curve
pub struct TrainedModel<M> {
    pub model: M,
    pub losses: LossHistory,
}

/// Pending result of `train_async`
pub struct TrainingJob<M> {
    receiver: Receiver<Result<TrainedModel<M>, ModelError>>,
}

impl<M> TrainingJob<M> {
    /// Check for a result without blocking
    pub fn try_finish(&self) -> Option<Result<TrainedModel<M>, ModelError>> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(ModelError::WorkerLost)),
        }
    }

    pub fn wait(self) -> Result<TrainedModel<M>, ModelError> {
        self.receiver.recv().unwrap_or(Err(ModelError::WorkerLost))
    }
}

/// Move `model` onto a worker thread and train it there.
/// The returned job reports exactly once, with the model or the failure.
pub fn train_async<M: Regressor>(mut model: M, epochs: usize) -> Result<TrainingJob<M>, ModelError> {
    let (sender, receiver) = mpsc::channel();

    thread::Builder::new()
        .name("trainer".to_string())
        .spawn(move || {
            let result = model
                .train(epochs)
                .map(|losses| TrainedModel { model, losses });
            // The receiver is gone if nobody cares about this run anymore
            let _ = sender.send(result);
        })?;

    Ok(TrainingJob { receiver })
}

/// Shared, read-only reference to a trained model.
/// Clones point at the same model, so predictions can run side by side.
pub struct ModelHandle<M> {
    model: Arc<M>,
}

impl<M> Clone for ModelHandle<M> {
    fn clone(&self) -> Self {
        ModelHandle {
            model: Arc::clone(&self.model),
        }
    }
}

impl<M: Regressor> ModelHandle<M> {
    pub fn new(model: M) -> ModelHandle<M> {
        ModelHandle {
            model: Arc::new(model),
        }
    }

    /// Single-output prediction for a two-input model
    pub fn predict(&self, input1: f64, input2: f64) -> Result<f64, ModelError> {
        let outputs = self.model.predict(&[input1, input2])?;

        match outputs.as_slice() {
            [value] => Ok(*value),
            other => Err(ModelError::ShapeMismatch {
                expected: 1,
                got: other.len(),
            }),
        }
    }

    pub fn persist(&self) -> Result<String, ModelError> {
        self.model.to_artifact()
    }

    pub fn model(&self) -> &M {
        &self.model
    }
}
