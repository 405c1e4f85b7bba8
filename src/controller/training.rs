use crate::config::TrainingConfig;
use crate::dataset::DatasetStore;
use crate::error::TrainingError;
use crate::model::{
    train_async, LossHistory, ModelError, ModelFactory, ModelHandle, Regressor, Task, TrainedModel,
    TrainingJob,
};

/// Fewest samples a training run will accept
pub const MIN_TRAINING_SAMPLES: usize = 4;

const INPUT_SHAPE: usize = 2;
const OUTPUT_SHAPE: usize = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrainingState {
    Idle,
    Training,
    Trained,
}

/// Runs at most one training run at a time and keeps the model it produced.
///
/// `Idle -> Training -> Trained`, or back to `Idle` when the run fails.
/// Starting a run or installing a loaded model replaces the previous model.
pub struct TrainingController<M> {
    state: TrainingState,
    model: Option<ModelHandle<M>>,
    job: Option<TrainingJob<M>>,
    config: Option<TrainingConfig>,
    losses: LossHistory,
}

impl<M: Regressor> Default for TrainingController<M> {
    fn default() -> Self {
        TrainingController::new()
    }
}

impl<M: Regressor> TrainingController<M> {
    pub fn new() -> TrainingController<M> {
        TrainingController {
            state: TrainingState::Idle,
            model: None,
            job: None,
            config: None,
            losses: vec![],
        }
    }

    pub fn state(&self) -> TrainingState {
        self.state
    }

    pub fn is_training(&self) -> bool {
        self.state == TrainingState::Training
    }

    /// The live model, only once a run has finished or a model was loaded
    pub fn trained_model(&self) -> Option<&ModelHandle<M>> {
        match self.state {
            TrainingState::Trained => self.model.as_ref(),
            _ => None,
        }
    }

    /// Config of the run in flight, or of the last one started
    pub fn run_config(&self) -> Option<&TrainingConfig> {
        self.config.as_ref()
    }

    pub fn loss_history(&self) -> &LossHistory {
        &self.losses
    }

    /// Hand a copy of the dataset to a fresh model and start training it.
    ///
    /// The samples and `config` are read here, once. Later edits to either do
    /// not reach the run. Refusals leave the controller untouched.
    pub fn start_training<F>(
        &mut self,
        dataset: &DatasetStore,
        config: &TrainingConfig,
        factory: &F,
    ) -> Result<(), TrainingError>
    where
        F: ModelFactory<Model = M>,
    {
        if dataset.len() < MIN_TRAINING_SAMPLES {
            return Err(TrainingError::InsufficientData {
                count: dataset.len(),
                required: MIN_TRAINING_SAMPLES,
            });
        }
        if self.is_training() {
            return Err(TrainingError::AlreadyTraining);
        }
        config.validate()?;

        let config = config.clone();
        let mut model = factory.configure(INPUT_SHAPE, OUTPUT_SHAPE, Task::Regression, &config)?;
        for sample in dataset.samples() {
            model.ingest(&sample.inputs(), &[sample.output])?;
        }
        model.normalize()?;
        let job = train_async(model, config.epochs)?;

        tracing::info!(
            "Training started on {} samples for {} epochs (learning rate {}, {} hidden units)",
            dataset.len(),
            config.epochs,
            config.learning_rate,
            config.hidden_units
        );
        self.model = None;
        self.losses.clear();
        self.job = Some(job);
        self.config = Some(config);
        self.state = TrainingState::Training;

        Ok(())
    }

    /// Collect the result of the run in flight if it is ready.
    /// None while still training or when nothing was started.
    pub fn poll(&mut self) -> Option<Result<(), TrainingError>> {
        let result = self.job.as_ref()?.try_finish()?;
        self.job = None;

        Some(self.complete(result))
    }

    /// Block until the run in flight finishes
    pub fn wait(&mut self) -> Option<Result<(), TrainingError>> {
        let job = self.job.take()?;

        Some(self.complete(job.wait()))
    }

    /// Make `model` the live model, as if a run had just produced it
    pub fn install(&mut self, model: M) -> Result<(), TrainingError> {
        if self.is_training() {
            return Err(TrainingError::AlreadyTraining);
        }

        self.model = Some(ModelHandle::new(model));
        self.losses.clear();
        self.state = TrainingState::Trained;
        tracing::info!("Model installed");

        Ok(())
    }

    fn complete(&mut self, result: Result<TrainedModel<M>, ModelError>) -> Result<(), TrainingError> {
        match result {
            Ok(TrainedModel { model, losses }) => {
                if let Some((epoch, loss)) = losses.last() {
                    tracing::info!("Training finished after epoch {} with loss {}", epoch, loss);
                }
                self.model = Some(ModelHandle::new(model));
                self.losses = losses;
                self.state = TrainingState::Trained;
                Ok(())
            }
            Err(e) => {
                tracing::error!("Training failed: {}", e);
                self.model = None;
                self.state = TrainingState::Idle;
                Err(TrainingError::Model(e))
            }
        }
    }
}
