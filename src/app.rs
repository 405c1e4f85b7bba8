use std::fs;
use std::path::Path;

use crate::chart::{self, ChartRenderer, ChartSeries};
use crate::config::TrainingConfig;
use crate::controller::{prediction, TrainingController, TrainingState};
use crate::dataset::{DatasetStore, Stats};
use crate::error::{ImportReport, PersistError, PredictionError, TrainingError, ValidationError};
use crate::model::{LossHistory, ModelError, ModelFactory};

/// All application state in one place: the samples, the config form, the
/// training controller and the chart derived from them.
///
/// The chart is rebuilt whenever the samples or the live model change.
pub struct Playground<F: ModelFactory> {
    factory: F,
    dataset: DatasetStore,
    config: TrainingConfig,
    training: TrainingController<F::Model>,
    chart: ChartSeries,
    charted_revision: u64,
}

impl<F: ModelFactory> Playground<F> {
    pub fn new(factory: F, config: TrainingConfig) -> Playground<F> {
        let dataset = DatasetStore::new();
        let charted_revision = dataset.revision();

        Playground {
            factory,
            dataset,
            config,
            training: TrainingController::new(),
            chart: ChartSeries::default(),
            charted_revision,
        }
    }

    pub fn dataset(&self) -> &DatasetStore {
        &self.dataset
    }

    pub fn stats(&self) -> Stats {
        self.dataset.stats()
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Replace the config used by the next training run
    pub fn set_config(&mut self, config: TrainingConfig) -> Result<(), ValidationError> {
        config.validate()?;
        self.config = config;

        Ok(())
    }

    pub fn training_state(&self) -> TrainingState {
        self.training.state()
    }

    pub fn loss_history(&self) -> &LossHistory {
        self.training.loss_history()
    }

    pub fn chart(&self) -> &ChartSeries {
        &self.chart
    }

    pub fn add_sample(&mut self, input1: f64, input2: f64, output: f64) -> Result<(), ValidationError> {
        self.dataset.add(input1, input2, output)?;
        self.sync_chart(false);

        Ok(())
    }

    pub fn clear(&mut self) {
        self.dataset.clear();
        self.sync_chart(false);
    }

    pub fn import_csv(&mut self, text: &str) -> ImportReport {
        let report = self.dataset.import_csv(text);
        self.sync_chart(false);

        report
    }

    pub fn export_csv(&self) -> csv::Result<String> {
        self.dataset.export_csv()
    }

    /// Start training on the current samples with the current config
    pub fn start_training(&mut self) -> Result<(), TrainingError> {
        self.training
            .start_training(&self.dataset, &self.config, &self.factory)?;
        // The old model is gone, and with it the predicted line
        self.sync_chart(true);

        Ok(())
    }

    /// Pick up a finished run without blocking
    pub fn poll_training(&mut self) -> Option<Result<(), TrainingError>> {
        let result = self.training.poll()?;
        self.sync_chart(true);

        Some(result)
    }

    /// Block until the run in flight finishes
    pub fn wait_for_training(&mut self) -> Option<Result<(), TrainingError>> {
        let result = self.training.wait()?;
        self.sync_chart(true);

        Some(result)
    }

    pub fn predict(&self, input1: f64, input2: f64) -> Result<f64, PredictionError> {
        prediction::predict(input1, input2, self.training.trained_model())
    }

    pub fn save_model(&self, path: &Path) -> Result<(), PersistError> {
        let model = self
            .training
            .trained_model()
            .ok_or(PersistError::ModelNotReady)?;

        fs::write(path, model.persist()?).map_err(ModelError::from)?;
        tracing::info!("Model saved to {}", path.display());

        Ok(())
    }

    /// Replace the live model with one read from `path`
    pub fn load_model(&mut self, path: &Path) -> Result<(), PersistError> {
        if self.training.is_training() {
            return Err(PersistError::AlreadyTraining);
        }

        let artifact = fs::read_to_string(path).map_err(ModelError::from)?;
        let model = self.factory.restore(&artifact)?;
        self.training
            .install(model)
            .map_err(|_| PersistError::AlreadyTraining)?;
        tracing::info!("Model loaded from {}", path.display());
        self.sync_chart(true);

        Ok(())
    }

    pub fn render(&self, renderer: &mut dyn ChartRenderer) -> std::io::Result<()> {
        renderer.redraw(&self.chart)
    }

    fn sync_chart(&mut self, model_changed: bool) {
        if !model_changed && self.dataset.revision() == self.charted_revision {
            return;
        }

        let model = self.training.trained_model();
        self.chart = chart::project(
            &self.dataset,
            model.map(|m| move |x1: f64, x2: f64| m.predict(x1, x2)),
        );
        self.charted_revision = self.dataset.revision();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::fake::FakeFactory;
    use crate::model::neural_net::{ActivationFunction, NeuralNetFactory};
    use std::sync::mpsc;
    use std::thread;

    fn playground() -> Playground<FakeFactory> {
        Playground::new(FakeFactory::default(), TrainingConfig::default())
    }

    fn fill(app: &mut Playground<FakeFactory>, count: usize) {
        for i in 0..count {
            let x = i as f64;
            app.add_sample(x, 1.0, x * 3.0).unwrap();
        }
    }

    #[test]
    fn dataset_changes_redraw_the_scatter() {
        let mut app = playground();
        fill(&mut app, 2);
        assert_eq!(app.chart().points.len(), 2);
        assert_eq!(app.chart().points[1].r, 7.0);

        let report = app.import_csv("input1,input2,output\n5,0,1\nbad\n");
        assert_eq!(report, ImportReport { added: 1, skipped: 1 });
        assert_eq!(app.chart().points.len(), 3);

        app.clear();
        assert!(app.chart().points.is_empty());
    }

    #[test]
    fn invalid_sample_leaves_everything_unchanged() {
        let mut app = playground();
        fill(&mut app, 1);

        assert!(app.add_sample(f64::NAN, 0.0, 0.0).is_err());
        assert_eq!(app.stats().count(), 1);
        assert_eq!(app.chart().points.len(), 1);
    }

    #[test]
    fn finished_training_draws_the_predicted_line() {
        let mut app = playground();
        fill(&mut app, 4);
        assert!(app.chart().predicted_line.is_empty());

        app.start_training().unwrap();
        app.wait_for_training().unwrap().unwrap();

        assert_eq!(app.training_state(), TrainingState::Trained);
        assert_eq!(app.chart().predicted_line.len(), 21);
        assert_eq!(app.chart().predicted_line[0].x, 0.0);
        assert_eq!(app.chart().predicted_line[20].x, 3.0);
        assert_eq!(app.predict(1.0, 1.0).unwrap(), 4.0);
    }

    #[test]
    fn polling_picks_up_the_finished_run() {
        let (release, gate) = mpsc::channel();
        let mut app = Playground::new(FakeFactory::gated(gate), TrainingConfig::default());
        fill(&mut app, 4);

        app.start_training().unwrap();
        assert!(app.poll_training().is_none());
        assert_eq!(app.training_state(), TrainingState::Training);
        assert!(app.chart().predicted_line.is_empty());

        release.send(()).unwrap();
        let result = loop {
            if let Some(result) = app.poll_training() {
                break result;
            }
            thread::yield_now();
        };

        assert!(result.is_ok());
        assert_eq!(app.training_state(), TrainingState::Trained);
        assert_eq!(app.chart().predicted_line.len(), 21);
        assert!(app.chart().predicted_line.iter().all(|p| p.y == 4.0));
        assert!(app.poll_training().is_none());
    }

    #[test]
    fn config_edits_during_a_run_apply_to_the_next_one() {
        let (release, gate) = mpsc::channel();
        let config = TrainingConfig {
            epochs: 2,
            ..TrainingConfig::default()
        };
        let mut app = Playground::new(FakeFactory::gated(gate), config);
        fill(&mut app, 4);

        app.start_training().unwrap();
        app.set_config(TrainingConfig {
            epochs: 40,
            ..TrainingConfig::default()
        })
        .unwrap();
        release.send(()).unwrap();
        app.wait_for_training().unwrap().unwrap();

        assert_eq!(app.loss_history().len(), 2);
        assert_eq!(app.config().epochs, 40);

        app.start_training().unwrap();
        app.wait_for_training().unwrap().unwrap();
        assert_eq!(app.loss_history().len(), 40);
    }

    #[test]
    fn predict_before_training_is_not_ready() {
        let mut app = playground();
        fill(&mut app, 4);

        assert!(matches!(app.predict(1.0, 1.0), Err(PredictionError::ModelNotReady)));
    }

    #[test]
    fn training_with_three_samples_is_refused() {
        let mut app = playground();
        fill(&mut app, 3);

        assert!(matches!(
            app.start_training(),
            Err(TrainingError::InsufficientData { count: 3, .. })
        ));
        assert_eq!(app.training_state(), TrainingState::Idle);
    }

    #[test]
    fn failed_training_is_surfaced() {
        let mut app = Playground::new(FakeFactory::failing(), TrainingConfig::default());
        fill(&mut app, 4);

        app.start_training().unwrap();
        assert!(app.wait_for_training().unwrap().is_err());
        assert_eq!(app.training_state(), TrainingState::Idle);
        assert!(app.chart().predicted_line.is_empty());
    }

    #[test]
    fn set_config_validates() {
        let mut app = playground();
        let bad = TrainingConfig {
            learning_rate: 0.0,
            ..TrainingConfig::default()
        };

        assert!(app.set_config(bad).is_err());
        assert_eq!(app.config(), &TrainingConfig::default());
    }

    #[test]
    fn save_without_model_is_not_ready() {
        let dir = tempfile::tempdir().unwrap();
        let app = playground();

        assert!(matches!(
            app.save_model(&dir.path().join("model.json")),
            Err(PersistError::ModelNotReady)
        ));
    }

    #[test]
    fn save_and_load_round_trip_with_the_network() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        let config = TrainingConfig {
            epochs: 30,
            hidden_units: 6,
            batch_size: 8,
            activation: ActivationFunction::Tanh,
            seed: Some(11),
            ..TrainingConfig::default()
        };

        let mut trainer = Playground::new(NeuralNetFactory, config.clone());
        for i in 0..8 {
            let x = i as f64;
            trainer.add_sample(x, x / 2.0, 3.0 * x - 1.0).unwrap();
        }
        trainer.start_training().unwrap();
        trainer.wait_for_training().unwrap().unwrap();
        assert_eq!(trainer.loss_history().len(), 30);
        trainer.save_model(&path).unwrap();

        let mut viewer = Playground::new(NeuralNetFactory, config);
        viewer.load_model(&path).unwrap();

        assert_eq!(viewer.training_state(), TrainingState::Trained);
        let a = trainer.predict(2.0, 0.5).unwrap();
        let b = viewer.predict(2.0, 0.5).unwrap();
        assert!((a - b).abs() < 1e-9, "{} vs {}", a, b);
    }

    #[test]
    fn loading_garbage_fails_and_keeps_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        std::fs::write(&path, "garbage").unwrap();
        let mut app = playground();

        assert!(matches!(
            app.load_model(&path),
            Err(PersistError::Model(ModelError::Artifact(_)))
        ));
        assert_eq!(app.training_state(), TrainingState::Idle);

        assert!(matches!(
            app.load_model(&dir.path().join("missing.json")),
            Err(PersistError::Model(ModelError::Io(_)))
        ));
    }
}
