use crate::config::TrainingConfig;
use ndarray::{Array, Array1, Array2, ArrayView2, Axis};
use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use super::normalizer::Normalizer;
use super::{LossHistory, ModelError, ModelFactory, Regressor, Task};

/// Represents a fully-connected regression network
pub struct NeuralNet {
    pub layers: Vec<(Array2<f64>, Array1<f64>)>, // Each layer holds a weight matrix and a bias vector
    pub batch_size: usize,                       // Training hyperparams
    pub learning_rate: f64,
    pub activation_function: ActivationFunction,
    pub normalizer: Option<Normalizer>,
    pub config: TrainingConfig,
    inputs: Vec<Vec<f64>>,
    targets: Vec<Vec<f64>>,
    rng: StdRng,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActivationFunction {
    #[value(name = "relu")]
    ReLU,
    Sigmoid,
    Tanh,
    Linear,
    #[value(name = "leaky-relu")]
    LeakyReLU,
}

impl ActivationFunction {
    pub fn name(&self) -> &'static str {
        match self {
            ActivationFunction::ReLU => "relu",
            ActivationFunction::Sigmoid => "sigmoid",
            ActivationFunction::Tanh => "tanh",
            ActivationFunction::Linear => "linear",
            ActivationFunction::LeakyReLU => "leaky-relu",
        }
    }

    pub fn from_name(name: &str) -> Option<ActivationFunction> {
        <ActivationFunction as clap::ValueEnum>::from_str(name, true).ok()
    }
}

impl NeuralNet {
    /// Construct a new neural net according to the specified hyperparams
    pub fn new(layer_structure: &[usize], config: &TrainingConfig) -> NeuralNet {
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let layers = init_layers_xavier(layer_structure, &mut rng);

        NeuralNet::from_layers(layers, config.clone(), rng)
    }

    /// Wrap already-known weights, e.g. ones read back from an artifact
    pub fn from_layers(
        layers: Vec<(Array2<f64>, Array1<f64>)>,
        config: TrainingConfig,
        rng: StdRng,
    ) -> NeuralNet {
        NeuralNet {
            layers,
            batch_size: config.batch_size,
            learning_rate: config.learning_rate,
            activation_function: config.activation,
            normalizer: None,
            config,
            inputs: vec![],
            targets: vec![],
            rng,
        }
    }

    pub fn input_shape(&self) -> usize {
        self.layers.first().map_or(0, |(w, _)| w.nrows())
    }

    pub fn output_shape(&self) -> usize {
        self.layers.last().map_or(0, |(w, _)| w.ncols())
    }

    // Perform a forward pass of the network on some input.
    // Returns the outputs of the layers, and the non-activated outputs of the layers (used for backprop)
    fn forward(&self, inputs: &ArrayView2<f64>) -> (Vec<Array2<f64>>, Vec<Array2<f64>>) {
        // The first layer is a passthrough layer, so it outputs whatever its input is
        let mut hidden = vec![inputs.to_owned()];
        let mut hidden_linear = vec![];
        let last = self.layers.len().saturating_sub(1);

        for (idx, (weights, bias)) in self.layers.iter().enumerate() {
            let lin_output = hidden[idx].dot(weights) + bias;
            // Hidden layers apply the activation, the output layer stays linear
            let real_output = if idx == last {
                lin_output.clone()
            } else {
                lin_output.mapv(|z| activation(&self.activation_function, z))
            };

            hidden.push(real_output);
            hidden_linear.push(lin_output);
        }

        (hidden, hidden_linear)
    }

    /// Network output for a batch of already-normalized rows
    fn output(&self, inputs: &ArrayView2<f64>) -> Array2<f64> {
        let last = self.layers.len().saturating_sub(1);

        self.layers
            .iter()
            .enumerate()
            .fold(inputs.to_owned(), |acc, (idx, (weights, bias))| {
                let lin_output = acc.dot(weights) + bias;
                if idx == last {
                    lin_output
                } else {
                    lin_output.mapv(|z| activation(&self.activation_function, z))
                }
            })
    }

    /// Calculate the gradients using backprop and perform a GD step
    fn backward_and_update(
        &mut self,
        hidden: Vec<Array2<f64>>,
        hidden_linear: Vec<Array2<f64>>,
        grad: Array2<f64>,
    ) {
        let rate = self.learning_rate;
        // The gradient WRT the current layer
        let mut grad_help = grad;

        for idx in (0..self.layers.len()).rev() {
            // Hidden layers pass the gradient through the activation
            if idx != self.layers.len() - 1 {
                let step_mat = hidden_linear[idx]
                    .mapv(|x| delta_activation(&self.activation_function, x));
                grad_help = grad_help * step_mat;
            }

            let weight_grad = hidden[idx].t().dot(&grad_help);
            let bias_grad = grad_help.sum_axis(Axis(0));
            // Propagate with the weights as they were before this step
            let next_grad = grad_help.dot(&self.layers[idx].0.t());

            let (weights, bias) = &mut self.layers[idx];
            weights.scaled_add(-rate, &weight_grad);
            bias.scaled_add(-rate, &bias_grad);

            grad_help = next_grad;
        }
    }

    /// Stack the ingested rows into normalized input and target matrices
    fn training_matrices(
        &self,
        normalizer: &Normalizer,
    ) -> Result<(Array2<f64>, Array2<f64>), ModelError> {
        let data = stack_rows(
            self.inputs.iter().map(|row| normalizer.scale_inputs(row)),
            self.input_shape(),
        )?;
        let target = stack_rows(
            self.targets.iter().map(|row| normalizer.scale_outputs(row)),
            self.output_shape(),
        )?;

        Ok((data, target))
    }

    fn check_width(expected: usize, values: &[f64]) -> Result<(), ModelError> {
        if values.len() == expected {
            Ok(())
        } else {
            Err(ModelError::ShapeMismatch {
                expected,
                got: values.len(),
            })
        }
    }
}

impl Regressor for NeuralNet {
    fn ingest(&mut self, inputs: &[f64], outputs: &[f64]) -> Result<(), ModelError> {
        NeuralNet::check_width(self.input_shape(), inputs)?;
        NeuralNet::check_width(self.output_shape(), outputs)?;

        self.inputs.push(inputs.to_vec());
        self.targets.push(outputs.to_vec());

        Ok(())
    }

    fn normalize(&mut self) -> Result<(), ModelError> {
        self.normalizer = Some(Normalizer::fit(&self.inputs, &self.targets)?);

        Ok(())
    }

    /// Fit the model to the ingested samples
    /// Return the mean squared error after every epoch
    fn train(&mut self, epochs: usize) -> Result<LossHistory, ModelError> {
        if self.inputs.is_empty() {
            return Err(ModelError::NoData);
        }
        let normalizer = self.normalizer.clone().ok_or(ModelError::NotNormalized)?;
        let (data, target) = self.training_matrices(&normalizer)?;
        let mut order: Vec<usize> = (0..data.nrows()).collect();
        let mut losses = vec![];

        for num_epoch in 0..epochs {
            order.shuffle(&mut self.rng);

            for batch in order.chunks(self.batch_size.max(1)) {
                let input_batch = data.select(Axis(0), batch);
                let target_batch = target.select(Axis(0), batch);
                let (hidden, hidden_linear) = self.forward(&input_batch.view());
                let predictions = &hidden[hidden.len() - 1];

                // Gradient of the mean squared error WRT the output layer
                let grad = (predictions - &target_batch) / batch.len() as f64;

                self.backward_and_update(hidden, hidden_linear, grad);
            }

            let loss = mean_squared_error(&self.output(&data.view()), &target.view());
            if !loss.is_finite() {
                tracing::error!("Training diverged at epoch {}", num_epoch);
                return Err(ModelError::Diverged { epoch: num_epoch });
            }
            tracing::debug!("epoch {} loss {}", num_epoch, loss);

            losses.push((num_epoch, loss));
        }

        Ok(losses)
    }

    /// Predict the outputs for one instance, in the units of the ingested data
    fn predict(&self, inputs: &[f64]) -> Result<Vec<f64>, ModelError> {
        NeuralNet::check_width(self.input_shape(), inputs)?;
        let normalizer = self.normalizer.as_ref().ok_or(ModelError::NotNormalized)?;

        let row = Array1::from(normalizer.scale_inputs(inputs)).insert_axis(Axis(0));
        let scores = self.output(&row.view());
        let scaled: Vec<f64> = scores.iter().copied().collect();

        Ok(normalizer.unscale_outputs(&scaled))
    }

    fn to_artifact(&self) -> Result<String, ModelError> {
        Ok(super::artifact::write(self)?.dump())
    }
}

/// Builds `[input, hidden, output]` networks from a training config
#[derive(Clone, Copy, Debug, Default)]
pub struct NeuralNetFactory;

impl ModelFactory for NeuralNetFactory {
    type Model = NeuralNet;

    fn configure(
        &self,
        input_shape: usize,
        output_shape: usize,
        task: Task,
        config: &TrainingConfig,
    ) -> Result<NeuralNet, ModelError> {
        match task {
            // Regression keeps a linear output layer and a squared-error loss
            Task::Regression => Ok(NeuralNet::new(
                &[input_shape, config.hidden_units, output_shape],
                config,
            )),
        }
    }

    fn restore(&self, artifact: &str) -> Result<NeuralNet, ModelError> {
        super::artifact::read(artifact)
    }
}

fn activation(name: &ActivationFunction, z: f64) -> f64 {
    match name {
        ActivationFunction::ReLU => z.max(0f64),
        ActivationFunction::Sigmoid => (1f64 + (-z).exp()).recip(),
        ActivationFunction::Tanh => z.tanh(),
        ActivationFunction::Linear => z,
        ActivationFunction::LeakyReLU => z.max(0.01 * z),
    }
}

fn delta_activation(name: &ActivationFunction, z: f64) -> f64 {
    match name {
        ActivationFunction::ReLU => {
            if z > 0f64 {
                1f64
            } else {
                0f64
            }
        }
        ActivationFunction::Sigmoid => activation(name, z) * (1f64 - activation(name, z)),
        ActivationFunction::Tanh => 1f64 - activation(name, z) * activation(name, z),
        ActivationFunction::Linear => 1f64,
        ActivationFunction::LeakyReLU => {
            if z > 0f64 {
                1f64
            } else {
                0.01f64
            }
        }
    }
}

/// Lay `rows` out as a matrix `width` columns wide
fn stack_rows(
    rows: impl Iterator<Item = Vec<f64>>,
    width: usize,
) -> Result<Array2<f64>, ModelError> {
    let mut count = 0;
    let flat: Vec<f64> = rows.inspect(|_| count += 1).flatten().collect();

    let expected = count * width;
    let got = flat.len();
    Array2::from_shape_vec((count, width), flat)
        .map_err(|_| ModelError::ShapeMismatch { expected, got })
}

fn init_layers_xavier(layer_structure: &[usize], rng: &mut StdRng) -> Vec<(Array2<f64>, Array1<f64>)> {
    let mut layers = vec![];

    for i in 0..layer_structure.len().saturating_sub(1) {
        let boundary = (6f64 / (layer_structure[i] + layer_structure[i + 1]) as f64).sqrt();
        let dist = Uniform::new_inclusive(-boundary, boundary);

        let weights = Array::zeros((layer_structure[i], layer_structure[i + 1]))
            .map(|_: &f64| dist.sample(rng));
        let bias = Array::zeros(layer_structure[i + 1]);

        layers.push((weights, bias));
    }

    layers
}

/// Mean squared error over every entry of a batch
fn mean_squared_error(predictions: &Array2<f64>, target: &ArrayView2<f64>) -> f64 {
    let diff = predictions - target;

    diff.mapv(|x| x * x).mean().unwrap_or(0f64)
}
