//! JSON model artifacts.
//!
//! Weights are stored under `W0, b0, W1, b1, ...` like a plain weight dump,
//! next to the matrix shapes, the normalization bounds and the config the
//! model was trained with, so a restored model predicts exactly like the saved one.

use json::{object, JsonValue};
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::SeedableRng;

use super::neural_net::{ActivationFunction, NeuralNet};
use super::normalizer::{Bounds, Normalizer};
use super::ModelError;
use crate::config::TrainingConfig;

const FORMAT: &str = "regression-playground/mlp";
const VERSION: usize = 1;

fn bad(msg: impl Into<String>) -> ModelError {
    ModelError::Artifact(msg.into())
}

fn bounds_to_json(bounds: &[Bounds]) -> JsonValue {
    let mut list = JsonValue::new_array();
    for b in bounds {
        let mut entry = object! {};
        entry["min"] = b.min.into();
        entry["max"] = b.max.into();
        // Pushing onto a fresh array cannot fail
        let _ = list.push(entry);
    }
    list
}

fn bounds_from_json(value: &JsonValue, key: &str) -> Result<Vec<Bounds>, ModelError> {
    if !value.is_array() {
        return Err(bad(format!("{} is not a list", key)));
    }

    value
        .members()
        .map(|entry| {
            let min = entry["min"].as_f64();
            let max = entry["max"].as_f64();
            match (min, max) {
                (Some(min), Some(max)) => Ok(Bounds { min, max }),
                _ => Err(bad(format!("{} holds an incomplete bound", key))),
            }
        })
        .collect()
}

fn floats(value: &JsonValue, key: &str) -> Result<Vec<f64>, ModelError> {
    if !value.is_array() {
        return Err(bad(format!("{} is missing", key)));
    }

    value
        .members()
        .map(|x| x.as_f64().ok_or_else(|| bad(format!("{} holds a non-number", key))))
        .collect()
}

fn positive(value: &JsonValue, key: &str) -> Result<usize, ModelError> {
    match value.as_usize() {
        Some(n) if n > 0 => Ok(n),
        _ => Err(bad(format!("{} must be a positive integer", key))),
    }
}

/// Write the model in JSON form
pub fn write(model: &NeuralNet) -> Result<JsonValue, ModelError> {
    let normalizer = model.normalizer.as_ref().ok_or(ModelError::NotNormalized)?;
    let mut data = object! {};

    data["format"] = FORMAT.into();
    data["version"] = VERSION.into();
    data["task"] = "regression".into();
    data["activation"] = model.activation_function.name().into();
    data["layers"] = model.layers.len().into();

    for (i, (weights, bias)) in model.layers.iter().enumerate() {
        let w: Vec<f64> = weights.iter().copied().collect();
        let b: Vec<f64> = bias.iter().copied().collect();

        data[format!("W{}", i)] = w.into();
        data[format!("W{}_shape", i)] = vec![weights.nrows(), weights.ncols()].into();
        data[format!("b{}", i)] = b.into();
    }

    let mut normalization = object! {};
    normalization["inputs"] = bounds_to_json(&normalizer.inputs);
    normalization["outputs"] = bounds_to_json(&normalizer.outputs);
    data["normalization"] = normalization;

    let config = &model.config;
    let mut training = object! {};
    training["epochs"] = config.epochs.into();
    training["learningRate"] = config.learning_rate.into();
    training["hiddenUnits"] = config.hidden_units.into();
    training["batchSize"] = config.batch_size.into();
    if let Some(seed) = config.seed {
        training["seed"] = seed.into();
    }
    data["training"] = training;

    Ok(data)
}

/// Rebuild a trained model from the output of `write`
pub fn read(text: &str) -> Result<NeuralNet, ModelError> {
    let data = json::parse(text).map_err(|e| bad(e.to_string()))?;

    if data["format"].as_str() != Some(FORMAT) {
        return Err(bad("unknown artifact format"));
    }
    if data["version"].as_usize() != Some(VERSION) {
        return Err(bad("unsupported artifact version"));
    }

    let activation = data["activation"]
        .as_str()
        .and_then(ActivationFunction::from_name)
        .ok_or_else(|| bad("unknown activation function"))?;

    let num_layers = positive(&data["layers"], "layers")?;
    let mut layers: Vec<(Array2<f64>, Array1<f64>)> = Vec::with_capacity(num_layers);

    for i in 0..num_layers {
        let w_key = format!("W{}", i);
        let b_key = format!("b{}", i);
        let shape = &data[format!("W{}_shape", i)];
        let rows = positive(&shape[0], &w_key)?;
        let cols = positive(&shape[1], &w_key)?;

        let weights = Array2::from_shape_vec((rows, cols), floats(&data[&w_key], &w_key)?)
            .map_err(|e| bad(format!("{}: {}", w_key, e)))?;
        let bias = Array1::from(floats(&data[&b_key], &b_key)?);
        if bias.len() != cols {
            return Err(bad(format!("{} does not match {}", b_key, w_key)));
        }
        if let Some((previous, _)) = layers.last() {
            if previous.ncols() != rows {
                return Err(bad(format!("{} does not follow the previous layer", w_key)));
            }
        }

        layers.push((weights, bias));
    }

    let training = &data["training"];
    let seed = training["seed"].as_u64();
    let config = TrainingConfig {
        epochs: positive(&training["epochs"], "epochs")?,
        learning_rate: training["learningRate"]
            .as_f64()
            .ok_or_else(|| bad("learningRate is missing"))?,
        hidden_units: positive(&training["hiddenUnits"], "hiddenUnits")?,
        batch_size: positive(&training["batchSize"], "batchSize")?,
        activation,
        seed,
    };

    let normalization = &data["normalization"];
    let normalizer = Normalizer {
        inputs: bounds_from_json(&normalization["inputs"], "normalization.inputs")?,
        outputs: bounds_from_json(&normalization["outputs"], "normalization.outputs")?,
    };

    let rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let mut model = NeuralNet::from_layers(layers, config, rng);
    if normalizer.inputs.len() != model.input_shape()
        || normalizer.outputs.len() != model.output_shape()
    {
        return Err(bad("normalization does not match the layer shapes"));
    }
    model.normalizer = Some(normalizer);

    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ModelFactory, Regressor, Task};
    use crate::model::neural_net::NeuralNetFactory;

    fn trained() -> NeuralNet {
        let config = TrainingConfig {
            epochs: 20,
            hidden_units: 4,
            seed: Some(3),
            ..TrainingConfig::default()
        };
        let mut net = NeuralNetFactory
            .configure(2, 1, Task::Regression, &config)
            .unwrap();
        for i in 0..6 {
            let x = i as f64;
            net.ingest(&[x, -x], &[x * x]).unwrap();
        }
        net.normalize().unwrap();
        net.train(config.epochs).unwrap();
        net
    }

    #[test]
    fn restored_model_predicts_the_same() {
        let net = trained();
        let text = net.to_artifact().unwrap();

        let restored = NeuralNetFactory.restore(&text).unwrap();

        assert_eq!(restored.layers.len(), net.layers.len());
        assert_eq!(restored.activation_function, net.activation_function);
        assert_eq!(restored.config, net.config);
        for input in [[0.0, 0.0], [2.5, -1.0], [10.0, 3.0]] {
            let a = net.predict(&input).unwrap()[0];
            let b = restored.predict(&input).unwrap()[0];
            assert!((a - b).abs() < 1e-9, "{} vs {}", a, b);
        }
    }

    #[test]
    fn weights_use_layer_keys() {
        let data = write(&trained()).unwrap();

        assert!(data.has_key("W0"));
        assert!(data.has_key("b0"));
        assert!(data.has_key("W1"));
        assert!(data.has_key("b1"));
        assert_eq!(data["W0"].len(), 2 * 4);
        assert_eq!(data["layers"].as_usize(), Some(2));
    }

    #[test]
    fn untrained_model_cannot_be_written() {
        let net = NeuralNet::new(&[2, 3, 1], &TrainingConfig::default());
        assert!(matches!(write(&net), Err(ModelError::NotNormalized)));
    }

    #[test]
    fn malformed_artifacts_are_rejected() {
        assert!(matches!(read("not json"), Err(ModelError::Artifact(_))));
        assert!(matches!(read("{}"), Err(ModelError::Artifact(_))));

        let mut data = write(&trained()).unwrap();
        data["W1_shape"] = vec![3usize, 1].into();
        assert!(matches!(read(&data.dump()), Err(ModelError::Artifact(_))));

        let mut data = write(&trained()).unwrap();
        data["activation"] = "softmax".into();
        assert!(matches!(read(&data.dump()), Err(ModelError::Artifact(_))));
    }
}
