use super::ModelError;

/// Min-max bounds of one column
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
}

impl Bounds {
    fn of(values: impl Iterator<Item = f64>) -> Bounds {
        values.fold(
            Bounds {
                min: f64::INFINITY,
                max: f64::NEG_INFINITY,
            },
            |b, x| Bounds {
                min: b.min.min(x),
                max: b.max.max(x),
            },
        )
    }

    /// Map into [0, 1]. A column with a single value maps to 0.
    pub fn scale(&self, x: f64) -> f64 {
        if self.max > self.min {
            (x - self.min) / (self.max - self.min)
        } else {
            0f64
        }
    }

    pub fn unscale(&self, x: f64) -> f64 {
        if self.max > self.min {
            x * (self.max - self.min) + self.min
        } else {
            self.min
        }
    }
}

/// Per-column min-max scaling learned from the ingested samples
#[derive(Clone, Debug, PartialEq)]
pub struct Normalizer {
    pub inputs: Vec<Bounds>,
    pub outputs: Vec<Bounds>,
}

impl Normalizer {
    pub fn fit(inputs: &[Vec<f64>], outputs: &[Vec<f64>]) -> Result<Normalizer, ModelError> {
        let (Some(first_input), Some(first_output)) = (inputs.first(), outputs.first()) else {
            return Err(ModelError::NoData);
        };

        let column_bounds = |rows: &[Vec<f64>], width: usize| -> Vec<Bounds> {
            (0..width)
                .map(|col| Bounds::of(rows.iter().map(|row| row[col])))
                .collect()
        };

        Ok(Normalizer {
            inputs: column_bounds(inputs, first_input.len()),
            outputs: column_bounds(outputs, first_output.len()),
        })
    }

    pub fn scale_inputs(&self, row: &[f64]) -> Vec<f64> {
        self.inputs.iter().zip(row).map(|(b, x)| b.scale(*x)).collect()
    }

    pub fn scale_outputs(&self, row: &[f64]) -> Vec<f64> {
        self.outputs.iter().zip(row).map(|(b, x)| b.scale(*x)).collect()
    }

    pub fn unscale_outputs(&self, row: &[f64]) -> Vec<f64> {
        self.outputs.iter().zip(row).map(|(b, x)| b.unscale(*x)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scales_each_column_to_unit_range() {
        let inputs = vec![vec![0.0, 10.0], vec![5.0, 20.0], vec![10.0, 30.0]];
        let outputs = vec![vec![-1.0], vec![0.0], vec![1.0]];
        let normalizer = Normalizer::fit(&inputs, &outputs).unwrap();

        assert_eq!(normalizer.scale_inputs(&[5.0, 30.0]), vec![0.5, 1.0]);
        assert_eq!(normalizer.scale_outputs(&[-1.0]), vec![0.0]);
        assert_eq!(normalizer.unscale_outputs(&[0.75]), vec![0.5]);
    }

    #[test]
    fn constant_column_maps_to_zero_and_back() {
        let inputs = vec![vec![3.0, 1.0], vec![3.0, 2.0]];
        let outputs = vec![vec![7.0], vec![7.0]];
        let normalizer = Normalizer::fit(&inputs, &outputs).unwrap();

        assert_eq!(normalizer.scale_inputs(&[3.0, 1.5]), vec![0.0, 0.5]);
        assert_eq!(normalizer.unscale_outputs(&[0.3]), vec![7.0]);
    }

    #[test]
    fn fitting_nothing_fails() {
        assert!(matches!(
            Normalizer::fit(&[], &[]),
            Err(ModelError::NoData)
        ));
    }
}
