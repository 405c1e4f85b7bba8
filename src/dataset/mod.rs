use serde::Serialize;

use crate::error::{require_finite, EmptyDatasetError, ImportReport, ValidationError};

pub mod csv_format;

/// One observation: two inputs and the output they produced
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Sample {
    pub input1: f64,
    pub input2: f64,
    pub output: f64,
}

impl Sample {
    /// Build a sample, refusing NaN and infinities
    pub fn new(input1: f64, input2: f64, output: f64) -> Result<Sample, ValidationError> {
        Ok(Sample {
            input1: require_finite("input1", input1)?,
            input2: require_finite("input2", input2)?,
            output: require_finite("output", output)?,
        })
    }

    pub fn inputs(&self) -> [f64; 2] {
        [self.input1, self.input2]
    }
}

/// Summary of the output column. `NoData` stands in for an empty dataset.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Stats {
    NoData,
    Summary {
        count: usize,
        mean_output: f64,
        /// Population standard deviation (divisor is `count`)
        std_dev_output: f64,
    },
}

impl Stats {
    pub fn count(&self) -> usize {
        match self {
            Stats::NoData => 0,
            Stats::Summary { count, .. } => *count,
        }
    }
}

/// Owns the observed samples in insertion order.
///
/// Every mutation bumps `revision`, which is how the rest of the app notices
/// that derived views (the chart) have to be rebuilt.
#[derive(Debug, Default)]
pub struct DatasetStore {
    samples: Vec<Sample>,
    revision: u64,
}

impl DatasetStore {
    pub fn new() -> DatasetStore {
        DatasetStore::default()
    }

    pub fn add(&mut self, input1: f64, input2: f64, output: f64) -> Result<(), ValidationError> {
        let sample = Sample::new(input1, input2, output)?;
        self.samples.push(sample);
        self.touch();

        Ok(())
    }

    pub fn clear(&mut self) {
        self.samples.clear();
        self.touch();
    }

    /// Append every valid row of `text`. Bad rows are counted and skipped.
    pub fn import_csv(&mut self, text: &str) -> ImportReport {
        let (samples, skipped) = csv_format::parse_samples(text);
        let report = ImportReport {
            added: samples.len(),
            skipped,
        };

        if !samples.is_empty() {
            self.samples.extend(samples);
            self.touch();
        }
        tracing::info!(
            "Imported {} samples ({} rows skipped)",
            report.added,
            report.skipped
        );

        report
    }

    pub fn export_csv(&self) -> csv::Result<String> {
        csv_format::format_samples(&self.samples)
    }

    pub fn stats(&self) -> Stats {
        if self.samples.is_empty() {
            return Stats::NoData;
        }

        let count = self.samples.len();
        let n = count as f64;

        // Work on outputs scaled into [-1, 1] so sums and deviations of
        // values near f64::MAX stay finite
        let scale = self
            .samples
            .iter()
            .map(|s| s.output.abs())
            .fold(0f64, f64::max);
        if scale == 0f64 {
            return Stats::Summary {
                count,
                mean_output: 0f64,
                std_dev_output: 0f64,
            };
        }

        let scaled: Vec<f64> = self.samples.iter().map(|s| s.output / scale).collect();
        let mean = scaled.iter().map(|y| y / n).sum::<f64>();
        let variance = scaled.iter().map(|y| (y - mean).powi(2)).sum::<f64>() / n;

        Stats::Summary {
            count,
            mean_output: mean * scale,
            std_dev_output: variance.sqrt() * scale,
        }
    }

    pub fn min_input1(&self) -> Result<f64, EmptyDatasetError> {
        self.samples
            .iter()
            .map(|s| s.input1)
            .reduce(f64::min)
            .ok_or(EmptyDatasetError)
    }

    pub fn max_input1(&self) -> Result<f64, EmptyDatasetError> {
        self.samples
            .iter()
            .map(|s| s.input1)
            .reduce(f64::max)
            .ok_or(EmptyDatasetError)
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn touch(&mut self) {
        self.revision += 1;
    }
}
