pub mod app;
pub mod chart;
pub mod config;
pub mod controller;
pub mod dataset;
pub mod error;
pub mod logging;
pub mod model;

use app::Playground;
use chart::JsonChartWriter;
use clap::Parser;
use config::TrainingConfig;
use controller::prediction::format_prediction;
use dataset::Stats;
use error::{PersistError, PredictionError, TrainingError, ValidationError};
use model::neural_net::{ActivationFunction, NeuralNetFactory};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// CSV file to import, with an `input1,input2,output` header line
    #[arg(short, long)]
    data: Option<PathBuf>,

    /// Record a sample, e.g. --add 1.5,-2,3 (repeatable)
    #[arg(long, value_parser = parse_record, allow_hyphen_values = true)]
    add: Vec<[f64; 3]>,

    /// Number of epochs to train the network for
    #[arg(short, long, default_value_t = 50)]
    epochs: usize,

    /// Learning rate of the network
    #[arg(short, long, default_value_t = 0.2)]
    learning_rate: f64,

    /// Width of the hidden layer
    #[arg(long, default_value_t = 16)]
    hidden_units: usize,

    /// Batch size of the network
    #[arg(short, long, default_value_t = 32)]
    batch_size: usize,

    /// Activation function used by the hidden layer
    #[arg(short, long, value_enum, default_value_t = ActivationFunction::Sigmoid)]
    activation_function: ActivationFunction,

    /// Seed for weight initialisation and shuffling
    #[arg(long)]
    seed: Option<u64>,

    /// Train a model on the collected samples
    #[arg(short, long)]
    train: bool,

    /// Load a previously saved model instead of starting untrained
    #[arg(long)]
    load_model: Option<PathBuf>,

    /// Save the trained model here (JSON)
    #[arg(long)]
    save_model: Option<PathBuf>,

    /// Predict the output for input1,input2 (repeatable)
    #[arg(short, long, value_parser = parse_inputs, allow_hyphen_values = true)]
    predict: Vec<[f64; 2]>,

    /// Export the collected samples as CSV
    #[arg(long)]
    export: Option<PathBuf>,

    /// Write the chart series (points and predicted line) as JSON
    #[arg(long)]
    chart_path: Option<PathBuf>,

    /// Save the loss in a "epoch    loss" format
    #[arg(long)]
    loss_path: Option<PathBuf>,

    /// More log output (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Args {
    fn training_config(&self) -> TrainingConfig {
        TrainingConfig {
            epochs: self.epochs,
            learning_rate: self.learning_rate,
            hidden_units: self.hidden_units,
            batch_size: self.batch_size,
            activation: self.activation_function,
            seed: self.seed,
        }
    }
}

/// Everything that can stop a run of the tool
#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("{path}: {source}")]
    File { path: PathBuf, source: io::Error },
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Training(#[from] TrainingError),
    #[error(transparent)]
    Prediction(#[from] PredictionError),
    #[error(transparent)]
    Persist(#[from] PersistError),
}

fn file_error(path: &Path) -> impl FnOnce(io::Error) -> CliError + '_ {
    move |source| CliError::File {
        path: path.to_path_buf(),
        source,
    }
}

/// Parse a comma separated list of exactly N numbers
fn parse_numbers<const N: usize>(s: &str) -> Result<[f64; N], String> {
    let values = s
        .split(',')
        .map(|x| x.trim().parse::<f64>().map_err(|e| format!("{:?}: {}", x, e)))
        .collect::<Result<Vec<f64>, String>>()?;

    values
        .try_into()
        .map_err(|v: Vec<f64>| format!("expected {} numbers, got {}", N, v.len()))
}

fn parse_record(s: &str) -> Result<[f64; 3], String> {
    parse_numbers::<3>(s)
}

fn parse_inputs(s: &str) -> Result<[f64; 2], String> {
    parse_numbers::<2>(s)
}

/// Write the losses to a debug file
fn write_losses(loss_path: &Path, losses: &[(usize, f64)]) -> io::Result<()> {
    let mut file = File::create(loss_path)?;

    for (x, y) in losses {
        file.write_all(format!("{}    {}\n", x, y).as_bytes())?;
    }

    Ok(())
}

fn print_stats(stats: Stats) {
    match stats {
        Stats::NoData => println!("No data"),
        Stats::Summary {
            count,
            mean_output,
            std_dev_output,
        } => println!(
            "Samples: {}, mean output: {:.4}, std dev: {:.4}",
            count, mean_output, std_dev_output
        ),
    }
}

fn run(args: Args) -> Result<(), CliError> {
    let config = args.training_config();
    config.validate()?;
    let mut app = Playground::new(NeuralNetFactory, config);

    if let Some(path) = &args.load_model {
        app.load_model(path)?;
    }

    if let Some(path) = &args.data {
        let text = fs::read_to_string(path).map_err(file_error(path))?;
        let report = app.import_csv(&text);
        println!("Imported {} rows, skipped {}", report.added, report.skipped);
    }

    for [input1, input2, output] in &args.add {
        app.add_sample(*input1, *input2, *output)?;
    }

    print_stats(app.stats());

    if args.train {
        app.start_training()?;
        println!("Training...");
        if let Some(result) = app.wait_for_training() {
            result?;
        }
        if let Some((epoch, loss)) = app.loss_history().last() {
            println!("Trained, final loss {:.6} after epoch {}", loss, epoch);
        }

        if let Some(path) = &args.loss_path {
            write_losses(path, app.loss_history()).map_err(file_error(path))?;
        }
    }

    if let Some(path) = &args.save_model {
        app.save_model(path)?;
    }

    for [input1, input2] in &args.predict {
        let value = app.predict(*input1, *input2)?;
        println!("f({}, {}) = {}", input1, input2, format_prediction(value));
    }

    if let Some(path) = &args.export {
        fs::write(path, app.export_csv()?).map_err(file_error(path))?;
    }

    if let Some(path) = &args.chart_path {
        app.render(&mut JsonChartWriter::new(path))
            .map_err(file_error(path))?;
    }

    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = logging::init(args.verbose) {
        eprintln!("{}", e);
    }

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
