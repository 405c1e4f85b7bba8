pub mod prediction;
pub mod training;

pub use training::{TrainingController, TrainingState};
