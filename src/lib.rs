//! Trains a CTC handwriting recognition model from a symbol table and text tables of images.

pub mod config;
pub mod driver;
pub mod model;

pub use config::{Args, Device, ModelConfig, StdWindow, TrainingConfig};
pub use driver::train;
pub use model::build_model;
