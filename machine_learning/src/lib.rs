pub mod arch;
pub mod data;
pub mod error;
pub mod optimization;
pub mod sequence;
pub mod training;

pub use error::{MlErr, Result};
