mod optimizer;
mod sgd;

pub use optimizer::{Optimizer, OptimizerState};
pub use sgd::Sgd;
