use serde::{Deserialize, Serialize};

use crate::error::Result;

/// The serializable state of an optimizer, stored next to the model parameters in checkpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OptimizerState {
    Sgd {
        learning_rate: f32,
        momentum: f32,
        weight_decay: f32,
        velocity: Vec<f32>,
    },
}

/// Defines the strategy for updating model parameters based on calculated gradients.
pub trait Optimizer {
    /// Updates the provided slice of parameters using the accumulated gradients.
    ///
    /// # Arguments
    /// * `grad` - A reference to the model's gradient.
    /// * `params` - The parameters to update.
    ///
    /// # Returns
    /// An error if there's a mismatch in the sizes of `grad` and `params`.
    fn update_params(&mut self, grad: &[f32], params: &mut [f32]) -> Result<()>;

    /// Returns a snapshot of the optimizer's hyperparameters and buffers.
    fn state(&self) -> OptimizerState;

    /// Restores a snapshot previously taken with `state`.
    fn load_state(&mut self, state: OptimizerState) -> Result<()>;
}
