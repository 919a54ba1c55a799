use ndarray::Array2;
use rand::Rng;

use crate::{error::Result, sequence::PackedSequence};

/// A differentiable function of a flat parameter vector.
///
/// The model does not own its parameters, they are handed in on every call so the trainer,
/// the optimizer and the checkpointing code all work on the same buffer.
pub trait Model {
    /// Returns the amount of parameters in the model.
    fn size(&self) -> usize;

    /// Draws a fresh set of parameters.
    fn init_params<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Vec<f32>>;

    /// Computes the output of the model for a packed batch, keeping whatever the backward pass
    /// needs.
    ///
    /// # Arguments
    /// * `params` - The model's parameters.
    /// * `x` - The packed input frames.
    ///
    /// # Returns
    /// The packed output frames.
    fn forward(&mut self, params: &[f32], x: &PackedSequence) -> Result<PackedSequence>;

    /// Backpropagates `d`, the derivative of the loss with respect to the last output, **adding**
    /// the parameter gradient to `grad`.
    ///
    /// # Arguments
    /// * `params` - The parameters used in the last `forward` call.
    /// * `grad` - The gradient accumulator, same length as `params`.
    /// * `d` - The output deltas, one row per output frame.
    fn backward(&mut self, params: &[f32], grad: &mut [f32], d: Array2<f32>) -> Result<()>;
}
