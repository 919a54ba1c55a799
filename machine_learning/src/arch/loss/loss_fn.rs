use ndarray::Array2;

use crate::{Result, sequence::PackedSequence};

/// The value of a loss over a batch together with its derivative.
#[derive(Debug, Clone)]
pub struct LossOutput {
    /// Mean loss over the samples that could be scored.
    pub loss: f32,
    /// Derivative of `loss` with respect to every output frame.
    pub grad: Array2<f32>,
    /// Amount of samples that contributed to `loss`.
    pub scored: usize,
}

/// A sequence objective comparing packed model outputs with symbol targets.
pub trait LossFn {
    /// Computes the loss of a batch and its gradient with respect to `output`.
    ///
    /// # Arguments
    /// * `output` - The model's packed output, one row of scores per frame.
    /// * `targets` - The target symbol sequence of every sample in the batch.
    fn loss(&self, output: &PackedSequence, targets: &[Vec<usize>]) -> Result<LossOutput>;

    /// Turns the packed output into one symbol sequence per sample.
    fn decode(&self, output: &PackedSequence) -> Vec<Vec<usize>>;
}
