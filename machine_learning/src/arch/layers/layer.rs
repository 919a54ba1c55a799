use ndarray::Array2;
use rand::Rng;

use super::{BiRnn, Dense};
use crate::{Result, arch::activations::ActFn, sequence::PackedSequence};

/// The closed set of layers a `Sequential` can be built from.
#[derive(Debug, Clone)]
pub enum Layer {
    Dense(Dense),
    BiRnn(BiRnn),
}
use Layer::*;

impl Layer {
    pub fn dense(dim: (usize, usize), act_fn: Option<ActFn>) -> Self {
        Self::Dense(Dense::new(dim, act_fn))
    }

    pub fn birnn(input: usize, hidden: usize) -> Self {
        Self::BiRnn(BiRnn::new(input, hidden))
    }

    /// Returns the amount of parameters of the layer.
    pub fn size(&self) -> usize {
        match self {
            Dense(l) => l.size(),
            BiRnn(l) => l.size(),
        }
    }

    pub fn init_params<R: Rng + ?Sized>(&self, params: &mut [f32], rng: &mut R) -> Result<()> {
        match self {
            Dense(l) => l.init_params(params, rng),
            BiRnn(l) => l.init_params(params, rng),
        }
    }

    pub fn forward(&mut self, params: &[f32], x: &PackedSequence) -> Result<PackedSequence> {
        match self {
            Dense(l) => l.forward(params, x),
            BiRnn(l) => l.forward(params, x),
        }
    }

    pub fn backward(
        &mut self,
        params: &[f32],
        grad: &mut [f32],
        d: Array2<f32>,
    ) -> Result<Array2<f32>> {
        match self {
            Dense(l) => l.backward(params, grad, d),
            BiRnn(l) => l.backward(params, grad, d),
        }
    }
}
