use ndarray::Array2;
use rand::Rng;

use super::{Model, layers::Layer};
use crate::{MlErr, Result, sequence::PackedSequence};

/// A sequential model: information flows forward when computing an output and backward when
/// computing the *deltas* of its layers.
#[derive(Debug, Clone)]
pub struct Sequential {
    layers: Vec<Layer>,
}

impl Sequential {
    /// Creates a new `Sequential`.
    ///
    /// # Arguments
    /// * `layers` - The layers the sequential is composed of.
    ///
    /// # Returns
    /// A new `Sequential` instance.
    pub fn new<I>(layers: I) -> Self
    where
        I: IntoIterator<Item = Layer>,
    {
        Self {
            layers: layers.into_iter().collect(),
        }
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    fn check_params(&self, what: &'static str, got: usize) -> Result<()> {
        let expected = self.size();
        if got != expected {
            return Err(MlErr::SizeMismatch {
                what,
                got,
                expected,
            });
        }
        Ok(())
    }
}

impl Model for Sequential {
    fn size(&self) -> usize {
        self.layers.iter().map(|layer| layer.size()).sum()
    }

    fn init_params<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Vec<f32>> {
        let mut params = vec![0.; self.size()];
        let mut rest = params.as_mut_slice();

        for layer in &self.layers {
            let (chunk, tail) = std::mem::take(&mut rest).split_at_mut(layer.size());
            layer.init_params(chunk, rng)?;
            rest = tail;
        }

        Ok(params)
    }

    fn forward(&mut self, params: &[f32], x: &PackedSequence) -> Result<PackedSequence> {
        self.check_params("model params", params.len())?;

        let mut out = x.clone();
        let mut rest = params;
        for layer in self.layers.iter_mut() {
            let (chunk, tail) = rest.split_at(layer.size());
            out = layer.forward(chunk, &out)?;
            rest = tail;
        }

        Ok(out)
    }

    fn backward(&mut self, params: &[f32], grad: &mut [f32], d: Array2<f32>) -> Result<()> {
        self.check_params("model params", params.len())?;
        self.check_params("model grad", grad.len())?;

        let mut d = d;
        let mut end = params.len();
        for layer in self.layers.iter_mut().rev() {
            let start = end - layer.size();
            d = layer.backward(&params[start..end], &mut grad[start..end], d)?;
            end = start;
        }

        Ok(())
    }
}
