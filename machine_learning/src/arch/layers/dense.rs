use ndarray::{linalg, prelude::*};
use rand::Rng;

use super::{check_len, uniform_fill};
use crate::{MlErr, Result, arch::activations::ActFn, sequence::PackedSequence};

/// A fully connected layer applied to every frame of a packed batch.
///
/// Parameters are laid out as the `(input, output)` weight matrix in row major order followed by
/// the `output` biases. Gradients are *added* to the gradient buffer so several batches can be
/// accumulated before an optimizer step.
#[derive(Debug, Clone)]
pub struct Dense {
    dim: (usize, usize),
    act_fn: Option<ActFn>,
    size: usize,

    // Forward metadata
    x: Array2<f32>,
    z: Array2<f32>,
}

impl Dense {
    /// Creates a new `Dense` layer.
    ///
    /// # Arguments
    /// * `dim` - The input and output sizes.
    /// * `act_fn` - An optional activation applied to the affine output.
    ///
    /// # Returns
    /// A new `Dense` instance.
    pub fn new(dim: (usize, usize), act_fn: Option<ActFn>) -> Self {
        let zeros = Array2::zeros((0, 0));

        Self {
            dim,
            size: (dim.0 + 1) * dim.1,
            act_fn,
            x: zeros.clone(),
            z: zeros,
        }
    }

    /// Returns the size of this layer.
    ///
    /// # Returns
    /// The amount of parameters this layer has.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn dim(&self) -> (usize, usize) {
        self.dim
    }

    /// Initializes the parameters uniformly in `[-1/sqrt(input), 1/sqrt(input)]`.
    pub fn init_params<R: Rng + ?Sized>(&self, params: &mut [f32], rng: &mut R) -> Result<()> {
        check_len("dense params", params.len(), self.size)?;
        let bound = 1. / (self.dim.0.max(1) as f32).sqrt();
        uniform_fill(params, bound, rng)
    }

    pub fn forward(&mut self, params: &[f32], x: &PackedSequence) -> Result<PackedSequence> {
        check_len("dense input features", x.features(), self.dim.0)?;
        let (w, b) = self.view_params(params)?;

        let mut z = x.data().dot(&w);
        z += &b;
        self.x = x.data().to_owned();

        let a = match self.act_fn {
            Some(act_fn) => z.mapv(|z| act_fn.f(z)),
            None => z.clone(),
        };
        self.z = z;

        x.with_data(a)
    }

    pub fn backward(
        &mut self,
        params: &[f32],
        grad: &mut [f32],
        mut d: Array2<f32>,
    ) -> Result<Array2<f32>> {
        check_len("dense deltas", d.nrows(), self.z.nrows())?;
        if let Some(act_fn) = self.act_fn {
            d.zip_mut_with(&self.z, |d, &z| *d *= act_fn.df(z));
        }

        let (mut dw, mut db) = self.view_grad(grad)?;
        linalg::general_mat_mul(1.0, &self.x.t(), &d, 1.0, &mut dw);
        db += &d.sum_axis(Axis(0));

        let (w, _) = self.view_params(params)?;
        Ok(d.dot(&w.t()))
    }

    /// Gives a view of the raw gradient slice as the delta weights and delta biases of this layer.
    fn view_grad<'a>(
        &self,
        grad: &'a mut [f32],
    ) -> Result<(ArrayViewMut2<'a, f32>, ArrayViewMut1<'a, f32>)> {
        check_len("dense grad", grad.len(), self.size)?;
        let w_size = self.size - self.dim.1;
        let (dw_raw, db_raw) = grad.split_at_mut(w_size);
        let dw = ArrayViewMut2::from_shape(self.dim, dw_raw).map_err(|_| self.shape_err())?;
        let db = ArrayViewMut1::from_shape(self.dim.1, db_raw).map_err(|_| self.shape_err())?;
        Ok((dw, db))
    }

    /// Gives a view of the raw parameter slice as the weights and biases of this layer.
    fn view_params<'a>(
        &self,
        params: &'a [f32],
    ) -> Result<(ArrayView2<'a, f32>, ArrayView1<'a, f32>)> {
        check_len("dense params", params.len(), self.size)?;
        let w_size = self.size - self.dim.1;
        let weights =
            ArrayView2::from_shape(self.dim, &params[..w_size]).map_err(|_| self.shape_err())?;
        let biases =
            ArrayView1::from_shape(self.dim.1, &params[w_size..]).map_err(|_| self.shape_err())?;
        Ok((weights, biases))
    }

    fn shape_err(&self) -> MlErr {
        MlErr::SizeMismatch {
            what: "dense layout",
            got: self.dim.0 * self.dim.1,
            expected: self.size - self.dim.1,
        }
    }
}
