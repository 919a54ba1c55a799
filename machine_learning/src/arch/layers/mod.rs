mod birnn;
mod dense;
mod layer;

pub use birnn::BiRnn;
pub use dense::Dense;
pub use layer::Layer;

use ndarray::Array1;
use ndarray_rand::{RandomExt, rand_distr::Uniform};
use rand::Rng;

use crate::{MlErr, Result};

/// Fills `params` with values drawn uniformly from `[-bound, bound]`.
pub(crate) fn uniform_fill<R>(params: &mut [f32], bound: f32, rng: &mut R) -> Result<()>
where
    R: Rng + ?Sized,
{
    let dist = Uniform::new_inclusive(-bound, bound)
        .map_err(|e| MlErr::InvalidConfig(format!("bad init bound {bound}: {e}")))?;
    let values = Array1::random_using(params.len(), dist, rng);
    params
        .iter_mut()
        .zip(values.iter())
        .for_each(|(p, v)| *p = *v);
    Ok(())
}

/// Checks that a parameter slice has exactly the expected length.
pub(crate) fn check_len(what: &'static str, got: usize, expected: usize) -> Result<()> {
    if got != expected {
        return Err(MlErr::SizeMismatch {
            what,
            got,
            expected,
        });
    }
    Ok(())
}
