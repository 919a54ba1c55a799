mod ctc;
mod loss_fn;

pub use ctc::{Ctc, greedy_decode};
pub use loss_fn::{LossFn, LossOutput};
