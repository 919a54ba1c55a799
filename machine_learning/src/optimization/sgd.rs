use super::{Optimizer, OptimizerState};
use crate::{MlErr, Result};

/// Stochastic gradient descent with momentum and an L2 weight penalty.
///
/// Each step computes `d = g + weight_decay * p`, `v = momentum * v + d` and `p -= lr * v`.
#[derive(Debug, Clone)]
pub struct Sgd {
    learning_rate: f32,
    momentum: f32,
    weight_decay: f32,
    velocity: Box<[f32]>,
}

impl Sgd {
    /// Creates a new `Sgd` optimizer.
    ///
    /// # Arguments
    /// * `len` - The amount of parameters this instance should hold.
    /// * `learning_rate` - The small coefficient that modulates the amount of training per update.
    /// * `momentum` - The decay of the velocity buffer, 0 disables it.
    /// * `weight_decay` - The L2 penalty coefficient.
    ///
    /// # Returns
    /// A new `Sgd` instance.
    pub fn new(len: usize, learning_rate: f32, momentum: f32, weight_decay: f32) -> Self {
        Self {
            learning_rate,
            momentum,
            weight_decay,
            velocity: vec![0.; len].into_boxed_slice(),
        }
    }
}

impl Optimizer for Sgd {
    fn update_params(&mut self, grad: &[f32], params: &mut [f32]) -> Result<()> {
        for (what, got) in [("sgd grad", grad.len()), ("sgd params", params.len())] {
            if got != self.velocity.len() {
                return Err(MlErr::SizeMismatch {
                    what,
                    got,
                    expected: self.velocity.len(),
                });
            }
        }

        let lr = self.learning_rate;
        let mu = self.momentum;
        let wd = self.weight_decay;

        params
            .iter_mut()
            .zip(grad)
            .zip(self.velocity.iter_mut())
            .for_each(|((p, g), v)| {
                *v = (mu * *v) + g + wd * *p;
                *p -= lr * *v;
            });

        Ok(())
    }

    fn state(&self) -> OptimizerState {
        OptimizerState::Sgd {
            learning_rate: self.learning_rate,
            momentum: self.momentum,
            weight_decay: self.weight_decay,
            velocity: self.velocity.to_vec(),
        }
    }

    fn load_state(&mut self, state: OptimizerState) -> Result<()> {
        let OptimizerState::Sgd {
            learning_rate,
            momentum,
            weight_decay,
            velocity,
        } = state;

        if velocity.len() != self.velocity.len() {
            return Err(MlErr::SizeMismatch {
                what: "sgd velocity",
                got: velocity.len(),
                expected: self.velocity.len(),
            });
        }

        self.learning_rate = learning_rate;
        self.momentum = momentum;
        self.weight_decay = weight_decay;
        self.velocity = velocity.into_boxed_slice();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_step_without_momentum() {
        let mut sgd = Sgd::new(2, 0.5, 0., 0.);
        let mut params = [1., -1.];
        sgd.update_params(&[2., 4.], &mut params).unwrap();
        assert_eq!(params, [0., -3.]);
    }

    #[test]
    fn momentum_accumulates_velocity() {
        let mut sgd = Sgd::new(1, 1., 0.5, 0.);
        let mut params = [0.];
        sgd.update_params(&[1.], &mut params).unwrap();
        assert_eq!(params, [-1.]);
        sgd.update_params(&[1.], &mut params).unwrap();
        // v = 0.5 * 1 + 1
        assert_eq!(params, [-2.5]);
    }

    #[test]
    fn weight_decay_pulls_towards_zero() {
        let mut sgd = Sgd::new(1, 0.1, 0., 1.);
        let mut params = [2.];
        sgd.update_params(&[0.], &mut params).unwrap();
        assert!((params[0] - 1.8).abs() < 1e-6);
    }

    #[test]
    fn size_mismatch_is_an_error() {
        let mut sgd = Sgd::new(2, 0.1, 0.9, 0.);
        let mut params = [0.; 3];
        assert!(sgd.update_params(&[0.; 3], &mut params).is_err());
    }

    #[test]
    fn state_round_trip_restores_velocity() {
        let mut a = Sgd::new(2, 0.1, 0.9, 1e-4);
        let mut params = [1., 2.];
        a.update_params(&[0.3, -0.7], &mut params).unwrap();

        let mut b = Sgd::new(2, 1.0, 0.0, 0.0);
        b.load_state(a.state()).unwrap();
        assert_eq!(a.state(), b.state());

        let mut pa = params;
        let mut pb = params;
        a.update_params(&[0.1, 0.1], &mut pa).unwrap();
        b.update_params(&[0.1, 0.1], &mut pb).unwrap();
        assert_eq!(pa, pb);
    }

    #[test]
    fn load_state_rejects_other_sizes() {
        let mut sgd = Sgd::new(2, 0.1, 0.9, 0.);
        assert!(sgd.load_state(Sgd::new(3, 0.1, 0.9, 0.).state()).is_err());
    }
}
