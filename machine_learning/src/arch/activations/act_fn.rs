use serde::{Deserialize, Serialize};

/// Element-wise activation applied after an affine transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActFn {
    Relu,
    Tanh,
}
use ActFn::*;

impl ActFn {
    /// Evaluates the activation at `z`.
    pub fn f(&self, z: f32) -> f32 {
        match *self {
            Relu => z.max(0.),
            Tanh => z.tanh(),
        }
    }

    /// Evaluates the derivative of the activation at `z`.
    pub fn df(&self, z: f32) -> f32 {
        match *self {
            Relu => {
                if z > 0. {
                    1.
                } else {
                    0.
                }
            }
            Tanh => 1. - z.tanh().powi(2),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relu_clamps_negatives() {
        assert_eq!(Relu.f(-2.), 0.);
        assert_eq!(Relu.f(3.), 3.);
        assert_eq!(Relu.df(-1.), 0.);
        assert_eq!(Relu.df(1.), 1.);
    }

    #[test]
    fn tanh_derivative_matches_finite_differences() {
        let eps = 1e-3;
        for z in [-1.5f32, -0.2, 0.0, 0.7, 2.0] {
            let numeric = (Tanh.f(z + eps) - Tanh.f(z - eps)) / (2. * eps);
            assert!((numeric - Tanh.df(z)).abs() < 1e-2, "at {z}");
        }
    }
}
