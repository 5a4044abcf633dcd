//! Activation functions applied to Hidden and Output neurons after each
//! weighted sum.
//!
//! Activations are a closed strategy enum rather than a boxed closure so that
//! they travel with [`EvolutionConfig`](crate::EvolutionConfig) through serde.

use serde::{Deserialize, Serialize};

/// Activation function applied by a neuron to its summed input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Activation {
    /// Logistic sigmoid: f(x) = 1 / (1 + e^(-x))
    #[default]
    Sigmoid,
    /// Identity function: f(x) = x
    Identity,
    /// Hyperbolic tangent: f(x) = tanh(x)
    Tanh,
    /// Rectified Linear Unit: f(x) = max(0, x)
    ReLU,
    /// Threshold: f(x) = 0 if x < 0 else 1
    Threshold,
    /// Leaky ReLU: `f(x) = x` if `x > 0` else `0.01x`
    LeakyReLU,
    /// Gaussian: f(x) = e^(-x^2)
    Gaussian,
}

impl Activation {
    /// All available activation functions.
    pub const ALL: [Self; 7] = [
        Self::Sigmoid,
        Self::Identity,
        Self::Tanh,
        Self::ReLU,
        Self::Threshold,
        Self::LeakyReLU,
        Self::Gaussian,
    ];

    /// Apply this activation function to a summed input.
    ///
    /// NaN propagates unchanged. Infinite inputs map to the function's limit
    /// where one exists.
    #[inline]
    #[must_use]
    pub fn apply(self, x: f64) -> f64 {
        if x.is_nan() {
            return f64::NAN;
        }

        match self {
            Self::Sigmoid => {
                if x == f64::INFINITY {
                    return 1.0;
                }
                if x == f64::NEG_INFINITY {
                    return 0.0;
                }
                // exp overflows past ~709
                let clamped = x.clamp(-700.0, 700.0);
                1.0 / (1.0 + (-clamped).exp())
            }
            Self::Identity => x,
            Self::Tanh => x.tanh(),
            Self::ReLU => x.max(0.0),
            Self::Threshold => {
                if x < 0.0 {
                    0.0
                } else {
                    1.0
                }
            }
            Self::LeakyReLU => {
                if x > 0.0 {
                    x
                } else {
                    0.01 * x
                }
            }
            Self::Gaussian => {
                if x.is_infinite() || x.abs() > 38.0 {
                    0.0
                } else {
                    (-x * x).exp()
                }
            }
        }
    }
}
