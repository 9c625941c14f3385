use ndarray::{Array2, ArrayView2, Zip};

use super::LossFn;
use crate::layers::sigmoid;

/// Cross entropy between independent Bernoulli targets and the sigmoid of the output.
///
/// For a logit `z` and a target `y` in `[0, 1]` it's `-y ln σ(z) - (1 - y) ln(1 - σ(z))`,
/// computed as `softplus(z) - y z`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SigmoidCrossEntropy;

impl SigmoidCrossEntropy {
    pub fn new() -> Self {
        Self
    }
}

fn softplus(z: f64) -> f64 {
    z.max(0.) + (-z.abs()).exp().ln_1p()
}

impl LossFn for SigmoidCrossEntropy {
    fn loss(&self, z: ArrayView2<f64>, y: ArrayView2<f64>) -> f64 {
        Zip::from(&z)
            .and(&y)
            .fold(0., |acc, &z, &y| acc + softplus(z) - y * z)
    }

    fn grad(&self, z: ArrayView2<f64>, y: ArrayView2<f64>) -> Array2<f64> {
        Zip::from(&z).and(&y).map_collect(|&z, &y| sigmoid(z) - y)
    }

    fn hessian_vec(
        &self,
        z: ArrayView2<f64>,
        _: ArrayView2<f64>,
        v: ArrayView2<f64>,
    ) -> Array2<f64> {
        Zip::from(&z).and(&v).map_collect(|&z, &v| {
            let s = sigmoid(z);
            s * (1. - s) * v
        })
    }
}
