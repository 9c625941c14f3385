use ndarray::{Array2, ArrayView2};

use super::LossFn;

/// Squared error loss function, `sum((z - y)^2)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Mse;

impl Mse {
    /// Returns a new `Mse`.
    pub fn new() -> Self {
        Self
    }
}

impl LossFn for Mse {
    fn loss(&self, z: ArrayView2<f64>, y: ArrayView2<f64>) -> f64 {
        (&z - &y).mapv(|x| x.powi(2)).sum()
    }

    fn grad(&self, z: ArrayView2<f64>, y: ArrayView2<f64>) -> Array2<f64> {
        (&z - &y) * 2.
    }

    fn hessian_vec(
        &self,
        _: ArrayView2<f64>,
        _: ArrayView2<f64>,
        v: ArrayView2<f64>,
    ) -> Array2<f64> {
        &v * 2.
    }
}
