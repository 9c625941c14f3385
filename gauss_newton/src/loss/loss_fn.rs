use ndarray::{Array2, ArrayView2};

/// The cost of a network's output, summed over the batch.
///
/// Every method takes one output `z` and one target `y` per row. The Hessian with respect to
/// `z` must be positive semidefinite, which keeps Gauss-Newton approximations convex.
pub trait LossFn: Send + Sync {
    fn loss(&self, z: ArrayView2<f64>, y: ArrayView2<f64>) -> f64;

    /// Returns the gradient of the loss with respect to `z`.
    fn grad(&self, z: ArrayView2<f64>, y: ArrayView2<f64>) -> Array2<f64>;

    /// Applies the Hessian of the loss with respect to `z` to every row of `v`.
    fn hessian_vec(
        &self,
        z: ArrayView2<f64>,
        y: ArrayView2<f64>,
        v: ArrayView2<f64>,
    ) -> Array2<f64>;
}
