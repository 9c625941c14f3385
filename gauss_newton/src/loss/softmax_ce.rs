use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Zip};

use super::LossFn;

/// Cross entropy between a target distribution and the softmax of the output,
/// `-sum(y * log_softmax(z))`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SoftmaxCrossEntropy;

impl SoftmaxCrossEntropy {
    pub fn new() -> Self {
        Self
    }
}

fn log_softmax(z: ArrayView1<f64>) -> Array1<f64> {
    let max = z.fold(f64::NEG_INFINITY, |m, &x| m.max(x));
    let log_sum = z.mapv(|x| (x - max).exp()).sum().ln() + max;
    z.mapv(|x| x - log_sum)
}

impl LossFn for SoftmaxCrossEntropy {
    fn loss(&self, z: ArrayView2<f64>, y: ArrayView2<f64>) -> f64 {
        Zip::from(z.rows())
            .and(y.rows())
            .fold(0., |acc, z, y| acc - y.dot(&log_softmax(z)))
    }

    fn grad(&self, z: ArrayView2<f64>, y: ArrayView2<f64>) -> Array2<f64> {
        let mut out = Array2::zeros(z.raw_dim());

        Zip::from(out.rows_mut())
            .and(z.rows())
            .and(y.rows())
            .for_each(|mut g, z, y| {
                let p = log_softmax(z).mapv_into(f64::exp);
                g.assign(&(&p * y.sum() - &y));
            });

        out
    }

    /// Applies `sum(y) * (diag(p) - p pᵀ)` to every row, with `p` the softmax of `z`.
    fn hessian_vec(
        &self,
        z: ArrayView2<f64>,
        y: ArrayView2<f64>,
        v: ArrayView2<f64>,
    ) -> Array2<f64> {
        let mut out = Array2::zeros(z.raw_dim());

        Zip::from(out.rows_mut())
            .and(z.rows())
            .and(y.rows())
            .and(v.rows())
            .for_each(|mut h, z, y, v| {
                let p = log_softmax(z).mapv_into(f64::exp);
                let pv = p.dot(&v);
                h.assign(&((&p * &v - &p * pv) * y.sum()));
            });

        out
    }
}
