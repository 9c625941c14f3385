use hessfree::{ParamDelta, ParamId, ParamSnapshot};
use ndarray::{linalg, prelude::*};

/// A fully connected layer computing `x·W + b`.
///
/// `W` is stored row-major with one row per input and `b` has one entry per output. Both live
/// in the network's `ParamArena`.
#[derive(Debug, Clone)]
pub struct Dense {
    dim: (usize, usize),
    weights: ParamId,
    biases: ParamId,
}

impl Dense {
    /// Creates a new `Dense` layer.
    ///
    /// # Arguments
    /// * `dim` - The amount of inputs and outputs.
    /// * `weights` - The id of the `dim.0 * dim.1` weights.
    /// * `biases` - The id of the `dim.1` biases.
    pub fn new(dim: (usize, usize), weights: ParamId, biases: ParamId) -> Self {
        Self {
            dim,
            weights,
            biases,
        }
    }

    pub fn weights(&self) -> ParamId {
        self.weights
    }

    pub fn biases(&self) -> ParamId {
        self.biases
    }

    /// Returns the amount of outputs.
    pub fn outputs(&self) -> usize {
        self.dim.1
    }

    pub fn forward(&self, params: &ParamSnapshot, x: ArrayView2<f64>) -> Array2<f64> {
        let (w, b) = self.view_params(params);

        let mut z = Array2::zeros((x.nrows(), self.dim.1));
        linalg::general_mat_mul(1., &x, &w, 0., &mut z);
        z += &b;
        z
    }

    /// Propagates a directional derivative forward.
    ///
    /// # Arguments
    /// * `params` - The parameters the layer is linearized around.
    /// * `x` - The input of the layer.
    /// * `rx` - The directional derivative of the input, `None` if it's zero.
    /// * `delta` - The direction of the parameters.
    ///
    /// # Returns
    /// The directional derivative of the output, `dW·x + W·rx + db`.
    pub fn jvp(
        &self,
        params: &ParamSnapshot,
        x: ArrayView2<f64>,
        rx: Option<ArrayView2<f64>>,
        delta: &ParamDelta,
    ) -> Array2<f64> {
        let mut r = Array2::zeros((x.nrows(), self.dim.1));

        if let Some(rx) = rx {
            let (w, _) = self.view_params(params);
            linalg::general_mat_mul(1., &rx, &w, 1., &mut r);
        }

        if let Some(dw) = delta.get(self.weights) {
            let dw = self.view_weights(dw);
            linalg::general_mat_mul(1., &x, &dw, 1., &mut r);
        }

        if let Some(db) = delta.get(self.biases) {
            r += &ArrayView1::from(db);
        }

        r
    }

    /// Back propagates `u`, adding the parameter gradients to `out`.
    ///
    /// # Returns
    /// The gradient with respect to the input, `u·Wᵀ`.
    pub fn vjp(
        &self,
        params: &ParamSnapshot,
        x: ArrayView2<f64>,
        u: ArrayView2<f64>,
        out: &mut ParamDelta,
    ) -> Array2<f64> {
        if let Some(gw) = out.get_mut(self.weights) {
            let mut gw = ArrayViewMut2::from_shape(self.dim, gw)
                .expect("weight gradients are shaped like the weights");
            linalg::general_mat_mul(1., &x.t(), &u, 1., &mut gw);
        }

        if let Some(gb) = out.get_mut(self.biases) {
            let mut gb = ArrayViewMut1::from(gb);
            gb += &u.sum_axis(Axis(0));
        }

        let (w, _) = self.view_params(params);
        u.dot(&w.t())
    }

    fn view_weights<'a>(&self, raw: &'a [f64]) -> ArrayView2<'a, f64> {
        ArrayView2::from_shape(self.dim, raw).expect("weights are inputs x outputs")
    }

    /// Gives a view of the parameters of this layer.
    ///
    /// # Returns
    /// A tuple containing the weights and biases.
    fn view_params<'a>(
        &self,
        params: &'a ParamSnapshot,
    ) -> (ArrayView2<'a, f64>, ArrayView1<'a, f64>) {
        let weights = self.view_weights(params.get(self.weights));
        let biases = ArrayView1::from(params.get(self.biases));
        (weights, biases)
    }
}
