use std::num::NonZeroUsize;

use hessfree::{ParamDelta, ParamSnapshot};
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use super::Dense;

/// The description of a layer, as found in a network configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LayerSpec {
    Dense { outputs: NonZeroUsize },
    Tanh,
    Sigmoid,
}

#[derive(Debug, Clone)]
pub enum Layer {
    Dense(Dense),
    Tanh,
    Sigmoid,
}

impl Layer {
    pub fn forward(&self, params: &ParamSnapshot, x: ArrayView2<f64>) -> Array2<f64> {
        match self {
            Layer::Dense(l) => l.forward(params, x),
            Layer::Tanh => x.mapv(f64::tanh),
            Layer::Sigmoid => x.mapv(sigmoid),
        }
    }

    /// Propagates a directional derivative through the layer.
    ///
    /// # Arguments
    /// * `params` - The parameters the layer is linearized around.
    /// * `input` - The input the layer was fed.
    /// * `output` - What the layer computed for `input`.
    /// * `r` - The directional derivative of the input, `None` if it's zero.
    /// * `delta` - The direction of the parameters.
    ///
    /// # Returns
    /// The directional derivative of the output, `None` if it's zero.
    pub fn jvp(
        &self,
        params: &ParamSnapshot,
        input: ArrayView2<f64>,
        output: ArrayView2<f64>,
        r: Option<ArrayView2<f64>>,
        delta: &ParamDelta,
    ) -> Option<Array2<f64>> {
        match self {
            Layer::Dense(l) => Some(l.jvp(params, input, r, delta)),
            _ => r.map(|r| &r * &self.derivative(output)),
        }
    }

    /// Back propagates `u` through the layer, adding the parameter gradients to `out`.
    ///
    /// # Returns
    /// The gradient with respect to the input of the layer.
    pub fn vjp(
        &self,
        params: &ParamSnapshot,
        input: ArrayView2<f64>,
        output: ArrayView2<f64>,
        u: ArrayView2<f64>,
        out: &mut ParamDelta,
    ) -> Array2<f64> {
        match self {
            Layer::Dense(l) => l.vjp(params, input, u, out),
            _ => &u * &self.derivative(output),
        }
    }

    /// Returns the element-wise derivative of an activation in terms of its output.
    fn derivative(&self, output: ArrayView2<f64>) -> Array2<f64> {
        match self {
            Layer::Tanh => output.mapv(|a| 1. - a * a),
            Layer::Sigmoid => output.mapv(|a| a * (1. - a)),
            Layer::Dense(_) => unreachable!("dense layers aren't element-wise"),
        }
    }
}

pub(crate) fn sigmoid(z: f64) -> f64 {
    1. / (1. + (-z).exp())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn specs_read_from_json() {
        let json = r#"[
            { "type": "dense", "outputs": 4 },
            { "type": "tanh" },
            { "type": "sigmoid" }
        ]"#;
        let specs: Vec<LayerSpec> = serde_json::from_str(json).unwrap();

        assert_eq!(
            specs,
            [
                LayerSpec::Dense {
                    outputs: NonZeroUsize::new(4).unwrap()
                },
                LayerSpec::Tanh,
                LayerSpec::Sigmoid,
            ]
        );
    }

    #[test]
    fn dense_spec_needs_outputs() {
        assert!(serde_json::from_str::<LayerSpec>(r#"{ "type": "dense", "outputs": 0 }"#).is_err());
        assert!(serde_json::from_str::<LayerSpec>(r#"{ "type": "dense" }"#).is_err());
    }

    #[test]
    fn sigmoid_is_centered() {
        assert_eq!(sigmoid(0.), 0.5);
        assert!((sigmoid(3.) + sigmoid(-3.) - 1.).abs() < 1e-12);
    }
}
