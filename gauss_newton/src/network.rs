use std::sync::Arc;

use hessfree::{ParamArena, ParamDelta, ParamLayout, ParamSnapshot};
use log::debug;
use ndarray::{Array2, ArrayView2};
use rand::Rng;

use crate::{
    error::{NetErr, Result},
    init::Init,
    layers::{Dense, Layer, LayerSpec},
    sample::VectorSample,
};

/// A feed forward network whose parameters live in a shared `ParamArena`.
#[derive(Debug)]
pub struct Network {
    params: Arc<ParamArena>,
    layers: Vec<Layer>,
    input_size: usize,
    output_size: usize,
}

impl Network {
    /// Creates a new `Network` with randomly initialized parameters.
    ///
    /// # Arguments
    /// * `input_size` - The length of the inputs.
    /// * `specs` - The layers, from input to output.
    /// * `init` - How the weights and biases of dense layers are drawn.
    /// * `rng` - A random number generator.
    ///
    /// # Returns
    /// The network or an error if there are no layers or the distribution is invalid.
    pub fn new<R: Rng + ?Sized>(
        input_size: usize,
        specs: &[LayerSpec],
        init: Init,
        rng: &mut R,
    ) -> Result<Self> {
        if specs.is_empty() {
            return Err(NetErr::EmptyNetwork);
        }

        let mut arena = ParamArena::new();
        let mut size = input_size;

        let layers = specs
            .iter()
            .enumerate()
            .map(|(i, spec)| {
                let layer = match *spec {
                    LayerSpec::Dense { outputs } => {
                        let outputs = outputs.get();
                        let weights = init.generate(rng, size * outputs, size, outputs)?;
                        let biases = init.generate(rng, outputs, size, outputs)?;

                        let weights = arena.register(format!("dense{i}.weights"), weights);
                        let biases = arena.register(format!("dense{i}.biases"), biases);

                        let dense = Dense::new((size, outputs), weights, biases);
                        size = outputs;
                        Layer::Dense(dense)
                    }
                    LayerSpec::Tanh => Layer::Tanh,
                    LayerSpec::Sigmoid => Layer::Sigmoid,
                };

                Ok(layer)
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(
            layers = layers.len(),
            params = arena.layout().size();
            "built network"
        );

        Ok(Self {
            params: Arc::new(arena),
            layers,
            input_size,
            output_size: size,
        })
    }

    /// Returns the live parameters.
    pub fn params(&self) -> &Arc<ParamArena> {
        &self.params
    }

    pub fn layout(&self) -> ParamLayout {
        self.params.layout()
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn input_size(&self) -> usize {
        self.input_size
    }

    pub fn output_size(&self) -> usize {
        self.output_size
    }

    /// Feeds `input` through the network using the live parameters.
    pub fn predict(&self, input: &[f64]) -> Result<Vec<f64>> {
        if input.len() != self.input_size {
            return Err(NetErr::SizeMismatch {
                what: "input",
                got: input.len(),
                expected: self.input_size,
            });
        }

        let x = Array2::from_shape_fn((1, self.input_size), |(_, j)| input[j]);
        let mut outputs = self.forward(&self.params.snapshot(), x);
        let output = outputs.pop().unwrap_or_default();

        Ok(output.into_iter().collect())
    }

    /// Checks every sample fits the network.
    pub fn check_samples(&self, samples: &[VectorSample]) -> Result<()> {
        for sample in samples {
            if sample.input.len() != self.input_size {
                return Err(NetErr::SizeMismatch {
                    what: "sample input",
                    got: sample.input.len(),
                    expected: self.input_size,
                });
            }

            if sample.output.len() != self.output_size {
                return Err(NetErr::SizeMismatch {
                    what: "sample output",
                    got: sample.output.len(),
                    expected: self.output_size,
                });
            }
        }

        Ok(())
    }

    /// Feeds a batch with one input per row through the network.
    ///
    /// # Returns
    /// The input followed by the output of every layer.
    pub(crate) fn forward(&self, params: &ParamSnapshot, x: Array2<f64>) -> Vec<Array2<f64>> {
        let mut values = Vec::with_capacity(self.layers.len() + 1);
        values.push(x);

        for (i, layer) in self.layers.iter().enumerate() {
            let next = layer.forward(params, values[i].view());
            values.push(next);
        }

        values
    }

    /// Computes `J·delta`, the directional derivative of the output with respect to the
    /// parameters.
    ///
    /// # Arguments
    /// * `params` - The parameters the network is linearized around.
    /// * `values` - What `forward` returned for those parameters.
    /// * `delta` - The direction.
    pub(crate) fn jvp(
        &self,
        params: &ParamSnapshot,
        values: &[Array2<f64>],
        delta: &ParamDelta,
    ) -> Array2<f64> {
        let mut r: Option<Array2<f64>> = None;

        for (i, layer) in self.layers.iter().enumerate() {
            r = layer.jvp(
                params,
                values[i].view(),
                values[i + 1].view(),
                r.as_ref().map(|r| r.view()),
                delta,
            );
        }

        r.unwrap_or_else(|| Array2::zeros(values[values.len() - 1].raw_dim()))
    }

    /// Computes `Jᵀ·u`, adding it to `out`.
    ///
    /// # Arguments
    /// * `params` - The parameters the network is linearized around.
    /// * `values` - What `forward` returned for those parameters.
    /// * `u` - A gradient with respect to the output.
    /// * `out` - Where the parameter gradients are accumulated.
    pub(crate) fn vjp(
        &self,
        params: &ParamSnapshot,
        values: &[Array2<f64>],
        u: Array2<f64>,
        out: &mut ParamDelta,
    ) {
        let mut u = u;

        for (i, layer) in self.layers.iter().enumerate().rev() {
            u = layer.vjp(params, values[i].view(), values[i + 1].view(), u.view(), out);
        }
    }

    /// Stacks the inputs of a batch into one row per sample.
    pub(crate) fn stack_inputs(&self, batch: &[VectorSample]) -> Array2<f64> {
        Array2::from_shape_fn((batch.len(), self.input_size), |(i, j)| batch[i].input[j])
    }

    /// Stacks the expected outputs of a batch into one row per sample.
    pub(crate) fn stack_outputs(&self, batch: &[VectorSample]) -> Array2<f64> {
        Array2::from_shape_fn((batch.len(), self.output_size), |(i, j)| batch[i].output[j])
    }
}

/// Returns the output of the network, the last of the values computed by `forward`.
pub(crate) fn output(values: &[Array2<f64>]) -> ArrayView2<'_, f64> {
    values[values.len() - 1].view()
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;

    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    const EPSILON: f64 = 1e-6;

    fn dense(outputs: usize) -> LayerSpec {
        LayerSpec::Dense {
            outputs: NonZeroUsize::new(outputs).unwrap(),
        }
    }

    fn network() -> Network {
        let specs = [dense(4), LayerSpec::Tanh, dense(3), LayerSpec::Sigmoid, dense(2)];
        Network::new(3, &specs, Init::default(), &mut StdRng::seed_from_u64(4)).unwrap()
    }

    fn inputs() -> Array2<f64> {
        Array2::from_shape_fn((5, 3), |(i, j)| ((i * 3 + j) as f64 * 0.37).sin())
    }

    fn direction(network: &Network, seed: u64) -> ParamDelta {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut delta = ParamDelta::zeros(&network.layout());
        delta
            .iter_mut()
            .for_each(|(_, v)| v.iter_mut().for_each(|x| *x = rng.random_range(-1.0..1.0)));
        delta
    }

    /// Evaluates the output at `center + scale * delta`.
    fn output_at(network: &Network, delta: &ParamDelta, scale: f64) -> Array2<f64> {
        let mut scaled = delta.clone();
        scaled.scale(scale);

        let _patch = network.params().patch(&scaled);
        let values = network.forward(&network.params().snapshot(), inputs());
        output(&values).to_owned()
    }

    #[test]
    fn shapes_follow_the_specs() {
        let network = network();

        assert_eq!(network.output_size(), 2);
        assert_eq!(network.layers().len(), 5);
        assert_eq!(network.layout().size(), 3 * 4 + 4 + 4 * 3 + 3 + 3 * 2 + 2);
        assert_eq!(network.predict(&[0.1, 0.2, 0.3]).unwrap().len(), 2);
    }

    #[test]
    fn rejects_bad_sizes() {
        let network = network();

        assert!(matches!(
            network.predict(&[1.]),
            Err(NetErr::SizeMismatch { what: "input", .. })
        ));

        let sample = VectorSample::new(vec![0.; 3], vec![0.; 5]);
        assert!(matches!(
            network.check_samples(&[sample]),
            Err(NetErr::SizeMismatch {
                what: "sample output",
                got: 5,
                expected: 2
            })
        ));

        let mut rng = StdRng::seed_from_u64(1);
        assert!(matches!(
            Network::new(3, &[], Init::default(), &mut rng),
            Err(NetErr::EmptyNetwork)
        ));
    }

    #[test]
    fn jvp_matches_finite_differences() {
        let network = network();
        let delta = direction(&network, 8);
        let snapshot = network.params().snapshot();
        let values = network.forward(&snapshot, inputs());

        let jvp = network.jvp(&snapshot, &values, &delta);
        let forward = output_at(&network, &delta, EPSILON);
        let backward = output_at(&network, &delta, -EPSILON);
        let expected = (forward - backward) / (2. * EPSILON);

        for (a, e) in jvp.iter().zip(&expected) {
            assert!((a - e).abs() < 1e-6, "expected {e} but got {a}");
        }
    }

    #[test]
    fn vjp_is_the_transpose_of_jvp() {
        let network = network();
        let snapshot = network.params().snapshot();
        let values = network.forward(&snapshot, inputs());

        let v = direction(&network, 2);
        let u = Array2::from_shape_fn((5, 2), |(i, j)| (i as f64 - j as f64) * 0.3);

        let jv = network.jvp(&snapshot, &values, &v);
        let mut jtu = ParamDelta::zeros(&network.layout());
        network.vjp(&snapshot, &values, u.clone(), &mut jtu);

        let lhs = (&jv * &u).sum();
        let rhs = jtu.dot(&v);
        assert!((lhs - rhs).abs() < 1e-9 * lhs.abs().max(1.));
    }

    #[test]
    fn missing_parameters_count_as_zero() {
        let network = network();
        let snapshot = network.params().snapshot();
        let values = network.forward(&snapshot, inputs());

        let jvp = network.jvp(&snapshot, &values, &ParamDelta::new());
        assert!(jvp.iter().all(|&x| x == 0.));
    }
}
