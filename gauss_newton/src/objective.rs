use std::sync::Arc;

use hessfree::{ParamDelta, ParamSnapshot, QuadObjective, WrappedObjective};
use ndarray::Array2;

use crate::{
    loss::LossFn,
    network::{Network, output},
    sample::VectorSample,
};

/// The Gauss-Newton approximation of a network's cost.
///
/// Every layer is linearized around the parameters the objective was created with and the
/// loss is replaced by its second order Taylor expansion around the linearized output. With a
/// convex loss this gives a convex quadratic, see Schraudolph (2002).
pub struct GaussNewton<L: LossFn> {
    network: Arc<Network>,
    loss: Arc<L>,
    center: ParamSnapshot,
}

/// A batch fed through the network at the center.
struct Linearization {
    values: Vec<Array2<f64>>,
    targets: Array2<f64>,
    loss: f64,
    grad: Array2<f64>,
}

impl<L: LossFn> GaussNewton<L> {
    /// Creates a new `GaussNewton` centered on the current parameters of `network`.
    pub fn new(network: Arc<Network>, loss: Arc<L>) -> Self {
        let center = network.params().snapshot();

        Self {
            network,
            loss,
            center,
        }
    }

    pub fn network(&self) -> &Arc<Network> {
        &self.network
    }

    fn linearize(&self, batch: &[VectorSample]) -> Linearization {
        let values = self.network.forward(&self.center, self.network.stack_inputs(batch));
        let targets = self.network.stack_outputs(batch);

        let z = output(&values);
        let loss = self.loss.loss(z, targets.view());
        let grad = self.loss.grad(z, targets.view());

        Linearization {
            values,
            targets,
            loss,
            grad,
        }
    }

    /// Returns `J·delta` along with the loss Hessian applied to it.
    fn project(&self, lin: &Linearization, delta: &ParamDelta) -> (Array2<f64>, Array2<f64>) {
        let jd = self.network.jvp(&self.center, &lin.values, delta);
        let hjd = self
            .loss
            .hessian_vec(output(&lin.values), lin.targets.view(), jd.view());

        (jd, hjd)
    }

    /// Evaluates `ℓ(z0) + ∇ℓ·Jd + ½ (Jd)ᵀ ∇²ℓ (Jd)`.
    fn quad_at(&self, lin: &Linearization, delta: &ParamDelta) -> f64 {
        let (jd, hjd) = self.project(lin, delta);
        lin.loss + (&lin.grad * &jd).sum() + 0.5 * (&jd * &hjd).sum()
    }
}

impl<L: LossFn> QuadObjective for GaussNewton<L> {
    type Sample = VectorSample;

    fn quad(&self, delta: &ParamDelta, batch: &[VectorSample]) -> f64 {
        let lin = self.linearize(batch);
        self.quad_at(&lin, delta)
    }

    fn quad_grad(&self, delta: &ParamDelta, batch: &[VectorSample], out: &mut ParamDelta) {
        let lin = self.linearize(batch);
        let (_, hjd) = self.project(&lin, delta);

        let u = &lin.grad + &hjd;
        self.network.vjp(&self.center, &lin.values, u, out);
    }

    fn quad_hessian(
        &self,
        delta: &ParamDelta,
        x: &ParamDelta,
        batch: &[VectorSample],
        out: &mut ParamDelta,
    ) -> f64 {
        let lin = self.linearize(batch);
        let (_, hjv) = self.project(&lin, delta);

        self.network.vjp(&self.center, &lin.values, hjv, out);
        self.quad_at(&lin, x)
    }
}

impl<L: LossFn> WrappedObjective for GaussNewton<L> {
    fn objective_at_zero(&self, batch: &[VectorSample]) -> f64 {
        let live = self.network.params().snapshot();
        let values = self.network.forward(&live, self.network.stack_inputs(batch));
        let targets = self.network.stack_outputs(batch);

        self.loss.loss(output(&values), targets.view())
    }
}
