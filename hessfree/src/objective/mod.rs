mod concurrent;

pub use concurrent::{ConcurrentObjective, DEFAULT_MAX_SUB_BATCH};

use crate::params::ParamDelta;

/// A quadratic approximation of some objective function, centered on the value the parameters
/// had when the approximation was built.
///
/// Implementations must be pure for a fixed center: the solver queries the same point several
/// times per iteration and relies on getting consistent answers.
pub trait QuadObjective: Send + Sync {
    /// The type of the samples in a batch.
    type Sample;

    /// Evaluates the approximation at `delta`.
    fn quad(&self, delta: &ParamDelta, batch: &[Self::Sample]) -> f64;

    /// Computes the gradient of the approximation at `delta` and adds it to `out`.
    ///
    /// Since this is additive, `out` should usually start zeroed.
    fn quad_grad(&self, delta: &ParamDelta, batch: &[Self::Sample], out: &mut ParamDelta);

    /// Applies the approximation's Hessian to `delta`, adding the product to `out`, while
    /// evaluating the approximation at `x`.
    ///
    /// # Returns
    /// The value of the approximation at `x`.
    fn quad_hessian(
        &self,
        delta: &ParamDelta,
        x: &ParamDelta,
        batch: &[Self::Sample],
        out: &mut ParamDelta,
    ) -> f64;
}

/// An objective which can be evaluated truly or through its quadratic approximation.
pub trait Objective: QuadObjective {
    /// Evaluates the true objective at `delta`. An empty delta evaluates the center.
    fn objective(&self, delta: &ParamDelta, batch: &[Self::Sample]) -> f64;
}

/// Like an `Objective`, but the true objective can only be evaluated at the current value of
/// the parameters.
pub trait WrappedObjective: QuadObjective {
    /// Evaluates the true objective using the live parameters.
    fn objective_at_zero(&self, batch: &[Self::Sample]) -> f64;
}

impl<O: QuadObjective + ?Sized> QuadObjective for std::sync::Arc<O> {
    type Sample = O::Sample;

    fn quad(&self, delta: &ParamDelta, batch: &[Self::Sample]) -> f64 {
        (**self).quad(delta, batch)
    }

    fn quad_grad(&self, delta: &ParamDelta, batch: &[Self::Sample], out: &mut ParamDelta) {
        (**self).quad_grad(delta, batch, out);
    }

    fn quad_hessian(
        &self,
        delta: &ParamDelta,
        x: &ParamDelta,
        batch: &[Self::Sample],
        out: &mut ParamDelta,
    ) -> f64 {
        (**self).quad_hessian(delta, x, batch, out)
    }
}

impl<O: Objective + ?Sized> Objective for std::sync::Arc<O> {
    fn objective(&self, delta: &ParamDelta, batch: &[Self::Sample]) -> f64 {
        (**self).objective(delta, batch)
    }
}
