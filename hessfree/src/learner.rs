use std::sync::Arc;

use crate::{
    objective::Objective,
    params::{ParamDelta, ParamLayout},
};

/// A shared, type-erased objective over samples of type `S`.
pub type SharedObjective<S> = Arc<dyn Objective<Sample = S>>;

/// Something with learnable parameters that can build objectives centered on them.
///
/// A training session is a cycle of `make_objective` and `adjust`: every objective is made
/// right before it is minimized, so it can take the previous cycle into account (for damping,
/// for example).
pub trait Learner {
    /// The type of the training samples.
    type Sample: 'static;

    /// Returns the parameters that `adjust` may change.
    fn parameters(&self) -> ParamLayout;

    /// Creates an objective whose approximation is centered on the current parameters.
    fn make_objective(&mut self) -> SharedObjective<Self::Sample>;

    /// Updates the parameters after the last objective was minimized.
    ///
    /// # Arguments
    /// * `adjustment` - The recommended (backtracked) change to the parameters.
    /// * `quad_min` - The last conjugate gradient iterate, the supposed minimum of the
    ///   quadratic approximation.
    /// * `batch` - The samples the adjustment supposedly improves the cost for.
    fn adjust(
        &mut self,
        adjustment: &ParamDelta,
        quad_min: &ParamDelta,
        batch: &[Self::Sample],
    );
}
