use std::{num::NonZeroUsize, sync::Arc};

use hessfree::{
    ConcurrentObjective, HessianFreeConfig, Learner, ParamDelta, ParamLayout, SharedObjective,
    VectorPool, WrappedObjective,
};

use crate::{loss::LossFn, network::Network, objective::GaussNewton, sample::VectorSample};

/// A `Learner` over a `Network` which hands out concurrent Gauss-Newton objectives.
pub struct NeuralNetLearner<L: LossFn> {
    network: Arc<Network>,
    loss: Arc<L>,
    pool: Arc<VectorPool>,
    max_concurrency: Option<NonZeroUsize>,
    max_sub_batch: Option<NonZeroUsize>,
}

impl<L: LossFn> NeuralNetLearner<L> {
    /// Creates a new `NeuralNetLearner`.
    ///
    /// # Arguments
    /// * `network` - The network to train.
    /// * `loss` - The cost of the network's output.
    /// * `pool` - The pool the objectives borrow their temporaries from.
    pub fn new(network: Network, loss: L, pool: Arc<VectorPool>) -> Self {
        Self {
            network: Arc::new(network),
            loss: Arc::new(loss),
            pool,
            max_concurrency: None,
            max_sub_batch: None,
        }
    }

    /// Takes the concurrency settings from `config`.
    pub fn with_config(self, config: &HessianFreeConfig) -> Self {
        self.with_max_concurrency(config.max_concurrency())
            .with_max_sub_batch(config.max_sub_batch())
    }

    pub fn with_max_concurrency(mut self, max_concurrency: NonZeroUsize) -> Self {
        self.max_concurrency = Some(max_concurrency);
        self
    }

    pub fn with_max_sub_batch(mut self, max_sub_batch: NonZeroUsize) -> Self {
        self.max_sub_batch = Some(max_sub_batch);
        self
    }

    pub fn network(&self) -> &Arc<Network> {
        &self.network
    }

    /// Returns the cost of the current parameters on `batch`.
    pub fn cost(&self, batch: &[VectorSample]) -> f64 {
        GaussNewton::new(Arc::clone(&self.network), Arc::clone(&self.loss)).objective_at_zero(batch)
    }
}

impl<L: LossFn + 'static> Learner for NeuralNetLearner<L> {
    type Sample = VectorSample;

    fn parameters(&self) -> ParamLayout {
        self.network.layout()
    }

    fn make_objective(&mut self) -> SharedObjective<VectorSample> {
        let wrapped = GaussNewton::new(Arc::clone(&self.network), Arc::clone(&self.loss));
        let params = Arc::clone(self.network.params());
        let mut objective = ConcurrentObjective::new(wrapped, params, Arc::clone(&self.pool));

        if let Some(max_concurrency) = self.max_concurrency {
            objective = objective.with_max_concurrency(max_concurrency);
        }

        if let Some(max_sub_batch) = self.max_sub_batch {
            objective = objective.with_max_sub_batch(max_sub_batch);
        }

        Arc::new(objective)
    }

    fn adjust(&mut self, adjustment: &ParamDelta, _: &ParamDelta, _: &[VectorSample]) {
        self.network.params().apply(adjustment);
    }
}
