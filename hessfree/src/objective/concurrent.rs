use std::{
    num::NonZeroUsize,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
        mpsc,
    },
    thread,
};

use super::{Objective, QuadObjective, WrappedObjective};
use crate::{
    params::{ParamArena, ParamDelta},
    pool::VectorPool,
};

/// The default maximum amount of samples handed to the wrapped objective at once.
pub const DEFAULT_MAX_SUB_BATCH: usize = 15;

/// An `Objective` which parallelizes the calls to a `WrappedObjective`, making sure the
/// wrapped objective never sees more than `max_sub_batch` samples at once and never runs on
/// more than `max_concurrency` threads at once.
///
/// If `max_concurrency` is greater than one, the wrapped objective is called from several
/// threads at the same time with different sub-batches.
pub struct ConcurrentObjective<W: WrappedObjective> {
    wrapped: W,
    params: Arc<ParamArena>,
    pool: Arc<VectorPool>,
    max_concurrency: NonZeroUsize,
    max_sub_batch: NonZeroUsize,
}

impl<W: WrappedObjective> ConcurrentObjective<W> {
    /// Creates a new `ConcurrentObjective`.
    ///
    /// # Arguments
    /// * `wrapped` - The objective to parallelize.
    /// * `params` - The live parameters the wrapped objective evaluates.
    /// * `pool` - The pool the per-worker partial deltas are borrowed from.
    ///
    /// # Returns
    /// A new `ConcurrentObjective` using the available parallelism and the default sub-batch.
    pub fn new(wrapped: W, params: Arc<ParamArena>, pool: Arc<VectorPool>) -> Self {
        let max_concurrency =
            thread::available_parallelism().unwrap_or(NonZeroUsize::MIN);
        let max_sub_batch =
            NonZeroUsize::new(DEFAULT_MAX_SUB_BATCH).unwrap_or(NonZeroUsize::MIN);

        Self {
            wrapped,
            params,
            pool,
            max_concurrency,
            max_sub_batch,
        }
    }

    /// Sets the amount of worker threads per call.
    pub fn with_max_concurrency(mut self, max_concurrency: NonZeroUsize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    /// Sets the maximum amount of samples per call to the wrapped objective.
    pub fn with_max_sub_batch(mut self, max_sub_batch: NonZeroUsize) -> Self {
        self.max_sub_batch = max_sub_batch;
        self
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency.get()
    }

    pub fn max_sub_batch(&self) -> usize {
        self.max_sub_batch.get()
    }

    pub fn wrapped(&self) -> &W {
        &self.wrapped
    }

    /// Returns the amount of threads worth spawning for `shards` sub-batches.
    fn workers(&self, shards: usize) -> usize {
        self.max_concurrency.get().min(shards)
    }

    /// Splits the batch into contiguous sub-batches, preserving the order of the samples.
    fn shards<'s>(&self, batch: &'s [W::Sample]) -> Vec<&'s [W::Sample]> {
        batch.chunks(self.max_sub_batch.get()).collect()
    }
}

impl<W> ConcurrentObjective<W>
where
    W: WrappedObjective,
    W::Sample: Sync,
{
    /// Runs `f` over every shard and sums the results.
    ///
    /// Each worker claims the next unclaimed shard until none remain, sums its own results and
    /// hands the partial sum back through a channel.
    fn sum_values<F>(&self, batch: &[W::Sample], f: F) -> f64
    where
        F: Fn(&[W::Sample]) -> f64 + Sync,
    {
        let shards = self.shards(batch);
        let next = AtomicUsize::new(0);
        let (tx, rx) = mpsc::channel();

        thread::scope(|s| {
            for _ in 0..self.workers(shards.len()) {
                let tx = tx.clone();
                let (shards, next, f) = (&shards, &next, &f);

                s.spawn(move || {
                    let mut sum = 0.;

                    while let Some(&shard) = shards.get(next.fetch_add(1, Ordering::Relaxed)) {
                        sum += f(shard);
                    }

                    let _ = tx.send(sum);
                });
            }
        });

        drop(tx);
        rx.iter().sum()
    }

    /// Runs `f` over every shard, accumulating the deltas into `out`.
    ///
    /// Each worker accumulates its shards into a pooled delta shaped like `out` and sends it once
    /// it runs out of shards. The partial deltas are added to `out` and released to the pool.
    fn sum_deltas<F>(&self, batch: &[W::Sample], out: &mut ParamDelta, f: F)
    where
        F: Fn(&[W::Sample], &mut ParamDelta) + Sync,
    {
        let shards = self.shards(batch);
        let next = AtomicUsize::new(0);
        let layout = out.layout();
        let (tx, rx) = mpsc::channel();

        thread::scope(|s| {
            for _ in 0..self.workers(shards.len()) {
                let tx = tx.clone();
                let (shards, next, f, layout) = (&shards, &next, &f, &layout);
                let pool = &self.pool;

                s.spawn(move || {
                    let mut sum = pool.alloc_delta(layout);

                    while let Some(&shard) = shards.get(next.fetch_add(1, Ordering::Relaxed)) {
                        f(shard, &mut sum);
                    }

                    let _ = tx.send(sum);
                });
            }

            drop(tx);

            for partial in rx.iter() {
                out.add_scaled(1., &partial);
                self.pool.release_delta(partial);
            }
        });
    }
}

impl<W> QuadObjective for ConcurrentObjective<W>
where
    W: WrappedObjective,
    W::Sample: Sync,
{
    type Sample = W::Sample;

    fn quad(&self, delta: &ParamDelta, batch: &[Self::Sample]) -> f64 {
        self.sum_values(batch, |shard| self.wrapped.quad(delta, shard))
    }

    fn quad_grad(&self, delta: &ParamDelta, batch: &[Self::Sample], out: &mut ParamDelta) {
        self.sum_deltas(batch, out, |shard, sum| {
            self.wrapped.quad_grad(delta, shard, sum)
        });
    }

    fn quad_hessian(
        &self,
        delta: &ParamDelta,
        x: &ParamDelta,
        batch: &[Self::Sample],
        out: &mut ParamDelta,
    ) -> f64 {
        let layout = out.layout();
        let shards = self.shards(batch);
        let next = AtomicUsize::new(0);
        let (tx, rx) = mpsc::channel();
        let mut value = 0.;

        thread::scope(|s| {
            for _ in 0..self.workers(shards.len()) {
                let tx = tx.clone();
                let (shards, next, layout) = (&shards, &next, &layout);
                let (pool, wrapped) = (&self.pool, &self.wrapped);

                s.spawn(move || {
                    let mut sum = pool.alloc_delta(layout);
                    let mut value = 0.;

                    while let Some(&shard) = shards.get(next.fetch_add(1, Ordering::Relaxed)) {
                        value += wrapped.quad_hessian(delta, x, shard, &mut sum);
                    }

                    let _ = tx.send((sum, value));
                });
            }

            drop(tx);

            for (partial, partial_value) in rx.iter() {
                out.add_scaled(1., &partial);
                value += partial_value;
                self.pool.release_delta(partial);
            }
        });

        value
    }
}

impl<W> Objective for ConcurrentObjective<W>
where
    W: WrappedObjective,
    W::Sample: Sync,
{
    /// Evaluates the true objective by temporarily moving the live parameters by `delta`.
    ///
    /// Nothing else may evaluate against the same parameters while this runs.
    fn objective(&self, delta: &ParamDelta, batch: &[Self::Sample]) -> f64 {
        let _patch = self.params.patch(delta);
        self.sum_values(batch, |shard| self.wrapped.objective_at_zero(shard))
    }
}
