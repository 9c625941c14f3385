use std::{collections::HashMap, sync::Arc};

use parking_lot::{Mutex, RwLock};

use crate::params::{ParamDelta, ParamLayout};

type Bucket = Arc<Mutex<Vec<Vec<f64>>>>;

/// A pool of reusable vectors, bucketed by length.
///
/// Every bucket has its own lock so workers borrowing vectors of different lengths don't
/// contend. Borrowed vectors are always zeroed.
#[derive(Debug, Default)]
pub struct VectorPool {
    buckets: RwLock<HashMap<usize, Bucket>>,
}

impl VectorPool {
    /// Creates a new empty `VectorPool`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Borrows a zeroed vector of length `len`.
    pub fn alloc(&self, len: usize) -> Vec<f64> {
        let reused = self.bucket(len).lock().pop();

        match reused {
            Some(mut vec) => {
                vec.fill(0.);
                vec
            }
            None => vec![0.; len],
        }
    }

    /// Gives a vector back to the pool.
    pub fn release(&self, vec: Vec<f64>) {
        self.bucket(vec.len()).lock().push(vec);
    }

    /// Borrows a zeroed delta shaped like `layout`.
    pub fn alloc_delta(&self, layout: &ParamLayout) -> ParamDelta {
        let mut delta = ParamDelta::new();

        for (id, len) in layout.iter() {
            delta.insert(id, self.alloc(len));
        }

        delta
    }

    /// Borrows a zeroed delta with the same shape as `like`.
    pub fn alloc_like(&self, like: &ParamDelta) -> ParamDelta {
        self.alloc_delta(&like.layout())
    }

    /// Borrows a delta holding a copy of `src`.
    pub fn alloc_copy(&self, src: &ParamDelta) -> ParamDelta {
        let mut delta = self.alloc_like(src);
        delta.copy_from(src);
        delta
    }

    /// Gives every vector of `delta` back to the pool.
    pub fn release_delta(&self, delta: ParamDelta) {
        delta.into_vecs().for_each(|vec| self.release(vec));
    }

    /// Returns the amount of idle vectors of length `len`.
    pub fn idle(&self, len: usize) -> usize {
        self.buckets
            .read()
            .get(&len)
            .map_or(0, |bucket| bucket.lock().len())
    }

    fn bucket(&self, len: usize) -> Bucket {
        if let Some(bucket) = self.buckets.read().get(&len) {
            return Arc::clone(bucket);
        }

        let mut buckets = self.buckets.write();
        Arc::clone(buckets.entry(len).or_default())
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::params::ParamArena;

    #[test]
    fn reused_vectors_are_zeroed() {
        let pool = VectorPool::new();

        let mut vec = pool.alloc(4);
        vec.copy_from_slice(&[1., 2., 3., 4.]);
        pool.release(vec);
        assert_eq!(pool.idle(4), 1);

        let vec = pool.alloc(4);
        assert_eq!(vec, [0.; 4]);
        assert_eq!(pool.idle(4), 0);
    }

    #[test]
    fn buckets_are_keyed_by_length() {
        let pool = VectorPool::new();
        pool.release(vec![1.; 3]);

        let vec = pool.alloc(2);
        assert_eq!(vec.len(), 2);
        assert_eq!(pool.idle(3), 1);
    }

    #[test]
    fn deltas_round_trip_through_the_pool() {
        let mut arena = ParamArena::new();
        arena.register("w", vec![0.; 5]);
        arena.register("b", vec![0.; 2]);
        let layout = arena.layout();
        let pool = VectorPool::new();

        let mut delta = pool.alloc_delta(&layout);
        delta.iter_mut().for_each(|(_, v)| v.fill(7.));
        pool.release_delta(delta);

        let delta = pool.alloc_delta(&layout);
        assert_eq!(delta, ParamDelta::zeros(&layout));
        assert_eq!(pool.idle(5), 0);
    }

    #[test]
    fn concurrent_borrows() {
        const THREADS: usize = 8;
        const ROUNDS: usize = 100;

        let pool = VectorPool::new();

        thread::scope(|s| {
            for t in 0..THREADS {
                let pool = &pool;
                s.spawn(move || {
                    for _ in 0..ROUNDS {
                        let mut vec = pool.alloc(t % 3 + 1);
                        assert!(vec.iter().all(|&x| x == 0.));
                        vec.fill(t as f64 + 1.);
                        pool.release(vec);
                    }
                });
            }
        });

        let idle: usize = (1..=3).map(|len| pool.idle(len)).sum();
        assert!(idle <= THREADS);
    }
}
