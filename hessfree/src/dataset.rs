use std::{num::NonZeroUsize, ops::Range, slice::Chunks};

use rand::{Rng, seq::SliceRandom};

/// An owned set of training samples.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset<S> {
    samples: Vec<S>,
}

impl<S> Dataset<S> {
    /// Creates a new `Dataset` holding `samples`.
    pub fn new(samples: Vec<S>) -> Self {
        Self { samples }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&S> {
        self.samples.get(index)
    }

    /// Returns the samples within `range`.
    ///
    /// # Panics
    /// If `range` is out of bounds.
    pub fn slice(&self, range: Range<usize>) -> &[S] {
        &self.samples[range]
    }

    /// Shuffles the samples in place.
    pub fn shuffle<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.samples.shuffle(rng);
    }

    /// Splits the samples into contiguous mini-batches of `batch_size`, the last one may be
    /// shorter.
    pub fn batches(&self, batch_size: NonZeroUsize) -> Chunks<'_, S> {
        self.samples.chunks(batch_size.get())
    }

    pub fn into_samples(self) -> Vec<S> {
        self.samples
    }
}

impl<S> From<Vec<S>> for Dataset<S> {
    fn from(samples: Vec<S>) -> Self {
        Self::new(samples)
    }
}

impl<S> FromIterator<S> for Dataset<S> {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
