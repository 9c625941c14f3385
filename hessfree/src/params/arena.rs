use std::{fmt, sync::Arc};

use parking_lot::{RwLock, RwLockReadGuard};
use rayon::prelude::*;

use super::{ParamDelta, ParamPatch};

/// A stable handle for a parameter registered in a `ParamArena`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ParamId(pub(crate) usize);

impl ParamId {
    /// Returns the position of this parameter inside its arena.
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for ParamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "param#{}", self.0)
    }
}

#[derive(Debug)]
struct Param {
    name: String,
    values: RwLock<Box<[f64]>>,
}

/// The owner of every learnable vector of a model.
///
/// The optimizer never creates or destroys parameters, it only reads and writes the vectors
/// through the arena. Each vector sits behind its own lock so concurrent evaluators can read
/// while nobody is writing.
#[derive(Debug, Default)]
pub struct ParamArena {
    params: Vec<Param>,
}

impl ParamArena {
    /// Creates a new empty `ParamArena`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new parameter.
    ///
    /// # Arguments
    /// * `name` - A human readable name, only used for debugging.
    /// * `values` - The initial values of the parameter.
    ///
    /// # Returns
    /// The handle of the new parameter.
    pub fn register<S: Into<String>>(&mut self, name: S, values: Vec<f64>) -> ParamId {
        let id = ParamId(self.params.len());

        self.params.push(Param {
            name: name.into(),
            values: RwLock::new(values.into_boxed_slice()),
        });

        id
    }

    /// Returns the amount of registered parameters.
    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Returns the name given to `id` on registration.
    pub fn name(&self, id: ParamId) -> &str {
        &self.param(id).name
    }

    /// Returns the shape of every registered parameter.
    pub fn layout(&self) -> ParamLayout {
        self.params
            .iter()
            .enumerate()
            .map(|(i, p)| (ParamId(i), p.values.read().len()))
            .collect()
    }

    /// Locks a parameter for reading.
    ///
    /// # Panics
    /// If `id` was not registered in this arena.
    pub fn read(&self, id: ParamId) -> RwLockReadGuard<'_, Box<[f64]>> {
        self.param(id).values.read()
    }

    /// Copies the current value of every parameter.
    pub fn snapshot(&self) -> ParamSnapshot {
        let values = self
            .params
            .iter()
            .map(|p| Arc::from(&**p.values.read()))
            .collect();

        ParamSnapshot { values }
    }

    /// Adds `delta` onto the live parameters.
    ///
    /// # Panics
    /// If the delta refers to an unknown parameter or its lengths don't match.
    pub fn apply(&self, delta: &ParamDelta) {
        let entries: Vec<_> = delta.iter().collect();

        entries.into_par_iter().for_each(|(id, d)| {
            let mut values = self.param(id).values.write();
            assert_eq!(
                values.len(),
                d.len(),
                "delta length mismatch for {id}"
            );

            values.iter_mut().zip(d).for_each(|(v, d)| *v += d);
        });
    }

    /// Temporarily adds `delta` onto the live parameters.
    ///
    /// The original values are restored when the returned guard is dropped.
    pub fn patch(&self, delta: &ParamDelta) -> ParamPatch<'_> {
        ParamPatch::new(self, delta)
    }

    /// Swaps the values of a parameter, returning the old ones.
    pub(super) fn replace(&self, id: ParamId, values: Box<[f64]>) -> Box<[f64]> {
        std::mem::replace(&mut *self.param(id).values.write(), values)
    }

    fn param(&self, id: ParamId) -> &Param {
        self.params
            .get(id.0)
            .unwrap_or_else(|| panic!("{id} is not registered in this arena"))
    }
}

/// The shape of a set of parameters: which ones and how long each vector is.
///
/// It's cheap to clone, every delta of an optimization run is allocated from the same layout.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParamLayout {
    entries: Arc<[(ParamId, usize)]>,
}

impl ParamLayout {
    /// Returns an iterator over the `(id, len)` pairs of this layout.
    pub fn iter(&self) -> impl Iterator<Item = (ParamId, usize)> + '_ {
        self.entries.iter().copied()
    }

    /// Returns the amount of parameters in the layout.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the total amount of scalars across every parameter.
    pub fn size(&self) -> usize {
        self.entries.iter().map(|&(_, len)| len).sum()
    }
}

impl FromIterator<(ParamId, usize)> for ParamLayout {
    fn from_iter<I: IntoIterator<Item = (ParamId, usize)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// An immutable copy of the values of every parameter of an arena.
#[derive(Debug, Clone)]
pub struct ParamSnapshot {
    values: Vec<Arc<[f64]>>,
}

impl ParamSnapshot {
    /// Returns the copied values of `id`.
    ///
    /// # Panics
    /// If `id` was not part of the snapshotted arena.
    pub fn get(&self, id: ParamId) -> &[f64] {
        self.values
            .get(id.0)
            .unwrap_or_else(|| panic!("{id} is not part of this snapshot"))
    }
}
