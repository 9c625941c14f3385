use super::{ParamId, ParamLayout};

/// A displacement in parameter space.
///
/// Maps parameters to vectors of the same length as the parameter. A parameter that is absent
/// from the delta is displaced by zero, so an empty delta is the origin.
///
/// Binary operations panic when both operands hold the same parameter with different lengths,
/// that's a broken precondition rather than a recoverable error.
#[derive(Debug, Clone, Default)]
pub struct ParamDelta {
    vecs: Vec<Option<Vec<f64>>>,
}

impl PartialEq for ParamDelta {
    fn eq(&self, other: &Self) -> bool {
        self.iter().eq(other.iter())
    }
}

impl ParamDelta {
    /// Creates a new empty `ParamDelta`, equivalent to a zero offset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a delta with a zeroed vector for every parameter of `layout`.
    pub fn zeros(layout: &ParamLayout) -> Self {
        let mut delta = Self::new();

        for (id, len) in layout.iter() {
            delta.insert(id, vec![0.; len]);
        }

        delta
    }

    /// Sets the vector for a parameter, returning the previous one if any.
    pub fn insert(&mut self, id: ParamId, vec: Vec<f64>) -> Option<Vec<f64>> {
        if self.vecs.len() <= id.0 {
            self.vecs.resize_with(id.0 + 1, || None);
        }

        self.vecs[id.0].replace(vec)
    }

    /// Takes out the vector of a parameter.
    pub fn remove(&mut self, id: ParamId) -> Option<Vec<f64>> {
        self.vecs.get_mut(id.0)?.take()
    }

    pub fn get(&self, id: ParamId) -> Option<&[f64]> {
        self.vecs.get(id.0)?.as_deref()
    }

    pub fn get_mut(&mut self, id: ParamId) -> Option<&mut [f64]> {
        self.vecs.get_mut(id.0)?.as_deref_mut()
    }

    /// Returns the amount of parameters in this delta.
    pub fn len(&self) -> usize {
        self.vecs.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterates the parameters of this delta in `ParamId` order.
    pub fn iter(&self) -> impl Iterator<Item = (ParamId, &[f64])> + '_ {
        self.vecs
            .iter()
            .enumerate()
            .filter_map(|(i, v)| Some((ParamId(i), v.as_deref()?)))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (ParamId, &mut [f64])> + '_ {
        self.vecs
            .iter_mut()
            .enumerate()
            .filter_map(|(i, v)| Some((ParamId(i), v.as_deref_mut()?)))
    }

    /// Consumes the delta, yielding its vectors.
    pub fn into_vecs(self) -> impl Iterator<Item = Vec<f64>> {
        self.vecs.into_iter().flatten()
    }

    /// Returns the shape of this delta.
    pub fn layout(&self) -> ParamLayout {
        self.iter().map(|(id, v)| (id, v.len())).collect()
    }

    /// Computes the dot product between two deltas.
    ///
    /// # Panics
    /// If a parameter present in both deltas has different lengths.
    pub fn dot(&self, other: &ParamDelta) -> f64 {
        self.iter()
            .filter_map(|(id, a)| {
                let b = other.get(id)?;
                assert_eq!(a.len(), b.len(), "delta length mismatch for {id}");
                Some(a.iter().zip(b).map(|(a, b)| a * b).sum::<f64>())
            })
            .sum()
    }

    /// Returns the squared magnitude of the delta.
    pub fn mag2(&self) -> f64 {
        self.iter()
            .map(|(_, v)| v.iter().map(|x| x * x).sum::<f64>())
            .sum()
    }

    /// Multiplies every component of the delta by `s`.
    pub fn scale(&mut self, s: f64) {
        self.iter_mut()
            .for_each(|(_, v)| v.iter_mut().for_each(|x| *x *= s));
    }

    /// Adds `s * other` to this delta in place.
    ///
    /// # Panics
    /// If `other` holds a parameter this delta doesn't have or the lengths don't match.
    pub fn add_scaled(&mut self, s: f64, other: &ParamDelta) {
        for (id, b) in other.iter() {
            let a = self
                .get_mut(id)
                .unwrap_or_else(|| panic!("{id} is missing from the destination delta"));
            assert_eq!(a.len(), b.len(), "delta length mismatch for {id}");

            a.iter_mut().zip(b).for_each(|(a, b)| *a += s * b);
        }
    }

    /// Overwrites this delta with the values of `other`.
    ///
    /// Parameters absent from `other` are zeroed.
    ///
    /// # Panics
    /// If `other` holds a parameter this delta doesn't have or the lengths don't match.
    pub fn copy_from(&mut self, other: &ParamDelta) {
        for (id, a) in self.iter_mut() {
            match other.get(id) {
                Some(b) => {
                    assert_eq!(a.len(), b.len(), "delta length mismatch for {id}");
                    a.copy_from_slice(b);
                }
                None => a.fill(0.),
            }
        }

        if let Some((id, _)) = other.iter().find(|&(id, _)| self.get(id).is_none()) {
            panic!("{id} is missing from the destination delta");
        }
    }

    /// Sets every component to zero, keeping the parameters.
    pub fn fill_zero(&mut self) {
        self.iter_mut().for_each(|(_, v)| v.fill(0.));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta(vecs: &[&[f64]]) -> ParamDelta {
        let mut delta = ParamDelta::new();
        for (i, v) in vecs.iter().enumerate() {
            delta.insert(ParamId(i), v.to_vec());
        }
        delta
    }

    #[test]
    fn empty_delta_is_zero() {
        let a = delta(&[&[1., 2.], &[3.]]);
        let zero = ParamDelta::new();

        assert_eq!(a.dot(&zero), 0.);
        assert_eq!(zero.dot(&a), 0.);
        assert!(zero.is_empty());
        assert_eq!(zero.mag2(), 0.);
    }

    #[test]
    fn arithmetic() {
        let mut a = delta(&[&[1., 2.], &[3.]]);
        let b = delta(&[&[-1., 0.5], &[2.]]);

        assert_eq!(a.dot(&b), -1. + 1. + 6.);
        assert_eq!(a.mag2(), 14.);

        a.add_scaled(2., &b);
        assert_eq!(a, delta(&[&[-1., 3.], &[7.]]));

        a.scale(0.5);
        assert_eq!(a, delta(&[&[-0.5, 1.5], &[3.5]]));
    }

    #[test]
    fn copies_are_deep() {
        let a = delta(&[&[1., 2.]]);
        let mut b = a.clone();
        b.scale(3.);

        assert_eq!(a.get(ParamId(0)).unwrap(), [1., 2.]);
        assert_eq!(b.get(ParamId(0)).unwrap(), [3., 6.]);

        b.copy_from(&a);
        assert_eq!(a, b);
    }

    #[test]
    fn copy_from_zeroes_missing_params() {
        let mut a = delta(&[&[1., 2.], &[3.]]);
        let mut b = ParamDelta::new();
        b.insert(ParamId(1), vec![5.]);

        a.copy_from(&b);

        assert_eq!(a, delta(&[&[0., 0.], &[5.]]));
    }

    #[test]
    fn zeros_match_layout() {
        let layout: ParamLayout = [(ParamId(0), 3), (ParamId(2), 1)].into_iter().collect();
        let zeros = ParamDelta::zeros(&layout);

        assert_eq!(zeros.len(), 2);
        assert!(zeros.get(ParamId(1)).is_none());
        assert_eq!(zeros.layout(), layout);
    }

    #[test]
    fn equality_ignores_removed_params() {
        let mut a = ParamDelta::new();
        a.insert(ParamId(2), vec![1.]);
        a.remove(ParamId(2));

        assert!(a.is_empty());
        assert_eq!(a, ParamDelta::new());

        a.insert(ParamId(0), vec![1., 2.]);
        assert_eq!(a, delta(&[&[1., 2.]]));
        assert_ne!(a, ParamDelta::new());
    }

    #[test]
    #[should_panic]
    fn mismatched_lengths_panic() {
        let a = delta(&[&[1., 2.]]);
        let b = delta(&[&[1.]]);
        a.dot(&b);
    }

    #[test]
    #[should_panic]
    fn adding_unknown_param_panics() {
        let mut a = delta(&[&[1., 2.]]);
        let mut b = ParamDelta::new();
        b.insert(ParamId(3), vec![1.]);
        a.add_scaled(1., &b);
    }
}
