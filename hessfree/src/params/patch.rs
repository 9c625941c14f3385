use super::{ParamArena, ParamDelta, ParamId};

/// A scoped displacement of the live parameters.
///
/// While the guard lives the arena holds `params + delta`, the original vectors come back when
/// it's dropped, on every exit path including unwinding.
pub struct ParamPatch<'a> {
    arena: &'a ParamArena,
    backups: Vec<(ParamId, Box<[f64]>)>,
}

impl<'a> ParamPatch<'a> {
    pub(super) fn new(arena: &'a ParamArena, delta: &ParamDelta) -> Self {
        let mut patch = Self {
            arena,
            backups: Vec::with_capacity(delta.len()),
        };

        for (id, d) in delta.iter() {
            let patched: Box<[f64]> = {
                let values = arena.read(id);
                assert_eq!(values.len(), d.len(), "delta length mismatch for {id}");
                values.iter().zip(d).map(|(v, d)| v + d).collect()
            };

            let original = arena.replace(id, patched);
            patch.backups.push((id, original));
        }

        patch
    }
}

impl Drop for ParamPatch<'_> {
    fn drop(&mut self) {
        for (id, original) in self.backups.drain(..) {
            self.arena.replace(id, original);
        }
    }
}
