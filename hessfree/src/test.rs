//! Shared fixtures for the unit tests of this crate.

use std::sync::Arc;

use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::{
    learner::{Learner, SharedObjective},
    objective::{ConcurrentObjective, QuadObjective, WrappedObjective},
    params::{ParamArena, ParamDelta, ParamId, ParamLayout, ParamSnapshot},
    pool::VectorPool,
};

/// A sample for `LeastSquares`.
#[derive(Debug, Clone)]
pub struct LsSample {
    pub x: Vec<f64>,
    pub y: f64,
}

/// A linear least squares model, `0.5 * (w·x + b - y)^2` summed over the batch.
///
/// Being linear in its parameters, its quadratic model is exact.
pub struct LeastSquares {
    params: Arc<ParamArena>,
    w: ParamId,
    b: ParamId,
    center: ParamSnapshot,
}

impl LeastSquares {
    pub fn new(dim: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut arena = ParamArena::new();
        let w = arena.register("w", (0..dim).map(|_| rng.random_range(-1.0..1.0)).collect());
        let b = arena.register("b", vec![rng.random_range(-1.0..1.0)]);
        let params = Arc::new(arena);
        let center = params.snapshot();

        Self {
            params,
            w,
            b,
            center,
        }
    }

    /// Builds a new model centered on the current value of the same parameters.
    pub fn recenter(&self) -> Self {
        Self {
            params: Arc::clone(&self.params),
            w: self.w,
            b: self.b,
            center: self.params.snapshot(),
        }
    }

    pub fn params(&self) -> &Arc<ParamArena> {
        &self.params
    }

    pub fn layout(&self) -> ParamLayout {
        self.params.layout()
    }

    fn predict(w: &[f64], b: f64, sample: &LsSample) -> f64 {
        w.iter().zip(&sample.x).map(|(w, x)| w * x).sum::<f64>() + b
    }

    /// Returns the linearized displacement of the prediction for a delta.
    fn displacement(&self, delta: &ParamDelta, sample: &LsSample) -> f64 {
        let dw = delta.get(self.w).map_or(0., |dw| {
            dw.iter().zip(&sample.x).map(|(d, x)| d * x).sum()
        });
        let db = delta.get(self.b).map_or(0., |db| db[0]);
        dw + db
    }

    fn residual(&self, delta: &ParamDelta, sample: &LsSample) -> f64 {
        let w = self.center.get(self.w);
        let b = self.center.get(self.b)[0];
        Self::predict(w, b, sample) + self.displacement(delta, sample) - sample.y
    }

    fn accumulate(&self, scale: f64, sample: &LsSample, out: &mut ParamDelta) {
        if let Some(gw) = out.get_mut(self.w) {
            gw.iter_mut().zip(&sample.x).for_each(|(g, x)| *g += scale * x);
        }
        if let Some(gb) = out.get_mut(self.b) {
            gb[0] += scale;
        }
    }
}

impl QuadObjective for LeastSquares {
    type Sample = LsSample;

    fn quad(&self, delta: &ParamDelta, batch: &[LsSample]) -> f64 {
        batch
            .iter()
            .map(|s| 0.5 * self.residual(delta, s).powi(2))
            .sum()
    }

    fn quad_grad(&self, delta: &ParamDelta, batch: &[LsSample], out: &mut ParamDelta) {
        for sample in batch {
            let r = self.residual(delta, sample);
            self.accumulate(r, sample, out);
        }
    }

    fn quad_hessian(
        &self,
        delta: &ParamDelta,
        x: &ParamDelta,
        batch: &[LsSample],
        out: &mut ParamDelta,
    ) -> f64 {
        for sample in batch {
            let jv = self.displacement(delta, sample);
            self.accumulate(jv, sample, out);
        }

        self.quad(x, batch)
    }
}

impl WrappedObjective for LeastSquares {
    fn objective_at_zero(&self, batch: &[LsSample]) -> f64 {
        let w = self.params.read(self.w);
        let b = self.params.read(self.b)[0];

        batch
            .iter()
            .map(|s| 0.5 * (Self::predict(&w, b, s) - s.y).powi(2))
            .sum()
    }
}

/// A `Learner` over a `LeastSquares` model which applies every adjustment as is.
pub struct LsLearner {
    pub model: LeastSquares,
    pub pool: Arc<VectorPool>,
    pub adjustments: usize,
}

impl LsLearner {
    pub fn new(dim: usize, seed: u64) -> Self {
        Self {
            model: LeastSquares::new(dim, seed),
            pool: Arc::new(VectorPool::new()),
            adjustments: 0,
        }
    }

    /// Returns the cost of the live parameters on `batch`.
    pub fn cost(&self, batch: &[LsSample]) -> f64 {
        self.model.objective_at_zero(batch)
    }
}

impl Learner for LsLearner {
    type Sample = LsSample;

    fn parameters(&self) -> ParamLayout {
        self.model.layout()
    }

    fn make_objective(&mut self) -> SharedObjective<LsSample> {
        let model = self.model.recenter();
        let params = Arc::clone(self.model.params());

        Arc::new(ConcurrentObjective::new(model, params, Arc::clone(&self.pool)))
    }

    fn adjust(&mut self, adjustment: &ParamDelta, _: &ParamDelta, _: &[LsSample]) {
        self.model.params().apply(adjustment);
        self.adjustments += 1;
    }
}

/// Generates `count` samples of dimension `dim` from a noisy linear target.
pub fn samples(dim: usize, count: usize, seed: u64) -> Vec<LsSample> {
    let mut rng = StdRng::seed_from_u64(seed);
    let target: Vec<f64> = (0..dim).map(|_| rng.random_range(-2.0..2.0)).collect();

    (0..count)
        .map(|_| {
            let x: Vec<f64> = (0..dim).map(|_| rng.random_range(-1.0..1.0)).collect();
            let y = LeastSquares::predict(&target, 0.5, &LsSample { x: x.clone(), y: 0. })
                + rng.random_range(-0.1..0.1);
            LsSample { x, y }
        })
        .collect()
}

/// Generates a random delta shaped like `layout` with components in `[-scale, scale)`.
pub fn random_delta(layout: &ParamLayout, scale: f64, seed: u64) -> ParamDelta {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut delta = ParamDelta::zeros(layout);

    delta
        .iter_mut()
        .for_each(|(_, v)| v.iter_mut().for_each(|x| *x = scale * rng.random_range(-1.0..1.0)));

    delta
}

pub fn assert_close(actual: f64, expected: f64, prec: f64) {
    assert!(
        (actual - expected).abs() <= prec * expected.abs().max(1.),
        "expected {expected} but got {actual}"
    );
}

pub fn assert_delta_close(actual: &ParamDelta, expected: &ParamDelta, prec: f64) {
    assert_eq!(actual.layout(), expected.layout());

    for ((id, a), (_, x)) in actual.iter().zip(expected.iter()) {
        for (i, (a, x)) in a.iter().zip(x).enumerate() {
            assert!(
                (a - x).abs() <= prec * x.abs().max(1.),
                "component {i} of {id} should be {x} but got {a}"
            );
        }
    }
}
