use std::sync::Arc;

use hessfree::{
    ConcurrentObjective, Dataset, HessianFreeConfig, Learner, LogUi, ParamArena, ParamDelta,
    ParamId, ParamLayout, ParamSnapshot, QuadObjective, SharedObjective, StopHandle,
    TrainerBuilder, TrainerState, VectorPool, WrappedObjective,
};

const DIM: usize = 3;

/// `0.5 * |θ - target|^2` for every sample, centered on a snapshot of `θ`.
struct Bowl {
    params: Arc<ParamArena>,
    theta: ParamId,
    center: ParamSnapshot,
}

impl Bowl {
    fn offsets<'a>(
        &'a self,
        delta: &'a ParamDelta,
        target: &'a [f64],
    ) -> impl Iterator<Item = f64> + 'a {
        let center = self.center.get(self.theta);
        let delta = delta.get(self.theta);

        (0..DIM).map(move |i| center[i] + delta.map_or(0., |d| d[i]) - target[i])
    }
}

impl QuadObjective for Bowl {
    type Sample = Vec<f64>;

    fn quad(&self, delta: &ParamDelta, batch: &[Vec<f64>]) -> f64 {
        batch
            .iter()
            .flat_map(|t| self.offsets(delta, t))
            .map(|o| 0.5 * o * o)
            .sum()
    }

    fn quad_grad(&self, delta: &ParamDelta, batch: &[Vec<f64>], out: &mut ParamDelta) {
        for target in batch {
            let offsets: Vec<f64> = self.offsets(delta, target).collect();
            if let Some(g) = out.get_mut(self.theta) {
                g.iter_mut().zip(offsets).for_each(|(g, o)| *g += o);
            }
        }
    }

    fn quad_hessian(
        &self,
        delta: &ParamDelta,
        x: &ParamDelta,
        batch: &[Vec<f64>],
        out: &mut ParamDelta,
    ) -> f64 {
        if let (Some(v), Some(h)) = (delta.get(self.theta), out.get_mut(self.theta)) {
            h.iter_mut()
                .zip(v)
                .for_each(|(h, v)| *h += batch.len() as f64 * v);
        }

        self.quad(x, batch)
    }
}

impl WrappedObjective for Bowl {
    fn objective_at_zero(&self, batch: &[Vec<f64>]) -> f64 {
        let theta = self.params.read(self.theta);

        batch
            .iter()
            .flat_map(|t| theta.iter().zip(t).map(|(a, b)| a - b).collect::<Vec<_>>())
            .map(|o| 0.5 * o * o)
            .sum()
    }
}

/// Learns the mean of its samples and stops the session after `limit` adjustments.
struct MeanLearner {
    params: Arc<ParamArena>,
    theta: ParamId,
    pool: Arc<VectorPool>,
    stop: StopHandle,
    limit: usize,
    adjustments: usize,
}

impl Learner for MeanLearner {
    type Sample = Vec<f64>;

    fn parameters(&self) -> ParamLayout {
        self.params.layout()
    }

    fn make_objective(&mut self) -> SharedObjective<Vec<f64>> {
        let bowl = Bowl {
            params: Arc::clone(&self.params),
            theta: self.theta,
            center: self.params.snapshot(),
        };

        Arc::new(ConcurrentObjective::new(
            bowl,
            Arc::clone(&self.params),
            Arc::clone(&self.pool),
        ))
    }

    fn adjust(&mut self, adjustment: &ParamDelta, _: &ParamDelta, _: &[Vec<f64>]) {
        self.params.apply(adjustment);
        self.adjustments += 1;

        if self.adjustments >= self.limit {
            self.stop.stop();
        }
    }
}

fn targets() -> Vec<Vec<f64>> {
    (0..30)
        .map(|i| {
            let i = i as f64;
            vec![1. + (i * 0.7).sin(), -2. + (i * 1.3).cos(), 0.5 * (i % 3.)]
        })
        .collect()
}

#[test]
fn trainer_finds_the_mean() {
    let samples = targets();
    let mean: Vec<f64> = (0..DIM)
        .map(|i| samples.iter().map(|t| t[i]).sum::<f64>() / samples.len() as f64)
        .collect();

    let ui = Arc::new(LogUi::new());
    let config = HessianFreeConfig::from_json(r#"{ "batch_size": 30, "seed": 1 }"#).unwrap();
    let builder = TrainerBuilder::new(config)
        .unwrap()
        .with_ui(Arc::clone(&ui) as Arc<dyn hessfree::Ui>);

    let mut arena = ParamArena::new();
    let theta = arena.register("theta", vec![0.; DIM]);
    let learner = MeanLearner {
        params: Arc::new(arena),
        theta,
        pool: builder.pool(),
        stop: ui.stop_handle(),
        limit: 15,
        adjustments: 0,
    };

    let mut trainer = builder.build(learner, Dataset::new(samples)).unwrap();
    let report = trainer.train();

    assert_eq!(report.applied, 15);
    assert_eq!(report.epochs, 15);
    assert_eq!(trainer.state(), TrainerState::Stopped);
    assert!(trainer.learner().coeff() < 1.);

    let learner = trainer.learner().wrapped();
    let theta = learner.params.read(learner.theta);
    for (t, m) in theta.iter().zip(&mean) {
        assert!((t - m).abs() < 1e-3, "{t} should be close to {m}");
    }
}
