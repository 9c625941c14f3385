use std::{
    env,
    error::Error,
    fs,
    num::NonZeroUsize,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
};

use gauss_newton::{Init, LayerSpec, Network, NeuralNetLearner, SoftmaxCrossEntropy, VectorSample};
use hessfree::{Dataset, HessianFreeConfig, LogUi, StopHandle, TrainerBuilder, Ui};
use log::{info, warn};
use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::Deserialize;
use tokio::{runtime, signal};

const DEFAULT_HIDDEN: usize = 16;
const DEFAULT_SAMPLES: usize = 600;
const DEFAULT_ADJUSTMENTS: usize = 40;
const CLASSES: usize = 4;

/// The settings of the demo, read from the json file given as first argument.
#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct DemoConfig {
    trainer: HessianFreeConfig,
    hidden: NonZeroUsize,
    samples: usize,
    adjustments: usize,
    init: Init,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            trainer: HessianFreeConfig::default(),
            hidden: NonZeroUsize::new(DEFAULT_HIDDEN).unwrap_or(NonZeroUsize::MIN),
            samples: DEFAULT_SAMPLES,
            adjustments: DEFAULT_ADJUSTMENTS,
            init: Init::default(),
        }
    }
}

/// Logs every event and stops after a fixed amount of adjustments or on Ctrl+C.
struct DemoUi {
    log: LogUi,
    limit: usize,
    adjustments: AtomicUsize,
}

impl Ui for DemoUi {
    fn log_cg_start(&self, quad: f64, objective: f64) {
        self.log.log_cg_start(quad, objective);
    }

    fn log_cg_iteration(&self, step_size: f64, quad: f64) {
        self.log.log_cg_iteration(step_size, quad);
    }

    fn log_new_mini_batch(&self, epoch: usize, batch: usize) {
        self.log.log_new_mini_batch(epoch, batch);
    }

    fn log_damping(&self, trust: f64, coeff: f64) {
        self.log.log_damping(trust, coeff);
        self.adjustments.fetch_add(1, Ordering::Relaxed);
    }

    fn should_stop(&self) -> bool {
        self.log.should_stop() || self.adjustments.load(Ordering::Relaxed) >= self.limit
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let config = match env::args().nth(1) {
        Some(path) => serde_json::from_str::<DemoConfig>(&fs::read_to_string(path)?)?,
        None => DemoConfig::default(),
    };
    config.trainer.validate()?;

    let mut rng = match config.trainer.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    let specs = [
        LayerSpec::Dense {
            outputs: config.hidden,
        },
        LayerSpec::Tanh,
        LayerSpec::Dense {
            outputs: NonZeroUsize::new(CLASSES).unwrap_or(NonZeroUsize::MIN),
        },
    ];
    let network = Network::new(2, &specs, config.init, &mut rng)?;
    let samples = quadrants(config.samples, &mut rng);
    network.check_samples(&samples)?;

    let log = LogUi::new();
    spawn_interrupt_listener(log.stop_handle());
    let ui = Arc::new(DemoUi {
        log,
        limit: config.adjustments,
        adjustments: AtomicUsize::new(0),
    });

    let builder = TrainerBuilder::new(config.trainer.clone())?.with_ui(ui);
    let learner = NeuralNetLearner::new(network, SoftmaxCrossEntropy::new(), builder.pool())
        .with_config(&config.trainer);

    let initial_cost = learner.cost(&samples);
    let mut trainer = builder.build(learner, Dataset::new(samples.clone()))?;
    let report = trainer.train();

    let learner = trainer.learner().wrapped();
    let accuracy = accuracy(learner.network(), &samples)?;

    info!(
        epochs = report.epochs,
        batches = report.batches,
        applied = report.applied;
        "cost went from {initial_cost:.4} to {:.4}, accuracy is {:.2}%",
        learner.cost(&samples),
        accuracy * 100.
    );

    Ok(())
}

/// Stops the session on the first Ctrl+C.
fn spawn_interrupt_listener(stop: StopHandle) {
    thread::spawn(move || {
        let rt = match runtime::Builder::new_current_thread().enable_all().build() {
            Ok(rt) => rt,
            Err(e) => {
                warn!("can't listen for interrupts: {e}");
                return;
            }
        };

        if rt.block_on(signal::ctrl_c()).is_ok() {
            info!("caught interrupt, stopping after the current step");
            stop.stop();
        }
    });
}

/// Points in the plane labelled by the quadrant they fall in.
fn quadrants<R: Rng>(count: usize, rng: &mut R) -> Vec<VectorSample> {
    (0..count)
        .map(|_| {
            let x: f64 = rng.random_range(-1.0..1.0);
            let y: f64 = rng.random_range(-1.0..1.0);
            let class = usize::from(x > 0.) + 2 * usize::from(y > 0.);

            let mut output = vec![0.; CLASSES];
            output[class] = 1.;
            VectorSample::new(vec![x, y], output)
        })
        .collect()
}

fn accuracy(network: &Network, samples: &[VectorSample]) -> gauss_newton::Result<f64> {
    let mut hits = 0;

    for sample in samples {
        let prediction = network.predict(&sample.input)?;
        let guess = argmax(&prediction);

        if sample.output.get(guess).is_some_and(|&y| y == 1.) {
            hits += 1;
        }
    }

    Ok(hits as f64 / samples.len().max(1) as f64)
}

fn argmax(values: &[f64]) -> usize {
    values
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map_or(0, |(i, _)| i)
}
