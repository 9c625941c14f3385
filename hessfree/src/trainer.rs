use std::{num::NonZeroUsize, sync::Arc};

use log::{debug, info};
use rand::{SeedableRng, rngs::StdRng};

use crate::{
    cg::{CgSolver, ConvergenceCriteria},
    config::HessianFreeConfig,
    damping::DampingController,
    dataset::Dataset,
    error::{HfErr, Result},
    learner::Learner,
    params::ParamDelta,
    pool::VectorPool,
    ui::{NoUi, Ui},
};

/// The lifecycle of a `Trainer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainerState {
    Idle,
    Running,
    Stopped,
}

/// What a training session went through before it was stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrainReport {
    /// The amount of completed epochs.
    pub epochs: usize,
    /// The amount of mini-batches that were started.
    pub batches: usize,
    /// The amount of mini-batches whose adjustment was applied.
    pub applied: usize,
}

/// The settings every `CgSolver` of a session is built with.
#[derive(Debug, Clone, Copy)]
struct SolverSettings {
    criteria: ConvergenceCriteria,
    backtrack_rate: f64,
    max_iterations: Option<NonZeroUsize>,
}

/// Runs Hessian-free optimization on a `Learner`, one mini-batch at a time, until its UI asks
/// it to stop.
pub struct Trainer<L: Learner> {
    learner: L,
    dataset: Dataset<L::Sample>,
    ui: Arc<dyn Ui>,
    pool: Arc<VectorPool>,
    batch_size: NonZeroUsize,
    settings: SolverSettings,
    rng: StdRng,
    state: TrainerState,
    warm_start: Option<ParamDelta>,
}

impl<L: Learner> Trainer<L> {
    pub fn learner(&self) -> &L {
        &self.learner
    }

    pub fn learner_mut(&mut self) -> &mut L {
        &mut self.learner
    }

    pub fn dataset(&self) -> &Dataset<L::Sample> {
        &self.dataset
    }

    pub fn state(&self) -> TrainerState {
        self.state
    }

    /// Returns the solution the next mini-batch starts from, if any.
    pub fn warm_start(&self) -> Option<&ParamDelta> {
        self.warm_start.as_ref()
    }

    /// Trains the learner epoch after epoch until a stop is requested.
    ///
    /// Every epoch shuffles the dataset and goes through it in contiguous mini-batches. A stop
    /// requested while a mini-batch is being optimized discards its adjustment.
    ///
    /// # Returns
    /// A summary of the session.
    pub fn train(&mut self) -> TrainReport {
        let Self {
            learner,
            dataset,
            ui,
            pool,
            batch_size,
            settings,
            rng,
            state,
            warm_start,
        } = self;

        let mut report = TrainReport::default();
        *state = TrainerState::Running;

        'session: while !ui.should_stop() {
            dataset.shuffle(rng);

            for (i, batch) in dataset.batches(*batch_size).enumerate() {
                if ui.should_stop() {
                    break 'session;
                }

                ui.log_new_mini_batch(report.epochs, i);
                report.batches += 1;

                let ctx = BatchContext {
                    ui,
                    pool,
                    settings,
                };

                if !ctx.optimize(learner, warm_start, batch) {
                    debug!("discarded the adjustment of an interrupted mini-batch");
                    break 'session;
                }

                report.applied += 1;
            }

            report.epochs += 1;
        }

        *state = TrainerState::Stopped;
        info!(
            epochs = report.epochs,
            batches = report.batches,
            applied = report.applied;
            "training stopped"
        );

        report
    }
}

/// The state shared by every mini-batch of a session.
struct BatchContext<'a> {
    ui: &'a Arc<dyn Ui>,
    pool: &'a Arc<VectorPool>,
    settings: &'a SolverSettings,
}

impl BatchContext<'_> {
    /// Minimizes the approximation of a fresh objective on `batch` and hands the result to
    /// the learner.
    ///
    /// # Returns
    /// Whether the adjustment was applied, `false` if a stop was requested first.
    fn optimize<L: Learner>(
        &self,
        learner: &mut L,
        warm_start: &mut Option<ParamDelta>,
        batch: &[L::Sample],
    ) -> bool {
        let objective = learner.make_objective();

        let mut solver = CgSolver::new(
            objective.as_ref(),
            batch,
            learner.parameters(),
            Arc::clone(self.pool),
        )
        .with_criteria(self.settings.criteria)
        .with_backtrack_rate(self.settings.backtrack_rate)
        .with_max_iterations(self.settings.max_iterations)
        .with_ui(Arc::clone(self.ui));

        if let Some(solution) = warm_start.take() {
            solver = solver.with_warm_start(solution);
        }

        loop {
            if solver.step().is_done() {
                break;
            }

            if self.ui.should_stop() {
                *warm_start = Some(solver.release());
                return false;
            }
        }

        debug!(iterations = solver.iterations(); "CG finished {:?}", solver.phase());

        learner.adjust(solver.best(), solver.solution(), batch);
        *warm_start = Some(solver.release());
        true
    }
}

/// Builds `Trainer`s wrapped in Levenberg-Marquardt damping from a `HessianFreeConfig`.
pub struct TrainerBuilder {
    config: HessianFreeConfig,
    ui: Arc<dyn Ui>,
    pool: Arc<VectorPool>,
}

impl TrainerBuilder {
    /// Creates a new `TrainerBuilder`.
    ///
    /// # Arguments
    /// * `config` - The settings of the session, validated here.
    pub fn new(config: HessianFreeConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            config,
            ui: Arc::new(NoUi),
            pool: Arc::new(VectorPool::new()),
        })
    }

    /// Sets the UI the session reports to and takes stop requests from.
    pub fn with_ui(mut self, ui: Arc<dyn Ui>) -> Self {
        self.ui = ui;
        self
    }

    /// Sets the pool solver temporaries are borrowed from.
    pub fn with_pool(mut self, pool: Arc<VectorPool>) -> Self {
        self.pool = pool;
        self
    }

    pub fn config(&self) -> &HessianFreeConfig {
        &self.config
    }

    /// Returns the pool the built trainer will use, to be shared with the learner.
    pub fn pool(&self) -> Arc<VectorPool> {
        Arc::clone(&self.pool)
    }

    /// Builds a new `Trainer`.
    ///
    /// # Arguments
    /// * `learner` - The learner to train, it gets wrapped in a `DampingController`.
    /// * `dataset` - The samples to train on.
    ///
    /// # Returns
    /// The trainer or an error if the dataset is empty.
    pub fn build<L: Learner>(
        &self,
        learner: L,
        dataset: Dataset<L::Sample>,
    ) -> Result<Trainer<DampingController<L>>> {
        if dataset.is_empty() {
            return Err(HfErr::EmptyDataset);
        }

        let config = &self.config;
        let learner = DampingController::new(learner, config.damping_coeff)
            .with_quad_min(config.use_quad_min)
            .with_ui(Arc::clone(&self.ui));

        let settings = SolverSettings {
            criteria: config.convergence.resolved(),
            backtrack_rate: config.backtrack_rate,
            max_iterations: config.max_cg_iterations,
        };

        Ok(Trainer {
            learner,
            dataset,
            ui: Arc::clone(&self.ui),
            pool: Arc::clone(&self.pool),
            batch_size: config.batch_size(),
            settings,
            rng: self.generate_rng(config.seed),
            state: TrainerState::Idle,
            warm_start: None,
        })
    }

    fn generate_rng(&self, seed: Option<u64>) -> StdRng {
        match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        }
    }
}
