use std::{num::NonZeroUsize, sync::Arc};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    objective::Objective,
    params::{ParamDelta, ParamLayout},
    pool::VectorPool,
    ui::{NoUi, Ui},
};

pub const DEFAULT_CONVERGENCE_MIN_K: f64 = 10.;
pub const DEFAULT_CONVERGENCE_K_SCALE: f64 = 0.1;
pub const DEFAULT_CONVERGENCE_EPSILON: f64 = 5e-4;
pub const DEFAULT_BACKTRACK_RATE: f64 = 1.3;

/// The relative change convergence criteria described in Martens (2010).
///
/// After `k = max(min_k, k_scale * i)` iterations, the solver stops when the last `k`
/// iterations improved the quadratic by less than a `k * epsilon` fraction. Zeroed fields
/// fall back to the defaults.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvergenceCriteria {
    pub min_k: f64,
    pub k_scale: f64,
    pub epsilon: f64,
}

impl Default for ConvergenceCriteria {
    fn default() -> Self {
        Self {
            min_k: DEFAULT_CONVERGENCE_MIN_K,
            k_scale: DEFAULT_CONVERGENCE_K_SCALE,
            epsilon: DEFAULT_CONVERGENCE_EPSILON,
        }
    }
}

impl ConvergenceCriteria {
    /// Replaces every zeroed field with its default.
    pub fn resolved(self) -> Self {
        let or_default = |value: f64, default| if value == 0. { default } else { value };

        Self {
            min_k: or_default(self.min_k, DEFAULT_CONVERGENCE_MIN_K),
            k_scale: or_default(self.k_scale, DEFAULT_CONVERGENCE_K_SCALE),
            epsilon: or_default(self.epsilon, DEFAULT_CONVERGENCE_EPSILON),
        }
    }

    /// Returns the look-back window for the given amount of iterations.
    fn window(&self, iterations: usize) -> f64 {
        self.min_k.max(self.k_scale * iterations as f64)
    }
}

/// The phase a `CgSolver` is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CgPhase {
    /// No step has been taken yet.
    Uninitialized,
    /// Steps keep improving the quadratic.
    Iterating,
    /// The relative improvement dropped below the convergence criteria.
    Converged,
    /// No further progress is possible: zero residual, non positive curvature along the
    /// search direction or the iteration cap was reached.
    Exhausted,
}

impl CgPhase {
    pub fn is_done(self) -> bool {
        matches!(self, CgPhase::Converged | CgPhase::Exhausted)
    }
}

/// An earlier iterate kept around in case the later ones overshoot.
#[derive(Debug)]
struct Checkpoint {
    iteration: usize,
    solution: ParamDelta,
    objective: f64,
}

/// A truncated conjugate gradient solver for the quadratic approximation of an `Objective`,
/// following the Hessian-free recipe of Martens (2010).
///
/// Every temporary delta is borrowed from a `VectorPool` and handed back on `release`.
pub struct CgSolver<'a, O: Objective + ?Sized> {
    objective: &'a O,
    batch: &'a [O::Sample],
    layout: ParamLayout,
    pool: Arc<VectorPool>,
    criteria: ConvergenceCriteria,
    backtrack_rate: f64,
    max_iterations: Option<NonZeroUsize>,
    ui: Arc<dyn Ui>,

    phase: CgPhase,
    solution: ParamDelta,
    residual: ParamDelta,
    direction: ParamDelta,
    projected: ParamDelta,
    residual_mag2: f64,
    start_objective: f64,
    quad_values: Vec<f64>,
    checkpoints: Vec<Checkpoint>,
    next_checkpoint: f64,
}

impl<'a, O: Objective + ?Sized> CgSolver<'a, O> {
    /// Creates a new `CgSolver` starting from zero.
    ///
    /// # Arguments
    /// * `objective` - The objective whose approximation is minimized.
    /// * `batch` - The samples the objective is evaluated on.
    /// * `layout` - The parameters being optimized.
    /// * `pool` - The pool every temporary delta is borrowed from.
    pub fn new(
        objective: &'a O,
        batch: &'a [O::Sample],
        layout: ParamLayout,
        pool: Arc<VectorPool>,
    ) -> Self {
        Self {
            objective,
            batch,
            layout,
            pool,
            criteria: ConvergenceCriteria::default(),
            backtrack_rate: DEFAULT_BACKTRACK_RATE,
            max_iterations: None,
            ui: Arc::new(NoUi),
            phase: CgPhase::Uninitialized,
            solution: ParamDelta::new(),
            residual: ParamDelta::new(),
            direction: ParamDelta::new(),
            projected: ParamDelta::new(),
            residual_mag2: 0.,
            start_objective: 0.,
            quad_values: Vec::new(),
            checkpoints: Vec::new(),
            next_checkpoint: 1.,
        }
    }

    /// Starts the solver from `solution` instead of zero.
    ///
    /// The solver takes ownership of the delta, it comes back from `release`.
    pub fn with_warm_start(mut self, solution: ParamDelta) -> Self {
        self.solution = solution;
        self
    }

    pub fn with_criteria(mut self, criteria: ConvergenceCriteria) -> Self {
        self.criteria = criteria.resolved();
        self
    }

    /// Sets the growth rate of the gaps between backtracking checkpoints.
    ///
    /// # Panics
    /// If `rate` is not greater than one.
    pub fn with_backtrack_rate(mut self, rate: f64) -> Self {
        assert!(rate > 1., "the backtrack rate must be greater than one, got {rate}");
        self.backtrack_rate = rate;
        self
    }

    /// Caps the amount of steps, reaching the cap exhausts the solver.
    pub fn with_max_iterations(mut self, max_iterations: Option<NonZeroUsize>) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_ui(mut self, ui: Arc<dyn Ui>) -> Self {
        self.ui = ui;
        self
    }

    pub fn phase(&self) -> CgPhase {
        self.phase
    }

    /// Returns the amount of steps taken.
    pub fn iterations(&self) -> usize {
        self.quad_values.len()
    }

    /// Returns the value of the quadratic after every step.
    pub fn quad_values(&self) -> &[f64] {
        &self.quad_values
    }

    /// Returns the true objective at zero, the baseline of the convergence test.
    pub fn start_objective(&self) -> f64 {
        self.start_objective
    }

    /// Returns the current iterate.
    pub fn solution(&self) -> &ParamDelta {
        &self.solution
    }

    /// Returns the iterations at which backtracking checkpoints were taken.
    pub fn checkpoint_iterations(&self) -> Vec<usize> {
        self.checkpoints.iter().map(|c| c.iteration).collect()
    }

    /// Takes a single step.
    ///
    /// The first call computes the starting residual. Once the solver is done, calling this
    /// again doesn't do anything.
    ///
    /// # Returns
    /// The phase the solver is in after the step.
    pub fn step(&mut self) -> CgPhase {
        match self.phase {
            CgPhase::Uninitialized => self.initialize(),
            CgPhase::Iterating => {}
            done => return done,
        }

        if self.residual_mag2 == 0. {
            debug!("CG residual vanished");
            self.phase = CgPhase::Exhausted;
            return self.phase;
        }

        self.projected.fill_zero();
        let quad = self.objective.quad_hessian(
            &self.direction,
            &self.solution,
            self.batch,
            &mut self.projected,
        );

        let curvature = self.direction.dot(&self.projected);
        if !(curvature > 0.) {
            debug!(curvature = curvature; "CG hit non positive curvature");
            self.phase = CgPhase::Exhausted;
            return self.phase;
        }

        let step_size = self.residual_mag2 / curvature;
        let descent = self.residual.dot(&self.direction);
        self.solution.add_scaled(step_size, &self.direction);

        let quad = quad - step_size * descent + 0.5 * step_size * step_size * curvature;
        self.quad_values.push(quad);
        self.ui.log_cg_iteration(step_size, quad);

        if self.converged() {
            self.phase = CgPhase::Converged;
        } else {
            self.residual.add_scaled(-step_size, &self.projected);
            let residual_mag2 = self.residual.mag2();
            let beta = residual_mag2 / self.residual_mag2;
            self.residual_mag2 = residual_mag2;

            self.direction.scale(beta);
            self.direction.add_scaled(1., &self.residual);
        }

        self.update_checkpoints();

        let capped = self
            .max_iterations
            .is_some_and(|max| self.iterations() >= max.get());

        if capped && self.phase == CgPhase::Iterating {
            self.phase = CgPhase::Exhausted;
        }

        self.phase
    }

    /// Steps until the solver is done.
    pub fn solve(&mut self) -> CgPhase {
        while !self.step().is_done() {}
        self.phase
    }

    /// Returns the candidate with the lowest true objective among the current iterate and every
    /// checkpoint. Ties favor the most recent candidate.
    pub fn best(&self) -> &ParamDelta {
        let mut best = &self.solution;
        let mut best_value = self.objective.objective(&self.solution, self.batch);

        for checkpoint in self.checkpoints.iter().rev() {
            if checkpoint.objective < best_value {
                best = &checkpoint.solution;
                best_value = checkpoint.objective;
            }
        }

        best
    }

    /// Gives every temporary back to the pool.
    ///
    /// # Returns
    /// The last iterate, meant to warm start the next solver.
    pub fn release(self) -> ParamDelta {
        let pool = &self.pool;

        pool.release_delta(self.residual);
        pool.release_delta(self.direction);
        pool.release_delta(self.projected);

        for checkpoint in self.checkpoints {
            pool.release_delta(checkpoint.solution);
        }

        self.solution
    }

    fn initialize(&mut self) {
        let pool = &self.pool;

        if self.solution.is_empty() {
            self.solution = pool.alloc_delta(&self.layout);
        }

        self.residual = pool.alloc_delta(&self.layout);
        self.objective
            .quad_grad(&self.solution, self.batch, &mut self.residual);
        self.residual.scale(-1.);

        self.direction = pool.alloc_copy(&self.residual);
        self.projected = pool.alloc_delta(&self.layout);
        self.residual_mag2 = self.residual.mag2();

        self.start_objective = self.objective.objective(&ParamDelta::new(), self.batch);
        let quad = self.objective.quad(&self.solution, self.batch);
        self.ui.log_cg_start(quad, self.start_objective);

        self.phase = CgPhase::Iterating;
    }

    /// Checks whether the last `k` steps stopped paying off.
    fn converged(&self) -> bool {
        let iterations = self.iterations();
        let k = self.criteria.window(iterations);

        if iterations as f64 <= k {
            return false;
        }

        let current = self.quad_values[iterations - 1] - self.start_objective;
        if current >= 0. {
            return false;
        }

        let old = self.quad_values[iterations - 1 - k as usize] - self.start_objective;
        (current - old) / current < k * self.criteria.epsilon
    }

    /// Snapshots the solution whenever the iteration count reaches the next power of the
    /// backtrack rate.
    fn update_checkpoints(&mut self) {
        let iteration = self.iterations();
        if (iteration as f64) < self.next_checkpoint.ceil() {
            return;
        }

        while self.next_checkpoint.ceil() <= iteration as f64 {
            self.next_checkpoint *= self.backtrack_rate;
        }

        let solution = self.pool.alloc_copy(&self.solution);
        let objective = self.objective.objective(&solution, self.batch);

        self.checkpoints.push(Checkpoint {
            iteration,
            solution,
            objective,
        });
    }
}
