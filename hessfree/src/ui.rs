use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use log::{debug, info};

/// The means by which a training session reports its progress and learns that it should stop.
///
/// Every method has a no-op default, so a UI only implements the events it cares about.
pub trait Ui: Send + Sync {
    /// Called once a solver has computed its starting point.
    fn log_cg_start(&self, _quad: f64, _objective: f64) {}

    /// Called after every conjugate gradient step.
    fn log_cg_iteration(&self, _step_size: f64, _quad: f64) {}

    /// Called before a mini-batch is optimized.
    fn log_new_mini_batch(&self, _epoch: usize, _batch: usize) {}

    /// Called after every damping adjustment with the reduction ratio and the new coefficient.
    fn log_damping(&self, _trust: f64, _coeff: f64) {}

    /// Polled between mini-batches and between solver steps, must not block.
    fn should_stop(&self) -> bool {
        false
    }
}

/// A `Ui` that ignores every event and never stops.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoUi;

impl Ui for NoUi {}

/// A cloneable handle that asks a `LogUi` to stop.
#[derive(Debug, Default, Clone)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    /// Requests the training session to stop at the next opportunity.
    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// A `Ui` which forwards every event to the `log` facade.
#[derive(Debug, Default)]
pub struct LogUi {
    stop: StopHandle,
}

impl LogUi {
    /// Creates a new `LogUi`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a handle that can stop the session from any thread.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }
}

impl Ui for LogUi {
    fn log_cg_start(&self, quad: f64, objective: f64) {
        debug!(quad = quad, objective = objective; "CG start");
    }

    fn log_cg_iteration(&self, step_size: f64, quad: f64) {
        debug!(step_size = step_size, quad = quad; "CG iteration");
    }

    fn log_new_mini_batch(&self, epoch: usize, batch: usize) {
        info!(epoch = epoch, batch = batch; "next mini-batch");
    }

    fn log_damping(&self, trust: f64, coeff: f64) {
        info!("trust quotient is {trust:.6}, damping is now {coeff:.6}");
    }

    fn should_stop(&self) -> bool {
        self.stop.is_stopped()
    }
}
