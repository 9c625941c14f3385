//! Hessian-free optimization, as described in Martens (2010).
//!
//! A `Trainer` repeatedly asks a `Learner` for an `Objective` centered on its current
//! parameters, minimizes its quadratic approximation on a mini-batch with a truncated
//! conjugate gradient solver and hands the result back to the learner.

pub mod cg;
pub mod config;
pub mod damping;
pub mod dataset;
pub mod error;
pub mod learner;
pub mod objective;
pub mod params;
pub mod pool;
#[cfg(test)]
mod test;
pub mod trainer;
pub mod ui;

pub use cg::{CgPhase, CgSolver, ConvergenceCriteria};
pub use config::HessianFreeConfig;
pub use damping::{DampedObjective, DampingController};
pub use dataset::Dataset;
pub use error::{HfErr, Result};
pub use learner::{Learner, SharedObjective};
pub use objective::{ConcurrentObjective, Objective, QuadObjective, WrappedObjective};
pub use params::{ParamArena, ParamDelta, ParamId, ParamLayout, ParamPatch, ParamSnapshot};
pub use pool::VectorPool;
pub use trainer::{TrainReport, Trainer, TrainerBuilder, TrainerState};
pub use ui::{LogUi, NoUi, StopHandle, Ui};
