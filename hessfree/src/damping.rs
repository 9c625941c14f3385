use std::sync::Arc;

use log::{debug, warn};

use crate::{
    learner::{Learner, SharedObjective},
    objective::{Objective, QuadObjective},
    params::{ParamDelta, ParamLayout},
    ui::{NoUi, Ui},
};

/// The damping coefficient used when none was set.
pub const DEFAULT_DAMPING_COEFF: f64 = 1.;

const RAISE_BELOW: f64 = 0.25;
const LOWER_ABOVE: f64 = 0.75;
const RAISE_FACTOR: f64 = 3. / 2.;
const LOWER_FACTOR: f64 = 2. / 3.;

/// A `Learner` which wraps another one in the Levenberg-Marquardt style damping described in
/// Martens (2010).
///
/// Its objectives add `coeff * batch_len * |delta|^2` to the quadratic approximation. After
/// every cycle the coefficient is raised when the approximation was overconfident and lowered
/// when it proved reliable.
pub struct DampingController<L: Learner> {
    wrapped: L,
    coeff: f64,
    use_quad_min: bool,
    ui: Arc<dyn Ui>,
    last_objective: Option<SharedObjective<L::Sample>>,
}

impl<L: Learner> DampingController<L> {
    /// Creates a new `DampingController`.
    ///
    /// # Arguments
    /// * `wrapped` - The learner to damp.
    /// * `coeff` - The initial damping coefficient, zero means the default one.
    pub fn new(wrapped: L, coeff: f64) -> Self {
        Self {
            wrapped,
            coeff,
            use_quad_min: false,
            ui: Arc::new(NoUi),
            last_objective: None,
        }
    }

    /// Makes the reduction ratio use the last conjugate gradient iterate instead of the
    /// backtracked adjustment.
    pub fn with_quad_min(mut self, use_quad_min: bool) -> Self {
        self.use_quad_min = use_quad_min;
        self
    }

    /// Sets the UI damping updates are logged to.
    pub fn with_ui(mut self, ui: Arc<dyn Ui>) -> Self {
        self.ui = ui;
        self
    }

    /// Returns the current damping coefficient.
    pub fn coeff(&self) -> f64 {
        self.coeff
    }

    pub fn wrapped(&self) -> &L {
        &self.wrapped
    }

    /// Adapts the coefficient to a reduction ratio.
    ///
    /// A non finite ratio leaves the coefficient untouched.
    ///
    /// # Returns
    /// The new damping coefficient.
    pub fn adapt(&mut self, trust: f64) -> f64 {
        if !trust.is_finite() {
            warn!("reduction ratio is {trust}, keeping damping at {}", self.coeff);
        } else if trust < RAISE_BELOW {
            self.coeff *= RAISE_FACTOR;
        } else if trust > LOWER_ABOVE {
            self.coeff *= LOWER_FACTOR;
        }

        self.ui.log_damping(trust, self.coeff);
        self.coeff
    }
}

/// Computes the ratio between the actual and the predicted reduction of `objective` when
/// moving by `delta`.
pub fn reduction_ratio<O>(objective: &O, delta: &ParamDelta, batch: &[O::Sample]) -> f64
where
    O: Objective + ?Sized,
{
    let zero = ParamDelta::new();

    let real_center = objective.objective(&zero, batch);
    let real_offset = objective.objective(delta, batch);
    let quad_center = objective.quad(&zero, batch);
    let quad_offset = objective.quad(delta, batch);

    (real_offset - real_center) / (quad_offset - quad_center)
}

impl<L: Learner> Learner for DampingController<L> {
    type Sample = L::Sample;

    fn parameters(&self) -> ParamLayout {
        self.wrapped.parameters()
    }

    fn make_objective(&mut self) -> SharedObjective<Self::Sample> {
        if self.coeff == 0. {
            self.coeff = DEFAULT_DAMPING_COEFF;
        }

        let objective = self.wrapped.make_objective();
        self.last_objective = Some(Arc::clone(&objective));

        Arc::new(DampedObjective {
            wrapped: objective,
            coeff: self.coeff,
        })
    }

    fn adjust(&mut self, adjustment: &ParamDelta, quad_min: &ParamDelta, batch: &[L::Sample]) {
        let Some(objective) = self.last_objective.take() else {
            warn!("adjust called without a prior objective, damping unchanged");
            self.wrapped.adjust(adjustment, quad_min, batch);
            return;
        };

        let probe = if self.use_quad_min {
            quad_min
        } else {
            adjustment
        };

        // Has to run before the wrapped learner moves the parameters.
        let trust = reduction_ratio(&*objective, probe, batch);
        debug!(trust = trust; "computed reduction ratio");

        self.wrapped.adjust(adjustment, quad_min, batch);
        self.adapt(trust);
    }
}

/// An objective with an added `coeff * batch_len * |delta|^2` term in its approximation.
pub struct DampedObjective<S> {
    wrapped: SharedObjective<S>,
    coeff: f64,
}

impl<S> DampedObjective<S> {
    pub fn new(wrapped: SharedObjective<S>, coeff: f64) -> Self {
        Self { wrapped, coeff }
    }

    fn scaler(&self, batch: &[S]) -> f64 {
        batch.len() as f64 * self.coeff
    }
}

impl<S> QuadObjective for DampedObjective<S> {
    type Sample = S;

    fn quad(&self, delta: &ParamDelta, batch: &[S]) -> f64 {
        self.wrapped.quad(delta, batch) + self.scaler(batch) * delta.mag2()
    }

    fn quad_grad(&self, delta: &ParamDelta, batch: &[S], out: &mut ParamDelta) {
        self.wrapped.quad_grad(delta, batch, out);
        out.add_scaled(2. * self.scaler(batch), delta);
    }

    fn quad_hessian(
        &self,
        delta: &ParamDelta,
        x: &ParamDelta,
        batch: &[S],
        out: &mut ParamDelta,
    ) -> f64 {
        let value = self.wrapped.quad_hessian(delta, x, batch, out);
        let scaler = self.scaler(batch);

        out.add_scaled(2. * scaler, delta);
        value + scaler * x.mag2()
    }
}

impl<S> Objective for DampedObjective<S> {
    fn objective(&self, delta: &ParamDelta, batch: &[S]) -> f64 {
        self.wrapped.objective(delta, batch)
    }
}
