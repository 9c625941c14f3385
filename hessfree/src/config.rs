use std::{num::NonZeroUsize, thread};

use serde::{Deserialize, Serialize};

use crate::{
    cg::{ConvergenceCriteria, DEFAULT_BACKTRACK_RATE},
    error::{HfErr, Result},
    objective::DEFAULT_MAX_SUB_BATCH,
};

const DEFAULT_BATCH_SIZE: usize = 100;

/// The settings of a Hessian-free training session.
///
/// Every field is optional in the json representation, zeroed counts fall back to their
/// defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HessianFreeConfig {
    pub batch_size: usize,
    pub max_concurrency: usize,
    pub max_sub_batch: usize,
    pub damping_coeff: f64,
    pub use_quad_min: bool,
    pub convergence: ConvergenceCriteria,
    pub backtrack_rate: f64,
    pub max_cg_iterations: Option<NonZeroUsize>,
    pub seed: Option<u64>,
}

impl Default for HessianFreeConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_concurrency: 0,
            max_sub_batch: DEFAULT_MAX_SUB_BATCH,
            damping_coeff: 0.,
            use_quad_min: false,
            convergence: ConvergenceCriteria::default(),
            backtrack_rate: DEFAULT_BACKTRACK_RATE,
            max_cg_iterations: None,
            seed: None,
        }
    }
}

impl HessianFreeConfig {
    /// Parses and validates a configuration.
    ///
    /// # Arguments
    /// * `json` - The json representation of the configuration.
    ///
    /// # Returns
    /// The configuration or an error if it's malformed or invalid.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every field is within its domain.
    pub fn validate(&self) -> Result<()> {
        let non_negative = |field, value: f64| {
            if value.is_finite() && value >= 0. {
                Ok(())
            } else {
                Err(HfErr::InvalidConfig {
                    field,
                    reason: "must be a finite non negative number",
                })
            }
        };

        non_negative("damping_coeff", self.damping_coeff)?;
        non_negative("convergence.min_k", self.convergence.min_k)?;
        non_negative("convergence.k_scale", self.convergence.k_scale)?;
        non_negative("convergence.epsilon", self.convergence.epsilon)?;

        if !(self.backtrack_rate.is_finite() && self.backtrack_rate > 1.) {
            return Err(HfErr::InvalidConfig {
                field: "backtrack_rate",
                reason: "must be a finite number greater than one",
            });
        }

        Ok(())
    }

    /// Returns the mini-batch size.
    pub fn batch_size(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.batch_size)
            .or(NonZeroUsize::new(DEFAULT_BATCH_SIZE))
            .unwrap_or(NonZeroUsize::MIN)
    }

    /// Returns the amount of worker threads, defaulting to the available parallelism.
    pub fn max_concurrency(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.max_concurrency)
            .or_else(|| thread::available_parallelism().ok())
            .unwrap_or(NonZeroUsize::MIN)
    }

    /// Returns the maximum amount of samples evaluated in a single call.
    pub fn max_sub_batch(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.max_sub_batch)
            .or(NonZeroUsize::new(DEFAULT_MAX_SUB_BATCH))
            .unwrap_or(NonZeroUsize::MIN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_is_the_default() {
        let config = HessianFreeConfig::from_json("{}").unwrap();

        assert_eq!(config, HessianFreeConfig::default());
        assert_eq!(config.batch_size().get(), 100);
        assert_eq!(config.max_sub_batch().get(), 15);
        assert_eq!(config.convergence.min_k, 10.);
        assert_eq!(config.backtrack_rate, 1.3);
    }

    #[test]
    fn zeroed_counts_fall_back_to_defaults() {
        let config =
            HessianFreeConfig::from_json(r#"{ "batch_size": 0, "max_sub_batch": 0 }"#).unwrap();

        assert_eq!(config.batch_size().get(), 100);
        assert_eq!(config.max_sub_batch().get(), 15);
        assert!(config.max_concurrency().get() >= 1);
    }

    #[test]
    fn partial_json_keeps_other_defaults() {
        let json = r#"{
            "batch_size": 32,
            "max_concurrency": 3,
            "convergence": { "epsilon": 0.01 },
            "max_cg_iterations": 50,
            "seed": 7
        }"#;
        let config = HessianFreeConfig::from_json(json).unwrap();

        assert_eq!(config.batch_size().get(), 32);
        assert_eq!(config.max_concurrency().get(), 3);
        assert_eq!(config.convergence.epsilon, 0.01);
        assert_eq!(config.convergence.k_scale, 0.1);
        assert_eq!(config.max_cg_iterations.map(NonZeroUsize::get), Some(50));
        assert_eq!(config.seed, Some(7));
    }

    #[test]
    fn rejects_invalid_values() {
        let err = HessianFreeConfig::from_json(r#"{ "backtrack_rate": 1.0 }"#).unwrap_err();
        assert!(matches!(
            err,
            HfErr::InvalidConfig {
                field: "backtrack_rate",
                ..
            }
        ));

        let err = HessianFreeConfig::from_json(r#"{ "damping_coeff": -1.0 }"#).unwrap_err();
        assert!(matches!(
            err,
            HfErr::InvalidConfig {
                field: "damping_coeff",
                ..
            }
        ));

        let err = HessianFreeConfig::from_json(r#"{ "batch_size": "many" }"#).unwrap_err();
        assert!(matches!(err, HfErr::Json(_)));

        let err = HessianFreeConfig::from_json(r#"{ "learning_rate": 0.1 }"#).unwrap_err();
        assert!(matches!(err, HfErr::Json(_)));
    }
}
