use rand::Rng;
use rand_distr::{Distribution, Normal, Uniform};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// How the parameters of a dense layer are initialized.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Init {
    /// Uniform in `[low, high)`.
    Uniform { low: f64, high: f64 },
    Normal { mean: f64, std_dev: f64 },
    /// Uniform in `±sqrt(6 / (fan_in + fan_out))`.
    XavierUniform,
    /// Uniform in `±sqrt(3 / fan_in)`.
    #[default]
    LecunUniform,
    /// Normal with a standard deviation of `sqrt(2 / fan_in)`.
    KaimingNormal,
}

impl Init {
    /// Draws `count` values for a layer.
    ///
    /// # Arguments
    /// * `rng` - A random number generator.
    /// * `count` - The amount of values to draw.
    /// * `fan_in` - The number of inputs of the layer.
    /// * `fan_out` - The number of outputs of the layer.
    ///
    /// # Returns
    /// The values or an error if the distribution is invalid.
    pub fn generate<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        count: usize,
        fan_in: usize,
        fan_out: usize,
    ) -> Result<Vec<f64>> {
        let values = match *self {
            Init::Uniform { low, high } => draw(rng, Uniform::new(low, high)?, count),
            Init::Normal { mean, std_dev } => draw(rng, Normal::new(mean, std_dev)?, count),
            Init::XavierUniform => {
                let range = (6. / (fan_in + fan_out) as f64).sqrt();
                draw(rng, Uniform::new(-range, range)?, count)
            }
            Init::LecunUniform => {
                let range = (3. / fan_in as f64).sqrt();
                draw(rng, Uniform::new(-range, range)?, count)
            }
            Init::KaimingNormal => {
                let std_dev = (2. / fan_in as f64).sqrt();
                draw(rng, Normal::new(0., std_dev)?, count)
            }
        };

        Ok(values)
    }
}

fn draw<R, D>(rng: &mut R, distribution: D, count: usize) -> Vec<f64>
where
    R: Rng + ?Sized,
    D: Distribution<f64>,
{
    (0..count).map(|_| distribution.sample(rng)).collect()
}
