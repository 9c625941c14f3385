use std::{
    error::Error,
    fmt::{self, Display},
};

use rand_distr::{NormalError, uniform::Error as UniformError};

/// The result type used across the gauss newton crate.
pub type Result<T> = std::result::Result<T, NetErr>;

/// Errors raised while building a network or feeding it samples.
#[derive(Debug)]
pub enum NetErr {
    SizeMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },
    /// The parameters of a weight distribution are invalid.
    InvalidDistribution(String),
    EmptyNetwork,
}

impl Display for NetErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetErr::SizeMismatch {
                what,
                got,
                expected,
            } => write!(
                f,
                "size mismatch for {what}: got {got}, expected {expected}"
            ),
            NetErr::InvalidDistribution(e) => write!(f, "invalid weight distribution: {e}"),
            NetErr::EmptyNetwork => write!(f, "a network needs at least one layer"),
        }
    }
}

impl Error for NetErr {}

impl From<NormalError> for NetErr {
    fn from(value: NormalError) -> Self {
        Self::InvalidDistribution(value.to_string())
    }
}

impl From<UniformError> for NetErr {
    fn from(value: UniformError) -> Self {
        Self::InvalidDistribution(value.to_string())
    }
}
