use std::{
    error::Error,
    fmt::{self, Display},
};

/// The result type used across the hessian free crate.
pub type Result<T> = std::result::Result<T, HfErr>;

/// The hessian free crate's error type.
///
/// Only construction and configuration can fail, the optimization itself reports abnormal
/// conditions as control flow.
#[derive(Debug)]
pub enum HfErr {
    InvalidConfig {
        field: &'static str,
        reason: &'static str,
    },
    Json(serde_json::Error),
    EmptyDataset,
}

impl Display for HfErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HfErr::InvalidConfig { field, reason } => {
                write!(f, "invalid configuration for {field}: {reason}")
            }
            HfErr::Json(e) => write!(f, "invalid json configuration: {e}"),
            HfErr::EmptyDataset => write!(f, "the dataset has no samples"),
        }
    }
}

impl Error for HfErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            HfErr::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for HfErr {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}
