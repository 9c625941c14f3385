use serde::{Deserialize, Serialize};

/// A training sample for a network: an input and the output it should map to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorSample {
    pub input: Vec<f64>,
    pub output: Vec<f64>,
}

impl VectorSample {
    pub fn new(input: Vec<f64>, output: Vec<f64>) -> Self {
        Self { input, output }
    }
}
