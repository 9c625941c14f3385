mod dense;
mod layer;

pub use dense::Dense;
pub(crate) use layer::sigmoid;
pub use layer::{Layer, LayerSpec};
