mod arena;
mod delta;
mod patch;

pub use arena::{ParamArena, ParamId, ParamLayout, ParamSnapshot};
pub use delta::ParamDelta;
pub use patch::ParamPatch;
