//! Graphics-API abstraction consumed by the post-processing effects.

mod device;
mod pipeline;
mod state_cache;
mod types;

pub use device::*;
pub use pipeline::*;
pub use state_cache::RenderStateCache;
pub use types::*;
