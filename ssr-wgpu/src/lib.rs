//! WebGPU backend for the screen-space reflection pipeline.
//!
//! Implements the `ssr_render` device interfaces on top of wgpu. Shader bindings are
//! resolved by name through naga reflection of the shared WGSL sources.

mod backend;
mod context;
pub mod conversions;
mod pipeline;
pub mod reflection;
mod render_targets;

pub use backend::WgpuBackend;
pub use context::WgpuContext;
pub use pipeline::{WgpuPipeline, WgpuShader};
pub use render_targets::{WgpuBuffer, WgpuTexture};
