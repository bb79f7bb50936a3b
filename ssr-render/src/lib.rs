//! Screen-space reflections as a sequence of full-screen passes over a backend-neutral
//! graphics interface.
//!
//! [`ScreenSpaceReflection`] owns the intermediate targets and pipelines of the effect,
//! [`PostFxContext`] the per-frame data shared between effects (camera constants and blue
//! noise). Both drive any [`graphics::RenderDevice`] / [`graphics::DeviceContext`] pair; the
//! [`soft`] module provides a CPU reference implementation.

pub mod error;
pub mod features;
pub mod graphics;
pub mod postfx_context;
pub mod render_technique;
pub mod resource_registry;
pub mod screen_space_reflection;
pub mod soft;

pub use error::{GraphicsError, GraphicsResult, PostFxError, PostFxResult};
pub use features::SupportedFeatures;
pub use postfx_context::{
    BlueNoiseDimension, CameraSource, PostFxContext, PostFxRenderAttributes, PostFxSettings,
};
pub use screen_space_reflection::{ScreenSpaceReflection, SsrRenderAttributes, SsrResource};

pub use ssr_gpu_shared::uniforms::{CameraAttribs, CameraAttribsPair, ScreenSpaceReflectionAttribs};
