//! Software reference device.
//!
//! Executes the same pipelines as a GPU backend on the CPU, one kernel per pixel shader,
//! with texel storage quantised to each format. Every command is validated and recorded
//! so tests can inspect both the results and the command stream.

mod context;
mod device;
mod kernels;
mod texture;

pub use context::{DrawRecord, SoftCommand, SoftContext};
pub use device::{SoftDevice, SoftDeviceStats};
pub use kernels::{DrawResources, PixelInput, PixelKernel};
pub use texture::{quantize, SampledTexture, SoftBuffer, SoftTexture};

use crate::graphics::{DeviceType, ShaderCreateInfo};

/// Capabilities the software device reports.
#[derive(Clone, Debug)]
pub struct SoftDeviceConfig {
    pub device_type: DeviceType,
    pub texture_subresource_views: bool,
    /// D24S8 can be used as a depth-stencil attachment.
    pub d24s8_depth_stencil: bool,
    /// Shader files or entry points that fail to compile.
    pub reject_shaders: Vec<String>,
}

impl SoftDeviceConfig {
    pub fn d3d11() -> Self {
        Self {
            device_type: DeviceType::D3D11,
            texture_subresource_views: true,
            d24s8_depth_stencil: true,
            reject_shaders: Vec::new(),
        }
    }

    pub fn d3d12() -> Self {
        Self {
            device_type: DeviceType::D3D12,
            ..Self::d3d11()
        }
    }

    pub fn vulkan() -> Self {
        Self {
            device_type: DeviceType::Vulkan,
            ..Self::d3d11()
        }
    }

    /// No single-mip shader views, no depth-to-color copies.
    pub fn opengl() -> Self {
        Self {
            device_type: DeviceType::OpenGL,
            texture_subresource_views: false,
            ..Self::d3d11()
        }
    }

    pub fn webgpu() -> Self {
        Self {
            device_type: DeviceType::WebGpu,
            d24s8_depth_stencil: false,
            ..Self::d3d11()
        }
    }

    pub fn with_subresource_views(mut self, supported: bool) -> Self {
        self.texture_subresource_views = supported;
        self
    }

    pub fn with_d24s8_depth_stencil(mut self, supported: bool) -> Self {
        self.d24s8_depth_stencil = supported;
        self
    }

    /// Makes shaders whose file or entry point equals `name` fail to compile.
    pub fn rejecting_shader(mut self, name: &str) -> Self {
        self.reject_shaders.push(name.to_string());
        self
    }

    pub(crate) fn rejects(&self, info: &ShaderCreateInfo) -> bool {
        self.reject_shaders
            .iter()
            .any(|name| *name == info.file_path || *name == info.entry_point)
    }

    /// Device-to-device texture copies between depth and color formats.
    pub(crate) fn copies_depth_to_color(&self) -> bool {
        matches!(self.device_type, DeviceType::D3D11 | DeviceType::D3D12)
    }
}
