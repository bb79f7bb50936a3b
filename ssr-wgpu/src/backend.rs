use std::sync::Arc;

use glam::Vec4;
use ssr_render::graphics::{
    BindFlags, Buffer, BufferDesc, DeviceFeatures, DeviceInfo, DeviceType, GraphicsPipelineDesc,
    PipelineState, RenderDevice, Shader, ShaderCreateInfo, Texture, TextureDesc, TextureFormat,
    TextureFormatInfo,
};
use ssr_render::{GraphicsError, GraphicsResult};
use wgpu::util::DeviceExt;

use crate::context::WgpuContext;
use crate::conversions;
use crate::pipeline;
use crate::render_targets::{self, wgpu_texture, WgpuBuffer, WgpuTexture};

/// wgpu device and queue behind the [`RenderDevice`] interface.
pub struct WgpuBackend {
    pub instance: wgpu::Instance,
    pub adapter: wgpu::Adapter,
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
}

impl WgpuBackend {
    /// Creates a backend without a surface, for offscreen rendering.
    pub fn new_headless() -> Result<Self, String> {
        let _ = env_logger::try_init();

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .ok_or("Failed to find suitable GPU adapter")?;

        // Depth32FloatStencil8 is optional; D24S8 is used when it is missing.
        let required_features = adapter.features() & wgpu::Features::DEPTH32FLOAT_STENCIL8;
        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("SSR WebGPU Device"),
                required_features,
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::default(),
            },
            None,
        ))
        .map_err(|e| format!("Failed to create device: {e}"))?;

        let info = adapter.get_info();
        log::info!("WebGPU backend on {} ({:?})", info.name, info.backend);

        Ok(Self {
            instance,
            adapter,
            device: Arc::new(device),
            queue: Arc::new(queue),
        })
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn create_context(&self) -> WgpuContext {
        WgpuContext::new(Arc::clone(&self.device), Arc::clone(&self.queue))
    }

    /// Reads one mip back as raw texels. Submit pending work with [`WgpuContext::flush`] first.
    pub fn read_texture_bytes(&self, texture: &Texture, mip: u32) -> GraphicsResult<Vec<u8>> {
        render_targets::read_mip(&self.device, &self.queue, wgpu_texture(texture)?, mip)
    }

    /// Reads one mip of a float color texture, widened to RGBA.
    pub fn read_texture(&self, texture: &Texture, mip: u32) -> GraphicsResult<Vec<Vec4>> {
        let bytes = self.read_texture_bytes(texture, mip)?;
        let format = texture.desc().format;
        let texels = match format {
            TextureFormat::R32Float | TextureFormat::D32Float => bytes
                .chunks_exact(4)
                .map(|c| Vec4::new(f32::from_le_bytes([c[0], c[1], c[2], c[3]]), 0.0, 0.0, 1.0))
                .collect(),
            TextureFormat::R16Float | TextureFormat::Rg16Float | TextureFormat::Rgba16Float => {
                let components = format.component_count();
                bytes
                    .chunks_exact(2 * components)
                    .map(|texel| {
                        let mut value = Vec4::new(0.0, 0.0, 0.0, 1.0);
                        for (i, half_bytes) in texel.chunks_exact(2).enumerate() {
                            value[i] = half::f16::from_le_bytes([half_bytes[0], half_bytes[1]]).to_f32();
                        }
                        value
                    })
                    .collect()
            }
            TextureFormat::R8Unorm | TextureFormat::Rg8Unorm | TextureFormat::Rgba8Unorm => {
                let components = format.component_count();
                bytes
                    .chunks_exact(components)
                    .map(|texel| {
                        let mut value = Vec4::new(0.0, 0.0, 0.0, 1.0);
                        for (i, byte) in texel.iter().enumerate() {
                            value[i] = f32::from(*byte) / 255.0;
                        }
                        value
                    })
                    .collect()
            }
            other => return Err(GraphicsError::UnsupportedFormat(other)),
        };
        Ok(texels)
    }
}

impl RenderDevice for WgpuBackend {
    fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            device_type: DeviceType::WebGpu,
            features: DeviceFeatures {
                texture_subresource_views: true,
            },
        }
    }

    fn texture_format_info(&self, format: TextureFormat) -> TextureFormatInfo {
        let Some(wgpu_format) = conversions::texture_format(format) else {
            return TextureFormatInfo::default();
        };
        let required = wgpu_format.required_features();
        if !self.device.features().contains(required) {
            return TextureFormatInfo::default();
        }

        let features = self.adapter.get_texture_format_features(wgpu_format);
        let mut bind_flags = BindFlags::NONE;
        if features.allowed_usages.contains(wgpu::TextureUsages::TEXTURE_BINDING) && !format.has_stencil() {
            bind_flags |= BindFlags::SHADER_RESOURCE;
        }
        if features.allowed_usages.contains(wgpu::TextureUsages::RENDER_ATTACHMENT) {
            bind_flags |= if format.is_depth() {
                BindFlags::DEPTH_STENCIL
            } else {
                BindFlags::RENDER_TARGET
            };
        }
        TextureFormatInfo {
            supported: true,
            bind_flags,
        }
    }

    fn create_texture(&self, desc: &TextureDesc, initial_data: Option<&[u8]>) -> GraphicsResult<Texture> {
        let failed = |message: String| GraphicsError::ResourceCreation {
            name: desc.name.clone(),
            message,
        };
        let format = conversions::texture_format(desc.format)
            .ok_or(GraphicsError::UnsupportedFormat(desc.format))?;
        let info = self.texture_format_info(desc.format);
        if !info.supported || !info.bind_flags.contains(desc.bind_flags) {
            return Err(GraphicsError::UnsupportedFormat(desc.format));
        }
        if desc.width == 0 || desc.height == 0 {
            return Err(failed(format!("invalid size {}x{}", desc.width, desc.height)));
        }
        let max_mips = ssr_render::graphics::compute_mip_levels_count(desc.width, desc.height);
        if desc.mip_levels == 0 || desc.mip_levels > max_mips {
            return Err(failed(format!("{} mips requested, at most {max_mips}", desc.mip_levels)));
        }

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&desc.name),
            size: render_targets::extent(desc, 0),
            mip_level_count: desc.mip_levels,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: conversions::texture_usages(desc.format, desc.bind_flags),
            view_formats: &[],
        });
        let texture = WgpuTexture {
            desc: desc.clone(),
            texture,
            format,
        };

        if let Some(data) = initial_data {
            let expected =
                desc.width as usize * desc.height as usize * desc.format.bytes_per_texel();
            if data.len() != expected || desc.format.is_depth() {
                return Err(failed(format!(
                    "initial data holds {} bytes, expected {expected}",
                    data.len()
                )));
            }
            render_targets::upload_mip0(&self.queue, &texture, data);
        }
        log::debug!(
            "created texture '{}' {}x{} {:?}, {} mips",
            desc.name,
            desc.width,
            desc.height,
            desc.format,
            desc.mip_levels
        );
        Ok(Texture::new(texture))
    }

    fn create_buffer(&self, desc: &BufferDesc, initial_data: Option<&[u8]>) -> GraphicsResult<Buffer> {
        if desc.size == 0 || desc.size % wgpu::COPY_BUFFER_ALIGNMENT != 0 {
            return Err(GraphicsError::ResourceCreation {
                name: desc.name.clone(),
                message: format!("size {} is not a positive multiple of 4", desc.size),
            });
        }
        let usage = wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST;
        let buffer = match initial_data {
            Some(data) => {
                if data.len() as u64 != desc.size {
                    return Err(GraphicsError::ResourceCreation {
                        name: desc.name.clone(),
                        message: format!("initial data holds {} bytes, expected {}", data.len(), desc.size),
                    });
                }
                self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(&desc.name),
                    contents: data,
                    usage,
                })
            }
            None => self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(&desc.name),
                size: desc.size,
                usage,
                mapped_at_creation: false,
            }),
        };
        Ok(Buffer::new(WgpuBuffer {
            desc: desc.clone(),
            buffer,
        }))
    }

    fn create_shader(&self, info: &ShaderCreateInfo) -> GraphicsResult<Shader> {
        Ok(Shader::new(pipeline::create_shader(&self.device, info)?))
    }

    fn create_graphics_pipeline(&self, desc: &GraphicsPipelineDesc) -> GraphicsResult<PipelineState> {
        Ok(PipelineState::new(pipeline::create_pipeline(&self.device, desc)?))
    }
}
