use std::any::Any;

use glam::Vec4;
use parking_lot::Mutex;
use ssr_gpu_shared::shaders::{files, shader_source};

use super::context::SoftContext;
use super::kernels::{self, PixelKernel, MAX_RENDER_TARGETS};
use super::texture::{quantize, SoftBuffer, SoftTexture};
use super::SoftDeviceConfig;
use crate::error::{GraphicsError, GraphicsResult};
use crate::graphics::{
    BindFlags, Buffer, BufferDesc, DeviceFeatures, DeviceInfo, GraphicsPipelineDesc,
    PipelineObject, PipelineState, RenderDevice, ResourceState, Shader, ShaderCreateInfo,
    ShaderObject, ShaderType, Texture, TextureDesc, TextureFormat, TextureFormatInfo,
};

const FULL_SCREEN_TRIANGLE_VS: &str = "full_screen_triangle_vs";

#[derive(Debug)]
pub(crate) struct SoftShader {
    info: ShaderCreateInfo,
    kernel: Option<PixelKernel>,
}

impl ShaderObject for SoftShader {
    fn create_info(&self) -> &ShaderCreateInfo {
        &self.info
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug)]
pub(crate) struct SoftPipeline {
    desc: GraphicsPipelineDesc,
    pub(crate) kernel: PixelKernel,
}

impl PipelineObject for SoftPipeline {
    fn desc(&self) -> &GraphicsPipelineDesc {
        &self.desc
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Number of objects created through a [`SoftDevice`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SoftDeviceStats {
    pub textures: usize,
    pub buffers: usize,
    pub shaders: usize,
    pub pipelines: usize,
}

#[derive(Debug)]
pub struct SoftDevice {
    config: SoftDeviceConfig,
    stats: Mutex<SoftDeviceStats>,
}

pub(crate) fn soft_texture(texture: &Texture) -> GraphicsResult<&SoftTexture> {
    texture.downcast_ref::<SoftTexture>().ok_or_else(|| {
        GraphicsError::Backend(format!(
            "texture '{}' was not created by the software device",
            texture.name()
        ))
    })
}

pub(crate) fn soft_buffer(buffer: &Buffer) -> GraphicsResult<&SoftBuffer> {
    buffer.downcast_ref::<SoftBuffer>().ok_or_else(|| {
        GraphicsError::Backend(format!(
            "buffer '{}' was not created by the software device",
            buffer.desc().name
        ))
    })
}

impl SoftDevice {
    pub fn new(config: SoftDeviceConfig) -> Self {
        log::debug!(
            "software device: {:?}, subresource views: {}",
            config.device_type,
            config.texture_subresource_views
        );
        Self {
            config,
            stats: Mutex::new(SoftDeviceStats::default()),
        }
    }

    pub fn config(&self) -> &SoftDeviceConfig {
        &self.config
    }

    pub fn stats(&self) -> SoftDeviceStats {
        *self.stats.lock()
    }

    pub fn create_context(&self) -> SoftContext {
        SoftContext::new(self.config.clone())
    }

    /// Texels of one mip, row-major.
    pub fn read_texture(&self, texture: &Texture, mip: u32) -> GraphicsResult<Vec<Vec4>> {
        let storage = soft_texture(texture)?.storage.read();
        storage.mips.get(mip as usize).cloned().ok_or_else(|| {
            GraphicsError::Backend(format!("texture '{}' has no mip {mip}", texture.name()))
        })
    }

    pub fn read_stencil(&self, texture: &Texture) -> GraphicsResult<Vec<u8>> {
        if !texture.desc().format.has_stencil() {
            return Err(GraphicsError::Backend(format!(
                "texture '{}' has no stencil",
                texture.name()
            )));
        }
        Ok(soft_texture(texture)?.storage.read().stencil.clone())
    }

    pub fn read_buffer(&self, buffer: &Buffer) -> GraphicsResult<Vec<u8>> {
        Ok(soft_buffer(buffer)?.data.read().clone())
    }

    /// Overwrites one mip, quantising to the texture format.
    pub fn write_texture(&self, texture: &Texture, mip: u32, texels: &[Vec4]) -> GraphicsResult<()> {
        let format = texture.desc().format;
        let mut storage = soft_texture(texture)?.storage.write();
        let Some(target) = storage.mips.get_mut(mip as usize) else {
            return Err(GraphicsError::Backend(format!(
                "texture '{}' has no mip {mip}",
                texture.name()
            )));
        };
        if target.len() != texels.len() {
            return Err(GraphicsError::Backend(format!(
                "texture '{}' mip {mip} holds {} texels, {} given",
                texture.name(),
                target.len(),
                texels.len()
            )));
        }
        for (dst, src) in target.iter_mut().zip(texels) {
            *dst = quantize(format, *src);
        }
        Ok(())
    }

    /// Last state tracked for one mip.
    pub fn texture_state(&self, texture: &Texture, mip: u32) -> GraphicsResult<ResourceState> {
        let storage = soft_texture(texture)?.storage.read();
        storage.states.get(mip as usize).copied().ok_or_else(|| {
            GraphicsError::Backend(format!("texture '{}' has no mip {mip}", texture.name()))
        })
    }

    fn compile_error(info: &ShaderCreateInfo, message: &str) -> GraphicsError {
        GraphicsError::ShaderCompilation {
            file: info.file_path.clone(),
            entry_point: info.entry_point.clone(),
            message: message.to_string(),
        }
    }
}

impl RenderDevice for SoftDevice {
    fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            device_type: self.config.device_type,
            features: DeviceFeatures {
                texture_subresource_views: self.config.texture_subresource_views,
            },
        }
    }

    fn texture_format_info(&self, format: TextureFormat) -> TextureFormatInfo {
        let bind_flags = match format {
            TextureFormat::Unknown => BindFlags::NONE,
            TextureFormat::D24UnormS8Uint if !self.config.d24s8_depth_stencil => {
                BindFlags::SHADER_RESOURCE
            }
            f if f.is_depth() => BindFlags::SHADER_RESOURCE | BindFlags::DEPTH_STENCIL,
            _ => BindFlags::SHADER_RESOURCE | BindFlags::RENDER_TARGET,
        };
        TextureFormatInfo {
            supported: format != TextureFormat::Unknown,
            bind_flags,
        }
    }

    fn create_texture(
        &self,
        desc: &TextureDesc,
        initial_data: Option<&[u8]>,
    ) -> GraphicsResult<Texture> {
        let fail = |message: String| GraphicsError::ResourceCreation {
            name: desc.name.clone(),
            message,
        };
        if desc.width == 0 || desc.height == 0 {
            return Err(fail(format!("invalid size {}x{}", desc.width, desc.height)));
        }
        let max_mips = crate::graphics::compute_mip_levels_count(desc.width, desc.height);
        if desc.mip_levels == 0 || desc.mip_levels > max_mips {
            return Err(fail(format!(
                "{} mip levels requested, 1..={max_mips} allowed",
                desc.mip_levels
            )));
        }
        let info = self.texture_format_info(desc.format);
        if !info.supported {
            return Err(GraphicsError::UnsupportedFormat(desc.format));
        }
        if !info.bind_flags.contains(desc.bind_flags) {
            return Err(fail(format!(
                "{:?} does not support bind flags {:#x}",
                desc.format,
                desc.bind_flags.bits()
            )));
        }
        if let Some(data) = initial_data {
            let expected = (desc.width * desc.height) as usize * desc.format.bytes_per_texel();
            if data.len() != expected {
                return Err(fail(format!(
                    "initial data holds {} bytes, {expected} expected",
                    data.len()
                )));
            }
        }

        self.stats.lock().textures += 1;
        log::trace!("created texture '{}' ({}x{})", desc.name, desc.width, desc.height);
        Ok(Texture::new(SoftTexture::new(desc.clone(), initial_data)))
    }

    fn create_buffer(
        &self,
        desc: &BufferDesc,
        initial_data: Option<&[u8]>,
    ) -> GraphicsResult<Buffer> {
        if desc.size == 0 {
            return Err(GraphicsError::ResourceCreation {
                name: desc.name.clone(),
                message: "buffer size is zero".to_string(),
            });
        }
        if let Some(data) = initial_data {
            if data.len() as u64 > desc.size {
                return Err(GraphicsError::BufferOverflow {
                    name: desc.name.clone(),
                    size: desc.size,
                    offset: 0,
                    len: data.len() as u64,
                });
            }
        }
        self.stats.lock().buffers += 1;
        Ok(Buffer::new(SoftBuffer::new(desc.clone(), initial_data)))
    }

    fn create_shader(&self, info: &ShaderCreateInfo) -> GraphicsResult<Shader> {
        if self.config.rejects(info) {
            return Err(Self::compile_error(info, "rejected by device configuration"));
        }
        let source = shader_source(&info.file_path, &info.macros)
            .ok_or_else(|| Self::compile_error(info, "source file not found"))?;
        if !source.contains(&format!("fn {}(", info.entry_point)) {
            return Err(Self::compile_error(info, "entry point not found"));
        }

        let kernel = match info.shader_type {
            ShaderType::Vertex => {
                if info.file_path != files::FULL_SCREEN_TRIANGLE
                    || info.entry_point != FULL_SCREEN_TRIANGLE_VS
                {
                    return Err(Self::compile_error(
                        info,
                        "only the full-screen triangle vertex shader is supported",
                    ));
                }
                None
            }
            ShaderType::Pixel => Some(
                kernels::resolve(info)
                    .ok_or_else(|| Self::compile_error(info, "no pixel kernel for entry point"))?,
            ),
        };

        self.stats.lock().shaders += 1;
        log::debug!("compiled {} ({})", info.file_path, info.entry_point);
        Ok(Shader::new(SoftShader {
            info: info.clone(),
            kernel,
        }))
    }

    fn create_graphics_pipeline(&self, desc: &GraphicsPipelineDesc) -> GraphicsResult<PipelineState> {
        let fail = |message: &str| GraphicsError::PipelineCreation {
            name: desc.name.clone(),
            message: message.to_string(),
        };

        if desc.vs.create_info().shader_type != ShaderType::Vertex {
            return Err(fail("vertex stage holds a non-vertex shader"));
        }
        if desc.ps.create_info().shader_type != ShaderType::Pixel {
            return Err(fail("pixel stage holds a non-pixel shader"));
        }
        let kernel = desc
            .ps
            .downcast_ref::<SoftShader>()
            .and_then(|shader| shader.kernel)
            .ok_or_else(|| fail("pixel shader was not created by the software device"))?;

        if desc.rtv_formats.len() > MAX_RENDER_TARGETS {
            return Err(fail("too many render targets"));
        }
        for format in &desc.rtv_formats {
            if !self
                .texture_format_info(*format)
                .bind_flags
                .contains(BindFlags::RENDER_TARGET)
            {
                return Err(fail(&format!("{format:?} cannot be a render target")));
            }
        }
        if desc.has_depth_stencil() {
            if !self
                .texture_format_info(desc.dsv_format)
                .bind_flags
                .contains(BindFlags::DEPTH_STENCIL)
            {
                return Err(fail(&format!(
                    "{:?} cannot be a depth-stencil target",
                    desc.dsv_format
                )));
            }
        } else if desc.depth_stencil.stencil_enable || desc.depth_stencil.depth_enable {
            return Err(fail("depth-stencil state requires a depth-stencil format"));
        }
        if desc.depth_stencil.stencil_enable && !desc.dsv_format.has_stencil() {
            return Err(fail("stencil test requires a format with stencil"));
        }
        if desc.depth_stencil.depth_enable {
            return Err(fail("depth testing is not implemented by the software device"));
        }
        if desc.blend.blend_enable {
            return Err(fail("blending is not implemented by the software device"));
        }
        if desc.read_only_dsv
            && (!desc.depth_stencil.is_stencil_read_only() || desc.depth_stencil.depth_write_enable)
        {
            return Err(fail("read-only depth-stencil view with a writing depth-stencil state"));
        }

        self.stats.lock().pipelines += 1;
        log::debug!("created pipeline '{}'", desc.name);
        Ok(PipelineState::new(SoftPipeline {
            desc: desc.clone(),
            kernel,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphics::{BlendStateDesc, DepthStencilStateDesc, PipelineResourceLayoutDesc};

    fn shaders(device: &SoftDevice, file: &str, entry: &str) -> (Shader, Shader) {
        let vs = device
            .create_shader(&ShaderCreateInfo::new(
                files::FULL_SCREEN_TRIANGLE,
                FULL_SCREEN_TRIANGLE_VS,
                ShaderType::Vertex,
            ))
            .unwrap();
        let ps = device
            .create_shader(&ShaderCreateInfo::new(file, entry, ShaderType::Pixel))
            .unwrap();
        (vs, ps)
    }

    #[test]
    fn d24s8_attachment_follows_config() {
        let d3d = SoftDevice::new(SoftDeviceConfig::d3d12());
        let web = SoftDevice::new(SoftDeviceConfig::webgpu());
        let d24 = TextureFormat::D24UnormS8Uint;
        assert!(d3d.texture_format_info(d24).bind_flags.contains(BindFlags::DEPTH_STENCIL));
        assert!(!web.texture_format_info(d24).bind_flags.contains(BindFlags::DEPTH_STENCIL));
        assert!(web
            .texture_format_info(TextureFormat::D32FloatS8X24Uint)
            .bind_flags
            .contains(BindFlags::DEPTH_STENCIL));
    }

    #[test]
    fn texture_creation_validates_description() {
        let device = SoftDevice::new(SoftDeviceConfig::d3d12());
        let zero = TextureDesc::new_2d("zero", 0, 4, TextureFormat::R8Unorm, BindFlags::SHADER_RESOURCE);
        assert!(matches!(
            device.create_texture(&zero, None),
            Err(GraphicsError::ResourceCreation { .. })
        ));
        let mips = TextureDesc::new_2d("mips", 4, 4, TextureFormat::R8Unorm, BindFlags::SHADER_RESOURCE)
            .with_mip_levels(4);
        assert!(device.create_texture(&mips, None).is_err());
        let depth_rt = TextureDesc::new_2d("depth", 4, 4, TextureFormat::D32Float, BindFlags::RENDER_TARGET);
        assert!(device.create_texture(&depth_rt, None).is_err());
        assert_eq!(device.stats().textures, 0);
    }

    #[test]
    fn shader_compilation_checks_source_and_rejections() {
        let device = SoftDevice::new(SoftDeviceConfig::vulkan().rejecting_shader("copy_depth_ps"));
        let missing = ShaderCreateInfo::new(files::COPY_DEPTH, "not_there_ps", ShaderType::Pixel);
        assert!(matches!(
            device.create_shader(&missing),
            Err(GraphicsError::ShaderCompilation { .. })
        ));
        let rejected = ShaderCreateInfo::new(files::COPY_DEPTH, "copy_depth_ps", ShaderType::Pixel);
        assert!(device.create_shader(&rejected).is_err());
        let (_, ps) = shaders(
            &device,
            files::COMPUTE_INTERSECTION,
            "compute_intersection_ps",
        );
        assert_eq!(ps.create_info().entry_point, "compute_intersection_ps");
        assert_eq!(device.stats().shaders, 2);
    }

    #[test]
    fn read_only_dsv_requires_read_only_state() {
        let device = SoftDevice::new(SoftDeviceConfig::d3d12());
        let (vs, ps) = shaders(
            &device,
            files::COMPUTE_STENCIL_MASK_AND_EXTRACT_ROUGHNESS,
            "compute_stencil_mask_and_extract_roughness_ps",
        );
        let mut desc = GraphicsPipelineDesc {
            name: "mask".to_string(),
            vs,
            ps,
            layout: PipelineResourceLayoutDesc::new(),
            rtv_formats: vec![TextureFormat::R8Unorm],
            dsv_format: TextureFormat::D24UnormS8Uint,
            depth_stencil: DepthStencilStateDesc::STENCIL_WRITE,
            blend: BlendStateDesc::default(),
            read_only_dsv: true,
        };
        assert!(device.create_graphics_pipeline(&desc).is_err());
        desc.read_only_dsv = false;
        assert!(device.create_graphics_pipeline(&desc).is_ok());
        desc.dsv_format = TextureFormat::Unknown;
        assert!(device.create_graphics_pipeline(&desc).is_err());
    }

    #[test]
    fn readback_rejects_foreign_mips() {
        let device = SoftDevice::new(SoftDeviceConfig::d3d11());
        let desc = TextureDesc::new_2d("t", 2, 2, TextureFormat::R8Unorm, BindFlags::SHADER_RESOURCE);
        let texture = device.create_texture(&desc, None).unwrap();
        assert_eq!(device.read_texture(&texture, 0).unwrap().len(), 4);
        assert!(device.read_texture(&texture, 1).is_err());
        assert!(device.read_stencil(&texture).is_err());
        assert!(device.write_texture(&texture, 0, &[Vec4::ONE]).is_err());
        assert_eq!(device.texture_state(&texture, 0).unwrap(), ResourceState::Unknown);
    }
}
