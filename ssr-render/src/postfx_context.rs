//! Per-frame data shared by every post-processing effect: blue noise, camera constants, frame index.

use ssr_gpu_shared::noise::{self, BLUE_NOISE_SIZE};
use ssr_gpu_shared::shaders::files;
use ssr_gpu_shared::uniforms::{BlueNoiseAttribs, CameraAttribs, CameraAttribsPair};

use crate::error::{PostFxError, PostFxResult};
use crate::graphics::{
    with_debug_group, BindFlags, BlendStateDesc, Buffer, BufferDesc, DepthStencilStateDesc,
    DeviceContext, DrawAttribs, GraphicsPipelineDesc, PipelineResourceLayoutDesc, RenderDevice,
    RenderStateCache, ShaderResourceVariableType, ShaderType, TextureDesc, TextureFormat,
    TextureView,
};
use crate::render_technique::RenderTechnique;
use crate::resource_registry::{ResourceRegistry, SlotId};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PostFxResource {
    SobolBuffer,
    ScramblingTileBuffer,
    BlueNoiseTextureXy,
    BlueNoiseTextureZw,
    BlueNoiseAttribs,
    CameraAttribs,
}

impl SlotId for PostFxResource {
    const COUNT: usize = 6;

    fn index(self) -> usize {
        self as usize
    }
}

/// Which pair of blue-noise dimensions to read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlueNoiseDimension {
    Xy,
    Zw,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PostFxSettings {
    /// Regenerate the blue-noise textures every frame, seeded with the frame index.
    pub temporal_blue_noise: bool,
}

/// Where the frame's camera constants come from.
#[derive(Clone, Copy, Debug)]
pub enum CameraSource<'a> {
    /// Uploaded into a buffer owned by the context.
    Attribs {
        current: &'a CameraAttribs,
        previous: &'a CameraAttribs,
    },
    /// Caller-owned buffer already holding a `CameraAttribsPair`.
    Buffer(&'a Buffer),
}

pub struct PostFxRenderAttributes<'a> {
    pub state_cache: Option<&'a RenderStateCache>,
    pub frame_index: u32,
    pub camera: CameraSource<'a>,
}

pub struct PostFxContext {
    resources: ResourceRegistry<PostFxResource>,
    blue_noise_technique: RenderTechnique,
    settings: PostFxSettings,
    camera_attribs_cb: Option<Buffer>,
    frame_index: u32,
    blue_noise_generated: bool,
    prepared: bool,
}

impl PostFxContext {
    pub fn new(device: &dyn RenderDevice) -> PostFxResult<Self> {
        Self::with_settings(device, PostFxSettings::default())
    }

    pub fn with_settings(device: &dyn RenderDevice, settings: PostFxSettings) -> PostFxResult<Self> {
        let mut resources = ResourceRegistry::new();

        let sobol = noise::sobol_256spp_256d();
        let sobol_desc = TextureDesc::new_2d(
            "PostFXContext::SobolBuffer",
            noise::SOBOL_WIDTH,
            noise::SOBOL_HEIGHT,
            TextureFormat::R32Uint,
            BindFlags::SHADER_RESOURCE,
        );
        resources.insert(
            PostFxResource::SobolBuffer,
            device.create_texture(&sobol_desc, Some(bytemuck::cast_slice(&sobol)))?,
        );

        let scrambling = noise::scrambling_tile();
        let scrambling_desc = TextureDesc::new_2d(
            "PostFXContext::ScramblingTileBuffer",
            noise::SCRAMBLING_TILE_WIDTH,
            noise::SCRAMBLING_TILE_HEIGHT,
            TextureFormat::R32Uint,
            BindFlags::SHADER_RESOURCE,
        );
        resources.insert(
            PostFxResource::ScramblingTileBuffer,
            device.create_texture(&scrambling_desc, Some(bytemuck::cast_slice(&scrambling)))?,
        );

        for (slot, name) in [
            (PostFxResource::BlueNoiseTextureXy, "PostFXContext::BlueNoiseTextureXY"),
            (PostFxResource::BlueNoiseTextureZw, "PostFXContext::BlueNoiseTextureZW"),
        ] {
            let desc = TextureDesc::new_2d(
                name,
                BLUE_NOISE_SIZE,
                BLUE_NOISE_SIZE,
                TextureFormat::Rg8Unorm,
                BindFlags::SHADER_RESOURCE | BindFlags::RENDER_TARGET,
            );
            resources.insert(slot, device.create_texture(&desc, None)?);
        }

        let attribs = BlueNoiseAttribs::default();
        resources.insert(
            PostFxResource::BlueNoiseAttribs,
            device.create_buffer(
                &BufferDesc::uniform(
                    "PostFXContext::BlueNoiseAttribs",
                    std::mem::size_of::<BlueNoiseAttribs>() as u64,
                ),
                Some(bytemuck::bytes_of(&attribs)),
            )?,
        );

        Ok(Self {
            resources,
            blue_noise_technique: RenderTechnique::new(),
            settings,
            camera_attribs_cb: None,
            frame_index: 0,
            blue_noise_generated: false,
            prepared: false,
        })
    }

    /// Uploads the frame constants and generates blue noise when needed.
    pub fn prepare_resources(
        &mut self,
        device: &dyn RenderDevice,
        context: &mut dyn DeviceContext,
        attribs: &PostFxRenderAttributes,
    ) -> PostFxResult<()> {
        let required = std::mem::size_of::<CameraAttribsPair>() as u64;
        if let CameraSource::Buffer(buffer) = attribs.camera {
            if buffer.desc().size < required {
                return Err(PostFxError::CameraBufferTooSmall {
                    size: buffer.desc().size,
                    required,
                });
            }
        }

        with_debug_group(context, "PreparePostFX", |context| {
            self.update_camera(device, context, &attribs.camera)?;

            let frame = BlueNoiseAttribs {
                frame_index: attribs.frame_index,
                ..Default::default()
            };
            let frame_cb = self.resources.require_buffer(PostFxResource::BlueNoiseAttribs)?;
            context.update_buffer(frame_cb, 0, bytemuck::bytes_of(&frame))?;
            self.frame_index = attribs.frame_index;

            if !self.blue_noise_generated || self.settings.temporal_blue_noise {
                self.compute_blue_noise_texture(device, context, attribs.state_cache)?;
                self.blue_noise_generated = true;
            }
            self.prepared = true;
            Ok(())
        })
    }

    fn update_camera(
        &mut self,
        device: &dyn RenderDevice,
        context: &mut dyn DeviceContext,
        camera: &CameraSource,
    ) -> PostFxResult<()> {
        match *camera {
            CameraSource::Buffer(buffer) => {
                self.camera_attribs_cb = Some(buffer.clone());
            }
            CameraSource::Attribs { current, previous } => {
                if !self.resources.contains(PostFxResource::CameraAttribs) {
                    let desc = BufferDesc::uniform(
                        "PostFXContext::CameraAttribsConstantBuffer",
                        std::mem::size_of::<CameraAttribsPair>() as u64,
                    );
                    let buffer = device.create_buffer(&desc, None)?;
                    self.resources.insert(PostFxResource::CameraAttribs, buffer);
                }
                let buffer = self.resources.require_buffer(PostFxResource::CameraAttribs)?;
                let pair = CameraAttribsPair {
                    current: *current,
                    previous: *previous,
                };
                context.update_buffer(buffer, 0, bytemuck::bytes_of(&pair))?;
                self.camera_attribs_cb = Some(buffer.clone());
            }
        }
        Ok(())
    }

    fn compute_blue_noise_texture(
        &mut self,
        device: &dyn RenderDevice,
        context: &mut dyn DeviceContext,
        state_cache: Option<&RenderStateCache>,
    ) -> PostFxResult<()> {
        let technique = &mut self.blue_noise_technique;
        if !technique.is_initialized() {
            let layout = PipelineResourceLayoutDesc::new()
                .add_variable("cbBlueNoiseAttribs", ShaderResourceVariableType::Static)
                .add_variable("g_SobolBuffer", ShaderResourceVariableType::Static)
                .add_variable("g_ScramblingTileBuffer", ShaderResourceVariableType::Static);

            let vs = RenderTechnique::create_shader(
                device,
                state_cache,
                files::FULL_SCREEN_TRIANGLE,
                "full_screen_triangle_vs",
                ShaderType::Vertex,
                &[],
            )?;
            let ps = RenderTechnique::create_shader(
                device,
                state_cache,
                files::COMPUTE_BLUE_NOISE_TEXTURE,
                "compute_blue_noise_texture_ps",
                ShaderType::Pixel,
                &[],
            )?;

            technique.initialize_pso(
                device,
                state_cache,
                &GraphicsPipelineDesc {
                    name: "PreparePostFX::ComputeBlueNoiseTexture".into(),
                    vs,
                    ps,
                    layout,
                    rtv_formats: vec![TextureFormat::Rg8Unorm, TextureFormat::Rg8Unorm],
                    dsv_format: TextureFormat::Unknown,
                    depth_stencil: DepthStencilStateDesc::DISABLE_DEPTH,
                    blend: BlendStateDesc::default(),
                    read_only_dsv: false,
                },
            )?;

            technique.set_static_variable(
                "cbBlueNoiseAttribs",
                self.resources.require_buffer(PostFxResource::BlueNoiseAttribs)?.clone(),
            )?;
            technique.set_static_variable(
                "g_SobolBuffer",
                self.resources.texture_srv(PostFxResource::SobolBuffer)?,
            )?;
            technique.set_static_variable(
                "g_ScramblingTileBuffer",
                self.resources.texture_srv(PostFxResource::ScramblingTileBuffer)?,
            )?;
            technique.initialize_srb(true)?;
        }

        let rtvs = [
            self.resources.texture_rtv(PostFxResource::BlueNoiseTextureXy)?,
            self.resources.texture_rtv(PostFxResource::BlueNoiseTextureZw)?,
        ];

        with_debug_group(context, "ComputeBlueNoiseTexture", |context| {
            let (pipeline, bindings) = technique.parts_mut()?;
            context.set_render_targets(&rtvs, None)?;
            context.set_pipeline_state(pipeline)?;
            context.commit_shader_resources(bindings)?;
            context.draw(&DrawAttribs::FULL_SCREEN_TRIANGLE)?;
            context.set_render_targets(&[], None)?;
            Ok(())
        })
    }

    pub fn blue_noise_srv(&self, dimension: BlueNoiseDimension) -> PostFxResult<TextureView> {
        let slot = match dimension {
            BlueNoiseDimension::Xy => PostFxResource::BlueNoiseTextureXy,
            BlueNoiseDimension::Zw => PostFxResource::BlueNoiseTextureZw,
        };
        self.resources.texture_srv(slot)
    }

    /// Camera buffer of the last prepared frame.
    pub fn camera_attribs_cb(&self) -> Option<&Buffer> {
        self.camera_attribs_cb.as_ref()
    }

    pub fn frame_index(&self) -> u32 {
        self.frame_index
    }

    pub fn is_prepared(&self) -> bool {
        self.prepared
    }

    pub fn settings(&self) -> &PostFxSettings {
        &self.settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soft::{SoftCommand, SoftDevice, SoftDeviceConfig};
    use glam::{Mat4, Vec3};

    fn camera() -> CameraAttribs {
        let view = Mat4::look_at_rh(Vec3::new(0.0, 1.0, 3.0), Vec3::ZERO, Vec3::Y);
        let proj = Mat4::perspective_rh(1.0, 1.0, 0.1, 50.0);
        CameraAttribs::new(Vec3::new(0.0, 1.0, 3.0), view, proj, (8, 8), 0.1, 50.0)
    }

    fn blue_noise_draws(commands: &[SoftCommand]) -> usize {
        commands
            .iter()
            .filter(|c| matches!(c, SoftCommand::Draw(d) if d.pipeline == "PreparePostFX::ComputeBlueNoiseTexture"))
            .count()
    }

    #[test]
    fn owned_camera_buffer_is_created_once() {
        let device = SoftDevice::new(SoftDeviceConfig::d3d12());
        let mut context = device.create_context();
        let mut postfx = PostFxContext::new(&device).unwrap();
        assert!(!postfx.is_prepared());

        let cam = camera();
        for frame_index in 0..3 {
            let attribs = PostFxRenderAttributes {
                state_cache: None,
                frame_index,
                camera: CameraSource::Attribs {
                    current: &cam,
                    previous: &cam,
                },
            };
            postfx.prepare_resources(&device, &mut context, &attribs).unwrap();
        }

        assert!(postfx.is_prepared());
        assert_eq!(postfx.frame_index(), 2);
        let buffer = postfx.camera_attribs_cb().unwrap().clone();
        let bytes = device.read_buffer(&buffer).unwrap();
        let pair: CameraAttribsPair = bytemuck::pod_read_unaligned(&bytes);
        assert_eq!(pair.current, cam);
        assert_eq!(blue_noise_draws(context.commands()), 1);
    }

    #[test]
    fn external_camera_buffer_is_used_as_is() {
        let device = SoftDevice::new(SoftDeviceConfig::vulkan());
        let mut context = device.create_context();
        let mut postfx = PostFxContext::new(&device).unwrap();

        let external = device
            .create_buffer(
                &BufferDesc::uniform("external", std::mem::size_of::<CameraAttribsPair>() as u64),
                None,
            )
            .unwrap();
        let attribs = PostFxRenderAttributes {
            state_cache: None,
            frame_index: 7,
            camera: CameraSource::Buffer(&external),
        };
        postfx.prepare_resources(&device, &mut context, &attribs).unwrap();
        assert!(postfx.camera_attribs_cb().unwrap().ptr_eq(&external));
        assert_eq!(postfx.frame_index(), 7);
    }

    #[test]
    fn undersized_camera_buffer_is_rejected_before_any_command() {
        let device = SoftDevice::new(SoftDeviceConfig::d3d11());
        let mut context = device.create_context();
        let mut postfx = PostFxContext::new(&device).unwrap();
        let small = device
            .create_buffer(&BufferDesc::uniform("small", 16), None)
            .unwrap();

        let attribs = PostFxRenderAttributes {
            state_cache: None,
            frame_index: 0,
            camera: CameraSource::Buffer(&small),
        };
        let err = postfx.prepare_resources(&device, &mut context, &attribs).unwrap_err();
        assert!(matches!(err, PostFxError::CameraBufferTooSmall { size: 16, .. }));
        assert!(context.commands().is_empty());
        assert!(!postfx.is_prepared());
    }

    #[test]
    fn temporal_blue_noise_regenerates_every_frame() {
        let device = SoftDevice::new(SoftDeviceConfig::d3d12());
        let mut context = device.create_context();
        let settings = PostFxSettings {
            temporal_blue_noise: true,
        };
        let mut postfx = PostFxContext::with_settings(&device, settings).unwrap();
        let cam = camera();

        let mut first_frame = Vec::new();
        for frame_index in 0..2 {
            let attribs = PostFxRenderAttributes {
                state_cache: None,
                frame_index,
                camera: CameraSource::Attribs {
                    current: &cam,
                    previous: &cam,
                },
            };
            postfx.prepare_resources(&device, &mut context, &attribs).unwrap();
            let xy = postfx.blue_noise_srv(BlueNoiseDimension::Xy).unwrap();
            let texels = device.read_texture(xy.texture(), 0).unwrap();
            if frame_index == 0 {
                first_frame = texels;
            } else {
                assert_ne!(first_frame, texels);
            }
        }
        assert_eq!(blue_noise_draws(context.commands()), 2);
    }

    #[test]
    fn blue_noise_matches_reference_sampler() {
        let device = SoftDevice::new(SoftDeviceConfig::opengl());
        let mut context = device.create_context();
        let mut postfx = PostFxContext::new(&device).unwrap();
        let cam = camera();
        let attribs = PostFxRenderAttributes {
            state_cache: None,
            frame_index: 0,
            camera: CameraSource::Attribs {
                current: &cam,
                previous: &cam,
            },
        };
        postfx.prepare_resources(&device, &mut context, &attribs).unwrap();

        let sobol = noise::sobol_256spp_256d();
        let scrambling = noise::scrambling_tile();
        let zw = postfx.blue_noise_srv(BlueNoiseDimension::Zw).unwrap();
        let texels = device.read_texture(zw.texture(), 0).unwrap();
        for (i, j) in [(0u32, 0u32), (5, 9), (127, 127)] {
            let texel = texels[(i + j * BLUE_NOISE_SIZE) as usize];
            let z = noise::sample_blue_noise(&sobol, &scrambling, i, j, 0, 2);
            // RG8 storage keeps 8 bits.
            assert!((texel.x - z).abs() <= 0.5 / 255.0 + 1e-6);
        }
    }
}
