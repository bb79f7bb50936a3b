mod common;

use common::{camera, init_logging, Fixture, GBuffer};
use glam::Vec4;
use ssr_render::graphics::{
    Buffer, BufferDesc, DeviceInfo, GraphicsPipelineDesc, PipelineState, RenderDevice, Shader,
    ShaderCreateInfo, Texture, TextureDesc, TextureFormat, TextureFormatInfo,
};
use ssr_render::soft::{SoftCommand, SoftDevice, SoftDeviceConfig};
use ssr_render::{GraphicsError, GraphicsResult, PostFxError, ScreenSpaceReflection, SsrResource};

const ALL_TEXTURES: [SsrResource; 15] = [
    SsrResource::DepthHierarchy,
    SsrResource::Roughness,
    SsrResource::DepthStencilMask,
    SsrResource::Radiance,
    SsrResource::RayDirectionPdf,
    SsrResource::ResolvedRadiance,
    SsrResource::ResolvedVariance,
    SsrResource::ResolvedDepth,
    SsrResource::RadianceHistory0,
    SsrResource::RadianceHistory1,
    SsrResource::VarianceHistory0,
    SsrResource::VarianceHistory1,
    SsrResource::DepthHistory,
    SsrResource::Output,
    SsrResource::DepthHierarchyIntermediate,
];

#[test]
fn every_target_matches_the_back_buffer() {
    init_logging();
    for config in [SoftDeviceConfig::d3d12(), SoftDeviceConfig::opengl()] {
        let has_intermediate = !config.texture_subresource_views;
        let device = SoftDevice::new(config);
        let mut context = device.create_context();
        let mut ssr = ScreenSpaceReflection::new(&device).unwrap();
        ssr.set_back_buffer_size(&device, &mut context, 37, 21).unwrap();

        for slot in ALL_TEXTURES {
            let Some(texture) = ssr.resources().texture(slot) else {
                assert!(slot == SsrResource::DepthHierarchyIntermediate && !has_intermediate);
                continue;
            };
            let desc = texture.desc();
            assert_eq!((desc.width, desc.height), (37, 21), "{slot:?}");
        }
        assert_eq!(ssr.back_buffer_size(), Some((37, 21)));
    }
}

#[test]
fn repeating_the_size_allocates_nothing() {
    let mut fixture = Fixture::new(SoftDeviceConfig::d3d12(), 16, 8, common::half_reflective(16));
    let textures = fixture.device.stats().textures;
    let hierarchy = fixture
        .ssr
        .resources()
        .texture(SsrResource::DepthHierarchy)
        .unwrap()
        .clone();
    fixture.context.clear_commands();

    fixture
        .ssr
        .set_back_buffer_size(&fixture.device, &mut fixture.context, 16, 8)
        .unwrap();
    assert_eq!(fixture.device.stats().textures, textures);
    assert!(fixture.context.commands().is_empty());
    assert!(fixture
        .ssr
        .resources()
        .texture(SsrResource::DepthHierarchy)
        .unwrap()
        .ptr_eq(&hierarchy));

    fixture
        .ssr
        .set_back_buffer_size(&fixture.device, &mut fixture.context, 8, 16)
        .unwrap();
    assert!(fixture.device.stats().textures > textures);
    let resized = fixture.ssr.resources().texture(SsrResource::Output).unwrap();
    assert_eq!((resized.desc().width, resized.desc().height), (8, 16));
}

#[test]
fn hierarchy_mip_count_is_capped() {
    init_logging();
    let device = SoftDevice::new(SoftDeviceConfig::vulkan());
    let mut context = device.create_context();
    let mut ssr = ScreenSpaceReflection::new(&device).unwrap();

    for ((width, height), expected) in [((1, 1), 1), ((5, 3), 3), ((64, 2), 7), ((1000, 1), 7)] {
        ssr.set_back_buffer_size(&device, &mut context, width, height).unwrap();
        assert_eq!(ssr.depth_hierarchy_mip_count(), expected, "{width}x{height}");
        let hierarchy = ssr.resources().texture(SsrResource::DepthHierarchy).unwrap();
        assert_eq!(hierarchy.desc().mip_levels, expected);
    }
}

#[test]
fn zero_size_is_rejected() {
    init_logging();
    let device = SoftDevice::new(SoftDeviceConfig::d3d11());
    let mut context = device.create_context();
    let mut ssr = ScreenSpaceReflection::new(&device).unwrap();
    assert_eq!(
        ssr.set_back_buffer_size(&device, &mut context, 0, 4),
        Err(PostFxError::InvalidBackBufferSize { width: 0, height: 4 })
    );
    assert!(context.commands().is_empty());
    assert_eq!(ssr.back_buffer_size(), None);
}

#[test]
fn histories_start_cleared() {
    let mut fixture = Fixture::new(SoftDeviceConfig::d3d12(), 8, 8, common::half_reflective(8));
    fixture.render_frame(0).unwrap();

    // Resizing clears the new histories inside their own debug group.
    fixture.context.clear_commands();
    fixture
        .ssr
        .set_back_buffer_size(&fixture.device, &mut fixture.context, 4, 4)
        .unwrap();
    let clears = fixture
        .context
        .commands()
        .iter()
        .filter(|c| matches!(c, SoftCommand::ClearRenderTarget { .. }))
        .count();
    assert_eq!(clears, 5);
    assert!(matches!(
        fixture.context.commands().first(),
        Some(SoftCommand::BeginDebugGroup(name)) if name == "ScreenSpaceReflection::ClearHistory"
    ));

    for slot in [
        SsrResource::RadianceHistory0,
        SsrResource::RadianceHistory1,
        SsrResource::DepthHistory,
    ] {
        let texture = fixture.ssr.resources().texture(slot).unwrap();
        let texels = fixture.device.read_texture(texture, 0).unwrap();
        let zero = ssr_render::soft::quantize(texture.desc().format, Vec4::ZERO);
        assert!(texels.iter().all(|t| *t == zero), "{slot:?}");
    }
}

#[test]
fn depth_stencil_format_follows_d24_support() {
    init_logging();
    let with_d24 = SoftDevice::new(SoftDeviceConfig::d3d12());
    let without_d24 = SoftDevice::new(SoftDeviceConfig::d3d12().with_d24s8_depth_stencil(false));
    assert_eq!(
        ScreenSpaceReflection::new(&with_d24).unwrap().depth_stencil_format(),
        TextureFormat::D24UnormS8Uint
    );
    assert_eq!(
        ScreenSpaceReflection::new(&without_d24).unwrap().depth_stencil_format(),
        TextureFormat::D32FloatS8X24Uint
    );
}

/// Software device that refuses to create one named texture.
struct FailingTextureDevice<'a> {
    inner: &'a SoftDevice,
    fail_on: &'static str,
}

impl RenderDevice for FailingTextureDevice<'_> {
    fn device_info(&self) -> DeviceInfo {
        self.inner.device_info()
    }

    fn texture_format_info(&self, format: TextureFormat) -> TextureFormatInfo {
        self.inner.texture_format_info(format)
    }

    fn create_texture(&self, desc: &TextureDesc, initial_data: Option<&[u8]>) -> GraphicsResult<Texture> {
        if desc.name == self.fail_on {
            return Err(GraphicsError::ResourceCreation {
                name: desc.name.clone(),
                message: "out of memory".to_string(),
            });
        }
        self.inner.create_texture(desc, initial_data)
    }

    fn create_buffer(&self, desc: &BufferDesc, initial_data: Option<&[u8]>) -> GraphicsResult<Buffer> {
        self.inner.create_buffer(desc, initial_data)
    }

    fn create_shader(&self, info: &ShaderCreateInfo) -> GraphicsResult<Shader> {
        self.inner.create_shader(info)
    }

    fn create_graphics_pipeline(&self, desc: &GraphicsPipelineDesc) -> GraphicsResult<PipelineState> {
        self.inner.create_graphics_pipeline(desc)
    }
}

#[test]
fn failed_resize_keeps_the_previous_targets() {
    init_logging();
    let device = SoftDevice::new(SoftDeviceConfig::d3d12());
    let failing = FailingTextureDevice {
        inner: &device,
        fail_on: "ScreenSpaceReflection::Output",
    };
    let mut context = device.create_context();
    let mut ssr = ScreenSpaceReflection::new(&device).unwrap();
    ssr.set_back_buffer_size(&device, &mut context, 16, 8).unwrap();
    context.clear_commands();

    assert!(matches!(
        ssr.set_back_buffer_size(&failing, &mut context, 32, 32),
        Err(PostFxError::Graphics(GraphicsError::ResourceCreation { .. }))
    ));
    assert!(context.commands().is_empty());
    assert_eq!(ssr.back_buffer_size(), Some((16, 8)));
    assert_eq!(ssr.depth_hierarchy_mip_count(), 5);
    for slot in ALL_TEXTURES {
        if let Some(texture) = ssr.resources().texture(slot) {
            assert_eq!((texture.desc().width, texture.desc().height), (16, 8), "{slot:?}");
        }
    }

    // Same size again is still a no-op, and the new size succeeds once the device recovers.
    ssr.set_back_buffer_size(&device, &mut context, 16, 8).unwrap();
    assert!(context.commands().is_empty());
    ssr.set_back_buffer_size(&device, &mut context, 32, 32).unwrap();
    for slot in ALL_TEXTURES {
        if let Some(texture) = ssr.resources().texture(slot) {
            assert_eq!((texture.desc().width, texture.desc().height), (32, 32), "{slot:?}");
        }
    }
    assert_eq!(ssr.depth_hierarchy_mip_count(), 6);
}

#[test]
fn resize_keeps_techniques_built_for_unchanged_formats() {
    let mut fixture = Fixture::new(SoftDeviceConfig::d3d12(), 16, 8, common::half_reflective(16));
    fixture.render_frame(0).unwrap();
    let pipelines = fixture.device.stats().pipelines;

    fixture.gbuffer = GBuffer::new(&fixture.device, 8, 8, common::half_reflective(8));
    fixture.camera = camera(8, 8);
    fixture
        .ssr
        .set_back_buffer_size(&fixture.device, &mut fixture.context, 8, 8)
        .unwrap();
    fixture.render_frame(1).unwrap();
    assert_eq!(fixture.device.stats().pipelines, pipelines);

    let output = fixture.output();
    assert_eq!(output.len(), 64);
    for (index, texel) in output.iter().enumerate() {
        if index % 8 < 4 {
            assert!(texel.truncate().length() > 0.0, "pixel {index} is black");
        } else {
            assert_eq!(*texel, Vec4::ZERO, "pixel {index}");
        }
    }
}
