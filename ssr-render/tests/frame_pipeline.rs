mod common;

use common::{half_reflective, Fixture};
use glam::Vec4;
use ssr_render::graphics::{
    BindFlags, BoundResource, RenderDevice, RenderStateCache, TextureDesc, TextureFormat,
    TextureViewType,
};
use ssr_render::soft::{SoftCommand, SoftDeviceConfig};
use ssr_render::{
    GraphicsError, PostFxError, ScreenSpaceReflection, SsrRenderAttributes, SsrResource,
};

const WIDTH: u32 = 16;
const HEIGHT: u32 = 8;

fn fixture(config: SoftDeviceConfig) -> Fixture {
    Fixture::new(config, WIDTH, HEIGHT, half_reflective(WIDTH))
}

fn is_reflective(index: usize) -> bool {
    (index as u32 % WIDTH) < WIDTH / 2
}

fn debug_groups(commands: &[SoftCommand]) -> Vec<&str> {
    commands
        .iter()
        .filter_map(|command| match command {
            SoftCommand::BeginDebugGroup(name) => Some(name.as_str()),
            _ => None,
        })
        .collect()
}

fn bound_texture_is(resource: Option<&BoundResource>, fixture: &Fixture, slot: SsrResource) -> bool {
    let expected = fixture.ssr.resources().texture(slot).unwrap();
    matches!(resource, Some(BoundResource::Texture(view)) if view.texture().ptr_eq(expected))
}

#[test]
fn passes_run_in_order() {
    let mut fixture = fixture(SoftDeviceConfig::d3d12());
    fixture.prepare(0, None).unwrap();
    fixture.context.clear_commands();
    fixture.execute(None).unwrap();

    assert_eq!(
        debug_groups(fixture.context.commands()),
        [
            "ScreenSpaceReflection",
            "ComputeHierarchicalDepthBuffer",
            "ComputeStencilMaskAndExtractRoughness",
            "ComputeIntersection",
            "ComputeSpatialReconstruction",
            "ComputeTemporalAccumulation",
            "ComputeBilateralCleanup",
        ]
    );
    assert!(fixture.context.open_debug_groups().is_empty());
}

#[test]
fn histories_alternate_between_frames() {
    let mut fixture = fixture(SoftDeviceConfig::d3d12());

    for (frame, written, read) in [
        (0, SsrResource::RadianceHistory0, SsrResource::RadianceHistory1),
        (1, SsrResource::RadianceHistory1, SsrResource::RadianceHistory0),
        (2, SsrResource::RadianceHistory0, SsrResource::RadianceHistory1),
    ] {
        fixture.context.clear_commands();
        fixture.render_frame(frame).unwrap();

        let temporal = fixture
            .context
            .draws()
            .find(|draw| draw.pipeline == "ScreenSpaceReflection::ComputeTemporalAccumulation")
            .unwrap();
        let target = temporal.render_targets[0].texture();
        assert!(target.ptr_eq(fixture.ssr.resources().texture(written).unwrap()), "frame {frame}");
        assert!(
            bound_texture_is(temporal.input("g_TexturePrevRadiance"), &fixture, read),
            "frame {frame}"
        );

        let cleanup = fixture
            .context
            .draws()
            .find(|draw| draw.pipeline == "ScreenSpaceReflection::ComputeBilateralCleanup")
            .unwrap();
        assert!(bound_texture_is(cleanup.input("g_TextureRadiance"), &fixture, written));
    }
}

#[test]
fn temporal_pass_reads_the_depth_of_the_previous_frame() {
    for config in [SoftDeviceConfig::d3d12(), SoftDeviceConfig::vulkan()] {
        let mut fixture = fixture(config);
        fixture.render_frame(0).unwrap();

        let history = fixture
            .ssr
            .resources()
            .texture(SsrResource::DepthHistory)
            .unwrap();
        let depth = fixture.device.read_texture(history, 0).unwrap();
        assert!(depth.iter().all(|texel| texel.x == 0.5));
    }
}

#[test]
fn stencil_mask_gates_every_pass() {
    let mut fixture = fixture(SoftDeviceConfig::d3d12());
    fixture.render_frame(0).unwrap();

    let mask = fixture
        .ssr
        .resources()
        .texture(SsrResource::DepthStencilMask)
        .unwrap();
    let stencil = fixture.device.read_stencil(mask).unwrap();
    for (index, value) in stencil.iter().enumerate() {
        let expected = if is_reflective(index) { 0xFF } else { 0x00 };
        assert_eq!(*value, expected, "pixel {index}");
    }

    let output = fixture.output();
    for (index, texel) in output.iter().enumerate() {
        if is_reflective(index) {
            assert!(texel.truncate().length() > 0.0, "pixel {index} is black");
        } else {
            assert_eq!(*texel, Vec4::ZERO, "pixel {index}");
        }
    }

    for slot in [SsrResource::Radiance, SsrResource::RayDirectionPdf] {
        let texture = fixture.ssr.resources().texture(slot).unwrap();
        let texels = fixture.device.read_texture(texture, 0).unwrap();
        for (index, texel) in texels.iter().enumerate() {
            if is_reflective(index) {
                assert_ne!(*texel, Vec4::ZERO, "{slot:?} pixel {index} was not written");
            } else {
                assert_eq!(*texel, Vec4::ZERO, "{slot:?} pixel {index}");
            }
        }
    }
}

#[test]
fn static_scene_converges_immediately() {
    let mut fixture = fixture(SoftDeviceConfig::d3d12());
    fixture.render_frame(0).unwrap();
    let first = fixture.output();
    fixture.render_frame(1).unwrap();
    assert_eq!(fixture.output(), first);
}

#[test]
fn execute_before_sizing_is_rejected() {
    let mut fixture = fixture(SoftDeviceConfig::d3d12());
    fixture.ssr = ScreenSpaceReflection::new(&fixture.device).unwrap();
    fixture.prepare(0, None).unwrap();
    fixture.context.clear_commands();

    assert!(matches!(fixture.execute(None), Err(PostFxError::BackBufferNotSized)));
    assert!(fixture.context.commands().is_empty());
}

#[test]
fn execute_before_prepare_is_rejected() {
    let mut fixture = fixture(SoftDeviceConfig::d3d12());
    fixture.context.clear_commands();

    assert!(matches!(fixture.execute(None), Err(PostFxError::PostFxNotPrepared)));
    assert!(fixture.context.commands().is_empty());
}

#[test]
fn inputs_must_be_shader_resources_of_the_back_buffer_size() {
    let mut fixture = fixture(SoftDeviceConfig::d3d12());
    fixture.prepare(0, None).unwrap();
    fixture.context.clear_commands();

    let gbuffer = &fixture.gbuffer;
    let color = gbuffer.color.default_srv().unwrap();
    let depth = gbuffer.depth.default_srv().unwrap();
    let normal = gbuffer.normal.default_srv().unwrap();
    let material = gbuffer.material.default_srv().unwrap();
    let motion = gbuffer.motion.default_srv().unwrap();

    let color_rtv = gbuffer.color.default_rtv().unwrap();
    let attribs = SsrRenderAttributes {
        state_cache: None,
        postfx: &fixture.postfx,
        color: &color_rtv,
        depth: &depth,
        normal: &normal,
        material_parameters: &material,
        motion_vectors: &motion,
        ssr_attribs: &fixture.attribs,
    };
    let result = fixture.ssr.execute(&fixture.device, &mut fixture.context, &attribs);
    assert!(matches!(
        result,
        Err(PostFxError::InputNotShaderResource {
            input: "color",
            found: TextureViewType::RenderTarget
        })
    ));

    let small = fixture
        .device
        .create_texture(
            &TextureDesc::new_2d(
                "SmallNormal",
                WIDTH / 2,
                HEIGHT,
                TextureFormat::Rgba16Float,
                BindFlags::SHADER_RESOURCE,
            ),
            None,
        )
        .unwrap()
        .default_srv()
        .unwrap();
    let attribs = SsrRenderAttributes {
        state_cache: None,
        postfx: &fixture.postfx,
        color: &color,
        depth: &depth,
        normal: &small,
        material_parameters: &material,
        motion_vectors: &motion,
        ssr_attribs: &fixture.attribs,
    };
    let result = fixture.ssr.execute(&fixture.device, &mut fixture.context, &attribs);
    assert!(matches!(
        result,
        Err(PostFxError::InputExtentMismatch {
            input: "normal",
            width: 8,
            height: 8,
            expected_width: WIDTH,
            expected_height: HEIGHT,
        })
    ));
    assert!(fixture.context.commands().is_empty());
}

#[test]
fn pipelines_are_built_once_and_shared_through_the_cache() {
    let mut fixture = fixture(SoftDeviceConfig::d3d12());
    let cache = RenderStateCache::new();
    assert_eq!(fixture.device.stats().pipelines, 0);

    fixture.prepare(0, Some(&cache)).unwrap();
    let before = fixture.device.stats();
    fixture.execute(Some(&cache)).unwrap();
    let built = fixture.device.stats();
    // D3D12 copies depth directly, so every pass but CopyDepth needs a pipeline.
    assert_eq!(built.pipelines - before.pipelines, 6);

    fixture.render_frame(1).unwrap();
    assert_eq!(fixture.device.stats().pipelines, built.pipelines);

    let mut second = ScreenSpaceReflection::new(&fixture.device).unwrap();
    second
        .set_back_buffer_size(&fixture.device, &mut fixture.context, WIDTH, HEIGHT)
        .unwrap();
    let first = std::mem::replace(&mut fixture.ssr, second);
    fixture.prepare(2, Some(&cache)).unwrap();
    fixture.execute(Some(&cache)).unwrap();

    let after = fixture.device.stats();
    assert_eq!(after.pipelines, built.pipelines);
    assert_eq!(after.shaders, built.shaders);
    drop(first);
}

#[test]
fn shader_failure_aborts_the_frame() {
    let mut fixture = fixture(SoftDeviceConfig::d3d12().rejecting_shader("compute_intersection_ps"));
    fixture.prepare(0, None).unwrap();
    fixture.context.clear_commands();

    let result = fixture.execute(None);
    assert!(matches!(
        result,
        Err(PostFxError::Graphics(GraphicsError::ShaderCompilation { ref entry_point, .. }))
            if entry_point == "compute_intersection_ps"
    ));
    assert!(fixture
        .context
        .draws()
        .all(|draw| !draw.pipeline.contains("Intersection")
            && !draw.pipeline.contains("TemporalAccumulation")));
    assert!(fixture.context.open_debug_groups().is_empty());
}
