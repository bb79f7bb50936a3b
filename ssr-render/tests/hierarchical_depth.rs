mod common;

use common::{Fixture, Pixel};
use glam::Vec4;
use proptest::prelude::*;
use ssr_render::soft::{SoftCommand, SoftDeviceConfig};
use ssr_render::SsrResource;

/// Min over the 2x2 footprint, widened to 3 along odd source dimensions.
fn reduce(source: &[f32], width: u32, height: u32) -> (Vec<f32>, u32, u32) {
    let (out_w, out_h) = ((width / 2).max(1), (height / 2).max(1));
    let columns = if width & 1 == 1 { 3 } else { 2 };
    let rows = if height & 1 == 1 { 3 } else { 2 };
    let mut out = Vec::with_capacity((out_w * out_h) as usize);
    for y in 0..out_h {
        for x in 0..out_w {
            let mut min = f32::INFINITY;
            for dy in 0..rows {
                for dx in 0..columns {
                    let (sx, sy) = (2 * x + dx, 2 * y + dy);
                    if sx < width && sy < height {
                        min = min.min(source[(sy * width + sx) as usize]);
                    }
                }
            }
            out.push(min);
        }
    }
    (out, out_w, out_h)
}

fn hierarchy(fixture: &Fixture) -> Vec<Vec<f32>> {
    let texture = fixture
        .ssr
        .resources()
        .texture(SsrResource::DepthHierarchy)
        .unwrap();
    (0..texture.desc().mip_levels)
        .map(|mip| {
            fixture
                .device
                .read_texture(texture, mip)
                .unwrap()
                .iter()
                .map(|t| t.x)
                .collect()
        })
        .collect()
}

fn depth_scene(width: u32, depths: Vec<f32>) -> impl Fn(u32, u32) -> Pixel {
    move |x, y| Pixel {
        depth: depths[(y * width + x) as usize],
        ..Pixel::default()
    }
}

fn run(config: SoftDeviceConfig, width: u32, height: u32, depths: &[f32]) -> Fixture {
    let mut fixture = Fixture::new(config, width, height, depth_scene(width, depths.to_vec()));
    fixture.render_frame(0).unwrap();
    fixture
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn each_mip_is_the_min_of_its_footprint(
        (width, height, depths) in (1u32..=12, 1u32..=12).prop_flat_map(|(w, h)| {
            (Just(w), Just(h), prop::collection::vec(0.05f32..=1.0, (w * h) as usize))
        })
    ) {
        let fixture = run(SoftDeviceConfig::d3d12(), width, height, &depths);
        let mips = hierarchy(&fixture);

        let expected_levels = 32 - width.max(height).leading_zeros();
        prop_assert_eq!(mips.len() as u32, expected_levels.min(7));
        prop_assert_eq!(&mips[0], &depths);

        let (mut w, mut h) = (width, height);
        for level in 1..mips.len() {
            let (expected, next_w, next_h) = reduce(&mips[level - 1], w, h);
            prop_assert_eq!(&mips[level], &expected, "mip {}", level);
            w = next_w;
            h = next_h;
        }
    }
}

fn structured_depths(width: u32, height: u32) -> Vec<f32> {
    (0..width * height)
        .map(|i| 0.1 + ((i * 37 + 11) % 89) as f32 / 100.0)
        .collect()
}

#[test]
fn every_capability_path_builds_the_same_hierarchy() {
    let (width, height) = (13, 7);
    let depths = structured_depths(width, height);
    let reference = run(SoftDeviceConfig::d3d12(), width, height, &depths);
    let reference_mips = hierarchy(&reference);
    let reference_output = reference.output();

    for config in [
        SoftDeviceConfig::d3d11(),
        SoftDeviceConfig::vulkan(),
        SoftDeviceConfig::opengl(),
        SoftDeviceConfig::webgpu(),
        SoftDeviceConfig::d3d12().with_subresource_views(false),
    ] {
        let name = format!("{:?}/views={}", config.device_type, config.texture_subresource_views);
        let fixture = run(config, width, height, &depths);
        assert_eq!(hierarchy(&fixture), reference_mips, "{name}");
        let output: Vec<Vec4> = fixture.output();
        assert_eq!(output, reference_output, "{name}");
    }
}

fn hierarchy_commands(fixture: &Fixture) -> &[SoftCommand] {
    let commands = fixture.context.commands();
    let start = commands
        .iter()
        .position(|c| matches!(c, SoftCommand::BeginDebugGroup(n) if n == "ComputeHierarchicalDepthBuffer"))
        .unwrap();
    let end = commands
        .iter()
        .position(|c| matches!(c, SoftCommand::BeginDebugGroup(n) if n == "ComputeStencilMaskAndExtractRoughness"))
        .unwrap();
    &commands[start..end]
}

#[test]
fn branch_follows_device_capabilities() {
    let (width, height) = (16, 16);
    let depths = structured_depths(width, height);
    let mip_count = 5;

    let count = |commands: &[SoftCommand], f: fn(&SoftCommand) -> bool| {
        commands.iter().filter(|c| f(c)).count()
    };
    let is_transition: fn(&SoftCommand) -> bool = |c| matches!(c, SoftCommand::Transition { .. });
    let is_copy: fn(&SoftCommand) -> bool = |c| matches!(c, SoftCommand::CopyTexture { .. });
    let is_update: fn(&SoftCommand) -> bool = |c| matches!(c, SoftCommand::UpdateBuffer { .. });
    let is_draw: fn(&SoftCommand) -> bool = |c| matches!(c, SoftCommand::Draw(_));

    // Explicit transitions: whole chain, one per source mip, then the last mip.
    let d3d12 = run(SoftDeviceConfig::d3d12(), width, height, &depths);
    let commands = hierarchy_commands(&d3d12);
    assert_eq!(count(commands, is_transition), mip_count + 1);
    assert_eq!(count(commands, is_copy), 1);
    assert_eq!(count(commands, is_draw), mip_count - 1);

    let d3d11 = run(SoftDeviceConfig::d3d11(), width, height, &depths);
    let commands = hierarchy_commands(&d3d11);
    assert_eq!(count(commands, is_transition), 0);
    assert_eq!(count(commands, is_draw), mip_count - 1);

    // Vulkan copies depth with a draw instead of a texture copy.
    let vulkan = run(SoftDeviceConfig::vulkan(), width, height, &depths);
    let commands = hierarchy_commands(&vulkan);
    assert_eq!(count(commands, is_copy), 0);
    assert_eq!(count(commands, is_draw), mip_count);

    // Without views every mip is mirrored into the intermediate chain.
    let opengl = run(SoftDeviceConfig::opengl(), width, height, &depths);
    let commands = hierarchy_commands(&opengl);
    assert_eq!(count(commands, is_transition), 0);
    assert_eq!(count(commands, is_update), mip_count - 1);
    assert_eq!(count(commands, is_copy), mip_count);
    assert_eq!(count(commands, is_draw), mip_count);
}
