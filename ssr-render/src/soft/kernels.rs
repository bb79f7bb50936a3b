//! Reference pixel kernels, one per pixel-shader entry point of the WGSL sources.

use std::collections::HashMap;

use bytemuck::Pod;
use glam::{IVec2, Mat4, UVec2, Vec2, Vec3, Vec3Swizzles, Vec4, Vec4Swizzles};
use ssr_gpu_shared::shaders::SUPPORTED_SHADER_SRV;
use ssr_gpu_shared::uniforms::{
    BlueNoiseAttribs, CameraAttribs, CameraAttribsPair, ScreenSpaceReflectionAttribs,
    TextureMipAttribs,
};

use super::texture::SampledTexture;
use crate::graphics::ShaderCreateInfo;

pub const MAX_RENDER_TARGETS: usize = 4;

pub type KernelOutput = [Vec4; MAX_RENDER_TARGETS];

/// `None` discards the pixel.
pub type PixelKernel = fn(&PixelInput) -> Option<KernelOutput>;

/// Resources visible to a draw, keyed by shader variable name.
#[derive(Debug, Default)]
pub struct DrawResources {
    pub textures: HashMap<String, SampledTexture>,
    pub buffers: HashMap<String, Vec<u8>>,
}

pub struct PixelInput<'a> {
    pub x: u32,
    pub y: u32,
    resources: &'a DrawResources,
}

impl<'a> PixelInput<'a> {
    pub fn new(x: u32, y: u32, resources: &'a DrawResources) -> Self {
        Self { x, y, resources }
    }

    pub fn location(&self) -> IVec2 {
        IVec2::new(self.x as i32, self.y as i32)
    }

    pub fn load(&self, name: &str, location: IVec2, mip: u32) -> Vec4 {
        self.resources
            .textures
            .get(name)
            .map(|t| t.load(location, mip))
            .unwrap_or(Vec4::ZERO)
    }

    pub fn dimensions(&self, name: &str, mip: u32) -> UVec2 {
        self.resources
            .textures
            .get(name)
            .map(|t| t.dimensions(mip))
            .unwrap_or(UVec2::ZERO)
    }

    pub fn num_levels(&self, name: &str) -> u32 {
        self.resources
            .textures
            .get(name)
            .map(|t| t.num_levels())
            .unwrap_or(0)
    }

    /// Reads a uniform block; missing or short buffers read as zero.
    pub fn uniform<T: Pod>(&self, name: &str) -> T {
        let size = std::mem::size_of::<T>();
        match self.resources.buffers.get(name) {
            Some(bytes) if bytes.len() >= size => bytemuck::pod_read_unaligned(&bytes[..size]),
            _ => T::zeroed(),
        }
    }
}

/// Kernel implementing the pixel shader described by `info`.
pub fn resolve(info: &ShaderCreateInfo) -> Option<PixelKernel> {
    let kernel: PixelKernel = match info.entry_point.as_str() {
        "copy_depth_ps" => copy_depth,
        "compute_hierarchical_depth_buffer_ps" => {
            let views = info
                .macro_value(SUPPORTED_SHADER_SRV)
                .is_some_and(|v| !v.trim().is_empty() && v.trim() != "0");
            if views {
                hierarchical_depth_from_last_mip
            } else {
                hierarchical_depth_from_mips
            }
        }
        "compute_stencil_mask_and_extract_roughness_ps" => stencil_mask_and_roughness,
        "compute_intersection_ps" => intersection,
        "compute_spatial_reconstruction_ps" => spatial_reconstruction,
        "compute_temporal_accumulation_ps" => temporal_accumulation,
        "compute_bilateral_cleanup_ps" => bilateral_cleanup,
        "compute_blue_noise_texture_ps" => blue_noise,
        _ => return None,
    };
    Some(kernel)
}

fn outputs(values: &[Vec4]) -> KernelOutput {
    let mut out = [Vec4::ZERO; MAX_RENDER_TARGETS];
    for (slot, value) in out.iter_mut().zip(values) {
        *slot = *value;
    }
    out
}

fn scalar(v: f32) -> Vec4 {
    Vec4::new(v, 0.0, 0.0, 0.0)
}

// ============================================================================
// Shared math
// ============================================================================

const SSR_BACKGROUND_DEPTH: f32 = 1.0;
const SSR_DEPTH_SIMILARITY: f32 = 100.0;

fn luminance(color: Vec3) -> f32 {
    color.dot(Vec3::new(0.2126, 0.7152, 0.0722))
}

fn safe_normalize(v: Vec3) -> Vec3 {
    let len_sq = v.dot(v);
    if len_sq < 1e-8 {
        return Vec3::Z;
    }
    v / len_sq.sqrt()
}

fn extract_roughness(material: Vec4, attribs: &ScreenSpaceReflectionAttribs) -> f32 {
    let channel = attribs.roughness_channel.min(3) as usize;
    let roughness = material[channel];
    if attribs.is_roughness_perceptual != 0 {
        roughness * roughness
    } else {
        roughness
    }
}

fn linearize_depth(depth: f32, camera: &CameraAttribs) -> f32 {
    let range = camera.far_plane - depth * (camera.far_plane - camera.near_plane);
    camera.near_plane * camera.far_plane / range.max(1e-6)
}

fn depth_similarity(depth: f32, center_depth: f32) -> f32 {
    (-(depth - center_depth).abs() / center_depth.max(1e-4) * SSR_DEPTH_SIMILARITY).exp()
}

fn pixel_to_ndc(pixel: Vec2, size: Vec2) -> Vec2 {
    let uv = pixel / size;
    Vec2::new(uv.x * 2.0 - 1.0, 1.0 - uv.y * 2.0)
}

fn ndc_to_pixel(ndc: Vec2, size: Vec2) -> Vec2 {
    Vec2::new(ndc.x * 0.5 + 0.5, 0.5 - ndc.y * 0.5) * size
}

fn in_bounds(location: IVec2, size: IVec2) -> bool {
    location.x >= 0 && location.y >= 0 && location.x < size.x && location.y < size.y
}

fn reflect(incident: Vec3, normal: Vec3) -> Vec3 {
    incident - 2.0 * normal.dot(incident) * normal
}

// ============================================================================
// Kernels
// ============================================================================

fn copy_depth(input: &PixelInput) -> Option<KernelOutput> {
    let depth = input.load("g_TextureDepth", input.location(), 0).x;
    Some(outputs(&[scalar(depth)]))
}

/// Min of the 2x2 footprint in the previous mip, widened to 3 texels along odd dimensions.
fn hierarchical_depth(input: &PixelInput, source: &str, mip: u32) -> Option<KernelOutput> {
    let dimension = input.dimensions(source, mip);
    let location = UVec2::new(input.x * 2, input.y * 2);
    let sample = |offset: UVec2| {
        let position = location + offset;
        let position = if position.x >= dimension.x || position.y >= dimension.y {
            location
        } else {
            position
        };
        input.load(source, position.as_ivec2(), mip).x
    };

    let mut min_depth = sample(UVec2::new(0, 0))
        .min(sample(UVec2::new(0, 1)))
        .min(sample(UVec2::new(1, 0)).min(sample(UVec2::new(1, 1))));

    let width_odd = dimension.x & 1 != 0;
    let height_odd = dimension.y & 1 != 0;
    if width_odd {
        min_depth = min_depth.min(sample(UVec2::new(2, 0)).min(sample(UVec2::new(2, 1))));
    }
    if height_odd {
        min_depth = min_depth.min(sample(UVec2::new(0, 2)).min(sample(UVec2::new(1, 2))));
    }
    if width_odd && height_odd {
        min_depth = min_depth.min(sample(UVec2::new(2, 2)));
    }
    Some(outputs(&[scalar(min_depth)]))
}

fn hierarchical_depth_from_last_mip(input: &PixelInput) -> Option<KernelOutput> {
    hierarchical_depth(input, "g_TextureLastMip", 0)
}

fn hierarchical_depth_from_mips(input: &PixelInput) -> Option<KernelOutput> {
    let attribs: TextureMipAttribs = input.uniform("cbTextureMipAttribs");
    hierarchical_depth(input, "g_TextureMips", attribs.mip_index)
}

fn stencil_mask_and_roughness(input: &PixelInput) -> Option<KernelOutput> {
    let attribs: ScreenSpaceReflectionAttribs = input.uniform("cbScreenSpaceReflectionAttribs");
    let location = input.location();
    let depth = input.load("g_TextureDepth", location, 0).x;
    let roughness = extract_roughness(
        input.load("g_TextureMaterialParameters", location, 0),
        &attribs,
    );
    if depth >= SSR_BACKGROUND_DEPTH || roughness >= attribs.roughness_threshold {
        return None;
    }
    Some(outputs(&[scalar(roughness)]))
}

/// Mirror direction jittered inside a cone that widens with roughness; pdf in `w`.
fn sample_reflection_direction(
    view_dir: Vec3,
    normal: Vec3,
    roughness: f32,
    noise: Vec2,
    bias: f32,
) -> Vec4 {
    let reflected = reflect(view_dir, normal);
    let spread = roughness * (1.0 - bias.clamp(0.0, 1.0));
    let up = if reflected.z.abs() > 0.999 { Vec3::X } else { Vec3::Z };
    let tangent = up.cross(reflected).normalize();
    let bitangent = reflected.cross(tangent);
    let offset = (tangent * (noise.x * 2.0 - 1.0) + bitangent * (noise.y * 2.0 - 1.0)) * spread;
    let mut direction = (reflected + offset).normalize();
    if direction.dot(normal) <= 0.0 {
        direction = reflected;
    }
    direction.extend(1.0 / (1.0 + 4.0 * spread))
}

fn load_hierarchy(input: &PixelInput, position: Vec2, mip: u32) -> f32 {
    let dimension = input.dimensions("g_TextureDepthHierarchy", mip).as_ivec2();
    let p = position.as_ivec2();
    let location = IVec2::new(p.x >> mip, p.y >> mip).clamp(IVec2::ZERO, dimension - IVec2::ONE);
    input.load("g_TextureDepthHierarchy", location, mip).x
}

fn intersection(input: &PixelInput) -> Option<KernelOutput> {
    let camera = input.uniform::<CameraAttribsPair>("cbCameraAttribs").current;
    let attribs: ScreenSpaceReflectionAttribs = input.uniform("cbScreenSpaceReflectionAttribs");
    let size_i = input.dimensions("g_TextureRadiance", 0).as_ivec2();
    let size = size_i.as_vec2();
    let location = input.location();
    let pixel_center = location.as_vec2() + Vec2::splat(0.5);
    let mip = attribs
        .most_detailed_mip
        .min(input.num_levels("g_TextureDepthHierarchy").saturating_sub(1));

    let view = Mat4::from_cols_array_2d(&camera.view);
    let view_proj = Mat4::from_cols_array_2d(&camera.view_proj);
    let view_proj_inv = Mat4::from_cols_array_2d(&camera.view_proj_inv);

    let depth = input.load("g_TextureDepthHierarchy", location, 0).x;
    let ndc = pixel_to_ndc(pixel_center, size);
    let origin_h = view_proj_inv * Vec4::new(ndc.x, ndc.y, depth, 1.0);
    let origin_ws = origin_h.xyz() / origin_h.w;
    let normal = safe_normalize(input.load("g_TextureNormal", location, 0).xyz());
    let view_dir = safe_normalize(origin_ws - Vec4::from(camera.position).xyz());
    let roughness = input.load("g_TextureRoughness", location, 0).x;
    let noise = input
        .load("g_TextureBlueNoise", location & IVec2::splat(127), 0)
        .xy();
    let ray = sample_reflection_direction(
        view_dir,
        normal,
        roughness,
        noise,
        attribs.ggx_importance_sample_bias,
    );

    // Keep the ray end in front of the near plane so it projects.
    let origin_vs = (view * origin_ws.extend(1.0)).xyz();
    let direction_vs = (view * ray.xyz().extend(0.0)).xyz();
    let mut ray_length = camera.far_plane;
    if direction_vs.z > 0.0 {
        ray_length = ray_length.min(0.99 * (-camera.near_plane - origin_vs.z) / direction_vs.z);
    }
    ray_length = ray_length.max(0.0);
    let end_h = view_proj * (origin_ws + ray.xyz() * ray_length).extend(1.0);
    let end_ndc = end_h.xyz() / end_h.w;
    let start = pixel_center.extend(depth);
    let end = ndc_to_pixel(end_ndc.xy(), size).extend(end_ndc.z);

    let steps = attribs.max_traversal_intersections.max(1);
    let mut last_valid = pixel_center;
    let mut hit = false;
    for i in 1..=steps {
        let p = start + (end - start) * (i as f32 / steps as f32);
        if !in_bounds(p.xy().floor().as_ivec2(), size_i) {
            break;
        }
        last_valid = p.xy();
        let scene_depth = load_hierarchy(input, p.xy(), mip);
        if p.z >= scene_depth && p.z - scene_depth <= attribs.depth_buffer_thickness {
            hit = true;
            break;
        }
    }

    let radiance = input
        .load("g_TextureRadiance", last_valid.floor().as_ivec2(), 0)
        .xyz();
    Some(outputs(&[radiance.extend(if hit { 1.0 } else { 0.0 }), ray]))
}

const SSR_MAX_RECONSTRUCTION_RADIUS: i32 = 8;

fn spatial_reconstruction(input: &PixelInput) -> Option<KernelOutput> {
    let attribs: ScreenSpaceReflectionAttribs = input.uniform("cbScreenSpaceReflectionAttribs");
    let camera = input.uniform::<CameraAttribsPair>("cbCameraAttribs").current;
    let size = input.dimensions("g_TextureDepth", 0).as_ivec2();
    let location = input.location();
    let depth = input.load("g_TextureDepth", location, 0).x;
    let center_depth = linearize_depth(depth, &camera);
    let center_normal = safe_normalize(input.load("g_TextureNormal", location, 0).xyz());
    let roughness = input.load("g_TextureRoughness", location, 0).x;
    let radius = ((attribs.spatial_reconstruction_radius * roughness.max(0.0).sqrt()).ceil() as i32)
        .clamp(0, SSR_MAX_RECONSTRUCTION_RADIUS);

    let mut radiance_sum = Vec4::ZERO;
    let mut luma_sum = 0.0;
    let mut luma_sq_sum = 0.0;
    let mut weight_sum = 0.0;
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            let q = location + IVec2::new(dx, dy);
            if !in_bounds(q, size) {
                continue;
            }
            if input.load("g_TextureRayDirectionPDF", q, 0).w <= 0.0 {
                continue;
            }
            let depth_weight = depth_similarity(
                linearize_depth(input.load("g_TextureDepth", q, 0).x, &camera),
                center_depth,
            );
            let normal_weight = center_normal
                .dot(safe_normalize(input.load("g_TextureNormal", q, 0).xyz()))
                .max(0.0);
            let weight = depth_weight * normal_weight;
            let specular = input.load("g_TextureIntersectSpecular", q, 0);
            let luma = luminance(specular.xyz());
            radiance_sum += specular * weight;
            luma_sum += luma * weight;
            luma_sq_sum += luma * luma * weight;
            weight_sum += weight;
        }
    }

    let (radiance, variance) = if weight_sum <= 0.0 {
        (input.load("g_TextureIntersectSpecular", location, 0), 0.0)
    } else {
        let mean = luma_sum / weight_sum;
        (
            radiance_sum / weight_sum,
            (luma_sq_sum / weight_sum - mean * mean).max(0.0),
        )
    };
    Some(outputs(&[radiance, scalar(variance), scalar(depth)]))
}

const SSR_DISOCCLUSION_THRESHOLD: f32 = 0.01;

/// Clamp-to-edge bilinear fetch at a pixel-space position (texel centers at +0.5).
fn load_bilinear(input: &PixelInput, name: &str, position: Vec2) -> Vec4 {
    let size = input.dimensions(name, 0).as_ivec2();
    let coord = position - Vec2::splat(0.5);
    let base = coord.floor();
    let f = coord - base;
    let max = size - IVec2::ONE;
    let p0 = base.as_ivec2().clamp(IVec2::ZERO, max);
    let p1 = (base.as_ivec2() + IVec2::ONE).clamp(IVec2::ZERO, max);
    let a = input.load(name, p0, 0);
    let b = input.load(name, IVec2::new(p1.x, p0.y), 0);
    let c = input.load(name, IVec2::new(p0.x, p1.y), 0);
    let d = input.load(name, p1, 0);
    (a * (1.0 - f.x) + b * f.x) * (1.0 - f.y) + (c * (1.0 - f.x) + d * f.x) * f.y
}

fn temporal_accumulation(input: &PixelInput) -> Option<KernelOutput> {
    let attribs: ScreenSpaceReflectionAttribs = input.uniform("cbScreenSpaceReflectionAttribs");
    let cameras: CameraAttribsPair = input.uniform("cbCameraAttribs");
    let size = input.dimensions("g_TextureCurrRadiance", 0).as_vec2();
    let location = input.location();
    let curr_radiance = input.load("g_TextureCurrRadiance", location, 0);
    let curr_variance = input.load("g_TextureCurrVariance", location, 0).x;
    let curr_depth = input.load("g_TextureCurrDepth", location, 0).x;
    let hit_depth = input.load("g_TextureHitDepth", location, 0).x;
    let roughness = input.load("g_TextureRoughness", location, 0).x;
    let motion = input.load("g_TextureMotion", location, 0).xy();

    let current = Some(outputs(&[curr_radiance, scalar(curr_variance)]));

    let prev_position = location.as_vec2() + Vec2::splat(0.5) - motion * size;
    if prev_position.x < 0.0
        || prev_position.y < 0.0
        || prev_position.x > size.x
        || prev_position.y > size.y
    {
        return current;
    }

    let prev_depth = load_bilinear(input, "g_TexturePrevDepth", prev_position).x;
    let curr_linear = linearize_depth(curr_depth, &cameras.current);
    let prev_linear = linearize_depth(prev_depth, &cameras.previous);
    if (prev_linear - curr_linear).abs() > SSR_DISOCCLUSION_THRESHOLD * curr_linear {
        return current;
    }

    let parallax = (1.0 - (hit_depth - curr_depth).abs() * SSR_DEPTH_SIMILARITY).clamp(0.0, 1.0);
    let glossiness = (roughness / attribs.roughness_threshold.max(1e-4)).clamp(0.0, 1.0);
    let history_scale = parallax * (0.75 + 0.25 * glossiness);

    let prev_radiance = load_bilinear(input, "g_TexturePrevRadiance", prev_position);
    let prev_variance = load_bilinear(input, "g_TexturePrevVariance", prev_position).x;
    let radiance = curr_radiance
        + (prev_radiance - curr_radiance)
            * (attribs.temporal_radiance_stability_factor * history_scale);
    let variance = curr_variance
        + (prev_variance - curr_variance)
            * (attribs.temporal_variance_stability_factor * history_scale);
    Some(outputs(&[radiance, scalar(variance)]))
}

const SSR_BILATERAL_RADIUS: i32 = 2;

fn bilateral_cleanup(input: &PixelInput) -> Option<KernelOutput> {
    let attribs: ScreenSpaceReflectionAttribs = input.uniform("cbScreenSpaceReflectionAttribs");
    let camera = input.uniform::<CameraAttribsPair>("cbCameraAttribs").current;
    let size = input.dimensions("g_TextureRadiance", 0).as_ivec2();
    let location = input.location();
    let center_depth = linearize_depth(input.load("g_TextureDepth", location, 0).x, &camera);
    let center_normal = safe_normalize(input.load("g_TextureNormal", location, 0).xyz());
    let roughness = input.load("g_TextureRoughness", location, 0).x;
    let variance = input.load("g_TextureVariance", location, 0).x;
    let sigma = (attribs.bilateral_cleanup_spatial_sigma_factor
        * (1.0 + 4.0 * roughness)
        * (1.0 + variance.max(0.0).sqrt()))
    .max(1e-3);

    let mut radiance_sum = Vec4::ZERO;
    let mut weight_sum = 0.0;
    for dy in -SSR_BILATERAL_RADIUS..=SSR_BILATERAL_RADIUS {
        for dx in -SSR_BILATERAL_RADIUS..=SSR_BILATERAL_RADIUS {
            let q = location + IVec2::new(dx, dy);
            if !in_bounds(q, size) {
                continue;
            }
            let spatial_weight = (-((dx * dx + dy * dy) as f32) / (2.0 * sigma * sigma)).exp();
            let depth_weight = depth_similarity(
                linearize_depth(input.load("g_TextureDepth", q, 0).x, &camera),
                center_depth,
            );
            let normal_weight = center_normal
                .dot(safe_normalize(input.load("g_TextureNormal", q, 0).xyz()))
                .max(0.0)
                .powf(8.0);
            let weight = spatial_weight * depth_weight * normal_weight;
            radiance_sum += input.load("g_TextureRadiance", q, 0) * weight;
            weight_sum += weight;
        }
    }

    if weight_sum <= 0.0 {
        return Some(outputs(&[input.load("g_TextureRadiance", location, 0)]));
    }
    Some(outputs(&[radiance_sum / weight_sum]))
}

fn sample_random_number(
    input: &PixelInput,
    pixel_i: u32,
    pixel_j: u32,
    sample_index: u32,
    sample_dimension: u32,
) -> f32 {
    let i = pixel_i & 127;
    let j = pixel_j & 127;
    let s = sample_index & 255;
    let d = sample_dimension & 255;

    let sobol_index = d + s * 256;
    let sobol = input
        .load(
            "g_SobolBuffer",
            IVec2::new((sobol_index % 256) as i32, (sobol_index / 256) as i32),
            0,
        )
        .x as u32;
    let scrambling_index = (d % 8) + (i + j * 128) * 8;
    let scrambling = input
        .load(
            "g_ScramblingTileBuffer",
            IVec2::new((scrambling_index % 512) as i32, (scrambling_index / 512) as i32),
            0,
        )
        .x as u32;
    (0.5 + (sobol ^ scrambling) as f32) / 256.0
}

fn blue_noise(input: &PixelInput) -> Option<KernelOutput> {
    let frame = input.uniform::<BlueNoiseAttribs>("cbBlueNoiseAttribs").frame_index;
    let (x, y) = (input.x, input.y);
    let xy = Vec4::new(
        sample_random_number(input, x, y, frame, 0),
        sample_random_number(input, x, y, frame, 1),
        0.0,
        0.0,
    );
    let zw = Vec4::new(
        sample_random_number(input, x, y, frame, 2),
        sample_random_number(input, x, y, frame, 3),
        0.0,
        0.0,
    );
    Some(outputs(&[xy, zw]))
}
