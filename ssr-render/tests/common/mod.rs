#![allow(dead_code)]

use glam::{Mat4, Vec3, Vec4};
use ssr_render::graphics::{BindFlags, RenderDevice, RenderStateCache, Texture, TextureDesc, TextureFormat};
use ssr_render::soft::{SoftContext, SoftDevice, SoftDeviceConfig};
use ssr_render::{
    CameraAttribs, CameraSource, PostFxContext, PostFxRenderAttributes, PostFxResult,
    ScreenSpaceReflection, ScreenSpaceReflectionAttribs, SsrRenderAttributes,
};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// G-buffer contents of one pixel.
#[derive(Clone, Copy, Debug)]
pub struct Pixel {
    pub color: Vec4,
    pub depth: f32,
    pub normal: Vec3,
    /// Perceptual roughness, stored in the red channel.
    pub roughness: f32,
    pub motion: [f32; 2],
}

impl Default for Pixel {
    fn default() -> Self {
        Self {
            color: Vec4::new(0.5, 0.4, 0.3, 1.0),
            depth: 0.5,
            normal: Vec3::Z,
            roughness: 0.3,
            motion: [0.0; 2],
        }
    }
}

pub struct GBuffer {
    pub width: u32,
    pub height: u32,
    pub color: Texture,
    pub depth: Texture,
    pub normal: Texture,
    pub material: Texture,
    pub motion: Texture,
}

fn texture(
    device: &SoftDevice,
    name: &str,
    (width, height): (u32, u32),
    format: TextureFormat,
    flags: BindFlags,
) -> Texture {
    device
        .create_texture(&TextureDesc::new_2d(name, width, height, format, flags), None)
        .unwrap()
}

impl GBuffer {
    pub fn new(device: &SoftDevice, width: u32, height: u32, scene: impl Fn(u32, u32) -> Pixel) -> Self {
        let size = (width, height);
        let color_flags = BindFlags::SHADER_RESOURCE | BindFlags::RENDER_TARGET;
        let gbuffer = Self {
            width,
            height,
            color: texture(device, "GBuffer::Color", size, TextureFormat::Rgba16Float, color_flags),
            depth: texture(
                device,
                "GBuffer::Depth",
                size,
                TextureFormat::D32Float,
                BindFlags::SHADER_RESOURCE | BindFlags::DEPTH_STENCIL,
            ),
            normal: texture(device, "GBuffer::Normal", size, TextureFormat::Rgba16Float, color_flags),
            material: texture(device, "GBuffer::Material", size, TextureFormat::Rgba8Unorm, color_flags),
            motion: texture(device, "GBuffer::Motion", size, TextureFormat::Rg16Float, color_flags),
        };
        gbuffer.fill(device, scene);
        gbuffer
    }

    pub fn fill(&self, device: &SoftDevice, scene: impl Fn(u32, u32) -> Pixel) {
        let pixels: Vec<Pixel> = (0..self.height)
            .flat_map(|y| (0..self.width).map(move |x| (x, y)))
            .map(|(x, y)| scene(x, y))
            .collect();
        let column = |f: &dyn Fn(&Pixel) -> Vec4| pixels.iter().map(f).collect::<Vec<_>>();
        device.write_texture(&self.color, 0, &column(&|p| p.color)).unwrap();
        device.write_texture(&self.depth, 0, &column(&|p| Vec4::splat(p.depth))).unwrap();
        device.write_texture(&self.normal, 0, &column(&|p| p.normal.extend(0.0))).unwrap();
        device
            .write_texture(&self.material, 0, &column(&|p| Vec4::new(p.roughness, 0.0, 0.0, 1.0)))
            .unwrap();
        device
            .write_texture(&self.motion, 0, &column(&|p| Vec4::new(p.motion[0], p.motion[1], 0.0, 0.0)))
            .unwrap();
    }
}

pub fn camera(width: u32, height: u32) -> CameraAttribs {
    let eye = Vec3::ZERO;
    let view = Mat4::look_at_rh(eye, Vec3::NEG_Z, Vec3::Y);
    let proj = Mat4::perspective_rh(1.0, width as f32 / height as f32, 0.1, 100.0);
    CameraAttribs::new(eye, view, proj, (width, height), 0.1, 100.0)
}

/// Reflective on the left half, rough on the right half, flat depth.
pub fn half_reflective(width: u32) -> impl Fn(u32, u32) -> Pixel {
    move |x, y| Pixel {
        color: Vec4::new(0.2 + 0.05 * (x % 8) as f32, 0.3 + 0.05 * (y % 8) as f32, 0.6, 1.0),
        roughness: if x < width / 2 { 0.3 } else { 0.9 },
        ..Pixel::default()
    }
}

pub struct Fixture {
    pub device: SoftDevice,
    pub context: SoftContext,
    pub postfx: PostFxContext,
    pub ssr: ScreenSpaceReflection,
    pub gbuffer: GBuffer,
    pub camera: CameraAttribs,
    pub attribs: ScreenSpaceReflectionAttribs,
}

impl Fixture {
    pub fn new(
        config: SoftDeviceConfig,
        width: u32,
        height: u32,
        scene: impl Fn(u32, u32) -> Pixel,
    ) -> Self {
        init_logging();
        let device = SoftDevice::new(config);
        let mut context = device.create_context();
        let postfx = PostFxContext::new(&device).unwrap();
        let mut ssr = ScreenSpaceReflection::new(&device).unwrap();
        ssr.set_back_buffer_size(&device, &mut context, width, height)
            .unwrap();
        let gbuffer = GBuffer::new(&device, width, height, scene);
        Self {
            device,
            context,
            postfx,
            ssr,
            gbuffer,
            camera: camera(width, height),
            attribs: ScreenSpaceReflectionAttribs::default(),
        }
    }

    pub fn prepare(&mut self, frame_index: u32, cache: Option<&RenderStateCache>) -> PostFxResult<()> {
        let attribs = PostFxRenderAttributes {
            state_cache: cache,
            frame_index,
            camera: CameraSource::Attribs {
                current: &self.camera,
                previous: &self.camera,
            },
        };
        self.postfx
            .prepare_resources(&self.device, &mut self.context, &attribs)
    }

    pub fn execute(&mut self, cache: Option<&RenderStateCache>) -> PostFxResult<()> {
        let color = self.gbuffer.color.default_srv()?;
        let depth = self.gbuffer.depth.default_srv()?;
        let normal = self.gbuffer.normal.default_srv()?;
        let material = self.gbuffer.material.default_srv()?;
        let motion = self.gbuffer.motion.default_srv()?;
        let attribs = SsrRenderAttributes {
            state_cache: cache,
            postfx: &self.postfx,
            color: &color,
            depth: &depth,
            normal: &normal,
            material_parameters: &material,
            motion_vectors: &motion,
            ssr_attribs: &self.attribs,
        };
        self.ssr.execute(&self.device, &mut self.context, &attribs)
    }

    /// Prepares the PostFX context for `frame_index` and runs the effect.
    pub fn render_frame(&mut self, frame_index: u32) -> PostFxResult<()> {
        self.prepare(frame_index, None)?;
        self.execute(None)
    }

    pub fn output(&self) -> Vec<Vec4> {
        let output = self.ssr.output_srv().unwrap();
        self.device.read_texture(output.texture(), 0).unwrap()
    }
}
