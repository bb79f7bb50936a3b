//! Screen-space reflections: hierarchical depth, stencil-gated ray marching,
//! spatial and temporal denoising, bilateral cleanup.

mod passes;

use ssr_gpu_shared::shaders::{files, SUPPORTED_SHADER_SRV};
use ssr_gpu_shared::uniforms::{
    ScreenSpaceReflectionAttribs, TextureMipAttribs, SSR_DEPTH_HIERARCHY_MAX_MIP,
};

use crate::error::{PostFxError, PostFxResult};
use crate::features::SupportedFeatures;
use crate::graphics::{
    compute_mip_levels_count, with_debug_group, BindFlags, BlendStateDesc, Buffer, BufferDesc,
    DepthStencilStateDesc, DeviceContext, GraphicsPipelineDesc, PipelineResourceLayoutDesc,
    RenderDevice, RenderStateCache, SamplerDesc, ShaderResourceVariableType, ShaderType,
    Texture, TextureDesc, TextureFormat, TextureView, TextureViewDesc, TextureViewType,
};
use crate::postfx_context::{BlueNoiseDimension, PostFxContext};
use crate::render_technique::RenderTechnique;
use crate::resource_registry::{ResourceRegistry, SlotId};

/// Resources owned by the effect.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SsrResource {
    ConstantBuffer,
    IntermediateConstantBuffer,
    DepthHierarchy,
    DepthHierarchyIntermediate,
    Roughness,
    DepthStencilMask,
    Radiance,
    RayDirectionPdf,
    ResolvedRadiance,
    ResolvedVariance,
    ResolvedDepth,
    RadianceHistory0,
    RadianceHistory1,
    VarianceHistory0,
    VarianceHistory1,
    DepthHistory,
    Output,
}

impl SlotId for SsrResource {
    const COUNT: usize = 17;

    fn index(self) -> usize {
        self as usize
    }
}

impl SsrResource {
    /// Radiance history slot for the given frame parity.
    pub fn radiance_history(parity: u32) -> Self {
        if parity & 1 == 0 {
            Self::RadianceHistory0
        } else {
            Self::RadianceHistory1
        }
    }

    pub fn variance_history(parity: u32) -> Self {
        if parity & 1 == 0 {
            Self::VarianceHistory0
        } else {
            Self::VarianceHistory1
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SsrTechnique {
    CopyDepth,
    ComputeHierarchicalDepthBuffer,
    ComputeStencilMaskAndExtractRoughness,
    ComputeIntersection,
    ComputeSpatialReconstruction,
    ComputeTemporalAccumulation,
    ComputeBilateralCleanup,
}

const TECHNIQUE_COUNT: usize = 7;

const ALL_TECHNIQUES: [SsrTechnique; TECHNIQUE_COUNT] = [
    SsrTechnique::CopyDepth,
    SsrTechnique::ComputeHierarchicalDepthBuffer,
    SsrTechnique::ComputeStencilMaskAndExtractRoughness,
    SsrTechnique::ComputeIntersection,
    SsrTechnique::ComputeSpatialReconstruction,
    SsrTechnique::ComputeTemporalAccumulation,
    SsrTechnique::ComputeBilateralCleanup,
];

/// Per-texture allocation entry: slot, name suffix, format.
const PER_RESOLUTION_TARGETS: [(SsrResource, &str, TextureFormat); 12] = [
    (SsrResource::Roughness, "Roughness", TextureFormat::R8Unorm),
    (SsrResource::Radiance, "Radiance", TextureFormat::Rgba16Float),
    (SsrResource::RayDirectionPdf, "RayDirectionPDF", TextureFormat::Rgba16Float),
    (SsrResource::ResolvedRadiance, "ResolvedRadiance", TextureFormat::Rgba16Float),
    (SsrResource::ResolvedVariance, "ResolvedVariance", TextureFormat::R16Float),
    (SsrResource::ResolvedDepth, "ResolvedDepth", TextureFormat::R16Float),
    (SsrResource::RadianceHistory0, "RadianceHistory0", TextureFormat::Rgba16Float),
    (SsrResource::RadianceHistory1, "RadianceHistory1", TextureFormat::Rgba16Float),
    (SsrResource::VarianceHistory0, "VarianceHistory0", TextureFormat::R16Float),
    (SsrResource::VarianceHistory1, "VarianceHistory1", TextureFormat::R16Float),
    (SsrResource::DepthHistory, "DepthHistory", TextureFormat::R32Float),
    (SsrResource::Output, "Output", TextureFormat::Rgba16Float),
];

const HISTORY_TARGETS: [SsrResource; 5] = [
    SsrResource::RadianceHistory0,
    SsrResource::RadianceHistory1,
    SsrResource::VarianceHistory0,
    SsrResource::VarianceHistory1,
    SsrResource::DepthHistory,
];

/// G-buffer inputs and settings of one frame. Every view must be a shader
/// resource view with the back-buffer extent.
pub struct SsrRenderAttributes<'a> {
    pub state_cache: Option<&'a RenderStateCache>,
    pub postfx: &'a PostFxContext,
    pub color: &'a TextureView,
    /// Depth in [0, 1], 1 at the far plane.
    pub depth: &'a TextureView,
    /// World-space normals in [-1, 1].
    pub normal: &'a TextureView,
    /// Roughness lives in the channel selected by `ssr_attribs.roughness_channel`.
    pub material_parameters: &'a TextureView,
    /// Screen-space motion in UV units, current minus previous position.
    pub motion_vectors: &'a TextureView,
    pub ssr_attribs: &'a ScreenSpaceReflectionAttribs,
}

impl SsrRenderAttributes<'_> {
    fn inputs(&self) -> [(&'static str, &TextureView); 5] {
        [
            ("color", self.color),
            ("depth", self.depth),
            ("normal", self.normal),
            ("material_parameters", self.material_parameters),
            ("motion_vectors", self.motion_vectors),
        ]
    }
}

/// Frame data resolved after validation and shared by every pass.
struct FrameInputs<'a> {
    state_cache: Option<&'a RenderStateCache>,
    camera_cb: Buffer,
    blue_noise: TextureView,
    color: &'a TextureView,
    depth: &'a TextureView,
    normal: &'a TextureView,
    material_parameters: &'a TextureView,
    motion_vectors: &'a TextureView,
    frame_index: u32,
}

struct TechniqueDesc {
    name: &'static str,
    file: &'static str,
    entry_point: &'static str,
    macros: Vec<(&'static str, String)>,
    layout: PipelineResourceLayoutDesc,
    depth_stencil: DepthStencilStateDesc,
    read_only_dsv: bool,
}

impl TechniqueDesc {
    /// Pass restricted to pixels tagged by the stencil mask.
    fn stencil_gated(
        name: &'static str,
        file: &'static str,
        entry_point: &'static str,
        layout: PipelineResourceLayoutDesc,
    ) -> Self {
        Self {
            name,
            file,
            entry_point,
            macros: Vec::new(),
            layout,
            depth_stencil: DepthStencilStateDesc::STENCIL_READ_COMPARISON_EQUAL,
            read_only_dsv: true,
        }
    }
}

/// Resolution-dependent targets created by one resize, not yet committed.
struct SizedTargets {
    textures: Vec<(SsrResource, Texture)>,
    hierarchy_mip_rtvs: Vec<TextureView>,
    hierarchy_mip_srvs: Vec<TextureView>,
    depth_stencil_mask_dsv_read_only: TextureView,
}

pub struct ScreenSpaceReflection {
    resources: ResourceRegistry<SsrResource>,
    techniques: [RenderTechnique; TECHNIQUE_COUNT],
    features: SupportedFeatures,
    depth_stencil_format: TextureFormat,
    back_buffer_size: Option<(u32, u32)>,
    hierarchy_mip_rtvs: Vec<TextureView>,
    hierarchy_mip_srvs: Vec<TextureView>,
    depth_stencil_mask_dsv_read_only: Option<TextureView>,
    bound_camera_cb: Option<Buffer>,
}

impl ScreenSpaceReflection {
    pub fn new(device: &dyn RenderDevice) -> PostFxResult<Self> {
        Self::with_features(device, SupportedFeatures::probe(&device.device_info()))
    }

    /// Uses `features` instead of probing the device, to force an algorithm path.
    pub fn with_features(
        device: &dyn RenderDevice,
        features: SupportedFeatures,
    ) -> PostFxResult<Self> {
        let mut resources = ResourceRegistry::new();

        let attribs = ScreenSpaceReflectionAttribs::default();
        resources.insert(
            SsrResource::ConstantBuffer,
            device.create_buffer(
                &BufferDesc::uniform(
                    "ScreenSpaceReflection::ConstantBuffer",
                    std::mem::size_of::<ScreenSpaceReflectionAttribs>() as u64,
                ),
                Some(bytemuck::bytes_of(&attribs)),
            )?,
        );

        if !features.uses_mip_views() {
            resources.insert(
                SsrResource::IntermediateConstantBuffer,
                device.create_buffer(
                    &BufferDesc::uniform(
                        "ScreenSpaceReflection::IntermediateConstantBuffer",
                        std::mem::size_of::<TextureMipAttribs>() as u64,
                    ),
                    Some(bytemuck::bytes_of(&TextureMipAttribs::default())),
                )?,
            );
        }

        let d24s8 = device.texture_format_info(TextureFormat::D24UnormS8Uint);
        let depth_stencil_format = if d24s8.supported && d24s8.bind_flags.contains(BindFlags::DEPTH_STENCIL)
        {
            TextureFormat::D24UnormS8Uint
        } else {
            TextureFormat::D32FloatS8X24Uint
        };

        Ok(Self {
            resources,
            techniques: std::array::from_fn(|_| RenderTechnique::new()),
            features,
            depth_stencil_format,
            back_buffer_size: None,
            hierarchy_mip_rtvs: Vec::new(),
            hierarchy_mip_srvs: Vec::new(),
            depth_stencil_mask_dsv_read_only: None,
            bound_camera_cb: None,
        })
    }

    /// (Re)allocates every per-resolution resource. Repeating the current size is a no-op.
    pub fn set_back_buffer_size(
        &mut self,
        device: &dyn RenderDevice,
        context: &mut dyn DeviceContext,
        width: u32,
        height: u32,
    ) -> PostFxResult<()> {
        if width == 0 || height == 0 {
            return Err(PostFxError::InvalidBackBufferSize { width, height });
        }
        if self.back_buffer_size == Some((width, height)) {
            return Ok(());
        }

        let mip_levels = compute_mip_levels_count(width, height).min(SSR_DEPTH_HIERARCHY_MAX_MIP + 1);
        log::info!(
            "allocating screen-space reflection targets: {width}x{height}, {mip_levels} depth mips, {:?}",
            self.depth_stencil_format
        );

        // Nothing is committed until every target exists. The size stays unset until the
        // new histories are cleared.
        let targets = self.allocate_targets(device, width, height, mip_levels)?;
        self.back_buffer_size = None;
        self.hierarchy_mip_rtvs = targets.hierarchy_mip_rtvs;
        self.hierarchy_mip_srvs = targets.hierarchy_mip_srvs;
        self.depth_stencil_mask_dsv_read_only = Some(targets.depth_stencil_mask_dsv_read_only);
        for (slot, texture) in targets.textures {
            self.resources.insert(slot, texture);
        }

        // Histories start at zero so the first frame never blends stale data.
        with_debug_group(context, "ScreenSpaceReflection::ClearHistory", |context| {
            for slot in HISTORY_TARGETS {
                let rtv = self.resources.texture_rtv(slot)?;
                context.clear_render_target(&rtv, [0.0; 4])?;
            }
            Ok::<_, PostFxError>(())
        })?;

        // Target formats are constant per device; this only fires if that table changes.
        // A technique built for other formats is rebuilt on its next use.
        for technique in ALL_TECHNIQUES {
            let (rtv_formats, dsv_format) = self.technique_output_formats(technique)?;
            let state = &mut self.techniques[technique as usize];
            if state.is_initialized() && !state.matches_output_formats(&rtv_formats, dsv_format) {
                log::debug!("output formats of {technique:?} changed, rebuilding on next use");
                state.reset();
            }
        }

        self.back_buffer_size = Some((width, height));
        Ok(())
    }

    fn allocate_targets(
        &self,
        device: &dyn RenderDevice,
        width: u32,
        height: u32,
        mip_levels: u32,
    ) -> PostFxResult<SizedTargets> {
        let color_flags = BindFlags::SHADER_RESOURCE | BindFlags::RENDER_TARGET;
        let hierarchy_desc = |name: &str| {
            TextureDesc::new_2d(name, width, height, TextureFormat::R32Float, color_flags)
                .with_mip_levels(mip_levels)
        };
        let mut textures = Vec::with_capacity(PER_RESOLUTION_TARGETS.len() + 3);

        let hierarchy =
            device.create_texture(&hierarchy_desc("ScreenSpaceReflection::DepthHierarchy"), None)?;
        let hierarchy_mip_rtvs = (0..mip_levels)
            .map(|mip| hierarchy.view(TextureViewDesc::mip(TextureViewType::RenderTarget, mip)))
            .collect::<Result<_, _>>()?;
        let hierarchy_mip_srvs = if self.features.uses_mip_views() {
            (0..mip_levels)
                .map(|mip| {
                    hierarchy.view(TextureViewDesc::mip(TextureViewType::ShaderResource, mip))
                })
                .collect::<Result<_, _>>()?
        } else {
            let intermediate = device.create_texture(
                &hierarchy_desc("ScreenSpaceReflection::DepthHierarchyIntermediate"),
                None,
            )?;
            textures.push((SsrResource::DepthHierarchyIntermediate, intermediate));
            Vec::new()
        };
        textures.push((SsrResource::DepthHierarchy, hierarchy));

        let mask = device.create_texture(
            &TextureDesc::new_2d(
                "ScreenSpaceReflection::DepthStencilMask",
                width,
                height,
                self.depth_stencil_format,
                BindFlags::DEPTH_STENCIL,
            ),
            None,
        )?;
        let depth_stencil_mask_dsv_read_only = mask.read_only_dsv()?;
        textures.push((SsrResource::DepthStencilMask, mask));

        for (slot, name, format) in PER_RESOLUTION_TARGETS {
            let desc = TextureDesc::new_2d(
                format!("ScreenSpaceReflection::{name}"),
                width,
                height,
                format,
                color_flags,
            );
            textures.push((slot, device.create_texture(&desc, None)?));
        }

        Ok(SizedTargets {
            textures,
            hierarchy_mip_rtvs,
            hierarchy_mip_srvs,
            depth_stencil_mask_dsv_read_only,
        })
    }

    /// Runs the six passes for one frame.
    pub fn execute(
        &mut self,
        device: &dyn RenderDevice,
        context: &mut dyn DeviceContext,
        attribs: &SsrRenderAttributes,
    ) -> PostFxResult<()> {
        let (width, height) = self.back_buffer_size.ok_or(PostFxError::BackBufferNotSized)?;
        if !attribs.postfx.is_prepared() {
            return Err(PostFxError::PostFxNotPrepared);
        }
        let camera_cb = attribs
            .postfx
            .camera_attribs_cb()
            .ok_or(PostFxError::PostFxNotPrepared)?
            .clone();
        let blue_noise = attribs.postfx.blue_noise_srv(BlueNoiseDimension::Xy)?;

        for (input, view) in attribs.inputs() {
            if view.view_type() != TextureViewType::ShaderResource {
                return Err(PostFxError::InputNotShaderResource {
                    input,
                    found: view.view_type(),
                });
            }
            let (w, h) = view.extent();
            if (w, h) != (width, height) {
                return Err(PostFxError::InputExtentMismatch {
                    input,
                    width: w,
                    height: h,
                    expected_width: width,
                    expected_height: height,
                });
            }
        }

        self.refresh_camera_bindings(&camera_cb)?;

        let frame = FrameInputs {
            state_cache: attribs.state_cache,
            camera_cb,
            blue_noise,
            color: attribs.color,
            depth: attribs.depth,
            normal: attribs.normal,
            material_parameters: attribs.material_parameters,
            motion_vectors: attribs.motion_vectors,
            frame_index: attribs.postfx.frame_index(),
        };
        log::trace!(
            "screen-space reflections, frame {} ({}x{})",
            frame.frame_index,
            width,
            height
        );

        with_debug_group(context, "ScreenSpaceReflection", |context| {
            let constants = self.resources.require_buffer(SsrResource::ConstantBuffer)?;
            context.update_buffer(constants, 0, bytemuck::bytes_of(attribs.ssr_attribs))?;

            self.compute_hierarchical_depth_buffer(device, context, &frame)?;
            self.compute_stencil_mask_and_extract_roughness(device, context, &frame)?;
            self.compute_intersection(device, context, &frame)?;
            self.compute_spatial_reconstruction(device, context, &frame)?;
            self.compute_temporal_accumulation(device, context, &frame)?;
            self.compute_bilateral_cleanup(device, context, &frame)?;
            Ok(())
        })
    }

    /// Final reflection color of the last executed frame.
    pub fn output_srv(&self) -> PostFxResult<TextureView> {
        self.resources.texture_srv(SsrResource::Output)
    }

    pub fn supported_features(&self) -> &SupportedFeatures {
        &self.features
    }

    pub fn resources(&self) -> &ResourceRegistry<SsrResource> {
        &self.resources
    }

    pub fn back_buffer_size(&self) -> Option<(u32, u32)> {
        self.back_buffer_size
    }

    pub fn depth_hierarchy_mip_count(&self) -> u32 {
        self.hierarchy_mip_rtvs.len() as u32
    }

    pub fn depth_stencil_format(&self) -> TextureFormat {
        self.depth_stencil_format
    }

    /// Rebinds the camera constants when the PostFX context switched buffers.
    fn refresh_camera_bindings(&mut self, camera_cb: &Buffer) -> PostFxResult<()> {
        if self
            .bound_camera_cb
            .as_ref()
            .is_some_and(|bound| bound.ptr_eq(camera_cb))
        {
            return Ok(());
        }
        for technique in &mut self.techniques {
            if technique.static_variable("cbCameraAttribs").is_some() {
                technique.set_static_variable("cbCameraAttribs", camera_cb.clone())?;
            }
        }
        self.bound_camera_cb = Some(camera_cb.clone());
        Ok(())
    }

    fn technique_output_formats(
        &self,
        technique: SsrTechnique,
    ) -> PostFxResult<(Vec<TextureFormat>, TextureFormat)> {
        let format = |slot| -> PostFxResult<TextureFormat> {
            Ok(self.resources.require_texture(slot)?.desc().format)
        };
        let formats = match technique {
            SsrTechnique::CopyDepth | SsrTechnique::ComputeHierarchicalDepthBuffer => {
                (vec![format(SsrResource::DepthHierarchy)?], TextureFormat::Unknown)
            }
            SsrTechnique::ComputeStencilMaskAndExtractRoughness => (
                vec![format(SsrResource::Roughness)?],
                format(SsrResource::DepthStencilMask)?,
            ),
            SsrTechnique::ComputeIntersection => (
                vec![
                    format(SsrResource::Radiance)?,
                    format(SsrResource::RayDirectionPdf)?,
                ],
                format(SsrResource::DepthStencilMask)?,
            ),
            SsrTechnique::ComputeSpatialReconstruction => (
                vec![
                    format(SsrResource::ResolvedRadiance)?,
                    format(SsrResource::ResolvedVariance)?,
                    format(SsrResource::ResolvedDepth)?,
                ],
                format(SsrResource::DepthStencilMask)?,
            ),
            SsrTechnique::ComputeTemporalAccumulation => (
                vec![
                    format(SsrResource::RadianceHistory0)?,
                    format(SsrResource::VarianceHistory0)?,
                ],
                format(SsrResource::DepthStencilMask)?,
            ),
            SsrTechnique::ComputeBilateralCleanup => (
                vec![format(SsrResource::Output)?],
                format(SsrResource::DepthStencilMask)?,
            ),
        };
        Ok(formats)
    }

    fn technique_desc(&self, technique: SsrTechnique) -> TechniqueDesc {
        use ShaderResourceVariableType::{Dynamic, Static};

        let gated = TechniqueDesc::stencil_gated;
        let camera_and_attribs = || {
            PipelineResourceLayoutDesc::new()
                .add_variable("cbCameraAttribs", Static)
                .add_variable("cbScreenSpaceReflectionAttribs", Static)
        };

        match technique {
            SsrTechnique::CopyDepth => TechniqueDesc {
                name: "ScreenSpaceReflection::CopyDepth",
                file: files::COPY_DEPTH,
                entry_point: "copy_depth_ps",
                macros: Vec::new(),
                layout: PipelineResourceLayoutDesc::new().add_variable("g_TextureDepth", Dynamic),
                depth_stencil: DepthStencilStateDesc::DISABLE_DEPTH,
                read_only_dsv: false,
            },
            SsrTechnique::ComputeHierarchicalDepthBuffer => {
                let views = self.features.uses_mip_views();
                let layout = if views {
                    PipelineResourceLayoutDesc::new().add_variable("g_TextureLastMip", Dynamic)
                } else {
                    PipelineResourceLayoutDesc::new()
                        .add_variable("cbTextureMipAttribs", Static)
                        .add_variable("g_TextureMips", Dynamic)
                        .add_immutable_sampler("g_TextureMips", SamplerDesc::POINT_WRAP)
                };
                TechniqueDesc {
                    name: "ScreenSpaceReflection::ComputeHierarchicalDepthBuffer",
                    file: files::COMPUTE_HIERARCHICAL_DEPTH_BUFFER,
                    entry_point: "compute_hierarchical_depth_buffer_ps",
                    macros: vec![(SUPPORTED_SHADER_SRV, u32::from(views).to_string())],
                    layout,
                    depth_stencil: DepthStencilStateDesc::DISABLE_DEPTH,
                    read_only_dsv: false,
                }
            }
            SsrTechnique::ComputeStencilMaskAndExtractRoughness => TechniqueDesc {
                name: "ScreenSpaceReflection::ComputeStencilMaskAndExtractRoughness",
                file: files::COMPUTE_STENCIL_MASK_AND_EXTRACT_ROUGHNESS,
                entry_point: "compute_stencil_mask_and_extract_roughness_ps",
                macros: Vec::new(),
                layout: PipelineResourceLayoutDesc::new()
                    .add_variable("cbScreenSpaceReflectionAttribs", Static)
                    .add_variable("g_TextureDepth", Dynamic)
                    .add_variable("g_TextureMaterialParameters", Dynamic),
                depth_stencil: DepthStencilStateDesc::STENCIL_WRITE,
                read_only_dsv: false,
            },
            SsrTechnique::ComputeIntersection => {
                let mut layout = camera_and_attribs()
                    .add_variable("g_TextureRadiance", Dynamic)
                    .add_variable("g_TextureNormal", Dynamic)
                    .add_variable("g_TextureRoughness", Dynamic)
                    .add_variable("g_TextureBlueNoise", Dynamic)
                    .add_variable("g_TextureDepthHierarchy", Dynamic);
                if !self.features.uses_mip_views() {
                    layout = layout
                        .add_immutable_sampler("g_TextureDepthHierarchy", SamplerDesc::POINT_CLAMP);
                }
                gated(
                    "ScreenSpaceReflection::ComputeIntersection",
                    files::COMPUTE_INTERSECTION,
                    "compute_intersection_ps",
                    layout,
                )
            }
            SsrTechnique::ComputeSpatialReconstruction => gated(
                "ScreenSpaceReflection::ComputeSpatialReconstruction",
                files::COMPUTE_SPATIAL_RECONSTRUCTION,
                "compute_spatial_reconstruction_ps",
                camera_and_attribs()
                    .add_variable("g_TextureRoughness", Dynamic)
                    .add_variable("g_TextureNormal", Dynamic)
                    .add_variable("g_TextureDepth", Dynamic)
                    .add_variable("g_TextureRayDirectionPDF", Dynamic)
                    .add_variable("g_TextureIntersectSpecular", Dynamic),
            ),
            SsrTechnique::ComputeTemporalAccumulation => gated(
                "ScreenSpaceReflection::ComputeTemporalAccumulation",
                files::COMPUTE_TEMPORAL_ACCUMULATION,
                "compute_temporal_accumulation_ps",
                camera_and_attribs()
                    .add_variable("g_TextureMotion", Dynamic)
                    .add_variable("g_TextureRoughness", Dynamic)
                    .add_variable("g_TextureCurrRadiance", Dynamic)
                    .add_variable("g_TextureCurrDepth", Dynamic)
                    .add_variable("g_TextureCurrVariance", Dynamic)
                    .add_variable("g_TexturePrevRadiance", Dynamic)
                    .add_variable("g_TexturePrevDepth", Dynamic)
                    .add_variable("g_TexturePrevVariance", Dynamic)
                    .add_variable("g_TextureHitDepth", Dynamic)
                    .add_immutable_sampler("g_TexturePrevRadiance", SamplerDesc::LINEAR_CLAMP)
                    .add_immutable_sampler("g_TexturePrevDepth", SamplerDesc::LINEAR_CLAMP)
                    .add_immutable_sampler("g_TexturePrevVariance", SamplerDesc::LINEAR_CLAMP),
            ),
            SsrTechnique::ComputeBilateralCleanup => gated(
                "ScreenSpaceReflection::ComputeBilateralCleanup",
                files::COMPUTE_BILATERAL_CLEANUP,
                "compute_bilateral_cleanup_ps",
                camera_and_attribs()
                    .add_variable("g_TextureDepth", Dynamic)
                    .add_variable("g_TextureNormal", Dynamic)
                    .add_variable("g_TextureRoughness", Dynamic)
                    .add_variable("g_TextureRadiance", Dynamic)
                    .add_variable("g_TextureVariance", Dynamic),
            ),
        }
    }

    /// Builds the technique on first use and binds its static variables.
    fn prepare_technique(
        &mut self,
        device: &dyn RenderDevice,
        technique: SsrTechnique,
        frame: &FrameInputs,
    ) -> PostFxResult<()> {
        if self.techniques[technique as usize].is_initialized() {
            return Ok(());
        }

        let desc = self.technique_desc(technique);
        let (rtv_formats, dsv_format) = self.technique_output_formats(technique)?;

        let vs = RenderTechnique::create_shader(
            device,
            frame.state_cache,
            files::FULL_SCREEN_TRIANGLE,
            "full_screen_triangle_vs",
            ShaderType::Vertex,
            &[],
        )?;
        let ps = RenderTechnique::create_shader(
            device,
            frame.state_cache,
            desc.file,
            desc.entry_point,
            ShaderType::Pixel,
            &desc.macros,
        )?;

        let statics: Vec<(String, Buffer)> = desc
            .layout
            .variables
            .iter()
            .filter(|v| v.var_type == ShaderResourceVariableType::Static)
            .map(|v| {
                let buffer = match v.name.as_str() {
                    "cbCameraAttribs" => frame.camera_cb.clone(),
                    "cbScreenSpaceReflectionAttribs" => self
                        .resources
                        .require_buffer(SsrResource::ConstantBuffer)?
                        .clone(),
                    "cbTextureMipAttribs" => self
                        .resources
                        .require_buffer(SsrResource::IntermediateConstantBuffer)?
                        .clone(),
                    other => return Err(PostFxError::MissingResource(other.to_string())),
                };
                Ok((v.name.clone(), buffer))
            })
            .collect::<PostFxResult<_>>()?;

        let pipeline_desc = GraphicsPipelineDesc {
            name: desc.name.to_string(),
            vs,
            ps,
            layout: desc.layout,
            rtv_formats,
            dsv_format,
            depth_stencil: desc.depth_stencil,
            blend: BlendStateDesc::default(),
            read_only_dsv: desc.read_only_dsv,
        };

        let state = &mut self.techniques[technique as usize];
        state.initialize_pso(device, frame.state_cache, &pipeline_desc)?;
        for (name, buffer) in statics {
            state.set_static_variable(&name, buffer)?;
        }
        state.initialize_srb(true)?;
        Ok(())
    }
}
