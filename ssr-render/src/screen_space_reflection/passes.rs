use ssr_gpu_shared::uniforms::TextureMipAttribs;

use super::{FrameInputs, ScreenSpaceReflection, SsrResource, SsrTechnique};
use crate::error::{PostFxError, PostFxResult};
use crate::graphics::{
    with_debug_group, CopyTextureAttribs, DeviceContext, DrawAttribs, RenderDevice,
    ResourceState, StateTransitionDesc, TextureView, REMAINING_MIP_LEVELS,
};

const RTV_CLEAR_COLOR: [f32; 4] = [0.0; 4];
const STENCIL_REF: u8 = 0xFF;

impl ScreenSpaceReflection {
    fn read_only_dsv(&self) -> PostFxResult<TextureView> {
        self.depth_stencil_mask_dsv_read_only
            .clone()
            .ok_or(PostFxError::BackBufferNotSized)
    }

    /// Full-screen copy of `srv` into `rtv`, for devices that cannot copy depth into color.
    fn copy_texture_depth(
        &mut self,
        context: &mut dyn DeviceContext,
        srv: &TextureView,
        rtv: &TextureView,
    ) -> PostFxResult<()> {
        let technique = &mut self.techniques[SsrTechnique::CopyDepth as usize];
        let (pipeline, bindings) = technique.parts_mut()?;
        bindings.set("g_TextureDepth", srv.clone())?;

        context.set_render_targets(std::slice::from_ref(rtv), None)?;
        context.set_pipeline_state(pipeline)?;
        context.commit_shader_resources(bindings)?;
        context.draw(&DrawAttribs::FULL_SCREEN_TRIANGLE)?;
        context.set_render_targets(&[], None)?;
        Ok(())
    }

    pub(super) fn compute_hierarchical_depth_buffer(
        &mut self,
        device: &dyn RenderDevice,
        context: &mut dyn DeviceContext,
        frame: &FrameInputs,
    ) -> PostFxResult<()> {
        if !self.features.copy_depth_to_color {
            self.prepare_technique(device, SsrTechnique::CopyDepth, frame)?;
        }
        self.prepare_technique(device, SsrTechnique::ComputeHierarchicalDepthBuffer, frame)?;

        with_debug_group(context, "ComputeHierarchicalDepthBuffer", |context| {
            let hierarchy = self.resources.require_texture(SsrResource::DepthHierarchy)?.clone();
            let intermediate = self
                .resources
                .texture(SsrResource::DepthHierarchyIntermediate)
                .cloned();
            let mip_rtvs = self.hierarchy_mip_rtvs.clone();
            let mip_srvs = self.hierarchy_mip_srvs.clone();
            let mip_count = mip_rtvs.len() as u32;
            let uses_views = self.features.uses_mip_views();

            // Mip 0 is a copy of the scene depth. The intermediate chain needs it too.
            if self.features.copy_depth_to_color {
                context.copy_texture(&CopyTextureAttribs {
                    src: frame.depth.texture().clone(),
                    src_mip: frame.depth.desc().most_detailed_mip,
                    dst: hierarchy.clone(),
                    dst_mip: 0,
                })?;
            } else {
                self.copy_texture_depth(context, frame.depth, &mip_rtvs[0])?;
            }
            if !uses_views {
                if let Some(intermediate) = intermediate.as_ref() {
                    context.copy_texture(&CopyTextureAttribs {
                        src: hierarchy.clone(),
                        src_mip: 0,
                        dst: intermediate.clone(),
                        dst_mip: 0,
                    })?;
                }
            }

            let technique =
                &mut self.techniques[SsrTechnique::ComputeHierarchicalDepthBuffer as usize];
            let (pipeline, bindings) = technique.parts_mut()?;

            if uses_views && self.features.uses_explicit_transitions() {
                context.transition_resource_states(&[StateTransitionDesc {
                    texture: hierarchy.clone(),
                    old_state: ResourceState::Unknown,
                    new_state: ResourceState::RenderTarget,
                    first_mip: 0,
                    mip_count: REMAINING_MIP_LEVELS,
                    update_state: true,
                }])?;

                for mip in 1..mip_count as usize {
                    bindings.set("g_TextureLastMip", mip_srvs[mip - 1].clone())?;
                    context.transition_resource_states(&[StateTransitionDesc {
                        texture: hierarchy.clone(),
                        old_state: ResourceState::RenderTarget,
                        new_state: ResourceState::ShaderResource,
                        first_mip: mip as u32 - 1,
                        mip_count: 1,
                        update_state: false,
                    }])?;
                    context.set_render_targets(std::slice::from_ref(&mip_rtvs[mip]), None)?;
                    context.set_pipeline_state(pipeline)?;
                    context.commit_shader_resources(bindings)?;
                    context.draw(&DrawAttribs::FULL_SCREEN_TRIANGLE)?;
                }

                context.transition_resource_states(&[StateTransitionDesc {
                    texture: hierarchy.clone(),
                    old_state: ResourceState::RenderTarget,
                    new_state: ResourceState::ShaderResource,
                    first_mip: mip_count - 1,
                    mip_count: 1,
                    update_state: true,
                }])?;
            } else if uses_views {
                for mip in 1..mip_count as usize {
                    bindings.set("g_TextureLastMip", mip_srvs[mip - 1].clone())?;
                    context.set_render_targets(std::slice::from_ref(&mip_rtvs[mip]), None)?;
                    context.set_pipeline_state(pipeline)?;
                    context.commit_shader_resources(bindings)?;
                    context.draw(&DrawAttribs::FULL_SCREEN_TRIANGLE)?;
                }
            } else {
                let intermediate = intermediate.ok_or_else(|| {
                    PostFxError::MissingResource(format!(
                        "{:?}",
                        SsrResource::DepthHierarchyIntermediate
                    ))
                })?;
                let mip_cb = self
                    .resources
                    .require_buffer(SsrResource::IntermediateConstantBuffer)?;
                bindings.set("g_TextureMips", intermediate.default_srv()?)?;

                for mip in 1..mip_count {
                    let attribs = TextureMipAttribs {
                        mip_index: mip - 1,
                        ..Default::default()
                    };
                    context.update_buffer(mip_cb, 0, bytemuck::bytes_of(&attribs))?;
                    context.set_render_targets(
                        std::slice::from_ref(&mip_rtvs[mip as usize]),
                        None,
                    )?;
                    context.set_pipeline_state(pipeline)?;
                    context.commit_shader_resources(bindings)?;
                    context.draw(&DrawAttribs::FULL_SCREEN_TRIANGLE)?;
                    context.set_render_targets(&[], None)?;

                    context.copy_texture(&CopyTextureAttribs {
                        src: hierarchy.clone(),
                        src_mip: mip,
                        dst: intermediate.clone(),
                        dst_mip: mip,
                    })?;
                }
            }
            context.set_render_targets(&[], None)?;
            Ok(())
        })
    }

    pub(super) fn compute_stencil_mask_and_extract_roughness(
        &mut self,
        device: &dyn RenderDevice,
        context: &mut dyn DeviceContext,
        frame: &FrameInputs,
    ) -> PostFxResult<()> {
        self.prepare_technique(device, SsrTechnique::ComputeStencilMaskAndExtractRoughness, frame)?;

        let rtvs = [self.resources.texture_rtv(SsrResource::Roughness)?];
        let dsv = self.resources.texture_dsv(SsrResource::DepthStencilMask)?;
        let technique =
            &mut self.techniques[SsrTechnique::ComputeStencilMaskAndExtractRoughness as usize];

        with_debug_group(context, "ComputeStencilMaskAndExtractRoughness", |context| {
            let (pipeline, bindings) = technique.parts_mut()?;
            bindings.set("g_TextureDepth", frame.depth.clone())?;
            bindings.set("g_TextureMaterialParameters", frame.material_parameters.clone())?;

            context.set_render_targets(&rtvs, Some(&dsv))?;
            context.clear_depth_stencil(&dsv, None, Some(0x00))?;
            context.set_stencil_ref(STENCIL_REF);
            context.set_pipeline_state(pipeline)?;
            context.commit_shader_resources(bindings)?;
            context.draw(&DrawAttribs::FULL_SCREEN_TRIANGLE)?;
            context.set_render_targets(&[], None)?;
            Ok(())
        })
    }

    pub(super) fn compute_intersection(
        &mut self,
        device: &dyn RenderDevice,
        context: &mut dyn DeviceContext,
        frame: &FrameInputs,
    ) -> PostFxResult<()> {
        self.prepare_technique(device, SsrTechnique::ComputeIntersection, frame)?;

        let rtvs = [
            self.resources.texture_rtv(SsrResource::Radiance)?,
            self.resources.texture_rtv(SsrResource::RayDirectionPdf)?,
        ];
        let dsv = self.read_only_dsv()?;
        let roughness = self.resources.texture_srv(SsrResource::Roughness)?;
        let hierarchy = self.resources.texture_srv(SsrResource::DepthHierarchy)?;
        let technique = &mut self.techniques[SsrTechnique::ComputeIntersection as usize];

        with_debug_group(context, "ComputeIntersection", |context| {
            let (pipeline, bindings) = technique.parts_mut()?;
            bindings.set("g_TextureRadiance", frame.color.clone())?;
            bindings.set("g_TextureNormal", frame.normal.clone())?;
            bindings.set("g_TextureRoughness", roughness)?;
            bindings.set("g_TextureBlueNoise", frame.blue_noise.clone())?;
            bindings.set("g_TextureDepthHierarchy", hierarchy)?;

            context.set_render_targets(&rtvs, Some(&dsv))?;
            for rtv in &rtvs {
                context.clear_render_target(rtv, RTV_CLEAR_COLOR)?;
            }
            context.set_stencil_ref(STENCIL_REF);
            context.set_pipeline_state(pipeline)?;
            context.commit_shader_resources(bindings)?;
            context.draw(&DrawAttribs::FULL_SCREEN_TRIANGLE)?;
            context.set_render_targets(&[], None)?;
            Ok(())
        })
    }

    pub(super) fn compute_spatial_reconstruction(
        &mut self,
        device: &dyn RenderDevice,
        context: &mut dyn DeviceContext,
        frame: &FrameInputs,
    ) -> PostFxResult<()> {
        self.prepare_technique(device, SsrTechnique::ComputeSpatialReconstruction, frame)?;

        let rtvs = [
            self.resources.texture_rtv(SsrResource::ResolvedRadiance)?,
            self.resources.texture_rtv(SsrResource::ResolvedVariance)?,
            self.resources.texture_rtv(SsrResource::ResolvedDepth)?,
        ];
        let dsv = self.read_only_dsv()?;
        let roughness = self.resources.texture_srv(SsrResource::Roughness)?;
        let ray_direction_pdf = self.resources.texture_srv(SsrResource::RayDirectionPdf)?;
        let radiance = self.resources.texture_srv(SsrResource::Radiance)?;
        let technique = &mut self.techniques[SsrTechnique::ComputeSpatialReconstruction as usize];

        with_debug_group(context, "ComputeSpatialReconstruction", |context| {
            let (pipeline, bindings) = technique.parts_mut()?;
            bindings.set("g_TextureRoughness", roughness)?;
            bindings.set("g_TextureNormal", frame.normal.clone())?;
            bindings.set("g_TextureDepth", frame.depth.clone())?;
            bindings.set("g_TextureRayDirectionPDF", ray_direction_pdf)?;
            bindings.set("g_TextureIntersectSpecular", radiance)?;

            context.set_render_targets(&rtvs, Some(&dsv))?;
            context.set_stencil_ref(STENCIL_REF);
            context.set_pipeline_state(pipeline)?;
            context.commit_shader_resources(bindings)?;
            context.draw(&DrawAttribs::FULL_SCREEN_TRIANGLE)?;
            context.set_render_targets(&[], None)?;
            Ok(())
        })
    }

    pub(super) fn compute_temporal_accumulation(
        &mut self,
        device: &dyn RenderDevice,
        context: &mut dyn DeviceContext,
        frame: &FrameInputs,
    ) -> PostFxResult<()> {
        if !self.features.copy_depth_to_color {
            self.prepare_technique(device, SsrTechnique::CopyDepth, frame)?;
        }
        self.prepare_technique(device, SsrTechnique::ComputeTemporalAccumulation, frame)?;

        let curr = frame.frame_index & 1;
        let prev = frame.frame_index.wrapping_sub(1) & 1;

        let rtvs = [
            self.resources.texture_rtv(SsrResource::radiance_history(curr))?,
            self.resources.texture_rtv(SsrResource::variance_history(curr))?,
        ];
        let dsv = self.read_only_dsv()?;
        let inputs = [
            ("g_TextureMotion", frame.motion_vectors.clone()),
            ("g_TextureRoughness", self.resources.texture_srv(SsrResource::Roughness)?),
            ("g_TextureCurrRadiance", self.resources.texture_srv(SsrResource::ResolvedRadiance)?),
            ("g_TextureCurrDepth", frame.depth.clone()),
            ("g_TextureCurrVariance", self.resources.texture_srv(SsrResource::ResolvedVariance)?),
            (
                "g_TexturePrevRadiance",
                self.resources.texture_srv(SsrResource::radiance_history(prev))?,
            ),
            ("g_TexturePrevDepth", self.resources.texture_srv(SsrResource::DepthHistory)?),
            (
                "g_TexturePrevVariance",
                self.resources.texture_srv(SsrResource::variance_history(prev))?,
            ),
            ("g_TextureHitDepth", self.resources.texture_srv(SsrResource::ResolvedDepth)?),
        ];
        let depth_history = self.resources.require_texture(SsrResource::DepthHistory)?.clone();

        with_debug_group(context, "ComputeTemporalAccumulation", |context| {
            let technique =
                &mut self.techniques[SsrTechnique::ComputeTemporalAccumulation as usize];
            let (pipeline, bindings) = technique.parts_mut()?;
            for (name, view) in inputs {
                bindings.set(name, view)?;
            }

            context.commit_shader_resources(bindings)?;
            context.set_render_targets(&rtvs, Some(&dsv))?;
            context.set_stencil_ref(STENCIL_REF);
            context.set_pipeline_state(pipeline)?;
            context.draw(&DrawAttribs::FULL_SCREEN_TRIANGLE)?;
            context.set_render_targets(&[], None)?;

            // Depth for next frame's reprojection.
            if self.features.copy_depth_to_color {
                context.copy_texture(&CopyTextureAttribs {
                    src: frame.depth.texture().clone(),
                    src_mip: frame.depth.desc().most_detailed_mip,
                    dst: depth_history,
                    dst_mip: 0,
                })?;
            } else {
                let rtv = depth_history.default_rtv()?;
                self.copy_texture_depth(context, frame.depth, &rtv)?;
            }
            Ok(())
        })
    }

    pub(super) fn compute_bilateral_cleanup(
        &mut self,
        device: &dyn RenderDevice,
        context: &mut dyn DeviceContext,
        frame: &FrameInputs,
    ) -> PostFxResult<()> {
        self.prepare_technique(device, SsrTechnique::ComputeBilateralCleanup, frame)?;

        let curr = frame.frame_index & 1;
        let rtvs = [self.resources.texture_rtv(SsrResource::Output)?];
        let dsv = self.read_only_dsv()?;
        let roughness = self.resources.texture_srv(SsrResource::Roughness)?;
        let radiance = self.resources.texture_srv(SsrResource::radiance_history(curr))?;
        let variance = self.resources.texture_srv(SsrResource::variance_history(curr))?;
        let technique = &mut self.techniques[SsrTechnique::ComputeBilateralCleanup as usize];

        with_debug_group(context, "ComputeBilateralCleanup", |context| {
            let (pipeline, bindings) = technique.parts_mut()?;
            bindings.set("g_TextureDepth", frame.depth.clone())?;
            bindings.set("g_TextureNormal", frame.normal.clone())?;
            bindings.set("g_TextureRoughness", roughness)?;
            bindings.set("g_TextureRadiance", radiance)?;
            bindings.set("g_TextureVariance", variance)?;

            context.set_render_targets(&rtvs, Some(&dsv))?;
            context.clear_render_target(&rtvs[0], RTV_CLEAR_COLOR)?;
            context.set_stencil_ref(STENCIL_REF);
            context.set_pipeline_state(pipeline)?;
            context.commit_shader_resources(bindings)?;
            context.draw(&DrawAttribs::FULL_SCREEN_TRIANGLE)?;
            context.set_render_targets(&[], None)?;
            Ok(())
        })
    }
}
