use glam::{UVec2, Vec4};

use super::device::{soft_buffer, soft_texture, SoftPipeline};
use super::kernels::{DrawResources, PixelInput, PixelKernel};
use super::texture::{quantize, SampledTexture};
use super::SoftDeviceConfig;
use crate::error::{GraphicsError, GraphicsResult};
use crate::graphics::{
    BoundResource, Buffer, CopyTextureAttribs, DeviceContext, DrawAttribs, PipelineState,
    ResourceState, ShaderResourceBinding, StateTransitionDesc, Texture, TextureFormat,
    TextureView, TextureViewType,
};

/// Snapshot of one draw call.
#[derive(Clone, Debug)]
pub struct DrawRecord {
    pub pipeline: String,
    pub render_targets: Vec<TextureView>,
    pub depth_stencil: Option<TextureView>,
    pub stencil_ref: u8,
    /// Resources committed for the draw, by shader variable name.
    pub inputs: Vec<(String, BoundResource)>,
}

impl DrawRecord {
    pub fn input(&self, name: &str) -> Option<&BoundResource> {
        self.inputs
            .iter()
            .find(|(input, _)| input == name)
            .map(|(_, resource)| resource)
    }
}

/// Commands recorded by a [`SoftContext`], in submission order.
#[derive(Clone, Debug)]
pub enum SoftCommand {
    BeginDebugGroup(String),
    EndDebugGroup,
    UpdateBuffer {
        buffer: Buffer,
        offset: u64,
        size: u64,
    },
    ClearRenderTarget {
        texture: Texture,
        mip: u32,
        color: [f32; 4],
    },
    ClearDepthStencil {
        texture: Texture,
        depth: Option<f32>,
        stencil: Option<u8>,
    },
    CopyTexture {
        src: Texture,
        src_mip: u32,
        dst: Texture,
        dst_mip: u32,
    },
    Transition {
        texture: Texture,
        first_mip: u32,
        mip_count: u32,
        old_state: ResourceState,
        new_state: ResourceState,
    },
    Draw(DrawRecord),
}

#[derive(Clone, Debug)]
struct CommittedResources {
    pipeline: PipelineState,
    resources: Vec<(String, BoundResource)>,
}

/// Immediate context of the software device. Executes every command as it is recorded.
#[derive(Debug)]
pub struct SoftContext {
    config: SoftDeviceConfig,
    render_targets: Vec<TextureView>,
    depth_stencil: Option<TextureView>,
    stencil_ref: u8,
    pipeline: Option<PipelineState>,
    committed: Option<CommittedResources>,
    debug_groups: Vec<String>,
    commands: Vec<SoftCommand>,
}

fn set_state(texture: &Texture, mips: std::ops::Range<u32>, state: ResourceState) -> GraphicsResult<()> {
    let mut storage = soft_texture(texture)?.storage.write();
    for mip in mips {
        if let Some(slot) = storage.states.get_mut(mip as usize) {
            *slot = state;
        }
    }
    Ok(())
}

fn masked_write(current: u8, value: u8, mask: u8) -> u8 {
    (current & !mask) | (value & mask)
}

impl SoftContext {
    pub(crate) fn new(config: SoftDeviceConfig) -> Self {
        Self {
            config,
            render_targets: Vec::new(),
            depth_stencil: None,
            stencil_ref: 0,
            pipeline: None,
            committed: None,
            debug_groups: Vec::new(),
            commands: Vec::new(),
        }
    }

    pub fn commands(&self) -> &[SoftCommand] {
        &self.commands
    }

    pub fn take_commands(&mut self) -> Vec<SoftCommand> {
        std::mem::take(&mut self.commands)
    }

    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    /// Debug groups currently open, outermost first.
    pub fn open_debug_groups(&self) -> &[String] {
        &self.debug_groups
    }

    pub fn draws(&self) -> impl Iterator<Item = &DrawRecord> {
        self.commands.iter().filter_map(|command| match command {
            SoftCommand::Draw(record) => Some(record),
            _ => None,
        })
    }

    fn draw_error(pipeline: &str, message: impl Into<String>) -> GraphicsError {
        GraphicsError::DrawValidation {
            pipeline: pipeline.to_string(),
            message: message.into(),
        }
    }

    fn validate_draw(
        &self,
        attribs: &DrawAttribs,
    ) -> GraphicsResult<(PipelineState, CommittedResources)> {
        let pipeline = self
            .pipeline
            .clone()
            .ok_or_else(|| Self::draw_error("<none>", "no pipeline state is set"))?;
        let name = pipeline.name().to_string();
        let err = |message: String| Self::draw_error(&name, message);
        let desc = pipeline.desc();

        if attribs.num_vertices != 3 || attribs.num_instances != 1 {
            return Err(err(format!(
                "expected a full-screen triangle, got {} vertices x {} instances",
                attribs.num_vertices, attribs.num_instances
            )));
        }

        let committed = self
            .committed
            .clone()
            .ok_or_else(|| err("no shader resources committed".to_string()))?;
        if !committed.pipeline.ptr_eq(&pipeline) {
            return Err(err(format!(
                "committed resources belong to pipeline '{}'",
                committed.pipeline.name()
            )));
        }

        let rtv_formats: Vec<TextureFormat> =
            self.render_targets.iter().map(TextureView::format).collect();
        if rtv_formats != desc.rtv_formats {
            return Err(err(format!(
                "render targets {rtv_formats:?} do not match pipeline formats {:?}",
                desc.rtv_formats
            )));
        }
        match (&self.depth_stencil, desc.has_depth_stencil()) {
            (None, true) => return Err(err("pipeline expects a depth-stencil view".to_string())),
            (Some(_), false) => {
                return Err(err("depth-stencil view bound to a pipeline without one".to_string()))
            }
            (Some(dsv), true) => {
                if dsv.format() != desc.dsv_format {
                    return Err(err(format!(
                        "depth-stencil format {:?} does not match pipeline format {:?}",
                        dsv.format(),
                        desc.dsv_format
                    )));
                }
                let read_only = dsv.view_type() == TextureViewType::ReadOnlyDepthStencil;
                if read_only != desc.read_only_dsv {
                    return Err(err(format!(
                        "pipeline expects a {} depth-stencil view",
                        if desc.read_only_dsv { "read-only" } else { "writable" }
                    )));
                }
            }
            (None, false) => {}
        }
        if self.render_targets.is_empty() && self.depth_stencil.is_none() {
            return Err(err("no render targets bound".to_string()));
        }

        for variable in &desc.layout.variables {
            if !committed.resources.iter().any(|(n, _)| *n == variable.name) {
                return Err(err(format!("variable '{}' is not bound", variable.name)));
            }
        }

        let attachments: Vec<&TextureView> =
            self.render_targets.iter().chain(self.depth_stencil.as_ref()).collect();
        for (variable, resource) in &committed.resources {
            let BoundResource::Texture(view) = resource else {
                continue;
            };
            if view.view_type() != TextureViewType::ShaderResource {
                return Err(err(format!(
                    "'{variable}' is bound to a {:?} view",
                    view.view_type()
                )));
            }
            let total = view.texture().desc().mip_levels;
            if !self.config.texture_subresource_views && view.mip_range() != (0..total) {
                return Err(err(format!(
                    "'{variable}' uses a sub-resource view, which the device does not support"
                )));
            }
            if let Some(target) = attachments.iter().find(|target| target.overlaps(view)) {
                return Err(err(format!(
                    "'{variable}' reads '{}' while it is bound as a target",
                    target.texture().name()
                )));
            }
        }

        for (i, a) in self.render_targets.iter().enumerate() {
            if self.render_targets[..i]
                .iter()
                .any(|b| a.texture().ptr_eq(b.texture()))
            {
                return Err(err(format!("'{}' is bound twice", a.texture().name())));
            }
        }
        if let Some(first) = attachments.first() {
            let extent = first.extent();
            if let Some(other) = attachments.iter().find(|view| view.extent() != extent) {
                return Err(err(format!(
                    "'{}' is {:?}, other targets are {:?}",
                    other.texture().name(),
                    other.extent(),
                    extent
                )));
            }
        }

        Ok((pipeline, committed))
    }

    fn gather_resources(committed: &CommittedResources) -> GraphicsResult<DrawResources> {
        let layout = &committed.pipeline.desc().layout;
        let mut resources = DrawResources::default();
        for (name, resource) in &committed.resources {
            match resource {
                BoundResource::Texture(view) => {
                    let storage = soft_texture(view.texture())?.storage.read();
                    let desc = view.texture().desc();
                    let mips = view
                        .mip_range()
                        .map(|mip| {
                            let (w, h) = desc.mip_extent(mip);
                            (UVec2::new(w, h), storage.mips[mip as usize].clone())
                        })
                        .collect();
                    resources
                        .textures
                        .insert(name.clone(), SampledTexture::new(mips, layout.sampler_for(name)));
                }
                BoundResource::Buffer(buffer) => {
                    let data = soft_buffer(buffer)?.data.read().clone();
                    resources.buffers.insert(name.clone(), data);
                }
            }
        }
        Ok(resources)
    }

    fn rasterize(
        &self,
        pipeline: &PipelineState,
        kernel: PixelKernel,
        resources: &DrawResources,
    ) -> GraphicsResult<()> {
        let desc = pipeline.desc();
        let (width, height) = self
            .render_targets
            .first()
            .or(self.depth_stencil.as_ref())
            .map(TextureView::extent)
            .unwrap_or((0, 0));

        let mut targets = Vec::with_capacity(self.render_targets.len());
        for rtv in &self.render_targets {
            let storage = soft_texture(rtv.texture())?.storage.write();
            targets.push((rtv.format(), rtv.desc().most_detailed_mip as usize, storage));
        }

        let state = &desc.depth_stencil;
        let face = state.front_face;
        let stencil_writable = self
            .depth_stencil
            .as_ref()
            .is_some_and(|dsv| dsv.view_type() == TextureViewType::DepthStencil);
        let mut depth_stencil = match &self.depth_stencil {
            Some(dsv) if state.stencil_enable => {
                if dsv.desc().most_detailed_mip != 0 {
                    return Err(Self::draw_error(
                        pipeline.name(),
                        "stencil is only stored for mip 0",
                    ));
                }
                Some(soft_texture(dsv.texture())?.storage.write())
            }
            _ => None,
        };

        let reference = self.stencil_ref;
        for y in 0..height {
            for x in 0..width {
                let index = (y * width + x) as usize;
                if let Some(storage) = depth_stencil.as_mut() {
                    let current = storage.stencil[index];
                    let passed = face
                        .func
                        .test(reference & state.stencil_read_mask, current & state.stencil_read_mask);
                    if !passed {
                        if stencil_writable {
                            storage.stencil[index] = masked_write(
                                current,
                                face.fail_op.apply(current, reference),
                                state.stencil_write_mask,
                            );
                        }
                        continue;
                    }
                }

                let Some(outputs) = kernel(&PixelInput::new(x, y, resources)) else {
                    continue;
                };
                for (slot, (format, mip, storage)) in targets.iter_mut().enumerate() {
                    storage.mips[*mip][index] = quantize(*format, outputs[slot]);
                }
                if let Some(storage) = depth_stencil.as_mut() {
                    if stencil_writable {
                        let current = storage.stencil[index];
                        storage.stencil[index] = masked_write(
                            current,
                            face.pass_op.apply(current, reference),
                            state.stencil_write_mask,
                        );
                    }
                }
            }
        }
        Ok(())
    }
}

impl DeviceContext for SoftContext {
    fn begin_debug_group(&mut self, name: &str) {
        self.debug_groups.push(name.to_string());
        self.commands.push(SoftCommand::BeginDebugGroup(name.to_string()));
    }

    fn end_debug_group(&mut self) {
        if self.debug_groups.pop().is_none() {
            log::warn!("end_debug_group without a matching begin_debug_group");
            return;
        }
        self.commands.push(SoftCommand::EndDebugGroup);
    }

    fn update_buffer(&mut self, buffer: &Buffer, offset: u64, data: &[u8]) -> GraphicsResult<()> {
        let size = buffer.desc().size;
        let len = data.len() as u64;
        if offset.checked_add(len).map_or(true, |end| end > size) {
            return Err(GraphicsError::BufferOverflow {
                name: buffer.desc().name.clone(),
                size,
                offset,
                len,
            });
        }
        {
            let mut storage = soft_buffer(buffer)?.data.write();
            storage[offset as usize..(offset + len) as usize].copy_from_slice(data);
        }
        self.commands.push(SoftCommand::UpdateBuffer {
            buffer: buffer.clone(),
            offset,
            size: len,
        });
        Ok(())
    }

    fn set_render_targets(
        &mut self,
        rtvs: &[TextureView],
        dsv: Option<&TextureView>,
    ) -> GraphicsResult<()> {
        for rtv in rtvs {
            if rtv.view_type() != TextureViewType::RenderTarget {
                return Err(GraphicsError::InvalidView {
                    texture: rtv.texture().name().to_string(),
                    view_type: rtv.view_type(),
                    message: "bound as a render target".to_string(),
                });
            }
        }
        if let Some(dsv) = dsv {
            if !dsv.view_type().is_depth_stencil() {
                return Err(GraphicsError::InvalidView {
                    texture: dsv.texture().name().to_string(),
                    view_type: dsv.view_type(),
                    message: "bound as a depth-stencil target".to_string(),
                });
            }
        }
        if rtvs.len() > super::kernels::MAX_RENDER_TARGETS {
            return Err(GraphicsError::Backend(format!(
                "{} render targets bound, at most {} supported",
                rtvs.len(),
                super::kernels::MAX_RENDER_TARGETS
            )));
        }

        for rtv in rtvs {
            set_state(rtv.texture(), rtv.mip_range(), ResourceState::RenderTarget)?;
        }
        if let Some(dsv) = dsv {
            let state = if dsv.view_type() == TextureViewType::ReadOnlyDepthStencil {
                ResourceState::DepthRead
            } else {
                ResourceState::DepthWrite
            };
            set_state(dsv.texture(), dsv.mip_range(), state)?;
        }
        self.render_targets = rtvs.to_vec();
        self.depth_stencil = dsv.cloned();
        Ok(())
    }

    fn clear_render_target(&mut self, rtv: &TextureView, color: [f32; 4]) -> GraphicsResult<()> {
        if rtv.view_type() != TextureViewType::RenderTarget {
            return Err(GraphicsError::InvalidView {
                texture: rtv.texture().name().to_string(),
                view_type: rtv.view_type(),
                message: "cleared as a render target".to_string(),
            });
        }
        let mip = rtv.desc().most_detailed_mip;
        let value = quantize(rtv.format(), Vec4::from_array(color));
        {
            let mut storage = soft_texture(rtv.texture())?.storage.write();
            storage.mips[mip as usize].fill(value);
            storage.states[mip as usize] = ResourceState::RenderTarget;
        }
        self.commands.push(SoftCommand::ClearRenderTarget {
            texture: rtv.texture().clone(),
            mip,
            color,
        });
        Ok(())
    }

    fn clear_depth_stencil(
        &mut self,
        dsv: &TextureView,
        depth: Option<f32>,
        stencil: Option<u8>,
    ) -> GraphicsResult<()> {
        if dsv.view_type() != TextureViewType::DepthStencil {
            return Err(GraphicsError::InvalidView {
                texture: dsv.texture().name().to_string(),
                view_type: dsv.view_type(),
                message: "only writable depth-stencil views can be cleared".to_string(),
            });
        }
        let mip = dsv.desc().most_detailed_mip as usize;
        {
            let mut storage = soft_texture(dsv.texture())?.storage.write();
            if let Some(depth) = depth {
                let value = quantize(dsv.format(), Vec4::splat(depth));
                storage.mips[mip].fill(value);
            }
            if let Some(stencil) = stencil {
                storage.stencil.fill(stencil);
            }
            storage.states[mip] = ResourceState::DepthWrite;
        }
        self.commands.push(SoftCommand::ClearDepthStencil {
            texture: dsv.texture().clone(),
            depth,
            stencil,
        });
        Ok(())
    }

    fn set_stencil_ref(&mut self, reference: u8) {
        self.stencil_ref = reference;
    }

    fn set_pipeline_state(&mut self, pipeline: &PipelineState) -> GraphicsResult<()> {
        if pipeline.downcast_ref::<SoftPipeline>().is_none() {
            return Err(GraphicsError::Backend(format!(
                "pipeline '{}' was not created by the software device",
                pipeline.name()
            )));
        }
        self.pipeline = Some(pipeline.clone());
        Ok(())
    }

    fn commit_shader_resources(&mut self, bindings: &ShaderResourceBinding) -> GraphicsResult<()> {
        let resources: Vec<(String, BoundResource)> = bindings
            .resources()
            .map(|(name, resource)| (name.to_string(), resource.clone()))
            .collect();
        for (_, resource) in &resources {
            if let BoundResource::Texture(view) = resource {
                if view.view_type() == TextureViewType::ShaderResource {
                    set_state(view.texture(), view.mip_range(), ResourceState::ShaderResource)?;
                }
            }
        }
        self.committed = Some(CommittedResources {
            pipeline: bindings.pipeline().clone(),
            resources,
        });
        Ok(())
    }

    fn draw(&mut self, attribs: &DrawAttribs) -> GraphicsResult<()> {
        let (pipeline, committed) = self.validate_draw(attribs)?;
        let kernel = pipeline
            .downcast_ref::<SoftPipeline>()
            .map(|p| p.kernel)
            .ok_or_else(|| Self::draw_error(pipeline.name(), "foreign pipeline"))?;

        let resources = Self::gather_resources(&committed)?;
        self.rasterize(&pipeline, kernel, &resources)?;

        self.commands.push(SoftCommand::Draw(DrawRecord {
            pipeline: pipeline.name().to_string(),
            render_targets: self.render_targets.clone(),
            depth_stencil: self.depth_stencil.clone(),
            stencil_ref: self.stencil_ref,
            inputs: committed.resources,
        }));
        Ok(())
    }

    fn copy_texture(&mut self, attribs: &CopyTextureAttribs) -> GraphicsResult<()> {
        let (src, dst) = (&attribs.src, &attribs.dst);
        let (src_format, dst_format) = (src.desc().format, dst.desc().format);
        let depth_to_color = src_format == TextureFormat::D32Float
            && dst_format == TextureFormat::R32Float
            && self.config.copies_depth_to_color();
        if src_format != dst_format && !depth_to_color {
            return Err(GraphicsError::UnsupportedCopy {
                src: src.name().to_string(),
                src_format,
                dst: dst.name().to_string(),
                dst_format,
            });
        }
        let invalid = |message: String| GraphicsError::Backend(format!(
            "copy '{}' mip {} -> '{}' mip {}: {message}",
            src.name(),
            attribs.src_mip,
            dst.name(),
            attribs.dst_mip
        ));
        if attribs.src_mip >= src.desc().mip_levels || attribs.dst_mip >= dst.desc().mip_levels {
            return Err(invalid("mip out of range".to_string()));
        }
        let (src_extent, dst_extent) = (
            src.desc().mip_extent(attribs.src_mip),
            dst.desc().mip_extent(attribs.dst_mip),
        );
        if src_extent != dst_extent {
            return Err(invalid(format!("extent {src_extent:?} != {dst_extent:?}")));
        }

        let (src_mip, dst_mip) = (attribs.src_mip as usize, attribs.dst_mip as usize);
        if src.ptr_eq(dst) {
            if src_mip == dst_mip {
                return Err(invalid("source and destination overlap".to_string()));
            }
            let mut storage = soft_texture(src)?.storage.write();
            let texels = storage.mips[src_mip].clone();
            storage.mips[dst_mip] = texels;
            storage.states[src_mip] = ResourceState::CopySource;
            storage.states[dst_mip] = ResourceState::CopyDest;
        } else {
            let texels = {
                let mut storage = soft_texture(src)?.storage.write();
                storage.states[src_mip] = ResourceState::CopySource;
                storage.mips[src_mip].clone()
            };
            let mut storage = soft_texture(dst)?.storage.write();
            for (d, s) in storage.mips[dst_mip].iter_mut().zip(&texels) {
                *d = quantize(dst_format, *s);
            }
            storage.states[dst_mip] = ResourceState::CopyDest;
        }

        self.commands.push(SoftCommand::CopyTexture {
            src: src.clone(),
            src_mip: attribs.src_mip,
            dst: dst.clone(),
            dst_mip: attribs.dst_mip,
        });
        Ok(())
    }

    fn transition_resource_states(
        &mut self,
        barriers: &[StateTransitionDesc],
    ) -> GraphicsResult<()> {
        for barrier in barriers {
            let range = barrier.mip_range();
            {
                let mut storage = soft_texture(&barrier.texture)?.storage.write();
                for mip in range.clone() {
                    let tracked = storage.states[mip as usize];
                    if barrier.old_state != ResourceState::Unknown && tracked != barrier.old_state {
                        return Err(GraphicsError::StateMismatch {
                            texture: barrier.texture.name().to_string(),
                            mip,
                            message: format!(
                                "expected {:?}, tracked {tracked:?}",
                                barrier.old_state
                            ),
                        });
                    }
                }
                if barrier.update_state {
                    for mip in range.clone() {
                        storage.states[mip as usize] = barrier.new_state;
                    }
                }
            }
            self.commands.push(SoftCommand::Transition {
                texture: barrier.texture.clone(),
                first_mip: range.start,
                mip_count: range.len() as u32,
                old_state: barrier.old_state,
                new_state: barrier.new_state,
            });
        }
        Ok(())
    }
}
