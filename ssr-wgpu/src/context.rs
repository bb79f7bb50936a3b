//! Immediate-mode device context recorded into a wgpu command encoder.
//!
//! Every draw and clear opens its own render pass that loads and stores its attachments,
//! so the effect's bind-then-draw sequence maps onto wgpu without reordering. Buffer
//! updates go through staging copies on the same encoder for the same reason.

use std::sync::Arc;

use ssr_render::graphics::{
    BoundResource, CopyTextureAttribs, DeviceContext, DrawAttribs, PipelineState,
    ShaderResourceBinding, StateTransitionDesc, TextureView, TextureViewType,
};
use ssr_render::{GraphicsError, GraphicsResult};
use wgpu::util::DeviceExt;

use crate::pipeline::WgpuPipeline;
use crate::reflection::BindingKind;
use crate::render_targets::{self, create_view, wgpu_buffer, wgpu_texture};

pub struct WgpuContext {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    encoder: Option<wgpu::CommandEncoder>,
    render_targets: Vec<TextureView>,
    depth_stencil: Option<TextureView>,
    stencil_ref: u8,
    pipeline: Option<PipelineState>,
    committed: Option<ShaderResourceBinding>,
    debug_depth: usize,
}

impl WgpuContext {
    pub(crate) fn new(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>) -> Self {
        Self {
            device,
            queue,
            encoder: None,
            render_targets: Vec::new(),
            depth_stencil: None,
            stencil_ref: 0,
            pipeline: None,
            committed: None,
            debug_depth: 0,
        }
    }

    fn encoder(&mut self) -> &mut wgpu::CommandEncoder {
        let device = &self.device;
        self.encoder.get_or_insert_with(|| {
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("SSR Command Encoder"),
            })
        })
    }

    /// Submits everything recorded so far.
    pub fn flush(&mut self) {
        if self.debug_depth > 0 {
            log::warn!("flushing with {} open debug groups", self.debug_depth);
        }
        if let Some(encoder) = self.encoder.take() {
            self.queue.submit(std::iter::once(encoder.finish()));
        }
    }

    fn bind_group(&self, pipeline: &WgpuPipeline) -> GraphicsResult<wgpu::BindGroup> {
        let rejected = |message: String| GraphicsError::DrawValidation {
            pipeline: pipeline.desc.name.clone(),
            message,
        };
        let committed = self
            .committed
            .as_ref()
            .ok_or_else(|| rejected("no shader resources committed".to_string()))?;

        let mut views = Vec::with_capacity(pipeline.bindings.len());
        for binding in &pipeline.bindings {
            let resource = committed
                .get(&binding.name)
                .ok_or_else(|| rejected(format!("'{}' is not bound", binding.name)))?;
            let view = match (binding.kind, resource) {
                (BindingKind::UniformBuffer, BoundResource::Buffer(_)) => None,
                (BindingKind::FloatTexture | BindingKind::UintTexture, BoundResource::Texture(view)) => {
                    Some(create_view(view)?)
                }
                _ => return Err(rejected(format!("'{}' has the wrong resource type", binding.name))),
            };
            views.push(view);
        }

        let mut entries = Vec::with_capacity(pipeline.bindings.len());
        for (binding, view) in pipeline.bindings.iter().zip(&views) {
            let resource = match (view, committed.get(&binding.name)) {
                (Some(view), _) => wgpu::BindingResource::TextureView(view),
                (None, Some(BoundResource::Buffer(buffer))) => {
                    wgpu_buffer(buffer)?.buffer.as_entire_binding()
                }
                _ => return Err(rejected(format!("'{}' is not bound", binding.name))),
            };
            entries.push(wgpu::BindGroupEntry {
                binding: binding.binding,
                resource,
            });
        }

        Ok(self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&pipeline.desc.name),
            layout: &pipeline.bind_group_layout,
            entries: &entries,
        }))
    }
}

fn color_attachments(views: &[wgpu::TextureView]) -> Vec<Option<wgpu::RenderPassColorAttachment<'_>>> {
    views
        .iter()
        .map(|view| {
            Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
            })
        })
        .collect()
}

impl DeviceContext for WgpuContext {
    fn begin_debug_group(&mut self, name: &str) {
        self.encoder().push_debug_group(name);
        self.debug_depth += 1;
    }

    fn end_debug_group(&mut self) {
        if self.debug_depth == 0 {
            log::warn!("end_debug_group without a matching begin");
            return;
        }
        self.debug_depth -= 1;
        self.encoder().pop_debug_group();
    }

    fn update_buffer(
        &mut self,
        buffer: &ssr_render::graphics::Buffer,
        offset: u64,
        data: &[u8],
    ) -> GraphicsResult<()> {
        let target = wgpu_buffer(buffer)?;
        let len = data.len() as u64;
        if offset + len > target.desc.size {
            return Err(GraphicsError::BufferOverflow {
                name: target.desc.name.clone(),
                size: target.desc.size,
                offset,
                len,
            });
        }
        if data.is_empty() {
            return Ok(());
        }
        if offset % wgpu::COPY_BUFFER_ALIGNMENT != 0 || len % wgpu::COPY_BUFFER_ALIGNMENT != 0 {
            return Err(GraphicsError::Backend(format!(
                "update of '{}' must be {}-byte aligned",
                target.desc.name,
                wgpu::COPY_BUFFER_ALIGNMENT
            )));
        }

        let staging = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Buffer Update Staging"),
            contents: data,
            usage: wgpu::BufferUsages::COPY_SRC,
        });
        self.encoder()
            .copy_buffer_to_buffer(&staging, 0, &target.buffer, offset, len);
        Ok(())
    }

    fn set_render_targets(
        &mut self,
        rtvs: &[TextureView],
        dsv: Option<&TextureView>,
    ) -> GraphicsResult<()> {
        self.render_targets = rtvs.to_vec();
        self.depth_stencil = dsv.cloned();
        Ok(())
    }

    fn clear_render_target(&mut self, rtv: &TextureView, color: [f32; 4]) -> GraphicsResult<()> {
        let view = create_view(rtv)?;
        let [r, g, b, a] = color.map(f64::from);
        self.encoder()
            .begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Clear Render Target"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color { r, g, b, a }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
        Ok(())
    }

    fn clear_depth_stencil(
        &mut self,
        dsv: &TextureView,
        depth: Option<f32>,
        stencil: Option<u8>,
    ) -> GraphicsResult<()> {
        let view = create_view(dsv)?;
        let format = dsv.format();
        let depth_ops = wgpu::Operations {
            load: depth.map_or(wgpu::LoadOp::Load, wgpu::LoadOp::Clear),
            store: wgpu::StoreOp::Store,
        };
        let stencil_ops = format.has_stencil().then(|| wgpu::Operations {
            load: stencil.map_or(wgpu::LoadOp::Load, |s| wgpu::LoadOp::Clear(u32::from(s))),
            store: wgpu::StoreOp::Store,
        });
        self.encoder()
            .begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Clear Depth Stencil"),
                color_attachments: &[],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &view,
                    depth_ops: Some(depth_ops),
                    stencil_ops,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
        Ok(())
    }

    fn set_stencil_ref(&mut self, reference: u8) {
        self.stencil_ref = reference;
    }

    fn set_pipeline_state(&mut self, pipeline: &PipelineState) -> GraphicsResult<()> {
        if pipeline.downcast_ref::<WgpuPipeline>().is_none() {
            return Err(GraphicsError::Backend(format!(
                "pipeline '{}' was not created by wgpu",
                pipeline.name()
            )));
        }
        self.pipeline = Some(pipeline.clone());
        Ok(())
    }

    fn commit_shader_resources(&mut self, bindings: &ShaderResourceBinding) -> GraphicsResult<()> {
        self.committed = Some(bindings.clone());
        Ok(())
    }

    fn draw(&mut self, attribs: &DrawAttribs) -> GraphicsResult<()> {
        let state = self
            .pipeline
            .clone()
            .ok_or_else(|| GraphicsError::Backend("draw without a pipeline".to_string()))?;
        let pipeline = state.downcast_ref::<WgpuPipeline>().ok_or_else(|| {
            GraphicsError::Backend(format!("'{}' is not a wgpu pipeline", state.name()))
        })?;
        if self
            .committed
            .as_ref()
            .is_some_and(|committed| !committed.pipeline().ptr_eq(&state))
        {
            return Err(GraphicsError::DrawValidation {
                pipeline: state.name().to_string(),
                message: "committed resources belong to another pipeline".to_string(),
            });
        }

        let bind_group = self.bind_group(pipeline)?;
        let color_views = self
            .render_targets
            .iter()
            .map(create_view)
            .collect::<GraphicsResult<Vec<_>>>()?;
        let depth_view = self.depth_stencil.as_ref().map(create_view).transpose()?;
        // Read-only attachments carry no load/store operations.
        let writable = self
            .depth_stencil
            .as_ref()
            .is_some_and(|dsv| dsv.view_type() == TextureViewType::DepthStencil);
        let has_stencil = self
            .depth_stencil
            .as_ref()
            .is_some_and(|dsv| dsv.format().has_stencil());
        let depth_stencil_attachment =
            depth_view
                .as_ref()
                .map(|view| wgpu::RenderPassDepthStencilAttachment {
                    view,
                    depth_ops: writable.then_some(wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: (writable && has_stencil).then_some(wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    }),
                });

        let color_attachments = color_attachments(&color_views);
        let stencil_ref = u32::from(self.stencil_ref);
        let mut encoder = self.encoder.take().unwrap_or_else(|| {
            self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("SSR Command Encoder"),
            })
        });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(&pipeline.desc.name),
                color_attachments: &color_attachments,
                depth_stencil_attachment,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&pipeline.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.set_stencil_reference(stencil_ref);
            pass.draw(0..attribs.num_vertices, 0..attribs.num_instances);
        }
        self.encoder = Some(encoder);
        Ok(())
    }

    fn copy_texture(&mut self, attribs: &CopyTextureAttribs) -> GraphicsResult<()> {
        let src = wgpu_texture(&attribs.src)?;
        let dst = wgpu_texture(&attribs.dst)?;
        if src.format != dst.format
            || src.desc.mip_extent(attribs.src_mip) != dst.desc.mip_extent(attribs.dst_mip)
        {
            return Err(GraphicsError::UnsupportedCopy {
                src: src.desc.name.clone(),
                src_format: src.desc.format,
                dst: dst.desc.name.clone(),
                dst_format: dst.desc.format,
            });
        }
        let size = render_targets::extent(&src.desc, attribs.src_mip);
        self.encoder().copy_texture_to_texture(
            wgpu::ImageCopyTexture {
                texture: &src.texture,
                mip_level: attribs.src_mip,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyTexture {
                texture: &dst.texture,
                mip_level: attribs.dst_mip,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            size,
        );
        Ok(())
    }

    fn transition_resource_states(
        &mut self,
        barriers: &[StateTransitionDesc],
    ) -> GraphicsResult<()> {
        // wgpu tracks usage per subresource on its own.
        for barrier in barriers {
            log::trace!(
                "ignoring transition of '{}' mips {:?}: {:?} -> {:?}",
                barrier.texture.name(),
                barrier.mip_range(),
                barrier.old_state,
                barrier.new_state
            );
        }
        Ok(())
    }
}
