//! Resource handles and the device / device-context interfaces implemented by each backend.

use std::any::Any;
use std::fmt::Debug;
use std::ops::Range;
use std::sync::Arc;

use super::pipeline::{GraphicsPipelineDesc, ShaderResourceBinding};
use super::types::*;
use crate::error::{GraphicsError, GraphicsResult};

// ============================================================================
// Backend objects
// ============================================================================

pub trait TextureObject: Send + Sync + Debug + Any {
    fn desc(&self) -> &TextureDesc;
    fn as_any(&self) -> &dyn Any;
}

pub trait BufferObject: Send + Sync + Debug + Any {
    fn desc(&self) -> &BufferDesc;
    fn as_any(&self) -> &dyn Any;
}

pub trait ShaderObject: Send + Sync + Debug + Any {
    fn create_info(&self) -> &ShaderCreateInfo;
    fn as_any(&self) -> &dyn Any;
}

pub trait PipelineObject: Send + Sync + Debug + Any {
    fn desc(&self) -> &GraphicsPipelineDesc;
    fn as_any(&self) -> &dyn Any;
}

fn same_object<T: ?Sized>(a: &Arc<T>, b: &Arc<T>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

// ============================================================================
// Shared handles
// ============================================================================

/// Reference-counted texture handle.
#[derive(Clone, Debug)]
pub struct Texture(Arc<dyn TextureObject>);

impl Texture {
    pub fn new(object: impl TextureObject) -> Self {
        Self(Arc::new(object))
    }

    pub fn desc(&self) -> &TextureDesc {
        self.0.desc()
    }

    pub fn name(&self) -> &str {
        &self.0.desc().name
    }

    /// True when both handles refer to the same texture object.
    pub fn ptr_eq(&self, other: &Texture) -> bool {
        same_object(&self.0, &other.0)
    }

    pub fn downcast_ref<T: TextureObject>(&self) -> Option<&T> {
        self.0.as_any().downcast_ref::<T>()
    }

    /// Creates a view, checking bind flags and the mip range against the description.
    pub fn view(&self, desc: TextureViewDesc) -> GraphicsResult<TextureView> {
        let texture_desc = self.desc();
        let invalid = |message: &str| GraphicsError::InvalidView {
            texture: texture_desc.name.clone(),
            view_type: desc.view_type,
            message: message.to_string(),
        };

        let required = match desc.view_type {
            TextureViewType::ShaderResource => BindFlags::SHADER_RESOURCE,
            TextureViewType::RenderTarget => BindFlags::RENDER_TARGET,
            TextureViewType::DepthStencil | TextureViewType::ReadOnlyDepthStencil => {
                BindFlags::DEPTH_STENCIL
            }
        };
        if !texture_desc.bind_flags.contains(required) {
            return Err(invalid("texture was not created with the matching bind flag"));
        }
        if desc.most_detailed_mip >= texture_desc.mip_levels {
            return Err(invalid("most detailed mip is out of range"));
        }
        if desc.num_mip_levels != 0
            && desc.most_detailed_mip + desc.num_mip_levels > texture_desc.mip_levels
        {
            return Err(invalid("mip range exceeds the texture"));
        }
        let range = desc.mip_range(texture_desc.mip_levels);
        if desc.view_type != TextureViewType::ShaderResource && range.len() != 1 {
            return Err(invalid("attachment views must cover exactly one mip"));
        }

        Ok(TextureView {
            texture: self.clone(),
            desc,
        })
    }

    pub fn default_srv(&self) -> GraphicsResult<TextureView> {
        self.view(TextureViewDesc::full(TextureViewType::ShaderResource))
    }

    pub fn default_rtv(&self) -> GraphicsResult<TextureView> {
        self.view(TextureViewDesc::mip(TextureViewType::RenderTarget, 0))
    }

    pub fn default_dsv(&self) -> GraphicsResult<TextureView> {
        self.view(TextureViewDesc::mip(TextureViewType::DepthStencil, 0))
    }

    pub fn read_only_dsv(&self) -> GraphicsResult<TextureView> {
        self.view(TextureViewDesc::mip(TextureViewType::ReadOnlyDepthStencil, 0))
    }
}

/// A texture together with the sub-resource range and usage of one view.
#[derive(Clone, Debug)]
pub struct TextureView {
    texture: Texture,
    desc: TextureViewDesc,
}

impl TextureView {
    pub fn texture(&self) -> &Texture {
        &self.texture
    }

    pub fn desc(&self) -> &TextureViewDesc {
        &self.desc
    }

    pub fn view_type(&self) -> TextureViewType {
        self.desc.view_type
    }

    pub fn format(&self) -> TextureFormat {
        self.texture.desc().format
    }

    pub fn mip_range(&self) -> Range<u32> {
        self.desc.mip_range(self.texture.desc().mip_levels)
    }

    /// Extent of the most detailed mip covered by the view.
    pub fn extent(&self) -> (u32, u32) {
        self.texture.desc().mip_extent(self.desc.most_detailed_mip)
    }

    /// True when the two views touch at least one common mip of the same texture.
    pub fn overlaps(&self, other: &TextureView) -> bool {
        if !self.texture.ptr_eq(&other.texture) {
            return false;
        }
        let (a, b) = (self.mip_range(), other.mip_range());
        a.start < b.end && b.start < a.end
    }
}

impl PartialEq for TextureView {
    fn eq(&self, other: &Self) -> bool {
        self.texture.ptr_eq(&other.texture) && self.desc == other.desc
    }
}

/// Reference-counted buffer handle.
#[derive(Clone, Debug)]
pub struct Buffer(Arc<dyn BufferObject>);

impl Buffer {
    pub fn new(object: impl BufferObject) -> Self {
        Self(Arc::new(object))
    }

    pub fn desc(&self) -> &BufferDesc {
        self.0.desc()
    }

    pub fn ptr_eq(&self, other: &Buffer) -> bool {
        same_object(&self.0, &other.0)
    }

    pub fn downcast_ref<T: BufferObject>(&self) -> Option<&T> {
        self.0.as_any().downcast_ref::<T>()
    }
}

#[derive(Clone, Debug)]
pub struct Shader(Arc<dyn ShaderObject>);

impl Shader {
    pub fn new(object: impl ShaderObject) -> Self {
        Self(Arc::new(object))
    }

    pub fn create_info(&self) -> &ShaderCreateInfo {
        self.0.create_info()
    }

    pub fn ptr_eq(&self, other: &Shader) -> bool {
        same_object(&self.0, &other.0)
    }

    pub fn downcast_ref<T: ShaderObject>(&self) -> Option<&T> {
        self.0.as_any().downcast_ref::<T>()
    }
}

#[derive(Clone, Debug)]
pub struct PipelineState(Arc<dyn PipelineObject>);

impl PipelineState {
    pub fn new(object: impl PipelineObject) -> Self {
        Self(Arc::new(object))
    }

    pub fn desc(&self) -> &GraphicsPipelineDesc {
        self.0.desc()
    }

    pub fn name(&self) -> &str {
        &self.0.desc().name
    }

    pub fn ptr_eq(&self, other: &PipelineState) -> bool {
        same_object(&self.0, &other.0)
    }

    pub fn downcast_ref<T: PipelineObject>(&self) -> Option<&T> {
        self.0.as_any().downcast_ref::<T>()
    }
}

// ============================================================================
// Commands
// ============================================================================

#[derive(Clone, Debug)]
pub struct CopyTextureAttribs {
    pub src: Texture,
    pub src_mip: u32,
    pub dst: Texture,
    pub dst_mip: u32,
}

#[derive(Clone, Debug)]
pub struct StateTransitionDesc {
    pub texture: Texture,
    /// `ResourceState::Unknown` accepts whatever state is currently tracked.
    pub old_state: ResourceState,
    pub new_state: ResourceState,
    pub first_mip: u32,
    /// `REMAINING_MIP_LEVELS` for every mip from `first_mip` on.
    pub mip_count: u32,
    /// Record the new state in the texture's tracked state.
    pub update_state: bool,
}

impl StateTransitionDesc {
    pub fn mip_range(&self) -> Range<u32> {
        let total = self.texture.desc().mip_levels;
        let start = self.first_mip.min(total);
        let end = if self.mip_count == REMAINING_MIP_LEVELS {
            total
        } else {
            (start + self.mip_count).min(total)
        };
        start..end
    }
}

// ============================================================================
// Device interfaces
// ============================================================================

/// Resource and pipeline factory.
pub trait RenderDevice {
    fn device_info(&self) -> DeviceInfo;

    fn texture_format_info(&self, format: TextureFormat) -> TextureFormatInfo;

    /// `initial_data` fills mip 0, tightly packed rows of `format.bytes_per_texel()`.
    fn create_texture(&self, desc: &TextureDesc, initial_data: Option<&[u8]>)
        -> GraphicsResult<Texture>;

    fn create_buffer(&self, desc: &BufferDesc, initial_data: Option<&[u8]>)
        -> GraphicsResult<Buffer>;

    fn create_shader(&self, info: &ShaderCreateInfo) -> GraphicsResult<Shader>;

    fn create_graphics_pipeline(&self, desc: &GraphicsPipelineDesc)
        -> GraphicsResult<PipelineState>;
}

/// Immediate command recording interface.
pub trait DeviceContext {
    fn begin_debug_group(&mut self, name: &str);

    fn end_debug_group(&mut self);

    fn update_buffer(&mut self, buffer: &Buffer, offset: u64, data: &[u8]) -> GraphicsResult<()>;

    /// Binds render targets. An empty slice with no depth-stencil unbinds everything.
    fn set_render_targets(
        &mut self,
        rtvs: &[TextureView],
        dsv: Option<&TextureView>,
    ) -> GraphicsResult<()>;

    fn clear_render_target(&mut self, rtv: &TextureView, color: [f32; 4]) -> GraphicsResult<()>;

    fn clear_depth_stencil(
        &mut self,
        dsv: &TextureView,
        depth: Option<f32>,
        stencil: Option<u8>,
    ) -> GraphicsResult<()>;

    fn set_stencil_ref(&mut self, reference: u8);

    fn set_pipeline_state(&mut self, pipeline: &PipelineState) -> GraphicsResult<()>;

    /// Captures the binding's current resources for subsequent draws.
    fn commit_shader_resources(&mut self, bindings: &ShaderResourceBinding) -> GraphicsResult<()>;

    fn draw(&mut self, attribs: &DrawAttribs) -> GraphicsResult<()>;

    fn copy_texture(&mut self, attribs: &CopyTextureAttribs) -> GraphicsResult<()>;

    fn transition_resource_states(&mut self, barriers: &[StateTransitionDesc])
        -> GraphicsResult<()>;
}

/// Runs `f` inside a named debug group.
pub fn with_debug_group<T>(
    context: &mut dyn DeviceContext,
    name: &str,
    f: impl FnOnce(&mut dyn DeviceContext) -> T,
) -> T {
    context.begin_debug_group(name);
    let result = f(&mut *context);
    context.end_debug_group();
    result
}
