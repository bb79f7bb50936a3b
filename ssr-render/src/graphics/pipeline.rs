//! Pipeline descriptions, resource layouts and shader resource bindings.

use std::collections::BTreeMap;

use super::device::{Buffer, PipelineState, Shader, TextureView};
use super::types::*;
use crate::error::{GraphicsError, GraphicsResult};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ShaderVariableDesc {
    pub name: String,
    pub var_type: ShaderResourceVariableType,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ImmutableSamplerDesc {
    /// Texture variable the sampler is attached to.
    pub texture_name: String,
    pub sampler: SamplerDesc,
}

/// Shader variables a pipeline exposes for binding.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct PipelineResourceLayoutDesc {
    pub variables: Vec<ShaderVariableDesc>,
    pub immutable_samplers: Vec<ImmutableSamplerDesc>,
}

impl PipelineResourceLayoutDesc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_variable(mut self, name: &str, var_type: ShaderResourceVariableType) -> Self {
        self.variables.push(ShaderVariableDesc {
            name: name.to_string(),
            var_type,
        });
        self
    }

    pub fn add_immutable_sampler(mut self, texture_name: &str, sampler: SamplerDesc) -> Self {
        self.immutable_samplers.push(ImmutableSamplerDesc {
            texture_name: texture_name.to_string(),
            sampler,
        });
        self
    }

    pub fn variable(&self, name: &str) -> Option<&ShaderVariableDesc> {
        self.variables.iter().find(|v| v.name == name)
    }

    pub fn sampler_for(&self, texture_name: &str) -> Option<SamplerDesc> {
        self.immutable_samplers
            .iter()
            .find(|s| s.texture_name == texture_name)
            .map(|s| s.sampler)
    }
}

/// Full description of a full-screen graphics pipeline.
#[derive(Clone, Debug)]
pub struct GraphicsPipelineDesc {
    pub name: String,
    pub vs: Shader,
    pub ps: Shader,
    pub layout: PipelineResourceLayoutDesc,
    pub rtv_formats: Vec<TextureFormat>,
    /// `TextureFormat::Unknown` when the pipeline has no depth-stencil attachment.
    pub dsv_format: TextureFormat,
    pub depth_stencil: DepthStencilStateDesc,
    pub blend: BlendStateDesc,
    pub read_only_dsv: bool,
}

/// Identity of a pipeline for deduplication.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PipelineCacheKey {
    pub name: String,
    pub vs: ShaderCreateInfo,
    pub ps: ShaderCreateInfo,
    pub layout: PipelineResourceLayoutDesc,
    pub rtv_formats: Vec<TextureFormat>,
    pub dsv_format: TextureFormat,
    pub depth_stencil: DepthStencilStateDesc,
    pub blend: BlendStateDesc,
    pub read_only_dsv: bool,
}

impl GraphicsPipelineDesc {
    pub fn cache_key(&self) -> PipelineCacheKey {
        PipelineCacheKey {
            name: self.name.clone(),
            vs: self.vs.create_info().clone(),
            ps: self.ps.create_info().clone(),
            layout: self.layout.clone(),
            rtv_formats: self.rtv_formats.clone(),
            dsv_format: self.dsv_format,
            depth_stencil: self.depth_stencil,
            blend: self.blend,
            read_only_dsv: self.read_only_dsv,
        }
    }

    pub fn has_depth_stencil(&self) -> bool {
        self.dsv_format != TextureFormat::Unknown
    }
}

/// Resource bound to a shader variable.
#[derive(Clone, Debug)]
pub enum BoundResource {
    Texture(TextureView),
    Buffer(Buffer),
}

impl From<TextureView> for BoundResource {
    fn from(view: TextureView) -> Self {
        Self::Texture(view)
    }
}

impl From<Buffer> for BoundResource {
    fn from(buffer: Buffer) -> Self {
        Self::Buffer(buffer)
    }
}

impl BoundResource {
    pub fn as_texture(&self) -> Option<&TextureView> {
        match self {
            Self::Texture(view) => Some(view),
            Self::Buffer(_) => None,
        }
    }

    pub fn as_buffer(&self) -> Option<&Buffer> {
        match self {
            Self::Buffer(buffer) => Some(buffer),
            Self::Texture(_) => None,
        }
    }
}

/// Resources bound to the variables of one pipeline.
#[derive(Clone, Debug)]
pub struct ShaderResourceBinding {
    pipeline: PipelineState,
    resources: BTreeMap<String, BoundResource>,
}

impl ShaderResourceBinding {
    pub fn new(pipeline: PipelineState) -> Self {
        Self {
            pipeline,
            resources: BTreeMap::new(),
        }
    }

    pub fn pipeline(&self) -> &PipelineState {
        &self.pipeline
    }

    /// Binds `resource` to the layout variable `name`.
    pub fn set(&mut self, name: &str, resource: impl Into<BoundResource>) -> GraphicsResult<()> {
        if self.pipeline.desc().layout.variable(name).is_none() {
            return Err(GraphicsError::UnknownVariable {
                pipeline: self.pipeline.name().to_string(),
                name: name.to_string(),
            });
        }
        self.resources.insert(name.to_string(), resource.into());
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&BoundResource> {
        self.resources.get(name)
    }

    pub fn resources(&self) -> impl Iterator<Item = (&str, &BoundResource)> {
        self.resources.iter().map(|(name, res)| (name.as_str(), res))
    }

    /// Layout variables that have nothing bound yet.
    pub fn unbound_variables(&self) -> Vec<&str> {
        self.pipeline
            .desc()
            .layout
            .variables
            .iter()
            .filter(|v| !self.resources.contains_key(&v.name))
            .map(|v| v.name.as_str())
            .collect()
    }
}
