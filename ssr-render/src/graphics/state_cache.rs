//! Shader and pipeline deduplication shared across effect instances.

use std::collections::HashMap;

use parking_lot::Mutex;

use super::device::{PipelineState, RenderDevice, Shader};
use super::pipeline::{GraphicsPipelineDesc, PipelineCacheKey};
use super::types::ShaderCreateInfo;
use crate::error::GraphicsResult;

/// Caches compiled shaders by create info and pipelines by their full description.
#[derive(Debug, Default)]
pub struct RenderStateCache {
    shaders: Mutex<HashMap<ShaderCreateInfo, Shader>>,
    pipelines: Mutex<HashMap<PipelineCacheKey, PipelineState>>,
}

impl RenderStateCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create_shader(
        &self,
        device: &dyn RenderDevice,
        info: &ShaderCreateInfo,
    ) -> GraphicsResult<Shader> {
        if let Some(shader) = self.shaders.lock().get(info) {
            return Ok(shader.clone());
        }
        let shader = device.create_shader(info)?;
        self.shaders.lock().insert(info.clone(), shader.clone());
        Ok(shader)
    }

    pub fn get_or_create_graphics_pipeline(
        &self,
        device: &dyn RenderDevice,
        desc: &GraphicsPipelineDesc,
    ) -> GraphicsResult<PipelineState> {
        let key = desc.cache_key();
        if let Some(pipeline) = self.pipelines.lock().get(&key) {
            return Ok(pipeline.clone());
        }
        let pipeline = device.create_graphics_pipeline(desc)?;
        self.pipelines.lock().insert(key, pipeline.clone());
        Ok(pipeline)
    }

    pub fn shader_count(&self) -> usize {
        self.shaders.lock().len()
    }

    pub fn pipeline_count(&self) -> usize {
        self.pipelines.lock().len()
    }
}
