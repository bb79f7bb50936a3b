//! Lazily built pipeline + binding pair used by one effect pass.

use std::collections::BTreeMap;

use crate::error::{GraphicsError, GraphicsResult};
use crate::graphics::{
    BoundResource, GraphicsPipelineDesc, PipelineState, RenderDevice, RenderStateCache, Shader,
    ShaderCreateInfo, ShaderResourceBinding, ShaderType, TextureFormat,
};

/// Pipeline state and shader resource binding of one pass, built once and bound many times.
#[derive(Debug, Default)]
pub struct RenderTechnique {
    pipeline: Option<PipelineState>,
    bindings: Option<ShaderResourceBinding>,
    statics: BTreeMap<String, BoundResource>,
}

impl RenderTechnique {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_initialized(&self) -> bool {
        self.pipeline.is_some() && self.bindings.is_some()
    }

    /// Compiles (or fetches from `cache`) one shader stage.
    pub fn create_shader(
        device: &dyn RenderDevice,
        cache: Option<&RenderStateCache>,
        file: &str,
        entry_point: &str,
        shader_type: ShaderType,
        macros: &[(&str, String)],
    ) -> GraphicsResult<Shader> {
        let mut info = ShaderCreateInfo::new(file, entry_point, shader_type);
        for (name, value) in macros {
            info = info.with_macro(name, value);
        }
        match cache {
            Some(cache) => cache.get_or_create_shader(device, &info),
            None => device.create_shader(&info),
        }
    }

    /// Builds the pipeline for the exact output formats in `desc`.
    pub fn initialize_pso(
        &mut self,
        device: &dyn RenderDevice,
        cache: Option<&RenderStateCache>,
        desc: &GraphicsPipelineDesc,
    ) -> GraphicsResult<()> {
        let pipeline = match cache {
            Some(cache) => cache.get_or_create_graphics_pipeline(device, desc)?,
            None => device.create_graphics_pipeline(desc)?,
        };
        log::debug!(
            "built pipeline '{}' ({:?}, depth-stencil {:?})",
            desc.name,
            desc.rtv_formats,
            desc.dsv_format
        );
        self.pipeline = Some(pipeline);
        self.bindings = None;
        Ok(())
    }

    /// Binds a static variable. Applies to the current binding instance as well, if any.
    pub fn set_static_variable(
        &mut self,
        name: &str,
        resource: impl Into<BoundResource>,
    ) -> GraphicsResult<()> {
        let resource = resource.into();
        if let Some(bindings) = self.bindings.as_mut() {
            bindings.set(name, resource.clone())?;
        }
        self.statics.insert(name.to_string(), resource);
        Ok(())
    }

    pub fn static_variable(&self, name: &str) -> Option<&BoundResource> {
        self.statics.get(name)
    }

    /// Allocates the binding instance, copying static variables into it when requested.
    pub fn initialize_srb(&mut self, init_static_resources: bool) -> GraphicsResult<()> {
        let pipeline = self.pipeline.as_ref().ok_or_else(|| {
            GraphicsError::Backend("shader resource binding requested before the pipeline".into())
        })?;
        let mut bindings = ShaderResourceBinding::new(pipeline.clone());
        if init_static_resources {
            for (name, resource) in &self.statics {
                bindings.set(name, resource.clone())?;
            }
        }
        self.bindings = Some(bindings);
        Ok(())
    }

    pub fn pipeline(&self) -> Option<&PipelineState> {
        self.pipeline.as_ref()
    }

    pub fn bindings(&self) -> Option<&ShaderResourceBinding> {
        self.bindings.as_ref()
    }

    pub fn bindings_mut(&mut self) -> Option<&mut ShaderResourceBinding> {
        self.bindings.as_mut()
    }

    /// Pipeline and binding of an initialized technique.
    pub fn parts_mut(&mut self) -> GraphicsResult<(&PipelineState, &mut ShaderResourceBinding)> {
        match (self.pipeline.as_ref(), self.bindings.as_mut()) {
            (Some(pipeline), Some(bindings)) => Ok((pipeline, bindings)),
            _ => Err(GraphicsError::Backend("render technique is not initialized".into())),
        }
    }

    /// True when the built pipeline writes exactly these formats.
    pub fn matches_output_formats(
        &self,
        rtv_formats: &[TextureFormat],
        dsv_format: TextureFormat,
    ) -> bool {
        self.pipeline.as_ref().is_some_and(|pipeline| {
            let desc = pipeline.desc();
            desc.rtv_formats == rtv_formats && desc.dsv_format == dsv_format
        })
    }

    /// Drops the pipeline, bindings and static variables so the next use rebuilds them.
    pub fn reset(&mut self) {
        self.pipeline = None;
        self.bindings = None;
        self.statics.clear();
    }
}

#[cfg(test)]
mod tests {
    use ssr_gpu_shared::shaders::files;

    use super::*;
    use crate::graphics::{
        BindFlags, BlendStateDesc, DepthStencilStateDesc, PipelineResourceLayoutDesc,
        ShaderResourceVariableType, TextureDesc,
    };
    use crate::soft::{SoftDevice, SoftDeviceConfig};

    fn copy_depth_desc(
        device: &SoftDevice,
        cache: Option<&RenderStateCache>,
        format: TextureFormat,
    ) -> GraphicsPipelineDesc {
        let vs = RenderTechnique::create_shader(
            device,
            cache,
            files::FULL_SCREEN_TRIANGLE,
            "full_screen_triangle_vs",
            ShaderType::Vertex,
            &[],
        )
        .unwrap();
        let ps = RenderTechnique::create_shader(
            device,
            cache,
            files::COPY_DEPTH,
            "copy_depth_ps",
            ShaderType::Pixel,
            &[],
        )
        .unwrap();
        GraphicsPipelineDesc {
            name: "CopyDepth".to_string(),
            vs,
            ps,
            layout: PipelineResourceLayoutDesc::new()
                .add_variable("g_TextureDepth", ShaderResourceVariableType::Static),
            rtv_formats: vec![format],
            dsv_format: TextureFormat::Unknown,
            depth_stencil: DepthStencilStateDesc::DISABLE_DEPTH,
            blend: BlendStateDesc::default(),
            read_only_dsv: false,
        }
    }

    fn depth_srv(device: &SoftDevice) -> crate::graphics::TextureView {
        let desc = TextureDesc::new_2d("depth", 4, 4, TextureFormat::R32Float, BindFlags::SHADER_RESOURCE);
        device.create_texture(&desc, None).unwrap().default_srv().unwrap()
    }

    #[test]
    fn bindings_require_a_pipeline() {
        let mut technique = RenderTechnique::new();
        assert!(!technique.is_initialized());
        assert!(technique.initialize_srb(true).is_err());
        assert!(technique.parts_mut().is_err());
    }

    #[test]
    fn static_variables_carry_into_new_bindings() {
        let device = SoftDevice::new(SoftDeviceConfig::d3d12());
        let mut technique = RenderTechnique::new();
        technique
            .initialize_pso(&device, None, &copy_depth_desc(&device, None, TextureFormat::R32Float))
            .unwrap();
        let srv = depth_srv(&device);
        technique.set_static_variable("g_TextureDepth", srv.clone()).unwrap();

        technique.initialize_srb(false).unwrap();
        assert!(technique.bindings().unwrap().get("g_TextureDepth").is_none());

        technique.initialize_srb(true).unwrap();
        assert!(technique.is_initialized());
        let bound = technique.bindings().unwrap().get("g_TextureDepth").unwrap();
        assert!(bound.as_texture().unwrap().texture().ptr_eq(srv.texture()));

        let (_, bindings) = technique.parts_mut().unwrap();
        assert!(bindings.set("g_TextureUndeclared", srv).is_err());
    }

    #[test]
    fn format_mismatch_is_detected_and_reset_rebuilds() {
        let device = SoftDevice::new(SoftDeviceConfig::vulkan());
        let mut technique = RenderTechnique::new();
        technique
            .initialize_pso(&device, None, &copy_depth_desc(&device, None, TextureFormat::R32Float))
            .unwrap();
        technique.set_static_variable("g_TextureDepth", depth_srv(&device)).unwrap();
        technique.initialize_srb(true).unwrap();

        assert!(technique.matches_output_formats(&[TextureFormat::R32Float], TextureFormat::Unknown));
        assert!(!technique.matches_output_formats(&[TextureFormat::R16Float], TextureFormat::Unknown));
        assert!(!technique
            .matches_output_formats(&[TextureFormat::R32Float], TextureFormat::D24UnormS8Uint));

        technique.reset();
        assert!(!technique.is_initialized());
        assert!(technique.static_variable("g_TextureDepth").is_none());
        assert!(!technique.matches_output_formats(&[TextureFormat::R32Float], TextureFormat::Unknown));

        technique
            .initialize_pso(&device, None, &copy_depth_desc(&device, None, TextureFormat::R16Float))
            .unwrap();
        assert!(technique.matches_output_formats(&[TextureFormat::R16Float], TextureFormat::Unknown));
        assert_eq!(device.stats().pipelines, 2);
    }
}
