//! Shader modules and full-screen render pipelines.

use std::any::Any;

use ssr_gpu_shared::shaders::shader_source;
use ssr_render::graphics::{
    GraphicsPipelineDesc, PipelineObject, ShaderCreateInfo, ShaderObject, ShaderType,
};
use ssr_render::{GraphicsError, GraphicsResult};

use crate::conversions;
use crate::reflection::{self, BindingKind, ShaderBinding, ShaderReflection};

#[derive(Debug)]
pub struct WgpuShader {
    pub(crate) info: ShaderCreateInfo,
    pub(crate) module: wgpu::ShaderModule,
    pub(crate) reflection: ShaderReflection,
}

impl ShaderObject for WgpuShader {
    fn create_info(&self) -> &ShaderCreateInfo {
        &self.info
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug)]
pub struct WgpuPipeline {
    pub(crate) desc: GraphicsPipelineDesc,
    pub(crate) pipeline: wgpu::RenderPipeline,
    pub(crate) bind_group_layout: wgpu::BindGroupLayout,
    /// Pixel shader bindings, ordered by slot.
    pub(crate) bindings: Vec<ShaderBinding>,
}

impl PipelineObject for WgpuPipeline {
    fn desc(&self) -> &GraphicsPipelineDesc {
        &self.desc
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn stage(shader_type: ShaderType) -> naga::ShaderStage {
    match shader_type {
        ShaderType::Vertex => naga::ShaderStage::Vertex,
        ShaderType::Pixel => naga::ShaderStage::Fragment,
    }
}

/// Resolves, validates and compiles one WGSL entry point.
pub fn create_shader(device: &wgpu::Device, info: &ShaderCreateInfo) -> GraphicsResult<WgpuShader> {
    let failed = |message: String| GraphicsError::ShaderCompilation {
        file: info.file_path.clone(),
        entry_point: info.entry_point.clone(),
        message,
    };

    let source = shader_source(&info.file_path, &info.macros)
        .ok_or_else(|| failed("unknown shader file".to_string()))?;
    let reflection = reflection::reflect(&info.file_path, &source).map_err(failed)?;
    if !reflection.has_entry_point(&info.entry_point, stage(info.shader_type)) {
        return Err(failed(format!(
            "no {:?} entry point named '{}'",
            info.shader_type, info.entry_point
        )));
    }

    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(&info.file_path),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });
    log::debug!("compiled {} ({})", info.file_path, info.entry_point);

    Ok(WgpuShader {
        info: info.clone(),
        module,
        reflection,
    })
}

fn bind_group_layout_entry(binding: &ShaderBinding) -> wgpu::BindGroupLayoutEntry {
    let ty = match binding.kind {
        BindingKind::UniformBuffer => wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        // Shaders only use textureLoad, so depth and 32-bit float textures bind as well.
        BindingKind::FloatTexture => wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: false },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        BindingKind::UintTexture => wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Uint,
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
    };
    wgpu::BindGroupLayoutEntry {
        binding: binding.binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty,
        count: None,
    }
}

/// Full-screen triangle pipeline: no vertex buffers, no blending, optional stencil.
pub fn create_pipeline(
    device: &wgpu::Device,
    desc: &GraphicsPipelineDesc,
) -> GraphicsResult<WgpuPipeline> {
    let failed = |message: String| GraphicsError::PipelineCreation {
        name: desc.name.clone(),
        message,
    };

    let (Some(vs), Some(ps)) = (
        desc.vs.downcast_ref::<WgpuShader>(),
        desc.ps.downcast_ref::<WgpuShader>(),
    ) else {
        return Err(failed("shaders were not created by wgpu".to_string()));
    };
    if desc.blend.blend_enable {
        return Err(failed("blending is not supported".to_string()));
    }

    let bindings = ps.reflection.bindings.clone();
    if let Some(other) = bindings.iter().find(|b| b.group != 0) {
        return Err(failed(format!("'{}' is outside bind group 0", other.name)));
    }
    for variable in &desc.layout.variables {
        if !bindings.iter().any(|b| b.name == variable.name) {
            return Err(failed(format!("shader does not declare '{}'", variable.name)));
        }
    }

    let entries: Vec<_> = bindings.iter().map(bind_group_layout_entry).collect();
    let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(&format!("{} BGL", desc.name)),
        entries: &entries,
    });
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(&format!("{} Layout", desc.name)),
        bind_group_layouts: &[&bind_group_layout],
        push_constant_ranges: &[],
    });

    let targets = desc
        .rtv_formats
        .iter()
        .map(|format| {
            let format = conversions::texture_format(*format)
                .ok_or_else(|| failed(format!("unsupported render target format {format:?}")))?;
            Ok(Some(wgpu::ColorTargetState {
                format,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            }))
        })
        .collect::<GraphicsResult<Vec<_>>>()?;

    let depth_stencil = if desc.has_depth_stencil() {
        let format = conversions::texture_format(desc.dsv_format)
            .ok_or_else(|| failed(format!("unsupported depth format {:?}", desc.dsv_format)))?;
        Some(conversions::depth_stencil_state(
            format,
            &desc.depth_stencil,
            desc.read_only_dsv,
        ))
    } else {
        None
    };

    let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(&desc.name),
        layout: Some(&layout),
        vertex: wgpu::VertexState {
            module: &vs.module,
            entry_point: Some(&vs.info.entry_point),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            buffers: &[],
        },
        fragment: Some(wgpu::FragmentState {
            module: &ps.module,
            entry_point: Some(&ps.info.entry_point),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            targets: &targets,
        }),
        primitive: wgpu::PrimitiveState::default(),
        depth_stencil,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    });
    log::debug!("created pipeline '{}'", desc.name);

    Ok(WgpuPipeline {
        desc: desc.clone(),
        pipeline,
        bind_group_layout,
        bindings,
    })
}
