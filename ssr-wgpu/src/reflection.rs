//! WGSL parsing and binding reflection through naga.
//!
//! Techniques bind resources by shader variable name; the wgpu backend needs binding
//! slots and types. Both come from the parsed module.

use naga::valid::{Capabilities, ValidationFlags, Validator};

/// Resource class of one shader binding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BindingKind {
    UniformBuffer,
    FloatTexture,
    UintTexture,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShaderBinding {
    pub name: String,
    pub group: u32,
    pub binding: u32,
    pub kind: BindingKind,
}

/// Bindings and entry points of a validated module.
#[derive(Clone, Debug, Default)]
pub struct ShaderReflection {
    pub bindings: Vec<ShaderBinding>,
    pub entry_points: Vec<(String, naga::ShaderStage)>,
}

impl ShaderReflection {
    pub fn binding(&self, name: &str) -> Option<&ShaderBinding> {
        self.bindings.iter().find(|b| b.name == name)
    }

    pub fn has_entry_point(&self, name: &str, stage: naga::ShaderStage) -> bool {
        self.entry_points
            .iter()
            .any(|(entry, s)| entry == name && *s == stage)
    }
}

/// Parses and validates `source`, returning a readable diagnostic on failure.
pub fn reflect(label: &str, source: &str) -> Result<ShaderReflection, String> {
    let module = naga::front::wgsl::parse_str(source)
        .map_err(|e| e.emit_to_string_with_path(source, label))?;
    Validator::new(ValidationFlags::all(), Capabilities::all())
        .validate(&module)
        .map_err(|e| e.emit_to_string_with_path(source, label))?;

    let mut bindings = Vec::new();
    for (_, var) in module.global_variables.iter() {
        let (Some(binding), Some(name)) = (var.binding.as_ref(), var.name.as_ref()) else {
            continue;
        };
        let kind = match (&var.space, &module.types[var.ty].inner) {
            (naga::AddressSpace::Uniform, _) => BindingKind::UniformBuffer,
            (
                naga::AddressSpace::Handle,
                naga::TypeInner::Image {
                    class: naga::ImageClass::Sampled { kind, .. },
                    ..
                },
            ) => match kind {
                naga::ScalarKind::Uint => BindingKind::UintTexture,
                naga::ScalarKind::Float => BindingKind::FloatTexture,
                other => return Err(format!("{label}: unsupported texture kind {other:?} for '{name}'")),
            },
            (space, _) => {
                return Err(format!("{label}: unsupported binding '{name}' in {space:?}"))
            }
        };
        bindings.push(ShaderBinding {
            name: name.clone(),
            group: binding.group,
            binding: binding.binding,
            kind,
        });
    }
    bindings.sort_by_key(|b| (b.group, b.binding));

    let entry_points = module
        .entry_points
        .iter()
        .map(|ep| (ep.name.clone(), ep.stage))
        .collect();

    Ok(ShaderReflection {
        bindings,
        entry_points,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ssr_gpu_shared::shaders::{files, shader_source, SUPPORTED_SHADER_SRV};

    fn reflect_file(file: &str, views: bool) -> ShaderReflection {
        let macros = [(SUPPORTED_SHADER_SRV.to_string(), u32::from(views).to_string())];
        let source = shader_source(file, &macros).unwrap();
        reflect(file, &source).unwrap_or_else(|e| panic!("{e}"))
    }

    #[test]
    fn every_shader_validates() {
        for file in files::ALL {
            reflect_file(file, true);
        }
        reflect_file(files::COMPUTE_HIERARCHICAL_DEPTH_BUFFER, false);
    }

    #[test]
    fn hierarchy_variants_expose_their_inputs() {
        let views = reflect_file(files::COMPUTE_HIERARCHICAL_DEPTH_BUFFER, true);
        assert_eq!(views.binding("g_TextureLastMip").unwrap().kind, BindingKind::FloatTexture);
        assert!(views.binding("cbTextureMipAttribs").is_none());

        let mips = reflect_file(files::COMPUTE_HIERARCHICAL_DEPTH_BUFFER, false);
        assert_eq!(
            mips.binding("cbTextureMipAttribs").unwrap().kind,
            BindingKind::UniformBuffer
        );
        assert!(mips.binding("g_TextureMips").is_some());
    }

    #[test]
    fn temporal_bindings_are_ordered_by_slot() {
        let temporal = reflect_file(files::COMPUTE_TEMPORAL_ACCUMULATION, true);
        let slots: Vec<u32> = temporal.bindings.iter().map(|b| b.binding).collect();
        assert_eq!(slots, (0..11).collect::<Vec<_>>());
        assert_eq!(temporal.bindings[0].name, "cbCameraAttribs");
        assert!(temporal.has_entry_point("compute_temporal_accumulation_ps", naga::ShaderStage::Fragment));
    }

    #[test]
    fn blue_noise_tables_are_integer_textures() {
        let noise = reflect_file(files::COMPUTE_BLUE_NOISE_TEXTURE, true);
        assert_eq!(noise.binding("g_SobolBuffer").unwrap().kind, BindingKind::UintTexture);
    }

    #[test]
    fn syntax_errors_are_reported() {
        let error = reflect("broken.wgsl", "fn main( {").unwrap_err();
        assert!(error.contains("broken.wgsl"));
    }
}
