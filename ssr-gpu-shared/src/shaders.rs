//! Embedded WGSL shader sources for the screen-space reflection passes.
//! Every module is prefixed with the shared declarations in `common.wgsl`.

pub const COMMON: &str = include_str!("../shaders/common.wgsl");
pub const FULL_SCREEN_TRIANGLE: &str = include_str!("../shaders/full_screen_triangle.wgsl");
pub const COPY_DEPTH: &str = include_str!("../shaders/copy_depth.wgsl");
pub const HIERARCHICAL_DEPTH_SRV: &str = include_str!("../shaders/hierarchical_depth_srv.wgsl");
pub const HIERARCHICAL_DEPTH_MIPS: &str = include_str!("../shaders/hierarchical_depth_mips.wgsl");
pub const COMPUTE_HIERARCHICAL_DEPTH_BUFFER: &str =
    include_str!("../shaders/compute_hierarchical_depth_buffer.wgsl");
pub const COMPUTE_STENCIL_MASK_AND_EXTRACT_ROUGHNESS: &str =
    include_str!("../shaders/compute_stencil_mask_and_extract_roughness.wgsl");
pub const COMPUTE_INTERSECTION: &str = include_str!("../shaders/compute_intersection.wgsl");
pub const COMPUTE_SPATIAL_RECONSTRUCTION: &str =
    include_str!("../shaders/compute_spatial_reconstruction.wgsl");
pub const COMPUTE_TEMPORAL_ACCUMULATION: &str =
    include_str!("../shaders/compute_temporal_accumulation.wgsl");
pub const COMPUTE_BILATERAL_CLEANUP: &str = include_str!("../shaders/compute_bilateral_cleanup.wgsl");
pub const COMPUTE_BLUE_NOISE_TEXTURE: &str = include_str!("../shaders/compute_blue_noise_texture.wgsl");

/// Shader file names as referenced by render techniques.
pub mod files {
    pub const FULL_SCREEN_TRIANGLE: &str = "full_screen_triangle.wgsl";
    pub const COPY_DEPTH: &str = "copy_depth.wgsl";
    pub const COMPUTE_HIERARCHICAL_DEPTH_BUFFER: &str = "compute_hierarchical_depth_buffer.wgsl";
    pub const COMPUTE_STENCIL_MASK_AND_EXTRACT_ROUGHNESS: &str =
        "compute_stencil_mask_and_extract_roughness.wgsl";
    pub const COMPUTE_INTERSECTION: &str = "compute_intersection.wgsl";
    pub const COMPUTE_SPATIAL_RECONSTRUCTION: &str = "compute_spatial_reconstruction.wgsl";
    pub const COMPUTE_TEMPORAL_ACCUMULATION: &str = "compute_temporal_accumulation.wgsl";
    pub const COMPUTE_BILATERAL_CLEANUP: &str = "compute_bilateral_cleanup.wgsl";
    pub const COMPUTE_BLUE_NOISE_TEXTURE: &str = "compute_blue_noise_texture.wgsl";

    pub const ALL: [&str; 9] = [
        FULL_SCREEN_TRIANGLE,
        COPY_DEPTH,
        COMPUTE_HIERARCHICAL_DEPTH_BUFFER,
        COMPUTE_STENCIL_MASK_AND_EXTRACT_ROUGHNESS,
        COMPUTE_INTERSECTION,
        COMPUTE_SPATIAL_RECONSTRUCTION,
        COMPUTE_TEMPORAL_ACCUMULATION,
        COMPUTE_BILATERAL_CLEANUP,
        COMPUTE_BLUE_NOISE_TEXTURE,
    ];
}

/// Selects the Hi-Z variant that reads the previous mip through a single-mip view.
pub const SUPPORTED_SHADER_SRV: &str = "SUPPORTED_SHADER_SRV";

fn macro_enabled(macros: &[(String, String)], name: &str) -> bool {
    macros
        .iter()
        .any(|(n, value)| n == name && value.trim() != "0" && !value.trim().is_empty())
}

fn compose(parts: &[&str]) -> String {
    let mut source = String::from(COMMON);
    for part in parts {
        source.push('\n');
        source.push_str(part);
    }
    source
}

/// Returns the complete WGSL module for `file` under the given macro definitions,
/// or `None` when the file is unknown.
pub fn shader_source(file: &str, macros: &[(String, String)]) -> Option<String> {
    let source = match file {
        files::FULL_SCREEN_TRIANGLE => compose(&[FULL_SCREEN_TRIANGLE]),
        files::COPY_DEPTH => compose(&[COPY_DEPTH]),
        files::COMPUTE_HIERARCHICAL_DEPTH_BUFFER => {
            let bindings = if macro_enabled(macros, SUPPORTED_SHADER_SRV) {
                HIERARCHICAL_DEPTH_SRV
            } else {
                HIERARCHICAL_DEPTH_MIPS
            };
            compose(&[bindings, COMPUTE_HIERARCHICAL_DEPTH_BUFFER])
        }
        files::COMPUTE_STENCIL_MASK_AND_EXTRACT_ROUGHNESS => {
            compose(&[COMPUTE_STENCIL_MASK_AND_EXTRACT_ROUGHNESS])
        }
        files::COMPUTE_INTERSECTION => compose(&[COMPUTE_INTERSECTION]),
        files::COMPUTE_SPATIAL_RECONSTRUCTION => compose(&[COMPUTE_SPATIAL_RECONSTRUCTION]),
        files::COMPUTE_TEMPORAL_ACCUMULATION => compose(&[COMPUTE_TEMPORAL_ACCUMULATION]),
        files::COMPUTE_BILATERAL_CLEANUP => compose(&[COMPUTE_BILATERAL_CLEANUP]),
        files::COMPUTE_BLUE_NOISE_TEXTURE => compose(&[COMPUTE_BLUE_NOISE_TEXTURE]),
        _ => return None,
    };
    Some(source)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_file_resolves() {
        for file in files::ALL {
            let source = shader_source(file, &[]).expect(file);
            assert!(source.starts_with(COMMON));
        }
        assert!(shader_source("missing.wgsl", &[]).is_none());
    }

    #[test]
    fn hierarchical_depth_variant_follows_macro() {
        let with_views = shader_source(
            files::COMPUTE_HIERARCHICAL_DEPTH_BUFFER,
            &[(SUPPORTED_SHADER_SRV.to_string(), "1".to_string())],
        )
        .unwrap();
        let without_views = shader_source(
            files::COMPUTE_HIERARCHICAL_DEPTH_BUFFER,
            &[(SUPPORTED_SHADER_SRV.to_string(), "0".to_string())],
        )
        .unwrap();
        assert!(with_views.contains("g_TextureLastMip"));
        assert!(without_views.contains("cbTextureMipAttribs"));
        assert!(!without_views.contains("g_TextureLastMip"));
    }
}
