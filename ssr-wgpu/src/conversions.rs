//! Mapping of the backend-neutral descriptors onto wgpu types.

use ssr_render::graphics::{
    BindFlags, ComparisonFunc, DepthStencilStateDesc, StencilOp, TextureFormat,
};

/// wgpu format for `format`, `None` when wgpu has no equivalent.
pub fn texture_format(format: TextureFormat) -> Option<wgpu::TextureFormat> {
    let format = match format {
        TextureFormat::Unknown => return None,
        TextureFormat::R8Unorm => wgpu::TextureFormat::R8Unorm,
        TextureFormat::Rg8Unorm => wgpu::TextureFormat::Rg8Unorm,
        TextureFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        TextureFormat::R16Float => wgpu::TextureFormat::R16Float,
        TextureFormat::Rg16Float => wgpu::TextureFormat::Rg16Float,
        TextureFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
        TextureFormat::R32Float => wgpu::TextureFormat::R32Float,
        TextureFormat::R32Uint => wgpu::TextureFormat::R32Uint,
        TextureFormat::D32Float => wgpu::TextureFormat::Depth32Float,
        // Stencil is exact, depth precision is at least 24 bits.
        TextureFormat::D24UnormS8Uint => wgpu::TextureFormat::Depth24PlusStencil8,
        TextureFormat::D32FloatS8X24Uint => wgpu::TextureFormat::Depth32FloatStencil8,
    };
    Some(format)
}

/// Usages for a texture created with `bind_flags`. Color textures can always be copied.
pub fn texture_usages(format: TextureFormat, bind_flags: BindFlags) -> wgpu::TextureUsages {
    let mut usages = wgpu::TextureUsages::empty();
    if bind_flags.contains(BindFlags::SHADER_RESOURCE) {
        usages |= wgpu::TextureUsages::TEXTURE_BINDING;
    }
    if bind_flags.contains(BindFlags::RENDER_TARGET) || bind_flags.contains(BindFlags::DEPTH_STENCIL) {
        usages |= wgpu::TextureUsages::RENDER_ATTACHMENT;
    }
    if !format.is_depth() {
        usages |= wgpu::TextureUsages::COPY_SRC | wgpu::TextureUsages::COPY_DST;
    } else if !format.has_stencil() {
        usages |= wgpu::TextureUsages::COPY_SRC;
    }
    usages
}

pub fn compare_function(func: ComparisonFunc) -> wgpu::CompareFunction {
    match func {
        ComparisonFunc::Never => wgpu::CompareFunction::Never,
        ComparisonFunc::Less => wgpu::CompareFunction::Less,
        ComparisonFunc::Equal => wgpu::CompareFunction::Equal,
        ComparisonFunc::LessEqual => wgpu::CompareFunction::LessEqual,
        ComparisonFunc::Greater => wgpu::CompareFunction::Greater,
        ComparisonFunc::NotEqual => wgpu::CompareFunction::NotEqual,
        ComparisonFunc::GreaterEqual => wgpu::CompareFunction::GreaterEqual,
        ComparisonFunc::Always => wgpu::CompareFunction::Always,
    }
}

pub fn stencil_operation(op: StencilOp) -> wgpu::StencilOperation {
    match op {
        StencilOp::Keep => wgpu::StencilOperation::Keep,
        StencilOp::Zero => wgpu::StencilOperation::Zero,
        StencilOp::Replace => wgpu::StencilOperation::Replace,
        StencilOp::IncrSat => wgpu::StencilOperation::IncrementClamp,
        StencilOp::DecrSat => wgpu::StencilOperation::DecrementClamp,
        StencilOp::Invert => wgpu::StencilOperation::Invert,
        StencilOp::IncrWrap => wgpu::StencilOperation::IncrementWrap,
        StencilOp::DecrWrap => wgpu::StencilOperation::DecrementWrap,
    }
}

/// Depth-stencil state for an attachment of `format`. Depth testing is never enabled by
/// the effects, so only the stencil half carries over. A read-only attachment gets a zero
/// write mask.
pub fn depth_stencil_state(
    format: wgpu::TextureFormat,
    desc: &DepthStencilStateDesc,
    read_only: bool,
) -> wgpu::DepthStencilState {
    let stencil = if desc.stencil_enable {
        let face = wgpu::StencilFaceState {
            compare: compare_function(desc.front_face.func),
            fail_op: stencil_operation(desc.front_face.fail_op),
            depth_fail_op: stencil_operation(desc.front_face.depth_fail_op),
            pass_op: stencil_operation(desc.front_face.pass_op),
        };
        wgpu::StencilState {
            front: face,
            back: face,
            read_mask: u32::from(desc.stencil_read_mask),
            write_mask: if read_only {
                0
            } else {
                u32::from(desc.stencil_write_mask)
            },
        }
    } else {
        wgpu::StencilState::default()
    };

    wgpu::DepthStencilState {
        format,
        depth_write_enabled: desc.depth_enable && desc.depth_write_enable && !read_only,
        depth_compare: if desc.depth_enable {
            compare_function(desc.depth_func)
        } else {
            wgpu::CompareFunction::Always
        },
        stencil,
        bias: wgpu::DepthBiasState::default(),
    }
}

/// Aspect a shader view of `format` reads.
pub fn sampled_aspect(format: TextureFormat) -> wgpu::TextureAspect {
    if format.has_stencil() {
        wgpu::TextureAspect::DepthOnly
    } else {
        wgpu::TextureAspect::All
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stencil_formats_map_to_combined_formats() {
        assert_eq!(
            texture_format(TextureFormat::D24UnormS8Uint),
            Some(wgpu::TextureFormat::Depth24PlusStencil8)
        );
        assert_eq!(
            texture_format(TextureFormat::D32FloatS8X24Uint),
            Some(wgpu::TextureFormat::Depth32FloatStencil8)
        );
        assert_eq!(texture_format(TextureFormat::Unknown), None);
    }

    #[test]
    fn bytes_per_texel_agree_with_wgpu() {
        for format in [
            TextureFormat::R8Unorm,
            TextureFormat::Rg8Unorm,
            TextureFormat::Rgba8Unorm,
            TextureFormat::R16Float,
            TextureFormat::Rg16Float,
            TextureFormat::Rgba16Float,
            TextureFormat::R32Float,
            TextureFormat::R32Uint,
            TextureFormat::D32Float,
        ] {
            let wgpu_format = texture_format(format).unwrap();
            assert_eq!(
                wgpu_format.block_copy_size(None),
                Some(format.bytes_per_texel() as u32),
                "{format:?}"
            );
        }
    }

    #[test]
    fn usages_follow_bind_flags() {
        let color = texture_usages(
            TextureFormat::Rgba16Float,
            BindFlags::SHADER_RESOURCE | BindFlags::RENDER_TARGET,
        );
        assert!(color.contains(
            wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::COPY_DST
        ));

        let mask = texture_usages(TextureFormat::D24UnormS8Uint, BindFlags::DEPTH_STENCIL);
        assert_eq!(mask, wgpu::TextureUsages::RENDER_ATTACHMENT);
    }

    #[test]
    fn read_only_attachment_never_writes_stencil() {
        let format = wgpu::TextureFormat::Depth24PlusStencil8;
        let write = depth_stencil_state(format, &DepthStencilStateDesc::STENCIL_WRITE, false);
        assert_eq!(write.stencil.front.pass_op, wgpu::StencilOperation::Replace);
        assert_eq!(write.stencil.write_mask, 0xFF);

        let gated =
            depth_stencil_state(format, &DepthStencilStateDesc::STENCIL_READ_COMPARISON_EQUAL, true);
        assert_eq!(gated.stencil.front.compare, wgpu::CompareFunction::Equal);
        assert_eq!(gated.stencil.write_mask, 0);
        assert!(!gated.depth_write_enabled);
        assert_eq!(gated.depth_compare, wgpu::CompareFunction::Always);
    }
}
