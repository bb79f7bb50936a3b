//! Texture and buffer objects of the wgpu backend, view creation and readback.

use std::any::Any;

use ssr_render::graphics::{
    BufferDesc, BufferObject, TextureDesc, TextureObject, TextureView, TextureViewType,
};
use ssr_render::{GraphicsError, GraphicsResult};

use crate::conversions;

/// Row pitch wgpu requires for texture-to-buffer copies.
const COPY_ROW_ALIGNMENT: u32 = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;

#[derive(Debug)]
pub struct WgpuTexture {
    pub(crate) desc: TextureDesc,
    pub(crate) texture: wgpu::Texture,
    pub(crate) format: wgpu::TextureFormat,
}

impl TextureObject for WgpuTexture {
    fn desc(&self) -> &TextureDesc {
        &self.desc
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug)]
pub struct WgpuBuffer {
    pub(crate) desc: BufferDesc,
    pub(crate) buffer: wgpu::Buffer,
}

impl BufferObject for WgpuBuffer {
    fn desc(&self) -> &BufferDesc {
        &self.desc
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub(crate) fn wgpu_texture(texture: &ssr_render::graphics::Texture) -> GraphicsResult<&WgpuTexture> {
    texture.downcast_ref::<WgpuTexture>().ok_or_else(|| {
        GraphicsError::Backend(format!("texture '{}' was not created by wgpu", texture.name()))
    })
}

pub(crate) fn wgpu_buffer(buffer: &ssr_render::graphics::Buffer) -> GraphicsResult<&WgpuBuffer> {
    buffer.downcast_ref::<WgpuBuffer>().ok_or_else(|| {
        GraphicsError::Backend(format!("buffer '{}' was not created by wgpu", buffer.desc().name))
    })
}

/// Creates the wgpu view matching `view`'s mip range and usage.
pub(crate) fn create_view(view: &TextureView) -> GraphicsResult<wgpu::TextureView> {
    let texture = wgpu_texture(view.texture())?;
    let range = view.mip_range();
    let aspect = match view.view_type() {
        TextureViewType::ShaderResource => conversions::sampled_aspect(view.format()),
        _ => wgpu::TextureAspect::All,
    };
    Ok(texture.texture.create_view(&wgpu::TextureViewDescriptor {
        label: Some(texture.desc.name.as_str()),
        format: None,
        dimension: Some(wgpu::TextureViewDimension::D2),
        aspect,
        base_mip_level: range.start,
        mip_level_count: Some(range.len() as u32),
        base_array_layer: 0,
        array_layer_count: Some(1),
    }))
}

pub(crate) fn extent(desc: &TextureDesc, mip: u32) -> wgpu::Extent3d {
    let (width, height) = desc.mip_extent(mip);
    wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    }
}

/// Uploads tightly packed texels into mip 0.
pub(crate) fn upload_mip0(queue: &wgpu::Queue, texture: &WgpuTexture, data: &[u8]) {
    let bytes_per_texel = texture.desc.format.bytes_per_texel() as u32;
    queue.write_texture(
        wgpu::ImageCopyTexture {
            texture: &texture.texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        data,
        wgpu::ImageDataLayout {
            offset: 0,
            bytes_per_row: Some(texture.desc.width * bytes_per_texel),
            rows_per_image: Some(texture.desc.height),
        },
        extent(&texture.desc, 0),
    );
}

/// Copies one mip back to the CPU, tightly packed. Blocks until the GPU is done.
pub(crate) fn read_mip(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    texture: &WgpuTexture,
    mip: u32,
) -> GraphicsResult<Vec<u8>> {
    if mip >= texture.desc.mip_levels {
        return Err(GraphicsError::Backend(format!(
            "'{}' has no mip {mip}",
            texture.desc.name
        )));
    }
    let bytes_per_texel = texture
        .format
        .block_copy_size(Some(wgpu::TextureAspect::All))
        .ok_or_else(|| {
            GraphicsError::Backend(format!("'{}' cannot be read back", texture.desc.name))
        })?;
    let size = extent(&texture.desc, mip);
    let row_bytes = size.width * bytes_per_texel;
    let padded_row_bytes = row_bytes.div_ceil(COPY_ROW_ALIGNMENT) * COPY_ROW_ALIGNMENT;

    let staging = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Readback Staging"),
        size: u64::from(padded_row_bytes) * u64::from(size.height),
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("Readback Encoder"),
    });
    encoder.copy_texture_to_buffer(
        wgpu::ImageCopyTexture {
            texture: &texture.texture,
            mip_level: mip,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::ImageCopyBuffer {
            buffer: &staging,
            layout: wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(padded_row_bytes),
                rows_per_image: Some(size.height),
            },
        },
        size,
    );
    queue.submit(std::iter::once(encoder.finish()));

    let slice = staging.slice(..);
    let (sender, receiver) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = sender.send(result);
    });
    device.poll(wgpu::Maintain::Wait);
    receiver
        .recv()
        .map_err(|e| GraphicsError::Backend(format!("readback channel closed: {e}")))?
        .map_err(|e| GraphicsError::Backend(format!("failed to map readback buffer: {e}")))?;

    let mapped = slice.get_mapped_range();
    let mut data = Vec::with_capacity((row_bytes * size.height) as usize);
    for row in mapped.chunks(padded_row_bytes as usize) {
        data.extend_from_slice(&row[..row_bytes as usize]);
    }
    drop(mapped);
    staging.unmap();
    Ok(data)
}
