//! CPU-side storage for textures and buffers, quantised to the texture format.

use std::any::Any;

use glam::{IVec2, UVec2, Vec4};
use half::f16;
use parking_lot::RwLock;

use crate::graphics::{
    BufferDesc, BufferObject, FilterType, ResourceState, SamplerDesc, TextureDesc, TextureFormat,
    TextureObject,
};

const D24_MAX: f32 = 16_777_215.0;

fn unorm8(v: f32) -> f32 {
    (v.clamp(0.0, 1.0) * 255.0).round() / 255.0
}

fn float16(v: f32) -> f32 {
    f16::from_f32(v).to_f32()
}

/// Rounds `value` to what `format` can store. Missing channels read back as (0, 0, 1).
pub fn quantize(format: TextureFormat, value: Vec4) -> Vec4 {
    match format {
        TextureFormat::Unknown => Vec4::ZERO,
        TextureFormat::R8Unorm => Vec4::new(unorm8(value.x), 0.0, 0.0, 1.0),
        TextureFormat::Rg8Unorm => Vec4::new(unorm8(value.x), unorm8(value.y), 0.0, 1.0),
        TextureFormat::Rgba8Unorm => Vec4::new(
            unorm8(value.x),
            unorm8(value.y),
            unorm8(value.z),
            unorm8(value.w),
        ),
        TextureFormat::R16Float => Vec4::new(float16(value.x), 0.0, 0.0, 1.0),
        TextureFormat::Rg16Float => Vec4::new(float16(value.x), float16(value.y), 0.0, 1.0),
        TextureFormat::Rgba16Float => Vec4::new(
            float16(value.x),
            float16(value.y),
            float16(value.z),
            float16(value.w),
        ),
        TextureFormat::R32Float => Vec4::new(value.x, 0.0, 0.0, 1.0),
        TextureFormat::R32Uint => Vec4::new(value.x.max(0.0).trunc(), 0.0, 0.0, 1.0),
        TextureFormat::D32Float | TextureFormat::D32FloatS8X24Uint => {
            Vec4::new(value.x.clamp(0.0, 1.0), 0.0, 0.0, 1.0)
        }
        TextureFormat::D24UnormS8Uint => {
            Vec4::new((value.x.clamp(0.0, 1.0) * D24_MAX).round() / D24_MAX, 0.0, 0.0, 1.0)
        }
    }
}

/// Decodes one texel of tightly packed initial data.
pub fn decode_texel(format: TextureFormat, bytes: &[u8]) -> Vec4 {
    let f32_at = |i: usize| f32::from_le_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]]);
    let f16_at = |i: usize| f16::from_le_bytes([bytes[i], bytes[i + 1]]).to_f32();
    let u8_at = |i: usize| bytes[i] as f32 / 255.0;
    let value = match format {
        TextureFormat::Unknown => Vec4::ZERO,
        TextureFormat::R8Unorm => Vec4::new(u8_at(0), 0.0, 0.0, 1.0),
        TextureFormat::Rg8Unorm => Vec4::new(u8_at(0), u8_at(1), 0.0, 1.0),
        TextureFormat::Rgba8Unorm => Vec4::new(u8_at(0), u8_at(1), u8_at(2), u8_at(3)),
        TextureFormat::R16Float => Vec4::new(f16_at(0), 0.0, 0.0, 1.0),
        TextureFormat::Rg16Float => Vec4::new(f16_at(0), f16_at(2), 0.0, 1.0),
        TextureFormat::Rgba16Float => Vec4::new(f16_at(0), f16_at(2), f16_at(4), f16_at(6)),
        TextureFormat::R32Float | TextureFormat::D32Float | TextureFormat::D32FloatS8X24Uint => {
            Vec4::new(f32_at(0), 0.0, 0.0, 1.0)
        }
        TextureFormat::R32Uint => {
            let v = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            Vec4::new(v as f32, 0.0, 0.0, 1.0)
        }
        TextureFormat::D24UnormS8Uint => {
            let packed = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            Vec4::new((packed & 0x00FF_FFFF) as f32 / D24_MAX, 0.0, 0.0, 1.0)
        }
    };
    quantize(format, value)
}

/// Texel data of every mip, plus stencil and per-mip state tracking.
#[derive(Debug)]
pub struct TextureStorage {
    pub mips: Vec<Vec<Vec4>>,
    /// Stencil of mip 0, empty for formats without stencil.
    pub stencil: Vec<u8>,
    pub states: Vec<ResourceState>,
}

#[derive(Debug)]
pub struct SoftTexture {
    desc: TextureDesc,
    pub(crate) storage: RwLock<TextureStorage>,
}

impl SoftTexture {
    pub(crate) fn new(desc: TextureDesc, initial_data: Option<&[u8]>) -> Self {
        let mips: Vec<Vec<Vec4>> = (0..desc.mip_levels)
            .map(|mip| {
                let (w, h) = desc.mip_extent(mip);
                vec![quantize(desc.format, Vec4::ZERO); (w * h) as usize]
            })
            .collect();
        let stencil = if desc.format.has_stencil() {
            vec![0; (desc.width * desc.height) as usize]
        } else {
            Vec::new()
        };
        let mut storage = TextureStorage {
            mips,
            stencil,
            states: vec![ResourceState::Unknown; desc.mip_levels as usize],
        };

        if let Some(data) = initial_data {
            let stride = desc.format.bytes_per_texel();
            if stride > 0 {
                for (texel, bytes) in storage.mips[0].iter_mut().zip(data.chunks_exact(stride)) {
                    *texel = decode_texel(desc.format, bytes);
                }
            }
        }

        Self {
            desc,
            storage: RwLock::new(storage),
        }
    }
}

impl TextureObject for SoftTexture {
    fn desc(&self) -> &TextureDesc {
        &self.desc
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug)]
pub struct SoftBuffer {
    desc: BufferDesc,
    pub(crate) data: RwLock<Vec<u8>>,
}

impl SoftBuffer {
    pub(crate) fn new(desc: BufferDesc, initial_data: Option<&[u8]>) -> Self {
        let mut data = vec![0u8; desc.size as usize];
        if let Some(initial) = initial_data {
            let len = initial.len().min(data.len());
            data[..len].copy_from_slice(&initial[..len]);
        }
        Self {
            desc,
            data: RwLock::new(data),
        }
    }
}

impl BufferObject for SoftBuffer {
    fn desc(&self) -> &BufferDesc {
        &self.desc
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Snapshot of the mips a shader resource view exposes, taken when a draw starts.
#[derive(Clone, Debug)]
pub struct SampledTexture {
    /// (extent, texels) for each mip of the view, most detailed first.
    mips: Vec<(UVec2, Vec<Vec4>)>,
    pub sampler: Option<SamplerDesc>,
}

impl SampledTexture {
    pub(crate) fn new(mips: Vec<(UVec2, Vec<Vec4>)>, sampler: Option<SamplerDesc>) -> Self {
        Self { mips, sampler }
    }

    pub fn num_levels(&self) -> u32 {
        self.mips.len() as u32
    }

    pub fn dimensions(&self, mip: u32) -> UVec2 {
        self.mips
            .get(mip as usize)
            .map(|(extent, _)| *extent)
            .unwrap_or(UVec2::ZERO)
    }

    /// Texel fetch. Out-of-range locations and mips read zero.
    pub fn load(&self, location: IVec2, mip: u32) -> Vec4 {
        let Some((extent, texels)) = self.mips.get(mip as usize) else {
            return Vec4::ZERO;
        };
        if location.x < 0
            || location.y < 0
            || location.x as u32 >= extent.x
            || location.y as u32 >= extent.y
        {
            return Vec4::ZERO;
        }
        texels[(location.y as u32 * extent.x + location.x as u32) as usize]
    }

    pub fn is_linear(&self) -> bool {
        self.sampler
            .is_some_and(|sampler| sampler.filter == FilterType::Linear)
    }
}
