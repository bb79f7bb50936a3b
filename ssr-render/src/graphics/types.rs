//! Plain descriptors of the graphics-API abstraction.

use std::ops::{BitOr, BitOrAssign, Range};

/// Texture formats used by the post-processing effects.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Unknown,
    R8Unorm,
    Rg8Unorm,
    Rgba8Unorm,
    R16Float,
    Rg16Float,
    Rgba16Float,
    R32Float,
    R32Uint,
    D32Float,
    D24UnormS8Uint,
    D32FloatS8X24Uint,
}

impl TextureFormat {
    pub fn is_depth(self) -> bool {
        matches!(self, Self::D32Float | Self::D24UnormS8Uint | Self::D32FloatS8X24Uint)
    }

    pub fn has_stencil(self) -> bool {
        matches!(self, Self::D24UnormS8Uint | Self::D32FloatS8X24Uint)
    }

    pub fn is_integer(self) -> bool {
        matches!(self, Self::R32Uint)
    }

    /// Number of color (or depth) components.
    pub fn component_count(self) -> usize {
        match self {
            Self::Unknown => 0,
            Self::R8Unorm | Self::R16Float | Self::R32Float | Self::R32Uint => 1,
            Self::D32Float | Self::D24UnormS8Uint | Self::D32FloatS8X24Uint => 1,
            Self::Rg8Unorm | Self::Rg16Float => 2,
            Self::Rgba8Unorm | Self::Rgba16Float => 4,
        }
    }

    /// Size of one texel as uploaded through initial data.
    pub fn bytes_per_texel(self) -> usize {
        match self {
            Self::Unknown => 0,
            Self::R8Unorm => 1,
            Self::Rg8Unorm | Self::R16Float => 2,
            Self::Rgba8Unorm | Self::Rg16Float | Self::R32Float | Self::R32Uint => 4,
            Self::D32Float | Self::D24UnormS8Uint => 4,
            Self::Rgba16Float | Self::D32FloatS8X24Uint => 8,
        }
    }
}

/// Ways a resource may be bound to the pipeline.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct BindFlags(u32);

impl BindFlags {
    pub const NONE: Self = Self(0);
    pub const SHADER_RESOURCE: Self = Self(1 << 0);
    pub const RENDER_TARGET: Self = Self(1 << 1);
    pub const DEPTH_STENCIL: Self = Self(1 << 2);
    pub const UNIFORM_BUFFER: Self = Self(1 << 3);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn bits(self) -> u32 {
        self.0
    }
}

impl BitOr for BindFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for BindFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Number of mips in a full chain for a `width` x `height` texture.
pub fn compute_mip_levels_count(width: u32, height: u32) -> u32 {
    let largest = width.max(height);
    if largest == 0 {
        0
    } else {
        u32::BITS - largest.leading_zeros()
    }
}

/// Extent of `mip` for a texture whose top level is `width` x `height`.
pub fn mip_extent(width: u32, height: u32, mip: u32) -> (u32, u32) {
    ((width >> mip).max(1), (height >> mip).max(1))
}

/// 2D texture description.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextureDesc {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub mip_levels: u32,
    pub format: TextureFormat,
    pub bind_flags: BindFlags,
}

impl TextureDesc {
    pub fn new_2d(
        name: impl Into<String>,
        width: u32,
        height: u32,
        format: TextureFormat,
        bind_flags: BindFlags,
    ) -> Self {
        Self {
            name: name.into(),
            width,
            height,
            mip_levels: 1,
            format,
            bind_flags,
        }
    }

    pub fn with_mip_levels(mut self, mip_levels: u32) -> Self {
        self.mip_levels = mip_levels;
        self
    }

    pub fn mip_extent(&self, mip: u32) -> (u32, u32) {
        mip_extent(self.width, self.height, mip)
    }
}

/// Uniform (constant) buffer description.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BufferDesc {
    pub name: String,
    pub size: u64,
    pub bind_flags: BindFlags,
}

impl BufferDesc {
    pub fn uniform(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
            bind_flags: BindFlags::UNIFORM_BUFFER,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureViewType {
    ShaderResource,
    RenderTarget,
    DepthStencil,
    ReadOnlyDepthStencil,
}

impl TextureViewType {
    pub fn is_depth_stencil(self) -> bool {
        matches!(self, Self::DepthStencil | Self::ReadOnlyDepthStencil)
    }
}

/// Sub-resource range a view covers. `num_mip_levels == 0` means "all remaining mips".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureViewDesc {
    pub view_type: TextureViewType,
    pub most_detailed_mip: u32,
    pub num_mip_levels: u32,
}

impl TextureViewDesc {
    /// View over every mip of the texture.
    pub fn full(view_type: TextureViewType) -> Self {
        Self {
            view_type,
            most_detailed_mip: 0,
            num_mip_levels: 0,
        }
    }

    /// View over a single mip.
    pub fn mip(view_type: TextureViewType, mip: u32) -> Self {
        Self {
            view_type,
            most_detailed_mip: mip,
            num_mip_levels: 1,
        }
    }

    pub fn mip_range(&self, texture_mips: u32) -> Range<u32> {
        let start = self.most_detailed_mip.min(texture_mips);
        let end = if self.num_mip_levels == 0 {
            texture_mips
        } else {
            (start + self.num_mip_levels).min(texture_mips)
        };
        start..end
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DeviceType {
    D3D11,
    D3D12,
    Vulkan,
    OpenGL,
    OpenGLES,
    Metal,
    WebGpu,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeviceFeatures {
    /// Shaders can read a single mip through a dedicated view.
    pub texture_subresource_views: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeviceInfo {
    pub device_type: DeviceType,
    pub features: DeviceFeatures,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TextureFormatInfo {
    pub supported: bool,
    pub bind_flags: BindFlags,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderType {
    Vertex,
    Pixel,
}

/// Everything needed to compile one shader stage.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ShaderCreateInfo {
    pub file_path: String,
    pub entry_point: String,
    pub shader_type: ShaderType,
    pub macros: Vec<(String, String)>,
}

impl ShaderCreateInfo {
    pub fn new(file_path: &str, entry_point: &str, shader_type: ShaderType) -> Self {
        Self {
            file_path: file_path.to_string(),
            entry_point: entry_point.to_string(),
            shader_type,
            macros: Vec::new(),
        }
    }

    pub fn with_macro(mut self, name: &str, value: impl ToString) -> Self {
        self.macros.push((name.to_string(), value.to_string()));
        self
    }

    pub fn macro_value(&self, name: &str) -> Option<&str> {
        self.macros
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ComparisonFunc {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

impl ComparisonFunc {
    /// Evaluates `reference <op> value`, the stencil test convention.
    pub fn test<T: PartialOrd>(self, reference: T, value: T) -> bool {
        match self {
            Self::Never => false,
            Self::Less => reference < value,
            Self::Equal => reference == value,
            Self::LessEqual => reference <= value,
            Self::Greater => reference > value,
            Self::NotEqual => reference != value,
            Self::GreaterEqual => reference >= value,
            Self::Always => true,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StencilOp {
    Keep,
    Zero,
    Replace,
    IncrSat,
    DecrSat,
    Invert,
    IncrWrap,
    DecrWrap,
}

impl StencilOp {
    pub fn apply(self, current: u8, reference: u8) -> u8 {
        match self {
            Self::Keep => current,
            Self::Zero => 0,
            Self::Replace => reference,
            Self::IncrSat => current.saturating_add(1),
            Self::DecrSat => current.saturating_sub(1),
            Self::Invert => !current,
            Self::IncrWrap => current.wrapping_add(1),
            Self::DecrWrap => current.wrapping_sub(1),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StencilOpDesc {
    pub fail_op: StencilOp,
    pub depth_fail_op: StencilOp,
    pub pass_op: StencilOp,
    pub func: ComparisonFunc,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DepthStencilStateDesc {
    pub depth_enable: bool,
    pub depth_write_enable: bool,
    pub depth_func: ComparisonFunc,
    pub stencil_enable: bool,
    pub stencil_read_mask: u8,
    pub stencil_write_mask: u8,
    pub front_face: StencilOpDesc,
}

impl DepthStencilStateDesc {
    pub const DISABLE_DEPTH: Self = Self {
        depth_enable: false,
        depth_write_enable: false,
        depth_func: ComparisonFunc::Less,
        stencil_enable: false,
        stencil_read_mask: 0xFF,
        stencil_write_mask: 0xFF,
        front_face: StencilOpDesc {
            fail_op: StencilOp::Keep,
            depth_fail_op: StencilOp::Keep,
            pass_op: StencilOp::Keep,
            func: ComparisonFunc::Always,
        },
    };

    /// Writes the stencil reference wherever the pixel shader does not discard.
    pub const STENCIL_WRITE: Self = Self {
        depth_enable: false,
        depth_write_enable: false,
        depth_func: ComparisonFunc::Less,
        stencil_enable: true,
        stencil_read_mask: 0xFF,
        stencil_write_mask: 0xFF,
        front_face: StencilOpDesc {
            fail_op: StencilOp::Keep,
            depth_fail_op: StencilOp::Keep,
            pass_op: StencilOp::Replace,
            func: ComparisonFunc::Always,
        },
    };

    /// Shades only pixels whose stencil equals the reference.
    pub const STENCIL_READ_COMPARISON_EQUAL: Self = Self {
        depth_enable: false,
        depth_write_enable: false,
        depth_func: ComparisonFunc::Less,
        stencil_enable: true,
        stencil_read_mask: 0xFF,
        stencil_write_mask: 0xFF,
        front_face: StencilOpDesc {
            fail_op: StencilOp::Keep,
            depth_fail_op: StencilOp::Keep,
            pass_op: StencilOp::Keep,
            func: ComparisonFunc::Equal,
        },
    };

    /// True when no stencil operation can modify the buffer.
    pub fn is_stencil_read_only(&self) -> bool {
        !self.stencil_enable
            || self.stencil_write_mask == 0
            || [self.front_face.fail_op, self.front_face.depth_fail_op, self.front_face.pass_op]
                .iter()
                .all(|op| *op == StencilOp::Keep)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct BlendStateDesc {
    pub blend_enable: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderResourceVariableType {
    /// Bound once on the technique and shared by every binding instance.
    Static,
    Mutable,
    /// Rebound before each draw.
    Dynamic,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FilterType {
    Point,
    Linear,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AddressMode {
    Clamp,
    Wrap,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SamplerDesc {
    pub filter: FilterType,
    pub address: AddressMode,
}

impl SamplerDesc {
    pub const POINT_WRAP: Self = Self {
        filter: FilterType::Point,
        address: AddressMode::Wrap,
    };
    pub const POINT_CLAMP: Self = Self {
        filter: FilterType::Point,
        address: AddressMode::Clamp,
    };
    pub const LINEAR_CLAMP: Self = Self {
        filter: FilterType::Linear,
        address: AddressMode::Clamp,
    };
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceState {
    Unknown,
    RenderTarget,
    ShaderResource,
    DepthWrite,
    DepthRead,
    CopySource,
    CopyDest,
    ConstantBuffer,
}

/// Sentinel for "every mip from `first_mip` on".
pub const REMAINING_MIP_LEVELS: u32 = u32::MAX;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DrawAttribs {
    pub num_vertices: u32,
    pub num_instances: u32,
}

impl DrawAttribs {
    /// One oversized triangle covering the viewport.
    pub const FULL_SCREEN_TRIANGLE: Self = Self {
        num_vertices: 3,
        num_instances: 1,
    };
}
