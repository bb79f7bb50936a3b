//! Error types for the graphics abstraction and the post-processing effects.

use thiserror::Error;

use crate::graphics::{TextureFormat, TextureViewType};

/// Result type for graphics-abstraction calls.
pub type GraphicsResult<T> = std::result::Result<T, GraphicsError>;

/// Result type for post-processing effect calls.
pub type PostFxResult<T> = std::result::Result<T, PostFxError>;

/// Errors raised by a graphics device or device context.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphicsError {
    /// Shader source could not be found or compiled.
    #[error("failed to compile shader '{file}' ({entry_point}): {message}")]
    ShaderCompilation {
        file: String,
        entry_point: String,
        message: String,
    },

    /// Pipeline state creation failed.
    #[error("failed to create pipeline '{name}': {message}")]
    PipelineCreation { name: String, message: String },

    /// Texture or buffer creation failed.
    #[error("failed to create resource '{name}': {message}")]
    ResourceCreation { name: String, message: String },

    #[error("texture format {0:?} is not supported for this usage")]
    UnsupportedFormat(TextureFormat),

    /// A view was requested that the texture cannot provide.
    #[error("invalid {view_type:?} view of '{texture}': {message}")]
    InvalidView {
        texture: String,
        view_type: TextureViewType,
        message: String,
    },

    #[error("cannot copy '{src}' ({src_format:?}) into '{dst}' ({dst_format:?})")]
    UnsupportedCopy {
        src: String,
        src_format: TextureFormat,
        dst: String,
        dst_format: TextureFormat,
    },

    /// Draw call rejected by state validation.
    #[error("draw with pipeline '{pipeline}' rejected: {message}")]
    DrawValidation { pipeline: String, message: String },

    /// Explicit state transition does not match the tracked state.
    #[error("state transition of '{texture}' mip {mip}: {message}")]
    StateMismatch {
        texture: String,
        mip: u32,
        message: String,
    },

    /// Binding name is not part of the pipeline resource layout.
    #[error("pipeline '{pipeline}' has no shader variable '{name}'")]
    UnknownVariable { pipeline: String, name: String },

    #[error("buffer '{name}' holds {size} bytes, {offset} + {len} requested")]
    BufferOverflow {
        name: String,
        size: u64,
        offset: u64,
        len: u64,
    },

    /// Backend-specific failure.
    #[error("backend error: {0}")]
    Backend(String),
}

/// Errors raised by the post-processing effects.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PostFxError {
    /// `execute` was called before `set_back_buffer_size`.
    #[error("back buffer size has not been set")]
    BackBufferNotSized,

    #[error("invalid back buffer size {width}x{height}")]
    InvalidBackBufferSize { width: u32, height: u32 },

    /// The shared post-processing context has not been prepared for this frame.
    #[error("post-processing context has not been prepared")]
    PostFxNotPrepared,

    #[error("input '{input}' must be a shader resource view, got {found:?}")]
    InputNotShaderResource {
        input: &'static str,
        found: TextureViewType,
    },

    #[error("input '{input}' is {width}x{height}, expected {expected_width}x{expected_height}")]
    InputExtentMismatch {
        input: &'static str,
        width: u32,
        height: u32,
        expected_width: u32,
        expected_height: u32,
    },

    #[error("camera buffer holds {size} bytes, at least {required} required")]
    CameraBufferTooSmall { size: u64, required: u64 },

    /// A registry slot required by a pass is empty.
    #[error("resource slot {0} is empty")]
    MissingResource(String),

    #[error(transparent)]
    Graphics(#[from] GraphicsError),
}
