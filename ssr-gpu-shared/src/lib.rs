//! Data shared between the CPU side of the screen-space reflection pipeline and its shaders.

pub mod noise;
pub mod shaders;
pub mod uniforms;
