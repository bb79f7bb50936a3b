use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec3};

/// Highest mip index of the hierarchical depth buffer (the chain holds at most `MAX_MIP + 1` levels).
pub const SSR_DEPTH_HIERARCHY_MAX_MIP: u32 = 6;

/// Per-camera constants, one entry of the `cbCameraAttribs` pair (current, previous).
/// 432 bytes, a multiple of 16 so the pair can live in one uniform buffer.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct CameraAttribs {
    pub position: [f32; 4],
    /// (width, height, 1/width, 1/height) of the viewport in pixels.
    pub viewport_size: [f32; 4],
    pub near_plane: f32,
    pub far_plane: f32,
    pub jitter: [f32; 2],
    pub view: [[f32; 4]; 4],
    pub proj: [[f32; 4]; 4],
    pub view_proj: [[f32; 4]; 4],
    pub view_inv: [[f32; 4]; 4],
    pub proj_inv: [[f32; 4]; 4],
    pub view_proj_inv: [[f32; 4]; 4],
}

impl CameraAttribs {
    /// Builds the constants for a camera at `position` with the given view and projection matrices.
    pub fn new(
        position: Vec3,
        view: Mat4,
        proj: Mat4,
        viewport: (u32, u32),
        near_plane: f32,
        far_plane: f32,
    ) -> Self {
        let (w, h) = (viewport.0.max(1) as f32, viewport.1.max(1) as f32);
        let view_proj = proj * view;
        Self {
            position: position.extend(1.0).to_array(),
            viewport_size: [w, h, 1.0 / w, 1.0 / h],
            near_plane,
            far_plane,
            jitter: [0.0; 2],
            view: view.to_cols_array_2d(),
            proj: proj.to_cols_array_2d(),
            view_proj: view_proj.to_cols_array_2d(),
            view_inv: view.inverse().to_cols_array_2d(),
            proj_inv: proj.inverse().to_cols_array_2d(),
            view_proj_inv: view_proj.inverse().to_cols_array_2d(),
        }
    }

    /// Same camera with a sub-pixel projection jitter.
    pub fn with_jitter(mut self, jitter: Vec2) -> Self {
        self.jitter = jitter.to_array();
        self
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.view)
    }

    pub fn view_proj_matrix(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.view_proj)
    }

    pub fn view_proj_inv_matrix(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.view_proj_inv)
    }

    pub fn position(&self) -> Vec3 {
        Vec3::new(self.position[0], self.position[1], self.position[2])
    }
}

/// Camera pair as laid out in the PostFX camera constant buffer.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct CameraAttribsPair {
    pub current: CameraAttribs,
    pub previous: CameraAttribs,
}

/// SSR algorithm parameters (`cbScreenSpaceReflectionAttribs`).
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct ScreenSpaceReflectionAttribs {
    /// Thickness assumed behind every depth sample when testing ray hits.
    pub depth_buffer_thickness: f32,
    /// Pixels with a (linear) roughness at or above this value are not reflective.
    pub roughness_threshold: f32,
    /// Hi-Z mip the intersection march samples.
    pub most_detailed_mip: u32,
    pub max_traversal_intersections: u32,
    /// Channel of the material texture holding roughness (0 = R .. 3 = A).
    pub roughness_channel: u32,
    /// Non-zero when the material stores perceptual roughness (squared before use).
    pub is_roughness_perceptual: u32,
    pub ggx_importance_sample_bias: f32,
    pub spatial_reconstruction_radius: f32,
    pub temporal_radiance_stability_factor: f32,
    pub temporal_variance_stability_factor: f32,
    pub bilateral_cleanup_spatial_sigma_factor: f32,
    pub _pad0: f32,
}

impl Default for ScreenSpaceReflectionAttribs {
    fn default() -> Self {
        Self {
            depth_buffer_thickness: 0.015,
            roughness_threshold: 0.2,
            most_detailed_mip: 0,
            max_traversal_intersections: 128,
            roughness_channel: 0,
            is_roughness_perceptual: 1,
            ggx_importance_sample_bias: 0.3,
            spatial_reconstruction_radius: 4.0,
            temporal_radiance_stability_factor: 0.95,
            temporal_variance_stability_factor: 0.9,
            bilateral_cleanup_spatial_sigma_factor: 0.9,
            _pad0: 0.0,
        }
    }
}

/// Blue-noise generation constants (`cbBlueNoiseAttribs`).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct BlueNoiseAttribs {
    pub frame_index: u32,
    pub _pad: [u32; 3],
}

/// Source mip for the Hi-Z fallback that reads a full mip chain (`cbTextureMipAttribs`).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct TextureMipAttribs {
    pub mip_index: u32,
    pub _pad: [u32; 3],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layouts_are_uniform_friendly() {
        assert_eq!(std::mem::size_of::<CameraAttribs>(), 432);
        assert_eq!(std::mem::size_of::<CameraAttribsPair>(), 864);
        assert_eq!(std::mem::size_of::<ScreenSpaceReflectionAttribs>(), 48);
        assert_eq!(std::mem::size_of::<BlueNoiseAttribs>(), 16);
        assert_eq!(std::mem::size_of::<TextureMipAttribs>(), 16);
    }

    #[test]
    fn camera_inverse_round_trips_a_point() {
        let view = Mat4::look_at_rh(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y);
        let proj = Mat4::perspective_rh(1.0, 1.0, 0.1, 100.0);
        let camera = CameraAttribs::new(Vec3::new(0.0, 0.0, 5.0), view, proj, (64, 64), 0.1, 100.0);
        let p = glam::Vec4::new(0.5, -0.25, 1.0, 1.0);
        let clip = camera.view_proj_matrix() * p;
        let back = camera.view_proj_inv_matrix() * clip;
        assert!((back / back.w - p).length() < 1e-4);
        assert_eq!(camera.viewport_size, [64.0, 64.0, 1.0 / 64.0, 1.0 / 64.0]);
    }
}
