//! Backend capabilities that select between equivalent algorithm paths.

use crate::graphics::{DeviceInfo, DeviceType};

/// Capability flags probed once per effect instance.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SupportedFeatures {
    /// Explicit per-mip resource state transitions are available.
    pub transition_subresources: bool,
    /// Shaders can read one mip through a dedicated view.
    pub texture_subresource_views: bool,
    /// A depth texture can be copied straight into a color texture.
    pub copy_depth_to_color: bool,
}

impl SupportedFeatures {
    pub fn probe(info: &DeviceInfo) -> Self {
        let features = Self {
            transition_subresources: matches!(
                info.device_type,
                DeviceType::D3D12 | DeviceType::Vulkan
            ),
            texture_subresource_views: info.features.texture_subresource_views,
            copy_depth_to_color: matches!(info.device_type, DeviceType::D3D11 | DeviceType::D3D12),
        };
        log::info!("{:?} capabilities: {:?}", info.device_type, features);
        features
    }

    /// Hi-Z path that generates mips through per-mip views.
    pub fn uses_mip_views(&self) -> bool {
        self.texture_subresource_views
    }

    /// Explicit transitions are only issued together with per-mip views.
    pub fn uses_explicit_transitions(&self) -> bool {
        self.transition_subresources && self.texture_subresource_views
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphics::DeviceFeatures;

    fn info(device_type: DeviceType, views: bool) -> DeviceInfo {
        DeviceInfo {
            device_type,
            features: DeviceFeatures {
                texture_subresource_views: views,
            },
        }
    }

    #[test]
    fn probe_follows_device_type() {
        let d3d12 = SupportedFeatures::probe(&info(DeviceType::D3D12, true));
        assert!(d3d12.transition_subresources && d3d12.copy_depth_to_color);

        let d3d11 = SupportedFeatures::probe(&info(DeviceType::D3D11, true));
        assert!(!d3d11.transition_subresources && d3d11.copy_depth_to_color);

        let vulkan = SupportedFeatures::probe(&info(DeviceType::Vulkan, true));
        assert!(vulkan.transition_subresources && !vulkan.copy_depth_to_color);

        let gl = SupportedFeatures::probe(&info(DeviceType::OpenGL, false));
        assert_eq!(gl, SupportedFeatures::default());
    }

    #[test]
    fn transitions_without_views_take_the_fallback() {
        let features = SupportedFeatures::probe(&info(DeviceType::Vulkan, false));
        assert!(features.transition_subresources);
        assert!(!features.uses_mip_views());
        assert!(!features.uses_explicit_transitions());
    }
}
