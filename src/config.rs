//! Compile-time viewer configuration.
//!
//! All tunables live in one place so the load pipeline, camera framing and
//! scene setup share the same constants. There is no persisted state and no
//! CLI surface; callers construct a [`ViewerConfig`] (usually via `Default`)
//! and pass it down.

/// Named tunables for a viewer session.
#[derive(Clone, Debug)]
pub struct ViewerConfig {
    /// Try the primary backend set (Vulkan/Metal/DX12) before falling back
    /// to GL.
    pub prefer_primary_backend: bool,
    /// Render into a 4x multisampled target and resolve into the surface.
    pub antialias: bool,
    /// Allocate a stencil channel alongside the depth buffer.
    pub stencil: bool,
    /// Request an alpha-composited surface.
    pub alpha_channel: bool,
    /// Keep the previous frame's contents instead of clearing.
    pub preserve_buffer: bool,

    /// Scene background color.
    pub background_color: wgpu::Color,
    /// Scalar applied to the ambient light term.
    pub ambient_intensity: f32,
    /// Shadow map edge length in texels.
    pub shadow_map_resolution: u32,
    /// Meshes whose largest bounding extent is below this never become
    /// shadow casters (bolts and fasteners are not worth the shadow cost).
    pub min_caster_extent: f32,

    /// Default PBR parameters assigned to meshes that arrive without a
    /// material.
    pub default_albedo: [f32; 4],
    pub default_metallic: f32,
    pub default_roughness: f32,

    /// Orbit radius after fit-to-view is `max_dimension * radius_multiplier`.
    pub radius_multiplier: f32,
    pub min_radius: f32,
    pub max_radius: f32,
    /// Wheel-zoom sensitivity is `zoom_sensitivity_scale / radius`, clamped
    /// to the bounds below. Larger models zoom in larger steps.
    pub zoom_sensitivity_scale: f32,
    pub min_zoom_sensitivity: f32,
    pub max_zoom_sensitivity: f32,
    /// Pan sensitivity follows the same inverse-radius formula.
    pub pan_sensitivity_scale: f32,
    pub min_pan_sensitivity: f32,
    pub max_pan_sensitivity: f32,

    /// Load pipeline defaults; each can be overridden per load.
    pub apply_materials: bool,
    pub enable_shadows: bool,
    pub freeze_meshes: bool,
    pub center_at_origin: bool,
    pub fit_to_view: bool,

    /// Frame rate the auto-quality optimizer tries to hold.
    pub optimizer_target_fps: f32,

    /// Accepted file extension for drag-and-drop, matched case-insensitively
    /// against the file name suffix.
    pub accepted_extension: &'static str,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            prefer_primary_backend: true,
            antialias: true,
            stencil: false,
            alpha_channel: false,
            preserve_buffer: false,

            background_color: wgpu::Color {
                r: 0.09,
                g: 0.10,
                b: 0.12,
                a: 1.0,
            },
            ambient_intensity: 0.35,
            shadow_map_resolution: 2048,
            min_caster_extent: 0.05,

            default_albedo: [0.78, 0.78, 0.80, 1.0],
            default_metallic: 0.1,
            default_roughness: 0.7,

            radius_multiplier: 2.0,
            min_radius: 0.1,
            max_radius: 10_000.0,
            zoom_sensitivity_scale: 40.0,
            min_zoom_sensitivity: 0.01,
            max_zoom_sensitivity: 5.0,
            pan_sensitivity_scale: 100.0,
            min_pan_sensitivity: 0.05,
            max_pan_sensitivity: 20.0,

            apply_materials: true,
            enable_shadows: true,
            freeze_meshes: true,
            center_at_origin: true,
            fit_to_view: true,

            optimizer_target_fps: 50.0,

            accepted_extension: "glb",
        }
    }
}

impl ViewerConfig {
    /// Clamp a raw inverse-radius zoom sensitivity into the configured bounds.
    pub fn zoom_sensitivity_for_radius(&self, radius: f32) -> f32 {
        (self.zoom_sensitivity_scale / radius.max(f32::EPSILON))
            .clamp(self.min_zoom_sensitivity, self.max_zoom_sensitivity)
    }

    pub fn pan_sensitivity_for_radius(&self, radius: f32) -> f32 {
        (self.pan_sensitivity_scale / radius.max(f32::EPSILON))
            .clamp(self.min_pan_sensitivity, self.max_pan_sensitivity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sensitivity_scales_inversely_with_radius() {
        let config = ViewerConfig::default();
        let near = config.zoom_sensitivity_for_radius(10.0);
        let far = config.zoom_sensitivity_for_radius(100.0);
        assert!(near > far);
    }

    #[test]
    fn sensitivity_is_clamped() {
        let config = ViewerConfig::default();
        let tiny = config.zoom_sensitivity_for_radius(1.0e-9);
        assert_eq!(tiny, config.max_zoom_sensitivity);
        let huge = config.zoom_sensitivity_for_radius(1.0e9);
        assert_eq!(huge, config.min_zoom_sensitivity);
        let pan = config.pan_sensitivity_for_radius(1.0e9);
        assert_eq!(pan, config.min_pan_sensitivity);
    }
}
