//! Orbital camera, projection and the camera GPU resource bundle.
//!
//! The camera orbits a target point at a radius driven by fit-to-view:
//! framing a model sets the target to the bounds center and the radius to
//! `max_dimension * radius_multiplier`, then rescales the zoom and pan
//! sensitivities so large buildings and small fittings both navigate
//! comfortably.

use cgmath::{InnerSpace, Matrix4, Point3, Rad, SquareMatrix, Vector3, perspective};

use crate::config::ViewerConfig;
use crate::model::Aabb;

#[rustfmt::skip]
pub const OPENGL_TO_WGPU_MATRIX: Matrix4<f32> = Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
);

/// Named viewpoints reachable from the toolbar.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CameraPreset {
    Front,
    Back,
    Left,
    Right,
    Top,
    Isometric,
}

impl CameraPreset {
    /// Yaw/pitch in radians for each preset. Pitch is clamped slightly off
    /// the poles so the view matrix never degenerates.
    fn angles(self) -> (f32, f32) {
        use std::f32::consts::FRAC_PI_2;
        match self {
            CameraPreset::Front => (-FRAC_PI_2, 0.0),
            CameraPreset::Back => (FRAC_PI_2, 0.0),
            CameraPreset::Left => (std::f32::consts::PI, 0.0),
            CameraPreset::Right => (0.0, 0.0),
            CameraPreset::Top => (-FRAC_PI_2, FRAC_PI_2 - 0.01),
            CameraPreset::Isometric => (-FRAC_PI_2 / 2.0, 0.615),
        }
    }
}

/// Orbit camera: a target point plus spherical yaw/pitch/radius.
#[derive(Clone, Debug)]
pub struct OrbitCamera {
    pub target: Point3<f32>,
    pub yaw: f32,
    pub pitch: f32,
    pub radius: f32,
    pub zoom_sensitivity: f32,
    pub pan_sensitivity: f32,
    min_radius: f32,
    max_radius: f32,
}

impl OrbitCamera {
    pub fn new(config: &ViewerConfig) -> Self {
        let mut camera = Self {
            target: Point3::new(0.0, 0.0, 0.0),
            yaw: 0.0,
            pitch: 0.0,
            radius: 10.0,
            zoom_sensitivity: 1.0,
            pan_sensitivity: 1.0,
            min_radius: config.min_radius,
            max_radius: config.max_radius,
        };
        camera.apply_preset(CameraPreset::Isometric);
        camera.zoom_sensitivity = config.zoom_sensitivity_for_radius(camera.radius);
        camera.pan_sensitivity = config.pan_sensitivity_for_radius(camera.radius);
        camera
    }

    pub fn position(&self) -> Point3<f32> {
        let (sin_pitch, cos_pitch) = self.pitch.sin_cos();
        let (sin_yaw, cos_yaw) = self.yaw.sin_cos();
        Point3::new(
            self.target.x + self.radius * cos_pitch * cos_yaw,
            self.target.y + self.radius * sin_pitch,
            self.target.z + self.radius * cos_pitch * sin_yaw,
        )
    }

    pub fn view_matrix(&self) -> Matrix4<f32> {
        Matrix4::look_at_rh(self.position(), self.target, Vector3::unit_y())
    }

    /// Frame a bounding box: center the target on it and back off to
    /// `max_dimension * radius_multiplier`, then rescale navigation
    /// sensitivity for the new working distance.
    pub fn frame_bounds(&mut self, bounds: &Aabb, config: &ViewerConfig) {
        let center = bounds.center();
        self.target = Point3::new(center.x, center.y, center.z);
        let extent = bounds.max_dimension().max(f32::EPSILON);
        self.radius =
            (extent * config.radius_multiplier).clamp(config.min_radius, config.max_radius);
        self.zoom_sensitivity = config.zoom_sensitivity_for_radius(self.radius);
        self.pan_sensitivity = config.pan_sensitivity_for_radius(self.radius);
    }

    pub fn apply_preset(&mut self, preset: CameraPreset) {
        let (yaw, pitch) = preset.angles();
        self.yaw = yaw;
        self.pitch = pitch;
    }

    pub fn orbit(&mut self, delta_x: f32, delta_y: f32) {
        use std::f32::consts::FRAC_PI_2;
        self.yaw += delta_x * 0.005;
        self.pitch = (self.pitch + delta_y * 0.005).clamp(-FRAC_PI_2 + 0.01, FRAC_PI_2 - 0.01);
    }

    pub fn zoom(&mut self, scroll: f32) {
        self.radius =
            (self.radius - scroll * self.zoom_sensitivity).clamp(self.min_radius, self.max_radius);
    }

    /// Pan in the camera's screen plane.
    pub fn pan(&mut self, delta_x: f32, delta_y: f32) {
        let forward = (self.target - self.position()).normalize();
        let right = forward.cross(Vector3::unit_y()).normalize();
        let up = right.cross(forward).normalize();
        let scale = self.pan_sensitivity * 0.01;
        self.target += right * (-delta_x * scale) + up * (delta_y * scale);
    }
}

/// Perspective projection matched to the surface aspect ratio.
#[derive(Clone, Copy, Debug)]
pub struct Projection {
    aspect: f32,
    fovy: Rad<f32>,
    znear: f32,
    zfar: f32,
}

impl Projection {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            aspect: width as f32 / height.max(1) as f32,
            fovy: Rad(std::f32::consts::FRAC_PI_4),
            znear: 0.1,
            zfar: 50_000.0,
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.aspect = width as f32 / height.max(1) as f32;
    }

    pub fn matrix(&self) -> Matrix4<f32> {
        OPENGL_TO_WGPU_MATRIX * perspective(self.fovy, self.aspect, self.znear, self.zfar)
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CameraUniform {
    pub view_proj: [[f32; 4]; 4],
    pub view_position: [f32; 4],
}

impl CameraUniform {
    pub fn new() -> Self {
        Self {
            view_proj: Matrix4::identity().into(),
            view_position: [0.0; 4],
        }
    }

    pub fn update(&mut self, camera: &OrbitCamera, projection: &Projection) {
        self.view_proj = (projection.matrix() * camera.view_matrix()).into();
        let position = camera.position();
        self.view_position = [position.x, position.y, position.z, 1.0];
    }
}

impl Default for CameraUniform {
    fn default() -> Self {
        Self::new()
    }
}

/// Camera state plus its uniform buffer and bind group.
pub struct CameraResources {
    pub camera: OrbitCamera,
    pub projection: Projection,
    pub uniform: CameraUniform,
    pub buffer: wgpu::Buffer,
    pub bind_group_layout: wgpu::BindGroupLayout,
    pub bind_group: wgpu::BindGroup,
}

impl CameraResources {
    pub fn new(device: &wgpu::Device, config: &ViewerConfig, width: u32, height: u32) -> Self {
        use wgpu::util::DeviceExt;

        let camera = OrbitCamera::new(config);
        let projection = Projection::new(width, height);
        let mut uniform = CameraUniform::new();
        uniform.update(&camera, &projection);

        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("camera_buffer"),
            contents: bytemuck::cast_slice(&[uniform]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("camera_bind_group_layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("camera_bind_group"),
            layout: &bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
        });

        Self {
            camera,
            projection,
            uniform,
            buffer,
            bind_group_layout,
            bind_group,
        }
    }

    /// Re-derive the uniform from the current camera state and write it.
    pub fn update(&mut self, queue: &wgpu::Queue) {
        self.uniform.update(&self.camera, &self.projection);
        queue.write_buffer(&self.buffer, 0, bytemuck::cast_slice(&[self.uniform]));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::Vector3;

    #[test]
    fn framing_centers_target_and_scales_radius() {
        let config = ViewerConfig::default();
        let mut camera = OrbitCamera::new(&config);
        let bounds = Aabb::new(Vector3::new(-5.0, -5.0, -5.0), Vector3::new(5.0, 5.0, 5.0));

        camera.frame_bounds(&bounds, &config);

        assert_eq!(camera.target, Point3::new(0.0, 0.0, 0.0));
        assert_eq!(camera.radius, 10.0 * config.radius_multiplier);
    }

    #[test]
    fn framing_rescales_sensitivity_for_large_models() {
        let config = ViewerConfig::default();
        let mut camera = OrbitCamera::new(&config);

        let small = Aabb::new(Vector3::new(0.0, 0.0, 0.0), Vector3::new(1.0, 1.0, 1.0));
        camera.frame_bounds(&small, &config);
        let small_zoom = camera.zoom_sensitivity;

        let large = Aabb::new(Vector3::new(0.0, 0.0, 0.0), Vector3::new(500.0, 40.0, 300.0));
        camera.frame_bounds(&large, &config);
        let large_zoom = camera.zoom_sensitivity;

        // sensitivity shrinks per the inverse-radius rule, so a full-building
        // model does not zoom in wild jumps
        assert!(large_zoom < small_zoom);
        assert!(large_zoom >= config.min_zoom_sensitivity);
        assert!(small_zoom <= config.max_zoom_sensitivity);
    }

    #[test]
    fn zoom_respects_radius_clamp() {
        let config = ViewerConfig::default();
        let mut camera = OrbitCamera::new(&config);
        camera.radius = config.min_radius;
        camera.zoom(1000.0);
        assert!(camera.radius >= config.min_radius);
    }

    #[test]
    fn presets_keep_distance_from_target() {
        let config = ViewerConfig::default();
        let mut camera = OrbitCamera::new(&config);
        camera.radius = 25.0;
        for preset in [
            CameraPreset::Front,
            CameraPreset::Back,
            CameraPreset::Left,
            CameraPreset::Right,
            CameraPreset::Top,
            CameraPreset::Isometric,
        ] {
            camera.apply_preset(preset);
            let to_target = camera.position() - camera.target;
            assert!((to_target.magnitude() - 25.0).abs() < 1e-3);
        }
    }
}
