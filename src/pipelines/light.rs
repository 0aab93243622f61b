//! Directional light, its shadow map and the light/shadow bind groups.
//!
//! Two bind groups come out of here: the full one the mesh shader uses
//! (matrix, shadow map, comparison sampler) and a matrix-only one for the
//! shadow pass itself, which cannot bind the map it is rendering into.

use cgmath::{InnerSpace, Matrix4, Point3, Vector3, ortho};
use wgpu::util::DeviceExt;

use crate::camera::OPENGL_TO_WGPU_MATRIX;
use crate::config::ViewerConfig;
use crate::model::Aabb;
use crate::texture::Texture;

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LightUniform {
    pub view_proj: [[f32; 4]; 4],
    pub direction: [f32; 3],
    pub ambient: f32,
    pub color: [f32; 3],
    pub _pad: f32,
}

/// Orthographic light matrix covering `bounds` from `direction`.
pub fn light_view_proj(bounds: &Aabb, direction: Vector3<f32>) -> Matrix4<f32> {
    let center = bounds.center();
    let size = bounds.size();
    let radius = ((size.x * size.x + size.y * size.y + size.z * size.z).sqrt() / 2.0).max(1.0);
    let direction = direction.normalize();
    let eye = Point3::new(
        center.x - direction.x * radius * 2.0,
        center.y - direction.y * radius * 2.0,
        center.z - direction.z * radius * 2.0,
    );
    let target = Point3::new(center.x, center.y, center.z);
    // keep the up vector off the light axis
    let up = if direction.x.abs() < 1e-3 && direction.z.abs() < 1e-3 {
        Vector3::unit_x()
    } else {
        Vector3::unit_y()
    };
    let view = Matrix4::look_at_rh(eye, target, up);
    let projection = ortho(-radius, radius, -radius, radius, 0.1, radius * 4.0);
    OPENGL_TO_WGPU_MATRIX * projection * view
}

pub fn mk_light_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("light_layout"),
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    multisampled: false,
                    view_dimension: wgpu::TextureViewDimension::D2,
                    sample_type: wgpu::TextureSampleType::Depth,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 2,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Comparison),
                count: None,
            },
        ],
    })
}

pub fn mk_light_matrix_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("light_matrix_layout"),
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }],
    })
}

pub struct LightResources {
    pub uniform: LightUniform,
    pub buffer: wgpu::Buffer,
    pub shadow_map: Texture,
    pub resolution: u32,
    pub bind_group_layout: wgpu::BindGroupLayout,
    pub bind_group: wgpu::BindGroup,
    pub matrix_layout: wgpu::BindGroupLayout,
    pub matrix_bind_group: wgpu::BindGroup,
}

impl LightResources {
    pub fn new(device: &wgpu::Device, config: &ViewerConfig) -> Self {
        let direction = Vector3::new(-0.4, -1.0, -0.3).normalize();
        let default_bounds = Aabb::new(
            Vector3::new(-10.0, -10.0, -10.0),
            Vector3::new(10.0, 10.0, 10.0),
        );
        let uniform = LightUniform {
            view_proj: light_view_proj(&default_bounds, direction).into(),
            direction: direction.into(),
            ambient: config.ambient_intensity,
            color: [1.0, 1.0, 1.0],
            _pad: 0.0,
        };
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("light_buffer"),
            contents: bytemuck::cast_slice(&[uniform]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let resolution = config.shadow_map_resolution;
        let shadow_map = Texture::create_shadow_map(device, resolution);
        let bind_group_layout = mk_light_layout(device);
        let matrix_layout = mk_light_matrix_layout(device);
        let bind_group = Self::mk_bind_group(device, &bind_group_layout, &buffer, &shadow_map);
        let matrix_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("light_matrix_bind_group"),
            layout: &matrix_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
        });

        Self {
            uniform,
            buffer,
            shadow_map,
            resolution,
            bind_group_layout,
            bind_group,
            matrix_layout,
            matrix_bind_group,
        }
    }

    fn mk_bind_group(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        buffer: &wgpu::Buffer,
        shadow_map: &Texture,
    ) -> wgpu::BindGroup {
        let sampler = shadow_map
            .sampler
            .as_ref()
            .expect("shadow map carries a comparison sampler");
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("light_bind_group"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&shadow_map.view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
        })
    }

    /// Refit the light frustum to newly framed bounds.
    pub fn refit(&mut self, queue: &wgpu::Queue, bounds: &Aabb) {
        self.uniform.view_proj =
            light_view_proj(bounds, Vector3::from(self.uniform.direction)).into();
        queue.write_buffer(&self.buffer, 0, bytemuck::cast_slice(&[self.uniform]));
    }

    /// Swap the shadow map for one at a different resolution (quality
    /// changes) and rebuild the bind group around it.
    pub fn resize_shadow_map(&mut self, device: &wgpu::Device, resolution: u32) {
        if resolution == self.resolution {
            return;
        }
        self.shadow_map.texture.destroy();
        self.shadow_map = Texture::create_shadow_map(device, resolution);
        self.resolution = resolution;
        self.bind_group =
            Self::mk_bind_group(device, &self.bind_group_layout, &self.buffer, &self.shadow_map);
    }
}
