//! Unlit line overlays: the world axis indicator and the selection gizmo.

use std::mem;

use cgmath::Vector3;
use wgpu::util::DeviceExt;

use crate::model::MeshUniform;
use crate::pipelines::mk_render_pipeline;
use crate::texture::Texture;

#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct FlatVertex {
    pub position: [f32; 3],
    pub color: [f32; 4],
}

pub fn flat_vertex_layout() -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: mem::size_of::<FlatVertex>() as wgpu::BufferAddress,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &[
            wgpu::VertexAttribute {
                offset: 0,
                shader_location: 0,
                format: wgpu::VertexFormat::Float32x3,
            },
            wgpu::VertexAttribute {
                offset: mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                shader_location: 1,
                format: wgpu::VertexFormat::Float32x4,
            },
        ],
    }
}

/// Position-only view of the flat vertex buffer, for the pick pass.
pub fn flat_position_layout() -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: mem::size_of::<FlatVertex>() as wgpu::BufferAddress,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &[wgpu::VertexAttribute {
            offset: 0,
            shader_location: 0,
            format: wgpu::VertexFormat::Float32x3,
        }],
    }
}

/// X red, Y green, Z blue from the origin.
pub fn axis_vertices(length: f32) -> Vec<FlatVertex> {
    let origin = [0.0, 0.0, 0.0];
    let x = [0.9, 0.2, 0.2, 1.0];
    let y = [0.25, 0.85, 0.3, 1.0];
    let z = [0.25, 0.45, 0.95, 1.0];
    vec![
        FlatVertex { position: origin, color: x },
        FlatVertex { position: [length, 0.0, 0.0], color: x },
        FlatVertex { position: origin, color: y },
        FlatVertex { position: [0.0, length, 0.0], color: y },
        FlatVertex { position: origin, color: z },
        FlatVertex { position: [0.0, 0.0, length], color: z },
    ]
}

/// A three-axis cross centered on the selected element.
pub fn gizmo_vertices(center: Vector3<f32>, size: f32) -> Vec<FlatVertex> {
    let half = size / 2.0;
    let color = [1.0, 0.8, 0.2, 1.0];
    let c = [center.x, center.y, center.z];
    vec![
        FlatVertex { position: [c[0] - half, c[1], c[2]], color },
        FlatVertex { position: [c[0] + half, c[1], c[2]], color },
        FlatVertex { position: [c[0], c[1] - half, c[2]], color },
        FlatVertex { position: [c[0], c[1] + half, c[2]], color },
        FlatVertex { position: [c[0], c[1], c[2] - half], color },
        FlatVertex { position: [c[0], c[1], c[2] + half], color },
    ]
}

/// A line-list overlay with a fixed-capacity, rewritable vertex buffer and
/// its own pick uniform (reserved ids keep overlay picks from clearing the
/// selection).
pub struct LineOverlay {
    pub vertex_buffer: wgpu::Buffer,
    pub vertex_count: u32,
    pub pick_buffer: wgpu::Buffer,
    pub pick_bind_group: wgpu::BindGroup,
    pub visible: bool,
}

impl LineOverlay {
    pub fn new(
        device: &wgpu::Device,
        mesh_uniform_layout: &wgpu::BindGroupLayout,
        vertices: &[FlatVertex],
        pick_id: u32,
        label: &str,
    ) -> Self {
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::cast_slice(vertices),
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
        });
        let pick_uniform = MeshUniform::new(Vector3::new(0.0, 0.0, 0.0), pick_id, false);
        let pick_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label}_pick_uniform")),
            contents: bytemuck::cast_slice(&[pick_uniform]),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let pick_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("{label}_pick_bind_group")),
            layout: mesh_uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: pick_buffer.as_entire_binding(),
            }],
        });
        Self {
            vertex_buffer,
            vertex_count: vertices.len() as u32,
            pick_buffer,
            pick_bind_group,
            visible: true,
        }
    }

    /// Rewrite the overlay geometry in place. The new vertex list must not
    /// exceed the original capacity.
    pub fn rewrite(&mut self, queue: &wgpu::Queue, vertices: &[FlatVertex]) {
        queue.write_buffer(&self.vertex_buffer, 0, bytemuck::cast_slice(vertices));
        self.vertex_count = vertices.len() as u32;
    }
}

pub fn mk_flat_pipeline(
    device: &wgpu::Device,
    surface_format: wgpu::TextureFormat,
    sample_count: u32,
    stencil: bool,
    camera_layout: &wgpu::BindGroupLayout,
) -> wgpu::RenderPipeline {
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("flat_pipeline_layout"),
        bind_group_layouts: &[camera_layout],
        push_constant_ranges: &[],
    });

    let shader = wgpu::ShaderModuleDescriptor {
        label: Some("flat_shader"),
        source: wgpu::ShaderSource::Wgsl(include_str!("flat.wgsl").into()),
    };

    let depth_format = if stencil {
        Texture::DEPTH_STENCIL_FORMAT
    } else {
        Texture::DEPTH_FORMAT
    };

    mk_render_pipeline(
        device,
        "flat_pipeline",
        &layout,
        Some(surface_format),
        Some(wgpu::BlendState {
            alpha: wgpu::BlendComponent::REPLACE,
            color: wgpu::BlendComponent::REPLACE,
        }),
        Some(depth_format),
        wgpu::PrimitiveTopology::LineList,
        sample_count,
        &[flat_vertex_layout()],
        shader,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn axis_lines_leave_the_origin_along_each_axis() {
        let vertices = axis_vertices(5.0);
        assert_eq!(vertices.len(), 6);
        assert_eq!(vertices[1].position, [5.0, 0.0, 0.0]);
        assert_eq!(vertices[3].position, [0.0, 5.0, 0.0]);
        assert_eq!(vertices[5].position, [0.0, 0.0, 5.0]);
    }

    #[test]
    fn gizmo_cross_is_centered_on_the_selection() {
        let vertices = gizmo_vertices(Vector3::new(2.0, 3.0, 4.0), 2.0);
        assert_eq!(vertices.len(), 6);
        assert_eq!(vertices[0].position, [1.0, 3.0, 4.0]);
        assert_eq!(vertices[1].position, [3.0, 3.0, 4.0]);
    }
}
