//! Depth-only pass rendering casters into the shadow map.

use std::mem;

use crate::model::MeshVertex;
use crate::pipelines::{mesh_uniform_layout, mk_render_pipeline};
use crate::texture::Texture;

/// Position-only view of the shared mesh vertex buffer.
pub fn position_only_layout() -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: mem::size_of::<MeshVertex>() as wgpu::BufferAddress,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &[wgpu::VertexAttribute {
            offset: 0,
            shader_location: 0,
            format: wgpu::VertexFormat::Float32x3,
        }],
    }
}

pub fn mk_shadow_pipeline(
    device: &wgpu::Device,
    light_matrix_layout: &wgpu::BindGroupLayout,
) -> wgpu::RenderPipeline {
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("shadow_pipeline_layout"),
        bind_group_layouts: &[light_matrix_layout, &mesh_uniform_layout(device)],
        push_constant_ranges: &[],
    });

    let shader = wgpu::ShaderModuleDescriptor {
        label: Some("shadow_shader"),
        source: wgpu::ShaderSource::Wgsl(include_str!("shadow.wgsl").into()),
    };

    mk_render_pipeline(
        device,
        "shadow_pipeline",
        &layout,
        None,
        None,
        Some(Texture::SHADOW_FORMAT),
        wgpu::PrimitiveTopology::TriangleList,
        1,
        &[position_only_layout()],
        shader,
    )
}
