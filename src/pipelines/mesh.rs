//! Main lit pass for model meshes.

use crate::model::MeshVertex;
use crate::pipelines::{material_layout, mesh_uniform_layout, mk_render_pipeline};
use crate::texture::Texture;

pub fn mk_mesh_pipeline(
    device: &wgpu::Device,
    surface_format: wgpu::TextureFormat,
    sample_count: u32,
    stencil: bool,
    camera_layout: &wgpu::BindGroupLayout,
    light_layout: &wgpu::BindGroupLayout,
) -> wgpu::RenderPipeline {
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("mesh_pipeline_layout"),
        bind_group_layouts: &[
            camera_layout,
            &mesh_uniform_layout(device),
            &material_layout(device),
            light_layout,
        ],
        push_constant_ranges: &[],
    });

    let shader = wgpu::ShaderModuleDescriptor {
        label: Some("mesh_shader"),
        source: wgpu::ShaderSource::Wgsl(include_str!("mesh.wgsl").into()),
    };

    let depth_format = if stencil {
        Texture::DEPTH_STENCIL_FORMAT
    } else {
        Texture::DEPTH_FORMAT
    };

    mk_render_pipeline(
        device,
        "mesh_pipeline",
        &layout,
        Some(surface_format),
        Some(wgpu::BlendState {
            alpha: wgpu::BlendComponent::REPLACE,
            color: wgpu::BlendComponent::REPLACE,
        }),
        Some(depth_format),
        wgpu::PrimitiveTopology::TriangleList,
        sample_count,
        &[MeshVertex::desc()],
        shader,
    )
}
