//! Id-buffer pass: every pickable draw writes its pick id into an R32Uint
//! target that [`crate::picking`] reads back.

use crate::pipelines::{mesh_uniform_layout, mk_render_pipeline};
use crate::texture::Texture;

pub const PICK_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R32Uint;

/// One pick pipeline per vertex layout/topology pair (meshes, ground,
/// overlays), all sharing the same shader.
pub fn mk_pick_pipeline(
    device: &wgpu::Device,
    camera_layout: &wgpu::BindGroupLayout,
    vertex_layout: wgpu::VertexBufferLayout<'_>,
    topology: wgpu::PrimitiveTopology,
    label: &str,
) -> wgpu::RenderPipeline {
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("pick_pipeline_layout"),
        bind_group_layouts: &[camera_layout, &mesh_uniform_layout(device)],
        push_constant_ranges: &[],
    });

    let shader = wgpu::ShaderModuleDescriptor {
        label: Some("pick_shader"),
        source: wgpu::ShaderSource::Wgsl(include_str!("pick.wgsl").into()),
    };

    mk_render_pipeline(
        device,
        label,
        &layout,
        Some(PICK_FORMAT),
        None,
        Some(Texture::DEPTH_FORMAT),
        topology,
        1,
        &[vertex_layout],
        shader,
    )
}
