//! Ground plane with a tiled procedural grid texture.

use std::mem;

use wgpu::util::DeviceExt;

use crate::model::{GROUND_PICK_ID, MeshUniform};
use crate::pipelines::mk_render_pipeline;
use crate::texture::Texture;

#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GridVertex {
    pub position: [f32; 3],
    pub uv: [f32; 2],
}

pub fn grid_vertex_layout() -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: mem::size_of::<GridVertex>() as wgpu::BufferAddress,
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
                format: wgpu::VertexFormat::Float32x2,
            },
        ],
    }
}

/// Position-only view of the grid vertex buffer, for the pick pass.
pub fn grid_position_layout() -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: mem::size_of::<GridVertex>() as wgpu::BufferAddress,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &[wgpu::VertexAttribute {
            offset: 0,
            shader_location: 0,
            format: wgpu::VertexFormat::Float32x3,
        }],
    }
}

pub fn texture_sampler_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("texture_sampler_layout"),
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    multisampled: false,
                    view_dimension: wgpu::TextureViewDimension::D2,
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
        ],
    })
}

pub struct GroundPlane {
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub index_count: u32,
    pub texture: Texture,
    pub bind_group: wgpu::BindGroup,
    pub pick_buffer: wgpu::Buffer,
    pub pick_bind_group: wgpu::BindGroup,
    pub visible: bool,
}

impl GroundPlane {
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        mesh_uniform_layout: &wgpu::BindGroupLayout,
        half_extent: f32,
    ) -> Self {
        let tiles = half_extent / 2.0;
        let vertices = [
            GridVertex {
                position: [-half_extent, 0.0, -half_extent],
                uv: [0.0, 0.0],
            },
            GridVertex {
                position: [half_extent, 0.0, -half_extent],
                uv: [tiles, 0.0],
            },
            GridVertex {
                position: [half_extent, 0.0, half_extent],
                uv: [tiles, tiles],
            },
            GridVertex {
                position: [-half_extent, 0.0, half_extent],
                uv: [0.0, tiles],
            },
        ];
        let indices: [u32; 6] = [0, 2, 1, 0, 3, 2];

        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("ground_vertices"),
            contents: bytemuck::cast_slice(&vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("ground_indices"),
            contents: bytemuck::cast_slice(&indices),
            usage: wgpu::BufferUsages::INDEX,
        });

        let texture = Texture::create_grid_texture(device, queue, 64);
        let sampler = texture
            .sampler
            .as_ref()
            .expect("grid texture carries a sampler");
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("ground_bind_group"),
            layout: &texture_sampler_layout(device),
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&texture.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
        });

        let pick_uniform = MeshUniform::new(cgmath::Vector3::new(0.0, 0.0, 0.0), GROUND_PICK_ID, false);
        let pick_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("ground_pick_uniform"),
            contents: bytemuck::cast_slice(&[pick_uniform]),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let pick_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("ground_pick_bind_group"),
            layout: mesh_uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: pick_buffer.as_entire_binding(),
            }],
        });

        Self {
            vertex_buffer,
            index_buffer,
            index_count: indices.len() as u32,
            texture,
            bind_group,
            pick_buffer,
            pick_bind_group,
            visible: true,
        }
    }
}

pub fn mk_grid_pipeline(
    device: &wgpu::Device,
    surface_format: wgpu::TextureFormat,
    sample_count: u32,
    stencil: bool,
    camera_layout: &wgpu::BindGroupLayout,
) -> wgpu::RenderPipeline {
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("grid_pipeline_layout"),
        bind_group_layouts: &[camera_layout, &texture_sampler_layout(device)],
        push_constant_ranges: &[],
    });

    let shader = wgpu::ShaderModuleDescriptor {
        label: Some("grid_shader"),
        source: wgpu::ShaderSource::Wgsl(include_str!("grid.wgsl").into()),
    };

    let depth_format = if stencil {
        Texture::DEPTH_STENCIL_FORMAT
    } else {
        Texture::DEPTH_FORMAT
    };

    mk_render_pipeline(
        device,
        "grid_pipeline",
        &layout,
        Some(surface_format),
        Some(wgpu::BlendState {
            alpha: wgpu::BlendComponent::REPLACE,
            color: wgpu::BlendComponent::REPLACE,
        }),
        Some(depth_format),
        wgpu::PrimitiveTopology::TriangleList,
        sample_count,
        &[grid_vertex_layout()],
        shader,
    )
}
