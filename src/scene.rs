//! Scene lifecycle: build in dependency order, render, tear down in reverse.
//!
//! The scene owns everything that outlives an individual model: the surface
//! configuration, depth and MSAA targets, camera and light resources, the
//! ground grid, the axis indicator, the selection gizmo and every render
//! pipeline. Models plug into it through the [`ScenePort`] trait during
//! loading and through [`SceneContext::render`] afterwards.

use std::collections::HashSet;
use std::iter;

use cgmath::Vector3;
use winit::dpi::PhysicalPosition;

use crate::camera::CameraResources;
use crate::config::ViewerConfig;
use crate::engine::EngineHandle;
use crate::loader::{ScenePort, UploadContext};
use crate::model::{AXIS_PICK_ID, Aabb, LoadedModel, MeshEntity, MeshUniform, world_translation};
use crate::optimizer::QualityLevel;
use crate::picking;
use crate::pipelines::flat::{LineOverlay, axis_vertices, flat_position_layout, gizmo_vertices, mk_flat_pipeline};
use crate::pipelines::grid::{GroundPlane, grid_position_layout, mk_grid_pipeline};
use crate::pipelines::light::LightResources;
use crate::pipelines::mesh::mk_mesh_pipeline;
use crate::pipelines::pick::mk_pick_pipeline;
use crate::pipelines::shadow::{mk_shadow_pipeline, position_only_layout};
use crate::pipelines::{material_layout, mesh_uniform_layout};
use crate::texture::Texture;

struct Pipelines {
    mesh: wgpu::RenderPipeline,
    grid: wgpu::RenderPipeline,
    flat: wgpu::RenderPipeline,
    shadow: wgpu::RenderPipeline,
    pick_mesh: wgpu::RenderPipeline,
    pick_grid: wgpu::RenderPipeline,
    pick_flat: wgpu::RenderPipeline,
}

pub struct SceneContext {
    pub config: wgpu::SurfaceConfiguration,
    viewer_config: ViewerConfig,
    device: wgpu::Device,
    queue: wgpu::Queue,
    sample_count: u32,

    depth_texture: Texture,
    msaa_target: Option<Texture>,

    pub camera: CameraResources,
    pub light: LightResources,
    shadow_casters: HashSet<u32>,
    pub shadows_enabled: bool,

    pub ground: GroundPlane,
    pub axes: LineOverlay,
    pub gizmo: LineOverlay,
    pub gizmo_enabled: bool,

    mesh_uniform_layout: wgpu::BindGroupLayout,
    material_layout: wgpu::BindGroupLayout,
    white_pixel: Texture,
    pipelines: Pipelines,

    pub selected: Option<u32>,
}

impl SceneContext {
    /// Build the scene against an engine and window size. Construction
    /// order matters: surface first, then camera, light and shadow
    /// resources, then helper geometry, pipelines last since they reference
    /// every layout.
    pub fn new(engine: &EngineHandle, size: [u32; 2], viewer_config: ViewerConfig) -> Self {
        let device = engine.device.clone();
        let queue = engine.queue.clone();

        let surface_caps = engine.surface.get_capabilities(&engine.adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .unwrap_or(surface_caps.formats[0]);
        let alpha_mode = if viewer_config.alpha_channel {
            surface_caps
                .alpha_modes
                .iter()
                .copied()
                .find(|mode| *mode != wgpu::CompositeAlphaMode::Opaque)
                .unwrap_or(surface_caps.alpha_modes[0])
        } else {
            surface_caps.alpha_modes[0]
        };
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size[0].max(1),
            height: size[1].max(1),
            present_mode: surface_caps.present_modes[0],
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        engine.surface.configure(&device, &config);

        let sample_count = if viewer_config.antialias { 4 } else { 1 };
        let depth_texture = Texture::create_depth_texture(
            &device,
            [config.width, config.height],
            sample_count,
            viewer_config.stencil,
            "depth_texture",
        );
        let msaa_target = (sample_count > 1).then(|| {
            Texture::create_msaa_target(
                &device,
                [config.width, config.height],
                sample_count,
                config.format,
            )
        });

        let camera = CameraResources::new(&device, &viewer_config, config.width, config.height);
        let light = LightResources::new(&device, &viewer_config);

        let mesh_layout = mesh_uniform_layout(&device);
        let ground = GroundPlane::new(&device, &queue, &mesh_layout, 100.0);
        let axes = LineOverlay::new(&device, &mesh_layout, &axis_vertices(5.0), AXIS_PICK_ID, "axes");
        let mut gizmo = LineOverlay::new(
            &device,
            &mesh_layout,
            &gizmo_vertices(Vector3::new(0.0, 0.0, 0.0), 1.0),
            AXIS_PICK_ID,
            "gizmo",
        );
        gizmo.visible = false;

        let pipelines = Pipelines {
            mesh: mk_mesh_pipeline(
                &device,
                config.format,
                sample_count,
                viewer_config.stencil,
                &camera.bind_group_layout,
                &light.bind_group_layout,
            ),
            grid: mk_grid_pipeline(
                &device,
                config.format,
                sample_count,
                viewer_config.stencil,
                &camera.bind_group_layout,
            ),
            flat: mk_flat_pipeline(
                &device,
                config.format,
                sample_count,
                viewer_config.stencil,
                &camera.bind_group_layout,
            ),
            shadow: mk_shadow_pipeline(&device, &light.matrix_layout),
            pick_mesh: mk_pick_pipeline(
                &device,
                &camera.bind_group_layout,
                position_only_layout(),
                wgpu::PrimitiveTopology::TriangleList,
                "pick_mesh_pipeline",
            ),
            pick_grid: mk_pick_pipeline(
                &device,
                &camera.bind_group_layout,
                grid_position_layout(),
                wgpu::PrimitiveTopology::TriangleList,
                "pick_grid_pipeline",
            ),
            pick_flat: mk_pick_pipeline(
                &device,
                &camera.bind_group_layout,
                flat_position_layout(),
                wgpu::PrimitiveTopology::LineList,
                "pick_flat_pipeline",
            ),
        };

        let white_pixel = Texture::create_white_pixel(&device, &queue);
        let shadows_enabled = viewer_config.enable_shadows;

        log::info!(
            "scene ready: {}x{} {:?}, {}x msaa, shadows {}",
            config.width,
            config.height,
            config.format,
            sample_count,
            if shadows_enabled { "on" } else { "off" }
        );

        let material_layout = material_layout(&device);

        Self {
            config,
            viewer_config,
            device,
            queue,
            sample_count,
            depth_texture,
            msaa_target,
            camera,
            light,
            shadow_casters: HashSet::new(),
            shadows_enabled,
            ground,
            axes,
            gizmo,
            gizmo_enabled: false,
            mesh_uniform_layout: mesh_layout,
            material_layout,
            white_pixel,
            pipelines,
            selected: None,
        }
    }

    pub fn resize(&mut self, engine: &EngineHandle, size: [u32; 2]) {
        if size[0] == 0 || size[1] == 0 {
            return;
        }
        self.config.width = size[0];
        self.config.height = size[1];
        engine.surface.configure(&self.device, &self.config);
        self.depth_texture.texture.destroy();
        self.depth_texture = Texture::create_depth_texture(
            &self.device,
            size,
            self.sample_count,
            self.viewer_config.stencil,
            "depth_texture",
        );
        if let Some(old) = self.msaa_target.take() {
            old.texture.destroy();
            self.msaa_target = Some(Texture::create_msaa_target(
                &self.device,
                size,
                self.sample_count,
                self.config.format,
            ));
        }
        self.camera.projection.resize(size[0], size[1]);
    }

    /// Hand the loader owned clones of everything it needs to push geometry
    /// to the GPU.
    pub fn upload_context(&self) -> UploadContext {
        UploadContext {
            device: self.device.clone(),
            queue: self.queue.clone(),
            mesh_layout: self.mesh_uniform_layout.clone(),
            material_layout: self.material_layout.clone(),
            white_view: self.white_pixel.view.clone(),
            white_sampler: self
                .white_pixel
                .sampler
                .clone()
                .expect("white pixel carries a sampler"),
        }
    }

    /// Change selection and push the highlight flag into the affected mesh
    /// uniforms. Also repositions the gizmo on the selected element.
    pub fn set_selection(&mut self, model: Option<&LoadedModel>, selected: Option<u32>) {
        let previous = self.selected;
        if previous == selected {
            return;
        }
        self.selected = selected;

        if let Some(model) = model {
            for (index, mesh) in model.meshes.iter().enumerate() {
                let involved =
                    Some(mesh.pick_id) == previous || Some(mesh.pick_id) == selected;
                if !involved {
                    continue;
                }
                let world = world_translation(&model.meshes, index);
                self.push_mesh_uniform(mesh, world);
                if Some(mesh.pick_id) == selected {
                    let center = mesh.bounds.center();
                    let size = mesh.bounds.max_dimension().max(0.5) * 1.2;
                    let vertices = gizmo_vertices(center, size);
                    self.gizmo.rewrite(&self.queue, &vertices);
                    log::info!(
                        "selected '{}' ({} vertices, {} faces)",
                        mesh.name,
                        mesh.vertex_count,
                        mesh.face_count()
                    );
                }
            }
        }
        self.gizmo.visible = selected.is_some() && self.gizmo_enabled;
    }

    fn push_mesh_uniform(&self, mesh: &MeshEntity, world: Vector3<f32>) {
        let Some(geometry) = mesh.geometry() else {
            return;
        };
        let uniform = MeshUniform::new(world, mesh.pick_id, Some(mesh.pick_id) == self.selected);
        self.queue
            .write_buffer(&geometry.transform_buffer, 0, bytemuck::cast_slice(&[uniform]));
    }

    /// React to a quality level change from the optimizer. MSAA stays fixed
    /// to avoid a full pipeline rebuild; shadows carry most of the cost on
    /// large exports anyway.
    pub fn apply_quality(&mut self, level: QualityLevel) {
        match level {
            QualityLevel::Full => {
                self.shadows_enabled = self.viewer_config.enable_shadows;
                self.light
                    .resize_shadow_map(&self.device, self.viewer_config.shadow_map_resolution);
            }
            QualityLevel::ReducedShadows => {
                self.shadows_enabled = self.viewer_config.enable_shadows;
                self.light
                    .resize_shadow_map(&self.device, self.viewer_config.shadow_map_resolution / 4);
            }
            QualityLevel::Minimal => {
                self.shadows_enabled = false;
            }
        }
    }

    /// Render one frame.
    pub fn render(
        &mut self,
        engine: &EngineHandle,
        model: Option<&LoadedModel>,
    ) -> Result<(), wgpu::SurfaceError> {
        let output = engine.surface.get_current_texture()?;
        let surface_view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        self.camera.update(&self.queue);
        if let Some(model) = model {
            for (index, mesh) in model.meshes.iter().enumerate() {
                if !mesh.frozen {
                    self.push_mesh_uniform(mesh, world_translation(&model.meshes, index));
                }
            }
        }

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("frame_encoder"),
            });

        let casters_present = model
            .map(|m| m.meshes.iter().any(|mesh| mesh.casts_shadow))
            .unwrap_or(false);
        if self.shadows_enabled && casters_present && !self.shadow_casters.is_empty() {
            let mut shadow_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("shadow_pass"),
                color_attachments: &[],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.light.shadow_map.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            shadow_pass.set_pipeline(&self.pipelines.shadow);
            shadow_pass.set_bind_group(0, &self.light.matrix_bind_group, &[]);
            if let Some(model) = model {
                for mesh in &model.meshes {
                    if !mesh.casts_shadow || !self.shadow_casters.contains(&mesh.pick_id) {
                        continue;
                    }
                    let Some(geometry) = mesh.geometry() else {
                        continue;
                    };
                    shadow_pass.set_bind_group(1, &geometry.bind_group, &[]);
                    shadow_pass.set_vertex_buffer(0, geometry.vertex_buffer.slice(..));
                    shadow_pass
                        .set_index_buffer(geometry.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
                    shadow_pass.draw_indexed(0..mesh.index_count, 0, 0..1);
                }
            }
        }

        {
            let (view, resolve_target) = match &self.msaa_target {
                Some(msaa) => (&msaa.view, Some(&surface_view)),
                None => (&surface_view, None),
            };
            let load = if self.viewer_config.preserve_buffer {
                wgpu::LoadOp::Load
            } else {
                wgpu::LoadOp::Clear(self.viewer_config.background_color)
            };
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("main_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target,
                    ops: wgpu::Operations {
                        load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_texture.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
            });

            render_pass.set_bind_group(0, &self.camera.bind_group, &[]);

            if self.ground.visible {
                render_pass.set_pipeline(&self.pipelines.grid);
                render_pass.set_bind_group(1, &self.ground.bind_group, &[]);
                render_pass.set_vertex_buffer(0, self.ground.vertex_buffer.slice(..));
                render_pass.set_index_buffer(
                    self.ground.index_buffer.slice(..),
                    wgpu::IndexFormat::Uint32,
                );
                render_pass.draw_indexed(0..self.ground.index_count, 0, 0..1);
            }

            if let Some(model) = model {
                render_pass.set_pipeline(&self.pipelines.mesh);
                render_pass.set_bind_group(3, &self.light.bind_group, &[]);
                for mesh in &model.meshes {
                    let Some(geometry) = mesh.geometry() else {
                        continue;
                    };
                    let Some(material_gpu) =
                        mesh.material.as_ref().and_then(|material| material.gpu())
                    else {
                        continue;
                    };
                    render_pass.set_bind_group(1, &geometry.bind_group, &[]);
                    render_pass.set_bind_group(2, &material_gpu.bind_group, &[]);
                    render_pass.set_vertex_buffer(0, geometry.vertex_buffer.slice(..));
                    render_pass
                        .set_index_buffer(geometry.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
                    render_pass.draw_indexed(0..mesh.index_count, 0, 0..1);
                }
            }

            if self.axes.visible || self.gizmo.visible {
                render_pass.set_pipeline(&self.pipelines.flat);
                if self.axes.visible {
                    render_pass.set_vertex_buffer(0, self.axes.vertex_buffer.slice(..));
                    render_pass.draw(0..self.axes.vertex_count, 0..1);
                }
                if self.gizmo.visible {
                    render_pass.set_vertex_buffer(0, self.gizmo.vertex_buffer.slice(..));
                    render_pass.draw(0..self.gizmo.vertex_count, 0..1);
                }
            }
        }

        self.queue.submit(iter::once(encoder.finish()));
        output.present();
        Ok(())
    }

    /// Render the pick pass and resolve the id under the cursor.
    pub async fn pick(
        &self,
        model: Option<&LoadedModel>,
        coords: PhysicalPosition<f64>,
    ) -> u32 {
        picking::pick_at(
            &self.device,
            &self.queue,
            [self.config.width, self.config.height],
            coords,
            |pass| {
                pass.set_bind_group(0, &self.camera.bind_group, &[]);

                if let Some(model) = model {
                    pass.set_pipeline(&self.pipelines.pick_mesh);
                    for mesh in &model.meshes {
                        let Some(geometry) = mesh.geometry() else {
                            continue;
                        };
                        pass.set_bind_group(1, &geometry.bind_group, &[]);
                        pass.set_vertex_buffer(0, geometry.vertex_buffer.slice(..));
                        pass.set_index_buffer(
                            geometry.index_buffer.slice(..),
                            wgpu::IndexFormat::Uint32,
                        );
                        pass.draw_indexed(0..mesh.index_count, 0, 0..1);
                    }
                }

                if self.ground.visible {
                    pass.set_pipeline(&self.pipelines.pick_grid);
                    pass.set_bind_group(1, &self.ground.pick_bind_group, &[]);
                    pass.set_vertex_buffer(0, self.ground.vertex_buffer.slice(..));
                    pass.set_index_buffer(
                        self.ground.index_buffer.slice(..),
                        wgpu::IndexFormat::Uint32,
                    );
                    pass.draw_indexed(0..self.ground.index_count, 0, 0..1);
                }

                if self.axes.visible {
                    pass.set_pipeline(&self.pipelines.pick_flat);
                    pass.set_bind_group(1, &self.axes.pick_bind_group, &[]);
                    pass.set_vertex_buffer(0, self.axes.vertex_buffer.slice(..));
                    pass.draw(0..self.axes.vertex_count, 0..1);
                }
            },
        )
        .await
    }

    /// Tear the scene down in reverse construction order. Pipelines and
    /// layouts drop with the struct; explicit destroys cover the buffers and
    /// textures that would otherwise linger until the next submit.
    pub fn dispose(&mut self) {
        self.gizmo.vertex_buffer.destroy();
        self.gizmo.pick_buffer.destroy();
        self.axes.vertex_buffer.destroy();
        self.axes.pick_buffer.destroy();
        self.ground.vertex_buffer.destroy();
        self.ground.index_buffer.destroy();
        self.ground.pick_buffer.destroy();
        self.ground.texture.texture.destroy();
        self.light.shadow_map.texture.destroy();
        self.light.buffer.destroy();
        self.camera.buffer.destroy();
        if let Some(msaa) = &self.msaa_target {
            msaa.texture.destroy();
        }
        self.depth_texture.texture.destroy();
        self.white_pixel.texture.destroy();
        log::info!("scene disposed");
    }
}

impl ScenePort for SceneContext {
    fn register_shadow_caster(&mut self, pick_id: u32) {
        self.shadow_casters.insert(pick_id);
    }

    fn deregister_shadow_caster(&mut self, pick_id: u32) {
        self.shadow_casters.remove(&pick_id);
    }

    fn frame_camera(&mut self, bounds: &Aabb) {
        self.camera.camera.frame_bounds(bounds, &self.viewer_config);
        self.camera.update(&self.queue);
        self.light.refit(&self.queue, bounds);
    }

    fn write_mesh_transform(&mut self, mesh: &MeshEntity, world: Vector3<f32>) {
        self.push_mesh_uniform(mesh, world);
    }
}
