//! The model-load pipeline.
//!
//! A load runs through fixed phases: resolve the source bytes, parse and
//! upload geometry (the "import" slice of the timing breakdown), apply
//! default materials, register shadow casters, compute aggregate bounds,
//! center at the origin, fit the camera, and finally freeze static meshes.
//! Progress is reported monotonically and a cancellation token is honored
//! between phases; a cancelled load returns [`LoadError::Cancelled`] and the
//! caller disposes whatever was already uploaded.
//!
//! GPU effects go through two seams so the pipeline logic stays testable
//! without a device: [`UploadContext`] (optional, owns buffer/texture
//! creation) and [`ScenePort`] (camera framing, shadow registration,
//! transform writes).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use cgmath::Vector3;
use instant::Instant;
use wgpu::util::DeviceExt;

use crate::config::ViewerConfig;
use crate::model::parse::{self, ParseError, ParsedModel};
use crate::model::{
    Aabb, LoadedModel, Material, MaterialGpu, MaterialUniform, MeshEntity, MeshGeometry,
    MeshUniform, MeshVertex, ModelSource, ModelStats, PbrParams, StructureReport, TextureResource,
    TextureSlots, apply_center_offset, world_translation,
};
use crate::telemetry::{TimingBreakdown, timed};
use crate::texture::Texture;

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("load cancelled")]
    Cancelled,
    #[error("could not read '{path}': {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("unsupported model source: {0}")]
    UnsupportedSource(String),
    #[error("model contains no renderable geometry")]
    EmptyModel,
}

/// Shared cancellation flag; clone it into whatever needs to abort a load.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), LoadError> {
        if self.is_cancelled() {
            Err(LoadError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Per-load switches; defaults come from the viewer config.
#[derive(Clone, Copy, Debug)]
pub struct LoadOptions {
    pub apply_materials: bool,
    pub enable_shadows: bool,
    pub freeze_meshes: bool,
    pub center_at_origin: bool,
    pub fit_to_view: bool,
}

impl LoadOptions {
    pub fn from_config(config: &ViewerConfig) -> Self {
        Self {
            apply_materials: config.apply_materials,
            enable_shadows: config.enable_shadows,
            freeze_meshes: config.freeze_meshes,
            center_at_origin: config.center_at_origin,
            fit_to_view: config.fit_to_view,
        }
    }
}

/// Scene-side effects the pipeline needs. Implemented by the live scene and
/// by a recorder in tests.
pub trait ScenePort {
    fn register_shadow_caster(&mut self, pick_id: u32);
    fn deregister_shadow_caster(&mut self, pick_id: u32);
    fn frame_camera(&mut self, bounds: &Aabb);
    fn write_mesh_transform(&mut self, mesh: &MeshEntity, world: Vector3<f32>);
}

/// Buffers port effects for a load running off the event loop; the shell
/// replays them onto the live scene once the task's result comes back.
#[derive(Debug, Default)]
pub struct SceneJournal {
    registered: Vec<u32>,
    deregistered: Vec<u32>,
    framed: Vec<Aabb>,
    transforms: Vec<(u32, Vector3<f32>)>,
}

impl ScenePort for SceneJournal {
    fn register_shadow_caster(&mut self, pick_id: u32) {
        self.registered.push(pick_id);
    }

    fn deregister_shadow_caster(&mut self, pick_id: u32) {
        self.deregistered.push(pick_id);
    }

    fn frame_camera(&mut self, bounds: &Aabb) {
        self.framed.push(*bounds);
    }

    fn write_mesh_transform(&mut self, mesh: &MeshEntity, world: Vector3<f32>) {
        self.transforms.push((mesh.pick_id, world));
    }
}

impl SceneJournal {
    /// Deregistrations always land (they refer to the disposed model);
    /// everything recorded for the new model only applies to meshes the
    /// caller kept, so a failed load replays as teardown only.
    pub fn replay(self, scene: &mut dyn ScenePort, meshes: &[MeshEntity]) {
        for pick_id in self.deregistered {
            scene.deregister_shadow_caster(pick_id);
        }
        for pick_id in self.registered {
            if meshes.iter().any(|mesh| mesh.pick_id == pick_id) {
                scene.register_shadow_caster(pick_id);
            }
        }
        if !meshes.is_empty() {
            for bounds in &self.framed {
                scene.frame_camera(bounds);
            }
        }
        for (pick_id, world) in self.transforms {
            if let Some(mesh) = meshes.iter().find(|mesh| mesh.pick_id == pick_id) {
                scene.write_mesh_transform(mesh, world);
            }
        }
    }
}

/// GPU upload dependencies. Owned clones of the scene's handles (wgpu
/// resources are refcounted) so the scene stays free to act as the port.
/// `None` in unit tests keeps every entity detached.
pub struct UploadContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub mesh_layout: wgpu::BindGroupLayout,
    pub material_layout: wgpu::BindGroupLayout,
    pub white_view: wgpu::TextureView,
    pub white_sampler: wgpu::Sampler,
}

/// Progress that can only move forward. Phase milestones overlap when a
/// phase is skipped; clamping keeps callers' progress bars from jumping
/// backwards.
struct ProgressReporter<'a> {
    callback: &'a mut dyn FnMut(f32),
    last: f32,
}

impl<'a> ProgressReporter<'a> {
    fn new(callback: &'a mut dyn FnMut(f32)) -> Self {
        Self {
            callback,
            last: 0.0,
        }
    }

    fn report(&mut self, value: f32) {
        let clamped = value.clamp(self.last, 1.0);
        if clamped > self.last {
            self.last = clamped;
            (self.callback)(clamped);
        }
    }
}

pub struct ModelLoader {
    config: ViewerConfig,
    cancel: CancelToken,
}

impl ModelLoader {
    pub fn new(config: ViewerConfig) -> Self {
        Self {
            config,
            cancel: CancelToken::new(),
        }
    }

    /// Loader armed with a caller-held token, for loads that run on a task
    /// while the token stays with the session.
    pub fn with_token(config: ViewerConfig, cancel: CancelToken) -> Self {
        Self { config, cancel }
    }

    /// Token for the load currently in flight.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Arm a fresh token; call before starting a load after a cancellation.
    pub fn reset(&mut self) {
        self.cancel = CancelToken::new();
    }

    /// Run the full pipeline. On `Err(Cancelled)` the caller owns cleanup of
    /// any meshes already handed to the port.
    pub fn load(
        &mut self,
        source: ModelSource,
        options: &LoadOptions,
        upload: Option<&UploadContext>,
        port: &mut dyn ScenePort,
        on_progress: &mut dyn FnMut(f32),
    ) -> Result<LoadedModel, LoadError> {
        let cancel = self.cancel.clone();
        let started = Instant::now();
        let mut timings = TimingBreakdown::default();
        let mut progress = ProgressReporter::new(on_progress);

        let (name, parsed, mut meshes, materials, textures) =
            timed(&mut timings.import, || -> Result<_, LoadError> {
                let (name, bytes) = resolve_source(source)?;
                progress.report(0.1);
                cancel.check()?;

                let parsed = parse::parse_glb(&bytes, &name)?;
                progress.report(0.4);
                cancel.check()?;

                let (meshes, materials, textures) = build_entities(&parsed);
                if meshes.is_empty() {
                    return Err(LoadError::EmptyModel);
                }

                if let Some(upload) = upload {
                    upload_model(upload, &parsed, &meshes, &materials, &textures);
                }
                progress.report(0.6);
                Ok((name, parsed, meshes, materials, textures))
            })?;
        cancel.check()?;

        let report = StructureReport {
            nodes: parsed.node_count,
            meshes: meshes.len() as u32,
            primitives: parsed.primitive_count,
            materials: materials.len() as u32,
            textures: textures.len() as u32,
            approx_vertices: meshes.iter().map(|m| u64::from(m.vertex_count)).sum(),
        };

        timed(&mut timings.materials, || {
            if options.apply_materials {
                apply_default_materials(&mut meshes, &self.config, upload);
            }
        });
        progress.report(0.7);
        cancel.check()?;

        timed(&mut timings.shadows, || {
            if options.enable_shadows {
                register_shadow_casters(&mut meshes, self.config.min_caster_extent, port);
            }
        });
        progress.report(0.75);
        cancel.check()?;

        let stats = timed(&mut timings.bounds, || {
            let mut stats =
                ModelStats::aggregate(&meshes, materials.len() as u32, textures.len() as u32);
            if options.center_at_origin {
                let offset = -stats.bounding_box.center();
                apply_center_offset(&mut meshes, &mut stats, offset);
            }
            if options.fit_to_view {
                port.frame_camera(&stats.bounding_box);
            }
            stats
        });
        progress.report(0.9);
        cancel.check()?;

        timed(&mut timings.freeze, || {
            // final transform write happens either way so centering lands on
            // the GPU; freezing then stops the per-frame writes
            for index in 0..meshes.len() {
                let world = world_translation(&meshes, index);
                port.write_mesh_transform(&meshes[index], world);
                if options.freeze_meshes {
                    meshes[index].frozen = true;
                }
            }
        });
        progress.report(1.0);

        timings.total = started.elapsed();
        timings.log_summary(&name);

        Ok(LoadedModel {
            name,
            meshes,
            stats,
            timings,
            report,
        })
    }
}

fn resolve_source(source: ModelSource) -> Result<(String, Vec<u8>), LoadError> {
    match source {
        ModelSource::File { name, bytes } => Ok((name, bytes)),
        ModelSource::Path(path) => {
            let name = ModelSource::Path(path.clone()).label();
            let bytes = std::fs::read(&path).map_err(|source| LoadError::Read {
                path: path.display().to_string(),
                source,
            })?;
            Ok((name, bytes))
        }
        ModelSource::Url(url) => Err(LoadError::UnsupportedSource(url)),
    }
}

/// CPU-side entity construction: pick ids are assigned 1..=n in parse order
/// (0 means "nothing picked"), materials and textures become shared handles.
fn build_entities(
    parsed: &ParsedModel,
) -> (
    Vec<MeshEntity>,
    Vec<Arc<Material>>,
    Vec<Arc<TextureResource>>,
) {
    let textures: Vec<Arc<TextureResource>> = parsed
        .images
        .iter()
        .map(|image| Arc::new(TextureResource::detached(image.label.clone())))
        .collect();

    let materials: Vec<Arc<Material>> = parsed
        .materials
        .iter()
        .map(|material| {
            let slot = |index: Option<usize>| index.map(|i| textures[i].clone());
            Arc::new(Material::new(
                material.name.clone(),
                PbrParams {
                    albedo: material.albedo,
                    metallic: material.metallic,
                    roughness: material.roughness,
                },
                TextureSlots {
                    albedo: slot(material.albedo_image),
                    bump: slot(material.normal_image),
                    metallic: slot(material.metallic_roughness_image),
                    ambient: slot(material.occlusion_image),
                    emissive: slot(material.emissive_image),
                    ..Default::default()
                },
            ))
        })
        .collect();

    let meshes: Vec<MeshEntity> = parsed
        .meshes
        .iter()
        .enumerate()
        .map(|(index, parsed_mesh)| {
            let mut entity = MeshEntity::from_parsed(parsed_mesh, index as u32 + 1);
            entity.material = parsed_mesh.material.map(|i| materials[i].clone());
            entity
        })
        .collect();

    (meshes, materials, textures)
}

fn upload_model(
    upload: &UploadContext,
    parsed: &ParsedModel,
    meshes: &[MeshEntity],
    materials: &[Arc<Material>],
    textures: &[Arc<TextureResource>],
) {
    for (resource, image) in textures.iter().zip(&parsed.images) {
        match Texture::from_bytes(&upload.device, &upload.queue, &image.bytes, &image.label) {
            Ok(texture) => resource.attach(texture),
            Err(error) => log::warn!("failed to decode texture '{}': {error}", image.label),
        }
    }

    for material in materials {
        attach_material_gpu(upload, material);
    }

    for (entity, parsed_mesh) in meshes.iter().zip(&parsed.meshes) {
        let vertices: Vec<MeshVertex> = parsed_mesh
            .positions
            .iter()
            .zip(&parsed_mesh.normals)
            .zip(&parsed_mesh.tex_coords)
            .map(|((position, normal), tex_coords)| MeshVertex {
                position: *position,
                normal: *normal,
                tex_coords: *tex_coords,
            })
            .collect();

        let vertex_buffer = upload
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("{}_vertices", entity.name)),
                contents: bytemuck::cast_slice(&vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });
        let index_buffer = upload
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("{}_indices", entity.name)),
                contents: bytemuck::cast_slice(&parsed_mesh.indices),
                usage: wgpu::BufferUsages::INDEX,
            });
        let uniform = MeshUniform::new(entity.translation, entity.pick_id, false);
        let transform_buffer = upload
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("{}_uniform", entity.name)),
                contents: bytemuck::cast_slice(&[uniform]),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            });
        let bind_group = upload.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("{}_bind_group", entity.name)),
            layout: &upload.mesh_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: transform_buffer.as_entire_binding(),
            }],
        });

        entity.attach_geometry(MeshGeometry {
            vertex_buffer,
            index_buffer,
            transform_buffer,
            bind_group,
        });
    }
}

fn attach_material_gpu(upload: &UploadContext, material: &Material) {
    let uniform = MaterialUniform::from(&material.params);
    let uniform_buffer = upload
        .device
        .create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{}_params", material.name)),
            contents: bytemuck::cast_slice(&[uniform]),
            usage: wgpu::BufferUsages::UNIFORM,
        });

    let albedo = material
        .slots
        .albedo
        .as_ref()
        .and_then(|resource| resource.gpu());
    let (view, sampler) = match albedo {
        Some(texture) => (
            &texture.view,
            texture.sampler.as_ref().unwrap_or(&upload.white_sampler),
        ),
        None => (&upload.white_view, &upload.white_sampler),
    };

    let bind_group = upload.device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(&format!("{}_bind_group", material.name)),
        layout: &upload.material_layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::TextureView(view),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
        ],
    });

    material.attach_gpu(MaterialGpu {
        uniform_buffer,
        bind_group,
    });
}

/// Give every material-less mesh one shared default surface.
fn apply_default_materials(
    meshes: &mut [MeshEntity],
    config: &ViewerConfig,
    upload: Option<&UploadContext>,
) {
    if meshes.iter().all(|mesh| mesh.material.is_some()) {
        return;
    }
    let default = Arc::new(Material::new(
        "default",
        PbrParams {
            albedo: config.default_albedo,
            metallic: config.default_metallic,
            roughness: config.default_roughness,
        },
        TextureSlots::default(),
    ));
    if let Some(upload) = upload {
        attach_material_gpu(upload, &default);
    }
    for mesh in meshes.iter_mut() {
        if mesh.material.is_none() {
            mesh.material = Some(default.clone());
        }
    }
}

/// A mesh casts a shadow when it has indexed geometry and is large enough
/// to matter.
fn register_shadow_casters(
    meshes: &mut [MeshEntity],
    min_caster_extent: f32,
    port: &mut dyn ScenePort,
) {
    for mesh in meshes.iter_mut() {
        let eligible = mesh.index_count > 0
            && !mesh.bounds.is_degenerate()
            && mesh.bounds.max_dimension() >= min_caster_extent;
        mesh.casts_shadow = eligible;
        if eligible {
            port.register_shadow_caster(mesh.pick_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::parse::ParsedMesh;

    #[derive(Default)]
    struct RecordingPort {
        shadow_casters: Vec<u32>,
        framed: Vec<Aabb>,
        transforms: Vec<(u32, Vector3<f32>)>,
    }

    impl ScenePort for RecordingPort {
        fn register_shadow_caster(&mut self, pick_id: u32) {
            self.shadow_casters.push(pick_id);
        }

        fn deregister_shadow_caster(&mut self, pick_id: u32) {
            self.shadow_casters.retain(|id| *id != pick_id);
        }

        fn frame_camera(&mut self, bounds: &Aabb) {
            self.framed.push(*bounds);
        }

        fn write_mesh_transform(&mut self, mesh: &MeshEntity, world: Vector3<f32>) {
            self.transforms.push((mesh.pick_id, world));
        }
    }

    fn parsed_mesh(name: &str, min: [f32; 3], max: [f32; 3]) -> ParsedMesh {
        ParsedMesh {
            name: name.to_string(),
            parent: None,
            positions: vec![min, max, [min[0], max[1], min[2]]],
            normals: vec![[0.0, 1.0, 0.0]; 3],
            tex_coords: vec![[0.0, 0.0]; 3],
            indices: vec![0, 1, 2],
            material: None,
            bounds: Aabb::new(min.into(), max.into()),
        }
    }

    fn parsed_model(meshes: Vec<ParsedMesh>) -> ParsedModel {
        let node_count = meshes.len() as u32;
        ParsedModel {
            name: "test.glb".to_string(),
            primitive_count: meshes.len() as u32,
            node_count,
            meshes,
            materials: vec![],
            images: vec![],
        }
    }

    // Minimal valid GLB so the full load path can run without a GPU.
    fn triangle_glb_bytes() -> Vec<u8> {
        let positions: [[f32; 3]; 3] = [[4.0, 4.0, 4.0], [6.0, 4.0, 4.0], [4.0, 6.0, 4.0]];
        let mut bin = Vec::new();
        for p in positions {
            for v in p {
                bin.extend_from_slice(&v.to_le_bytes());
            }
        }
        for i in [0u16, 1, 2] {
            bin.extend_from_slice(&i.to_le_bytes());
        }
        let json = format!(
            r#"{{"asset":{{"version":"2.0"}},"scene":0,"scenes":[{{"nodes":[0]}}],"nodes":[{{"mesh":0,"name":"tri"}}],"meshes":[{{"primitives":[{{"attributes":{{"POSITION":0}},"indices":1}}]}}],"buffers":[{{"byteLength":{}}}],"bufferViews":[{{"buffer":0,"byteOffset":0,"byteLength":36}},{{"buffer":0,"byteOffset":36,"byteLength":6}}],"accessors":[{{"bufferView":0,"componentType":5126,"count":3,"type":"VEC3","min":[4,4,4],"max":[6,6,4]}},{{"bufferView":1,"componentType":5123,"count":3,"type":"SCALAR"}}]}}"#,
            bin.len()
        );
        let mut json_bytes = json.into_bytes();
        while json_bytes.len() % 4 != 0 {
            json_bytes.push(b' ');
        }
        while bin.len() % 4 != 0 {
            bin.push(0);
        }
        let total = 12 + 8 + json_bytes.len() + 8 + bin.len();
        let mut out = Vec::new();
        out.extend_from_slice(&0x4654_6C67u32.to_le_bytes());
        out.extend_from_slice(&2u32.to_le_bytes());
        out.extend_from_slice(&(total as u32).to_le_bytes());
        out.extend_from_slice(&(json_bytes.len() as u32).to_le_bytes());
        out.extend_from_slice(&0x4E4F_534Au32.to_le_bytes());
        out.extend_from_slice(&json_bytes);
        out.extend_from_slice(&(bin.len() as u32).to_le_bytes());
        out.extend_from_slice(&0x004E_4942u32.to_le_bytes());
        out.extend_from_slice(&bin);
        out
    }

    fn load_triangle(options: LoadOptions) -> (Result<LoadedModel, LoadError>, RecordingPort) {
        let mut loader = ModelLoader::new(ViewerConfig::default());
        let mut port = RecordingPort::default();
        let result = loader.load(
            ModelSource::File {
                name: "tri.glb".to_string(),
                bytes: triangle_glb_bytes(),
            },
            &options,
            None,
            &mut port,
            &mut |_| {},
        );
        (result, port)
    }

    #[test]
    fn url_sources_are_rejected_with_a_distinct_error() {
        let mut loader = ModelLoader::new(ViewerConfig::default());
        let mut port = RecordingPort::default();
        let result = loader.load(
            ModelSource::Url("https://example.com/building.glb".to_string()),
            &LoadOptions::from_config(&ViewerConfig::default()),
            None,
            &mut port,
            &mut |_| {},
        );
        assert!(matches!(result, Err(LoadError::UnsupportedSource(_))));
    }

    #[test]
    fn empty_models_fail_loudly() {
        let glb = {
            // scene with a mesh-less node
            let json = r#"{"asset":{"version":"2.0"},"scene":0,"scenes":[{"nodes":[0]}],"nodes":[{"name":"empty"}]}"#;
            let mut json_bytes = json.as_bytes().to_vec();
            while json_bytes.len() % 4 != 0 {
                json_bytes.push(b' ');
            }
            let total = 12 + 8 + json_bytes.len();
            let mut out = Vec::new();
            out.extend_from_slice(&0x4654_6C67u32.to_le_bytes());
            out.extend_from_slice(&2u32.to_le_bytes());
            out.extend_from_slice(&(total as u32).to_le_bytes());
            out.extend_from_slice(&(json_bytes.len() as u32).to_le_bytes());
            out.extend_from_slice(&0x4E4F_534Au32.to_le_bytes());
            out.extend_from_slice(&json_bytes);
            out
        };
        let mut loader = ModelLoader::new(ViewerConfig::default());
        let mut port = RecordingPort::default();
        let result = loader.load(
            ModelSource::File {
                name: "empty.glb".to_string(),
                bytes: glb,
            },
            &LoadOptions::from_config(&ViewerConfig::default()),
            None,
            &mut port,
            &mut |_| {},
        );
        assert!(matches!(result, Err(LoadError::EmptyModel)));
    }

    #[test]
    fn successful_load_runs_every_stage() {
        let options = LoadOptions::from_config(&ViewerConfig::default());
        let (result, port) = load_triangle(options);
        let model = result.unwrap();

        // pick ids start at 1; 0 is the miss value
        assert_eq!(model.meshes[0].pick_id, 1);
        // default material was applied
        assert!(model.meshes[0].material.is_some());
        // mesh is large enough to cast a shadow
        assert_eq!(port.shadow_casters, vec![1]);
        // model was centered, so the aggregate box midpoint is the origin
        let center = model.stats.bounding_box.center();
        assert!(center.x.abs() < 1e-5 && center.y.abs() < 1e-5 && center.z.abs() < 1e-5);
        // camera framed the centered bounds
        assert_eq!(port.framed.len(), 1);
        let framed_center = port.framed[0].center();
        assert!(framed_center.x.abs() < 1e-5);
        // frozen after the final transform write
        assert!(model.meshes[0].frozen);
        assert_eq!(port.transforms.len(), 1);
        // timing invariant
        assert!(model.timings.total >= model.timings.phase_sum());
    }

    #[test]
    fn stages_can_be_switched_off() {
        let options = LoadOptions {
            apply_materials: false,
            enable_shadows: false,
            freeze_meshes: false,
            center_at_origin: false,
            fit_to_view: false,
        };
        let (result, port) = load_triangle(options);
        let model = result.unwrap();

        assert!(model.meshes[0].material.is_none());
        assert!(port.shadow_casters.is_empty());
        assert!(port.framed.is_empty());
        assert!(!model.meshes[0].frozen);
        // bounds stay where the file put them
        assert_eq!(model.stats.bounding_box.center(), Vector3::new(5.0, 5.0, 4.0));
    }

    #[test]
    fn progress_is_monotonic_and_reaches_one() {
        let mut loader = ModelLoader::new(ViewerConfig::default());
        let mut port = RecordingPort::default();
        let mut seen = Vec::new();
        loader
            .load(
                ModelSource::File {
                    name: "tri.glb".to_string(),
                    bytes: triangle_glb_bytes(),
                },
                &LoadOptions::from_config(&ViewerConfig::default()),
                None,
                &mut port,
                &mut |value| seen.push(value),
            )
            .unwrap();
        assert!(seen.windows(2).all(|pair| pair[0] < pair[1]));
        assert_eq!(*seen.last().unwrap(), 1.0);
    }

    #[test]
    fn cancellation_stops_the_pipeline_at_a_phase_boundary() {
        let mut loader = ModelLoader::new(ViewerConfig::default());
        let token = loader.cancel_token();
        let mut port = RecordingPort::default();
        // cancel at the first progress report, right after the bytes resolve
        let result = loader.load(
            ModelSource::File {
                name: "tri.glb".to_string(),
                bytes: triangle_glb_bytes(),
            },
            &LoadOptions::from_config(&ViewerConfig::default()),
            None,
            &mut port,
            &mut |_| token.cancel(),
        );
        assert!(matches!(result, Err(LoadError::Cancelled)));
        // no stage effects leaked past the cancellation point
        assert!(port.shadow_casters.is_empty());
        assert!(port.framed.is_empty());
        assert!(port.transforms.is_empty());

        // a reset arms a fresh token and the same loader succeeds
        loader.reset();
        let result = loader.load(
            ModelSource::File {
                name: "tri.glb".to_string(),
                bytes: triangle_glb_bytes(),
            },
            &LoadOptions::from_config(&ViewerConfig::default()),
            None,
            &mut port,
            &mut |_| {},
        );
        assert!(result.is_ok());
    }

    #[test]
    fn cancellation_after_import_skips_materials_and_shadows() {
        let mut loader = ModelLoader::new(ViewerConfig::default());
        let token = loader.cancel_token();
        let mut port = RecordingPort::default();
        let mut seen = Vec::new();
        // fire the token once geometry is imported, before any later phase
        let result = loader.load(
            ModelSource::File {
                name: "tri.glb".to_string(),
                bytes: triangle_glb_bytes(),
            },
            &LoadOptions::from_config(&ViewerConfig::default()),
            None,
            &mut port,
            &mut |value| {
                seen.push(value);
                if value >= 0.6 {
                    token.cancel();
                }
            },
        );
        assert!(matches!(result, Err(LoadError::Cancelled)));
        // progress stopped at the end of the import phase
        assert_eq!(*seen.last().unwrap(), 0.6);
        // no material, shadow, framing or transform work happened
        assert!(port.shadow_casters.is_empty());
        assert!(port.framed.is_empty());
        assert!(port.transforms.is_empty());
    }

    #[test]
    fn a_journal_replays_a_successful_load_onto_the_scene() {
        let mut loader = ModelLoader::new(ViewerConfig::default());
        let mut journal = SceneJournal::default();
        let model = loader
            .load(
                ModelSource::File {
                    name: "tri.glb".to_string(),
                    bytes: triangle_glb_bytes(),
                },
                &LoadOptions::from_config(&ViewerConfig::default()),
                None,
                &mut journal,
                &mut |_| {},
            )
            .unwrap();

        let mut port = RecordingPort::default();
        journal.replay(&mut port, &model.meshes);
        assert_eq!(port.shadow_casters, vec![1]);
        assert_eq!(port.framed.len(), 1);
        assert_eq!(port.transforms.len(), 1);
    }

    #[test]
    fn a_failed_load_journal_replays_deregistrations_only() {
        let mut journal = SceneJournal::default();
        journal.deregister_shadow_caster(7);
        journal.register_shadow_caster(9);
        journal.frame_camera(&Aabb::new(
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(1.0, 1.0, 1.0),
        ));

        let mut port = RecordingPort::default();
        port.shadow_casters.push(7);
        journal.replay(&mut port, &[]);
        // the prior model's caster was removed, nothing else landed
        assert!(port.shadow_casters.is_empty());
        assert!(port.framed.is_empty());
        assert!(port.transforms.is_empty());
    }

    #[test]
    fn shadow_eligibility_skips_tiny_and_indexless_meshes() {
        let mut big = parsed_mesh("big", [0.0, 0.0, 0.0], [5.0, 5.0, 5.0]);
        big.material = None;
        let tiny = parsed_mesh("bolt", [0.0, 0.0, 0.0], [0.01, 0.01, 0.01]);
        let mut hollow = parsed_mesh("hollow", [0.0, 0.0, 0.0], [3.0, 3.0, 3.0]);
        hollow.indices.clear();

        let parsed = parsed_model(vec![big, tiny, hollow]);
        let (mut meshes, ..) = build_entities(&parsed);
        // clear the synthesized index count for the hollow mesh
        meshes[2].index_count = 0;

        let mut port = RecordingPort::default();
        register_shadow_casters(&mut meshes, 0.05, &mut port);

        assert_eq!(port.shadow_casters, vec![1]);
        assert!(meshes[0].casts_shadow);
        assert!(!meshes[1].casts_shadow);
        assert!(!meshes[2].casts_shadow);
    }

    #[test]
    fn default_material_is_shared_between_meshes() {
        let parsed = parsed_model(vec![
            parsed_mesh("a", [0.0, 0.0, 0.0], [1.0, 1.0, 1.0]),
            parsed_mesh("b", [2.0, 0.0, 0.0], [3.0, 1.0, 1.0]),
        ]);
        let (mut meshes, ..) = build_entities(&parsed);
        apply_default_materials(&mut meshes, &ViewerConfig::default(), None);

        let first = meshes[0].material.as_ref().unwrap();
        let second = meshes[1].material.as_ref().unwrap();
        assert!(Arc::ptr_eq(first, second));
    }
}
