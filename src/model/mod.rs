//! Model data structures: sources, mesh entities, materials and stats.
//!
//! A model arrives as a [`ModelSource`], is parsed into CPU-side geometry
//! (see [`parse`]), and becomes a [`LoadedModel`]: an ordered list of
//! [`MeshEntity`] values whose GPU buffers are attached during upload.
//! Materials and textures are shared between meshes via `Arc` and carry
//! single-release guards so disposal can be deduplicated safely.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use cgmath::Vector3;

use crate::telemetry::TimingBreakdown;
use crate::texture::Texture;

pub mod parse;

/// Pick-buffer id reserved for the ground plane; picks on it are ignored.
pub const GROUND_PICK_ID: u32 = u32::MAX;
/// Pick-buffer id reserved for the axis indicator; picks on it are ignored.
pub const AXIS_PICK_ID: u32 = u32::MAX - 1;

/// Where a model comes from. Immutable, constructed by the caller of
/// [`crate::loader::ModelLoader::load`].
#[derive(Clone, Debug)]
pub enum ModelSource {
    /// Raw bytes with the original file name (drag-and-drop).
    File { name: String, bytes: Vec<u8> },
    /// A readable filesystem location.
    Path(PathBuf),
    /// A remote location. The native shell has no fetch path; loads from a
    /// URL fail with a distinct error.
    Url(String),
}

impl ModelSource {
    /// Human-readable name used for labels and the window title.
    pub fn label(&self) -> String {
        match self {
            ModelSource::File { name, .. } => name.clone(),
            ModelSource::Path(path) => path
                .file_name()
                .and_then(|value| value.to_str())
                .unwrap_or("model")
                .to_string(),
            ModelSource::Url(url) => url.rsplit('/').next().unwrap_or("model").to_string(),
        }
    }
}

/// Axis-aligned bounding box in world space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub min: Vector3<f32>,
    pub max: Vector3<f32>,
}

impl Default for Aabb {
    fn default() -> Self {
        Self {
            min: Vector3::new(0.0, 0.0, 0.0),
            max: Vector3::new(0.0, 0.0, 0.0),
        }
    }
}

impl Aabb {
    pub fn new(min: Vector3<f32>, max: Vector3<f32>) -> Self {
        Self { min, max }
    }

    pub fn from_points(points: impl IntoIterator<Item = [f32; 3]>) -> Option<Self> {
        let mut iter = points.into_iter().filter(|p| p.iter().all(|v| v.is_finite()));
        let first = iter.next()?;
        let mut min = Vector3::from(first);
        let mut max = min;
        for p in iter {
            min.x = min.x.min(p[0]);
            min.y = min.y.min(p[1]);
            min.z = min.z.min(p[2]);
            max.x = max.x.max(p[0]);
            max.y = max.y.max(p[1]);
            max.z = max.z.max(p[2]);
        }
        Some(Self { min, max })
    }

    pub fn center(&self) -> Vector3<f32> {
        (self.min + self.max) / 2.0
    }

    pub fn size(&self) -> Vector3<f32> {
        self.max - self.min
    }

    pub fn max_dimension(&self) -> f32 {
        let size = self.size();
        size.x.max(size.y).max(size.z)
    }

    /// Point-like, inverted or non-finite boxes must not contribute to the
    /// aggregate model box.
    pub fn is_degenerate(&self) -> bool {
        let finite = [self.min, self.max]
            .iter()
            .all(|v| v.x.is_finite() && v.y.is_finite() && v.z.is_finite());
        if !finite {
            return true;
        }
        if self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z {
            return true;
        }
        self.min == self.max
    }

    pub fn expand(&mut self, other: &Aabb) {
        self.min.x = self.min.x.min(other.min.x);
        self.min.y = self.min.y.min(other.min.y);
        self.min.z = self.min.z.min(other.min.z);
        self.max.x = self.max.x.max(other.max.x);
        self.max.y = self.max.y.max(other.max.y);
        self.max.z = self.max.z.max(other.max.z);
    }

    pub fn translate(&mut self, offset: Vector3<f32>) {
        self.min += offset;
        self.max += offset;
    }
}

/// PBR surface parameters.
#[derive(Clone, Copy, Debug)]
pub struct PbrParams {
    pub albedo: [f32; 4],
    pub metallic: f32,
    pub roughness: f32,
}

/// GPU texture with a single-release guard, shared between materials.
#[derive(Debug)]
pub struct TextureResource {
    pub label: String,
    gpu: OnceLock<Texture>,
    released: AtomicBool,
}

impl TextureResource {
    pub fn new(label: impl Into<String>, texture: Texture) -> Self {
        let gpu = OnceLock::new();
        let _ = gpu.set(texture);
        Self {
            label: label.into(),
            gpu,
            released: AtomicBool::new(false),
        }
    }

    /// A resource with no GPU payload attached yet.
    pub fn detached(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            gpu: OnceLock::new(),
            released: AtomicBool::new(false),
        }
    }

    /// Attach the decoded GPU texture. Later attaches are ignored.
    pub fn attach(&self, texture: Texture) {
        let _ = self.gpu.set(texture);
    }

    pub fn gpu(&self) -> Option<&Texture> {
        self.gpu.get()
    }

    /// Release the GPU payload. Returns `false` when already released, so a
    /// double release is a no-op rather than a fault.
    pub fn release(&self) -> bool {
        if self.released.swap(true, Ordering::SeqCst) {
            return false;
        }
        if let Some(texture) = self.gpu.get() {
            texture.texture.destroy();
        }
        true
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

/// The fixed set of named texture slots a material can populate.
#[derive(Debug, Default)]
pub struct TextureSlots {
    pub albedo: Option<Arc<TextureResource>>,
    pub bump: Option<Arc<TextureResource>>,
    pub metallic: Option<Arc<TextureResource>>,
    pub roughness: Option<Arc<TextureResource>>,
    pub diffuse: Option<Arc<TextureResource>>,
    pub emissive: Option<Arc<TextureResource>>,
    pub opacity: Option<Arc<TextureResource>>,
    pub ambient: Option<Arc<TextureResource>>,
    pub reflection: Option<Arc<TextureResource>>,
    pub refraction: Option<Arc<TextureResource>>,
    pub lightmap: Option<Arc<TextureResource>>,
    pub specular: Option<Arc<TextureResource>>,
}

impl TextureSlots {
    /// Iterate over every populated slot.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<TextureResource>> {
        [
            &self.albedo,
            &self.bump,
            &self.metallic,
            &self.roughness,
            &self.diffuse,
            &self.emissive,
            &self.opacity,
            &self.ambient,
            &self.reflection,
            &self.refraction,
            &self.lightmap,
            &self.specular,
        ]
        .into_iter()
        .flatten()
    }
}

/// Material parameters as the mesh shader sees them.
#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MaterialUniform {
    pub albedo: [f32; 4],
    pub metallic: f32,
    pub roughness: f32,
    pub _pad: [f32; 2],
}

impl From<&PbrParams> for MaterialUniform {
    fn from(params: &PbrParams) -> Self {
        Self {
            albedo: params.albedo,
            metallic: params.metallic,
            roughness: params.roughness,
            _pad: [0.0; 2],
        }
    }
}

/// GPU side of a material: its parameter buffer and bind group.
#[derive(Debug)]
pub struct MaterialGpu {
    pub uniform_buffer: wgpu::Buffer,
    pub bind_group: wgpu::BindGroup,
}

/// A surface description shared between meshes.
#[derive(Debug)]
pub struct Material {
    pub name: String,
    pub params: PbrParams,
    pub slots: TextureSlots,
    gpu: OnceLock<MaterialGpu>,
    released: AtomicBool,
}

impl Material {
    pub fn new(name: impl Into<String>, params: PbrParams, slots: TextureSlots) -> Self {
        Self {
            name: name.into(),
            params,
            slots,
            gpu: OnceLock::new(),
            released: AtomicBool::new(false),
        }
    }

    pub fn attach_gpu(&self, gpu: MaterialGpu) {
        let _ = self.gpu.set(gpu);
    }

    pub fn gpu(&self) -> Option<&MaterialGpu> {
        self.gpu.get()
    }

    /// Release the parameter buffer. Textures are released separately by the
    /// disposer since they may be shared with other materials. Returns
    /// `false` when already released.
    pub fn release(&self) -> bool {
        if self.released.swap(true, Ordering::SeqCst) {
            return false;
        }
        if let Some(gpu) = self.gpu.get() {
            gpu.uniform_buffer.destroy();
        }
        true
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

/// Vertex layout shared by the mesh, shadow and pick pipelines.
#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MeshVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub tex_coords: [f32; 2],
}

impl MeshVertex {
    pub fn desc() -> wgpu::VertexBufferLayout<'static> {
        use std::mem;
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<MeshVertex>() as wgpu::BufferAddress,
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
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 6]>() as wgpu::BufferAddress,
                    shader_location: 2,
                    format: wgpu::VertexFormat::Float32x2,
                },
            ],
        }
    }
}

/// Per-mesh uniform visible to the mesh, shadow and pick shaders.
#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MeshUniform {
    pub model: [[f32; 4]; 4],
    pub pick_id: u32,
    pub selected: u32,
    pub _pad: [u32; 2],
}

impl MeshUniform {
    pub fn new(world_translation: Vector3<f32>, pick_id: u32, selected: bool) -> Self {
        Self {
            model: cgmath::Matrix4::from_translation(world_translation).into(),
            pick_id,
            selected: selected as u32,
            _pad: [0; 2],
        }
    }
}

/// GPU geometry attached to a mesh at upload time.
#[derive(Debug)]
pub struct MeshGeometry {
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub transform_buffer: wgpu::Buffer,
    pub bind_group: wgpu::BindGroup,
}

/// One renderable element of a loaded model.
#[derive(Debug)]
pub struct MeshEntity {
    pub name: String,
    pub pick_id: u32,
    /// Index of the parent mesh in the owning model's mesh list. Children
    /// inherit their parent's world displacement; centering therefore only
    /// ever touches roots.
    pub parent: Option<usize>,
    /// Translation relative to the parent (or to the world for roots).
    pub translation: Vector3<f32>,
    /// World-space bounds, kept in sync when the mesh is translated.
    pub bounds: Aabb,
    pub vertex_count: u32,
    pub index_count: u32,
    pub material: Option<Arc<Material>>,
    pub casts_shadow: bool,
    /// Once frozen, the per-frame transform write is skipped for this mesh.
    /// Irreversible for the lifetime of the entity.
    pub frozen: bool,
    geometry: OnceLock<MeshGeometry>,
    geometry_released: AtomicBool,
}

impl MeshEntity {
    pub fn from_parsed(parsed: &parse::ParsedMesh, pick_id: u32) -> Self {
        Self {
            name: parsed.name.clone(),
            pick_id,
            parent: parsed.parent,
            translation: Vector3::new(0.0, 0.0, 0.0),
            bounds: parsed.bounds,
            vertex_count: parsed.positions.len() as u32,
            index_count: parsed.indices.len() as u32,
            material: None,
            casts_shadow: false,
            frozen: false,
            geometry: OnceLock::new(),
            geometry_released: AtomicBool::new(false),
        }
    }

    pub fn attach_geometry(&self, geometry: MeshGeometry) {
        let _ = self.geometry.set(geometry);
    }

    pub fn geometry(&self) -> Option<&MeshGeometry> {
        if self.geometry_released.load(Ordering::SeqCst) {
            return None;
        }
        self.geometry.get()
    }

    /// Destroy the mesh's buffers without touching its (possibly shared)
    /// material or textures. Safe to call more than once.
    pub fn release_geometry(&self) -> bool {
        if self.geometry_released.swap(true, Ordering::SeqCst) {
            return false;
        }
        if let Some(geometry) = self.geometry.get() {
            geometry.vertex_buffer.destroy();
            geometry.index_buffer.destroy();
            geometry.transform_buffer.destroy();
        }
        true
    }

    pub fn face_count(&self) -> u64 {
        u64::from(self.index_count) / 3
    }
}

/// World displacement of `meshes[index]`: its own translation plus every
/// ancestor's.
pub fn world_translation(meshes: &[MeshEntity], index: usize) -> Vector3<f32> {
    let mut total = Vector3::new(0.0, 0.0, 0.0);
    let mut cursor = Some(index);
    while let Some(i) = cursor {
        total += meshes[i].translation;
        cursor = meshes[i].parent;
    }
    total
}

/// Aggregate counts and bounds over a mesh collection.
#[derive(Clone, Copy, Debug, Default)]
pub struct ModelStats {
    pub vertices: u64,
    pub faces: u64,
    pub materials: u32,
    pub textures: u32,
    pub bounding_box: Aabb,
}

impl ModelStats {
    /// Component-wise min/max expansion over every mesh with valid bounds;
    /// degenerate boxes are skipped so they cannot corrupt the aggregate.
    pub fn aggregate(meshes: &[MeshEntity], materials: u32, textures: u32) -> Self {
        let mut vertices = 0u64;
        let mut faces = 0u64;
        let mut bounding_box: Option<Aabb> = None;
        for mesh in meshes {
            vertices += u64::from(mesh.vertex_count);
            faces += mesh.face_count();
            if mesh.bounds.is_degenerate() {
                continue;
            }
            match &mut bounding_box {
                Some(aggregate) => aggregate.expand(&mesh.bounds),
                None => bounding_box = Some(mesh.bounds),
            }
        }
        Self {
            vertices,
            faces,
            materials,
            textures,
            bounding_box: bounding_box.unwrap_or_default(),
        }
    }
}

/// Translate root meshes by `offset` and shift every world-space box
/// analytically (children move with their parents, so all boxes shift by
/// exactly `offset`).
pub fn apply_center_offset(meshes: &mut [MeshEntity], stats: &mut ModelStats, offset: Vector3<f32>) {
    for mesh in meshes.iter_mut() {
        if mesh.parent.is_none() {
            mesh.translation += offset;
        }
        mesh.bounds.translate(offset);
    }
    stats.bounding_box.translate(offset);
}

/// The result of a successful load.
#[derive(Debug)]
pub struct LoadedModel {
    pub name: String,
    pub meshes: Vec<MeshEntity>,
    pub stats: ModelStats,
    pub timings: TimingBreakdown,
    pub report: StructureReport,
}

/// Structural summary of the imported file, emitted when the diagnostic
/// inspector is toggled on.
#[derive(Clone, Copy, Debug, Default)]
pub struct StructureReport {
    pub nodes: u32,
    pub meshes: u32,
    pub primitives: u32,
    pub materials: u32,
    pub textures: u32,
    pub approx_vertices: u64,
}

impl StructureReport {
    pub fn log(&self, name: &str, stats: &ModelStats) {
        log::info!(
            "{name}: {} nodes, {} meshes, {} primitives, {} materials, {} textures, ~{} vertices",
            self.nodes,
            self.meshes,
            self.primitives,
            self.materials,
            self.textures,
            self.approx_vertices,
        );
        let center = stats.bounding_box.center();
        let size = stats.bounding_box.size();
        let distance = (center.x * center.x + center.y * center.y + center.z * center.z).sqrt();
        log::info!(
            "{name}: bounds {:.2}x{:.2}x{:.2}, center ({:.2}, {:.2}, {:.2}), {distance:.2} units from origin",
            size.x, size.y, size.z, center.x, center.y, center.z,
        );
        if distance > 1000.0 {
            log::warn!("{name}: model is very far from the origin; consider centering on load");
        } else if distance > 100.0 {
            log::info!("{name}: model is moderately far from the origin");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mesh(parent: Option<usize>, min: [f32; 3], max: [f32; 3]) -> MeshEntity {
        MeshEntity {
            name: "m".into(),
            pick_id: 1,
            parent,
            translation: Vector3::new(0.0, 0.0, 0.0),
            bounds: Aabb::new(min.into(), max.into()),
            vertex_count: 8,
            index_count: 36,
            material: None,
            casts_shadow: false,
            frozen: false,
            geometry: OnceLock::new(),
            geometry_released: AtomicBool::new(false),
        }
    }

    #[test]
    fn aggregate_box_has_ordered_extents_and_midpoint_center() {
        let meshes = vec![
            mesh(None, [-1.0, 0.0, 2.0], [3.0, 4.0, 5.0]),
            mesh(None, [-2.0, 1.0, -1.0], [0.0, 6.0, 3.0]),
        ];
        let stats = ModelStats::aggregate(&meshes, 0, 0);
        let b = stats.bounding_box;
        assert!(b.min.x <= b.max.x && b.min.y <= b.max.y && b.min.z <= b.max.z);
        let expected_center = (b.min + b.max) / 2.0;
        assert_eq!(b.center(), expected_center);
        assert_eq!(b.min, Vector3::new(-2.0, 0.0, -1.0));
        assert_eq!(b.max, Vector3::new(3.0, 6.0, 5.0));
    }

    #[test]
    fn degenerate_bounds_do_not_corrupt_aggregate() {
        let meshes = vec![
            mesh(None, [0.0, 0.0, 0.0], [2.0, 2.0, 2.0]),
            // point-like box at a wild coordinate
            mesh(None, [9e9, 9e9, 9e9], [9e9, 9e9, 9e9]),
            // inverted box
            mesh(None, [5.0, 5.0, 5.0], [-5.0, -5.0, -5.0]),
        ];
        let stats = ModelStats::aggregate(&meshes, 0, 0);
        assert_eq!(stats.bounding_box.max, Vector3::new(2.0, 2.0, 2.0));
        assert_eq!(stats.vertices, 24);
        assert_eq!(stats.faces, 36);
    }

    #[test]
    fn centering_translates_roots_only() {
        // parent at index 0, child at index 1 with its own local offset
        let mut meshes = vec![
            mesh(None, [9.0, 9.0, 9.0], [11.0, 11.0, 11.0]),
            mesh(Some(0), [12.0, 9.0, 9.0], [14.0, 11.0, 11.0]),
        ];
        meshes[1].translation = Vector3::new(3.0, 0.0, 0.0);
        let mut stats = ModelStats::aggregate(&meshes, 0, 0);
        let offset = -stats.bounding_box.center();
        let child_world_before = world_translation(&meshes, 1);

        apply_center_offset(&mut meshes, &mut stats, offset);

        // only the root's local translation changed
        assert_eq!(meshes[0].translation, offset);
        assert_eq!(meshes[1].translation, Vector3::new(3.0, 0.0, 0.0));
        // but the child's world displacement moved by exactly the offset
        let child_world_after = world_translation(&meshes, 1);
        assert_eq!(child_world_after - child_world_before, offset);
    }

    #[test]
    fn centering_an_already_centered_model_is_stable() {
        let mut meshes = vec![mesh(None, [-5.0, -5.0, -5.0], [5.0, 5.0, 5.0])];
        let mut stats = ModelStats::aggregate(&meshes, 0, 0);
        let offset = -stats.bounding_box.center();
        apply_center_offset(&mut meshes, &mut stats, offset);
        let center = stats.bounding_box.center();
        assert!(center.x.abs() < 1e-6 && center.y.abs() < 1e-6 && center.z.abs() < 1e-6);
    }

    #[test]
    fn texture_release_is_single_shot() {
        let resource = TextureResource::detached("t");
        assert!(resource.release());
        assert!(!resource.release());
        assert!(resource.is_released());
    }

    #[test]
    fn material_release_is_single_shot() {
        let material = Material::new(
            "m",
            PbrParams {
                albedo: [1.0; 4],
                metallic: 0.0,
                roughness: 1.0,
            },
            TextureSlots::default(),
        );
        assert!(material.release());
        assert!(!material.release());
    }

    #[test]
    fn slots_iterate_only_populated_entries() {
        let shared = Arc::new(TextureResource::detached("shared"));
        let slots = TextureSlots {
            albedo: Some(shared.clone()),
            emissive: Some(shared),
            ..Default::default()
        };
        assert_eq!(slots.iter().count(), 2);
    }
}
