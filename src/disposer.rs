//! Ordered, deduplicated release of a model's GPU resources.
//!
//! Disposal runs before a replacement model is loaded: the quality
//! optimizer is stopped, shadow casters are deregistered, then geometry
//! buffers, materials and textures are released in that order. Materials
//! and textures are shared handles, so the record is deduplicated by
//! pointer identity and every release is single-shot. On the primary
//! backend an explicit flush follows, then a short settle delay before the
//! next load is allowed to start.

use std::collections::HashSet;
use std::sync::Arc;

use crate::engine::{BackendKind, FlushHandle};
use crate::loader::ScenePort;
use crate::model::{LoadedModel, Material, TextureResource};
use crate::optimizer::QualityOptimizer;

/// Settle time between releasing a model and starting the next load.
pub const SETTLE_DELAY_MS: u64 = 100;

/// Unique resources slated for release.
pub struct DisposalRecord {
    pub materials: Vec<Arc<Material>>,
    pub textures: Vec<Arc<TextureResource>>,
}

impl DisposalRecord {
    /// Walk the meshes and collect each shared material and texture exactly
    /// once, whatever the sharing pattern.
    pub fn collect(model: &LoadedModel) -> Self {
        let mut seen_materials = HashSet::new();
        let mut seen_textures = HashSet::new();
        let mut materials = Vec::new();
        let mut textures = Vec::new();

        for mesh in &model.meshes {
            let Some(material) = &mesh.material else {
                continue;
            };
            if seen_materials.insert(Arc::as_ptr(material)) {
                for texture in material.slots.iter() {
                    if seen_textures.insert(Arc::as_ptr(texture)) {
                        textures.push(texture.clone());
                    }
                }
                materials.push(material.clone());
            }
        }

        Self { materials, textures }
    }
}

/// Counts of what a disposal actually released.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DisposalSummary {
    pub meshes: usize,
    pub materials: usize,
    pub textures: usize,
}

/// Release everything a model holds. Safe to call with a model that was
/// only partially loaded (cancelled mid-pipeline); detached entities just
/// count as released.
pub async fn dispose_model(
    flush: Option<&FlushHandle>,
    port: &mut (dyn ScenePort + Send),
    optimizer: &mut QualityOptimizer,
    model: LoadedModel,
) -> DisposalSummary {
    optimizer.stop();
    release_model(flush, port, model).await
}

/// The release steps without the optimizer stop, for callers that already
/// stopped it before handing the model to a background task.
pub async fn release_model(
    flush: Option<&FlushHandle>,
    port: &mut (dyn ScenePort + Send),
    model: LoadedModel,
) -> DisposalSummary {
    for mesh in &model.meshes {
        if mesh.casts_shadow {
            port.deregister_shadow_caster(mesh.pick_id);
        }
    }

    let record = DisposalRecord::collect(&model);
    let mut summary = DisposalSummary::default();

    // geometry first: meshes reference materials, materials reference
    // textures, so release runs in dependency order
    for mesh in &model.meshes {
        if mesh.release_geometry() {
            summary.meshes += 1;
        }
    }
    for material in &record.materials {
        if material.release() {
            summary.materials += 1;
        }
    }
    for texture in &record.textures {
        if texture.release() {
            summary.textures += 1;
        }
    }

    if let Some(flush) = flush {
        // GL reclaims eagerly; the primary backends hold destroyed
        // resources until the next submit
        if flush.kind == BackendKind::Primary {
            flush.flush();
        }
    }

    log::info!(
        "disposed '{}': {} meshes, {} materials, {} textures",
        model.name,
        summary.meshes,
        summary.materials,
        summary.textures
    );

    #[cfg(not(target_arch = "wasm32"))]
    tokio::time::sleep(std::time::Duration::from_millis(SETTLE_DELAY_MS)).await;

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        Aabb, MeshEntity, ModelStats, PbrParams, StructureReport, TextureSlots,
    };
    use crate::telemetry::TimingBreakdown;
    use cgmath::Vector3;

    struct NullPort {
        deregistered: Vec<u32>,
    }

    impl ScenePort for NullPort {
        fn register_shadow_caster(&mut self, _pick_id: u32) {}

        fn deregister_shadow_caster(&mut self, pick_id: u32) {
            self.deregistered.push(pick_id);
        }

        fn frame_camera(&mut self, _bounds: &Aabb) {}

        fn write_mesh_transform(&mut self, _mesh: &MeshEntity, _world: Vector3<f32>) {}
    }

    fn material_with_texture(name: &str, texture: Arc<TextureResource>) -> Arc<Material> {
        Arc::new(Material::new(
            name,
            PbrParams {
                albedo: [1.0; 4],
                metallic: 0.0,
                roughness: 1.0,
            },
            TextureSlots {
                albedo: Some(texture),
                ..Default::default()
            },
        ))
    }

    fn mesh(pick_id: u32, material: Option<Arc<Material>>, casts_shadow: bool) -> MeshEntity {
        let parsed = crate::model::parse::ParsedMesh {
            name: format!("mesh_{pick_id}"),
            parent: None,
            positions: vec![[0.0; 3], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            normals: vec![[0.0, 1.0, 0.0]; 3],
            tex_coords: vec![[0.0; 2]; 3],
            indices: vec![0, 1, 2],
            material: None,
            bounds: Aabb::new(Vector3::new(0.0, 0.0, 0.0), Vector3::new(1.0, 1.0, 0.1)),
        };
        let mut entity = MeshEntity::from_parsed(&parsed, pick_id);
        entity.material = material;
        entity.casts_shadow = casts_shadow;
        entity
    }

    fn model(meshes: Vec<MeshEntity>) -> LoadedModel {
        LoadedModel {
            name: "test.glb".to_string(),
            stats: ModelStats::aggregate(&meshes, 0, 0),
            meshes,
            timings: TimingBreakdown::default(),
            report: StructureReport::default(),
        }
    }

    #[test]
    fn shared_resources_are_collected_once() {
        let texture = Arc::new(TextureResource::detached("shared"));
        let material = material_with_texture("shared_mat", texture);
        let model = model(vec![
            mesh(1, Some(material.clone()), false),
            mesh(2, Some(material.clone()), false),
            mesh(3, Some(material), false),
        ]);
        let record = DisposalRecord::collect(&model);
        assert_eq!(record.materials.len(), 1);
        assert_eq!(record.textures.len(), 1);
    }

    #[tokio::test]
    async fn dispose_releases_everything_exactly_once() {
        let texture = Arc::new(TextureResource::detached("t"));
        let material = material_with_texture("m", texture.clone());
        let meshes = vec![
            mesh(1, Some(material.clone()), true),
            mesh(2, Some(material.clone()), false),
        ];
        let mut port = NullPort {
            deregistered: vec![],
        };
        let mut optimizer = QualityOptimizer::new(50.0);
        optimizer.start();

        let summary = dispose_model(None, &mut port, &mut optimizer, model(meshes)).await;

        assert_eq!(
            summary,
            DisposalSummary {
                meshes: 2,
                materials: 1,
                textures: 1
            }
        );
        assert!(material.is_released());
        assert!(texture.is_released());
        // only the shadow-casting mesh was deregistered
        assert_eq!(port.deregistered, vec![1]);
        // optimizer stopped before anything was torn down
        assert!(!optimizer.is_running());
    }

    #[tokio::test]
    async fn disposing_resources_shared_with_a_prior_disposal_is_a_no_op() {
        let texture = Arc::new(TextureResource::detached("t"));
        let material = material_with_texture("m", texture.clone());
        let mut port = NullPort {
            deregistered: vec![],
        };
        let mut optimizer = QualityOptimizer::new(50.0);

        let first = model(vec![mesh(1, Some(material.clone()), false)]);
        let second = model(vec![mesh(1, Some(material.clone()), false)]);

        let summary = dispose_model(None, &mut port, &mut optimizer, first).await;
        assert_eq!(summary.materials, 1);
        let summary = dispose_model(None, &mut port, &mut optimizer, second).await;
        // the shared material and texture were already gone
        assert_eq!(summary.materials, 0);
        assert_eq!(summary.textures, 0);
        assert_eq!(summary.meshes, 1);
    }
}
