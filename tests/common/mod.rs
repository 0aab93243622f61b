//! Shared fixtures: hand-built GLB exports and a recording stand-in for the
//! live scene.

use cgmath::Vector3;

use bimview::loader::ScenePort;
use bimview::model::{Aabb, MeshEntity};

/// GLB container: header, JSON chunk padded with spaces, BIN chunk padded
/// with zeros.
pub fn glb_container(json: &str, bin: &[u8]) -> Vec<u8> {
    let mut json_bytes = json.as_bytes().to_vec();
    while json_bytes.len() % 4 != 0 {
        json_bytes.push(b' ');
    }
    let mut bin_bytes = bin.to_vec();
    while bin_bytes.len() % 4 != 0 {
        bin_bytes.push(0);
    }
    let total = 12 + 8 + json_bytes.len() + 8 + bin_bytes.len();
    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(&0x4654_6C67u32.to_le_bytes()); // "glTF"
    out.extend_from_slice(&2u32.to_le_bytes());
    out.extend_from_slice(&(total as u32).to_le_bytes());
    out.extend_from_slice(&(json_bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(&0x4E4F_534Au32.to_le_bytes()); // "JSON"
    out.extend_from_slice(&json_bytes);
    out.extend_from_slice(&(bin_bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(&0x004E_4942u32.to_le_bytes()); // "BIN\0"
    out.extend_from_slice(&bin_bytes);
    out
}

/// A toy building export: a "shell" root mesh carrying a concrete material
/// and a "door" child mesh without one, both triangles, placed 50 units off
/// the origin the way real site-coordinate exports tend to arrive.
///
/// World-space bounds: shell (50,0,0)..(52,2,0), door (52,0,0)..(53,1,0).
pub fn building_glb() -> Vec<u8> {
    let shell: [[f32; 3]; 3] = [[0.0, 0.0, 0.0], [2.0, 0.0, 0.0], [0.0, 2.0, 0.0]];
    let door: [[f32; 3]; 3] = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
    let mut bin = Vec::new();
    for p in shell.iter().chain(door.iter()) {
        for v in p {
            bin.extend_from_slice(&v.to_le_bytes());
        }
    }
    for _ in 0..2 {
        for i in [0u16, 1, 2] {
            bin.extend_from_slice(&i.to_le_bytes());
        }
    }
    let json = format!(
        r#"{{"asset":{{"version":"2.0"}},"scene":0,
"scenes":[{{"nodes":[0]}}],
"nodes":[
 {{"name":"shell","mesh":0,"translation":[50,0,0],"children":[1]}},
 {{"name":"door","mesh":1,"translation":[2,0,0]}}],
"meshes":[
 {{"primitives":[{{"attributes":{{"POSITION":0}},"indices":1,"material":0}}]}},
 {{"primitives":[{{"attributes":{{"POSITION":2}},"indices":3}}]}}],
"materials":[{{"name":"concrete","pbrMetallicRoughness":{{"baseColorFactor":[0.6,0.6,0.62,1],"metallicFactor":0.0,"roughnessFactor":0.9}}}}],
"buffers":[{{"byteLength":{}}}],
"bufferViews":[
 {{"buffer":0,"byteOffset":0,"byteLength":36}},
 {{"buffer":0,"byteOffset":36,"byteLength":36}},
 {{"buffer":0,"byteOffset":72,"byteLength":6}},
 {{"buffer":0,"byteOffset":78,"byteLength":6}}],
"accessors":[
 {{"bufferView":0,"componentType":5126,"count":3,"type":"VEC3","min":[0,0,0],"max":[2,2,0]}},
 {{"bufferView":2,"componentType":5123,"count":3,"type":"SCALAR"}},
 {{"bufferView":1,"componentType":5126,"count":3,"type":"VEC3","min":[0,0,0],"max":[1,1,0]}},
 {{"bufferView":3,"componentType":5123,"count":3,"type":"SCALAR"}}]}}"#,
        bin.len()
    );
    glb_container(&json, &bin)
}

/// Records every scene-side effect the load pipeline produces.
#[derive(Default)]
pub struct RecordingPort {
    pub registered: Vec<u32>,
    pub deregistered: Vec<u32>,
    pub framed: Vec<Aabb>,
    pub transforms: Vec<(u32, Vector3<f32>)>,
}

impl ScenePort for RecordingPort {
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
