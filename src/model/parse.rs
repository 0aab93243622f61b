//! CPU-side GLB parsing.
//!
//! Everything here runs before any GPU work: the binary is decoded into
//! flat vertex/index arrays with world transforms baked in, one
//! [`ParsedMesh`] per glTF primitive. Upload happens later in the loader, so
//! this stage is testable against in-memory GLB bytes.

use cgmath::{InnerSpace, Matrix3, Matrix4, SquareMatrix, Vector3, Vector4};

use super::Aabb;

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("not a valid glb: {0}")]
    Gltf(#[from] gltf::Error),
    #[error("buffer {0} references external data; only self-contained glb is supported")]
    ExternalBuffer(String),
}

/// One primitive's geometry in world space.
#[derive(Debug)]
pub struct ParsedMesh {
    pub name: String,
    /// Index of the nearest mesh-bearing ancestor in the parsed mesh list.
    pub parent: Option<usize>,
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub tex_coords: Vec<[f32; 2]>,
    pub indices: Vec<u32>,
    pub material: Option<usize>,
    pub bounds: Aabb,
}

/// Material factors plus indices into [`ParsedModel::images`].
#[derive(Debug, Clone)]
pub struct ParsedMaterial {
    pub name: String,
    pub albedo: [f32; 4],
    pub metallic: f32,
    pub roughness: f32,
    pub albedo_image: Option<usize>,
    pub normal_image: Option<usize>,
    pub metallic_roughness_image: Option<usize>,
    pub occlusion_image: Option<usize>,
    pub emissive_image: Option<usize>,
}

/// Still-encoded (PNG/JPEG) image bytes lifted out of the binary chunk.
#[derive(Debug)]
pub struct ParsedImage {
    pub label: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug)]
pub struct ParsedModel {
    pub name: String,
    pub meshes: Vec<ParsedMesh>,
    pub materials: Vec<ParsedMaterial>,
    pub images: Vec<ParsedImage>,
    pub node_count: u32,
    pub primitive_count: u32,
}

/// Decode a self-contained GLB into world-space geometry.
pub fn parse_glb(bytes: &[u8], name: &str) -> Result<ParsedModel, ParseError> {
    let gltf = gltf::Gltf::from_slice(bytes)?;
    let blob = gltf.blob.as_deref();

    // Resolve every buffer up front. Only the embedded binary chunk is
    // accepted; .gltf-style external URIs would need a fetch path.
    let mut buffers: Vec<&[u8]> = Vec::new();
    for buffer in gltf.buffers() {
        match buffer.source() {
            gltf::buffer::Source::Bin => {
                buffers.push(blob.ok_or_else(|| {
                    ParseError::ExternalBuffer("missing binary chunk".to_string())
                })?);
            }
            gltf::buffer::Source::Uri(uri) => {
                return Err(ParseError::ExternalBuffer(uri.to_string()));
            }
        }
    }

    let mut images = Vec::new();
    let mut image_slots: Vec<Option<usize>> = Vec::new();
    for image in gltf.images() {
        match image.source() {
            gltf::image::Source::View { view, .. } => {
                let data = buffers[view.buffer().index()];
                let start = view.offset();
                let end = start + view.length();
                images.push(ParsedImage {
                    label: image
                        .name()
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("image_{}", image.index())),
                    bytes: data[start..end].to_vec(),
                });
                image_slots.push(Some(images.len() - 1));
            }
            gltf::image::Source::Uri { uri, .. } => {
                log::warn!("skipping external image '{uri}'");
                image_slots.push(None);
            }
        }
    }

    let materials: Vec<ParsedMaterial> = gltf
        .materials()
        .map(|material| {
            let pbr = material.pbr_metallic_roughness();
            let image_of = |texture: Option<gltf::texture::Texture<'_>>| {
                texture.and_then(|t| image_slots.get(t.source().index()).copied().flatten())
            };
            ParsedMaterial {
                name: material
                    .name()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("material_{}", material.index().unwrap_or(0))),
                albedo: pbr.base_color_factor(),
                metallic: pbr.metallic_factor(),
                roughness: pbr.roughness_factor(),
                albedo_image: image_of(pbr.base_color_texture().map(|info| info.texture())),
                normal_image: image_of(material.normal_texture().map(|info| info.texture())),
                metallic_roughness_image: image_of(
                    pbr.metallic_roughness_texture().map(|info| info.texture()),
                ),
                occlusion_image: image_of(
                    material.occlusion_texture().map(|info| info.texture()),
                ),
                emissive_image: image_of(material.emissive_texture().map(|info| info.texture())),
            }
        })
        .collect();

    let mut meshes = Vec::new();
    let mut node_count = 0u32;
    let mut primitive_count = 0u32;
    for scene in gltf.scenes() {
        for node in scene.nodes() {
            walk_node(
                &node,
                Matrix4::identity(),
                None,
                &buffers,
                &mut meshes,
                &mut node_count,
                &mut primitive_count,
            );
        }
    }

    Ok(ParsedModel {
        name: name.to_string(),
        meshes,
        materials,
        images,
        node_count,
        primitive_count,
    })
}

fn walk_node(
    node: &gltf::Node<'_>,
    parent_transform: Matrix4<f32>,
    parent_mesh: Option<usize>,
    buffers: &[&[u8]],
    meshes: &mut Vec<ParsedMesh>,
    node_count: &mut u32,
    primitive_count: &mut u32,
) {
    *node_count += 1;
    let transform = parent_transform * Matrix4::from(node.transform().matrix());

    // The nearest mesh ancestor for this node's children. A node with
    // several primitives parents them all to the first.
    let mut mesh_anchor = parent_mesh;
    if let Some(mesh) = node.mesh() {
        let node_name = node
            .name()
            .or(mesh.name())
            .map(str::to_string)
            .unwrap_or_else(|| format!("node_{}", node.index()));
        for (slot, primitive) in mesh.primitives().enumerate() {
            *primitive_count += 1;
            let Some(parsed) = parse_primitive(
                &primitive,
                &transform,
                parent_mesh,
                &node_name,
                slot,
                buffers,
            ) else {
                continue;
            };
            meshes.push(parsed);
            if mesh_anchor == parent_mesh {
                mesh_anchor = Some(meshes.len() - 1);
            }
        }
    }

    for child in node.children() {
        walk_node(
            &child,
            transform,
            mesh_anchor,
            buffers,
            meshes,
            node_count,
            primitive_count,
        );
    }
}

fn parse_primitive(
    primitive: &gltf::Primitive<'_>,
    transform: &Matrix4<f32>,
    parent: Option<usize>,
    node_name: &str,
    slot: usize,
    buffers: &[&[u8]],
) -> Option<ParsedMesh> {
    let reader = primitive.reader(|buffer| buffers.get(buffer.index()).copied());

    let raw_positions: Vec<[f32; 3]> = reader.read_positions()?.collect();
    if raw_positions.is_empty() {
        return None;
    }

    let normal_matrix = Matrix3::from_cols(
        transform.x.truncate(),
        transform.y.truncate(),
        transform.z.truncate(),
    );

    let positions: Vec<[f32; 3]> = raw_positions
        .iter()
        .map(|p| {
            let world = transform * Vector4::new(p[0], p[1], p[2], 1.0);
            [world.x, world.y, world.z]
        })
        .collect();

    let normals: Vec<[f32; 3]> = match reader.read_normals() {
        Some(normals) => normals
            .map(|n| {
                let world = normal_matrix * Vector3::from(n);
                let world = if world.magnitude2() > 0.0 {
                    world.normalize()
                } else {
                    Vector3::unit_y()
                };
                [world.x, world.y, world.z]
            })
            .collect(),
        None => vec![[0.0, 1.0, 0.0]; positions.len()],
    };

    let tex_coords: Vec<[f32; 2]> = match reader.read_tex_coords(0) {
        Some(coords) => coords.into_f32().collect(),
        None => vec![[0.0, 0.0]; positions.len()],
    };

    let indices: Vec<u32> = match reader.read_indices() {
        Some(indices) => indices.into_u32().collect(),
        // non-indexed primitive, synthesize a sequential index list
        None => (0..positions.len() as u32).collect(),
    };

    let bounds = Aabb::from_points(positions.iter().copied())?;
    let name = if slot == 0 {
        node_name.to_string()
    } else {
        format!("{node_name}.{slot}")
    };

    Some(ParsedMesh {
        name,
        parent,
        positions,
        normals,
        tex_coords,
        indices,
        material: primitive.material().index(),
        bounds,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    // Hand-built GLB container: header, JSON chunk padded with spaces, BIN
    // chunk padded with zeros.
    fn build_glb(json: &str, bin: &[u8]) -> Vec<u8> {
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

    // One triangle at z=0, indices 0 1 2, with a red material.
    fn triangle_glb(translation: [f32; 3]) -> Vec<u8> {
        let positions: [[f32; 3]; 3] = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
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
            r#"{{"asset":{{"version":"2.0"}},"scene":0,
"scenes":[{{"nodes":[0]}}],
"nodes":[{{"mesh":0,"name":"tri","translation":[{},{},{}]}}],
"meshes":[{{"primitives":[{{"attributes":{{"POSITION":0}},"indices":1,"material":0}}]}}],
"materials":[{{"name":"red","pbrMetallicRoughness":{{"baseColorFactor":[1,0,0,1],"metallicFactor":0.2,"roughnessFactor":0.8}}}}],
"buffers":[{{"byteLength":{}}}],
"bufferViews":[{{"buffer":0,"byteOffset":0,"byteLength":36}},{{"buffer":0,"byteOffset":36,"byteLength":6}}],
"accessors":[{{"bufferView":0,"componentType":5126,"count":3,"type":"VEC3","min":[0,0,0],"max":[1,1,0]}},{{"bufferView":1,"componentType":5123,"count":3,"type":"SCALAR"}}]}}"#,
            translation[0],
            translation[1],
            translation[2],
            bin.len(),
        );
        build_glb(&json, &bin)
    }

    #[test]
    fn parses_a_minimal_triangle() {
        let glb = triangle_glb([0.0, 0.0, 0.0]);
        let model = parse_glb(&glb, "tri.glb").unwrap();
        assert_eq!(model.meshes.len(), 1);
        assert_eq!(model.node_count, 1);
        assert_eq!(model.primitive_count, 1);
        let mesh = &model.meshes[0];
        assert_eq!(mesh.name, "tri");
        assert_eq!(mesh.positions.len(), 3);
        assert_eq!(mesh.indices, vec![0, 1, 2]);
        assert_eq!(mesh.material, Some(0));
        assert_eq!(model.materials[0].albedo, [1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn node_transforms_are_baked_into_world_positions() {
        let glb = triangle_glb([10.0, 5.0, -2.0]);
        let model = parse_glb(&glb, "tri.glb").unwrap();
        let mesh = &model.meshes[0];
        assert_eq!(mesh.positions[0], [10.0, 5.0, -2.0]);
        assert_eq!(mesh.bounds.min, cgmath::Vector3::new(10.0, 5.0, -2.0));
        assert_eq!(mesh.bounds.max, cgmath::Vector3::new(11.0, 6.0, -2.0));
    }

    #[test]
    fn missing_normals_are_defaulted_per_vertex() {
        let glb = triangle_glb([0.0, 0.0, 0.0]);
        let model = parse_glb(&glb, "tri.glb").unwrap();
        let mesh = &model.meshes[0];
        assert_eq!(mesh.normals.len(), mesh.positions.len());
        assert_eq!(mesh.tex_coords.len(), mesh.positions.len());
    }

    #[test]
    fn garbage_bytes_are_rejected() {
        let err = parse_glb(b"definitely not a glb", "junk.glb");
        assert!(matches!(err, Err(ParseError::Gltf(_))));
    }
}
