//! glTF import.
//!
//! [`GltfImporter`] reads `.gltf` and `.glb` files, uploads every primitive and
//! base colour texture through the [`Gpu`] it is handed, and keeps the file's
//! scenes and cameras by name so that the scene builder can pick them up as a
//! fragment.
//!
//! A load that fails releases whatever it had already uploaded.

use std::collections::HashMap;

use anyhow::Context as _;
use cgmath::{Matrix4, Rad};

use crate::{
    builder::AssetImporter,
    data_structures::{
        camera::OPENGL_TO_WGPU_MATRIX,
        fragment::{
            BoundTexture, ImportedCamera, ImportedMesh, ImportedNode, ImportedResources,
            ImportedScene, IndexAccessor, Material, PerspectiveLens, Primitive,
        },
    },
    gpu::{Filter, Gpu, IndexData, SamplerDesc, Topology, VertexStreams, Wrap},
    resources::{decode_image, Assets},
};

/// Far plane for infinite glTF perspective cameras.
const INFINITE_ZFAR: f32 = 1000.0;

#[derive(Debug, Default)]
pub struct GltfImporter {
    assets: Assets,
    scenes: HashMap<String, ImportedScene>,
    cameras: HashMap<String, ImportedCamera>,
}

impl GltfImporter {
    pub fn new(assets: Assets) -> Self {
        Self {
            assets,
            ..Default::default()
        }
    }

    /// Names of the scenes found by the last successful load.
    pub fn scene_names(&self) -> impl Iterator<Item = &str> {
        self.scenes.keys().map(String::as_str)
    }

    pub fn camera_names(&self) -> impl Iterator<Item = &str> {
        self.cameras.keys().map(String::as_str)
    }

    async fn load_buffers(&self, uri: &str, gltf: &gltf::Gltf) -> anyhow::Result<Vec<Vec<u8>>> {
        let mut buffer_data = Vec::new();
        for buffer in gltf.buffers() {
            match buffer.source() {
                gltf::buffer::Source::Bin => {
                    let blob = gltf
                        .blob
                        .clone()
                        .context("binary buffer referenced but the file has no BIN chunk")?;
                    buffer_data.push(blob);
                }
                gltf::buffer::Source::Uri(buffer_uri) => {
                    reject_data_uri(buffer_uri)?;
                    let bin = self
                        .assets
                        .load_binary(&Assets::sibling(uri, buffer_uri))
                        .await?;
                    buffer_data.push(bin);
                }
            }
        }
        Ok(buffer_data)
    }

    async fn load_materials<G: Gpu + ?Sized>(
        &self,
        gpu: &mut G,
        uri: &str,
        gltf: &gltf::Gltf,
        buffers: &[Vec<u8>],
    ) -> anyhow::Result<Vec<Material>> {
        let mut textures: HashMap<usize, BoundTexture> = HashMap::new();
        let mut materials = Vec::new();
        for material in gltf.materials() {
            let base_color_texture = match material.pbr_metallic_roughness().base_color_texture() {
                Some(info) => {
                    let texture = info.texture();
                    let bound = match textures.get(&texture.index()) {
                        Some(bound) => *bound,
                        None => match self.load_texture(&mut *gpu, uri, &texture, buffers).await {
                            Ok(bound) => {
                                textures.insert(texture.index(), bound);
                                bound
                            }
                            Err(err) => {
                                let mut uploaded = ImportedResources::default();
                                for bound in textures.into_values() {
                                    uploaded.insert_texture(bound);
                                }
                                release(gpu, &uploaded);
                                return Err(err);
                            }
                        },
                    };
                    Some(bound)
                }
                None => None,
            };
            materials.push(Material {
                name: material.name().map(str::to_string),
                base_color_texture,
            });
        }
        Ok(materials)
    }

    async fn load_texture<G: Gpu + ?Sized>(
        &self,
        gpu: &mut G,
        uri: &str,
        texture: &gltf::Texture<'_>,
        buffers: &[Vec<u8>],
    ) -> anyhow::Result<BoundTexture> {
        let image = match texture.source().source() {
            gltf::image::Source::View { view, mime_type } => {
                let buffer = buffers
                    .get(view.buffer().index())
                    .context("image references a missing buffer")?;
                let bytes = buffer
                    .get(view.offset()..view.offset() + view.length())
                    .context("image buffer view is out of bounds")?;
                decode_image(bytes, Some(mime_type))?
            }
            gltf::image::Source::Uri { uri: image_uri, mime_type } => {
                reject_data_uri(image_uri)?;
                let bytes = self
                    .assets
                    .load_binary(&Assets::sibling(uri, image_uri))
                    .await?;
                decode_image(&bytes, mime_type)?
            }
        };

        let desc = sampler_desc(&texture.sampler());
        let label = texture
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("{uri} texture {}", texture.index()));
        Ok(BoundTexture {
            texture: gpu.create_texture(&label, &image, desc),
            sampler: Some(gpu.create_sampler(desc)),
        })
    }
}

impl AssetImporter for GltfImporter {
    async fn load<G: Gpu + ?Sized>(&mut self, gpu: &mut G, uri: &str) -> anyhow::Result<()> {
        self.scenes.clear();
        self.cameras.clear();

        let data = self.assets.load_binary(uri).await?;
        let gltf = gltf::Gltf::from_slice(&data).with_context(|| format!("{uri} is not glTF"))?;
        let buffers = self.load_buffers(uri, &gltf).await?;
        let materials = self.load_materials(&mut *gpu, uri, &gltf, &buffers).await?;

        let mut meshes = HashMap::new();
        for mesh in gltf.meshes() {
            let label = mesh
                .name()
                .map(str::to_string)
                .unwrap_or_else(|| format!("{uri} mesh {}", mesh.index()));
            let primitives = mesh
                .primitives()
                .filter_map(|primitive| {
                    to_primitive(&mut *gpu, &label, &primitive, &buffers, &materials)
                })
                .collect();
            meshes.insert(
                mesh.index(),
                ImportedMesh {
                    name: mesh.name().map(str::to_string),
                    primitives,
                },
            );
        }

        for scene in gltf.scenes() {
            let name = scene
                .name()
                .map(str::to_string)
                .unwrap_or_else(|| format!("scene{}", scene.index()));
            let nodes = scene
                .nodes()
                .map(|node| to_imported_node(&node, &meshes))
                .collect();
            self.scenes.insert(
                name.clone(),
                ImportedScene {
                    name: Some(name),
                    nodes,
                },
            );
        }

        let mut parents = HashMap::new();
        for node in gltf.nodes() {
            for child in node.children() {
                parents.insert(child.index(), node.index());
            }
        }
        let locals: Vec<Matrix4<f32>> = gltf
            .nodes()
            .map(|node| Matrix4::from(node.transform().matrix()))
            .collect();
        for node in gltf.nodes() {
            let Some(camera) = node.camera() else {
                continue;
            };
            let mut ancestors = Vec::new();
            let mut current = parents.get(&node.index());
            while let Some(&parent) = current {
                ancestors.push(locals[parent]);
                current = parents.get(&parent);
            }
            ancestors.reverse();

            let name = node
                .name()
                .or(camera.name())
                .map(str::to_string)
                .unwrap_or_else(|| format!("camera{}", camera.index()));
            let (projection, lens) = projection(&camera);
            self.cameras.insert(
                name.clone(),
                ImportedCamera {
                    name: Some(name),
                    transform: locals[node.index()],
                    ancestors,
                    projection,
                    lens,
                },
            );
        }

        log::debug!(
            "{uri}: {} scenes, {} cameras, {} meshes",
            self.scenes.len(),
            self.cameras.len(),
            meshes.len()
        );
        Ok(())
    }

    fn scene_by_name(&self, name: &str) -> Option<ImportedScene> {
        self.scenes.get(name).cloned()
    }

    fn camera_by_name(&self, name: &str) -> Option<ImportedCamera> {
        self.cameras.get(name).cloned()
    }
}

/// Destroys resources uploaded by a load that did not finish.
fn release<G: Gpu + ?Sized>(gpu: &mut G, uploaded: &ImportedResources) {
    if uploaded.is_empty() {
        return;
    }
    log::debug!(
        "releasing {} textures and {} samplers of a failed import",
        uploaded.textures.len(),
        uploaded.samplers.len()
    );
    for &texture in &uploaded.textures {
        gpu.destroy_texture(texture);
    }
    for &sampler in &uploaded.samplers {
        gpu.destroy_sampler(sampler);
    }
}

fn reject_data_uri(uri: &str) -> anyhow::Result<()> {
    if uri.starts_with("data:") {
        anyhow::bail!("embedded data URIs are not supported");
    }
    Ok(())
}

enum Indices {
    U16(Vec<u16>),
    U32(Vec<u32>),
}

impl Indices {
    fn as_data(&self) -> IndexData<'_> {
        match self {
            Indices::U16(indices) => IndexData::U16(indices),
            Indices::U32(indices) => IndexData::U32(indices),
        }
    }
}

fn to_primitive<G: Gpu + ?Sized>(
    gpu: &mut G,
    label: &str,
    primitive: &gltf::Primitive<'_>,
    buffers: &[Vec<u8>],
    materials: &[Material],
) -> Option<Primitive> {
    let topology = match primitive.mode() {
        gltf::mesh::Mode::Points => Topology::Points,
        gltf::mesh::Mode::Lines => Topology::Lines,
        gltf::mesh::Mode::LineStrip => Topology::LineStrip,
        gltf::mesh::Mode::Triangles => Topology::Triangles,
        gltf::mesh::Mode::TriangleStrip => Topology::TriangleStrip,
        mode => {
            log::warn!("{label}: primitive {} uses unsupported mode {mode:?}", primitive.index());
            return None;
        }
    };

    let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(Vec::as_slice));
    let Some(positions) = reader.read_positions() else {
        log::warn!("{label}: primitive {} has no positions", primitive.index());
        return None;
    };
    let positions: Vec<f32> = positions.flatten().collect();
    let texcoords: Vec<f32> = reader
        .read_tex_coords(0)
        .map(|coords| coords.into_f32().flatten().collect())
        .unwrap_or_default();
    let normals: Vec<f32> = reader
        .read_normals()
        .map(|normals| normals.flatten().collect())
        .unwrap_or_default();
    let indices = reader.read_indices().map(|indices| match indices {
        gltf::mesh::util::ReadIndices::U8(iter) => Indices::U16(iter.map(u16::from).collect()),
        gltf::mesh::util::ReadIndices::U16(iter) => Indices::U16(iter.collect()),
        gltf::mesh::util::ReadIndices::U32(iter) => Indices::U32(iter.collect()),
    });

    let vertex_array = gpu.create_vertex_array(
        label,
        VertexStreams {
            positions: &positions,
            texcoords: &texcoords,
            normals: &normals,
        },
        indices.as_ref().map(Indices::as_data),
    );
    let indices = indices.as_ref().map(|indices| {
        let data = indices.as_data();
        IndexAccessor {
            count: data.len() as u32,
            format: data.format(),
        }
    });
    let material = primitive
        .material()
        .index()
        .and_then(|index| materials.get(index))
        .cloned()
        .unwrap_or_default();

    Some(Primitive {
        vertex_array,
        topology,
        vertex_count: (positions.len() / 3) as u32,
        indices,
        material,
    })
}

fn to_imported_node(node: &gltf::Node<'_>, meshes: &HashMap<usize, ImportedMesh>) -> ImportedNode {
    ImportedNode {
        name: node.name().map(str::to_string),
        transform: Matrix4::from(node.transform().matrix()),
        mesh: node.mesh().and_then(|mesh| meshes.get(&mesh.index()).cloned()),
        children: node
            .children()
            .map(|child| to_imported_node(&child, meshes))
            .collect(),
    }
}

/// The authored projection, plus the lens of perspective cameras.
fn projection(camera: &gltf::Camera<'_>) -> (Matrix4<f32>, Option<PerspectiveLens>) {
    match camera.projection() {
        gltf::camera::Projection::Perspective(perspective) => {
            let lens = PerspectiveLens {
                yfov: Rad(perspective.yfov()),
                znear: perspective.znear(),
                zfar: perspective.zfar().unwrap_or(INFINITE_ZFAR),
            };
            let aspect = perspective.aspect_ratio().unwrap_or(1.0);
            (lens.projection(aspect), Some(lens))
        }
        gltf::camera::Projection::Orthographic(ortho) => {
            let projection = OPENGL_TO_WGPU_MATRIX
                * cgmath::ortho(
                    -ortho.xmag(),
                    ortho.xmag(),
                    -ortho.ymag(),
                    ortho.ymag(),
                    ortho.znear(),
                    ortho.zfar(),
                );
            (projection, None)
        }
    }
}

fn sampler_desc(sampler: &gltf::texture::Sampler<'_>) -> SamplerDesc {
    use gltf::texture::{MagFilter, MinFilter, WrappingMode};

    let wrap = |mode: WrappingMode| match mode {
        WrappingMode::ClampToEdge => Wrap::ClampToEdge,
        WrappingMode::MirroredRepeat => Wrap::MirroredRepeat,
        WrappingMode::Repeat => Wrap::Repeat,
    };
    let min_filter = match sampler.min_filter() {
        Some(MinFilter::Nearest | MinFilter::NearestMipmapNearest | MinFilter::NearestMipmapLinear) => {
            Filter::Nearest
        }
        _ => Filter::Linear,
    };
    let mag_filter = match sampler.mag_filter() {
        Some(MagFilter::Nearest) => Filter::Nearest,
        _ => Filter::Linear,
    };

    SamplerDesc {
        min_filter,
        mag_filter,
        wrap_u: wrap(sampler.wrap_s()),
        wrap_v: wrap(sampler.wrap_t()),
    }
}
