//! Hierarchies imported from external asset files.
//!
//! A [`Fragment`] pairs an imported node tree with the camera shipped in the
//! same file. Fragments are rendered on their own, in their own transform
//! space, and arrive with their GPU resources already created by the importer.

use std::collections::BTreeSet;

use cgmath::{Matrix4, Rad, SquareMatrix};

use crate::{
    data_structures::camera::OPENGL_TO_WGPU_MATRIX,
    gpu::{IndexFormat, SamplerHandle, TextureHandle, Topology, VertexArrayHandle},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IndexAccessor {
    pub count: u32,
    pub format: IndexFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoundTexture {
    pub texture: TextureHandle,
    pub sampler: Option<SamplerHandle>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Material {
    pub name: Option<String>,
    pub base_color_texture: Option<BoundTexture>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Primitive {
    pub vertex_array: VertexArrayHandle,
    pub topology: Topology,
    /// Number of vertices in the position stream, used for non-indexed draws.
    pub vertex_count: u32,
    pub indices: Option<IndexAccessor>,
    pub material: Material,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ImportedMesh {
    pub name: Option<String>,
    pub primitives: Vec<Primitive>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ImportedNode {
    pub name: Option<String>,
    pub transform: Matrix4<f32>,
    pub mesh: Option<ImportedMesh>,
    pub children: Vec<ImportedNode>,
}

impl ImportedNode {
    pub fn new(transform: Matrix4<f32>) -> Self {
        Self {
            name: None,
            transform,
            mesh: None,
            children: Vec::new(),
        }
    }
}

/// An imported scene: the ordered root nodes of one asset file's scene.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ImportedScene {
    pub name: Option<String>,
    pub nodes: Vec<ImportedNode>,
}

impl ImportedScene {
    /// Every GPU resource referenced by the scene's primitives, each once.
    pub fn resources(&self) -> ImportedResources {
        let mut resources = ImportedResources::default();
        let mut pending: Vec<&ImportedNode> = self.nodes.iter().collect();
        while let Some(node) = pending.pop() {
            for primitive in node.mesh.iter().flat_map(|mesh| &mesh.primitives) {
                resources.insert(primitive);
            }
            pending.extend(&node.children);
        }
        resources
    }
}

/// Handles owned by an imported scene.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ImportedResources {
    pub vertex_arrays: BTreeSet<VertexArrayHandle>,
    pub textures: BTreeSet<TextureHandle>,
    pub samplers: BTreeSet<SamplerHandle>,
}

impl ImportedResources {
    pub fn insert(&mut self, primitive: &Primitive) {
        self.vertex_arrays.insert(primitive.vertex_array);
        if let Some(bound) = primitive.material.base_color_texture {
            self.insert_texture(bound);
        }
    }

    pub fn insert_texture(&mut self, bound: BoundTexture) {
        self.textures.insert(bound.texture);
        self.samplers.extend(bound.sampler);
    }

    pub fn is_empty(&self) -> bool {
        self.vertex_arrays.is_empty() && self.textures.is_empty() && self.samplers.is_empty()
    }
}

/// Perspective intrinsics of an imported camera.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PerspectiveLens {
    pub yfov: Rad<f32>,
    pub znear: f32,
    pub zfar: f32,
}

impl PerspectiveLens {
    pub fn projection(&self, aspect: f32) -> Matrix4<f32> {
        OPENGL_TO_WGPU_MATRIX * cgmath::perspective(self.yfov, aspect, self.znear, self.zfar)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ImportedCamera {
    pub name: Option<String>,
    /// Local transform of the camera node.
    pub transform: Matrix4<f32>,
    /// Local transforms of the camera's ancestors, root first.
    pub ancestors: Vec<Matrix4<f32>>,
    /// Projection as authored in the file.
    pub projection: Matrix4<f32>,
    /// Set for perspective cameras, whose projection follows the viewport's
    /// aspect ratio once one is known.
    pub lens: Option<PerspectiveLens>,
}

impl ImportedCamera {
    /// The projection to draw with for a viewport of `aspect`, or the authored
    /// one when the aspect is unknown or the camera is orthographic.
    pub fn projection_for(&self, aspect: Option<f32>) -> Matrix4<f32> {
        match (self.lens, aspect) {
            (Some(lens), Some(aspect)) => lens.projection(aspect),
            _ => self.projection,
        }
    }

    pub fn global_transform(&self) -> Matrix4<f32> {
        self.ancestors
            .iter()
            .fold(Matrix4::identity(), |acc, local| acc * local)
            * self.transform
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Fragment {
    /// The URI the fragment was imported from.
    pub source: String,
    pub scene: ImportedScene,
    pub camera: ImportedCamera,
}
