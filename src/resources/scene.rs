//! Scene documents: the declarative JSON description of a scene.
//!
//! A [`SceneDocument`] is what sits on disk. Its mesh and texture tables hold
//! URIs (or inline meshes); [`load_scene`] fetches and decodes them into a
//! [`SceneSpec`], which is what [`crate::builder::SceneBuilder`] consumes.

use std::{collections::BTreeMap, fmt, sync::Arc};

use anyhow::Context as _;
use cgmath::Matrix4;
use image::RgbaImage;
use serde::Deserialize;

use crate::{
    data_structures::{model::Mesh, transform::Transform},
    resources::Assets,
};

/// Table lookup key: an array index or an object key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(untagged)]
pub enum Key {
    Index(usize),
    Name(String),
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Index(index) => write!(f, "{index}"),
            Key::Name(name) => f.write_str(name),
        }
    }
}

impl From<usize> for Key {
    fn from(index: usize) -> Self {
        Key::Index(index)
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Key::Name(name.to_string())
    }
}

/// A shared resource table, written either as a JSON array or a JSON object.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Table<T> {
    List(Vec<T>),
    Named(BTreeMap<String, T>),
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Table::List(Vec::new())
    }
}

impl<T> Table<T> {
    pub fn get(&self, key: &Key) -> Option<&T> {
        match (self, key) {
            (Table::List(entries), Key::Index(index)) => entries.get(*index),
            (Table::List(entries), Key::Name(name)) => {
                name.parse::<usize>().ok().and_then(|index| entries.get(index))
            }
            (Table::Named(entries), Key::Name(name)) => entries.get(name),
            (Table::Named(entries), Key::Index(index)) => entries.get(&index.to_string()),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Table::List(entries) => entries.len(),
            Table::Named(entries) => entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> Box<dyn Iterator<Item = (Key, &T)> + '_> {
        match self {
            Table::List(entries) => Box::new(
                entries
                    .iter()
                    .enumerate()
                    .map(|(index, entry)| (Key::Index(index), entry)),
            ),
            Table::Named(entries) => Box::new(
                entries
                    .iter()
                    .map(|(name, entry)| (Key::Name(name.clone()), entry)),
            ),
        }
    }

    /// Rebuilds the table with the same keys from values produced in iteration order.
    fn with_values<U>(&self, values: Vec<U>) -> Table<U> {
        match self {
            Table::List(_) => Table::List(values),
            Table::Named(entries) => Table::Named(entries.keys().cloned().zip(values).collect()),
        }
    }
}

/// The kind of node a descriptor asks for. Unknown tags build plain nodes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeType {
    Camera,
    Model,
    Other,
}

impl NodeType {
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "camera" => NodeType::Camera,
            "model" => NodeType::Model,
            _ => NodeType::Other,
        }
    }
}

/// One node descriptor.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct NodeSpec {
    #[serde(rename = "type")]
    pub tag: String,
    pub name: Option<String>,
    pub translation: [f32; 3],
    /// XYZ Euler angles in degrees.
    pub rotation: [f32; 3],
    pub scale: [f32; 3],
    /// Column-major local matrix; overrides translation, rotation and scale.
    pub matrix: Option<[f32; 16]>,
    pub mesh: Option<Key>,
    pub texture: Option<Key>,
    /// Vertical field of view in radians.
    pub fov: Option<f32>,
    pub aspect: Option<f32>,
    pub near: Option<f32>,
    pub far: Option<f32>,
    pub children: Vec<NodeSpec>,
}

impl Default for NodeSpec {
    fn default() -> Self {
        Self {
            tag: "node".to_string(),
            name: None,
            translation: [0.0; 3],
            rotation: [0.0; 3],
            scale: [1.0; 3],
            matrix: None,
            mesh: None,
            texture: None,
            fov: None,
            aspect: None,
            near: None,
            far: None,
            children: Vec::new(),
        }
    }
}

impl NodeSpec {
    pub fn node_type(&self) -> NodeType {
        NodeType::from_tag(&self.tag)
    }

    pub fn local_transform(&self) -> Matrix4<f32> {
        match self.matrix {
            #[rustfmt::skip]
            Some(m) => Matrix4::new(
                m[0], m[1], m[2], m[3],
                m[4], m[5], m[6], m[7],
                m[8], m[9], m[10], m[11],
                m[12], m[13], m[14], m[15],
            ),
            None => Transform::from_euler_degrees(self.translation, self.rotation, self.scale)
                .to_matrix(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum MeshSource {
    Inline(Mesh),
    Uri(String),
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SceneDocument {
    pub nodes: Vec<NodeSpec>,
    pub meshes: Table<MeshSource>,
    /// Image URIs.
    pub textures: Table<String>,
}

impl SceneDocument {
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        serde_json::from_str(json).context("invalid scene document")
    }
}

/// A scene document with every mesh and texture loaded. Read-only once built.
#[derive(Clone, Debug, Default)]
pub struct SceneSpec {
    pub nodes: Vec<NodeSpec>,
    pub meshes: Table<Arc<Mesh>>,
    pub textures: Table<Arc<RgbaImage>>,
}

/// Loads a scene document and everything its tables reference.
pub async fn load_scene(assets: &Assets, uri: &str) -> anyhow::Result<SceneSpec> {
    let json = assets.load_string(uri).await?;
    let document =
        SceneDocument::from_json(&json).with_context(|| format!("while reading {uri}"))?;
    resolve_document(assets, document).await
}

pub async fn resolve_document(
    assets: &Assets,
    document: SceneDocument,
) -> anyhow::Result<SceneSpec> {
    let meshes = futures::future::try_join_all(document.meshes.iter().map(|(key, source)| async move {
        let mesh = match source {
            MeshSource::Inline(mesh) => mesh.clone(),
            MeshSource::Uri(uri) => {
                let json = assets.load_string(uri).await?;
                serde_json::from_str::<Mesh>(&json)
                    .with_context(|| format!("mesh `{key}` at {uri} is invalid"))?
            }
        };
        anyhow::Ok(Arc::new(mesh))
    }))
    .await?;

    let textures = futures::future::try_join_all(document.textures.iter().map(|(key, uri)| async move {
        let image = assets
            .load_image(uri)
            .await
            .with_context(|| format!("texture `{key}`"))?;
        anyhow::Ok(Arc::new(image))
    }))
    .await?;

    log::info!(
        "scene document resolved: {} nodes, {} meshes, {} textures",
        document.nodes.len(),
        meshes.len(),
        textures.len()
    );

    Ok(SceneSpec {
        meshes: document.meshes.with_values(meshes),
        textures: document.textures.with_values(textures),
        nodes: document.nodes,
    })
}
