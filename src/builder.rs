//! Turning a [`SceneSpec`] into a [`Scene`].
//!
//! Building happens in two phases. The node tree is created synchronously and
//! completely: every descriptor is turned into a node before any of them is
//! inserted, so a bad mesh or texture key leaves no partial scene behind. Only
//! then are the configured external assets imported, one after another, and
//! merged into the scene as fragments. A failing import is logged and skipped.

use cgmath::Rad;

use crate::{
    config::ImportConfig,
    data_structures::{
        camera::Camera,
        fragment::{Fragment, ImportedCamera, ImportedScene},
        model::Model,
        scene_graph::{Node, NodeId, NodeKind, Scene},
    },
    error::BuildError,
    gpu::Gpu,
    resources::scene::{NodeSpec, NodeType, SceneSpec},
};

/// Loads external asset files and exposes their named objects.
///
/// `load` receives the GPU so the importer can create the vertex arrays and
/// textures of the imported primitives right away.
#[allow(async_fn_in_trait)]
pub trait AssetImporter {
    async fn load<G: Gpu + ?Sized>(&mut self, gpu: &mut G, uri: &str) -> anyhow::Result<()>;

    fn scene_by_name(&self, name: &str) -> Option<ImportedScene>;

    fn camera_by_name(&self, name: &str) -> Option<ImportedCamera>;
}

/// An importer for scenes without external assets.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoImports;

impl AssetImporter for NoImports {
    async fn load<G: Gpu + ?Sized>(&mut self, _gpu: &mut G, uri: &str) -> anyhow::Result<()> {
        anyhow::bail!("no importer configured for {uri}")
    }

    fn scene_by_name(&self, _name: &str) -> Option<ImportedScene> {
        None
    }

    fn camera_by_name(&self, _name: &str) -> Option<ImportedCamera> {
        None
    }
}

/// A node created from a descriptor but not yet inserted.
struct PendingNode {
    node: Node,
    children: Vec<PendingNode>,
}

pub struct SceneBuilder<I> {
    spec: SceneSpec,
    importer: I,
    imports: ImportConfig,
}

impl<I: AssetImporter> SceneBuilder<I> {
    pub fn new(spec: SceneSpec, importer: I) -> Self {
        Self {
            spec,
            importer,
            imports: ImportConfig::default(),
        }
    }

    pub fn with_imports(mut self, imports: ImportConfig) -> Self {
        self.imports = imports;
        self
    }

    pub fn importer(&self) -> &I {
        &self.importer
    }

    /// Creates the node for one descriptor, without its children.
    ///
    /// `path` names the descriptor in errors.
    pub fn create_node(&self, path: &str, spec: &NodeSpec) -> Result<Node, BuildError> {
        let kind = match spec.node_type() {
            NodeType::Camera => NodeKind::Camera(Camera::new(
                Rad(spec.fov.unwrap_or(Camera::DEFAULT_FOVY)),
                spec.aspect.unwrap_or(1.0),
                spec.near.unwrap_or(Camera::DEFAULT_ZNEAR),
                spec.far.unwrap_or(Camera::DEFAULT_ZFAR),
            )),
            NodeType::Model => NodeKind::Model(self.create_model(path, spec)?),
            NodeType::Other => NodeKind::Plain,
        };

        let mut node = Node::new(kind, spec.local_transform());
        node.name = spec.name.clone();
        Ok(node)
    }

    fn create_model(&self, path: &str, spec: &NodeSpec) -> Result<Model, BuildError> {
        let key = spec.mesh.as_ref().ok_or_else(|| BuildError::MissingMesh {
            node: path.to_string(),
        })?;
        let mesh = self
            .spec
            .meshes
            .get(key)
            .ok_or_else(|| BuildError::UnknownMesh {
                node: path.to_string(),
                key: key.to_string(),
            })?;
        let texture = match &spec.texture {
            Some(key) => Some(self.spec.textures.get(key).cloned().ok_or_else(|| {
                BuildError::UnknownTexture {
                    node: path.to_string(),
                    key: key.to_string(),
                }
            })?),
            None => None,
        };
        Ok(Model::new(mesh.clone(), texture))
    }

    fn create_subtree(&self, path: String, spec: &NodeSpec) -> Result<PendingNode, BuildError> {
        let node = self.create_node(&path, spec)?;
        let children = spec
            .children
            .iter()
            .enumerate()
            .map(|(i, child)| self.create_subtree(format!("{path}.children[{i}]"), child))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(PendingNode { node, children })
    }

    /// Builds the node tree in document order. Imports are not touched.
    pub fn build_nodes(&self) -> Result<Scene, BuildError> {
        let pending = self
            .spec
            .nodes
            .iter()
            .enumerate()
            .map(|(i, spec)| self.create_subtree(format!("nodes[{i}]"), spec))
            .collect::<Result<Vec<_>, _>>()?;

        let mut scene = Scene::new();
        for root in pending {
            let id = scene.add_node(root.node);
            attach(&mut scene, id, root.children);
        }
        log::info!(
            "built {} nodes under {} roots",
            scene.len(),
            scene.nodes().len()
        );
        Ok(scene)
    }

    /// Imports every configured URI in order and appends a fragment for each
    /// one that exposes a non-empty scene and a camera under the configured
    /// names. Returns how many fragments were added.
    pub async fn load_imported_fragments<G: Gpu + ?Sized>(
        &mut self,
        gpu: &mut G,
        scene: &mut Scene,
    ) -> usize {
        let mut added = 0;
        let uris = self.imports.uris.clone();
        for uri in uris {
            log::debug!("importing {uri}");
            if let Err(err) = self.importer.load(&mut *gpu, &uri).await {
                log::warn!("import of {uri} failed, skipping it: {err:#}");
                continue;
            }

            let imported = self.importer.scene_by_name(&self.imports.scene_object);
            let camera = self.importer.camera_by_name(&self.imports.camera_object);
            match (imported, camera) {
                (Some(imported), Some(camera)) if !imported.nodes.is_empty() => {
                    scene.add_fragment(Fragment {
                        source: uri,
                        scene: imported,
                        camera,
                    });
                    added += 1;
                }
                (Some(_), Some(_)) => {
                    log::warn!("{uri}: `{}` has no nodes", self.imports.scene_object)
                }
                (None, _) => log::warn!("{uri}: no scene named `{}`", self.imports.scene_object),
                (_, None) => log::warn!("{uri}: no camera named `{}`", self.imports.camera_object),
            }
        }
        added
    }

    /// Builds the node tree, then merges the imported fragments into it.
    pub async fn build<G: Gpu + ?Sized>(mut self, gpu: &mut G) -> Result<Scene, BuildError> {
        let mut scene = self.build_nodes()?;
        let fragments = self.load_imported_fragments(gpu, &mut scene).await;
        if !self.imports.uris.is_empty() {
            log::info!(
                "imported {fragments} of {} fragments",
                self.imports.uris.len()
            );
        }
        Ok(scene)
    }
}

fn attach(scene: &mut Scene, parent: NodeId, children: Vec<PendingNode>) {
    for child in children {
        if let Some(id) = scene.add_child(parent, child.node) {
            attach(scene, id, child.children);
        }
    }
}
