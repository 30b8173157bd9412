//! Preparing and drawing scenes.
//!
//! [`Renderer::prepare`] turns a freshly built [`Scene`] into GPU resources once.
//! [`Renderer::render`] then draws the scene every frame by walking the node tree
//! with a [`MatrixStack`]: entering a node pushes the accumulated matrix and
//! multiplies the node's local transform in, leaving it pops the saved matrix so
//! siblings never see each other's transforms. [`Renderer::render_fragments`]
//! walks imported fragments the same way.
//!
//! Both walks share [`DrawableTraversal`]; they differ only in how matrices reach
//! the shader ([`UniformStrategy`]) and share the configured [`TexturePolicy`].
//!
//! [`Renderer::release`] destroys everything a scene holds on the GPU, the
//! importer-created fragment resources included.

use cgmath::{Matrix4, SquareMatrix};
use image::RgbaImage;
use serde::Deserialize;

use crate::{
    config::RendererConfig,
    data_structures::{
        fragment::{BoundTexture, ImportedNode, ImportedResources, Primitive},
        model::GpuModel,
        scene_graph::{Node, NodeId, Scene, Visit},
    },
    error::RenderError,
    gpu::{
        Gpu, IndexFormat, Program, SamplerDesc, TextureHandle, Topology, Uniform,
        VertexArrayHandle,
    },
};

/// Accumulated transform with save/restore.
#[derive(Clone, Debug)]
pub struct MatrixStack {
    current: Matrix4<f32>,
    saved: Vec<Matrix4<f32>>,
}

impl MatrixStack {
    pub fn new(base: Matrix4<f32>) -> Self {
        Self {
            current: base,
            saved: Vec::new(),
        }
    }

    pub fn current(&self) -> &Matrix4<f32> {
        &self.current
    }

    pub fn depth(&self) -> usize {
        self.saved.len()
    }

    /// Saves the current matrix and right-multiplies `local` into it.
    pub fn push(&mut self, local: &Matrix4<f32>) {
        self.saved.push(self.current);
        self.current = self.current * local;
    }

    /// Restores the matrix saved by the matching [`MatrixStack::push`].
    pub fn pop(&mut self) {
        if let Some(saved) = self.saved.pop() {
            self.current = saved;
        }
    }
}

/// What to bind when a drawable carries no texture.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TexturePolicy {
    /// Bind the renderer's 1×1 opaque white texture.
    #[default]
    FallbackToDefault,
    /// Bind nothing and leave the previous binding in place.
    LeaveUnbound,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UniformStrategy {
    /// The projection is uploaded once per frame; every draw uploads `uViewModel`.
    SplitProjection,
    /// The projection is part of the base matrix; every draw uploads `uModelViewProjection`.
    FoldedProjection,
}

impl UniformStrategy {
    pub fn program(&self) -> Program {
        match self {
            UniformStrategy::SplitProjection => Program::Simple,
            UniformStrategy::FoldedProjection => Program::Imported,
        }
    }

    pub fn matrix_uniform(&self) -> Uniform {
        match self {
            UniformStrategy::SplitProjection => Uniform::ViewModel,
            UniformStrategy::FoldedProjection => Uniform::ModelViewProjection,
        }
    }

    pub fn texture_uniform(&self) -> Uniform {
        match self {
            UniformStrategy::SplitProjection => Uniform::Texture,
            UniformStrategy::FoldedProjection => Uniform::BaseColorTexture,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DrawRange {
    Indexed { count: u32, format: IndexFormat },
    Vertices { count: u32 },
}

/// One draw call worth of state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DrawItem {
    pub vertex_array: VertexArrayHandle,
    pub topology: Topology,
    pub range: DrawRange,
    pub texture: Option<BoundTexture>,
}

impl From<&GpuModel> for DrawItem {
    fn from(model: &GpuModel) -> Self {
        Self {
            vertex_array: model.vertex_array,
            topology: Topology::Triangles,
            range: DrawRange::Indexed {
                count: model.index_count,
                format: IndexFormat::U16,
            },
            texture: model.texture.map(|texture| BoundTexture {
                texture,
                sampler: None,
            }),
        }
    }
}

impl From<&Primitive> for DrawItem {
    fn from(primitive: &Primitive) -> Self {
        let range = match primitive.indices {
            Some(indices) => DrawRange::Indexed {
                count: indices.count,
                format: indices.format,
            },
            None => DrawRange::Vertices {
                count: primitive.vertex_count,
            },
        };
        Self {
            vertex_array: primitive.vertex_array,
            topology: primitive.topology,
            range,
            texture: primitive.material.base_color_texture,
        }
    }
}

/// Depth-first drawing state shared by both render paths.
pub struct DrawableTraversal<'g, G: Gpu + ?Sized> {
    gpu: &'g mut G,
    strategy: UniformStrategy,
    policy: TexturePolicy,
    default_texture: TextureHandle,
    stack: MatrixStack,
}

impl<'g, G: Gpu + ?Sized> DrawableTraversal<'g, G> {
    pub fn new(
        gpu: &'g mut G,
        strategy: UniformStrategy,
        policy: TexturePolicy,
        default_texture: TextureHandle,
        base: Matrix4<f32>,
    ) -> Self {
        Self {
            gpu,
            strategy,
            policy,
            default_texture,
            stack: MatrixStack::new(base),
        }
    }

    pub fn stack(&self) -> &MatrixStack {
        &self.stack
    }

    pub fn enter<I>(&mut self, local: &Matrix4<f32>, items: I)
    where
        I: IntoIterator<Item = DrawItem>,
    {
        self.stack.push(local);
        for item in items {
            self.draw(item);
        }
    }

    pub fn exit(&mut self) {
        self.stack.pop();
    }

    fn draw(&mut self, item: DrawItem) {
        self.gpu.bind_vertex_array(item.vertex_array);
        self.gpu
            .set_matrix(self.strategy.matrix_uniform(), self.stack.current());

        let uniform = self.strategy.texture_uniform();
        match (item.texture, self.policy) {
            (Some(bound), _) => self.gpu.bind_texture(uniform, bound.texture, bound.sampler),
            (None, TexturePolicy::FallbackToDefault) => {
                self.gpu.bind_texture(uniform, self.default_texture, None)
            }
            (None, TexturePolicy::LeaveUnbound) => (),
        }

        match item.range {
            DrawRange::Indexed { count, format } => {
                self.gpu.draw_elements(item.topology, count, format)
            }
            DrawRange::Vertices { count } => self.gpu.draw_arrays(item.topology, count),
        }
    }

    fn walk_imported(&mut self, node: &ImportedNode) {
        let items = node
            .mesh
            .iter()
            .flat_map(|mesh| mesh.primitives.iter().map(DrawItem::from));
        self.enter(&node.transform, items);
        for child in &node.children {
            self.walk_imported(child);
        }
        self.exit();
    }
}

impl<G: Gpu + ?Sized> Visit for DrawableTraversal<'_, G> {
    fn before(&mut self, _id: NodeId, node: &Node) {
        let item = node.model().and_then(|model| model.gpu()).map(DrawItem::from);
        self.enter(&node.transform, item);
    }

    fn after(&mut self, _id: NodeId, _node: &Node) {
        self.exit();
    }
}

pub struct Renderer {
    config: RendererConfig,
    default_texture: TextureHandle,
    viewport_aspect: Option<f32>,
}

impl Renderer {
    pub fn new<G: Gpu + ?Sized>(gpu: &mut G, config: RendererConfig) -> Self {
        let white = RgbaImage::from_pixel(1, 1, image::Rgba([255, 255, 255, 255]));
        let default_texture = gpu.create_texture("default texture", &white, SamplerDesc::nearest());
        Self {
            config,
            default_texture,
            viewport_aspect: None,
        }
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn default_texture(&self) -> TextureHandle {
        self.default_texture
    }

    pub fn viewport_aspect(&self) -> Option<f32> {
        self.viewport_aspect
    }

    /// Perspective fragment cameras draw with this aspect instead of the one
    /// authored in their file. Non-positive values are ignored.
    pub fn set_viewport_aspect(&mut self, aspect: f32) {
        if aspect > 0.0 {
            self.viewport_aspect = Some(aspect);
        }
    }

    /// Creates vertex arrays and textures for every model in the scene's node tree.
    ///
    /// Fragments are skipped, the importer already created their resources.
    /// Models that were prepared before keep their handles. Returns how many
    /// models were prepared by this call.
    pub fn prepare<G: Gpu + ?Sized>(&self, gpu: &mut G, scene: &mut Scene) -> usize {
        let mut prepared = 0;
        for (position, id) in scene.depth_first().into_iter().enumerate() {
            let Some(node) = scene.node_mut(id) else {
                continue;
            };
            let label = node
                .name
                .clone()
                .unwrap_or_else(|| format!("node {position}"));
            let Some(model) = node.model_mut() else {
                continue;
            };
            if model.is_prepared() {
                log::warn!("{label} was already prepared, keeping its GPU resources");
                continue;
            }

            let vertex_array =
                gpu.create_vertex_array(&label, model.mesh.streams(), Some(model.mesh.index_data()));
            let texture = model
                .texture
                .as_deref()
                .map(|image| gpu.create_texture(&label, image, SamplerDesc::nearest()));
            model.set_gpu(GpuModel {
                vertex_array,
                index_count: model.mesh.indices.len() as u32,
                texture,
            });
            log::debug!(
                "prepared {label}: {} indices, textured: {}",
                model.mesh.indices.len(),
                texture.is_some()
            );
            prepared += 1;
        }
        prepared
    }

    /// Destroys the vertex arrays and textures of the prepared models among `nodes`.
    pub fn release_nodes<G, N>(&self, gpu: &mut G, nodes: N) -> usize
    where
        G: Gpu + ?Sized,
        N: IntoIterator<Item = Node>,
    {
        let mut released = 0;
        for node in nodes {
            let Some(model) = node.model().and_then(|model| model.gpu()) else {
                continue;
            };
            gpu.destroy_vertex_array(model.vertex_array);
            if let Some(texture) = model.texture {
                gpu.destroy_texture(texture);
            }
            released += 1;
        }
        released
    }

    /// Destroys every GPU resource `scene` holds: its prepared models and the
    /// resources the importer created for its fragments. The default texture
    /// belongs to the renderer and survives.
    pub fn release<G: Gpu + ?Sized>(&self, gpu: &mut G, mut scene: Scene) {
        let mut fragments = ImportedResources::default();
        for fragment in scene.fragments() {
            let resources = fragment.scene.resources();
            fragments.vertex_arrays.extend(resources.vertex_arrays);
            fragments.textures.extend(resources.textures);
            fragments.samplers.extend(resources.samplers);
        }

        let nodes = scene
            .nodes()
            .to_vec()
            .into_iter()
            .filter_map(|root| scene.remove(root))
            .flatten()
            .collect::<Vec<_>>();
        let models = self.release_nodes(&mut *gpu, nodes);

        for &vertex_array in &fragments.vertex_arrays {
            gpu.destroy_vertex_array(vertex_array);
        }
        for &texture in &fragments.textures {
            gpu.destroy_texture(texture);
        }
        for &sampler in &fragments.samplers {
            gpu.destroy_sampler(sampler);
        }
        log::debug!(
            "released {models} models and {} fragment resources",
            fragments.vertex_arrays.len() + fragments.textures.len() + fragments.samplers.len()
        );
    }

    /// Draws the scene's node tree as seen from `camera`. Clears the frame first.
    pub fn render<G: Gpu + ?Sized>(
        &self,
        gpu: &mut G,
        scene: &Scene,
        camera: NodeId,
    ) -> Result<(), RenderError> {
        let projection = *scene
            .node(camera)
            .ok_or(RenderError::UnknownNode(camera))?
            .camera()
            .ok_or(RenderError::NotACamera(camera))?
            .projection();
        let view = scene
            .global_transform(camera)
            .ok_or(RenderError::UnknownNode(camera))?
            .invert()
            .ok_or(RenderError::SingularTransform(camera))?;

        gpu.clear();
        gpu.use_program(Program::Simple);
        gpu.set_matrix(Uniform::Projection, &projection);

        let mut traversal = DrawableTraversal::new(
            gpu,
            UniformStrategy::SplitProjection,
            self.config.texture_policy,
            self.default_texture,
            view,
        );
        scene.walk(&mut traversal);
        Ok(())
    }

    /// Draws every imported fragment through its own camera, on top of the
    /// current frame.
    ///
    /// Perspective cameras use the viewport aspect set with
    /// [`Renderer::set_viewport_aspect`]; orthographic ones, and every camera
    /// before an aspect is set, keep the projection authored in their file.
    pub fn render_fragments<G: Gpu + ?Sized>(&self, gpu: &mut G, scene: &Scene) {
        for fragment in scene.fragments() {
            let Some(view) = fragment.camera.global_transform().invert() else {
                log::warn!(
                    "camera of fragment {} cannot be inverted, skipping it",
                    fragment.source
                );
                continue;
            };

            gpu.use_program(Program::Imported);
            let mut traversal = DrawableTraversal::new(
                &mut *gpu,
                UniformStrategy::FoldedProjection,
                self.config.texture_policy,
                self.default_texture,
                fragment.camera.projection_for(self.viewport_aspect) * view,
            );
            for node in &fragment.scene.nodes {
                traversal.walk_imported(node);
            }
        }
    }
}
