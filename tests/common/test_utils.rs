#![allow(dead_code)]

use std::{collections::HashMap, sync::Arc};

use image::RgbaImage;
use scene_ngin::{
    builder::AssetImporter,
    cgmath::{Matrix4, SquareMatrix, Vector3},
    data_structures::{
        fragment::{
            BoundTexture, ImportedCamera, ImportedMesh, ImportedNode, ImportedScene,
            IndexAccessor, Material, Primitive,
        },
        model::Mesh,
    },
    gpu::{
        Gpu, IndexData, IndexFormat, Program, SamplerDesc, SamplerHandle, TextureHandle,
        Topology, Uniform, VertexArrayHandle, VertexStreams,
    },
    resources::scene::{Key, NodeSpec, SceneSpec, Table},
};
use slotmap::SlotMap;
use tempfile::TempDir;

/// Every call the renderer or an importer made, in order.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum GpuCall {
    CreateVertexArray {
        label: String,
        vertex_count: usize,
        texcoords: usize,
        normals: usize,
        indices: Option<(usize, IndexFormat)>,
    },
    CreateTexture {
        label: String,
        size: (u32, u32),
        sampler: SamplerDesc,
    },
    CreateSampler(SamplerDesc),
    DestroyVertexArray(VertexArrayHandle),
    DestroyTexture(TextureHandle),
    DestroySampler(SamplerHandle),
    UseProgram(Program),
    Clear,
    BindVertexArray(VertexArrayHandle),
    SetMatrix(Uniform, Matrix4<f32>),
    BindTexture(Uniform, TextureHandle, Option<SamplerHandle>),
    DrawElements(Topology, u32, IndexFormat),
    DrawArrays(Topology, u32),
}

impl GpuCall {
    pub(crate) fn is_create(&self) -> bool {
        matches!(
            self,
            GpuCall::CreateVertexArray { .. }
                | GpuCall::CreateTexture { .. }
                | GpuCall::CreateSampler(_)
        )
    }

    pub(crate) fn is_destroy(&self) -> bool {
        matches!(
            self,
            GpuCall::DestroyVertexArray(_) | GpuCall::DestroyTexture(_) | GpuCall::DestroySampler(_)
        )
    }

    pub(crate) fn is_draw(&self) -> bool {
        matches!(self, GpuCall::DrawElements(..) | GpuCall::DrawArrays(..))
    }
}

#[derive(Debug, Default)]
pub(crate) struct RecordingGpu {
    pub(crate) calls: Vec<GpuCall>,
    vertex_arrays: SlotMap<VertexArrayHandle, ()>,
    textures: SlotMap<TextureHandle, ()>,
    samplers: SlotMap<SamplerHandle, ()>,
}

impl RecordingGpu {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Returns and forgets the calls recorded so far.
    pub(crate) fn take(&mut self) -> Vec<GpuCall> {
        std::mem::take(&mut self.calls)
    }

    pub(crate) fn creates(&self) -> Vec<&GpuCall> {
        self.calls.iter().filter(|call| call.is_create()).collect()
    }

    pub(crate) fn destroys(&self) -> Vec<&GpuCall> {
        self.calls.iter().filter(|call| call.is_destroy()).collect()
    }

    /// Resources created and not destroyed yet.
    pub(crate) fn live(&self) -> (usize, usize, usize) {
        (self.vertex_arrays.len(), self.textures.len(), self.samplers.len())
    }

    pub(crate) fn draws(&self) -> Vec<&GpuCall> {
        self.calls.iter().filter(|call| call.is_draw()).collect()
    }

    /// Values uploaded to `uniform`, in call order.
    pub(crate) fn matrices(&self, uniform: Uniform) -> Vec<Matrix4<f32>> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                GpuCall::SetMatrix(u, matrix) if *u == uniform => Some(*matrix),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn bound_textures(&self) -> Vec<(Uniform, TextureHandle, Option<SamplerHandle>)> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                GpuCall::BindTexture(u, t, s) => Some((*u, *t, *s)),
                _ => None,
            })
            .collect()
    }
}

impl Gpu for RecordingGpu {
    fn create_vertex_array(
        &mut self,
        label: &str,
        streams: VertexStreams<'_>,
        indices: Option<IndexData<'_>>,
    ) -> VertexArrayHandle {
        self.calls.push(GpuCall::CreateVertexArray {
            label: label.to_string(),
            vertex_count: streams.vertex_count(),
            texcoords: streams.texcoords.len(),
            normals: streams.normals.len(),
            indices: indices.map(|indices| (indices.len(), indices.format())),
        });
        self.vertex_arrays.insert(())
    }

    fn create_texture(
        &mut self,
        label: &str,
        image: &RgbaImage,
        sampler: SamplerDesc,
    ) -> TextureHandle {
        self.calls.push(GpuCall::CreateTexture {
            label: label.to_string(),
            size: image.dimensions(),
            sampler,
        });
        self.textures.insert(())
    }

    fn create_sampler(&mut self, desc: SamplerDesc) -> SamplerHandle {
        self.calls.push(GpuCall::CreateSampler(desc));
        self.samplers.insert(())
    }

    fn destroy_vertex_array(&mut self, vertex_array: VertexArrayHandle) {
        self.calls.push(GpuCall::DestroyVertexArray(vertex_array));
        self.vertex_arrays.remove(vertex_array);
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        self.calls.push(GpuCall::DestroyTexture(texture));
        self.textures.remove(texture);
    }

    fn destroy_sampler(&mut self, sampler: SamplerHandle) {
        self.calls.push(GpuCall::DestroySampler(sampler));
        self.samplers.remove(sampler);
    }

    fn use_program(&mut self, program: Program) {
        self.calls.push(GpuCall::UseProgram(program));
    }

    fn clear(&mut self) {
        self.calls.push(GpuCall::Clear);
    }

    fn bind_vertex_array(&mut self, vertex_array: VertexArrayHandle) {
        self.calls.push(GpuCall::BindVertexArray(vertex_array));
    }

    fn set_matrix(&mut self, uniform: Uniform, matrix: &Matrix4<f32>) {
        self.calls.push(GpuCall::SetMatrix(uniform, *matrix));
    }

    fn bind_texture(
        &mut self,
        uniform: Uniform,
        texture: TextureHandle,
        sampler: Option<SamplerHandle>,
    ) {
        self.calls.push(GpuCall::BindTexture(uniform, texture, sampler));
    }

    fn draw_elements(&mut self, topology: Topology, count: u32, format: IndexFormat) {
        self.calls.push(GpuCall::DrawElements(topology, count, format));
    }

    fn draw_arrays(&mut self, topology: Topology, count: u32) {
        self.calls.push(GpuCall::DrawArrays(topology, count));
    }
}

/// What a scripted import of one URI yields.
#[derive(Clone, Debug)]
pub(crate) enum Script {
    Fail(String),
    Objects {
        scene: Option<ImportedScene>,
        camera: Option<ImportedCamera>,
    },
}

/// An importer that answers from a per-URI script instead of reading files.
#[derive(Clone, Debug, Default)]
pub(crate) struct MockImporter {
    scripts: HashMap<String, Script>,
    current: Option<(Option<ImportedScene>, Option<ImportedCamera>)>,
    pub(crate) loaded: Vec<String>,
}

impl MockImporter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_fragment(self, uri: &str, scene: ImportedScene, camera: ImportedCamera) -> Self {
        self.with_objects(uri, Some(scene), Some(camera))
    }

    pub(crate) fn with_objects(
        mut self,
        uri: &str,
        scene: Option<ImportedScene>,
        camera: Option<ImportedCamera>,
    ) -> Self {
        self.scripts
            .insert(uri.to_string(), Script::Objects { scene, camera });
        self
    }

    pub(crate) fn with_failure(mut self, uri: &str, reason: &str) -> Self {
        self.scripts
            .insert(uri.to_string(), Script::Fail(reason.to_string()));
        self
    }
}

impl AssetImporter for MockImporter {
    async fn load<G: Gpu + ?Sized>(&mut self, _gpu: &mut G, uri: &str) -> anyhow::Result<()> {
        self.loaded.push(uri.to_string());
        self.current = None;
        match self.scripts.get(uri) {
            None => anyhow::bail!("{uri} not found"),
            Some(Script::Fail(reason)) => anyhow::bail!("{reason}"),
            Some(Script::Objects { scene, camera }) => {
                self.current = Some((scene.clone(), camera.clone()));
                Ok(())
            }
        }
    }

    fn scene_by_name(&self, name: &str) -> Option<ImportedScene> {
        let (scene, _) = self.current.as_ref()?;
        scene
            .clone()
            .filter(|scene| scene.name.as_deref() == Some(name))
    }

    fn camera_by_name(&self, name: &str) -> Option<ImportedCamera> {
        let (_, camera) = self.current.as_ref()?;
        camera
            .clone()
            .filter(|camera| camera.name.as_deref() == Some(name))
    }
}

pub(crate) fn translation(x: f32, y: f32, z: f32) -> Matrix4<f32> {
    Matrix4::from_translation(Vector3::new(x, y, z))
}

pub(crate) fn assert_matrix_eq(actual: &Matrix4<f32>, expected: &Matrix4<f32>) {
    let a: &[f32; 16] = actual.as_ref();
    let e: &[f32; 16] = expected.as_ref();
    for (i, (a, e)) in a.iter().zip(e.iter()).enumerate() {
        assert!(
            (a - e).abs() < 1e-4,
            "component {i} differs: {a} != {e}\nactual:   {actual:?}\nexpected: {expected:?}"
        );
    }
}

/// One textured triangle.
pub(crate) fn triangle() -> Mesh {
    Mesh {
        positions: vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
        texcoords: vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0],
        normals: vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0],
        indices: vec![0, 1, 2],
    }
}

pub(crate) fn checker() -> RgbaImage {
    RgbaImage::from_fn(2, 2, |x, y| {
        if (x + y) % 2 == 0 {
            image::Rgba([0, 0, 0, 255])
        } else {
            image::Rgba([255, 255, 255, 255])
        }
    })
}

/// A spec whose tables hold one mesh `tri` and one texture `checker`.
pub(crate) fn spec(nodes: Vec<NodeSpec>) -> SceneSpec {
    SceneSpec {
        nodes,
        meshes: Table::Named([("tri".to_string(), Arc::new(triangle()))].into()),
        textures: Table::Named([("checker".to_string(), Arc::new(checker()))].into()),
    }
}

pub(crate) fn node(tag: &str) -> NodeSpec {
    NodeSpec {
        tag: tag.to_string(),
        ..Default::default()
    }
}

pub(crate) fn model(mesh: &str, texture: Option<&str>) -> NodeSpec {
    NodeSpec {
        mesh: Some(Key::from(mesh)),
        texture: texture.map(Key::from),
        ..node("model")
    }
}

pub(crate) fn camera() -> NodeSpec {
    node("camera")
}

pub(crate) fn named(mut spec: NodeSpec, name: &str) -> NodeSpec {
    spec.name = Some(name.to_string());
    spec
}

pub(crate) fn at(mut spec: NodeSpec, x: f32, y: f32, z: f32) -> NodeSpec {
    spec.translation = [x, y, z];
    spec
}

pub(crate) fn with_children(mut spec: NodeSpec, children: Vec<NodeSpec>) -> NodeSpec {
    spec.children = children;
    spec
}

/// The `n`th key a fresh slotmap hands out. [`RecordingGpu`] returns the same
/// key for its `n`th create of a kind as long as nothing of that kind was
/// destroyed before.
fn nth_key<K: slotmap::Key>(n: usize) -> K {
    let mut keys = SlotMap::<K, ()>::with_key();
    for _ in 0..n {
        keys.insert(());
    }
    keys.insert(())
}

pub(crate) fn vertex_array_key(n: usize) -> VertexArrayHandle {
    nth_key(n)
}

pub(crate) fn texture_key(n: usize) -> TextureHandle {
    nth_key(n)
}

pub(crate) fn sampler_key(n: usize) -> SamplerHandle {
    nth_key(n)
}

pub(crate) fn imported_primitive(
    vertex_array: usize,
    indices: Option<u32>,
    texture: Option<BoundTexture>,
) -> Primitive {
    Primitive {
        vertex_array: vertex_array_key(vertex_array),
        topology: Topology::Triangles,
        vertex_count: 3,
        indices: indices.map(|count| IndexAccessor {
            count,
            format: IndexFormat::U16,
        }),
        material: Material {
            name: None,
            base_color_texture: texture,
        },
    }
}

pub(crate) fn imported_node(
    transform: Matrix4<f32>,
    primitives: Vec<Primitive>,
    children: Vec<ImportedNode>,
) -> ImportedNode {
    ImportedNode {
        name: None,
        transform,
        mesh: (!primitives.is_empty()).then(|| ImportedMesh {
            name: None,
            primitives,
        }),
        children,
    }
}

pub(crate) fn imported_scene(nodes: Vec<ImportedNode>) -> ImportedScene {
    ImportedScene {
        name: Some("Scene".to_string()),
        nodes,
    }
}

pub(crate) fn imported_camera(transform: Matrix4<f32>) -> ImportedCamera {
    ImportedCamera {
        name: Some("Camera".to_string()),
        transform,
        ancestors: Vec::new(),
        projection: Matrix4::identity(),
        lens: None,
    }
}

/// A fresh directory under the system temp dir, removed when the guard drops.
pub(crate) fn scratch_dir(name: &str) -> TempDir {
    tempfile::Builder::new()
        .prefix(&format!("scene-ngin-{name}-"))
        .tempdir()
        .expect("cannot create scratch dir")
}
