//! The GPU interface consumed by the renderer.
//!
//! [`Gpu`] is deliberately small: create and destroy vertex arrays, textures and samplers,
//! select a program, set matrix/texture uniforms and issue draws. Resources are
//! referred to by opaque, copyable slotmap keys so that scene nodes can store
//! them without borrowing the device. A destroyed resource's key goes stale and
//! is never handed out again.
//!
//! [`crate::context::Context`] implements it on top of wgpu. Tests implement it
//! with a recorder.

use cgmath::Matrix4;
use image::RgbaImage;
use slotmap::new_key_type;

new_key_type! {
    /// A vertex array: one buffer per attribute stream plus an optional index buffer.
    pub struct VertexArrayHandle;
    /// A 2D texture together with its default sampler.
    pub struct TextureHandle;
    /// A standalone sampler that overrides a texture's default sampler when bound.
    pub struct SamplerHandle;
}

/// The two shader programs of the engine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Program {
    /// View-model and projection are separate uniforms, diffuse texture in `uTexture`.
    #[default]
    Simple,
    /// Projection folded into `uModelViewProjection`, texture in `uBaseColorTexture`.
    Imported,
}

/// Named uniform locations exposed by the programs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Uniform {
    ViewModel,
    Projection,
    Texture,
    ModelViewProjection,
    BaseColorTexture,
}

impl Uniform {
    pub fn name(&self) -> &'static str {
        match self {
            Uniform::ViewModel => "uViewModel",
            Uniform::Projection => "uProjection",
            Uniform::Texture => "uTexture",
            Uniform::ModelViewProjection => "uModelViewProjection",
            Uniform::BaseColorTexture => "uBaseColorTexture",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Topology {
    Points,
    Lines,
    LineStrip,
    #[default]
    Triangles,
    TriangleStrip,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IndexFormat {
    U16,
    U32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Filter {
    Nearest,
    #[default]
    Linear,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Wrap {
    #[default]
    Repeat,
    MirroredRepeat,
    ClampToEdge,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct SamplerDesc {
    pub min_filter: Filter,
    pub mag_filter: Filter,
    pub wrap_u: Wrap,
    pub wrap_v: Wrap,
}

impl SamplerDesc {
    /// Nearest-neighbour filtering for both minification and magnification.
    pub fn nearest() -> Self {
        Self {
            min_filter: Filter::Nearest,
            mag_filter: Filter::Nearest,
            ..Default::default()
        }
    }
}

/// Parallel attribute streams of a mesh: xyz positions, uv texcoords, xyz normals.
#[derive(Clone, Copy, Debug)]
pub struct VertexStreams<'a> {
    pub positions: &'a [f32],
    pub texcoords: &'a [f32],
    pub normals: &'a [f32],
}

impl VertexStreams<'_> {
    pub fn vertex_count(&self) -> usize {
        self.positions.len() / 3
    }
}

#[derive(Clone, Copy, Debug)]
pub enum IndexData<'a> {
    U16(&'a [u16]),
    U32(&'a [u32]),
}

impl IndexData<'_> {
    pub fn len(&self) -> usize {
        match self {
            IndexData::U16(indices) => indices.len(),
            IndexData::U32(indices) => indices.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn format(&self) -> IndexFormat {
        match self {
            IndexData::U16(_) => IndexFormat::U16,
            IndexData::U32(_) => IndexFormat::U32,
        }
    }
}

/// Everything the renderer and the importer need from a graphics device.
///
/// Calls are issued from a single thread in frame order. Binding state set by
/// `use_program`, `bind_vertex_array`, `set_matrix` and `bind_texture` persists
/// until it is overwritten, the same way it does on a GL-style context.
pub trait Gpu {
    fn create_vertex_array(
        &mut self,
        label: &str,
        streams: VertexStreams<'_>,
        indices: Option<IndexData<'_>>,
    ) -> VertexArrayHandle;

    fn create_texture(&mut self, label: &str, image: &RgbaImage, sampler: SamplerDesc)
    -> TextureHandle;

    fn create_sampler(&mut self, desc: SamplerDesc) -> SamplerHandle;

    /// Releases a vertex array. Stale handles are ignored.
    fn destroy_vertex_array(&mut self, vertex_array: VertexArrayHandle);

    /// Releases a texture and every binding made with it.
    fn destroy_texture(&mut self, texture: TextureHandle);

    fn destroy_sampler(&mut self, sampler: SamplerHandle);

    fn use_program(&mut self, program: Program);

    /// Clears colour and depth.
    fn clear(&mut self);

    fn bind_vertex_array(&mut self, vertex_array: VertexArrayHandle);

    fn set_matrix(&mut self, uniform: Uniform, matrix: &Matrix4<f32>);

    fn bind_texture(
        &mut self,
        uniform: Uniform,
        texture: TextureHandle,
        sampler: Option<SamplerHandle>,
    );

    fn draw_elements(&mut self, topology: Topology, count: u32, format: IndexFormat);

    fn draw_arrays(&mut self, topology: Topology, count: u32);
}
