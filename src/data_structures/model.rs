//! Renderable payload of a scene node: mesh data, its texture and, once the
//! renderer prepared it, the GPU handles created for both.

use std::sync::Arc;

use image::RgbaImage;
use serde::Deserialize;

use crate::gpu::{IndexData, TextureHandle, VertexArrayHandle, VertexStreams};

/// Triangle-list geometry with parallel attribute arrays and 16-bit indices.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct Mesh {
    #[serde(alias = "vertices")]
    pub positions: Vec<f32>,
    #[serde(default)]
    pub texcoords: Vec<f32>,
    #[serde(default)]
    pub normals: Vec<f32>,
    #[serde(default)]
    pub indices: Vec<u16>,
}

impl Mesh {
    pub fn streams(&self) -> VertexStreams<'_> {
        VertexStreams {
            positions: &self.positions,
            texcoords: &self.texcoords,
            normals: &self.normals,
        }
    }

    pub fn index_data(&self) -> IndexData<'_> {
        IndexData::U16(&self.indices)
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len() / 3
    }
}

/// GPU resources of a prepared model.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GpuModel {
    pub vertex_array: VertexArrayHandle,
    pub index_count: u32,
    pub texture: Option<TextureHandle>,
}

#[derive(Clone, Debug)]
pub struct Model {
    pub mesh: Arc<Mesh>,
    pub texture: Option<Arc<RgbaImage>>,
    gpu: Option<GpuModel>,
}

impl Model {
    pub fn new(mesh: Arc<Mesh>, texture: Option<Arc<RgbaImage>>) -> Self {
        Self {
            mesh,
            texture,
            gpu: None,
        }
    }

    /// `None` until the renderer prepared this model.
    pub fn gpu(&self) -> Option<&GpuModel> {
        self.gpu.as_ref()
    }

    pub fn is_prepared(&self) -> bool {
        self.gpu.is_some()
    }

    /// Stores the GPU handles. They are write-once: a second call is ignored
    /// and returns `false`.
    pub(crate) fn set_gpu(&mut self, gpu: GpuModel) -> bool {
        if self.gpu.is_some() {
            return false;
        }
        self.gpu = Some(gpu);
        true
    }
}
