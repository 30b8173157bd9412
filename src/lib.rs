//! scene-ngin
//!
//! A small scene-graph rendering engine for native and WASM targets. A scene is
//! described declaratively, built into a tree of typed nodes (plain transforms,
//! cameras and models), prepared once into GPU resources and then drawn every
//! frame by walking the tree with a matrix stack. External glTF files can be
//! imported next to the primary tree as fragments with their own camera.
//!
//! High-level modules
//! - `builder`: turns a scene description into a [`Scene`] and merges imports
//! - `config`: engine configuration
//! - `context`: the wgpu/winit implementation of the [`Gpu`] interface
//! - `data_structures`: scene graph, cameras, models and imported fragments
//! - `error`: typed build and render errors
//! - `flow`: application lifecycle and the winit event loop
//! - `gpu`: the GPU interface the renderer and importer are written against
//! - `pipelines`: render pipelines and shaders of the two programs
//! - `render`: preparing and drawing scenes
//! - `resources`: asset loading, scene documents and glTF import
//!

pub mod builder;
pub mod config;
pub mod context;
pub mod data_structures;
pub mod error;
pub mod flow;
pub mod gpu;
pub mod pipelines;
pub mod render;
pub mod resources;

// Re-exports commonly used types for convenience in downstream code.
pub use builder::{AssetImporter, SceneBuilder};
pub use config::EngineConfig;
pub use data_structures::scene_graph::{Node, NodeId, NodeKind, Scene};
pub use gpu::Gpu;
pub use render::Renderer;

pub use cgmath;
pub use winit::event::DeviceEvent;
pub use winit::event::WindowEvent;
