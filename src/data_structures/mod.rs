//! Engine data structures: the scene graph and the payloads hanging off it.
//!
//! - `scene_graph` holds the node arena, traversal and global transforms
//! - `camera` is the camera payload (projection and enabled state)
//! - `model` holds mesh data and the GPU handles created for it
//! - `transform` describes local transforms the way scene documents write them
//! - `fragment` holds hierarchies imported from external asset files
//! - `texture` wraps wgpu textures for the wgpu context

pub mod camera;
pub mod fragment;
pub mod model;
pub mod scene_graph;
pub mod texture;
pub mod transform;
