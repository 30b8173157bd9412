//! Error types of the scene core.
//!
//! Loading and importing assets report through `anyhow`; the two places where
//! callers need to branch on the failure (building a scene and rendering it)
//! use the typed enums below.

use thiserror::Error;

use crate::data_structures::scene_graph::NodeId;

/// A scene description could not be turned into a node tree.
///
/// `node` is the descriptor's position in the document, e.g. `nodes[1].children[0]`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("{node} references unknown mesh `{key}`")]
    UnknownMesh { node: String, key: String },

    #[error("{node} references unknown texture `{key}`")]
    UnknownTexture { node: String, key: String },

    #[error("{node} is a model but names no mesh")]
    MissingMesh { node: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    #[error("node {0:?} is not part of this scene")]
    UnknownNode(NodeId),

    #[error("node {0:?} is not a camera")]
    NotACamera(NodeId),

    #[error("the global transform of camera {0:?} cannot be inverted")]
    SingularTransform(NodeId),
}
