//! Engine configuration.
//!
//! Every field has a default, so an empty JSON object is a valid config:
//!
//! ```json
//! {
//!   "asset_root": "assets",
//!   "scene": "scene.json",
//!   "imports": { "uris": ["models/monkey/monkey.gltf"] },
//!   "camera_discovery": "first_in_traversal",
//!   "renderer": { "clear_colour": [1.0, 1.0, 1.0, 1.0], "texture_policy": "fallback_to_default" }
//! }
//! ```

use std::path::PathBuf;

use anyhow::Context as _;
use serde::Deserialize;

use crate::{data_structures::scene_graph::CameraDiscovery, render::TexturePolicy};

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Every relative asset URI is resolved against this root.
    pub asset_root: PathBuf,
    /// The scene document to load on start-up.
    pub scene: String,
    pub imports: ImportConfig,
    pub camera_discovery: CameraDiscovery,
    pub renderer: RendererConfig,
    pub window_title: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            asset_root: PathBuf::from("assets"),
            scene: "scene.json".to_string(),
            imports: ImportConfig::default(),
            camera_discovery: CameraDiscovery::default(),
            renderer: RendererConfig::default(),
            window_title: "scene-ngin".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        serde_json::from_str(json).context("invalid engine config")
    }

    /// Reads a JSON config file from disk.
    #[cfg(not(target_arch = "wasm32"))]
    pub async fn load(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let json = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("cannot read config {}", path.display()))?;
        Self::from_json(&json)
    }
}

/// External asset files merged into the scene as fragments.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Imported one after another, in this order.
    pub uris: Vec<String>,
    /// Name of the scene object looked up after each import.
    pub scene_object: String,
    /// Name of the camera object looked up after each import.
    pub camera_object: String,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            uris: Vec::new(),
            scene_object: "Scene".to_string(),
            camera_object: "Camera".to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// RGBA, each channel in 0..=1.
    pub clear_colour: [f64; 4],
    /// Applies to both the primary and the imported-fragment path.
    pub texture_policy: TexturePolicy,
    /// Draw imported fragments after the primary scene each frame.
    pub render_fragments: bool,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            clear_colour: [1.0, 1.0, 1.0, 1.0],
            texture_policy: TexturePolicy::default(),
            render_fragments: true,
        }
    }
}
