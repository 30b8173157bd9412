//! Loading scene documents, images and external assets from disk or the web.
//!
//! Natively every URI is a path relative to the asset root and is read with
//! tokio. On wasm the asset root is joined onto the page origin and fetched.

use std::path::PathBuf;

#[cfg(not(target_arch = "wasm32"))]
use anyhow::Context as _;
use image::RgbaImage;

pub mod gltf;
pub mod scene;

#[derive(Clone, Debug)]
pub struct Assets {
    root: PathBuf,
}

impl Default for Assets {
    fn default() -> Self {
        Self::new("assets")
    }
}

impl Assets {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    /// Resolves `uri` relative to the directory of `base`, the way glTF buffers
    /// and images are addressed relative to their document.
    pub fn sibling(base: &str, uri: &str) -> String {
        match base.rfind('/') {
            Some(slash) => format!("{}/{}", &base[..slash], uri),
            None => uri.to_string(),
        }
    }

    #[cfg(target_arch = "wasm32")]
    fn format_url(&self, file_name: &str) -> anyhow::Result<reqwest::Url> {
        let window = web_sys::window().ok_or_else(|| anyhow::anyhow!("no window"))?;
        let origin = window
            .location()
            .origin()
            .map_err(|_| anyhow::anyhow!("page has no origin"))?;
        let base = reqwest::Url::parse(&format!("{}/{}/", origin, self.root.display()))?;
        Ok(base.join(file_name)?)
    }

    pub async fn load_string(&self, file_name: &str) -> anyhow::Result<String> {
        #[cfg(target_arch = "wasm32")]
        let txt = {
            let url = self.format_url(file_name)?;
            reqwest::get(url).await?.text().await?
        };
        #[cfg(not(target_arch = "wasm32"))]
        let txt = {
            let path = self.root.join(file_name);
            tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("cannot read {}", path.display()))?
        };

        Ok(txt)
    }

    pub async fn load_binary(&self, file_name: &str) -> anyhow::Result<Vec<u8>> {
        #[cfg(target_arch = "wasm32")]
        let data = {
            let url = self.format_url(file_name)?;
            reqwest::get(url).await?.bytes().await?.to_vec()
        };
        #[cfg(not(target_arch = "wasm32"))]
        let data = {
            let path = self.root.join(file_name);
            tokio::fs::read(&path)
                .await
                .with_context(|| format!("cannot read {}", path.display()))?
        };

        Ok(data)
    }

    /// Decodes any format the `image` crate knows into RGBA8.
    pub async fn load_image(&self, file_name: &str) -> anyhow::Result<RgbaImage> {
        let data = self.load_binary(file_name).await?;
        decode_image(&data, None)
    }
}

/// Decodes encoded image bytes, using `mime_type` as a format hint when given.
pub fn decode_image(bytes: &[u8], mime_type: Option<&str>) -> anyhow::Result<RgbaImage> {
    let format = mime_type.and_then(image::ImageFormat::from_mime_type);
    let img = match format {
        Some(format) => image::load_from_memory_with_format(bytes, format)?,
        None => image::load_from_memory(bytes)?,
    };
    Ok(img.to_rgba8())
}
