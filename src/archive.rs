use anyhow::Result;
use chrono::Local;
use image::{DynamicImage, ImageFormat};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Keeps the original registration photos, one folder per identity.
pub struct PhotoArchive {
    root: PathBuf,
}

impl PhotoArchive {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn ensure_root(&self) -> Result<()> {
        if !self.root.exists() {
            fs::create_dir_all(&self.root).await?;
            info!("Created photo archive directory: {:?}", self.root);
        }
        Ok(())
    }

    pub fn identity_dir(&self, name: &str) -> PathBuf {
        self.root.join(folder_name(name))
    }

    /// Saves `image` as `<name>_photo_<n>_<timestamp>.jpg` under the
    /// identity's folder.
    pub async fn store(&self, name: &str, photo_number: usize, image: DynamicImage) -> Result<PathBuf> {
        let dir = self.identity_dir(name);
        fs::create_dir_all(&dir).await?;

        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        let filename = format!("{}_photo_{}_{}.jpg", folder_name(name), photo_number, timestamp);
        let path = dir.join(filename);

        let target = path.clone();
        tokio::task::spawn_blocking(move || {
            DynamicImage::ImageRgb8(image.to_rgb8()).save_with_format(&target, ImageFormat::Jpeg)
        })
        .await??;

        debug!("Archived photo for {}: {:?}", name, path);
        Ok(path)
    }

    pub async fn remove_identity(&self, name: &str) -> Result<()> {
        let dir = self.identity_dir(name);
        if dir.exists() {
            fs::remove_dir_all(&dir).await?;
            info!("Removed archived photos for {}", name);
        }
        Ok(())
    }

    /// Deletes every archived photo and recreates an empty root.
    pub async fn clear(&self) -> Result<()> {
        if self.root.exists() {
            fs::remove_dir_all(&self.root).await?;
        }
        fs::create_dir_all(&self.root).await?;
        info!("Cleared photo archive at {:?}", self.root);
        Ok(())
    }
}

/// Maps an identity name to a single safe path component.
///
/// Names that had to be rewritten get a short digest of the original name
/// appended, so "a b" and "a_b" land in different folders.
fn folder_name(name: &str) -> String {
    let trimmed = name.trim();
    let cleaned: String = trimmed
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    let base = if cleaned.is_empty() || cleaned.chars().all(|c| c == '_') {
        "_unnamed".to_string()
    } else {
        cleaned
    };
    if base == trimmed {
        return base;
    }

    let digest = Sha256::digest(trimmed.as_bytes());
    format!("{}_{}", base, &hex::encode(digest)[..8])
}
