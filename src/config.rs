use anyhow::{bail, Result};
use config::{Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::gallery::DEFAULT_MAX_PHOTOS_PER_IDENTITY;
use crate::matcher::DEFAULT_THRESHOLD;

pub const DEFAULT_CONFIG_FILE: &str = "facegate.toml";
pub const ENV_PREFIX: &str = "FACEGATE";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub gallery: GalleryConfig,
    pub archive: ArchiveConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Directory served for any path not handled by the API.
    pub static_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GalleryConfig {
    pub encodings_file: PathBuf,
    /// Maximum face distance that still counts as a match. Lower is stricter.
    pub threshold: f64,
    pub max_photos_per_identity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    pub enabled: bool,
    pub faces_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 5000,
                static_dir: PathBuf::from("static"),
            },
            gallery: GalleryConfig {
                encodings_file: PathBuf::from("face_encodings.json"),
                threshold: DEFAULT_THRESHOLD,
                max_photos_per_identity: DEFAULT_MAX_PHOTOS_PER_IDENTITY,
            },
            archive: ArchiveConfig {
                enabled: true,
                faces_dir: PathBuf::from("faces_data"),
            },
        }
    }
}

impl Config {
    /// Defaults, then the file named by `FACEGATE_CONFIG` (or
    /// `facegate.toml` if present), then `FACEGATE__SECTION__KEY` variables.
    pub fn from_env() -> Result<Self> {
        let file = std::env::var("FACEGATE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE));
        let env = Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .try_parsing(true);
        Self::load(Some(&file), Some(env))
    }

    pub fn load(file: Option<&Path>, env: Option<Environment>) -> Result<Self> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Config::default())?);
        if let Some(path) = file {
            builder = builder.add_source(File::from(path).required(false));
        }
        if let Some(env) = env {
            builder = builder.add_source(env);
        }

        let config: Config = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.gallery.threshold.is_finite() || self.gallery.threshold <= 0.0 {
            bail!("gallery.threshold must be a positive number, got {}", self.gallery.threshold);
        }
        if self.gallery.max_photos_per_identity == 0 {
            bail!("gallery.max_photos_per_identity must be at least 1");
        }
        Ok(())
    }
}
