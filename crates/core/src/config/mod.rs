//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (FOLIO_*)
//! 2. TOML config file (if FOLIO_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (FOLIO_*)
/// 2. TOML config file (if FOLIO_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Base of the content store holding imported page images.
    ///
    /// Set via FOLIO_CONTENT_DIR environment variable.
    #[serde(default = "default_content_dir")]
    pub content_dir: PathBuf,

    /// Base of the store holding secondary derivations (sizes, tiles, audio).
    ///
    /// Set via FOLIO_DERIVED_DIR environment variable.
    #[serde(default = "default_derived_dir")]
    pub derived_dir: PathBuf,

    /// Directory under which source documents are mirrored before import.
    ///
    /// Set via FOLIO_IMPORTS_DIR environment variable.
    #[serde(default = "default_imports_dir")]
    pub imports_dir: PathBuf,

    /// Path to SQLite metadata database.
    ///
    /// Set via FOLIO_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// ImageMagick `convert` executable.
    ///
    /// Set via FOLIO_IMAGE_MAGICK_PATH environment variable.
    #[serde(default = "default_image_magick_path")]
    pub image_magick_path: PathBuf,

    /// LAME mp3 encoder executable.
    ///
    /// Set via FOLIO_LAME_PATH environment variable.
    #[serde(default = "default_lame_path")]
    pub lame_path: PathBuf,

    /// Upper bound on a single external tool run, in milliseconds.
    ///
    /// Set via FOLIO_TRANSFORM_TIMEOUT_MS environment variable.
    #[serde(default = "default_transform_timeout_ms")]
    pub transform_timeout_ms: u64,

    /// JPEG quality passed to page image conversion.
    ///
    /// Set via FOLIO_JPEG_QUALITY environment variable.
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u32,

    /// Tile width used when pre-warming page tiles.
    #[serde(default = "default_tile_width")]
    pub tile_width: u32,

    /// Tile height used when pre-warming page tiles.
    #[serde(default = "default_tile_height")]
    pub tile_height: u32,

    /// How many pages of one document are derived at the same time.
    ///
    /// Set via FOLIO_PAGE_CONCURRENCY environment variable.
    #[serde(default = "default_page_concurrency")]
    pub page_concurrency: usize,
}

fn default_content_dir() -> PathBuf {
    PathBuf::from("content")
}

fn default_derived_dir() -> PathBuf {
    PathBuf::from("derived")
}

fn default_imports_dir() -> PathBuf {
    PathBuf::from("imports")
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./folio.sqlite")
}

fn default_image_magick_path() -> PathBuf {
    PathBuf::from("/usr/bin/convert")
}

fn default_lame_path() -> PathBuf {
    PathBuf::from("/usr/bin/lame")
}

fn default_transform_timeout_ms() -> u64 {
    120_000
}

fn default_jpeg_quality() -> u32 {
    80
}

fn default_tile_width() -> u32 {
    1024
}

fn default_tile_height() -> u32 {
    128
}

fn default_page_concurrency() -> usize {
    4
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            content_dir: default_content_dir(),
            derived_dir: default_derived_dir(),
            imports_dir: default_imports_dir(),
            db_path: default_db_path(),
            image_magick_path: default_image_magick_path(),
            lame_path: default_lame_path(),
            transform_timeout_ms: default_transform_timeout_ms(),
            jpeg_quality: default_jpeg_quality(),
            tile_width: default_tile_width(),
            tile_height: default_tile_height(),
            page_concurrency: default_page_concurrency(),
        }
    }
}

impl AppConfig {
    /// Tool timeout as Duration for use with tokio.
    pub fn transform_timeout(&self) -> Duration {
        Duration::from_millis(self.transform_timeout_ms)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `FOLIO_`
    /// 2. TOML file from `FOLIO_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("FOLIO_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("FOLIO_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
