//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `transform_timeout_ms` is less than 100ms or exceeds one hour
    /// - `jpeg_quality` is outside 1..=100
    /// - a tile dimension is 0
    /// - `page_concurrency` is outside 1..=64
    /// - any store directory is empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.transform_timeout_ms < 100 {
            return Err(ConfigError::Invalid {
                field: "transform_timeout_ms".into(),
                reason: "must be at least 100ms".into(),
            });
        }
        if self.transform_timeout_ms > 3_600_000 {
            return Err(ConfigError::Invalid {
                field: "transform_timeout_ms".into(),
                reason: "must not exceed 1 hour (3600000ms)".into(),
            });
        }

        if self.jpeg_quality == 0 || self.jpeg_quality > 100 {
            return Err(ConfigError::Invalid { field: "jpeg_quality".into(), reason: "must be within 1..=100".into() });
        }

        if self.tile_width == 0 {
            return Err(ConfigError::Invalid { field: "tile_width".into(), reason: "must be greater than 0".into() });
        }
        if self.tile_height == 0 {
            return Err(ConfigError::Invalid { field: "tile_height".into(), reason: "must be greater than 0".into() });
        }

        if self.page_concurrency == 0 || self.page_concurrency > 64 {
            return Err(ConfigError::Invalid {
                field: "page_concurrency".into(),
                reason: "must be within 1..=64".into(),
            });
        }

        for (field, dir) in [
            ("content_dir", &self.content_dir),
            ("derived_dir", &self.derived_dir),
            ("imports_dir", &self.imports_dir),
        ] {
            if dir.as_os_str().is_empty() {
                return Err(ConfigError::Invalid { field: field.into(), reason: "must not be empty".into() });
            }
        }

        if self.content_dir == self.derived_dir {
            tracing::warn!(
                dir = %self.content_dir.display(),
                "content_dir and derived_dir are the same directory; \
                 page images and secondary derivations will share one tree"
            );
        }

        Ok(())
    }
}
