//! Encoder and application configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{GifstreamError, GifstreamResult};

/// Global application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Default encoder settings.
    pub encoder: EncoderSettings,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Settings for one encoding session. Immutable once a session is open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderSettings {
    /// Resize frames to this width if set.
    pub width: Option<u32>,

    /// Resize frames to this height. Only honoured when `width` is set;
    /// aspect ratio is not preserved.
    pub height: Option<u32>,

    /// 1-100. The useful range is roughly 50-100.
    pub quality: u8,

    /// Loop the animation forever. `false` plays it once.
    #[serde(rename = "loop")]
    pub looping: bool,

    /// Trade quality for encode speed.
    pub fast: bool,

    /// Publish a progress event per completed frame. When enabled with
    /// [`ProgressDelivery::Blocking`] the progress stream must be drained.
    pub report_progress: bool,

    /// How progress events reach the consumer.
    pub progress_delivery: ProgressDelivery,
}

/// Delivery policy for progress events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ProgressDelivery {
    /// The engine worker waits until the consumer has taken each event.
    #[default]
    Blocking,
    /// Up to `capacity` events are queued; the worker blocks when full.
    Buffered { capacity: usize },
    /// Up to `capacity` events are queued; further events are dropped.
    Lossy { capacity: usize },
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "gifstream_session=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            width: None,
            height: None,
            quality: 90,
            looping: true,
            fast: false,
            report_progress: false,
            progress_delivery: ProgressDelivery::Blocking,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl EncoderSettings {
    /// Check the settings without creating an engine.
    ///
    /// Sessions do not call this; the engine itself refuses bad settings.
    pub fn validate(&self) -> GifstreamResult<()> {
        if !(1..=100).contains(&self.quality) {
            return Err(GifstreamError::config(format!(
                "quality must be within 1-100, got {}",
                self.quality
            )));
        }
        if self.width == Some(0) || self.height == Some(0) {
            return Err(GifstreamError::config("target dimensions must be non-zero"));
        }
        if self.height.is_some() && self.width.is_none() {
            tracing::warn!("height is ignored unless width is also set");
        }
        match self.progress_delivery {
            ProgressDelivery::Buffered { capacity: 0 } | ProgressDelivery::Lossy { capacity: 0 } => {
                Err(GifstreamError::config("progress buffer capacity must be non-zero"))
            }
            _ => Ok(()),
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        let config_path = config_file_path();
        if config_path.exists() {
            match Self::load_from(&config_path) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!("Failed to load config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Load and validate config from an explicit path.
    pub fn load_from(path: &Path) -> GifstreamResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.encoder.validate()?;
        Ok(config)
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        self.save_to(&config_file_path())
    }

    /// Save config to an explicit path.
    pub fn save_to(&self, path: &Path) -> Result<(), std::io::Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }
}

/// Standard config file location.
fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("gifstream").join("config.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = EncoderSettings::default();
        assert!(settings.validate().is_ok());
        assert!(settings.looping);
        assert!(!settings.report_progress);
    }

    #[test]
    fn test_quality_out_of_range_rejected() {
        let mut settings = EncoderSettings::default();
        settings.quality = 0;
        assert!(settings.validate().is_err());
        settings.quality = 101;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let mut settings = EncoderSettings::default();
        settings.progress_delivery = ProgressDelivery::Lossy { capacity: 0 };
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("capacity"));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let settings: EncoderSettings =
            serde_json::from_str(r#"{ "quality": 80, "loop": false }"#).unwrap();
        assert_eq!(settings.quality, 80);
        assert!(!settings.looping);
        assert_eq!(settings.progress_delivery, ProgressDelivery::Blocking);
    }

    #[test]
    fn test_save_and_load_from_path() {
        let dir = std::env::temp_dir().join("gifstream_test_config");
        let _ = std::fs::remove_dir_all(&dir);
        let path = dir.join("config.json");

        let mut config = AppConfig::default();
        config.encoder.quality = 70;
        config.encoder.progress_delivery = ProgressDelivery::Buffered { capacity: 4 };
        config.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded.encoder, config.encoder);

        std::fs::remove_dir_all(&dir).ok();
    }
}
