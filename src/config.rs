// src/config.rs

//! Configuration for the direct display backend.
//!
//! Every struct derives `Deserialize` with `#[serde(default)]`, so a config
//! file only needs to mention the settings it changes:
//!
//! ```json
//! { "display": { "card_index": 0, "pixel_format": "AR24", "vsync_timeout_ms": 100 } }
//! ```

use crate::display::types::{FourCc, UsageFlags};
use anyhow::{Context, Result};
use log::info;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Root of the configuration file.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Output device and presentation settings.
    pub display: DisplayConfig,
}

/// Which card to drive and how to present on it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DisplayConfig {
    /// Index N of `/dev/dri/cardN`.
    pub card_index: u32,
    /// Pixel format of the presentable surface, as a DRM FourCC ("XR24").
    pub pixel_format: FourCc,
    /// Usage flags for the surface. Scan-out is always added.
    pub usage: UsageFlags,
    /// Present at vertical blank rather than immediately.
    pub vsync: bool,
    /// Upper bound on a vsync wait. Absent means wait indefinitely.
    pub vsync_timeout_ms: Option<u64>,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        DisplayConfig {
            card_index: 1,
            pixel_format: FourCc::XRGB8888,
            usage: UsageFlags::RENDERING,
            vsync: true,
            vsync_timeout_ms: None,
        }
    }
}

impl DisplayConfig {
    pub fn vsync_timeout(&self) -> Option<Duration> {
        self.vsync_timeout_ms.map(Duration::from_millis)
    }
}

impl Config {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("Failed to parse configuration JSON")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = Self::from_json(&text)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Loads `path` when given, otherwise returns the defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => {
                info!("No config file given, using defaults");
                Ok(Self::default())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_stock_setup() {
        let config = Config::default();
        assert_eq!(config.display.card_index, 1);
        assert_eq!(config.display.pixel_format, FourCc::XRGB8888);
        assert_eq!(config.display.usage, UsageFlags::RENDERING);
        assert!(config.display.vsync);
        assert_eq!(config.display.vsync_timeout(), None);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config =
            Config::from_json(r#"{ "display": { "card_index": 0, "vsync_timeout_ms": 100 } }"#)
                .unwrap();
        assert_eq!(config.display.card_index, 0);
        assert_eq!(config.display.vsync_timeout(), Some(Duration::from_millis(100)));
        assert_eq!(config.display.pixel_format, FourCc::XRGB8888);
        assert!(config.display.vsync);
    }

    #[test]
    fn parses_format_and_usage_names() {
        let json = r#"{
            "display": { "pixel_format": "AR24", "usage": "RENDERING | LINEAR", "vsync": false }
        }"#;
        let config = Config::from_json(json).unwrap();
        assert_eq!(config.display.pixel_format, FourCc::ARGB8888);
        assert_eq!(config.display.usage, UsageFlags::RENDERING | UsageFlags::LINEAR);
        assert!(!config.display.vsync);
    }

    #[test]
    fn rejects_bad_format_code() {
        assert!(Config::from_json(r#"{ "display": { "pixel_format": "NOTAFORMAT" } }"#).is_err());
    }

    #[test]
    fn empty_object_is_all_defaults() {
        assert_eq!(Config::from_json("{}").unwrap(), Config::default());
    }

    #[test]
    fn missing_file_is_an_error_with_context() {
        let err = Config::load(Path::new("/nonexistent/kms-display.json")).unwrap_err();
        assert!(format!("{:#}", err).contains("/nonexistent/kms-display.json"));
    }
}
