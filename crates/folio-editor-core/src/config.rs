//! Editor configuration.
//!
//! All tunables live here so hosts can override them from JSON. Every field
//! has a default matching the portfolio editor's stock behaviour.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ingest::IngestPolicy;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Policy for images added from the picker or replaced in place.
    pub insert_images: IngestPolicy,
    /// Policy for the project cover image.
    pub cover_images: IngestPolicy,
    pub padding: PaddingConfig,
    pub overlay: OverlayConfig,
    pub document: DocumentDefaults,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            insert_images: IngestPolicy::insert(),
            cover_images: IngestPolicy::cover(),
            padding: PaddingConfig::default(),
            overlay: OverlayConfig::default(),
            document: DocumentDefaults::default(),
        }
    }
}

impl EditorConfig {
    /// Parse a config from JSON. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Loads the configuration from the provided loader.
    pub async fn load(loader: &impl ConfigLoader) -> miette::Result<Self> {
        loader
            .load()
            .await
            .map_err(|e| miette::miette!("Failed to load editor configuration: {e}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaddingConfig {
    /// Minimum natural width for a block to accept padding.
    pub min_width_px: u32,
    /// Padding used when none has been chosen for a block yet.
    pub default_px: u32,
    /// Upper clamp for padding values.
    pub max_px: u32,
}

impl Default for PaddingConfig {
    fn default() -> Self {
        Self {
            min_width_px: 1100,
            default_px: 40,
            max_px: 400,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    /// Distance of the panel's top edge above the tracked content.
    pub anchor_offset_px: f64,
    /// Minimum distance kept between the panel and the viewport edges.
    pub viewport_margin_px: f64,
    /// Panel size assumed before the panel has been measured once.
    pub panel_width_px: f64,
    pub panel_height_px: f64,
    /// Quiet period after the last keystroke before tracking resumes.
    pub typing_quiet_ms: u64,
}

impl OverlayConfig {
    pub fn typing_quiet(&self) -> Duration {
        Duration::from_millis(self.typing_quiet_ms)
    }
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            anchor_offset_px: 12.0,
            viewport_margin_px: 8.0,
            panel_width_px: 220.0,
            panel_height_px: 48.0,
            typing_quiet_ms: 200,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentDefaults {
    pub background_color: String,
    pub content_gap_px: u32,
    pub max_content_gap_px: u32,
}

impl Default for DocumentDefaults {
    fn default() -> Self {
        Self {
            background_color: "#FFFFFF".to_owned(),
            content_gap_px: 10,
            max_content_gap_px: 100,
        }
    }
}

/// The trait for loading configuration data.
pub trait ConfigLoader {
    fn load(
        &self,
    ) -> impl Future<
        Output = core::result::Result<
            EditorConfig,
            Box<dyn std::error::Error + Send + Sync + 'static>,
        >,
    >;
}

/// A [`ConfigLoader`] that reads a JSON file.
pub struct JsonFileLoader {
    path: PathBuf,
}

impl JsonFileLoader {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl ConfigLoader for JsonFileLoader {
    async fn load(
        &self,
    ) -> core::result::Result<EditorConfig, Box<dyn std::error::Error + Send + Sync + 'static>>
    {
        match self.path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Ok(EditorConfig::from_json_str(&std::fs::read_to_string(
                &self.path,
            )?)?),
            _ => Err(format!("unsupported config format: {}", self.path.display()).into()),
        }
    }
}
