//! Engine configuration.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::print::{DocumentType, ExportOptions};
use crate::render::NOT_RECORDED;
use crate::store::DEFAULT_SETTINGS_KEY;
use crate::validation::{RepairMode, Validator};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid export settings: {0}")]
    Export(&'static str),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    #[serde(default = "default_settings_key")]
    pub settings_key: String,

    /// Text shown for empty record fields.
    #[serde(default = "default_placeholder")]
    pub placeholder: String,

    #[serde(default = "default_document_type")]
    pub document_type: DocumentType,

    /// Overrides the derived export file name (without extension).
    #[serde(default)]
    pub filename_stem: Option<String>,

    /// How out-of-range stored layouts are repaired on load.
    #[serde(default)]
    pub repair_mode: RepairMode,

    #[serde(default = "default_raster_scale")]
    pub raster_scale: f64,

    #[serde(default = "default_image_quality")]
    pub image_quality: f64,
}

fn default_settings_key() -> String { DEFAULT_SETTINGS_KEY.to_string() }
fn default_placeholder() -> String { NOT_RECORDED.to_string() }
fn default_document_type() -> DocumentType { DocumentType::IdentityCard }
fn default_raster_scale() -> f64 { 3.0 }
fn default_image_quality() -> f64 { 0.98 }

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            settings_key: default_settings_key(),
            placeholder: default_placeholder(),
            document_type: default_document_type(),
            filename_stem: None,
            repair_mode: RepairMode::default(),
            raster_scale: default_raster_scale(),
            image_quality: default_image_quality(),
        }
    }
}

impl EngineConfig {
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Export file name: the configured stem if any, else the derived name.
    pub fn filename_for(&self, subject: &str, count: usize) -> String {
        match self.filename_stem.as_deref().map(str::trim) {
            Some(stem) if !stem.is_empty() => format!("{stem}.pdf"),
            _ => crate::print::export_filename(self.document_type, subject, count),
        }
    }

    pub fn validator(&self) -> Validator {
        Validator::with_mode(self.repair_mode)
    }

    pub fn export_options(&self, subject: &str, count: usize) -> Result<ExportOptions, ConfigError> {
        ExportOptions::for_document(self.document_type, &self.filename_for(subject, count))
            .with_raster(self.raster_scale, self.image_quality)
            .map_err(ConfigError::Export)
    }
}
