//! Application configuration.
//!
//! Stored as a JSON document; unknown or missing sections fall back to
//! defaults so older config files keep working after upgrades.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::extract::ExternalExtractorConfig;
use crate::model::CategorySet;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    // Capture settings
    pub capture: CaptureSettings,

    // Extraction service settings
    pub extraction: ExtractionSettings,

    // Trade classification labels; empty means the CSI default set
    pub categories: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    /// BCP 47 language tag handed to the recognition backend
    pub language: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionSettings {
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            capture: CaptureSettings::default(),
            extraction: ExtractionSettings::default(),
            categories: Vec::new(),
        }
    }
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            language: "en-US".to_string(),
        }
    }
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        let base = ExternalExtractorConfig::default();
        Self {
            base_url: base.base_url,
            model: base.model,
            temperature: base.temperature,
            max_tokens: base.max_tokens,
        }
    }
}

impl AppConfig {
    /// Load configuration from a JSON file.
    ///
    /// A missing file means a fresh install; an unreadable one is logged.
    /// Both fall back to defaults rather than failing startup.
    pub fn load(path: &Path) -> Self {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(_) => return Self::default(),
        };

        match serde_json::from_str(&contents) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "failed to parse config {}: {}, using defaults",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Persist configuration as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// The configured category set, CSI divisions when none are listed.
    pub fn category_set(&self) -> CategorySet {
        if self.categories.is_empty() {
            CategorySet::csi_divisions()
        } else {
            CategorySet::new(self.categories.clone())
        }
    }
}

impl ExtractionSettings {
    /// Build the extraction client config, attaching the deployment's key.
    pub fn extractor_config(&self, api_key: Option<String>) -> ExternalExtractorConfig {
        ExternalExtractorConfig {
            base_url: self.base_url.clone(),
            api_key,
            model: self.model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let config = AppConfig::load(&dir.path().join("absent.json"));
        assert_eq!(config.capture.language, "en-US");
        assert!(config.category_set().contains("Division 09 - Finishes"));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = AppConfig::default();
        config.extraction.model = "local-extractor".to_string();
        config.categories = vec!["General".to_string(), "Electrical".to_string()];
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path);
        assert_eq!(loaded.extraction.model, "local-extractor");
        assert_eq!(loaded.category_set().labels().len(), 2);
    }

    #[test]
    fn test_unparsable_file_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();

        let config = AppConfig::load(&path);
        assert_eq!(config.extraction.temperature, 0.0);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"extraction":{"model":"tiny"}}"#).unwrap();

        let config = AppConfig::load(&path);
        assert_eq!(config.extraction.model, "tiny");
        assert_eq!(config.capture.language, "en-US");
        assert!(!config.extraction.base_url.is_empty());
    }
}
