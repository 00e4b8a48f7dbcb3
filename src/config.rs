//! Configuration
//!
//! Defaults, an optional JSON file, then `QUIZCORPUS_*` environment
//! overrides, applied in that order.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::corpus::retriever::RetrievalWindow;
use crate::documents::segmenter::MIN_SEGMENT_CHARS;
use crate::documents::spatial::{ProximityStrategy, DEFAULT_CAPTION_DISTANCE};

const APP_DIR_NAME: &str = "quizcorpus";
const ENV_PREFIX: &str = "QUIZCORPUS_";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

impl Serialize for ConfigError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// Root of the per-user data directory
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub paths: PathsConfig,
    pub extraction: ExtractionConfig,
    pub retrieval: RetrievalConfig,
    pub embedding: EmbeddingConfig,
    pub generation: GenerationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PathsConfig {
    /// Directory scanned at startup and watched for uploads
    pub documents_dir: PathBuf,
    /// Where extracted figures are written
    pub images_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        let root = default_data_dir();
        Self {
            documents_dir: root.join("pdfs"),
            images_dir: root.join("pdf_images"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExtractionConfig {
    pub min_segment_chars: usize,
    /// Drop segments whose normalized text already appeared in the document
    pub dedupe_segments: bool,
    pub caption_distance: f32,
    pub proximity: ProximityStrategy,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            min_segment_chars: MIN_SEGMENT_CHARS,
            dedupe_segments: false,
            caption_distance: DEFAULT_CAPTION_DISTANCE,
            proximity: ProximityStrategy::AxisGap,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetrievalConfig {
    pub window: RetrievalWindow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingBackend {
    #[default]
    Hashing,
    Http,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EmbeddingConfig {
    pub backend: EmbeddingBackend,
    pub base_url: String,
    pub model: String,
    /// Environment variable holding the bearer token
    pub api_key_env: String,
    pub timeout_secs: u64,
    pub max_retries: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::Hashing,
            base_url: "http://127.0.0.1:8080/v1".to_string(),
            model: "all-MiniLM-L6-v2".to_string(),
            api_key_env: "QUIZCORPUS_EMBEDDING_API_KEY".to_string(),
            timeout_secs: 30,
            max_retries: 3,
        }
    }
}

impl EmbeddingConfig {
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env).ok()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerationConfig {
    pub base_url: String,
    pub model: String,
    pub api_key_env: String,
    pub timeout_secs: u64,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Upper bound on questions per quiz request
    pub max_questions: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.groq.com/openai/v1".to_string(),
            model: "llama3-8b-8192".to_string(),
            api_key_env: "GROQ_API_KEY".to_string(),
            timeout_secs: 60,
            temperature: 0.7,
            max_tokens: 256,
            max_questions: 25,
        }
    }
}

impl GenerationConfig {
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env).ok()
    }
}

impl Config {
    /// Load from an optional JSON file, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let content = fs::read_to_string(path)?;
                debug!(path = %path.display(), "Loaded config file");
                serde_json::from_str(&content)?
            }
            None => Config::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `QUIZCORPUS_*` overrides from the given lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));

        if let Some(v) = get("DOCUMENTS_DIR") {
            self.paths.documents_dir = PathBuf::from(v);
        }
        if let Some(v) = get("IMAGES_DIR") {
            self.paths.images_dir = PathBuf::from(v);
        }
        if let Some(v) = get("DEDUPE_SEGMENTS") {
            self.extraction.dedupe_segments = parse_flag("DEDUPE_SEGMENTS", &v)?;
        }
        if let Some(v) = get("PROXIMITY") {
            self.extraction.proximity = match v.to_lowercase().as_str() {
                "axis_gap" => ProximityStrategy::AxisGap,
                "planar" => ProximityStrategy::Planar,
                _ => return Err(invalid("PROXIMITY", &v)),
            };
        }
        if let Some(v) = get("RETRIEVAL_WINDOW") {
            self.retrieval.window = match v.to_lowercase().as_str() {
                "widening" => RetrievalWindow::Widening,
                "fixed" => RetrievalWindow::Fixed,
                _ => return Err(invalid("RETRIEVAL_WINDOW", &v)),
            };
        }
        if let Some(v) = get("EMBEDDING_BACKEND") {
            self.embedding.backend = match v.to_lowercase().as_str() {
                "hashing" => EmbeddingBackend::Hashing,
                "http" => EmbeddingBackend::Http,
                _ => return Err(invalid("EMBEDDING_BACKEND", &v)),
            };
        }
        if let Some(v) = get("EMBEDDING_URL") {
            self.embedding.base_url = v;
        }
        if let Some(v) = get("EMBEDDING_MODEL") {
            self.embedding.model = v;
        }
        if let Some(v) = get("GENERATION_URL") {
            self.generation.base_url = v;
        }
        if let Some(v) = get("GENERATION_MODEL") {
            self.generation.model = v;
        }
        Ok(())
    }
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: format!("{}{}", ENV_PREFIX, key),
        value: value.to_string(),
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(key, value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.extraction.min_segment_chars, 50);
        assert_eq!(config.extraction.caption_distance, 100.0);
        assert!(!config.extraction.dedupe_segments);
        assert_eq!(config.retrieval.window, RetrievalWindow::Widening);
        assert_eq!(config.embedding.backend, EmbeddingBackend::Hashing);
        assert_eq!(config.generation.max_questions, 25);
        assert!(config.paths.images_dir.ends_with("pdf_images"));
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: Config = serde_json::from_str(
            r#"{"extraction": {"dedupeSegments": true}, "embedding": {"backend": "http"}}"#,
        )
        .unwrap();
        assert!(config.extraction.dedupe_segments);
        assert_eq!(config.extraction.min_segment_chars, 50);
        assert_eq!(config.embedding.backend, EmbeddingBackend::Http);
        assert_eq!(config.embedding.model, "all-MiniLM-L6-v2");
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("QUIZCORPUS_DOCUMENTS_DIR", "/tmp/docs"),
            ("QUIZCORPUS_DEDUPE_SEGMENTS", "yes"),
            ("QUIZCORPUS_PROXIMITY", "planar"),
            ("QUIZCORPUS_RETRIEVAL_WINDOW", "fixed"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.paths.documents_dir, PathBuf::from("/tmp/docs"));
        assert!(config.extraction.dedupe_segments);
        assert_eq!(config.extraction.proximity, ProximityStrategy::Planar);
        assert_eq!(config.retrieval.window, RetrievalWindow::Fixed);
    }

    #[test]
    fn test_invalid_override_is_error() {
        let mut config = Config::default();
        let result = config.apply_overrides(|k| {
            (k == "QUIZCORPUS_EMBEDDING_BACKEND").then(|| "quantum".to_string())
        });
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"generation": {"model": "custom-model"}}"#).unwrap();
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.generation.model, "custom-model");
    }
}
