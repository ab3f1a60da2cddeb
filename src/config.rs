use serde::Deserialize;
use std::{fs, path::Path};
use tracing::info;

use crate::errors::ConfigError;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub inference: InferenceConfig,
    #[serde(default)]
    pub ocr: OcrConfig,
    #[serde(default)]
    pub export: ExportConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
    /// Key the line items are stored under.
    #[serde(default = "default_storage_key")]
    pub key: String,
}

fn default_db_path() -> String {
    "shipment/costing.db".to_string()
}

fn default_storage_key() -> String {
    "shipmentData".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            key: default_storage_key(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtractionConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_keep_warm_secs")]
    pub keep_warm_secs: u64,
}

fn default_endpoint() -> String {
    "http://127.0.0.1:3000/api/parse-ai".to_string()
}

fn default_keep_warm_secs() -> u64 {
    600
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            keep_warm_secs: default_keep_warm_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Hosted text-generation backend used by the parse endpoint.
/// The API token is read from `HUGGINGFACE_API_TOKEN`, never from the file.
#[derive(Debug, Clone, Deserialize)]
pub struct InferenceConfig {
    #[serde(default = "default_inference_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_new_tokens")]
    pub max_new_tokens: u32,
}

fn default_inference_url() -> String {
    "https://api-inference.huggingface.co/models".to_string()
}

fn default_model() -> String {
    "NousResearch/Llama-2-7b-chat-hf".to_string()
}

fn default_max_new_tokens() -> u32 {
    1024
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            base_url: default_inference_url(),
            model: default_model(),
            max_new_tokens: default_max_new_tokens(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OcrConfig {
    #[serde(default = "default_tesseract_bin")]
    pub tesseract_bin: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_close_delay_ms")]
    pub close_delay_ms: u64,
}

fn default_tesseract_bin() -> String {
    "tesseract".to_string()
}

fn default_language() -> String {
    "eng".to_string()
}

fn default_close_delay_ms() -> u64 {
    1500
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            tesseract_bin: default_tesseract_bin(),
            language: default_language(),
            close_delay_ms: default_close_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExportConfig {
    #[serde(default = "default_export_dir")]
    pub dir: String,
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,
}

fn default_export_dir() -> String {
    ".".to_string()
}

fn default_file_prefix() -> String {
    "MSI_Shipment_Costing".to_string()
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            dir: default_export_dir(),
            file_prefix: default_file_prefix(),
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Like [`Config::load`], but a missing file yields the defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            info!(path = %path.display(), "No config file found, using defaults");
            return Ok(Self::default());
        }
        Self::load(path)
    }
}
