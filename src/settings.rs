use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, str::FromStr, time::Duration};

use crate::cache::CacheConfig;
use crate::explanation::gemini::{GeminiConfig, DEFAULT_ENDPOINT};
use crate::explanation::prompt::DEFAULT_CONTEXT_HINT;
use crate::pipeline::PipelineOptions;

const ENABLE_LOGS: bool = true;

use crate::log_warn;

pub const CONFIG_PATH_ENV: &str = "CLASSSIGHT_CONFIG";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub enabled: bool,
    pub ttl_secs: u64,
    pub max_entries: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 3600,
            max_entries: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrSettings {
    pub language: String,
    pub binary: String,
    pub max_dimension: u32,
    pub timeout_secs: u64,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            language: "eng".into(),
            binary: "tesseract".into(),
            max_dimension: 1024,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiSettings {
    #[serde(skip_serializing)]
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    pub endpoint: String,
    pub context_hint: String,
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "gemini-flash-latest".into(),
            temperature: 0.7,
            max_tokens: 1024,
            timeout_secs: 30,
            endpoint: DEFAULT_ENDPOINT.into(),
            context_hint: DEFAULT_CONTEXT_HINT.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitSettings {
    pub max_frame_bytes: usize,
    pub max_text_length: usize,
}

impl Default for LimitSettings {
    fn default() -> Self {
        Self {
            max_frame_bytes: 10 * 1024 * 1024,
            max_text_length: 50_000,
        }
    }
}

/// Process configuration: defaults, then an optional JSON file named by
/// `CLASSSIGHT_CONFIG`, then environment overrides. Immutable once loaded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerSettings,
    pub cache: CacheSettings,
    pub ocr: OcrSettings,
    pub ai: AiSettings,
    pub limits: LimitSettings,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) if !path.trim().is_empty() => Self::from_path(Path::new(path.trim()))?,
            _ => Self::default(),
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(host) = env_string("HOST") {
            self.server.host = host;
        }
        if let Some(port) = env_parse("PORT")? {
            self.server.port = port;
        }
        if let Some(key) = env_string("GEMINI_API_KEY") {
            self.ai.api_key = key;
        }
        if let Some(model) = env_string("AI_MODEL") {
            self.ai.model = model;
        }
        if let Some(temperature) = env_parse("AI_TEMPERATURE")? {
            self.ai.temperature = temperature;
        }
        if let Some(max_tokens) = env_parse("AI_MAX_TOKENS")? {
            self.ai.max_tokens = max_tokens;
        }
        if let Some(timeout) = env_parse("AI_TIMEOUT_SECS")? {
            self.ai.timeout_secs = timeout;
        }
        if let Some(language) = env_string("OCR_LANGUAGE") {
            self.ocr.language = language;
        }
        if let Some(binary) = env_string("OCR_BINARY") {
            self.ocr.binary = binary;
        }
        if let Some(max_dimension) = env_parse("OCR_MAX_DIMENSION")? {
            self.ocr.max_dimension = max_dimension;
        }
        if let Some(timeout) = env_parse("OCR_TIMEOUT_SECS")? {
            self.ocr.timeout_secs = timeout;
        }
        if let Some(enabled) = env_bool("CACHE_ENABLED")? {
            self.cache.enabled = enabled;
        }
        if let Some(ttl) = env_parse("CACHE_TTL")? {
            self.cache.ttl_secs = ttl;
        }
        if let Some(max_entries) = env_parse("CACHE_MAX_SIZE")? {
            self.cache.max_entries = max_entries;
        }
        if let Some(max_frame) = env_parse("MAX_UPLOAD_SIZE")? {
            self.limits.max_frame_bytes = max_frame;
        }
        if let Some(max_text) = env_parse("MAX_TEXT_LENGTH")? {
            self.limits.max_text_length = max_text;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            bail!("port must be greater than zero");
        }
        if self.cache.ttl_secs == 0 {
            bail!("cache TTL must be greater than zero");
        }
        if self.cache.max_entries == 0 {
            bail!("cache max size must be greater than zero");
        }
        if self.limits.max_frame_bytes == 0 || self.limits.max_text_length == 0 {
            bail!("upload and text limits must be greater than zero");
        }
        if self.ocr.max_dimension == 0 {
            bail!("OCR max dimension must be greater than zero");
        }
        if self.ocr.timeout_secs == 0 {
            bail!("OCR timeout must be greater than zero");
        }
        if !(0.0..=2.0).contains(&self.ai.temperature) {
            bail!("AI temperature must be between 0 and 2, got {}", self.ai.temperature);
        }
        if self.ai.api_key.trim().is_empty() {
            log_warn!("GEMINI_API_KEY is not set; explanations will be unavailable");
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            enabled: self.cache.enabled,
            ttl: Duration::from_secs(self.cache.ttl_secs),
            max_entries: self.cache.max_entries,
        }
    }

    pub fn gemini_config(&self) -> GeminiConfig {
        GeminiConfig {
            api_key: self.ai.api_key.clone(),
            model: self.ai.model.clone(),
            temperature: self.ai.temperature,
            max_output_tokens: self.ai.max_tokens,
            timeout: Duration::from_secs(self.ai.timeout_secs),
            endpoint: self.ai.endpoint.clone(),
        }
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            max_text_length: self.limits.max_text_length,
            context_hint: self.ai.context_hint.clone(),
        }
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_parse<T: FromStr>(key: &str) -> Result<Option<T>> {
    match env_string(key) {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| anyhow!("{key} has an invalid value: {raw:?}")),
        None => Ok(None),
    }
}

fn env_bool(key: &str) -> Result<Option<bool>> {
    match env_string(key).map(|raw| raw.to_ascii_lowercase()) {
        Some(raw) => match raw.as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => Err(anyhow!("{key} must be true or false, got {raw:?}")),
        },
        None => Ok(None),
    }
}
