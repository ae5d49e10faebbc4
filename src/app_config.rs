use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::document::reassembler::FitPolicy;
use crate::translation::batch::BatchLimits;

/// Application configuration module
/// This module handles the pipeline configuration including loading,
/// validating and saving configuration settings.
/// Represents the pipeline configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Translation config
    #[serde(default)]
    pub translation: TranslationConfig,

    /// Job lifecycle config
    #[serde(default)]
    pub job: JobConfig,

    /// Text fitting config for reassembly
    #[serde(default)]
    pub layout: LayoutConfig,

    /// Directory for the job database and artifact store.
    /// Defaults to the platform data directory when unset.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Translation provider type
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    // @provider: Ollama (local model server)
    #[default]
    Ollama,
    // @provider: OpenAI
    OpenAI,
    // @provider: Anthropic
    Anthropic,
    // @provider: in-process echo backend for tests and dry runs
    Mock,
}

impl ProviderKind {
    // @returns: Capitalized provider name
    pub fn display_name(&self) -> &str {
        match self {
            Self::Ollama => "Ollama",
            Self::OpenAI => "OpenAI",
            Self::Anthropic => "Anthropic",
            Self::Mock => "Mock",
        }
    }

    // @returns: Lowercase provider identifier
    pub fn to_lowercase_string(&self) -> String {
        match self {
            Self::Ollama => "ollama".to_string(),
            Self::OpenAI => "openai".to_string(),
            Self::Anthropic => "anthropic".to_string(),
            Self::Mock => "mock".to_string(),
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_lowercase_string())
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAI),
            "anthropic" => Ok(Self::Anthropic),
            "mock" => Ok(Self::Mock),
            _ => Err(anyhow!("Invalid provider type: {}", s)),
        }
    }
}

/// Provider configuration wrapper
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ProviderConfig {
    // @field: Provider type identifier
    #[serde(rename = "type")]
    pub provider_type: String,

    // @field: Model name
    #[serde(default = "String::new")]
    pub model: String,

    // @field: API key
    #[serde(default = "String::new")]
    pub api_key: String,

    // @field: Service URL
    #[serde(default = "String::new")]
    pub endpoint: String,

    // @field: Max units per request
    #[serde(default = "default_max_units_per_request")]
    pub max_units_per_request: usize,

    // @field: Max chars per request
    #[serde(default = "default_max_chars_per_request")]
    pub max_chars_per_request: usize,

    // @field: Timeout seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl ProviderConfig {
    // @param kind: Provider enum
    // @returns: Provider config with defaults
    pub fn new(kind: ProviderKind) -> Self {
        match kind {
            ProviderKind::Ollama => Self {
                provider_type: "ollama".to_string(),
                model: default_ollama_model(),
                api_key: String::new(),
                endpoint: default_ollama_endpoint(),
                max_units_per_request: default_max_units_per_request(),
                max_chars_per_request: default_max_chars_per_request(),
                timeout_secs: default_timeout_secs(),
            },
            ProviderKind::OpenAI => Self {
                provider_type: "openai".to_string(),
                model: default_openai_model(),
                api_key: String::new(),
                endpoint: String::new(),
                max_units_per_request: default_max_units_per_request(),
                max_chars_per_request: default_max_chars_per_request(),
                timeout_secs: default_timeout_secs(),
            },
            ProviderKind::Anthropic => Self {
                provider_type: "anthropic".to_string(),
                model: default_anthropic_model(),
                api_key: String::new(),
                endpoint: String::new(),
                max_units_per_request: default_max_units_per_request(),
                max_chars_per_request: default_anthropic_max_chars_per_request(),
                timeout_secs: default_anthropic_timeout_secs(),
            },
            ProviderKind::Mock => Self {
                provider_type: "mock".to_string(),
                model: "echo".to_string(),
                api_key: String::new(),
                endpoint: String::new(),
                max_units_per_request: default_max_units_per_request(),
                max_chars_per_request: default_max_chars_per_request(),
                timeout_secs: default_timeout_secs(),
            },
        }
    }

    /// Parse the provider type field
    pub fn kind(&self) -> Result<ProviderKind> {
        self.provider_type.parse()
    }

    /// Batch limits derived from this provider's capacity
    pub fn batch_limits(&self) -> BatchLimits {
        BatchLimits {
            max_units: self.max_units_per_request,
            max_chars: self.max_chars_per_request,
        }
    }
}

/// Translation service configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TranslationConfig {
    /// Default translation provider to use
    #[serde(default)]
    pub provider: ProviderKind,

    /// Available translation providers
    #[serde(default = "default_available_providers")]
    pub available_providers: Vec<ProviderConfig>,

    /// Temperature parameter for text generation (0.0 to 1.0)
    /// Lower values make output more deterministic
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            available_providers: default_available_providers(),
            temperature: default_temperature(),
        }
    }
}

impl TranslationConfig {
    /// Get the configuration for a specific provider
    pub fn provider_config(&self, kind: ProviderKind) -> Option<&ProviderConfig> {
        let kind_str = kind.to_lowercase_string();
        self.available_providers
            .iter()
            .find(|p| p.provider_type == kind_str)
    }

    /// Get the active provider configuration
    pub fn active_provider_config(&self) -> Option<&ProviderConfig> {
        self.provider_config(self.provider)
    }
}

/// Job lifecycle configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JobConfig {
    /// Maximum times a job may be claimed before it fails for good
    #[serde(default = "default_max_job_attempts")]
    pub max_attempts: i64,

    /// Maximum provider call attempts per batch within one job attempt
    #[serde(default = "default_max_provider_attempts")]
    pub max_provider_attempts: u32,

    /// Base backoff in milliseconds for provider retries, doubled per attempt
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Seconds a worker's claim on a job stays valid without a heartbeat
    #[serde(default = "default_lease_ttl_secs")]
    pub lease_ttl_secs: i64,

    /// Seconds between expired-lease sweeps
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Milliseconds a worker waits between empty queue polls
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_job_attempts(),
            max_provider_attempts: default_max_provider_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            lease_ttl_secs: default_lease_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

/// Text fitting configuration for reassembly
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LayoutConfig {
    /// Lowest font scale relative to the original size
    #[serde(default = "default_min_font_scale")]
    pub min_font_scale: f32,

    /// Line height as a multiple of font size
    #[serde(default = "default_line_height_factor")]
    pub line_height_factor: f32,

    /// Average glyph advance as a multiple of font size
    #[serde(default = "default_char_width_factor")]
    pub char_width_factor: f32,

    /// Maximum growth of a text box past its original bottom edge,
    /// as a fraction of the box height
    #[serde(default = "default_max_overflow_ratio")]
    pub max_overflow_ratio: f32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            min_font_scale: default_min_font_scale(),
            line_height_factor: default_line_height_factor(),
            char_width_factor: default_char_width_factor(),
            max_overflow_ratio: default_max_overflow_ratio(),
        }
    }
}

impl LayoutConfig {
    /// The fit policy used by the reassembler
    pub fn fit_policy(&self) -> FitPolicy {
        FitPolicy {
            min_font_scale: self.min_font_scale,
            line_height_factor: self.line_height_factor,
            char_width_factor: self.char_width_factor,
            max_overflow_ratio: self.max_overflow_ratio,
        }
    }
}

/// Log level for the application
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Convert to the log crate's level filter
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

impl Config {
    /// Load configuration from a JSON file, creating a default one if missing
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&content)
                .map_err(|e| anyhow!("Invalid config file {}: {}", path.display(), e))?;
            config.validate()?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save(path)?;
            Ok(config)
        }
    }

    /// Save configuration to a JSON file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), content)?;
        Ok(())
    }

    /// Validate the configuration for consistency and required values
    pub fn validate(&self) -> Result<()> {
        for provider in &self.translation.available_providers {
            let kind = provider.kind()?;

            // Hosted providers need credentials; local and mock do not.
            if matches!(kind, ProviderKind::OpenAI | ProviderKind::Anthropic)
                && provider.api_key.is_empty()
            {
                return Err(anyhow!(
                    "API key is required for the {} provider",
                    kind.display_name()
                ));
            }

            if !provider.endpoint.is_empty() {
                url::Url::parse(&provider.endpoint).map_err(|e| {
                    anyhow!(
                        "Invalid endpoint for {} provider: {}",
                        kind.display_name(),
                        e
                    )
                })?;
            }
        }

        if !(0.0..=2.0).contains(&self.translation.temperature) {
            return Err(anyhow!("temperature must be between 0.0 and 2.0"));
        }
        if self.layout.min_font_scale <= 0.0 || self.layout.min_font_scale > 1.0 {
            return Err(anyhow!("min_font_scale must be in (0.0, 1.0]"));
        }
        if self.layout.max_overflow_ratio < 0.0 {
            return Err(anyhow!("max_overflow_ratio must not be negative"));
        }
        if self.job.max_attempts < 1 {
            return Err(anyhow!("max_attempts must be at least 1"));
        }

        Ok(())
    }

    /// Resolve the data directory, defaulting to the platform data dir
    pub fn resolve_data_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.data_dir {
            return Ok(dir.clone());
        }
        let base = dirs::data_local_dir()
            .or_else(dirs::data_dir)
            .or_else(|| dirs::home_dir().map(|h| h.join(".local").join("share")))
            .ok_or_else(|| anyhow!("Could not determine data directory"))?;
        Ok(base.join("doctrans"))
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            translation: TranslationConfig::default(),
            job: JobConfig::default(),
            layout: LayoutConfig::default(),
            data_dir: None,
            log_level: LogLevel::default(),
        }
    }
}

fn default_available_providers() -> Vec<ProviderConfig> {
    vec![
        ProviderConfig::new(ProviderKind::Ollama),
        ProviderConfig::new(ProviderKind::OpenAI),
        ProviderConfig::new(ProviderKind::Anthropic),
        ProviderConfig::new(ProviderKind::Mock),
    ]
}

fn default_ollama_model() -> String {
    "llama3.2".to_string()
}

fn default_ollama_endpoint() -> String {
    "http://localhost:11434".to_string()
}

fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_anthropic_model() -> String {
    "claude-3-haiku-20240307".to_string()
}

fn default_max_units_per_request() -> usize {
    50
}

fn default_max_chars_per_request() -> usize {
    4000
}

fn default_anthropic_max_chars_per_request() -> usize {
    8000
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_anthropic_timeout_secs() -> u64 {
    120
}

fn default_temperature() -> f32 {
    0.3
}

fn default_max_job_attempts() -> i64 {
    3
}

fn default_max_provider_attempts() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    1000
}

fn default_lease_ttl_secs() -> i64 {
    300
}

fn default_sweep_interval_secs() -> u64 {
    30
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_min_font_scale() -> f32 {
    0.6
}

fn default_line_height_factor() -> f32 {
    1.3
}

fn default_char_width_factor() -> f32 {
    0.5
}

fn default_max_overflow_ratio() -> f32 {
    0.5
}
