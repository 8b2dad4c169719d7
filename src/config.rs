use std::env;
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Main configuration structure for event_scout
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Completion backend used by the pipeline stages
    #[serde(default)]
    pub backend: BackendConfig,

    /// Events search service
    #[serde(default)]
    pub events: EventsConfig,

    /// Outbound HTTP settings
    #[serde(default)]
    pub network: NetworkConfig,

    /// Console output
    #[serde(default)]
    pub ui: UIConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAI,
    Groq,
    OpenRouter,
    Anthropic,
    Local,
}

impl ProviderKind {
    /// Environment variable holding this provider's API key, if it needs one.
    pub fn api_key_var(&self) -> Option<&'static str> {
        match self {
            ProviderKind::OpenAI => Some("OPENAI_API_KEY"),
            ProviderKind::Groq => Some("GROQ_API_KEY"),
            ProviderKind::OpenRouter => Some("OPENROUTER_API_KEY"),
            ProviderKind::Anthropic => Some("ANTHROPIC_API_KEY"),
            ProviderKind::Local => None,
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderKind::OpenAI => "gpt-4",
            ProviderKind::Groq => "llama-3.3-70b-versatile",
            ProviderKind::OpenRouter => "deepseek/deepseek-r1-0528-qwen3-8b",
            ProviderKind::Anthropic => "claude-sonnet-4-0",
            ProviderKind::Local => "echo",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProviderKind::OpenAI => "openai",
            ProviderKind::Groq => "groq",
            ProviderKind::OpenRouter => "openrouter",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Local => "local",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Which completion service to call
    #[serde(default = "default_provider")]
    pub provider: ProviderKind,

    /// Model to use; the provider's default when unset
    pub model: Option<String>,

    /// Temperature setting
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Output token limit per stage
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    /// Override for API-compatible services
    pub base_url: Option<String>,
}

impl BackendConfig {
    pub fn model_name(&self) -> String {
        self.model
            .clone()
            .unwrap_or_else(|| self.provider.default_model().to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    #[serde(default = "default_events_base_url")]
    pub base_url: String,

    #[serde(default = "default_events_path")]
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Per-request timeout in seconds for every outbound call
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl NetworkConfig {
    /// Shared HTTP client carrying the configured timeout.
    pub fn http_client(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()
            .context("Failed to build HTTP client")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UIConfig {
    /// Enable colorful output
    #[serde(default = "default_colorful")]
    pub colorful: bool,

    /// Show a spinner while the stages run
    #[serde(default = "default_spinner")]
    pub spinner: bool,
}

// Default value functions
fn default_provider() -> ProviderKind { ProviderKind::OpenAI }
fn default_temperature() -> f32 { 0.7 }
fn default_max_tokens() -> usize { 1024 }
fn default_events_base_url() -> String { "https://api.hasdata.com".to_string() }
fn default_events_path() -> String { "/scrape/google/events".to_string() }
fn default_timeout_secs() -> u64 { 30 }
fn default_colorful() -> bool { true }
fn default_spinner() -> bool { true }

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            base_url: None,
        }
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            base_url: default_events_base_url(),
            path: default_events_path(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self { timeout_secs: default_timeout_secs() }
    }
}

impl Default for UIConfig {
    fn default() -> Self {
        Self {
            colorful: default_colorful(),
            spinner: default_spinner(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))
    }

    /// Load configuration from command line argument or default locations
    pub fn load(config_path: &Option<String>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::from_file(shellexpand::tilde(path).as_ref());
        }

        let default_paths = [
            "event_scout.toml",
            ".event_scout.toml",
            "~/.config/event_scout/config.toml",
        ];

        for path in default_paths {
            let expanded_path = shellexpand::tilde(path);
            if Path::new(expanded_path.as_ref()).exists() {
                match Self::from_file(expanded_path.as_ref()) {
                    Ok(config) => return Ok(config),
                    Err(e) => log::warn!("Failed to load config from {}: {:#}", path, e),
                }
            }
        }

        Ok(Self::default())
    }

    /// Merge with command-line arguments (CLI args take precedence)
    pub fn merge_with_args(&mut self, headless: bool) {
        if headless {
            self.ui.colorful = false;
            self.ui.spinner = false;
        }
    }
}

/// API keys, read once at startup.
#[derive(Clone)]
pub struct Credentials {
    pub events_api_key: String,
    pub backend_api_key: Option<String>,
}

// Keys stay out of debug output.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("events_api_key", &"***")
            .field("backend_api_key", &self.backend_api_key.as_ref().map(|_| "***"))
            .finish()
    }
}

pub const EVENTS_API_KEY_VAR: &str = "HASDATA_API_KEY";

impl Credentials {
    /// Read the keys required by `backend` from the process environment.
    pub fn from_env(backend: &BackendConfig) -> Result<Self> {
        Self::from_lookup(backend, |name| env::var(name).ok())
    }

    pub fn from_lookup<F>(backend: &BackendConfig, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| anyhow!("{} environment variable not set", name))
        };

        let events_api_key = require(EVENTS_API_KEY_VAR)?;
        let backend_api_key = match backend.provider.api_key_var() {
            Some(name) => Some(require(name)?),
            None => None,
        };

        Ok(Self {
            events_api_key,
            backend_api_key,
        })
    }
}
