use serde::Deserialize;
use std::time::Duration;

/// Application configuration loaded from environment variables
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// TMDB API key; requests fail with a configuration error while unset
    #[serde(default)]
    pub tmdb_api_key: Option<String>,

    /// TMDB API base URL
    #[serde(default = "default_tmdb_api_url")]
    pub tmdb_api_url: String,

    /// API key for the OpenAI-compatible inference endpoint
    #[serde(default)]
    pub inference_api_key: Option<String>,

    /// Inference API base URL
    #[serde(default = "default_inference_api_url")]
    pub inference_api_url: String,

    /// Model used for search-term extraction and index selection
    #[serde(default = "default_selection_model")]
    pub selection_model: String,

    /// Model used to stream the narration
    #[serde(default = "default_narration_model")]
    pub narration_model: String,

    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_catalog_timeout_secs")]
    pub catalog_timeout_secs: u64,

    #[serde(default = "default_inference_timeout_secs")]
    pub inference_timeout_secs: u64,

    /// Longest gap tolerated between two narration chunks
    #[serde(default = "default_narration_idle_timeout_secs")]
    pub narration_idle_timeout_secs: u64,

    /// Recommendation requests allowed per client per minute
    #[serde(default = "default_rate_limit_per_minute")]
    pub rate_limit_per_minute: u32,

    /// Interval between sweeps of idle rate-limit entries
    #[serde(default = "default_rate_limit_sweep_secs")]
    pub rate_limit_sweep_secs: u64,

    /// Key clients by `x-forwarded-for` / `x-real-ip`; only safe behind a
    /// proxy that overwrites those headers
    #[serde(default)]
    pub trust_proxy_headers: bool,
}

fn default_tmdb_api_url() -> String {
    "https://api.themoviedb.org/3".to_string()
}

fn default_inference_api_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_selection_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_narration_model() -> String {
    "gpt-4o".to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_catalog_timeout_secs() -> u64 {
    10
}

fn default_inference_timeout_secs() -> u64 {
    30
}

fn default_narration_idle_timeout_secs() -> u64 {
    30
}

fn default_rate_limit_per_minute() -> u32 {
    10
}

fn default_rate_limit_sweep_secs() -> u64 {
    300
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tmdb_api_key: None,
            tmdb_api_url: default_tmdb_api_url(),
            inference_api_key: None,
            inference_api_url: default_inference_api_url(),
            selection_model: default_selection_model(),
            narration_model: default_narration_model(),
            host: default_host(),
            port: default_port(),
            catalog_timeout_secs: default_catalog_timeout_secs(),
            inference_timeout_secs: default_inference_timeout_secs(),
            narration_idle_timeout_secs: default_narration_idle_timeout_secs(),
            rate_limit_per_minute: default_rate_limit_per_minute(),
            rate_limit_sweep_secs: default_rate_limit_sweep_secs(),
            trust_proxy_headers: false,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        envy::from_env::<Config>().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
    }

    /// Names of the upstream credentials that are missing or blank
    pub fn missing_credentials(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if is_blank(&self.tmdb_api_key) {
            missing.push("TMDB_API_KEY");
        }
        if is_blank(&self.inference_api_key) {
            missing.push("INFERENCE_API_KEY");
        }
        missing
    }

    pub fn catalog_timeout(&self) -> Duration {
        Duration::from_secs(self.catalog_timeout_secs)
    }

    pub fn inference_timeout(&self) -> Duration {
        Duration::from_secs(self.inference_timeout_secs)
    }

    pub fn narration_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.narration_idle_timeout_secs)
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}
