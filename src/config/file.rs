//! TOML configuration file loading
//!
//! Supports `~/.config/vox/config.toml` (or `$VOX_CONFIG`) as a persistent
//! config source. All fields are optional; the file is a partial overlay on
//! top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::Result;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct VoxConfigFile {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerFileConfig,

    /// Provider selection and models
    #[serde(default)]
    pub providers: ProvidersFileConfig,

    /// Per-stage retry budgets
    #[serde(default)]
    pub retry: RetryFileConfig,

    /// Fallback audio configuration
    #[serde(default)]
    pub fallback: FallbackFileConfig,

    /// Conversation session configuration
    #[serde(default)]
    pub sessions: SessionsFileConfig,

    /// API keys for external services
    #[serde(default)]
    pub api_keys: ApiKeysFileConfig,
}

#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    /// Bind address (e.g. "0.0.0.0")
    pub host: Option<String>,

    /// API server port
    pub port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProvidersFileConfig {
    /// STT provider ("assemblyai", "whisper")
    pub stt: Option<String>,

    /// STT model, used by Whisper (e.g. "whisper-1")
    pub stt_model: Option<String>,

    /// LLM provider ("gemini", "openai")
    pub llm: Option<String>,

    /// LLM model identifier (e.g. "gemini-1.5-flash")
    pub llm_model: Option<String>,

    /// Murf voice identifier (e.g. "en-US-natalie")
    pub voice: Option<String>,

    pub stt_timeout_secs: Option<u64>,
    pub llm_timeout_secs: Option<u64>,
    pub tts_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RetryFileConfig {
    #[serde(default)]
    pub stt: StageRetryFileConfig,

    #[serde(default)]
    pub llm: StageRetryFileConfig,

    #[serde(default)]
    pub tts: StageRetryFileConfig,
}

/// Retry budget for one stage
#[derive(Debug, Default, Deserialize)]
pub struct StageRetryFileConfig {
    /// Total attempts including the first
    pub max_attempts: Option<u32>,

    /// Delay before the first retry in milliseconds
    pub base_delay_ms: Option<u64>,

    /// Upper bound on any single delay in milliseconds
    pub max_delay_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FallbackFileConfig {
    /// Directory persisted fallback audio is written to
    pub dir: Option<String>,

    /// URL path the directory is served under (e.g. "/static/fallback")
    pub url_prefix: Option<String>,

    /// Voice used when the primary provider renders fallback audio
    pub voice: Option<String>,

    /// Language of the secondary speech engine (e.g. "en")
    pub language: Option<String>,

    /// Enable the secondary speech engine tier
    pub secondary_enabled: Option<bool>,

    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SessionsFileConfig {
    /// Messages of recent history sent to the LLM
    pub context_window: Option<usize>,

    /// Maximum number of sessions held in memory
    pub max_sessions: Option<usize>,

    /// Idle time after which a session is dropped
    pub idle_ttl_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ApiKeysFileConfig {
    pub assemblyai: Option<String>,
    pub openai: Option<String>,
    pub gemini: Option<String>,
    pub murf: Option<String>,
}

/// Read and parse a config file
///
/// # Errors
///
/// Returns error if the file cannot be read or is not valid TOML
pub fn read_config_file(path: &Path) -> Result<VoxConfigFile> {
    let content = std::fs::read_to_string(path)?;
    let config = toml::from_str(&content)?;
    tracing::info!(path = %path.display(), "loaded config file");
    Ok(config)
}

/// Load the TOML config file from the standard path
///
/// Returns `VoxConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> VoxConfigFile {
    let Some(path) = config_file_path() else {
        return VoxConfigFile::default();
    };

    if !path.exists() {
        return VoxConfigFile::default();
    }

    match read_config_file(&path) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to load config file, using defaults"
            );
            VoxConfigFile::default()
        }
    }
}

/// Return the config file path: `$VOX_CONFIG` or `~/.config/vox/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("VOX_CONFIG") {
        return Some(PathBuf::from(path));
    }

    directories::BaseDirs::new().map(|d| d.config_dir().join("vox").join("config.toml"))
}
