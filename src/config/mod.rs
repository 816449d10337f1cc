//! Configuration management
//!
//! Values resolve with precedence env > TOML file > default. Provider
//! credentials are optional: a gateway whose key is missing is simply not
//! built and its pipeline stage reports itself unavailable.

pub mod file;

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::fallback::FallbackSynthesizer;
use crate::llm::{Generator, LanguageModel};
use crate::pipeline::{RetryPolicy, StagePolicies, VoicePipeline};
use crate::session::{RetentionPolicy, SessionStore};
use crate::voice::{
    SecondarySynthesizer, SpeechToText, Synthesizer, TextToSpeech, Transcriber, TranslateTts,
};
use crate::{Error, Result};

pub use file::VoxConfigFile;

/// Default API server port
pub const DEFAULT_PORT: u16 = 8000;

/// Default URL path the fallback directory is served under
pub const DEFAULT_FALLBACK_URL_PREFIX: &str = "/static/fallback";

/// Relay configuration
#[derive(Debug)]
pub struct Config {
    pub server: ServerConfig,
    pub providers: ProviderConfig,
    pub retry: StagePolicies,
    pub fallback: FallbackConfig,
    pub sessions: SessionConfig,
    pub api_keys: ApiKeys,
}

/// HTTP server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Speech-to-text backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SttProviderKind {
    AssemblyAi,
    Whisper,
}

impl FromStr for SttProviderKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "assemblyai" | "assembly" => Ok(Self::AssemblyAi),
            "whisper" | "openai" => Ok(Self::Whisper),
            other => Err(Error::Config(format!("unknown STT provider: {other}"))),
        }
    }
}

/// Language model backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProviderKind {
    Gemini,
    OpenAi,
}

impl FromStr for LlmProviderKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" | "google" => Ok(Self::Gemini),
            "openai" => Ok(Self::OpenAi),
            other => Err(Error::Config(format!("unknown LLM provider: {other}"))),
        }
    }
}

/// Provider selection, models and timeouts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub stt: SttProviderKind,
    pub stt_model: String,
    pub llm: LlmProviderKind,
    pub llm_model: String,
    /// Murf voice for replies
    pub voice: String,
    pub stt_timeout: Duration,
    pub llm_timeout: Duration,
    pub tts_timeout: Duration,
}

/// Fallback audio configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackConfig {
    pub dir: PathBuf,
    pub url_prefix: String,
    /// Murf voice for fallback renders
    pub voice: String,
    /// Secondary engine language
    pub language: String,
    pub secondary_enabled: bool,
    pub timeout: Duration,
}

/// Conversation session configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub context_window: usize,
    pub retention: RetentionPolicy,
}

/// API keys for external services
#[derive(Default)]
pub struct ApiKeys {
    pub assemblyai: Option<SecretString>,
    pub openai: Option<SecretString>,
    pub gemini: Option<SecretString>,
    pub murf: Option<SecretString>,
}

impl std::fmt::Debug for ApiKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeys")
            .field("assemblyai", &self.assemblyai.is_some())
            .field("openai", &self.openai.is_some())
            .field("gemini", &self.gemini.is_some())
            .field("murf", &self.murf.is_some())
            .finish()
    }
}

/// Return the data directory fallback audio is stored in
///
/// Uses `~/.local/share/vox/fallback/` on Linux
pub fn default_fallback_dir() -> PathBuf {
    directories::BaseDirs::new().map_or_else(
        || PathBuf::from("static/fallback"),
        |d| d.data_dir().join("vox").join("fallback"),
    )
}

impl Config {
    /// Load configuration from the environment and the config file
    ///
    /// An explicit `path` must exist and parse; the default path is
    /// optional and ignored when unreadable.
    ///
    /// # Errors
    ///
    /// Returns error if an explicit config file is invalid or a value
    /// cannot be parsed
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let fc = match path {
            Some(path) => file::read_config_file(path)?,
            None => file::load_config_file(),
        };
        Self::resolve(fc, |key| std::env::var(key).ok())
    }

    /// Merge a parsed config file with values from `env`
    ///
    /// # Errors
    ///
    /// Returns error if a provider name is unknown
    pub fn resolve(fc: VoxConfigFile, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let env = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let server = ServerConfig {
            host: env("VOX_HOST")
                .or(fc.server.host)
                .unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse(env("VOX_PORT"))
                .or_else(|| parse(env("PORT")))
                .or(fc.server.port)
                .unwrap_or(DEFAULT_PORT),
        };

        // Provider selection (env > toml > default)
        let stt = env("VOX_STT_PROVIDER")
            .or(fc.providers.stt)
            .map_or(Ok(SttProviderKind::AssemblyAi), |s| s.parse())?;
        let llm = env("VOX_LLM_PROVIDER")
            .or(fc.providers.llm)
            .map_or(Ok(LlmProviderKind::Gemini), |s| s.parse())?;
        let default_llm_model = match llm {
            LlmProviderKind::Gemini => "gemini-1.5-flash",
            LlmProviderKind::OpenAi => "gpt-4o-mini",
        };

        let voice = env("VOX_VOICE")
            .or(fc.providers.voice)
            .unwrap_or_else(|| crate::pipeline::DEFAULT_VOICE.to_string());

        let providers = ProviderConfig {
            stt,
            stt_model: fc
                .providers
                .stt_model
                .unwrap_or_else(|| "whisper-1".to_string()),
            llm,
            llm_model: env("VOX_LLM_MODEL")
                .or(fc.providers.llm_model)
                .unwrap_or_else(|| default_llm_model.to_string()),
            voice: voice.clone(),
            stt_timeout: Duration::from_secs(fc.providers.stt_timeout_secs.unwrap_or(60)),
            llm_timeout: Duration::from_secs(fc.providers.llm_timeout_secs.unwrap_or(30)),
            tts_timeout: Duration::from_secs(fc.providers.tts_timeout_secs.unwrap_or(30)),
        };

        let defaults = StagePolicies::default();
        let retry = StagePolicies {
            stt: retry_policy(fc.retry.stt, defaults.stt),
            llm: retry_policy(fc.retry.llm, defaults.llm),
            tts: retry_policy(fc.retry.tts, defaults.tts),
        };

        let fallback = FallbackConfig {
            dir: env("VOX_FALLBACK_DIR")
                .or(fc.fallback.dir)
                .map_or_else(default_fallback_dir, PathBuf::from),
            url_prefix: env("VOX_FALLBACK_URL_PREFIX")
                .or(fc.fallback.url_prefix)
                .unwrap_or_else(|| DEFAULT_FALLBACK_URL_PREFIX.to_string()),
            voice: fc.fallback.voice.unwrap_or(voice),
            language: fc.fallback.language.unwrap_or_else(|| "en".to_string()),
            secondary_enabled: fc.fallback.secondary_enabled.unwrap_or(true),
            timeout: Duration::from_secs(fc.fallback.timeout_secs.unwrap_or(15)),
        };

        let sessions = SessionConfig {
            context_window: parse(env("VOX_CONTEXT_WINDOW"))
                .or(fc.sessions.context_window)
                .unwrap_or(crate::context::DEFAULT_CONTEXT_WINDOW),
            retention: RetentionPolicy {
                max_sessions: fc.sessions.max_sessions,
                idle_ttl: fc.sessions.idle_ttl_secs.map(Duration::from_secs),
            },
        };

        // API keys (env > toml > None)
        let secret = |var: &str, file: Option<String>| {
            env(var)
                .or(file)
                .filter(|v| !v.trim().is_empty())
                .map(SecretString::from)
        };
        let api_keys = ApiKeys {
            assemblyai: secret("ASSEMBLYAI_API_KEY", fc.api_keys.assemblyai),
            openai: secret("OPENAI_API_KEY", fc.api_keys.openai),
            gemini: secret("GEMINI_API_KEY", fc.api_keys.gemini),
            murf: secret("MURF_API_KEY", fc.api_keys.murf),
        };

        Ok(Self {
            server,
            providers,
            retry,
            fallback,
            sessions,
            api_keys,
        })
    }

    /// Build the configured STT gateway, if its key is present
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn transcriber(&self) -> Result<Option<Arc<dyn Transcriber>>> {
        let p = &self.providers;
        let stt = match p.stt {
            SttProviderKind::AssemblyAi => self
                .api_keys
                .assemblyai
                .as_ref()
                .map(reveal)
                .map(|key| SpeechToText::new_assemblyai(key, p.stt_timeout))
                .transpose()?,
            SttProviderKind::Whisper => self
                .api_keys
                .openai
                .as_ref()
                .map(reveal)
                .map(|key| SpeechToText::new_whisper(key, p.stt_model.clone(), p.stt_timeout))
                .transpose()?,
        };

        if stt.is_none() {
            tracing::warn!(
                provider = ?p.stt,
                "STT API key missing, speech recognition unavailable"
            );
        }
        Ok(stt.map(|s| Arc::new(s) as Arc<dyn Transcriber>))
    }

    /// Build the configured LLM gateway, if its key is present
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn generator(&self) -> Result<Option<Arc<dyn Generator>>> {
        let p = &self.providers;
        let llm = match p.llm {
            LlmProviderKind::Gemini => self
                .api_keys
                .gemini
                .as_ref()
                .map(reveal)
                .map(|key| LanguageModel::new_gemini(key, p.llm_model.clone(), p.llm_timeout))
                .transpose()?,
            LlmProviderKind::OpenAi => self
                .api_keys
                .openai
                .as_ref()
                .map(reveal)
                .map(|key| LanguageModel::new_openai(key, p.llm_model.clone(), p.llm_timeout))
                .transpose()?,
        };

        if llm.is_none() {
            tracing::warn!(
                provider = ?p.llm,
                "LLM API key missing, replies will use fallback text"
            );
        }
        Ok(llm.map(|l| Arc::new(l) as Arc<dyn Generator>))
    }

    /// Build the primary TTS gateway, if its key is present
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn synthesizer(&self) -> Result<Option<Arc<dyn Synthesizer>>> {
        let tts = self
            .api_keys
            .murf
            .as_ref()
            .map(reveal)
            .map(|key| TextToSpeech::new_murf(key, self.providers.tts_timeout))
            .transpose()?;

        if tts.is_none() {
            tracing::warn!("MURF_API_KEY missing, replies will use fallback audio");
        }
        Ok(tts.map(|t| Arc::new(t) as Arc<dyn Synthesizer>))
    }

    /// Build the secondary speech engine, unless disabled
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn secondary_synthesizer(&self) -> Result<Option<Arc<dyn SecondarySynthesizer>>> {
        if !self.fallback.secondary_enabled {
            return Ok(None);
        }
        let engine = TranslateTts::new(self.fallback.language.clone(), self.fallback.timeout)?;
        Ok(Some(Arc::new(engine)))
    }

    /// Build the fallback synthesizer over the configured gateways
    ///
    /// # Errors
    ///
    /// Returns error if a gateway's HTTP client cannot be built
    pub fn fallback_synthesizer(&self) -> Result<FallbackSynthesizer> {
        self.fallback_over(self.synthesizer()?)
    }

    /// Fallback synthesizer whose primary tier reuses `tts`
    fn fallback_over(&self, tts: Option<Arc<dyn Synthesizer>>) -> Result<FallbackSynthesizer> {
        let primary = tts.map(|tts| (tts, self.fallback.voice.clone()));
        Ok(FallbackSynthesizer::from_gateways(
            self.fallback.dir.clone(),
            self.fallback.url_prefix.clone(),
            primary,
            self.secondary_synthesizer()?,
        ))
    }

    /// Assemble the full voice pipeline
    ///
    /// # Errors
    ///
    /// Returns error if a gateway's HTTP client cannot be built
    pub fn pipeline(&self) -> Result<VoicePipeline> {
        let tts = self.synthesizer()?;
        let fallback = Arc::new(self.fallback_over(tts.clone())?);
        let sessions = Arc::new(SessionStore::new(self.sessions.retention.clone()));

        let mut builder = VoicePipeline::builder(fallback, sessions)
            .policies(self.retry.clone())
            .voice(self.providers.voice.clone())
            .context_window(self.sessions.context_window);

        if let Some(stt) = self.transcriber()? {
            builder = builder.stt(stt);
        }
        if let Some(llm) = self.generator()? {
            builder = builder.llm(llm);
        }
        if let Some(tts) = tts {
            builder = builder.tts(tts);
        }

        Ok(builder.build())
    }
}

fn parse<T: FromStr>(value: Option<String>) -> Option<T> {
    value.and_then(|v| v.trim().parse().ok())
}

/// Copy a key for a gateway that takes ownership of it
fn reveal(key: &SecretString) -> SecretString {
    SecretString::from(key.expose_secret())
}

fn retry_policy(fc: file::StageRetryFileConfig, default: RetryPolicy) -> RetryPolicy {
    RetryPolicy {
        max_attempts: fc.max_attempts.unwrap_or(default.max_attempts),
        base_delay: fc
            .base_delay_ms
            .map_or(default.base_delay, Duration::from_millis),
        max_delay: fc
            .max_delay_ms
            .map_or(default.max_delay, Duration::from_millis),
    }
}
