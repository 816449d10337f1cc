//! Fallback audio for when the primary TTS stage cannot speak
//!
//! Synthesis degrades through an ordered list of tiers until one succeeds.
//! Audio produced by a tier is written to the fallback directory as
//! `{tier_prefix}_{content_key}.mp3`, so any later request for the same
//! text is answered from disk without a network call. When every tier
//! fails, the caller gets a client-side speech descriptor instead, which
//! cannot fail and is never cached.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use base64::Engine as _;
use serde::{Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::Result;
use crate::voice::{SecondarySynthesizer, Synthesizer};

/// Extension of every persisted fallback file
pub const FILE_EXTENSION: &str = "mp3";

/// URI scheme telling the client to speak the payload itself
pub const CLIENT_SPEECH_SCHEME: &str = "web-speech:";

/// File prefixes of the built-in tiers
///
/// The cache is probed for all of them, so audio persisted by a tier that
/// is no longer configured is still served.
const BUILTIN_PREFIXES: [&str; 2] = [PrimaryTier::PREFIX, SecondaryTier::PREFIX];

/// Where a response's audio can be found
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioReference {
    /// Audio hosted by the TTS provider
    Remote(String),
    /// Audio persisted in the fallback directory
    Cached {
        /// Location on disk
        path: PathBuf,
        /// Public URL path the file is served under
        url: String,
    },
    /// Base64-encoded text the client should speak locally
    ClientSpeech(String),
}

impl AudioReference {
    /// Client-side speech descriptor for `text`
    #[must_use]
    pub fn client_speech(text: &str) -> Self {
        Self::ClientSpeech(base64::engine::general_purpose::STANDARD.encode(text))
    }

    /// Whether the reference points at playable audio rather than text
    #[must_use]
    pub const fn is_audio(&self) -> bool {
        !matches!(self, Self::ClientSpeech(_))
    }
}

impl fmt::Display for AudioReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remote(url) | Self::Cached { url, .. } => f.write_str(url),
            Self::ClientSpeech(payload) => write!(f, "{CLIENT_SPEECH_SCHEME}{payload}"),
        }
    }
}

impl Serialize for AudioReference {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Deterministic cache key for fallback text
///
/// First 16 bytes of the SHA-256 digest, hex encoded.
#[must_use]
pub fn content_key(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(&hasher.finalize()[..16])
}

/// One synthesis strategy in the fallback cascade
#[async_trait]
pub trait FallbackTier: Send + Sync {
    /// File name prefix for audio produced by this tier
    fn prefix(&self) -> &'static str;

    /// Produce MP3 bytes for `text`
    ///
    /// # Errors
    ///
    /// Returns error if this tier cannot synthesize right now
    async fn render(&self, text: &str) -> Result<Vec<u8>>;
}

/// Tier backed by the primary TTS provider with a dedicated voice
pub struct PrimaryTier {
    tts: Arc<dyn Synthesizer>,
    voice: String,
}

impl PrimaryTier {
    pub const PREFIX: &'static str = "murf";

    #[must_use]
    pub fn new(tts: Arc<dyn Synthesizer>, voice: String) -> Self {
        Self { tts, voice }
    }
}

#[async_trait]
impl FallbackTier for PrimaryTier {
    fn prefix(&self) -> &'static str {
        Self::PREFIX
    }

    async fn render(&self, text: &str) -> Result<Vec<u8>> {
        let url = self.tts.synthesize(text, &self.voice).await?;
        self.tts.download(&url).await
    }
}

/// Tier backed by the independent secondary engine
pub struct SecondaryTier {
    engine: Arc<dyn SecondarySynthesizer>,
}

impl SecondaryTier {
    pub const PREFIX: &'static str = "gtts";

    #[must_use]
    pub fn new(engine: Arc<dyn SecondarySynthesizer>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl FallbackTier for SecondaryTier {
    fn prefix(&self) -> &'static str {
        Self::PREFIX
    }

    async fn render(&self, text: &str) -> Result<Vec<u8>> {
        self.engine.synthesize(text).await
    }
}

/// Produces speakable audio for any text, degrading tier by tier
pub struct FallbackSynthesizer {
    tiers: Vec<Box<dyn FallbackTier>>,
    dir: PathBuf,
    url_prefix: String,
}

impl fmt::Debug for FallbackSynthesizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FallbackSynthesizer")
            .field(
                "tiers",
                &self.tiers.iter().map(|t| t.prefix()).collect::<Vec<_>>(),
            )
            .field("dir", &self.dir)
            .field("url_prefix", &self.url_prefix)
            .finish()
    }
}

impl FallbackSynthesizer {
    /// Create a synthesizer with no tiers; add them with [`Self::with_tier`]
    ///
    /// Files go to `dir` and are referenced as `{url_prefix}/{file_name}`.
    pub fn new(dir: impl Into<PathBuf>, url_prefix: impl Into<String>) -> Self {
        Self {
            tiers: Vec::new(),
            dir: dir.into(),
            url_prefix: url_prefix.into().trim_end_matches('/').to_string(),
        }
    }

    /// Append a tier to the end of the cascade
    #[must_use]
    pub fn with_tier(mut self, tier: impl FallbackTier + 'static) -> Self {
        self.tiers.push(Box::new(tier));
        self
    }

    /// Build the standard cascade: primary provider, then secondary engine
    ///
    /// Tiers whose gateway is not configured are left out.
    pub fn from_gateways(
        dir: impl Into<PathBuf>,
        url_prefix: impl Into<String>,
        primary: Option<(Arc<dyn Synthesizer>, String)>,
        secondary: Option<Arc<dyn SecondarySynthesizer>>,
    ) -> Self {
        let mut synthesizer = Self::new(dir, url_prefix);
        if let Some((tts, voice)) = primary {
            synthesizer = synthesizer.with_tier(PrimaryTier::new(tts, voice));
        }
        if let Some(engine) = secondary {
            synthesizer = synthesizer.with_tier(SecondaryTier::new(engine));
        }
        synthesizer
    }

    /// Directory holding persisted fallback audio
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// URL path prefix fallback files are served under
    #[must_use]
    pub fn url_prefix(&self) -> &str {
        &self.url_prefix
    }

    /// Produce a usable audio reference for `text`
    ///
    /// Never fails: cached audio is returned first, then each tier is tried
    /// in order, and finally a client-side speech descriptor is returned.
    pub async fn synthesize(&self, text: &str) -> AudioReference {
        let key = content_key(text);

        if let Some(cached) = self.cached(&key).await {
            tracing::debug!(key = %key, "fallback audio cache hit");
            return cached;
        }

        for tier in &self.tiers {
            let prefix = tier.prefix();
            let audio = match tier.render(text).await {
                Ok(audio) => audio,
                Err(e) => {
                    tracing::warn!(tier = prefix, error = %e, "fallback tier failed, trying next");
                    continue;
                }
            };

            match self.persist(prefix, &key, &audio).await {
                Ok(reference) => {
                    tracing::info!(
                        tier = prefix,
                        key = %key,
                        bytes = audio.len(),
                        "fallback audio synthesized"
                    );
                    return reference;
                }
                Err(e) => {
                    tracing::warn!(tier = prefix, error = %e, "failed to persist fallback audio");
                }
            }
        }

        tracing::warn!(key = %key, "all fallback tiers failed, deferring to client speech");
        AudioReference::client_speech(text)
    }

    /// Look up previously persisted audio for a content key
    ///
    /// Configured tiers are probed in order, then any built-in prefix not
    /// among them.
    pub async fn cached(&self, key: &str) -> Option<AudioReference> {
        let configured: Vec<_> = self.tiers.iter().map(|tier| tier.prefix()).collect();
        let extra = BUILTIN_PREFIXES
            .into_iter()
            .filter(|prefix| !configured.contains(prefix));

        for prefix in configured.iter().copied().chain(extra) {
            let name = file_name(prefix, key);
            let path = self.dir.join(&name);
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                return Some(self.reference(path, &name));
            }
        }
        None
    }

    async fn persist(&self, prefix: &str, key: &str, audio: &[u8]) -> Result<AudioReference> {
        static WRITE_SEQ: AtomicU64 = AtomicU64::new(0);

        tokio::fs::create_dir_all(&self.dir).await?;

        let name = file_name(prefix, key);
        let path = self.dir.join(&name);
        // Write then rename so a concurrent cache probe never sees a partial file
        let tmp = self.dir.join(format!(
            ".{name}.{}.{}.tmp",
            std::process::id(),
            WRITE_SEQ.fetch_add(1, Ordering::Relaxed)
        ));
        tokio::fs::write(&tmp, audio).await?;
        tokio::fs::rename(&tmp, &path).await?;

        Ok(self.reference(path, &name))
    }

    fn reference(&self, path: PathBuf, name: &str) -> AudioReference {
        AudioReference::Cached {
            path,
            url: format!("{}/{name}", self.url_prefix),
        }
    }
}

fn file_name(prefix: &str, key: &str) -> String {
    format!("{prefix}_{key}.{FILE_EXTENSION}")
}
