//! Speech provider gateways
//!
//! Each gateway wraps a single remote capability behind a trait so the
//! pipeline can run against real providers or test doubles alike.

mod secondary;
mod stt;
mod tts;

pub use secondary::{TranslateTts, chunk_text};
pub use stt::{SpeechToText, guess_audio_format};
pub use tts::TextToSpeech;

use std::str::FromStr;

use async_trait::async_trait;
use serde::Serialize;

use crate::{Error, Result};

/// Audio container requested from the remote synthesizer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AudioFormat {
    #[default]
    Mp3,
    Wav,
    Flac,
    Ogg,
}

impl AudioFormat {
    /// Name on the wire
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Mp3 => "MP3",
            Self::Wav => "WAV",
            Self::Flac => "FLAC",
            Self::Ogg => "OGG",
        }
    }
}

impl FromStr for AudioFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "MP3" => Ok(Self::Mp3),
            "WAV" => Ok(Self::Wav),
            "FLAC" => Ok(Self::Flac),
            "OGG" => Ok(Self::Ogg),
            other => Err(Error::Input(format!("unsupported audio format: {other}"))),
        }
    }
}

/// Text recognized from an audio clip
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transcription {
    pub text: String,
    /// Length of the submitted audio in seconds
    pub duration_secs: f64,
    /// Provider confidence in `0.0..=1.0`, when reported
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

/// Speech-to-text gateway
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe an uploaded audio clip
    ///
    /// # Errors
    ///
    /// Returns error if the provider is unreachable or rejects the audio
    async fn transcribe(&self, audio: &[u8]) -> Result<Transcription>;

    /// Provider name for logging
    fn name(&self) -> &'static str;
}

/// Remote text-to-speech gateway producing hosted audio
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Synthesize `text` with `voice` as `format`, returning a URL to the audio
    ///
    /// # Errors
    ///
    /// Returns error on a non-success response or a missing audio URL
    async fn synthesize_as(&self, text: &str, voice: &str, format: AudioFormat) -> Result<String>;

    /// Synthesize MP3 audio
    ///
    /// # Errors
    ///
    /// See [`Synthesizer::synthesize_as`]
    async fn synthesize(&self, text: &str, voice: &str) -> Result<String> {
        self.synthesize_as(text, voice, AudioFormat::Mp3).await
    }

    /// Fetch the bytes behind a URL returned by [`Synthesizer::synthesize`]
    ///
    /// # Errors
    ///
    /// Returns error if the download fails or yields no bytes
    async fn download(&self, url: &str) -> Result<Vec<u8>>;

    /// Provider name for logging
    fn name(&self) -> &'static str;
}

/// Independent synthesis engine used when the primary provider is down
#[async_trait]
pub trait SecondarySynthesizer: Send + Sync {
    /// Synthesize `text` directly to MP3 bytes
    ///
    /// # Errors
    ///
    /// Returns error if synthesis fails
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>>;

    /// Engine name for logging
    fn name(&self) -> &'static str;
}
