//! Secondary speech synthesis through the Google Translate TTS endpoint
//!
//! This is the same endpoint gTTS uses. It needs no credential and answers
//! quickly, which makes it a good last remote tier before client-side speech.

use std::time::Duration;

use async_trait::async_trait;

use super::SecondarySynthesizer;
use crate::{Error, Result};

const TRANSLATE_TTS_URL: &str = "https://translate.google.com/translate_tts";

/// Maximum characters the endpoint accepts per request
const MAX_CHUNK_CHARS: usize = 200;

/// Keyless synthesis engine returning MP3 bytes
#[derive(Debug, Clone)]
pub struct TranslateTts {
    client: reqwest::Client,
    lang: String,
}

impl TranslateTts {
    /// Create a new engine speaking `lang` (e.g. "en")
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(lang: String, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            lang,
        })
    }
}

#[async_trait]
impl SecondarySynthesizer for TranslateTts {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        let chunks = chunk_text(text, MAX_CHUNK_CHARS);
        if chunks.is_empty() {
            return Err(Error::EmptyResult("nothing to synthesize".to_string()));
        }

        let total = chunks.len().to_string();
        let mut audio = Vec::new();

        for (idx, chunk) in chunks.iter().enumerate() {
            let idx = idx.to_string();
            let textlen = chunk.chars().count().to_string();
            let response = self
                .client
                .get(TRANSLATE_TTS_URL)
                .query(&[
                    ("ie", "UTF-8"),
                    ("client", "tw-ob"),
                    ("tl", self.lang.as_str()),
                    ("q", chunk.as_str()),
                    ("total", total.as_str()),
                    ("idx", idx.as_str()),
                    ("textlen", textlen.as_str()),
                ])
                .send()
                .await?;

            if !response.status().is_success() {
                let status = response.status();
                return Err(Error::Provider(format!("translate TTS error {status}")));
            }

            // MP3 frames can be concatenated as-is
            audio.extend_from_slice(&response.bytes().await?);
        }

        if audio.is_empty() {
            return Err(Error::EmptyResult("translate TTS returned no audio".to_string()));
        }

        tracing::debug!(chunks = chunks.len(), bytes = audio.len(), "secondary synthesis complete");
        Ok(audio)
    }

    fn name(&self) -> &'static str {
        "gtts"
    }
}

/// Split `text` into chunks of at most `max_chars` characters
///
/// Splits on whitespace where possible; words longer than `max_chars` are
/// cut hard.
#[must_use]
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in text.split_whitespace() {
        let word_len = word.chars().count();

        if word_len > max_chars {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
            }
            let chars: Vec<char> = word.chars().collect();
            for piece in chars.chunks(max_chars) {
                chunks.push(piece.iter().collect());
            }
            continue;
        }

        let needed = if current.is_empty() { word_len } else { word_len + 1 };
        if current_len + needed > max_chars {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }

        if !current.is_empty() {
            current.push(' ');
            current_len += 1;
        }
        current.push_str(word);
        current_len += word_len;
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}
