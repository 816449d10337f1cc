//! Text-to-speech (TTS) processing

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use super::{AudioFormat, Synthesizer};
use crate::{Error, Result};

const MURF_GENERATE_URL: &str = "https://api.murf.ai/v1/speech/generate";

/// Synthesizes speech from text through Murf
///
/// Murf hosts the generated audio and answers with a URL to it.
pub struct TextToSpeech {
    client: reqwest::Client,
    api_key: SecretString,
}

impl std::fmt::Debug for TextToSpeech {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextToSpeech")
            .field("provider", &"murf")
            .finish_non_exhaustive()
    }
}

impl TextToSpeech {
    /// Create a new TTS instance using Murf
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new_murf(api_key: SecretString, timeout: Duration) -> Result<Self> {
        if api_key.expose_secret().trim().is_empty() {
            return Err(Error::Config("Murf API key required for TTS".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            api_key,
        })
    }
}

#[async_trait]
impl Synthesizer for TextToSpeech {
    async fn synthesize_as(&self, text: &str, voice: &str, format: AudioFormat) -> Result<String> {
        #[derive(serde::Serialize)]
        #[serde(rename_all = "camelCase")]
        struct MurfRequest<'a> {
            text: &'a str,
            voice_id: &'a str,
            format: &'a str,
        }

        #[derive(serde::Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct MurfResponse {
            #[serde(default)]
            audio_file: Option<String>,
        }

        tracing::debug!(
            chars = text.len(),
            voice,
            format = format.as_str(),
            "starting Murf synthesis"
        );

        let request = MurfRequest {
            text,
            voice_id: voice,
            format: format.as_str(),
        };

        let response = self
            .client
            .post(MURF_GENERATE_URL)
            .header("api-key", self.api_key.expose_secret())
            .header("accept", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Murf API error");
            return Err(Error::Provider(format!("Murf TTS error {status}: {body}")));
        }

        let result: MurfResponse = response.json().await?;
        let url = result
            .audio_file
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| Error::EmptyResult("Murf response has no audio file".to_string()))?;

        tracing::info!(audio_url = %url, "synthesis complete");
        Ok(url)
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(Error::Provider(format!(
                "audio download failed with {status}"
            )));
        }

        let audio = response.bytes().await?;
        if audio.is_empty() {
            return Err(Error::EmptyResult("downloaded audio is empty".to_string()));
        }

        Ok(audio.to_vec())
    }

    fn name(&self) -> &'static str {
        "murf"
    }
}
