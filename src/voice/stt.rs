//! Speech-to-text (STT) processing

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use super::{Transcriber, Transcription};
use crate::{Error, Result};

const ASSEMBLYAI_BASE: &str = "https://api.assemblyai.com/v2";

/// Response from the AssemblyAI upload endpoint
#[derive(serde::Deserialize)]
struct UploadResponse {
    upload_url: String,
}

/// AssemblyAI transcript resource
#[derive(serde::Deserialize)]
struct AssemblyTranscript {
    id: String,
    status: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    audio_duration: Option<f64>,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    error: Option<String>,
}

/// Response from OpenAI Whisper with `verbose_json` format
#[derive(serde::Deserialize)]
struct WhisperResponse {
    text: String,
    #[serde(default)]
    duration: Option<f64>,
}

/// STT provider backend
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SttProvider {
    AssemblyAi,
    Whisper,
}

/// Transcribes speech to text
pub struct SpeechToText {
    client: reqwest::Client,
    api_key: SecretString,
    model: String,
    provider: SttProvider,
    timeout: Duration,
    poll_interval: Duration,
}

impl std::fmt::Debug for SpeechToText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeechToText")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl SpeechToText {
    /// Create a new STT instance using AssemblyAI
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new_assemblyai(api_key: SecretString, timeout: Duration) -> Result<Self> {
        Self::build(api_key, String::new(), SttProvider::AssemblyAi, timeout)
    }

    /// Create a new STT instance using `OpenAI` Whisper
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new_whisper(api_key: SecretString, model: String, timeout: Duration) -> Result<Self> {
        Self::build(api_key, model, SttProvider::Whisper, timeout)
    }

    fn build(
        api_key: SecretString,
        model: String,
        provider: SttProvider,
        timeout: Duration,
    ) -> Result<Self> {
        if api_key.expose_secret().trim().is_empty() {
            return Err(Error::Config(format!(
                "{provider:?} API key required for STT"
            )));
        }

        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            api_key,
            model,
            provider,
            timeout,
            poll_interval: Duration::from_secs(1),
        })
    }

    /// Override how often AssemblyAI transcripts are polled
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Transcribe using AssemblyAI: upload, create a transcript, poll it
    async fn transcribe_assemblyai(&self, audio: &[u8]) -> Result<Transcription> {
        tracing::debug!(audio_bytes = audio.len(), "starting AssemblyAI transcription");

        let key = self.api_key.expose_secret();

        let response = self
            .client
            .post(format!("{ASSEMBLYAI_BASE}/upload"))
            .header("authorization", key)
            .header("content-type", "application/octet-stream")
            .body(audio.to_vec())
            .send()
            .await?;
        let upload: UploadResponse = check_status(response, "AssemblyAI upload")
            .await?
            .json()
            .await?;

        let response = self
            .client
            .post(format!("{ASSEMBLYAI_BASE}/transcript"))
            .header("authorization", key)
            .json(&serde_json::json!({ "audio_url": upload.upload_url }))
            .send()
            .await?;
        let mut transcript: AssemblyTranscript =
            check_status(response, "AssemblyAI transcript").await?.json().await?;

        tracing::debug!(transcript_id = %transcript.id, "transcript queued");

        loop {
            match transcript.status.as_str() {
                "completed" => break,
                "error" => {
                    let message = transcript
                        .error
                        .unwrap_or_else(|| "transcription failed".to_string());
                    tracing::error!(
                        transcript_id = %transcript.id,
                        error = %message,
                        "AssemblyAI error"
                    );
                    return Err(Error::Provider(format!("AssemblyAI: {message}")));
                }
                _ => {}
            }

            tokio::time::sleep(self.poll_interval).await;

            let response = self
                .client
                .get(format!("{ASSEMBLYAI_BASE}/transcript/{}", transcript.id))
                .header("authorization", key)
                .send()
                .await?;
            transcript = check_status(response, "AssemblyAI poll").await?.json().await?;
        }

        let result = Transcription {
            text: transcript.text.unwrap_or_default().trim().to_string(),
            duration_secs: transcript.audio_duration.unwrap_or_default(),
            confidence: transcript.confidence,
        };

        tracing::info!(
            transcript = %result.text,
            duration = result.duration_secs,
            "transcription complete"
        );
        Ok(result)
    }

    /// Transcribe using `OpenAI` Whisper
    async fn transcribe_whisper(&self, audio: &[u8]) -> Result<Transcription> {
        tracing::debug!(audio_bytes = audio.len(), "starting Whisper transcription");

        let (extension, mime) = guess_audio_format(audio);
        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(audio.to_vec())
                    .file_name(format!("audio.{extension}"))
                    .mime_str(mime)
                    .map_err(|e| Error::Provider(e.to_string()))?,
            )
            .text("model", self.model.clone())
            .text("response_format", "verbose_json");

        let response = self
            .client
            .post("https://api.openai.com/v1/audio/transcriptions")
            .bearer_auth(self.api_key.expose_secret())
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Whisper request failed");
                e
            })?;

        let result: WhisperResponse = check_status(response, "Whisper").await?.json().await?;

        tracing::info!(transcript = %result.text, "transcription complete");
        Ok(Transcription {
            text: result.text.trim().to_string(),
            duration_secs: result.duration.unwrap_or_default(),
            confidence: None,
        })
    }
}

#[async_trait]
impl Transcriber for SpeechToText {
    async fn transcribe(&self, audio: &[u8]) -> Result<Transcription> {
        let work = async {
            match self.provider {
                SttProvider::AssemblyAi => self.transcribe_assemblyai(audio).await,
                SttProvider::Whisper => self.transcribe_whisper(audio).await,
            }
        };

        // AssemblyAI polls across several requests, so bound the whole call
        tokio::time::timeout(self.timeout, work)
            .await
            .map_err(|_| Error::Timeout(format!("{} transcription", self.name())))?
    }

    fn name(&self) -> &'static str {
        match self.provider {
            SttProvider::AssemblyAi => "assemblyai",
            SttProvider::Whisper => "whisper",
        }
    }
}

/// Fail with the response body when the status is not 2xx
async fn check_status(response: reqwest::Response, what: &str) -> Result<reqwest::Response> {
    let status = response.status();
    tracing::debug!(status = %status, provider = what, "received response");

    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    tracing::error!(status = %status, body = %body, provider = what, "STT API error");
    Err(Error::Provider(format!("{what} error {status}: {body}")))
}

/// Guess a file extension and MIME type from audio magic bytes
///
/// Browsers record `WebM` by default; unknown payloads are labelled `WebM`
/// as well since that is what the web client uploads.
#[must_use]
pub fn guess_audio_format(audio: &[u8]) -> (&'static str, &'static str) {
    match audio {
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'A', b'V', b'E', ..] => ("wav", "audio/wav"),
        [b'O', b'g', b'g', b'S', ..] => ("ogg", "audio/ogg"),
        [b'f', b'L', b'a', b'C', ..] => ("flac", "audio/flac"),
        [b'I', b'D', b'3', ..] => ("mp3", "audio/mpeg"),
        [0xFF, second, ..] if second & 0xE0 == 0xE0 => ("mp3", "audio/mpeg"),
        [_, _, _, _, b'f', b't', b'y', b'p', ..] => ("m4a", "audio/mp4"),
        _ => ("webm", "audio/webm"),
    }
}
