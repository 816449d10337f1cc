//! Voice pipeline orchestration
//!
//! Drives one voice turn through STT → LLM → TTS. Every stage runs through
//! the [`StageRunner`] and every failure is replaced with fallback content,
//! so a turn always produces something to say. Only empty input is an error.
//!
//! ```text
//! audio ─▶ STT ──▶ (session context) ──▶ LLM ──▶ TTS ─▶ audio reference
//!           │                             │        │
//!           ▼                             ▼        ▼
//!     canned apology              canned reply   fallback cascade
//! ```

mod stage;

pub use stage::{
    FailureKind, GenerationResult, RetryPolicy, Stage, StageOutcome, StagePolicies, StageRunner,
    SynthesisResult, TranscriptionResult, delay_for_attempt,
};

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use crate::context::{self, DEFAULT_CONTEXT_WINDOW};
use crate::fallback::{AudioReference, FallbackSynthesizer};
use crate::llm::Generator;
use crate::session::{ConversationMessage, SessionStore};
use crate::voice::{Synthesizer, Transcriber};
use crate::{Error, Result};

/// Spoken when speech recognition is unavailable
pub const STT_FAILURE_MESSAGE: &str =
    "Sorry, I can't understand audio right now. Our speech service is temporarily unavailable. Please try again in a moment.";

/// Spoken when the audio contained no recognizable speech
pub const NO_SPEECH_MESSAGE: &str = "I didn't catch that. Could you please say it again?";

/// Used as the reply when the language model is unavailable
pub const LLM_FAILURE_MESSAGE: &str = "I'm having trouble connecting right now. Please try again.";

/// Default voice for primary synthesis
pub const DEFAULT_VOICE: &str = "en-US-natalie";

/// Overall result of a voice turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    /// Every stage succeeded
    Success,
    /// Speech was understood but the reply or its audio is fallback content
    PartialSuccess,
    /// Speech recognition failed; the reply is a canned apology
    Fallback,
    /// The audio held no recognizable speech
    Error,
}

/// Which stages succeeded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StageStatus {
    pub stt: bool,
    pub llm: bool,
    pub tts: bool,
}

impl StageStatus {
    /// Overall status for a turn whose speech recognition succeeded
    #[must_use]
    pub const fn status(self) -> PipelineStatus {
        match self {
            Self {
                stt: true,
                llm: true,
                tts: true,
            } => PipelineStatus::Success,
            Self { stt: true, .. } => PipelineStatus::PartialSuccess,
            Self { stt: false, .. } => PipelineStatus::Fallback,
        }
    }
}

/// Aggregate result of [`VoicePipeline::run_voice_query`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineResponse {
    pub status: PipelineStatus,
    /// Recognized user speech
    #[serde(rename = "user_query")]
    pub transcript: String,
    /// Assistant reply, real or fallback
    #[serde(rename = "ai_response")]
    pub reply_text: String,
    #[serde(rename = "audioFile")]
    pub audio_reference: AudioReference,
    #[serde(rename = "stages")]
    pub stage_status: StageStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Human-readable explanation when the turn did not fully succeed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Which gateways were configured at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Readiness {
    pub stt: bool,
    pub llm: bool,
    pub tts: bool,
}

/// Builder for [`VoicePipeline`]
pub struct VoicePipelineBuilder {
    stt: Option<Arc<dyn Transcriber>>,
    llm: Option<Arc<dyn Generator>>,
    tts: Option<Arc<dyn Synthesizer>>,
    fallback: Arc<FallbackSynthesizer>,
    sessions: Arc<SessionStore>,
    policies: StagePolicies,
    voice: String,
    context_window: usize,
}

impl VoicePipelineBuilder {
    /// Set the speech-to-text gateway
    #[must_use]
    pub fn stt(mut self, stt: Arc<dyn Transcriber>) -> Self {
        self.stt = Some(stt);
        self
    }

    /// Set the language model gateway
    #[must_use]
    pub fn llm(mut self, llm: Arc<dyn Generator>) -> Self {
        self.llm = Some(llm);
        self
    }

    /// Set the text-to-speech gateway
    #[must_use]
    pub fn tts(mut self, tts: Arc<dyn Synthesizer>) -> Self {
        self.tts = Some(tts);
        self
    }

    /// Set per-stage retry policies
    #[must_use]
    pub fn policies(mut self, policies: StagePolicies) -> Self {
        self.policies = policies;
        self
    }

    /// Set the voice used for primary synthesis
    #[must_use]
    pub fn voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = voice.into();
        self
    }

    /// Set how many recent messages are sent to the language model
    #[must_use]
    pub const fn context_window(mut self, messages: usize) -> Self {
        self.context_window = messages;
        self
    }

    #[must_use]
    pub fn build(self) -> VoicePipeline {
        VoicePipeline {
            stt: self.stt,
            llm: self.llm,
            tts: self.tts,
            fallback: self.fallback,
            sessions: self.sessions,
            runner: StageRunner::new(self.policies),
            voice: self.voice,
            context_window: self.context_window,
        }
    }
}

/// Resilient STT → LLM → TTS orchestrator
pub struct VoicePipeline {
    stt: Option<Arc<dyn Transcriber>>,
    llm: Option<Arc<dyn Generator>>,
    tts: Option<Arc<dyn Synthesizer>>,
    fallback: Arc<FallbackSynthesizer>,
    sessions: Arc<SessionStore>,
    runner: StageRunner,
    voice: String,
    context_window: usize,
}

impl std::fmt::Debug for VoicePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoicePipeline")
            .field("readiness", &self.readiness())
            .field("voice", &self.voice)
            .field("context_window", &self.context_window)
            .finish_non_exhaustive()
    }
}

impl VoicePipeline {
    /// Start building a pipeline around a fallback synthesizer and session store
    #[must_use]
    pub fn builder(
        fallback: Arc<FallbackSynthesizer>,
        sessions: Arc<SessionStore>,
    ) -> VoicePipelineBuilder {
        VoicePipelineBuilder {
            stt: None,
            llm: None,
            tts: None,
            fallback,
            sessions,
            policies: StagePolicies::default(),
            voice: DEFAULT_VOICE.to_string(),
            context_window: DEFAULT_CONTEXT_WINDOW,
        }
    }

    /// Which gateways are configured
    #[must_use]
    pub fn readiness(&self) -> Readiness {
        Readiness {
            stt: self.stt.is_some(),
            llm: self.llm.is_some(),
            tts: self.tts.is_some(),
        }
    }

    #[must_use]
    pub const fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    #[must_use]
    pub const fn fallback(&self) -> &Arc<FallbackSynthesizer> {
        &self.fallback
    }

    /// Primary TTS gateway, if configured
    #[must_use]
    pub const fn synthesizer(&self) -> Option<&Arc<dyn Synthesizer>> {
        self.tts.as_ref()
    }

    /// Voice used for primary synthesis
    #[must_use]
    pub fn voice(&self) -> &str {
        &self.voice
    }

    /// Run one voice turn
    ///
    /// With a `session_id` the transcript is appended to that session and the
    /// recent conversation becomes the prompt; without one the transcript is
    /// the prompt.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Input`] if `audio` is empty. Provider failures never
    /// surface as errors; they are reported through the response status.
    pub async fn run_voice_query(
        &self,
        audio: &[u8],
        session_id: Option<&str>,
    ) -> Result<PipelineResponse> {
        if audio.is_empty() {
            return Err(Error::Input("audio is empty".to_string()));
        }

        let started = Instant::now();
        let response = self.run_stages(audio, session_id).await;

        tracing::info!(
            session_id = session_id.unwrap_or("-"),
            status = ?response.status,
            stt = response.stage_status.stt,
            llm = response.stage_status.llm,
            tts = response.stage_status.tts,
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "voice turn complete"
        );

        Ok(response)
    }

    async fn run_stages(&self, audio: &[u8], session_id: Option<&str>) -> PipelineResponse {
        let stt = self
            .runner
            .run(Stage::Stt, self.stt.as_deref(), |stt| stt.transcribe(audio))
            .await;

        let transcription = match stt {
            StageOutcome::Success(transcription) => transcription,
            StageOutcome::Failure { kind, message } => {
                tracing::warn!(?kind, error = %message, "speech recognition failed");
                return self
                    .canned(
                        PipelineStatus::Fallback,
                        String::new(),
                        STT_FAILURE_MESSAGE,
                        StageStatus::default(),
                        session_id,
                    )
                    .await;
            }
        };

        let transcript = transcription.text.trim().to_string();
        if transcript.is_empty() {
            tracing::info!(
                duration_secs = transcription.duration_secs,
                "no speech recognized"
            );
            let stages = StageStatus {
                stt: true,
                ..StageStatus::default()
            };
            return self
                .canned(
                    PipelineStatus::Error,
                    transcript,
                    NO_SPEECH_MESSAGE,
                    stages,
                    session_id,
                )
                .await;
        }

        tracing::debug!(
            transcript = %transcript,
            confidence = ?transcription.confidence,
            "speech recognized"
        );

        let (reply_text, llm_ok) = match session_id {
            Some(id) => self.converse(id, &transcript).await,
            None => self.generate(&transcript).await,
        };

        let voice = self.voice.as_str();
        let tts = self
            .runner
            .run(Stage::Tts, self.tts.as_deref(), |tts| {
                tts.synthesize(&reply_text, voice)
            })
            .await;

        let (audio_reference, tts_ok) = match tts {
            StageOutcome::Success(url) => (AudioReference::Remote(url), true),
            StageOutcome::Failure { .. } => (self.fallback.synthesize(&reply_text).await, false),
        };

        let stage_status = StageStatus {
            stt: true,
            llm: llm_ok,
            tts: tts_ok,
        };

        let error = match (llm_ok, tts_ok) {
            (true, true) => None,
            (false, _) => Some("language model unavailable, replied with fallback text"),
            (true, false) => Some("speech synthesis unavailable, used fallback audio"),
        }
        .map(str::to_string);

        PipelineResponse {
            status: stage_status.status(),
            transcript,
            reply_text,
            audio_reference,
            stage_status,
            session_id: session_id.map(str::to_string),
            error,
        }
    }

    /// Session-aware LLM stage
    ///
    /// Holds the session lock from the user append through the assistant
    /// append, so concurrent turns on one session are serialized.
    async fn converse(&self, session_id: &str, transcript: &str) -> (String, bool) {
        let handle = self.sessions.handle(session_id).await;
        let mut session = handle.lock().await;

        session.push(ConversationMessage::user(transcript));
        let prompt = context::format_prompt(session.recent(self.context_window));

        let (reply, ok) = self.generate(&prompt).await;
        session.push(ConversationMessage::assistant(reply.clone()));

        tracing::debug!(
            session_id,
            messages = session.messages.len(),
            "session updated"
        );
        (reply, ok)
    }

    /// LLM stage with canned substitution on failure
    async fn generate(&self, prompt: &str) -> (String, bool) {
        match self
            .runner
            .run(Stage::Llm, self.llm.as_deref(), |llm| llm.generate(prompt))
            .await
        {
            StageOutcome::Success(reply) => (reply, true),
            StageOutcome::Failure { kind, message } => {
                tracing::warn!(?kind, error = %message, "using fallback reply");
                (LLM_FAILURE_MESSAGE.to_string(), false)
            }
        }
    }

    /// Response for a turn cut short before the LLM stage
    async fn canned(
        &self,
        status: PipelineStatus,
        transcript: String,
        message: &str,
        stage_status: StageStatus,
        session_id: Option<&str>,
    ) -> PipelineResponse {
        PipelineResponse {
            status,
            transcript,
            reply_text: message.to_string(),
            audio_reference: self.fallback.synthesize(message).await,
            stage_status,
            session_id: session_id.map(str::to_string),
            error: Some(message.to_string()),
        }
    }
}
