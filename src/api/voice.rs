//! Voice conversation API endpoints

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use super::ApiState;
use crate::pipeline::PipelineResponse;
use crate::session::ConversationMessage;
use crate::voice::AudioFormat;

/// Build voice router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/conversation/query", post(conversation_query))
        .route("/llm/query", post(llm_query))
        .route("/conversation/{session_id}/history", get(history))
        .route("/generate-audio", post(generate_audio))
        .with_state(state)
}

/// Fields of a voice upload
#[derive(Debug, Default)]
struct VoiceUpload {
    audio: Vec<u8>,
    session_id: Option<String>,
}

impl VoiceUpload {
    async fn read(mut multipart: Multipart) -> Result<Self, VoiceError> {
        let mut upload = Self::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| VoiceError::BadRequest(e.body_text()))?
        {
            let name = field.name().map(ToString::to_string);
            match name.as_deref() {
                Some("file") => {
                    upload.audio = field
                        .bytes()
                        .await
                        .map_err(|e| VoiceError::BadRequest(e.body_text()))?
                        .to_vec();
                }
                Some("session_id") => {
                    let id = field
                        .text()
                        .await
                        .map_err(|e| VoiceError::BadRequest(e.body_text()))?;
                    let id = id.trim();
                    if !id.is_empty() {
                        upload.session_id = Some(id.to_string());
                    }
                }
                _ => {}
            }
        }

        if upload.audio.is_empty() {
            return Err(VoiceError::BadRequest("No audio provided".to_string()));
        }
        Ok(upload)
    }
}

/// Session-aware voice turn
///
/// Without a `session_id` field the turn runs statelessly.
async fn conversation_query(
    State(state): State<Arc<ApiState>>,
    multipart: Multipart,
) -> Result<Json<PipelineResponse>, VoiceError> {
    let upload = VoiceUpload::read(multipart).await?;
    tracing::info!(
        bytes = upload.audio.len(),
        session_id = upload.session_id.as_deref().unwrap_or("-"),
        "conversation query"
    );

    let response = state
        .pipeline
        .run_voice_query(&upload.audio, upload.session_id.as_deref())
        .await?;
    Ok(Json(response))
}

/// Stateless voice turn; any `session_id` field is ignored
async fn llm_query(
    State(state): State<Arc<ApiState>>,
    multipart: Multipart,
) -> Result<Json<PipelineResponse>, VoiceError> {
    let upload = VoiceUpload::read(multipart).await?;
    tracing::info!(bytes = upload.audio.len(), "stateless query");

    let response = state.pipeline.run_voice_query(&upload.audio, None).await?;
    Ok(Json(response))
}

/// Session transcript response
#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub session_id: String,
    pub messages: Vec<ConversationMessage>,
}

/// Ordered transcript of a session; empty for unknown sessions
async fn history(
    State(state): State<Arc<ApiState>>,
    Path(session_id): Path<String>,
) -> Json<HistoryResponse> {
    let messages = state.pipeline.sessions().history(&session_id).await;
    Json(HistoryResponse {
        session_id,
        messages,
    })
}

/// Direct synthesis request
#[derive(Debug, Deserialize)]
pub struct GenerateAudioRequest {
    pub text: String,
    /// Voice override; the relay's configured voice when absent
    #[serde(rename = "voiceId", default)]
    pub voice_id: Option<String>,
    /// Audio container, MP3 when absent
    #[serde(default)]
    pub format: Option<String>,
}

/// Direct synthesis response
#[derive(Debug, Serialize)]
pub struct GenerateAudioResponse {
    #[serde(rename = "audioFile")]
    pub audio_file: String,
}

/// Synthesize text with the primary TTS provider
async fn generate_audio(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<GenerateAudioRequest>,
) -> Result<Json<GenerateAudioResponse>, VoiceError> {
    let tts = state
        .pipeline
        .synthesizer()
        .ok_or(VoiceError::NotConfigured("TTS not configured (MURF_API_KEY missing)"))?;

    let text = request.text.trim();
    if text.is_empty() {
        return Err(VoiceError::BadRequest("Empty text".to_string()));
    }

    let voice = request
        .voice_id
        .as_deref()
        .unwrap_or_else(|| state.pipeline.voice());

    let format = match request.format.as_deref() {
        Some(format) => format.parse::<AudioFormat>()?,
        None => AudioFormat::default(),
    };

    let audio_file = tts
        .synthesize_as(text, voice, format)
        .await
        .map_err(|e| VoiceError::SynthesisFailed(e.to_string()))?;

    Ok(Json(GenerateAudioResponse { audio_file }))
}

/// Voice API errors
#[derive(Debug)]
pub enum VoiceError {
    NotConfigured(&'static str),
    BadRequest(String),
    SynthesisFailed(String),
    Internal(String),
}

impl From<crate::Error> for VoiceError {
    fn from(e: crate::Error) -> Self {
        match e {
            crate::Error::Input(msg) => Self::BadRequest(msg),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for VoiceError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: ErrorBody,
        }

        #[derive(Serialize)]
        struct ErrorBody {
            code: &'static str,
            message: String,
        }

        let (status, code, message) = match self {
            Self::NotConfigured(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "not_configured",
                msg.to_string(),
            ),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            Self::SynthesisFailed(msg) => (StatusCode::BAD_GATEWAY, "synthesis_failed", msg),
            Self::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg),
        };

        if status.is_server_error() {
            tracing::error!(code, message = %message, "voice request failed");
        }

        let body = ErrorResponse {
            error: ErrorBody { code, message },
        };
        (status, Json(body)).into_response()
    }
}
