//! Vox Relay - Resilient voice assistant relay
//!
//! This library turns a recorded utterance into a spoken reply:
//! - Speech-to-text, language model and text-to-speech gateways
//! - A retrying stage runner with exponential backoff
//! - A tiered fallback synthesizer that always yields something playable
//! - In-memory conversation sessions feeding recent context to the LLM
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                   HTTP API (axum)                   │
//! │  /conversation/query │ /llm/query │ /generate-audio │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                  Voice Pipeline                     │
//! │   StageRunner  │  SessionStore  │  Fallback tiers   │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                    Providers                        │
//! │   AssemblyAI/Whisper │ Gemini/OpenAI │ Murf/gTTS    │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod config;
pub mod context;
pub mod error;
pub mod fallback;
pub mod llm;
pub mod pipeline;
pub mod session;
pub mod voice;

pub use config::Config;
pub use error::{Error, Result};
pub use fallback::{AudioReference, FallbackSynthesizer, FallbackTier, content_key};
pub use llm::{Generator, LanguageModel};
pub use pipeline::{
    PipelineResponse, PipelineStatus, Readiness, StageOutcome, StageRunner, StageStatus,
    VoicePipeline,
};
pub use session::{ConversationMessage, ConversationSession, Role, SessionStore};
pub use voice::{AudioFormat, SecondarySynthesizer, Synthesizer, Transcriber, Transcription};
