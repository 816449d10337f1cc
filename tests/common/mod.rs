//! Shared test utilities
//!
//! Scripted gateway doubles that count calls and record their inputs.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use vox_relay::pipeline::{RetryPolicy, StagePolicies};
use vox_relay::{
    AudioFormat, Error, FallbackSynthesizer, Generator, Result, SecondarySynthesizer, SessionStore,
    Synthesizer, Transcriber, Transcription, VoicePipeline,
};

/// Bytes returned by audio doubles
pub const MP3_BYTES: &[u8] = b"ID3\x03\x00fake-mp3";

/// One scripted gateway reply
#[derive(Debug, Clone)]
pub enum Step<T> {
    Ok(T),
    Fail,
    Empty,
}

impl<T: Clone> Step<T> {
    fn reply(&self) -> Result<T> {
        match self {
            Self::Ok(value) => Ok(value.clone()),
            Self::Fail => Err(Error::Provider("scripted 503 service unavailable".into())),
            Self::Empty => Err(Error::EmptyResult("scripted empty response".into())),
        }
    }
}

/// Replays a script; the last step repeats once the script runs out
struct Script<T> {
    steps: Vec<Step<T>>,
    calls: AtomicUsize,
    inputs: Mutex<Vec<String>>,
}

impl<T: Clone> Script<T> {
    fn new(steps: Vec<Step<T>>) -> Self {
        assert!(!steps.is_empty(), "script needs at least one step");
        Self {
            steps,
            calls: AtomicUsize::new(0),
            inputs: Mutex::new(Vec::new()),
        }
    }

    fn next(&self, input: impl Into<String>) -> Result<T> {
        self.inputs.lock().unwrap().push(input.into());
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        self.steps[n.min(self.steps.len() - 1)].reply()
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn inputs(&self) -> Vec<String> {
        self.inputs.lock().unwrap().clone()
    }
}

pub fn heard(text: &str) -> Transcription {
    Transcription {
        text: text.to_string(),
        duration_secs: 1.5,
        confidence: Some(0.93),
    }
}

/// Scripted speech-to-text gateway
pub struct MockStt(Script<Transcription>);

impl MockStt {
    pub fn new(steps: Vec<Step<Transcription>>) -> Arc<Self> {
        Arc::new(Self(Script::new(steps)))
    }

    pub fn hears(text: &str) -> Arc<Self> {
        Self::new(vec![Step::Ok(heard(text))])
    }

    pub fn failing() -> Arc<Self> {
        Self::new(vec![Step::Fail])
    }

    pub fn calls(&self) -> usize {
        self.0.calls()
    }
}

#[async_trait]
impl Transcriber for MockStt {
    async fn transcribe(&self, audio: &[u8]) -> Result<Transcription> {
        self.0.next(format!("{} bytes", audio.len()))
    }

    fn name(&self) -> &'static str {
        "mock-stt"
    }
}

/// Scripted language model gateway recording prompts
pub struct MockLlm {
    script: Script<String>,
    latency: Option<Duration>,
}

impl MockLlm {
    pub fn new(steps: Vec<Step<String>>) -> Arc<Self> {
        Arc::new(Self {
            script: Script::new(steps),
            latency: None,
        })
    }

    pub fn replies(text: &str) -> Arc<Self> {
        Self::new(vec![Step::Ok(text.to_string())])
    }

    /// Replies after sleeping, so concurrent turns overlap
    pub fn slow(text: &str, latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            script: Script::new(vec![Step::Ok(text.to_string())]),
            latency: Some(latency),
        })
    }

    pub fn failing() -> Arc<Self> {
        Self::new(vec![Step::Fail])
    }

    pub fn calls(&self) -> usize {
        self.script.calls()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.script.inputs()
    }
}

#[async_trait]
impl Generator for MockLlm {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let reply = self.script.next(prompt);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        reply
    }

    fn name(&self) -> &'static str {
        "mock-llm"
    }
}

/// Scripted remote TTS gateway recording synthesized texts
pub struct MockTts {
    script: Script<String>,
    formats: Mutex<Vec<AudioFormat>>,
    downloads: AtomicUsize,
}

impl MockTts {
    pub fn new(steps: Vec<Step<String>>) -> Arc<Self> {
        Arc::new(Self {
            script: Script::new(steps),
            formats: Mutex::new(Vec::new()),
            downloads: AtomicUsize::new(0),
        })
    }

    pub fn returns(url: &str) -> Arc<Self> {
        Self::new(vec![Step::Ok(url.to_string())])
    }

    pub fn failing() -> Arc<Self> {
        Self::new(vec![Step::Fail])
    }

    pub fn calls(&self) -> usize {
        self.script.calls()
    }

    pub fn texts(&self) -> Vec<String> {
        self.script.inputs()
    }

    pub fn formats(&self) -> Vec<AudioFormat> {
        self.formats.lock().unwrap().clone()
    }

    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Synthesizer for MockTts {
    async fn synthesize_as(&self, text: &str, _voice: &str, format: AudioFormat) -> Result<String> {
        self.formats.lock().unwrap().push(format);
        self.script.next(text)
    }

    async fn download(&self, _url: &str) -> Result<Vec<u8>> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        Ok(MP3_BYTES.to_vec())
    }

    fn name(&self) -> &'static str {
        "mock-tts"
    }
}

/// Scripted secondary speech engine
pub struct MockSecondary(Script<Vec<u8>>);

impl MockSecondary {
    pub fn new(steps: Vec<Step<Vec<u8>>>) -> Arc<Self> {
        Arc::new(Self(Script::new(steps)))
    }

    pub fn working() -> Arc<Self> {
        Self::new(vec![Step::Ok(MP3_BYTES.to_vec())])
    }

    pub fn failing() -> Arc<Self> {
        Self::new(vec![Step::Fail])
    }

    pub fn calls(&self) -> usize {
        self.0.calls()
    }
}

#[async_trait]
impl SecondarySynthesizer for MockSecondary {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        self.0.next(text)
    }

    fn name(&self) -> &'static str {
        "mock-secondary"
    }
}

/// Three attempts per stage with no backoff
pub fn fast_policies() -> StagePolicies {
    StagePolicies::uniform(&RetryPolicy::immediate(3))
}

/// Fallback cascade over the given doubles, persisting into `dir`
pub fn fallback(
    dir: &Path,
    tts: Option<Arc<MockTts>>,
    secondary: Option<Arc<MockSecondary>>,
) -> Arc<FallbackSynthesizer> {
    Arc::new(FallbackSynthesizer::from_gateways(
        dir,
        "/static/fallback",
        tts.map(|t| (t as Arc<dyn Synthesizer>, "en-US-ken".to_string())),
        secondary.map(|s| s as Arc<dyn SecondarySynthesizer>),
    ))
}

/// Pipeline wired to the given doubles
///
/// The fallback cascade reuses `tts` as its primary tier, mirroring the
/// production wiring.
pub fn pipeline(
    dir: &Path,
    stt: Option<Arc<MockStt>>,
    llm: Option<Arc<MockLlm>>,
    tts: Option<Arc<MockTts>>,
    secondary: Option<Arc<MockSecondary>>,
) -> VoicePipeline {
    let mut builder = VoicePipeline::builder(
        fallback(dir, tts.clone(), secondary),
        Arc::new(SessionStore::default()),
    )
    .policies(fast_policies());

    if let Some(stt) = stt {
        builder = builder.stt(stt);
    }
    if let Some(llm) = llm {
        builder = builder.llm(llm);
    }
    if let Some(tts) = tts {
        builder = builder.tts(tts);
    }
    builder.build()
}
