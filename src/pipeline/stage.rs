//! Stage outcomes and the retry runner shared by every provider stage

use std::fmt;
use std::future::Future;
use std::time::{Duration, SystemTime};

use serde::Serialize;

use crate::Result;
use crate::voice::Transcription;

/// One of the three sequential provider calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Stt,
    Llm,
    Tts,
}

impl Stage {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stt => "stt",
            Self::Llm => "llm",
            Self::Tts => "tts",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a stage ended in failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Provider was never initialized; no attempt was made
    Unavailable,
    /// Network, timeout or provider-side failure on the last attempt
    Transient,
    /// Provider answered but with nothing usable
    EmptyResult,
}

/// Final result of a stage after retries
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome<T> {
    Success(T),
    Failure { kind: FailureKind, message: String },
}

/// Outcome of the STT stage
pub type TranscriptionResult = StageOutcome<Transcription>;

/// Outcome of the LLM stage (reply text)
pub type GenerationResult = StageOutcome<String>;

/// Outcome of the TTS stage (audio URL)
pub type SynthesisResult = StageOutcome<String>;

impl<T> StageOutcome<T> {
    pub fn failure(kind: FailureKind, message: impl Into<String>) -> Self {
        Self::Failure {
            kind,
            message: message.into(),
        }
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Convert into the success value, dropping failure details
    pub fn ok(self) -> Option<T> {
        match self {
            Self::Success(value) => Some(value),
            Self::Failure { .. } => None,
        }
    }
}

/// Retry policy for a single stage
///
/// Controls how many times a stage is attempted and how long to wait
/// between attempts using exponential backoff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Delay before the first retry (doubles each retry)
    pub base_delay: Duration,
    /// Maximum delay cap
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Policy with the given attempt budget and no waiting between attempts
    #[must_use]
    pub const fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }
}

/// Retry policies for each stage
///
/// LLM retries back off twice as long as STT/TTS retries by default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagePolicies {
    pub stt: RetryPolicy,
    pub llm: RetryPolicy,
    pub tts: RetryPolicy,
}

impl Default for StagePolicies {
    fn default() -> Self {
        Self {
            stt: RetryPolicy::default(),
            llm: RetryPolicy {
                base_delay: Duration::from_secs(2),
                ..RetryPolicy::default()
            },
            tts: RetryPolicy::default(),
        }
    }
}

impl StagePolicies {
    /// Same policy for every stage
    #[must_use]
    pub fn uniform(policy: &RetryPolicy) -> Self {
        Self {
            stt: policy.clone(),
            llm: policy.clone(),
            tts: policy.clone(),
        }
    }

    #[must_use]
    pub const fn for_stage(&self, stage: Stage) -> &RetryPolicy {
        match stage {
            Stage::Stt => &self.stt,
            Stage::Llm => &self.llm,
            Stage::Tts => &self.tts,
        }
    }
}

/// Compute the delay before the next attempt.
///
/// `retry` counts retries already made (0 before the first retry). The
/// delay follows `min(base_delay * 2^retry + jitter, max_delay)`, with
/// jitter of 0-25% derived from `SystemTime`.
#[must_use]
pub fn delay_for_attempt(policy: &RetryPolicy, retry: u32) -> Duration {
    let base = policy
        .base_delay
        .saturating_mul(2u32.saturating_pow(retry));
    let base = base.min(policy.max_delay);

    let jitter_nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();

    let jitter_fraction = f64::from(jitter_nanos % 250) / 1000.0;
    let jitter = base.mul_f64(jitter_fraction);

    (base + jitter).min(policy.max_delay)
}

/// Runs provider calls with bounded retry and backoff
#[derive(Debug, Clone, Default)]
pub struct StageRunner {
    policies: StagePolicies,
}

impl StageRunner {
    #[must_use]
    pub const fn new(policies: StagePolicies) -> Self {
        Self { policies }
    }

    #[must_use]
    pub const fn policies(&self) -> &StagePolicies {
        &self.policies
    }

    /// Run `op` against `gateway` until it succeeds or the stage's attempt
    /// budget is spent.
    ///
    /// A missing gateway fails immediately with [`FailureKind::Unavailable`].
    /// Intermediate failures are logged and discarded; the returned failure
    /// carries the last error's message.
    pub async fn run<'a, G, T, F, Fut>(
        &self,
        stage: Stage,
        gateway: Option<&'a G>,
        mut op: F,
    ) -> StageOutcome<T>
    where
        G: ?Sized + 'a,
        F: FnMut(&'a G) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let Some(gateway) = gateway else {
            tracing::warn!(%stage, "provider not configured, skipping stage");
            return StageOutcome::failure(
                FailureKind::Unavailable,
                format!("{stage} provider not configured"),
            );
        };

        let policy = self.policies.for_stage(stage);
        let max_attempts = policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match op(gateway).await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!(%stage, attempt, "stage recovered after retry");
                    }
                    return StageOutcome::Success(value);
                }
                Err(e) => {
                    let kind = e.failure_kind();
                    if attempt >= max_attempts || kind == FailureKind::Unavailable {
                        tracing::error!(%stage, attempt, error = %e, "stage failed");
                        return StageOutcome::failure(kind, e.to_string());
                    }

                    let delay = delay_for_attempt(policy, attempt - 1);
                    tracing::warn!(
                        %stage,
                        attempt,
                        max_attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %e,
                        "stage attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
