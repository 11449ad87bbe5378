//! Analysis client - drives the language-analysis service one chunk at a time

pub mod ollama;
pub mod prompt;
pub mod scripted;

use std::fmt;
use std::thread;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::AnalysisConfig;
use crate::types::{Chunk, Transcript};

pub use ollama::OllamaService;
pub use scripted::ScriptedService;

/// Anything that turns a prompt into free text.
///
/// Implementations must be shareable across worker threads; each call is self-contained.
pub trait AnalysisService: Send + Sync {
    fn analyze(&self, prompt: &str) -> Result<String, ServiceError>;
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ServiceError {
    #[error("request timed out")]
    Timeout,

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("service returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed service envelope: {0}")]
    Envelope(String),
}

/// Why a single attempt did not produce a usable reply
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptError {
    Service(ServiceError),
    EmptyReply,
}

impl fmt::Display for AttemptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptError::Service(err) => write!(f, "{}", err),
            AttemptError::EmptyReply => f.write_str("empty reply"),
        }
    }
}

/// Every attempt for one chunk failed.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("chunk {chunk_index} analysis failed after {} attempt(s): {}", .attempts.len(), last_error(.attempts))]
pub struct ChunkAnalysisFailure {
    pub chunk_index: usize,
    pub attempts: Vec<AttemptError>,
}

fn last_error(attempts: &[AttemptError]) -> String {
    attempts
        .last()
        .map(|err| err.to_string())
        .unwrap_or_else(|| "no attempt made".to_string())
}

/// Raw reply for one chunk plus the attempt that produced it (1 = first try)
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisReply {
    pub chunk_index: usize,
    pub text: String,
    pub attempt: u32,
}

impl AnalysisReply {
    pub fn succeeded_on_retry(&self) -> bool {
        self.attempt > 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub retries: u32,
    pub backoff_base: Duration,
}

impl RetryPolicy {
    pub fn max_attempts(&self) -> u32 {
        self.retries + 1
    }

    /// Delay before attempt `next_attempt` (2-based): base, 2*base, 4*base, ...
    pub fn backoff(&self, next_attempt: u32) -> Duration {
        let exponent = next_attempt.saturating_sub(2).min(16);
        self.backoff_base.saturating_mul(1 << exponent)
    }
}

impl From<&AnalysisConfig> for RetryPolicy {
    fn from(config: &AnalysisConfig) -> Self {
        Self {
            retries: config.retries,
            backoff_base: config.backoff_base(),
        }
    }
}

/// Builds the prompt for a chunk and runs the bounded retry loop against a service.
pub struct ChunkAnalyzer<'a> {
    service: &'a dyn AnalysisService,
    policy: RetryPolicy,
}

impl<'a> ChunkAnalyzer<'a> {
    pub fn new(service: &'a dyn AnalysisService, policy: RetryPolicy) -> Self {
        Self { service, policy }
    }

    pub fn analyze(
        &self,
        chunk: &Chunk,
        transcript: &Transcript,
        total_chunks: usize,
    ) -> Result<AnalysisReply, ChunkAnalysisFailure> {
        let prompt = prompt::build_prompt(chunk, transcript, total_chunks);
        self.analyze_prompt(chunk.index, &prompt)
    }

    pub fn analyze_prompt(
        &self,
        chunk_index: usize,
        prompt: &str,
    ) -> Result<AnalysisReply, ChunkAnalysisFailure> {
        let mut failures = Vec::new();
        for attempt in 1..=self.policy.max_attempts() {
            if attempt > 1 {
                let delay = self.policy.backoff(attempt);
                debug!(chunk = chunk_index, attempt, delay_ms = delay.as_millis() as u64, "backing off");
                thread::sleep(delay);
            }
            debug!(chunk = chunk_index, attempt, "querying analysis service");
            match self.service.analyze(prompt) {
                Ok(text) if !text.trim().is_empty() => {
                    if attempt > 1 {
                        info!(chunk = chunk_index, attempt, "analysis succeeded on retry");
                    }
                    return Ok(AnalysisReply {
                        chunk_index,
                        text,
                        attempt,
                    });
                }
                Ok(_) => {
                    warn!(chunk = chunk_index, attempt, "analysis service returned an empty reply");
                    failures.push(AttemptError::EmptyReply);
                }
                Err(err) => {
                    warn!(chunk = chunk_index, attempt, error = %err, "analysis attempt failed");
                    failures.push(AttemptError::Service(err));
                }
            }
        }
        Err(ChunkAnalysisFailure {
            chunk_index,
            attempts: failures,
        })
    }
}
