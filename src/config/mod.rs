use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, ensure, Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:11434";
pub const DEFAULT_MODEL: &str = "qwen2.5:3b";

/// Complete configuration surface of the segmentation engine.
///
/// Every component receives its own section at construction; nothing reads global state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    pub chunking: ChunkingConfig,
    pub analysis: AnalysisConfig,
    pub merge: MergeConfig,
    pub normalize: NormalizeConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Upper bound on a chunk's token estimate, overlap included
    pub token_budget: usize,
    /// Maximum number of trailing segments repeated as context
    pub overlap_segments: usize,
    /// Only segments ending within this many seconds of the previous chunk's end are repeated
    pub overlap_seconds: f64,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            token_budget: 4000,
            overlap_segments: 3,
            overlap_seconds: 30.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub endpoint: String,
    pub model: String,
    pub timeout_secs: u64,
    pub retries: u32,
    pub backoff_base_ms: u64,
    /// Concurrent in-flight chunk requests; 1 analyzes sequentially
    pub max_in_flight: usize,
    pub generation: GenerationOptions,
}

impl AnalysisConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout_secs: 120,
            retries: 2,
            backoff_base_ms: 1000,
            max_in_flight: 1,
            generation: GenerationOptions::default(),
        }
    }
}

/// Sampling options forwarded verbatim to the service
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub top_p: f32,
    pub num_predict: u32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            top_p: 0.9,
            num_predict: 1000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Cut points closer than this (seconds) describe the same boundary
    pub epsilon: f64,
    /// Longest span of the even split used when every chunk failed
    pub fallback_max_span: f64,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            epsilon: 5.0,
            fallback_max_span: 300.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeConfig {
    pub min_segment_duration: f64,
    pub max_segments: usize,
    pub max_title_len: usize,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            min_segment_duration: 30.0,
            max_segments: 20,
            max_title_len: 50,
        }
    }
}

impl SegmentationConfig {
    /// Load from a JSON file or an inline JSON document; defaults when neither is given.
    pub fn load(path: Option<&Path>, json: Option<&str>) -> Result<Self> {
        match (path, json) {
            (Some(_), Some(_)) => bail!("provide a config file or inline config JSON, not both"),
            (Some(p), None) => {
                let data = fs::read_to_string(p)
                    .with_context(|| format!("Failed to read config file {:?}", p))?;
                Self::from_json(&data)
            }
            (None, Some(raw)) => Self::from_json(raw),
            (None, None) => Ok(Self::default()),
        }
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let config: SegmentationConfig =
            serde_json::from_str(raw).context("Failed to parse configuration JSON")?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.chunking.token_budget > 0,
            "token_budget must be greater than zero"
        );
        ensure!(
            self.chunking.overlap_seconds >= 0.0,
            "overlap_seconds must be non-negative"
        );
        ensure!(
            !self.analysis.endpoint.trim().is_empty(),
            "analysis endpoint must not be empty"
        );
        ensure!(
            !self.analysis.model.trim().is_empty(),
            "analysis model must not be empty"
        );
        ensure!(self.analysis.timeout_secs > 0, "timeout must be positive");
        ensure!(
            self.analysis.max_in_flight > 0,
            "max_in_flight must be at least 1"
        );
        ensure!(self.merge.epsilon >= 0.0, "epsilon must be non-negative");
        ensure!(
            self.merge.fallback_max_span > 0.0,
            "fallback_max_span must be positive"
        );
        ensure!(
            self.normalize.min_segment_duration >= 0.0,
            "min_segment_duration must be non-negative"
        );
        ensure!(
            self.normalize.max_segments > 0,
            "max_segments must be at least 1"
        );
        ensure!(
            self.normalize.max_title_len > 0,
            "max_title_len must be at least 1"
        );
        Ok(())
    }
}
