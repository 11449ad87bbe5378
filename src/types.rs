//! Core types for the thematic segmentation pipeline

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A single timed word inside a speech segment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Word {
    #[serde(alias = "word")]
    pub text: String,
    pub start: f64, // seconds
    pub end: f64,   // seconds
}

/// A sentence-level unit of the transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeechSegment {
    pub start: f64, // seconds
    pub end: f64,   // seconds
    pub text: String,
    #[serde(default)]
    pub words: Vec<Word>,
}

impl SpeechSegment {
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
            words: Vec::new(),
        }
    }
}

/// Sanitized transcript handed to the segmentation engine. Read-only once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transcript {
    pub segments: Vec<SpeechSegment>,
    pub duration: f64,
}

impl Transcript {
    /// Full text with segment texts joined by single spaces, blank segments skipped.
    pub fn full_text(&self) -> String {
        join_texts(self.segments.iter().map(|segment| segment.text.as_str()))
    }
}

pub(crate) fn join_texts<'a>(texts: impl Iterator<Item = &'a str>) -> String {
    texts
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Half-open span of the timeline in seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

impl TimeRange {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    pub fn midpoint(&self) -> f64 {
        self.start + self.duration() / 2.0
    }

    /// Inclusive on both ends; seam attribution decides which side owns a shared edge.
    pub fn contains(&self, timestamp: f64) -> bool {
        timestamp >= self.start && timestamp <= self.end
    }

    pub fn overlap(&self, other: &TimeRange) -> f64 {
        (self.end.min(other.end) - self.start.max(other.start)).max(0.0)
    }
}

/// Token-bounded window of the transcript sent to the analysis service
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub index: usize,
    /// Prompt text: the overlap prefix (if any) followed by the novel text
    pub text: String,
    /// Span of the novel portion only
    pub time_range: TimeRange,
    pub token_estimate: usize,
    pub context_overlap: String,
    /// Indices of transcript segments forming the novel portion
    pub source_segment_ids: Vec<usize>,
    /// Indices of transcript segments repeated from the previous chunk as context
    pub overlap_segment_ids: Vec<usize>,
    /// Set when a single segment alone exceeded the token budget
    pub oversized: bool,
}

impl Chunk {
    /// Chunk text with the overlap prefix removed.
    pub fn novel_text(&self) -> &str {
        self.text
            .strip_prefix(self.context_overlap.as_str())
            .unwrap_or(&self.text)
            .trim_start()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Confidence::Low => "low",
            Confidence::Medium => "medium",
            Confidence::High => "high",
        };
        f.write_str(label)
    }
}

/// A thematic span claimed by the analysis service for one chunk
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThemeCandidate {
    pub title: String,
    pub start: f64,
    pub end: f64,
    pub justification: String,
    pub keywords: BTreeSet<String>,
}

impl ThemeCandidate {
    pub fn range(&self) -> TimeRange {
        TimeRange::new(self.start, self.end)
    }
}

/// Candidate boundary between two themes
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CutPoint {
    pub timestamp: f64,
    pub confidence: Confidence,
    pub source_chunk: usize,
    /// Synthesized for a failed chunk rather than reported by the service
    pub fallback: bool,
}

impl CutPoint {
    pub fn new(timestamp: f64, confidence: Confidence, source_chunk: usize) -> Self {
        Self {
            timestamp,
            confidence,
            source_chunk,
            fallback: false,
        }
    }

    pub fn fallback(timestamp: f64, source_chunk: usize) -> Self {
        Self {
            timestamp,
            confidence: Confidence::Low,
            source_chunk,
            fallback: true,
        }
    }
}

/// Validated analysis of one chunk
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChunkResult {
    pub chunk_index: usize,
    pub themes: Vec<ThemeCandidate>,
    pub cut_points: Vec<CutPoint>,
    pub keywords: BTreeSet<String>,
    pub locations: BTreeSet<String>,
}

/// Final output unit of the timeline
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Segment {
    pub ordinal: usize,
    pub start: f64,
    pub end: f64,
    pub title: String,
    /// Description of the theme the title came from, for the review surface
    pub summary: String,
    pub keywords: BTreeSet<String>,
    /// One of the boundaries (or a boundary merged away inside) was synthesized
    pub needs_review: bool,
}

impl Segment {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}
