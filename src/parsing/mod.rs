//! Response parser - turns a free-text service reply into a validated chunk result

mod extract;
mod schema;

use std::collections::BTreeSet;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::analysis::ChunkAnalysisFailure;
use crate::types::{ChunkResult, CutPoint, ThemeCandidate, TimeRange};

pub use extract::extract_object;
use schema::{RawCutPoint, RawReply, RawTheme};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    #[error("no well-formed JSON object found in reply")]
    NoStructuredBlock,

    #[error("reply does not match the expected schema: {0}")]
    Schema(String),

    #[error("no theme inside the chunk range ({discarded} discarded)")]
    NoThemes { discarded: usize },
}

/// Why a chunk contributes a fallback instead of a result
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ChunkFailure {
    #[error(transparent)]
    Analysis(#[from] ChunkAnalysisFailure),

    #[error("chunk {chunk_index} reply rejected: {error}")]
    Parse { chunk_index: usize, error: ParseError },
}

impl ChunkFailure {
    pub fn chunk_index(&self) -> usize {
        match self {
            ChunkFailure::Analysis(failure) => failure.chunk_index,
            ChunkFailure::Parse { chunk_index, .. } => *chunk_index,
        }
    }
}

/// Per-chunk outcome; only `Analyzed` results take part in merging
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkOutcome {
    Analyzed(ChunkResult),
    Failed(ChunkFailure),
}

impl ChunkOutcome {
    pub fn result(&self) -> Option<&ChunkResult> {
        match self {
            ChunkOutcome::Analyzed(result) => Some(result),
            ChunkOutcome::Failed(_) => None,
        }
    }
}

/// Parse a raw reply for chunk `chunk_index`, keeping only claims inside `range`.
pub fn parse_reply(
    chunk_index: usize,
    reply: &str,
    range: TimeRange,
) -> Result<ChunkResult, ParseError> {
    let object = extract_object(reply).ok_or_else(|| {
        debug!(chunk = chunk_index, reply = %preview(reply), "no JSON object in reply");
        ParseError::NoStructuredBlock
    })?;
    let raw: RawReply = serde_json::from_value(Value::Object(object))
        .map_err(|e| ParseError::Schema(e.to_string()))?;

    let theme_count = raw.themes.len();
    let themes: Vec<ThemeCandidate> = raw
        .themes
        .into_iter()
        .filter_map(|theme| clamp_theme(theme, range))
        .collect();
    if themes.is_empty() {
        return Err(ParseError::NoThemes {
            discarded: theme_count,
        });
    }

    let cut_count = raw.cut_points.len();
    let cut_points: Vec<CutPoint> = raw
        .cut_points
        .into_iter()
        .filter_map(|cut| validate_cut(cut, range, chunk_index))
        .collect();

    let discarded = (theme_count - themes.len()) + (cut_count - cut_points.len());
    if discarded > 0 {
        warn!(
            chunk = chunk_index,
            discarded,
            "discarded themes or cut points outside the chunk range"
        );
    }

    Ok(ChunkResult {
        chunk_index,
        themes,
        cut_points,
        keywords: clean_set(raw.keywords),
        locations: clean_set(raw.locations),
    })
}

fn clamp_theme(theme: RawTheme, range: TimeRange) -> Option<ThemeCandidate> {
    if theme.start > theme.end {
        return None;
    }
    let start = theme.start.max(range.start);
    let end = theme.end.min(range.end);
    if end <= start {
        return None;
    }
    Some(ThemeCandidate {
        title: theme.title.trim().to_string(),
        start,
        end,
        justification: theme.justification.trim().to_string(),
        keywords: clean_set(theme.keywords),
    })
}

fn validate_cut(cut: RawCutPoint, range: TimeRange, chunk_index: usize) -> Option<CutPoint> {
    if !range.contains(cut.timestamp) {
        return None;
    }
    let confidence = match cut.confidence {
        Some(raw) => raw.resolve()?,
        None => crate::types::Confidence::Medium,
    };
    Some(CutPoint::new(cut.timestamp, confidence, chunk_index))
}

fn clean_set(values: Vec<String>) -> BTreeSet<String> {
    values
        .into_iter()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .collect()
}

fn preview(reply: &str) -> String {
    reply.chars().take(200).collect()
}
