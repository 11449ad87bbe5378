//! Transcript module - reads the artifact produced by the upstream transcriber
//!
//! The transcriber is not guaranteed to emit perfectly ordered, non-overlapping units,
//! so loading also repairs minor timing defects before anything downstream sees them.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::chunking::ChunkingError;
use crate::types::{SpeechSegment, Transcript, Word};

#[derive(Debug, Deserialize)]
struct RawTranscript {
    #[serde(default)]
    segments: Vec<SpeechSegment>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    metadata: Option<RawMetadata>,
}

#[derive(Debug, Deserialize)]
struct RawMetadata {
    #[serde(default)]
    total_duration: Option<f64>,
}

/// Read and sanitize a transcript JSON file.
pub fn load_transcript(path: &Path) -> Result<Transcript> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read transcript {:?}", path))?;
    let transcript = parse_transcript(&data)
        .with_context(|| format!("Invalid transcript in {:?}", path))?;
    Ok(transcript)
}

pub fn parse_transcript(raw: &str) -> Result<Transcript> {
    let raw: RawTranscript =
        serde_json::from_str(raw).context("Failed to parse transcript JSON")?;
    let declared = raw
        .duration
        .or_else(|| raw.metadata.and_then(|meta| meta.total_duration));
    Ok(build_transcript(raw.segments, declared)?)
}

/// Build a transcript from upstream segments, repairing ordering and overlap.
pub fn build_transcript(
    segments: Vec<SpeechSegment>,
    declared_duration: Option<f64>,
) -> std::result::Result<Transcript, ChunkingError> {
    if segments.iter().all(|segment| segment.text.trim().is_empty()) {
        return Err(ChunkingError::EmptyTranscript);
    }
    for (idx, segment) in segments.iter().enumerate() {
        if !segment.start.is_finite() || !segment.end.is_finite() {
            return Err(ChunkingError::InvalidTimestamp { segment: idx });
        }
    }

    let mut segments = segments;
    segments.sort_by(|a, b| a.start.total_cmp(&b.start));

    let mut cursor = 0.0_f64;
    let mut repaired = 0usize;
    for segment in &mut segments {
        let original = (segment.start, segment.end);
        segment.start = segment.start.max(cursor).max(0.0);
        segment.end = segment.end.max(segment.start);
        sanitize_words(&mut segment.words, segment.start, segment.end);
        if (segment.start, segment.end) != original {
            repaired += 1;
        }
        cursor = segment.end;
    }
    if repaired > 0 {
        warn!(repaired, "repaired overlapping or inverted transcript segments");
    }

    let last_end = segments.last().map(|segment| segment.end).unwrap_or(0.0);
    let duration = match declared_duration {
        Some(value) if value.is_finite() => value.max(last_end),
        _ => last_end,
    };
    if duration <= 0.0 {
        return Err(ChunkingError::EmptyTranscript);
    }
    debug!(segments = segments.len(), duration, "transcript ready");

    Ok(Transcript { segments, duration })
}

fn sanitize_words(words: &mut Vec<Word>, start: f64, end: f64) {
    words.retain(|word| word.start.is_finite() && word.end.is_finite());
    for word in words.iter_mut() {
        word.start = word.start.clamp(start, end);
        word.end = word.end.clamp(word.start, end);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_transcriber_metadata_duration() {
        let json = r#"{
            "text": "Bonjour. Au revoir.",
            "segments": [
                {"id": 0, "start": 0.0, "end": 15.5, "text": "Bonjour.", "confidence": 0.9},
                {"id": 1, "start": 16.0, "end": 35.2, "text": "Au revoir.",
                 "words": [{"word": "Au", "start": 16.0, "end": 16.4}]}
            ],
            "metadata": {"total_duration": 40.0, "total_words": 3}
        }"#;
        let transcript = parse_transcript(json).unwrap();
        assert_eq!(transcript.segments.len(), 2);
        assert_eq!(transcript.duration, 40.0);
        assert_eq!(transcript.segments[1].words[0].text, "Au");
    }

    #[test]
    fn duration_never_shorter_than_last_segment() {
        let json = r#"{"segments": [{"start": 0.0, "end": 12.0, "text": "hi"}], "duration": 5.0}"#;
        let transcript = parse_transcript(json).unwrap();
        assert_eq!(transcript.duration, 12.0);
    }

    #[test]
    fn repairs_overlap_and_inversion() {
        let segments = vec![
            SpeechSegment::new(10.0, 20.0, "second"),
            SpeechSegment::new(0.0, 11.0, "first"),
            SpeechSegment::new(25.0, 24.0, "inverted"),
        ];
        let transcript = build_transcript(segments, None).unwrap();
        let spans: Vec<(f64, f64)> = transcript
            .segments
            .iter()
            .map(|segment| (segment.start, segment.end))
            .collect();
        assert_eq!(spans, vec![(0.0, 11.0), (11.0, 20.0), (25.0, 25.0)]);
        assert_eq!(transcript.duration, 25.0);
    }

    #[test]
    fn rejects_blank_transcript() {
        let segments = vec![SpeechSegment::new(0.0, 3.0, "   ")];
        assert!(matches!(
            build_transcript(segments, Some(3.0)),
            Err(ChunkingError::EmptyTranscript)
        ));
        assert!(matches!(
            build_transcript(Vec::new(), None),
            Err(ChunkingError::EmptyTranscript)
        ));
    }

    #[test]
    fn rejects_non_finite_timestamps() {
        let segments = vec![SpeechSegment::new(0.0, f64::NAN, "oops")];
        assert!(matches!(
            build_transcript(segments, None),
            Err(ChunkingError::InvalidTimestamp { segment: 0 })
        ));
    }
}
