//! Output artifact - the segment list handed to export and review

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Serialize, Serializer};

use crate::types::{Segment, Transcript};

/// Non-fatal problem noticed during a run, attached to the report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineWarning {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_index: Option<usize>,
    pub message: String,
}

impl PipelineWarning {
    pub fn for_chunk(chunk_index: usize, message: impl Into<String>) -> Self {
        Self {
            chunk_index: Some(chunk_index),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct AnalysisSummary {
    pub chunks: usize,
    pub analyzed: usize,
    pub failed: usize,
    /// Chunks that only succeeded after at least one retry
    pub retried: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentationReport {
    pub duration: f64,
    #[serde(serialize_with = "serialize_segments")]
    pub segments: Vec<Segment>,
    pub flagged_ordinals: Vec<usize>,
    pub warnings: Vec<PipelineWarning>,
    pub keywords: BTreeSet<String>,
    pub locations: BTreeSet<String>,
    pub analysis: AnalysisSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript: Option<Transcript>,
}

impl SegmentationReport {
    pub fn new(duration: f64, segments: Vec<Segment>, analysis: AnalysisSummary) -> Self {
        let flagged_ordinals = segments
            .iter()
            .filter(|segment| segment.needs_review)
            .map(|segment| segment.ordinal)
            .collect();
        Self {
            duration,
            segments,
            flagged_ordinals,
            warnings: Vec::new(),
            keywords: BTreeSet::new(),
            locations: BTreeSet::new(),
            analysis,
            transcript: None,
        }
    }

    pub fn with_transcript(mut self, transcript: Transcript) -> Self {
        self.transcript = Some(transcript);
        self
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize segmentation report")
    }
}

#[derive(Serialize)]
struct LabeledSegment<'a> {
    #[serde(flatten)]
    segment: &'a Segment,
    duration_label: String,
}

fn serialize_segments<S: Serializer>(segments: &[Segment], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(segments.iter().map(|segment| LabeledSegment {
        segment,
        duration_label: format_duration(segment.duration()),
    }))
}

/// `MmSSs` label, e.g. `2m05s`; sub-second remainders are dropped.
pub fn format_duration(seconds: f64) -> String {
    let whole = if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    };
    format!("{}m{:02}s", whole / 60, whole % 60)
}

pub fn write_report(path: &Path, report: &SegmentationReport) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create output directory {}", parent.display()))?;
    }
    let json = report.to_json()?;
    fs::write(path, json)
        .with_context(|| format!("Failed to write report to {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(ordinal: usize, start: f64, end: f64, needs_review: bool) -> Segment {
        Segment {
            ordinal,
            start,
            end,
            title: format!("Part {}", ordinal),
            summary: String::new(),
            keywords: BTreeSet::new(),
            needs_review,
        }
    }

    #[test]
    fn formats_minutes_and_seconds() {
        assert_eq!(format_duration(0.0), "0m00s");
        assert_eq!(format_duration(125.9), "2m05s");
        assert_eq!(format_duration(3600.0), "60m00s");
        assert_eq!(format_duration(f64::NAN), "0m00s");
    }

    #[test]
    fn report_lists_flagged_ordinals_and_labels() {
        let report = SegmentationReport::new(
            200.0,
            vec![segment(1, 0.0, 65.0, false), segment(2, 65.0, 200.0, true)],
            AnalysisSummary::default(),
        );
        assert_eq!(report.flagged_ordinals, vec![2]);

        let value: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(value["segments"][0]["duration_label"], "1m05s");
        assert_eq!(value["segments"][1]["title"], "Part 2");
        assert!(value.get("transcript").is_none());
    }

    #[test]
    fn writes_into_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("segments.json");
        let report = SegmentationReport::new(
            40.0,
            vec![segment(1, 0.0, 40.0, false)],
            AnalysisSummary::default(),
        );
        write_report(&path, &report).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("\"flagged_ordinals\""));
    }
}
