//! Segment merger - reconciles per-chunk results into one ordered timeline

pub mod cuts;
pub mod materialize;

use std::collections::BTreeSet;

use tracing::info;

use crate::config::MergeConfig;
use crate::types::{Chunk, ChunkResult, CutPoint};

pub use materialize::materialize;

/// Span between two consecutive global cuts, before normalization
#[derive(Debug, Clone, PartialEq)]
pub struct ProvisionalSegment {
    pub start: f64,
    pub end: f64,
    pub title: String,
    pub summary: String,
    pub keywords: BTreeSet<String>,
    /// Cut separating this segment from its predecessor; `None` for the first segment
    pub leading_cut: Option<CutPoint>,
    pub needs_review: bool,
}

impl ProvisionalSegment {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergedTimeline {
    /// Interior cuts only; the edges at 0 and duration are implicit
    pub cuts: Vec<CutPoint>,
    pub segments: Vec<ProvisionalSegment>,
}

/// Merge chunk results (a `None` slot marks a failed chunk) into provisional segments
/// covering `[0, duration]`.
pub fn merge_results(
    results: &[Option<ChunkResult>],
    chunks: &[Chunk],
    duration: f64,
    config: MergeConfig,
) -> MergedTimeline {
    let collected = cuts::collect_cut_points(results, chunks, duration, config.fallback_max_span);
    let candidates = collected.len();
    let deduped = cuts::deduplicate(&collected, config.epsilon);
    let mut global = cuts::absorb_boundaries(deduped, duration, config.epsilon);
    cuts::resolve_seams(&mut global, chunks);

    let segments = materialize(&global, results, chunks, duration);
    info!(
        candidates,
        cuts = global.len(),
        fallbacks = global.iter().filter(|cut| cut.fallback).count(),
        segments = segments.len(),
        "merged chunk results into timeline"
    );
    MergedTimeline {
        cuts: global,
        segments,
    }
}
