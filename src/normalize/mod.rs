//! Segment normalizer - enforces duration and count limits and the final timeline invariants

mod titles;

use std::cmp::Ordering;

use thiserror::Error;
use tracing::{debug, info};

use crate::config::NormalizeConfig;
use crate::merge::ProvisionalSegment;
use crate::types::{Confidence, Segment};

pub use titles::{safe_title, title_similarity};

/// The merger produced a timeline that breaks an output invariant; this is a bug, not bad input.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("timeline invariant violated: {0}")]
pub struct InvariantViolation(pub String);

/// Turn provisional segments into the final, invariant-checked segment list.
pub fn normalize(
    segments: Vec<ProvisionalSegment>,
    duration: f64,
    config: NormalizeConfig,
) -> Result<Vec<Segment>, InvariantViolation> {
    let provisional = segments.len();
    let segments = merge_short_segments(segments, config.min_segment_duration);
    let segments = cap_segment_count(segments, config.max_segments);
    let finals: Vec<Segment> = segments
        .into_iter()
        .enumerate()
        .map(|(idx, segment)| {
            let ordinal = idx + 1;
            Segment {
                ordinal,
                start: segment.start,
                end: segment.end,
                title: safe_title(&segment.title, ordinal, config.max_title_len),
                summary: segment.summary,
                keywords: segment.keywords,
                needs_review: segment.needs_review,
            }
        })
        .collect();

    verify_timeline(&finals, duration, config.min_segment_duration)?;
    info!(
        provisional,
        segments = finals.len(),
        "normalized segment timeline"
    );
    Ok(finals)
}

/// Fold every segment shorter than `min_duration` into a neighbor until none remain.
pub fn merge_short_segments(
    mut segments: Vec<ProvisionalSegment>,
    min_duration: f64,
) -> Vec<ProvisionalSegment> {
    while segments.len() > 1 {
        let Some(idx) = segments
            .iter()
            .position(|segment| segment.duration() < min_duration)
        else {
            break;
        };
        let left = match idx {
            0 => 0,
            _ if idx == segments.len() - 1 => idx - 1,
            _ if prefers_previous(&segments, idx) => idx - 1,
            _ => idx,
        };
        debug!(
            index = idx,
            duration = segments[idx].duration(),
            into = if left == idx { idx + 1 } else { left },
            "merging short segment into neighbor"
        );
        merge_adjacent(&mut segments, left);
    }
    segments
}

/// Neighbor choice for an interior short segment: title similarity weighted by each
/// neighbor's share of their combined duration, then the weaker separating cut.
fn prefers_previous(segments: &[ProvisionalSegment], idx: usize) -> bool {
    let current = &segments[idx];
    let (previous, next) = (&segments[idx - 1], &segments[idx + 1]);
    let total = previous.duration() + next.duration();
    let share = |neighbor: &ProvisionalSegment| {
        if total > 0.0 {
            neighbor.duration() / total
        } else {
            0.5
        }
    };
    let previous_score = title_similarity(&current.title, &previous.title) * share(previous);
    let next_score = title_similarity(&current.title, &next.title) * share(next);
    match previous_score.total_cmp(&next_score) {
        Ordering::Greater => true,
        Ordering::Less => false,
        Ordering::Equal => cut_strength(current) <= cut_strength(&segments[idx + 1]),
    }
}

/// Merge the pair separated by the weakest cut until at most `max_segments` remain.
pub fn cap_segment_count(
    mut segments: Vec<ProvisionalSegment>,
    max_segments: usize,
) -> Vec<ProvisionalSegment> {
    let target = max_segments.max(1);
    while segments.len() > target {
        let Some(right) = (1..segments.len()).min_by(|&a, &b| {
            cut_strength(&segments[a])
                .cmp(&cut_strength(&segments[b]))
                .then_with(|| {
                    combined_duration(&segments, a).total_cmp(&combined_duration(&segments, b))
                })
                .then(a.cmp(&b))
        }) else {
            break;
        };
        debug!(
            at = segments[right].start,
            count = segments.len(),
            "over segment cap; removing weakest cut"
        );
        merge_adjacent(&mut segments, right - 1);
    }
    segments
}

fn cut_strength(segment: &ProvisionalSegment) -> (Confidence, bool) {
    match segment.leading_cut {
        Some(cut) => (cut.confidence, !cut.fallback),
        None => (Confidence::High, true),
    }
}

fn combined_duration(segments: &[ProvisionalSegment], right: usize) -> f64 {
    segments[right - 1].duration() + segments[right].duration()
}

/// Replace `segments[left]` and `segments[left + 1]` with their union.
fn merge_adjacent(segments: &mut Vec<ProvisionalSegment>, left: usize) {
    let right = segments.remove(left + 1);
    let target = &mut segments[left];
    let keep_right_title = target.title.trim().is_empty()
        || (right.duration() > target.duration() && !right.title.trim().is_empty());
    if keep_right_title {
        target.title = right.title;
        target.summary = right.summary;
    }
    target.end = right.end;
    target.keywords.extend(right.keywords);
    target.needs_review |= right.needs_review;
}

/// Final output checks: contiguous ordinals, exact coverage of `[0, duration]`, minimum length.
pub fn verify_timeline(
    segments: &[Segment],
    duration: f64,
    min_duration: f64,
) -> Result<(), InvariantViolation> {
    let (Some(first), Some(last)) = (segments.first(), segments.last()) else {
        return Err(InvariantViolation("timeline is empty".to_string()));
    };
    if first.start != 0.0 {
        return Err(InvariantViolation(format!(
            "first segment starts at {} instead of 0",
            first.start
        )));
    }
    if last.end != duration {
        return Err(InvariantViolation(format!(
            "last segment ends at {} instead of {}",
            last.end, duration
        )));
    }
    for (idx, segment) in segments.iter().enumerate() {
        if segment.ordinal != idx + 1 {
            return Err(InvariantViolation(format!(
                "segment at position {} has ordinal {}",
                idx, segment.ordinal
            )));
        }
        if segment.end <= segment.start {
            return Err(InvariantViolation(format!(
                "segment {} is empty or inverted ({} -> {})",
                segment.ordinal, segment.start, segment.end
            )));
        }
        if segments.len() > 1 && segment.duration() < min_duration {
            return Err(InvariantViolation(format!(
                "segment {} lasts {:.3}s, below the {:.3}s minimum",
                segment.ordinal,
                segment.duration(),
                min_duration
            )));
        }
    }
    for pair in segments.windows(2) {
        if pair[0].end != pair[1].start {
            return Err(InvariantViolation(format!(
                "segments {} and {} are not contiguous ({} != {})",
                pair[0].ordinal, pair[1].ordinal, pair[0].end, pair[1].start
            )));
        }
    }
    Ok(())
}
