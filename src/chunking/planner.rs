use tracing::{debug, info, warn};

use crate::config::ChunkingConfig;
use crate::types::{join_texts, Chunk, TimeRange, Transcript};

use super::accumulator::{ChunkAccumulator, SpanGroup};
use super::spans::{build_spans, estimate_tokens};
use super::ChunkingError;

/// Split a transcript into token-bounded chunks aligned to segment boundaries.
///
/// The novel time ranges of the returned chunks partition `[0, duration]`; every chunk after
/// the first repeats a short tail of its predecessor as context.
pub fn plan_chunks(
    transcript: &Transcript,
    config: ChunkingConfig,
) -> Result<Vec<Chunk>, ChunkingError> {
    if !transcript.duration.is_finite() || transcript.duration <= 0.0 {
        return Err(ChunkingError::InvalidDuration(transcript.duration));
    }
    if transcript.full_text().is_empty() {
        return Err(ChunkingError::EmptyTranscript);
    }

    let mut accumulator = ChunkAccumulator::new();
    for span in build_spans(transcript) {
        accumulator.handle_span(span, config.token_budget);
    }
    accumulator.finish_chunk();
    let groups = accumulator.into_groups();

    let boundaries = range_boundaries(transcript, &groups);
    let mut chunks = Vec::with_capacity(groups.len());
    for (index, group) in groups.iter().enumerate() {
        let overlap_ids = match index {
            0 => Vec::new(),
            _ => select_overlap(transcript, &groups[index - 1], group, config),
        };
        let context_overlap = segment_text(transcript, &overlap_ids);
        let novel = segment_text(transcript, &group.segment_ids);
        let text = if context_overlap.is_empty() {
            novel
        } else {
            format!("{} {}", context_overlap, novel)
        };
        let token_estimate = group.tokens + estimate_ids(transcript, &overlap_ids);
        if group.oversized {
            warn!(
                chunk = index,
                tokens = group.tokens,
                budget = config.token_budget,
                "single transcript segment exceeds token budget; emitting oversized chunk"
            );
        }
        chunks.push(Chunk {
            index,
            text,
            time_range: TimeRange::new(boundaries[index], boundaries[index + 1]),
            token_estimate,
            context_overlap,
            source_segment_ids: group.segment_ids.clone(),
            overlap_segment_ids: overlap_ids,
            oversized: group.oversized,
        });
    }

    info!(
        chunks = chunks.len(),
        duration = transcript.duration,
        "transcript split into chunks"
    );
    Ok(chunks)
}

/// Edges of the novel time ranges: `0`, the first segment start of each later chunk, duration.
fn range_boundaries(transcript: &Transcript, groups: &[SpanGroup]) -> Vec<f64> {
    let mut boundaries = Vec::with_capacity(groups.len() + 1);
    boundaries.push(0.0);
    let mut previous = 0.0_f64;
    for group in groups.iter().skip(1) {
        let first = group.segment_ids[0];
        let edge = transcript.segments[first]
            .start
            .max(previous)
            .min(transcript.duration);
        boundaries.push(edge);
        previous = edge;
    }
    boundaries.push(transcript.duration);
    boundaries
}

/// Trailing segments of the previous group, limited by count, recency and remaining budget.
fn select_overlap(
    transcript: &Transcript,
    previous: &SpanGroup,
    current: &SpanGroup,
    config: ChunkingConfig,
) -> Vec<usize> {
    let Some(&last) = previous.segment_ids.last() else {
        return Vec::new();
    };
    let previous_end = transcript.segments[last].end;
    let mut remaining = config.token_budget.saturating_sub(current.tokens);
    let mut selected = Vec::new();
    for &idx in previous.segment_ids.iter().rev() {
        if selected.len() >= config.overlap_segments {
            break;
        }
        let segment = &transcript.segments[idx];
        if segment.end < previous_end - config.overlap_seconds {
            break;
        }
        let tokens = estimate_tokens(&segment.text);
        if tokens > remaining {
            break;
        }
        remaining -= tokens;
        selected.push(idx);
    }
    selected.reverse();
    debug!(
        segments = selected.len(),
        "selected overlap context from previous chunk"
    );
    selected
}

fn segment_text(transcript: &Transcript, ids: &[usize]) -> String {
    join_texts(ids.iter().map(|&idx| transcript.segments[idx].text.as_str()))
}

fn estimate_ids(transcript: &Transcript, ids: &[usize]) -> usize {
    ids.iter()
        .map(|&idx| estimate_tokens(&transcript.segments[idx].text))
        .sum()
}
