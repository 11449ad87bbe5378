use std::cmp::Ordering;

use tracing::debug;

use crate::types::{Chunk, ChunkResult, CutPoint};

/// Gather reported cut points plus fallbacks for every chunk without a result, sorted.
pub fn collect_cut_points(
    results: &[Option<ChunkResult>],
    chunks: &[Chunk],
    duration: f64,
    fallback_max_span: f64,
) -> Vec<CutPoint> {
    let mut cuts: Vec<CutPoint> = results
        .iter()
        .flatten()
        .flat_map(|result| result.cut_points.iter().copied())
        .collect();

    let failed: Vec<&Chunk> = chunks
        .iter()
        .filter(|chunk| results.get(chunk.index).and_then(Option::as_ref).is_none())
        .collect();
    if !chunks.is_empty() && failed.len() == chunks.len() {
        debug!("every chunk failed; splitting the timeline evenly");
        cuts.extend(even_split(duration, fallback_max_span));
    } else {
        for chunk in failed {
            debug!(chunk = chunk.index, "synthesizing fallback cut at chunk midpoint");
            cuts.push(CutPoint::fallback(chunk.time_range.midpoint(), chunk.index));
        }
    }

    cuts.retain(|cut| cut.timestamp.is_finite());
    cuts.sort_by(|a, b| {
        a.timestamp
            .total_cmp(&b.timestamp)
            .then(a.source_chunk.cmp(&b.source_chunk))
    });
    cuts
}

/// Low-confidence cuts every `min(max_span, duration / 3)` seconds.
pub fn even_split(duration: f64, max_span: f64) -> Vec<CutPoint> {
    if duration <= 0.0 {
        return Vec::new();
    }
    let span = max_span.min(duration / 3.0);
    let count = (duration / span - 1e-9).ceil() as usize;
    (1..count)
        .map(|step| CutPoint::fallback(step as f64 * span, 0))
        .collect()
}

/// Collapse cut points closer than `epsilon`, keeping the strongest of each cluster.
///
/// Input must be sorted by timestamp. A list without such pairs comes back unchanged.
pub fn deduplicate(cuts: &[CutPoint], epsilon: f64) -> Vec<CutPoint> {
    let mut kept: Vec<CutPoint> = Vec::with_capacity(cuts.len());
    for cut in cuts {
        match kept.last_mut() {
            Some(last) if cut.timestamp - last.timestamp <= epsilon => {
                if outranks(cut, last) {
                    *last = *cut;
                }
            }
            _ => kept.push(*cut),
        }
    }
    kept
}

/// Higher confidence, then reported over synthesized, then earlier source chunk.
fn outranks(candidate: &CutPoint, incumbent: &CutPoint) -> bool {
    candidate
        .confidence
        .cmp(&incumbent.confidence)
        .then(incumbent.fallback.cmp(&candidate.fallback))
        .then(incumbent.source_chunk.cmp(&candidate.source_chunk))
        == Ordering::Greater
}

/// Drop cuts that coincide (within `epsilon`) with the implicit boundaries at 0 and duration.
pub fn absorb_boundaries(cuts: Vec<CutPoint>, duration: f64, epsilon: f64) -> Vec<CutPoint> {
    cuts.into_iter()
        .filter(|cut| cut.timestamp > epsilon && duration - cut.timestamp > epsilon)
        .collect()
}

/// Attribute each cut to the chunk whose novel range holds it; shared edges go to the later chunk.
pub fn resolve_seams(cuts: &mut [CutPoint], chunks: &[Chunk]) {
    for cut in cuts.iter_mut() {
        if let Some(owner) = owning_chunk(chunks, cut.timestamp) {
            if owner != cut.source_chunk {
                debug!(
                    timestamp = cut.timestamp,
                    from = cut.source_chunk,
                    to = owner,
                    "reattributed cut point across chunk seam"
                );
                cut.source_chunk = owner;
            }
        }
    }
}

pub fn owning_chunk(chunks: &[Chunk], timestamp: f64) -> Option<usize> {
    chunks
        .iter()
        .filter(|chunk| chunk.time_range.contains(timestamp))
        .map(|chunk| chunk.index)
        .max()
}
