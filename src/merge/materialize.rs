use std::collections::BTreeSet;

use crate::types::{Chunk, ChunkResult, CutPoint, ThemeCandidate, TimeRange};

use super::cuts::owning_chunk;
use super::ProvisionalSegment;

/// Build one provisional segment between each pair of consecutive edges
/// (`0`, the cuts, `duration`), titled after the theme that overlaps it most.
pub fn materialize(
    cuts: &[CutPoint],
    results: &[Option<ChunkResult>],
    chunks: &[Chunk],
    duration: f64,
) -> Vec<ProvisionalSegment> {
    // Declaration order: chunk order, then the order the service listed them.
    let themes: Vec<&ThemeCandidate> = results
        .iter()
        .flatten()
        .flat_map(|result| result.themes.iter())
        .collect();

    let mut edges = Vec::with_capacity(cuts.len() + 2);
    edges.push(0.0);
    edges.extend(cuts.iter().map(|cut| cut.timestamp));
    edges.push(duration);

    edges
        .windows(2)
        .enumerate()
        .map(|(idx, pair)| {
            let range = TimeRange::new(pair[0], pair[1]);
            let leading_cut = idx.checked_sub(1).map(|prev| cuts[prev]);
            let trailing_cut = cuts.get(idx).copied();
            let best = best_theme(&themes, range);
            let keywords = match best {
                Some(theme) if !theme.keywords.is_empty() => theme.keywords.clone(),
                _ => chunk_keywords(results, chunks, range.start),
            };
            let needs_review = leading_cut.is_some_and(|cut| cut.fallback)
                || trailing_cut.is_some_and(|cut| cut.fallback);
            ProvisionalSegment {
                start: range.start,
                end: range.end,
                title: best.map(|theme| theme.title.clone()).unwrap_or_default(),
                summary: best
                    .map(|theme| theme.justification.clone())
                    .unwrap_or_default(),
                keywords,
                leading_cut,
                needs_review,
            }
        })
        .collect()
}

/// Maximal overlap wins; on a tie the earliest-declared theme is kept.
fn best_theme<'a>(themes: &[&'a ThemeCandidate], range: TimeRange) -> Option<&'a ThemeCandidate> {
    let mut best: Option<(&ThemeCandidate, f64)> = None;
    for &theme in themes {
        let overlap = theme.range().overlap(&range);
        if overlap <= 0.0 {
            continue;
        }
        match best {
            Some((_, top)) if overlap <= top => {}
            _ => best = Some((theme, overlap)),
        }
    }
    best.map(|(theme, _)| theme)
}

fn chunk_keywords(
    results: &[Option<ChunkResult>],
    chunks: &[Chunk],
    timestamp: f64,
) -> BTreeSet<String> {
    owning_chunk(chunks, timestamp)
        .and_then(|owner| results.get(owner))
        .and_then(Option::as_ref)
        .map(|result| result.keywords.clone())
        .unwrap_or_default()
}
