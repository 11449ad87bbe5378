//! Orchestration - chunk, analyze, merge and normalize with progress events

mod runtime;

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{channel, Sender};
use std::sync::Arc;
use std::thread;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::analysis::{AnalysisService, ChunkAnalyzer, RetryPolicy};
use crate::chunking::{plan_chunks, ChunkingError};
use crate::config::SegmentationConfig;
use crate::merge::merge_results;
use crate::normalize::{normalize, InvariantViolation};
use crate::parsing::{parse_reply, ChunkFailure, ChunkOutcome};
use crate::report::{AnalysisSummary, PipelineWarning, SegmentationReport};
use crate::types::{Chunk, ChunkResult, Transcript};

pub use runtime::SegmentationRuntime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Chunking,
    Analysis,
    Merging,
    Normalizing,
    Done,
}

/// One entry of the ordered progress stream
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineEvent {
    pub stage: Stage,
    pub percent: u8,
    pub message: String,
    pub warnings: Vec<PipelineWarning>,
}

impl PipelineEvent {
    fn new(stage: Stage, percent: u8, message: impl Into<String>) -> Self {
        Self {
            stage,
            percent,
            message: message.into(),
            warnings: Vec::new(),
        }
    }

    fn with_warnings(mut self, warnings: Vec<PipelineWarning>) -> Self {
        self.warnings = warnings;
        self
    }
}

/// Cooperative cancellation flag, checked before each chunk is picked up.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    Completed(SegmentationReport),
    Cancelled,
}

#[derive(Debug, Error)]
pub enum SegmentationError {
    #[error(transparent)]
    Chunking(#[from] ChunkingError),

    #[error(transparent)]
    InvariantViolation(#[from] InvariantViolation),

    #[error("segmentation worker failed: {0}")]
    Worker(String),
}

const ANALYSIS_START: u8 = 10;
const ANALYSIS_END: u8 = 80;

/// Per-chunk record gathered by the analysis stage
#[derive(Debug, Clone)]
struct ChunkRecord {
    outcome: ChunkOutcome,
    retried: bool,
}

/// Run the whole engine on the calling thread.
///
/// Per-chunk failures degrade to fallback cuts and show up as warnings; only an unusable
/// transcript or a broken timeline invariant is an error.
pub fn run_segmentation(
    transcript: &Transcript,
    config: &SegmentationConfig,
    service: &dyn AnalysisService,
    events: &Sender<PipelineEvent>,
    cancel: &CancelToken,
) -> Result<PipelineOutcome, SegmentationError> {
    emit(events, PipelineEvent::new(Stage::Chunking, 0, "Splitting transcript"));
    let chunks = plan_chunks(transcript, config.chunking)?;
    let mut warnings: Vec<PipelineWarning> = chunks
        .iter()
        .filter(|chunk| chunk.oversized)
        .map(|chunk| {
            PipelineWarning::for_chunk(
                chunk.index,
                format!(
                    "chunk exceeds the token budget ({} tokens)",
                    chunk.token_estimate
                ),
            )
        })
        .collect();
    emit(
        events,
        PipelineEvent::new(
            Stage::Chunking,
            ANALYSIS_START,
            format!("Planned {} chunk(s)", chunks.len()),
        )
        .with_warnings(warnings.clone()),
    );

    let Some(records) = analyze_chunks(transcript, &chunks, config, service, events, cancel)
    else {
        info!("segmentation cancelled during analysis");
        return Ok(PipelineOutcome::Cancelled);
    };
    if cancel.is_cancelled() {
        info!("segmentation cancelled before merging");
        return Ok(PipelineOutcome::Cancelled);
    }

    let mut summary = AnalysisSummary {
        chunks: chunks.len(),
        ..AnalysisSummary::default()
    };
    let mut keywords = BTreeSet::new();
    let mut locations = BTreeSet::new();
    let mut results: Vec<Option<ChunkResult>> = Vec::with_capacity(records.len());
    for record in records {
        match record.outcome {
            ChunkOutcome::Analyzed(result) => {
                summary.analyzed += 1;
                if record.retried {
                    summary.retried += 1;
                }
                keywords.extend(result.keywords.iter().cloned());
                locations.extend(result.locations.iter().cloned());
                results.push(Some(result));
            }
            ChunkOutcome::Failed(failure) => {
                summary.failed += 1;
                warnings.push(failure_warning(&failure));
                results.push(None);
            }
        }
    }

    emit(events, PipelineEvent::new(Stage::Merging, ANALYSIS_END, "Merging chunk results"));
    let merged = merge_results(&results, &chunks, transcript.duration, config.merge);

    emit(events, PipelineEvent::new(Stage::Normalizing, 90, "Normalizing segments"));
    let segments = normalize(merged.segments, transcript.duration, config.normalize)?;

    let mut report = SegmentationReport::new(transcript.duration, segments, summary);
    report.keywords = keywords;
    report.locations = locations;
    report.warnings = warnings;
    info!(
        segments = report.segments.len(),
        flagged = report.flagged_ordinals.len(),
        failed_chunks = summary.failed,
        "segmentation complete"
    );
    emit(
        events,
        PipelineEvent::new(
            Stage::Done,
            100,
            format!("Produced {} segment(s)", report.segments.len()),
        )
        .with_warnings(report.warnings.clone()),
    );
    Ok(PipelineOutcome::Completed(report))
}

/// Analyze every chunk with at most `max_in_flight` concurrent requests.
///
/// Results land in a per-index slot array so merge order never depends on completion order.
/// Returns `None` when cancelled.
fn analyze_chunks(
    transcript: &Transcript,
    chunks: &[Chunk],
    config: &SegmentationConfig,
    service: &dyn AnalysisService,
    events: &Sender<PipelineEvent>,
    cancel: &CancelToken,
) -> Option<Vec<ChunkRecord>> {
    let total = chunks.len();
    let analyzer = ChunkAnalyzer::new(service, RetryPolicy::from(&config.analysis));
    let workers = config.analysis.max_in_flight.clamp(1, total.max(1));
    let next = AtomicUsize::new(0);
    let mut slots: Vec<Option<ChunkRecord>> = vec![None; total];
    debug!(chunks = total, workers, "starting chunk analysis");

    thread::scope(|scope| {
        let (tx, rx) = channel::<(usize, ChunkRecord)>();
        for _ in 0..workers {
            let tx = tx.clone();
            let analyzer = &analyzer;
            let next = &next;
            scope.spawn(move || loop {
                if cancel.is_cancelled() {
                    break;
                }
                let idx = next.fetch_add(1, Ordering::SeqCst);
                let Some(chunk) = chunks.get(idx) else {
                    break;
                };
                let record = process_chunk(analyzer, chunk, transcript, total);
                if tx.send((idx, record)).is_err() {
                    break;
                }
            });
        }
        drop(tx);

        let mut completed = 0usize;
        for (idx, record) in rx {
            completed += 1;
            let mut event = PipelineEvent::new(
                Stage::Analysis,
                analysis_percent(completed, total),
                format!("Analyzed chunk {}/{}", completed, total),
            );
            if let ChunkOutcome::Failed(failure) = &record.outcome {
                event = event.with_warnings(vec![failure_warning(failure)]);
            }
            if let Some(slot) = slots.get_mut(idx) {
                if slot.is_none() {
                    *slot = Some(record);
                }
            }
            emit(events, event);
        }
    });

    if cancel.is_cancelled() {
        return None;
    }
    slots.into_iter().collect()
}

fn process_chunk(
    analyzer: &ChunkAnalyzer<'_>,
    chunk: &Chunk,
    transcript: &Transcript,
    total: usize,
) -> ChunkRecord {
    let reply = match analyzer.analyze(chunk, transcript, total) {
        Ok(reply) => reply,
        Err(failure) => {
            warn!(chunk = chunk.index, error = %failure, "chunk analysis exhausted retries");
            return ChunkRecord {
                outcome: ChunkOutcome::Failed(failure.into()),
                retried: false,
            };
        }
    };
    let retried = reply.succeeded_on_retry();
    let outcome = match parse_reply(chunk.index, &reply.text, chunk.time_range) {
        Ok(result) => ChunkOutcome::Analyzed(result),
        Err(error) => {
            warn!(chunk = chunk.index, error = %error, "chunk reply rejected");
            ChunkOutcome::Failed(ChunkFailure::Parse {
                chunk_index: chunk.index,
                error,
            })
        }
    };
    ChunkRecord { outcome, retried }
}

fn failure_warning(failure: &ChunkFailure) -> PipelineWarning {
    PipelineWarning::for_chunk(
        failure.chunk_index(),
        format!("{}; fallback cut used", failure),
    )
}

fn analysis_percent(completed: usize, total: usize) -> u8 {
    let span = (ANALYSIS_END - ANALYSIS_START) as usize;
    let done = completed.min(total) * span / total.max(1);
    ANALYSIS_START + done as u8
}

fn emit(events: &Sender<PipelineEvent>, event: PipelineEvent) {
    debug!(stage = ?event.stage, percent = event.percent, message = %event.message, "pipeline progress");
    let _ = events.send(event);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analysis_progress_is_monotone_and_bounded() {
        let values: Vec<u8> = (1..=7).map(|done| analysis_percent(done, 7)).collect();
        assert!(values.windows(2).all(|pair| pair[0] <= pair[1]));
        assert_eq!(values.last(), Some(&ANALYSIS_END));
        assert_eq!(analysis_percent(0, 0), ANALYSIS_START);
    }

    #[test]
    fn cancel_token_is_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!token.is_cancelled());
        clone.cancel();
        assert!(token.is_cancelled());
    }
}
