use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::channel;
use std::sync::Arc;

use approx::assert_relative_eq;
use serde_json::json;

use themalyzer::analysis::{AnalysisService, ScriptedService, ServiceError};
use themalyzer::chunking::ChunkingError;
use themalyzer::config::SegmentationConfig;
use themalyzer::pipeline::{
    run_segmentation, CancelToken, PipelineEvent, PipelineOutcome, SegmentationError,
    SegmentationRuntime, Stage,
};
use themalyzer::report::SegmentationReport;
use themalyzer::transcription::build_transcript;
use themalyzer::types::{SpeechSegment, Transcript};

/// `count` one-token segments of `seconds_each` seconds.
fn transcript(count: usize, seconds_each: f64) -> Transcript {
    let segments = (0..count)
        .map(|idx| {
            let start = idx as f64 * seconds_each;
            SpeechSegment::new(start, start + seconds_each, "w")
        })
        .collect();
    build_transcript(segments, Some(count as f64 * seconds_each)).unwrap()
}

fn config(token_budget: usize) -> SegmentationConfig {
    let mut config = SegmentationConfig::default();
    config.chunking.token_budget = token_budget;
    config.analysis.retries = 1;
    config.analysis.backoff_base_ms = 0;
    config
}

fn reply(themes: &[(&str, f64, f64)], cuts: &[(f64, &str)]) -> String {
    let themes: Vec<_> = themes
        .iter()
        .map(|(title, start, end)| {
            json!({"title": title, "description": format!("About {}", title), "start": start, "end": end, "keywords": [title.to_lowercase()]})
        })
        .collect();
    let cuts: Vec<_> = cuts
        .iter()
        .map(|(timestamp, confidence)| json!({"timestamp": timestamp, "confidence": confidence}))
        .collect();
    json!({"themes": themes, "cut_points": cuts, "locations": ["Lyon"], "keywords": ["craft"]})
        .to_string()
}

fn run(
    transcript: &Transcript,
    config: &SegmentationConfig,
    service: &dyn AnalysisService,
) -> (Result<PipelineOutcome, SegmentationError>, Vec<PipelineEvent>) {
    let (tx, rx) = channel();
    let outcome = run_segmentation(transcript, config, service, &tx, &CancelToken::new());
    drop(tx);
    (outcome, rx.into_iter().collect())
}

fn completed(outcome: Result<PipelineOutcome, SegmentationError>) -> SegmentationReport {
    match outcome {
        Ok(PipelineOutcome::Completed(report)) => report,
        other => panic!("expected a completed run, got {:?}", other),
    }
}

fn bounds(report: &SegmentationReport) -> Vec<(f64, f64)> {
    report
        .segments
        .iter()
        .map(|segment| (segment.start, segment.end))
        .collect()
}

/// Four 100 s chunks; chunk 3 of 4 always fails.
fn four_chunk_service() -> ScriptedService {
    ScriptedService::new()
        .route("part 1 of 4", reply(&[("Apprenticeship", 0.0, 100.0)], &[]))
        .route(
            "part 2 of 4",
            reply(&[("Bakery", 100.0, 200.0)], &[(100.0, "high")]),
        )
        .route_failure("part 3 of 4", ServiceError::Transport("connection reset".into()))
        .route(
            "part 4 of 4",
            reply(&[("Family", 300.0, 400.0)], &[(300.0, "high")]),
        )
}

#[test]
fn single_chunk_cuts_become_segments() {
    let transcript = transcript(10, 60.0);
    let service = ScriptedService::new().reply(reply(
        &[
            ("Childhood", 0.0, 120.0),
            ("Apprenticeship", 120.0, 340.0),
            ("Moving away", 340.0, 600.0),
        ],
        &[(120.0, "high"), (340.0, "high")],
    ));
    let (outcome, events) = run(&transcript, &config(4000), &service);
    let report = completed(outcome);

    assert_eq!(
        bounds(&report),
        vec![(0.0, 120.0), (120.0, 340.0), (340.0, 600.0)]
    );
    let titles: Vec<&str> = report.segments.iter().map(|s| s.title.as_str()).collect();
    assert_eq!(titles, vec!["Childhood", "Apprenticeship", "Moving away"]);
    assert!(report.segments[1].keywords.contains("apprenticeship"));
    assert_eq!(report.segments[1].summary, "About Apprenticeship");
    assert!(report.flagged_ordinals.is_empty());
    assert!(report.locations.contains("Lyon"));
    assert_eq!(report.analysis.chunks, 1);
    assert_eq!(report.analysis.analyzed, 1);
    assert_eq!(service.calls(), 1);

    let last = events.last().unwrap();
    assert_eq!(last.stage, Stage::Done);
    assert_eq!(last.percent, 100);
    assert!(events.windows(2).all(|pair| pair[0].percent <= pair[1].percent));
}

#[test]
fn near_duplicate_cuts_across_chunks_collapse() {
    let transcript = transcript(20, 20.0);
    let service = ScriptedService::new()
        .route(
            "part 1 of 2",
            reply(&[("Baking", 0.0, 200.0)], &[(199.5, "high")]),
        )
        .route(
            "part 2 of 2",
            reply(&[("Village", 200.0, 400.0)], &[(201.0, "high")]),
        );
    let (outcome, _) = run(&transcript, &config(10), &service);
    let report = completed(outcome);

    assert_eq!(report.analysis.chunks, 2);
    assert_eq!(bounds(&report), vec![(0.0, 199.5), (199.5, 400.0)]);
    assert_eq!(report.segments[0].title, "Baking");
    assert_eq!(report.segments[1].title, "Village");
}

#[test]
fn failed_chunk_degrades_to_midpoint_fallback() {
    let transcript = transcript(40, 10.0);
    let service = four_chunk_service();
    let (outcome, events) = run(&transcript, &config(10), &service);
    let report = completed(outcome);

    assert_eq!(
        bounds(&report),
        vec![(0.0, 100.0), (100.0, 250.0), (250.0, 300.0), (300.0, 400.0)]
    );
    assert_eq!(report.flagged_ordinals, vec![2, 3]);
    assert_eq!(report.segments[2].title, "Segment_3");
    assert_eq!(report.analysis.analyzed, 3);
    assert_eq!(report.analysis.failed, 1);
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(report.warnings[0].chunk_index, Some(2));
    // one retry for the failing chunk
    assert_eq!(service.calls(), 5);
    assert!(events
        .iter()
        .any(|event| event.stage == Stage::Analysis && !event.warnings.is_empty()));
}

#[test]
fn short_segment_merges_into_similar_neighbor() {
    let transcript = transcript(10, 60.0);
    let service = ScriptedService::new().reply(reply(
        &[
            ("Bread baking", 0.0, 100.0),
            ("Village life", 100.0, 112.0),
            ("Village life today", 112.0, 600.0),
        ],
        &[(100.0, "high"), (112.0, "high")],
    ));
    let (outcome, _) = run(&transcript, &config(4000), &service);
    let report = completed(outcome);

    assert_eq!(bounds(&report), vec![(0.0, 100.0), (100.0, 600.0)]);
    assert_eq!(report.segments[1].title, "Village life today");
    assert_eq!(report.segments[1].summary, "About Village life today");
    assert!(report.segments[1].keywords.contains("village life"));
    assert_eq!(report.segments[1].ordinal, 2);
}

#[test]
fn every_chunk_failing_still_covers_timeline() {
    let transcript = transcript(20, 20.0);
    let service = ScriptedService::new();
    let (outcome, _) = run(&transcript, &config(4000), &service);
    let report = completed(outcome);

    assert_eq!(report.segments.len(), 3);
    assert_eq!(report.segments[0].start, 0.0);
    assert_eq!(report.segments[2].end, 400.0);
    assert_relative_eq!(report.segments[0].end, 400.0 / 3.0, epsilon = 1e-9);
    assert_eq!(report.flagged_ordinals, vec![1, 2, 3]);
    assert_eq!(report.analysis.failed, 1);
}

#[test]
fn unparseable_reply_counts_as_failure() {
    let transcript = transcript(10, 60.0);
    let service = ScriptedService::new()
        .reply("I could not find any themes, sorry.")
        .reply("still no JSON");
    let (outcome, _) = run(&transcript, &config(4000), &service);
    let report = completed(outcome);

    assert_eq!(report.analysis.failed, 1);
    assert_eq!(report.segments.last().unwrap().end, 600.0);
    assert!(report.warnings[0].message.contains("rejected"));
    // parse failures are not retried
    assert_eq!(service.calls(), 1);
}

#[test]
fn reply_after_retry_is_counted() {
    let transcript = transcript(10, 60.0);
    let service = ScriptedService::new()
        .fail(ServiceError::Timeout)
        .reply(reply(&[("Whole story", 0.0, 600.0)], &[]));
    let (outcome, _) = run(&transcript, &config(4000), &service);
    let report = completed(outcome);

    assert_eq!(report.analysis.retried, 1);
    assert_eq!(report.segments.len(), 1);
    assert_eq!(report.segments[0].title, "Whole story");
}

#[test]
fn identical_inputs_give_identical_reports() {
    let transcript = transcript(40, 10.0);
    let first = completed(run(&transcript, &config(10), &four_chunk_service()).0);
    let second = completed(run(&transcript, &config(10), &four_chunk_service()).0);
    assert_eq!(first.to_json().unwrap(), second.to_json().unwrap());
}

#[test]
fn parallel_analysis_matches_sequential() {
    let transcript = transcript(40, 10.0);
    let sequential = completed(run(&transcript, &config(10), &four_chunk_service()).0);

    let mut parallel_config = config(10);
    parallel_config.analysis.max_in_flight = 3;
    let service = four_chunk_service();
    let parallel = completed(run(&transcript, &parallel_config, &service).0);

    assert_eq!(sequential, parallel);
    assert_eq!(service.calls(), 5);
}

#[test]
fn empty_transcript_is_fatal() {
    let transcript = Transcript {
        segments: vec![SpeechSegment::new(0.0, 10.0, "   ")],
        duration: 10.0,
    };
    let (outcome, _) = run(&transcript, &config(4000), &ScriptedService::new());
    assert!(matches!(
        outcome,
        Err(SegmentationError::Chunking(ChunkingError::EmptyTranscript))
    ));
}

#[test]
fn cancelled_before_start_makes_no_calls() {
    let transcript = transcript(10, 60.0);
    let service = ScriptedService::new().reply(reply(&[("Story", 0.0, 600.0)], &[]));
    let cancel = CancelToken::new();
    cancel.cancel();
    let (tx, _rx) = channel();
    let outcome = run_segmentation(&transcript, &config(4000), &service, &tx, &cancel).unwrap();
    assert_eq!(outcome, PipelineOutcome::Cancelled);
    assert_eq!(service.calls(), 0);
}

/// Cancels the run from inside the first request.
struct CancellingService {
    cancel: CancelToken,
    calls: AtomicUsize,
}

impl AnalysisService for CancellingService {
    fn analyze(&self, _prompt: &str) -> Result<String, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.cancel.cancel();
        Ok(reply(&[("Anything", 0.0, 1000.0)], &[]))
    }
}

#[test]
fn cancellation_stops_between_chunks() {
    let transcript = transcript(40, 10.0);
    let cancel = CancelToken::new();
    let service = CancellingService {
        cancel: cancel.clone(),
        calls: AtomicUsize::new(0),
    };
    let (tx, _rx) = channel();
    let outcome = run_segmentation(&transcript, &config(10), &service, &tx, &cancel).unwrap();
    assert_eq!(outcome, PipelineOutcome::Cancelled);
    assert_eq!(service.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn runtime_streams_events_from_worker_thread() {
    let transcript = transcript(20, 20.0);
    let service = Arc::new(
        ScriptedService::new()
            .route("part 1 of 2", reply(&[("Baking", 0.0, 200.0)], &[(150.0, "medium")]))
            .route("part 2 of 2", reply(&[("Village", 200.0, 400.0)], &[])),
    );
    let runtime = SegmentationRuntime::spawn(transcript, config(10), service.clone()).unwrap();

    let mut events = Vec::new();
    while let Some(event) = runtime.recv() {
        events.push(event);
    }
    let report = match runtime.wait().unwrap() {
        PipelineOutcome::Completed(report) => report,
        PipelineOutcome::Cancelled => panic!("run was not cancelled"),
    };

    assert_eq!(events.first().map(|e| e.stage), Some(Stage::Chunking));
    assert_eq!(events.last().map(|e| e.stage), Some(Stage::Done));
    assert_eq!(
        events
            .iter()
            .filter(|event| event.stage == Stage::Analysis)
            .count(),
        2
    );
    assert_eq!(bounds(&report), vec![(0.0, 150.0), (150.0, 400.0)]);
    assert_eq!(service.calls(), 2);
}
