use std::sync::mpsc::{channel, Receiver};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{error, info};

use super::{run_segmentation, CancelToken, PipelineEvent, PipelineOutcome, SegmentationError};
use crate::analysis::AnalysisService;
use crate::config::SegmentationConfig;
use crate::types::Transcript;

type WorkerResult = Result<PipelineOutcome, SegmentationError>;

/// Runs the engine on a dedicated worker thread and exposes its progress stream.
///
/// Dropping the runtime cancels the run and joins the worker.
pub struct SegmentationRuntime {
    events: Receiver<PipelineEvent>,
    cancel: CancelToken,
    join: Option<JoinHandle<WorkerResult>>,
}

impl SegmentationRuntime {
    pub fn spawn(
        transcript: Transcript,
        config: SegmentationConfig,
        service: Arc<dyn AnalysisService>,
    ) -> Result<Self, SegmentationError> {
        let cancel = CancelToken::new();
        let thread_cancel = cancel.clone();
        let (event_tx, event_rx) = channel();
        info!(
            segments = transcript.segments.len(),
            duration = transcript.duration,
            model = %config.analysis.model,
            "launching segmentation worker"
        );
        let join = thread::Builder::new()
            .name("segmentation-runtime".to_string())
            .spawn(move || {
                let outcome = run_segmentation(
                    &transcript,
                    &config,
                    service.as_ref(),
                    &event_tx,
                    &thread_cancel,
                );
                if let Err(err) = &outcome {
                    error!(error = %err, "segmentation failed");
                }
                outcome
            })
            .map_err(|err| {
                error!(error = %err, "failed to spawn segmentation worker");
                SegmentationError::Worker(err.to_string())
            })?;
        Ok(Self {
            events: event_rx,
            cancel,
            join: Some(join),
        })
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn try_recv(&self) -> Option<PipelineEvent> {
        self.events.try_recv().ok()
    }

    /// Blocks for the next event; `None` once the worker has finished and the stream is drained.
    pub fn recv(&self) -> Option<PipelineEvent> {
        self.events.recv().ok()
    }

    /// Blocks until the worker finishes, discarding events not yet received.
    pub fn wait(mut self) -> WorkerResult {
        match self.join.take() {
            Some(join) => join
                .join()
                .map_err(|_| SegmentationError::Worker("worker thread panicked".to_string()))?,
            None => Err(SegmentationError::Worker(
                "worker already joined".to_string(),
            )),
        }
    }
}

impl Drop for SegmentationRuntime {
    fn drop(&mut self) {
        if let Some(join) = self.join.take() {
            self.cancel.cancel();
            let _ = join.join();
        }
    }
}
