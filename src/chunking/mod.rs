//! Chunker - splits a transcript into windows the analysis service can digest

mod accumulator;
mod planner;
mod spans;


use thiserror::Error;

pub use planner::plan_chunks;
pub use spans::estimate_tokens;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ChunkingError {
    #[error("transcript contains no text")]
    EmptyTranscript,

    #[error("transcript segment {segment} has a non-finite timestamp")]
    InvalidTimestamp { segment: usize },

    #[error("transcript duration {0} is not a positive number of seconds")]
    InvalidDuration(f64),
}
