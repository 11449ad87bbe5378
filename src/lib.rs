//! Thematic segmentation of timed interview transcripts.
//!
//! A transcript is split into token-bounded chunks, each chunk is analyzed by a local language
//! model service, and the per-chunk cut points are merged into one contiguous, titled segment
//! timeline.

pub mod analysis;
pub mod chunking;
pub mod config;
pub mod merge;
pub mod normalize;
pub mod parsing;
pub mod pipeline;
pub mod report;
pub mod transcription;
pub mod types;
