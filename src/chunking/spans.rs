use crate::types::Transcript;

/// One sentence-level unit with its token cost; chunks never split a span.
#[derive(Clone, Copy, Debug)]
pub(super) struct Span {
    pub(super) segment_idx: usize,
    pub(super) tokens: usize,
}

/// Rough token count: roughly four characters per token, never fewer than the word count.
pub fn estimate_tokens(text: &str) -> usize {
    let text = text.trim();
    if text.is_empty() {
        return 0;
    }
    let words = text.split_whitespace().count();
    let by_chars = text.chars().count().div_ceil(4);
    words.max(by_chars)
}

pub(super) fn build_spans(transcript: &Transcript) -> Vec<Span> {
    transcript
        .segments
        .iter()
        .enumerate()
        .map(|(idx, segment)| Span {
            segment_idx: idx,
            tokens: estimate_tokens(&segment.text),
        })
        .collect()
}
