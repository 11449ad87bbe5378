use super::spans::Span;

/// Segment indices grouped into the novel portion of one chunk
#[derive(Debug, Clone)]
pub(super) struct SpanGroup {
    pub(super) segment_ids: Vec<usize>,
    pub(super) tokens: usize,
    pub(super) oversized: bool,
}

pub(super) struct ChunkAccumulator {
    groups: Vec<SpanGroup>,
    current_segments: Vec<usize>,
    current_tokens: usize,
}

impl ChunkAccumulator {
    pub(super) fn new() -> Self {
        Self {
            groups: Vec::new(),
            current_segments: Vec::new(),
            current_tokens: 0,
        }
    }

    pub(super) fn handle_span(&mut self, span: Span, token_budget: usize) {
        if span.tokens == 0 && self.current_segments.is_empty() {
            // Blank units carry timing only; keep them with the group they follow.
            if let Some(last) = self.groups.last_mut() {
                last.segment_ids.push(span.segment_idx);
                return;
            }
        }
        if span.tokens > token_budget {
            // Pending blank units ride along with the oversized span instead of forming an
            // empty chunk of their own.
            let mut segment_ids = if self.current_tokens == 0 {
                std::mem::take(&mut self.current_segments)
            } else {
                self.finish_chunk();
                Vec::new()
            };
            segment_ids.push(span.segment_idx);
            self.groups.push(SpanGroup {
                segment_ids,
                tokens: span.tokens,
                oversized: true,
            });
            return;
        }
        if !self.current_segments.is_empty() && self.current_tokens + span.tokens > token_budget {
            self.finish_chunk();
        }
        self.current_segments.push(span.segment_idx);
        self.current_tokens += span.tokens;
    }

    pub(super) fn finish_chunk(&mut self) {
        if self.current_segments.is_empty() {
            return;
        }
        self.groups.push(SpanGroup {
            segment_ids: std::mem::take(&mut self.current_segments),
            tokens: self.current_tokens,
            oversized: false,
        });
        self.current_tokens = 0;
    }

    pub(super) fn into_groups(self) -> Vec<SpanGroup> {
        self.groups
    }
}
