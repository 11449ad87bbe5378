use std::fmt::Write;

use crate::types::{Chunk, Transcript};

const INSTRUCTIONS: &str = "You are an expert in analysing recorded interviews for video editing. \
Analyse the transcript below and identify:

1. MAIN THEMES: the distinct subjects discussed
2. CUT POINTS: natural moments to split the video (topic transitions, pauses)
3. LOCATIONS: cities, villages and other places mentioned
4. KEYWORDS: important concepts and proper names";

const SCHEMA: &str = r#"Reply ONLY with JSON using exactly this structure:
{
  "themes": [
    {
      "title": "Theme title",
      "description": "Short description",
      "start": 123.45,
      "end": 234.56,
      "keywords": ["word1", "word2"]
    }
  ],
  "cut_points": [
    {
      "timestamp": 123.45,
      "reason": "Transition to a new subject",
      "confidence": "high"
    }
  ],
  "locations": ["Paris", "Marseille"],
  "keywords": ["craft", "tradition", "family"]
}

RULES:
- Use the absolute timestamps shown in brackets, in seconds
- Only report themes and cut points inside the analysed range
- confidence is one of "high", "medium", "low"
- Prefer natural transitions and never cut in the middle of a sentence
- Themes must be coherent and distinct"#;

/// Render the fixed instruction template around one chunk's timed lines.
pub fn build_prompt(chunk: &Chunk, transcript: &Transcript, total_chunks: usize) -> String {
    let mut prompt = String::with_capacity(chunk.text.len() * 2 + 1024);
    prompt.push_str(INSTRUCTIONS);
    prompt.push_str("\n\n");

    if total_chunks > 1 {
        let _ = writeln!(prompt, "This is part {} of {}.", chunk.index + 1, total_chunks);
    }
    let _ = writeln!(
        prompt,
        "Analysed range: {:.2}s to {:.2}s.\n",
        chunk.time_range.start, chunk.time_range.end
    );

    if !chunk.overlap_segment_ids.is_empty() {
        prompt.push_str("CONTEXT FROM THE PREVIOUS PART (do not analyse):\n");
        render_lines(&mut prompt, transcript, &chunk.overlap_segment_ids);
        prompt.push('\n');
    }

    prompt.push_str("TRANSCRIPT TO ANALYSE:\n");
    render_lines(&mut prompt, transcript, &chunk.source_segment_ids);
    prompt.push('\n');
    prompt.push_str(SCHEMA);
    prompt
}

fn render_lines(prompt: &mut String, transcript: &Transcript, ids: &[usize]) {
    for segment in ids.iter().filter_map(|&idx| transcript.segments.get(idx)) {
        let text = segment.text.trim();
        if text.is_empty() {
            continue;
        }
        let _ = writeln!(prompt, "[{:.2} - {:.2}] {}", segment.start, segment.end, text);
    }
}
