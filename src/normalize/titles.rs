use std::sync::LazyLock;

use regex::Regex;

static UNSAFE_CHARS: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"[<>:"/\\|?*\x00-\x1F]"#).ok());

/// Filename-safe title: reserved characters stripped, whitespace collapsed, capped at
/// `max_len` characters. Falls back to `Segment_<ordinal>` when nothing survives.
pub fn safe_title(raw: &str, ordinal: usize, max_len: usize) -> String {
    let stripped = match UNSAFE_CHARS.as_ref() {
        Some(re) => re.replace_all(raw, ""),
        None => raw.into(),
    };
    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    let truncated: String = collapsed.chars().take(max_len).collect();
    let title = truncated.trim_end();
    if title.is_empty() {
        format!("Segment_{}", ordinal)
    } else {
        title.to_string()
    }
}

/// Case-insensitive Sørensen–Dice similarity; an empty title matches nothing.
pub fn title_similarity(a: &str, b: &str) -> f64 {
    if a.trim().is_empty() || b.trim().is_empty() {
        return 0.0;
    }
    strsim::sorensen_dice(&a.to_lowercase(), &b.to_lowercase())
}
