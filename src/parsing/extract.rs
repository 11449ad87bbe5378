use serde_json::{Map, Value};

/// Find the first balanced `{...}` block in free text that parses as a JSON object.
///
/// Blocks carrying a `themes` key win over other well-formed objects, so a truncated outer
/// object does not hide behind one of its complete inner entries.
pub fn extract_object(text: &str) -> Option<Map<String, Value>> {
    let mut fallback = None;
    for (start, _) in text.match_indices('{') {
        let Some(end) = balanced_end(&text[start..]) else {
            continue;
        };
        let candidate = &text[start..start + end];
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(candidate) {
            if map.contains_key("themes") {
                return Some(map);
            }
            if fallback.is_none() {
                fallback = Some(map);
            }
        }
    }
    fallback
}

/// Byte length of the balanced block starting at `text[0] == '{'`, string literals respected.
fn balanced_end(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (idx, ch) in text.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(idx + 1);
                }
            }
            _ => {}
        }
    }
    None
}
