//! Lenient JSON parsing for model output.
//!
//! Models wrap JSON in markdown fences, leave trailing commas behind, and while
//! streaming only a prefix of the object exists. [`parse_reply`] handles a
//! finished reply and [`parse_partial`] turns a streamed prefix into the most
//! complete value it can.
use serde_json::Value;

/// Drop a surrounding markdown code fence, including an unterminated one
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}

/// Parse a complete reply that should hold one JSON value
pub fn parse_reply(text: &str) -> Option<Value> {
    let body = strip_code_fences(text);
    if let Ok(value) = serde_json::from_str(body) {
        return Some(value);
    }
    let start = body.find(['{', '['])?;
    // a complete value followed by prose
    if let Some(Ok(value)) = serde_json::Deserializer::from_str(&body[start..])
        .into_iter::<Value>()
        .next()
    {
        return Some(value);
    }
    close_and_parse(&body[start..])
}

/// Parse the prefix of a streamed JSON value, discarding a trailing member that
/// is not complete enough to parse
pub fn parse_partial(text: &str) -> Option<Value> {
    let body = strip_code_fences(text);
    let start = body.find(['{', '['])?;
    let mut candidate = &body[start..];
    loop {
        if let Some(value) = close_and_parse(candidate) {
            return Some(value);
        }
        candidate = cut_at_last_boundary(candidate)?;
    }
}

/// Close an open string and any unclosed containers, then parse
fn close_and_parse(input: &str) -> Option<Value> {
    let mut repaired = String::with_capacity(input.len() + 8);
    let mut stack = Vec::new();
    let mut in_string = false;
    let mut escape_next = false;

    for ch in input.chars() {
        if in_string {
            if escape_next {
                escape_next = false;
            } else if ch == '\\' {
                escape_next = true;
            } else if ch == '"' {
                in_string = false;
            }
            repaired.push(ch);
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                if stack.last() == Some(&ch) {
                    stack.pop();
                }
            }
            _ => {}
        }
        // trailing comma before a closer
        if matches!(ch, '}' | ']') {
            let trimmed_len = repaired.trim_end().len();
            if repaired[..trimmed_len].ends_with(',') {
                repaired.truncate(trimmed_len - 1);
            }
        }
        repaired.push(ch);
    }

    if in_string {
        if escape_next {
            repaired.pop();
        }
        repaired.push('"');
    } else {
        let trimmed_len = repaired.trim_end().len();
        repaired.truncate(trimmed_len);
        // `,` awaiting a member, `.` awaiting a fraction
        if repaired.ends_with(',') || repaired.ends_with('.') {
            repaired.pop();
        }
    }
    while let Some(closer) = stack.pop() {
        repaired.push(closer);
    }

    serde_json::from_str(&repaired).ok()
}

/// Shorten `input` to just before its last top-level-safe boundary: a comma, or
/// just after an opening bracket. `None` when nothing shorter remains.
fn cut_at_last_boundary(input: &str) -> Option<&str> {
    let mut in_string = false;
    let mut escape_next = false;
    let mut cut = None;

    for (index, ch) in input.char_indices() {
        if in_string {
            if escape_next {
                escape_next = false;
            } else if ch == '\\' {
                escape_next = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            ',' => cut = Some(index),
            '{' | '[' if index + 1 < input.len() => cut = Some(index + 1),
            _ => {}
        }
    }

    cut.filter(|&end| end < input.len()).map(|end| &input[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reply_in_code_fence() {
        let reply = "```json\n{\"total_price\": 42.5}\n```";
        assert_eq!(parse_reply(reply), Some(json!({"total_price": 42.5})));
    }

    #[test]
    fn test_reply_in_single_line_fence() {
        assert_eq!(strip_code_fences("```{\"a\":1}```"), "{\"a\":1}");
        assert_eq!(parse_reply("```{\"a\":1}```"), Some(json!({"a": 1})));
    }

    #[test]
    fn test_reply_with_prose_and_trailing_comma() {
        let reply = "Here you go: {\"items\": [1, 2, 3,],}";
        assert_eq!(parse_reply(reply), Some(json!({"items": [1, 2, 3]})));
    }

    #[test]
    fn test_reply_without_json() {
        assert_eq!(parse_reply("I cannot help with that."), None);
    }

    #[test]
    fn test_partial_prefixes() {
        let full = r#"{"name": "Ada", "tags": ["math", "code"], "age": 36}"#;
        let cases = [
            (r#"{"#, json!({})),
            (r#"{"na"#, json!({})),
            (r#"{"name": "#, json!({})),
            (r#"{"name": "Ad"#, json!({"name": "Ad"})),
            (r#"{"name": "Ada", "#, json!({"name": "Ada"})),
            (r#"{"name": "Ada", "tags": ["ma"#, json!({"name": "Ada", "tags": ["ma"]})),
            (r#"{"name": "Ada", "tags": ["math", "code"], "age": 3"#, json!({"name": "Ada", "tags": ["math", "code"], "age": 3})),
            (r#"{"name": "Ada", "tags": ["math", "code"], "age": 36."#, json!({"name": "Ada", "tags": ["math", "code"], "age": 36})),
            (full, json!({"name": "Ada", "tags": ["math", "code"], "age": 36})),
        ];
        for (prefix, expected) in cases {
            assert_eq!(parse_partial(prefix), Some(expected), "prefix: {prefix}");
        }
    }

    #[test]
    fn test_partial_incomplete_literal_is_dropped() {
        assert_eq!(
            parse_partial(r#"{"a": 1, "done": tr"#),
            Some(json!({"a": 1}))
        );
    }

    #[test]
    fn test_partial_keeps_escaped_quotes_and_unicode() {
        assert_eq!(
            parse_partial(r#"{"quote": "she said \"héllo"#),
            Some(json!({"quote": "she said \"héllo"}))
        );
        assert_eq!(
            parse_partial(r#"{"path": "C:\"#),
            Some(json!({"path": "C:"}))
        );
    }

    #[test]
    fn test_partial_inside_open_fence() {
        assert_eq!(parse_partial("```json\n{\"a\": 1"), Some(json!({"a": 1})));
        assert_eq!(parse_partial("thinking..."), None);
    }
}
