use serde_json::{json, Value};
use tracing::warn;

/// Parse a model reply into JSON, tolerating code fences, raw newlines in
/// strings, truncated output and JSON5 syntax.
///
/// Replies that still cannot be parsed become `{"error": ..., "raw": ...}`
/// so the caller can record the failure without aborting the analysis.
pub fn parse_reply(raw: &str) -> Value {
    let payload = extract_json_payload(raw);
    let first_err = match serde_json::from_str::<Value>(&payload) {
        Ok(value) => return value,
        Err(err) => err,
    };

    let sanitized = sanitize_json_strings(&payload);
    if sanitized != payload {
        if let Ok(value) = serde_json::from_str::<Value>(&sanitized) {
            return value;
        }
    }
    if let Ok(value) = json5::from_str::<Value>(&sanitized) {
        return value;
    }

    warn!(error = %first_err, "model reply could not be parsed as JSON");
    json!({
        "error": format!("Failed to parse response: {first_err}"),
        "raw": raw,
    })
}

/// Error message recorded by [`parse_reply`] for an unparseable reply.
pub fn parse_failure(value: &Value) -> Option<&str> {
    if value.get("raw").is_none() {
        return None;
    }
    value.get("error").and_then(Value::as_str)
}

pub(crate) fn extract_json_payload(raw: &str) -> String {
    let trimmed = raw.trim();
    if let Some(stripped) = strip_code_fence(trimmed) {
        return stripped;
    }
    trimmed.to_string()
}

/// Content of the first fenced block, with an optional `json` tag removed.
fn strip_code_fence(input: &str) -> Option<String> {
    let start = input.find("```")?;
    let mut body = &input[start + 3..];
    if let Some(rest) = body.strip_prefix("json") {
        body = rest;
    }
    body = body.trim_start_matches(|c: char| c.is_ascii_whitespace());
    let end = body.find("```").unwrap_or(body.len());
    Some(body[..end].trim().to_string())
}

fn sanitize_json_strings(payload: &str) -> String {
    let mut result = String::with_capacity(payload.len());
    let mut in_string = false;
    let mut escape = false;

    for ch in payload.chars() {
        if in_string {
            if escape {
                result.push(ch);
                escape = false;
            } else {
                match ch {
                    '\\' => {
                        result.push(ch);
                        escape = true;
                    }
                    '"' => {
                        result.push(ch);
                        in_string = false;
                    }
                    '\n' => result.push_str("\\n"),
                    '\r' => {}
                    '\t' => result.push_str("\\t"),
                    _ => result.push(ch),
                }
            }
        } else {
            result.push(ch);
            if ch == '"' {
                in_string = true;
            }
        }
    }

    if in_string {
        // a trailing backslash would escape the closing quote
        if escape {
            result.pop();
        }
        result.push('"');
    }

    // close brackets in reverse order of opening
    let mut open = Vec::new();
    let mut in_str = false;
    let mut esc = false;
    for ch in result.chars() {
        if in_str {
            match ch {
                _ if esc => esc = false,
                '\\' => esc = true,
                '"' => in_str = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_str = true,
            '{' | '[' => open.push(ch),
            '}' | ']' => {
                open.pop();
            }
            _ => {}
        }
    }
    while let Some(ch) = open.pop() {
        result.push(if ch == '{' { '}' } else { ']' });
    }

    result
}
