//! Provider response parsing.
//!
//! The success envelope comes in two shapes: Responses-style
//! `output[].content[]` items of type `output_text`/`text`, and the classic
//! `choices[0].message.content`. The extracted text should be a JSON object;
//! when it is not, a best-effort escaped-text answer is synthesized instead of
//! failing the request.

use serde_json::Value;

use crate::models::Usage;

/// The model's answer before citation normalization.
///
/// Citations stay as raw JSON because models are loose with types
/// (string ids, string page numbers).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawAnswer {
    pub answer_html: String,
    pub citations: Vec<Value>,
    pub follow_up_questions: Vec<String>,
}

impl RawAnswer {
    /// Escaped raw text with line breaks converted, and nothing else.
    pub fn fallback(text: &str) -> Self {
        Self {
            answer_html: escape_html(text.trim()).replace("\r\n", "\n").replace('\n', "<br>"),
            citations: Vec::new(),
            follow_up_questions: Vec::new(),
        }
    }
}

/// Locate the generated text inside a success envelope.
///
/// Blank text counts as no text.
pub fn extract_text(body: &Value) -> Option<String> {
    locate_text(body).filter(|text| !text.trim().is_empty())
}

fn locate_text(body: &Value) -> Option<String> {
    if let Some(output) = body.get("output").and_then(Value::as_array) {
        let parts: Vec<&str> = output
            .iter()
            .filter_map(|item| item.get("content").and_then(Value::as_array))
            .flatten()
            .filter(|c| {
                matches!(
                    c.get("type").and_then(Value::as_str),
                    Some("output_text" | "text")
                )
            })
            .filter_map(|c| c.get("text").and_then(Value::as_str))
            .collect();
        if !parts.is_empty() {
            return Some(parts.concat());
        }
    }

    if let Some(text) = body.get("output_text").and_then(Value::as_str) {
        return Some(text.to_string());
    }

    body.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Remove a surrounding ``` or ```json fence, if any.
pub fn strip_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (e.g. "json") up to the first newline.
    let rest = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest.trim_start_matches("json"),
    };
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

/// Decode the model text, falling back to escaped text on any mismatch.
pub fn parse_answer(text: &str) -> RawAnswer {
    let stripped = strip_fences(text);
    let Ok(Value::Object(map)) = serde_json::from_str::<Value>(stripped) else {
        return RawAnswer::fallback(stripped);
    };

    let answer_html = map
        .get("answer_html")
        .or_else(|| map.get("answer"))
        .and_then(Value::as_str);
    let Some(answer_html) = answer_html else {
        return RawAnswer::fallback(stripped);
    };

    let citations = map
        .get("citations")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let follow_up_questions = map
        .get("follow_up_questions")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|q| !q.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    RawAnswer {
        answer_html: answer_html.to_string(),
        citations,
        follow_up_questions,
    }
}

/// Token usage from either naming convention; missing counts are zero.
pub fn extract_usage(body: &Value) -> Usage {
    let Some(usage) = body.get("usage") else {
        return Usage::default();
    };
    let count = |keys: &[&str]| {
        keys.iter()
            .find_map(|k| usage.get(*k).and_then(Value::as_u64))
            .map(|n| n.min(u32::MAX as u64) as u32)
            .unwrap_or(0)
    };
    Usage::new(
        count(&["input_tokens", "prompt_tokens"]),
        count(&["output_tokens", "completion_tokens"]),
    )
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
