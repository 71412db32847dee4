//! Request construction: system instruction, history and evidence.

use serde_json::{json, Value};

use crate::models::{truncate_chars, EvidenceChunk, HistoryTurn, Role};

/// Maximum history turns replayed to the model.
pub const HISTORY_TURNS: usize = 8;

/// Maximum characters per replayed history turn.
pub const HISTORY_TURN_CHARS: usize = 1200;

pub const SYSTEM_INSTRUCTION: &str = "\
You are a grounded research assistant for a public archive of court records, \
depositions, flight logs and investigative documents.

Always give a substantive answer. Base it on the archive evidence provided with \
the question. You may use web search to fill gaps the evidence does not cover.

Cite archive evidence inline as \"Doc #N · pP\" (omit the page part when no page \
is given). Cite external material as \"Web Source (domain)\". Never invent \
document numbers that do not appear in the evidence.

Respond with strict JSON only, no prose around it, in exactly this shape:
{\"answer_html\": \"<p>...</p>\", \
\"citations\": [{\"document_id\": 123, \"page_number\": 4, \"quote\": \"...\"}], \
\"follow_up_questions\": [\"...\"]}";

/// Render evidence chunks as numbered blocks, one per chunk.
///
/// ```text
/// [1] Document #12 (Page 3) — Incident report
/// Source: OCR
/// Snippet: ...
/// ```
pub fn render_evidence(chunks: &[EvidenceChunk]) -> String {
    chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| {
            let page = chunk
                .page_number
                .map(|p| format!(" (Page {})", p))
                .unwrap_or_default();
            format!(
                "[{}] Document #{}{} — {}\nSource: {}\nSnippet: {}",
                i + 1,
                chunk.document_id,
                page,
                chunk.title,
                chunk.source.as_str().to_uppercase(),
                chunk.snippet
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Keep at most [`HISTORY_TURNS`] recent turns, alternating roles, each
/// truncated to [`HISTORY_TURN_CHARS`].
///
/// `turns` is oldest first. When two consecutive turns share a role the
/// later one wins.
pub fn sanitize_history(turns: &[HistoryTurn]) -> Vec<HistoryTurn> {
    let mut kept: Vec<HistoryTurn> = Vec::new();
    for turn in turns {
        let content = turn.content.trim();
        if content.is_empty() {
            continue;
        }
        let turn = HistoryTurn {
            role: turn.role,
            content: truncate_chars(content, HISTORY_TURN_CHARS),
        };
        match kept.last_mut() {
            Some(last) if last.role == turn.role => *last = turn,
            _ => kept.push(turn),
        }
    }
    let skip = kept.len().saturating_sub(HISTORY_TURNS);
    kept.split_off(skip)
}

/// The final user turn: the question followed by rendered evidence.
pub fn user_turn(question: &str, chunks: &[EvidenceChunk]) -> String {
    format!(
        "Question: {}\n\nArchive evidence:\n{}",
        question.trim(),
        render_evidence(chunks)
    )
}

/// Role/content input blocks: system, sanitized history, final user turn.
pub fn build_input(
    question: &str,
    chunks: &[EvidenceChunk],
    history: &[HistoryTurn],
) -> Vec<Value> {
    let mut input = vec![json!({ "role": "system", "content": SYSTEM_INSTRUCTION })];
    for turn in sanitize_history(history) {
        input.push(json!({ "role": turn.role.as_str(), "content": turn.content }));
    }
    input.push(json!({ "role": Role::User.as_str(), "content": user_turn(question, chunks) }));
    input
}

/// One request body for `model`, with or without the web-search tool.
pub fn build_request(
    model: &str,
    temperature: f32,
    max_output_tokens: u32,
    input: &[Value],
    web_search: bool,
) -> Value {
    let mut body = json!({
        "model": model,
        "temperature": temperature,
        "max_output_tokens": max_output_tokens,
        "input": input,
    });
    if web_search {
        body["tools"] = json!([{ "type": "web_search" }]);
    }
    body
}
