//! Core data types that flow through the answering pipeline.
//!
//! Everything here except [`Session`] and [`Message`] is built fresh for a
//! single request and dropped once the response has been sent.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which retrieval tier produced an [`EvidenceChunk`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Summary,
    Ocr,
    Special,
    FlightLog,
    System,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Summary => "summary",
            Self::Ocr => "ocr",
            Self::Special => "special",
            Self::FlightLog => "flight_log",
            Self::System => "system",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A bounded span of evidence text attached to a document (and maybe a page).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceChunk {
    pub document_id: i64,
    pub page_number: Option<i64>,
    pub title: String,
    pub data_set: Option<String>,
    pub snippet: String,
    pub score: Option<f64>,
    pub source: SourceKind,
}

impl EvidenceChunk {
    /// The placeholder used when retrieval found nothing at all.
    pub fn system_placeholder() -> Self {
        Self {
            document_id: 0,
            page_number: None,
            title: "No matching documents".to_string(),
            data_set: None,
            snippet: "No archive evidence matched this question. Answer from general knowledge \
                      and say that the archive did not contain supporting documents."
                .to_string(),
            score: None,
            source: SourceKind::System,
        }
    }
}

/// Lightweight projection of an archive document, keyed by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRef {
    pub id: i64,
    pub title: String,
    pub data_set: Option<String>,
    pub file_type: Option<String>,
    pub source_url: Option<String>,
}

/// A `(document, page, quote)` tuple grounding part of an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub document_id: i64,
    pub page_number: Option<i64>,
    pub quote: Option<String>,
}

/// Token usage reported by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
        }
    }
}

/// The structured answer shape produced by either generation path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnswerPayload {
    pub answer_html: String,
    pub citations: Vec<Citation>,
    pub follow_up_questions: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }
}

/// A conversation session row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub id: i64,
    pub token: String,
    pub ip_hash: Option<String>,
    pub user_agent: Option<String>,
    pub last_active_at: i64,
}

/// One persisted turn of a conversation. Never mutated after insert.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub id: i64,
    pub session_id: i64,
    pub role: Role,
    pub content: String,
    pub model: Option<String>,
    pub tokens_in: Option<i64>,
    pub tokens_out: Option<i64>,
    pub latency_ms: Option<i64>,
    pub metadata: serde_json::Value,
}

/// A single history turn as fed back into the prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryTurn {
    pub role: Role,
    pub content: String,
}

/// Truncate `text` to at most `max_chars` characters on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("abcdef", 3), "abc");
        assert_eq!(truncate_chars("ab", 3), "ab");
        assert_eq!(truncate_chars("→→→→", 2), "→→");
    }

    #[test]
    fn test_source_kind_serializes_snake_case() {
        let json = serde_json::to_string(&SourceKind::FlightLog).unwrap();
        assert_eq!(json, "\"flight_log\"");
    }
}
