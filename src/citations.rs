//! Citation normalization and follow-up supplementation.
//!
//! Model-asserted citations are loosely typed JSON. [`normalize`] keeps the
//! ones with a usable positive document id; when none survive it synthesizes
//! citations from the evidence chunks so an answer grounded in evidence is
//! never returned without any.

use serde_json::Value;

use crate::models::{truncate_chars, Citation, EvidenceChunk};

pub const MAX_CITATIONS: usize = 10;
pub const SYNTHESIZED_QUOTE_CHARS: usize = 200;
pub const MAX_FOLLOW_UPS: usize = 6;

/// Integer from a JSON number or numeric string.
fn as_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().trim_start_matches('#').parse().ok(),
        _ => None,
    }
}

fn field<'a>(obj: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| obj.get(*k)).filter(|v| !v.is_null())
}

/// Parse one model citation; `None` unless the document id is positive.
pub fn parse_citation(raw: &Value) -> Option<Citation> {
    let document_id = field(raw, &["document_id", "doc_id"]).and_then(as_int)?;
    if document_id <= 0 {
        return None;
    }
    let page_number = field(raw, &["page_number", "page"]).and_then(as_int);
    let quote = field(raw, &["quote"])
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(str::to_string);
    Some(Citation {
        document_id,
        page_number,
        quote,
    })
}

/// Citations synthesized from evidence, one per distinct `(document, page)`.
///
/// The system placeholder (document 0) is never cited.
pub fn from_chunks(chunks: &[EvidenceChunk]) -> Vec<Citation> {
    let mut out: Vec<Citation> = Vec::new();
    for chunk in chunks.iter().filter(|c| c.document_id > 0) {
        if out.len() >= MAX_CITATIONS {
            break;
        }
        if out
            .iter()
            .any(|c| c.document_id == chunk.document_id && c.page_number == chunk.page_number)
        {
            continue;
        }
        let quote = truncate_chars(chunk.snippet.trim(), SYNTHESIZED_QUOTE_CHARS);
        out.push(Citation {
            document_id: chunk.document_id,
            page_number: chunk.page_number,
            quote: (!quote.is_empty()).then_some(quote),
        });
    }
    out
}

pub fn normalize(raw: &[Value], chunks: &[EvidenceChunk]) -> Vec<Citation> {
    let mut citations: Vec<Citation> = raw
        .iter()
        .filter_map(parse_citation)
        .take(MAX_CITATIONS)
        .collect();
    if citations.is_empty() {
        citations = from_chunks(chunks);
    }
    citations
}

/// Model follow-ups first, then "Show more from Doc #N" per cited document,
/// deduplicated and capped at [`MAX_FOLLOW_UPS`].
pub fn supplement_follow_ups(proposed: &[String], citations: &[Citation]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut push = |q: String| {
        let q = q.trim().to_string();
        if !q.is_empty()
            && out.len() < MAX_FOLLOW_UPS
            && !out.iter().any(|e| e.eq_ignore_ascii_case(&q))
        {
            out.push(q);
        }
    };

    for q in proposed {
        push(q.clone());
    }
    for citation in citations {
        push(format!("Show more from Doc #{}", citation.document_id));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceKind;
    use serde_json::json;

    fn chunk(id: i64, page: Option<i64>, snippet: &str) -> EvidenceChunk {
        EvidenceChunk {
            document_id: id,
            page_number: page,
            title: format!("Doc {}", id),
            data_set: None,
            snippet: snippet.to_string(),
            score: None,
            source: SourceKind::Ocr,
        }
    }

    #[test]
    fn test_keeps_valid_model_citations_and_coerces_types() {
        let raw = vec![
            json!({ "document_id": "12", "page_number": "4", "quote": " said so " }),
            json!({ "document_id": 0 }),
            json!({ "document_id": -3 }),
            json!({ "document_id": "abc" }),
            json!({ "doc_id": 9, "page": 2.0 }),
            json!("not an object"),
        ];
        let citations = normalize(&raw, &[chunk(1, None, "x")]);
        assert_eq!(
            citations,
            vec![
                Citation {
                    document_id: 12,
                    page_number: Some(4),
                    quote: Some("said so".into())
                },
                Citation {
                    document_id: 9,
                    page_number: Some(2),
                    quote: None
                },
            ]
        );
    }

    #[test]
    fn test_synthesizes_from_chunks_when_model_gives_none() {
        let long = "y".repeat(500);
        let chunks = vec![
            EvidenceChunk::system_placeholder(),
            chunk(5, Some(1), &long),
            chunk(5, Some(1), "duplicate page"),
            chunk(6, None, "summary"),
        ];
        let citations = normalize(&[json!({ "document_id": null })], &chunks);
        assert_eq!(citations.len(), 2);
        assert_eq!(citations[0].document_id, 5);
        assert_eq!(citations[0].quote.as_ref().unwrap().chars().count(), 200);
        assert_eq!(citations[1].document_id, 6);
        for c in &citations {
            assert!(chunks.iter().any(|ch| ch.document_id == c.document_id));
        }
    }

    #[test]
    fn test_synthesized_capped_at_ten() {
        let chunks: Vec<EvidenceChunk> = (1..=15).map(|i| chunk(i, None, "s")).collect();
        assert_eq!(normalize(&[], &chunks).len(), MAX_CITATIONS);
    }

    #[test]
    fn test_placeholder_only_yields_no_citations() {
        assert!(normalize(&[], &[EvidenceChunk::system_placeholder()]).is_empty());
    }

    #[test]
    fn test_follow_ups_supplemented_and_capped() {
        let citations: Vec<Citation> = [3, 3, 8, 9, 10, 11]
            .iter()
            .map(|&id| Citation {
                document_id: id,
                page_number: None,
                quote: None,
            })
            .collect();
        let proposed = vec![
            "Who else flew?".to_string(),
            "who else flew?".to_string(),
            "".to_string(),
        ];
        let out = supplement_follow_ups(&proposed, &citations);
        assert_eq!(
            out,
            vec![
                "Who else flew?",
                "Show more from Doc #3",
                "Show more from Doc #8",
                "Show more from Doc #9",
                "Show more from Doc #10",
                "Show more from Doc #11",
            ]
        );
    }
}
