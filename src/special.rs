//! Intent-specific lookups consulted ahead of generic retrieval.
//!
//! Each resolver issues one narrowly targeted store query and returns at most
//! one chunk, except flight lookups which return up to [`FLIGHT_LIMIT`].

use anyhow::Result;
use tracing::debug;

use crate::intent::{FactTopic, FlightQuery, Intent};
use crate::models::{truncate_chars, DocumentRef, EvidenceChunk, SourceKind};
use crate::store::{Containment, DocumentHit, DocumentStore, FlightRow, PageHit};

/// Flights returned by one lookup, shared by the resolver and the answer path.
pub const FLIGHT_LIMIT: usize = 6;

/// Passengers listed per flight sentence.
const PASSENGERS_PER_SENTENCE: usize = 6;

/// Characters of OCR text kept on each side of a matched date.
const DATE_WINDOW_RADIUS: usize = 300;

/// Characters kept when a page matched but the needle could not be located.
const PAGE_HEAD_CHARS: usize = 600;

const EPSTEIN_DEATH_NEEDLES: &[&str] = &["August 10, 2019", "Aug. 10, 2019"];

/// Chunks and document references produced by a resolver.
#[derive(Debug, Clone, Default)]
pub struct SpecialContext {
    pub chunks: Vec<EvidenceChunk>,
    pub documents: Vec<DocumentRef>,
}

impl SpecialContext {
    fn single(chunk: EvidenceChunk, document: Option<DocumentRef>) -> Self {
        Self {
            chunks: vec![chunk],
            documents: document.into_iter().collect(),
        }
    }
}

/// Run the resolver matching `intent`.
pub async fn resolve(
    store: &dyn DocumentStore,
    intent: &Intent,
    snippet_chars: usize,
) -> Result<SpecialContext> {
    let context = match intent {
        Intent::DocFollowup { document_id } => match store.get_document(*document_id).await? {
            Some(hit) => SpecialContext::single(
                summary_chunk(&hit, SourceKind::Special, snippet_chars),
                Some(hit.document),
            ),
            None => SpecialContext::default(),
        },
        Intent::DateLookup => match store
            .find_page(EPSTEIN_DEATH_NEEDLES, Containment::Any)
            .await?
        {
            Some(page) => {
                let snippet = date_window(&page.text, EPSTEIN_DEATH_NEEDLES);
                page_context(store, &page, snippet, snippet_chars).await?
            }
            None => SpecialContext::default(),
        },
        Intent::RelationshipLookup => {
            match store
                .find_page(&["Masseuse", "contact"], Containment::All)
                .await?
            {
                Some(page) => {
                    let snippet = page.text.clone();
                    page_context(store, &page, snippet, snippet_chars).await?
                }
                None => SpecialContext::default(),
            }
        }
        Intent::FactLookup(topic) => {
            let needles: &[&str] = match topic {
                FactTopic::FloridaPleaAgreement => &["plea", "Florida"],
                FactTopic::MaxwellTrial => &["Maxwell", "trial"],
            };
            match store.find_document(needles, Containment::All).await? {
                Some(hit) => SpecialContext::single(
                    summary_chunk(&hit, SourceKind::Special, snippet_chars),
                    Some(hit.document),
                ),
                None => SpecialContext::default(),
            }
        }
        Intent::FlightLookup(query) => {
            let flights = lookup_flights(store, query).await?;
            flight_context(store, &flights, snippet_chars).await?
        }
    };

    debug!(
        intent = intent.kind().as_str(),
        chunks = context.chunks.len(),
        "special intent resolved"
    );
    Ok(context)
}

/// The flight/passenger join used by both the resolver and the answer path.
pub async fn lookup_flights(
    store: &dyn DocumentStore,
    query: &FlightQuery,
) -> Result<Vec<FlightRow>> {
    store.find_flights(query, FLIGHT_LIMIT).await
}

/// One human-readable sentence per flight, or `None` when date, origin or
/// destination is missing.
pub fn flight_sentence(flight: &FlightRow) -> Option<String> {
    if !flight.is_complete() {
        return None;
    }
    let date = flight.flight_date.as_deref().unwrap_or_default();
    let origin = flight.origin.as_deref().unwrap_or_default();
    let destination = flight.destination.as_deref().unwrap_or_default();
    let aircraft = flight
        .aircraft
        .as_deref()
        .filter(|a| !a.trim().is_empty())
        .unwrap_or("unknown aircraft");

    let passengers: Vec<&str> = flight
        .passengers
        .iter()
        .take(PASSENGERS_PER_SENTENCE)
        .map(String::as_str)
        .collect();
    let passengers = if passengers.is_empty() {
        "none listed".to_string()
    } else {
        passengers.join(", ")
    };

    Some(format!(
        "Flight on {} from {} → {} ({}). Passengers: {}.",
        date, origin, destination, aircraft, passengers
    ))
}

/// Text centered on the first needle found in `text` (case-insensitive),
/// or the first [`PAGE_HEAD_CHARS`] characters when none is found.
pub fn date_window(text: &str, needles: &[&str]) -> String {
    // ASCII lowercasing keeps byte offsets aligned with `text`.
    let lower = text.to_ascii_lowercase();
    let found = needles
        .iter()
        .find_map(|n| lower.find(&n.to_ascii_lowercase()).map(|pos| (pos, n.len())));

    match found {
        Some((pos, len)) => {
            let before: Vec<char> = text[..pos].chars().collect();
            let start = before.len().saturating_sub(DATE_WINDOW_RADIUS);
            let head: String = before[start..].iter().collect();
            let tail: String = text[pos + len..].chars().take(DATE_WINDOW_RADIUS).collect();
            format!("{}{}{}", head, &text[pos..pos + len], tail)
        }
        None => truncate_chars(text, PAGE_HEAD_CHARS),
    }
}

fn summary_chunk(hit: &DocumentHit, source: SourceKind, snippet_chars: usize) -> EvidenceChunk {
    EvidenceChunk {
        document_id: hit.document.id,
        page_number: None,
        title: hit.document.title.clone(),
        data_set: hit.document.data_set.clone(),
        snippet: truncate_chars(hit.text.trim(), snippet_chars),
        score: hit.score,
        source,
    }
}

async fn page_context(
    store: &dyn DocumentStore,
    page: &PageHit,
    snippet: String,
    snippet_chars: usize,
) -> Result<SpecialContext> {
    let document = store.get_document(page.document_id).await?.map(|h| h.document);
    let chunk = EvidenceChunk {
        document_id: page.document_id,
        page_number: Some(page.page_number),
        title: document
            .as_ref()
            .map(|d| d.title.clone())
            .unwrap_or_else(|| format!("Document #{}", page.document_id)),
        data_set: document.as_ref().and_then(|d| d.data_set.clone()),
        snippet: truncate_chars(snippet.trim(), snippet_chars),
        score: None,
        source: SourceKind::Special,
    };
    Ok(SpecialContext::single(chunk, document))
}

async fn flight_context(
    store: &dyn DocumentStore,
    flights: &[FlightRow],
    snippet_chars: usize,
) -> Result<SpecialContext> {
    let mut context = SpecialContext::default();
    for flight in flights {
        // A chunk without a source document could never be cited.
        let Some(document_id) = flight.document_id.filter(|id| *id > 0) else {
            continue;
        };
        let Some(sentence) = flight_sentence(flight) else {
            continue;
        };
        let document = store.get_document(document_id).await?.map(|h| h.document);
        context.chunks.push(EvidenceChunk {
            document_id,
            page_number: None,
            title: document
                .as_ref()
                .map(|d| d.title.clone())
                .unwrap_or_else(|| "Flight log".to_string()),
            data_set: document.as_ref().and_then(|d| d.data_set.clone()),
            snippet: truncate_chars(&sentence, snippet_chars),
            score: None,
            source: SourceKind::FlightLog,
        });
        if let Some(doc) = document {
            context.documents.push(doc);
        }
    }
    Ok(context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    fn flight(id: i64, date: Option<&str>, passengers: &[&str]) -> FlightRow {
        FlightRow {
            id,
            document_id: Some(40),
            flight_date: date.map(str::to_string),
            origin: Some("TEB".to_string()),
            destination: Some("PBI".to_string()),
            aircraft: Some("Boeing 727".to_string()),
            passengers: passengers.iter().map(|p| p.to_string()).collect(),
        }
    }

    #[test]
    fn test_flight_sentence_format() {
        let f = flight(1, Some("1999-03-01"), &["Jeffrey Epstein", "Ghislaine Maxwell"]);
        assert_eq!(
            flight_sentence(&f).unwrap(),
            "Flight on 1999-03-01 from TEB → PBI (Boeing 727). Passengers: Jeffrey Epstein, Ghislaine Maxwell."
        );
    }

    #[test]
    fn test_flight_sentence_caps_passengers_and_skips_incomplete() {
        let names = ["a", "b", "c", "d", "e", "f", "g", "h"];
        let f = flight(1, Some("1999-03-01"), &names);
        let sentence = flight_sentence(&f).unwrap();
        assert!(sentence.ends_with("Passengers: a, b, c, d, e, f."));

        assert!(flight_sentence(&flight(2, None, &names)).is_none());
    }

    #[test]
    fn test_date_window_centers_on_match() {
        let text = format!(
            "{}Epstein was found on August 10, 2019 in his cell.{}",
            "x".repeat(1000),
            "y".repeat(1000)
        );
        let window = date_window(&text, EPSTEIN_DEATH_NEEDLES);
        assert!(window.contains("August 10, 2019"));
        assert_eq!(window.chars().count(), 2 * DATE_WINDOW_RADIUS + "August 10, 2019".len());
    }

    #[test]
    fn test_date_window_falls_back_to_head() {
        let text = "z".repeat(2000);
        assert_eq!(date_window(&text, EPSTEIN_DEATH_NEEDLES).len(), PAGE_HEAD_CHARS);
    }

    #[tokio::test]
    async fn test_resolve_date_lookup_returns_matched_date() {
        let store = InMemoryStore::new();
        store.add_document(
            DocumentRef {
                id: 12,
                title: "MCC incident report".into(),
                data_set: Some("DOJ".into()),
                file_type: None,
                source_url: None,
            },
            None,
            None,
            0,
        );
        store.add_page(12, 3, "Inmate was pronounced dead on Aug. 10, 2019 at 7:36 a.m.");

        let ctx = resolve(&store, &Intent::DateLookup, 800).await.unwrap();
        assert_eq!(ctx.chunks.len(), 1);
        let chunk = &ctx.chunks[0];
        assert!(chunk.snippet.contains("Aug. 10, 2019"));
        assert_eq!(chunk.page_number, Some(3));
        assert_eq!(chunk.source, SourceKind::Special);
        assert_eq!(chunk.title, "MCC incident report");
        assert_eq!(ctx.documents.len(), 1);
    }

    #[tokio::test]
    async fn test_resolve_flight_lookup_skips_incomplete_rows() {
        let store = InMemoryStore::new();
        store.add_flight(flight(1, Some("1999-03-01"), &["Jeffrey Epstein", "Ghislaine Maxwell"]));
        store.add_flight(flight(2, None, &["Jeffrey Epstein", "Ghislaine Maxwell"]));

        let intent = Intent::FlightLookup(FlightQuery {
            people: vec!["epstein".into(), "maxwell".into()],
            year: None,
        });
        let ctx = resolve(&store, &intent, 800).await.unwrap();
        assert_eq!(ctx.chunks.len(), 1);
        assert_eq!(ctx.chunks[0].source, SourceKind::FlightLog);
        assert_eq!(ctx.chunks[0].document_id, 40);
    }

    #[tokio::test]
    async fn test_resolve_flight_lookup_skips_rows_without_document() {
        let store = InMemoryStore::new();
        let mut unsourced =
            flight(3, Some("1999-05-02"), &["Jeffrey Epstein", "Ghislaine Maxwell"]);
        unsourced.document_id = None;
        store.add_flight(unsourced);
        store.add_flight(flight(4, Some("1999-06-12"), &["Jeffrey Epstein", "Ghislaine Maxwell"]));

        let intent = Intent::FlightLookup(FlightQuery {
            people: vec!["epstein".into(), "maxwell".into()],
            year: Some(1999),
        });
        let ctx = resolve(&store, &intent, 800).await.unwrap();
        assert_eq!(ctx.chunks.len(), 1);
        assert!(ctx.chunks.iter().all(|c| c.document_id > 0));
        assert!(ctx.chunks[0].snippet.contains("1999-06-12"));
    }

    #[tokio::test]
    async fn test_resolve_missing_document_is_empty() {
        let store = InMemoryStore::new();
        let ctx = resolve(&store, &Intent::DocFollowup { document_id: 99 }, 800)
            .await
            .unwrap();
        assert!(ctx.chunks.is_empty());
    }
}
