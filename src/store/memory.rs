//! In-memory [`DocumentStore`] implementation for tests and demos.
//!
//! Uses `Vec`s behind `std::sync::RwLock`. Full-text search is a simple
//! token-overlap score; substring modes are case-insensitive containment.
//! Every search call is appended to a query log so callers can assert which
//! retrieval tiers actually ran.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, RwLock};

use anyhow::{bail, Result};
use async_trait::async_trait;

use super::{Containment, DocumentHit, DocumentStore, FlightRow, MatchMode, PageHit};
use crate::intent::FlightQuery;
use crate::models::DocumentRef;

struct StoredDocument {
    document: DocumentRef,
    description: Option<String>,
    ai_summary: Option<String>,
    created_at: i64,
}

impl StoredDocument {
    fn text(&self) -> String {
        self.ai_summary
            .clone()
            .filter(|s| !s.is_empty())
            .or_else(|| self.description.clone())
            .unwrap_or_default()
    }

    fn searchable(&self) -> String {
        format!(
            "{} {}",
            self.ai_summary.as_deref().unwrap_or(""),
            self.description.as_deref().unwrap_or("")
        )
        .to_lowercase()
    }
}

struct StoredPage {
    document_id: i64,
    page_number: i64,
    ocr_text: String,
    seq: usize,
}

/// In-memory store for tests and demos.
pub struct InMemoryStore {
    documents: RwLock<Vec<StoredDocument>>,
    pages: RwLock<Vec<StoredPage>>,
    flights: RwLock<Vec<FlightRow>>,
    queries: Mutex<Vec<String>>,
    full_text_unavailable: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            documents: RwLock::new(Vec::new()),
            pages: RwLock::new(Vec::new()),
            flights: RwLock::new(Vec::new()),
            queries: Mutex::new(Vec::new()),
            full_text_unavailable: AtomicBool::new(false),
        }
    }

    pub fn add_document(
        &self,
        document: DocumentRef,
        description: Option<&str>,
        ai_summary: Option<&str>,
        created_at: i64,
    ) {
        let mut docs = self.documents.write().unwrap();
        docs.retain(|d| d.document.id != document.id);
        docs.push(StoredDocument {
            document,
            description: description.map(str::to_string),
            ai_summary: ai_summary.map(str::to_string),
            created_at,
        });
    }

    pub fn add_page(&self, document_id: i64, page_number: i64, ocr_text: &str) {
        let mut pages = self.pages.write().unwrap();
        let seq = pages.len();
        pages.push(StoredPage {
            document_id,
            page_number,
            ocr_text: ocr_text.to_string(),
            seq,
        });
    }

    pub fn add_flight(&self, flight: FlightRow) {
        self.flights.write().unwrap().push(flight);
    }

    /// Make full-text search fail, as if the index were unsupported.
    pub fn set_full_text_unavailable(&self, unavailable: bool) {
        self.full_text_unavailable
            .store(unavailable, Ordering::SeqCst);
    }

    /// Search calls made so far, as `"<target>:<mode>"` strings.
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }

    fn record(&self, target: &str, mode: &MatchMode) -> Result<()> {
        self.queries
            .lock()
            .unwrap()
            .push(format!("{}:{}", target, mode.name()));
        if matches!(mode, MatchMode::FullText(_))
            && self.full_text_unavailable.load(Ordering::SeqCst)
        {
            bail!("full-text index unavailable");
        }
        Ok(())
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn tokens(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Count of query tokens present as words in `haystack`.
fn overlap_score(query: &str, haystack: &str) -> f64 {
    let words = tokens(haystack);
    let mut seen: Vec<String> = Vec::new();
    for t in tokens(query) {
        if words.contains(&t) && !seen.contains(&t) {
            seen.push(t);
        }
    }
    seen.len() as f64
}

fn contains_ci(haystack_lower: &str, needle: &str) -> bool {
    !needle.trim().is_empty() && haystack_lower.contains(&needle.to_lowercase())
}

fn contains_all_or_any(haystack: &str, needles: &[&str], containment: Containment) -> bool {
    let lower = haystack.to_lowercase();
    match containment {
        Containment::All => needles.iter().all(|n| contains_ci(&lower, n)),
        Containment::Any => needles.iter().any(|n| contains_ci(&lower, n)),
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn search_documents(&self, mode: &MatchMode, limit: usize) -> Result<Vec<DocumentHit>> {
        self.record("documents", mode)?;
        let docs = self.documents.read().unwrap();

        let mut scored: Vec<(&StoredDocument, Option<f64>)> = match mode {
            MatchMode::FullText(query) => docs
                .iter()
                .map(|d| (d, overlap_score(query, &d.searchable())))
                .filter(|(_, s)| *s > 0.0)
                .map(|(d, s)| (d, Some(s)))
                .collect(),
            MatchMode::Substring(text) => docs
                .iter()
                .filter(|d| contains_ci(&d.searchable(), text))
                .map(|d| (d, None))
                .collect(),
            MatchMode::AnyTerm(terms) => docs
                .iter()
                .filter(|d| {
                    let hay = d.searchable();
                    terms.iter().any(|t| contains_ci(&hay, t))
                })
                .map(|d| (d, None))
                .collect(),
        };

        scored.sort_by(|(a, sa), (b, sb)| {
            sb.partial_cmp(sa)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.created_at.cmp(&a.created_at))
                .then(b.document.id.cmp(&a.document.id))
        });
        scored.truncate(limit);

        Ok(scored
            .into_iter()
            .map(|(d, score)| DocumentHit {
                document: d.document.clone(),
                text: d.text(),
                score,
            })
            .collect())
    }

    async fn search_pages(&self, mode: &MatchMode, limit: usize) -> Result<Vec<PageHit>> {
        self.record("pages", mode)?;
        let pages = self.pages.read().unwrap();

        let mut scored: Vec<(&StoredPage, Option<f64>)> = match mode {
            MatchMode::FullText(query) => pages
                .iter()
                .map(|p| (p, overlap_score(query, &p.ocr_text)))
                .filter(|(_, s)| *s > 0.0)
                .map(|(p, s)| (p, Some(s)))
                .collect(),
            MatchMode::Substring(text) => pages
                .iter()
                .filter(|p| contains_ci(&p.ocr_text.to_lowercase(), text))
                .map(|p| (p, None))
                .collect(),
            MatchMode::AnyTerm(terms) => pages
                .iter()
                .filter(|p| {
                    let hay = p.ocr_text.to_lowercase();
                    terms.iter().any(|t| contains_ci(&hay, t))
                })
                .map(|p| (p, None))
                .collect(),
        };

        scored.sort_by(|(a, sa), (b, sb)| {
            sb.partial_cmp(sa)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.seq.cmp(&a.seq))
        });
        scored.truncate(limit);

        Ok(scored
            .into_iter()
            .map(|(p, score)| PageHit {
                document_id: p.document_id,
                page_number: p.page_number,
                text: p.ocr_text.clone(),
                score,
            })
            .collect())
    }

    async fn get_document(&self, id: i64) -> Result<Option<DocumentHit>> {
        let docs = self.documents.read().unwrap();
        Ok(docs.iter().find(|d| d.document.id == id).map(|d| DocumentHit {
            document: d.document.clone(),
            text: d.text(),
            score: None,
        }))
    }

    async fn find_page(
        &self,
        needles: &[&str],
        containment: Containment,
    ) -> Result<Option<PageHit>> {
        if needles.is_empty() {
            return Ok(None);
        }
        let pages = self.pages.read().unwrap();
        let mut matching: Vec<&StoredPage> = pages
            .iter()
            .filter(|p| contains_all_or_any(&p.ocr_text, needles, containment))
            .collect();
        matching.sort_by_key(|p| (p.document_id, p.page_number));
        Ok(matching.first().map(|p| PageHit {
            document_id: p.document_id,
            page_number: p.page_number,
            text: p.ocr_text.clone(),
            score: None,
        }))
    }

    async fn find_document(
        &self,
        needles: &[&str],
        containment: Containment,
    ) -> Result<Option<DocumentHit>> {
        if needles.is_empty() {
            return Ok(None);
        }
        let docs = self.documents.read().unwrap();
        let mut matching: Vec<&StoredDocument> = docs
            .iter()
            .filter(|d| contains_all_or_any(&d.searchable(), needles, containment))
            .collect();
        matching.sort_by_key(|d| d.document.id);
        Ok(matching.first().map(|d| DocumentHit {
            document: d.document.clone(),
            text: d.text(),
            score: None,
        }))
    }

    async fn find_flights(&self, query: &FlightQuery, limit: usize) -> Result<Vec<FlightRow>> {
        let flights = self.flights.read().unwrap();
        let mut matching: Vec<FlightRow> = flights
            .iter()
            .filter(|f| {
                query.people.iter().all(|person| {
                    f.passengers
                        .iter()
                        .any(|name| name.to_lowercase().contains(&person.to_lowercase()))
                })
            })
            .filter(|f| match query.year {
                Some(year) => f
                    .flight_date
                    .as_deref()
                    .is_some_and(|d| d.starts_with(&year.to_string())),
                None => true,
            })
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.flight_date.cmp(&b.flight_date).then(a.id.cmp(&b.id)));
        matching.truncate(limit);
        Ok(matching)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: i64, title: &str) -> DocumentRef {
        DocumentRef {
            id,
            title: title.to_string(),
            data_set: None,
            file_type: None,
            source_url: None,
        }
    }

    #[tokio::test]
    async fn test_full_text_ranks_by_overlap() {
        let store = InMemoryStore::new();
        store.add_document(doc(1, "a"), Some("court filing about flights"), None, 10);
        store.add_document(doc(2, "b"), None, Some("flights and passenger manifest"), 5);

        let hits = store
            .search_documents(&MatchMode::FullText("passenger flights".into()), 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].document.id, 2);
        assert_eq!(store.queries(), vec!["documents:full_text"]);
    }

    #[tokio::test]
    async fn test_full_text_unavailable_errors() {
        let store = InMemoryStore::new();
        store.set_full_text_unavailable(true);
        assert!(store
            .search_pages(&MatchMode::FullText("x".into()), 3)
            .await
            .is_err());
        assert!(store
            .search_pages(&MatchMode::Substring("x".into()), 3)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_find_flights_requires_all_people() {
        let store = InMemoryStore::new();
        store.add_flight(FlightRow {
            id: 1,
            document_id: Some(9),
            flight_date: Some("1999-03-01".into()),
            origin: Some("TEB".into()),
            destination: Some("PBI".into()),
            aircraft: None,
            passengers: vec!["Jeffrey Epstein".into(), "Ghislaine Maxwell".into()],
        });
        store.add_flight(FlightRow {
            id: 2,
            document_id: Some(9),
            flight_date: Some("1999-04-01".into()),
            origin: Some("PBI".into()),
            destination: Some("TEB".into()),
            aircraft: None,
            passengers: vec!["Jeffrey Epstein".into()],
        });

        let query = FlightQuery {
            people: vec!["epstein".into(), "maxwell".into()],
            year: Some(1999),
        };
        let flights = store.find_flights(&query, 6).await.unwrap();
        assert_eq!(flights.len(), 1);
        assert_eq!(flights[0].id, 1);

        let query = FlightQuery {
            people: vec!["epstein".into(), "maxwell".into()],
            year: Some(2001),
        };
        assert!(store.find_flights(&query, 6).await.unwrap().is_empty());
    }
}
