//! Read-only document store interface.
//!
//! The [`DocumentStore`] trait is everything the answering pipeline needs
//! from the archive: relevance search, substring search, point lookups and
//! the flight/passenger join. Ingestion and schema ownership live elsewhere.
//!
//! | Backend | Module |
//! |---------|--------|
//! | SQLite + FTS5 | [`sqlite`] |
//! | In-memory | [`memory`] |

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;

use crate::intent::FlightQuery;
use crate::models::DocumentRef;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

/// How a search call matches text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchMode {
    /// Relevance-ranked full-text search with a natural-language query.
    FullText(String),
    /// Case-insensitive substring containment, newest first.
    Substring(String),
    /// Containment of any one of the terms, newest first.
    AnyTerm(Vec<String>),
}

impl MatchMode {
    pub fn name(&self) -> &'static str {
        match self {
            Self::FullText(_) => "full_text",
            Self::Substring(_) => "substring",
            Self::AnyTerm(_) => "any_term",
        }
    }
}

/// Whether every needle or at least one must be present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Containment {
    All,
    Any,
}

/// A document-level match over summary/description text.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentHit {
    pub document: DocumentRef,
    /// AI summary if present, else description.
    pub text: String,
    pub score: Option<f64>,
}

/// A page-level match over OCR text.
#[derive(Debug, Clone, PartialEq)]
pub struct PageHit {
    pub document_id: i64,
    pub page_number: i64,
    pub text: String,
    pub score: Option<f64>,
}

/// One flight with its passenger list, in manifest order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlightRow {
    pub id: i64,
    pub document_id: Option<i64>,
    pub flight_date: Option<String>,
    pub origin: Option<String>,
    pub destination: Option<String>,
    pub aircraft: Option<String>,
    pub passengers: Vec<String>,
}

impl FlightRow {
    /// Date, origin and destination are all present and non-blank.
    pub fn is_complete(&self) -> bool {
        [&self.flight_date, &self.origin, &self.destination]
            .iter()
            .all(|f| f.as_deref().is_some_and(|v| !v.trim().is_empty()))
    }
}

/// Abstract read access to the archive.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`ping`](DocumentStore::ping) | Reachability check |
/// | [`search_documents`](DocumentStore::search_documents) | Summary/description search |
/// | [`search_pages`](DocumentStore::search_pages) | OCR page search |
/// | [`get_document`](DocumentStore::get_document) | Point lookup by id |
/// | [`find_page`](DocumentStore::find_page) | First page containing needles |
/// | [`find_document`](DocumentStore::find_document) | First summary containing needles |
/// | [`find_flights`](DocumentStore::find_flights) | Flight/passenger join |
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn ping(&self) -> Result<()>;

    async fn search_documents(&self, mode: &MatchMode, limit: usize) -> Result<Vec<DocumentHit>>;

    async fn search_pages(&self, mode: &MatchMode, limit: usize) -> Result<Vec<PageHit>>;

    /// Point lookup by id, with the document's summary text.
    async fn get_document(&self, id: i64) -> Result<Option<DocumentHit>>;

    /// First OCR page (lowest document, then page) containing the needles.
    async fn find_page(&self, needles: &[&str], containment: Containment)
        -> Result<Option<PageHit>>;

    /// First document whose summary/description contains the needles.
    async fn find_document(
        &self,
        needles: &[&str],
        containment: Containment,
    ) -> Result<Option<DocumentHit>>;

    /// Flights carrying every named person (and in the year, if given),
    /// ordered by date ascending.
    async fn find_flights(&self, query: &FlightQuery, limit: usize) -> Result<Vec<FlightRow>>;
}
