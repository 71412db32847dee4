//! Context retrieval.
//!
//! Two independent pipelines (document summaries and OCR pages) each run the
//! same [`CASCADE`] of match strategies, left to right:
//!
//! | Tier | Strategy | Runs when | Stops the cascade on a hit |
//! |------|----------|-----------|----------------------------|
//! | A | full-text relevance | always | yes |
//! | B | substring of the whole question | nothing held yet | no |
//! | C | any of ≤8 keyword/synonym terms | fewer than N held | no |
//!
//! A strategy that errors (for example an unsupported full-text index) is
//! logged and treated as having found nothing. Special-intent chunks are
//! prepended ahead of the generic ones and the combined list is cut to N.

use std::collections::BTreeMap;
use std::future::Future;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::intent::PreparedQuery;
use crate::models::{truncate_chars, DocumentRef, EvidenceChunk, SourceKind};
use crate::special;
use crate::store::{DocumentHit, DocumentStore, MatchMode, PageHit};

/// Maximum keyword + synonym terms OR-ed together by tier C.
pub const MAX_SEARCH_TERMS: usize = 8;

/// When a strategy in the cascade is allowed to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    Always,
    /// Only while no rows are held.
    WhenEmpty,
    /// Only while fewer than N rows are held.
    WhenShort,
}

impl Gate {
    fn admits(&self, held: usize, limit: usize) -> bool {
        match self {
            Self::Always => true,
            Self::WhenEmpty => held == 0,
            Self::WhenShort => held < limit,
        }
    }
}

/// One named retrieval tier.
pub struct Strategy {
    pub name: &'static str,
    pub gate: Gate,
    pub stop_on_hit: bool,
    pub mode: fn(&str, &PreparedQuery) -> MatchMode,
}

pub const CASCADE: [Strategy; 3] = [
    Strategy {
        name: "full_text",
        gate: Gate::Always,
        stop_on_hit: true,
        mode: |question, _| MatchMode::FullText(question.to_string()),
    },
    Strategy {
        name: "substring",
        gate: Gate::WhenEmpty,
        stop_on_hit: false,
        mode: |question, _| MatchMode::Substring(question.trim().to_string()),
    },
    Strategy {
        name: "keyword_or",
        gate: Gate::WhenShort,
        stop_on_hit: false,
        mode: |_, prepared| MatchMode::AnyTerm(prepared.search_terms(MAX_SEARCH_TERMS)),
    },
];

/// Evidence chunks plus the documents they reference.
#[derive(Debug, Clone, Default)]
pub struct RetrievedContext {
    pub chunks: Vec<EvidenceChunk>,
    pub documents: BTreeMap<i64, DocumentRef>,
}

impl RetrievedContext {
    pub fn document_list(&self) -> Vec<DocumentRef> {
        self.documents.values().cloned().collect()
    }
}

/// Run one strategy; `None` means "found nothing", including on error.
async fn attempt<T, F, Fut>(
    pipeline: &str,
    strategy: &Strategy,
    search: &F,
    mode: MatchMode,
) -> Option<Vec<T>>
where
    F: Fn(MatchMode) -> Fut,
    Fut: Future<Output = Result<Vec<T>>>,
{
    match search(mode).await {
        Ok(rows) if !rows.is_empty() => {
            debug!(pipeline, tier = strategy.name, rows = rows.len(), "tier hit");
            Some(rows)
        }
        Ok(_) => {
            debug!(pipeline, tier = strategy.name, "tier empty");
            None
        }
        Err(e) => {
            warn!(pipeline, tier = strategy.name, error = %e, "tier failed, falling through");
            None
        }
    }
}

/// Compose [`CASCADE`] left to right for one pipeline.
///
/// Rows are appended as returned until `limit` are held. A row found by
/// more than one tier is kept once per tier; consumers deduplicate.
async fn run_cascade<T, F, Fut>(
    pipeline: &str,
    question: &str,
    prepared: &PreparedQuery,
    limit: usize,
    search: F,
) -> Vec<T>
where
    F: Fn(MatchMode) -> Fut,
    Fut: Future<Output = Result<Vec<T>>>,
{
    let mut held: Vec<T> = Vec::new();

    for strategy in CASCADE.iter() {
        if !strategy.gate.admits(held.len(), limit) {
            continue;
        }
        let mode = (strategy.mode)(question, prepared);
        let Some(rows) = attempt(pipeline, strategy, &search, mode).await else {
            continue;
        };
        let room = limit.saturating_sub(held.len());
        held.extend(rows.into_iter().take(room));
        if strategy.stop_on_hit {
            break;
        }
    }

    held
}

/// Retrieve up to `limit` evidence chunks for a question.
///
/// Fails only when the store is unreachable; individual tier and resolver
/// failures degrade to "no rows".
pub async fn retrieve(
    store: &dyn DocumentStore,
    question: &str,
    prepared: &PreparedQuery,
    limit: usize,
    snippet_chars: usize,
) -> Result<RetrievedContext> {
    store.ping().await?;

    let mut context = RetrievedContext::default();

    // Special-intent chunks go first
    let mut special_chunks = Vec::new();
    if let Some(intent) = &prepared.intent {
        match special::resolve(store, intent, snippet_chars).await {
            Ok(special) => {
                for doc in special.documents {
                    context.documents.insert(doc.id, doc);
                }
                special_chunks = special.chunks;
            }
            Err(e) => {
                warn!(intent = intent.kind().as_str(), error = %e, "special resolver failed");
            }
        }
    }

    // Document-level pipeline
    let document_hits: Vec<DocumentHit> = run_cascade(
        "documents",
        question,
        prepared,
        limit,
        |mode| async move { store.search_documents(&mode, limit).await },
    )
    .await;

    let mut summary_chunks = Vec::with_capacity(document_hits.len());
    for hit in document_hits {
        summary_chunks.push(EvidenceChunk {
            document_id: hit.document.id,
            page_number: None,
            title: hit.document.title.clone(),
            data_set: hit.document.data_set.clone(),
            snippet: truncate_chars(hit.text.trim(), snippet_chars),
            score: hit.score,
            source: SourceKind::Summary,
        });
        context.documents.insert(hit.document.id, hit.document);
    }

    // Page-level pipeline
    let page_hits: Vec<PageHit> = run_cascade(
        "pages",
        question,
        prepared,
        limit,
        |mode| async move { store.search_pages(&mode, limit).await },
    )
    .await;

    let mut ocr_chunks = Vec::with_capacity(page_hits.len());
    for hit in page_hits {
        if !context.documents.contains_key(&hit.document_id) {
            match store.get_document(hit.document_id).await {
                Ok(Some(doc)) => {
                    context.documents.insert(doc.document.id, doc.document);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(document_id = hit.document_id, error = %e, "document backfill failed");
                }
            }
        }
        let doc = context.documents.get(&hit.document_id);
        ocr_chunks.push(EvidenceChunk {
            document_id: hit.document_id,
            page_number: Some(hit.page_number),
            title: doc
                .map(|d| d.title.clone())
                .unwrap_or_else(|| format!("Document #{}", hit.document_id)),
            data_set: doc.and_then(|d| d.data_set.clone()),
            snippet: truncate_chars(hit.text.trim(), snippet_chars),
            score: hit.score,
            source: SourceKind::Ocr,
        });
    }

    let special_count = special_chunks.len();
    let summary_count = summary_chunks.len();
    let ocr_count = ocr_chunks.len();

    context.chunks = special_chunks;
    context.chunks.extend(summary_chunks);
    context.chunks.extend(ocr_chunks);
    context.chunks.truncate(limit);

    if context.chunks.is_empty() {
        context.chunks.push(EvidenceChunk::system_placeholder());
    }

    info!(
        special = special_count,
        summary = summary_count,
        ocr = ocr_count,
        kept = context.chunks.len(),
        documents = context.documents.len(),
        "context retrieved"
    );

    Ok(context)
}
