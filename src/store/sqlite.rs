//! SQLite-backed [`DocumentStore`].
//!
//! Full-text tiers run against the FTS5 indexes `documents_fts` and
//! `pages_fts` created by [`crate::migrate`]. Substring tiers use escaped
//! `LIKE` patterns and order by recency.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use super::{Containment, DocumentHit, DocumentStore, FlightRow, MatchMode, PageHit};
use crate::intent::FlightQuery;
use crate::models::DocumentRef;

/// Max OCR characters pulled back per page hit; snippets are cut later.
const PAGE_TEXT_CHARS: i64 = 4000;

const DOCUMENT_COLUMNS: &str = "d.id, d.title, d.data_set, d.file_type, d.source_url, \
     COALESCE(NULLIF(d.ai_summary, ''), d.description, '') AS text";

const SUMMARY_TEXT: &str = "(COALESCE(d.ai_summary, '') || ' ' || COALESCE(d.description, ''))";

/// SQLite implementation of [`DocumentStore`].
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Wrap `text` as a `%text%` pattern with `LIKE` wildcards escaped (`ESCAPE '\'`).
pub fn like_pattern(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() + 2);
    escaped.push('%');
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

/// Turn a natural-language query into an FTS5 `MATCH` expression.
///
/// Each alphanumeric token becomes a quoted term and terms are OR-ed, so
/// ranking behaves like a natural-language relevance search and stray
/// punctuation cannot produce FTS5 syntax errors. Returns `None` when the
/// query has no usable tokens.
pub fn fts_expression(query: &str) -> Option<String> {
    let mut terms: Vec<String> = Vec::new();
    for token in query
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
    {
        let quoted = format!("\"{}\"", token);
        if !terms.contains(&quoted) {
            terms.push(quoted);
        }
    }
    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" OR "))
    }
}

fn document_ref(row: &SqliteRow) -> Result<DocumentRef> {
    Ok(DocumentRef {
        id: row.try_get("id")?,
        title: row.try_get::<Option<String>, _>("title")?.unwrap_or_default(),
        data_set: row.try_get("data_set")?,
        file_type: row.try_get("file_type")?,
        source_url: row.try_get("source_url")?,
    })
}

fn document_hit(row: &SqliteRow, score: Option<f64>) -> Result<DocumentHit> {
    Ok(DocumentHit {
        document: document_ref(row)?,
        text: row.try_get("text")?,
        score,
    })
}

fn page_hit(row: &SqliteRow, score: Option<f64>) -> Result<PageHit> {
    Ok(PageHit {
        document_id: row.try_get("document_id")?,
        page_number: row.try_get("page_number")?,
        text: row.try_get("text")?,
        score,
    })
}

/// Append `(expr LIKE ? ESCAPE '\' <joiner> ...)` for each needle.
fn push_like_group(
    qb: &mut QueryBuilder<'_, Sqlite>,
    exprs: &[&str],
    needles: &[String],
    joiner: &str,
) {
    qb.push("(");
    for (i, needle) in needles.iter().enumerate() {
        if i > 0 {
            qb.push(joiner);
        }
        qb.push("(");
        for (j, expr) in exprs.iter().enumerate() {
            if j > 0 {
                qb.push(" OR ");
            }
            qb.push(*expr)
                .push(" LIKE ")
                .push_bind(like_pattern(needle))
                .push(r" ESCAPE '\'");
        }
        qb.push(")");
    }
    qb.push(")");
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn search_documents(&self, mode: &MatchMode, limit: usize) -> Result<Vec<DocumentHit>> {
        let limit = limit as i64;
        match mode {
            MatchMode::FullText(query) => {
                let Some(expr) = fts_expression(query) else {
                    return Ok(Vec::new());
                };
                let sql = format!(
                    "SELECT {}, bm25(documents_fts) AS bm25_rank \
                     FROM documents_fts JOIN documents d ON d.id = documents_fts.rowid \
                     WHERE documents_fts MATCH ? ORDER BY bm25_rank LIMIT ?",
                    DOCUMENT_COLUMNS
                );
                let rows = sqlx::query(&sql)
                    .bind(expr)
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await?;
                rows.iter()
                    .map(|row| -> Result<DocumentHit> {
                        let rank: f64 = row.try_get("bm25_rank")?;
                        // negate so higher = better
                        document_hit(row, Some(-rank))
                    })
                    .collect()
            }
            _ if text_is_empty(mode) => Ok(Vec::new()),
            MatchMode::Substring(_) | MatchMode::AnyTerm(_) => {
                let needles = like_needles(mode);
                let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
                    "SELECT {} FROM documents d WHERE ",
                    DOCUMENT_COLUMNS
                ));
                push_like_group(&mut qb, &["d.ai_summary", "d.description"], &needles, " OR ");
                qb.push(" ORDER BY d.created_at DESC, d.id DESC LIMIT ")
                    .push_bind(limit);
                let rows = qb.build().fetch_all(&self.pool).await?;
                rows.iter().map(|row| document_hit(row, None)).collect()
            }
        }
    }

    async fn search_pages(&self, mode: &MatchMode, limit: usize) -> Result<Vec<PageHit>> {
        let limit = limit as i64;
        match mode {
            MatchMode::FullText(query) => {
                let Some(expr) = fts_expression(query) else {
                    return Ok(Vec::new());
                };
                let rows = sqlx::query(
                    r#"
                    SELECT p.document_id, p.page_number,
                           substr(p.ocr_text, 1, ?) AS text,
                           bm25(pages_fts) AS bm25_rank
                    FROM pages_fts JOIN document_pages p ON p.id = pages_fts.rowid
                    WHERE pages_fts MATCH ?
                    ORDER BY bm25_rank
                    LIMIT ?
                    "#,
                )
                .bind(PAGE_TEXT_CHARS)
                .bind(expr)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?;
                rows.iter()
                    .map(|row| -> Result<PageHit> {
                        let rank: f64 = row.try_get("bm25_rank")?;
                        page_hit(row, Some(-rank))
                    })
                    .collect()
            }
            _ if text_is_empty(mode) => Ok(Vec::new()),
            MatchMode::Substring(_) | MatchMode::AnyTerm(_) => {
                let needles = like_needles(mode);
                let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
                    "SELECT p.document_id, p.page_number, substr(p.ocr_text, 1, ",
                );
                qb.push_bind(PAGE_TEXT_CHARS)
                    .push(") AS text FROM document_pages p WHERE ");
                push_like_group(&mut qb, &["p.ocr_text"], &needles, " OR ");
                qb.push(" ORDER BY p.created_at DESC, p.id DESC LIMIT ")
                    .push_bind(limit);
                let rows = qb.build().fetch_all(&self.pool).await?;
                rows.iter().map(|row| page_hit(row, None)).collect()
            }
        }
    }

    async fn get_document(&self, id: i64) -> Result<Option<DocumentHit>> {
        let sql = format!("SELECT {} FROM documents d WHERE d.id = ?", DOCUMENT_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(|r| document_hit(r, None)).transpose()
    }

    async fn find_page(
        &self,
        needles: &[&str],
        containment: Containment,
    ) -> Result<Option<PageHit>> {
        if needles.is_empty() {
            return Ok(None);
        }
        let needles: Vec<String> = needles.iter().map(|n| n.to_string()).collect();
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT p.document_id, p.page_number, p.ocr_text AS text FROM document_pages p WHERE ",
        );
        push_like_group(&mut qb, &["p.ocr_text"], &needles, joiner(containment));
        qb.push(" ORDER BY p.document_id ASC, p.page_number ASC LIMIT 1");
        let row = qb.build().fetch_optional(&self.pool).await?;
        row.as_ref().map(|r| page_hit(r, None)).transpose()
    }

    async fn find_document(
        &self,
        needles: &[&str],
        containment: Containment,
    ) -> Result<Option<DocumentHit>> {
        if needles.is_empty() {
            return Ok(None);
        }
        let needles: Vec<String> = needles.iter().map(|n| n.to_string()).collect();
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {} FROM documents d WHERE ", DOCUMENT_COLUMNS));
        push_like_group(&mut qb, &[SUMMARY_TEXT], &needles, joiner(containment));
        qb.push(" ORDER BY d.id ASC LIMIT 1");
        let row = qb.build().fetch_optional(&self.pool).await?;
        row.as_ref().map(|r| document_hit(r, None)).transpose()
    }

    async fn find_flights(&self, query: &FlightQuery, limit: usize) -> Result<Vec<FlightRow>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT f.id, f.document_id, f.flight_date, f.origin, f.destination, f.aircraft \
             FROM flights f WHERE 1 = 1",
        );
        for pattern in query.name_patterns() {
            qb.push(
                " AND EXISTS (SELECT 1 FROM flight_passengers fp \
                 WHERE fp.flight_id = f.id AND fp.name LIKE ",
            )
            .push_bind(pattern)
            .push(")");
        }
        if let Some(year) = query.year {
            qb.push(" AND substr(f.flight_date, 1, 4) = ")
                .push_bind(year.to_string());
        }
        qb.push(" ORDER BY f.flight_date ASC, f.id ASC LIMIT ")
            .push_bind(limit as i64);

        let rows = qb.build().fetch_all(&self.pool).await?;

        let mut flights = Vec::with_capacity(rows.len());
        for row in &rows {
            let id: i64 = row.try_get("id")?;
            let passengers: Vec<String> = sqlx::query_scalar(
                "SELECT name FROM flight_passengers WHERE flight_id = ? ORDER BY id ASC",
            )
            .bind(id)
            .fetch_all(&self.pool)
            .await?;

            flights.push(FlightRow {
                id,
                document_id: row.try_get("document_id")?,
                flight_date: row.try_get("flight_date")?,
                origin: row.try_get("origin")?,
                destination: row.try_get("destination")?,
                aircraft: row.try_get("aircraft")?,
                passengers,
            });
        }

        Ok(flights)
    }
}

fn joiner(containment: Containment) -> &'static str {
    match containment {
        Containment::All => " AND ",
        Containment::Any => " OR ",
    }
}

fn like_needles(mode: &MatchMode) -> Vec<String> {
    let needles = match mode {
        MatchMode::FullText(q) | MatchMode::Substring(q) => vec![q.clone()],
        MatchMode::AnyTerm(terms) => terms.clone(),
    };
    needles
        .into_iter()
        .filter(|n| !n.trim().is_empty())
        .collect()
}

fn text_is_empty(mode: &MatchMode) -> bool {
    like_needles(mode).is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("50%_off"), r"%50\%\_off%");
        assert_eq!(like_pattern(r"a\b"), r"%a\\b%");
        assert_eq!(like_pattern("plain"), "%plain%");
    }

    #[test]
    fn test_fts_expression() {
        assert_eq!(
            fts_expression("Who flew, with Maxwell?").as_deref(),
            Some("\"who\" OR \"flew\" OR \"with\" OR \"maxwell\"")
        );
        assert_eq!(fts_expression("?!"), None);
    }
}
