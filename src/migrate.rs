use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create every table, index and trigger the service reads or writes.
///
/// Safe to run repeatedly against the same database.
pub async fn apply_schema(pool: &SqlitePool) -> Result<()> {
    // Archive documents
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id INTEGER PRIMARY KEY,
            title TEXT NOT NULL DEFAULT '',
            description TEXT,
            ai_summary TEXT,
            data_set TEXT,
            file_type TEXT,
            source_url TEXT,
            created_at INTEGER NOT NULL DEFAULT (unixepoch())
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS document_pages (
            id INTEGER PRIMARY KEY,
            document_id INTEGER NOT NULL,
            page_number INTEGER NOT NULL,
            ocr_text TEXT NOT NULL DEFAULT '',
            created_at INTEGER NOT NULL DEFAULT (unixepoch()),
            UNIQUE(document_id, page_number),
            FOREIGN KEY (document_id) REFERENCES documents(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Flight manifests
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS flights (
            id INTEGER PRIMARY KEY,
            document_id INTEGER,
            flight_date TEXT,
            origin TEXT,
            destination TEXT,
            aircraft TEXT,
            FOREIGN KEY (document_id) REFERENCES documents(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS flight_passengers (
            id INTEGER PRIMARY KEY,
            flight_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            FOREIGN KEY (flight_id) REFERENCES flights(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Conversation sessions
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chat_sessions (
            id INTEGER PRIMARY KEY,
            token TEXT NOT NULL UNIQUE,
            ip_hash TEXT,
            user_agent TEXT,
            created_at INTEGER NOT NULL,
            last_active_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chat_messages (
            id INTEGER PRIMARY KEY,
            session_id INTEGER NOT NULL,
            role TEXT NOT NULL CHECK (role IN ('user', 'assistant')),
            content TEXT NOT NULL,
            model TEXT,
            tokens_in INTEGER,
            tokens_out INTEGER,
            latency_ms INTEGER,
            metadata_json TEXT NOT NULL DEFAULT '{}',
            created_at INTEGER NOT NULL,
            FOREIGN KEY (session_id) REFERENCES chat_sessions(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chat_citations (
            id INTEGER PRIMARY KEY,
            message_id INTEGER NOT NULL,
            document_id INTEGER NOT NULL,
            page_number INTEGER,
            quote TEXT,
            FOREIGN KEY (message_id) REFERENCES chat_messages(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // FTS5 CREATE is not idempotent natively, so we check first
    if !table_exists(pool, "documents_fts").await? {
        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE documents_fts USING fts5(
                description,
                ai_summary,
                content='documents',
                content_rowid='id'
            )
            "#,
        )
        .execute(pool)
        .await?;
    }

    if !table_exists(pool, "pages_fts").await? {
        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE pages_fts USING fts5(
                ocr_text,
                content='document_pages',
                content_rowid='id'
            )
            "#,
        )
        .execute(pool)
        .await?;
    }

    // External-content FTS tables are kept in sync by triggers
    let triggers = [
        r#"
        CREATE TRIGGER IF NOT EXISTS documents_fts_insert AFTER INSERT ON documents BEGIN
            INSERT INTO documents_fts(rowid, description, ai_summary)
            VALUES (new.id, new.description, new.ai_summary);
        END
        "#,
        r#"
        CREATE TRIGGER IF NOT EXISTS documents_fts_delete AFTER DELETE ON documents BEGIN
            INSERT INTO documents_fts(documents_fts, rowid, description, ai_summary)
            VALUES ('delete', old.id, old.description, old.ai_summary);
        END
        "#,
        r#"
        CREATE TRIGGER IF NOT EXISTS documents_fts_update AFTER UPDATE ON documents BEGIN
            INSERT INTO documents_fts(documents_fts, rowid, description, ai_summary)
            VALUES ('delete', old.id, old.description, old.ai_summary);
            INSERT INTO documents_fts(rowid, description, ai_summary)
            VALUES (new.id, new.description, new.ai_summary);
        END
        "#,
        r#"
        CREATE TRIGGER IF NOT EXISTS pages_fts_insert AFTER INSERT ON document_pages BEGIN
            INSERT INTO pages_fts(rowid, ocr_text) VALUES (new.id, new.ocr_text);
        END
        "#,
        r#"
        CREATE TRIGGER IF NOT EXISTS pages_fts_delete AFTER DELETE ON document_pages BEGIN
            INSERT INTO pages_fts(pages_fts, rowid, ocr_text) VALUES ('delete', old.id, old.ocr_text);
        END
        "#,
        r#"
        CREATE TRIGGER IF NOT EXISTS pages_fts_update AFTER UPDATE ON document_pages BEGIN
            INSERT INTO pages_fts(pages_fts, rowid, ocr_text) VALUES ('delete', old.id, old.ocr_text);
            INSERT INTO pages_fts(rowid, ocr_text) VALUES (new.id, new.ocr_text);
        END
        "#,
    ];
    for trigger in triggers {
        sqlx::query(trigger).execute(pool).await?;
    }

    // Create indexes
    let indexes = [
        "CREATE INDEX IF NOT EXISTS idx_documents_created_at ON documents(created_at DESC)",
        "CREATE INDEX IF NOT EXISTS idx_pages_document_id ON document_pages(document_id)",
        "CREATE INDEX IF NOT EXISTS idx_flights_date ON flights(flight_date)",
        "CREATE INDEX IF NOT EXISTS idx_passengers_flight_id ON flight_passengers(flight_id)",
        "CREATE INDEX IF NOT EXISTS idx_messages_session_id ON chat_messages(session_id, id)",
        "CREATE INDEX IF NOT EXISTS idx_citations_message_id ON chat_citations(message_id)",
    ];
    for index in indexes {
        sqlx::query(index).execute(pool).await?;
    }

    Ok(())
}

async fn table_exists(pool: &SqlitePool, name: &str) -> Result<bool> {
    let exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name=?",
    )
    .bind(name)
    .fetch_one(pool)
    .await?;
    Ok(exists)
}
