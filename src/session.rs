//! Conversation sessions and the message log.
//!
//! The [`SessionGateway`] trait owns everything the pipeline persists:
//! sessions keyed by an opaque token, append-only user/assistant messages
//! and the citations attached to assistant messages. [`SqliteSessions`] is
//! the SQLite implementation over the `chat_*` tables.
//!
//! Messages are never updated after insert. Concurrent requests on one
//! session each append their own rows; `last_active_at` is last-write-wins.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use sqlx::{Row, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::models::{Citation, HistoryTurn, Message, Role, Session, Usage};

type HmacSha256 = Hmac<Sha256>;

const MIN_TOKEN_CHARS: usize = 8;
const MAX_TOKEN_CHARS: usize = 128;

/// A message about to be appended.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub role: Role,
    pub content: String,
    pub metadata: serde_json::Value,
    pub usage: Option<Usage>,
    pub latency_ms: Option<i64>,
    pub model: Option<String>,
}

impl NewMessage {
    pub fn user(content: impl Into<String>, metadata: serde_json::Value) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            metadata,
            usage: None,
            latency_ms: None,
            model: None,
        }
    }
}

#[async_trait]
pub trait SessionGateway: Send + Sync {
    /// Look up the session for `token`, creating it if needed.
    /// A fresh token is minted when none is supplied.
    async fn get_or_create_session(
        &self,
        token: Option<&str>,
        client_ip: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<Session>;

    /// Append one message and return its id.
    async fn append_message(&self, session_id: i64, message: &NewMessage) -> Result<i64>;

    /// Up to `limit` most recent turns, oldest first, optionally only those
    /// older than `before_message_id`.
    async fn recent_history(
        &self,
        session_id: i64,
        limit: i64,
        before_message_id: Option<i64>,
    ) -> Result<Vec<HistoryTurn>>;

    async fn record_citations(&self, message_id: i64, citations: &[Citation]) -> Result<()>;
}

/// 8–128 characters of `[A-Za-z0-9_-]`.
pub fn is_valid_token(token: &str) -> bool {
    (MIN_TOKEN_CHARS..=MAX_TOKEN_CHARS).contains(&token.len())
        && token
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

/// Hex HMAC-SHA256 of the client IP, keyed by the configured salt.
pub fn hash_ip(salt: &str, ip: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(salt.as_bytes()).expect("HMAC can take key of any size");
    mac.update(ip.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

pub struct SqliteSessions {
    pool: SqlitePool,
    ip_salt: String,
}

impl SqliteSessions {
    pub fn new(pool: SqlitePool, ip_salt: impl Into<String>) -> Self {
        Self {
            pool,
            ip_salt: ip_salt.into(),
        }
    }

    /// Every message in a session, oldest first.
    pub async fn messages(&self, session_id: i64) -> Result<Vec<Message>> {
        let rows = sqlx::query(
            "SELECT id, session_id, role, content, model, tokens_in, tokens_out, latency_ms, metadata_json
             FROM chat_messages WHERE session_id = ? ORDER BY id ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<Message> {
                let role: String = row.try_get("role")?;
                let metadata: String = row.try_get("metadata_json")?;
                Ok(Message {
                    id: row.try_get("id")?,
                    session_id: row.try_get("session_id")?,
                    role: Role::parse(&role).with_context(|| format!("unknown role '{}'", role))?,
                    content: row.try_get("content")?,
                    model: row.try_get("model")?,
                    tokens_in: row.try_get("tokens_in")?,
                    tokens_out: row.try_get("tokens_out")?,
                    latency_ms: row.try_get("latency_ms")?,
                    metadata: serde_json::from_str(&metadata).unwrap_or(serde_json::Value::Null),
                })
            })
            .collect()
    }

    /// Citations recorded for one message, in insert order.
    pub async fn citations(&self, message_id: i64) -> Result<Vec<Citation>> {
        let rows = sqlx::query(
            "SELECT document_id, page_number, quote FROM chat_citations WHERE message_id = ? ORDER BY id ASC",
        )
        .bind(message_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<Citation> {
                Ok(Citation {
                    document_id: row.try_get("document_id")?,
                    page_number: row.try_get("page_number")?,
                    quote: row.try_get("quote")?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl SessionGateway for SqliteSessions {
    async fn get_or_create_session(
        &self,
        token: Option<&str>,
        client_ip: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<Session> {
        let token = match token {
            Some(t) => t.to_string(),
            None => Uuid::new_v4().to_string(),
        };
        let ip_hash = client_ip.map(|ip| hash_ip(&self.ip_salt, ip));
        let now = Utc::now().timestamp();

        sqlx::query(
            "INSERT INTO chat_sessions (token, ip_hash, user_agent, created_at, last_active_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(token) DO UPDATE SET
                last_active_at = excluded.last_active_at,
                ip_hash = COALESCE(excluded.ip_hash, chat_sessions.ip_hash),
                user_agent = COALESCE(excluded.user_agent, chat_sessions.user_agent)",
        )
        .bind(&token)
        .bind(&ip_hash)
        .bind(user_agent)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query(
            "SELECT id, token, ip_hash, user_agent, last_active_at FROM chat_sessions WHERE token = ?",
        )
        .bind(&token)
        .fetch_one(&self.pool)
        .await?;

        let session = Session {
            id: row.try_get("id")?,
            token: row.try_get("token")?,
            ip_hash: row.try_get("ip_hash")?,
            user_agent: row.try_get("user_agent")?,
            last_active_at: row.try_get("last_active_at")?,
        };
        debug!(session_id = session.id, "session ready");
        Ok(session)
    }

    async fn append_message(&self, session_id: i64, message: &NewMessage) -> Result<i64> {
        let metadata = serde_json::to_string(&message.metadata)?;
        let result = sqlx::query(
            "INSERT INTO chat_messages
                (session_id, role, content, model, tokens_in, tokens_out, latency_ms, metadata_json, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(session_id)
        .bind(message.role.as_str())
        .bind(&message.content)
        .bind(&message.model)
        .bind(message.usage.map(|u| u.input_tokens as i64))
        .bind(message.usage.map(|u| u.output_tokens as i64))
        .bind(message.latency_ms)
        .bind(metadata)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        debug!(session_id, message_id = id, role = message.role.as_str(), "message appended");
        Ok(id)
    }

    async fn recent_history(
        &self,
        session_id: i64,
        limit: i64,
        before_message_id: Option<i64>,
    ) -> Result<Vec<HistoryTurn>> {
        if limit <= 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            "SELECT role, content FROM chat_messages
             WHERE session_id = ? AND (? IS NULL OR id < ?)
             ORDER BY id DESC
             LIMIT ?",
        )
        .bind(session_id)
        .bind(before_message_id)
        .bind(before_message_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut turns = Vec::with_capacity(rows.len());
        for row in rows.iter().rev() {
            let role: String = row.try_get("role")?;
            let Some(role) = Role::parse(&role) else {
                continue;
            };
            turns.push(HistoryTurn {
                role,
                content: row.try_get("content")?,
            });
        }
        Ok(turns)
    }

    async fn record_citations(&self, message_id: i64, citations: &[Citation]) -> Result<()> {
        if citations.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for citation in citations {
            sqlx::query(
                "INSERT INTO chat_citations (message_id, document_id, page_number, quote) VALUES (?, ?, ?, ?)",
            )
            .bind(message_id)
            .bind(citation.document_id)
            .bind(citation.page_number)
            .bind(&citation.quote)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use crate::{db, migrate};
    use serde_json::json;
    use tempfile::TempDir;

    async fn sessions() -> (TempDir, SqliteSessions) {
        let tmp = TempDir::new().unwrap();
        let config = parse_config(&format!(
            "[db]\npath = \"{}\"\n\n[llm]\nprimary_model = \"m\"\n",
            tmp.path().join("test.sqlite").display()
        ))
        .unwrap();
        let pool = db::connect(&config).await.unwrap();
        migrate::apply_schema(&pool).await.unwrap();
        (tmp, SqliteSessions::new(pool, "salt"))
    }

    #[test]
    fn test_token_validation() {
        assert!(is_valid_token("abcd-1234_XY"));
        assert!(is_valid_token(&Uuid::new_v4().to_string()));
        assert!(!is_valid_token("short"));
        assert!(!is_valid_token("has spaces in it"));
        assert!(!is_valid_token(&"a".repeat(129)));
    }

    #[test]
    fn test_hash_ip_is_keyed() {
        let a = hash_ip("salt", "10.0.0.1");
        assert_eq!(a.len(), 64);
        assert_eq!(a, hash_ip("salt", "10.0.0.1"));
        assert_ne!(a, hash_ip("pepper", "10.0.0.1"));
        assert!(!a.contains("10.0.0.1"));
    }

    #[tokio::test]
    async fn test_session_minted_and_reused() {
        let (_tmp, store) = sessions().await;
        let minted = store
            .get_or_create_session(None, Some("10.0.0.1"), Some("curl"))
            .await
            .unwrap();
        assert!(is_valid_token(&minted.token));
        assert_eq!(minted.ip_hash.as_deref(), Some(hash_ip("salt", "10.0.0.1").as_str()));

        let again = store
            .get_or_create_session(Some(&minted.token), None, None)
            .await
            .unwrap();
        assert_eq!(again.id, minted.id);
        assert_eq!(again.user_agent.as_deref(), Some("curl"));
    }

    #[tokio::test]
    async fn test_history_window_and_before_filter() {
        let (_tmp, store) = sessions().await;
        let session = store
            .get_or_create_session(Some("session-token-1"), None, None)
            .await
            .unwrap();

        let mut ids = Vec::new();
        for i in 0..5 {
            let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
            let message = NewMessage {
                role,
                content: format!("m{}", i),
                metadata: json!({ "i": i }),
                usage: Some(Usage::new(3, 4)),
                latency_ms: Some(10),
                model: None,
            };
            ids.push(store.append_message(session.id, &message).await.unwrap());
        }

        let history = store.recent_history(session.id, 3, None).await.unwrap();
        let contents: Vec<&str> = history.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["m2", "m3", "m4"]);

        let history = store.recent_history(session.id, 12, Some(ids[4])).await.unwrap();
        assert_eq!(history.len(), 4);
        assert_eq!(history.last().unwrap().content, "m3");

        let messages = store.messages(session.id).await.unwrap();
        assert_eq!(messages[1].tokens_out, Some(4));
        assert_eq!(messages[1].metadata["i"], 1);
    }

    #[tokio::test]
    async fn test_record_citations() {
        let (_tmp, store) = sessions().await;
        let session = store.get_or_create_session(None, None, None).await.unwrap();
        let id = store
            .append_message(session.id, &NewMessage::user("q", json!({})))
            .await
            .unwrap();
        let citations = vec![
            Citation {
                document_id: 4,
                page_number: Some(2),
                quote: Some("quote".into()),
            },
            Citation {
                document_id: 9,
                page_number: None,
                quote: None,
            },
        ];
        store.record_citations(id, &citations).await.unwrap();
        assert_eq!(store.citations(id).await.unwrap(), citations);
    }

    #[tokio::test]
    async fn test_message_for_unknown_session_rejected() {
        let (_tmp, store) = sessions().await;
        let result = store
            .append_message(9999, &NewMessage::user("q", json!({})))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_citations_for_unknown_message_rejected() {
        let (_tmp, store) = sessions().await;
        let citations = vec![Citation {
            document_id: 4,
            page_number: None,
            quote: None,
        }];
        assert!(store.record_citations(9999, &citations).await.is_err());
        assert!(store.citations(9999).await.unwrap().is_empty());
    }
}
