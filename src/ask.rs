//! The ask pipeline: one question in, one logged answer out.
//!
//! ```text
//! validate ─► session ─► classify ─► log question ─► history
//!        ─► retrieve ─► generate ─► citations/follow-ups ─► log answer + citations
//! ```
//!
//! Validation rejects before any store, session or provider access.
//! Retrieval tier failures degrade; provider failures surface only after the
//! retry policy is exhausted; persistence failures abort the turn.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Result};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use crate::answer::{self, AnswerPath};
use crate::citations;
use crate::config::Config;
use crate::db;
use crate::error::{AskError, AskResult};
use crate::intent::{self, PreparedQuery};
use crate::llm::{HttpTransport, LlmClient, LlmTransport};
use crate::models::{Citation, DocumentRef, EvidenceChunk, Role, Usage};
use crate::retrieve;
use crate::session::{self, NewMessage, SessionGateway, SqliteSessions};
use crate::store::{DocumentStore, SqliteStore};

/// One inbound question.
#[derive(Debug, Clone, Default)]
pub struct AskRequest {
    pub question: String,
    pub session_token: Option<String>,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
}

impl AskRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            ..Default::default()
        }
    }

    pub fn with_session(mut self, token: Option<String>) -> Self {
        self.session_token = token;
        self
    }
}

/// The caller-facing answer contract.
#[derive(Debug, Clone, Serialize)]
pub struct AskResponse {
    pub answer_html: String,
    pub citations: Vec<Citation>,
    pub follow_up_questions: Vec<String>,
    pub evidence_chunks: Vec<EvidenceChunk>,
    pub documents: Vec<DocumentRef>,
    pub usage: Usage,
    pub entities: Vec<String>,
    pub session_token: String,
    pub message_id: i64,
    pub model: Option<String>,
    pub intent: Option<&'static str>,
    pub subject: Option<String>,
    pub latency_ms: i64,
}

pub struct AskService {
    config: Arc<Config>,
    store: Arc<dyn DocumentStore>,
    sessions: Arc<dyn SessionGateway>,
    llm: LlmClient,
}

impl AskService {
    pub fn new(
        config: Arc<Config>,
        store: Arc<dyn DocumentStore>,
        sessions: Arc<dyn SessionGateway>,
        transport: Arc<dyn LlmTransport>,
    ) -> Self {
        let llm = LlmClient::new(transport, config.llm.clone());
        Self {
            config,
            store,
            sessions,
            llm,
        }
    }

    /// Wire the SQLite store, SQLite sessions and the HTTP provider.
    ///
    /// Fails when the provider API key is missing.
    pub async fn open(config: Arc<Config>) -> Result<Self> {
        let transport = HttpTransport::from_config(&config.llm)?;
        let pool = db::connect(&config).await?;
        let store = SqliteStore::new(pool.clone());
        let sessions = SqliteSessions::new(pool, config.session.ip_salt.clone());
        Ok(Self::new(
            config,
            Arc::new(store),
            Arc::new(sessions),
            Arc::new(transport),
        ))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn ask(&self, request: AskRequest) -> AskResult<AskResponse> {
        let started = Instant::now();
        let question = request.question.trim();
        self.validate(question, request.session_token.as_deref())?;

        let session = self
            .sessions
            .get_or_create_session(
                request.session_token.as_deref(),
                request.client_ip.as_deref(),
                request.user_agent.as_deref(),
            )
            .await
            .map_err(|e| AskError::Session(format!("could not open session: {}", e)))?;

        let prepared = intent::classify(question);
        info!(
            session_id = session.id,
            question_chars = question.chars().count(),
            intent = prepared.intent_name().unwrap_or("none"),
            "question received"
        );

        let user_message_id = self
            .sessions
            .append_message(
                session.id,
                &NewMessage::user(question, user_metadata(&prepared)),
            )
            .await
            .map_err(|e| AskError::Persistence(format!("could not log the question: {}", e)))?;

        let history = match self
            .sessions
            .recent_history(session.id, self.config.session.history_limit, Some(user_message_id))
            .await
        {
            Ok(history) => history,
            Err(e) => {
                warn!(
                    session_id = session.id,
                    error = %e,
                    "history unavailable, answering without it"
                );
                Vec::new()
            }
        };

        let retrieval = &self.config.retrieval;
        let context = retrieve::retrieve(
            self.store.as_ref(),
            question,
            &prepared,
            retrieval.chunk_limit,
            retrieval.snippet_chars,
        )
        .await
        .map_err(|e| AskError::Retrieval(format!("document store unavailable: {}", e)))?;

        let generated = answer::generate(
            self.store.as_ref(),
            &self.llm,
            question,
            &prepared,
            &context.chunks,
            &history,
        )
        .await?;

        let mut payload = generated.payload;
        payload.follow_up_questions =
            citations::supplement_follow_ups(&payload.follow_up_questions, &payload.citations);

        let path = match generated.path {
            AnswerPath::FlightCards => "flight_cards",
            AnswerPath::Model => "model",
        };
        let latency_ms = started.elapsed().as_millis() as i64;
        let assistant = NewMessage {
            role: Role::Assistant,
            content: payload.answer_html.clone(),
            metadata: json!({
                "intent": prepared.intent_name(),
                "subject": prepared.subject(),
                "path": path,
                "chunk_count": context.chunks.len(),
                "citations": payload.citations,
                "follow_up_questions": payload.follow_up_questions,
            }),
            usage: (generated.path == AnswerPath::Model).then_some(generated.usage),
            latency_ms: Some(latency_ms),
            model: generated.model.clone(),
        };

        let message_id = self
            .sessions
            .append_message(session.id, &assistant)
            .await
            .map_err(|e| AskError::Persistence(format!("could not log the answer: {}", e)))?;

        self.sessions
            .record_citations(message_id, &payload.citations)
            .await
            .map_err(|e| AskError::Persistence(format!("could not log citations: {}", e)))?;

        info!(
            session_id = session.id,
            message_id,
            citations = payload.citations.len(),
            chunks = context.chunks.len(),
            latency_ms,
            "question answered"
        );

        Ok(AskResponse {
            answer_html: payload.answer_html,
            citations: payload.citations,
            follow_up_questions: payload.follow_up_questions,
            documents: context.document_list(),
            evidence_chunks: context.chunks,
            usage: generated.usage,
            entities: generated.entities,
            session_token: session.token,
            message_id,
            model: generated.model,
            intent: prepared.intent_name(),
            subject: prepared.subject(),
            latency_ms,
        })
    }

    fn validate(&self, question: &str, token: Option<&str>) -> AskResult<()> {
        let min = self.config.retrieval.min_question_length;
        if question.chars().count() < min {
            return Err(AskError::Validation(format!(
                "question must be at least {} characters",
                min
            )));
        }
        if let Some(token) = token {
            if !session::is_valid_token(token) {
                return Err(AskError::Validation(
                    "session_token must be 8-128 characters of letters, digits, '-' or '_'".to_string(),
                ));
            }
        }
        Ok(())
    }
}

fn user_metadata(prepared: &PreparedQuery) -> serde_json::Value {
    json!({
        "intent": prepared.intent_name(),
        "subject": prepared.subject(),
        "keywords": prepared.keywords,
    })
}

/// `aqa ask`: answer one question and print the response JSON.
pub async fn run_ask(config: &Config, question: &str, session: Option<String>) -> Result<()> {
    let service = AskService::open(Arc::new(config.clone())).await?;
    let response = service
        .ask(AskRequest::new(question).with_session(session))
        .await
        .map_err(|e| anyhow!("{} ({})", e, e.code()))?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

/// `aqa classify`: print the classifier output for a question.
pub fn run_classify(question: &str) -> Result<()> {
    let prepared = intent::classify(question);
    println!("{}", serde_json::to_string_pretty(&prepared.to_output())?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use crate::llm::ProviderError;
    use crate::models::{HistoryTurn, Session};
    use crate::store::InMemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct CountingTransport {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LlmTransport for CountingTransport {
        async fn send(
            &self,
            _body: &serde_json::Value,
        ) -> Result<serde_json::Value, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(json!({ "output_text": "{\"answer_html\":\"<p>ok</p>\"}" }))
        }
    }

    #[derive(Default)]
    struct RecordingSessions {
        touched: Mutex<usize>,
        fail_appends: bool,
    }

    #[async_trait]
    impl SessionGateway for RecordingSessions {
        async fn get_or_create_session(
            &self,
            token: Option<&str>,
            _client_ip: Option<&str>,
            _user_agent: Option<&str>,
        ) -> Result<Session> {
            *self.touched.lock().unwrap() += 1;
            Ok(Session {
                id: 1,
                token: token.unwrap_or("minted-token").to_string(),
                ip_hash: None,
                user_agent: None,
                last_active_at: 0,
            })
        }

        async fn append_message(&self, _session_id: i64, _message: &NewMessage) -> Result<i64> {
            if self.fail_appends {
                return Err(anyhow!("disk full"));
            }
            let mut touched = self.touched.lock().unwrap();
            *touched += 1;
            Ok(*touched as i64)
        }

        async fn recent_history(&self, _: i64, _: i64, _: Option<i64>) -> Result<Vec<HistoryTurn>> {
            Ok(Vec::new())
        }

        async fn record_citations(&self, _: i64, _: &[Citation]) -> Result<()> {
            Ok(())
        }
    }

    fn service(
        sessions: Arc<RecordingSessions>,
    ) -> (AskService, Arc<CountingTransport>, Arc<InMemoryStore>) {
        let config =
            parse_config("[db]\npath = \"unused.sqlite\"\n\n[llm]\nprimary_model = \"m\"\n")
                .unwrap();
        let transport = Arc::new(CountingTransport {
            calls: AtomicUsize::new(0),
        });
        let store = Arc::new(InMemoryStore::new());
        let service = AskService::new(Arc::new(config), store.clone(), sessions, transport.clone());
        (service, transport, store)
    }

    #[tokio::test]
    async fn test_short_question_rejected_before_anything() {
        let sessions = Arc::new(RecordingSessions::default());
        let (service, transport, store) = service(sessions.clone());

        let err = service.ask(AskRequest::new("  a ")).await.unwrap_err();
        assert_eq!(err.code(), "validation");
        assert_eq!(*sessions.touched.lock().unwrap(), 0);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
        assert!(store.queries().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_session_token_rejected() {
        let sessions = Arc::new(RecordingSessions::default());
        let (service, _, _) = service(sessions.clone());

        let request = AskRequest::new("Who flew?").with_session(Some("bad token!".into()));
        let err = service.ask(request).await.unwrap_err();
        assert_eq!(err.code(), "validation");
        assert_eq!(*sessions.touched.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_persistence_failure_aborts_turn() {
        let sessions = Arc::new(RecordingSessions {
            touched: Mutex::new(0),
            fail_appends: true,
        });
        let (service, transport, _) = service(sessions);

        let err = service.ask(AskRequest::new("Who flew?")).await.unwrap_err();
        assert!(matches!(err, AskError::Persistence(_)));
        assert_eq!(err.code(), "session");
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_placeholder_evidence_is_never_cited() {
        let sessions = Arc::new(RecordingSessions::default());
        let (service, transport, _) = service(sessions);

        let response = service.ask(AskRequest::new("Anything at all?")).await.unwrap();
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
        assert_eq!(response.answer_html, "<p>ok</p>");
        assert_eq!(response.evidence_chunks.len(), 1);
        assert!(response.citations.is_empty());
        assert_eq!(response.session_token, "minted-token");
        assert_eq!(response.model.as_deref(), Some("m"));
    }
}
