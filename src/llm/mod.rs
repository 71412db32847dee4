//! LLM client: structured answers from an external generative model.
//!
//! | Module | Concern |
//! |--------|---------|
//! | [`prompt`] | System instruction, history sanitizing, evidence rendering |
//! | [`retry`] | Throttle/tool-rejection classification and the retry state machine |
//! | [`response`] | Text extraction, fence stripping, JSON decode with fallback |
//! | [`transport`] | The [`LlmTransport`] seam and its reqwest implementation |
//!
//! [`LlmClient::generate`] walks the configured models in order (primary,
//! then fallback) and returns the first successful answer.

pub mod prompt;
pub mod response;
pub mod retry;
pub mod transport;

use std::sync::Arc;

use rand::Rng;
use tracing::{debug, info, warn};

use crate::config::LlmConfig;
use crate::models::{EvidenceChunk, HistoryTurn, Usage};

pub use response::RawAnswer;
pub use retry::{RetryPolicy, RetryState};
pub use transport::{HttpTransport, LlmTransport, ProviderError};

/// A successful generation.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmAnswer {
    pub answer: RawAnswer,
    pub usage: Usage,
    pub model: String,
    /// Requests sent, including tool-stripped resends.
    pub calls: u32,
}

pub struct LlmClient {
    transport: Arc<dyn LlmTransport>,
    config: LlmConfig,
}

impl LlmClient {
    pub fn new(transport: Arc<dyn LlmTransport>, config: LlmConfig) -> Self {
        Self { transport, config }
    }

    pub fn models(&self) -> Vec<String> {
        self.config.models()
    }

    /// Generate an answer for `question` grounded in `chunks`.
    pub async fn generate(
        &self,
        question: &str,
        chunks: &[EvidenceChunk],
        history: &[HistoryTurn],
    ) -> Result<LlmAnswer, ProviderError> {
        let models = self.config.models();
        let input = prompt::build_input(question, chunks, history);
        let mut policy = RetryPolicy::new(
            models.len(),
            self.config.attempts_per_model(),
            self.config.web_search,
        );

        let mut calls = 0u32;
        let mut state = policy.start();

        loop {
            let (model, attempt) = match state {
                RetryState::Trying { model, attempt }
                | RetryState::ToolStripped { model, attempt } => (model, attempt),
                RetryState::Throttled {
                    model,
                    next_attempt,
                    delay,
                } => {
                    debug!(
                        model = %models[model],
                        delay_ms = delay.as_millis() as u64,
                        "backing off"
                    );
                    tokio::time::sleep(delay).await;
                    state = RetryState::Trying {
                        model,
                        attempt: next_attempt,
                    };
                    continue;
                }
                RetryState::Failed(err) => {
                    warn!(status = err.status, calls, "all models exhausted");
                    return Err(err);
                }
                RetryState::Succeeded { .. } => {
                    // Success returns from inside the send arm
                    unreachable!()
                }
            };

            let name = &models[model];
            let body = prompt::build_request(
                name,
                self.config.temperature,
                self.config.max_output_tokens,
                &input,
                policy.tools_enabled(),
            );

            calls += 1;
            match self.transport.send(&body).await {
                Ok(envelope) => {
                    let Some(text) = response::extract_text(&envelope) else {
                        let err = ProviderError::new(0, "response contained no text");
                        warn!(model = %name, attempt, "empty provider response");
                        state = policy.on_failure(model, attempt, err, jitter());
                        continue;
                    };
                    state = policy.on_success(model, attempt);
                    let usage = response::extract_usage(&envelope);
                    info!(
                        model = %name,
                        attempt,
                        calls,
                        tokens_in = usage.input_tokens,
                        tokens_out = usage.output_tokens,
                        state = ?state,
                        "provider answered"
                    );
                    return Ok(LlmAnswer {
                        answer: response::parse_answer(&text),
                        usage,
                        model: name.clone(),
                        calls,
                    });
                }
                Err(err) => {
                    warn!(
                        model = %name,
                        attempt,
                        status = err.status,
                        error = %err.message,
                        "provider attempt failed"
                    );
                    state = policy.on_failure(model, attempt, err, jitter());
                    match &state {
                        RetryState::ToolStripped { .. } => {
                            info!(model = %name, "retrying without web search tool");
                        }
                        RetryState::Trying { model: next, .. } if *next != model => {
                            info!(from = %name, to = %models[*next], "falling back to next model");
                        }
                        _ => {}
                    }
                }
            }
        }
    }
}

fn jitter() -> u64 {
    rand::thread_rng().gen_range(0..=retry::MAX_JITTER_MS)
}
