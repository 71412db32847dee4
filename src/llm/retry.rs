//! Retry and model-fallback policy for provider calls.
//!
//! The policy is a small state machine driven by the client loop:
//!
//! ```text
//!            ┌──────── success ────────► Succeeded
//!            │
//! Trying ────┼── 400 + tool mention ───► ToolStripped ──► (send again, same attempt)
//!   ▲        │
//!   │        ├── throttled, attempts left ──► Throttled ──sleep──► Trying(attempt + 1)
//!   │        │
//!   └────────┴── other / attempts spent ──► Trying(next model, 1)  or  Failed
//! ```
//!
//! The tool strip happens at most once per request and stays in effect for
//! every later model. It does not consume an attempt.

use std::time::Duration;

use super::transport::ProviderError;

/// Statuses treated as transient. 0 is a transport failure.
pub const THROTTLE_STATUSES: &[u16] = &[0, 408, 409, 422, 429, 500, 502, 503, 504, 524];

const THROTTLE_PHRASES: &[&str] = &["temporarily", "again later", "retry"];

pub const BASE_DELAY_MS: u64 = 250;
pub const MAX_JITTER_MS: u64 = 150;

/// Status and message reported to callers once every model is exhausted on
/// a 400 or throttle-class failure.
pub const UNAVAILABLE_STATUS: u16 = 503;
pub const UNAVAILABLE_MESSAGE: &str = "The model provider temporarily rejected the request, retry";

/// Hard ceiling on attempts per model.
pub const MAX_ATTEMPTS_CAP: u32 = 5;

pub fn is_throttled(err: &ProviderError) -> bool {
    if THROTTLE_STATUSES.contains(&err.status) {
        return true;
    }
    let message = err.message.to_lowercase();
    THROTTLE_PHRASES.iter().any(|p| message.contains(p))
}

/// A 400 complaining about the optional web-search tool.
pub fn is_tool_rejection(err: &ProviderError) -> bool {
    if err.status != 400 {
        return false;
    }
    let message = err.message.to_lowercase();
    message.contains("web_search") || message.contains("web search")
}

/// `2^(attempt-1) * 250ms + jitter`, with jitter clamped to 150ms.
pub fn backoff_delay(attempt: u32, jitter_ms: u64) -> Duration {
    let exponent = attempt.saturating_sub(1).min(MAX_ATTEMPTS_CAP);
    Duration::from_millis(BASE_DELAY_MS * (1u64 << exponent) + jitter_ms.min(MAX_JITTER_MS))
}

/// Where the client loop stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryState {
    /// Send attempt `attempt` (1-based) to model `model`.
    Trying { model: usize, attempt: u32 },
    /// The tool was just removed; resend the same attempt.
    ToolStripped { model: usize, attempt: u32 },
    /// Sleep `delay`, then try `next_attempt` on the same model.
    Throttled {
        model: usize,
        next_attempt: u32,
        delay: Duration,
    },
    Failed(ProviderError),
    Succeeded { model: usize, attempt: u32 },
}

/// Transition table for one request.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    models: usize,
    max_attempts: u32,
    tools_enabled: bool,
}

impl RetryPolicy {
    pub fn new(models: usize, max_attempts: u32, tools_requested: bool) -> Self {
        Self {
            models,
            max_attempts: max_attempts.clamp(1, MAX_ATTEMPTS_CAP),
            tools_enabled: tools_requested,
        }
    }

    pub fn start(&self) -> RetryState {
        if self.models == 0 {
            return RetryState::Failed(ProviderError::new(0, "no models configured"));
        }
        RetryState::Trying {
            model: 0,
            attempt: 1,
        }
    }

    /// Whether requests should still carry the web-search tool.
    pub fn tools_enabled(&self) -> bool {
        self.tools_enabled
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn on_success(&self, model: usize, attempt: u32) -> RetryState {
        RetryState::Succeeded { model, attempt }
    }

    /// Next state after `attempt` on `model` failed with `err`.
    ///
    /// `jitter_ms` is only used when the failure is throttled.
    pub fn on_failure(
        &mut self,
        model: usize,
        attempt: u32,
        err: ProviderError,
        jitter_ms: u64,
    ) -> RetryState {
        if self.tools_enabled && is_tool_rejection(&err) {
            self.tools_enabled = false;
            return RetryState::ToolStripped { model, attempt };
        }

        if is_throttled(&err) && attempt < self.max_attempts {
            return RetryState::Throttled {
                model,
                next_attempt: attempt + 1,
                delay: backoff_delay(attempt, jitter_ms),
            };
        }

        if model + 1 < self.models {
            return RetryState::Trying {
                model: model + 1,
                attempt: 1,
            };
        }

        RetryState::Failed(translate_final(err))
    }
}

/// Hide provider-specific semantics behind a uniform 503 for 400s and
/// throttle-class failures.
pub fn translate_final(err: ProviderError) -> ProviderError {
    if err.status == 400 || is_throttled(&err) {
        ProviderError::new(UNAVAILABLE_STATUS, UNAVAILABLE_MESSAGE)
    } else {
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn err(status: u16, message: &str) -> ProviderError {
        ProviderError::new(status, message)
    }

    #[test]
    fn test_throttle_classification() {
        for status in [0, 408, 409, 422, 429, 500, 502, 503, 504, 524] {
            assert!(is_throttled(&err(status, "x")), "status {}", status);
        }
        assert!(is_throttled(&err(401, "Please try again later")));
        assert!(is_throttled(&err(403, "Temporarily unavailable")));
        assert!(!is_throttled(&err(401, "invalid api key")));
        assert!(!is_throttled(&err(400, "bad request")));
    }

    #[test]
    fn test_tool_rejection() {
        assert!(is_tool_rejection(&err(400, "Tool 'web_search' is not supported")));
        assert!(is_tool_rejection(&err(400, "Web search unavailable for this model")));
        assert!(!is_tool_rejection(&err(422, "web_search")));
        assert!(!is_tool_rejection(&err(400, "context length exceeded")));
    }

    #[test]
    fn test_backoff_delay_bounds() {
        assert_eq!(backoff_delay(1, 0), Duration::from_millis(250));
        assert_eq!(backoff_delay(2, 0), Duration::from_millis(500));
        assert_eq!(backoff_delay(3, 150), Duration::from_millis(1150));
        assert_eq!(backoff_delay(1, 9999), Duration::from_millis(400));
    }

    #[test]
    fn test_throttled_walks_attempts_then_models() {
        let mut policy = RetryPolicy::new(2, 2, false);
        assert_eq!(policy.start(), RetryState::Trying { model: 0, attempt: 1 });

        assert_eq!(
            policy.on_failure(0, 1, err(429, "slow down"), 0),
            RetryState::Throttled {
                model: 0,
                next_attempt: 2,
                delay: Duration::from_millis(250)
            }
        );
        // Last attempt on a model moves on without sleeping.
        assert_eq!(
            policy.on_failure(0, 2, err(429, "slow down"), 0),
            RetryState::Trying { model: 1, attempt: 1 }
        );
        assert_eq!(
            policy.on_failure(1, 2, err(429, "slow down"), 0),
            RetryState::Failed(err(503, UNAVAILABLE_MESSAGE))
        );
    }

    #[test]
    fn test_hard_failure_skips_remaining_attempts() {
        let mut policy = RetryPolicy::new(2, 3, false);
        assert_eq!(
            policy.on_failure(0, 1, err(401, "invalid api key"), 0),
            RetryState::Trying { model: 1, attempt: 1 }
        );
        assert_eq!(
            policy.on_failure(1, 1, err(401, "invalid api key"), 0),
            RetryState::Failed(err(401, "invalid api key"))
        );
    }

    #[test]
    fn test_tool_strip_happens_once() {
        let mut policy = RetryPolicy::new(1, 3, true);
        assert!(policy.tools_enabled());
        assert_eq!(
            policy.on_failure(0, 1, err(400, "web_search not allowed"), 0),
            RetryState::ToolStripped { model: 0, attempt: 1 }
        );
        assert!(!policy.tools_enabled());
        // A second identical rejection is a plain 400 now.
        assert_eq!(
            policy.on_failure(0, 1, err(400, "web_search not allowed"), 0),
            RetryState::Failed(err(503, UNAVAILABLE_MESSAGE))
        );
    }

    #[test]
    fn test_attempts_clamped() {
        assert_eq!(RetryPolicy::new(1, 0, false).max_attempts(), 1);
        assert_eq!(RetryPolicy::new(1, 99, false).max_attempts(), 5);
    }
}
