//! Caller-facing error taxonomy for the ask pipeline.
//!
//! Internals use `anyhow`; everything that reaches a caller is one of these
//! variants, each with a stable machine code and an HTTP status.
//!
//! | Variant | Code | HTTP |
//! |---------|------|------|
//! | `Validation` | `validation` | 400 |
//! | `Session` | `session` | 400 |
//! | `Retrieval` | `retrieval` | 503 |
//! | `ProviderUnavailable` | `provider_unavailable` | 503 (502 for non-transient provider failures) |
//! | `Persistence` | `session` | 500 |

use thiserror::Error;

use crate::llm::ProviderError;

#[derive(Debug, Error)]
pub enum AskError {
    /// Bad input; fails before any store or provider access.
    #[error("{0}")]
    Validation(String),

    /// The session could not be identified or created.
    #[error("{0}")]
    Session(String),

    /// The document store is unreachable.
    #[error("{0}")]
    Retrieval(String),

    /// Every configured model and attempt failed.
    #[error("{message}")]
    ProviderUnavailable { status: u16, message: String },

    /// A question or answer could not be logged. Fatal for the turn.
    #[error("{0}")]
    Persistence(String),
}

impl AskError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Session(_) | Self::Persistence(_) => "session",
            Self::Retrieval(_) => "retrieval",
            Self::ProviderUnavailable { .. } => "provider_unavailable",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation(_) | Self::Session(_) => 400,
            Self::Retrieval(_) => 503,
            Self::ProviderUnavailable { status, .. } => {
                if *status == 503 {
                    503
                } else {
                    502
                }
            }
            Self::Persistence(_) => 500,
        }
    }
}

impl From<ProviderError> for AskError {
    fn from(err: ProviderError) -> Self {
        Self::ProviderUnavailable {
            status: err.status,
            message: err.message,
        }
    }
}

pub type AskResult<T> = Result<T, AskError>;
