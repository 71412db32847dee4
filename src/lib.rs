//! # Archive QA
//!
//! Retrieval-augmented question answering over an archive of OCR'd court
//! records, document summaries and flight manifests.
//!
//! A question is classified into an optional intent, evidence is gathered
//! through a cascade of search strategies (plus intent-specific lookups), an
//! answer is produced either deterministically from flight records or by an
//! external generative model, and the whole exchange is logged to a
//! conversation session.
//!
//! ## Architecture
//!
//! ```text
//! question ─▶ ┌──────────┐   ┌───────────┐   ┌──────────┐   ┌──────────┐
//!             │  intent  │──▶│ retrieve  │──▶│  answer  │──▶│ citations│
//!             │ classify │   │ + special │   │ cards/LLM│   │ follow-up│
//!             └──────────┘   └─────┬─────┘   └────┬─────┘   └────┬─────┘
//!                                  │              │              │
//!                            ┌─────▼─────┐  ┌─────▼─────┐  ┌─────▼─────┐
//!                            │  SQLite   │  │ provider  │  │ sessions  │
//!                            │ FTS5+LIKE │  │  (HTTP)   │  │ + messages│
//!                            └───────────┘  └───────────┘  └───────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`models`] | Core data types |
//! | [`intent`] | Rule-table question classifier |
//! | [`store`] | Document store trait, SQLite and in-memory backends |
//! | [`retrieve`] | Retrieval cascade |
//! | [`special`] | Intent-specific lookups |
//! | [`answer`] | Flight-card and model answer paths |
//! | [`llm`] | Provider client with retry and model fallback |
//! | [`citations`] | Citation normalization and follow-ups |
//! | [`session`] | Conversation sessions and message log |
//! | [`ask`] | End-to-end ask pipeline |
//! | [`error`] | Caller-facing error taxonomy |
//! | [`logging`] | Tracing subscriber setup |
//! | [`server`] | HTTP server |

pub mod answer;
pub mod ask;
pub mod citations;
pub mod config;
pub mod db;
pub mod error;
pub mod intent;
pub mod llm;
pub mod logging;
pub mod migrate;
pub mod models;
pub mod retrieve;
pub mod server;
pub mod session;
pub mod special;
pub mod store;
