//! Answer generation.
//!
//! Two terminal paths per request:
//!
//! - **Flight cards**: a `flight_lookup` question with at least one matching
//!   flight is answered deterministically from the flight records. No model
//!   call is made.
//! - **Model**: everything else, including flight questions with no matching
//!   rows, goes to the [`LlmClient`] with the retrieved evidence and recent
//!   history.

use tracing::{info, warn};

use crate::citations;
use crate::intent::{Intent, PreparedQuery};
use crate::llm::response::escape_html;
use crate::llm::{LlmClient, ProviderError};
use crate::models::{AnswerPayload, Citation, EvidenceChunk, HistoryTurn, Usage};
use crate::special::{self, flight_sentence};
use crate::store::{DocumentStore, FlightRow};

/// Passenger names taken per flight for entity extraction.
pub const ENTITIES_PER_FLIGHT: usize = 8;
/// Overall cap on extracted entities.
pub const MAX_ENTITIES: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerPath {
    FlightCards,
    Model,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedAnswer {
    pub payload: AnswerPayload,
    pub usage: Usage,
    /// Model that answered; `None` on the flight-card path.
    pub model: Option<String>,
    pub entities: Vec<String>,
    pub path: AnswerPath,
}

pub async fn generate(
    store: &dyn DocumentStore,
    llm: &LlmClient,
    question: &str,
    prepared: &PreparedQuery,
    chunks: &[EvidenceChunk],
    history: &[HistoryTurn],
) -> Result<GeneratedAnswer, ProviderError> {
    if let Some(Intent::FlightLookup(query)) = &prepared.intent {
        match special::lookup_flights(store, query).await {
            Ok(flights) if !flights.is_empty() => {
                info!(
                    flights = flights.len(),
                    subject = %query.subject(),
                    "answering from flight records"
                );
                return Ok(flight_answer(&flights, chunks));
            }
            Ok(_) => info!(subject = %query.subject(), "no matching flights, using model"),
            Err(e) => warn!(error = %e, "flight lookup failed, using model"),
        }
    }

    let generated = llm.generate(question, chunks, history).await?;
    let citations = citations::normalize(&generated.answer.citations, chunks);

    Ok(GeneratedAnswer {
        payload: AnswerPayload {
            answer_html: generated.answer.answer_html,
            citations,
            follow_up_questions: generated.answer.follow_up_questions,
        },
        usage: generated.usage,
        model: Some(generated.model),
        entities: Vec::new(),
        path: AnswerPath::Model,
    })
}

fn field_or_unknown(value: &Option<String>) -> String {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(escape_html)
        .unwrap_or_else(|| "Unknown".to_string())
}

fn flight_card(flight: &FlightRow) -> String {
    let passengers = if flight.passengers.is_empty() {
        "None listed".to_string()
    } else {
        flight
            .passengers
            .iter()
            .map(|p| escape_html(p))
            .collect::<Vec<_>>()
            .join(", ")
    };
    let source = flight
        .document_id
        .map(|id| format!("<p class=\"flight-source\">Doc #{}</p>", id))
        .unwrap_or_default();

    format!(
        "<div class=\"flight-card\"><h4>{} · {} → {}</h4><p>Aircraft: {}</p><p>Passengers: {}</p>{}</div>",
        field_or_unknown(&flight.flight_date),
        field_or_unknown(&flight.origin),
        field_or_unknown(&flight.destination),
        field_or_unknown(&flight.aircraft),
        passengers,
        source
    )
}

/// Deterministic answer built from flight rows.
///
/// Citations point at the flights' source documents. When no flight has one,
/// they are synthesised from `chunks` instead.
pub fn flight_answer(flights: &[FlightRow], chunks: &[EvidenceChunk]) -> GeneratedAnswer {
    let noun = if flights.len() == 1 { "flight" } else { "flights" };
    let mut html = format!(
        "<div class=\"flight-results\"><p>Found {} matching {} in the flight logs.</p>",
        flights.len(),
        noun
    );
    for flight in flights {
        html.push_str(&flight_card(flight));
    }
    html.push_str("</div>");

    let mut citations: Vec<Citation> = Vec::new();
    for flight in flights {
        let Some(document_id) = flight.document_id.filter(|id| *id > 0) else {
            continue;
        };
        if citations.iter().any(|c| c.document_id == document_id) {
            continue;
        }
        citations.push(Citation {
            document_id,
            page_number: None,
            quote: flight_sentence(flight),
        });
    }

    if citations.is_empty() {
        citations = citations::from_chunks(chunks);
    }

    let mut follow_ups: Vec<String> = Vec::new();
    for flight in flights {
        let Some(date) = flight.flight_date.as_deref().filter(|d| !d.trim().is_empty()) else {
            continue;
        };
        let q = format!("Show document for flight on {}", date);
        if !follow_ups.contains(&q) {
            follow_ups.push(q);
        }
    }

    GeneratedAnswer {
        payload: AnswerPayload {
            answer_html: html,
            citations,
            follow_up_questions: follow_ups,
        },
        usage: Usage::default(),
        model: None,
        entities: flight_entities(flights),
        path: AnswerPath::FlightCards,
    }
}

/// First [`ENTITIES_PER_FLIGHT`] passengers of each flight, deduplicated,
/// at most [`MAX_ENTITIES`] overall.
pub fn flight_entities(flights: &[FlightRow]) -> Vec<String> {
    let mut entities: Vec<String> = Vec::new();
    for flight in flights {
        for name in flight.passengers.iter().take(ENTITIES_PER_FLIGHT) {
            if entities.len() >= MAX_ENTITIES {
                return entities;
            }
            if !entities.contains(name) {
                entities.push(name.clone());
            }
        }
    }
    entities
}
