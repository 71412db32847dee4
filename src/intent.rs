//! Rule-based question classification.
//!
//! [`classify`] turns a raw question into a [`PreparedQuery`]: a normalized
//! form, keyword tokens, synonym expansions and at most one [`Intent`].
//!
//! Intents come from [`RULES`], an ordered table of
//! `(kind, predicate, subject builder)` entries evaluated once, top to
//! bottom. The first rule whose predicate holds and whose builder produces
//! an intent wins. Rules are not mutually exclusive, so the order in the
//! table is the precedence.
//!
//! | # | Kind | Predicate |
//! |---|------|-----------|
//! | 1 | `doc_followup` | `doc #<digits>` |
//! | 2 | `flight_lookup` | flight/manifest/plane/aircraft + "epstein" + "maxwell" |
//! | 3 | `date_lookup` | "when did … epstein … die" / "date of … epstein … death" |
//! | 4 | `relationship_lookup` | "masseuse" + "contact" |
//! | 5 | `fact_lookup` | "plea" + "florida" |
//! | 6 | `fact_lookup` | "maxwell" + "trial" |

use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

/// Minimum token length (in characters) for a keyword.
const MIN_KEYWORD_CHARS: usize = 3;

static DOC_REFERENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bdoc\s*#\s*(\d+)").expect("doc reference regex"));

static YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b((?:19|20)\d{2})\b").expect("year regex"));

/// Static keyword → synonym expansions.
const SYNONYMS: &[(&str, &[&str])] = &[
    ("flight", &["manifest", "plane", "trip"]),
    ("flights", &["manifest", "plane", "trip"]),
    ("plane", &["aircraft", "flight"]),
    ("manifest", &["flight", "passenger"]),
    ("passenger", &["manifest", "flight"]),
    ("death", &["died", "suicide"]),
    ("die", &["death", "died"]),
    ("lawyer", &["attorney", "counsel"]),
    ("plea", &["agreement", "deal"]),
    ("trial", &["court", "verdict"]),
    ("island", &["little", "james"]),
    ("masseuse", &["massage", "therapist"]),
];

/// People the flight rules know how to filter on.
const FLIGHT_PEOPLE: &[&str] = &["epstein", "maxwell"];

// ============ Intent model ============

/// Coarse intent kind, used for naming and rule bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    DocFollowup,
    FlightLookup,
    DateLookup,
    RelationshipLookup,
    FactLookup,
}

impl IntentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DocFollowup => "doc_followup",
            Self::FlightLookup => "flight_lookup",
            Self::DateLookup => "date_lookup",
            Self::RelationshipLookup => "relationship_lookup",
            Self::FactLookup => "fact_lookup",
        }
    }
}

/// Structured filters for a flight-manifest lookup.
///
/// Every named person must appear on the passenger list; the year, when
/// present, must match the flight date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlightQuery {
    pub people: Vec<String>,
    pub year: Option<i32>,
}

impl FlightQuery {
    /// Positional subject encoding, e.g. `flight_epstein_maxwell_1999`.
    pub fn subject(&self) -> String {
        let mut parts = vec!["flight".to_string()];
        parts.extend(self.people.iter().cloned());
        if let Some(year) = self.year {
            parts.push(year.to_string());
        }
        parts.join("_")
    }

    /// `LIKE` patterns for each named person, e.g. `%Epstein%`.
    pub fn name_patterns(&self) -> Vec<String> {
        self.people
            .iter()
            .map(|p| {
                let mut chars = p.chars();
                let capitalized = match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                    None => String::new(),
                };
                format!("%{}%", capitalized)
            })
            .collect()
    }
}

/// Named fact topics answered from document summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactTopic {
    FloridaPleaAgreement,
    MaxwellTrial,
}

impl FactTopic {
    pub fn subject(&self) -> &'static str {
        match self {
            Self::FloridaPleaAgreement => "florida_plea_agreement",
            Self::MaxwellTrial => "maxwell_trial",
        }
    }
}

pub const EPSTEIN_DEATH_SUBJECT: &str = "jeffrey epstein death";
pub const MASSEUSE_CONTACT_SUBJECT: &str = "masseuse_contact";

/// A classified intent with its structured payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    DocFollowup { document_id: i64 },
    FlightLookup(FlightQuery),
    DateLookup,
    RelationshipLookup,
    FactLookup(FactTopic),
}

impl Intent {
    pub fn kind(&self) -> IntentKind {
        match self {
            Self::DocFollowup { .. } => IntentKind::DocFollowup,
            Self::FlightLookup(_) => IntentKind::FlightLookup,
            Self::DateLookup => IntentKind::DateLookup,
            Self::RelationshipLookup => IntentKind::RelationshipLookup,
            Self::FactLookup(_) => IntentKind::FactLookup,
        }
    }

    pub fn subject(&self) -> String {
        match self {
            Self::DocFollowup { document_id } => document_id.to_string(),
            Self::FlightLookup(query) => query.subject(),
            Self::DateLookup => EPSTEIN_DEATH_SUBJECT.to_string(),
            Self::RelationshipLookup => MASSEUSE_CONTACT_SUBJECT.to_string(),
            Self::FactLookup(topic) => topic.subject().to_string(),
        }
    }
}

// ============ Prepared query ============

/// Classifier output for one question.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedQuery {
    /// Lowercased question with non-alphanumerics collapsed to single spaces.
    pub clean: String,
    pub keywords: Vec<String>,
    pub synonyms: Vec<String>,
    pub intent: Option<Intent>,
}

impl PreparedQuery {
    pub fn intent_name(&self) -> Option<&'static str> {
        self.intent.as_ref().map(|i| i.kind().as_str())
    }

    pub fn subject(&self) -> Option<String> {
        self.intent.as_ref().map(Intent::subject)
    }

    /// Keywords followed by synonyms, deduplicated, at most `max` terms.
    pub fn search_terms(&self, max: usize) -> Vec<String> {
        let mut terms: Vec<String> = Vec::new();
        for term in self.keywords.iter().chain(self.synonyms.iter()) {
            if terms.len() >= max {
                break;
            }
            if !terms.contains(term) {
                terms.push(term.clone());
            }
        }
        terms
    }

    pub fn to_output(&self) -> ClassifierOutput {
        ClassifierOutput {
            clean: self.clean.clone(),
            keywords: self.keywords.clone(),
            synonyms: self.synonyms.clone(),
            intent: self.intent_name(),
            subject: self.subject(),
        }
    }
}

/// Serializable view of a [`PreparedQuery`].
#[derive(Debug, Clone, Serialize)]
pub struct ClassifierOutput {
    pub clean: String,
    pub keywords: Vec<String>,
    pub synonyms: Vec<String>,
    pub intent: Option<&'static str>,
    pub subject: Option<String>,
}

// ============ Rules ============

/// The forms of the question a rule can inspect.
pub struct QuestionText<'a> {
    /// Lowercased raw text, punctuation intact.
    pub lower: &'a str,
    /// Lowercased, punctuation collapsed to spaces.
    pub clean: &'a str,
}

impl QuestionText<'_> {
    fn has(&self, needle: &str) -> bool {
        self.clean.contains(needle)
    }

    fn has_word(&self, word: &str) -> bool {
        self.clean.split_whitespace().any(|t| t == word)
    }
}

/// One entry of the classification table.
pub struct Rule {
    pub kind: IntentKind,
    pub predicate: fn(&QuestionText) -> bool,
    pub build: fn(&QuestionText) -> Option<Intent>,
}

pub const RULES: &[Rule] = &[
    Rule {
        kind: IntentKind::DocFollowup,
        predicate: |q| DOC_REFERENCE.is_match(q.lower),
        build: |q| {
            let id = DOC_REFERENCE
                .captures(q.lower)?
                .get(1)?
                .as_str()
                .parse::<i64>()
                .ok()?;
            (id > 0).then_some(Intent::DocFollowup { document_id: id })
        },
    },
    Rule {
        kind: IntentKind::FlightLookup,
        predicate: |q| {
            let mentions_flight = q.clean.split_whitespace().any(|t| {
                ["flight", "manifest", "plane", "aircraft"]
                    .iter()
                    .any(|stem| t.starts_with(stem))
            });
            mentions_flight && q.has("epstein") && q.has("maxwell")
        },
        build: |q| {
            let year = YEAR
                .captures(q.clean)
                .and_then(|c| c.get(1))
                .and_then(|m| m.as_str().parse::<i32>().ok());
            Some(Intent::FlightLookup(FlightQuery {
                people: FLIGHT_PEOPLE.iter().map(|p| p.to_string()).collect(),
                year,
            }))
        },
    },
    Rule {
        kind: IntentKind::DateLookup,
        predicate: |q| {
            q.has("epstein")
                && ((q.has("when did") && (q.has_word("die") || q.has_word("died")))
                    || (q.has("date of") && q.has("death")))
        },
        build: |_| Some(Intent::DateLookup),
    },
    Rule {
        kind: IntentKind::RelationshipLookup,
        predicate: |q| q.has("masseuse") && q.has("contact"),
        build: |_| Some(Intent::RelationshipLookup),
    },
    Rule {
        kind: IntentKind::FactLookup,
        predicate: |q| q.has("plea") && q.has("florida"),
        build: |_| Some(Intent::FactLookup(FactTopic::FloridaPleaAgreement)),
    },
    Rule {
        kind: IntentKind::FactLookup,
        predicate: |q| q.has("maxwell") && q.has("trial"),
        build: |_| Some(Intent::FactLookup(FactTopic::MaxwellTrial)),
    },
];

// ============ Classification ============

/// Lowercase and collapse every non-alphanumeric run into one space.
pub fn normalize(question: &str) -> String {
    let lowered: String = question
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    lowered.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn classify(question: &str) -> PreparedQuery {
    let lower = question.trim().to_lowercase();
    let clean = normalize(question);

    let mut keywords: Vec<String> = Vec::new();
    for token in clean.split_whitespace() {
        if token.chars().count() >= MIN_KEYWORD_CHARS && !keywords.iter().any(|k| k == token) {
            keywords.push(token.to_string());
        }
    }

    let mut synonyms: Vec<String> = Vec::new();
    for keyword in &keywords {
        if let Some((_, expansions)) = SYNONYMS.iter().find(|(k, _)| k == keyword) {
            for s in *expansions {
                if !keywords.iter().any(|k| k == s) && !synonyms.iter().any(|x| x == s) {
                    synonyms.push(s.to_string());
                }
            }
        }
    }

    let text = QuestionText {
        lower: &lower,
        clean: &clean,
    };
    let intent = RULES
        .iter()
        .filter(|rule| (rule.predicate)(&text))
        .find_map(|rule| (rule.build)(&text));

    PreparedQuery {
        clean,
        keywords,
        synonyms,
        intent,
    }
}
