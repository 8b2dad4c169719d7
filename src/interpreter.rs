use std::fmt;
use std::ops::Range;

use chrono::NaiveDate;
use log::warn;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::orchestrator::PipelineError;

static LOCATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"in\s([a-zA-Z\s]+)").expect("valid pattern"));
static EVENT_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"about\s([a-zA-Z\s]+)").expect("valid pattern"));
static DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(this weekend|tomorrow|next week|today|[0-9]{4}-[0-9]{2}-[0-9]{2}|[0-9]{2}/[0-9]{2}/[0-9]{4})")
        .expect("valid pattern")
});
static PREFERENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(outdoor|indoor|family-friendly|music|sports|adventure)").expect("valid pattern"));
static WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[a-zA-Z]+").expect("valid pattern"));

/// Words that end a location or event-name clause.
const CLAUSE_BOUNDARIES: &[&str] = &[
    "on", "at", "in", "about", "for", "this", "next", "today", "tomorrow", "tonight", "during",
    "with", "from", "to", "by", "around",
];

pub const DEFAULT_DATE: &str = "today";
pub const DEFAULT_PREFERENCES: &str = "any";
pub const DEFAULT_EVENT_NAME: &str = "general events";

/// Fields recognised in a free-text request. Only what was found is reported.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedQuery {
    pub location: Option<String>,
    pub date: Option<String>,
    pub preferences: Vec<String>,
    pub event_name: Option<String>,
}

/// A token that looked like a field but could not be read as one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseWarning {
    pub field: &'static str,
    pub token: String,
    pub reason: String,
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Invalid {} '{}': {}. Please use YYYY-MM-DD or DD/MM/YYYY.",
            self.field, self.token, self.reason
        )
    }
}

/// A request with every optional field filled in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryInputs {
    pub location: String,
    pub date: String,
    pub preferences: Vec<String>,
    pub event_name: String,
}

impl QueryInputs {
    /// Copy a parsed query, substituting defaults for absent optional fields.
    /// Fails when no location was found.
    pub fn from_parsed(parsed: &ParsedQuery) -> Result<Self, PipelineError> {
        let location = parsed
            .location
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .ok_or(PipelineError::MissingRequiredField { field: "location" })?;

        let preferences = if parsed.preferences.is_empty() {
            vec![DEFAULT_PREFERENCES.to_string()]
        } else {
            parsed.preferences.clone()
        };

        Ok(Self {
            location: location.to_string(),
            date: parsed.date.clone().unwrap_or_else(|| DEFAULT_DATE.to_string()),
            preferences,
            event_name: parsed
                .event_name
                .clone()
                .unwrap_or_else(|| DEFAULT_EVENT_NAME.to_string()),
        })
    }

    pub fn preferences_text(&self) -> String {
        self.preferences.join(", ")
    }
}

/// Interprets raw input into a `ParsedQuery` using fixed lexical patterns.
pub struct Interpreter;

impl Interpreter {
    /// Parse a request, logging any warnings. Never fails.
    pub fn parse(input: &str) -> ParsedQuery {
        let (parsed, warnings) = Self::extract(input);
        for warning in &warnings {
            warn!("{}", warning);
        }
        parsed
    }

    /// Parse a request and return the warnings instead of logging them.
    pub fn extract(input: &str) -> (ParsedQuery, Vec<ParseWarning>) {
        let mut warnings = Vec::new();

        let location = clause_after(&LOCATION, input).map(|(value, _)| value);
        let event_clause = clause_after(&EVENT_NAME, input);
        let date = match DATE.find(input) {
            Some(m) => match normalize_date(m.as_str()) {
                Ok(date) => Some(date),
                Err(warning) => {
                    warnings.push(warning);
                    None
                }
            },
            None => None,
        };

        // Preference words inside the event-name clause describe the topic.
        let topic_span = event_clause.as_ref().map(|(_, span)| span.clone());
        let preferences = PREFERENCE
            .find_iter(input)
            .filter(|m| !topic_span.as_ref().is_some_and(|span| span.contains(&m.start())))
            .map(|m| m.as_str().to_string())
            .collect();

        let parsed = ParsedQuery {
            location,
            date,
            preferences,
            event_name: event_clause.map(|(value, _)| value),
        };
        (parsed, warnings)
    }
}

/// Text captured after a marker, cut at the first clause boundary word.
/// Returns the trimmed value and its byte span in `input`.
fn clause_after(marker: &Regex, input: &str) -> Option<(String, Range<usize>)> {
    let group = marker.captures(input)?.get(1)?;
    let clause = group.as_str();
    let end = WORD
        .find_iter(clause)
        .find(|w| CLAUSE_BOUNDARIES.contains(&w.as_str()))
        .map(|w| w.start())
        .unwrap_or(clause.len());

    let value = clause[..end].trim();
    if value.is_empty() {
        return None;
    }
    Some((value.to_string(), group.start()..group.start() + end))
}

fn normalize_date(token: &str) -> Result<String, ParseWarning> {
    let format = if token.contains('-') {
        "%Y-%m-%d"
    } else if token.contains('/') {
        "%d/%m/%Y"
    } else {
        return Ok(token.to_string());
    };

    NaiveDate::parse_from_str(token, format)
        .map(|d| d.format("%Y-%m-%d").to_string())
        .map_err(|e| ParseWarning {
            field: "date",
            token: token.to_string(),
            reason: e.to_string(),
        })
}
