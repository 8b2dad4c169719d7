use async_trait::async_trait;
use log::{debug, info};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::config::EventsConfig;

/// Placeholder for any field the upstream payload did not provide.
pub const NOT_AVAILABLE: &str = "N/A";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Events API error (status {status}): {message}")]
    Status { status: u16, message: String },

    #[error("Failed to decode events response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            FetchError::Decode(err.to_string())
        } else {
            FetchError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        FetchError::Decode(err.to_string())
    }
}

/// One event as listed by the upstream search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventRecord {
    pub title: String,
    pub date: String,
    pub address: String,
    pub description: String,
    pub thumbnail_url: String,
    pub link: String,
}

impl EventRecord {
    fn from_value(value: &Value) -> Self {
        Self {
            title: field_text(value.get("title")),
            date: field_text(value.get("date")),
            address: field_text(value.get("address")),
            description: field_text(value.get("description")),
            thumbnail_url: field_text(value.get("thumbnail")),
            link: field_text(value.get("link")),
        }
    }
}

/// Normalized events plus the payload they came from.
#[derive(Debug, Clone)]
pub struct EventFeed {
    pub events: Vec<EventRecord>,
    pub raw: Value,
}

impl EventFeed {
    pub fn from_payload(raw: Value) -> Self {
        let events = raw
            .get("events")
            .and_then(Value::as_array)
            .map(|items| items.iter().map(EventRecord::from_value).collect())
            .unwrap_or_default();
        Self { events, raw }
    }
}

/// Flatten an upstream field into display text.
fn field_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => NOT_AVAILABLE.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(parts)) => {
            let parts: Vec<&str> = parts.iter().filter_map(Value::as_str).collect();
            if parts.is_empty() {
                NOT_AVAILABLE.to_string()
            } else {
                parts.join(", ")
            }
        }
        Some(Value::Object(map)) => map
            .get("when")
            .or_else(|| map.get("start_date"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| Value::Object(map.clone()).to_string()),
        Some(other) => other.to_string(),
    }
}

/// Search text sent upstream: "Events in <location>[ <event name>]".
pub fn build_query(location: &str, event_name: Option<&str>) -> String {
    let mut query = format!("Events in {}", location.trim());
    if let Some(name) = event_name.map(str::trim).filter(|n| !n.is_empty()) {
        query.push(' ');
        query.push_str(name);
    }
    query
}

/// A source of event listings.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Look up events. `preferences` is accepted but does not shape the query.
    async fn fetch(
        &self,
        location: &str,
        date: &str,
        preferences: &[String],
        event_name: Option<&str>,
    ) -> Result<EventFeed, FetchError>;
}

/// Client for the HasData Google Events scraper.
pub struct HasDataClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    path: String,
}

impl HasDataClient {
    pub fn new(client: reqwest::Client, api_key: String, config: &EventsConfig) -> Self {
        Self {
            client,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            path: config.path.clone(),
        }
    }

    fn request(&self, query: &str) -> reqwest::RequestBuilder {
        self.client
            .get(format!("{}{}", self.base_url, self.path))
            .query(&[("q", query)])
            .header("x-api-key", &self.api_key)
            .header("Content-Type", "application/json")
    }
}

#[async_trait]
impl EventSource for HasDataClient {
    async fn fetch(
        &self,
        location: &str,
        date: &str,
        preferences: &[String],
        event_name: Option<&str>,
    ) -> Result<EventFeed, FetchError> {
        let query = build_query(location, event_name);
        info!("Searching events: {}", query);
        debug!("Date '{}' and preferences {:?} are not sent upstream", date, preferences);

        let resp = self.request(&query).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                status: status.as_u16(),
                message: body,
            });
        }

        let body = resp.text().await?;
        let raw: Value = serde_json::from_str(&body)?;
        let feed = EventFeed::from_payload(raw);
        info!("Events API returned {} events", feed.events.len());
        Ok(feed)
    }
}
